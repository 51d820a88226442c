//! Typed secret payloads and the envelope that carries them.
//!
//! The envelope is a small self-describing JSON document
//! `{"t": tag, "d": base64 body, "m": metadata}` shared by all clients; it is
//! the plaintext input to encryption. Decoding dispatches on the tag byte and
//! fails closed on tags it does not know.

use {
    crate::error::Result,
    anyhow::Context,
    base64::{prelude::BASE64_STANDARD, Engine},
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, fmt},
};

const TAG_TEXT: u8 = b't';
const TAG_BINARY: u8 = b'b';
const TAG_PASSWORD: u8 = b'p';
const TAG_CARD: u8 = b'c';

/// The closed set of secret payload types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretValue {
    Text(String),
    Binary(Vec<u8>),
    Password {
        username: String,
        password: String,
    },
    Card {
        number: String,
        expiry: String,
        cvv: String,
        username: String,
    },
}

impl SecretValue {
    fn tag(&self) -> u8 {
        match self {
            SecretValue::Text(_) => TAG_TEXT,
            SecretValue::Binary(_) => TAG_BINARY,
            SecretValue::Password { .. } => TAG_PASSWORD,
            SecretValue::Card { .. } => TAG_CARD,
        }
    }

    fn body(&self) -> Result<Vec<u8>> {
        let body = match self {
            SecretValue::Text(value) => value.as_bytes().to_vec(),
            SecretValue::Binary(value) => value.clone(),
            SecretValue::Password { username, password } => serde_json::to_vec(&PasswordBody {
                u: username.clone(),
                p: password.clone(),
            })
            .context("failed to encode password body")?,
            SecretValue::Card {
                number,
                expiry,
                cvv,
                username,
            } => serde_json::to_vec(&CardBody {
                n: number.clone(),
                e: expiry.clone(),
                c: cvv.clone(),
                u: username.clone(),
            })
            .context("failed to encode card body")?,
        };
        Ok(body)
    }

    fn from_tagged(tag: u8, body: Vec<u8>) -> Result<Self> {
        let value = match tag {
            TAG_TEXT => SecretValue::Text(
                String::from_utf8(body).context("text secret body is not valid UTF-8")?,
            ),
            TAG_BINARY => SecretValue::Binary(body),
            TAG_PASSWORD => {
                let body: PasswordBody =
                    serde_json::from_slice(&body).context("malformed password body")?;
                SecretValue::Password {
                    username: body.u,
                    password: body.p,
                }
            }
            TAG_CARD => {
                let body: CardBody = serde_json::from_slice(&body).context("malformed card body")?;
                SecretValue::Card {
                    number: body.n,
                    expiry: body.e,
                    cvv: body.c,
                    username: body.u,
                }
            }
            other => {
                return Err(anyhow::anyhow!("unknown secret type tag {other:#04x}").into());
            }
        };
        Ok(value)
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretValue::Text(value) => write!(f, "{value}"),
            SecretValue::Binary(_) => write!(f, "***BINARY DATA***"),
            SecretValue::Password { username, password } => {
                write!(f, "Username: {username}\nPassword: {password}")
            }
            SecretValue::Card {
                number,
                expiry,
                cvv,
                username,
            } => {
                write!(f, "Card Number: {number}\nExpiry Date: {expiry}\nCVV: {cvv}")?;
                if !username.is_empty() {
                    write!(f, "\nUsername: {username}")?;
                }
                Ok(())
            }
        }
    }
}

/// A typed secret value plus free-form string metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    value: SecretValue,
    metadata: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    t: u8,
    #[serde(with = "base64_bytes")]
    d: Vec<u8>,
    #[serde(default)]
    m: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct PasswordBody {
    u: String,
    p: String,
}

#[derive(Serialize, Deserialize)]
struct CardBody {
    n: String,
    e: String,
    c: String,
    #[serde(default)]
    u: String,
}

impl Secret {
    pub fn new(value: SecretValue) -> Self {
        Self {
            value,
            metadata: BTreeMap::new(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(SecretValue::Text(value.into()))
    }

    pub fn binary(value: Vec<u8>) -> Self {
        Self::new(SecretValue::Binary(value))
    }

    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(SecretValue::Password {
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn card(
        number: impl Into<String>,
        expiry: impl Into<String>,
        cvv: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self::new(SecretValue::Card {
            number: number.into(),
            expiry: expiry.into(),
            cvv: cvv.into(),
            username: username.into(),
        })
    }

    pub fn value(&self) -> &SecretValue {
        &self.value
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, metadata: BTreeMap<String, String>) {
        self.metadata = metadata;
    }

    pub fn set_metadata_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Serializes the secret into its envelope form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let envelope = Envelope {
            t: self.value.tag(),
            d: self.value.body()?,
            m: self.metadata.clone(),
        };
        Ok(serde_json::to_vec(&envelope).context("failed to encode envelope")?)
    }

    /// Parses an envelope produced by [`Secret::encode`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_slice(data).context("malformed secret envelope")?;
        Ok(Self {
            value: SecretValue::from_tagged(envelope.t, envelope.d)?,
            metadata: envelope.m,
        })
    }

    /// The bytes written by `show --target-file`: raw content for binary
    /// secrets, the rendered text for everything else.
    pub fn body_bytes(&self) -> Vec<u8> {
        match &self.value {
            SecretValue::Binary(value) => value.clone(),
            other => other.to_string().into_bytes(),
        }
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.value)?;
        for (key, value) in &self.metadata {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}

mod base64_bytes {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD.decode(encoded).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_roundtrip() {
        let mut secret = Secret::text("hello");
        secret.set_metadata_value("site", "example.com");
        let decoded = Secret::decode(&secret.encode().unwrap()).unwrap();
        assert_eq!(decoded, secret);
        assert_eq!(decoded.metadata_value("site"), Some("example.com"));
    }

    #[test]
    fn binary_roundtrip() {
        let secret = Secret::binary(vec![0, 159, 146, 150]);
        let decoded = Secret::decode(&secret.encode().unwrap()).unwrap();
        assert_eq!(decoded, secret);
        assert_eq!(decoded.body_bytes(), vec![0, 159, 146, 150]);
    }

    #[test]
    fn password_roundtrip() {
        let secret = Secret::password("alice", "s3cr3t");
        let decoded = Secret::decode(&secret.encode().unwrap()).unwrap();
        assert_eq!(decoded, secret);
    }

    #[test]
    fn card_roundtrip() {
        let secret = Secret::card("4242424242424242", "12/30", "123", "");
        let decoded = Secret::decode(&secret.encode().unwrap()).unwrap();
        assert_eq!(decoded, secret);
    }

    #[test]
    fn unknown_tag_fails_closed() {
        let data = br#"{"t":122,"d":"","m":{}}"#;
        assert!(Secret::decode(data).is_err());
    }

    #[test]
    fn garbage_envelope_fails() {
        assert!(Secret::decode(b"not json").is_err());
    }

    #[test]
    fn card_rendering_omits_empty_username() {
        let with_user = Secret::card("1", "2", "3", "bob");
        assert!(with_user.to_string().contains("Username: bob"));
        let without_user = Secret::card("1", "2", "3", "");
        assert!(!without_user.to_string().contains("Username"));
    }

    #[test]
    fn binary_renders_placeholder() {
        let secret = Secret::binary(vec![1, 2, 3]);
        assert!(secret.to_string().contains("***BINARY DATA***"));
    }
}
