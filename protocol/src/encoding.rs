//! Wire encoding for request and response bodies.
//!
//! Everything on the wire is bincode with fixed-width integers in little
//! endian; client and server must agree on this layout exactly, so it is
//! pinned here and nowhere else.

use {
    anyhow::{bail, Context, Result},
    serde::{de::DeserializeOwned, Serialize},
};

fn wire_config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, wire_config()).context("wire encoding failed")
}

/// Decodes a complete wire value. Trailing garbage is rejected rather than
/// ignored, so a framing bug surfaces here instead of as a half-read value.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let (value, read) =
        bincode::serde::decode_from_slice(data, wire_config()).context("wire decoding failed")?;
    if read != data.len() {
        bail!("{} trailing bytes after wire value", data.len() - read);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let value = (42u32, "hello".to_string());
        let bytes = encode(&value).unwrap();
        let decoded: (u32, String) = decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(&7u32).unwrap();
        bytes.push(0);
        assert!(decode::<u32>(&bytes).is_err());
    }
}
