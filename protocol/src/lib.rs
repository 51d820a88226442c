use {
    base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine},
    derive_more::{From, Into},
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::fmt,
};

pub mod encoding;
pub mod endpoints;

pub const VERSION: u32 = 1;

/// SHA-256 digest of a stored ciphertext.
///
/// The all-zero value is reserved: depending on context it means "no record
/// exists" (conditional writes) or "never synced" (client bookkeeping).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct SecretHash(pub [u8; 32]);

impl SecretHash {
    pub const ZERO: Self = Self([0; 32]);

    /// Hashes the given bytes.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE64_URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretHash({self})")
    }
}

/// Transport-agnostic classification of request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The addressed key does not exist at the queried store.
    NotFound,
    /// A conditional write found an unexpected predecessor hash.
    Conflict,
    /// Missing or invalid bearer token.
    Unauthenticated,
    /// Signup with a taken username.
    AlreadyExists,
    /// Stored ciphertext failed integrity or authentication checks.
    Corruption,
    /// Cancellation was observed before the operation completed.
    Cancelled,
    /// Any other unexpected failure.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Corruption => "corruption",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(text)
    }
}

/// Error payload carried in response bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

impl WireError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for WireError {}
