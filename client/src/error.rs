use hoard_protocol::{ErrorKind, WireError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure classification shared by the local store, the remote store and
/// the reconciler. `NotFound` and `Conflict` double as control signals
/// inside the sync state machine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the requested secret does not exist")]
    NotFound,
    #[error("local and remote changes conflict")]
    Conflict,
    #[error("authentication failed")]
    Unauthenticated,
    #[error("the username is already taken")]
    AlreadyExists,
    #[error("data corruption detected")]
    Corruption,
    #[error("bad passphrase or tampered ciphertext")]
    BadPassphrase,
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound => ErrorKind::NotFound,
            Error::Conflict => ErrorKind::Conflict,
            Error::Unauthenticated => ErrorKind::Unauthenticated,
            Error::AlreadyExists => ErrorKind::AlreadyExists,
            Error::Corruption | Error::BadPassphrase => ErrorKind::Corruption,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Other(_) => ErrorKind::Internal,
        }
    }
}

impl From<WireError> for Error {
    fn from(err: WireError) -> Self {
        match err.kind {
            ErrorKind::NotFound => Error::NotFound,
            ErrorKind::Conflict => Error::Conflict,
            ErrorKind::Unauthenticated => Error::Unauthenticated,
            ErrorKind::AlreadyExists => Error::AlreadyExists,
            ErrorKind::Corruption => Error::Corruption,
            ErrorKind::Cancelled => Error::Cancelled,
            ErrorKind::Internal => Error::Other(anyhow::anyhow!("server error: {}", err.message)),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Other(anyhow::Error::new(err))
    }
}
