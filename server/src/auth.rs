//! User registration, credential checks and bearer tokens.
//!
//! Passwords are stored as argon2id PHC strings. Tokens are HS256 JWTs
//! carrying the username and an expiry; the signing key is operator-provided
//! or generated at startup, in which case tokens do not survive a restart.

use {
    crate::db::{Database, StoreError, User},
    argon2::{
        password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
        Argon2,
    },
    chrono::Utc,
    jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation},
    rand::RngCore,
    serde::{Deserialize, Serialize},
    std::sync::Arc,
};

pub const TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("user already exists")]
    AlreadyExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    username: String,
    exp: usize,
}

pub struct UserService {
    db: Arc<dyn Database>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl UserService {
    pub fn new(db: Arc<dyn Database>, signing_key: Option<&str>) -> Self {
        let key = match signing_key {
            Some(key) if !key.is_empty() => key.as_bytes().to_vec(),
            _ => {
                let mut key = vec![0u8; 32];
                rand::rngs::OsRng.fill_bytes(&mut key);
                key
            }
        };
        Self {
            db,
            encoding_key: EncodingKey::from_secret(&key),
            decoding_key: DecodingKey::from_secret(&key),
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?
            .to_string();
        match self
            .db
            .add_user(&User {
                username: username.to_owned(),
                password_hash,
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyExists) => Err(AuthError::AlreadyExists),
            Err(err) => Err(AuthError::Other(anyhow::Error::new(err))),
        }
    }

    /// Verifies the credentials and issues a token. All failures look the
    /// same to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let user = self
            .db
            .get_user(username)
            .await
            .map_err(|_| AuthError::InvalidCredentials)?;
        let parsed =
            PasswordHash::new(&user.password_hash).map_err(|_| AuthError::InvalidCredentials)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let claims = Claims {
            username: username.to_owned(),
            exp: (Utc::now().timestamp() + TOKEN_LIFETIME_SECS) as usize,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| AuthError::Other(anyhow::anyhow!("failed to sign token: {err}")))
    }

    /// Checks the signature and expiry, returning the username claim.
    pub fn verify_token(&self, token: &str) -> Result<String, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(data.claims.username)
    }
}
