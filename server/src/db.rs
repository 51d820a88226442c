//! Authoritative storage, one row per `(username, key)`.
//!
//! Conditional writes are serialized by the database's row-level write
//! atomicity: an update or delete predicated on the stored hash either
//! matches exactly one row or changes nothing. A delete whose predicate
//! fails reports the same wrong-hash error whether the row is stale or
//! missing; clients rely on that conflation to restart their per-key
//! decision.

use {
    anyhow::Context as _,
    async_trait::async_trait,
    hoard_protocol::{endpoints::KeyHash, SecretHash},
    sqlx::{postgres::PgPoolOptions, PgPool, Row},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("secret not found")]
    NotFound,
    #[error("wrong hash")]
    WrongHash,
    #[error("user already exists")]
    AlreadyExists,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRow {
    pub data: Vec<u8>,
    pub hash: SecretHash,
}

#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub password_hash: String,
}

/// Storage operations the service needs. The production implementation is
/// [`PgDatabase`]; tests substitute an in-memory one.
#[async_trait]
pub trait Database: Send + Sync {
    async fn get_secret(&self, username: &str, key: &str) -> Result<SecretRow, StoreError>;
    /// A zero `expected` inserts and fails on any existing row; a nonzero
    /// `expected` updates iff the stored hash matches.
    async fn put_secret(
        &self,
        username: &str,
        key: &str,
        data: &[u8],
        hash: SecretHash,
        expected: SecretHash,
    ) -> Result<(), StoreError>;
    async fn delete_secret(
        &self,
        username: &str,
        key: &str,
        expected: SecretHash,
    ) -> Result<(), StoreError>;
    /// Keys and hashes only, no ciphertext bodies.
    async fn list_secrets(&self, username: &str) -> Result<Vec<KeyHash>, StoreError>;
    async fn add_user(&self, user: &User) -> Result<(), StoreError>;
    async fn get_user(&self, username: &str) -> Result<User, StoreError>;
}

pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connects to the database and applies pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .connect(database_url)
            .await
            .context("failed to connect to database")?;
        sqlx::migrate!()
            .run(&pool)
            .await
            .context("failed to migrate database")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn get_secret(&self, username: &str, key: &str) -> Result<SecretRow, StoreError> {
        let row = sqlx::query("SELECT data, hash FROM secrets WHERE username = $1 AND key = $2")
            .bind(username)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_other)?
            .ok_or(StoreError::NotFound)?;
        Ok(SecretRow {
            data: row.get("data"),
            hash: hash_column(&row, "hash")?,
        })
    }

    async fn put_secret(
        &self,
        username: &str,
        key: &str,
        data: &[u8],
        hash: SecretHash,
        expected: SecretHash,
    ) -> Result<(), StoreError> {
        if expected.is_zero() {
            let result =
                sqlx::query("INSERT INTO secrets (username, key, data, hash) VALUES ($1, $2, $3, $4)")
                    .bind(username)
                    .bind(key)
                    .bind(data)
                    .bind(hash.as_slice())
                    .execute(&self.pool)
                    .await;
            return match result {
                Ok(_) => Ok(()),
                Err(err) if is_unique_violation(&err) => Err(StoreError::WrongHash),
                Err(err) => Err(to_other(err)),
            };
        }

        let result = sqlx::query(
            "UPDATE secrets SET data = $1, hash = $2
            WHERE username = $3 AND key = $4 AND hash = $5",
        )
        .bind(data)
        .bind(hash.as_slice())
        .bind(username)
        .bind(key)
        .bind(expected.as_slice())
        .execute(&self.pool)
        .await
        .map_err(to_other)?;

        if result.rows_affected() != 1 {
            return Err(StoreError::WrongHash);
        }
        Ok(())
    }

    async fn delete_secret(
        &self,
        username: &str,
        key: &str,
        expected: SecretHash,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("DELETE FROM secrets WHERE username = $1 AND key = $2 AND hash = $3")
                .bind(username)
                .bind(key)
                .bind(expected.as_slice())
                .execute(&self.pool)
                .await
                .map_err(to_other)?;

        if result.rows_affected() != 1 {
            return Err(StoreError::WrongHash);
        }
        Ok(())
    }

    async fn list_secrets(&self, username: &str) -> Result<Vec<KeyHash>, StoreError> {
        let rows = sqlx::query("SELECT key, hash FROM secrets WHERE username = $1")
            .bind(username)
            .fetch_all(&self.pool)
            .await
            .map_err(to_other)?;
        rows.iter()
            .map(|row| {
                Ok(KeyHash {
                    key: row.get("key"),
                    hash: hash_column(row, "hash")?,
                })
            })
            .collect()
    }

    async fn add_user(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT INTO users (username, password) VALUES ($1, $2)")
            .bind(&user.username)
            .bind(&user.password_hash)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyExists),
            Err(err) => Err(to_other(err)),
        }
    }

    async fn get_user(&self, username: &str) -> Result<User, StoreError> {
        let row = sqlx::query("SELECT password FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_other)?
            .ok_or(StoreError::NotFound)?;
        Ok(User {
            username: username.to_owned(),
            password_hash: row.get("password"),
        })
    }
}

fn to_other(err: sqlx::Error) -> StoreError {
    StoreError::Other(anyhow::Error::new(err))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

fn hash_column(row: &sqlx::postgres::PgRow, column: &str) -> Result<SecretHash, StoreError> {
    let bytes: Vec<u8> = row.get(column);
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("stored hash in column {column} is not 32 bytes"))?;
    Ok(SecretHash(array))
}
