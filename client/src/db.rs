//! Local encrypted store, one SQLite database per client.
//!
//! Rows hold the ciphertext verbatim together with two hashes: the hash of
//! the stored payload and the server hash observed at the last successful
//! sync of the key. Schema changes are forward-only migrations applied at
//! open. The database is single-writer; opening it from two processes at
//! once is not supported.

use {
    crate::{
        crypto::CipherBlob,
        error::{Error, Result},
    },
    anyhow::Context,
    hoard_protocol::SecretHash,
    sqlx::{
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
        Row, SqlitePool,
    },
    std::{collections::HashMap, path::Path},
    tokio_util::sync::CancellationToken,
};

/// A secret as stored locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSecret {
    pub payload: CipherBlob,
    pub server_hash: SecretHash,
}

impl StoredSecret {
    /// A record with an empty payload and a nonzero server hash marks a
    /// pending remote delete. Empty payload with a zero server hash is never
    /// written; that combination is a plain delete.
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_empty() && !self.server_hash.is_zero()
    }

    pub fn tombstone(server_hash: SecretHash) -> Self {
        Self {
            payload: CipherBlob::default(),
            server_hash,
        }
    }
}

/// Hashes of one stored secret, as returned by [`LocalDb::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListedSecret {
    pub payload_hash: SecretHash,
    pub server_hash: SecretHash,
}

pub struct LocalDb {
    pool: SqlitePool,
}

impl LocalDb {
    /// Opens (creating if missing) the database and applies pending
    /// migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open local db at {}", path.display()))?;
        sqlx::migrate!()
            .run(&pool)
            .await
            .context("failed to migrate local db")?;
        Ok(Self { pool })
    }

    pub async fn get(&self, cancel: &CancellationToken, key: &str) -> Result<StoredSecret> {
        check(cancel)?;
        let row = sqlx::query(
            "SELECT encrypted_payload, payload_hash, server_hash FROM secrets WHERE id = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::NotFound)?;

        Ok(StoredSecret {
            payload: CipherBlob::from_parts(
                row.get("encrypted_payload"),
                hash_column(&row, "payload_hash")?,
            ),
            server_hash: hash_column(&row, "server_hash")?,
        })
    }

    pub async fn put(
        &self,
        cancel: &CancellationToken,
        key: &str,
        secret: &StoredSecret,
    ) -> Result<()> {
        check(cancel)?;
        sqlx::query(
            "INSERT INTO secrets (id, encrypted_payload, payload_hash, server_hash)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                encrypted_payload = excluded.encrypted_payload,
                payload_hash = excluded.payload_hash,
                server_hash = excluded.server_hash",
        )
        .bind(key)
        .bind(&secret.payload.bytes)
        .bind(secret.payload.hash.as_slice().to_vec())
        .bind(secret.server_hash.as_slice().to_vec())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, cancel: &CancellationToken, key: &str) -> Result<()> {
        check(cancel)?;
        sqlx::query("DELETE FROM secrets WHERE id = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns the hashes of every stored secret, a consistent snapshot of
    /// the keys present at call time.
    pub async fn list(&self, cancel: &CancellationToken) -> Result<HashMap<String, ListedSecret>> {
        check(cancel)?;
        let rows = sqlx::query("SELECT id, payload_hash, server_hash FROM secrets")
            .fetch_all(&self.pool)
            .await?;
        let mut secrets = HashMap::with_capacity(rows.len());
        for row in rows {
            secrets.insert(
                row.get("id"),
                ListedSecret {
                    payload_hash: hash_column(&row, "payload_hash")?,
                    server_hash: hash_column(&row, "server_hash")?,
                },
            );
        }
        Ok(secrets)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

fn hash_column(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<SecretHash> {
    let bytes: Vec<u8> = row.get(column);
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("stored hash in column {column} is not 32 bytes"))?;
    Ok(SecretHash(array))
}
