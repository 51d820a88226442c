//! High-level secret repository tying together the local store, the
//! passphrase and the optional remote.

use {
    crate::{
        crypto,
        db::{LocalDb, StoredSecret},
        error::{Error, Result},
        remote::Remote,
        secret::Secret,
        sync::{self, Resolver},
    },
    anyhow::anyhow,
    std::sync::Arc,
    tokio_util::sync::CancellationToken,
};

/// A vault is configured once at startup; without a remote, `sync` is
/// unavailable, and without a resolver, three-way divergence during sync is
/// an error.
pub struct Vault {
    db: LocalDb,
    passphrase: String,
    remote: Option<Box<dyn Remote>>,
    resolver: Option<Arc<Resolver>>,
}

pub struct VaultBuilder {
    vault: Vault,
}

impl VaultBuilder {
    pub fn remote(mut self, remote: Box<dyn Remote>) -> Self {
        self.vault.remote = Some(remote);
        self
    }

    pub fn resolver(mut self, resolver: Arc<Resolver>) -> Self {
        self.vault.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Vault {
        self.vault
    }
}

impl Vault {
    pub fn builder(db: LocalDb, passphrase: impl Into<String>) -> VaultBuilder {
        VaultBuilder {
            vault: Vault {
                db,
                passphrase: passphrase.into(),
                remote: None,
                resolver: None,
            },
        }
    }

    /// Encrypts and stores a secret. Overwriting an existing key is allowed;
    /// the record starts (or starts over) as never-synced, so a concurrent
    /// change of the same key on another client surfaces as a conflict at
    /// the next sync instead of being silently overwritten.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        key: &str,
        secret: &Secret,
    ) -> Result<()> {
        let payload = crypto::encrypt(&secret.encode()?, &self.passphrase)?;
        self.db
            .put(
                cancel,
                key,
                &StoredSecret {
                    payload,
                    server_hash: hoard_protocol::SecretHash::ZERO,
                },
            )
            .await
    }

    /// Decrypts and returns a stored secret. A tombstone is reported as
    /// not found; the row only exists as a delete marker.
    pub async fn read(&self, cancel: &CancellationToken, key: &str) -> Result<Secret> {
        let stored = self.db.get(cancel, key).await?;
        if stored.payload.is_empty() {
            return Err(Error::NotFound);
        }
        let plaintext = crypto::decrypt(&stored.payload, &self.passphrase)?;
        Secret::decode(&plaintext)
    }

    /// Deletes a secret. A record the server has never seen is removed
    /// outright; a synced record becomes a tombstone so the delete
    /// propagates at the next sync. Deleting an absent key is not an error.
    pub async fn delete(&self, cancel: &CancellationToken, key: &str) -> Result<()> {
        let current = match self.db.get(cancel, key).await {
            Ok(stored) => stored,
            Err(Error::NotFound) => return Ok(()),
            Err(err) => return Err(err),
        };

        if current.server_hash.is_zero() {
            self.db.delete(cancel, key).await
        } else {
            self.db
                .put(cancel, key, &StoredSecret::tombstone(current.server_hash))
                .await
        }
    }

    /// Reconciles every key with the remote.
    pub async fn sync_all(&self, cancel: &CancellationToken) -> Result<()> {
        let remote = self.require_remote()?;
        sync::sync_all(cancel, &self.db, remote, self.resolver.as_deref()).await
    }

    /// Reconciles a single key with the remote.
    pub async fn sync_key(&self, cancel: &CancellationToken, key: &str) -> Result<()> {
        let remote = self.require_remote()?;
        sync::sync_key(cancel, &self.db, remote, self.resolver.as_deref(), key).await
    }

    pub async fn close(&self) {
        self.db.close().await;
    }

    fn require_remote(&self) -> Result<&dyn Remote> {
        self.remote
            .as_deref()
            .ok_or_else(|| Error::Other(anyhow!("remote storage is not configured")))
    }
}
