//! Reconciliation between the local store and a remote store.
//!
//! Each key is decided independently from three hashes: the local payload
//! hash, the server hash observed at the last successful sync of the key,
//! and the hash currently stored remotely. Remote writes are conditional on
//! the hash the client believes the server holds; a conflict restarts the
//! decision for that key with freshly observed state. Optimistic concurrency
//! is the only coordination between clients: there are no locks or leases,
//! a losing writer simply retries.

use {
    crate::{
        crypto::CipherBlob,
        db::{LocalDb, StoredSecret},
        error::{Error, Result},
        remote::Remote,
    },
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

/// Consulted only when local and remote diverged with no common ancestor
/// hash. Must return one of the two inputs, or a freshly encrypted blob to
/// replace both.
pub type Resolver = dyn Fn(&CipherBlob, &CipherBlob) -> Result<CipherBlob> + Send + Sync;

/// Conflict policy: keep the remote payload.
pub fn prefer_remote(_local: &CipherBlob, remote: &CipherBlob) -> Result<CipherBlob> {
    Ok(remote.clone())
}

/// Conflict policy: keep the local payload.
pub fn prefer_local(local: &CipherBlob, _remote: &CipherBlob) -> Result<CipherBlob> {
    Ok(local.clone())
}

/// How many times the per-key decision may restart after a compare-and-swap
/// conflict before giving up. One restart suffices without concurrent
/// writers.
const MAX_ATTEMPTS: u32 = 8;

enum Outcome {
    Done,
    /// A conditional remote write lost a race; re-run the decision with
    /// fresh state.
    Restart,
}

/// Runs the per-key reconciliation for every key present on either side.
pub async fn sync_all(
    cancel: &CancellationToken,
    db: &LocalDb,
    remote: &dyn Remote,
    resolver: Option<&Resolver>,
) -> Result<()> {
    check(cancel)?;

    let mut local_list = db.list(cancel).await?;
    let remote_list = remote.list(cancel).await?;

    for entry in remote_list {
        if let Some(local) = local_list.get(&entry.key) {
            if local.payload_hash == local.server_hash && local.payload_hash == entry.hash {
                // fully in sync
                local_list.remove(&entry.key);
                continue;
            }
        }
        sync_key(cancel, db, remote, resolver, &entry.key).await?;
        local_list.remove(&entry.key);
    }

    // whatever is left exists only locally
    for key in local_list.keys() {
        sync_key(cancel, db, remote, resolver, key).await?;
    }

    Ok(())
}

/// Reconciles a single key, restarting on CAS conflicts up to the attempt
/// budget.
pub async fn sync_key(
    cancel: &CancellationToken,
    db: &LocalDb,
    remote: &dyn Remote,
    resolver: Option<&Resolver>,
    key: &str,
) -> Result<()> {
    for _ in 0..MAX_ATTEMPTS {
        match sync_key_once(cancel, db, remote, resolver, key).await? {
            Outcome::Done => return Ok(()),
            Outcome::Restart => {
                debug!(key, "remote write lost a race, retrying");
            }
        }
    }
    Err(Error::Conflict)
}

async fn sync_key_once(
    cancel: &CancellationToken,
    db: &LocalDb,
    remote: &dyn Remote,
    resolver: Option<&Resolver>,
    key: &str,
) -> Result<Outcome> {
    check(cancel)?;

    let local = match db.get(cancel, key).await {
        Ok(stored) => Some(stored),
        Err(Error::NotFound) => None,
        Err(err) => return Err(err),
    };
    let remote_payload = match remote.get(cancel, key).await {
        Ok(payload) => Some(payload),
        Err(Error::NotFound) => None,
        Err(err) => return Err(err),
    };

    let (local, remote_payload) = match (local, remote_payload) {
        (None, None) => return Ok(Outcome::Done),
        (None, Some(remote_payload)) => {
            // only exists remotely
            adopt_remote(cancel, db, key, remote_payload).await?;
            return Ok(Outcome::Done);
        }
        (Some(local), None) => {
            if !local.server_hash.is_zero() {
                // deleted remotely
                db.delete(cancel, key).await?;
                return Ok(Outcome::Done);
            }
            return push(cancel, db, remote, key).await;
        }
        (Some(local), Some(remote_payload)) => (local, remote_payload),
    };

    if local.payload.hash == remote_payload.hash {
        if local.server_hash == local.payload.hash {
            // nothing to do
            return Ok(Outcome::Done);
        }
        // payloads already agree, record the server hash
        let ratified = StoredSecret {
            payload: local.payload,
            server_hash: remote_payload.hash,
        };
        db.put(cancel, key, &ratified).await?;
        return Ok(Outcome::Done);
    }

    if local.server_hash == remote_payload.hash {
        // local is newer
        return push(cancel, db, remote, key).await;
    }

    if local.server_hash == local.payload.hash {
        // remote is newer
        adopt_remote(cancel, db, key, remote_payload).await?;
        return Ok(Outcome::Done);
    }

    // three-way divergence
    let Some(resolver) = resolver else {
        return Err(Error::Conflict);
    };
    let chosen = resolver(&local.payload, &remote_payload)?;

    if chosen.hash == remote_payload.hash {
        adopt_remote(cancel, db, key, remote_payload).await?;
        return Ok(Outcome::Done);
    }

    // local won, or the resolver produced something new; either way the
    // chosen payload supersedes what the server currently holds
    let stored = StoredSecret {
        payload: chosen,
        server_hash: remote_payload.hash,
    };
    db.put(cancel, key, &stored).await?;
    push(cancel, db, remote, key).await
}

async fn adopt_remote(
    cancel: &CancellationToken,
    db: &LocalDb,
    key: &str,
    payload: CipherBlob,
) -> Result<()> {
    let server_hash = payload.hash;
    let stored = StoredSecret {
        payload,
        server_hash,
    };
    db.put(cancel, key, &stored).await
}

/// Propagates the local record upstream with a conditional write, then
/// records the acknowledged hash locally. A tombstone propagates as a
/// conditional delete followed by a local physical delete.
async fn push(
    cancel: &CancellationToken,
    db: &LocalDb,
    remote: &dyn Remote,
    key: &str,
) -> Result<Outcome> {
    check(cancel)?;

    let local = db.get(cancel, key).await?;

    if local.payload.is_empty() && local.payload.hash.is_zero() {
        match remote.delete(cancel, key, local.server_hash).await {
            Ok(()) => {
                db.delete(cancel, key).await?;
                Ok(Outcome::Done)
            }
            Err(Error::Conflict) => Ok(Outcome::Restart),
            Err(err) => Err(err),
        }
    } else {
        match remote
            .put(cancel, key, &local.payload, local.server_hash)
            .await
        {
            Ok(()) => {
                let synced = StoredSecret {
                    server_hash: local.payload.hash,
                    payload: local.payload,
                };
                db.put(cancel, key, &synced).await?;
                Ok(Outcome::Done)
            }
            Err(Error::Conflict) => Ok(Outcome::Restart),
            Err(err) => Err(err),
        }
    }
}

fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
