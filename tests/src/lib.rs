//! End-to-end test harness: an in-process server over in-memory storage,
//! talked to by real clients over HTTP.

use {
    async_trait::async_trait,
    hoard::{
        db::LocalDb,
        remote::{HttpRemote, RemoteConfig},
        sync::{prefer_local, prefer_remote, Resolver},
        vault::Vault,
    },
    hoard_protocol::{endpoints::KeyHash, SecretHash},
    hoard_server::{
        auth::UserService,
        db::{Database, SecretRow, StoreError, User},
    },
    std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{Arc, Mutex},
    },
    tempfile::TempDir,
    tokio::{net::TcpListener, task::JoinHandle},
};

pub const PASSPHRASE: &str = "correct horse battery staple";

/// In-memory implementation of the server storage trait, with the same
/// conditional-write semantics as the SQL one.
#[derive(Default)]
pub struct MemDatabase {
    secrets: Mutex<HashMap<(String, String), SecretRow>>,
    users: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl Database for MemDatabase {
    async fn get_secret(&self, username: &str, key: &str) -> Result<SecretRow, StoreError> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(username.to_owned(), key.to_owned()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn put_secret(
        &self,
        username: &str,
        key: &str,
        data: &[u8],
        hash: SecretHash,
        expected: SecretHash,
    ) -> Result<(), StoreError> {
        let mut secrets = self.secrets.lock().unwrap();
        let id = (username.to_owned(), key.to_owned());
        match secrets.get(&id) {
            None if expected.is_zero() => {}
            Some(row) if row.hash == expected => {}
            _ => return Err(StoreError::WrongHash),
        }
        secrets.insert(
            id,
            SecretRow {
                data: data.to_vec(),
                hash,
            },
        );
        Ok(())
    }

    async fn delete_secret(
        &self,
        username: &str,
        key: &str,
        expected: SecretHash,
    ) -> Result<(), StoreError> {
        let mut secrets = self.secrets.lock().unwrap();
        let id = (username.to_owned(), key.to_owned());
        match secrets.get(&id) {
            Some(row) if row.hash == expected => {
                secrets.remove(&id);
                Ok(())
            }
            _ => Err(StoreError::WrongHash),
        }
    }

    async fn list_secrets(&self, username: &str) -> Result<Vec<KeyHash>, StoreError> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .iter()
            .filter(|((user, _), _)| user == username)
            .map(|((_, key), row)| KeyHash {
                key: key.clone(),
                hash: row.hash,
            })
            .collect())
    }

    async fn add_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(&user.username) {
            return Err(StoreError::AlreadyExists);
        }
        users.insert(user.username.clone(), user.password_hash.clone());
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<User, StoreError> {
        self.users
            .lock()
            .unwrap()
            .get(username)
            .map(|password_hash| User {
                username: username.to_owned(),
                password_hash: password_hash.clone(),
            })
            .ok_or(StoreError::NotFound)
    }
}

pub struct TestServer {
    pub url: String,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> anyhow::Result<Self> {
        let db = Arc::new(MemDatabase::default());
        let users = Arc::new(UserService::new(
            db.clone() as Arc<dyn Database>,
            Some("integration-test-signing-key"),
        ));

        let port = portpicker::pick_unused_port().expect("failed to pick port");
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse()?;
        let listener = TcpListener::bind(addr).await?;
        let handle = tokio::spawn(async move {
            if let Err(err) = hoard_server::serve(listener, db, users).await {
                eprintln!("server failed: {err:?}");
            }
        });

        Ok(Self {
            url: format!("http://127.0.0.1:{port}/"),
            handle,
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Conflict policies by name, mirroring the CLI's `--prefer` flag.
#[derive(Debug, Clone, Copy)]
pub enum Policy {
    Local,
    Remote,
}

pub struct TestClient {
    dir: TempDir,
    server_url: String,
    username: String,
    password: String,
}

impl TestClient {
    pub fn new(server: &TestServer, username: &str, password: &str) -> anyhow::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            server_url: server.url.clone(),
            username: username.to_owned(),
            password: password.to_owned(),
        })
    }

    pub fn remote(&self) -> anyhow::Result<HttpRemote> {
        Ok(HttpRemote::new(RemoteConfig {
            server: self.server_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            insecure: false,
        })?)
    }

    /// Opens this client's vault; each call builds a fresh instance over the
    /// same database file, the way each CLI invocation does.
    pub async fn vault(&self, policy: Option<Policy>) -> anyhow::Result<Vault> {
        let db = LocalDb::open(&self.dir.path().join("hoard.sqlite")).await?;
        let mut builder =
            Vault::builder(db, PASSPHRASE).remote(Box::new(self.remote()?));
        if let Some(policy) = policy {
            let resolver: Arc<Resolver> = match policy {
                Policy::Local => Arc::new(prefer_local),
                Policy::Remote => Arc::new(prefer_remote),
            };
            builder = builder.resolver(resolver);
        }
        Ok(builder.build())
    }
}
