//! Remote store abstraction and its HTTP implementation.

use {
    crate::{
        crypto::CipherBlob,
        error::{Error, Result},
    },
    anyhow::Context,
    async_trait::async_trait,
    hoard_protocol::{
        encoding,
        endpoints::{
            DeleteSecret, GetSecret, ListHashes, Login, PutSecret, RequestToResponse, Signup,
        },
        SecretHash, WireError,
    },
    reqwest::{Method, StatusCode, Url},
    serde::{de::DeserializeOwned, Serialize},
    std::time::Duration,
    tokio::sync::Mutex,
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

/// One entry of the remote inventory.
#[derive(Debug, Clone)]
pub struct RemoteListedSecret {
    pub key: String,
    pub hash: SecretHash,
}

/// A keyed remote map with conditional writes.
///
/// `expected` semantics on `put`: the zero hash asserts that no prior record
/// exists; any other value asserts that the currently stored hash equals it.
/// An unsatisfied predicate fails with [`Error::Conflict`] and no state
/// change. `delete` reports a conflict for a missing record as well; the
/// reconciler depends on that conflation.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<RemoteListedSecret>>;
    async fn get(&self, cancel: &CancellationToken, key: &str) -> Result<CipherBlob>;
    async fn put(
        &self,
        cancel: &CancellationToken,
        key: &str,
        payload: &CipherBlob,
        expected: SecretHash,
    ) -> Result<()>;
    async fn delete(
        &self,
        cancel: &CancellationToken,
        key: &str,
        expected: SecretHash,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub server: String,
    pub username: String,
    pub password: String,
    pub insecure: bool,
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote store backed by the sync server.
///
/// Performs login lazily: the bearer token is fetched before the first
/// authenticated call and refreshed once if the server reports it invalid.
pub struct HttpRemote {
    reqwest: reqwest::Client,
    server_url: Url,
    username: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl HttpRemote {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let server_url = Url::parse(&config.server)
            .with_context(|| format!("invalid server url: {}", config.server))?;
        let reqwest = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            reqwest,
            server_url,
            username: config.username,
            password: config.password,
            token: Mutex::new(None),
        })
    }

    /// Registers the configured user with the server.
    pub async fn signup(&self, cancel: &CancellationToken) -> Result<()> {
        self.call(
            cancel,
            &Signup {
                username: self.username.clone(),
                password: self.password.clone(),
            },
            None,
        )
        .await
    }

    async fn login(&self, cancel: &CancellationToken) -> Result<String> {
        let response = self
            .call(
                cancel,
                &Login {
                    username: self.username.clone(),
                    password: self.password.clone(),
                },
                None,
            )
            .await?;
        debug!("obtained fresh token");
        Ok(response.token)
    }

    /// Sends an authenticated request, logging in first if no token is
    /// cached. If the server rejects the token, logs in again and retries
    /// the request once.
    async fn request<R>(&self, cancel: &CancellationToken, request: &R) -> Result<R::Response>
    where
        R: RequestToResponse + Serialize,
        R::Response: DeserializeOwned,
    {
        let token = {
            let mut cached = self.token.lock().await;
            match &*cached {
                Some(token) => token.clone(),
                None => {
                    let token = self.login(cancel).await?;
                    *cached = Some(token.clone());
                    token
                }
            }
        };

        match self.call(cancel, request, Some(&token)).await {
            Err(Error::Unauthenticated) => {
                let token = self.login(cancel).await?;
                *self.token.lock().await = Some(token.clone());
                self.call(cancel, request, Some(&token)).await
            }
            other => other,
        }
    }

    async fn call<R>(
        &self,
        cancel: &CancellationToken,
        request: &R,
        token: Option<&str>,
    ) -> Result<R::Response>
    where
        R: RequestToResponse + Serialize,
        R::Response: DeserializeOwned,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let url = self
            .server_url
            .join(R::PATH)
            .context("failed to build request url")?;
        let body = encoding::encode(request).context("failed to encode request")?;
        let mut builder = self.reqwest.request(Method::POST, url).body(body);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.context("request failed")?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(Error::Unauthenticated),
            status => {
                return Err(anyhow::anyhow!("server returned unexpected status {status}").into());
            }
        }
        let bytes = response
            .bytes()
            .await
            .context("failed to read response body")?;
        let result: std::result::Result<R::Response, WireError> =
            encoding::decode(&bytes).context("failed to decode response")?;
        result.map_err(Error::from)
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<RemoteListedSecret>> {
        let hashes = self.request(cancel, &ListHashes).await?;
        Ok(hashes
            .into_iter()
            .map(|entry| RemoteListedSecret {
                key: entry.key,
                hash: entry.hash,
            })
            .collect())
    }

    async fn get(&self, cancel: &CancellationToken, key: &str) -> Result<CipherBlob> {
        let record = self
            .request(cancel, &GetSecret { key: key.into() })
            .await?;
        Ok(CipherBlob::from_parts(record.data, record.hash))
    }

    async fn put(
        &self,
        cancel: &CancellationToken,
        key: &str,
        payload: &CipherBlob,
        expected: SecretHash,
    ) -> Result<()> {
        self.request(
            cancel,
            &PutSecret {
                key: key.into(),
                data: payload.bytes.clone(),
                known_hash: expected,
            },
        )
        .await
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        key: &str,
        expected: SecretHash,
    ) -> Result<()> {
        self.request(
            cancel,
            &DeleteSecret {
                key: key.into(),
                known_hash: expected,
            },
        )
        .await
    }
}
