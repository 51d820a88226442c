use {
    crate::{
        auth::UserService,
        db::{Database, PgDatabase},
    },
    anyhow::{anyhow, bail, Result},
    bytes::Bytes,
    http_body_util::{BodyExt, Full},
    hyper::{
        body::Incoming, header::AUTHORIZATION, server::conn::http1, service::service_fn, Method,
        Request, Response, StatusCode,
    },
    hyper_util::rt::TokioIo,
    hoard_protocol::{
        encoding,
        endpoints::{
            DeleteSecret, GetSecret, ListHashes, Login, PutSecret, RequestToResponse, Signup,
        },
        WireError,
    },
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    std::{convert::Infallible, future::Future, net::SocketAddr, sync::Arc},
    tokio::net::TcpListener,
    tracing::{info, warn},
};

pub mod auth;
pub mod db;
pub mod handler;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Token signing key; freshly generated at startup when absent, which
    /// invalidates outstanding tokens on restart.
    pub token_signing_key: Option<String>,
}

#[derive(Clone)]
struct SvcContext {
    db: Arc<dyn Database>,
    users: Arc<UserService>,
}

pub async fn run(config: Config) -> Result<()> {
    let db = Arc::new(PgDatabase::connect(&config.database_url).await?);
    let users = Arc::new(UserService::new(
        db.clone() as Arc<dyn Database>,
        config.token_signing_key.as_deref(),
    ));
    let listener = TcpListener::bind(&config.bind_addr).await?;
    serve(listener, db, users).await
}

/// Accept loop over an already-bound listener; split out of [`run`] so tests
/// can inject their own storage.
pub async fn serve(
    listener: TcpListener,
    db: Arc<dyn Database>,
    users: Arc<UserService>,
) -> Result<()> {
    info!("secret service listening on {}", listener.local_addr()?);
    let ctx = SvcContext { db, users };

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let served = http1::Builder::new()
                        .keep_alive(true)
                        .serve_connection(
                            TokioIo::new(stream),
                            service_fn(move |req| handle_request(ctx.clone(), req)),
                        )
                        .await;
                    if let Err(err) = served {
                        warn!(%err, %peer, "connection ended with an error");
                    }
                });
            }
            Err(err) => warn!(%err, "accept failed"),
        }
    }
}

async fn handle_request(
    ctx: SvcContext,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(ctx, request).await.unwrap_or_else(status_response))
}

/// Plain-status reply for everything that fails before reaching a handler.
fn status_response(code: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(format!("{code}\n"))));
    *response.status_mut() = code;
    response
}

async fn route(
    ctx: SvcContext,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, StatusCode> {
    if request.method() != Method::POST {
        return Err(StatusCode::NOT_FOUND);
    }
    let path = request.uri().path().to_owned();

    // the two account endpoints are reachable without a token
    if path == Signup::PATH {
        let users = ctx.users.clone();
        return reply(request, move |req: Signup| async move {
            handler::signup(&users, req).await
        })
        .await;
    }
    if path == Login::PATH {
        let users = ctx.users.clone();
        return reply(request, move |req: Login| async move {
            handler::login(&users, req).await
        })
        .await;
    }

    let username = bearer_username(&ctx, &request).map_err(|err| {
        warn!(%err, "rejected request");
        StatusCode::UNAUTHORIZED
    })?;
    let hctx = handler::Context {
        db: ctx.db.clone(),
        username,
    };

    if path == ListHashes::PATH {
        reply(request, move |req: ListHashes| async move {
            handler::list_hashes(hctx, req).await
        })
        .await
    } else if path == GetSecret::PATH {
        reply(request, move |req: GetSecret| async move {
            handler::get_secret(hctx, req).await
        })
        .await
    } else if path == PutSecret::PATH {
        reply(request, move |req: PutSecret| async move {
            handler::put_secret(hctx, req).await
        })
        .await
    } else if path == DeleteSecret::PATH {
        reply(request, move |req: DeleteSecret| async move {
            handler::delete_secret(hctx, req).await
        })
        .await
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// Decodes the request body, runs the handler and encodes its outcome.
/// Handler failures ride inside the 200 response body; only malformed
/// requests produce an HTTP-level error.
async fn reply<T, F, Fut>(
    request: Request<Incoming>,
    f: F,
) -> Result<Response<Full<Bytes>>, StatusCode>
where
    T: RequestToResponse + DeserializeOwned,
    T::Response: Serialize,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<T::Response, WireError>>,
{
    let parsed = read_request(request).await?;
    let outcome = f(parsed).await;
    let body = encoding::encode(&outcome).expect("wire encoding of a response cannot fail");
    Ok(Response::new(Full::new(Bytes::from(body))))
}

async fn read_request<T: DeserializeOwned>(request: Request<Incoming>) -> Result<T, StatusCode> {
    let body = match request.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(%err, "could not read body");
            return Err(StatusCode::BAD_REQUEST);
        }
    };
    encoding::decode(&body).map_err(|err| {
        warn!(%err, "body is not a valid request");
        StatusCode::BAD_REQUEST
    })
}

/// Pulls the bearer token out of the `authorization` header and resolves it
/// to a username.
fn bearer_username(ctx: &SvcContext, request: &Request<Incoming>) -> Result<String> {
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        bail!("no credentials supplied");
    };
    let token = header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| anyhow!("unsupported authorization scheme"))?;
    Ok(ctx.users.verify_token(token)?)
}
