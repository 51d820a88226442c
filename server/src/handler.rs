//! Request handlers, one per endpoint. Each maps its inputs through the
//! storage trait and translates storage failures into wire error kinds.

use {
    crate::{
        auth::{AuthError, UserService},
        db::{Database, StoreError},
    },
    hoard_protocol::{
        endpoints::{
            DeleteSecret, GetSecret, KeyHash, ListHashes, Login, LoginResponse, PutSecret,
            SecretRecord, Signup,
        },
        ErrorKind, SecretHash, WireError,
    },
    std::sync::Arc,
    tracing::warn,
};

/// Per-request context for the authenticated endpoints.
#[derive(Clone)]
pub struct Context {
    pub db: Arc<dyn Database>,
    pub username: String,
}

pub async fn signup(users: &UserService, request: Signup) -> Result<(), WireError> {
    match users.register(&request.username, &request.password).await {
        Ok(()) => Ok(()),
        Err(AuthError::AlreadyExists) => Err(WireError::new(
            ErrorKind::AlreadyExists,
            "user already exists",
        )),
        Err(err) => {
            warn!(%err, "signup failed");
            Err(WireError::new(ErrorKind::Internal, "internal error"))
        }
    }
}

pub async fn login(users: &UserService, request: Login) -> Result<LoginResponse, WireError> {
    users
        .login(&request.username, &request.password)
        .await
        .map(|token| LoginResponse { token })
        .map_err(|err| WireError::new(ErrorKind::Unauthenticated, err.to_string()))
}

pub async fn list_hashes(ctx: Context, _request: ListHashes) -> Result<Vec<KeyHash>, WireError> {
    ctx.db
        .list_secrets(&ctx.username)
        .await
        .map_err(store_error)
}

pub async fn get_secret(ctx: Context, request: GetSecret) -> Result<SecretRecord, WireError> {
    let row = ctx
        .db
        .get_secret(&ctx.username, &request.key)
        .await
        .map_err(store_error)?;
    Ok(SecretRecord {
        data: row.data,
        hash: row.hash,
    })
}

pub async fn put_secret(ctx: Context, request: PutSecret) -> Result<(), WireError> {
    // the stored hash is computed here, not trusted from the client
    let hash = SecretHash::digest(&request.data);
    ctx.db
        .put_secret(
            &ctx.username,
            &request.key,
            &request.data,
            hash,
            request.known_hash,
        )
        .await
        .map_err(store_error)
}

pub async fn delete_secret(ctx: Context, request: DeleteSecret) -> Result<(), WireError> {
    ctx.db
        .delete_secret(&ctx.username, &request.key, request.known_hash)
        .await
        .map_err(store_error)
}

fn store_error(err: StoreError) -> WireError {
    match err {
        StoreError::NotFound => WireError::new(ErrorKind::NotFound, "secret not found"),
        StoreError::WrongHash => WireError::new(ErrorKind::Conflict, "wrong hash"),
        StoreError::AlreadyExists => WireError::new(ErrorKind::AlreadyExists, "already exists"),
        StoreError::Other(err) => {
            warn!(%err, "handler error");
            WireError::new(ErrorKind::Internal, "internal error")
        }
    }
}
