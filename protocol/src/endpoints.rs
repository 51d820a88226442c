use {
    crate::SecretHash,
    serde::{Deserialize, Serialize},
};

/// Trait describing a valid request type.
pub trait RequestToResponse {
    /// Expected response type.
    type Response;
    /// URL of the endpoint that accepts this request type.
    const PATH: &'static str;
}

/// Implement `RequestToResponse` for a request type.
macro_rules! response_type {
    ($request:ty, $response:ty) => {
        impl RequestToResponse for $request {
            type Response = $response;
            const PATH: &'static str = concat!("/api/v1/", stringify!($request));
        }
    };
}

pub type Response<Request> = <Request as RequestToResponse>::Response;

/// Registers a new user. No authentication required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signup {
    pub username: String,
    pub password: String,
}

response_type!(Signup, ());

/// Verifies the credentials and issues a bearer token.
/// No authentication required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

response_type!(Login, LoginResponse);

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Returns the key and ciphertext hash of every secret stored for the
/// authenticated user. No ciphertext bodies are returned.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListHashes;

response_type!(ListHashes, Vec<KeyHash>);

/// One entry in a `ListHashes` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyHash {
    pub key: String,
    pub hash: SecretHash,
}

/// Returns the stored ciphertext and its hash for the specified key.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetSecret {
    pub key: String,
}

response_type!(GetSecret, SecretRecord);

#[derive(Debug, Serialize, Deserialize)]
pub struct SecretRecord {
    pub data: Vec<u8>,
    pub hash: SecretHash,
}

/// Stores a ciphertext under the specified key.
///
/// A zero `known_hash` asserts that no record exists yet; any other value
/// asserts that the currently stored hash equals it. The request fails with
/// a conflict and no state change otherwise.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutSecret {
    pub key: String,
    pub data: Vec<u8>,
    pub known_hash: SecretHash,
}

response_type!(PutSecret, ());

/// Deletes the record under the specified key, provided the stored hash
/// equals `known_hash`. A missing record also reports a conflict.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteSecret {
    pub key: String,
    pub known_hash: SecretHash,
}

response_type!(DeleteSecret, ());
