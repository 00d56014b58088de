use thiserror::Error;

#[derive(Debug, Error)]
pub enum JoseError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("no key with kid {0} in key set")]
    UnknownKid(String),
    #[error("token header carries no kid")]
    MissingKid,
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type JoseResult<T> = Result<T, JoseError>;
