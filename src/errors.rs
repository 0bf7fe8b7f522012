use std::io;
use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

/// Why a request could not be authenticated.
///
/// The variants exist for the log; on the wire every one of them turns
/// into the same `401` with a fresh challenge.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credentials supplied")]
    MissingCredentials,
    #[error("malformed authorization header")]
    MalformedHeader,
    #[error("unexpected realm {0:?}")]
    RealmMismatch(String),
    #[error("unknown user {0:?}")]
    UnknownUser(String),
    #[error("invalid credentials for user {0:?}")]
    InvalidCredentials(String),
    #[error("credential verification task failed")]
    Verification,
}

impl AuthError {
    pub fn statuscode(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

/// Failure of the one-way password hash.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("bcrypt: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

/// Errors while loading the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown auth type {0:?} (expected \"basic\" or \"digest\")")]
    InvalidAuthType(String),
    #[error("unknown method {0:?} in exempt_methods")]
    InvalidMethod(String),
    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("cannot provision user {username:?}: {source}")]
    Provision {
        username: String,
        #[source]
        source: HashError,
    },
}

pub type AuthResult<T> = Result<T, AuthError>;
