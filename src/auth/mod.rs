//! Credential checking for the two supported HTTP authentication schemes.
//!
//! Exactly one scheme is active per server. [`Authenticator`] wraps the
//! configured one and hides the difference from the request handler.
//!
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use http::{HeaderMap, HeaderValue, Method, Uri};
use serde::{Deserialize, Serialize};

use crate::errors::{AuthError, AuthResult, ConfigError, HashError};
use crate::users::UserDirectory;

pub mod basic;
pub mod digest;

pub use basic::BasicAuthenticator;
pub use digest::DigestAuthenticator;

/// The realm of every challenge. Digest `HA1` values are bound to it.
pub const REALM: &str = "WebDAV";

/// Which HTTP authentication scheme the server speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Basic,
    Digest,
}

impl FromStr for AuthMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<AuthMode, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(AuthMode::Basic),
            "digest" => Ok(AuthMode::Digest),
            _ => Err(ConfigError::InvalidAuthType(s.to_string())),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Basic => f.write_str("basic"),
            AuthMode::Digest => f.write_str("digest"),
        }
    }
}

/// The authenticator of the configured [`AuthMode`].
#[derive(Debug, Clone)]
pub enum Authenticator {
    Basic(BasicAuthenticator),
    Digest(DigestAuthenticator),
}

impl Authenticator {
    pub fn new(mode: AuthMode, users: Arc<dyn UserDirectory>) -> Result<Authenticator, HashError> {
        Ok(match mode {
            AuthMode::Basic => Authenticator::Basic(BasicAuthenticator::new(users)?),
            AuthMode::Digest => Authenticator::Digest(DigestAuthenticator::new(users)),
        })
    }

    pub fn mode(&self) -> AuthMode {
        match self {
            Authenticator::Basic(_) => AuthMode::Basic,
            Authenticator::Digest(_) => AuthMode::Digest,
        }
    }

    /// `WWW-Authenticate` value for a 401 response.
    pub fn challenge(&self) -> HeaderValue {
        match self {
            Authenticator::Basic(a) => a.challenge(),
            Authenticator::Digest(a) => a.challenge(),
        }
    }

    /// Check the `Authorization` header of a request and return the username.
    ///
    /// Basic mode runs bcrypt, so this may block for a while.
    pub fn authenticate(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> AuthResult<String> {
        match self {
            Authenticator::Basic(a) => {
                let (username, password) = BasicAuthenticator::credentials(headers)?;
                a.authenticate(&username, &password)
            }
            Authenticator::Digest(a) => {
                let header = headers
                    .get(http::header::AUTHORIZATION)
                    .ok_or(AuthError::MissingCredentials)?
                    .to_str()
                    .map_err(|_| AuthError::MalformedHeader)?;
                let target = uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or_else(|| uri.path());
                a.authenticate(header, method.as_str(), target)
            }
        }
    }
}
