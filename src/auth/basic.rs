use std::sync::Arc;

use headers::authorization::Basic;
use headers::{Authorization, HeaderMapExt};
use http::{HeaderMap, HeaderValue};

use crate::errors::{AuthError, AuthResult, HashError};
use crate::hash;
use crate::users::{Credential, UserDirectory};

const DUMMY_PASSWORD: &str = "dummy password for unknown users";

/// HTTP Basic authentication against bcrypt hashes.
#[derive(Debug, Clone)]
pub struct BasicAuthenticator {
    users: Arc<dyn UserDirectory>,
    // checked for unknown users so that they cost as much as a wrong password.
    dummy_hash: Arc<String>,
}

impl BasicAuthenticator {
    pub fn new(users: Arc<dyn UserDirectory>) -> Result<BasicAuthenticator, HashError> {
        let dummy_hash = hash::hash_password(DUMMY_PASSWORD)?;
        Ok(BasicAuthenticator {
            users,
            dummy_hash: Arc::new(dummy_hash),
        })
    }

    /// The `WWW-Authenticate` value sent with a 401.
    pub fn challenge(&self) -> HeaderValue {
        HeaderValue::from_static(r#"Basic realm="WebDAV""#)
    }

    /// Check a username/password pair.
    ///
    /// This runs bcrypt and is slow on purpose; call it off the async executor.
    pub fn authenticate(&self, username: &str, password: &str) -> AuthResult<String> {
        let user = match self.users.get_user(username) {
            Some(user) => user,
            None => {
                let _ = hash::verify_password(&self.dummy_hash, password);
                return Err(AuthError::UnknownUser(username.to_string()));
            }
        };
        match &user.credential {
            Credential::BasicHash(hashed) if hash::verify_password(hashed, password) => {
                Ok(username.to_string())
            }
            Credential::BasicHash(_) => Err(AuthError::InvalidCredentials(username.to_string())),
            Credential::DigestHa1(_) => {
                warn!("user {username} has a digest credential but basic auth is active");
                Err(AuthError::InvalidCredentials(username.to_string()))
            }
        }
    }

    /// Pull the username and password out of an `Authorization: Basic` header.
    pub fn credentials(headers: &HeaderMap) -> AuthResult<(String, String)> {
        if !headers.contains_key(http::header::AUTHORIZATION) {
            return Err(AuthError::MissingCredentials);
        }
        match headers.typed_get::<Authorization<Basic>>() {
            Some(Authorization(basic)) => {
                Ok((basic.username().to_string(), basic.password().to_string()))
            }
            None => Err(AuthError::MalformedHeader),
        }
    }
}
