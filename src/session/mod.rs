//! Contains the structs and traits that define a session store backend.
//!
//! A session maps an opaque cookie token to the user it was issued to,
//! so a client does not have to re-authenticate on every request.
//!
//! Tokens are only used as lookup keys; the authorization layer still
//! re-resolves the user on every check.
//!
use std::fmt::Debug;
use std::time::{Duration, SystemTime};

pub mod memsession;

pub use memsession::MemSessionStore;

/// Default session lifetime: one year, a "remember me" cookie.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// One authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub expires_at: SystemTime,
}

impl Session {
    pub fn new(username: impl Into<String>, ttl: Duration) -> Session {
        Session {
            username: username.into(),
            expires_at: SystemTime::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < SystemTime::now()
    }
}

/// The trait that defines a session store.
///
/// All methods take `&self`; implementations do their own locking
/// and must be safe to call from many request tasks at once.
pub trait SessionStore: Debug + Send + Sync {
    /// Create a session for `username`. The entry is stored before
    /// the token is returned.
    fn create(&self, username: &str) -> (String, Session);

    /// Look up a token. Expired sessions are removed and reported as a miss.
    fn lookup(&self, token: &str) -> Option<Session>;

    /// Remove a session. Removing an unknown token is a no-op.
    fn remove(&self, token: &str);

    /// Drop all expired sessions, returning how many were removed.
    fn prune_expired(&self) -> usize;

    /// Number of stored sessions, expired ones included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
