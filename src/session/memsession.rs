//! Simple in-memory session store.
//!
//! Sessions are kept in a mutex-protected hashmap keyed by token.
//! Nothing is persisted; a restart logs everybody out.
//!
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use uuid::Uuid;

use super::{Session, SessionStore, DEFAULT_SESSION_TTL};

/// Ephemeral in-memory session store.
#[derive(Debug)]
pub struct MemSessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemSessionStore {
    /// Create a new "memsession" store with the default TTL.
    pub fn new() -> Arc<MemSessionStore> {
        MemSessionStore::with_ttl(DEFAULT_SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Arc<MemSessionStore> {
        Arc::new(MemSessionStore {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a session under a caller-chosen token.
    pub fn insert(&self, token: impl Into<String>, session: Session) {
        self.sessions.lock().insert(token.into(), session);
    }

    fn new_token() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

impl SessionStore for MemSessionStore {
    fn create(&self, username: &str) -> (String, Session) {
        let session = Session::new(username, self.ttl);
        let mut sessions = self.sessions.lock();
        let mut token = Self::new_token();
        while sessions.contains_key(&token) {
            token = Self::new_token();
        }
        sessions.insert(token.clone(), session.clone());
        trace!("session created for {username}");
        (token, session)
    }

    fn lookup(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get(token)?;
        if session.is_expired() {
            debug!("session of {} expired, removing", session.username);
            sessions.remove(token);
            return None;
        }
        Some(session.clone())
    }

    fn remove(&self, token: &str) {
        self.sessions.lock().remove(token);
    }

    fn prune_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at >= now);
        before - sessions.len()
    }

    fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn expired(username: &str) -> Session {
        Session {
            username: username.to_string(),
            expires_at: SystemTime::now() - Duration::from_secs(1),
        }
    }

    #[test]
    fn test_roundtrip() {
        let store = MemSessionStore::new();
        let (token, session) = store.create("u1");
        assert_eq!(session.username, "u1");
        assert!(!session.is_expired());

        let found = store.lookup(&token).unwrap();
        assert_eq!(found.username, "u1");
        assert!(!found.is_expired());
        assert_eq!(found, session);
    }

    #[test]
    fn test_token_shape() {
        let store = MemSessionStore::new();
        let (a, _) = store.create("u1");
        let (b, _) = store.create("u1");
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_default_ttl() {
        let store = MemSessionStore::new();
        assert_eq!(store.ttl(), DEFAULT_SESSION_TTL);
        let (_, session) = store.create("u1");
        let left = session
            .expires_at
            .duration_since(SystemTime::now())
            .unwrap();
        assert!(left > DEFAULT_SESSION_TTL - Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_token() {
        let store = MemSessionStore::new();
        assert!(store.lookup("nope").is_none());
        store.remove("nope");
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_removed_on_lookup() {
        let store = MemSessionStore::new();
        store.insert("old", expired("u1"));
        assert_eq!(store.len(), 1);
        assert!(store.lookup("old").is_none());
        assert_eq!(store.len(), 0);
        assert!(store.lookup("old").is_none());
    }

    #[test]
    fn test_remove_idempotent() {
        let store = MemSessionStore::new();
        let (token, _) = store.create("u1");
        store.remove(&token);
        store.remove(&token);
        assert!(store.lookup(&token).is_none());
    }

    #[test]
    fn test_prune() {
        let store = MemSessionStore::new();
        store.insert("a", expired("u1"));
        store.insert("b", expired("u2"));
        let (live, _) = store.create("u3");
        assert_eq!(store.prune_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.lookup(&live).is_some());
        assert_eq!(store.prune_expired(), 0);
    }

    #[test]
    fn test_concurrent_create() {
        const N: usize = 64;
        let store = MemSessionStore::new();
        let tokens: Vec<(String, String)> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..N)
                .map(|i| {
                    let store = &store;
                    s.spawn(move || {
                        let name = format!("user{i}");
                        let (token, _) = store.create(&name);
                        (name, token)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let distinct: HashSet<_> = tokens.iter().map(|(_, t)| t.clone()).collect();
        assert_eq!(distinct.len(), N);
        assert_eq!(store.len(), N);
        for (name, token) in &tokens {
            assert_eq!(&store.lookup(token).unwrap().username, name);
        }
    }
}
