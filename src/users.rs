//! User directory.
//!
//! The authentication and authorization code only ever reads users through
//! the [`UserDirectory`] trait. [`MemUserDirectory`] is the in-memory
//! implementation the server builds from its configuration file.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthMode, REALM};
use crate::errors::{ConfigError, HashError};
use crate::hash;

/// Stored secret of a user, tagged with the scheme that can check it.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// bcrypt hash, checked by the Basic authenticator.
    BasicHash(String),
    /// Precomputed `MD5(username:realm:password)`, checked by the Digest authenticator.
    DigestHa1(String),
}

impl Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::BasicHash(_) => f.write_str("BasicHash(..)"),
            Credential::DigestHa1(_) => f.write_str("DigestHa1(..)"),
        }
    }
}

/// Identity and policy record of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub credential: Credential,
    /// Bypasses every path check.
    pub admin: bool,
    /// Confines the user to `root`.
    pub jail: bool,
    /// Home directory in the DAV namespace, empty if none.
    pub root: String,
    /// Directories to create below `root`. Not used for access decisions.
    pub sub_directories: Vec<String>,
}

/// A user as written in the configuration file.
///
/// `password` is a bcrypt hash, a digest `HA1`, or a plaintext seed,
/// depending on the auth mode. See [`UserEntry::provision`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserEntry {
    pub password: String,
    pub admin: bool,
    pub jail: bool,
    pub root: String,
    #[serde(rename = "subdirectories")]
    pub sub_directories: Vec<String>,
}

impl UserEntry {
    /// Turn the configured password into the credential `mode` checks.
    ///
    /// Basic mode hashes plaintext with bcrypt and keeps existing hashes.
    /// Digest mode keeps a 32-hex-digit `HA1` and derives one from anything else.
    pub fn provision(&self, username: &str, mode: AuthMode) -> Result<User, HashError> {
        let credential = match mode {
            AuthMode::Basic if hash::looks_hashed(&self.password) => {
                Credential::BasicHash(self.password.clone())
            }
            AuthMode::Basic => {
                info!("hashing password for user {username}");
                Credential::BasicHash(hash::hash_password(&self.password)?)
            }
            AuthMode::Digest if hash::looks_like_ha1(&self.password) => {
                Credential::DigestHa1(self.password.to_ascii_lowercase())
            }
            AuthMode::Digest => {
                info!("deriving digest credential for user {username}");
                Credential::DigestHa1(hash::digest_ha1(username, REALM, &self.password))
            }
        };
        Ok(User {
            credential,
            admin: self.admin,
            jail: self.jail,
            root: self.root.clone(),
            sub_directories: self.sub_directories.clone(),
        })
    }
}

/// Lookup of users by name.
///
/// Implementations must be safe to read while another thread writes:
/// readers see either the old or the new state, never a mix.
pub trait UserDirectory: Debug + Send + Sync {
    fn has_user(&self, username: &str) -> bool {
        self.get_user(username).is_some()
    }

    fn get_user(&self, username: &str) -> Option<User>;

    /// Consistent snapshot of all users.
    fn all_users(&self) -> Arc<HashMap<String, User>>;

    /// Insert or replace a user.
    fn update_user(&self, username: &str, user: User);

    /// Remove a user, returning it if it existed.
    fn remove_user(&self, username: &str) -> Option<User>;
}

/// In-memory, copy-on-write user directory.
#[derive(Debug, Default)]
pub struct MemUserDirectory {
    users: RwLock<Arc<HashMap<String, User>>>,
}

impl MemUserDirectory {
    pub fn new() -> Arc<MemUserDirectory> {
        Arc::new(MemUserDirectory::default())
    }

    pub fn from_users(users: HashMap<String, User>) -> Arc<MemUserDirectory> {
        Arc::new(MemUserDirectory {
            users: RwLock::new(Arc::new(users)),
        })
    }

    /// Provision every configured user for `mode`.
    ///
    /// Fails on the first user whose credential cannot be produced.
    pub fn provision<'a, I>(entries: I, mode: AuthMode) -> Result<Arc<MemUserDirectory>, ConfigError>
    where
        I: IntoIterator<Item = (&'a String, &'a UserEntry)>,
    {
        let mut users = HashMap::new();
        for (name, entry) in entries {
            let user = entry
                .provision(name, mode)
                .map_err(|source| ConfigError::Provision {
                    username: name.clone(),
                    source,
                })?;
            users.insert(name.clone(), user);
        }
        Ok(MemUserDirectory::from_users(users))
    }

    fn modify<R>(&self, f: impl FnOnce(&mut HashMap<String, User>) -> R) -> R {
        let mut guard = self.users.write();
        let mut next = HashMap::clone(&guard);
        let r = f(&mut next);
        *guard = Arc::new(next);
        r
    }
}

impl UserDirectory for MemUserDirectory {
    fn get_user(&self, username: &str) -> Option<User> {
        self.users.read().get(username).cloned()
    }

    fn all_users(&self) -> Arc<HashMap<String, User>> {
        self.users.read().clone()
    }

    fn update_user(&self, username: &str, user: User) {
        self.modify(|users| users.insert(username.to_string(), user));
    }

    fn remove_user(&self, username: &str) -> Option<User> {
        self.modify(|users| users.remove(username))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn user(root: &str, admin: bool, jail: bool) -> User {
        User {
            credential: Credential::BasicHash(String::new()),
            admin,
            jail,
            root: root.to_string(),
            sub_directories: Vec::new(),
        }
    }

    #[test]
    fn test_provision_basic() {
        let entry = UserEntry {
            password: "secret".into(),
            root: "/Users/u1".into(),
            sub_directories: vec!["documents".into()],
            ..Default::default()
        };
        let user = entry.provision("u1", AuthMode::Basic).unwrap();
        match &user.credential {
            Credential::BasicHash(h) => {
                assert!(hash::looks_hashed(h));
                assert!(hash::verify_password(h, "secret"));
            }
            other => panic!("unexpected credential {other:?}"),
        }
        assert_eq!(user.root, "/Users/u1");
        assert_eq!(user.sub_directories, vec!["documents".to_string()]);

        // already hashed values are kept as they are.
        let Credential::BasicHash(h) = user.credential else {
            unreachable!()
        };
        let again = UserEntry {
            password: h.clone(),
            ..Default::default()
        };
        let user = again.provision("u1", AuthMode::Basic).unwrap();
        assert_eq!(user.credential, Credential::BasicHash(h));
    }

    #[test]
    fn test_provision_digest() {
        let plain = UserEntry {
            password: "testpassword".into(),
            ..Default::default()
        };
        let user = plain.provision("testuser", AuthMode::Digest).unwrap();
        let ha1 = hash::digest_ha1("testuser", REALM, "testpassword");
        assert_eq!(user.credential, Credential::DigestHa1(ha1.clone()));

        let pre = UserEntry {
            password: ha1.to_uppercase(),
            ..Default::default()
        };
        let user = pre.provision("testuser", AuthMode::Digest).unwrap();
        assert_eq!(user.credential, Credential::DigestHa1(ha1));
    }

    #[test]
    fn test_credential_debug_hides_secret() {
        let c = Credential::DigestHa1("939e7578ed9e3c518a452acee763bce9".into());
        assert_eq!(format!("{c:?}"), "DigestHa1(..)");
    }

    #[test]
    fn test_snapshot_isolation() {
        let dir = MemUserDirectory::new();
        dir.update_user("u1", user("/home/u1", false, false));
        let snapshot = dir.all_users();
        dir.update_user("u2", user("/home/u2", false, false));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(dir.all_users().len(), 2);
        assert!(dir.has_user("u2"));

        assert!(dir.remove_user("u1").is_some());
        assert!(dir.remove_user("u1").is_none());
        assert!(!dir.has_user("u1"));
        assert!(snapshot.contains_key("u1"));
    }
}
