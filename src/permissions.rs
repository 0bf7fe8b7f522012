//! Path based authorization.
//!
//! The rules, in order:
//!
//! - unknown users are denied,
//! - admins may access everything,
//! - jailed users may only access their own `root`,
//! - everybody else may access everything except the `root` of another user.
//!
//! Paths are compared case-sensitively, as plain strings.
//!
use std::sync::Arc;

use crate::users::UserDirectory;

/// Decides whether a user may touch a path.
///
/// The user is looked up again on every call, so removing a user from the
/// directory revokes access immediately, whatever sessions are still around.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    users: Arc<dyn UserDirectory>,
}

impl AccessPolicy {
    pub fn new(users: Arc<dyn UserDirectory>) -> AccessPolicy {
        AccessPolicy { users }
    }

    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        &self.users
    }

    pub fn has_permission(&self, path: &str, username: &str) -> bool {
        let user = match self.users.get_user(username) {
            Some(user) => user,
            None => {
                debug!("permission check for unknown user {username}");
                return false;
            }
        };
        if user.admin {
            return true;
        }
        if user.jail {
            return is_sub_path(&user.root, path);
        }

        let users = self.users.all_users();
        let foreign = users.iter().find(|(name, other)| {
            name.as_str() != username && !other.root.is_empty() && is_sub_path(&other.root, path)
        });
        match foreign {
            Some((owner, _)) => {
                trace!("{path} belongs to {owner}, denied for {username}");
                false
            }
            None => true,
        }
    }
}

/// Is `child` equal to or below `parent`?
///
/// Both sides get exactly one trailing `/` before a literal prefix test,
/// so `/home/u1` contains `/home/u1` and `/home/u1/x` but not `/home/u10`.
pub fn is_sub_path(parent: &str, child: &str) -> bool {
    let parent = with_trailing_slash(parent);
    let child = with_trailing_slash(child);
    child.starts_with(&parent)
}

fn with_trailing_slash(path: &str) -> String {
    let mut path = path.trim_end_matches('/').to_string();
    path.push('/');
    path
}
