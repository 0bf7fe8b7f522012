//! Filesystem wrapper that applies the access policy.
//!
//! [`AuthorizedFs`] is a `GuardedFileSystem` whose credentials are the
//! username bound to the request. Every call is checked against
//! [`AccessPolicy`] before it reaches the wrapped filesystem. A denied call
//! fails with `FsError::Forbidden`, which the WebDAV handler turns into a 403.
//!
//! A request without a user (one that was let through unauthenticated)
//! is denied everything.

use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use dav_server::davpath::DavPath;
use dav_server::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, DavProp, FsError, FsFuture, FsResult,
    FsStream, GuardedFileSystem, OpenOptions, ReadDirMeta,
};
use futures_util::{future, Future, FutureExt, StreamExt};
use http::StatusCode;
use percent_encoding::percent_decode_str;

use crate::permissions::AccessPolicy;

/// Credentials of a request: the authenticated username, if any.
pub type Identity = Option<String>;

/// A `GuardedFileSystem` that only lets a user touch what the policy allows.
#[derive(Clone)]
pub struct AuthorizedFs {
    inner: Arc<dyn DavFileSystem + Send + Sync>,
    policy: AccessPolicy,
}

impl std::fmt::Debug for AuthorizedFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedFs")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AuthorizedFs {
    /// Wrap `inner`.
    pub fn new(inner: Box<dyn DavFileSystem + Send + Sync>, policy: AccessPolicy) -> AuthorizedFs {
        AuthorizedFs {
            inner: Arc::from(inner),
            policy,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    fn allowed(&self, path: &str, user: &Identity) -> bool {
        match user {
            Some(username) => self.policy.has_permission(path, username),
            None => false,
        }
    }

    fn check(&self, davpath: &DavPath, user: &Identity) -> FsResult<()> {
        let path = decode(davpath);
        if self.allowed(&path, user) {
            Ok(())
        } else {
            debug!(
                "FS: {} denied access to {path}",
                user.as_deref().unwrap_or("anonymous")
            );
            Err(FsError::Forbidden)
        }
    }
}

/// The percent-decoded path below the prefix, e.g. `/Users/ann/notes.txt`.
pub(crate) fn decode(path: &DavPath) -> String {
    percent_decode_str(&path.as_url_string())
        .decode_utf8_lossy()
        .into_owned()
}

fn join(parent: &str, name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    format!("{}/{name}", parent.trim_end_matches('/'))
}

impl GuardedFileSystem<Identity> for AuthorizedFs {
    fn open<'a>(
        &'a self,
        path: &'a DavPath,
        options: OpenOptions,
        user: &'a Identity,
    ) -> FsFuture<'a, Box<dyn DavFile>> {
        async move {
            trace!("FS: open {path:?}");
            self.check(path, user)?;
            self.inner.open(path, options).await
        }
        .boxed()
    }

    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        meta: ReadDirMeta,
        user: &'a Identity,
    ) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        async move {
            trace!("FS: read_dir {path:?}");
            self.check(path, user)?;
            let entries = self.inner.read_dir(path, meta).await?;

            // hide what the user could not open anyway.
            let parent = decode(path);
            let (this, user) = (self.clone(), user.clone());
            let entries = entries.filter(move |entry| {
                let keep = match entry {
                    Ok(entry) => this.allowed(&join(&parent, &entry.name()), &user),
                    Err(_) => true,
                };
                future::ready(keep)
            });
            Ok(Box::pin(entries) as FsStream<_>)
        }
        .boxed()
    }

    fn metadata<'a>(
        &'a self,
        path: &'a DavPath,
        user: &'a Identity,
    ) -> FsFuture<'a, Box<dyn DavMetaData>> {
        async move {
            self.check(path, user)?;
            self.inner.metadata(path).await
        }
        .boxed()
    }

    fn symlink_metadata<'a>(
        &'a self,
        path: &'a DavPath,
        user: &'a Identity,
    ) -> FsFuture<'a, Box<dyn DavMetaData>> {
        async move {
            self.check(path, user)?;
            self.inner.symlink_metadata(path).await
        }
        .boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath, user: &'a Identity) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_dir {path:?}");
            self.check(path, user)?;
            self.inner.create_dir(path).await
        }
        .boxed()
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath, user: &'a Identity) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_dir {path:?}");
            self.check(path, user)?;
            self.inner.remove_dir(path).await
        }
        .boxed()
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath, user: &'a Identity) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_file {path:?}");
            self.check(path, user)?;
            self.inner.remove_file(path).await
        }
        .boxed()
    }

    fn rename<'a>(
        &'a self,
        from: &'a DavPath,
        to: &'a DavPath,
        user: &'a Identity,
    ) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: rename {from:?} {to:?}");
            self.check(from, user)?;
            self.check(to, user)?;
            self.inner.rename(from, to).await
        }
        .boxed()
    }

    fn copy<'a>(
        &'a self,
        from: &'a DavPath,
        to: &'a DavPath,
        user: &'a Identity,
    ) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: copy {from:?} {to:?}");
            self.check(from, user)?;
            self.check(to, user)?;
            self.inner.copy(from, to).await
        }
        .boxed()
    }

    fn set_accessed<'a>(
        &'a self,
        path: &'a DavPath,
        tm: SystemTime,
        user: &Identity,
    ) -> FsFuture<'a, ()> {
        // `user` does not live for 'a here.
        let checked = self.check(path, user);
        async move {
            checked?;
            self.inner.set_accessed(path, tm).await
        }
        .boxed()
    }

    fn set_modified<'a>(
        &'a self,
        path: &'a DavPath,
        tm: SystemTime,
        user: &'a Identity,
    ) -> FsFuture<'a, ()> {
        async move {
            self.check(path, user)?;
            self.inner.set_modified(path, tm).await
        }
        .boxed()
    }

    fn have_props<'a>(
        &'a self,
        path: &'a DavPath,
        user: &'a Identity,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        async move {
            if self.check(path, user).is_err() {
                return false;
            }
            self.inner.have_props(path).await
        }
        .boxed()
    }

    fn patch_props<'a>(
        &'a self,
        path: &'a DavPath,
        patch: Vec<(bool, DavProp)>,
        user: &'a Identity,
    ) -> FsFuture<'a, Vec<(StatusCode, DavProp)>> {
        async move {
            trace!("FS: patch_props {path:?}");
            self.check(path, user)?;
            self.inner.patch_props(path, patch).await
        }
        .boxed()
    }

    fn get_props<'a>(
        &'a self,
        path: &'a DavPath,
        do_content: bool,
        user: &'a Identity,
    ) -> FsFuture<'a, Vec<DavProp>> {
        async move {
            self.check(path, user)?;
            self.inner.get_props(path, do_content).await
        }
        .boxed()
    }

    fn get_prop<'a>(
        &'a self,
        path: &'a DavPath,
        prop: DavProp,
        user: &'a Identity,
    ) -> FsFuture<'a, Vec<u8>> {
        async move {
            self.check(path, user)?;
            self.inner.get_prop(path, prop).await
        }
        .boxed()
    }

    fn get_quota<'a>(&'a self, user: &'a Identity) -> FsFuture<'a, (u64, Option<u64>)> {
        async move {
            if user.is_none() {
                return Err(FsError::Forbidden);
            }
            self.inner.get_quota().await
        }
        .boxed()
    }
}
