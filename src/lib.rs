//! ## Authenticating WebDAV gate
//!
//! This library puts authentication and per-user path authorization in
//! front of a [`dav_server`] handler. A request goes through these steps:
//!
//! - a session cookie (`webdav_auth`) is looked up in the [session store][SessionStore],
//! - without a valid session, the credentials are checked by the configured
//!   [authenticator][Authenticator] (HTTP Basic against bcrypt hashes, or
//!   HTTP Digest with `qop=auth`) and a new session cookie is issued,
//! - the request is served by a `DavHandler` over [`AuthorizedFs`], a guarded
//!   filesystem that gets the username as its credentials and asks the
//!   [access policy][AccessPolicy] before every filesystem operation.
//!
//! Failed authentication is a `401` with a fresh challenge. A user who is
//! authenticated but not allowed on a path gets a `403` for that operation.
//!
//! ## Access policy.
//!
//! - admins may access everything,
//! - jailed users may only access their own root directory,
//! - everybody else may access everything except another user's root.
//!
//! ## Backend interfaces.
//!
//! - users come from a [`UserDirectory`]; [`MemUserDirectory`] is the in-memory one.
//! - sessions live in a [`SessionStore`]; [`MemSessionStore`] is the in-memory one.
//! - the files are served by any `dav_server` filesystem (`LocalFs`, `MemFs`).
//!
//! ## Example.
//!
//! Serve `/tmp` to a single user with hyper.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::convert::Infallible;
//!
//! use hyper::service::service_fn;
//! use hyper_util::rt::{TokioExecutor, TokioIo};
//! use hyper_util::server::conn::auto;
//! use webdav_gate::{AuthMode, FileSystem, MemUserDirectory, UserEntry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let entries = BTreeMap::from([(
//!         "ann".to_string(),
//!         UserEntry { password: "secret".into(), root: "/ann".into(), ..Default::default() },
//!     )]);
//!     let users = MemUserDirectory::provision(&entries, AuthMode::Basic)?;
//!     let handler = webdav_gate::AuthHandler::builder(users)
//!         .filesystem(FileSystem::local("/tmp", false))
//!         .build()?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:4918").await?;
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!         let handler = handler.clone();
//!         tokio::spawn(async move {
//!             let service = service_fn(move |req| {
//!                 let handler = handler.clone();
//!                 async move { Ok::<_, Infallible>(handler.handle(req).await) }
//!             });
//!             let _ = auto::Builder::new(TokioExecutor::new())
//!                 .serve_connection(TokioIo::new(stream), service)
//!                 .await;
//!         });
//!     }
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod authhandler;
mod errors;
mod util;

pub mod auth;
pub mod config;
pub mod fs;
pub mod hash;
pub mod permissions;
pub mod session;
pub mod users;

pub use crate::auth::{AuthMode, Authenticator, REALM};
pub use crate::authhandler::cookie::SESSION_COOKIE;
pub use crate::authhandler::{AuthBuilder, AuthHandler, AuthOutcome, FileSystem, LockSystem};
pub use crate::config::Config;
pub use crate::errors::{AuthError, AuthResult, ConfigError, HashError};
pub use crate::fs::{AuthorizedFs, Identity};
pub use crate::permissions::AccessPolicy;
pub use crate::session::{MemSessionStore, Session, SessionStore};
pub use crate::users::{Credential, MemUserDirectory, User, UserDirectory, UserEntry};
pub use crate::util::DavMethod;
