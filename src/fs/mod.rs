//! Filesystem side of the gate.
//!
//! The storage itself comes from `dav_server` ([`LocalFs`], [`MemFs`], or any
//! other [`DavFileSystem`]). [`AuthorizedFs`] sits in front of it.
//!
//! [`LocalFs`]: dav_server::localfs::LocalFs
//! [`MemFs`]: dav_server::memfs::MemFs
//! [`DavFileSystem`]: dav_server::fs::DavFileSystem
pub mod authorizedfs;

pub use authorizedfs::{AuthorizedFs, Identity};
