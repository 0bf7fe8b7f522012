//! Server configuration.
//!
//! Read from a YAML file with the sections `network`, `content`, `security`
//! and `users`. Every key is optional; a missing file means the built-in
//! default with a single `admin` user. The file is only ever read.
//!
//! Environment variables, when set, win over the file:
//!
//! - `WEBDAV_PORT`: `network.port`
//! - `WEBDAV_DATA_DIR`: `content.dir`
//! - `AUTH_TYPE`: `security.auth_type` (`basic` or `digest`)
//! - `DISABLE_OFFICE_AUTH`: `security.disable_office_auth` (`true` or `1`)
//!
//! `CREATE_ADMIN_USER=0` (or `false`) leaves the admin user out of the
//! built-in default. It does not touch users from a file.
//!
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::auth::AuthMode;
use crate::authhandler::{AuthBuilder, FileSystem, LockSystem};
use crate::errors::ConfigError;
use crate::session::{MemSessionStore, DEFAULT_SESSION_TTL};
use crate::users::{MemUserDirectory, UserEntry};
use crate::util::DavMethod;

/// Where the file is looked for when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/config.yaml";
/// Same, inside the container image (`DOCKER_ENABLED=1`).
pub const DOCKER_CONFIG_PATH: &str = "/etc/webdav/config.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub content: ContentConfig,
    pub security: SecurityConfig,
    pub users: BTreeMap<String, UserEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub address: String,
    #[serde(deserialize_with = "port_from_int_or_str")]
    pub port: u16,
    /// URL prefix the share is mounted at.
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Directory that is served. Empty means an in-memory filesystem.
    pub dir: PathBuf,
    /// `mem`, `fake`, or `null` for no locking.
    pub lock_system: Option<LockSystem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub auth_type: AuthMode,
    /// Methods that skip authentication.
    pub exempt_methods: Vec<String>,
    /// Let "Microsoft Office" user agents through without credentials.
    pub disable_office_auth: bool,
    /// Session lifetime in seconds.
    pub session_ttl: u64,
    /// Seconds between sweeps of expired sessions. Unset: expired
    /// sessions are only dropped when they are presented.
    pub session_sweep_interval: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            address: "0.0.0.0".to_string(),
            port: 8080,
            prefix: "/".to_string(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        ContentConfig {
            dir: PathBuf::from("/var/webdav/data"),
            lock_system: Some(LockSystem::Mem),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            auth_type: AuthMode::Basic,
            exempt_methods: vec!["OPTIONS".to_string(), "HEAD".to_string()],
            disable_office_auth: false,
            session_ttl: DEFAULT_SESSION_TTL.as_secs(),
            session_sweep_interval: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let admin = UserEntry {
            password: "admin".to_string(),
            admin: true,
            jail: false,
            root: "/Users/admin".to_string(),
            sub_directories: vec!["documents".to_string()],
        };
        Config {
            network: NetworkConfig::default(),
            content: ContentConfig::default(),
            security: SecurityConfig::default(),
            users: BTreeMap::from([("admin".to_string(), admin)]),
        }
    }
}

fn port_from_int_or_str<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Int(u16),
        Str(String),
    }
    match Port::deserialize(deserializer)? {
        Port::Int(port) => Ok(port),
        Port::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn env_bool(value: &str) -> bool {
    value == "true" || value == "1"
}

impl Config {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// The file to read when none was given on the command line.
    pub fn default_path() -> PathBuf {
        match std::env::var("DOCKER_ENABLED") {
            Ok(v) if env_bool(&v) => PathBuf::from(DOCKER_CONFIG_PATH),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Load `path` and apply the process environment.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    /// Like [`Config::load`], with the environment looked up through `env`.
    pub fn load_with_env<F>(path: &Path, env: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match std::fs::read_to_string(path) {
            Ok(yaml) => {
                info!("reading configuration from {}", path.display());
                Config::from_yaml(&yaml)?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("{} not found, using the default configuration", path.display());
                let mut config = Config::default();
                if env("CREATE_ADMIN_USER").map_or(false, |v| v == "0" || v == "false") {
                    config.users.clear();
                }
                config
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.apply_env(env)?;
        Ok(config)
    }

    /// Override settings from environment variables.
    pub fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| env(name).filter(|v| !v.is_empty());
        if let Some(port) = var("WEBDAV_PORT") {
            self.network.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "WEBDAV_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(dir) = var("WEBDAV_DATA_DIR") {
            self.content.dir = PathBuf::from(dir);
        }
        if let Some(auth_type) = var("AUTH_TYPE") {
            self.security.auth_type = auth_type.parse()?;
        }
        if let Some(value) = var("DISABLE_OFFICE_AUTH") {
            self.security.disable_office_auth = env_bool(&value);
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.security.session_ttl)
    }

    pub fn session_sweep_interval(&self) -> Option<Duration> {
        self.security
            .session_sweep_interval
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn exempt_methods(&self) -> Result<DavMethod, ConfigError> {
        DavMethod::parse_set(&self.security.exempt_methods)
    }

    /// The filesystem `content.dir` describes.
    pub fn filesystem(&self) -> FileSystem {
        if self.content.dir.as_os_str().is_empty() {
            FileSystem::Mem
        } else {
            FileSystem::local(&self.content.dir, false)
        }
    }

    /// Provision the users and set up a handler builder for this configuration.
    ///
    /// Plaintext passwords are hashed here, which takes a moment per user
    /// in basic mode.
    pub fn handler_builder(&self) -> Result<AuthBuilder, ConfigError> {
        let mode = self.security.auth_type;
        let users = MemUserDirectory::provision(&self.users, mode)?;
        let prefix = self.network.prefix.trim_end_matches('/');
        Ok(AuthBuilder::new(users)
            .auth_mode(mode)
            .filesystem(self.filesystem())
            .locksystem(self.content.lock_system)
            .sessions(MemSessionStore::with_ttl(self.session_ttl()))
            .strip_prefix(prefix)
            .exempt_methods(self.exempt_methods()?)
            .office_exempt(self.security.disable_office_auth))
    }
}
