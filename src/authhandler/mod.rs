//
// This module contains the main entry point of the library,
// AuthHandler.
//
use std::error::Error as StdError;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Buf;
use dav_server::body::Body;
use dav_server::fakels::FakeLs;
use dav_server::fs::DavFileSystem;
use dav_server::localfs::LocalFs;
use dav_server::ls::DavLockSystem;
use dav_server::memfs::MemFs;
use dav_server::memls::MemLs;
use dav_server::DavConfig;
use headers::HeaderMapExt;
use http::{header, HeaderValue, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthMode, Authenticator};
use crate::errors::{AuthError, HashError};
use crate::fs::{AuthorizedFs, Identity};
use crate::permissions::AccessPolicy;
use crate::session::{MemSessionStore, SessionStore};
use crate::users::UserDirectory;
use crate::util::{dav_method, DavMethod};

pub mod cookie;

lazy_static! {
    static ref OFFICE_USER_AGENT: Regex = Regex::new(r"^Microsoft Office(?: .*)?$").unwrap();
}

/// Storage backend behind the gate.
#[derive(Debug, Clone)]
pub enum FileSystem {
    /// Ephemeral in-memory filesystem.
    Mem,
    /// Serve a local directory.
    Local {
        /// Path to the root directory.
        base: PathBuf,
        public: bool,
        /// Case insensitive file names (Windows)
        case_insensitive: bool,
        /// Macos specific hacks
        macos: bool,
    },
}

impl FileSystem {
    /// Serve a local directory
    pub fn local(path: impl Into<PathBuf>, public: bool) -> Self {
        FileSystem::Local {
            base: path.into(),
            public,
            case_insensitive: false,
            macos: false,
        }
    }

    fn build(self) -> Box<dyn DavFileSystem + Send + Sync> {
        match self {
            FileSystem::Mem => MemFs::new(),
            FileSystem::Local {
                base,
                public,
                case_insensitive,
                macos,
            } => LocalFs::new(base, public, case_insensitive, macos),
        }
    }
}

/// Lock backend, shared by all requests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockSystem {
    #[default]
    Mem,
    Fake,
}

impl LockSystem {
    // clones of the returned box share their lock table.
    fn build(self) -> Box<dyn DavLockSystem> {
        match self {
            LockSystem::Mem => MemLs::new(),
            LockSystem::Fake => FakeLs::new(),
        }
    }
}

/// Configuration of the handler.
#[derive(Debug, Clone)]
pub struct AuthBuilder {
    /// Who may log in, and where they may go.
    users: Arc<dyn UserDirectory>,
    /// Basic or Digest.
    mode: AuthMode,
    /// Filesystem backend.
    fs: FileSystem,
    /// Locksystem backend.
    ls: Option<LockSystem>,
    /// Session store, defaults to a fresh `MemSessionStore`.
    sessions: Option<Arc<dyn SessionStore>>,
    /// Prefix to be stripped off when handling request.
    prefix: String,
    /// Methods that are let through without credentials.
    exempt: DavMethod,
    /// Let "Microsoft Office" user agents through without credentials.
    office_exempt: bool,
}

impl AuthBuilder {
    /// Create a new configuration builder.
    pub fn new(users: Arc<dyn UserDirectory>) -> AuthBuilder {
        Self {
            users,
            mode: AuthMode::default(),
            fs: FileSystem::Mem,
            ls: Some(LockSystem::Mem),
            sessions: None,
            prefix: String::new(),
            exempt: DavMethod::DEFAULT_EXEMPT,
            office_exempt: false,
        }
    }

    /// Use the configuration that was built to generate an AuthHandler.
    ///
    /// Fails only if the bcrypt hash for timing equalization cannot be made.
    pub fn build(self) -> Result<AuthHandler, HashError> {
        let authenticator = Authenticator::new(self.mode, self.users.clone())?;
        let policy = AccessPolicy::new(self.users);
        let mut dav = DavConfig::<Identity>::new()
            .filesystem(Box::new(AuthorizedFs::new(self.fs.build(), policy)))
            .strip_prefix(self.prefix);
        if let Some(ls) = self.ls {
            dav = dav.locksystem(ls.build());
        }
        Ok(AuthHandler {
            authenticator,
            sessions: self
                .sessions
                .unwrap_or_else(|| MemSessionStore::new() as Arc<dyn SessionStore>),
            dav,
            exempt: self.exempt,
            office_exempt: self.office_exempt,
        })
    }

    pub fn auth_mode(self, mode: AuthMode) -> Self {
        let mut this = self;
        this.mode = mode;
        this
    }

    /// Set the filesystem to use.
    pub fn filesystem(self, fs: FileSystem) -> Self {
        let mut this = self;
        this.fs = fs;
        this
    }

    /// Set the locksystem to use. `None` disables locking.
    pub fn locksystem(self, ls: Option<LockSystem>) -> Self {
        let mut this = self;
        this.ls = ls;
        this
    }

    pub fn sessions(self, sessions: Arc<dyn SessionStore>) -> Self {
        let mut this = self;
        this.sessions = Some(sessions);
        this
    }

    /// Prefix to be stripped off before translating the rest of
    /// the request path to a filesystem path.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = prefix.into();
        this
    }

    /// Which methods skip authentication (default `OPTIONS` and `HEAD`).
    pub fn exempt_methods(self, exempt: DavMethod) -> Self {
        let mut this = self;
        this.exempt = exempt;
        this
    }

    /// Skip authentication for Microsoft Office clients.
    pub fn office_exempt(self, exempt: bool) -> Self {
        let mut this = self;
        this.office_exempt = exempt;
        this
    }
}

/// What [`AuthHandler::authenticate`] decided about a request.
#[derive(Debug)]
pub enum AuthOutcome {
    /// A valid session cookie was presented.
    Session(String),
    /// The credentials were good and a session was created for them.
    Authenticated {
        username: String,
        set_cookie: Option<HeaderValue>,
    },
    /// The request does not need credentials. Carries the identity of a
    /// valid session cookie, if there was one.
    Exempt(Option<String>),
    /// Answer with 401 and this `WWW-Authenticate` value.
    Challenge {
        error: AuthError,
        www_authenticate: HeaderValue,
    },
}

impl AuthOutcome {
    /// The identity bound to the request, if any.
    pub fn username(&self) -> Option<&str> {
        match self {
            AuthOutcome::Session(u) => Some(u),
            AuthOutcome::Authenticated { username, .. } => Some(username),
            AuthOutcome::Exempt(u) => u.as_deref(),
            AuthOutcome::Challenge { .. } => None,
        }
    }
}

/// The authenticating webdav handler.
///
/// Checks the session cookie or the credentials of every request, then
/// hands it to a `dav_server::DavHandler` whose filesystem only allows
/// what the user may access.
#[derive(Clone)]
pub struct AuthHandler {
    pub(crate) authenticator: Authenticator,
    pub(crate) sessions: Arc<dyn SessionStore>,
    /// Filesystem, locksystem and prefix shared by all requests.
    dav: DavConfig<Identity>,
    pub(crate) exempt: DavMethod,
    pub(crate) office_exempt: bool,
}

impl AuthHandler {
    /// Return a configuration builder.
    pub fn builder(users: Arc<dyn UserDirectory>) -> AuthBuilder {
        AuthBuilder::new(users)
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.authenticator.mode()
    }

    /// Handle a webdav request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        let (req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), body)
        };

        debug!(
            "{} {} {}",
            req.method(),
            req.uri().path(),
            req.headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
        );

        let outcome = self.authenticate(&req).await;
        let set_cookie = match &outcome {
            AuthOutcome::Challenge {
                error,
                www_authenticate,
            } => {
                info!("{} {}: {error}", req.method(), req.uri().path());
                return unauthorized(error.statuscode(), www_authenticate.clone());
            }
            AuthOutcome::Authenticated { set_cookie, .. } => set_cookie.clone(),
            _ => None,
        };

        let user: Identity = outcome.username().map(str::to_string);
        let req = {
            let (parts, ()) = req.into_parts();
            Request::from_parts(parts, body)
        };
        let mut config = self.dav.clone();
        if let Some(username) = &user {
            config = config.principal(username.clone());
        }
        let mut resp = config.build_handler().handle_guarded(req, user).await;
        if let Some(cookie) = set_cookie {
            resp.headers_mut().append(header::SET_COOKIE, cookie);
        }
        resp
    }

    /// Decide who a request is, without serving it.
    pub async fn authenticate(&self, req: &Request<()>) -> AuthOutcome {
        let session = self.session_user(req);
        if self.is_exempt(req) {
            return AuthOutcome::Exempt(session);
        }
        if let Some(username) = session {
            return AuthOutcome::Session(username);
        }

        let result = match self.authenticator.mode() {
            // bcrypt verification is cpu bound.
            AuthMode::Basic => {
                let authenticator = self.authenticator.clone();
                let (method, uri, headers) =
                    (req.method().clone(), req.uri().clone(), req.headers().clone());
                tokio::task::spawn_blocking(move || {
                    authenticator.authenticate(&method, &uri, &headers)
                })
                .await
                .unwrap_or_else(|e| {
                    error!("credential verification panicked: {e}");
                    Err(AuthError::Verification)
                })
            }
            AuthMode::Digest => self
                .authenticator
                .authenticate(req.method(), req.uri(), req.headers()),
        };

        match result {
            Ok(username) => {
                let (token, session) = self.sessions.create(&username);
                debug!("new session for {username}");
                AuthOutcome::Authenticated {
                    set_cookie: cookie::set_cookie(&token, session.expires_at),
                    username,
                }
            }
            Err(error) => AuthOutcome::Challenge {
                error,
                www_authenticate: self.authenticator.challenge(),
            },
        }
    }

    // valid, unexpired session from the cookie.
    fn session_user(&self, req: &Request<()>) -> Option<String> {
        let token = cookie::session_token(req.headers())?;
        match self.sessions.lookup(&token) {
            Some(session) => Some(session.username),
            None => {
                debug!("unknown or expired session cookie");
                None
            }
        }
    }

    fn is_exempt(&self, req: &Request<()>) -> bool {
        if dav_method(req.method()).map_or(false, |m| self.exempt.contains(m)) {
            return true;
        }
        self.office_exempt
            && req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map_or(false, |ua| OFFICE_USER_AGENT.is_match(ua))
    }
}

fn unauthorized(status: StatusCode, challenge: HeaderValue) -> Response<Body> {
    let mut resp = Response::new(Body::from("401 Unauthorized\n"));
    *resp.status_mut() = status;
    let h = resp.headers_mut();
    h.insert(header::WWW_AUTHENTICATE, challenge);
    h.typed_insert(headers::ContentType::text_utf8());
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash;
    use crate::users::tests::user;
    use crate::users::{Credential, MemUserDirectory};

    fn handler(office_exempt: bool) -> AuthHandler {
        let dir = MemUserDirectory::new();
        let mut u = user("/home/u1", false, false);
        u.credential = Credential::BasicHash(hash::hash_password("pw1").unwrap());
        dir.update_user("u1", u);
        AuthHandler::builder(dir)
            .office_exempt(office_exempt)
            .build()
            .unwrap()
    }

    fn request(method: &str, ua: Option<&str>) -> Request<()> {
        let mut req = Request::builder().method(method).uri("/home/u1/a.txt");
        if let Some(ua) = ua {
            req = req.header(header::USER_AGENT, ua);
        }
        req.body(()).unwrap()
    }

    #[test]
    fn test_exempt_methods() {
        let h = handler(false);
        assert!(h.is_exempt(&request("OPTIONS", None)));
        assert!(h.is_exempt(&request("HEAD", None)));
        assert!(!h.is_exempt(&request("GET", None)));
        assert!(!h.is_exempt(&request("PROPFIND", None)));
    }

    #[test]
    fn test_office_user_agent() {
        let off = handler(false);
        let on = handler(true);
        let office = request("GET", Some("Microsoft Office Word 2014"));
        assert!(!off.is_exempt(&office));
        assert!(on.is_exempt(&office));
        assert!(on.is_exempt(&request("PUT", Some("Microsoft Office"))));
        assert!(!on.is_exempt(&request("GET", Some("Microsoft Office2"))));
        assert!(!on.is_exempt(&request("GET", Some("Mozilla/5.0 Microsoft Office"))));
        assert!(!on.is_exempt(&request("GET", None)));
    }

    #[tokio::test]
    async fn test_outcomes() {
        let h = handler(false);
        match h.authenticate(&request("GET", None)).await {
            AuthOutcome::Challenge {
                error: AuthError::MissingCredentials,
                www_authenticate,
            } => assert_eq!(www_authenticate, r#"Basic realm="WebDAV""#),
            other => panic!("unexpected {other:?}"),
        }

        // "u1:pw1"
        let mut req = request("GET", None);
        req.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dTE6cHcx"),
        );
        let token = match h.authenticate(&req).await {
            AuthOutcome::Authenticated {
                username,
                set_cookie: Some(cookie),
            } => {
                assert_eq!(username, "u1");
                let cookie = cookie.to_str().unwrap().to_string();
                let token = cookie
                    .strip_prefix("webdav_auth=")
                    .and_then(|c| c.split(';').next())
                    .unwrap()
                    .to_string();
                assert_eq!(h.sessions().lookup(&token).unwrap().username, "u1");
                token
            }
            other => panic!("unexpected {other:?}"),
        };

        let mut req = request("GET", None);
        req.headers_mut().insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("webdav_auth={token}")).unwrap(),
        );
        assert!(matches!(
            h.authenticate(&req).await,
            AuthOutcome::Session(u) if u == "u1"
        ));

        let mut req = request("OPTIONS", None);
        req.headers_mut().insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("webdav_auth={token}")).unwrap(),
        );
        assert!(matches!(
            h.authenticate(&req).await,
            AuthOutcome::Exempt(Some(u)) if u == "u1"
        ));
        assert!(matches!(
            h.authenticate(&request("HEAD", None)).await,
            AuthOutcome::Exempt(None)
        ));
    }
}
