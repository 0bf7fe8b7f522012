//! The `webdav_auth` session cookie.
use std::time::SystemTime;

use headers::HeaderMapExt;
use http::{HeaderMap, HeaderValue};

use crate::util::systemtime_to_httpdate;

pub const SESSION_COOKIE: &str = "webdav_auth";

/// The session token from the request's `Cookie` header(s), if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookie = headers.typed_get::<headers::Cookie>()?;
    let token = cookie.get(SESSION_COOKIE)?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// `Set-Cookie` value for a new session.
pub fn set_cookie(token: &str, expires: SystemTime) -> Option<HeaderValue> {
    let value = format!(
        "{SESSION_COOKIE}={token}; Path=/; Expires={}; HttpOnly; SameSite=Lax",
        systemtime_to_httpdate(expires)
    );
    HeaderValue::from_str(&value).ok()
}
