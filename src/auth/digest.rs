use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use http::HeaderValue;
use subtle::ConstantTimeEq;

use crate::errors::{AuthError, AuthResult};
use crate::hash::md5_hex;
use crate::users::{Credential, UserDirectory};

use super::REALM;

const REQUIRED_PARAMS: [&str; 9] = [
    "username", "realm", "nonce", "uri", "qop", "nc", "cnonce", "response", "opaque",
];

/// HTTP Digest authentication (RFC 2617, `qop=auth`, MD5).
///
/// The stored credential of a user is `HA1 = MD5(username:realm:password)`.
///
/// Nonces are not remembered: any well-formed nonce is accepted and a
/// captured request can be replayed. A nonce cache that enforces single use
/// or a growing `nc` per client would be the place to close that.
#[derive(Debug, Clone)]
pub struct DigestAuthenticator {
    users: Arc<dyn UserDirectory>,
}

impl DigestAuthenticator {
    pub fn new(users: Arc<dyn UserDirectory>) -> DigestAuthenticator {
        DigestAuthenticator { users }
    }

    /// Fresh nonce: MD5 of the current time in nanoseconds.
    pub fn generate_nonce() -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        md5_hex(&nanos.to_string())
    }

    /// Opaque value handed out with `nonce`.
    pub fn generate_opaque(nonce: &str) -> String {
        md5_hex(nonce)
    }

    /// The `WWW-Authenticate` value sent with a 401, with a new nonce.
    pub fn challenge(&self) -> HeaderValue {
        let nonce = Self::generate_nonce();
        let opaque = Self::generate_opaque(&nonce);
        let value =
            format!(r#"Digest realm="{REALM}", qop="auth", nonce="{nonce}", opaque="{opaque}""#);
        HeaderValue::from_str(&value)
            .unwrap_or_else(|_| HeaderValue::from_static(r#"Digest realm="WebDAV", qop="auth""#))
    }

    /// Split the parameter list of a Digest header into a map.
    ///
    /// Accepts the list with or without the leading `Digest ` scheme.
    /// Values may be quoted (commas allowed inside) or bare.
    pub fn parse_auth_header(header: &str) -> HashMap<String, String> {
        let header = header.trim();
        let header = match header.get(..7) {
            Some(scheme) if scheme.eq_ignore_ascii_case("digest ") => &header[7..],
            _ => header,
        };

        let mut params = HashMap::new();
        let mut chars = header.chars().peekable();
        loop {
            // key
            let mut key = String::new();
            while let Some(&c) = chars.peek() {
                chars.next();
                if c == '=' {
                    break;
                }
                if c == ',' {
                    key.clear();
                    continue;
                }
                key.push(c);
            }
            let key = key.trim().trim_matches('"').to_string();

            // value
            while chars.peek().map_or(false, |c| c.is_whitespace()) {
                chars.next();
            }
            let mut value = String::new();
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(n) = chars.next() {
                                value.push(n);
                            }
                        }
                        '"' => break,
                        c => value.push(c),
                    }
                }
                // skip up to the next separator.
                for c in chars.by_ref() {
                    if c == ',' {
                        break;
                    }
                }
            } else {
                for c in chars.by_ref() {
                    if c == ',' {
                        break;
                    }
                    value.push(c);
                }
                value = value.trim().to_string();
            }

            if !key.is_empty() {
                params.insert(key, value);
            }
            if chars.peek().is_none() {
                break;
            }
        }
        params
    }

    /// `MD5(HA1:nonce:nc:cnonce:qop:MD5(method:uri))`.
    pub fn expected_response(
        ha1: &str,
        params: &HashMap<String, String>,
        method: &str,
        uri: &str,
    ) -> String {
        let p = |k: &str| params.get(k).map(String::as_str).unwrap_or_default();
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        md5_hex(&format!(
            "{ha1}:{}:{}:{}:{}:{ha2}",
            p("nonce"),
            p("nc"),
            p("cnonce"),
            p("qop")
        ))
    }

    /// Verify an `Authorization: Digest` header for a request.
    ///
    /// `uri` is the request target as the client sent it.
    pub fn authenticate(&self, header: &str, method: &str, uri: &str) -> AuthResult<String> {
        if !header.trim_start().to_ascii_lowercase().starts_with("digest ") {
            return Err(AuthError::MalformedHeader);
        }
        let params = Self::parse_auth_header(header);
        if let Some(missing) = REQUIRED_PARAMS.iter().find(|k| !params.contains_key(**k)) {
            debug!("digest header without {missing}");
            return Err(AuthError::MalformedHeader);
        }

        let realm = &params["realm"];
        if realm != REALM {
            return Err(AuthError::RealmMismatch(realm.clone()));
        }

        let username = &params["username"];
        let user = self
            .users
            .get_user(username)
            .ok_or_else(|| AuthError::UnknownUser(username.clone()))?;
        let ha1 = match &user.credential {
            Credential::DigestHa1(ha1) => ha1,
            Credential::BasicHash(_) => {
                warn!("user {username} has a basic credential but digest auth is active");
                return Err(AuthError::InvalidCredentials(username.clone()));
            }
        };

        let expected = Self::expected_response(ha1, &params, method, uri);
        let given = params["response"].as_bytes();
        if bool::from(expected.as_bytes().ct_eq(given)) {
            Ok(username.clone())
        } else {
            Err(AuthError::InvalidCredentials(username.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest_ha1;
    use crate::users::tests::user;
    use crate::users::MemUserDirectory;

    const RFC_HEADER: &str = r#"Digest username="testuser", realm="WebDAV", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", uri="/dir/index.html", qop=auth, nc=00000001, cnonce="0a4f113b", response="6629fae49393a05397450978507c4ef1", opaque="5ccc069c403ebaf9f0171e9517f40e41""#;

    fn authenticator() -> DigestAuthenticator {
        let dir = MemUserDirectory::new();
        let mut u = user("", false, false);
        u.credential = Credential::DigestHa1(digest_ha1("testuser", REALM, "testpassword"));
        dir.update_user("testuser", u);
        DigestAuthenticator::new(dir)
    }

    fn signed_header(method: &str, uri: &str) -> String {
        let params = DigestAuthenticator::parse_auth_header(RFC_HEADER);
        let ha1 = digest_ha1("testuser", REALM, "testpassword");
        let response = DigestAuthenticator::expected_response(&ha1, &params, method, uri);
        RFC_HEADER.replace("6629fae49393a05397450978507c4ef1", &response)
    }

    #[test]
    fn test_parse_auth_header() {
        let params = DigestAuthenticator::parse_auth_header(RFC_HEADER);
        let expected = [
            ("username", "testuser"),
            ("realm", "WebDAV"),
            ("nonce", "dcd98b7102dd2f0e8b11d0f600bfb0c093"),
            ("uri", "/dir/index.html"),
            ("qop", "auth"),
            ("nc", "00000001"),
            ("cnonce", "0a4f113b"),
            ("response", "6629fae49393a05397450978507c4ef1"),
            ("opaque", "5ccc069c403ebaf9f0171e9517f40e41"),
        ];
        for (k, v) in expected {
            assert_eq!(params.get(k).map(String::as_str), Some(v), "{k}");
        }
        assert_eq!(params.len(), expected.len());

        let without_scheme = DigestAuthenticator::parse_auth_header(&RFC_HEADER[7..]);
        assert_eq!(without_scheme, params);
    }

    #[test]
    fn test_parse_quoted_comma() {
        let params =
            DigestAuthenticator::parse_auth_header(r#"Digest uri="/a,b/c", realm="x\"y",nc=01"#);
        assert_eq!(params["uri"], "/a,b/c");
        assert_eq!(params["realm"], "x\"y");
        assert_eq!(params["nc"], "01");
    }

    #[test]
    fn test_rfc2617_response() {
        // RFC 2617 section 3.5.
        let params = DigestAuthenticator::parse_auth_header(RFC_HEADER);
        let ha1 = digest_ha1("Mufasa", "testrealm@host.com", "Circle Of Life");
        assert_eq!(
            DigestAuthenticator::expected_response(&ha1, &params, "GET", "/dir/index.html"),
            "6629fae49393a05397450978507c4ef1"
        );
    }

    #[test]
    fn test_valid() {
        let auth = authenticator();
        let header = signed_header("GET", "/dir/index.html");
        assert_eq!(
            auth.authenticate(&header, "GET", "/dir/index.html").unwrap(),
            "testuser"
        );
        // method and uri are part of the hash.
        assert!(auth.authenticate(&header, "PUT", "/dir/index.html").is_err());
        assert!(auth.authenticate(&header, "GET", "/dir/other.html").is_err());
    }

    #[test]
    fn test_flipped_response() {
        let auth = authenticator();
        let header = signed_header("GET", "/dir/index.html");
        let params = DigestAuthenticator::parse_auth_header(&header);
        let response = params["response"].clone();
        for i in 0..response.len() {
            let mut flipped = response.clone().into_bytes();
            flipped[i] = if flipped[i] == b'0' { b'1' } else { b'0' };
            let flipped = String::from_utf8(flipped).unwrap();
            let bad = header.replace(&response, &flipped);
            assert!(matches!(
                auth.authenticate(&bad, "GET", "/dir/index.html"),
                Err(AuthError::InvalidCredentials(_))
            ));
        }
    }

    #[test]
    fn test_invalid_realm() {
        let auth = authenticator();
        let header = signed_header("GET", "/dir/index.html").replace("WebDAV", "InvalidRealm");
        assert!(matches!(
            auth.authenticate(&header, "GET", "/dir/index.html"),
            Err(AuthError::RealmMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_user() {
        let auth = authenticator();
        let header = RFC_HEADER.replace("testuser", "nonexistent");
        assert!(matches!(
            auth.authenticate(&header, "GET", "/dir/index.html"),
            Err(AuthError::UnknownUser(u)) if u == "nonexistent"
        ));
    }

    #[test]
    fn test_malformed() {
        let auth = authenticator();
        let header = signed_header("GET", "/dir/index.html").replace(", cnonce=\"0a4f113b\"", "");
        assert!(matches!(
            auth.authenticate(&header, "GET", "/dir/index.html"),
            Err(AuthError::MalformedHeader)
        ));
        assert!(matches!(
            auth.authenticate("Basic dXNlcjE6cGFzcw==", "GET", "/"),
            Err(AuthError::MalformedHeader)
        ));
        assert!(auth.authenticate("", "GET", "/").is_err());
    }

    #[test]
    fn test_nonce_and_opaque() {
        let nonce = DigestAuthenticator::generate_nonce();
        assert_eq!(nonce.len(), 32);
        let opaque = DigestAuthenticator::generate_opaque(&nonce);
        assert_eq!(opaque, md5_hex(&nonce));
        assert_ne!(opaque, nonce);
    }

    #[test]
    fn test_challenge() {
        let auth = authenticator();
        let challenge = auth.challenge();
        let challenge = challenge.to_str().unwrap();
        assert!(challenge.starts_with(r#"Digest realm="WebDAV", qop="auth", nonce=""#));
        let params = DigestAuthenticator::parse_auth_header(challenge);
        assert_eq!(
            params["opaque"],
            DigestAuthenticator::generate_opaque(&params["nonce"])
        );
    }
}
