use std::time::SystemTime;

use bitflags::bitflags;
use headers::Header;

use crate::errors::ConfigError;

bitflags! {
    /// Set of HTTP/WebDAV methods, used to configure which methods
    /// bypass authentication.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DavMethod: u32 {
        const HEAD = 0x0001;
        const GET = 0x0002;
        const PUT = 0x0004;
        const PATCH = 0x0008;
        const OPTIONS = 0x0010;
        const PROPFIND = 0x0020;
        const PROPPATCH = 0x0040;
        const MKCOL = 0x0080;
        const COPY = 0x0100;
        const MOVE = 0x0200;
        const DELETE = 0x0400;
        const LOCK = 0x0800;
        const UNLOCK = 0x1000;
    }
}

impl DavMethod {
    /// Methods let through without credentials unless configured otherwise.
    pub const DEFAULT_EXEMPT: Self = Self::OPTIONS.union(Self::HEAD);

    /// Build a set from a list of method names, e.g. from the config file.
    pub fn parse_set<I, S>(names: I) -> Result<DavMethod, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = DavMethod::empty();
        for name in names {
            let name = name.as_ref().trim().to_ascii_uppercase();
            match DavMethod::from_name(&name) {
                Some(m) => set |= m,
                None => return Err(ConfigError::InvalidMethod(name)),
            }
        }
        Ok(set)
    }
}

// translate method into our own bitflag that has webdav methods as well.
// The flag names are the wire names, so the generated `from_name` does the lookup.
pub fn dav_method(m: &http::Method) -> Option<DavMethod> {
    DavMethod::from_name(m.as_str())
}

pub fn systemtime_to_httpdate(t: SystemTime) -> String {
    let d = headers::Date::from(t);
    let mut v = Vec::new();
    d.encode(&mut v);
    v.first()
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_httpdate() {
        let t = UNIX_EPOCH + Duration::from_secs(784111777);
        assert_eq!(systemtime_to_httpdate(t), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_dav_method() {
        assert_eq!(dav_method(&http::Method::HEAD), Some(DavMethod::HEAD));
        let propfind = http::Method::from_bytes(b"PROPFIND").unwrap();
        assert_eq!(dav_method(&propfind), Some(DavMethod::PROPFIND));
        let other = http::Method::from_bytes(b"REPORT").unwrap();
        assert_eq!(dav_method(&other), None);
        let lower = http::Method::from_bytes(b"get").unwrap();
        assert_eq!(dav_method(&lower), None);
        assert_eq!(DavMethod::from_name("UNLOCK"), Some(DavMethod::UNLOCK));
        assert_eq!(DavMethod::from_name("DEFAULT_EXEMPT"), None);
    }

    #[test]
    fn test_parse_set() {
        let set = DavMethod::parse_set(["options", " HEAD"]).unwrap();
        assert_eq!(set, DavMethod::DEFAULT_EXEMPT);
        assert!(DavMethod::parse_set(Vec::<String>::new()).unwrap().is_empty());
        assert!(matches!(
            DavMethod::parse_set(["FETCH"]),
            Err(ConfigError::InvalidMethod(m)) if m == "FETCH"
        ));
    }
}
