// Cookie component
//
// Pairs come straight from the request's Cookie headers; no body codec is
// involved. Rebuild folds every Cookie header into one, written with the
// identity-kv codec at the first Cookie header's position, so protected
// cookies ride along unchanged.

use super::{install, ComponentKind, Parsed, RequestComponent};
use crate::dataformat::{Codec, FieldValue, KvMap};
use crate::error::ComponentError;
use crate::models::HttpRequest;
use crate::protected::ProtectedKeys;
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Cookie {
    state: Option<Parsed>,
    policy: Arc<ProtectedKeys>,
}

impl Cookie {
    pub fn new(policy: Arc<ProtectedKeys>) -> Self {
        Self {
            state: None,
            policy,
        }
    }
}

impl RequestComponent for Cookie {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Cookie
    }

    fn policy(&self) -> &ProtectedKeys {
        &self.policy
    }

    fn parsed(&self) -> Option<&Parsed> {
        self.state.as_ref()
    }

    fn parsed_mut(&mut self) -> Option<&mut Parsed> {
        self.state.as_mut()
    }

    fn parse(&mut self, req: &HttpRequest) -> Result<bool, ComponentError> {
        let cookies: KvMap = req
            .cookies()
            .into_iter()
            .map(|(name, value)| (name, FieldValue::String(value)))
            .collect();
        debug!(count = cookies.len(), "parsed cookies");

        let mut value = Value::new();
        value.set_parsed(cookies, Some(Codec::IdentityKv));
        Ok(install(&mut self.state, value, req))
    }

    fn rebuild(&self) -> Result<HttpRequest, ComponentError> {
        let parsed = self.parsed().ok_or(ComponentError::NotParsed(self.name()))?;
        let mut cloned = parsed.request.clone();

        if parsed.value.is_empty() {
            cloned.remove_header("Cookie");
        } else {
            let encoded = parsed.value.encode().map_err(ComponentError::Rebuild)?;
            cloned.set_header("Cookie", &String::from_utf8_lossy(&encoded));
        }
        Ok(cloned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Method;

    fn request(cookie: &str) -> HttpRequest {
        HttpRequest::new(Method::GET, "https://example.com/")
            .unwrap()
            .with_header("Cookie", cookie)
    }

    #[test]
    fn test_parse_absent() {
        let req = HttpRequest::new(Method::GET, "https://example.com/").unwrap();
        let mut cookie = Cookie::new(ProtectedKeys::shared());
        assert!(!cookie.parse(&req).unwrap());
        assert!(cookie.parsed().is_none());
    }

    #[test]
    fn test_iterate_skips_protected() {
        let mut cookie = Cookie::new(ProtectedKeys::shared());
        assert!(cookie.parse(&request("session=abc123; __utma=111.222; theme=dark")).unwrap());
        let keys = cookie.keys().unwrap();
        assert_eq!(
            keys,
            vec![
                ("session".to_string(), "abc123".to_string()),
                ("theme".to_string(), "dark".to_string()),
            ]
        );
    }

    #[test]
    fn test_protected_cookie_cannot_be_mutated() {
        let mut cookie = Cookie::new(ProtectedKeys::shared());
        cookie.parse(&request("_ga=GA1.2; id=7")).unwrap();
        let err = cookie.set_value("_ga", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtectedKey);
        assert!(cookie.delete("_ga").is_err());
        let rebuilt = cookie.rebuild().unwrap();
        assert_eq!(rebuilt.header("Cookie"), Some("_ga=GA1.2; id=7"));
    }

    #[test]
    fn test_rebuild_after_delete() {
        let mut cookie = Cookie::new(ProtectedKeys::shared());
        cookie.parse(&request("a=1; b=2; c=3")).unwrap();
        cookie.delete("b").unwrap();
        let rebuilt = cookie.rebuild().unwrap();
        assert_eq!(rebuilt.header_values("Cookie"), vec!["a=1; c=3"]);
    }

    #[test]
    fn test_delete_every_cookie_drops_header() {
        let mut cookie = Cookie::new(ProtectedKeys::shared());
        cookie.parse(&request("a=1")).unwrap();
        cookie.delete("a").unwrap();
        let rebuilt = cookie.rebuild().unwrap();
        assert!(rebuilt.header("Cookie").is_none());
    }

    #[test]
    fn test_rebuild_merges_multiple_cookie_headers() {
        let req = request("a=1").with_header("Cookie", "b=2");
        let mut cookie = Cookie::new(ProtectedKeys::shared());
        cookie.parse(&req).unwrap();
        let rebuilt = cookie.rebuild().unwrap();
        assert_eq!(rebuilt.header_values("Cookie"), vec!["a=1; b=2"]);
    }

    #[test]
    fn test_rebuild_rejects_separator_in_value() {
        let mut cookie = Cookie::new(ProtectedKeys::shared());
        cookie.parse(&request("a=1")).unwrap();
        cookie.set_value("a", "1; admin=true").unwrap();
        let err = cookie.rebuild().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RebuildFailure);
    }
}
