// Header component
//
// Every header except Cookie, keyed by its name as captured. Repeated
// headers fold into an array and are written back as repeated lines.
// Cookie headers belong to the cookie component and keep their place.

use super::{display_value, install, ComponentKind, Parsed, RequestComponent};
use crate::dataformat::{occurrences, push_occurrence, FieldValue, KvMap};
use crate::error::ComponentError;
use crate::models::HttpRequest;
use crate::protected::ProtectedKeys;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Header {
    state: Option<Parsed>,
    policy: Arc<ProtectedKeys>,
}

impl Header {
    pub fn new(policy: Arc<ProtectedKeys>) -> Self {
        Self {
            state: None,
            policy,
        }
    }
}

fn is_cookie(name: &str) -> bool {
    name.eq_ignore_ascii_case("Cookie")
}

impl RequestComponent for Header {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Header
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
        let mut headers = KvMap::new();
        for (name, value) in req.headers.iter().filter(|(name, _)| !is_cookie(name)) {
            push_occurrence(&mut headers, name.clone(), FieldValue::String(value.clone()));
        }
        debug!(count = headers.len(), "parsed headers");

        let mut value = Value::new();
        value.set_parsed(headers, None);
        Ok(install(&mut self.state, value, req))
    }

    fn rebuild(&self) -> Result<HttpRequest, ComponentError> {
        let parsed = self.parsed().ok_or(ComponentError::NotParsed(self.name()))?;
        let mut cloned = parsed.request.clone();

        // The n-th line of a header takes the n-th occurrence of its field;
        // lines whose field or occurrence was deleted are dropped.
        let fields = parsed.value.parsed();
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut rebuilt = Vec::with_capacity(cloned.headers.len());
        for (name, value) in &parsed.request.headers {
            if is_cookie(name) {
                rebuilt.push((name.clone(), value.clone()));
                continue;
            }
            let nth = seen.entry(name.as_str()).or_insert(0);
            if let Some(occurrence) = fields.get(name).and_then(|f| occurrences(f).get(*nth).copied()) {
                rebuilt.push((name.clone(), display_value(occurrence)));
            }
            *nth += 1;
        }
        cloned.headers = rebuilt;
        Ok(cloned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Method;

    fn request() -> HttpRequest {
        HttpRequest::new(Method::GET, "https://example.com/")
            .unwrap()
            .with_header("Host", "example.com")
            .with_header("Cookie", "a=1")
            .with_header("User-Agent", "doppel")
            .with_header("Accept", "text/html")
            .with_header("Accept", "application/json")
    }

    #[test]
    fn test_parse_excludes_cookie_and_folds_repeats() {
        let mut header = Header::new(ProtectedKeys::shared());
        assert!(header.parse(&request()).unwrap());
        let value = &header.parsed().unwrap().value;
        assert!(!value.contains("Cookie"));
        assert_eq!(
            value.get("Accept"),
            Some(&serde_json::json!(["text/html", "application/json"]))
        );
    }

    #[test]
    fn test_iterate_hides_envelope_headers() {
        let mut header = Header::new(ProtectedKeys::shared());
        header.parse(&request()).unwrap();
        let keys: Vec<String> = header.keys().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["User-Agent", "Accept.0", "Accept.1"]);
        let err = header.set_value("host", "evil.test").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtectedKey);
    }

    #[test]
    fn test_rebuild_round_trip() {
        let req = request();
        let mut header = Header::new(ProtectedKeys::shared());
        header.parse(&req).unwrap();
        assert_eq!(header.rebuild().unwrap(), req);
    }

    #[test]
    fn test_rebuild_after_mutation_keeps_cookie_in_place() {
        let req = request();
        let mut header = Header::new(ProtectedKeys::shared());
        header.parse(&req).unwrap();
        header.set_value("User-Agent", "<script>").unwrap();
        header.set_value("Accept.1", "*/*").unwrap();

        let rebuilt = header.rebuild().unwrap();
        assert_eq!(rebuilt.header("User-Agent"), Some("<script>"));
        assert_eq!(rebuilt.header_values("Accept"), vec!["text/html", "*/*"]);
        let names: Vec<&str> = rebuilt.headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["Host", "Cookie", "User-Agent", "Accept", "Accept"]);
        assert_eq!(req.header("User-Agent"), Some("doppel"));
    }

    #[test]
    fn test_rebuild_after_delete() {
        let mut header = Header::new(ProtectedKeys::shared());
        header.parse(&request()).unwrap();
        header.delete("Accept.0").unwrap();
        header.delete("User-Agent").unwrap();

        let rebuilt = header.rebuild().unwrap();
        assert_eq!(rebuilt.header("User-Agent"), None);
        assert_eq!(rebuilt.header_values("Accept"), vec!["application/json"]);
    }

    #[test]
    fn test_only_cookie_headers_is_absent() {
        let req = HttpRequest::new(Method::GET, "https://example.com/")
            .unwrap()
            .with_header("Cookie", "a=1");
        let mut header = Header::new(ProtectedKeys::shared());
        assert!(!header.parse(&req).unwrap());
    }
}
