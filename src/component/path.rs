// Path component
//
// Non-empty URL path segments, percent-decoded and keyed by their 1-based
// position ("/api/users/42" -> {1: api, 2: users, 3: 42}). A trailing slash
// on the captured path is kept on rebuild.

use super::{install, ComponentKind, Parsed, RequestComponent};
use crate::dataformat::{scalar_to_string, FieldValue, KvMap};
use crate::error::{CodecError, ComponentError};
use crate::models::HttpRequest;
use crate::protected::ProtectedKeys;
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Path {
    state: Option<Parsed>,
    policy: Arc<ProtectedKeys>,
}

impl Path {
    pub fn new(policy: Arc<ProtectedKeys>) -> Self {
        Self {
            state: None,
            policy,
        }
    }
}

fn has_trailing_slash(req: &HttpRequest) -> bool {
    let path = req.url.path();
    path.len() > 1 && path.ends_with('/')
}

impl RequestComponent for Path {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Path
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
        self.state = None;
        let mut segments = KvMap::new();
        if let Some(split) = req.url.path_segments() {
            for (i, raw) in split.filter(|s| !s.is_empty()).enumerate() {
                let decoded = urlencoding::decode(raw).map_err(|e| ComponentError::Malformed {
                    component: "path",
                    source: CodecError::Utf8(e),
                })?;
                segments.set((i + 1).to_string(), FieldValue::String(decoded.into_owned()));
            }
        }
        debug!(count = segments.len(), "parsed path segments");

        let mut value = Value::new();
        value.set_parsed(segments, None);
        Ok(install(&mut self.state, value, req))
    }

    fn rebuild(&self) -> Result<HttpRequest, ComponentError> {
        let parsed = self.parsed().ok_or(ComponentError::NotParsed(self.name()))?;

        let mut texts = Vec::with_capacity(parsed.value.parsed().len());
        for (key, field) in parsed.value.parsed().iter() {
            texts.push(scalar_to_string(key, field).map_err(ComponentError::Rebuild)?);
        }

        let mut cloned = parsed.request.clone();
        {
            let mut segments = cloned.url.path_segments_mut().map_err(|_| {
                ComponentError::Rebuild(CodecError::Structure("URL has no path segments".into()))
            })?;
            segments.clear().extend(texts.iter());
            if has_trailing_slash(&parsed.request) && !texts.is_empty() {
                segments.push("");
            }
        }
        Ok(cloned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Method;

    fn parsed(url: &str) -> (HttpRequest, Path) {
        let req = HttpRequest::new(Method::GET, url).unwrap();
        let mut path = Path::new(ProtectedKeys::shared());
        assert!(path.parse(&req).unwrap());
        (req, path)
    }

    #[test]
    fn test_root_is_absent() {
        let req = HttpRequest::new(Method::GET, "https://example.com/").unwrap();
        let mut path = Path::new(ProtectedKeys::shared());
        assert!(!path.parse(&req).unwrap());
    }

    #[test]
    fn test_segments_keyed_by_position() {
        let (_, path) = parsed("https://example.com/api/my%20users/42?x=1");
        assert_eq!(
            path.keys().unwrap(),
            vec![
                ("1".to_string(), "api".to_string()),
                ("2".to_string(), "my users".to_string()),
                ("3".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn test_rebuild_round_trip_keeps_trailing_slash() {
        let (req, path) = parsed("https://example.com/api/users/?x=1");
        assert_eq!(path.rebuild().unwrap(), req);
    }

    #[test]
    fn test_set_segment_is_encoded() {
        let (req, mut path) = parsed("https://example.com/api/users/42");
        path.set_value("3", "../etc/passwd").unwrap();
        let rebuilt = path.rebuild().unwrap();
        assert_eq!(rebuilt.url.path(), "/api/users/..%2Fetc%2Fpasswd");
        assert_eq!(req.url.path(), "/api/users/42");
    }

    #[test]
    fn test_delete_segment() {
        let (_, mut path) = parsed("https://example.com/api/v1/users");
        path.delete("2").unwrap();
        assert_eq!(path.rebuild().unwrap().url.path(), "/api/users");
    }
}
