// Request Components
//
// One component per mutable fragment of a request:
//
// - cookie: Cookie header pairs
// - header: every other header
// - query:  URL query parameters
// - path:   URL path segments
// - body:   request body through the codec registry
//
// All kinds share one contract (RequestComponent): parse a captured request,
// iterate fuzzable keys, set/delete values, rebuild a new request. The
// captured request is never edited; rebuild() always returns a fresh one.
// Clone deep-copies the parsed value and the request snapshot, so each
// worker fuzzing the same baseline should own its own clone.
//
// Architecture:
//   mod.rs (contract, kinds, shared iterate/set/delete)
//       ↓
//   cookie.rs / header.rs / query.rs / path.rs / body.rs (parse + rebuild)

pub mod body;
pub mod cookie;
pub mod header;
pub mod path;
pub mod query;

pub use body::Body;
pub use cookie::Cookie;
pub use header::Header;
pub use path::Path;
pub use query::Query;

use crate::dataformat::FieldValue;
use crate::error::{ComponentError, ConfigError};
use crate::models::HttpRequest;
use crate::protected::ProtectedKeys;
use crate::value::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Kinds of request fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Cookie,
    Header,
    Query,
    Path,
    Body,
}

impl ComponentKind {
    /// Every known kind, for drivers enumerating a request's fuzz surface
    pub fn all() -> &'static [ComponentKind] {
        &[
            ComponentKind::Cookie,
            ComponentKind::Header,
            ComponentKind::Query,
            ComponentKind::Path,
            ComponentKind::Body,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Cookie => "cookie",
            ComponentKind::Header => "header",
            ComponentKind::Query => "query",
            ComponentKind::Path => "path",
            ComponentKind::Body => "body",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ComponentKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentKind::all()
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownKind(s.to_string()))
    }
}

/// Parsed state of a component: its value and the request it came from
#[derive(Debug, Clone)]
pub struct Parsed {
    pub value: Value,
    pub request: HttpRequest,
}

/// Shared contract of every component kind.
///
/// Variants provide parsing and rebuilding; iteration and mutation are
/// common and go through the parsed Value plus the protected-key policy.
pub trait RequestComponent {
    fn kind(&self) -> ComponentKind;

    fn policy(&self) -> &ProtectedKeys;

    fn parsed(&self) -> Option<&Parsed>;

    fn parsed_mut(&mut self) -> Option<&mut Parsed>;

    /// Inspect `req` for this fragment. Ok(false) means absent or empty.
    fn parse(&mut self, req: &HttpRequest) -> Result<bool, ComponentError>;

    /// New request carrying this component's current state
    fn rebuild(&self) -> Result<HttpRequest, ComponentError>;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Visit every non-protected leaf key in structural order. The first
    /// error from `callback` stops the walk and is returned.
    fn iterate<E, F>(&self, mut callback: F) -> Result<(), E>
    where
        F: FnMut(&str, &FieldValue) -> Result<(), E>,
        E: From<ComponentError>,
    {
        let parsed = self.parsed().ok_or(ComponentError::NotParsed(self.name()))?;
        for (key, value) in parsed.value.parsed().iter() {
            if self.policy().is_protected(self.kind(), key) {
                continue;
            }
            for (path, leaf) in Value::leaves_of(key, value) {
                callback(&path, leaf)?;
            }
        }
        Ok(())
    }

    /// Fuzzable keys as (path, wire text) pairs
    fn keys(&self) -> Result<Vec<(String, String)>, ComponentError> {
        let mut out = Vec::new();
        self.iterate(|key, value| {
            out.push((key.to_string(), display_value(value)));
            Ok::<(), ComponentError>(())
        })?;
        Ok(out)
    }

    /// Overwrite an existing key; never adds one
    fn set_value(&mut self, key: &str, value: &str) -> Result<(), ComponentError> {
        self.check_mutable(key)?;
        let name = self.name();
        let parsed = self.parsed_mut().ok_or(ComponentError::NotParsed(name))?;
        if parsed.value.set_parsed_value(key, value) {
            Ok(())
        } else {
            Err(ComponentError::KeyNotFound(key.to_string()))
        }
    }

    fn delete(&mut self, key: &str) -> Result<(), ComponentError> {
        self.check_mutable(key)?;
        let name = self.name();
        let parsed = self.parsed_mut().ok_or(ComponentError::NotParsed(name))?;
        if parsed.value.delete(key) {
            Ok(())
        } else {
            Err(ComponentError::KeyNotFound(key.to_string()))
        }
    }

    /// Refuse mutation before parse and on protected keys
    fn check_mutable(&self, key: &str) -> Result<(), ComponentError> {
        let parsed = self.parsed().ok_or(ComponentError::NotParsed(self.name()))?;
        let top = top_level_key(&parsed.value, key);
        if self.policy().is_protected(self.kind(), top) {
            return Err(ComponentError::ProtectedKey(key.to_string()));
        }
        Ok(())
    }
}

/// The top-level entry a key path lives under
fn top_level_key<'a>(value: &Value, key: &'a str) -> &'a str {
    value
        .resolve(key)
        .and_then(|segments| segments.first().copied())
        .unwrap_or_else(|| key.split('.').next().unwrap_or(key))
}

/// Wire text of a leaf value
pub fn display_value(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) => s.clone(),
        FieldValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// A component of any kind
#[derive(Debug, Clone)]
pub enum Component {
    Cookie(Cookie),
    Header(Header),
    Query(Query),
    Path(Path),
    Body(Body),
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $e:expr) => {
        match $self {
            Component::Cookie($c) => $e,
            Component::Header($c) => $e,
            Component::Query($c) => $e,
            Component::Path($c) => $e,
            Component::Body($c) => $e,
        }
    };
}

impl Component {
    pub fn new(kind: ComponentKind, policy: Arc<ProtectedKeys>) -> Self {
        match kind {
            ComponentKind::Cookie => Component::Cookie(Cookie::new(policy)),
            ComponentKind::Header => Component::Header(Header::new(policy)),
            ComponentKind::Query => Component::Query(Query::new(policy)),
            ComponentKind::Path => Component::Path(Path::new(policy)),
            ComponentKind::Body => Component::Body(Body::new(policy)),
        }
    }
}

impl RequestComponent for Component {
    fn kind(&self) -> ComponentKind {
        dispatch!(self, c => c.kind())
    }

    fn policy(&self) -> &ProtectedKeys {
        dispatch!(self, c => c.policy())
    }

    fn parsed(&self) -> Option<&Parsed> {
        dispatch!(self, c => c.parsed())
    }

    fn parsed_mut(&mut self) -> Option<&mut Parsed> {
        dispatch!(self, c => c.parsed_mut())
    }

    fn parse(&mut self, req: &HttpRequest) -> Result<bool, ComponentError> {
        dispatch!(self, c => c.parse(req))
    }

    fn rebuild(&self) -> Result<HttpRequest, ComponentError> {
        dispatch!(self, c => c.rebuild())
    }
}

/// One unparsed component per known kind
pub fn new_all(policy: Arc<ProtectedKeys>) -> Vec<Component> {
    ComponentKind::all()
        .iter()
        .map(|&kind| Component::new(kind, Arc::clone(&policy)))
        .collect()
}

/// Store a fresh Parsed state, or clear it when the fragment is absent
pub(crate) fn install(slot: &mut Option<Parsed>, value: Value, req: &HttpRequest) -> bool {
    if value.is_empty() {
        *slot = None;
        return false;
    }
    *slot = Some(Parsed {
        value,
        request: req.clone(),
    });
    true
}
