// Query component
//
// URL query parameters, percent-decoded. Repeated parameters fold into an
// array and are re-serialized as repeated pairs in field order.

use super::{install, ComponentKind, Parsed, RequestComponent};
use crate::dataformat::{occurrences, push_occurrence, scalar_to_string, FieldValue, KvMap};
use crate::error::ComponentError;
use crate::models::HttpRequest;
use crate::protected::ProtectedKeys;
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Query {
    state: Option<Parsed>,
    policy: Arc<ProtectedKeys>,
}

impl Query {
    pub fn new(policy: Arc<ProtectedKeys>) -> Self {
        Self {
            state: None,
            policy,
        }
    }
}

impl RequestComponent for Query {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Query
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
        let mut params = KvMap::new();
        if req.url.query().map_or(false, |q| !q.is_empty()) {
            for (name, value) in req.url.query_pairs() {
                push_occurrence(&mut params, name.into_owned(), FieldValue::String(value.into_owned()));
            }
        }
        debug!(count = params.len(), "parsed query parameters");

        let mut value = Value::new();
        value.set_parsed(params, None);
        Ok(install(&mut self.state, value, req))
    }

    fn rebuild(&self) -> Result<HttpRequest, ComponentError> {
        let parsed = self.parsed().ok_or(ComponentError::NotParsed(self.name()))?;

        let mut pairs = Vec::new();
        for (name, field) in parsed.value.parsed().iter() {
            for occurrence in occurrences(field) {
                let text = scalar_to_string(name, occurrence).map_err(ComponentError::Rebuild)?;
                pairs.push((name.as_str(), text));
            }
        }

        let mut cloned = parsed.request.clone();
        if pairs.is_empty() {
            cloned.url.set_query(None);
        } else {
            cloned.url.query_pairs_mut().clear().extend_pairs(pairs);
        }
        Ok(cloned)
    }
}
