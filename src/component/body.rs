// Body component
//
// The request body, decoded by whichever codec the registry selects from
// the declared Content-Type and the leading bytes. Rebuild re-encodes with
// the same codec and refreshes Content-Length.

use super::{install, ComponentKind, Parsed, RequestComponent};
use crate::dataformat::Registry;
use crate::error::ComponentError;
use crate::models::HttpRequest;
use crate::protected::ProtectedKeys;
use crate::value::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Body {
    state: Option<Parsed>,
    policy: Arc<ProtectedKeys>,
}

impl Body {
    pub fn new(policy: Arc<ProtectedKeys>) -> Self {
        Self {
            state: None,
            policy,
        }
    }

    /// Name of the codec the parsed body was decoded with
    pub fn format(&self) -> Option<&'static str> {
        self.parsed()
            .and_then(|p| p.value.codec())
            .map(|codec| codec.name())
    }
}

impl RequestComponent for Body {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Body
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
        if req.body.is_empty() {
            return Ok(false);
        }

        let content_type = req.content_type();
        let codec = Registry::global()
            .select(content_type, &req.body)
            .ok_or_else(|| {
                ComponentError::UnsupportedFormat(content_type.unwrap_or("unknown").to_string())
            })?;

        let value = Value::decode(codec, &req.body).map_err(|source| {
            warn!(error = %source, "malformed request body");
            ComponentError::Malformed {
                component: "body",
                source,
            }
        })?;
        debug!(
            codec = value.codec().map(|c| c.name()),
            fields = value.parsed().len(),
            "parsed body"
        );
        Ok(install(&mut self.state, value, req))
    }

    fn rebuild(&self) -> Result<HttpRequest, ComponentError> {
        let parsed = self.parsed().ok_or(ComponentError::NotParsed(self.name()))?;
        let encoded = parsed.value.encode().map_err(ComponentError::Rebuild)?;
        let mut cloned = parsed.request.clone();
        cloned.set_body(encoded);
        Ok(cloned)
    }
}
