// Codec Registry
//
// Fixed precedence, most specific format first and passthrough last.
// Exactly one codec is selected per body and selection is deterministic:
// the first codec whose detect() claims the input wins, and a decode
// failure afterwards is a malformed body, not a reason to try the next one.

use super::{Codec, MultipartCodec};
use lazy_static::lazy_static;
use tracing::debug;

lazy_static! {
    static ref DEFAULT_REGISTRY: Registry = Registry::default();
}

#[derive(Debug, Clone)]
pub struct Registry {
    codecs: Vec<Codec>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            codecs: vec![
                Codec::Json,
                Codec::Xml,
                Codec::Multipart(MultipartCodec::default()),
                Codec::Form,
                Codec::Raw,
            ],
        }
    }
}

impl Registry {
    /// Process-wide registry with the default precedence
    pub fn global() -> &'static Registry {
        &DEFAULT_REGISTRY
    }

    pub fn codecs(&self) -> &[Codec] {
        &self.codecs
    }

    pub fn by_name(&self, name: &str) -> Option<&Codec> {
        self.codecs.iter().find(|c| c.name() == name)
    }

    /// Pick the codec for a body, bound to this body's parameters
    /// (multipart boundary). None when nothing claims it.
    pub fn select(&self, content_type: Option<&str>, raw: &[u8]) -> Option<Codec> {
        let codec = self.codecs.iter().find(|c| c.detect(content_type, raw))?;
        debug!(codec = codec.name(), content_type = ?content_type, "selected body codec");
        Some(match codec {
            Codec::Multipart(_) => Codec::Multipart(MultipartCodec::bind(content_type, raw)),
            other => other.clone(),
        })
    }
}
