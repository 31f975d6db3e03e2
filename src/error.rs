// Error types for Doppel request components
//
// Absent fragments are not errors: `parse` reports them as Ok(false).
// Everything else propagates to the driver as one of the kinds below.

use thiserror::Error;

/// Failures raised by a data-format codec while decoding or encoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("multipart error: {0}")]
    Multipart(String),

    #[error("form error: {0}")]
    Form(String),

    #[error("invalid UTF-8 in body")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The structure cannot be represented in the target format
    #[error("structure error: {0}")]
    Structure(String),
}

/// Errors returned by component operations
#[derive(Error, Debug)]
pub enum ComponentError {
    /// Operation called before a successful `parse`
    #[error("{0} component has not been parsed")]
    NotParsed(&'static str),

    /// Fragment is present but cannot be decoded under its format
    #[error("malformed {component} fragment: {source}")]
    Malformed {
        component: &'static str,
        #[source]
        source: CodecError,
    },

    /// Set/delete targeted a key absent from the parsed structure
    #[error("set failed: key not found: {0}")]
    KeyNotFound(String),

    /// Set/delete targeted a key excluded by the protected-key policy
    #[error("key is protected: {0}")]
    ProtectedKey(String),

    /// No registered codec claimed the body
    #[error("unsupported body format: {0}")]
    UnsupportedFormat(String),

    /// Serialization back to wire form failed
    #[error("rebuild failed: {0}")]
    Rebuild(#[source] CodecError),
}

/// Coarse classification of a `ComponentError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotParsed,
    Malformed,
    KeyNotFound,
    ProtectedKey,
    UnsupportedFormat,
    RebuildFailure,
}

impl ComponentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ComponentError::NotParsed(_) => ErrorKind::NotParsed,
            ComponentError::Malformed { .. } => ErrorKind::Malformed,
            ComponentError::KeyNotFound(_) => ErrorKind::KeyNotFound,
            ComponentError::ProtectedKey(_) => ErrorKind::ProtectedKey,
            ComponentError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ComponentError::Rebuild(_) => ErrorKind::RebuildFailure,
        }
    }

    /// True for the expected misses of a broad fuzzing sweep, which callers
    /// skip silently instead of logging.
    pub fn is_skippable(&self) -> bool {
        matches!(self.kind(), ErrorKind::KeyNotFound | ErrorKind::ProtectedKey)
    }

    pub fn is_key_not_found(&self) -> bool {
        self.kind() == ErrorKind::KeyNotFound
    }
}

/// Errors parsing a raw HTTP request dump
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("invalid request line: {0}")]
    InvalidRequestLine(String),

    #[error("invalid header line: {0}")]
    InvalidHeader(String),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("missing Host header for relative target {0}")]
    MissingHost(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors loading a `SurfaceConfig`
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown component kind: {0}")]
    UnknownKind(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skippable_kinds() {
        assert!(ComponentError::KeyNotFound("x".into()).is_skippable());
        assert!(ComponentError::ProtectedKey("_ga".into()).is_skippable());
        assert!(!ComponentError::NotParsed("body").is_skippable());
        assert!(!ComponentError::UnsupportedFormat("image/png".into()).is_skippable());
    }

    #[test]
    fn test_key_not_found_message() {
        let err = ComponentError::KeyNotFound("doesnotexist".into());
        assert!(err.is_key_not_found());
        assert_eq!(err.to_string(), "set failed: key not found: doesnotexist");
    }

    #[test]
    fn test_malformed_wraps_codec_error() {
        let source = CodecError::Xml("unclosed tag".into());
        let err = ComponentError::Malformed { component: "body", source };
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert!(err.to_string().contains("unclosed tag"));
    }
}
