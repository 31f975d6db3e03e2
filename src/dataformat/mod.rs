// Data-Format Codecs
//
// One codec per wire encoding a request fragment may use. Every codec
// decodes raw bytes into an insertion-ordered map and encodes the map back:
//
// - json:            structured text object (key order preserved)
// - xml:             markup tree, root element as the single top-level key
// - multipart:       multipart/form-data, boundary bound from the request
// - form-urlencoded: a=1&b=2 bodies
// - raw:             identity passthrough, whole body under "value"
// - identity-kv:     cookie-header syntax, used for cookie reassembly
//
// Codecs are stateless apart from immutable configuration (a multipart
// boundary), so they are safe to share between threads.
//
// Architecture:
//   registry.rs (precedence + selection)
//       ↓
//   json.rs / xml.rs / multipart.rs / form.rs / raw.rs / kv.rs (leaf codecs)

pub mod form;
pub mod json;
pub mod kv;
pub mod multipart;
pub mod raw;
pub mod registry;
pub mod xml;

pub use multipart::MultipartCodec;
pub use registry::Registry;

use crate::error::CodecError;
use crate::ordered_map::OrderedMap;

/// Any scalar or structured value held by a parsed fragment
pub type FieldValue = serde_json::Value;

/// Parsed state of a fragment
pub type KvMap = OrderedMap<String, FieldValue>;

/// Content sniffing never looks past this many bytes
pub const SNIFF_LIMIT: usize = 512;

/// Format details that are not part of the key/value data but are needed to
/// re-encode it faithfully.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatHints {
    /// `<?xml ...?>` declaration of the decoded document
    pub xml_declaration: Option<String>,
    /// Per-part metadata of a multipart body, in wire order
    pub parts: Vec<PartMeta>,
    /// Original bytes of a raw body that is not valid UTF-8
    pub raw_body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartMeta {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Original bytes of a part body that is not valid UTF-8
    pub raw: Option<Vec<u8>>,
}

/// Result of a successful decode
#[derive(Debug, Clone)]
pub struct Decoded {
    pub fields: KvMap,
    pub hints: FormatHints,
}

impl Decoded {
    pub fn new(fields: KvMap) -> Self {
        Self {
            fields,
            hints: FormatHints::default(),
        }
    }
}

/// A wire encoding. Dispatch is by variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Codec {
    Json,
    Xml,
    Multipart(MultipartCodec),
    Form,
    Raw,
    IdentityKv,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Xml => "xml",
            Codec::Multipart(_) => "multipart",
            Codec::Form => "form-urlencoded",
            Codec::Raw => "raw",
            Codec::IdentityKv => "identity-kv",
        }
    }

    /// Cheap applicability check.
    ///
    /// A content type owned by this codec claims the input outright; a
    /// content type owned by another codec rules it out; anything else
    /// falls back to sniffing the first `SNIFF_LIMIT` bytes.
    pub fn detect(&self, content_type: Option<&str>, raw: &[u8]) -> bool {
        match content_type.map(mime_type) {
            Some(mime) if self.matches_mime(&mime) => true,
            Some(mime) if is_known_mime(&mime) => false,
            _ => self.sniff(sniff_window(raw)),
        }
    }

    pub fn decode(&self, raw: &[u8]) -> Result<Decoded, CodecError> {
        match self {
            Codec::Json => json::decode(raw),
            Codec::Xml => xml::decode(raw),
            Codec::Multipart(codec) => codec.decode(raw),
            Codec::Form => form::decode(raw),
            Codec::Raw => raw::decode(raw),
            Codec::IdentityKv => kv::decode(raw),
        }
    }

    pub fn encode(&self, fields: &KvMap, hints: &FormatHints) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::Json => json::encode(fields),
            Codec::Xml => xml::encode(fields, hints),
            Codec::Multipart(codec) => codec.encode(fields, hints),
            Codec::Form => form::encode(fields),
            Codec::Raw => raw::encode(fields, hints),
            Codec::IdentityKv => kv::encode(fields),
        }
    }

    fn matches_mime(&self, mime: &str) -> bool {
        match self {
            Codec::Json => json::is_json_mime(mime),
            Codec::Xml => xml::is_xml_mime(mime),
            Codec::Multipart(_) => mime == "multipart/form-data",
            Codec::Form => mime == "application/x-www-form-urlencoded",
            Codec::Raw => raw::is_raw_mime(mime),
            Codec::IdentityKv => false,
        }
    }

    fn sniff(&self, window: &[u8]) -> bool {
        match self {
            Codec::Json => json::sniff(window),
            Codec::Xml => xml::sniff(window),
            Codec::Multipart(_) => multipart::sniff(window),
            Codec::Form => form::sniff(window),
            // Passthrough formats are never guessed
            Codec::Raw | Codec::IdentityKv => false,
        }
    }
}

/// Lowercased media type without parameters: "Application/JSON; charset=x" -> "application/json"
pub fn mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Value of a content-type parameter such as `boundary`, unquoted
pub fn content_type_param(content_type: &str, param: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (name, value) = part.split_once('=')?;
        if name.trim().eq_ignore_ascii_case(param) {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Declared types no codec decodes; they are never sniffed
const OPAQUE_MIMES: &[&str] = &["text/html"];

fn is_known_mime(mime: &str) -> bool {
    OPAQUE_MIMES.contains(&mime)
        || json::is_json_mime(mime)
        || xml::is_xml_mime(mime)
        || raw::is_raw_mime(mime)
        || mime == "multipart/form-data"
        || mime == "application/x-www-form-urlencoded"
}

fn sniff_window(raw: &[u8]) -> &[u8] {
    &raw[..raw.len().min(SNIFF_LIMIT)]
}

/// Render a leaf value as wire text. Structured values cannot be flattened
/// into a single text field.
pub(crate) fn scalar_to_string(key: &str, value: &FieldValue) -> Result<String, CodecError> {
    match value {
        FieldValue::String(s) => Ok(s.clone()),
        FieldValue::Number(n) => Ok(n.to_string()),
        FieldValue::Bool(b) => Ok(b.to_string()),
        FieldValue::Null => Ok(String::new()),
        FieldValue::Array(_) | FieldValue::Object(_) => Err(CodecError::Structure(format!(
            "field {} holds a nested structure",
            key
        ))),
    }
}

/// Bytes to emit for a field decoded from binary content. While the field
/// still holds the lossy text of `raw`, the original bytes are reproduced;
/// once it has been overwritten, the new text is emitted.
pub(crate) fn original_bytes(raw: Option<&[u8]>, text: String) -> Vec<u8> {
    match raw {
        Some(bytes) if String::from_utf8_lossy(bytes) == text.as_str() => bytes.to_vec(),
        _ => text.into_bytes(),
    }
}

/// Expand a field into its wire occurrences: arrays repeat the key.
pub(crate) fn occurrences<'a>(value: &'a FieldValue) -> Vec<&'a FieldValue> {
    match value {
        FieldValue::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Insert a decoded occurrence, folding repeated keys into an array.
pub(crate) fn push_occurrence(fields: &mut KvMap, key: String, value: FieldValue) {
    match fields.get_mut(&key) {
        Some(FieldValue::Array(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::replace(existing, FieldValue::Null);
            *existing = FieldValue::Array(vec![first, value]);
        }
        None => {
            fields.set(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_normalization() {
        assert_eq!(mime_type("Application/JSON; charset=utf-8"), "application/json");
        assert_eq!(mime_type("text/xml"), "text/xml");
        assert_eq!(mime_type(""), "");
    }

    #[test]
    fn test_content_type_param() {
        let ct = "multipart/form-data; boundary=\"----abc\"";
        assert_eq!(content_type_param(ct, "boundary"), Some("----abc".to_string()));
        assert_eq!(content_type_param("multipart/form-data; Boundary=x", "boundary"), Some("x".to_string()));
        assert_eq!(content_type_param("application/json", "boundary"), None);
    }

    #[test]
    fn test_detect_by_declared_type() {
        assert!(Codec::Json.detect(Some("application/json"), b"not json at all"));
        assert!(Codec::Json.detect(Some("application/vnd.api+json"), b""));
        assert!(Codec::Raw.detect(Some("text/plain"), b"{\"a\":1}"));
    }

    #[test]
    fn test_detect_known_type_of_other_codec() {
        // A declared XML body is never claimed by the JSON sniffer
        assert!(!Codec::Json.detect(Some("application/xml"), b"{\"a\":1}"));
    }

    #[test]
    fn test_declared_html_is_never_sniffed() {
        let page = b"<!DOCTYPE html><html><body>hi</body></html>";
        assert!(!Codec::Xml.detect(Some("text/html; charset=utf-8"), page));
        assert!(!Codec::Xml.detect(Some("text/html"), b"<root/>"));
        assert!(!Codec::Xml.detect(None, page));
    }

    #[test]
    fn test_detect_sniffs_unknown_type() {
        assert!(Codec::Json.detect(None, b"  {\"a\":1}"));
        assert!(Codec::Json.detect(Some("application/x-custom"), b"{\"a\":1}"));
        assert!(!Codec::Raw.detect(None, b"anything"));
        assert!(!Codec::IdentityKv.detect(None, b"a=b; c=d"));
    }

    #[test]
    fn test_push_occurrence_folds_repeats() {
        let mut fields = KvMap::new();
        push_occurrence(&mut fields, "a".into(), "1".into());
        push_occurrence(&mut fields, "b".into(), "x".into());
        push_occurrence(&mut fields, "a".into(), "2".into());
        push_occurrence(&mut fields, "a".into(), "3".into());
        assert_eq!(fields.get("a"), Some(&serde_json::json!(["1", "2", "3"])));
        let keys: Vec<&String> = fields.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_original_bytes() {
        let binary = [0x89, b'P', 0xff];
        let lossy = String::from_utf8_lossy(&binary).into_owned();
        assert_eq!(original_bytes(Some(&binary), lossy), binary.to_vec());
        assert_eq!(original_bytes(Some(&binary), "new".into()), b"new".to_vec());
        assert_eq!(original_bytes(None, "text".into()), b"text".to_vec());
    }

    #[test]
    fn test_scalar_to_string_rejects_nested() {
        assert_eq!(scalar_to_string("k", &serde_json::json!(5)).unwrap(), "5");
        assert!(scalar_to_string("k", &serde_json::json!({"a": 1})).is_err());
    }
}
