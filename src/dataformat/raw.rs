// Identity passthrough codec
//
// The whole body is one field, "value". Only chosen when the request
// declares a plain/opaque content type. A body that is not UTF-8 is held
// as lossy text with its original bytes in the hints, and is re-emitted
// verbatim until the field is overwritten.

use super::{original_bytes, scalar_to_string, Decoded, FieldValue, FormatHints, KvMap};
use crate::error::CodecError;

pub const RAW_KEY: &str = "value";

pub fn is_raw_mime(mime: &str) -> bool {
    mime == "text/plain" || mime == "application/octet-stream"
}

pub fn decode(raw: &[u8]) -> Result<Decoded, CodecError> {
    let mut hints = FormatHints::default();
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => {
            hints.raw_body = Some(raw.to_vec());
            String::from_utf8_lossy(raw).into_owned()
        }
    };
    let mut fields = KvMap::new();
    fields.set(RAW_KEY.to_string(), FieldValue::String(text));
    Ok(Decoded { fields, hints })
}

pub fn encode(fields: &KvMap, hints: &FormatHints) -> Result<Vec<u8>, CodecError> {
    match fields.get(RAW_KEY) {
        Some(value) => {
            let text = scalar_to_string(RAW_KEY, value)?;
            Ok(original_bytes(hints.raw_body.as_deref(), text))
        }
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let raw = b"line one\nline two &=; {}";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.fields.len(), 1);
        assert!(decoded.hints.raw_body.is_none());
        assert_eq!(encode(&decoded.fields, &decoded.hints).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_binary_round_trip() {
        let raw = [0x00, 0xff, 0x10];
        let decoded = decode(&raw).unwrap();
        assert_eq!(decoded.hints.raw_body.as_deref(), Some(&raw[..]));
        assert_eq!(encode(&decoded.fields, &decoded.hints).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_overwritten_binary_emits_new_text() {
        let mut decoded = decode(&[0xff, 0xfe]).unwrap();
        decoded
            .fields
            .set(RAW_KEY.to_string(), FieldValue::String("replaced".into()));
        assert_eq!(encode(&decoded.fields, &decoded.hints).unwrap(), b"replaced".to_vec());
    }

    #[test]
    fn test_deleted_value_encodes_empty() {
        assert!(encode(&KvMap::new(), &FormatHints::default()).unwrap().is_empty());
    }
}
