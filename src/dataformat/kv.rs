// Identity key/value codec (cookie-header syntax)
//
// "a=1; b=2" <-> {a: "1", b: "2"}. Duplicate names keep the first slot and
// the last value, matching how the pairs are folded on parse.

use super::{scalar_to_string, Decoded, FieldValue, KvMap};
use crate::error::CodecError;

/// Split one `Cookie` header line into name/value pairs
pub fn cookie_pairs(line: &str) -> Vec<(String, String)> {
    line.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (name.trim().to_string(), value.trim().to_string())
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

pub fn decode(raw: &[u8]) -> Result<Decoded, CodecError> {
    let text = String::from_utf8(raw.to_vec())?;
    let fields = cookie_pairs(&text)
        .into_iter()
        .map(|(k, v)| (k, FieldValue::String(v)))
        .collect();
    Ok(Decoded::new(fields))
}

pub fn encode(fields: &KvMap) -> Result<Vec<u8>, CodecError> {
    let mut pairs = Vec::with_capacity(fields.len());
    for (name, value) in fields.iter() {
        if name.contains(['=', ';']) {
            return Err(CodecError::Structure(format!("invalid pair name: {:?}", name)));
        }
        let text = scalar_to_string(name, value)?;
        if text.contains(';') {
            return Err(CodecError::Structure(format!("value of {} contains ';'", name)));
        }
        pairs.push(format!("{}={}", name, text));
    }
    Ok(pairs.join("; ").into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cookie_pairs() {
        let pairs = cookie_pairs("session=abc123;  __utma=111.222 ; theme=dark; flag;");
        assert_eq!(
            pairs,
            vec![
                ("session".to_string(), "abc123".to_string()),
                ("__utma".to_string(), "111.222".to_string()),
                ("theme".to_string(), "dark".to_string()),
                ("flag".to_string(), "".to_string()),
            ]
        );
    }

    #[test]
    fn test_round_trip() {
        let raw = b"session=abc123; __utma=111.222; theme=dark";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.fields.get("theme"), Some(&json!("dark")));
        assert_eq!(encode(&decoded.fields).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_value_with_equals() {
        let decoded = decode(b"token=abc==").unwrap();
        assert_eq!(decoded.fields.get("token"), Some(&json!("abc==")));
    }

    #[test]
    fn test_encode_rejects_separator() {
        let mut fields = KvMap::new();
        fields.set("a".to_string(), json!("x; injected=1"));
        assert!(encode(&fields).is_err());
    }
}
