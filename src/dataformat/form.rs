// application/x-www-form-urlencoded codec

use super::{occurrences, push_occurrence, scalar_to_string, Decoded, FieldValue, KvMap};
use crate::error::CodecError;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // One line of k=v pairs; keys limited to the characters forms actually use
    static ref FORM_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9_.\-~%+\[\]]+=[^&\s]*(?:&[A-Za-z0-9_.\-~%+\[\]]+=[^&\s]*)*&?$").unwrap();
}

pub fn sniff(window: &[u8]) -> bool {
    let text = String::from_utf8_lossy(window);
    let text = text.trim_end_matches(['\r', '\n']);
    // A window cut mid-pair would not match; judge the complete pairs only
    let text = if window.len() == super::SNIFF_LIMIT {
        match text.rfind('&') {
            Some(i) => &text[..i],
            None => text,
        }
    } else {
        text
    };
    !text.is_empty() && FORM_PATTERN.is_match(text)
}

pub fn decode(raw: &[u8]) -> Result<Decoded, CodecError> {
    let text = String::from_utf8(raw.to_vec())?;
    let mut fields = KvMap::new();
    for pair in text.trim_end_matches(['\r', '\n']).split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        push_occurrence(&mut fields, unescape(key)?, FieldValue::String(unescape(value)?));
    }
    Ok(Decoded::new(fields))
}

pub fn encode(fields: &KvMap) -> Result<Vec<u8>, CodecError> {
    let mut pairs = Vec::new();
    for (key, value) in fields.iter() {
        for occurrence in occurrences(value) {
            let text = scalar_to_string(key, occurrence)?;
            pairs.push(format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&text)
            ));
        }
    }
    Ok(pairs.join("&").into_bytes())
}

fn unescape(s: &str) -> Result<String, CodecError> {
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| CodecError::Form(format!("invalid percent-encoding in {:?}: {}", s, e)))
}
