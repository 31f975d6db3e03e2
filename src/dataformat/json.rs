// JSON object codec
//
// Top-level value must be an object. Nested objects and arrays stay
// structured; serde_json's preserve_order keeps keys in wire order.

use super::{Decoded, KvMap};
use crate::error::CodecError;
use serde_json::{Map, Value};

pub fn is_json_mime(mime: &str) -> bool {
    mime == "application/json" || mime == "text/json" || mime.ends_with("+json")
}

pub fn sniff(window: &[u8]) -> bool {
    window
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map_or(false, |&b| b == b'{')
}

pub fn decode(raw: &[u8]) -> Result<Decoded, CodecError> {
    let parsed: Value = serde_json::from_slice(raw)?;
    let object = match parsed {
        Value::Object(object) => object,
        other => {
            return Err(CodecError::Structure(format!(
                "top-level JSON value is not an object: {}",
                type_name(&other)
            )))
        }
    };
    Ok(Decoded::new(object.into_iter().collect()))
}

pub fn encode(fields: &KvMap) -> Result<Vec<u8>, CodecError> {
    let mut object = Map::new();
    for (k, v) in fields.iter() {
        object.insert(k.clone(), v.clone());
    }
    Ok(serde_json::to_vec(&Value::Object(object))?)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
