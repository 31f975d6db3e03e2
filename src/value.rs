// Component Value
//
// Pairs a component's parsed, ordered structure with the codec that
// produced it and the format hints needed to re-encode it losslessly.
//
// Key paths: a dotted path through nested objects and arrays ("user.id",
// "items.0.sku"). Keys may contain dots of their own ("app.name", or a
// query key "a.b" repeated into "a.b.0"), so resolution tries the longest
// matching key at each level first and backs off when the rest of the
// path does not resolve beneath it. An exact top-level key always wins.
//
// Type coercion: set_parsed_value() receives wire text. When the field
// previously held a number or a bool and the new text parses as that type,
// the typed value is stored ("99" over 5 -> 99). Anything else is stored
// as a string ("abc" over 5 -> "abc").

use crate::dataformat::{Codec, FieldValue, FormatHints, KvMap};
use crate::error::CodecError;
use serde_json::Number;

#[derive(Debug, Clone, Default)]
pub struct Value {
    parsed: KvMap,
    codec: Option<Codec>,
    hints: FormatHints,
}

impl Value {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode raw fragment bytes with `codec`
    pub fn decode(codec: Codec, raw: &[u8]) -> Result<Self, CodecError> {
        let decoded = codec.decode(raw)?;
        Ok(Self {
            parsed: decoded.fields,
            codec: Some(codec),
            hints: decoded.hints,
        })
    }

    /// Install already-structured data (header/cookie/query pairs)
    pub fn set_parsed(&mut self, parsed: KvMap, codec: Option<Codec>) {
        self.parsed = parsed;
        self.codec = codec;
        self.hints = FormatHints::default();
    }

    pub fn parsed(&self) -> &KvMap {
        &self.parsed
    }

    pub fn codec(&self) -> Option<&Codec> {
        self.codec.as_ref()
    }

    pub fn hints(&self) -> &FormatHints {
        &self.hints
    }

    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty()
    }

    /// Split `path` into the concrete keys it addresses. Keys may contain
    /// dots themselves, so at each level the longest key that matches the
    /// remaining path is tried first, backing off to shorter ones.
    pub fn resolve<'p>(&self, path: &'p str) -> Option<Vec<&'p str>> {
        let mut segments = Vec::new();
        for key in matching_keys(self.parsed.keys().map(String::as_str), path) {
            let (head, tail) = path.split_at(key);
            segments.push(head);
            let found = match tail.strip_prefix('.') {
                None => true,
                Some(tail) => self
                    .parsed
                    .get(head)
                    .map_or(false, |child| resolve_in(child, tail, &mut segments)),
            };
            if found {
                return Some(segments);
            }
            segments.clear();
        }
        None
    }

    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        let segments = self.resolve(path)?;
        let (first, rest) = segments.split_first()?;
        let mut current = self.parsed.get(*first)?;
        for segment in rest {
            current = step(current, segment)?;
        }
        Some(current)
    }

    fn walk_mut(&mut self, segments: &[&str]) -> Option<&mut FieldValue> {
        let (first, rest) = segments.split_first()?;
        let mut current = self.parsed.get_mut(*first)?;
        for segment in rest {
            current = match current {
                FieldValue::Object(map) => map.get_mut(*segment)?,
                FieldValue::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Overwrite an existing field in place. Never adds a key; returns
    /// false when `path` does not resolve.
    pub fn set_parsed_value(&mut self, path: &str, value: &str) -> bool {
        let Some(segments) = self.resolve(path) else {
            return false;
        };
        match self.walk_mut(&segments) {
            Some(slot) => {
                *slot = coerce(slot, value);
                true
            }
            None => false,
        }
    }

    /// Remove a field; surviving fields keep their order.
    pub fn delete(&mut self, path: &str) -> bool {
        let Some(segments) = self.resolve(path) else {
            return false;
        };
        let Some((last, parent)) = segments.split_last() else {
            return false;
        };
        if parent.is_empty() {
            return self.parsed.remove(*last).is_some();
        }
        match self.walk_mut(parent) {
            Some(FieldValue::Object(map)) => map.shift_remove(*last).is_some(),
            Some(FieldValue::Array(items)) => match last.parse::<usize>() {
                Ok(i) if i < items.len() => {
                    items.remove(i);
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Serialize with the owning codec
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match &self.codec {
            Some(codec) => codec.encode(&self.parsed, &self.hints),
            None => Err(CodecError::Structure("value has no codec to encode with".into())),
        }
    }

    /// Leaf paths of one top-level entry, in structural order
    pub fn leaves_of<'a>(key: &str, value: &'a FieldValue) -> Vec<(String, &'a FieldValue)> {
        let mut out = Vec::new();
        flatten(key.to_string(), value, &mut out);
        out
    }

    /// Every leaf path of the structure, in structural order
    pub fn leaves(&self) -> Vec<(String, &FieldValue)> {
        let mut out = Vec::new();
        for (key, value) in self.parsed.iter() {
            flatten(key.clone(), value, &mut out);
        }
        out
    }
}

/// Byte lengths of the keys that `path` starts with, as a whole key or
/// followed by '.', longest first
fn matching_keys<'k>(keys: impl Iterator<Item = &'k str>, path: &str) -> Vec<usize> {
    let mut lens: Vec<usize> = keys
        .filter(|&k| {
            path.strip_prefix(k)
                .map_or(false, |rest| rest.is_empty() || rest.starts_with('.'))
        })
        .map(str::len)
        .collect();
    lens.sort_unstable_by(|a, b| b.cmp(a));
    lens
}

fn resolve_in<'p>(value: &FieldValue, rest: &'p str, segments: &mut Vec<&'p str>) -> bool {
    match value {
        FieldValue::Object(map) => {
            for key in matching_keys(map.keys().map(String::as_str), rest) {
                let (head, tail) = rest.split_at(key);
                segments.push(head);
                let found = match tail.strip_prefix('.') {
                    None => true,
                    Some(tail) => map
                        .get(head)
                        .map_or(false, |child| resolve_in(child, tail, segments)),
                };
                if found {
                    return true;
                }
                segments.pop();
            }
            false
        }
        FieldValue::Array(items) => {
            let (head, tail) = match rest.split_once('.') {
                Some((head, tail)) => (head, Some(tail)),
                None => (rest, None),
            };
            let Some(item) = head.parse::<usize>().ok().and_then(|i| items.get(i)) else {
                return false;
            };
            segments.push(head);
            let found = match tail {
                None => true,
                Some(tail) => resolve_in(item, tail, segments),
            };
            if !found {
                segments.pop();
            }
            found
        }
        _ => false,
    }
}

fn step<'a>(value: &'a FieldValue, segment: &str) -> Option<&'a FieldValue> {
    match value {
        FieldValue::Object(map) => map.get(segment),
        FieldValue::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

fn flatten<'a>(prefix: String, value: &'a FieldValue, out: &mut Vec<(String, &'a FieldValue)>) {
    match value {
        FieldValue::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                flatten(format!("{}.{}", prefix, k), v, out);
            }
        }
        FieldValue::Array(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                flatten(format!("{}.{}", prefix, i), v, out);
            }
        }
        leaf => out.push((prefix, leaf)),
    }
}

fn coerce(original: &FieldValue, value: &str) -> FieldValue {
    match original {
        FieldValue::Number(_) => {
            if let Ok(i) = value.parse::<i64>() {
                FieldValue::Number(i.into())
            } else if let Some(n) = value.parse::<f64>().ok().and_then(Number::from_f64) {
                FieldValue::Number(n)
            } else {
                FieldValue::String(value.to_string())
            }
        }
        FieldValue::Bool(_) => match value {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            _ => FieldValue::String(value.to_string()),
        },
        _ => FieldValue::String(value.to_string()),
    }
}
