// XML markup-tree codec
//
// Decodes a document into {root_name: tree}. Within the tree:
//   - element with only text      -> string
//   - element with attrs/children -> object ("@attr" keys first, then children)
//   - repeated sibling elements   -> array
//   - text next to attrs/children -> "#text"
// The <?xml ...?> declaration survives in FormatHints; comments, processing
// instructions and DOCTYPE are dropped.

use super::{scalar_to_string, Decoded, FieldValue, FormatHints, KvMap};
use crate::error::CodecError;
use serde_json::Map;

const TEXT_KEY: &str = "#text";
const ATTR_PREFIX: char = '@';
/// Deepest element nesting accepted, matching serde_json's recursion limit
const MAX_DEPTH: usize = 128;

pub fn is_xml_mime(mime: &str) -> bool {
    mime == "application/xml" || mime == "text/xml" || mime.ends_with("+xml")
}

/// An XML declaration, or a non-HTML root element after optional comments
/// and a non-HTML DOCTYPE.
pub fn sniff(window: &[u8]) -> bool {
    let text = String::from_utf8_lossy(window);
    let mut rest = text.trim_start();
    loop {
        if rest.starts_with("<?xml") {
            return true;
        }
        if let Some(after) = rest.strip_prefix("<!--") {
            match after.find("-->") {
                Some(i) => rest = after[i + 3..].trim_start(),
                None => return false,
            }
            continue;
        }
        if rest.get(..9).map_or(false, |p| p.eq_ignore_ascii_case("<!doctype")) {
            let after = &rest[9..];
            if starts_with_html(after.trim_start()) {
                return false;
            }
            match after.find('>') {
                Some(i) => rest = after[i + 1..].trim_start(),
                None => return false,
            }
            continue;
        }
        let Some(after) = rest.strip_prefix('<') else {
            return false;
        };
        return after.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') && !starts_with_html(after);
    }
}

fn starts_with_html(s: &str) -> bool {
    s.get(..4).map_or(false, |p| p.eq_ignore_ascii_case("html"))
        && !s[4..].starts_with(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

pub fn decode(raw: &[u8]) -> Result<Decoded, CodecError> {
    let text = String::from_utf8(raw.to_vec())?;
    let mut parser = Parser::new(&text);

    parser.skip_whitespace();
    let mut hints = FormatHints::default();
    if parser.rest().starts_with("<?xml") {
        let end = parser
            .rest()
            .find("?>")
            .ok_or_else(|| CodecError::Xml("unterminated XML declaration".into()))?;
        hints.xml_declaration = Some(parser.rest()[..end + 2].to_string());
        parser.advance(end + 2);
    }

    parser.skip_misc()?;
    let (name, tree) = parser.parse_element(1)?;
    parser.skip_misc()?;
    if !parser.rest().is_empty() {
        return Err(CodecError::Xml("content after root element".into()));
    }

    let mut fields = KvMap::new();
    fields.set(name, tree);
    Ok(Decoded { fields, hints })
}

pub fn encode(fields: &KvMap, hints: &FormatHints) -> Result<Vec<u8>, CodecError> {
    if fields.len() != 1 {
        return Err(CodecError::Structure(format!(
            "XML document needs exactly one root element, found {}",
            fields.len()
        )));
    }
    let mut out = String::new();
    if let Some(declaration) = &hints.xml_declaration {
        out.push_str(declaration);
    }
    for (name, tree) in fields.iter() {
        if matches!(tree, FieldValue::Array(_)) {
            return Err(CodecError::Structure("XML root element cannot repeat".into()));
        }
        write_element(&mut out, name, tree)?;
    }
    Ok(out.into_bytes())
}

fn write_element(out: &mut String, name: &str, value: &FieldValue) -> Result<(), CodecError> {
    validate_name(name)?;
    match value {
        FieldValue::Array(items) => {
            for item in items {
                if matches!(item, FieldValue::Array(_)) {
                    return Err(CodecError::Structure(format!("nested array under <{}>", name)));
                }
                write_element(out, name, item)?;
            }
        }
        FieldValue::Object(map) => {
            out.push('<');
            out.push_str(name);
            for (k, v) in map {
                if let Some(attr) = k.strip_prefix(ATTR_PREFIX) {
                    validate_name(attr)?;
                    let text = scalar_to_string(k, v)?;
                    out.push_str(&format!(" {}=\"{}\"", attr, escape(&text, true)));
                }
            }
            let has_content = map.keys().any(|k| !k.starts_with(ATTR_PREFIX));
            if !has_content {
                out.push_str("/>");
                return Ok(());
            }
            out.push('>');
            for (k, v) in map {
                if k == TEXT_KEY {
                    out.push_str(&escape(&scalar_to_string(k, v)?, false));
                } else if !k.starts_with(ATTR_PREFIX) {
                    write_element(out, k, v)?;
                }
            }
            out.push_str(&format!("</{}>", name));
        }
        scalar => {
            let text = scalar_to_string(name, scalar)?;
            out.push_str(&format!("<{}>{}</{}>", name, escape(&text, false), name));
        }
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), CodecError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if valid {
        Ok(())
    } else {
        Err(CodecError::Structure(format!("invalid XML name: {:?}", name)))
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\'' if attribute => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let c = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                        u32::from_str_radix(hex, 16).ok()
                    } else if let Some(dec) = entity.strip_prefix('#') {
                        dec.parse::<u32>().ok()
                    } else {
                        None
                    };
                    code.and_then(char::from_u32)
                }
            };
            c.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                // Unknown entity: keep it verbatim
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn expect(&mut self, token: &str) -> Result<(), CodecError> {
        if self.rest().starts_with(token) {
            self.advance(token.len());
            Ok(())
        } else {
            Err(CodecError::Xml(format!("expected {:?} at byte {}", token, self.pos)))
        }
    }

    fn skip_until(&mut self, terminator: &str) -> Result<(), CodecError> {
        match self.rest().find(terminator) {
            Some(i) => {
                self.advance(i + terminator.len());
                Ok(())
            }
            None => Err(CodecError::Xml(format!("missing {:?}", terminator))),
        }
    }

    /// Skip whitespace, comments, processing instructions and DOCTYPE
    fn skip_misc(&mut self) -> Result<(), CodecError> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("<!--") {
                self.skip_until("-->")?;
            } else if rest.starts_with("<?") {
                self.skip_until("?>")?;
            } else if rest.starts_with("<!DOCTYPE") || rest.starts_with("<!doctype") {
                self.skip_until(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn read_name(&mut self) -> Result<String, CodecError> {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '/' | '>' | '='))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(CodecError::Xml(format!("expected a name at byte {}", self.pos)));
        }
        self.advance(end);
        Ok(rest[..end].to_string())
    }

    fn parse_element(&mut self, depth: usize) -> Result<(String, FieldValue), CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::Xml(format!("nesting too deep at byte {}", self.pos)));
        }
        self.expect("<")?;
        let name = self.read_name()?;
        let mut node = Map::new();

        loop {
            self.skip_whitespace();
            if self.rest().starts_with("/>") {
                self.advance(2);
                return Ok((name, finish(node, String::new())));
            }
            if self.rest().starts_with('>') {
                self.advance(1);
                break;
            }
            let attr = self.read_name()?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let quote = match self.rest().chars().next() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(CodecError::Xml(format!("unquoted attribute {}", attr))),
            };
            self.advance(1);
            let end = self
                .rest()
                .find(quote)
                .ok_or_else(|| CodecError::Xml(format!("unterminated attribute {}", attr)))?;
            let value = unescape(&self.rest()[..end]);
            self.advance(end + 1);
            node.insert(format!("{}{}", ATTR_PREFIX, attr), FieldValue::String(value));
        }

        let mut text = String::new();
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(CodecError::Xml(format!("unclosed element <{}>", name)));
            }
            if rest.starts_with("</") {
                self.advance(2);
                let closing = self.read_name()?;
                if closing != name {
                    return Err(CodecError::Xml(format!(
                        "mismatched closing tag </{}> for <{}>",
                        closing, name
                    )));
                }
                self.skip_whitespace();
                self.expect(">")?;
                return Ok((name, finish(node, text)));
            } else if rest.starts_with("<!--") {
                self.skip_until("-->")?;
            } else if rest.starts_with("<![CDATA[") {
                self.advance("<![CDATA[".len());
                let end = self
                    .rest()
                    .find("]]>")
                    .ok_or_else(|| CodecError::Xml("unterminated CDATA section".into()))?;
                text.push_str(&self.rest()[..end]);
                self.advance(end + 3);
            } else if rest.starts_with("<?") {
                self.skip_until("?>")?;
            } else if rest.starts_with('<') {
                let (child, value) = self.parse_element(depth + 1)?;
                insert_child(&mut node, child, value);
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                text.push_str(&unescape(&rest[..end]));
                self.advance(end);
            }
        }
    }
}

fn insert_child(node: &mut Map<String, FieldValue>, name: String, value: FieldValue) {
    match node.get_mut(&name) {
        Some(FieldValue::Array(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::replace(existing, FieldValue::Null);
            *existing = FieldValue::Array(vec![first, value]);
        }
        None => {
            node.insert(name, value);
        }
    }
}

fn finish(mut node: Map<String, FieldValue>, text: String) -> FieldValue {
    if node.is_empty() {
        return FieldValue::String(text);
    }
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        node.insert(TEXT_KEY.to_string(), FieldValue::String(trimmed.to_string()));
    }
    FieldValue::Object(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_tree() {
        let raw = br#"<?xml version="1.0"?>
<user id="7">
  <name>alice</name>
  <role>admin</role>
  <role>ops</role>
  <!-- ignored -->
  <bio>a &amp; b &#65;</bio>
</user>"#;
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.hints.xml_declaration.as_deref(), Some(r#"<?xml version="1.0"?>"#));
        assert_eq!(
            decoded.fields.get("user"),
            Some(&json!({
                "@id": "7",
                "name": "alice",
                "role": ["admin", "ops"],
                "bio": "a & b A"
            }))
        );
    }

    #[test]
    fn test_round_trip() {
        let raw = br#"<?xml version="1.0" encoding="UTF-8"?><order id="1"><item sku="a&lt;b">2</item><item>3</item><note>x &amp; y</note><empty/></order>"#;
        let decoded = decode(raw).unwrap();
        let encoded = encode(&decoded.fields, &decoded.hints).unwrap();
        let again = decode(&encoded).unwrap();
        assert_eq!(again.fields, decoded.fields);
        assert_eq!(again.hints, decoded.hints);
        let keys: Vec<&String> = again.fields.keys().collect();
        assert_eq!(keys, vec!["order"]);
    }

    #[test]
    fn test_encode_escapes() {
        let mut fields = KvMap::new();
        fields.set("q".to_string(), json!("<script>&"));
        let encoded = encode(&fields, &FormatHints::default()).unwrap();
        assert_eq!(String::from_utf8(encoded).unwrap(), "<q>&lt;script&gt;&amp;</q>");
    }

    #[test]
    fn test_mixed_text_and_children() {
        let decoded = decode(b"<p>hello <b>world</b></p>").unwrap();
        assert_eq!(decoded.fields.get("p"), Some(&json!({"b": "world", "#text": "hello"})));
    }

    #[test]
    fn test_cdata() {
        let decoded = decode(b"<a><![CDATA[<raw> & stuff]]></a>").unwrap();
        assert_eq!(decoded.fields.get("a"), Some(&json!("<raw> & stuff")));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(decode(b"<a><b></a>").is_err());
        assert!(decode(b"<a>").is_err());
        assert!(decode(b"<a></a><b></b>").is_err());
        assert!(decode(b"<a x=1></a>").is_err());
        assert!(decode(b"plain text").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let depth = 200_000;
        let raw = format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));
        let err = decode(raw.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("nesting too deep"));

        let limit = format!("{}x{}", "<a>".repeat(MAX_DEPTH), "</a>".repeat(MAX_DEPTH));
        assert!(decode(limit.as_bytes()).is_ok());
        let over = format!("<b>{}</b>", limit);
        assert!(decode(over.as_bytes()).is_err());
    }

    #[test]
    fn test_encode_rejects_multiple_roots() {
        let mut fields = KvMap::new();
        fields.set("a".to_string(), json!("1"));
        fields.set("b".to_string(), json!("2"));
        assert!(encode(&fields, &FormatHints::default()).is_err());
    }

    #[test]
    fn test_sniff() {
        assert!(sniff(b"  <?xml version=\"1.0\"?><a/>"));
        assert!(sniff(b"<root></root>"));
        assert!(!sniff(b"{\"a\":1}"));
        assert!(!sniff(b"< notxml"));
    }

    #[test]
    fn test_sniff_skips_prolog_but_not_html() {
        assert!(sniff(b"<!-- note --><!DOCTYPE order><order/>"));
        assert!(sniff(b"<htmlish/>"));
        assert!(!sniff(b"<!DOCTYPE html><html><body></body></html>"));
        assert!(!sniff(b"<!doctype HTML>"));
        assert!(!sniff(b"<html lang=\"en\"></html>"));
        assert!(!sniff(b"<!-- unterminated"));
    }
}
