// multipart/form-data codec
//
// The boundary is bound once, from the Content-Type `boundary=` parameter
// or sniffed from the first delimiter line, and reused when encoding so the
// rebuilt body matches the unchanged request header. File parts keep their
// filename and part Content-Type in FormatHints. Parsing is byte-level:
// a part body that is not UTF-8 (an image upload) is kept verbatim and
// re-emitted byte for byte unless its field is overwritten.

use super::{
    content_type_param, mime_type, occurrences, original_bytes, push_occurrence,
    scalar_to_string, Decoded, FieldValue, FormatHints, KvMap, PartMeta,
};
use crate::error::CodecError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartCodec {
    pub boundary: Option<String>,
}

impl MultipartCodec {
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: Some(boundary.into()),
        }
    }

    /// Bind the boundary for one body: declared parameter first, then the
    /// first delimiter line of the body.
    pub fn bind(content_type: Option<&str>, raw: &[u8]) -> Self {
        let declared = content_type
            .filter(|ct| mime_type(ct) == "multipart/form-data")
            .and_then(|ct| content_type_param(ct, "boundary"))
            .filter(|b| !b.is_empty());
        Self {
            boundary: declared.or_else(|| sniff_boundary(raw)),
        }
    }

    fn boundary(&self) -> Result<&str, CodecError> {
        self.boundary
            .as_deref()
            .ok_or_else(|| CodecError::Multipart("missing boundary".into()))
    }

    pub fn decode(&self, raw: &[u8]) -> Result<Decoded, CodecError> {
        let delimiter = format!("--{}", self.boundary()?).into_bytes();
        let mut closing = b"\n".to_vec();
        closing.extend_from_slice(&delimiter);

        let start = find(raw, &delimiter)
            .ok_or_else(|| CodecError::Multipart("boundary not found in body".into()))?;
        let mut rest = &raw[start + delimiter.len()..];
        let mut fields = KvMap::new();
        let mut hints = FormatHints::default();

        loop {
            if rest.starts_with(b"--") {
                break;
            }
            rest = strip_line_break(rest)
                .ok_or_else(|| CodecError::Multipart("expected line break after boundary".into()))?;

            let (head_end, body_start) = split_head(rest)
                .ok_or_else(|| CodecError::Multipart("part headers not terminated".into()))?;
            let head = std::str::from_utf8(&rest[..head_end])
                .map_err(|_| CodecError::Multipart("part headers are not UTF-8".into()))?;
            let after = &rest[body_start..];
            let end = find(after, &closing)
                .ok_or_else(|| CodecError::Multipart("unterminated part".into()))?;
            let body = after[..end].strip_suffix(b"\r").unwrap_or(&after[..end]);

            let mut meta = parse_part_head(head)?;
            let text = match std::str::from_utf8(body) {
                Ok(text) => text.to_string(),
                // Binary content: the field carries a lossy view, the bytes ride in the hints
                Err(_) => {
                    meta.raw = Some(body.to_vec());
                    String::from_utf8_lossy(body).into_owned()
                }
            };
            push_occurrence(&mut fields, meta.name.clone(), FieldValue::String(text));
            hints.parts.push(meta);

            rest = &after[end + closing.len()..];
        }

        Ok(Decoded { fields, hints })
    }

    pub fn encode(&self, fields: &KvMap, hints: &FormatHints) -> Result<Vec<u8>, CodecError> {
        let boundary = self.boundary()?;
        let mut out = Vec::new();
        for (name, value) in fields.iter() {
            let mut metas = hints.parts.iter().filter(|p| &p.name == name);
            for occurrence in occurrences(value) {
                let text = scalar_to_string(name, occurrence)?;
                let meta = metas.next();

                let mut head = format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
                    boundary,
                    quote(name)
                );
                if let Some(filename) = meta.and_then(|m| m.filename.as_ref()) {
                    head.push_str(&format!("; filename=\"{}\"", quote(filename)));
                }
                head.push_str("\r\n");
                if let Some(content_type) = meta.and_then(|m| m.content_type.as_ref()) {
                    head.push_str(&format!("Content-Type: {}\r\n", content_type));
                }
                head.push_str("\r\n");

                out.extend_from_slice(head.as_bytes());
                out.extend_from_slice(&original_bytes(meta.and_then(|m| m.raw.as_deref()), text));
                out.extend_from_slice(b"\r\n");
            }
        }
        out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        Ok(out)
    }
}

pub fn sniff(window: &[u8]) -> bool {
    let text = String::from_utf8_lossy(window);
    text.starts_with("--")
        && sniff_boundary(window).is_some()
        && text.to_ascii_lowercase().contains("content-disposition: form-data")
}

fn sniff_boundary(raw: &[u8]) -> Option<String> {
    let line_end = raw.iter().position(|&b| b == b'\n')?;
    let line = std::str::from_utf8(&raw[..line_end]).ok()?;
    let boundary = line.strip_prefix("--")?.trim_end_matches('\r');
    if boundary.is_empty() || boundary.contains(char::is_whitespace) {
        None
    } else {
        Some(boundary.to_string())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn strip_line_break(s: &[u8]) -> Option<&[u8]> {
    s.strip_prefix(b"\r\n").or_else(|| s.strip_prefix(b"\n"))
}

/// Locate the end of the part headers; returns (headers end, body offset)
fn split_head(s: &[u8]) -> Option<(usize, usize)> {
    let crlf = find(s, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(s, b"\n\n").map(|i| (i, 2));
    let (i, len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (a, b) => a.or(b)?,
    };
    Some((i, i + len))
}

fn parse_part_head(head: &str) -> Result<PartMeta, CodecError> {
    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in head.lines() {
        let Some((header, value)) = line.split_once(':') else {
            return Err(CodecError::Multipart(format!("invalid part header: {}", line)));
        };
        let header = header.trim();
        if header.eq_ignore_ascii_case("content-disposition") {
            for param in value.split(';').skip(1) {
                if let Some((k, v)) = param.split_once('=') {
                    let v = unquote(v.trim());
                    match k.trim().to_ascii_lowercase().as_str() {
                        "name" => name = Some(v),
                        "filename" => filename = Some(v),
                        _ => {}
                    }
                }
            }
        } else if header.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let name = name.ok_or_else(|| CodecError::Multipart("part without a name".into()))?;
    Ok(PartMeta {
        name,
        filename,
        content_type,
        raw: None,
    })
}

fn unquote(v: &str) -> String {
    v.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(|s| s.replace("\\\"", "\""))
        .unwrap_or_else(|| v.to_string())
}

fn quote(v: &str) -> String {
    v.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BODY: &str = "--XyZ\r\n\
Content-Disposition: form-data; name=\"user\"\r\n\
\r\n\
alice\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"avatar\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
file body\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"tag\"\r\n\
\r\n\
one\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"tag\"\r\n\
\r\n\
two\r\n\
--XyZ--\r\n";

    #[test]
    fn test_decode() {
        let codec = MultipartCodec::with_boundary("XyZ");
        let decoded = codec.decode(BODY.as_bytes()).unwrap();
        let keys: Vec<&String> = decoded.fields.keys().collect();
        assert_eq!(keys, vec!["user", "avatar", "tag"]);
        assert_eq!(decoded.fields.get("user"), Some(&json!("alice")));
        assert_eq!(decoded.fields.get("avatar"), Some(&json!("file body")));
        assert_eq!(decoded.fields.get("tag"), Some(&json!(["one", "two"])));
        assert_eq!(decoded.hints.parts[1].filename.as_deref(), Some("a.txt"));
        assert_eq!(decoded.hints.parts[1].content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let codec = MultipartCodec::with_boundary("XyZ");
        let decoded = codec.decode(BODY.as_bytes()).unwrap();
        let encoded = codec.encode(&decoded.fields, &decoded.hints).unwrap();
        assert_eq!(String::from_utf8(encoded).unwrap(), BODY);
    }

    fn png_upload() -> Vec<u8> {
        let mut body = b"--XyZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nholiday\r\n\
--XyZ\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"p.png\"\r\n\
Content-Type: image/png\r\n\r\n"
            .to_vec();
        body.extend_from_slice(&[0x89, b'P', b'N', b'G', 0xff, 0xfe, 0x00]);
        body.extend_from_slice(b"\r\n--XyZ--\r\n");
        body
    }

    #[test]
    fn test_binary_part_round_trip() {
        let codec = MultipartCodec::with_boundary("XyZ");
        let body = png_upload();
        let decoded = codec.decode(&body).unwrap();
        assert_eq!(
            decoded.hints.parts[1].raw.as_deref(),
            Some(&[0x89, b'P', b'N', b'G', 0xff, 0xfe, 0x00][..])
        );
        assert!(decoded.hints.parts[0].raw.is_none());
        assert_eq!(codec.encode(&decoded.fields, &decoded.hints).unwrap(), body);
    }

    #[test]
    fn test_binary_part_survives_sibling_edit() {
        let codec = MultipartCodec::with_boundary("XyZ");
        let body = png_upload();
        let mut decoded = codec.decode(&body).unwrap();
        decoded.fields.set("title".to_string(), json!("x"));
        let encoded = codec.encode(&decoded.fields, &decoded.hints).unwrap();
        let holiday = find(&body, b"holiday").unwrap();
        let mut expected = body[..holiday].to_vec();
        expected.push(b'x');
        expected.extend_from_slice(&body[holiday + "holiday".len()..]);
        assert_eq!(encoded, expected);

        // Overwriting the binary field emits the new text instead
        decoded.fields.set("photo".to_string(), json!("<script>"));
        let encoded = codec.encode(&decoded.fields, &decoded.hints).unwrap();
        assert!(find(&encoded, b"\r\n\r\n<script>\r\n").is_some());
        assert!(find(&encoded, &[0xff, 0xfe]).is_none());
    }

    #[test]
    fn test_empty_part_value() {
        let body = "--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n\r\n--b--\r\n";
        let decoded = MultipartCodec::with_boundary("b").decode(body.as_bytes()).unwrap();
        assert_eq!(decoded.fields.get("a"), Some(&json!("")));
    }

    #[test]
    fn test_bind_boundary() {
        let bound = MultipartCodec::bind(Some("multipart/form-data; boundary=abc"), b"");
        assert_eq!(bound.boundary.as_deref(), Some("abc"));

        let sniffed = MultipartCodec::bind(None, BODY.as_bytes());
        assert_eq!(sniffed.boundary.as_deref(), Some("XyZ"));
    }

    #[test]
    fn test_malformed() {
        let codec = MultipartCodec::with_boundary("XyZ");
        assert!(codec.decode(b"no boundary here").is_err());
        assert!(codec
            .decode(b"--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nunterminated")
            .is_err());
        assert!(MultipartCodec::default().decode(BODY.as_bytes()).is_err());
    }

    #[test]
    fn test_sniff() {
        assert!(sniff(BODY.as_bytes()));
        assert!(!sniff(b"a=1&b=2"));
    }
}
