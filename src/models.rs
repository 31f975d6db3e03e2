// Core data models for Doppel
//
// HttpRequest is the captured source request every component parses from.
// It is a plain owned value: Clone gives an independent snapshot, so a
// rebuilt request never shares state with the capture it came from.

use crate::dataformat::kv::cookie_pairs;
use crate::error::RequestError;
use std::fmt;
use std::str::FromStr;
use url::{Position, Url};

/// Supported HTTP methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    HEAD,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
            Method::PUT => write!(f, "PUT"),
            Method::DELETE => write!(f, "DELETE"),
            Method::PATCH => write!(f, "PATCH"),
            Method::OPTIONS => write!(f, "OPTIONS"),
            Method::HEAD => write!(f, "HEAD"),
        }
    }
}

impl FromStr for Method {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "PATCH" => Ok(Method::PATCH),
            "OPTIONS" => Ok(Method::OPTIONS),
            "HEAD" => Ok(Method::HEAD),
            _ => Err(RequestError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// A captured HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    /// Headers in wire order; names keep their original case
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, url: &str) -> Result<Self, RequestError> {
        Ok(Self {
            method,
            url: Url::parse(url)?,
            headers: Vec::new(),
            body: Vec::new(),
        })
    }

    /// Builder-style header append
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Builder-style body; also sets Content-Length
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.set_body(body.into());
        self
    }

    /// First value of a header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Replace the first occurrence in place and drop the rest; append when
    /// the header is absent.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self.headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(i) => {
                self.headers[i].1 = value.to_string();
                let mut seen = 0;
                self.headers.retain(|(k, _)| {
                    if k.eq_ignore_ascii_case(name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.add_header(name, value),
        }
    }

    /// Remove every occurrence; returns how many were removed
    pub fn remove_header(&mut self, name: &str) -> usize {
        let before = self.headers.len();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before - self.headers.len()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Cookie name/value pairs across every Cookie header, in wire order
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.header_values("Cookie")
            .into_iter()
            .flat_map(cookie_pairs)
            .collect()
    }

    /// Append a cookie to the existing Cookie header, or start one
    pub fn add_cookie(&mut self, name: &str, value: &str) {
        let pair = format!("{}={}", name, value);
        match self.headers.iter().position(|(k, _)| k.eq_ignore_ascii_case("Cookie")) {
            Some(i) if !self.headers[i].1.is_empty() => {
                self.headers[i].1.push_str("; ");
                self.headers[i].1.push_str(&pair);
            }
            Some(i) => self.headers[i].1 = pair,
            None => self.add_header("Cookie", &pair),
        }
    }

    /// Replace the body and keep Content-Length in step with it
    pub fn set_body(&mut self, body: Vec<u8>) {
        if !body.is_empty() || self.header("Content-Length").is_some() {
            self.set_header("Content-Length", &body.len().to_string());
        }
        self.body = body;
    }

    /// Parse an HTTP/1.x request dump as captured by an intercepting proxy.
    /// Relative targets are resolved against the Host header over https.
    pub fn from_raw(raw: &str) -> Result<Self, RequestError> {
        Self::from_raw_with_scheme(raw, "https")
    }

    pub fn from_raw_with_scheme(raw: &str, scheme: &str) -> Result<Self, RequestError> {
        let (head, body) = match raw.find("\r\n\r\n") {
            Some(i) => (&raw[..i], &raw[i + 4..]),
            None => match raw.find("\n\n") {
                Some(i) => (&raw[..i], &raw[i + 2..]),
                None => (raw.trim_end_matches(['\r', '\n']), ""),
            },
        };

        let mut lines = head.lines();
        let request_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| RequestError::InvalidRequestLine(String::new()))?;
        let mut parts = request_line.split_whitespace();
        let (method, target) = match (parts.next(), parts.next()) {
            (Some(m), Some(t)) => (m, t),
            _ => return Err(RequestError::InvalidRequestLine(request_line.to_string())),
        };
        let method = method.parse::<Method>()?;

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| RequestError::InvalidHeader(line.to_string()))?;
            if name.trim().is_empty() {
                return Err(RequestError::InvalidHeader(line.to_string()));
            }
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let url = if target.starts_with("http://") || target.starts_with("https://") {
            Url::parse(target)?
        } else {
            let host = headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("Host"))
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| RequestError::MissingHost(target.to_string()))?;
            Url::parse(&format!("{}://{}{}", scheme, host, target))?
        };

        Ok(Self {
            method,
            url,
            headers,
            body: body.as_bytes().to_vec(),
        })
    }

    /// Origin-form request target: path plus query
    pub fn target(&self) -> &str {
        &self.url[Position::BeforePath..Position::AfterQuery]
    }

    /// Render back to an HTTP/1.1 request dump
    pub fn to_raw(&self) -> String {
        let mut out = format!("{} {} HTTP/1.1\r\n", self.method, self.target());
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("\r\n");
        out.push_str(&String::from_utf8_lossy(&self.body));
        out
    }
}
