// Async HTTP engine for rebuilt requests
// Uses reqwest and tokio; the component layer itself never touches the network

use crate::models::{HttpRequest, Method};
use reqwest::{Client, Request, Response};
use tracing::debug;

pub struct AttackEngine {
    pub client: Client,
}

/// Headers reqwest derives from the URL and body itself
const TRANSPORT_HEADERS: &[&str] = &["host", "content-length"];

fn reqwest_method(method: &Method) -> reqwest::Method {
    match method {
        Method::GET => reqwest::Method::GET,
        Method::POST => reqwest::Method::POST,
        Method::PUT => reqwest::Method::PUT,
        Method::DELETE => reqwest::Method::DELETE,
        Method::PATCH => reqwest::Method::PATCH,
        Method::OPTIONS => reqwest::Method::OPTIONS,
        Method::HEAD => reqwest::Method::HEAD,
    }
}

impl AttackEngine {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().pool_max_idle_per_host(10).build()?;
        Ok(Self { client })
    }

    /// Translate a rebuilt request into a reqwest request without sending it
    pub fn prepare(&self, req: &HttpRequest) -> Result<Request, reqwest::Error> {
        let mut builder = self
            .client
            .request(reqwest_method(&req.method), req.url.clone());
        for (name, value) in &req.headers {
            if TRANSPORT_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }
        builder.build()
    }

    pub async fn send(&self, req: &HttpRequest) -> Result<Response, reqwest::Error> {
        let request = self.prepare(req)?;
        debug!(method = %req.method, url = %req.url, "sending request");
        self.client.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_copies_request() {
        let engine = AttackEngine::new().unwrap();
        let req = HttpRequest::new(Method::POST, "https://example.com/api?x=1")
            .unwrap()
            .with_header("Host", "example.com")
            .with_header("X-Token", "abc")
            .with_header("Cookie", "a=1")
            .with_body("payload");

        let prepared = engine.prepare(&req).unwrap();
        assert_eq!(prepared.method(), &reqwest::Method::POST);
        assert_eq!(prepared.url().as_str(), "https://example.com/api?x=1");
        assert_eq!(prepared.headers()["x-token"], "abc");
        assert_eq!(prepared.headers()["cookie"], "a=1");
        assert!(prepared.headers().get("host").is_none());
        assert!(prepared.headers().get("content-length").is_none());
        assert_eq!(prepared.body().and_then(|b| b.as_bytes()), Some(&b"payload"[..]));
    }

    #[test]
    fn test_prepare_rejects_invalid_header() {
        let engine = AttackEngine::new().unwrap();
        let req = HttpRequest::new(Method::GET, "https://example.com/")
            .unwrap()
            .with_header("Bad Header", "x");
        assert!(engine.prepare(&req).is_err());
    }
}
