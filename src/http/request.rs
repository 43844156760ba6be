//! Parsed request units.
//!
//! # Responsibilities
//! - Hold one fully-framed HTTP/1.x request (head + body)
//! - Case-insensitive header access, `Connection` token checks
//! - Cookie lookup for session resolution
//! - Conversion into an `http::Request` for tower services

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, Uri, Version};

/// One fully-parsed HTTP request read off a connection.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, target: impl Into<String>, version: Version, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            target: target.into(),
            version,
            headers,
            body,
        }
    }

    /// Build a bodiless HTTP/1.1 request from `(name, value)` pairs.
    ///
    /// Pairs that are not valid header names or values are skipped.
    pub fn get(target: &str, headers: &[(&str, &str)]) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::from_bytes(name.as_bytes()),
                header::HeaderValue::from_str(value),
            ) {
                map.append(name, value);
            }
        }
        Self::new(Method::GET, target, Version::HTTP_11, map, Bytes::new())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The raw request target as it appeared on the request line.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Path component of the target, without the query string.
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("/")
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Header value as a string; multiple values are joined with `", "`.
    pub fn header(&self, name: &str) -> Option<String> {
        let mut values = self
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .peekable();
        values.peek()?;
        Some(values.collect::<Vec<_>>().join(", "))
    }

    /// Lowercased `Connection` header contains "upgrade".
    pub fn wants_upgrade(&self) -> bool {
        self.header("connection")
            .map(|v| v.to_ascii_lowercase().contains("upgrade"))
            .unwrap_or(false)
    }

    /// Lowercased `Upgrade` header value, empty when absent.
    pub fn upgrade_protocol(&self) -> String {
        self.header("upgrade")
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Look up a cookie by name across all `Cookie` headers.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value.trim().trim_matches('"').to_string())
    }

    /// Convert into a request a tower service can handle.
    pub fn into_http(self) -> Result<Request<Body>, axum::http::Error> {
        let uri = Uri::try_from(self.target.as_str())?;
        let mut request = Request::builder()
            .method(self.method)
            .uri(uri)
            .version(self.version)
            .body(Body::from(self.body))?;
        *request.headers_mut() = self.headers;
        Ok(request)
    }
}
