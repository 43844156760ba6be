//! Response header serialization.
//!
//! # Responsibilities
//! - Carry a status line and header set for one response
//! - Serialize to HTTP/1.1 wire bytes
//!
//! # Design Decisions
//! - `Content-Length` is filled in from the body when the caller did not set it
//! - Body bytes are written separately; the header never owns them

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};

/// Status and headers of one outgoing response.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseHeader {
    /// A response with the given status and no headers.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Replace any existing value for `name`.
    pub fn set_raw_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Serialize the status line and headers for a body of `body_len` bytes.
    pub fn to_bytes(&self, body_len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.headers.len() * 32);
        out.extend_from_slice(b"HTTP/1.1 ");
        out.extend_from_slice(self.status.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.status.canonical_reason().unwrap_or("Unknown").as_bytes());
        out.extend_from_slice(b"\r\n");

        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_str().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        if !self.headers.contains_key(header::CONTENT_LENGTH) {
            out.extend_from_slice(format!("content-length: {}\r\n", body_len).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_status_line_and_length() {
        let response = ResponseHeader::new(StatusCode::NOT_FOUND);
        let bytes = String::from_utf8(response.to_bytes(5)).unwrap();
        assert!(bytes.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(bytes.contains("content-length: 5\r\n"));
        assert!(bytes.ends_with("\r\n\r\n"));
    }

    #[test]
    fn keeps_explicit_content_length() {
        let mut response = ResponseHeader::new(StatusCode::OK);
        response.set_raw_header(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        let bytes = String::from_utf8(response.to_bytes(10)).unwrap();
        assert_eq!(bytes.matches("content-length").count(), 1);
        assert!(bytes.contains("content-length: 0\r\n"));
    }

    #[test]
    fn set_raw_header_replaces() {
        let mut response = ResponseHeader::new(StatusCode::OK);
        response.set_raw_header(header::CONNECTION, HeaderValue::from_static("close"));
        response.set_raw_header(header::CONNECTION, HeaderValue::from_static("Keep-Alive"));
        assert_eq!(response.headers().get_all(header::CONNECTION).iter().count(), 1);
        assert_eq!(response.headers()[header::CONNECTION], "Keep-Alive");
    }
}
