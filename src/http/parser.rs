//! HTTP/1.x request framing.
//!
//! # Responsibilities
//! - Decide whether a buffer holds at least one complete request
//! - Split a buffer into an ordered batch of pipelined requests
//!
//! # Design Decisions
//! - Head parsing via `httparse`; bodies framed by `Content-Length` only
//! - Chunked request bodies are rejected (no streaming uploads here)
//! - Oversized heads and bodies over the caller's limit are errors rather
//!   than an unbounded buffer

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use thiserror::Error;

use crate::http::request::HttpRequest;

/// Maximum size of a request head (request line + headers).
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Default request body limit used when the caller sets none.
pub const DEFAULT_MAX_BODY: usize = 8 * 1024 * 1024;

/// Maximum number of headers accepted per request.
pub const MAX_HEADERS: usize = 64;

/// Framing errors. Any of these makes the connection unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request head: {0}")]
    Malformed(String),

    #[error("request head exceeds 64 KiB")]
    HeadTooLarge,

    #[error("invalid content-length")]
    InvalidContentLength,

    #[error("request body of {length} bytes exceeds limit of {limit}")]
    BodyTooLarge { length: usize, limit: usize },

    #[error("unsupported transfer-encoding: {0}")]
    UnsupportedTransferEncoding(String),
}

/// Result of attempting to frame one request at the start of a buffer.
#[derive(Debug)]
pub enum Framing {
    /// A full request and the number of bytes it occupied.
    Complete(HttpRequest, usize),
    /// More bytes are needed.
    Partial,
}

/// Try to frame a single request from the front of `buf`.
///
/// A `Content-Length` above `max_body` is rejected before any body bytes
/// are waited for.
pub fn parse_request(buf: &[u8], max_body: usize) -> Result<Framing, ParseError> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut storage);

    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            if buf.len() > MAX_HEAD_SIZE {
                return Err(ParseError::HeadTooLarge);
            }
            return Ok(Framing::Partial);
        }
        Err(e) => return Err(ParseError::Malformed(e.to_string())),
    };

    let method = req
        .method
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
        .ok_or_else(|| ParseError::Malformed("invalid method".into()))?;
    let target = req.path.unwrap_or("/").to_string();
    let version = match req.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut headers = HeaderMap::with_capacity(req.headers.len());
    let mut content_length: Option<usize> = None;
    for h in req.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| ParseError::Malformed(format!("invalid header name {:?}", h.name)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| ParseError::Malformed(format!("invalid value for {}", h.name)))?;

        if name == axum::http::header::CONTENT_LENGTH {
            let parsed = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .ok_or(ParseError::InvalidContentLength)?;
            if content_length.is_some_and(|existing| existing != parsed) {
                return Err(ParseError::InvalidContentLength);
            }
            content_length = Some(parsed);
        } else if name == axum::http::header::TRANSFER_ENCODING {
            let encoding = String::from_utf8_lossy(h.value).to_string();
            if !encoding.trim().eq_ignore_ascii_case("identity") {
                return Err(ParseError::UnsupportedTransferEncoding(encoding));
            }
        }
        headers.append(name, value);
    }

    let body_len = content_length.unwrap_or(0);
    if body_len > max_body {
        return Err(ParseError::BodyTooLarge {
            length: body_len,
            limit: max_body,
        });
    }
    let total = head_len
        .checked_add(body_len)
        .ok_or(ParseError::InvalidContentLength)?;
    if buf.len() < total {
        return Ok(Framing::Partial);
    }

    let body = Bytes::copy_from_slice(&buf[head_len..total]);
    Ok(Framing::Complete(HttpRequest::new(method, target, version, headers, body), total))
}

/// An ordered batch of pipelined requests framed from one buffer.
#[derive(Debug, Default)]
pub struct Batch {
    pub requests: Vec<HttpRequest>,
    /// Bytes occupied by `requests`.
    pub consumed: usize,
    /// Framing error hit after the last complete request, if any.
    pub error: Option<ParseError>,
}

/// Frame every complete request at the front of `buf`, in order.
///
/// Trailing partial data is left for the next call. A framing error stops
/// the scan but keeps the requests framed before it.
pub fn parse_batch(buf: &[u8], max_body: usize) -> Batch {
    let mut batch = Batch::default();
    while batch.consumed < buf.len() {
        match parse_request(&buf[batch.consumed..], max_body) {
            Ok(Framing::Complete(request, len)) => {
                batch.requests.push(request);
                batch.consumed += len;
            }
            Ok(Framing::Partial) => break,
            Err(e) => {
                batch.error = Some(e);
                break;
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_head_needs_more() {
        let framing = parse_request(b"GET / HTTP/1.1\r\nHost: a", DEFAULT_MAX_BODY).unwrap();
        assert!(matches!(framing, Framing::Partial));
    }

    #[test]
    fn complete_request_without_body() {
        let raw = b"GET /hello?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        match parse_request(raw, DEFAULT_MAX_BODY).unwrap() {
            Framing::Complete(req, len) => {
                assert_eq!(len, raw.len());
                assert_eq!(req.method(), Method::GET);
                assert_eq!(req.target(), "/hello?x=1");
                assert_eq!(req.header("host").as_deref(), Some("localhost"));
                assert!(req.body().is_empty());
            }
            Framing::Partial => panic!("expected complete request"),
        }
    }

    #[test]
    fn body_is_framed_by_content_length() {
        let partial = b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel";
        assert!(matches!(parse_request(partial, DEFAULT_MAX_BODY).unwrap(), Framing::Partial));

        let full = b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        match parse_request(full, DEFAULT_MAX_BODY).unwrap() {
            Framing::Complete(req, len) => {
                assert_eq!(len, full.len());
                assert_eq!(&req.body()[..], b"hello");
            }
            Framing::Partial => panic!("expected complete request"),
        }
    }

    #[test]
    fn pipelined_batch_preserves_order() {
        let raw = b"GET /1 HTTP/1.1\r\n\r\nGET /2 HTTP/1.1\r\n\r\nGET /3 HTTP/1.1\r\n\r\nGET /4 HT";
        let batch = parse_batch(raw, DEFAULT_MAX_BODY);
        let targets: Vec<_> = batch.requests.iter().map(|r| r.target().to_string()).collect();
        assert_eq!(targets, vec!["/1", "/2", "/3"]);
        assert_eq!(&raw[batch.consumed..], b"GET /4 HT");
        assert!(batch.error.is_none());
    }

    #[test]
    fn batch_keeps_requests_before_an_error() {
        let raw = b"GET /ok HTTP/1.1\r\n\r\n\x01bad\r\n\r\n";
        let batch = parse_batch(raw, DEFAULT_MAX_BODY);
        assert_eq!(batch.requests.len(), 1);
        assert_eq!(batch.requests[0].target(), "/ok");
        assert!(matches!(batch.error, Some(ParseError::Malformed(_))));
    }

    #[test]
    fn http10_version_detected() {
        match parse_request(b"GET / HTTP/1.0\r\n\r\n", DEFAULT_MAX_BODY).unwrap() {
            Framing::Complete(req, _) => assert_eq!(req.version(), Version::HTTP_10),
            Framing::Partial => panic!("expected complete request"),
        }
    }

    #[test]
    fn rejects_chunked_bodies() {
        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        assert!(matches!(
            parse_request(raw, DEFAULT_MAX_BODY),
            Err(ParseError::UnsupportedTransferEncoding(_))
        ));
    }

    #[test]
    fn rejects_conflicting_content_length() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab";
        assert_eq!(parse_request(raw, DEFAULT_MAX_BODY).unwrap_err(), ParseError::InvalidContentLength);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_request(b"\x01\x02 nonsense\r\n\r\n", DEFAULT_MAX_BODY),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn oversized_head_is_an_error() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_HEAD_SIZE + 1));
        assert_eq!(parse_request(&raw, DEFAULT_MAX_BODY).unwrap_err(), ParseError::HeadTooLarge);
    }

    #[test]
    fn content_length_over_limit_is_rejected() {
        let raw = b"POST /upload HTTP/1.1\r\nContent-Length: 1025\r\n\r\n";
        assert_eq!(
            parse_request(raw, 1024).unwrap_err(),
            ParseError::BodyTooLarge {
                length: 1025,
                limit: 1024
            }
        );
        assert!(matches!(
            parse_request(b"POST / HTTP/1.1\r\nContent-Length: 1024\r\n\r\n", 1024).unwrap(),
            Framing::Partial
        ));
    }

    #[test]
    fn overflowing_content_length_is_an_error() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n";
        assert!(parse_request(raw, DEFAULT_MAX_BODY).is_err());
        assert_eq!(
            parse_request(raw, usize::MAX).unwrap_err(),
            ParseError::InvalidContentLength
        );
    }
}
