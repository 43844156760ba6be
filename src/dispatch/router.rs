//! Dispatcher backed by an axum `Router`.
//!
//! # Responsibilities
//! - Convert a framed request into an `http::Request`
//! - Tag it with an `x-request-id` and the peer address (`ConnectInfo`)
//! - Run it through the router and write the collected response
//!
//! # Design Decisions
//! - A request the `http` crate cannot represent is a 400 client fault
//! - Response bodies are collected up to a limit; exceeding it is an
//!   internal fault

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;
use uuid::Uuid;

use crate::dispatch::{DispatchError, Dispatcher};
use crate::http::{HttpRequest, ResponseHeader, X_REQUEST_ID};
use crate::net::socket::HttpSocket;
use crate::worker::Responder;

/// Default cap on a collected response body.
pub const DEFAULT_BODY_LIMIT: usize = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct RouterDispatcher {
    router: Router,
    body_limit: usize,
}

impl RouterDispatcher {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    fn prepare<S: HttpSocket>(
        request: HttpRequest,
        responder: &Responder<'_, S>,
    ) -> Result<(Request<Body>, HeaderValue), DispatchError> {
        let mut http_request = request.into_http().map_err(|e| {
            tracing::debug!(error = %e, "Request not representable");
            DispatchError::client(StatusCode::BAD_REQUEST)
        })?;

        let request_id = match http_request.headers().get(X_REQUEST_ID) {
            Some(existing) => existing.clone(),
            None => HeaderValue::from_str(&Uuid::new_v4().to_string())
                .map_err(DispatchError::internal)?,
        };
        http_request
            .headers_mut()
            .insert(X_REQUEST_ID, request_id.clone());

        if let Some(peer) = responder.peer_addr() {
            http_request.extensions_mut().insert(ConnectInfo(peer));
        }
        Ok((http_request, request_id))
    }
}

impl Dispatcher for RouterDispatcher {
    async fn execute<S: HttpSocket>(
        &self,
        request: HttpRequest,
        responder: &mut Responder<'_, S>,
    ) -> Result<(), DispatchError> {
        let method = request.method().clone();
        let path = request.path().to_string();
        let (http_request, request_id) = Self::prepare(request, responder)?;

        tracing::debug!(
            connection_id = %responder.connection_id(),
            request_id = ?request_id,
            method = %method,
            path = %path,
            "Dispatching request"
        );

        let response = match self.router.clone().oneshot(http_request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(DispatchError::internal)?;

        let mut header = ResponseHeader::with_headers(parts.status, parts.headers);
        header.set_raw_header(X_REQUEST_ID, request_id);
        responder.write(header, &body).await?;
        Ok(())
    }
}
