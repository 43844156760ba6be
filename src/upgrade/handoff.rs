//! Transfer of an upgraded connection to its protocol handler.

use crate::http::HttpRequest;
use crate::net::socket::HttpSocket;
use crate::observability::metrics;
use crate::session::{Session, SessionStore};
use crate::upgrade::{ProtocolHandler, UpgradeError, UpgradeTarget};

/// Outcome of a handshake attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// No endpoint matched; the caller still owns the connection.
    NoEndpoint,
    /// A handler now owns a duplicate of the descriptor.
    Transferred,
}

/// Hand `socket`'s connection over to `target`.
///
/// On `Ok(Handoff::Transferred)` the caller must release its own handle
/// without further I/O. An `Err` means ownership may be indeterminate.
pub fn handshake<U, S>(
    target: &U,
    sessions: &dyn SessionStore,
    session_cookie: &str,
    socket: &S,
    request: HttpRequest,
) -> Result<Handoff, UpgradeError>
where
    U: UpgradeTarget,
    S: HttpSocket,
{
    if !target.search_endpoint(&request) {
        tracing::debug!(
            connection_id = %socket.connection_id(),
            path = %request.path(),
            "No upgrade endpoint"
        );
        metrics::record_upgrade("no_endpoint");
        return Ok(Handoff::NoEndpoint);
    }

    let fd = socket.duplicate().map_err(UpgradeError::Duplicate)?;
    let session_id = request.cookie(session_cookie).filter(|id| !id.is_empty());
    let handler = target.create(fd, socket.peer_addr(), request)?;

    let session = match session_id {
        Some(id) => sessions.find_session(&id),
        None => Session::default(),
    };

    handler.start_opening(session)?;
    tracing::debug!(connection_id = %socket.connection_id(), "Connection upgraded");
    metrics::record_upgrade("transferred");
    Ok(Handoff::Transferred)
}
