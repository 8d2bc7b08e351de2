//! Client connection state tracking.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tether_session::{ErrorFeedback, OutboundError, SessionId};

/// One accepted client connection.
///
/// Attached to the connection's session as its error feedback sink, so
/// outbound failures anywhere down the pipeline end up here.
#[derive(Debug)]
pub struct ClientConnection {
    /// Session identifier assigned at accept time
    pub id: SessionId,
    /// Remote peer
    pub peer: SocketAddr,
    /// When the client connected
    pub connected_at: Instant,
    errors: Mutex<Vec<OutboundError>>,
}

impl ClientConnection {
    pub fn new(id: SessionId, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            connected_at: Instant::now(),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Errors reported for this connection, oldest first.
    pub fn errors(&self) -> Vec<OutboundError> {
        self.errors.lock().clone()
    }

    /// The first reported error, which is usually the root cause.
    pub fn first_error(&self) -> Option<OutboundError> {
        self.errors.lock().first().cloned()
    }

    pub fn elapsed(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl ErrorFeedback for ClientConnection {
    fn submit_error(&self, err: OutboundError) {
        self.errors.lock().push(err);
    }
}
