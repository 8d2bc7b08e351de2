//! Error feedback from deep outbound stages to the request originator.

use crate::error::OutboundError;

/// Sink that accepts errors discovered while serving a request.
///
/// Implemented by whichever component originated the request and wants to
/// learn about downstream failures, for example an inbound that turns a dial
/// failure into a client-visible error. The session only keeps a weak
/// reference; the implementer owns its own lifecycle and must be safe to
/// call from any task.
pub trait ErrorFeedback: Send + Sync {
    fn submit_error(&self, err: OutboundError);
}
