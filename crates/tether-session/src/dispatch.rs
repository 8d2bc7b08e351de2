//! Dispatcher capability carried by a session.
//!
//! The router implements [`Dispatcher`]. The session only stores the
//! reference so that any layer that needs a new routed connection (a retry,
//! an internally generated sub-request) can find it.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::context::Session;
use crate::error::OutboundError;
use crate::net::Destination;

/// A bidirectional byte stream to an outbound destination.
pub trait ProxyStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ProxyStream for T {}

pub type BoxStream = Box<dyn ProxyStream>;

/// Routes a request and establishes its outbound connection.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(
        &self,
        session: &Session,
        destination: Destination,
    ) -> impl Future<Output = Result<BoxStream, OutboundError>> + Send;
}

/// Object-safe version of [`Dispatcher`], implemented for every dispatcher.
pub trait DynDispatcher: Send + Sync {
    fn dispatch_dyn<'a>(
        &'a self,
        session: &'a Session,
        destination: Destination,
    ) -> Pin<Box<dyn Future<Output = Result<BoxStream, OutboundError>> + Send + 'a>>;
}

impl<T: Dispatcher> DynDispatcher for T {
    fn dispatch_dyn<'a>(
        &'a self,
        session: &'a Session,
        destination: Destination,
    ) -> Pin<Box<dyn Future<Output = Result<BoxStream, OutboundError>> + Send + 'a>> {
        Box::pin(self.dispatch(session, destination))
    }
}
