//! Outbound error types.
//!
//! The session core never fails on its own. `OutboundError` is the value
//! outbound stages return from dispatch and hand to an [`ErrorFeedback`]
//! sink. It is `Clone` so a failure site can both report and return it.
//!
//! [`ErrorFeedback`]: crate::ErrorFeedback

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::net::Destination;

#[derive(Debug, Clone, Error)]
pub enum OutboundError {
    #[error("no outbound handler tagged `{0}`")]
    UnknownOutbound(String),

    #[error("no outbound handler available")]
    NoOutbound,

    #[error("failed to dial {target}: {source}")]
    Dial {
        target: Destination,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("request to {0} blocked")]
    Blocked(Destination),

    #[error("no dispatcher attached to session")]
    NoDispatcher,

    #[error("i/o error: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl OutboundError {
    pub fn dial(target: Destination, err: io::Error) -> Self {
        Self::Dial {
            target,
            source: Arc::new(err),
        }
    }

    pub fn resolve(host: impl Into<String>, err: io::Error) -> Self {
        Self::Resolve {
            host: host.into(),
            source: Arc::new(err),
        }
    }
}

impl From<io::Error> for OutboundError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
