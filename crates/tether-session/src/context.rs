//! Session handle: per-request state threaded through the proxy pipeline.
//!
//! A [`Session`] is created when an inbound accepts a connection. Each stage
//! that learns something about the request derives a new handle with one
//! facet replaced and passes that handle on:
//!
//! ```
//! use tether_session::{Inbound, Session, SessionId};
//!
//! let base = Session::new().with_id(SessionId(7));
//! let accepted = base.with_inbound(Inbound { tag: "socks-in".into(), ..Default::default() });
//! let routed = accepted.with_forced_outbound_tag("direct");
//!
//! assert_eq!(routed.id(), SessionId(7));
//! assert_eq!(routed.forced_outbound_tag(), "direct");
//! assert!(base.inbound().is_none());
//! ```
//!
//! Attaching is copy-on-attach: the input handle is never modified and all
//! other facets are shared with it. The exception is [`Content`], which is
//! shared mutable state once attached (see the `content` module).

use std::fmt;
use std::sync::{Arc, Weak};

use crate::config::RoutingConfig;
use crate::content::{Content, FORCED_OUTBOUND_TAG};
use crate::dispatch::DynDispatcher;
use crate::error::OutboundError;
use crate::facets::{Inbound, Outbound, Sockopt};
use crate::feedback::ErrorFeedback;
use crate::id::SessionId;
use crate::net::Address;

/// Immutable-by-convention carrier of a request's facets.
///
/// Cloning is cheap: every facet is either `Copy` or behind an `Arc`.
#[derive(Clone, Default)]
pub struct Session {
    id: SessionId,
    inbound: Option<Arc<Inbound>>,
    outbound: Option<Arc<Outbound>>,
    content: Option<Arc<Content>>,
    mux_preferred: bool,
    sockopt: Option<Arc<Sockopt>>,
    error_feedback: Option<Weak<dyn ErrorFeedback>>,
    dispatcher: Option<Arc<dyn DynDispatcher>>,
}

impl Session {
    /// A handle with no facets attached.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Identifier ───────────────────────────────────────────────────────

    pub fn with_id(&self, id: SessionId) -> Self {
        Self { id, ..self.clone() }
    }

    /// The request identifier, or `SessionId(0)` if none was attached.
    pub fn id(&self) -> SessionId {
        self.id
    }

    // ── Inbound ──────────────────────────────────────────────────────────

    pub fn with_inbound(&self, inbound: Inbound) -> Self {
        Self {
            inbound: Some(Arc::new(inbound)),
            ..self.clone()
        }
    }

    pub fn inbound(&self) -> Option<&Inbound> {
        self.inbound.as_deref()
    }

    // ── Outbound ─────────────────────────────────────────────────────────

    pub fn with_outbound(&self, outbound: Outbound) -> Self {
        Self {
            outbound: Some(Arc::new(outbound)),
            ..self.clone()
        }
    }

    /// The outbound descriptor as seen through the process-wide
    /// [`RoutingConfig`].
    pub fn outbound(&self) -> Option<Outbound> {
        self.outbound_with(RoutingConfig::global())
    }

    /// The outbound descriptor with `config`'s outbound-IP override applied
    /// to the gateway. The stored facet is left untouched.
    pub fn outbound_with(&self, config: &RoutingConfig) -> Option<Outbound> {
        let mut outbound = Outbound::clone(self.outbound.as_ref()?);
        if let Some(ip) = config.outbound_ip() {
            outbound.gateway = Some(Address::Ip(ip));
        }
        Some(outbound)
    }

    // ── Content ──────────────────────────────────────────────────────────

    /// Attach a content bag. Handles derived from the result share it.
    pub fn with_content(&self, content: Arc<Content>) -> Self {
        Self {
            content: Some(content),
            ..self.clone()
        }
    }

    pub fn content(&self) -> Option<&Arc<Content>> {
        self.content.as_ref()
    }

    /// The forced outbound tag, or `""` when there is none.
    pub fn forced_outbound_tag(&self) -> String {
        self.content
            .as_ref()
            .and_then(|content| content.attribute(FORCED_OUTBOUND_TAG))
            .unwrap_or_default()
    }

    /// Set the forced outbound tag, attaching an empty [`Content`] first if
    /// none is present.
    ///
    /// Always use the returned handle downstream: when no content was
    /// attached, the tag lives only on the new handle.
    pub fn with_forced_outbound_tag(&self, tag: impl Into<String>) -> Self {
        let session = match &self.content {
            Some(_) => self.clone(),
            None => self.with_content(Arc::new(Content::new())),
        };
        if let Some(content) = &session.content {
            content.set_attribute(FORCED_OUTBOUND_TAG, tag);
        }
        session
    }

    // ── Mux preference ───────────────────────────────────────────────────

    pub fn with_mux_preferred(&self, preferred: bool) -> Self {
        Self {
            mux_preferred: preferred,
            ..self.clone()
        }
    }

    /// Whether the request prefers a multiplexed outbound; `false` if unset.
    pub fn mux_preferred(&self) -> bool {
        self.mux_preferred
    }

    // ── Socket options ───────────────────────────────────────────────────

    pub fn with_sockopt(&self, sockopt: Sockopt) -> Self {
        Self {
            sockopt: Some(Arc::new(sockopt)),
            ..self.clone()
        }
    }

    pub fn sockopt(&self) -> Option<&Sockopt> {
        self.sockopt.as_deref()
    }

    // ── Error feedback ───────────────────────────────────────────────────

    /// Attach an error sink. Only a weak reference is kept, so the sink must
    /// be owned elsewhere for as long as feedback is wanted.
    pub fn with_error_feedback<F>(&self, sink: &Arc<F>) -> Self
    where
        F: ErrorFeedback + 'static,
    {
        let sink: Arc<dyn ErrorFeedback> = sink.clone();
        self.with_shared_error_feedback(&sink)
    }

    /// Same as [`Session::with_error_feedback`] for a sink that is already
    /// type-erased.
    pub fn with_shared_error_feedback(&self, sink: &Arc<dyn ErrorFeedback>) -> Self {
        Self {
            error_feedback: Some(Arc::downgrade(sink)),
            ..self.clone()
        }
    }

    /// Report `err` to the originator of this request.
    ///
    /// Does nothing if no sink is attached or the sink has been dropped.
    pub fn submit_outbound_error(&self, err: OutboundError) {
        if let Some(sink) = self.error_feedback.as_ref().and_then(Weak::upgrade) {
            sink.submit_error(err);
        }
    }

    pub fn has_error_feedback(&self) -> bool {
        self.error_feedback
            .as_ref()
            .is_some_and(|sink| sink.strong_count() > 0)
    }

    // ── Dispatcher ───────────────────────────────────────────────────────

    pub fn with_dispatcher(&self, dispatcher: Arc<dyn DynDispatcher>) -> Self {
        Self {
            dispatcher: Some(dispatcher),
            ..self.clone()
        }
    }

    pub fn dispatcher(&self) -> Option<&Arc<dyn DynDispatcher>> {
        self.dispatcher.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .field("content", &self.content)
            .field("mux_preferred", &self.mux_preferred)
            .field("sockopt", &self.sockopt)
            .field("error_feedback", &self.has_error_feedback())
            .field("dispatcher", &self.dispatcher.is_some())
            .finish()
    }
}
