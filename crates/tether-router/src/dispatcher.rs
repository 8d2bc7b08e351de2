//! DefaultDispatcher: routes a session to an outbound handler and dials it.

use std::sync::Arc;

use tether_session::{
    Address, BoxStream, Destination, Dispatcher, Outbound, OutboundError, Session,
};
use tracing::{debug, info};

use crate::outbound::OutboundHandlerDyn;
use crate::registry::OutboundManager;
use crate::rules::Router;

/// The [`Dispatcher`] inbounds attach to their sessions.
pub struct DefaultDispatcher {
    outbounds: Arc<OutboundManager>,
    router: Router,
}

impl DefaultDispatcher {
    pub fn new(outbounds: Arc<OutboundManager>, router: Router) -> Self {
        Self { outbounds, router }
    }

    pub fn outbounds(&self) -> &Arc<OutboundManager> {
        &self.outbounds
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Resolve the handler tag for a session without dialing.
    pub fn select(
        &self,
        session: &Session,
        destination: &Destination,
    ) -> Result<String, OutboundError> {
        self.pick(session, destination).map(|handler| handler.tag_dyn().to_string())
    }

    fn pick(
        &self,
        session: &Session,
        destination: &Destination,
    ) -> Result<Arc<dyn OutboundHandlerDyn>, OutboundError> {
        match self.router.pick(session, destination) {
            Some(tag) => self
                .outbounds
                .get(&tag)
                .ok_or(OutboundError::UnknownOutbound(tag)),
            None => self
                .outbounds
                .default_tag()
                .and_then(|tag| self.outbounds.get(&tag))
                .ok_or(OutboundError::NoOutbound),
        }
    }
}

impl Dispatcher for DefaultDispatcher {
    async fn dispatch(
        &self,
        session: &Session,
        destination: Destination,
    ) -> Result<BoxStream, OutboundError> {
        let handler = match self.pick(session, &destination) {
            Ok(handler) => handler,
            Err(err) => {
                debug!("{} routing failed: {err}", session.id());
                session.submit_outbound_error(err.clone());
                return Err(err);
            }
        };

        let original_target = session
            .outbound()
            .map(|previous| previous.original_target.unwrap_or(previous.target))
            .unwrap_or_else(|| destination.clone());

        let outbound = Outbound {
            original_target: Some(original_target),
            target: destination.clone(),
            route_target: None,
            gateway: handler.send_through_dyn().map(Address::Ip),
            tag: handler.tag_dyn().to_string(),
            name: handler.name_dyn().to_string(),
        };

        let mut session = session.with_outbound(outbound);
        if let Some(sockopt) = handler.sockopt_dyn() {
            session = session.with_sockopt(sockopt.clone());
        }

        info!("{} taking detour [{}] for [{destination}]", session.id(), handler.tag_dyn());
        handler.dial_dyn(&session, &destination).await
    }
}
