//! OutboundManager: registry of outbound handlers keyed by tag.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::outbound::{OutboundHandler, OutboundHandlerDyn};

/// Holds every outbound handler by tag, plus the default one.
///
/// The first handler added becomes the default unless another is chosen
/// with [`set_default`](Self::set_default). Uses `parking_lot::RwLock` so
/// lookups stay synchronous; handlers are cloned out of the lock before any
/// dial is awaited.
pub struct OutboundManager {
    handlers: RwLock<HashMap<String, Arc<dyn OutboundHandlerDyn>>>,
    default_tag: RwLock<Option<String>>,
}

impl OutboundManager {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            default_tag: RwLock::new(None),
        }
    }

    /// Register a handler. Returns `false` if the tag was already taken, in
    /// which case the existing handler is kept.
    pub fn add<H: OutboundHandler + 'static>(&self, handler: H) -> bool {
        let tag = handler.tag().to_string();
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&tag) {
            warn!("Duplicate outbound tag ignored: {tag}");
            return false;
        }
        handlers.insert(tag.clone(), Arc::new(handler));
        drop(handlers);

        let mut default_tag = self.default_tag.write();
        if default_tag.is_none() {
            *default_tag = Some(tag.clone());
        }
        info!("Registered outbound: {tag}");
        true
    }

    /// Remove a handler. Clears the default if it pointed at this tag.
    pub fn remove(&self, tag: &str) -> bool {
        let removed = self.handlers.write().remove(tag).is_some();
        if removed {
            let mut default_tag = self.default_tag.write();
            if default_tag.as_deref() == Some(tag) {
                *default_tag = None;
            }
            info!("Removed outbound: {tag}");
        }
        removed
    }

    /// Make `tag` the default handler. Returns `false` if no such handler.
    pub fn set_default(&self, tag: &str) -> bool {
        if !self.contains(tag) {
            return false;
        }
        *self.default_tag.write() = Some(tag.to_string());
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.handlers.read().contains_key(tag)
    }

    pub fn default_tag(&self) -> Option<String> {
        self.default_tag.read().clone()
    }

    /// All registered tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self.handlers.read().keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    pub(crate) fn get(&self, tag: &str) -> Option<Arc<dyn OutboundHandlerDyn>> {
        self.handlers.read().get(tag).cloned()
    }
}

impl Default for OutboundManager {
    fn default() -> Self {
        Self::new()
    }
}
