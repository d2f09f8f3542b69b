//! Subscription hub for change notifications.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::{ChangeEvent, EventKind};

/// Callback invoked for a subscribed event kind.
pub type EventHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Routes [`ChangeEvent`]s to the handlers registered for their kind.
///
/// Cheap to clone; clones share the same handler table.
#[derive(Clone, Default)]
pub struct EventHub {
    handlers: Arc<RwLock<HashMap<EventKind, Vec<EventHandler>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
        debug!("Subscribed handler for {:?}", kind);
    }

    /// Deliver an event to every handler of its kind, in registration order.
    ///
    /// Returns how many handlers ran. Handlers run outside the table lock, so
    /// they may subscribe further handlers.
    pub fn dispatch(&self, event: &ChangeEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        trace!("Dispatching {:?} to {} handler(s)", kind, handlers.len());
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("EventHub")
            .field("kinds", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
