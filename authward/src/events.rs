//! Notifications about outbound requests
//!
//! Listeners are told about every request immediately before it is sent and
//! about every response as soon as it arrives. This includes token grants and
//! unauthenticated probes, not just the caller's own request. Listeners are
//! observers only: they cannot alter the request, and a listener that panics
//! is isolated from both the request and the other listeners.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
};

use crate::transport::{OutboundRequest, Response};

/// Something that happened to an outbound request
#[derive(Clone, Copy, Debug)]
pub enum RequestEvent<'a> {
    /// The request is about to be sent
    RequestSent {
        /// The request
        request: &'a OutboundRequest,
    },
    /// A response to the request was received
    ResponseReceived {
        /// The request
        request: &'a OutboundRequest,
        /// The response
        response: &'a Response,
    },
}

impl<'a> RequestEvent<'a> {
    /// The name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestSent { .. } => "event:RequestSent",
            Self::ResponseReceived { .. } => "event:ResponseReceived",
        }
    }

    /// The request the event concerns
    pub fn request(&self) -> &'a OutboundRequest {
        match *self {
            Self::RequestSent { request } => request,
            Self::ResponseReceived { request, .. } => request,
        }
    }
}

/// A receiver of request events
pub trait RequestListener: Send + Sync {
    /// Called with each event
    fn on_event(&self, event: &RequestEvent<'_>);
}

impl<F> RequestListener for F
where
    F: Fn(&RequestEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &RequestEvent<'_>) {
        (self)(event)
    }
}

/// Identifies a subscribed listener so that it can later be removed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listeners = Vec<(ListenerId, Arc<dyn RequestListener>)>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: RwLock<Listeners>,
}

/// A set of listeners for request events
///
/// Clones share the same listeners.
#[derive(Clone, Default)]
pub struct RequestEvents {
    registry: Arc<Registry>,
}

impl RequestEvents {
    /// Constructs an empty set of listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a closure to all future events
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&RequestEvent<'_>) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(listener))
    }

    /// Adds a listener for all future events
    pub fn add_listener(&self, listener: Arc<dyn RequestListener>) -> ListenerId {
        let id = ListenerId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Removes a listener, returning whether it was subscribed
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .registry
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Delivers `event` to every listener
    pub fn emit(&self, event: &RequestEvent<'_>) {
        let listeners: Vec<_> = self
            .registry
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if result.is_err() {
                tracing::warn!(
                    event = event.name(),
                    url = %event.request().url,
                    "request event listener panicked"
                );
            }
        }
    }
}

impl fmt::Debug for RequestEvents {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let count = self
            .registry
            .listeners
            .read()
            .map(|l| l.len())
            .unwrap_or_default();
        f.debug_struct("RequestEvents")
            .field("listeners", &count)
            .finish()
    }
}
