//! Synchronous, topic-keyed publish/subscribe event bus.
//!
//! A topic-string-keyed dispatcher with synchronous, in-registration-order
//! fan-out: every subscriber of a topic is called inline on the
//! publisher's own task, rather than queued through an async channel. That
//! keeps ordering and backpressure simple at the cost of requiring
//! subscribers to be cheap and non-blocking.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::station::HfdlPacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverAction {
    Listen,
    Listening,
}

#[derive(Debug, Clone)]
pub enum BusEvent {
    /// Published by the aggregator after every save (`"frequencies"`).
    Frequencies(std::collections::BTreeMap<crate::station::StationId, Vec<u32>>),
    /// Published by the aggregator whenever an owned table mutates (`"update"`).
    Update,
    /// Published by a URL refresher on a successful fetch (`"response:<n>"`).
    Response(serde_json::Value),
    /// Published by a file refresher on a changed file (`"text:<n>"`).
    Text(String),
    /// A decoded HFDL packet, forwarded toward the station tables (`"packet"`).
    Packet(HfdlPacket),
    /// Published on a per-receiver topic (`"receiver:<name>"`) in either
    /// direction: the conductor publishes `Listen`, the proxy's remote side
    /// publishes `Listening`.
    Receiver(ReceiverAction, Vec<u32>),
}

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Builds the conventional per-receiver topic name.
pub fn receiver_topic(name: &str) -> String {
    format!("receiver:{name}")
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` to run, in order, whenever `topic` is published.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F)
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .unwrap()
            .entry(topic.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Calls every subscriber of `topic`, in registration order, on the
    /// caller's own task. A subscriber that panics does not stop the rest
    /// of the fan-out and does not propagate to the publisher.
    pub fn publish(&self, topic: &str, event: BusEvent) {
        let handlers: Vec<Handler> = {
            let guard = self.subscribers.lock().unwrap();
            match guard.get(topic) {
                Some(handlers) if !handlers.is_empty() => handlers.clone(),
                _ => {
                    debug!(topic, "no subscribers");
                    return;
                }
            }
        };
        for handler in handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                warn!(topic, "subscriber panicked handling event; continuing fan-out");
            }
        }
    }
}
