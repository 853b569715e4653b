//! Receiver proxy.
//!
//! Stands in for a remote receiver head. The conductor's view of "what is
//! this receiver listening to" is always the last `Listening` action the
//! remote side reported on `receiver:<name>` — the proxy never assumes its
//! own `Listen` request succeeded until told so.

use crate::allocation::Allocation;
use crate::bus::{receiver_topic, BusEvent, EventBus, ReceiverAction};

pub struct ReceiverProxy {
    name: String,
    sample_rate: u32,
    allocation: Option<Allocation>,
}

impl ReceiverProxy {
    pub fn new(name: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            sample_rate,
            allocation: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> String {
        receiver_topic(&self.name)
    }

    pub fn allocation(&self) -> Option<&Allocation> {
        self.allocation.as_ref()
    }

    /// True if this proxy's last-known allocation already covers `desired`
    /// — i.e. no retune is needed to serve it.
    pub fn covers(&self, desired: &Allocation) -> bool {
        match &self.allocation {
            Some(current) => current.covers(desired),
            None => false,
        }
    }

    /// Publishes a `Listen` request for `frequencies` on this proxy's
    /// topic. Does not itself update `self.allocation` — that only happens
    /// once the remote side confirms via `on_remote_event`.
    pub fn request(&self, bus: &EventBus, frequencies: Vec<u32>) {
        bus.publish(
            &self.topic(),
            BusEvent::Receiver(ReceiverAction::Listen, frequencies),
        );
    }

    /// Applies a remote-reported action. Only `Listening` carries state;
    /// `Listen` echoes are ignored (that's the conductor's own request
    /// bouncing back to any other subscriber of the same topic).
    pub fn on_remote_event(&mut self, action: ReceiverAction, frequencies: Vec<u32>) {
        if action == ReceiverAction::Listening {
            self.allocation = if frequencies.is_empty() {
                None
            } else {
                Some(Allocation::new(self.sample_rate, frequencies))
            };
        }
    }
}
