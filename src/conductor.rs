//! The conductor: reconciles a desired allocation set against a fixed
//! fleet of receiver proxies.
//!
//! Desired allocations are truncated to the proxy count (there is no
//! queueing of unserved allocations); a proxy already covering a desired
//! allocation keeps it untouched — no `listen` event is published for it,
//! avoiding a needless retune; only proxies that need to change are
//! assigned, in order, to allocations that still need a home.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::allocation::Allocation;
use crate::allocator::Allocator;
use crate::bus::{receiver_topic, BusEvent, EventBus, ReceiverAction};
use crate::proxy::ReceiverProxy;
use crate::station::StationId;

pub struct Conductor {
    allocator: Allocator,
    proxies: Vec<Arc<Mutex<ReceiverProxy>>>,
    bus: Arc<EventBus>,
}

impl Conductor {
    /// Builds a conductor with one proxy per `(name, sample_rate)` pair,
    /// subscribing each proxy to its own `receiver:<name>` topic so it
    /// picks up `Listening` confirmations from the remote side.
    pub fn new(bus: Arc<EventBus>, allocator: Allocator, proxy_specs: Vec<(String, u32)>) -> Self {
        let proxies = proxy_specs
            .into_iter()
            .map(|(name, sample_rate)| {
                let proxy = Arc::new(Mutex::new(ReceiverProxy::new(name.clone(), sample_rate)));
                let observed = Arc::clone(&proxy);
                bus.subscribe(receiver_topic(&name), move |event| {
                    if let BusEvent::Receiver(action, frequencies) = event {
                        if *action == ReceiverAction::Listening {
                            observed
                                .lock()
                                .unwrap()
                                .on_remote_event(ReceiverAction::Listening, frequencies.clone());
                        }
                    }
                });
                proxy
            })
            .collect();
        Self {
            allocator,
            proxies,
            bus,
        }
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Reconciles the allocator's output against the current proxy fleet
    /// and publishes `Listen` requests for whatever changed.
    pub fn on_frequencies(&self, station_frequencies: &std::collections::BTreeMap<StationId, Vec<u32>>) {
        let mut desired = self.allocator.allocate(station_frequencies);
        let all_freq_count: usize = desired.iter().map(|a| a.frequencies().len()).sum();

        if desired.len() > self.proxies.len() {
            warn!(
                desired = desired.len(),
                proxies = self.proxies.len(),
                "fewer receivers than desired allocations; the overflow will not be heard"
            );
        }
        desired.truncate(self.proxies.len());

        let mut kept: HashSet<usize> = HashSet::new();
        let mut needs_start: Vec<Allocation> = Vec::new();
        for allocation in &desired {
            let found = self.proxies.iter().enumerate().find_map(|(i, proxy)| {
                if kept.contains(&i) {
                    return None;
                }
                proxy.lock().unwrap().covers(allocation).then_some(i)
            });
            match found {
                Some(i) => {
                    kept.insert(i);
                    let name = self.proxies[i].lock().unwrap().name().to_string();
                    info!(receiver = %name, "keeping existing allocation");
                }
                None => needs_start.push(allocation.clone()),
            }
        }

        let available: Vec<usize> = (0..self.proxies.len()).filter(|i| !kept.contains(i)).collect();

        let mut listening_freq_count: usize = kept
            .iter()
            .map(|&i| {
                self.proxies[i]
                    .lock()
                    .unwrap()
                    .allocation()
                    .map_or(0, |a| a.frequencies().len())
            })
            .sum();

        for (allocation, &idx) in needs_start.iter().zip(available.iter()) {
            let (name, was) = {
                let proxy = self.proxies[idx].lock().unwrap();
                let was = proxy
                    .allocation()
                    .map_or_else(|| "nothing".to_string(), |a| format!("{:?}", a.frequencies()));
                (proxy.name().to_string(), was)
            };
            info!(
                receiver = %name,
                frequencies = ?allocation.frequencies(),
                was,
                "assigning allocation"
            );
            // published with the proxy's own lock released, so a bus
            // subscriber that needs to re-lock this proxy cannot deadlock.
            self.bus.publish(
                &receiver_topic(&name),
                BusEvent::Receiver(ReceiverAction::Listen, allocation.frequencies().to_vec()),
            );
            listening_freq_count += allocation.frequencies().len();
        }

        info!(
            listening = listening_freq_count,
            total = all_freq_count,
            "listening to {listening_freq_count} of {all_freq_count} active frequencies"
        );
    }
}
