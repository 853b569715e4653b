//! Station status aggregator.
//!
//! Owns the squitter, frequency-update, remote (Airframes), system-file,
//! and previous-run station tables and merges them into one active
//! frequency set per station, honoring each table kind's staleness
//! horizon. Persistence is debounced and change-detecting: a burst of
//! updates collapses into a single save, and an unchanged snapshot is
//! never rewritten to disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::{BusEvent, EventBus};
use crate::clock::Clock;
use crate::station::{HfdlPacket, StationId, StationTable, TableKind};

pub struct Aggregator {
    squitter: Mutex<StationTable>,
    update: Mutex<StationTable>,
    remote: Mutex<Vec<StationTable>>,
    system: Mutex<Vec<StationTable>>,
    previous: Mutex<Option<StationTable>>,
    station_ids: Mutex<BTreeSet<StationId>>,
    bus: Arc<EventBus>,
    save_path: Option<PathBuf>,
    save_delay: Duration,
    will_save: AtomicBool,
    last_saved: Mutex<Option<serde_json::Value>>,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    pub fn new(
        bus: Arc<EventBus>,
        remote_table_count: usize,
        system_table_count: usize,
        save_path: Option<PathBuf>,
        save_delay: Duration,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            squitter: Mutex::new(StationTable::new(TableKind::Squitter)),
            update: Mutex::new(StationTable::new(TableKind::Update)),
            remote: Mutex::new(
                (0..remote_table_count)
                    .map(|_| StationTable::new(TableKind::Remote))
                    .collect(),
            ),
            system: Mutex::new(
                (0..system_table_count)
                    .map(|_| StationTable::new(TableKind::System))
                    .collect(),
            ),
            previous: Mutex::new(None),
            station_ids: Mutex::new(BTreeSet::new()),
            bus,
            save_path,
            save_delay,
            will_save: AtomicBool::new(false),
            last_saved: Mutex::new(None),
            clock,
        })
    }

    /// Loads a previously-saved snapshot at startup, if present. Silent on
    /// a missing or malformed file — a fresh install has no prior state.
    pub fn load_previous(&self, path: &Path) {
        let Ok(text) = std::fs::read_to_string(path) else {
            return;
        };
        let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) else {
            warn!(?path, "malformed previous-run snapshot, ignoring");
            return;
        };
        let mut table = StationTable::new(TableKind::Previous);
        match table.ingest_airframes(&json) {
            Ok(ids) => {
                self.register_ids(ids);
                *self.previous.lock().unwrap() = Some(table);
            }
            Err(error) => warn!(?path, %error, "malformed previous-run snapshot, ignoring"),
        }
    }

    /// Forwards a decoded HFDL packet's squitter and frequency-update
    /// fields into their respective tables.
    pub fn on_hfdl(self: &Arc<Self>, packet: &HfdlPacket) {
        let now = self.clock.now_unix();
        let mut touched = self.squitter.lock().unwrap().ingest_packet(&packet.squitter, now);
        touched.extend(
            self.update
                .lock()
                .unwrap()
                .ingest_packet(&packet.frequency_update, now),
        );
        if !touched.is_empty() {
            self.register_ids(touched);
            self.on_table_updated();
        }
    }

    /// Applies a full-replace Airframes-schema document fetched by the
    /// remote refresher at `index`. Malformed documents are logged and the
    /// table's previous contents are retained.
    pub fn on_remote_feed(self: &Arc<Self>, index: usize, json: &serde_json::Value) {
        let touched = {
            let mut tables = self.remote.lock().unwrap();
            let Some(table) = tables.get_mut(index) else {
                return;
            };
            match table.ingest_airframes(json) {
                Ok(ids) => ids,
                Err(error) => {
                    warn!(index, %error, "malformed remote station feed, retaining previous contents");
                    return;
                }
            }
        };
        self.register_ids(touched);
        self.on_table_updated();
    }

    /// Applies a full-replace system station file fetched by the file
    /// refresher at `index`.
    pub fn on_system_file(self: &Arc<Self>, index: usize, text: &str) {
        let json: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(error) => {
                warn!(index, %error, "malformed system station file, retaining previous contents");
                return;
            }
        };
        let now = self.clock.now_unix();
        let touched = {
            let mut tables = self.system.lock().unwrap();
            let Some(table) = tables.get_mut(index) else {
                return;
            };
            match table.ingest_system(&json, now) {
                Ok(ids) => ids,
                Err(error) => {
                    warn!(index, %error, "malformed system station file, retaining previous contents");
                    return;
                }
            }
        };
        self.register_ids(touched);
        self.on_table_updated();
    }

    fn register_ids(&self, ids: impl IntoIterator<Item = StationId>) {
        self.station_ids.lock().unwrap().extend(ids);
    }

    /// The union of every table's currently-active frequencies for one
    /// station, honoring each table kind's staleness horizon.
    pub fn active_frequencies(&self, id: StationId) -> BTreeSet<u32> {
        self.active_frequencies_locked(id)
    }

    fn active_frequencies_locked(&self, id: StationId) -> BTreeSet<u32> {
        let now = self.clock.now_unix();
        let mut freqs = BTreeSet::new();
        let mut merge = |table: &StationTable| {
            if let Some(station) = table.get(id) {
                if now.saturating_sub(station.last_updated) <= table.kind().staleness_horizon_secs() {
                    freqs.extend(station.frequencies.iter().copied());
                }
            }
        };
        merge(&self.squitter.lock().unwrap());
        merge(&self.update.lock().unwrap());
        for table in self.remote.lock().unwrap().iter() {
            merge(table);
        }
        for table in self.system.lock().unwrap().iter() {
            merge(table);
        }
        if let Some(table) = self.previous.lock().unwrap().as_ref() {
            merge(table);
        }
        freqs
    }

    /// Every known station id mapped to its currently-active frequencies.
    /// This is the payload handed to the allocator.
    pub fn active_station_frequencies(&self) -> BTreeMap<StationId, Vec<u32>> {
        self.station_ids
            .lock()
            .unwrap()
            .iter()
            .map(|&id| (id, self.active_frequencies_locked(id).into_iter().collect()))
            .collect()
    }

    fn on_table_updated(self: &Arc<Self>) {
        self.schedule_save();
    }

    /// Debounces saves: a second update arriving during `save_delay` does
    /// not push the save out further; a third event after the save fires
    /// rearms the debounce.
    fn schedule_save(self: &Arc<Self>) {
        if self.will_save.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let delay = self.save_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.will_save.store(false, Ordering::SeqCst);
            this.save();
        });
    }

    fn build_snapshot(&self) -> serde_json::Value {
        let ids = self.station_ids.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let mut ground_stations = Vec::with_capacity(ids.len());
        for &id in ids.iter() {
            let (name, last_updated, when) = self.best_name_and_timestamp(id, &now);
            let frequencies: Vec<u32> = self.active_frequencies_locked(id).into_iter().collect();
            ground_stations.push(serde_json::json!({
                "id": id.0,
                "name": name,
                "frequencies": {"active": frequencies},
                "last_updated": last_updated,
                "when": when,
            }));
        }
        serde_json::json!({ "ground_stations": ground_stations })
    }

    /// The name and timestamp of whichever table most recently touched
    /// `id`, plus `when` stamped with `now` at the moment that table was
    /// found to be the freshest — not the table's own `last_updated`,
    /// which only records when the underlying feed last reported in.
    fn best_name_and_timestamp(&self, id: StationId, now: &str) -> (String, i64, String) {
        let mut name = String::new();
        let mut last_updated = 0i64;
        let mut when = String::new();
        let mut consider = |table: &StationTable| {
            if let Some(station) = table.get(id) {
                if station.last_updated >= last_updated {
                    last_updated = station.last_updated;
                    name = station.name.clone();
                    when = now.to_string();
                }
            }
        };
        consider(&self.squitter.lock().unwrap());
        consider(&self.update.lock().unwrap());
        for table in self.remote.lock().unwrap().iter() {
            consider(table);
        }
        for table in self.system.lock().unwrap().iter() {
            consider(table);
        }
        if let Some(table) = self.previous.lock().unwrap().as_ref() {
            consider(table);
        }
        (name, last_updated, when)
    }

    /// Publishes the current active-frequencies set and, if it differs
    /// from the last write, persists a snapshot to disk.
    fn save(&self) {
        self.bus
            .publish("frequencies", BusEvent::Frequencies(self.active_station_frequencies()));

        let Some(path) = &self.save_path else {
            return;
        };
        let snapshot = self.build_snapshot();
        {
            let mut last = self.last_saved.lock().unwrap();
            if last.as_ref() == Some(&snapshot) {
                debug!("station snapshot unchanged, skipping write");
                return;
            }
            *last = Some(snapshot.clone());
        }

        let mut doc = snapshot;
        doc["when"] = serde_json::Value::String(chrono::Utc::now().to_rfc3339());
        match serde_json::to_string_pretty(&doc) {
            Ok(text) => {
                if let Err(error) = std::fs::write(path, text + "\n") {
                    warn!(?path, %error, "failed to write station snapshot");
                }
            }
            Err(error) => warn!(%error, "failed to serialize station snapshot"),
        }
    }
}
