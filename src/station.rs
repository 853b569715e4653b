//! Station identity and the station-table variants.
//!
//! `StationId` is a thin newtype wrapper to keep station identifiers from
//! being mixed up with plain `u32`s elsewhere. `StationTable` models all
//! five station-data sources — squitter, frequency-update, remote
//! (Airframes), system file, and the previous-run snapshot — as one tagged
//! type with per-kind ingest methods, rather than five near-identical
//! structs.

use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StationId(pub u32);

#[derive(Debug, Clone)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub frequencies: BTreeSet<u32>,
    /// Unix seconds.
    pub last_updated: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Squitter,
    Update,
    Remote,
    System,
    Previous,
}

impl TableKind {
    /// Horizon, in seconds, beyond which a station's entry in a table of
    /// this kind is no longer considered active. Squitter and frequency
    /// updates arrive on a roughly two-minute cadence; remote, system, and
    /// previous-run tables are treated as authoritative for as long as
    /// they're the only source available.
    pub fn staleness_horizon_secs(self) -> i64 {
        match self {
            TableKind::Squitter | TableKind::Update => 150,
            TableKind::Remote | TableKind::System | TableKind::Previous => i64::MAX,
        }
    }
}

/// One named station's reported frequency list, as carried by a decoded
/// HFDL packet's squitter or frequency-update field.
#[derive(Debug, Clone)]
pub struct SquitterEntry {
    pub station_id: StationId,
    pub frequencies: Vec<u32>,
}

/// A decoded HFDL packet, as forwarded from the (out-of-scope) packet
/// decoder process toward the station tables.
#[derive(Debug, Clone, Default)]
pub struct HfdlPacket {
    pub squitter: Vec<SquitterEntry>,
    pub frequency_update: Vec<SquitterEntry>,
}

#[derive(Debug, Error)]
pub enum StationTableError {
    #[error("malformed station document: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct StationTable {
    kind: TableKind,
    stations: HashMap<StationId, Station>,
}

impl StationTable {
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            stations: HashMap::new(),
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn get(&self, id: StationId) -> Option<&Station> {
        self.stations.get(&id)
    }

    pub fn station_ids(&self) -> impl Iterator<Item = StationId> + '_ {
        self.stations.keys().copied()
    }

    /// Merges in the named entries from a squitter or frequency-update
    /// packet field. Stations not named are left untouched. Returns the
    /// ids that were touched.
    pub fn ingest_packet(&mut self, entries: &[SquitterEntry], now: i64) -> Vec<StationId> {
        let mut touched = Vec::with_capacity(entries.len());
        for entry in entries {
            let station = self
                .stations
                .entry(entry.station_id)
                .or_insert_with(|| Station {
                    id: entry.station_id,
                    name: format!("station-{}", entry.station_id.0),
                    frequencies: BTreeSet::new(),
                    last_updated: now,
                });
            station.frequencies = entry.frequencies.iter().copied().collect();
            station.last_updated = now;
            touched.push(entry.station_id);
        }
        touched
    }

    /// Full replace from an Airframes-schema document
    /// (`{"ground_stations": [...]}`). Used by both remote feeds and the
    /// previous-run snapshot, which is saved in the same shape.
    pub fn ingest_airframes(
        &mut self,
        json: &serde_json::Value,
    ) -> Result<Vec<StationId>, StationTableError> {
        let doc: AirframesDoc = serde_json::from_value(json.clone())?;
        self.stations.clear();
        let mut touched = Vec::with_capacity(doc.ground_stations.len());
        for s in doc.ground_stations {
            let id = StationId(s.id);
            self.stations.insert(
                id,
                Station {
                    id,
                    name: s.name,
                    frequencies: s
                        .frequencies
                        .active
                        .iter()
                        .map(|f| f.round() as u32)
                        .collect(),
                    last_updated: s.last_updated,
                },
            );
            touched.push(id);
        }
        Ok(touched)
    }

    /// Full replace from a system station file (a bare array of
    /// `{id, name, frequencies, lat, lon}`). The schema carries no
    /// timestamp, so entries are stamped with `now`.
    pub fn ingest_system(
        &mut self,
        json: &serde_json::Value,
        now: i64,
    ) -> Result<Vec<StationId>, StationTableError> {
        let stations: Vec<SystemStation> = serde_json::from_value(json.clone())?;
        self.stations.clear();
        let mut touched = Vec::with_capacity(stations.len());
        for s in stations {
            let id = StationId(s.id);
            self.stations.insert(
                id,
                Station {
                    id,
                    name: s.name,
                    frequencies: s.frequencies.iter().map(|f| f.round() as u32).collect(),
                    last_updated: now,
                },
            );
            touched.push(id);
        }
        Ok(touched)
    }
}

#[derive(Debug, Deserialize)]
struct AirframesDoc {
    ground_stations: Vec<AirframesStation>,
}

#[derive(Debug, Deserialize)]
struct AirframesStation {
    id: u32,
    name: String,
    frequencies: AirframesFrequencies,
    last_updated: i64,
}

#[derive(Debug, Deserialize)]
struct AirframesFrequencies {
    active: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct SystemStation {
    id: u32,
    name: String,
    frequencies: Vec<f64>,
    #[serde(default)]
    #[allow(dead_code)]
    lat: Option<f64>,
    #[serde(default)]
    #[allow(dead_code)]
    lon: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn packet_ingest_only_touches_named_stations() {
        let mut table = StationTable::new(TableKind::Squitter);
        table.ingest_packet(
            &[SquitterEntry {
                station_id: StationId(1),
                frequencies: vec![5529, 8927],
            }],
            1_000,
        );
        assert_eq!(table.get(StationId(1)).unwrap().frequencies.len(), 2);
        assert!(table.get(StationId(2)).is_none());

        table.ingest_packet(
            &[SquitterEntry {
                station_id: StationId(2),
                frequencies: vec![10090],
            }],
            1_010,
        );
        // station 1 untouched by the second packet
        assert_eq!(table.get(StationId(1)).unwrap().last_updated, 1_000);
        assert_eq!(table.get(StationId(2)).unwrap().last_updated, 1_010);
    }

    #[test]
    fn airframes_ingest_replaces_and_rounds_frequencies() {
        let mut table = StationTable::new(TableKind::Remote);
        let doc = json!({
            "ground_stations": [
                {
                    "id": 1,
                    "name": "San Jose",
                    "frequencies": {"active": [5529.0, 8927.5]},
                    "last_updated": 1_700_000_000i64
                }
            ]
        });
        let touched = table.ingest_airframes(&doc).unwrap();
        assert_eq!(touched, vec![StationId(1)]);
        let station = table.get(StationId(1)).unwrap();
        assert_eq!(station.name, "San Jose");
        assert!(station.frequencies.contains(&8928));
    }

    #[test]
    fn system_ingest_stamps_now_and_ignores_coordinates() {
        let mut table = StationTable::new(TableKind::System);
        let doc = json!([
            {"id": 4, "name": "Shannon", "frequencies": [11184.0], "lat": 52.7, "lon": -8.9}
        ]);
        table.ingest_system(&doc, 42).unwrap();
        let station = table.get(StationId(4)).unwrap();
        assert_eq!(station.last_updated, 42);
        assert!(station.frequencies.contains(&11184));
    }

    #[test]
    fn malformed_document_is_rejected_without_mutating() {
        let mut table = StationTable::new(TableKind::Remote);
        table
            .ingest_airframes(&json!({"ground_stations": [{"id": 1, "name": "x", "frequencies": {"active": [1.0]}, "last_updated": 1}]}))
            .unwrap();
        let err = table.ingest_airframes(&json!({"not_ground_stations": []}));
        assert!(err.is_err());
        // previous contents retained
        assert!(table.get(StationId(1)).is_some());
    }
}
