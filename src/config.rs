//! Configuration loading.
//!
//! A single TOML document, deserialized into an all-`Option` `RawConfig`
//! and then validated and defaulted into `ConductorConfig`. Keeping the
//! raw, partially-specified shape separate from the fully-resolved one
//! means a missing field produces one clear validation error instead of a
//! deserialization failure pointing at the wrong line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::station::StationId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    aggregator: Option<RawAggregator>,
    conductor: Option<RawConductor>,
    process: Option<RawProcess>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAggregator {
    state: Option<String>,
    save_delay: Option<u64>,
    station_updates: Option<Vec<RawStationUpdate>>,
    station_files: Option<Vec<RawStationFile>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawStationUpdate {
    Table { url: String, period: Option<u64> },
    Bare(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RawStationFile {
    path: String,
    period: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConductor {
    ranked_stations: Option<Vec<u32>>,
    ignored_frequencies: Option<Vec<RawIgnoredFrequency>>,
    slot_width: Option<u32>,
    receivers: Option<Vec<RawReceiver>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawIgnoredFrequency {
    Range(Vec<u32>),
    Single(u32),
}

#[derive(Debug, Clone, Deserialize)]
struct RawReceiver {
    name: String,
    sample_rate: Option<u32>,
    command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawProcess {
    recoverable_error_limit: Option<u32>,
    settle_time_secs: Option<u64>,
    fire_once: Option<bool>,
    shell: Option<bool>,
    valid_return_codes: Option<Vec<i32>>,
    recoverable_errors: Option<Vec<String>>,
    unrecoverable_errors: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct StationUpdateSource {
    pub url: String,
    pub period: Duration,
}

#[derive(Debug, Clone)]
pub struct StationFileSource {
    pub path: PathBuf,
    pub period: Duration,
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub name: String,
    pub sample_rate: u32,
    pub command: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessTuning {
    pub recoverable_error_limit: u32,
    pub settle_time: Duration,
    pub fire_once: bool,
    pub shell: bool,
    pub valid_return_codes: Vec<i32>,
    pub recoverable_errors: Vec<Regex>,
    pub unrecoverable_errors: Vec<Regex>,
}

impl Default for ProcessTuning {
    fn default() -> Self {
        Self {
            recoverable_error_limit: 10,
            settle_time: Duration::ZERO,
            fire_once: false,
            shell: false,
            valid_return_codes: vec![0],
            recoverable_errors: vec![],
            unrecoverable_errors: vec![],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConductorConfig {
    pub state_path: Option<PathBuf>,
    pub save_delay: Duration,
    pub station_updates: Vec<StationUpdateSource>,
    pub station_files: Vec<StationFileSource>,
    pub ranked_stations: Vec<StationId>,
    pub ignored_frequencies: Vec<(u32, u32)>,
    pub slot_width: u32,
    pub receivers: Vec<ReceiverConfig>,
    pub process: ProcessTuning,
}

pub fn load_config(path: impl AsRef<Path>) -> Result<ConductorConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_from_str(&text, path)
}

fn load_config_from_str(text: &str, path: &Path) -> Result<ConductorConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate(raw)
}

fn validate(raw: RawConfig) -> Result<ConductorConfig, ConfigError> {
    let aggregator = raw.aggregator.unwrap_or(RawAggregator {
        state: None,
        save_delay: None,
        station_updates: None,
        station_files: None,
    });
    let conductor = raw.conductor.ok_or(ConfigError::MissingField("conductor"))?;
    let process = raw.process.unwrap_or_default();

    let station_updates = aggregator
        .station_updates
        .unwrap_or_default()
        .into_iter()
        .map(|u| match u {
            RawStationUpdate::Table { url, period } => StationUpdateSource {
                url,
                period: Duration::from_secs(period.unwrap_or(60)),
            },
            RawStationUpdate::Bare(url) => StationUpdateSource {
                url,
                period: Duration::from_secs(60),
            },
        })
        .collect();

    let station_files = aggregator
        .station_files
        .unwrap_or_default()
        .into_iter()
        .map(|f| StationFileSource {
            path: PathBuf::from(f.path),
            period: Duration::from_secs(f.period.unwrap_or(3600)),
        })
        .collect();

    let ranked_stations: Vec<StationId> = conductor
        .ranked_stations
        .ok_or(ConfigError::MissingField("conductor.ranked_stations"))?
        .into_iter()
        .map(StationId)
        .collect();
    let mut seen = std::collections::HashSet::new();
    for id in &ranked_stations {
        if !seen.insert(*id) {
            return Err(ConfigError::InvalidValue {
                field: "conductor.ranked_stations",
                reason: format!("duplicate station id {}", id.0),
            });
        }
    }

    let ignored_frequencies = conductor
        .ignored_frequencies
        .unwrap_or_default()
        .into_iter()
        .map(|f| match f {
            RawIgnoredFrequency::Range(pair) if pair.len() == 2 => Ok((pair[0], pair[1])),
            RawIgnoredFrequency::Range(_) => Err(ConfigError::InvalidValue {
                field: "conductor.ignored_frequencies",
                reason: "ranges must have exactly two bounds".to_string(),
            }),
            RawIgnoredFrequency::Single(f) => Ok((f, f)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let slot_width = conductor
        .slot_width
        .ok_or(ConfigError::MissingField("conductor.slot_width"))?;
    if slot_width == 0 {
        return Err(ConfigError::InvalidValue {
            field: "conductor.slot_width",
            reason: "must be positive".to_string(),
        });
    }

    let mut receiver_names = std::collections::HashSet::new();
    let receivers = conductor
        .receivers
        .unwrap_or_default()
        .into_iter()
        .map(|r| {
            if !receiver_names.insert(r.name.clone()) {
                return Err(ConfigError::InvalidValue {
                    field: "conductor.receivers",
                    reason: format!("duplicate receiver name {:?}", r.name),
                });
            }
            Ok(ReceiverConfig {
                name: r.name,
                sample_rate: r.sample_rate.unwrap_or(slot_width),
                command: r.command.unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if receivers.is_empty() {
        return Err(ConfigError::MissingField("conductor.receivers"));
    }

    let compile_all = |patterns: Vec<String>, field: &'static str| {
        patterns
            .into_iter()
            .map(|p| {
                Regex::new(&p).map_err(|e| ConfigError::InvalidValue {
                    field,
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
    };

    let process_tuning = ProcessTuning {
        recoverable_error_limit: process.recoverable_error_limit.unwrap_or(10),
        settle_time: Duration::from_secs(process.settle_time_secs.unwrap_or(0)),
        fire_once: process.fire_once.unwrap_or(false),
        shell: process.shell.unwrap_or(false),
        valid_return_codes: process.valid_return_codes.unwrap_or_else(|| vec![0]),
        recoverable_errors: compile_all(
            process.recoverable_errors.unwrap_or_default(),
            "process.recoverable_errors",
        )?,
        unrecoverable_errors: compile_all(
            process.unrecoverable_errors.unwrap_or_default(),
            "process.unrecoverable_errors",
        )?,
    };

    Ok(ConductorConfig {
        state_path: aggregator.state.map(PathBuf::from),
        save_delay: Duration::from_secs(aggregator.save_delay.unwrap_or(2)),
        station_updates,
        station_files,
        ranked_stations,
        ignored_frequencies,
        slot_width,
        receivers,
        process: process_tuning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_minimal_config_loads_ok() {
        let toml = r#"
            [aggregator]
            state = "/var/lib/hfdl-conductor/stations.json"

            [conductor]
            ranked_stations = [2, 1]
            slot_width = 96000

            [[conductor.receivers]]
            name = "web888-1"
            sample_rate = 96000
        "#;
        let config = validate(toml::from_str(toml).unwrap()).unwrap();
        assert_eq!(config.ranked_stations, vec![StationId(2), StationId(1)]);
        assert_eq!(config.receivers.len(), 1);
        assert_eq!(config.save_delay, Duration::from_secs(2));
    }

    #[test]
    fn bare_station_update_url_gets_the_default_period() {
        let toml = r#"
            [aggregator]
            station_updates = ["https://api.airframes.io/hfdl/ground-stations"]

            [conductor]
            ranked_stations = [1]
            slot_width = 96000

            [[conductor.receivers]]
            name = "r1"
        "#;
        let config = validate(toml::from_str(toml).unwrap()).unwrap();
        assert_eq!(config.station_updates.len(), 1);
        assert_eq!(config.station_updates[0].period, Duration::from_secs(60));
    }

    #[test]
    fn duplicate_ranked_station_ids_are_rejected() {
        let toml = r#"
            [conductor]
            ranked_stations = [1, 1]
            slot_width = 96000

            [[conductor.receivers]]
            name = "r1"
        "#;
        let err = validate(toml::from_str(toml).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "conductor.ranked_stations", .. }));
    }

    #[test]
    fn missing_conductor_section_is_a_missing_field_error() {
        let err = validate(toml::from_str("").unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("conductor")));
    }

    #[test]
    fn zero_slot_width_is_rejected() {
        let toml = r#"
            [conductor]
            ranked_stations = [1]
            slot_width = 0

            [[conductor.receivers]]
            name = "r1"
        "#;
        let err = validate(toml::from_str(toml).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "conductor.slot_width", .. }));
    }
}
