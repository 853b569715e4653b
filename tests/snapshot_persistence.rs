//! The aggregator's on-disk snapshot: written on save, reloadable as a
//! previous-run table, and skipped when content is unchanged.

use std::sync::Arc;
use std::time::Duration;

use hfdl_conductor::bus::EventBus;
use hfdl_conductor::clock::ManualClock;
use hfdl_conductor::station::{HfdlPacket, SquitterEntry, StationId};
use hfdl_conductor::Aggregator;

#[tokio::test(start_paused = true)]
async fn a_saved_snapshot_can_be_reloaded_as_previous_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stations.json");

    let bus = Arc::new(EventBus::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let aggregator = Aggregator::new(bus, 0, 0, Some(path.clone()), Duration::from_millis(10), clock);

    aggregator.on_hfdl(&HfdlPacket {
        squitter: vec![SquitterEntry {
            station_id: StationId(1),
            frequencies: vec![5_529, 8_927],
        }],
        frequency_update: vec![],
    });

    tokio::time::advance(Duration::from_millis(20)).await;
    tokio::task::yield_now().await;
    assert!(path.exists());

    // a fresh aggregator, as if after a restart, loads the snapshot as its
    // previous-run table
    let bus2 = Arc::new(EventBus::new());
    let clock2 = Arc::new(ManualClock::new(1_700_000_100));
    let reloaded = Aggregator::new(bus2, 0, 0, None, Duration::from_millis(10), clock2);
    reloaded.load_previous(&path);

    let active = reloaded.active_frequencies(StationId(1));
    assert!(active.contains(&5_529));
    assert!(active.contains(&8_927));
}
