use std::sync::Arc;
use std::time::Duration;

use hfdl_conductor::allocator::Allocator;
use hfdl_conductor::bus::EventBus;
use hfdl_conductor::clock::SystemClock;
use hfdl_conductor::conductor::Conductor;
use hfdl_conductor::process::{Command, CommandSpec};
use hfdl_conductor::refresh::{FileRefresher, UrlRefresher};
use hfdl_conductor::{config, Aggregator};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "hfdl-conductor.toml".to_string());

    let config = config::load_config(&config_path).unwrap_or_else(|e| {
        eprintln!("FATAL: failed to load config from {config_path}: {e}");
        std::process::exit(1);
    });

    let bus = Arc::new(EventBus::new());
    let aggregator = Aggregator::new(
        bus.clone(),
        config.station_updates.len(),
        config.station_files.len(),
        config.state_path.clone(),
        config.save_delay,
        Arc::new(SystemClock),
    );

    if let Some(path) = &config.state_path {
        aggregator.load_previous(path);
    }

    let allocator = Allocator::new(
        config.ranked_stations.clone(),
        config.ignored_frequencies.clone(),
        config.slot_width,
    );
    let proxy_specs = config
        .receivers
        .iter()
        .map(|r| (r.name.clone(), r.sample_rate))
        .collect();
    let conductor = Arc::new(Conductor::new(bus.clone(), allocator, proxy_specs));

    {
        let conductor = conductor.clone();
        bus.subscribe("frequencies", move |event| {
            if let hfdl_conductor::bus::BusEvent::Frequencies(freqs) = event {
                conductor.on_frequencies(freqs);
            }
        });
    }

    {
        let aggregator = aggregator.clone();
        bus.subscribe("packet", move |event| {
            if let hfdl_conductor::bus::BusEvent::Packet(packet) = event {
                aggregator.on_hfdl(packet);
            }
        });
    }

    let (stop_tx, stop_rx) = watch::channel(false);

    for (index, source) in config.station_updates.iter().enumerate() {
        let aggregator = aggregator.clone();
        let topic = format!("response:{index}");
        bus.subscribe(topic.clone(), move |event| {
            if let hfdl_conductor::bus::BusEvent::Response(value) = event {
                aggregator.on_remote_feed(index, value);
            }
        });
        let refresher = UrlRefresher::new(bus.clone(), source.url.clone(), source.period, topic);
        tokio::spawn(refresher.run(stop_rx.clone()));
    }

    for (index, source) in config.station_files.iter().enumerate() {
        let aggregator = aggregator.clone();
        let topic = format!("text:{index}");
        bus.subscribe(topic.clone(), move |event| {
            if let hfdl_conductor::bus::BusEvent::Text(text) = event {
                aggregator.on_system_file(index, text);
            }
        });
        let refresher = FileRefresher::new(bus.clone(), source.path.clone(), source.period, topic);
        tokio::spawn(refresher.run(stop_rx.clone()));
    }

    for receiver in &config.receivers {
        if receiver.command.is_empty() {
            continue;
        }
        let spec = CommandSpec {
            argv: receiver.command.clone(),
            shell: config.process.shell,
            recoverable_errors: config.process.recoverable_errors.clone(),
            unrecoverable_errors: config.process.unrecoverable_errors.clone(),
            valid_return_codes: config.process.valid_return_codes.clone(),
            fire_once: config.process.fire_once,
            recoverable_error_limit: config.process.recoverable_error_limit,
            settle_time: config.process.settle_time,
        };
        let name = receiver.name.clone();
        let command = Arc::new(Command::new(spec));
        tokio::spawn(async move {
            if let Err(error) = command.execute().await {
                error!(receiver = %name, %error, "process harness exited with an error");
            }
        });
    }

    info!(receivers = config.receivers.len(), "hfdl-conductord started");

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
    let _ = stop_tx.send(true);
}
