//! Periodic refreshers.
//!
//! `UrlRefresher` polls an HTTP endpoint on a fixed period and publishes the
//! decoded JSON body; `FileRefresher` polls a local path on a fixed period
//! and publishes its text only when it changed. Both abandon an in-flight
//! tick and exit promptly when told to stop, rather than finishing the
//! fetch first.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use crate::bus::{BusEvent, EventBus};

pub struct UrlRefresher {
    url: String,
    period: Duration,
    topic: String,
    bus: Arc<EventBus>,
    client: reqwest::Client,
}

impl UrlRefresher {
    pub fn new(bus: Arc<EventBus>, url: impl Into<String>, period: Duration, topic: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            period,
            topic: topic.into(),
            bus,
            client: reqwest::Client::new(),
        }
    }

    /// Runs until `stop` changes. Each tick's fetch is itself raced against
    /// `stop` so a shutdown doesn't wait out a slow or hung request.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = stop.changed() => break,
            }
            tokio::select! {
                result = self.fetch_once() => self.handle(result),
                _ = stop.changed() => break,
            }
        }
    }

    async fn fetch_once(&self) -> Result<serde_json::Value, reqwest::Error> {
        self.client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await
    }

    fn handle(&self, result: Result<serde_json::Value, reqwest::Error>) {
        match result {
            Ok(value) => self.bus.publish(&self.topic, BusEvent::Response(value)),
            Err(error) => warn!(url = %self.url, %error, "refresh fetch failed"),
        }
    }
}

pub struct FileRefresher {
    path: PathBuf,
    period: Duration,
    topic: String,
    bus: Arc<EventBus>,
}

impl FileRefresher {
    pub fn new(bus: Arc<EventBus>, path: impl Into<PathBuf>, period: Duration, topic: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            period,
            topic: topic.into(),
            bus,
        }
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last: Option<String> = None;
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = stop.changed() => break,
            }
            tokio::select! {
                result = tokio::fs::read_to_string(&self.path) => self.handle(result, &mut last),
                _ = stop.changed() => break,
            }
        }
    }

    fn handle(&self, result: std::io::Result<String>, last: &mut Option<String>) {
        match result {
            Ok(contents) => {
                if last.as_ref() != Some(&contents) {
                    self.bus.publish(&self.topic, BusEvent::Text(contents.clone()));
                    *last = Some(contents);
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => warn!(path = ?self.path, %error, "refresh read failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn file_refresher_skips_missing_files_silently() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            bus.subscribe("text:0", move |event| {
                if let BusEvent::Text(t) = event {
                    seen.lock().unwrap().push(t.clone());
                }
            });
        }
        let refresher = FileRefresher {
            path: PathBuf::from("/nonexistent/does/not/exist"),
            period: Duration::from_millis(10),
            topic: "text:0".into(),
            bus: bus.clone(),
        };
        let mut last = None;
        let result = tokio::fs::read_to_string(&refresher.path).await;
        refresher.handle(result, &mut last);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn file_refresher_publishes_only_on_change() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(Mutex::new(0));
        {
            let count = count.clone();
            bus.subscribe("text:0", move |_| *count.lock().unwrap() += 1);
        }
        let refresher = FileRefresher {
            path: PathBuf::from("irrelevant"),
            period: Duration::from_secs(1),
            topic: "text:0".into(),
            bus: bus.clone(),
        };
        let mut last = None;
        refresher.handle(Ok("a".to_string()), &mut last);
        refresher.handle(Ok("a".to_string()), &mut last);
        refresher.handle(Ok("b".to_string()), &mut last);
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
