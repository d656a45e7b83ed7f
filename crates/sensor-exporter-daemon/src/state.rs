//! Application state shared by the HTTP handlers.

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::metrics::SensorsCollector;

/// Reasons a scrape produced no output.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The reading source could not produce a snapshot.
    #[error("sensor source unavailable: {0}")]
    Source(#[from] sensor_exporter_hw::Error),

    /// The reading source did not answer in time.
    #[error("sensor source timed out after {0:?}")]
    Timeout(Duration),

    /// The blocking collection task panicked or was cancelled.
    #[error("collection task failed: {0}")]
    Task(String),

    /// The collected metrics could not be encoded.
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
}

impl ScrapeError {
    /// True when the failure is on the sensor side rather than ours.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ScrapeError::Source(_) | ScrapeError::Timeout(_))
    }
}

/// The exporter's own metrics.
struct Telemetry {
    registry: Registry,
    scrapes: IntCounter,
    scrape_errors: IntCounter,
    scrape_duration: Gauge,
    readings: IntGauge,
}

impl Telemetry {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let scrapes = IntCounter::new(
            "sensor_exporter_scrapes_total",
            "Total number of sensor scrapes",
        )?;
        let scrape_errors = IntCounter::new(
            "sensor_exporter_scrape_errors_total",
            "Total number of sensor scrapes that failed",
        )?;
        let scrape_duration = Gauge::new(
            "sensor_exporter_scrape_duration_seconds",
            "Duration of the last sensor scrape in seconds",
        )?;
        let readings = IntGauge::new(
            "sensor_exporter_readings",
            "Number of readings exposed by the last successful scrape",
        )?;

        registry.register(Box::new(scrapes.clone()))?;
        registry.register(Box::new(scrape_errors.clone()))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(readings.clone()))?;

        Ok(Self {
            registry,
            scrapes,
            scrape_errors,
            scrape_duration,
            readings,
        })
    }
}

/// Shared application state.
pub struct AppState {
    collector: Arc<SensorsCollector>,
    scrape_timeout: Duration,
    metrics_path: String,
    /// Held for the life of a blocking collection, so a hung source occupies
    /// at most one thread.
    collecting: Arc<Semaphore>,
    telemetry: Telemetry,
}

impl AppState {
    /// Creates the state for a collector.
    pub fn new(
        collector: SensorsCollector,
        scrape_timeout: Duration,
        metrics_path: impl Into<String>,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            collector: Arc::new(collector),
            scrape_timeout,
            metrics_path: metrics_path.into(),
            collecting: Arc::new(Semaphore::new(1)),
            telemetry: Telemetry::new()?,
        })
    }

    /// Returns the path metrics are served on.
    pub fn metrics_path(&self) -> &str {
        &self.metrics_path
    }

    /// Runs one scrape and returns the text exposition.
    pub async fn scrape(&self) -> Result<String, ScrapeError> {
        let started = Instant::now();
        self.telemetry.scrapes.inc();

        let result = self.collect_sensors().await;
        let elapsed = started.elapsed();
        self.telemetry.scrape_duration.set(elapsed.as_secs_f64());

        let mut families = match result {
            Ok(families) => families,
            Err(e) => {
                self.telemetry.scrape_errors.inc();
                return Err(e);
            }
        };

        let readings: usize = families.iter().map(|f| f.get_metric().len()).sum();
        self.telemetry.readings.set(readings as i64);
        debug!("Scraped {} readings in {:?}", readings, elapsed);

        families.extend(self.telemetry.registry.gather());
        encode(&families)
    }

    /// Collects on the blocking pool, bounded by the scrape timeout.
    ///
    /// Collections run one at a time. A scrape that cannot start before its
    /// deadline, because an earlier collection is still running, times out
    /// without touching the source.
    async fn collect_sensors(&self) -> Result<Vec<MetricFamily>, ScrapeError> {
        let collector = self.collector.clone();
        let collecting = self.collecting.clone();
        let collection = async move {
            let permit = match collecting.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return Err(ScrapeError::Task(e.to_string())),
            };
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                collector.collect_families()
            });
            match task.await {
                Ok(result) => result.map_err(ScrapeError::from),
                Err(e) => Err(ScrapeError::Task(e.to_string())),
            }
        };

        tokio::time::timeout(self.scrape_timeout, collection)
            .await
            .unwrap_or(Err(ScrapeError::Timeout(self.scrape_timeout)))
    }
}

/// Encodes metric families in the Prometheus text format.
pub fn encode(families: &[MetricFamily]) -> Result<String, ScrapeError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| ScrapeError::Encode(prometheus::Error::Msg(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingSource, FlakySource, StaticSource, Tracked};
    use sensor_exporter_hw::{ReadingSource, Snapshot};
    use std::sync::atomic::Ordering;

    fn state(source: Arc<dyn ReadingSource>, timeout: Duration) -> AppState {
        AppState::new(SensorsCollector::new(source), timeout, "/metrics").unwrap()
    }

    fn fan_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert("Fans", "Fan 0", "1800 rpm");
        snapshot.insert("Fans", "Fan 1", "2100 rpm");
        snapshot
    }

    #[tokio::test]
    async fn test_scrape_renders_text_format() {
        let state = state(
            Arc::new(StaticSource::new(fan_snapshot())),
            Duration::from_secs(5),
        );

        let body = state.scrape().await.unwrap();
        assert!(body.contains("# HELP sensor_fans_fan_rpm Fan\n"));
        assert!(body.contains("# TYPE sensor_fans_fan_rpm gauge\n"));
        assert!(body.contains("sensor_fans_fan_rpm{index=\"0\"} 1800\n"));
        assert!(body.contains("sensor_fans_fan_rpm{index=\"1\"} 2100\n"));
        assert!(body.contains("sensor_exporter_scrapes_total 1\n"));
        assert!(body.contains("sensor_exporter_readings 2\n"));
        assert_eq!(state.metrics_path(), "/metrics");
    }

    #[tokio::test]
    async fn test_empty_snapshot_scrapes_cleanly() {
        let state = state(
            Arc::new(StaticSource::new(Snapshot::new())),
            Duration::from_secs(5),
        );
        let body = state.scrape().await.unwrap();
        assert!(!body.contains("sensor_fans"));
        assert!(body.contains("sensor_exporter_readings 0\n"));
    }

    #[tokio::test]
    async fn test_source_failure_is_a_scrape_error() {
        let state = state(Arc::new(FailingSource), Duration::from_secs(5));
        let err = state.scrape().await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("SMC not accessible"));
        assert_eq!(state.telemetry.scrape_errors.get(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_source_failure() {
        let source = Arc::new(FlakySource::new(fan_snapshot()));
        let state = state(source.clone(), Duration::from_secs(5));

        assert!(state.scrape().await.is_err());
        source.down.store(false, Ordering::SeqCst);
        let body = state.scrape().await.unwrap();
        assert!(body.contains("sensor_fans_fan_rpm{index=\"1\"} 2100\n"));
        assert!(body.contains("sensor_exporter_scrape_errors_total 1\n"));
        assert!(body.contains("sensor_exporter_scrapes_total 2\n"));
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let state = state(
            Arc::new(
                Tracked::new(StaticSource::new(Snapshot::new()))
                    .with_delay(Duration::from_millis(500)),
            ),
            Duration::from_millis(50),
        );
        let err = state.scrape().await.unwrap_err();
        assert!(matches!(err, ScrapeError::Timeout(_)));
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_hung_source_holds_at_most_one_thread() {
        let source = Arc::new(
            Tracked::new(StaticSource::new(fan_snapshot())).with_delay(Duration::from_millis(300)),
        );
        let state = state(source.clone(), Duration::from_millis(30));

        for _ in 0..5 {
            let err = state.scrape().await.unwrap_err();
            assert!(matches!(err, ScrapeError::Timeout(_)));
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(source.active.load(Ordering::SeqCst) <= 1);

        // Once the stuck call returns, the next scrape reads the source again.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(source.active.load(Ordering::SeqCst), 0);
        let err = state.scrape().await.unwrap_err();
        assert!(matches!(err, ScrapeError::Timeout(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_scrapes() {
        let state = Arc::new(state(
            Arc::new(StaticSource::new(fan_snapshot())),
            Duration::from_secs(5),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move { state.scrape().await })
            })
            .collect();
        for handle in handles {
            let body = handle.await.unwrap().unwrap();
            assert!(body.contains("sensor_fans_fan_rpm{index=\"0\"} 1800\n"));
        }
        assert_eq!(state.telemetry.scrapes.get(), 8);
    }
}
