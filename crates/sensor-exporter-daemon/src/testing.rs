//! Reading sources for tests.

use sensor_exporter_hw::{Error, ReadingSource, Result, Snapshot};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Returns the same snapshot on every call.
pub struct StaticSource {
    snapshot: Snapshot,
}

impl StaticSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

impl ReadingSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.snapshot.clone())
    }
}

/// Never produces a snapshot.
pub struct FailingSource;

impl ReadingSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    fn snapshot(&self) -> Result<Snapshot> {
        Err(Error::Command {
            program: "smc".to_string(),
            reason: "SMC not accessible".to_string(),
        })
    }
}

/// Fails while `down` is set, otherwise returns its snapshot.
pub struct FlakySource {
    pub down: AtomicBool,
    snapshot: Snapshot,
}

impl FlakySource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            down: AtomicBool::new(true),
            snapshot,
        }
    }
}

impl ReadingSource for FlakySource {
    fn name(&self) -> &str {
        "flaky"
    }

    fn snapshot(&self) -> Result<Snapshot> {
        if self.down.load(Ordering::SeqCst) {
            return FailingSource.snapshot();
        }
        Ok(self.snapshot.clone())
    }
}

/// Counts calls into a source, optionally delaying each one.
pub struct Tracked<S> {
    inner: S,
    delay: Duration,
    /// Calls started so far.
    pub calls: AtomicUsize,
    /// Calls currently running.
    pub active: AtomicUsize,
}

impl<S: ReadingSource> Tracked<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl<S: ReadingSource> ReadingSource for Tracked<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn snapshot(&self) -> Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let snapshot = self.inner.snapshot();
        self.active.fetch_sub(1, Ordering::SeqCst);
        snapshot
    }
}
