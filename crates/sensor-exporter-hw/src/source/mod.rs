//! Reading sources.
//!
//! A source produces a fresh [`Snapshot`] on every call. Sources are shared
//! between concurrent scrapes, so they must be `Send + Sync`; a source that
//! wraps a single non-reentrant handle should be wrapped in [`Exclusive`].

mod command;
mod file;
mod sysfs;

pub use command::CommandSource;
pub use file::FileSource;
pub use sysfs::{SysfsSource, DEFAULT_HWMON_ROOT, DEFAULT_POWER_SUPPLY_ROOT};

use crate::{Error, Result, Snapshot};
use std::sync::{Arc, Mutex};

/// Trait for all reading sources.
pub trait ReadingSource: Send + Sync {
    /// Returns a short name for logs.
    fn name(&self) -> &str;

    /// Reads every sensor the source knows about.
    fn snapshot(&self) -> Result<Snapshot>;
}

impl<S: ReadingSource + ?Sized> ReadingSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn snapshot(&self) -> Result<Snapshot> {
        (**self).snapshot()
    }
}

impl<S: ReadingSource + ?Sized> ReadingSource for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn snapshot(&self) -> Result<Snapshot> {
        (**self).snapshot()
    }
}

/// Serializes access to a source that must not be read concurrently.
pub struct Exclusive<S> {
    name: String,
    inner: Mutex<S>,
}

impl<S: ReadingSource> Exclusive<S> {
    /// Wraps a source behind a mutex.
    pub fn new(inner: S) -> Self {
        Self {
            name: inner.name().to_string(),
            inner: Mutex::new(inner),
        }
    }
}

impl<S: ReadingSource> ReadingSource for Exclusive<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> Result<Snapshot> {
        let source = self
            .inner
            .lock()
            .map_err(|_| Error::Poisoned(self.name.clone()))?;
        source.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records how many callers are inside `snapshot` at once.
    #[derive(Default)]
    struct Overlap {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ReadingSource for Overlap {
        fn name(&self) -> &str {
            "overlap"
        }

        fn snapshot(&self) -> Result<Snapshot> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Snapshot::new())
        }
    }

    #[test]
    fn test_exclusive_serializes_callers() {
        let source = Arc::new(Exclusive::new(Overlap::default()));
        assert_eq!(source.name(), "overlap");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let source = source.clone();
                std::thread::spawn(move || source.snapshot().map(|s| s.len()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 0);
        }

        let peak = source.inner.lock().unwrap().peak.load(Ordering::SeqCst);
        assert_eq!(peak, 1);
    }

    #[test]
    fn test_boxed_source_delegates() {
        let source: Box<dyn ReadingSource> = Box::new(Overlap::default());
        assert_eq!(source.name(), "overlap");
        assert!(source.snapshot().unwrap().is_empty());
    }
}
