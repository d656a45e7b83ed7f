//! Sensor collector.
//!
//! Pulls a fresh snapshot from the reading source on every collection and turns
//! each reading into a gauge sample. The set of metrics depends on which
//! sensors the host has, so descriptors are only known after a collection.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, Opts};
use sensor_exporter_hw::{ReadingSource, Snapshot};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, warn};

use super::translate::{translate, MetricDescriptor};

/// Collector exposing every reading of a source as a gauge.
pub struct SensorsCollector {
    source: Arc<dyn ReadingSource>,
    /// Descriptors seen by the first describe pass, for registries that need
    /// them up front.
    described: OnceLock<Vec<Desc>>,
}

/// A sample that passed validation, ready to be encoded.
struct Accepted {
    descriptor: MetricDescriptor,
    gauge: Gauge,
}

impl SensorsCollector {
    /// Creates a collector over a reading source.
    pub fn new(source: Arc<dyn ReadingSource>) -> Self {
        Self {
            source,
            described: OnceLock::new(),
        }
    }

    /// Returns the source's name.
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Collects one scrape worth of metric families, ordered by name.
    ///
    /// Fails only when the source cannot produce a snapshot; bad readings are
    /// defaulted or skipped.
    pub fn collect_families(&self) -> sensor_exporter_hw::Result<Vec<MetricFamily>> {
        let snapshot = self.source.snapshot()?;
        Ok(families(accept(&snapshot)))
    }

    /// Returns the descriptors discovered by a single collection pass.
    ///
    /// The pass runs once; later calls return the same descriptors.
    pub fn describe(&self) -> sensor_exporter_hw::Result<&[Desc]> {
        if let Some(descs) = self.described.get() {
            return Ok(descs);
        }
        let snapshot = self.source.snapshot()?;
        let descs = accept(&snapshot)
            .iter()
            .flat_map(|a| a.gauge.desc().into_iter().cloned())
            .collect();
        Ok(self.described.get_or_init(|| descs))
    }
}

impl Collector for SensorsCollector {
    fn desc(&self) -> Vec<&Desc> {
        match self.describe() {
            Ok(descs) => descs.iter().collect(),
            Err(e) => {
                warn!("Cannot describe sensors from {}: {}", self.source_name(), e);
                Vec::new()
            }
        }
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match self.collect_families() {
            Ok(families) => families,
            Err(e) => {
                error!("Cannot read sensors from {}: {}", self.source_name(), e);
                Vec::new()
            }
        }
    }
}

/// Translates every reading and keeps the ones that can be exposed together.
///
/// The first reading of a metric name fixes its help text and label names.
/// Later readings that disagree, or repeat an existing series, are skipped.
fn accept(snapshot: &Snapshot) -> Vec<Accepted> {
    let mut shapes: HashMap<String, (String, Vec<String>)> = HashMap::new();
    let mut series: HashSet<(String, BTreeMap<String, String>)> = HashSet::new();
    let mut accepted = Vec::new();

    for reading in snapshot.readings() {
        let sample = translate(&reading);
        let descriptor = sample.descriptor;
        let label_names: Vec<String> = descriptor.labels.keys().cloned().collect();

        if let Some((help, names)) = shapes.get(&descriptor.name) {
            if *help != descriptor.help || *names != label_names {
                warn!(
                    "Skipping {}/{}: {} already exposed with a different shape",
                    reading.category, reading.description, descriptor.name
                );
                continue;
            }
        }
        let key = (descriptor.name.clone(), descriptor.labels.clone());
        if series.contains(&key) {
            warn!(
                "Skipping {}/{}: duplicate series {} {:?}",
                reading.category, reading.description, descriptor.name, descriptor.labels
            );
            continue;
        }

        let opts = Opts::new(descriptor.name.clone(), descriptor.help.clone())
            .const_labels(descriptor.labels.clone().into_iter().collect());
        let gauge = match Gauge::with_opts(opts) {
            Ok(gauge) => gauge,
            Err(e) => {
                warn!(
                    "Skipping {}/{}: cannot expose as {:?}: {}",
                    reading.category, reading.description, descriptor.name, e
                );
                continue;
            }
        };
        gauge.set(sample.value);

        shapes
            .entry(descriptor.name.clone())
            .or_insert_with(|| (descriptor.help.clone(), label_names));
        series.insert(key);
        accepted.push(Accepted { descriptor, gauge });
    }

    debug!("Translated {} readings", accepted.len());
    accepted
}

/// Groups accepted samples into one family per metric name.
fn families(accepted: Vec<Accepted>) -> Vec<MetricFamily> {
    let mut by_name: BTreeMap<String, MetricFamily> = BTreeMap::new();
    for Accepted { descriptor, gauge } in accepted {
        for mut family in gauge.collect() {
            match by_name.get_mut(&descriptor.name) {
                Some(existing) => {
                    for metric in family.take_metric().into_iter() {
                        existing.mut_metric().push(metric);
                    }
                }
                None => {
                    by_name.insert(descriptor.name.clone(), family);
                }
            }
        }
    }
    by_name.into_values().collect()
}
