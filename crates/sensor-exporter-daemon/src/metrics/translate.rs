//! Translation of raw readings into metric descriptors and gauge values.
//!
//! Everything here is a pure function of (category, description, value), so a
//! given sensor maps to the same descriptor on every scrape.

use sensor_exporter_hw::{Reading, ReadingValue};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, warn};

/// Prefix of every sensor metric name.
pub const NAMESPACE: &str = "sensor_";

/// Label holding a number extracted from a description.
pub const INDEX_LABEL: &str = "index";

/// Name, help text and constant labels of one metric series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub labels: BTreeMap<String, String>,
}

/// A translated reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub descriptor: MetricDescriptor,
    pub value: f64,
}

/// Translates one reading into a descriptor and gauge value.
pub fn translate(reading: &Reading<'_>) -> Sample {
    Sample {
        descriptor: describe(reading.category, reading.description, reading.value),
        value: gauge_value(reading.value),
    }
}

/// Infers the unit token from a unit-suffixed text value such as "45.5 °C".
///
/// Returns `None` for non-text values, text without a space, and unknown units.
pub fn unit_of(value: &ReadingValue) -> Option<&'static str> {
    let ReadingValue::Text(text) = value else {
        return None;
    };
    let (_, suffix) = text.split_once(' ')?;
    match suffix {
        "A" => Some("amperes"),
        "V" => Some("volts"),
        "W" => Some("watt"),
        "°C" => Some("celsius"),
        "rpm" => Some("rpm"),
        other => {
            debug!("Unrecognized unit {:?} in {:?}", other, text);
            None
        }
    }
}

/// Derives the metric descriptor for a reading.
///
/// A description with exactly one run of digits that does not start it has
/// that run moved into the `index` label, so "Fan 0" and "Fan 1" share one
/// metric name. Indexed help text is the description alone; otherwise it is
/// prefixed with the category.
pub fn describe(category: &str, description: &str, value: &ReadingValue) -> MetricDescriptor {
    let (base, index) = split_index(description);
    let qualified = normalize_spaces(&format!("{} {}", category, base));

    let mut name = String::with_capacity(NAMESPACE.len() + qualified.len() + 9);
    name.push_str(NAMESPACE);
    for c in qualified.to_lowercase().chars() {
        match c {
            ' ' | '.' | '-' => name.push('_'),
            '(' | ')' => {}
            c => name.push(c),
        }
    }
    if let Some(unit) = unit_of(value) {
        name.push('_');
        name.push_str(unit);
    }

    let mut labels = BTreeMap::new();
    let help = match index {
        Some(index) => {
            labels.insert(INDEX_LABEL.to_string(), index.to_string());
            normalize_spaces(&base)
        }
        None => qualified,
    };

    MetricDescriptor { name, help, labels }
}

/// Coerces a reading to a gauge value. Never fails: anything that cannot be
/// read as a number is logged and reported as 0.
pub fn gauge_value(value: &ReadingValue) -> f64 {
    match value {
        ReadingValue::Integer(i) => *i as f64,
        ReadingValue::Float(f) => *f,
        ReadingValue::Boolean(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        ReadingValue::Text(text) => {
            let number = text.split_once(' ').map_or(text.as_str(), |(n, _)| n);
            match number.parse::<f64>() {
                Ok(v) => v,
                Err(_) => {
                    warn!("Cannot read {:?} ({}) as a number, using 0", text, value.kind());
                    0.0
                }
            }
        }
        ReadingValue::Unsupported(raw) => {
            warn!("Unsupported reading {} ({}), using 0", raw, value.kind());
            0.0
        }
    }
}

/// Splits out a single embedded index. Returns the description with the
/// digits removed and the digits themselves.
fn split_index(description: &str) -> (String, Option<&str>) {
    let runs = digit_runs(description);
    match runs.as_slice() {
        [run] if run.start > 0 => {
            let mut base = String::with_capacity(description.len());
            base.push_str(&description[..run.start]);
            base.push_str(&description[run.end..]);
            (base, Some(&description[run.clone()]))
        }
        _ => (description.to_string(), None),
    }
}

/// Byte ranges of maximal ASCII digit runs.
fn digit_runs(s: &str) -> Vec<Range<usize>> {
    let bytes = s.as_bytes();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            runs.push(start..i);
        } else {
            i += 1;
        }
    }
    runs
}

/// Trims and collapses repeated spaces.
fn normalize_spaces(s: &str) -> String {
    s.split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
