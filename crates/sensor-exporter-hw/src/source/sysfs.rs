//! Linux sysfs sensor source.
//!
//! Reads hwmon chips under `/sys/class/hwmon` and batteries under
//! `/sys/class/power_supply`. Values are reported as unit-suffixed text in the
//! same shape an SMC dump uses, e.g. "45.5 °C" or "1800 rpm".
//!
//! hwmon ABI: https://www.kernel.org/doc/Documentation/hwmon/sysfs-interface

use super::ReadingSource;
use crate::{Error, Result, Snapshot};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default hwmon class directory.
pub const DEFAULT_HWMON_ROOT: &str = "/sys/class/hwmon";

/// Default power supply class directory.
pub const DEFAULT_POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

/// One hwmon channel type and how to report it.
struct Channel {
    /// File prefix, e.g. "temp" for `temp1_input`.
    prefix: &'static str,
    category: &'static str,
    /// Label used when the chip has no `*_label` file.
    fallback_label: &'static str,
    /// Raw sysfs value per reported unit.
    divisor: f64,
    unit: &'static str,
}

const CHANNELS: [Channel; 5] = [
    Channel {
        prefix: "temp",
        category: "Temperature",
        fallback_label: "Temp",
        divisor: 1_000.0,
        unit: "°C",
    },
    Channel {
        prefix: "fan",
        category: "Fans",
        fallback_label: "Fan",
        divisor: 1.0,
        unit: "rpm",
    },
    Channel {
        prefix: "in",
        category: "Voltage",
        fallback_label: "In",
        divisor: 1_000.0,
        unit: "V",
    },
    Channel {
        prefix: "curr",
        category: "Current",
        fallback_label: "Curr",
        divisor: 1_000.0,
        unit: "A",
    },
    Channel {
        prefix: "power",
        category: "Power",
        fallback_label: "Power",
        divisor: 1_000_000.0,
        unit: "W",
    },
];

/// Source reading the Linux hwmon and power supply classes.
pub struct SysfsSource {
    hwmon_root: PathBuf,
    power_supply_root: Option<PathBuf>,
}

impl SysfsSource {
    /// Creates a source over custom roots. Batteries are skipped when
    /// `power_supply_root` is `None`.
    pub fn new<P: AsRef<Path>>(hwmon_root: P, power_supply_root: Option<PathBuf>) -> Self {
        Self {
            hwmon_root: hwmon_root.as_ref().to_path_buf(),
            power_supply_root,
        }
    }

    fn read_hwmon(&self, snapshot: &mut Snapshot) -> Result<()> {
        if !self.hwmon_root.is_dir() {
            return Err(Error::SourceNotFound(self.hwmon_root.clone()));
        }

        for dir in sorted_entries(&self.hwmon_root)? {
            let dir_name = file_name(&dir);
            let chip = read_trimmed(&dir.join("name")).unwrap_or_else(|| dir_name.clone());

            let files = match sorted_entries(&dir) {
                Ok(files) => files,
                Err(e) => {
                    debug!("Skipping hwmon chip {}: {}", dir_name, e);
                    continue;
                }
            };

            for file in files {
                let name = file_name(&file);
                let Some((channel, index)) = parse_input_name(&name) else {
                    continue;
                };

                let raw = match read_trimmed(&file).and_then(|s| s.parse::<i64>().ok()) {
                    Some(raw) => raw,
                    None => {
                        debug!("Unreadable sensor {}/{}", dir_name, name);
                        continue;
                    }
                };

                let label_path = dir.join(format!("{}{}_label", channel.prefix, index));
                let label = read_trimmed(&label_path)
                    .unwrap_or_else(|| format!("{} {}", channel.fallback_label, index));
                let mut description = format!("{} {}", chip, label);
                if has_reading(snapshot, channel.category, &description) {
                    description = format!("{} ({})", description, dir_name);
                }

                let value = format!("{} {}", raw as f64 / channel.divisor, channel.unit);
                snapshot.insert(channel.category, description, value);
            }
        }

        Ok(())
    }

    fn read_batteries(&self, root: &Path, snapshot: &mut Snapshot) {
        let supplies = match sorted_entries(root) {
            Ok(supplies) => supplies,
            Err(e) => {
                debug!("No power supplies at {}: {}", root.display(), e);
                return;
            }
        };

        for dir in supplies {
            if read_trimmed(&dir.join("type")).as_deref() != Some("Battery") {
                continue;
            }
            let name = file_name(&dir);

            if let Some(capacity) =
                read_trimmed(&dir.join("capacity")).and_then(|s| s.parse::<i64>().ok())
            {
                snapshot.insert("Battery", format!("{} Capacity", name), capacity);
            }
            if let Some(status) = read_trimmed(&dir.join("status")) {
                snapshot.insert("Battery", format!("{} Charging", name), status == "Charging");
            }

            // Micro-units in sysfs.
            let scaled = [
                ("voltage_now", "Voltage", "V"),
                ("current_now", "Current", "A"),
                ("power_now", "Power", "W"),
            ];
            for (file, label, unit) in scaled {
                if let Some(raw) = read_trimmed(&dir.join(file)).and_then(|s| s.parse::<i64>().ok())
                {
                    let value = format!("{} {}", raw as f64 / 1_000_000.0, unit);
                    snapshot.insert("Battery", format!("{} {}", name, label), value);
                }
            }
        }
    }
}

impl Default for SysfsSource {
    fn default() -> Self {
        Self::new(
            DEFAULT_HWMON_ROOT,
            Some(PathBuf::from(DEFAULT_POWER_SUPPLY_ROOT)),
        )
    }
}

impl ReadingSource for SysfsSource {
    fn name(&self) -> &str {
        "sysfs"
    }

    fn snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        self.read_hwmon(&mut snapshot)?;
        if let Some(root) = &self.power_supply_root {
            self.read_batteries(root, &mut snapshot);
        }
        Ok(snapshot)
    }
}

/// Matches `<prefix><n>_input` against the known channels.
fn parse_input_name(name: &str) -> Option<(&'static Channel, u32)> {
    let stem = name.strip_suffix("_input")?;
    CHANNELS.iter().find_map(|channel| {
        let digits = stem.strip_prefix(channel.prefix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(|index| (channel, index))
    })
}

fn has_reading(snapshot: &Snapshot, category: &str, description: &str) -> bool {
    snapshot
        .readings()
        .any(|r| r.category == category && r.description == description)
}

/// Lists a directory sorted by path, following symlinks as sysfs class dirs use them.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
