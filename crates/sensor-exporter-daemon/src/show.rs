//! One-shot rendering of the current readings.

use anyhow::{Context, Result};
use sensor_exporter_hw::{Category, ReadingSource, Snapshot};
use std::fmt::Write;
use std::sync::Arc;

use crate::metrics::SensorsCollector;
use crate::state::encode;

/// Output format for `show`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Indented text grouped by category
    #[default]
    Ascii,
    /// Aligned columns
    Table,
    /// The raw snapshot as JSON
    Json,
    /// What a scrape would return
    Prometheus,
}

/// Reads the source once and prints it.
pub fn run(source: Arc<dyn ReadingSource>, format: OutputFormat) -> Result<()> {
    let output = render(source, format)?;
    print!("{}", output);
    Ok(())
}

/// Reads the source once and renders it in the given format.
pub fn render(source: Arc<dyn ReadingSource>, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Ascii => Ok(render_ascii(&read(source.as_ref())?)),
        OutputFormat::Table => Ok(render_table(&read(source.as_ref())?)),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&read(source.as_ref())?)?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Prometheus => render_prometheus(source),
    }
}

fn read(source: &dyn ReadingSource) -> Result<Snapshot> {
    source
        .snapshot()
        .with_context(|| format!("Failed to read sensors from {}", source.name()))
}

fn render_ascii(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    for (name, category) in snapshot.categories() {
        let _ = writeln!(out, "{}:", name);
        match category {
            Category::Group(readings) => {
                for (description, details) in readings {
                    let _ = writeln!(out, "  {}: {}", description, details.value);
                }
            }
            Category::Unmodeled(value) => {
                let _ = writeln!(out, "  {}", value);
            }
        }
    }
    out
}

fn render_table(snapshot: &Snapshot) -> String {
    let mut rows = vec![(
        "CATEGORY".to_string(),
        "DESCRIPTION".to_string(),
        "VALUE".to_string(),
    )];
    for (name, category) in snapshot.categories() {
        match category {
            Category::Group(readings) => {
                for (description, details) in readings {
                    rows.push((
                        name.to_string(),
                        description.clone(),
                        details.value.to_string(),
                    ));
                }
            }
            Category::Unmodeled(value) => {
                rows.push((name.to_string(), "-".to_string(), value.to_string()));
            }
        }
    }

    let mut category_width = 0;
    let mut description_width = 0;
    for (category, description, _) in &rows {
        category_width = category_width.max(category.chars().count());
        description_width = description_width.max(description.chars().count());
    }

    let mut out = String::new();
    for (category, description, value) in &rows {
        let _ = writeln!(
            out,
            "{:<category_width$}  {:<description_width$}  {}",
            category, description, value
        );
    }
    out
}

fn render_prometheus(source: Arc<dyn ReadingSource>) -> Result<String> {
    let collector = SensorsCollector::new(source);
    let families = collector
        .collect_families()
        .with_context(|| format!("Failed to read sensors from {}", collector.source_name()))?;
    Ok(encode(&families)?)
}
