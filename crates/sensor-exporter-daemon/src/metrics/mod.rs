//! Sensor metrics: reading translation and collection.

mod collector;
pub mod translate;

pub use collector::SensorsCollector;
