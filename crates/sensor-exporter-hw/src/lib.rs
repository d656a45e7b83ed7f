//! Sensor Exporter Hardware Library
//!
//! Reading sources for host hardware sensors (temperature, fan speed, voltage,
//! current, power and battery) and the loosely-typed snapshot model they produce.

pub mod error;
pub mod reading;
pub mod source;

pub use error::{Error, Result};
pub use reading::{Category, Reading, ReadingDetails, ReadingValue, Snapshot};
pub use source::{CommandSource, Exclusive, FileSource, ReadingSource, SysfsSource};
