//! # labreader
//!
//! Uniform access to lab measurement logs: power logs, sensor captures and
//! CSV/XML dumps all answer the same time-range, resampled and statistical
//! queries.
//!
//! ## Features
//!
//! - **One contract**: every format implements [`Reader`]
//! - **Resampling**: any range reduced to a fixed number of samples per second
//! - **Point sampling**: interpolated sensor values at an arbitrary time
//! - **Caching**: fixed-size time chunks loaded concurrently
//! - **Statistics**: min, max, mean, median and variance per sensor
//! - **Live data**: UDP remote reader with an append-only data file
//!
//! ## Modules
//!
//! - [`common`]: data model, reader contract and decorators
//! - [`formats`]: CSV, XML, SVG and remote formats plus the format registry
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use labreader::{open_reader, Config, Reader, StatisticKind};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader = open_reader(Path::new("capture.csv"), &Config::default()).await?;
//!
//!     // Ten samples per second over the first minute
//!     let data = reader.samples_at(0.0, 60.0, 10).await?;
//!     println!("{} samples", data.len());
//!
//!     // Value of every sensor at t = 12.5 s
//!     let sample = reader.sample(12.5).await?;
//!     println!("{:?}", sample.values);
//!
//!     let averages = reader.statistic(StatisticKind::Avg).await?;
//!     println!("{:?}", averages);
//!
//!     Ok(())
//! }
//! ```

pub mod common;
pub mod config;
pub mod formats;

// Re-export top-level types for convenience
pub use common::{
    CachedReader, Event, EventLevel, Exporter, Reader, ReaderError, ReaderResult, Sample, Sensor,
    SensorStatistics, SharedReader, StatisticKind, StatisticReader, SyntheticReader,
};

pub use config::{
    CacheConfig, Config, ConfigError, LoggingConfig, RemoteConfig, StatisticsConfig,
};

pub use formats::{
    exporter_for, open_reader, CsvExporter, CsvReader, FormatRegistry, RemoteReader, SvgExporter,
    XmlExporter, XmlReader,
};
