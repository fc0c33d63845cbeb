//! Core data model and query engine
//!
//! The building blocks shared by every format: samples, events and sensors,
//! the [`Reader`] contract with its default resampling and point sampling,
//! and the caching and statistics decorators.

pub mod cached_reader;
pub mod error;
pub mod event;
pub mod exporter;
pub mod reader;
pub mod sample;
pub mod sensor;
pub mod statistic_reader;
pub mod synthetic_reader;

pub use cached_reader::CachedReader;
pub use error::{ReaderError, ReaderResult};
pub use event::{Event, EventLevel};
pub use exporter::Exporter;
pub use reader::{Reader, SharedReader, StatisticKind};
pub use sample::Sample;
pub use sensor::Sensor;
pub use statistic_reader::{SensorStatistics, StatisticReader};
pub use synthetic_reader::SyntheticReader;
