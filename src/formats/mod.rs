//! File formats
//!
//! Readers and exporters for concrete formats, plus the registry that picks a
//! reader by file extension.
//!
//! ```text
//! path → extension → factory → format reader
//!      → StatisticReader (if enabled) → CachedReader (if enabled) → caller
//! ```

pub mod csv;
pub mod remote;
pub mod svg;
pub mod xml;

pub use self::csv::{CsvExporter, CsvReader};
pub use remote::RemoteReader;
pub use svg::SvgExporter;
pub use xml::{XmlExporter, XmlReader};

use crate::common::cached_reader::CachedReader;
use crate::common::error::{ReaderError, ReaderResult};
use crate::common::exporter::Exporter;
use crate::common::reader::SharedReader;
use crate::common::statistic_reader::StatisticReader;
use crate::config::Config;
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opens a file of one format
pub type ReaderFactory = fn(PathBuf) -> BoxFuture<'static, ReaderResult<SharedReader>>;

fn open_csv(path: PathBuf) -> BoxFuture<'static, ReaderResult<SharedReader>> {
    async move { Ok(Arc::new(CsvReader::open(path).await?) as SharedReader) }.boxed()
}

fn open_xml(path: PathBuf) -> BoxFuture<'static, ReaderResult<SharedReader>> {
    async move { Ok(Arc::new(XmlReader::open(path).await?) as SharedReader) }.boxed()
}

/// Last path component, used as a reader's filename
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Maps lower-case file extensions to reader factories
pub struct FormatRegistry {
    factories: HashMap<String, ReaderFactory>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("csv", open_csv);
        registry.register("xml", open_xml);
        registry
    }
}

impl FormatRegistry {
    /// Registry without any format
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Add or replace the factory for `extension`
    pub fn register(&mut self, extension: &str, factory: ReaderFactory) {
        self.factories.insert(extension.to_lowercase(), factory);
    }

    /// Registered extensions, sorted
    pub fn extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }

    /// Open `path` with the reader registered for its extension
    pub async fn open(&self, path: &Path) -> ReaderResult<SharedReader> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let factory = self
            .factories
            .get(&extension)
            .ok_or_else(|| ReaderError::UnsupportedFormat(path.display().to_string()))?;
        factory(path.to_path_buf()).await
    }
}

/// Open `path` and wrap it in the configured decorators
pub async fn open_reader(path: &Path, config: &Config) -> ReaderResult<SharedReader> {
    let mut reader = FormatRegistry::default().open(path).await?;
    if config.statistics.enabled {
        reader = Arc::new(StatisticReader::new(reader).await?);
    }
    if config.cache.enabled {
        reader = Arc::new(CachedReader::with_config(reader, &config.cache).await?);
    }
    tracing::info!(
        filename = reader.filename(),
        statistics = config.statistics.enabled,
        cache = config.cache.enabled,
        "Opened reader"
    );
    Ok(reader)
}

/// Exporter for a format name (`csv`, `xml` or `svg`)
pub fn exporter_for(format: &str, reader: SharedReader) -> ReaderResult<Box<dyn Exporter>> {
    match format.to_lowercase().as_str() {
        "csv" => Ok(Box::new(CsvExporter::new(reader))),
        "xml" => Ok(Box::new(XmlExporter::new(reader))),
        "svg" => Ok(Box::new(SvgExporter::new(reader))),
        other => Err(ReaderError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::reader::{Reader, StatisticKind};
    use crate::common::synthetic_reader::reference_reader;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_unknown_extension_is_rejected() {
        let registry = FormatRegistry::default();

        assert_eq!(registry.extensions(), vec!["csv", "xml"]);
        let result = registry.open(Path::new("capture.dlog")).await;
        assert!(matches!(result, Err(ReaderError::UnsupportedFormat(_))));
        assert!(exporter_for("dlog", Arc::new(reference_reader())).is_err());
    }

    #[tokio::test]
    async fn test_extension_is_case_insensitive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("REFERENCE.CSV");
        exporter_for("csv", Arc::new(reference_reader()))
            .unwrap()
            .export_to_path(&path, 0.0, -1.0, None)
            .await
            .unwrap();

        let reader = FormatRegistry::default().open(&path).await.unwrap();
        assert_eq!(reader.sensors().await.len(), 3);
    }

    #[tokio::test]
    async fn test_open_reader_applies_decorators() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reference.xml");
        let source: SharedReader = Arc::new(reference_reader());
        exporter_for("xml", Arc::clone(&source))
            .unwrap()
            .export_to_path(&path, 0.0, -1.0, None)
            .await
            .unwrap();

        let reader = open_reader(&path, &Config::default()).await.unwrap();

        assert_eq!(reader.filename(), "reference.xml");
        assert_eq!(
            reader.statistic(StatisticKind::Avg).await.unwrap(),
            vec![Some(0.5), Some(1.5), Some(1.5)]
        );
        assert_eq!(
            reader.samples_at(0.0, 9.9, 5).await.unwrap(),
            source.samples_at(0.0, 9.9, 5).await.unwrap()
        );
        assert_eq!(reader.events(8.0, -1.0).await.unwrap().len(), 2);
    }
}
