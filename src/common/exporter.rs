//! Exporter contract
//!
//! An exporter serialises a time range of one reader into a file format.
//! Output depends only on the reader's data, so two exports of the same range
//! are byte-identical.

use crate::common::error::ReaderResult;
use crate::common::reader::Reader;
use crate::common::sample::Sample;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;

#[async_trait]
pub trait Exporter: Send + Sync {
    /// Format name, also used as the file extension (e.g. `csv`)
    fn format(&self) -> &'static str;

    /// Write `[begin, end]` to `out`, raw or reduced to `resolution` Hz
    async fn export(
        &self,
        begin: f64,
        end: f64,
        resolution: Option<i32>,
        out: &mut (dyn Write + Send),
    ) -> ReaderResult<()>;

    /// Export into a file, replacing it
    async fn export_to_path(
        &self,
        path: &Path,
        begin: f64,
        end: f64,
        resolution: Option<i32>,
    ) -> ReaderResult<()> {
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.export(begin, end, resolution, &mut out).await?;
        out.flush()?;
        tracing::info!(path = %path.display(), format = self.format(), "Export written");
        Ok(())
    }
}

/// Samples to export: raw when no resolution is given
pub async fn export_samples<R: Reader + ?Sized>(
    reader: &R,
    begin: f64,
    end: f64,
    resolution: Option<i32>,
) -> ReaderResult<Vec<Sample>> {
    match resolution {
        Some(r) => reader.samples_at(begin, end, r).await,
        None => reader.samples(begin, end).await,
    }
}
