//! CSV format
//!
//! ```text
//! time,Voltage (V),Current (A)
//! 0,4.98,0.31
//! 0.2,4.97,0.33
//! ```
//!
//! The first column is the time in seconds, every further column one
//! sensor. Values are written as the shortest text that parses back to the
//! same `f64`. CSV files carry no events.

use crate::common::error::{ReaderError, ReaderResult};
use crate::common::event::Event;
use crate::common::exporter::{export_samples, Exporter};
use crate::common::reader::{normalize_range, range_slice, Reader, SharedReader};
use crate::common::sample::Sample;
use crate::common::sensor::Sensor;
use super::file_name;
use async_trait::async_trait;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Reader over a CSV file, loaded fully at open
pub struct CsvReader {
    filename: String,
    sensors: Vec<Sensor>,
    data: Vec<Sample>,
}

impl CsvReader {
    /// Load a CSV file on a blocking task
    pub async fn open(path: impl AsRef<Path>) -> ReaderResult<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)?;
            Self::from_reader(&path, file)
        })
        .await?
    }

    /// Parse CSV content; `path` names the source in errors and `filename()`
    pub fn from_reader(path: &Path, input: impl Read) -> ReaderResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input);

        let sensors: Vec<Sensor> = reader.headers()?.iter().skip(1).map(parse_column_header).collect();

        let mut data = Vec::new();
        for result in reader.records() {
            let record = result?;
            let line = record.position().map_or(0, |p| p.line());

            let time = match record.get(0) {
                Some(text) if !text.is_empty() => parse_value(path, line, text)?,
                _ => continue,
            };
            let mut values = Vec::with_capacity(sensors.len());
            for index in 0..sensors.len() {
                let value = match record.get(index + 1) {
                    Some(text) if !text.is_empty() => parse_value(path, line, text)?,
                    _ => f64::NAN,
                };
                values.push(value);
            }
            data.push(Sample::new(time, values));
        }
        data.sort_by(|a, b| a.time.total_cmp(&b.time));

        let filename = file_name(path);
        tracing::info!(
            filename = %filename,
            sensors = sensors.len(),
            samples = data.len(),
            "Loaded CSV file"
        );

        Ok(Self {
            filename,
            sensors,
            data,
        })
    }
}

fn parse_value(path: &Path, line: u64, text: &str) -> ReaderResult<f64> {
    text.parse::<f64>()
        .map_err(|_| ReaderError::parse(PathBuf::from(path), line, format!("invalid number '{}'", text)))
}

/// Split a `name (unit)` column header
fn parse_column_header(header: &str) -> Sensor {
    if let Some(stripped) = header.strip_suffix(')') {
        if let Some(open) = stripped.rfind(" (") {
            return Sensor::new(&stripped[..open], &stripped[open + 2..]);
        }
    }
    Sensor::new(header, "")
}

#[async_trait]
impl Reader for CsvReader {
    fn filename(&self) -> &str {
        &self.filename
    }

    async fn sensors(&self) -> Vec<Sensor> {
        self.sensors.clone()
    }

    async fn samples(&self, begin: f64, end: f64) -> ReaderResult<Vec<Sample>> {
        let (begin, end) = normalize_range(begin, end, self.length().await);
        Ok(range_slice(&self.data, begin, end, |s| s.time).to_vec())
    }

    async fn events(&self, _begin: f64, _end: f64) -> ReaderResult<Vec<Event>> {
        Ok(Vec::new())
    }

    async fn length(&self) -> f64 {
        self.data.last().map_or(0.0, |s| s.time)
    }
}

/// Writes a reader's samples as CSV
pub struct CsvExporter {
    reader: SharedReader,
}

impl CsvExporter {
    pub fn new(reader: SharedReader) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl Exporter for CsvExporter {
    fn format(&self) -> &'static str {
        "csv"
    }

    async fn export(
        &self,
        begin: f64,
        end: f64,
        resolution: Option<i32>,
        out: &mut (dyn Write + Send),
    ) -> ReaderResult<()> {
        let sensors = self.reader.sensors().await;
        let data = export_samples(self.reader.as_ref(), begin, end, resolution).await?;

        let mut writer = csv::Writer::from_writer(out);
        let mut header = vec!["time".to_string()];
        header.extend(sensors.iter().map(|s| s.to_string()));
        writer.write_record(&header)?;

        for sample in &data {
            let mut row = Vec::with_capacity(sample.values.len() + 1);
            row.push(sample.time.to_string());
            row.extend(sample.values.iter().map(|v| v.to_string()));
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::synthetic_reader::reference_reader;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn parse(content: &str) -> ReaderResult<CsvReader> {
        CsvReader::from_reader(Path::new("test.csv"), content.as_bytes())
    }

    #[test]
    fn test_column_headers() {
        let sensor = parse_column_header("Voltage (V)");
        assert_eq!((sensor.name.as_str(), sensor.unit.as_str()), ("Voltage", "V"));

        let sensor = parse_column_header("Temp (inner) (°C)");
        assert_eq!((sensor.name.as_str(), sensor.unit.as_str()), ("Temp (inner)", "°C"));

        let sensor = parse_column_header("raw");
        assert_eq!((sensor.name.as_str(), sensor.unit.as_str()), ("raw", ""));
        assert_eq!(sensor.sampling_interval, Sensor::UNKNOWN_INTERVAL);
    }

    #[tokio::test]
    async fn test_rows_are_padded_and_sorted() {
        let reader = parse("time,a (V),b (A)\n1.5,1,2\n0.5,3\n1.0,4,5,6\n").unwrap();

        let data = reader.samples(0.0, -1.0).await.unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data[0].time, 0.5);
        assert!(data[0].values[1].is_nan());
        assert_eq!(data[1].values, vec![4.0, 5.0]);
        assert_eq!(reader.length().await, 1.5);
        assert!(reader.events(0.0, -1.0).await.unwrap().is_empty());
    }

    #[test]
    fn test_invalid_number_reports_line() {
        let result = parse("time,a (V)\n0,1\n1,oops\n");
        match result {
            Err(ReaderError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {:?}", other.map(|r| r.data.len())),
        }
    }

    #[tokio::test]
    async fn test_export_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reference.csv");
        let source: SharedReader = Arc::new(reference_reader());

        CsvExporter::new(Arc::clone(&source))
            .export_to_path(&path, 0.0, -1.0, None)
            .await
            .unwrap();
        let reader = CsvReader::open(&path).await.unwrap();

        assert_eq!(reader.filename(), "reference.csv");
        let names: Vec<String> = reader.sensors().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["SynthSens[0]", "SynthSens[1]", "SynthSens[2]"]);
        assert_eq!(
            reader.samples(0.0, -1.0).await.unwrap(),
            source.samples(0.0, -1.0).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_export_is_deterministic() {
        let exporter = CsvExporter::new(Arc::new(reference_reader()));
        let mut first = Vec::new();
        let mut second = Vec::new();

        exporter.export(0.0, -1.0, Some(2), &mut first).await.unwrap();
        exporter.export(0.0, -1.0, Some(2), &mut second).await.unwrap();

        assert_eq!(first, second);
        let text = String::from_utf8(first).unwrap();
        assert!(text.starts_with("time,SynthSens[0] (),SynthSens[1] (),SynthSens[2] ()\n"));
    }
}
