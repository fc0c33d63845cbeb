//! XML format
//!
//! ```text
//! <output from="run.csv">
//!     <sensors>
//!         <sensor id="0" name="Voltage" unit="V"/>
//!     </sensors>
//!     <dataset>
//!         <data time="0.2">
//!             <value sensor="0" value="4.97"/>
//!         </data>
//!     </dataset>
//!     <events>
//!         <event level="1" time="3" origin="-1">
//!             <message>MSG</message>
//!             <data>54455354</data>
//!         </event>
//!     </events>
//! </output>
//! ```
//!
//! Event payloads are upper-case hex. Sensor values missing from a `data`
//! element read back as NaN.

use crate::common::error::{ReaderError, ReaderResult};
use crate::common::event::{Event, EventLevel};
use crate::common::exporter::{export_samples, Exporter};
use crate::common::reader::{normalize_range, range_slice, Reader, SharedReader};
use crate::common::sample::Sample;
use crate::common::sensor::Sensor;
use super::file_name;
use async_trait::async_trait;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use std::io::Write;
use std::path::Path;

/// Reader over an XML export, loaded fully at open
pub struct XmlReader {
    filename: String,
    sensors: Vec<Sensor>,
    data: Vec<Sample>,
    events: Vec<Event>,
}

/// Text element currently being read inside an `<event>`
#[derive(Default)]
enum EventText {
    #[default]
    None,
    Message,
    Payload,
}

fn get_attribute(e: &BytesStart, name: &str) -> ReaderResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn required<T: std::str::FromStr>(e: &BytesStart, name: &str) -> ReaderResult<T> {
    let text = get_attribute(e, name)?.ok_or_else(|| {
        ReaderError::Xml(format!(
            "<{}> is missing attribute '{}'",
            String::from_utf8_lossy(e.name().as_ref()),
            name
        ))
    })?;
    text.parse()
        .map_err(|_| ReaderError::Xml(format!("invalid value '{}' for attribute '{}'", text, name)))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn from_hex(text: &str) -> ReaderResult<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(ReaderError::Xml(format!("odd-length hex payload '{}'", text)));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| ReaderError::Xml(format!("invalid hex payload '{}'", text)))
        })
        .collect()
}

impl XmlReader {
    /// Load an XML file on a blocking task
    pub async fn open(path: impl AsRef<Path>) -> ReaderResult<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let content = std::fs::read_to_string(&path)?;
            Self::parse_str(&path, &content)
        })
        .await?
    }

    /// Parse XML content; `path` names the source in `filename()`
    pub fn parse_str(path: &Path, content: &str) -> ReaderResult<Self> {
        let mut reader = quick_xml::Reader::from_str(content);
        reader.trim_text(true);

        let mut state = ParseState::default();
        loop {
            match reader.read_event()? {
                XmlEvent::Start(e) => state.start(&e, false)?,
                XmlEvent::Empty(e) => state.start(&e, true)?,
                XmlEvent::Text(t) => state.text(&t.unescape()?)?,
                XmlEvent::End(e) => state.end(e.name().as_ref())?,
                XmlEvent::Eof => break,
                _ => {}
            }
        }

        let ParseState {
            mut sensors,
            mut data,
            mut events,
            ..
        } = state;
        sensors.sort_by_key(|(id, _)| *id);
        let sensors: Vec<Sensor> = sensors.into_iter().map(|(_, s)| s).collect();
        data.sort_by(|a, b| a.time.total_cmp(&b.time));
        events.sort_by(|a, b| a.time.total_cmp(&b.time));

        let filename = file_name(path);
        tracing::info!(
            filename = %filename,
            sensors = sensors.len(),
            samples = data.len(),
            events = events.len(),
            "Loaded XML file"
        );

        Ok(Self {
            filename,
            sensors,
            data,
            events,
        })
    }
}

/// Elements collected so far plus the ones still open
#[derive(Default)]
struct ParseState {
    sensors: Vec<(usize, Sensor)>,
    data: Vec<Sample>,
    events: Vec<Event>,
    sample: Option<Sample>,
    event: Option<Event>,
    text_target: EventText,
}

impl ParseState {
    fn start(&mut self, e: &BytesStart, self_closing: bool) -> ReaderResult<()> {
        match e.name().as_ref() {
            b"sensor" => {
                let id: usize = required(e, "id")?;
                let name = get_attribute(e, "name")?.unwrap_or_default();
                let unit = get_attribute(e, "unit")?.unwrap_or_default();
                self.sensors.push((id, Sensor::new(name, unit)));
            }
            b"data" if self.event.is_some() => {
                if !self_closing {
                    self.text_target = EventText::Payload;
                }
            }
            b"data" => {
                let time: f64 = required(e, "time")?;
                let sample = Sample::new(time, vec![f64::NAN; self.sensors.len()]);
                if self_closing {
                    self.data.push(sample);
                } else {
                    self.sample = Some(sample);
                }
            }
            b"value" => {
                let index: usize = required(e, "sensor")?;
                let value: f64 = required(e, "value")?;
                if let Some(sample) = self.sample.as_mut() {
                    let slot = sample.values.get_mut(index).ok_or_else(|| {
                        ReaderError::Xml(format!("value for unknown sensor {}", index))
                    })?;
                    *slot = value;
                }
            }
            b"event" => {
                let code: i64 = required(e, "level")?;
                let level = EventLevel::from_code(code)
                    .ok_or_else(|| ReaderError::Xml(format!("unknown event level {}", code)))?;
                let time: f64 = required(e, "time")?;
                let origin: i64 = required(e, "origin")?;
                let event = Event::new(time, origin, level, "");
                if self_closing {
                    self.events.push(event);
                } else {
                    self.event = Some(event);
                }
            }
            b"message" if !self_closing => self.text_target = EventText::Message,
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> ReaderResult<()> {
        if let Some(event) = self.event.as_mut() {
            match self.text_target {
                EventText::Message => event.message = text.to_string(),
                EventText::Payload => event.raw_data = from_hex(text)?,
                EventText::None => {}
            }
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) -> ReaderResult<()> {
        match name {
            b"sensors" => self.order_sensors()?,
            b"message" => self.text_target = EventText::None,
            b"data" if self.event.is_some() => self.text_target = EventText::None,
            b"data" => self.data.extend(self.sample.take()),
            b"event" => self.events.extend(self.event.take()),
            _ => {}
        }
        Ok(())
    }

    /// Sort sensors by id; values address sensors by position, so ids must
    /// be exactly `0..n`
    fn order_sensors(&mut self) -> ReaderResult<()> {
        self.sensors.sort_by_key(|(id, _)| *id);
        for (position, (id, sensor)) in self.sensors.iter().enumerate() {
            if *id != position {
                return Err(ReaderError::Xml(format!(
                    "sensor '{}' has id {}, expected {}",
                    sensor.name, id, position
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Reader for XmlReader {
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

    async fn events(&self, begin: f64, end: f64) -> ReaderResult<Vec<Event>> {
        let (begin, end) = normalize_range(begin, end, self.length().await);
        Ok(range_slice(&self.events, begin, end, |e| e.time).to_vec())
    }

    async fn length(&self) -> f64 {
        let last_sample = self.data.last().map_or(0.0, |s| s.time);
        let last_event = self.events.last().map_or(0.0, |e| e.time);
        last_sample.max(last_event)
    }
}

/// Writes a reader's sensors, samples and events as XML
pub struct XmlExporter {
    reader: SharedReader,
}

impl XmlExporter {
    pub fn new(reader: SharedReader) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl Exporter for XmlExporter {
    fn format(&self) -> &'static str {
        "xml"
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
        let events = self.reader.events(begin, end).await?;

        let mut writer = quick_xml::Writer::new_with_indent(out, b' ', 4);
        writer.write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("output");
        root.push_attribute(("from", self.reader.filename()));
        writer.write_event(XmlEvent::Start(root))?;

        writer.write_event(XmlEvent::Start(BytesStart::new("sensors")))?;
        for (id, sensor) in sensors.iter().enumerate() {
            let mut element = BytesStart::new("sensor");
            element.push_attribute(("id", id.to_string().as_str()));
            element.push_attribute(("name", sensor.name.as_str()));
            element.push_attribute(("unit", sensor.unit.as_str()));
            writer.write_event(XmlEvent::Empty(element))?;
        }
        writer.write_event(XmlEvent::End(BytesEnd::new("sensors")))?;

        writer.write_event(XmlEvent::Start(BytesStart::new("dataset")))?;
        for sample in &data {
            let mut element = BytesStart::new("data");
            element.push_attribute(("time", sample.time.to_string().as_str()));
            writer.write_event(XmlEvent::Start(element))?;
            for (index, value) in sample.values.iter().enumerate() {
                let mut element = BytesStart::new("value");
                element.push_attribute(("sensor", index.to_string().as_str()));
                element.push_attribute(("value", value.to_string().as_str()));
                writer.write_event(XmlEvent::Empty(element))?;
            }
            writer.write_event(XmlEvent::End(BytesEnd::new("data")))?;
        }
        writer.write_event(XmlEvent::End(BytesEnd::new("dataset")))?;

        writer.write_event(XmlEvent::Start(BytesStart::new("events")))?;
        for event in &events {
            let mut element = BytesStart::new("event");
            element.push_attribute(("level", event.level.code().to_string().as_str()));
            element.push_attribute(("time", event.time.to_string().as_str()));
            element.push_attribute(("origin", event.origin.to_string().as_str()));
            writer.write_event(XmlEvent::Start(element))?;

            writer.write_event(XmlEvent::Start(BytesStart::new("message")))?;
            writer.write_event(XmlEvent::Text(BytesText::new(&event.message)))?;
            writer.write_event(XmlEvent::End(BytesEnd::new("message")))?;

            writer.write_event(XmlEvent::Start(BytesStart::new("data")))?;
            writer.write_event(XmlEvent::Text(BytesText::new(&to_hex(&event.raw_data))))?;
            writer.write_event(XmlEvent::End(BytesEnd::new("data")))?;

            writer.write_event(XmlEvent::End(BytesEnd::new("event")))?;
        }
        writer.write_event(XmlEvent::End(BytesEnd::new("events")))?;
        writer.write_event(XmlEvent::End(BytesEnd::new("output")))?;

        let out = writer.into_inner();
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::synthetic_reader::reference_reader;
    use std::sync::Arc;
    use tempfile::tempdir;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<output from="bench.dlog">
    <sensors>
        <sensor id="1" name="Current" unit="A"/>
        <sensor id="0" name="Voltage" unit="V"/>
    </sensors>
    <dataset>
        <data time="0.5">
            <value sensor="0" value="4.9"/>
        </data>
        <data time="0">
            <value sensor="0" value="5"/>
            <value sensor="1" value="0.25"/>
        </data>
    </dataset>
    <events>
        <event level="3" time="0.5" origin="1">
            <message>over &amp; out</message>
            <data>0AFF</data>
        </event>
        <event level="0" time="0.1" origin="-1">
            <message>start</message>
            <data></data>
        </event>
    </events>
</output>
"#;

    #[test]
    fn test_hex_payloads() {
        assert_eq!(to_hex(b"TEST"), "54455354");
        assert_eq!(from_hex("0AFF").unwrap(), vec![0x0A, 0xFF]);
        assert!(from_hex("ABC").is_err());
        assert!(from_hex("ZZ").is_err());
    }

    #[tokio::test]
    async fn test_parse_document() {
        let reader = XmlReader::parse_str(Path::new("bench.xml"), DOCUMENT).unwrap();

        let sensors = reader.sensors().await;
        assert_eq!(sensors[0].name, "Voltage");
        assert_eq!(sensors[1].unit, "A");

        let data = reader.samples(0.0, -1.0).await.unwrap();
        assert_eq!(data[0].values, vec![5.0, 0.25]);
        assert_eq!(data[1].time, 0.5);
        assert!(data[1].values[1].is_nan());

        let events = reader.events(0.0, -1.0).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "start");
        assert_eq!(events[1].message, "over & out");
        assert_eq!(events[1].level, EventLevel::Error);
        assert_eq!(events[1].raw_data, vec![0x0A, 0xFF]);
    }

    #[test]
    fn test_sensor_ids_must_be_contiguous() {
        let document = r#"<output><sensors>
            <sensor id="0" name="Voltage" unit="V"/>
            <sensor id="2" name="Current" unit="A"/>
        </sensors><dataset/></output>"#;
        assert!(matches!(
            XmlReader::parse_str(Path::new("gap.xml"), document),
            Err(ReaderError::Xml(_))
        ));
    }

    #[test]
    fn test_value_for_unknown_sensor_is_rejected() {
        let document = r#"<output><sensors>
            <sensor id="0" name="Voltage" unit="V"/>
        </sensors><dataset>
            <data time="0"><value sensor="1" value="2"/></data>
        </dataset></output>"#;
        assert!(matches!(
            XmlReader::parse_str(Path::new("unknown.xml"), document),
            Err(ReaderError::Xml(_))
        ));
    }

    #[tokio::test]
    async fn test_events_are_range_filtered() {
        let reader = XmlReader::parse_str(Path::new("bench.xml"), DOCUMENT).unwrap();

        let events = reader.events(0.2, 0.5).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin, 1);
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let document = r#"<output><events><event level="9" time="0" origin="0"/></events></output>"#;
        assert!(matches!(
            XmlReader::parse_str(Path::new("bad.xml"), document),
            Err(ReaderError::Xml(_))
        ));
    }

    #[tokio::test]
    async fn test_export_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reference.xml");
        let source: SharedReader = Arc::new(reference_reader());

        XmlExporter::new(Arc::clone(&source))
            .export_to_path(&path, 0.0, -1.0, None)
            .await
            .unwrap();
        let reader = XmlReader::open(&path).await.unwrap();

        assert_eq!(reader.length().await, 10.0);
        assert_eq!(
            reader.samples(0.0, -1.0).await.unwrap(),
            source.samples(0.0, -1.0).await.unwrap()
        );
        assert_eq!(
            reader.events(0.0, -1.0).await.unwrap(),
            source.events(0.0, -1.0).await.unwrap()
        );
        assert_eq!(reader.sensors().await[2].name, "SynthSens[2]");
    }

    #[tokio::test]
    async fn test_export_is_deterministic() {
        let exporter = XmlExporter::new(Arc::new(reference_reader()));
        let mut first = Vec::new();
        let mut second = Vec::new();

        exporter.export(2.0, 4.0, None, &mut first).await.unwrap();
        exporter.export(2.0, 4.0, None, &mut second).await.unwrap();

        assert_eq!(first, second);
        let text = String::from_utf8(first).unwrap();
        assert!(text.contains(r#"<output from="SYNTHETIC_READER">"#));
        assert!(text.contains("54455354314531"));
    }
}
