//! SVG plot exporter
//!
//! One polyline per sensor over time plus a thick zero line. The x axis is
//! seconds, the y axis is the value scaled by [`Y_SCALE`] with 25% headroom
//! above the largest magnitude. Non-finite values leave no point.

use crate::common::error::ReaderResult;
use crate::common::exporter::{export_samples, Exporter};
use crate::common::reader::SharedReader;
use async_trait::async_trait;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event as XmlEvent};
use std::io::Write;

/// Pixels per value unit
pub const Y_SCALE: f64 = 250.0;

const HEADROOM: f64 = 1.25;

/// Stroke colours, assigned to sensors in order
const PALETTE: [&str; 8] = [
    "rgb(31,119,180)",
    "rgb(255,127,14)",
    "rgb(44,160,44)",
    "rgb(214,39,40)",
    "rgb(148,103,189)",
    "rgb(140,86,75)",
    "rgb(227,119,194)",
    "rgb(127,127,127)",
];

pub struct SvgExporter {
    reader: SharedReader,
}

impl SvgExporter {
    pub fn new(reader: SharedReader) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl Exporter for SvgExporter {
    fn format(&self) -> &'static str {
        "svg"
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

        let data_end = data.iter().map(|s| s.time).fold(0.0, f64::max);
        let magnitude = data
            .iter()
            .flat_map(|s| s.values.iter())
            .filter(|v| v.is_finite())
            .fold(0.0, |acc: f64, v| acc.max(v.abs()));
        let zero = if magnitude > 0.0 {
            magnitude * HEADROOM * Y_SCALE
        } else {
            Y_SCALE
        };
        let width = data_end.round().max(1.0);

        let mut writer = quick_xml::Writer::new_with_indent(out, b' ', 2);
        writer.write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut svg = BytesStart::new("svg");
        svg.push_attribute(("xmlns", "http://www.w3.org/2000/svg"));
        svg.push_attribute(("version", "1.1"));
        svg.push_attribute(("height", format!("{}", (2.0 * zero).round()).as_str()));
        svg.push_attribute(("width", width.to_string().as_str()));
        writer.write_event(XmlEvent::Start(svg))?;

        for index in 0..sensors.len() {
            let points: Vec<String> = data
                .iter()
                .filter_map(|s| {
                    let value = *s.values.get(index)?;
                    value
                        .is_finite()
                        .then(|| format!("{},{}", s.time, zero - value * Y_SCALE))
                })
                .collect();

            let mut line = BytesStart::new("polyline");
            line.push_attribute(("points", points.join(" ").as_str()));
            line.push_attribute((
                "style",
                format!("fill:none;stroke:{};stroke-width:1", PALETTE[index % PALETTE.len()]).as_str(),
            ));
            writer.write_event(XmlEvent::Empty(line))?;
        }

        let mut zero_line = BytesStart::new("polyline");
        zero_line.push_attribute(("points", format!("0,{} {},{}", zero, width, zero).as_str()));
        zero_line.push_attribute(("style", "fill:none;stroke:rgb(0,0,0);stroke-width:3"));
        writer.write_event(XmlEvent::Empty(zero_line))?;

        writer.write_event(XmlEvent::End(BytesEnd::new("svg")))?;
        let out = writer.into_inner();
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::synthetic_reader::{reference_reader, SyntheticReader};
    use std::sync::Arc;

    async fn render(exporter: &SvgExporter) -> String {
        let mut out = Vec::new();
        exporter.export(0.0, -1.0, None, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_one_polyline_per_sensor_plus_zero_line() {
        let svg = render(&SvgExporter::new(Arc::new(reference_reader()))).await;

        assert_eq!(svg.matches("<polyline").count(), 4);
        assert!(svg.contains(r#"width="10""#));
        assert!(svg.contains("stroke-width:3"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[tokio::test]
    async fn test_negative_values_plot_below_zero_line() {
        let reader = SyntheticReader::builder()
            .interval(1.0)
            .sensor(|t| if t < 1.0 { -2.0 } else { 2.0 })
            .length(1.0)
            .build();
        let svg = render(&SvgExporter::new(Arc::new(reader))).await;

        // magnitude 2, zero line at 2 * 1.25 * 250
        assert!(svg.contains(r#"points="0,1125 1,125""#));
        assert!(svg.contains(r#"points="0,625 1,625""#));
    }

    #[tokio::test]
    async fn test_output_is_deterministic() {
        let exporter = SvgExporter::new(Arc::new(reference_reader()));
        assert_eq!(render(&exporter).await, render(&exporter).await);
    }
}
