//! labreader CLI
//!
//! Command-line interface for measurement logs:
//! - Inspect sensors and length
//! - Sample values and list events
//! - Export to CSV, XML or SVG
//! - Compute statistics
//! - Receive live data over UDP

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use labreader::common::{CachedReader, Reader, SharedReader, StatisticKind};
use labreader::config::{generate_default_config, Config, LoggingConfig};
use labreader::formats::{exporter_for, open_reader, RemoteReader};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "labreader")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query, resample and convert lab measurement logs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: search standard locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Xml,
    Svg,
}

impl ExportFormat {
    fn name(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xml => "xml",
            ExportFormat::Svg => "svg",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show length and sensors of a file
    Info {
        /// Path to the measurement file
        file: PathBuf,
    },

    /// Convert a time range to another format
    Export {
        file: PathBuf,
        /// Target format
        #[arg(long, value_enum)]
        to: ExportFormat,
        /// Start time in seconds
        #[arg(long, default_value = "0")]
        begin: f64,
        /// End time in seconds (negative: until the end)
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        end: f64,
        /// Samples per second (default: raw samples)
        #[arg(short, long)]
        resolution: Option<i32>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the value of every sensor at a point in time
    Sample {
        file: PathBuf,
        /// Time in seconds
        #[arg(short, long)]
        time: f64,
        /// Interpolate from data reduced to this many samples per second
        #[arg(short, long)]
        resolution: Option<i32>,
    },

    /// List events in a time range
    Events {
        file: PathBuf,
        #[arg(long, default_value = "0")]
        begin: f64,
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        end: f64,
    },

    /// Show min, max, mean, median and variance per sensor
    Stats {
        file: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Receive live samples over UDP until interrupted
    Listen {
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(long)]
        remote_id: Option<i64>,
        /// Values per datagram
        #[arg(long)]
        sensors: Option<usize>,
        /// File that keeps received samples across restarts
        #[arg(long)]
        data_file: Option<PathBuf>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("labreader={}", config.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Info { file } => {
            let reader = open_reader(&file, &config).await?;
            let sensors = reader.sensors().await;

            println!("File:    {}", reader.filename());
            println!("Length:  {} s", reader.length().await);
            println!("Sensors: {}", sensors.len());
            println!();
            println!("{:<5} {:<24} {:<10} {}", "#", "Name", "Unit", "Interval");
            println!("{}", "-".repeat(50));
            for (index, sensor) in sensors.iter().enumerate() {
                let interval = match sensor.sampling_rate() {
                    Some(_) => format!("{} s", sensor.sampling_interval),
                    None => "unknown".to_string(),
                };
                println!("{:<5} {:<24} {:<10} {}", index, sensor.name, sensor.unit, interval);
            }
        }

        Commands::Export {
            file,
            to,
            begin,
            end,
            resolution,
            output,
        } => {
            let reader = open_reader(&file, &config).await?;
            let exporter = exporter_for(to.name(), reader)?;

            match output {
                Some(path) => {
                    exporter
                        .export_to_path(&path, begin, end, resolution)
                        .await
                        .with_context(|| format!("exporting to {:?}", path))?;
                    println!("Exported to {:?}", path);
                }
                None => {
                    let mut out = std::io::BufWriter::new(std::io::stdout());
                    exporter.export(begin, end, resolution, &mut out).await?;
                    out.flush()?;
                }
            }
        }

        Commands::Sample {
            file,
            time,
            resolution,
        } => {
            let reader = open_reader(&file, &config).await?;
            let sensors = reader.sensors().await;
            let sample = match resolution {
                Some(r) => reader.sample_at(time, r).await?,
                None => reader.sample(time).await?,
            };

            if sample.values.is_empty() {
                println!("No data around t = {} s", time);
            } else {
                println!("t = {} s", sample.time);
                for (sensor, value) in sensors.iter().zip(&sample.values) {
                    println!("  {:<24} {} {}", sensor.name, value, sensor.unit);
                }
            }
        }

        Commands::Events { file, begin, end } => {
            let reader = open_reader(&file, &config).await?;
            let events = reader.events(begin, end).await?;

            println!("{:<12} {:<8} {:<7} {}", "Time", "Level", "Origin", "Message");
            println!("{}", "-".repeat(50));
            for event in &events {
                let origin = if event.is_device_wide() {
                    "device".to_string()
                } else {
                    event.origin.to_string()
                };
                println!("{:<12} {:<8} {:<7} {}", event.time, event.level, origin, event.message);
            }
            println!();
            println!("{} events", events.len());
        }

        Commands::Stats { file, json } => {
            let reader = open_reader(&file, &config).await?;
            print_statistics(reader.as_ref(), json).await?;
        }

        Commands::Listen {
            port,
            remote_id,
            sensors,
            data_file,
        } => {
            let mut remote = config.remote.clone();
            remote.port = port.unwrap_or(remote.port);
            remote.remote_id = remote_id.unwrap_or(remote.remote_id);
            remote.sensors = sensors.unwrap_or(remote.sensors);
            remote.data_file = data_file.or(remote.data_file);

            listen(Arc::new(RemoteReader::bind(&remote).await?)).await?;
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

async fn print_statistics(reader: &dyn Reader, json: bool) -> anyhow::Result<()> {
    let sensors = reader.sensors().await;
    let mut table = Vec::with_capacity(StatisticKind::all().len());
    for &kind in StatisticKind::all() {
        table.push((kind, reader.statistic(kind).await?));
    }

    if json {
        let rows: Vec<serde_json::Value> = sensors
            .iter()
            .enumerate()
            .map(|(index, sensor)| {
                let mut row = serde_json::Map::new();
                row.insert("sensor".to_string(), serde_json::json!(sensor.name));
                row.insert("unit".to_string(), serde_json::json!(sensor.unit));
                for (kind, values) in &table {
                    let value = values.get(index).copied().flatten();
                    row.insert(kind.to_string(), serde_json::json!(value));
                }
                serde_json::Value::Object(row)
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    print!("{:<24}", "Sensor");
    for (kind, _) in &table {
        print!(" {:>12}", kind.to_string());
    }
    println!();
    println!("{}", "-".repeat(24 + 13 * table.len()));
    for (index, sensor) in sensors.iter().enumerate() {
        print!("{:<24}", sensor.name);
        for (_, values) in &table {
            match values.get(index).copied().flatten() {
                Some(value) => print!(" {:>12.6}", value),
                None => print!(" {:>12}", "-"),
            }
        }
        println!();
    }
    Ok(())
}

/// Poll the live reader once a second and log growth until Ctrl-C
async fn listen(remote: Arc<RemoteReader>) -> anyhow::Result<()> {
    println!("Listening on {} (Ctrl-C to stop)", remote.local_addr());

    let shared: SharedReader = remote.clone();
    let cached = CachedReader::new(shared).await;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last_length = cached.length().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                cached.reset().await;
                let length = cached.length().await;
                if length > last_length {
                    let latest = cached.sample(length).await?;
                    tracing::info!(
                        length,
                        samples = remote.sample_count().await,
                        values = ?latest.values,
                        "Received data"
                    );
                    last_length = length;
                }
            }
        }
    }

    tracing::info!("Stopped listening");
    Ok(())
}
