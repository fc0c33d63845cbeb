//! Live UDP reader
//!
//! Receives samples from a remote device while the recording is running.
//! Each datagram carries one sample, little endian:
//!
//! ```text
//! [i64 remote_id][i64 time_ns][i64 count][count x f64]
//! ```
//!
//! Datagrams addressed to another id or carrying the wrong number of values
//! are dropped. Accepted samples are appended to the optional data file,
//! which is replayed on the next start. A single background task owns the
//! socket and the file; queries copy out of the shared buffer.
//!
//! The data grows while the reader is in use. Put it under a
//! [`CachedReader`](crate::common::CachedReader) and call `reset()` to pick up
//! new samples.

use crate::common::error::{ReaderError, ReaderResult};
use crate::common::event::Event;
use crate::common::reader::{normalize_range, range_slice, Reader};
use crate::common::sample::Sample;
use crate::common::sensor::Sensor;
use crate::config::RemoteConfig;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Bytes before the first value
pub const HEADER_LEN: usize = 3 * std::mem::size_of::<i64>();

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

const MAX_DATAGRAM: usize = 65_507;

const RETRY_DELAY_MIN: Duration = Duration::from_millis(10);
const RETRY_DELAY_MAX: Duration = Duration::from_secs(1);

/// Why a datagram was not accepted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PacketRejection {
    #[error("datagram of {0} bytes is shorter than its header")]
    TooShort(usize),

    #[error("datagram for remote id {0}")]
    ForeignId(i64),

    #[error("datagram carries {0} values")]
    WrongCount(i64),

    #[error("datagram announces {announced} values but holds {present}")]
    Truncated { announced: usize, present: usize },
}

/// Size of one datagram for `sensors` values
pub fn packet_len(sensors: usize) -> usize {
    HEADER_LEN + sensors * std::mem::size_of::<f64>()
}

fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(word)
}

/// Decode one datagram addressed to `remote_id` with `sensors` values
pub fn decode_packet(bytes: &[u8], remote_id: i64, sensors: usize) -> Result<Sample, PacketRejection> {
    if bytes.len() < HEADER_LEN {
        return Err(PacketRejection::TooShort(bytes.len()));
    }
    let id = read_i64(bytes, 0);
    if id != remote_id {
        return Err(PacketRejection::ForeignId(id));
    }
    let time_ns = read_i64(bytes, 8);
    let count = read_i64(bytes, 16);
    if count < 0 || count as usize != sensors {
        return Err(PacketRejection::WrongCount(count));
    }
    let present = (bytes.len() - HEADER_LEN) / 8;
    if present < sensors {
        return Err(PacketRejection::Truncated {
            announced: sensors,
            present,
        });
    }

    let values = bytes[HEADER_LEN..packet_len(sensors)]
        .chunks_exact(8)
        .map(|word| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(word);
            f64::from_le_bytes(buf)
        })
        .collect();
    Ok(Sample::new(time_ns as f64 / NANOS_PER_SECOND, values))
}

/// Encode one sample as a datagram
pub fn encode_packet(remote_id: i64, sample: &Sample) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(packet_len(sample.values.len()));
    bytes.extend_from_slice(&remote_id.to_le_bytes());
    bytes.extend_from_slice(&((sample.time * NANOS_PER_SECOND).round() as i64).to_le_bytes());
    bytes.extend_from_slice(&(sample.values.len() as i64).to_le_bytes());
    for value in &sample.values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Insert keeping time order; equal times keep arrival order
fn insert_ordered(buffer: &mut Vec<Sample>, sample: Sample) {
    let index = buffer.partition_point(|s| s.time <= sample.time);
    buffer.insert(index, sample);
}

/// Load previously received samples from a data file
async fn replay(path: &Path, remote_id: i64, sensors: usize) -> ReaderResult<Vec<Sample>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut samples: Vec<Sample> = bytes
        .chunks_exact(packet_len(sensors))
        .filter_map(|record| decode_packet(record, remote_id, sensors).ok())
        .collect();
    samples.sort_by(|a, b| a.time.total_cmp(&b.time));

    tracing::info!(path = %path.display(), samples = samples.len(), "Replayed remote data file");
    Ok(samples)
}

/// Reader fed by UDP datagrams
pub struct RemoteReader {
    filename: String,
    remote_id: i64,
    sensor_count: usize,
    local_addr: SocketAddr,
    buffer: Arc<RwLock<Vec<Sample>>>,
    ingest: JoinHandle<()>,
}

impl RemoteReader {
    /// Replay the data file, bind the socket and start receiving
    pub async fn bind(config: &RemoteConfig) -> ReaderResult<Self> {
        let remote_id = config.remote_id;
        let sensor_count = config.sensors;

        let initial = match &config.data_file {
            Some(path) => replay(path, remote_id, sensor_count).await?,
            None => Vec::new(),
        };
        let file = match &config.data_file {
            Some(path) => Some(
                tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?,
            ),
            None => None,
        };

        let socket = UdpSocket::bind((config.bind_addr.as_str(), config.port))
            .await
            .map_err(|e| ReaderError::Network(format!("bind {}:{}: {}", config.bind_addr, config.port, e)))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| ReaderError::Network(e.to_string()))?;

        let filename = match &config.data_file {
            Some(path) => super::file_name(path),
            None => format!("remote:{}", local_addr.port()),
        };

        let buffer = Arc::new(RwLock::new(initial));
        let ingest = tokio::spawn(receive_loop(socket, file, Arc::clone(&buffer), remote_id, sensor_count));

        tracing::info!(%local_addr, remote_id, sensors = sensor_count, "Remote reader listening");

        Ok(Self {
            filename,
            remote_id,
            sensor_count,
            local_addr,
            buffer,
            ingest,
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_id(&self) -> i64 {
        self.remote_id
    }

    /// Number of samples received so far
    pub async fn sample_count(&self) -> usize {
        self.buffer.read().await.len()
    }
}

impl Drop for RemoteReader {
    fn drop(&mut self) {
        self.ingest.abort();
    }
}

/// Pause before the next receive after `failures` failed ones in a row
fn retry_delay(failures: u32) -> Duration {
    RETRY_DELAY_MIN
        .saturating_mul(1 << failures.min(10))
        .min(RETRY_DELAY_MAX)
}

/// Receive loop owning the socket and the data file
async fn receive_loop(
    socket: UdpSocket,
    mut file: Option<tokio::fs::File>,
    buffer: Arc<RwLock<Vec<Sample>>>,
    remote_id: i64,
    sensors: usize,
) {
    let mut datagram = vec![0u8; MAX_DATAGRAM];
    let mut failures = 0u32;
    loop {
        let (len, peer) = match socket.recv_from(&mut datagram).await {
            Ok(received) => {
                failures = 0;
                received
            }
            Err(e) => {
                let delay = retry_delay(failures);
                failures = failures.saturating_add(1);
                if failures == 1 {
                    tracing::warn!("Remote receive failed: {}", e);
                } else {
                    tracing::debug!(failures, ?delay, "Remote receive failed again: {}", e);
                }
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        let sample = match decode_packet(&datagram[..len], remote_id, sensors) {
            Ok(sample) => sample,
            Err(PacketRejection::ForeignId(id)) => {
                tracing::debug!(%peer, id, "Ignoring datagram for another remote");
                continue;
            }
            Err(rejection) => {
                tracing::warn!(%peer, "Dropped datagram: {}", rejection);
                continue;
            }
        };

        if let Some(file) = file.as_mut() {
            let record = encode_packet(remote_id, &sample);
            if let Err(e) = async {
                file.write_all(&record).await?;
                file.flush().await
            }
            .await
            {
                tracing::warn!("Failed to persist remote sample: {}", e);
            }
        }

        insert_ordered(&mut *buffer.write().await, sample);
    }
}

#[async_trait]
impl Reader for RemoteReader {
    fn filename(&self) -> &str {
        &self.filename
    }

    async fn sensors(&self) -> Vec<Sensor> {
        (0..self.sensor_count)
            .map(|i| Sensor::new(format!("{}_{}", self.remote_id, i), ""))
            .collect()
    }

    async fn samples(&self, begin: f64, end: f64) -> ReaderResult<Vec<Sample>> {
        let buffer = self.buffer.read().await;
        let length = buffer.last().map_or(0.0, |s| s.time);
        let (begin, end) = normalize_range(begin, end, length);
        Ok(range_slice(&buffer, begin, end, |s| s.time).to_vec())
    }

    async fn events(&self, _begin: f64, _end: f64) -> ReaderResult<Vec<Event>> {
        Ok(Vec::new())
    }

    async fn length(&self) -> f64 {
        self.buffer.read().await.last().map_or(0.0, |s| s.time)
    }
}
