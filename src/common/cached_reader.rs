//! Chunk-caching reader decorator
//!
//! Splits the timeline into fixed-size chunks and keeps every chunk fetched
//! from the inner reader, separately for raw samples, each queried resolution
//! and events. Missing chunks of one query are loaded concurrently:
//!
//! ```text
//! Query → chunk range → missing chunks → spawn one fetch per chunk → join
//!       → merge (first writer wins) → concatenate cached chunks → filter
//! ```
//!
//! Only the merge takes the write lock. Two top-level queries may fetch the
//! same chunk at once; both results are identical and the first one merged
//! is kept. Every `reset()` starts a new cache generation, and chunks loaded
//! for an older generation are never merged: the query loads them again.

use crate::common::error::{ReaderError, ReaderResult};
use crate::common::event::Event;
use crate::common::reader::{normalize_range, Reader, SharedReader, StatisticKind};
use crate::common::sample::Sample;
use crate::common::sensor::Sensor;
use crate::config::CacheConfig;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::RwLock;

type ChunkCache<T> = BTreeMap<i64, Arc<Vec<T>>>;

/// Everything the decorator has memoised from the inner reader
#[derive(Default)]
struct CacheState {
    /// Bumped by every reset
    generation: u64,
    sensors: Vec<Sensor>,
    samples: ChunkCache<Sample>,
    resolution_samples: HashMap<i32, ChunkCache<Sample>>,
    events: ChunkCache<Event>,
    length: Option<f64>,
    statistics: HashMap<StatisticKind, Vec<Option<f64>>>,
}

/// Reader decorator that caches fixed-size time chunks of an inner reader
pub struct CachedReader {
    inner: SharedReader,
    chunk_size: f64,
    event_chunk_size: f64,
    state: RwLock<CacheState>,
}

impl CachedReader {
    /// Wrap `inner` with the default chunk sizes
    pub async fn new(inner: SharedReader) -> Self {
        let config = CacheConfig::default();
        Self::build(inner, config.chunk_size, config.event_chunk_size).await
    }

    /// Wrap `inner` with configured chunk sizes
    pub async fn with_config(inner: SharedReader, config: &CacheConfig) -> ReaderResult<Self> {
        for (name, size) in [
            ("chunk_size", config.chunk_size),
            ("event_chunk_size", config.event_chunk_size),
        ] {
            if !(size.is_finite() && size > 0.0) {
                return Err(ReaderError::Config(format!(
                    "{} must be a positive number of seconds, got {}",
                    name, size
                )));
            }
        }
        Ok(Self::build(inner, config.chunk_size, config.event_chunk_size).await)
    }

    async fn build(inner: SharedReader, chunk_size: f64, event_chunk_size: f64) -> Self {
        let sensors = inner.sensors().await;
        tracing::debug!(
            filename = inner.filename(),
            sensors = sensors.len(),
            chunk_size,
            "Created cached reader"
        );
        Self {
            inner,
            chunk_size,
            event_chunk_size,
            state: RwLock::new(CacheState {
                sensors,
                ..Default::default()
            }),
        }
    }

    /// The wrapped reader
    pub fn inner(&self) -> &SharedReader {
        &self.inner
    }

    /// Drop every cached chunk, length and statistic and re-read the sensor
    /// list. Use when the inner reader's data may have changed.
    pub async fn reset(&self) {
        let sensors = self.inner.sensors().await;
        let mut state = self.state.write().await;
        *state = CacheState {
            generation: state.generation.wrapping_add(1),
            sensors,
            ..Default::default()
        };
        tracing::debug!(
            filename = self.inner.filename(),
            generation = state.generation,
            "Cache reset"
        );
    }

    /// Number of cached raw-sample chunks
    pub async fn cached_chunks(&self) -> usize {
        self.state.read().await.samples.len()
    }

    /// Serve `[begin, end]` from one chunk cache, loading missing chunks first.
    ///
    /// If the cache is reset while chunks are loading, the loaded chunks are
    /// discarded and the query starts over against the new generation.
    #[allow(clippy::too_many_arguments)]
    async fn load_range<T, C, M, F, Fut>(
        &self,
        begin: f64,
        end: f64,
        chunk_size: f64,
        cache: C,
        cache_mut: M,
        fetch: F,
        time_of: fn(&T) -> f64,
    ) -> ReaderResult<Vec<T>>
    where
        T: Clone + Send + Sync + 'static,
        C: Fn(&CacheState) -> Option<&ChunkCache<T>> + Send + Sync,
        M: Fn(&mut CacheState) -> &mut ChunkCache<T> + Send + Sync,
        F: Fn(f64, f64) -> Fut + Send + Sync,
        Fut: Future<Output = ReaderResult<Vec<T>>> + Send + 'static,
    {
        loop {
            let (begin, end) = normalize_range(begin, end, self.length().await);
            if begin > end {
                return Ok(Vec::new());
            }
            let chunks = chunk_range(begin, end, chunk_size);

            let (generation, missing) = {
                let state = self.state.read().await;
                let missing = missing_chunks(cache(&*state), chunks.clone());
                if missing.is_empty() {
                    return Ok(assemble(cache(&*state), chunks, begin, end, time_of));
                }
                (state.generation, missing)
            };

            tracing::debug!(count = missing.len(), "Loading chunks");
            let loaded = fetch_chunks(missing, chunk_size, &fetch).await?;

            let mut guard = self.state.write().await;
            if guard.generation != generation {
                tracing::debug!(generation, "Cache reset during load, reloading");
                continue;
            }
            merge(cache_mut(&mut *guard), loaded);
            let state = guard.downgrade();
            return Ok(assemble(cache(&*state), chunks, begin, end, time_of));
        }
    }
}

/// Chunk indices covering `[begin, end]`, plus one trailing chunk
fn chunk_range(begin: f64, end: f64, chunk_size: f64) -> Range<i64> {
    let first = (begin / chunk_size).floor().max(0.0) as i64;
    let last = (end / chunk_size).ceil() as i64 + 1;
    first..last
}

fn missing_chunks<T>(cache: Option<&ChunkCache<T>>, chunks: Range<i64>) -> Vec<i64> {
    chunks
        .filter(|chunk| cache.map_or(true, |c| !c.contains_key(chunk)))
        .collect()
}

/// Fetch every missing chunk on its own task and wait for all of them.
///
/// Results come back in ascending chunk order. Any failed fetch fails the
/// whole load, after all tasks have finished.
async fn fetch_chunks<T, F, Fut>(
    missing: Vec<i64>,
    chunk_size: f64,
    fetch: F,
) -> ReaderResult<Vec<(i64, Vec<T>)>>
where
    T: Send + 'static,
    F: Fn(f64, f64) -> Fut,
    Fut: Future<Output = ReaderResult<Vec<T>>> + Send + 'static,
{
    let handles: Vec<_> = missing
        .into_iter()
        .map(|chunk| {
            let chunk_begin = chunk as f64 * chunk_size;
            let chunk_end = (chunk + 1) as f64 * chunk_size;
            let load = fetch(chunk_begin, chunk_end);
            tokio::spawn(async move { load.await.map(|data| (chunk, data)) })
        })
        .collect();

    let mut loaded = Vec::with_capacity(handles.len());
    for joined in join_all(handles).await {
        loaded.push(joined??);
    }
    Ok(loaded)
}

fn merge<T>(cache: &mut ChunkCache<T>, loaded: Vec<(i64, Vec<T>)>) {
    for (chunk, data) in loaded {
        cache.entry(chunk).or_insert_with(|| Arc::new(data));
    }
}

/// Concatenate cached chunks in order, keeping items inside `[begin, end]`.
///
/// An item is only taken from a chunk if it is strictly later than the last
/// item already emitted, which drops the copies that appear on both sides
/// of a chunk boundary.
fn assemble<T: Clone>(
    cache: Option<&ChunkCache<T>>,
    chunks: Range<i64>,
    begin: f64,
    end: f64,
    time_of: fn(&T) -> f64,
) -> Vec<T> {
    let mut result: Vec<T> = Vec::new();
    let Some(cache) = cache else {
        return result;
    };
    for chunk in chunks {
        let Some(data) = cache.get(&chunk) else {
            continue;
        };
        let last_time = result.last().map(time_of).unwrap_or(f64::NEG_INFINITY);
        result.extend(
            data.iter()
                .filter(|item| {
                    let time = time_of(item);
                    last_time < time && time >= begin && time <= end
                })
                .cloned(),
        );
    }
    result
}

fn sample_time(sample: &Sample) -> f64 {
    sample.time
}

fn event_time(event: &Event) -> f64 {
    event.time
}

#[async_trait]
impl Reader for CachedReader {
    fn filename(&self) -> &str {
        self.inner.filename()
    }

    async fn sensors(&self) -> Vec<Sensor> {
        self.state.read().await.sensors.clone()
    }

    async fn samples(&self, begin: f64, end: f64) -> ReaderResult<Vec<Sample>> {
        let inner = Arc::clone(&self.inner);
        self.load_range(
            begin,
            end,
            self.chunk_size,
            |state| Some(&state.samples),
            |state| &mut state.samples,
            move |b, e| {
                let inner = Arc::clone(&inner);
                async move { inner.samples(b, e).await }
            },
            sample_time,
        )
        .await
    }

    async fn samples_at(&self, begin: f64, end: f64, resolution: i32) -> ReaderResult<Vec<Sample>> {
        let resolution = resolution.max(1);
        let inner = Arc::clone(&self.inner);
        self.load_range(
            begin,
            end,
            self.chunk_size,
            |state| state.resolution_samples.get(&resolution),
            |state| state.resolution_samples.entry(resolution).or_default(),
            move |b, e| {
                let inner = Arc::clone(&inner);
                async move { inner.samples_at(b, e, resolution).await }
            },
            sample_time,
        )
        .await
    }

    async fn events(&self, begin: f64, end: f64) -> ReaderResult<Vec<Event>> {
        let inner = Arc::clone(&self.inner);
        self.load_range(
            begin,
            end,
            self.event_chunk_size,
            |state| Some(&state.events),
            |state| &mut state.events,
            move |b, e| {
                let inner = Arc::clone(&inner);
                async move { inner.events(b, e).await }
            },
            event_time,
        )
        .await
    }

    async fn statistic(&self, kind: StatisticKind) -> ReaderResult<Vec<Option<f64>>> {
        let generation = {
            let state = self.state.read().await;
            if let Some(values) = state.statistics.get(&kind) {
                return Ok(values.clone());
            }
            state.generation
        };
        let values = self.inner.statistic(kind).await?;

        let mut state = self.state.write().await;
        if state.generation != generation {
            return Ok(values);
        }
        Ok(state.statistics.entry(kind).or_insert(values).clone())
    }

    async fn length(&self) -> f64 {
        let generation = {
            let state = self.state.read().await;
            if let Some(length) = state.length {
                return length;
            }
            state.generation
        };
        let length = self.inner.length().await;

        let mut state = self.state.write().await;
        if state.generation != generation {
            return length;
        }
        *state.length.get_or_insert(length)
    }
}
