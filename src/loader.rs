//! Bulk-loads [`Batch`]es into PostgreSQL staging tables via `COPY`.
//!
//! Two driver shapes implement [`CopyDriver`]: [`ChunkedDriver`] pushes
//! pre-encoded `Bytes` chunks into an async `tokio_postgres` sink, and
//! [`ReaderDriver`] hands the sync `postgres` crate a lazily-pulled
//! [`Read`] adapter, mirroring a blocking driver that reads rows off a
//! cursor rather than being pushed them. They are selected once at
//! construction time, never probed at runtime.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{pin_mut, SinkExt};
use tracing::warn;

use crate::batch::{Batch, CopySpec};
use crate::error::LoaderError;
use crate::metrics::{CounterField, SharedMetrics};
use crate::wire::encode_row;

/// One completed bulk load: rows actually copied, where known.
///
/// [`ReaderDriver`] cannot observe PostgreSQL's row count (the sync
/// `postgres` crate's `CopyInWriter` only reports bytes written), so it
/// reports `-1` rather than guessing.
pub const UNKNOWN_ROW_COUNT: i64 = -1;

#[async_trait]
pub trait CopyDriver: Send + Sync {
    async fn copy_batch(&self, spec: &CopySpec, batch: &Batch) -> Result<i64, LoaderError>;
}

fn copy_sql(spec: &CopySpec) -> String {
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT text, DELIMITER E'\\t', NULL '\\N')",
        spec.table,
        spec.columns.join(", ")
    )
}

/// Splits a batch's encoded rows into chunks of at most
/// `max_chunk_bytes`, never splitting a row across chunks. A single row
/// larger than `max_chunk_bytes` still becomes its own (oversized)
/// chunk rather than being truncated.
fn chunk_batch(batch: &Batch, max_chunk_bytes: usize) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for row in &batch.rows {
        let mut line = String::new();
        encode_row(row, &mut line);
        if !current.is_empty() && current.len() + line.len() > max_chunk_bytes {
            chunks.push(Bytes::from(std::mem::take(&mut current)));
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        chunks.push(Bytes::from(current));
    }
    chunks
}

/// Push-based driver built on `tokio_postgres`'s `CopyInSink`.
///
/// Opens a fresh connection per call: workers never inherit connection
/// state from the producer or from each other.
pub struct ChunkedDriver {
    connector: Arc<dyn ConnectAsync>,
    max_chunk_bytes: usize,
}

/// Abstracts how to obtain a live async connection, so tests can stand
/// in a fake without a real database.
#[async_trait]
pub trait ConnectAsync: Send + Sync {
    async fn connect(&self) -> Result<tokio_postgres::Client, tokio_postgres::Error>;
}

impl ChunkedDriver {
    pub fn new(connector: Arc<dyn ConnectAsync>, max_chunk_bytes: usize) -> Self {
        Self {
            connector,
            max_chunk_bytes: max_chunk_bytes.max(1),
        }
    }
}

#[async_trait]
impl CopyDriver for ChunkedDriver {
    async fn copy_batch(&self, spec: &CopySpec, batch: &Batch) -> Result<i64, LoaderError> {
        let client = self.connector.connect().await.map_err(|e| LoaderError::Transient {
            table: spec.table.clone(),
            source: Box::new(e),
        })?;

        let sql = copy_sql(spec);
        let sink = client
            .copy_in(&sql)
            .await
            .map_err(|e| LoaderError::Transient {
                table: spec.table.clone(),
                source: Box::new(e),
            })?;
        pin_mut!(sink);

        for chunk in chunk_batch(batch, self.max_chunk_bytes) {
            sink.send(chunk).await.map_err(|e| LoaderError::Transient {
                table: spec.table.clone(),
                source: Box::new(e),
            })?;
        }

        sink.finish().await.map_err(|e| LoaderError::Transient {
            table: spec.table.clone(),
            source: Box::new(e),
        })
    }
}

/// Pull-based `Read` adapter over a batch's already-encoded rows.
///
/// Encodes lazily, one row at a time, so a sync `Write` consumer (the
/// `postgres` crate's `CopyInWriter`) can pull through `io::copy`
/// without the whole batch ever existing as one contiguous buffer.
struct RowReader<'a> {
    rows: std::slice::Iter<'a, Vec<crate::wire::Field>>,
    pending: Vec<u8>,
    pos: usize,
}

impl<'a> RowReader<'a> {
    fn new(batch: &'a Batch) -> Self {
        Self {
            rows: batch.rows.iter(),
            pending: Vec::new(),
            pos: 0,
        }
    }
}

impl<'a> Read for RowReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.pending.len() {
            let Some(row) = self.rows.next() else {
                return Ok(0);
            };
            let mut line = String::new();
            encode_row(row, &mut line);
            self.pending = line.into_bytes();
            self.pos = 0;
        }
        let remaining = &self.pending[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Abstracts how to obtain a live blocking connection.
pub trait ConnectSync: Send + Sync {
    fn connect(&self) -> Result<postgres::Client, postgres::Error>;
}

/// Pull-based driver built on the sync `postgres` crate's
/// `CopyInWriter: Write`, fed through [`std::io::copy`].
pub struct ReaderDriver {
    connector: Arc<dyn ConnectSync>,
}

impl ReaderDriver {
    pub fn new(connector: Arc<dyn ConnectSync>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl CopyDriver for ReaderDriver {
    async fn copy_batch(&self, spec: &CopySpec, batch: &Batch) -> Result<i64, LoaderError> {
        let connector = Arc::clone(&self.connector);
        let spec = spec.clone();
        let batch = batch.clone();

        tokio::task::spawn_blocking(move || {
            let mut client = connector.connect().map_err(|e| LoaderError::Transient {
                table: spec.table.clone(),
                source: Box::new(e),
            })?;
            let sql = copy_sql(&spec);
            let mut writer = client.copy_in(&sql).map_err(|e| LoaderError::Transient {
                table: spec.table.clone(),
                source: Box::new(e),
            })?;
            let mut reader = RowReader::new(&batch);
            std::io::copy(&mut reader, &mut writer).map_err(|e| LoaderError::Transient {
                table: spec.table.clone(),
                source: Box::new(e),
            })?;
            writer.finish().map_err(|e| LoaderError::Transient {
                table: spec.table.clone(),
                source: Box::new(e),
            })?;
            Ok(UNKNOWN_ROW_COUNT)
        })
        .await
        .map_err(|e| LoaderError::Transient {
            table: "<blocking task>".to_string(),
            source: Box::new(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
        })?
    }
}

/// Retries `driver.copy_batch` with exponential backoff:
/// `base_sleep * 2^attempt` between tries, up to `retries` extra
/// attempts after the first. `metrics.copy_errors` is bumped once per
/// failed attempt, not once per call.
pub async fn copy_with_retry(
    driver: &dyn CopyDriver,
    spec: &CopySpec,
    batch: &Batch,
    retries: u32,
    base_sleep: Duration,
    metrics: &SharedMetrics,
) -> Result<i64, LoaderError> {
    let mut attempt = 0;
    loop {
        match driver.copy_batch(spec, batch).await {
            Ok(count) => return Ok(count),
            Err(err) if attempt >= retries => {
                metrics.inc(CounterField::CopyErrors, 1);
                return Err(LoaderError::Exhausted {
                    table: spec.table.clone(),
                    retries,
                    source: Box::new(err),
                })
            }
            Err(err) => {
                metrics.inc(CounterField::CopyErrors, 1);
                let sleep_for = base_sleep * 2u32.saturating_pow(attempt);
                warn!(
                    table = %spec.table,
                    attempt = attempt + 1,
                    max_attempts = retries + 1,
                    sleep_secs = sleep_for.as_secs_f64(),
                    error = %err,
                    "copy attempt failed, retrying after backoff"
                );
                tokio::time::sleep(sleep_for).await;
                attempt += 1;
            }
        }
    }
}
