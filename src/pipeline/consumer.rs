//! Drains batches off the shared queue and `COPY`s them into staging.
//!
//! The shared [`async_channel::Sender`] living only inside the producer
//! task is this pipeline's sentinel: once the producer finishes (or
//! crashes) and drops it, every consumer's `recv` eventually returns
//! `Closed` once the queue drains, which is this module's signal to
//! stop -- no explicit per-worker sentinel value needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::batch::{Batch, BatchKind, CopySpec};
use crate::loader::{copy_with_retry, CopyDriver, UNKNOWN_ROW_COUNT};
use crate::metrics::{CounterField, SharedMetrics};

pub struct ConsumerConfig {
    pub worker_id: usize,
    pub copy_retries: u32,
    pub retry_base_sleep: Duration,
    pub queue_recv_timeout: Duration,
    pub groups_table: String,
    pub events_table: String,
}

/// Runs one consumer to completion. Returns `Err` only on a fatal,
/// retry-exhausted `COPY` failure; the caller is responsible for
/// setting `stop` so siblings wind down too.
pub async fn consumer_main(
    queue: async_channel::Receiver<Batch>,
    stop: Arc<AtomicBool>,
    metrics: Arc<SharedMetrics>,
    cfg: ConsumerConfig,
    driver: Arc<dyn CopyDriver>,
) -> Result<(), crate::error::LoaderError> {
    info!(worker_id = cfg.worker_id, "consumer started");

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let batch = match tokio::time::timeout(cfg.queue_recv_timeout, queue.recv()).await {
            Ok(Ok(batch)) => batch,
            Ok(Err(async_channel::RecvError)) => break,
            Err(_timeout) => continue,
        };

        let spec = CopySpec::for_kind(batch.kind, &cfg.groups_table, &cfg.events_table);

        match copy_with_retry(
            driver.as_ref(),
            &spec,
            &batch,
            cfg.copy_retries,
            cfg.retry_base_sleep,
            &metrics,
        )
        .await
        {
            Ok(count) => {
                let rows = if count == UNKNOWN_ROW_COUNT {
                    batch.len() as i64
                } else {
                    count
                };
                match batch.kind {
                    BatchKind::Group => metrics.inc(CounterField::GroupsCopied, rows),
                    BatchKind::Event => metrics.inc(CounterField::EventsCopied, rows),
                }
                metrics.inc(CounterField::BatchesCopied, 1);
            }
            Err(err) => {
                warn!(
                    worker_id = cfg.worker_id,
                    kind = batch.kind.as_str(),
                    rows = batch.len(),
                    error = %err,
                    "copy failed after exhausting retries"
                );
                stop.store(true, Ordering::Relaxed);
                return Err(err);
            }
        }
    }

    info!(worker_id = cfg.worker_id, "consumer finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Field;
    use async_trait::async_trait;

    struct CountingDriver {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl CopyDriver for CountingDriver {
        async fn copy_batch(&self, _spec: &CopySpec, batch: &Batch) -> Result<i64, crate::error::LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(batch.len() as i64)
        }
    }

    fn sample_batch() -> Batch {
        Batch {
            kind: BatchKind::Group,
            rows: vec![vec![Field::Int(1), Field::Text(None)]],
        }
    }

    #[tokio::test]
    async fn drains_queue_and_stops_on_channel_close() {
        let (tx, rx) = async_channel::unbounded();
        tx.send(sample_batch()).await.unwrap();
        drop(tx);

        let stop = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(SharedMetrics::new());
        let driver: Arc<dyn CopyDriver> = Arc::new(CountingDriver { calls: Default::default() });

        let cfg = ConsumerConfig {
            worker_id: 0,
            copy_retries: 1,
            retry_base_sleep: Duration::from_millis(1),
            queue_recv_timeout: Duration::from_millis(50),
            groups_table: "group_event".into(),
            events_table: "event".into(),
        };

        consumer_main(rx, stop, metrics.clone(), cfg, driver).await.unwrap();
        assert_eq!(metrics.snapshot().groups_copied, 1);
        assert_eq!(metrics.snapshot().batches_copied, 1);
    }

    struct AlwaysFailsDriver;

    #[async_trait]
    impl CopyDriver for AlwaysFailsDriver {
        async fn copy_batch(&self, spec: &CopySpec, _batch: &Batch) -> Result<i64, crate::error::LoaderError> {
            Err(crate::error::LoaderError::Transient {
                table: spec.table.clone(),
                source: Box::new(std::io::Error::new(std::io::ErrorKind::Other, "down")),
            })
        }
    }

    #[tokio::test]
    async fn sets_stop_flag_on_fatal_copy_failure() {
        let (tx, rx) = async_channel::unbounded();
        tx.send(sample_batch()).await.unwrap();
        drop(tx);

        let stop = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(SharedMetrics::new());
        let driver: Arc<dyn CopyDriver> = Arc::new(AlwaysFailsDriver);

        let cfg = ConsumerConfig {
            worker_id: 1,
            copy_retries: 1,
            retry_base_sleep: Duration::from_millis(1),
            queue_recv_timeout: Duration::from_millis(50),
            groups_table: "group_event".into(),
            events_table: "event".into(),
        };

        let result = consumer_main(rx, stop.clone(), metrics.clone(), cfg, driver).await;
        assert!(result.is_err());
        assert!(stop.load(Ordering::Relaxed));
        // copy_retries: 1 means two attempts total, both failing.
        assert_eq!(metrics.snapshot().copy_errors, 2);
    }
}
