//! Wires the producer and N consumers together, owns the shared queue,
//! metrics, and stop flag, and runs progress logging until both sides
//! wind down.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::loader::CopyDriver;
use crate::metrics::{MetricsSnapshot, SharedMetrics};
use crate::pipeline::consumer::{consumer_main, ConsumerConfig};
use crate::pipeline::producer::{producer_main, ProducerConfig};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub xml_path: PathBuf,
    pub group_tag: String,
    pub event_tag: String,
    pub groups_table: String,
    pub events_table: String,
    pub workers: usize,
    pub queue_maxsize: usize,
    pub batch_max_rows: usize,
    pub batch_max_bytes: usize,
    pub recover: bool,
    pub huge_tree: bool,
    pub log_interval: Duration,
    pub copy_retries: u32,
    pub retry_base_sleep: Duration,
    pub queue_get_timeout: Duration,
}

fn log_progress(cur: &MetricsSnapshot, prev: &MetricsSnapshot) {
    let dt = (cur.ts - prev.ts).as_secs_f64().max(1e-6);
    let dg = (cur.groups_copied - prev.groups_copied) as f64 / dt;
    let de = (cur.events_copied - prev.events_copied) as f64 / dt;
    info!(
        groups_copied = cur.groups_copied,
        events_copied = cur.events_copied,
        groups_per_sec = dg,
        events_per_sec = de,
        batches_enqueued = cur.batches_enqueued,
        batches_copied = cur.batches_copied,
        skipped = cur.skipped_records,
        copy_errors = cur.copy_errors,
        "progress"
    );
}

/// Runs the producer/N-consumer pipeline to completion and returns the
/// final metrics snapshot. Worker crashes are logged and trigger
/// shutdown of the rest of the pipeline; they are not returned as
/// errors here, matching the rest of the run proceeding to report
/// whatever final counts it managed.
pub async fn run_pipeline(
    cfg: PipelineConfig,
    metrics: Arc<SharedMetrics>,
    driver: Arc<dyn CopyDriver>,
) -> MetricsSnapshot {
    let (tx, rx) = async_channel::bounded(cfg.queue_maxsize.max(1));
    let stop = Arc::new(AtomicBool::new(false));

    let mut consumer_handles = Vec::with_capacity(cfg.workers);
    for worker_id in 0..cfg.workers {
        let consumer_cfg = ConsumerConfig {
            worker_id,
            copy_retries: cfg.copy_retries,
            retry_base_sleep: cfg.retry_base_sleep,
            queue_recv_timeout: cfg.queue_get_timeout,
            groups_table: cfg.groups_table.clone(),
            events_table: cfg.events_table.clone(),
        };
        let handle = tokio::spawn(consumer_main(
            rx.clone(),
            Arc::clone(&stop),
            Arc::clone(&metrics),
            consumer_cfg,
            Arc::clone(&driver),
        ));
        consumer_handles.push(handle);
    }
    drop(rx);

    let producer_cfg = ProducerConfig {
        xml_path: cfg.xml_path.clone(),
        group_tag: cfg.group_tag.clone(),
        event_tag: cfg.event_tag.clone(),
        recover: cfg.recover,
        huge_tree: cfg.huge_tree,
        batch_max_rows: cfg.batch_max_rows,
        batch_max_bytes: cfg.batch_max_bytes,
    };
    let producer_stop = Arc::clone(&stop);
    let producer_metrics = Arc::clone(&metrics);
    let producer_handle = tokio::task::spawn_blocking(move || {
        producer_main(tx, producer_stop, producer_metrics, producer_cfg)
    });

    let mut last = metrics.snapshot();
    let mut last_log = tokio::time::Instant::now();

    loop {
        if stop.load(Ordering::Relaxed) || producer_handle.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        if last_log.elapsed() >= cfg.log_interval {
            let snap = metrics.snapshot();
            log_progress(&snap, &last);
            last = snap;
            last_log = tokio::time::Instant::now();
        }
    }

    match tokio::time::timeout(Duration::from_secs(10), producer_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => {
            stop.store(true, Ordering::Relaxed);
            error!(error = %err, "producer crashed");
        }
        Ok(Err(join_err)) => {
            stop.store(true, Ordering::Relaxed);
            error!(error = %join_err, "producer task panicked");
        }
        Err(_timeout) => {
            stop.store(true, Ordering::Relaxed);
            error!("producer did not finish within shutdown timeout");
        }
    }

    for handle in consumer_handles {
        match tokio::time::timeout(Duration::from_secs(30), handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => {
                stop.store(true, Ordering::Relaxed);
                error!(error = %err, "consumer crashed");
            }
            Ok(Err(join_err)) => {
                stop.store(true, Ordering::Relaxed);
                error!(error = %join_err, "consumer task panicked");
            }
            Err(_timeout) => {
                stop.store(true, Ordering::Relaxed);
                error!("consumer did not finish within shutdown timeout");
            }
        }
    }

    let final_snapshot = metrics.snapshot();
    log_progress(&final_snapshot, &last);
    final_snapshot
}
