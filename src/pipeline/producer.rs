//! Reads the XML source and feeds batches into the shared queue.
//!
//! Runs on a blocking-pool thread (`quick_xml`'s file reader is
//! synchronous `Read`, not `AsyncRead`), so this module has no `.await`
//! in it; the queue handoff uses [`async_channel::Sender::send_blocking`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::batch::{BatchBuilder, BatchKind};
use crate::metrics::{CounterField, SharedMetrics};
use crate::wire::Field;
use crate::xml::{extract, XmlStreamer};

pub struct ProducerConfig {
    pub xml_path: std::path::PathBuf,
    pub group_tag: String,
    pub event_tag: String,
    pub recover: bool,
    pub huge_tree: bool,
    pub batch_max_rows: usize,
    pub batch_max_bytes: usize,
}

fn put_batch(
    queue: &async_channel::Sender<crate::batch::Batch>,
    stop: &AtomicBool,
    metrics: &SharedMetrics,
    batch: crate::batch::Batch,
) {
    if stop.load(Ordering::Relaxed) {
        return;
    }
    let rows = batch.len() as i64;
    let kind = batch.kind;
    if queue.send_blocking(batch).is_err() {
        // Every consumer dropped its receiver; nothing left to feed.
        return;
    }
    metrics.inc(CounterField::BatchesEnqueued, 1);
    match kind {
        BatchKind::Group => metrics.inc(CounterField::GroupsEnqueued, rows),
        BatchKind::Event => metrics.inc(CounterField::EventsEnqueued, rows),
    }
}

/// Streams `cfg.xml_path`, batches rows, and enqueues them until the
/// source is exhausted, `stop` is set, or the XML is unreadable.
pub fn producer_main(
    queue: async_channel::Sender<crate::batch::Batch>,
    stop: Arc<AtomicBool>,
    metrics: Arc<SharedMetrics>,
    cfg: ProducerConfig,
) -> Result<(), crate::error::XmlError> {
    let mut streamer = XmlStreamer::open(
        &cfg.xml_path,
        &cfg.group_tag,
        &cfg.event_tag,
        cfg.recover,
        cfg.huge_tree,
    )?;

    let mut group_batcher = BatchBuilder::new(BatchKind::Group, cfg.batch_max_rows, cfg.batch_max_bytes);
    let mut event_batcher = BatchBuilder::new(BatchKind::Event, cfg.batch_max_rows, cfg.batch_max_bytes);

    info!(
        xml = %cfg.xml_path.display(),
        batch_max_rows = cfg.batch_max_rows,
        batch_max_bytes = cfg.batch_max_bytes,
        "producer started"
    );

    let mut skipped_total: i64 = 0;
    let mut fatal: Option<crate::error::XmlError> = None;

    while let Some(item) = streamer.next() {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let subtree = match item {
            Ok(subtree) => subtree,
            Err(err) => {
                fatal = Some(err);
                break;
            }
        };

        let result = extract(subtree);
        skipped_total += i64::from(result.skipped);
        streamer.record_extraction(
            result.group.is_some(),
            result.events.len() as u64,
            u64::from(result.skipped),
        );

        if let Some(group) = result.group {
            metrics.inc(CounterField::GroupsParsed, 1);
            let row = vec![Field::Int(group.id), Field::Text(group.name)];
            if let Some(batch) = group_batcher.add(row) {
                put_batch(&queue, &stop, &metrics, batch);
            }
        }

        if !result.events.is_empty() {
            metrics.inc(CounterField::EventsParsed, result.events.len() as i64);
            for event in result.events {
                let row = vec![
                    Field::Int(event.id),
                    Field::Int(event.group_id),
                    Field::Text(event.name),
                ];
                if let Some(batch) = event_batcher.add(row) {
                    put_batch(&queue, &stop, &metrics, batch);
                }
            }
        }
    }

    if fatal.is_none() {
        if let Some(tail) = group_batcher.flush() {
            if !stop.load(Ordering::Relaxed) {
                put_batch(&queue, &stop, &metrics, tail);
            }
        }
        if let Some(tail) = event_batcher.flush() {
            if !stop.load(Ordering::Relaxed) {
                put_batch(&queue, &stop, &metrics, tail);
            }
        }
    }

    metrics.inc(CounterField::SkippedRecords, skipped_total);

    let reader_stats = streamer.stats();
    info!(
        skipped = skipped_total,
        groups_seen = reader_stats.groups_seen,
        groups_emitted = reader_stats.groups_emitted,
        events_emitted = reader_stats.events_emitted,
        "producer finished"
    );

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
