//! Accumulates rows into bounded-size [`Batch`] values for the loader.

use crate::wire::{estimate_row_bytes, Field};

/// Which staging table a batch targets, and the row arity that implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Group,
    Event,
}

impl BatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchKind::Group => "group",
            BatchKind::Event => "event",
        }
    }
}

/// An immutable, typed chunk of rows crossing the producer -> consumer
/// boundary. Once built, nothing mutates a `Batch`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub kind: BatchKind,
    pub rows: Vec<Vec<Field>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Static table/column configuration for one batch kind's COPY command.
#[derive(Debug, Clone)]
pub struct CopySpec {
    pub table: String,
    pub columns: Vec<String>,
}

impl CopySpec {
    pub fn for_kind(kind: BatchKind, groups_table: &str, events_table: &str) -> CopySpec {
        match kind {
            BatchKind::Group => CopySpec {
                table: format!("stg_{groups_table}"),
                columns: vec!["id".to_string(), "name".to_string()],
            },
            BatchKind::Event => CopySpec {
                table: format!("stg_{events_table}"),
                columns: vec![
                    "id".to_string(),
                    "group_event_id".to_string(),
                    "name".to_string(),
                ],
            },
        }
    }
}

/// Buckets rows of one [`BatchKind`] into [`Batch`]es bounded by both a
/// row count and an estimated byte size.
///
/// A single row whose own estimated size exceeds `max_bytes` is never
/// dropped: it is emitted alone, as a one-row batch.
pub struct BatchBuilder {
    kind: BatchKind,
    max_rows: usize,
    max_bytes: usize,
    rows: Vec<Vec<Field>>,
    bytes: usize,
}

impl BatchBuilder {
    pub fn new(kind: BatchKind, max_rows: usize, max_bytes: usize) -> Self {
        Self {
            kind,
            max_rows: max_rows.max(1),
            max_bytes: max_bytes.max(1),
            rows: Vec::new(),
            bytes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn bytes_estimate(&self) -> usize {
        self.bytes
    }

    /// Appends one row. Returns a completed batch if adding this row
    /// pushed (or would have pushed) the builder over either limit.
    pub fn add(&mut self, row: Vec<Field>) -> Option<Batch> {
        let row_bytes = estimate_row_bytes(&row);

        if !self.rows.is_empty()
            && (self.rows.len() + 1 > self.max_rows || self.bytes + row_bytes > self.max_bytes)
        {
            let out = self.take_batch();
            self.rows.push(row);
            self.bytes = row_bytes;
            return Some(out);
        }

        self.rows.push(row);
        self.bytes += row_bytes;

        if self.rows.len() >= self.max_rows || self.bytes >= self.max_bytes {
            return self.flush();
        }

        None
    }

    /// Emits the accumulated batch, if any, and resets the builder.
    pub fn flush(&mut self) -> Option<Batch> {
        if self.rows.is_empty() {
            return None;
        }
        Some(self.take_batch())
    }

    fn take_batch(&mut self) -> Batch {
        let rows = std::mem::take(&mut self.rows);
        self.bytes = 0;
        Batch { kind: self.kind, rows }
    }
}
