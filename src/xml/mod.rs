//! Constant-memory streaming of `<group_event>` subtrees, and their
//! conversion into validated [`crate::model`] records.

mod extractor;
mod streamer;

pub use extractor::{extract, ExtractResult};
pub use streamer::{GroupSubtree, RawEvent, ReaderStats, XmlStreamer};
