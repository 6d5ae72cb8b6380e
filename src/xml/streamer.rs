//! Depth-1 group-tag streaming over `quick_xml`'s pull parser.
//!
//! The reader never buffers more than one `<group_event>` subtree at a
//! time: each `Event::End` that returns us to depth 0 yields a
//! [`GroupSubtree`] and the accumulator is dropped, so memory use stays
//! flat regardless of document size.

use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::XmlError;

/// One `<event>` child of a group, in raw (unvalidated) form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub id_attr: Option<String>,
    pub text: Option<String>,
}

/// One `<group_event>` subtree, in raw (unvalidated) form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupSubtree {
    pub id_attr: Option<String>,
    pub name_attr: Option<String>,
    pub events: Vec<RawEvent>,
}

/// Running counters for one streaming pass, plus the byte offset useful
/// for diagnosing where a malformed document trails off. `groups_seen`
/// is updated by the streamer itself as each subtree closes;
/// `groups_emitted`/`events_emitted`/`skipped_records` depend on
/// validation the streamer doesn't perform, so callers fold their
/// extraction results back in via [`XmlStreamer::record_extraction`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ReaderStats {
    pub bytes_consumed: usize,
    pub groups_seen: u64,
    pub groups_emitted: u64,
    pub events_emitted: u64,
    pub skipped_records: u64,
}

/// Streams `<group_event>` subtrees out of one XML file.
pub struct XmlStreamer {
    reader: Reader<std::io::BufReader<std::fs::File>>,
    buf: Vec<u8>,
    path: PathBuf,
    group_tag: Vec<u8>,
    event_tag: Vec<u8>,
    recover: bool,
    stats: ReaderStats,
    depth: u32,
    in_group: bool,
    in_event: bool,
    current_group: Option<GroupSubtree>,
    current_event: Option<RawEvent>,
    done: bool,
}

impl XmlStreamer {
    /// Opens `path` for streaming. `huge_tree` is accepted for parity
    /// with the configuration surface but has no effect here: this
    /// reader never materializes the whole document, so the guard it
    /// names in other parsers does not apply.
    pub fn open(
        path: impl AsRef<Path>,
        group_tag: &str,
        event_tag: &str,
        recover: bool,
        _huge_tree: bool,
    ) -> Result<Self, XmlError> {
        let path = path.as_ref().to_path_buf();
        let mut reader =
            Reader::from_file(&path).map_err(|source| XmlError::Unreadable {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, source.to_string()),
            })?;
        reader.config_mut().trim_text(true);
        reader.config_mut().check_end_names = !recover;

        Ok(Self {
            reader,
            buf: Vec::with_capacity(4096),
            path,
            group_tag: group_tag.as_bytes().to_vec(),
            event_tag: event_tag.as_bytes().to_vec(),
            recover,
            stats: ReaderStats::default(),
            depth: 0,
            in_group: false,
            in_event: false,
            current_group: None,
            current_event: None,
            done: false,
        })
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Folds one subtree's extraction outcome into the running stats.
    /// Call this once per item yielded by the iterator, after validating
    /// it, so `stats()` reflects a single coherent view instead of
    /// leaving callers to track these counts themselves.
    pub fn record_extraction(&mut self, group_emitted: bool, events_emitted: u64, skipped: u64) {
        if group_emitted {
            self.stats.groups_emitted += 1;
        }
        self.stats.events_emitted += events_emitted;
        self.stats.skipped_records += skipped;
    }

    fn attr_value(reader: &Reader<std::io::BufReader<std::fs::File>>, e: &quick_xml::events::BytesStart, key: &[u8]) -> Option<String> {
        e.attributes().flatten().find_map(|attr| {
            if attr.key.as_ref() == key {
                attr.decode_and_unescape_value(reader.decoder())
                    .ok()
                    .map(|v| v.into_owned())
            } else {
                None
            }
        })
    }

    fn finish_group(&mut self) -> Option<GroupSubtree> {
        self.in_group = false;
        self.current_group.take()
    }
}

impl Iterator for XmlStreamer {
    type Item = Result<GroupSubtree, XmlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(source) => {
                    self.stats.bytes_consumed = self.reader.buffer_position() as usize;
                    self.done = true;
                    if self.recover {
                        // A malformed fragment stops the stream early rather
                        // than propagating: whatever subtree was mid-flight
                        // is silently dropped, same as any other recovery gap.
                        return None;
                    }
                    return Some(Err(XmlError::Malformed {
                        path: self.path.clone(),
                        offset: self.stats.bytes_consumed,
                        source,
                    }));
                }
            };

            match event {
                Event::Start(e) => {
                    let name = e.name().as_ref().to_vec();
                    if self.depth == 1 && !self.in_group && name == self.group_tag {
                        self.in_group = true;
                        self.current_group = Some(GroupSubtree {
                            id_attr: Self::attr_value(&self.reader, &e, b"id"),
                            name_attr: Self::attr_value(&self.reader, &e, b"name"),
                            events: Vec::new(),
                        });
                    } else if self.depth == 2 && self.in_group && !self.in_event && name == self.event_tag {
                        self.in_event = true;
                        self.current_event = Some(RawEvent {
                            id_attr: Self::attr_value(&self.reader, &e, b"id"),
                            text: None,
                        });
                    }
                    self.depth += 1;
                }
                Event::Empty(e) => {
                    let name = e.name().as_ref().to_vec();
                    if self.depth == 1 && !self.in_group && name == self.group_tag {
                        let subtree = GroupSubtree {
                            id_attr: Self::attr_value(&self.reader, &e, b"id"),
                            name_attr: Self::attr_value(&self.reader, &e, b"name"),
                            events: Vec::new(),
                        };
                        self.stats.groups_seen += 1;
                        return Some(Ok(subtree));
                    } else if self.depth == 2 && self.in_group && !self.in_event && name == self.event_tag {
                        if let Some(group) = self.current_group.as_mut() {
                            group.events.push(RawEvent {
                                id_attr: Self::attr_value(&self.reader, &e, b"id"),
                                text: None,
                            });
                        }
                    }
                }
                Event::Text(t) => {
                    if self.in_event {
                        if let Ok(text) = t.unescape() {
                            let text = text.into_owned();
                            if !text.trim().is_empty() {
                                let slot = self
                                    .current_event
                                    .get_or_insert_with(|| RawEvent { id_attr: None, text: None });
                                match slot.text.as_mut() {
                                    Some(existing) => existing.push_str(&text),
                                    None => slot.text = Some(text),
                                }
                            }
                        }
                    }
                }
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.in_event && self.depth == 2 {
                        self.in_event = false;
                        if let (Some(group), Some(event)) =
                            (self.current_group.as_mut(), self.current_event.take())
                        {
                            group.events.push(event);
                        }
                    } else if self.in_group && !self.in_event && self.depth == 1 {
                        if let Some(subtree) = self.finish_group() {
                            self.stats.groups_seen += 1;
                            return Some(Ok(subtree));
                        }
                    }
                }
                Event::Eof => {
                    self.stats.bytes_consumed = self.reader.buffer_position() as usize;
                    self.done = true;
                    return None;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn streamer_for(xml: &str, recover: bool) -> XmlStreamer {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(xml.as_bytes()).unwrap();
        XmlStreamer::open(file.into_temp_path().keep().unwrap(), "group_event", "event", recover, false).unwrap()
    }

    #[test]
    fn yields_one_subtree_per_group_with_its_events() {
        let xml = r#"<xml>
            <group_event id="1" name="G1">
                <event id="10">Ten</event>
                <event id="11">Eleven</event>
            </group_event>
            <group_event id="2" name="G2">
                <event id="20">Twenty</event>
            </group_event>
        </xml>"#;
        let groups: Vec<_> = streamer_for(xml, false).map(Result::unwrap).collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id_attr.as_deref(), Some("1"));
        assert_eq!(groups[0].events.len(), 2);
        assert_eq!(groups[0].events[0].text.as_deref(), Some("Ten"));
        assert_eq!(groups[1].events[0].id_attr.as_deref(), Some("20"));
    }

    #[test]
    fn self_closed_group_yields_with_no_events() {
        let xml = r#"<xml><group_event id="1" name="G1"/></xml>"#;
        let groups: Vec<_> = streamer_for(xml, false).map(Result::unwrap).collect();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].events.is_empty());
    }

    #[test]
    fn self_closed_event_has_no_text() {
        let xml = r#"<xml><group_event id="1"><event id="10"/></group_event></xml>"#;
        let groups: Vec<_> = streamer_for(xml, false).map(Result::unwrap).collect();
        assert_eq!(groups[0].events[0].text, None);
    }

    #[test]
    fn unrelated_sibling_tags_at_depth_one_are_skipped() {
        let xml = r#"<xml>
            <metadata><note>ignore me</note></metadata>
            <group_event id="1"><event id="10">Ten</event></group_event>
        </xml>"#;
        let groups: Vec<_> = streamer_for(xml, false).map(Result::unwrap).collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id_attr.as_deref(), Some("1"));
    }

    #[test]
    fn malformed_document_is_fatal_when_not_recovering() {
        let xml = r#"<xml><group_event id="1"><event id="10">Ok</event><event id="11">Broken</group_event></xml>"#;
        let results: Vec<_> = streamer_for(xml, false).collect();
        assert!(results.iter().any(Result::is_err));
    }

    #[test]
    fn recover_mode_tolerates_mismatched_end_tags() {
        let xml = r#"<xml><group_event id="1"><event id="10">Ok</event><event id="11">Broken</group_event></xml>"#;
        let results: Vec<_> = streamer_for(xml, true).collect();
        assert!(results.iter().all(Result::is_ok));
    }
}
