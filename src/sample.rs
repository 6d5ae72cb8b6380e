//! Synthetic XML generator, for benchmarking and local testing. Not
//! part of the ingestion path.

use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes `groups` `<group_event>` elements, each with
/// `events_per_group` `<event>` children, to `out_path`.
///
/// Event ids increase monotonically across the whole file rather than
/// restarting per group, so the generated document exercises the same
/// global-uniqueness assumptions real data does.
pub fn generate_sample_xml(
    out_path: &Path,
    group_tag: &str,
    event_tag: &str,
    groups: u64,
    events_per_group: u64,
) -> std::io::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(out_path)?;
    let mut w = BufWriter::new(file);

    writeln!(w, "<xml>")?;

    let mut event_id = 1u64;
    for group_id in 1..=groups {
        writeln!(w, r#"  <{group_tag} id="{group_id}">"#)?;
        for _ in 0..events_per_group {
            writeln!(
                w,
                r#"    <{event_tag} id="{event_id}">Event {event_id}</{event_tag}>"#
            )?;
            event_id += 1;
        }
        writeln!(w, "  </{group_tag}>")?;
    }

    writeln!(w, "</xml>")?;
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_well_formed_parseable_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.xml");
        generate_sample_xml(&path, "group_event", "event", 3, 2).unwrap();

        let streamer = crate::xml::XmlStreamer::open(&path, "group_event", "event", false, false)
            .unwrap();
        let groups: Vec<_> = streamer.map(Result::unwrap).collect();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].events.len(), 2);
        assert_eq!(groups[0].events[0].id_attr.as_deref(), Some("1"));
        assert_eq!(groups[2].events[1].id_attr.as_deref(), Some("6"));
    }

    #[test]
    fn zero_groups_still_produces_a_valid_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xml");
        generate_sample_xml(&path, "group_event", "event", 0, 2).unwrap();
        let streamer = crate::xml::XmlStreamer::open(&path, "group_event", "event", false, false)
            .unwrap();
        assert_eq!(streamer.count(), 0);
    }
}
