//! Validates a raw [`GroupSubtree`] and turns it into typed records.
//!
//! A group or event whose `id` attribute is missing or not a base-10
//! integer is dropped rather than failing the whole run: the caller
//! only needs to bump `skipped_records` and move on.

use crate::model::{EventRecord, GroupRecord};
use crate::xml::streamer::GroupSubtree;

/// Outcome of extracting one subtree: the group record (if its own id
/// was valid) paired with however many of its events survived
/// validation, plus a count of everything dropped along the way.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractResult {
    pub group: Option<GroupRecord>,
    pub events: Vec<EventRecord>,
    pub skipped: u32,
}

fn parse_id(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse::<i64>().ok()
}

/// Trims a name field and turns the empty-after-trim case into `None`,
/// matching both the group `name` attribute and the event's trimmed
/// text content.
fn clean_name(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == raw.len() {
        Some(raw)
    } else {
        Some(trimmed.to_string())
    }
}

/// Extracts a group record and its event records from one raw subtree.
///
/// If the group's own `id` is missing or unparseable, the whole
/// subtree -- group and every event underneath it -- is skipped, since
/// an event record is meaningless without a valid `group_event_id` to
/// attach it to.
pub fn extract(subtree: GroupSubtree) -> ExtractResult {
    let Some(group_id) = parse_id(subtree.id_attr.as_deref()) else {
        return ExtractResult {
            group: None,
            events: Vec::new(),
            skipped: 1,
        };
    };

    let mut events = Vec::with_capacity(subtree.events.len());
    let mut skipped = 0;
    for raw in subtree.events {
        match parse_id(raw.id_attr.as_deref()) {
            Some(event_id) => events.push(EventRecord {
                id: event_id,
                group_id,
                name: clean_name(raw.text),
            }),
            None => skipped += 1,
        }
    }

    ExtractResult {
        group: Some(GroupRecord {
            id: group_id,
            name: clean_name(subtree.name_attr),
        }),
        events,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::streamer::RawEvent;

    fn subtree(id: Option<&str>, name: Option<&str>, events: Vec<RawEvent>) -> GroupSubtree {
        GroupSubtree {
            id_attr: id.map(String::from),
            name_attr: name.map(String::from),
            events,
        }
    }

    #[test]
    fn valid_group_and_events_all_survive() {
        let st = subtree(
            Some("1"),
            Some("G1"),
            vec![
                RawEvent { id_attr: Some("10".into()), text: Some("Ten".into()) },
                RawEvent { id_attr: Some("11".into()), text: None },
            ],
        );
        let result = extract(st);
        assert_eq!(result.group, Some(GroupRecord { id: 1, name: Some("G1".into()) }));
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[0].group_id, 1);
        assert_eq!(result.skipped, 0);
    }

    #[test]
    fn missing_group_id_skips_group_and_all_its_events() {
        let st = subtree(
            None,
            Some("G1"),
            vec![RawEvent { id_attr: Some("10".into()), text: None }],
        );
        let result = extract(st);
        assert_eq!(result.group, None);
        assert!(result.events.is_empty());
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn non_numeric_group_id_is_treated_as_missing() {
        let st = subtree(Some("not-a-number"), None, vec![]);
        let result = extract(st);
        assert_eq!(result.group, None);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn event_with_bad_id_is_dropped_but_group_and_siblings_survive() {
        let st = subtree(
            Some("1"),
            None,
            vec![
                RawEvent { id_attr: Some("10".into()), text: None },
                RawEvent { id_attr: None, text: Some("orphan".into()) },
                RawEvent { id_attr: Some("bad".into()), text: None },
            ],
        );
        let result = extract(st);
        assert!(result.group.is_some());
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.skipped, 2);
    }

    #[test]
    fn group_with_no_name_attribute_is_still_valid() {
        let st = subtree(Some("5"), None, vec![]);
        let result = extract(st);
        assert_eq!(result.group, Some(GroupRecord { id: 5, name: None }));
    }

    #[test]
    fn whitespace_only_name_becomes_absent() {
        let st = subtree(
            Some("1"),
            Some("   "),
            vec![RawEvent { id_attr: Some("10".into()), text: Some("  \t \n ".into()) }],
        );
        let result = extract(st);
        assert_eq!(result.group.unwrap().name, None);
        assert_eq!(result.events[0].name, None);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed_from_names() {
        let st = subtree(
            Some("1"),
            Some("  G1  "),
            vec![RawEvent { id_attr: Some("10".into()), text: Some(" Ten \n".into()) }],
        );
        let result = extract(st);
        assert_eq!(result.group.unwrap().name, Some("G1".to_string()));
        assert_eq!(result.events[0].name, Some("Ten".to_string()));
    }
}
