//! Row-level data model shared by the extractor, batch builder, and loader.

/// A parsed `<group_event>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: i64,
    pub name: Option<String>,
}

/// A parsed `<event>` element, always attached to the group that contained it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id: i64,
    pub group_id: i64,
    pub name: Option<String>,
}
