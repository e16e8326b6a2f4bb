//! Static catalog of legal actions per `(section, item)`.
//!
//! The catalog is the only authority on which grants are valid. Lookups never
//! fail: unknown pairs return `None` and callers surface them as unsupported.

use serde::Serialize;

use crate::error::{GrantError, Result};
use crate::model::item_id_value;

/// One compiled-in catalog row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub section: &'static str,
    pub item: &'static str,
    pub actions: &'static [&'static str],
    pub require_item_id: bool,
}

impl CatalogEntry {
    pub fn allows(&self, action: &str) -> bool {
        self.actions.contains(&action)
    }
}

const fn entry(section: &'static str, item: &'static str, actions: &'static [&'static str], require_item_id: bool) -> CatalogEntry {
    CatalogEntry { section, item, actions, require_item_id }
}

// Sorted by (section, item)
const ENTRIES: &[CatalogEntry] = &[
    entry("blogs", "", &["search"], false),
    entry("blogs", "entry", &["see", "view", "reply", "post", "edit"], false),
    entry("faq", "", &["search", "ask"], false),
    entry("faq", "category", &["see", "view"], true),
    entry("faq", "question", &["see", "view", "edit"], true),
    entry("faq", "question/answer", &["see"], false),
    entry("forum", "", &["search"], false),
    entry("forum", "category", &["see", "view"], true),
    entry("forum", "thread", &["see", "view", "reply", "edit"], true),
    entry("forum", "topic", &["see", "view", "reply", "post", "edit"], true),
    entry("imagebbs", "", &["search"], false),
    entry("imagebbs", "board", &["see", "view", "reply", "post", "approve"], true),
    entry("images", "upload", &["see", "view", "post"], false),
    entry("linker", "", &["search"], false),
    entry("linker", "category", &["see", "view", "post"], true),
    entry("linker", "link", &["see", "view", "reply", "approve"], true),
    entry("news", "post", &["see", "view", "reply", "post", "edit", "label"], false),
    entry("privateforum", "topic", &["see", "view", "reply", "post", "edit", "label"], false),
    entry("search", "", &["search"], false),
    entry("writing", "", &["search"], false),
    entry("writing", "article", &["see", "view", "reply", "edit"], true),
    entry("writing", "category", &["see", "view", "post"], true),
];

const ACTION_DESCRIPTIONS: &[(&str, &str)] = &[
    ("see", "Item is listed and its title is visible"),
    ("view", "Item content can be opened and read"),
    ("reply", "Comments can be added"),
    ("post", "New content can be created"),
    ("edit", "Existing content can be changed"),
    ("approve", "Queued submissions can be approved"),
    ("label", "Private labels can be applied"),
    ("search", "Section content appears in search"),
    ("ask", "Questions can be submitted"),
];

/// All catalog entries, ordered by section then item
pub fn entries() -> &'static [CatalogEntry] {
    ENTRIES
}

pub fn lookup(section: &str, item: &str) -> Option<&'static CatalogEntry> {
    ENTRIES.iter().find(|e| e.section == section && e.item == item)
}

/// Unknown pairs do not require an item id
pub fn is_require_item_id(section: &str, item: &str) -> bool {
    lookup(section, item).map(|e| e.require_item_id).unwrap_or(false)
}

/// True when the pair is catalogued and lists the action
pub fn is_valid_action(section: &str, item: &str, action: &str) -> bool {
    lookup(section, item).map(|e| e.allows(action)).unwrap_or(false)
}

pub fn describe(action: &str) -> &'static str {
    ACTION_DESCRIPTIONS
        .iter()
        .find(|(a, _)| *a == action)
        .map(|(_, d)| *d)
        .unwrap_or("")
}

/// Longest section, item, action or role name in bytes. Keeps every storage key
/// under LMDB's 511 byte key limit.
pub const MAX_NAME_LEN: usize = 128;

/// Reject a name longer than [`MAX_NAME_LEN`]
pub fn validate_name(field: &str, value: &str) -> Result<()> {
    if value.len() > MAX_NAME_LEN {
        return Err(GrantError::validation(format!(
            "{} is {} bytes, longest allowed is {}",
            field,
            value.len(),
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Reject an empty or oversized action name
pub fn validate_action(action: &str) -> Result<()> {
    if action.is_empty() {
        return Err(GrantError::validation("empty action name"));
    }
    validate_name("action", action)
}

/// Reject an empty or oversized section, an oversized item, or a missing
/// required item id.
pub fn validate_resource(section: &str, item: &str, item_id: Option<i32>) -> Result<()> {
    if section.is_empty() {
        return Err(GrantError::validation("missing section"));
    }
    validate_name("section", section)?;
    validate_name("item", item)?;
    if is_require_item_id(section, item) && item_id_value(item_id) == 0 {
        return Err(GrantError::validation(format!("{}|{} requires an item id", section, item)));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportAction {
    pub action: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportItem {
    pub item: String,
    pub require_item_id: bool,
    pub actions: Vec<ExportAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSection {
    pub section: String,
    pub items: Vec<ExportItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogExport {
    pub sections: Vec<ExportSection>,
}

/// Catalog grouped as sections, items and described actions
pub fn export() -> CatalogExport {
    let mut sections: Vec<ExportSection> = Vec::new();
    for e in ENTRIES {
        let item = ExportItem {
            item: e.item.to_string(),
            require_item_id: e.require_item_id,
            actions: e
                .actions
                .iter()
                .map(|a| ExportAction { action: a.to_string(), description: describe(a).to_string() })
                .collect(),
        };
        match sections.last_mut() {
            Some(s) if s.section == e.section => s.items.push(item),
            _ => sections.push(ExportSection { section: e.section.to_string(), items: vec![item] }),
        }
    }
    CatalogExport { sections }
}
