//! Human-readable labels for grant resources.
//!
//! Each `(section, item)` pair maps to a [`LabelStrategy`]. Strategies share a
//! [`LabelContext`] that loads category trees, languages and roles at most once
//! per batch. Store failures are logged and leave the label empty: labels are
//! cosmetic and never fail the caller.

use std::collections::{HashMap, HashSet};

use crate::model::{Grant, ResourceKind, ResourceRecord, Role};
use crate::store::StoreRead;

/// Longest FAQ question excerpt before it is cut
pub const EXCERPT_LEN: usize = 40;

/// Resolved label for one grant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLabel {
    pub info: String,
    pub link: String,
}

impl ResourceLabel {
    pub fn info(info: String) -> Self {
        ResourceLabel { info, link: String::new() }
    }
}

/// Parent pointers and titles for one hierarchical resource kind.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: HashMap<i32, (Option<i32>, String)>,
}

impl CategoryTree {
    pub fn from_records(records: &[ResourceRecord]) -> Self {
        let nodes = records
            .iter()
            .map(|r| (r.id, (r.parent_id.filter(|p| *p != 0), r.title.clone())))
            .collect();
        CategoryTree { nodes }
    }

    /// Root-to-leaf titles joined with `/`.
    ///
    /// The walk stops at a missing node, after visiting every node once, or when
    /// it meets a node it has already seen. A cyclic graph yields the partial path
    /// collected before the repeat.
    pub fn path(&self, id: i32) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = Some(id).filter(|id| *id != 0);
        let bound = self.nodes.len() + 1;
        while let Some(cid) = cur {
            if !seen.insert(cid) || seen.len() > bound {
                tracing::warn!(category = cid, start = id, "category parent cycle");
                break;
            }
            let Some((parent, title)) = self.nodes.get(&cid) else {
                break;
            };
            parts.push(title);
            cur = *parent;
        }
        parts.reverse();
        parts.join("/")
    }
}

/// Per-batch lookup cache over a store.
pub struct LabelContext<'s> {
    store: &'s dyn StoreRead,
    trees: HashMap<ResourceKind, CategoryTree>,
    languages: Option<HashMap<i32, String>>,
    roles: Option<Vec<Role>>,
}

impl<'s> LabelContext<'s> {
    pub fn new(store: &'s dyn StoreRead) -> Self {
        LabelContext { store, trees: HashMap::new(), languages: None, roles: None }
    }

    /// Category tree for `kind`, fetched on first use
    pub fn tree(&mut self, kind: ResourceKind) -> &CategoryTree {
        let store = self.store;
        self.trees.entry(kind).or_insert_with(|| match store.list_resources(kind) {
            Ok(records) => CategoryTree::from_records(&records),
            Err(e) => {
                tracing::warn!(kind = kind.as_str(), error = %e, "category lookup failed");
                CategoryTree::default()
            }
        })
    }

    pub fn resource(&mut self, kind: ResourceKind, id: i32) -> Option<ResourceRecord> {
        match self.store.get_resource(kind, id) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(kind = kind.as_str(), id, error = %e, "resource lookup failed");
                None
            }
        }
    }

    /// Language name, empty when unknown
    pub fn language(&mut self, id: Option<i32>) -> Option<&str> {
        let store = self.store;
        let langs: &HashMap<i32, String> = self.languages.get_or_insert_with(|| match store.list_languages() {
            Ok(l) => l.into_iter().map(|l| (l.id, l.name)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "language lookup failed");
                HashMap::new()
            }
        });
        id.and_then(move |id| langs.get(&id)).map(String::as_str).filter(|s| !s.is_empty())
    }

    fn roles(&mut self) -> &[Role] {
        let store = self.store;
        self.roles.get_or_insert_with(|| match store.list_roles() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "role lookup failed");
                Vec::new()
            }
        })
    }

    pub fn role_named(&mut self, name: &str) -> Option<&Role> {
        self.roles().iter().find(|r| r.name == name)
    }

    pub fn role_by_id(&mut self, id: i32) -> Option<&Role> {
        self.roles().iter().find(|r| r.id == id)
    }
}

/// Builds the label for grants of one `(section, item)` pair.
pub trait LabelStrategy: Send + Sync {
    fn label(&self, cx: &mut LabelContext<'_>, grant: &Grant) -> ResourceLabel;
}

fn grant_link(path: &str, item_id: i32, grant_id: i32) -> String {
    format!("/admin/{}/{}/grants#g{}", path, item_id, grant_id)
}

/// Full category path, e.g. `General/Announcements`
pub struct CategoryPath {
    pub kind: ResourceKind,
    /// Admin path segment for the link, such as `forum/category`
    pub link: Option<&'static str>,
}

impl LabelStrategy for CategoryPath {
    fn label(&self, cx: &mut LabelContext<'_>, grant: &Grant) -> ResourceLabel {
        let id = grant.item_id_value();
        ResourceLabel {
            info: cx.tree(self.kind).path(id),
            link: self.link.map(|l| grant_link(l, id, grant.id)).unwrap_or_default(),
        }
    }
}

fn with_category(cx: &mut LabelContext<'_>, text: String, category: Option<i32>) -> String {
    let cat = category.map(|c| cx.tree(ResourceKind::ForumCategory).path(c)).unwrap_or_default();
    if cat.is_empty() {
        text
    } else {
        format!("{} ({})", text, cat)
    }
}

/// Forum topic title followed by its category path
pub struct TopicLabel;

impl LabelStrategy for TopicLabel {
    fn label(&self, cx: &mut LabelContext<'_>, grant: &Grant) -> ResourceLabel {
        let id = grant.item_id_value();
        let info = match cx.resource(ResourceKind::ForumTopic, id) {
            Some(t) if !t.title.is_empty() => with_category(cx, t.title, t.parent_id),
            _ => String::new(),
        };
        ResourceLabel { info, link: grant_link("forum/topic", id, grant.id) }
    }
}

/// Owning topic title marked as a thread, followed by the category path
pub struct ThreadLabel;

impl LabelStrategy for ThreadLabel {
    fn label(&self, cx: &mut LabelContext<'_>, grant: &Grant) -> ResourceLabel {
        let topic = cx
            .resource(ResourceKind::ForumThread, grant.item_id_value())
            .and_then(|th| th.parent_id)
            .and_then(|tid| cx.resource(ResourceKind::ForumTopic, tid));
        match topic {
            Some(t) if !t.title.is_empty() => {
                let text = format!("{} thread", t.title);
                ResourceLabel::info(with_category(cx, text, t.parent_id))
            }
            _ => ResourceLabel::default(),
        }
    }
}

/// Single record title, optionally cut and prefixed with `[language]`
pub struct FlatTitle {
    pub kind: ResourceKind,
    pub excerpt: Option<usize>,
    pub language: bool,
    pub link: Option<&'static str>,
}

impl FlatTitle {
    pub fn plain(kind: ResourceKind) -> Self {
        FlatTitle { kind, excerpt: None, language: false, link: None }
    }
}

impl LabelStrategy for FlatTitle {
    fn label(&self, cx: &mut LabelContext<'_>, grant: &Grant) -> ResourceLabel {
        let id = grant.item_id_value();
        let link = self.link.map(|l| grant_link(l, id, grant.id)).unwrap_or_default();
        let Some(rec) = cx.resource(self.kind, id) else {
            return ResourceLabel { info: String::new(), link };
        };
        let mut text = rec.title;
        if let Some(max) = self.excerpt {
            text = excerpt(&text, max);
        }
        if !text.is_empty() && self.language {
            if let Some(lang) = cx.language(rec.language_id) {
                text = format!("[{}] {}", lang, text);
            }
        }
        ResourceLabel { info: text, link }
    }
}

/// Cut `text` to `max` characters, marking the cut with `...`
pub fn excerpt(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((at, _)) => format!("{}...", &text[..at]),
        None => text.to_string(),
    }
}

/// Grants in the `role` section name a role in `action`; they link to it.
pub struct RoleLink;

impl LabelStrategy for RoleLink {
    fn label(&self, cx: &mut LabelContext<'_>, grant: &Grant) -> ResourceLabel {
        if grant.action.is_empty() {
            return ResourceLabel::default();
        }
        match cx.role_named(&grant.action) {
            Some(role) => ResourceLabel {
                info: String::new(),
                link: format!("/admin/role/{}#g{}", role.id, grant.id),
            },
            None => ResourceLabel::default(),
        }
    }
}

/// Registered label strategies keyed by `section|item`.
///
/// An item of `*` registers a fallback for every item in the section.
pub struct ResourcePathResolver {
    strategies: HashMap<String, Box<dyn LabelStrategy>>,
}

fn strategy_key(section: &str, item: &str) -> String {
    format!("{}|{}", section, item)
}

impl ResourcePathResolver {
    /// Resolver with no strategies; every label is empty
    pub fn empty() -> Self {
        ResourcePathResolver { strategies: HashMap::new() }
    }

    pub fn new() -> Self {
        use ResourceKind::*;

        let mut r = Self::empty();
        r.register("forum", "category", CategoryPath { kind: ForumCategory, link: Some("forum/category") });
        r.register("forum", "topic", TopicLabel);
        r.register("forum", "thread", ThreadLabel);
        r.register("linker", "category", CategoryPath { kind: LinkerCategory, link: Some("linker/category") });
        r.register("linker", "link", FlatTitle::plain(LinkerLink));
        r.register("writing", "category", CategoryPath { kind: WritingCategory, link: Some("writing/category") });
        r.register("writing", "article", FlatTitle { kind: WritingArticle, excerpt: None, language: true, link: None });
        r.register("faq", "category", FlatTitle::plain(FaqCategory));
        for item in ["question", "question/answer"] {
            r.register(
                "faq",
                item,
                FlatTitle { kind: FaqQuestion, excerpt: Some(EXCERPT_LEN), language: true, link: None },
            );
        }
        r.register("imagebbs", "board", FlatTitle::plain(ImageBoard));
        r.register("role", "*", RoleLink);
        r
    }

    pub fn register(&mut self, section: &str, item: &str, strategy: impl LabelStrategy + 'static) {
        self.strategies.insert(strategy_key(section, item), Box::new(strategy));
    }

    fn strategy(&self, section: &str, item: &str) -> Option<&dyn LabelStrategy> {
        self.strategies
            .get(&strategy_key(section, item))
            .or_else(|| self.strategies.get(&strategy_key(section, "*")))
            .map(|s| s.as_ref())
    }

    /// Label for one grant. Instance-scoped strategies need a non-zero item id.
    pub fn resolve(&self, cx: &mut LabelContext<'_>, grant: &Grant) -> ResourceLabel {
        let Some(strategy) = self.strategy(&grant.section, &grant.item) else {
            return ResourceLabel::default();
        };
        if grant.item_id_value() == 0 && grant.section != "role" {
            return ResourceLabel::default();
        }
        strategy.label(cx, grant)
    }
}

impl Default for ResourcePathResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(records: &[(i32, Option<i32>, &str)]) -> CategoryTree {
        let recs: Vec<ResourceRecord> = records
            .iter()
            .map(|(id, parent, title)| ResourceRecord {
                id: *id,
                title: title.to_string(),
                parent_id: *parent,
                language_id: None,
            })
            .collect();
        CategoryTree::from_records(&recs)
    }

    #[test]
    fn path_walks_to_root() {
        let t = tree(&[(1, None, "General"), (2, Some(1), "Announcements"), (3, Some(2), "Old")]);
        assert_eq!(t.path(3), "General/Announcements/Old");
        assert_eq!(t.path(1), "General");
        assert_eq!(t.path(0), "");
        assert_eq!(t.path(99), "");
    }

    #[test]
    fn path_stops_at_missing_parent() {
        let t = tree(&[(2, Some(7), "Orphan")]);
        assert_eq!(t.path(2), "Orphan");
    }

    #[test]
    fn path_terminates_on_cycle() {
        let t = tree(&[(1, Some(3), "A"), (2, Some(1), "B"), (3, Some(2), "C")]);
        assert_eq!(t.path(3), "A/B/C");
        let self_loop = tree(&[(5, Some(5), "Loop")]);
        assert_eq!(self_loop.path(5), "Loop");
    }

    #[test]
    fn excerpt_cuts_on_char_boundary() {
        assert_eq!(excerpt("short", 40), "short");
        let long = "é".repeat(45);
        let cut = excerpt(&long, 40);
        assert_eq!(cut.chars().count(), 43);
        assert!(cut.ends_with("..."));
        assert_eq!(excerpt(&"x".repeat(40), 40), "x".repeat(40));
    }
}
