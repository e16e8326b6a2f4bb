//! Grant groups for the grants editor.
//!
//! Raw grant rows for one subject are folded into one group per
//! `(section, item, item_id)` with their actions split into `have` (active),
//! `disabled` (inactive) and `available` (catalog actions in neither). Pairs or
//! actions missing from the catalog stay visible, flagged `unsupported`.
//!
//! [`search_grants`] is the cross-subject view: grants of every subject matching
//! a [`GrantFilter`], grouped by subject and resource.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::error::Result;
use crate::model::{Grant, Subject};
use crate::resolver::{LabelContext, ResourcePathResolver};
use crate::store::StoreRead;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantAction {
    /// Stored grant id, so unsupported rows can still be deleted
    pub id: i32,
    pub name: String,
    pub unsupported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantGroup {
    pub section: String,
    pub item: String,
    pub item_id: Option<i32>,
    pub link: String,
    pub info: String,
    pub have: Vec<GrantAction>,
    pub disabled: Vec<GrantAction>,
    pub available: Vec<String>,
    pub unsupported: bool,
}

impl GrantGroup {
    fn empty(section: &str, item: &str, item_id: i32) -> Self {
        GrantGroup {
            section: section.to_string(),
            item: item.to_string(),
            item_id: Some(item_id).filter(|id| *id != 0),
            link: String::new(),
            info: String::new(),
            have: Vec::new(),
            disabled: Vec::new(),
            available: Vec::new(),
            unsupported: false,
        }
    }

    /// Names of every stored action in the group
    pub fn stored_actions(&self) -> impl Iterator<Item = &str> {
        self.have.iter().chain(self.disabled.iter()).map(|a| a.name.as_str())
    }
}

/// Builds grant groups, resolving labels through its resolver.
pub struct GrantGroupBuilder<'r> {
    resolver: &'r ResourcePathResolver,
}

impl<'r> GrantGroupBuilder<'r> {
    pub fn new(resolver: &'r ResourcePathResolver) -> Self {
        GrantGroupBuilder { resolver }
    }

    /// Group `grants`, which should all belong to one subject.
    ///
    /// Label lookups that fail leave `info` and `link` empty; the result is
    /// otherwise a pure function of the grants and the catalog.
    pub fn build(&self, store: &dyn StoreRead, grants: &[Grant]) -> Vec<GrantGroup> {
        let mut cx = LabelContext::new(store);
        let mut groups: BTreeMap<(String, String, i32), GrantGroup> = BTreeMap::new();

        for g in grants {
            let item_id = g.item_id_value();
            if item_id == 0 && catalog::is_require_item_id(&g.section, &g.item) {
                tracing::debug!(grant = g.id, section = %g.section, item = %g.item, "skipping grant without item id");
                continue;
            }
            let entry = catalog::lookup(&g.section, &g.item);
            let group = groups
                .entry((g.section.clone(), g.item.clone(), item_id))
                .or_insert_with(|| {
                    let label = self.resolver.resolve(&mut cx, g);
                    let mut grp = GrantGroup::empty(&g.section, &g.item, item_id);
                    grp.info = label.info;
                    grp.link = label.link;
                    grp
                });
            let action = GrantAction {
                id: g.id,
                name: g.action.clone(),
                unsupported: !entry.map(|e| e.allows(&g.action)).unwrap_or(false),
            };
            if g.active {
                group.have.push(action);
            } else {
                group.disabled.push(action);
            }
        }

        for e in catalog::entries().iter().filter(|e| !e.require_item_id) {
            groups
                .entry((e.section.to_string(), e.item.to_string(), 0))
                .or_insert_with(|| GrantGroup::empty(e.section, e.item, 0));
        }

        groups
            .into_values()
            .map(|mut grp| {
                match catalog::lookup(&grp.section, &grp.item) {
                    Some(e) => {
                        grp.available = e
                            .actions
                            .iter()
                            .filter(|a| !grp.stored_actions().any(|s| s == **a))
                            .map(|a| a.to_string())
                            .collect();
                    }
                    None => grp.unsupported = true,
                }
                grp
            })
            .collect()
    }

    /// Fetch one subject's grants and group them. Enumeration failures abort.
    pub fn build_for_subject(&self, store: &dyn StoreRead, subject: Subject) -> Result<Vec<GrantGroup>> {
        let grants = store.list_grants(subject)?;
        Ok(self.build(store, &grants))
    }
}

/// Which grants a cross-subject listing shows. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantFilter {
    pub section: Option<String>,
    /// `Some("")` matches section-wide grants only
    pub item: Option<String>,
    /// Zero matches grants without an item id
    pub item_id: Option<i32>,
    pub user_id: Option<i32>,
    /// Substring of the role name
    pub role: Option<String>,
    /// Only grants that apply to anyone
    pub anyone: bool,
    pub active: Option<bool>,
}

impl GrantFilter {
    fn subject_matches(&self, subject: Subject, role_ids: Option<&HashSet<i32>>) -> bool {
        if self.anyone && subject != Subject::Anyone {
            return false;
        }
        if let Some(uid) = self.user_id {
            if subject != Subject::User(uid) {
                return false;
            }
        }
        match (role_ids, subject) {
            (None, _) => true,
            (Some(ids), Subject::Role(id)) => ids.contains(&id),
            (Some(_), _) => false,
        }
    }

    fn matches(&self, g: &Grant, role_ids: Option<&HashSet<i32>>) -> bool {
        self.subject_matches(g.subject, role_ids)
            && self.section.as_ref().map_or(true, |s| *s == g.section)
            && self.item.as_ref().map_or(true, |i| *i == g.item)
            && self.item_id.map_or(true, |id| id == g.item_id_value())
            && self.active.map_or(true, |a| a == g.active)
    }
}

/// Column a cross-subject listing is ordered by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Lowest grant id in the group
    #[default]
    Id,
    User,
    Role,
    Section,
    Item,
    ItemId,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "id" => Ok(SortField::Id),
            "user" => Ok(SortField::User),
            "role" => Ok(SortField::Role),
            "section" => Ok(SortField::Section),
            "item" => Ok(SortField::Item),
            "item_id" => Ok(SortField::ItemId),
            _ => Err(format!("unknown sort field {:?}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectGrantAction {
    pub id: i32,
    pub name: String,
    pub active: bool,
}

/// Grants of one subject on one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectGrantGroup {
    /// Lowest grant id in the group
    pub id: i32,
    pub subject: Subject,
    /// Name of the role subject, empty when unknown or not a role
    pub role_name: String,
    pub section: String,
    pub item: String,
    pub item_id: Option<i32>,
    pub link: String,
    pub info: String,
    pub actions: Vec<SubjectGrantAction>,
}

impl SubjectGrantGroup {
    fn user_id(&self) -> Option<i32> {
        match self.subject {
            Subject::User(id) => Some(id),
            _ => None,
        }
    }
}

/// Stable sort of `groups` by `field`, descending when `desc`
pub fn sort_subject_groups(groups: &mut [SubjectGrantGroup], field: SortField, desc: bool) {
    let cmp = |a: &SubjectGrantGroup, b: &SubjectGrantGroup| -> Ordering {
        match field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::User => a.user_id().cmp(&b.user_id()),
            SortField::Role => a.role_name.cmp(&b.role_name),
            SortField::Section => a.section.cmp(&b.section),
            SortField::Item => a.item.cmp(&b.item),
            SortField::ItemId => a.item_id.unwrap_or(0).cmp(&b.item_id.unwrap_or(0)),
        }
    };
    if desc {
        groups.sort_by(|a, b| cmp(b, a));
    } else {
        groups.sort_by(cmp);
    }
}

impl GrantGroupBuilder<'_> {
    /// Group grants of any subjects by `(subject, section, item, item_id)`.
    ///
    /// Groups keep the order of their first grant in `grants`; actions keep input
    /// order. Labels come from the group's first grant.
    pub fn group_by_subject(&self, store: &dyn StoreRead, grants: &[Grant]) -> Vec<SubjectGrantGroup> {
        let mut cx = LabelContext::new(store);
        let mut groups: Vec<SubjectGrantGroup> = Vec::new();
        let mut index: HashMap<(Subject, &str, &str, i32), usize> = HashMap::new();

        for g in grants {
            let key = (g.subject, g.section.as_str(), g.item.as_str(), g.item_id_value());
            let at = match index.get(&key) {
                Some(at) => *at,
                None => {
                    let label = self.resolver.resolve(&mut cx, g);
                    let role_name = match g.subject {
                        Subject::Role(id) => cx.role_by_id(id).map(|r| r.name.clone()).unwrap_or_default(),
                        _ => String::new(),
                    };
                    groups.push(SubjectGrantGroup {
                        id: g.id,
                        subject: g.subject,
                        role_name,
                        section: g.section.clone(),
                        item: g.item.clone(),
                        item_id: Some(g.item_id_value()).filter(|id| *id != 0),
                        link: label.link,
                        info: label.info,
                        actions: Vec::new(),
                    });
                    index.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };
            let grp = &mut groups[at];
            grp.id = grp.id.min(g.id);
            grp.actions.push(SubjectGrantAction { id: g.id, name: g.action.clone(), active: g.active });
        }
        groups
    }

    /// Grants of every subject matching `filter`, grouped and ordered by id.
    pub fn search(&self, store: &dyn StoreRead, filter: &GrantFilter) -> Result<Vec<SubjectGrantGroup>> {
        let role_ids: Option<HashSet<i32>> = match &filter.role {
            Some(part) => Some(
                store
                    .list_roles()?
                    .into_iter()
                    .filter(|r| r.name.contains(part.as_str()))
                    .map(|r| r.id)
                    .collect(),
            ),
            None => None,
        };
        let grants: Vec<Grant> = store
            .list_all_grants()?
            .into_iter()
            .filter(|g| filter.matches(g, role_ids.as_ref()))
            .collect();
        Ok(self.group_by_subject(store, &grants))
    }
}

/// [`GrantGroupBuilder::search`] with the default resolver
pub fn search_grants(store: &dyn StoreRead, filter: &GrantFilter) -> Result<Vec<SubjectGrantGroup>> {
    GrantGroupBuilder::new(&ResourcePathResolver::new()).search(store, filter)
}

/// [`GrantGroupBuilder::build`] with the default resolver
pub fn build(store: &dyn StoreRead, grants: &[Grant]) -> Vec<GrantGroup> {
    GrantGroupBuilder::new(&ResourcePathResolver::new()).build(store, grants)
}

/// [`GrantGroupBuilder::build_for_subject`] with the default resolver
pub fn build_for_subject(store: &dyn StoreRead, subject: Subject) -> Result<Vec<GrantGroup>> {
    GrantGroupBuilder::new(&ResourcePathResolver::new()).build_for_subject(store, subject)
}
