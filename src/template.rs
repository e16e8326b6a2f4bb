//! Built-in role templates: explain, diff against live roles, apply.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::OnceLock;

use serde::Serialize;

use crate::catalog;
use crate::error::{GrantError, Result};
use crate::keys::GrantKey;
use crate::model::{NewGrant, ResourceRef, Role, RoleUpsert, Subject};
use crate::store::{StoreRead, StoreWrite, Transactional};

/// One grant a template role should hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GrantDef {
    pub section: &'static str,
    /// Empty for section-wide grants
    pub item: &'static str,
    pub action: &'static str,
    /// 0 for grants not tied to one resource
    pub item_id: i32,
}

impl GrantDef {
    const fn new(section: &'static str, item: &'static str, action: &'static str) -> Self {
        GrantDef { section, item, action, item_id: 0 }
    }

    pub fn key(&self) -> GrantKey {
        GrantKey::new(self.section, self.item, self.action, self.item_id)
    }

    pub fn resource(&self) -> ResourceRef {
        ResourceRef::new(self.section, self.item, Some(self.item_id))
    }
}

/// Role flags a template controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleProperties {
    pub can_login: bool,
    pub is_admin: bool,
    pub private_labels: bool,
}

impl RoleProperties {
    pub fn of(role: &Role) -> Self {
        RoleProperties { can_login: role.can_login, is_admin: role.is_admin, private_labels: role.private_labels }
    }

    /// `"field: old -> new"` for each differing flag
    pub fn changes_from(&self, current: &RoleProperties) -> Vec<String> {
        let fields = [
            ("can_login", current.can_login, self.can_login),
            ("is_admin", current.is_admin, self.is_admin),
            ("private_labels", current.private_labels, self.private_labels),
        ];
        fields
            .iter()
            .filter(|(_, old, new)| old != new)
            .map(|(name, old, new)| format!("{}: {} -> {}", name, old, new))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDef {
    pub name: &'static str,
    pub description: &'static str,
    pub can_login: bool,
    pub is_admin: bool,
    pub grants: Vec<GrantDef>,
}

impl RoleDef {
    /// Template roles that can log in also get private labels.
    pub fn properties(&self) -> RoleProperties {
        RoleProperties { can_login: self.can_login, is_admin: self.is_admin, private_labels: self.can_login }
    }

    pub fn upsert(&self) -> RoleUpsert {
        let p = self.properties();
        RoleUpsert {
            name: self.name.to_string(),
            can_login: p.can_login,
            is_admin: p.is_admin,
            private_labels: p.private_labels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateDef {
    pub name: &'static str,
    pub description: &'static str,
    pub roles: Vec<RoleDef>,
}

const NEWS_READER: [GrantDef; 2] = [GrantDef::new("news", "post", "see"), GrantDef::new("news", "post", "view")];
const NEWS_WRITER: [GrantDef; 3] = [
    GrantDef::new("news", "post", "post"),
    GrantDef::new("news", "post", "edit"),
    GrantDef::new("news", "post", "reply"),
];
const FAQ_READER: [GrantDef; 2] = [GrantDef::new("faq", "", "search"), GrantDef::new("faq", "question/answer", "see")];
const LABELLER: [GrantDef; 2] = [GrantDef::new("news", "post", "label"), GrantDef::new("privateforum", "topic", "label")];
const PRIVATE_READER: [GrantDef; 2] = [
    GrantDef::new("privateforum", "topic", "see"),
    GrantDef::new("privateforum", "topic", "view"),
];
const PRIVATE_WRITER: [GrantDef; 3] = [
    GrantDef::new("privateforum", "topic", "post"),
    GrantDef::new("privateforum", "topic", "reply"),
    GrantDef::new("privateforum", "topic", "edit"),
];

fn grants(parts: &[&[GrantDef]]) -> Vec<GrantDef> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}

fn role(name: &'static str, description: &'static str, can_login: bool, is_admin: bool, grants: Vec<GrantDef>) -> RoleDef {
    RoleDef { name, description, can_login, is_admin, grants }
}

fn builtin() -> BTreeMap<&'static str, TemplateDef> {
    let templates = [
        TemplateDef {
            name: "default",
            description: "Basic setup with minimal news access.",
            roles: vec![
                role("guest", "Read-only access to news.", false, false, grants(&[&NEWS_READER, &FAQ_READER])),
                role("user", "Basic user.", true, false, grants(&[&NEWS_READER, &FAQ_READER])),
                role(
                    "admin",
                    "Administrator with news management rights.",
                    true,
                    true,
                    grants(&[&NEWS_WRITER, &NEWS_READER, &FAQ_READER]),
                ),
            ],
        },
        TemplateDef {
            name: "simple-community",
            description: "Community setup with news, private forums, and labelling.",
            roles: vec![
                role("guest", "Read-only access to public sections.", false, false, grants(&[&NEWS_READER, &FAQ_READER])),
                role(
                    "user",
                    "Standard user with access to private forums and labelling.",
                    true,
                    false,
                    grants(&[&NEWS_READER, &LABELLER, &PRIVATE_READER, &FAQ_READER]),
                ),
                role(
                    "admin",
                    "Administrator with full access and content management rights.",
                    true,
                    true,
                    grants(&[&NEWS_WRITER, &NEWS_READER, &LABELLER, &PRIVATE_READER, &PRIVATE_WRITER, &FAQ_READER]),
                ),
                role("image-uploader", "Can upload images.", false, false, vec![GrantDef::new("images", "upload", "post")]),
            ],
        },
        TemplateDef {
            name: "news-only",
            description: "Setup focused solely on news publishing and reading.",
            roles: vec![
                role("guest", "News reader.", false, false, grants(&[&NEWS_READER])),
                role("editor", "News content creator.", true, false, grants(&[&NEWS_WRITER, &NEWS_READER])),
                role("admin", "Administrator.", true, true, grants(&[&NEWS_WRITER, &NEWS_READER])),
            ],
        },
        TemplateDef {
            name: "read-only",
            description: "Restrictive setup where almost everyone is a reader.",
            roles: vec![
                role("guest", "Global reader.", false, false, grants(&[&NEWS_READER, &PRIVATE_READER])),
                role("admin", "Administrator.", true, true, grants(&[&NEWS_READER, &PRIVATE_READER])),
            ],
        },
    ];
    templates.into_iter().map(|t| (t.name, t)).collect()
}

static TEMPLATES: OnceLock<BTreeMap<&'static str, TemplateDef>> = OnceLock::new();

fn registry() -> &'static BTreeMap<&'static str, TemplateDef> {
    TEMPLATES.get_or_init(builtin)
}

/// Built-in template names, sorted
pub fn template_names() -> Vec<&'static str> {
    registry().keys().copied().collect()
}

pub fn find_template(name: &str) -> Option<&'static TemplateDef> {
    registry().get(name)
}

/// Look up a template or fail with `NotFound`
pub fn require_template(name: &str) -> Result<&'static TemplateDef> {
    find_template(name).ok_or_else(|| GrantError::NotFound(format!("template {:?}", name)))
}

/// Plain-text description of a template's roles and grants
pub fn explain(t: &TemplateDef) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Template: {}", t.name);
    let _ = writeln!(out, "Description: {}\n", t.description);
    let _ = writeln!(out, "Roles Defined:");
    for r in &t.roles {
        let _ = writeln!(out, "  - {}: {}", r.name, r.description);
        let _ = writeln!(out, "    Login: {}, Admin: {}", r.can_login, r.is_admin);
        if r.grants.is_empty() {
            let _ = writeln!(out, "    (No Grants)");
        } else {
            let _ = writeln!(out, "    Grants:");
            for g in &r.grants {
                let item = if g.item.is_empty() { "*" } else { g.item };
                let _ = writeln!(out, "      - {} / {} / {} (ID: {})", g.section, item, g.action, g.item_id);
            }
        }
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleStatus {
    New,
    Updated,
    Matching,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDiff {
    pub name: String,
    pub status: RoleStatus,
    pub property_changes: Vec<String>,
    /// Grant keys rendered `section|item|action|item_id`, sorted
    pub grants_added: Vec<String>,
    pub grants_removed: Vec<String>,
    pub grants_unchanged: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateDiff {
    pub template: String,
    pub roles: Vec<RoleDiff>,
    pub new_roles: usize,
    pub updated_roles: usize,
    pub matching_roles: usize,
    pub grants_added: usize,
    pub grants_removed: usize,
}

fn rendered(keys: impl Iterator<Item = GrantKey>) -> Vec<String> {
    let mut v: Vec<String> = keys.map(|k| k.to_string()).collect();
    v.sort();
    v
}

fn diff_role(store: &dyn StoreRead, def: &RoleDef) -> Result<RoleDiff> {
    let desired: BTreeSet<GrantKey> = def.grants.iter().map(GrantDef::key).collect();
    let Some(live) = store.get_role_by_name(def.name)? else {
        return Ok(RoleDiff {
            name: def.name.to_string(),
            status: RoleStatus::New,
            property_changes: Vec::new(),
            grants_added: rendered(desired.into_iter()),
            grants_removed: Vec::new(),
            grants_unchanged: Vec::new(),
        });
    };

    let current: BTreeSet<GrantKey> = store.list_grants_by_role(live.id)?.iter().map(|g| g.key()).collect();
    let property_changes = def.properties().changes_from(&RoleProperties::of(&live));
    let added = rendered(desired.difference(&current).cloned());
    let removed = rendered(current.difference(&desired).cloned());
    let unchanged = rendered(desired.intersection(&current).cloned());
    let status = if added.is_empty() && removed.is_empty() && property_changes.is_empty() {
        RoleStatus::Matching
    } else {
        RoleStatus::Updated
    };
    Ok(RoleDiff {
        name: def.name.to_string(),
        status,
        property_changes,
        grants_added: added,
        grants_removed: removed,
        grants_unchanged: unchanged,
    })
}

/// Compare a valid template with live roles and their grants. Read-only.
pub fn diff_template(store: &dyn StoreRead, t: &TemplateDef) -> Result<TemplateDiff> {
    validate_template(t)?;
    let mut diff = TemplateDiff {
        template: t.name.to_string(),
        roles: Vec::with_capacity(t.roles.len()),
        new_roles: 0,
        updated_roles: 0,
        matching_roles: 0,
        grants_added: 0,
        grants_removed: 0,
    };
    for def in &t.roles {
        let r = diff_role(store, def)?;
        match r.status {
            RoleStatus::New => diff.new_roles += 1,
            RoleStatus::Updated => diff.updated_roles += 1,
            RoleStatus::Matching => diff.matching_roles += 1,
        }
        diff.grants_added += r.grants_added.len();
        diff.grants_removed += r.grants_removed.len();
        diff.roles.push(r);
    }
    Ok(diff)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub created_roles: Vec<String>,
    pub updated_roles: Vec<String>,
    pub grants_created: usize,
}

/// Every template grant must name a section and action and carry any item id
/// its catalog entry requires.
pub fn validate_template(t: &TemplateDef) -> Result<()> {
    for r in &t.roles {
        if r.name.is_empty() {
            return Err(GrantError::validation(format!("template {}: unnamed role", t.name)));
        }
        catalog::validate_name("role name", r.name)?;
        for g in &r.grants {
            catalog::validate_resource(g.section, g.item, Some(g.item_id))?;
            if g.action.is_empty() {
                return Err(GrantError::validation(format!("role {}: missing action", r.name)));
            }
            catalog::validate_action(g.action)?;
        }
    }
    Ok(())
}

/// Upsert each role, replace its grants with the template's, inside `tx`.
pub fn apply_template_in<W: StoreWrite + ?Sized>(tx: &mut W, t: &TemplateDef) -> Result<ApplyReport> {
    let mut report = ApplyReport::default();
    for def in &t.roles {
        let existed = tx.get_role_by_name(def.name)?.is_some();
        let role_id = tx.upsert_role(&def.upsert())?;
        if existed {
            report.updated_roles.push(def.name.to_string());
        } else {
            report.created_roles.push(def.name.to_string());
        }
        let removed = tx.delete_grants_by_role(role_id)?;
        let mut seen = BTreeSet::new();
        for g in def.grants.iter().filter(|g| seen.insert(g.key())) {
            tx.create_grant(NewGrant::new(Subject::Role(role_id), &g.resource(), g.action, true))?;
            report.grants_created += 1;
        }
        tracing::debug!(role = def.name, role_id, removed, "role grants replaced");
    }
    Ok(report)
}

/// Apply a template atomically: either every role and grant lands or none does.
pub fn apply_template<S: Transactional>(store: &S, t: &TemplateDef) -> Result<ApplyReport> {
    validate_template(t)?;
    let report = store.transact(|tx| apply_template_in(tx, t))?;
    tracing::info!(
        template = t.name,
        created = report.created_roles.len(),
        updated = report.updated_roles.len(),
        grants = report.grants_created,
        "template applied"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_sorted_and_valid() {
        assert_eq!(template_names(), vec!["default", "news-only", "read-only", "simple-community"]);
        for name in template_names() {
            let t = find_template(name).unwrap();
            validate_template(t).unwrap();
            for r in &t.roles {
                for g in &r.grants {
                    assert!(catalog::is_valid_action(g.section, g.item, g.action), "{} {:?}", r.name, g);
                }
            }
        }
        assert!(find_template("missing").is_none());
        assert!(matches!(require_template("missing"), Err(GrantError::NotFound(_))));
    }

    #[test]
    fn private_labels_follow_login() {
        let t = find_template("default").unwrap();
        let guest = &t.roles[0];
        assert!(!guest.properties().private_labels);
        assert!(t.roles[1].properties().private_labels);
    }

    #[test]
    fn property_changes_name_each_flag() {
        let want = RoleProperties { can_login: true, is_admin: false, private_labels: true };
        let have = RoleProperties { can_login: false, is_admin: false, private_labels: false };
        assert_eq!(
            want.changes_from(&have),
            vec!["can_login: false -> true".to_string(), "private_labels: false -> true".to_string()]
        );
        assert!(want.changes_from(&want).is_empty());
    }

    #[test]
    fn explain_lists_roles_and_grants() {
        let text = explain(find_template("news-only").unwrap());
        assert!(text.starts_with("Template: news-only\n"));
        assert!(text.contains("  - editor: News content creator."));
        assert!(text.contains("      - news / post / edit (ID: 0)"));
        let faq = explain(find_template("default").unwrap());
        assert!(faq.contains("faq / * / search"));
    }

    #[test]
    fn oversized_names_fail_validation() {
        let long: &'static str = Box::leak("x".repeat(catalog::MAX_NAME_LEN + 1).into_boxed_str());
        let mut t = find_template("read-only").unwrap().clone();
        t.roles[0].name = long;
        assert!(validate_template(&t).unwrap_err().is_validation());

        let mut t = find_template("read-only").unwrap().clone();
        t.roles[0].grants.push(GrantDef::new("news", "post", long));
        assert!(validate_template(&t).unwrap_err().is_validation());
    }
}
