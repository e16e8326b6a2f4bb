//! Grant, role and resource records shared by every component

use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::error::{GrantError, Result};
use crate::store::StoreRead;

/// Who a grant applies to. Exactly one of three, enforced by the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    User(i32),
    Role(i32),
    Anyone,
}

impl Subject {
    /// Short tag used as the first part of subject-scoped storage keys
    pub fn tag(&self) -> String {
        match self {
            Subject::User(id) => format!("u:{}", id),
            Subject::Role(id) => format!("r:{}", id),
            Subject::Anyone => "*".to_string(),
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::User(id) => write!(f, "user {}", id),
            Subject::Role(id) => write!(f, "role {}", id),
            Subject::Anyone => f.write_str("anyone"),
        }
    }
}

/// A subject as typed by a user: `user:ID`, `role:ID`, `role:NAME` or `anyone`.
///
/// A numeric value after `role:` is always an id. A role whose name is all
/// digits can only be addressed by its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectSpec {
    Subject(Subject),
    RoleName(String),
}

impl std::str::FromStr for SubjectSpec {
    type Err = GrantError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "anyone" {
            return Ok(SubjectSpec::Subject(Subject::Anyone));
        }
        let bad = || GrantError::validation(format!("bad subject {:?}, expected user:ID, role:ID, role:NAME or anyone", s));
        let (kind, value) = s.split_once(':').ok_or_else(bad)?;
        match kind {
            "user" => value.parse().map(|id| SubjectSpec::Subject(Subject::User(id))).map_err(|_| bad()),
            "role" if value.is_empty() => Err(bad()),
            "role" => Ok(match value.parse() {
                Ok(id) => SubjectSpec::Subject(Subject::Role(id)),
                Err(_) => SubjectSpec::RoleName(value.to_string()),
            }),
            _ => Err(bad()),
        }
    }
}

impl SubjectSpec {
    /// Look up a role name; ids pass through unchecked.
    pub fn resolve(&self, store: &dyn StoreRead) -> Result<Subject> {
        match self {
            SubjectSpec::Subject(s) => Ok(*s),
            SubjectSpec::RoleName(name) => store
                .get_role_by_name(name)?
                .map(|r| Subject::Role(r.id))
                .ok_or_else(|| GrantError::NotFound(format!("role {:?}", name))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    #[default]
    Allow,
}

/// Normalize an optional item id: unset and zero are the same value.
#[inline]
pub fn item_id_value(item_id: Option<i32>) -> i32 {
    item_id.unwrap_or(0)
}

/// One stored authorization row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: i32,
    pub subject: Subject,
    pub section: String,
    pub item: String,
    pub item_id: Option<i32>,
    pub action: String,
    #[serde(default)]
    pub rule_type: RuleType,
    pub active: bool,
}

impl Grant {
    pub fn resource(&self) -> ResourceRef {
        ResourceRef::new(&self.section, &self.item, self.item_id)
    }

    pub fn key(&self) -> crate::keys::GrantKey {
        crate::keys::GrantKey::new(&self.section, &self.item, &self.action, self.item_id_value())
    }

    pub fn item_id_value(&self) -> i32 {
        item_id_value(self.item_id)
    }
}

/// A grant row before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGrant {
    pub subject: Subject,
    pub section: String,
    pub item: String,
    pub item_id: Option<i32>,
    pub action: String,
    pub rule_type: RuleType,
    pub active: bool,
}

impl NewGrant {
    pub fn new(subject: Subject, resource: &ResourceRef, action: &str, active: bool) -> Self {
        NewGrant {
            subject,
            section: resource.section.clone(),
            item: resource.item.clone(),
            item_id: resource.item_id,
            action: action.to_string(),
            rule_type: RuleType::Allow,
            active,
        }
    }

    pub fn into_grant(self, id: i32) -> Grant {
        Grant {
            id,
            subject: self.subject,
            section: self.section,
            item: self.item,
            item_id: self.item_id,
            action: self.action,
            rule_type: self.rule_type,
            active: self.active,
        }
    }

    pub fn key(&self) -> crate::keys::GrantKey {
        crate::keys::GrantKey::new(&self.section, &self.item, &self.action, item_id_value(self.item_id))
    }

    /// Name checks every store runs before building the grant's keys
    pub fn check_names(&self) -> Result<()> {
        catalog::validate_name("section", &self.section)?;
        catalog::validate_name("item", &self.item)?;
        catalog::validate_action(&self.action)
    }
}

/// `(section, item, item_id)`: the resource a grant is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub section: String,
    pub item: String,
    pub item_id: Option<i32>,
}

impl ResourceRef {
    pub fn new(section: &str, item: &str, item_id: Option<i32>) -> Self {
        ResourceRef {
            section: section.to_string(),
            item: item.to_string(),
            item_id: item_id.filter(|id| *id != 0),
        }
    }

    /// True when the grant targets this resource (unset and zero ids match).
    pub fn matches(&self, grant: &Grant) -> bool {
        grant.section == self.section
            && grant.item == self.item
            && grant.item_id_value() == item_id_value(self.item_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i32,
    pub name: String,
    pub can_login: bool,
    pub is_admin: bool,
    pub private_labels: bool,
}

/// Role properties written by an upsert, matched on `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpsert {
    pub name: String,
    pub can_login: bool,
    pub is_admin: bool,
    pub private_labels: bool,
}

/// Resource types the label resolver can look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ForumCategory,
    /// `parent_id` is the owning forum category
    ForumTopic,
    /// `parent_id` is the owning forum topic
    ForumThread,
    LinkerCategory,
    LinkerLink,
    WritingCategory,
    WritingArticle,
    FaqCategory,
    FaqQuestion,
    ImageBoard,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ForumCategory => "forum_category",
            ResourceKind::ForumTopic => "forum_topic",
            ResourceKind::ForumThread => "forum_thread",
            ResourceKind::LinkerCategory => "linker_category",
            ResourceKind::LinkerLink => "linker_link",
            ResourceKind::WritingCategory => "writing_category",
            ResourceKind::WritingArticle => "writing_article",
            ResourceKind::FaqCategory => "faq_category",
            ResourceKind::FaqQuestion => "faq_question",
            ResourceKind::ImageBoard => "image_board",
        }
    }
}

/// Minimal projection of a labelled resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: i32,
    pub title: String,
    #[serde(default)]
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub language_id: Option<i32>,
}

impl ResourceRecord {
    pub fn new(id: i32, title: &str) -> Self {
        ResourceRecord { id, title: title.to_string(), parent_id: None, language_id: None }
    }

    pub fn with_parent(mut self, parent_id: i32) -> Self {
        self.parent_id = Some(parent_id).filter(|p| *p != 0);
        self
    }

    pub fn with_language(mut self, language_id: i32) -> Self {
        self.language_id = Some(language_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: i32,
    pub name: String,
}
