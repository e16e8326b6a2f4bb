//! Grantbook - resource-scoped grants for users, roles and anonymous visitors
//!
//! A static [`catalog`] says which actions are legal on each `(section, item)`.
//! On top of it:
//! - [`groups`] folds a subject's grants into editable groups with labels from
//!   [`resolver`]
//! - [`reconcile`] converges one subject's grants on one resource to a desired
//!   active / disabled / absent state
//! - [`provision`] creates grants in bulk over subjects and resources
//! - [`template`] diffs and applies built-in role templates
//! - [`export`] dumps a role's grants as JSON and loads such dumps back
//!
//! Persistence is behind the [`store`] traits, with an in-memory and an LMDB
//! implementation.

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod groups;
pub mod keys;
pub mod model;
pub mod provision;
pub mod reconcile;
pub mod resolver;
pub mod store;
pub mod template;

pub use config::StoreConfig;
pub use error::{GrantError, Result};
pub use export::{
    export_role_grants, import_role_grants, import_role_grants_in, preview_role_grants, RoleGrantsExport, RoleLoadPreview,
    RoleLoadReport,
};
pub use groups::{
    build_for_subject, search_grants, sort_subject_groups, GrantAction, GrantFilter, GrantGroup, GrantGroupBuilder, SortField,
    SubjectGrantGroup,
};
pub use keys::GrantKey;
pub use model::{
    Grant, Language, NewGrant, ResourceKind, ResourceRecord, ResourceRef, Role, RoleUpsert, RuleType, Subject, SubjectSpec,
};
pub use provision::{provision, GrantRow, ProvisionReport, Subjects};
pub use reconcile::{plan, reconcile, reconcile_in, Op, ReconcileReport, ReconcileRequest};
pub use resolver::{LabelContext, LabelStrategy, ResourceLabel, ResourcePathResolver};
pub use store::{LmdbStore, MemoryStore, StoreRead, StoreWrite, Transactional};
pub use template::{apply_template, diff_template, find_template, template_names, ApplyReport, TemplateDef, TemplateDiff};
