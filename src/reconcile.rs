//! Three-state reconcile of one subject's grants on one resource.
//!
//! Each action is desired active, desired disabled, or absent (in neither set).
//! [`plan`] compares that against the stored rows and returns the writes needed
//! to converge; a second plan over the result is always empty.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog;
use crate::error::{GrantError, Result};
use crate::model::{Grant, NewGrant, ResourceRef, Subject};
use crate::store::{StoreWrite, Transactional};

/// Desired state for one subject on one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub subject: Subject,
    pub resource: ResourceRef,
    pub active: BTreeSet<String>,
    pub disabled: BTreeSet<String>,
}

impl ReconcileRequest {
    pub fn new(subject: Subject, resource: ResourceRef) -> Self {
        ReconcileRequest { subject, resource, active: BTreeSet::new(), disabled: BTreeSet::new() }
    }

    pub fn with_active<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.active.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn with_disabled<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.disabled.extend(actions.into_iter().map(Into::into));
        self
    }

    /// Shape checks only. Item id requirements are the caller's to enforce.
    pub fn validate(&self) -> Result<()> {
        if self.resource.section.is_empty() {
            return Err(GrantError::validation("missing section"));
        }
        catalog::validate_name("section", &self.resource.section)?;
        catalog::validate_name("item", &self.resource.item)?;
        self.active.iter().chain(&self.disabled).try_for_each(|a| catalog::validate_action(a))?;
        if let Some(a) = self.active.intersection(&self.disabled).next() {
            return Err(GrantError::validation(format!("action {} is both active and disabled", a)));
        }
        Ok(())
    }
}

/// One write the reconciler will issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Create { action: String, active: bool },
    SetActive { id: i32, action: String, active: bool },
    Delete { id: i32, action: String },
}

/// Write counts from one reconcile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub activated: usize,
    pub deactivated: usize,
    pub deleted: usize,
}

impl ReconcileReport {
    pub fn writes(&self) -> usize {
        self.created + self.activated + self.deactivated + self.deleted
    }
}

/// Writes that bring `existing` to the requested state.
///
/// Rows for other subjects or resources are ignored. When storage holds more
/// than one row for an action, the lowest id is kept and the rest deleted.
pub fn plan(existing: &[Grant], req: &ReconcileRequest) -> Vec<Op> {
    let mut by_action: BTreeMap<&str, Vec<&Grant>> = BTreeMap::new();
    for g in existing.iter().filter(|g| g.subject == req.subject && req.resource.matches(g)) {
        by_action.entry(g.action.as_str()).or_default().push(g);
    }
    for rows in by_action.values_mut() {
        rows.sort_by_key(|g| g.id);
    }

    let mut ops = Vec::new();
    let desired = req.active.iter().map(|a| (a, true)).chain(req.disabled.iter().map(|a| (a, false)));
    for (action, want) in desired {
        match by_action.get(action.as_str()).and_then(|rows| rows.first()) {
            None => ops.push(Op::Create { action: action.clone(), active: want }),
            Some(g) if g.active != want => {
                ops.push(Op::SetActive { id: g.id, action: action.clone(), active: want })
            }
            Some(_) => {}
        }
    }

    for (action, rows) in &by_action {
        let keep = req.active.contains(*action) || req.disabled.contains(*action);
        let skip = if keep { 1 } else { 0 };
        for g in rows.iter().skip(skip) {
            ops.push(Op::Delete { id: g.id, action: action.to_string() });
        }
    }
    ops
}

/// Apply `ops` for `req` through `tx`.
pub fn apply<W: StoreWrite + ?Sized>(tx: &mut W, req: &ReconcileRequest, ops: &[Op]) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    for op in ops {
        match op {
            Op::Create { action, active } => {
                let id = tx.create_grant(NewGrant::new(req.subject, &req.resource, action, *active))?;
                tracing::debug!(subject = %req.subject, grant = id, action = %action, active, "created grant");
                report.created += 1;
            }
            Op::SetActive { id, action, active } => {
                tx.set_grant_active(*id, *active)?;
                tracing::debug!(subject = %req.subject, grant = id, action = %action, active, "toggled grant");
                if *active {
                    report.activated += 1;
                } else {
                    report.deactivated += 1;
                }
            }
            Op::Delete { id, action } => {
                tx.delete_grant(*id)?;
                tracing::debug!(subject = %req.subject, grant = id, action = %action, "deleted grant");
                report.deleted += 1;
            }
        }
    }
    Ok(report)
}

/// Reconcile inside a transaction the caller already holds
pub fn reconcile_in<W: StoreWrite + ?Sized>(tx: &mut W, req: &ReconcileRequest) -> Result<ReconcileReport> {
    req.validate()?;
    let existing = tx.list_grants(req.subject)?;
    let ops = plan(&existing, req);
    apply(tx, req, &ops)
}

/// Check item id requirements, then reconcile in one transaction.
pub fn reconcile<S: Transactional>(store: &S, req: &ReconcileRequest) -> Result<ReconcileReport> {
    catalog::validate_resource(&req.resource.section, &req.resource.item, req.resource.item_id)?;
    store.transact(|tx| reconcile_in(tx, req))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RuleType;

    fn topic() -> ResourceRef {
        ResourceRef::new("forum", "topic", Some(5))
    }

    fn row(id: i32, action: &str, active: bool) -> Grant {
        Grant {
            id,
            subject: Subject::Role(2),
            section: "forum".into(),
            item: "topic".into(),
            item_id: Some(5),
            action: action.into(),
            rule_type: RuleType::Allow,
            active,
        }
    }

    #[test]
    fn creates_only_missing_action() {
        let existing = vec![row(1, "see", true), row(2, "edit", false)];
        let req = ReconcileRequest::new(Subject::Role(2), topic())
            .with_active(["see", "view"])
            .with_disabled(["edit"]);
        assert_eq!(plan(&existing, &req), vec![Op::Create { action: "view".into(), active: true }]);
    }

    #[test]
    fn flips_and_deletes() {
        let existing = vec![row(1, "see", false), row(2, "edit", true), row(3, "post", true)];
        let req = ReconcileRequest::new(Subject::Role(2), topic())
            .with_active(["see"])
            .with_disabled(["edit"]);
        assert_eq!(
            plan(&existing, &req),
            vec![
                Op::SetActive { id: 1, action: "see".into(), active: true },
                Op::SetActive { id: 2, action: "edit".into(), active: false },
                Op::Delete { id: 3, action: "post".into() },
            ]
        );
    }

    #[test]
    fn duplicate_rows_collapse_to_one() {
        let existing = vec![row(4, "see", true), row(9, "see", true)];
        let req = ReconcileRequest::new(Subject::Role(2), topic()).with_active(["see"]);
        assert_eq!(plan(&existing, &req), vec![Op::Delete { id: 9, action: "see".into() }]);
    }

    #[test]
    fn ignores_other_subjects_and_resources() {
        let mut other = row(1, "see", true);
        other.subject = Subject::User(2);
        let mut elsewhere = row(2, "see", true);
        elsewhere.item_id = Some(6);
        let req = ReconcileRequest::new(Subject::Role(2), topic());
        assert!(plan(&[other, elsewhere], &req).is_empty());
    }

    #[test]
    fn validate_rejects_overlap_and_blank() {
        let overlap = ReconcileRequest::new(Subject::Anyone, topic())
            .with_active(["see"])
            .with_disabled(["see"]);
        assert!(overlap.validate().unwrap_err().is_validation());
        let blank = ReconcileRequest::new(Subject::Anyone, ResourceRef::new("", "", None));
        assert!(blank.validate().is_err());
        let empty_action = ReconcileRequest::new(Subject::Anyone, topic()).with_active([""]);
        assert!(empty_action.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_names() {
        let long = "a".repeat(catalog::MAX_NAME_LEN + 1);
        let action = ReconcileRequest::new(Subject::Anyone, topic()).with_active([long.as_str()]);
        assert!(action.validate().unwrap_err().is_validation());
        let item = ReconcileRequest::new(Subject::Anyone, ResourceRef::new("forum", &long, Some(1)));
        assert!(item.validate().unwrap_err().is_validation());
    }
}
