//! Bulk grant creation over subjects x resources x actions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::error::{GrantError, Result};
use crate::keys::GrantKey;
use crate::model::{NewGrant, ResourceRef, Subject};
use crate::store::{StoreWrite, Transactional};

/// Subjects selected for a bulk create
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subjects {
    #[serde(default)]
    pub user_ids: Vec<i32>,
    #[serde(default)]
    pub role_ids: Vec<i32>,
    #[serde(default)]
    pub anyone: bool,
}

impl Subjects {
    pub fn anyone() -> Self {
        Subjects { anyone: true, ..Self::default() }
    }

    pub fn roles(ids: impl IntoIterator<Item = i32>) -> Self {
        Subjects { role_ids: ids.into_iter().collect(), ..Self::default() }
    }

    pub fn users(ids: impl IntoIterator<Item = i32>) -> Self {
        Subjects { user_ids: ids.into_iter().collect(), ..Self::default() }
    }

    /// Users, then roles, then anyone; repeated ids appear once.
    pub fn to_vec(&self) -> Vec<Subject> {
        let mut seen = HashSet::new();
        self.user_ids
            .iter()
            .map(|id| Subject::User(*id))
            .chain(self.role_ids.iter().map(|id| Subject::Role(*id)))
            .chain(self.anyone.then_some(Subject::Anyone))
            .filter(|s| seen.insert(*s))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty() && self.role_ids.is_empty() && !self.anyone
    }
}

/// One resource and the actions to grant on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRow {
    pub section: String,
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub item_id: Option<i32>,
    pub actions: Vec<String>,
}

impl GrantRow {
    pub fn new(section: &str, item: &str, item_id: Option<i32>, actions: &[&str]) -> Self {
        GrantRow {
            section: section.to_string(),
            item: item.to_string(),
            item_id,
            actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn resource(&self) -> ResourceRef {
        ResourceRef::new(&self.section, &self.item, self.item_id)
    }

    fn validate(&self) -> Result<()> {
        catalog::validate_resource(&self.section, &self.item, self.item_id)?;
        if self.actions.is_empty() {
            return Err(GrantError::validation(format!("{}|{}: missing action", self.section, self.item)));
        }
        self.actions.iter().try_for_each(|a| catalog::validate_action(a))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub created: usize,
    /// Combinations the subject already held
    pub skipped: usize,
}

/// Reject the batch if any subject set or row is malformed
pub fn validate(subjects: &Subjects, rows: &[GrantRow]) -> Result<()> {
    if subjects.is_empty() {
        return Err(GrantError::validation("no subjects selected"));
    }
    if rows.is_empty() {
        return Err(GrantError::validation("no grant rows"));
    }
    rows.iter().try_for_each(GrantRow::validate)
}

/// Validate the batch, then create every missing `(subject, row, action)` grant
/// through `tx`.
pub fn provision_in<W: StoreWrite + ?Sized>(tx: &mut W, subjects: &Subjects, rows: &[GrantRow]) -> Result<ProvisionReport> {
    validate(subjects, rows)?;
    let mut report = ProvisionReport::default();
    for subject in subjects.to_vec() {
        let mut held: HashSet<GrantKey> = tx.list_grants(subject)?.iter().map(|g| g.key()).collect();
        for row in rows {
            let resource = row.resource();
            for action in &row.actions {
                let grant = NewGrant::new(subject, &resource, action, true);
                if !held.insert(grant.key()) {
                    report.skipped += 1;
                    continue;
                }
                match tx.create_grant(grant) {
                    Ok(id) => {
                        tracing::debug!(subject = %subject, grant = id, action = %action, "provisioned grant");
                        report.created += 1;
                    }
                    Err(GrantError::Duplicate(_)) => report.skipped += 1,
                    Err(e) => return Err(e),
                }
            }
        }
    }
    Ok(report)
}

/// Provision the whole batch in one transaction. A bad row rejects the batch.
pub fn provision<S: Transactional>(store: &S, subjects: &Subjects, rows: &[GrantRow]) -> Result<ProvisionReport> {
    let report = store.transact(|tx| provision_in(tx, subjects, rows))?;
    tracing::info!(created = report.created, skipped = report.skipped, "bulk grants provisioned");
    Ok(report)
}
