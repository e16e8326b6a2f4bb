//! JSON export of a role and its grouped grants, and loading such a dump back.
//!
//! A dump lists each group's `have` actions (active) and `disabled` actions
//! (inactive). Loading previews the dump against the live role, then replaces
//! the role's grants with the dump's in one transaction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::error::{GrantError, Result};
use crate::groups::{self, GrantGroup};
use crate::keys::GrantKey;
use crate::model::{NewGrant, ResourceRef, Role, RoleUpsert, Subject};
use crate::store::{StoreRead, StoreWrite, Transactional};
use crate::template::RoleProperties;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrantsExport {
    pub role: Role,
    pub grant_groups: Vec<GrantGroup>,
}

pub fn export_role_grants(store: &dyn StoreRead, role_name: &str) -> Result<RoleGrantsExport> {
    let role = store
        .get_role_by_name(role_name)?
        .ok_or_else(|| GrantError::NotFound(format!("role {:?}", role_name)))?;
    let grant_groups = groups::build_for_subject(store, Subject::Role(role.id))?;
    Ok(RoleGrantsExport { role, grant_groups })
}

impl RoleGrantsExport {
    /// Grants the dump describes, keyed and checked.
    ///
    /// An action listed twice with the same state counts once; listed as both
    /// active and disabled it is rejected.
    fn desired(&self, role_name: &str) -> Result<BTreeMap<GrantKey, NewGrant>> {
        if role_name.is_empty() {
            return Err(GrantError::validation("role name is required"));
        }
        catalog::validate_name("role name", role_name)?;
        if self.role.name != role_name {
            return Err(GrantError::validation(format!(
                "role name {:?} does not match dumped role {:?}",
                role_name, self.role.name
            )));
        }

        let mut out: BTreeMap<GrantKey, NewGrant> = BTreeMap::new();
        for grp in &self.grant_groups {
            let states = grp.have.iter().map(|a| (a, true)).chain(grp.disabled.iter().map(|a| (a, false)));
            let resource = ResourceRef::new(&grp.section, &grp.item, grp.item_id);
            for (action, active) in states {
                catalog::validate_resource(&grp.section, &grp.item, grp.item_id)?;
                catalog::validate_action(&action.name)?;
                let grant = NewGrant::new(Subject::Role(self.role.id), &resource, &action.name, active);
                let key = grant.key();
                if let Some(prev) = out.get(&key) {
                    if prev.active != active {
                        return Err(GrantError::validation(format!("{} is both active and disabled", key)));
                    }
                    continue;
                }
                out.insert(key, grant);
            }
        }
        Ok(out)
    }

    fn upsert(&self) -> RoleUpsert {
        RoleUpsert {
            name: self.role.name.clone(),
            can_login: self.role.can_login,
            is_admin: self.role.is_admin,
            private_labels: self.role.private_labels,
        }
    }
}

/// What loading a dump would change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleLoadPreview {
    pub role: String,
    /// The live role, if one already has this name
    pub existing: Option<Role>,
    pub property_changes: Vec<String>,
    /// Grant keys rendered `section|item|action|item_id`, sorted
    pub grants_added: Vec<String>,
    pub grants_removed: Vec<String>,
    /// Keys held on both sides with a different active flag
    pub grants_toggled: Vec<String>,
    /// The dump's grants grouped as the editor would show them
    pub grant_groups: Vec<GrantGroup>,
}

impl RoleLoadPreview {
    /// True when loading would change nothing
    pub fn is_unchanged(&self) -> bool {
        self.existing.is_some()
            && self.property_changes.is_empty()
            && self.grants_added.is_empty()
            && self.grants_removed.is_empty()
            && self.grants_toggled.is_empty()
    }
}

/// Diff a dump against the live role named `role_name`. Read-only.
pub fn preview_role_grants(store: &dyn StoreRead, role_name: &str, dump: &RoleGrantsExport) -> Result<RoleLoadPreview> {
    let desired = dump.desired(role_name)?;
    let preview_rows: Vec<_> = desired.values().map(|g| g.clone().into_grant(0)).collect();
    let grant_groups = groups::build(store, &preview_rows);

    let existing = store.get_role_by_name(role_name)?;
    let (current, property_changes) = match &existing {
        Some(live) => {
            let current: BTreeMap<GrantKey, bool> =
                store.list_grants_by_role(live.id)?.iter().map(|g| (g.key(), g.active)).collect();
            let changes = RoleProperties::of(&dump.role).changes_from(&RoleProperties::of(live));
            (current, changes)
        }
        None => (BTreeMap::new(), Vec::new()),
    };

    let want: BTreeSet<&GrantKey> = desired.keys().collect();
    let have: BTreeSet<&GrantKey> = current.keys().collect();
    let render = |keys: Vec<&GrantKey>| keys.into_iter().map(|k| k.to_string()).collect::<Vec<_>>();
    let grants_toggled = render(
        want.intersection(&have)
            .filter(|k| desired.get(**k).map(|g| g.active) != current.get(**k).copied())
            .copied()
            .collect(),
    );
    Ok(RoleLoadPreview {
        role: role_name.to_string(),
        existing,
        property_changes,
        grants_added: render(want.difference(&have).copied().collect()),
        grants_removed: render(have.difference(&want).copied().collect()),
        grants_toggled,
        grant_groups,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleLoadReport {
    pub role_id: i32,
    pub created_role: bool,
    pub grants_removed: usize,
    pub grants_created: usize,
}

/// Upsert the role and replace its grants with the dump's, inside `tx`.
pub fn import_role_grants_in<W: StoreWrite + ?Sized>(
    tx: &mut W,
    role_name: &str,
    dump: &RoleGrantsExport,
) -> Result<RoleLoadReport> {
    let desired = dump.desired(role_name)?;
    let created_role = tx.get_role_by_name(role_name)?.is_none();
    let role_id = tx.upsert_role(&dump.upsert())?;
    let grants_removed = tx.delete_grants_by_role(role_id)?;
    let mut grants_created = 0;
    for mut grant in desired.into_values() {
        grant.subject = Subject::Role(role_id);
        tx.create_grant(grant)?;
        grants_created += 1;
    }
    Ok(RoleLoadReport { role_id, created_role, grants_removed, grants_created })
}

/// Load a dump atomically: the role and all its grants land, or nothing does.
pub fn import_role_grants<S: Transactional>(store: &S, role_name: &str, dump: &RoleGrantsExport) -> Result<RoleLoadReport> {
    let report = store.transact(|tx| import_role_grants_in(tx, role_name, dump))?;
    tracing::info!(
        role = role_name,
        created = report.grants_created,
        removed = report.grants_removed,
        "role grants loaded"
    );
    Ok(report)
}
