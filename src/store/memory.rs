//! In-memory store.
//!
//! State sits behind one mutex. A transaction clones the state, runs against the
//! copy and swaps it in on commit, so a failed transaction leaves nothing behind.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::catalog;
use crate::error::{GrantError, Result};
use crate::keys::subject_grant_key;
use crate::model::{Grant, Language, NewGrant, ResourceKind, ResourceRecord, Role, RoleUpsert, Subject};
use crate::store::{StoreRead, StoreWrite, Transactional};

#[derive(Debug, Clone, Default)]
struct MemState {
    grants: BTreeMap<i32, Grant>,
    grant_index: HashMap<Vec<u8>, i32>,
    roles: BTreeMap<i32, Role>,
    resources: BTreeMap<(ResourceKind, i32), ResourceRecord>,
    languages: BTreeMap<i32, String>,
    next_grant_id: i32,
    next_role_id: i32,
    /// Writes allowed before every further write fails
    write_budget: Option<usize>,
}

impl MemState {
    fn grants_where(&self, f: impl Fn(&Subject) -> bool) -> Vec<Grant> {
        self.grants.values().filter(|g| f(&g.subject)).cloned().collect()
    }

    fn spend_write(&mut self) -> Result<()> {
        match self.write_budget.as_mut() {
            Some(0) => Err(GrantError::Store("injected write failure".into())),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn index_key(g: &Grant) -> Vec<u8> {
        subject_grant_key(&g.subject, &g.section, &g.item, &g.action, g.item_id)
    }
}

impl StoreRead for MemState {
    fn list_grants_by_role(&self, role_id: i32) -> Result<Vec<Grant>> {
        Ok(self.grants_where(|s| *s == Subject::Role(role_id)))
    }

    fn list_grants_by_user(&self, user_id: i32) -> Result<Vec<Grant>> {
        Ok(self.grants_where(|s| *s == Subject::User(user_id)))
    }

    fn list_grants_anyone(&self) -> Result<Vec<Grant>> {
        Ok(self.grants_where(|s| *s == Subject::Anyone))
    }

    fn list_all_grants(&self) -> Result<Vec<Grant>> {
        Ok(self.grants.values().cloned().collect())
    }

    fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.roles.values().find(|r| r.name == name).cloned())
    }

    fn list_roles(&self) -> Result<Vec<Role>> {
        Ok(self.roles.values().cloned().collect())
    }

    fn list_resources(&self, kind: ResourceKind) -> Result<Vec<ResourceRecord>> {
        Ok(self
            .resources
            .range((kind, i32::MIN)..=(kind, i32::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn get_resource(&self, kind: ResourceKind, id: i32) -> Result<Option<ResourceRecord>> {
        Ok(self.resources.get(&(kind, id)).cloned())
    }

    fn list_languages(&self) -> Result<Vec<Language>> {
        Ok(self.languages.iter().map(|(id, name)| Language { id: *id, name: name.clone() }).collect())
    }
}

impl StoreWrite for MemState {
    fn create_grant(&mut self, grant: NewGrant) -> Result<i32> {
        grant.check_names()?;
        let key = subject_grant_key(&grant.subject, &grant.section, &grant.item, &grant.action, grant.item_id);
        if self.grant_index.contains_key(&key) {
            return Err(GrantError::Duplicate(format!("{} {}", grant.subject, grant.key())));
        }
        self.spend_write()?;
        self.next_grant_id += 1;
        let id = self.next_grant_id;
        self.grant_index.insert(key, id);
        self.grants.insert(id, grant.into_grant(id));
        Ok(id)
    }

    fn set_grant_active(&mut self, id: i32, active: bool) -> Result<()> {
        if !self.grants.contains_key(&id) {
            return Err(GrantError::NotFound(format!("grant {}", id)));
        }
        self.spend_write()?;
        if let Some(g) = self.grants.get_mut(&id) {
            g.active = active;
        }
        Ok(())
    }

    fn delete_grant(&mut self, id: i32) -> Result<()> {
        self.spend_write()?;
        if let Some(g) = self.grants.remove(&id) {
            self.grant_index.remove(&Self::index_key(&g));
        }
        Ok(())
    }

    fn upsert_role(&mut self, role: &RoleUpsert) -> Result<i32> {
        catalog::validate_name("role name", &role.name)?;
        self.spend_write()?;
        let existing = self.roles.values().find(|r| r.name == role.name).map(|r| r.id);
        let id = match existing {
            Some(id) => id,
            None => {
                self.next_role_id += 1;
                self.next_role_id
            }
        };
        self.roles.insert(
            id,
            Role {
                id,
                name: role.name.clone(),
                can_login: role.can_login,
                is_admin: role.is_admin,
                private_labels: role.private_labels,
            },
        );
        Ok(id)
    }

    fn delete_grants_by_role(&mut self, role_id: i32) -> Result<usize> {
        self.spend_write()?;
        let ids: Vec<i32> = self
            .grants
            .values()
            .filter(|g| g.subject == Subject::Role(role_id))
            .map(|g| g.id)
            .collect();
        for id in &ids {
            if let Some(g) = self.grants.remove(id) {
                self.grant_index.remove(&Self::index_key(&g));
            }
        }
        Ok(ids.len())
    }
}

/// Mutex-guarded in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Make every write after the next `n` fail with a store error.
    pub fn fail_writes_after(&self, n: usize) {
        self.state().write_budget = Some(n);
    }

    pub fn clear_write_failure(&self) {
        self.state().write_budget = None;
    }

    pub fn put_resource(&self, kind: ResourceKind, record: ResourceRecord) {
        self.state().resources.insert((kind, record.id), record);
    }

    pub fn put_language(&self, id: i32, name: &str) {
        self.state().languages.insert(id, name.to_string());
    }

    /// Number of stored grants across all subjects
    pub fn grant_count(&self) -> usize {
        self.state().grants.len()
    }
}

impl StoreRead for MemoryStore {
    fn list_grants_by_role(&self, role_id: i32) -> Result<Vec<Grant>> {
        self.state().list_grants_by_role(role_id)
    }

    fn list_grants_by_user(&self, user_id: i32) -> Result<Vec<Grant>> {
        self.state().list_grants_by_user(user_id)
    }

    fn list_grants_anyone(&self) -> Result<Vec<Grant>> {
        self.state().list_grants_anyone()
    }

    fn list_all_grants(&self) -> Result<Vec<Grant>> {
        self.state().list_all_grants()
    }

    fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.state().get_role_by_name(name)
    }

    fn list_roles(&self) -> Result<Vec<Role>> {
        self.state().list_roles()
    }

    fn list_resources(&self, kind: ResourceKind) -> Result<Vec<ResourceRecord>> {
        self.state().list_resources(kind)
    }

    fn get_resource(&self, kind: ResourceKind, id: i32) -> Result<Option<ResourceRecord>> {
        self.state().get_resource(kind, id)
    }

    fn list_languages(&self) -> Result<Vec<Language>> {
        self.state().list_languages()
    }
}

/// Transaction over a working copy of the state
pub struct MemoryTx<'a> {
    guard: MutexGuard<'a, MemState>,
    work: MemState,
}

impl MemoryTx<'_> {
    fn commit(mut self) {
        let budget = self.work.write_budget;
        *self.guard = std::mem::take(&mut self.work);
        self.guard.write_budget = budget;
    }
}

impl StoreRead for MemoryTx<'_> {
    fn list_grants_by_role(&self, role_id: i32) -> Result<Vec<Grant>> {
        self.work.list_grants_by_role(role_id)
    }

    fn list_grants_by_user(&self, user_id: i32) -> Result<Vec<Grant>> {
        self.work.list_grants_by_user(user_id)
    }

    fn list_grants_anyone(&self) -> Result<Vec<Grant>> {
        self.work.list_grants_anyone()
    }

    fn list_all_grants(&self) -> Result<Vec<Grant>> {
        self.work.list_all_grants()
    }

    fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.work.get_role_by_name(name)
    }

    fn list_roles(&self) -> Result<Vec<Role>> {
        self.work.list_roles()
    }

    fn list_resources(&self, kind: ResourceKind) -> Result<Vec<ResourceRecord>> {
        self.work.list_resources(kind)
    }

    fn get_resource(&self, kind: ResourceKind, id: i32) -> Result<Option<ResourceRecord>> {
        self.work.get_resource(kind, id)
    }

    fn list_languages(&self) -> Result<Vec<Language>> {
        self.work.list_languages()
    }
}

impl StoreWrite for MemoryTx<'_> {
    fn create_grant(&mut self, grant: NewGrant) -> Result<i32> {
        self.work.create_grant(grant)
    }

    fn set_grant_active(&mut self, id: i32, active: bool) -> Result<()> {
        self.work.set_grant_active(id, active)
    }

    fn delete_grant(&mut self, id: i32) -> Result<()> {
        self.work.delete_grant(id)
    }

    fn upsert_role(&mut self, role: &RoleUpsert) -> Result<i32> {
        self.work.upsert_role(role)
    }

    fn delete_grants_by_role(&mut self, role_id: i32) -> Result<usize> {
        self.work.delete_grants_by_role(role_id)
    }
}

impl Transactional for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn transact<'s, T, F>(&'s self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self::Tx<'s>) -> Result<T>,
    {
        let guard = self.state();
        let work = guard.clone();
        let mut tx = MemoryTx { guard, work };
        let r = f(&mut tx)?;
        tx.commit();
        Ok(r)
    }
}
