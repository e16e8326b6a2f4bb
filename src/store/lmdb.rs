//! LMDB-backed store on heed.
//!
//! Storage patterns:
//! - `grants`: id -> grant JSON, ordered by id
//! - `grant_index`: [subject][section][item][action][item_id] -> id (uniqueness)
//! - `roles`: id -> role JSON, `role_names`: name -> id
//! - `resources`: [kind][id] -> resource JSON
//! - `languages`: id -> name
//! - `meta`: id counters

use std::path::Path;

use byteorder::BigEndian;
use heed::types::{Bytes, Str, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};

use crate::catalog;
use crate::config::StoreConfig;
use crate::error::{err, GrantError, Result};
use crate::keys::{build_prefix, id_key, resource_key, subject_grant_key, subject_prefix};
use crate::model::{Grant, Language, NewGrant, ResourceKind, ResourceRecord, Role, RoleUpsert, Subject};
use crate::store::{StoreRead, StoreWrite, Transactional};

type DbJson = Database<Bytes, Str>;
type DbId = Database<Bytes, U64<BigEndian>>;

/// All database handles
#[derive(Clone, Copy)]
struct Dbs {
    grants: DbJson,
    grant_index: DbId,
    roles: DbJson,
    role_names: Database<Str, U64<BigEndian>>,
    resources: DbJson,
    languages: DbJson,
    meta: Database<Str, Str>,
}

pub struct LmdbStore {
    env: Env,
    dbs: Dbs,
}

impl LmdbStore {
    /// Open (or create) the environment described by `cfg`
    pub fn open(cfg: &StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&cfg.path)?;
        // SAFETY: LMDB requires no other process to open this path concurrently
        // with a different configuration.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(cfg.map_size)
                .max_dbs(cfg.max_dbs)
                .open(Path::new(&cfg.path))?
        };
        let mut tx = env.write_txn()?;
        let dbs = Dbs {
            grants: env.create_database(&mut tx, Some("grants"))?,
            grant_index: env.create_database(&mut tx, Some("grant_index"))?,
            roles: env.create_database(&mut tx, Some("roles"))?,
            role_names: env.create_database(&mut tx, Some("role_names"))?,
            resources: env.create_database(&mut tx, Some("resources"))?,
            languages: env.create_database(&mut tx, Some("languages"))?,
            meta: env.create_database(&mut tx, Some("meta"))?,
        };
        tx.commit()?;
        tracing::debug!(path = %cfg.path.display(), "opened grant store");
        Ok(LmdbStore { env, dbs })
    }

    /// Execute a read-only operation in its own read transaction
    fn read<T, F: FnOnce(&Dbs, &RoTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        let tx = self.env.read_txn()?;
        f(&self.dbs, &tx)
    }

    pub fn put_resource(&self, kind: ResourceKind, record: &ResourceRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.transact(|tx| {
            let d = tx.dbs;
            d.resources.put(&mut tx.txn, &resource_key(kind.as_str(), record.id), &json)?;
            Ok(())
        })
    }

    pub fn put_language(&self, id: i32, name: &str) -> Result<()> {
        self.transact(|tx| {
            let d = tx.dbs;
            d.languages.put(&mut tx.txn, &id_key(id), name)?;
            Ok(())
        })
    }
}

// Shared read paths, used by both the store and its write transactions

fn to_id(v: u64) -> i32 {
    v as i64 as i32
}

fn get_grant(d: &Dbs, tx: &RoTxn, id: i32) -> Result<Option<Grant>> {
    match d.grants.get(tx, &id_key(id))? {
        Some(json) => Ok(Some(serde_json::from_str(json)?)),
        None => Ok(None),
    }
}

fn grants_for(d: &Dbs, tx: &RoTxn, subject: Subject) -> Result<Vec<Grant>> {
    let mut ids = Vec::new();
    for item in d.grant_index.prefix_iter(tx, &subject_prefix(&subject))? {
        let (_, id) = item?;
        ids.push(to_id(id));
    }
    ids.sort_unstable();
    let mut r = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(g) = get_grant(d, tx, id)? {
            r.push(g);
        }
    }
    Ok(r)
}

fn all_grants(d: &Dbs, tx: &RoTxn) -> Result<Vec<Grant>> {
    let mut r = Vec::new();
    for item in d.grants.iter(tx)? {
        let (_, json) = item?;
        r.push(serde_json::from_str(json)?);
    }
    Ok(r)
}

fn role_by_name(d: &Dbs, tx: &RoTxn, name: &str) -> Result<Option<Role>> {
    let id = match d.role_names.get(tx, name)? {
        Some(id) => to_id(id),
        None => return Ok(None),
    };
    match d.roles.get(tx, &id_key(id))? {
        Some(json) => Ok(Some(serde_json::from_str(json)?)),
        None => Ok(None),
    }
}

fn all_roles(d: &Dbs, tx: &RoTxn) -> Result<Vec<Role>> {
    let mut r = Vec::new();
    for item in d.roles.iter(tx)? {
        let (_, json) = item?;
        r.push(serde_json::from_str(json)?);
    }
    Ok(r)
}

fn resources_of(d: &Dbs, tx: &RoTxn, kind: ResourceKind) -> Result<Vec<ResourceRecord>> {
    let mut r: Vec<ResourceRecord> = Vec::new();
    for item in d.resources.prefix_iter(tx, &build_prefix(&[kind.as_str()]))? {
        let (_, json) = item?;
        r.push(serde_json::from_str(json)?);
    }
    r.sort_by_key(|rec| rec.id);
    Ok(r)
}

fn resource(d: &Dbs, tx: &RoTxn, kind: ResourceKind, id: i32) -> Result<Option<ResourceRecord>> {
    match d.resources.get(tx, &resource_key(kind.as_str(), id))? {
        Some(json) => Ok(Some(serde_json::from_str(json)?)),
        None => Ok(None),
    }
}

fn languages(d: &Dbs, tx: &RoTxn) -> Result<Vec<Language>> {
    let mut r = Vec::new();
    for item in d.languages.iter(tx)? {
        let (k, name) = item?;
        let raw: [u8; 8] = k.try_into().map_err(err)?;
        r.push(Language { id: u64::from_be_bytes(raw) as i64 as i32, name: name.to_string() });
    }
    Ok(r)
}

impl StoreRead for LmdbStore {
    fn list_grants_by_role(&self, role_id: i32) -> Result<Vec<Grant>> {
        self.read(|d, tx| grants_for(d, tx, Subject::Role(role_id)))
    }

    fn list_grants_by_user(&self, user_id: i32) -> Result<Vec<Grant>> {
        self.read(|d, tx| grants_for(d, tx, Subject::User(user_id)))
    }

    fn list_grants_anyone(&self) -> Result<Vec<Grant>> {
        self.read(|d, tx| grants_for(d, tx, Subject::Anyone))
    }

    fn list_all_grants(&self) -> Result<Vec<Grant>> {
        self.read(all_grants)
    }

    fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.read(|d, tx| role_by_name(d, tx, name))
    }

    fn list_roles(&self) -> Result<Vec<Role>> {
        self.read(all_roles)
    }

    fn list_resources(&self, kind: ResourceKind) -> Result<Vec<ResourceRecord>> {
        self.read(|d, tx| resources_of(d, tx, kind))
    }

    fn get_resource(&self, kind: ResourceKind, id: i32) -> Result<Option<ResourceRecord>> {
        self.read(|d, tx| resource(d, tx, kind, id))
    }

    fn list_languages(&self) -> Result<Vec<Language>> {
        self.read(languages)
    }
}

/// Write transaction over the store's databases
pub struct LmdbTx<'a> {
    txn: RwTxn<'a>,
    dbs: Dbs,
}

impl LmdbTx<'_> {
    fn next_id(&mut self, counter: &str) -> Result<i32> {
        let cur: i32 = self
            .dbs
            .meta
            .get(&self.txn, counter)?
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let id = cur + 1;
        self.dbs.meta.put(&mut self.txn, counter, &id.to_string())?;
        Ok(id)
    }

    fn put_grant(&mut self, g: &Grant) -> Result<()> {
        let json = serde_json::to_string(g)?;
        self.dbs.grants.put(&mut self.txn, &id_key(g.id), &json)?;
        Ok(())
    }
}

impl StoreRead for LmdbTx<'_> {
    fn list_grants_by_role(&self, role_id: i32) -> Result<Vec<Grant>> {
        grants_for(&self.dbs, &self.txn, Subject::Role(role_id))
    }

    fn list_grants_by_user(&self, user_id: i32) -> Result<Vec<Grant>> {
        grants_for(&self.dbs, &self.txn, Subject::User(user_id))
    }

    fn list_grants_anyone(&self) -> Result<Vec<Grant>> {
        grants_for(&self.dbs, &self.txn, Subject::Anyone)
    }

    fn list_all_grants(&self) -> Result<Vec<Grant>> {
        all_grants(&self.dbs, &self.txn)
    }

    fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        role_by_name(&self.dbs, &self.txn, name)
    }

    fn list_roles(&self) -> Result<Vec<Role>> {
        all_roles(&self.dbs, &self.txn)
    }

    fn list_resources(&self, kind: ResourceKind) -> Result<Vec<ResourceRecord>> {
        resources_of(&self.dbs, &self.txn, kind)
    }

    fn get_resource(&self, kind: ResourceKind, id: i32) -> Result<Option<ResourceRecord>> {
        resource(&self.dbs, &self.txn, kind, id)
    }

    fn list_languages(&self) -> Result<Vec<Language>> {
        languages(&self.dbs, &self.txn)
    }
}

impl StoreWrite for LmdbTx<'_> {
    fn create_grant(&mut self, grant: NewGrant) -> Result<i32> {
        grant.check_names()?;
        let key = subject_grant_key(&grant.subject, &grant.section, &grant.item, &grant.action, grant.item_id);
        if self.dbs.grant_index.get(&self.txn, &key)?.is_some() {
            return Err(GrantError::Duplicate(format!("{} {}", grant.subject, grant.key())));
        }
        let id = self.next_id("next_grant_id")?;
        self.put_grant(&grant.into_grant(id))?;
        self.dbs.grant_index.put(&mut self.txn, &key, &(id as i64 as u64))?;
        Ok(id)
    }

    fn set_grant_active(&mut self, id: i32, active: bool) -> Result<()> {
        let mut g = get_grant(&self.dbs, &self.txn, id)?
            .ok_or_else(|| GrantError::NotFound(format!("grant {}", id)))?;
        g.active = active;
        self.put_grant(&g)
    }

    fn delete_grant(&mut self, id: i32) -> Result<()> {
        if let Some(g) = get_grant(&self.dbs, &self.txn, id)? {
            let key = subject_grant_key(&g.subject, &g.section, &g.item, &g.action, g.item_id);
            self.dbs.grant_index.delete(&mut self.txn, &key)?;
            self.dbs.grants.delete(&mut self.txn, &id_key(id))?;
        }
        Ok(())
    }

    fn upsert_role(&mut self, role: &RoleUpsert) -> Result<i32> {
        catalog::validate_name("role name", &role.name)?;
        let id = match self.dbs.role_names.get(&self.txn, &role.name)? {
            Some(id) => to_id(id),
            None => self.next_id("next_role_id")?,
        };
        let json = serde_json::to_string(&Role {
            id,
            name: role.name.clone(),
            can_login: role.can_login,
            is_admin: role.is_admin,
            private_labels: role.private_labels,
        })?;
        self.dbs.roles.put(&mut self.txn, &id_key(id), &json)?;
        self.dbs.role_names.put(&mut self.txn, &role.name, &(id as i64 as u64))?;
        Ok(id)
    }

    fn delete_grants_by_role(&mut self, role_id: i32) -> Result<usize> {
        let grants = grants_for(&self.dbs, &self.txn, Subject::Role(role_id))?;
        for g in &grants {
            self.delete_grant(g.id)?;
        }
        Ok(grants.len())
    }
}

impl Transactional for LmdbStore {
    type Tx<'a> = LmdbTx<'a>;

    fn transact<'s, T, F>(&'s self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self::Tx<'s>) -> Result<T>,
    {
        let mut tx = LmdbTx { txn: self.env.write_txn()?, dbs: self.dbs };
        let r = f(&mut tx)?;
        tx.txn.commit()?;
        Ok(r)
    }
}
