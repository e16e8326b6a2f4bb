//! Store collaborator: the grant, role and resource label persistence the
//! engine reads from and writes to.
//!
//! Reads go through [`StoreRead`] (object safe, shared borrow). Writes go through
//! [`StoreWrite`], normally obtained inside [`Transactional::transact`] so every
//! write made by one operation commits or rolls back together.

use crate::error::Result;
use crate::model::{Grant, Language, NewGrant, ResourceKind, ResourceRecord, Role, RoleUpsert, Subject};

pub mod lmdb;
pub mod memory;

pub use lmdb::{LmdbStore, LmdbTx};
pub use memory::{MemoryStore, MemoryTx};

pub trait StoreRead {
    fn list_grants_by_role(&self, role_id: i32) -> Result<Vec<Grant>>;
    fn list_grants_by_user(&self, user_id: i32) -> Result<Vec<Grant>>;
    /// Grants with neither a user nor a role
    fn list_grants_anyone(&self) -> Result<Vec<Grant>>;

    fn list_grants(&self, subject: Subject) -> Result<Vec<Grant>> {
        match subject {
            Subject::User(id) => self.list_grants_by_user(id),
            Subject::Role(id) => self.list_grants_by_role(id),
            Subject::Anyone => self.list_grants_anyone(),
        }
    }

    /// Every grant of every subject, ordered by id
    fn list_all_grants(&self) -> Result<Vec<Grant>>;

    fn get_role_by_name(&self, name: &str) -> Result<Option<Role>>;
    fn list_roles(&self) -> Result<Vec<Role>>;

    /// Every record of one kind, used to build category trees
    fn list_resources(&self, kind: ResourceKind) -> Result<Vec<ResourceRecord>>;
    fn get_resource(&self, kind: ResourceKind, id: i32) -> Result<Option<ResourceRecord>>;
    fn list_languages(&self) -> Result<Vec<Language>>;
}

pub trait StoreWrite: StoreRead {
    /// Insert a grant. Fails with `Duplicate` if the subject already holds the key.
    fn create_grant(&mut self, grant: NewGrant) -> Result<i32>;
    fn set_grant_active(&mut self, id: i32, active: bool) -> Result<()>;
    fn delete_grant(&mut self, id: i32) -> Result<()>;
    /// Insert or update a role by name, returning its id
    fn upsert_role(&mut self, role: &RoleUpsert) -> Result<i32>;
    fn delete_grants_by_role(&mut self, role_id: i32) -> Result<usize>;
}

pub trait Transactional {
    type Tx<'a>: StoreWrite
    where
        Self: 'a;

    /// Run `f` in one transaction: `Ok` commits, `Err` discards its writes.
    fn transact<'s, T, F>(&'s self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self::Tx<'s>) -> Result<T>;
}
