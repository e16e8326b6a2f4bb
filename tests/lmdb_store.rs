//! LMDB store behaviour

use grantbook::model::{ResourceKind, ResourceRecord};
use grantbook::catalog::MAX_NAME_LEN;
use grantbook::store::{LmdbStore, MemoryStore, StoreRead, StoreWrite, Transactional};
use grantbook::{GrantError, NewGrant, ResourceRef, Result, RoleUpsert, StoreConfig, Subject};
use tempfile::TempDir;

fn setup() -> (TempDir, LmdbStore) {
    let dir = TempDir::new().unwrap();
    let store = LmdbStore::open(&StoreConfig::new(dir.path()).with_map_size(16 << 20)).unwrap();
    (dir, store)
}

fn see(subject: Subject, item_id: i32) -> NewGrant {
    NewGrant::new(subject, &ResourceRef::new("forum", "topic", Some(item_id)), "see", true)
}

#[test]
fn grants_are_listed_per_subject() {
    let (_dir, store) = setup();
    store
        .transact(|tx| {
            tx.create_grant(see(Subject::Role(1), 1))?;
            tx.create_grant(see(Subject::Role(12), 1))?;
            tx.create_grant(see(Subject::User(1), 1))?;
            tx.create_grant(see(Subject::Anyone, 1))?;
            tx.create_grant(see(Subject::Role(1), 2))
        })
        .unwrap();

    let role1 = store.list_grants_by_role(1).unwrap();
    assert_eq!(role1.len(), 2);
    assert!(role1.iter().all(|g| g.subject == Subject::Role(1)));
    assert!(role1[0].id < role1[1].id);
    assert_eq!(store.list_grants_by_role(12).unwrap().len(), 1);
    assert_eq!(store.list_grants_by_user(1).unwrap().len(), 1);
    assert_eq!(store.list_grants_anyone().unwrap().len(), 1);

    let all = store.list_all_grants().unwrap();
    assert_eq!(all.iter().map(|g| g.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    assert_eq!(all[2].subject, Subject::User(1));
}

#[test]
fn duplicate_keys_are_rejected() {
    let (_dir, store) = setup();
    store.transact(|tx| tx.create_grant(see(Subject::Role(1), 1))).unwrap();
    let dup = store.transact(|tx| tx.create_grant(see(Subject::Role(1), 1)));
    assert!(matches!(dup, Err(GrantError::Duplicate(_))));
    // Unset and zero item ids are the same key
    let global = NewGrant::new(Subject::Anyone, &ResourceRef::new("news", "post", None), "see", true);
    let mut zero = global.clone();
    zero.item_id = Some(0);
    store.transact(|tx| tx.create_grant(global)).unwrap();
    assert!(store.transact(|tx| tx.create_grant(zero)).is_err());
}

#[test]
fn err_in_closure_aborts_the_transaction() {
    let (_dir, store) = setup();
    let r: Result<()> = store.transact(|tx| {
        tx.create_grant(see(Subject::Anyone, 1))?;
        Err(GrantError::validation("abort"))
    });
    assert!(r.is_err());
    assert!(store.list_grants_anyone().unwrap().is_empty());
}

#[test]
fn toggle_and_delete() {
    let (_dir, store) = setup();
    let id = store.transact(|tx| tx.create_grant(see(Subject::User(4), 9))).unwrap();
    store.transact(|tx| tx.set_grant_active(id, false)).unwrap();
    assert!(!store.list_grants_by_user(4).unwrap()[0].active);

    let missing = store.transact(|tx| tx.set_grant_active(id + 100, true));
    assert!(matches!(missing, Err(GrantError::NotFound(_))));

    store.transact(|tx| tx.delete_grant(id)).unwrap();
    assert!(store.list_grants_by_user(4).unwrap().is_empty());
    // The key is free again
    store.transact(|tx| tx.create_grant(see(Subject::User(4), 9))).unwrap();
}

#[test]
fn roles_upsert_by_name() {
    let (_dir, store) = setup();
    let role = |login| RoleUpsert { name: "editor".into(), can_login: login, is_admin: false, private_labels: login };
    let a = store.transact(|tx| tx.upsert_role(&role(false))).unwrap();
    let b = store.transact(|tx| tx.upsert_role(&role(true))).unwrap();
    assert_eq!(a, b);
    let roles = store.list_roles().unwrap();
    assert_eq!(roles.len(), 1);
    assert!(roles[0].can_login);
    assert_eq!(store.get_role_by_name("editor").unwrap().unwrap().id, a);
    assert!(store.get_role_by_name("ghost").unwrap().is_none());

    let removed = store
        .transact(|tx| {
            tx.create_grant(see(Subject::Role(a), 1))?;
            tx.create_grant(see(Subject::Role(a), 2))?;
            tx.delete_grants_by_role(a)
        })
        .unwrap();
    assert_eq!(removed, 2);
    assert!(store.list_grants_by_role(a).unwrap().is_empty());
}

#[test]
fn resources_and_languages() {
    let (_dir, store) = setup();
    store.put_resource(ResourceKind::ForumCategory, &ResourceRecord::new(2, "News").with_parent(1)).unwrap();
    store.put_resource(ResourceKind::ForumCategory, &ResourceRecord::new(1, "General")).unwrap();
    store.put_resource(ResourceKind::LinkerCategory, &ResourceRecord::new(1, "Links")).unwrap();
    store.put_language(3, "de").unwrap();

    let cats = store.list_resources(ResourceKind::ForumCategory).unwrap();
    assert_eq!(cats.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(cats[1].parent_id, Some(1));
    assert_eq!(store.get_resource(ResourceKind::LinkerCategory, 1).unwrap().unwrap().title, "Links");
    assert!(store.get_resource(ResourceKind::LinkerLink, 1).unwrap().is_none());
    let langs = store.list_languages().unwrap();
    assert_eq!((langs[0].id, langs[0].name.as_str()), (3, "de"));

}

#[test]
fn both_stores_reject_oversized_names_the_same_way() {
    let (_dir, lmdb) = setup();
    let mem = MemoryStore::new();
    let news = ResourceRef::new("news", "post", None);

    // Longer than an LMDB key once prefixed, but well under a u16 part
    let long = NewGrant::new(Subject::Anyone, &news, &"a".repeat(600), true);
    assert!(lmdb.transact(|tx| tx.create_grant(long.clone())).unwrap_err().is_validation());
    assert!(mem.transact(|tx| tx.create_grant(long)).unwrap_err().is_validation());

    // Past a u16 part length: rejected outright, never mistaken for a duplicate
    let huge = "a".repeat(70_000);
    for action in [huge.clone(), format!("{}b", huge)] {
        let g = NewGrant::new(Subject::Anyone, &news, &action, true);
        assert!(lmdb.transact(|tx| tx.create_grant(g.clone())).unwrap_err().is_validation());
        assert!(mem.transact(|tx| tx.create_grant(g)).unwrap_err().is_validation());
    }

    let edge = NewGrant::new(Subject::Role(1), &news, &"e".repeat(MAX_NAME_LEN), true);
    lmdb.transact(|tx| tx.create_grant(edge.clone())).unwrap();
    mem.transact(|tx| tx.create_grant(edge)).unwrap();

    let role = RoleUpsert { name: "r".repeat(MAX_NAME_LEN + 1), can_login: false, is_admin: false, private_labels: false };
    assert!(lmdb.transact(|tx| tx.upsert_role(&role)).unwrap_err().is_validation());
    assert!(mem.transact(|tx| tx.upsert_role(&role)).unwrap_err().is_validation());
    assert!(lmdb.list_grants_anyone().unwrap().is_empty());
}
