//! Grant grouping and label resolution

use grantbook::groups::{build, build_for_subject, search_grants, sort_subject_groups, GrantFilter, SortField};
use grantbook::model::{Grant, Language, ResourceKind, ResourceRecord, Role, RuleType, Subject};
use grantbook::store::{MemoryStore, StoreRead, StoreWrite, Transactional};
use grantbook::{catalog, GrantError, GrantGroupBuilder, NewGrant, ResourcePathResolver, ResourceRef, Result, RoleUpsert};

fn grant(id: i32, section: &str, item: &str, item_id: Option<i32>, action: &str, active: bool) -> Grant {
    Grant {
        id,
        subject: Subject::Role(1),
        section: section.into(),
        item: item.into(),
        item_id,
        action: action.into(),
        rule_type: RuleType::Allow,
        active,
    }
}

fn forum_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.put_resource(ResourceKind::ForumCategory, ResourceRecord::new(1, "General"));
    store.put_resource(ResourceKind::ForumCategory, ResourceRecord::new(2, "Announcements").with_parent(1));
    store.put_resource(ResourceKind::ForumTopic, ResourceRecord::new(10, "Releases").with_parent(2));
    store.put_resource(ResourceKind::ForumThread, ResourceRecord::new(77, "ignored").with_parent(10));
    store
}

#[test]
fn empty_input_yields_one_group_per_section_wide_entry() {
    let store = MemoryStore::new();
    let groups = build(&store, &[]);
    let expected: Vec<_> = catalog::entries().iter().filter(|e| !e.require_item_id).collect();
    assert_eq!(groups.len(), expected.len());
    for e in expected {
        let matching: Vec<_> = groups.iter().filter(|g| g.section == e.section && g.item == e.item).collect();
        assert_eq!(matching.len(), 1, "{}|{}", e.section, e.item);
        let g = matching[0];
        assert_eq!(g.item_id, None);
        assert_eq!(g.available, e.actions.to_vec());
        assert!(g.have.is_empty() && g.disabled.is_empty() && !g.unsupported);
    }
}

#[test]
fn grants_missing_required_item_id_are_dropped() {
    let store = MemoryStore::new();
    let grants = vec![
        grant(1, "forum", "topic", None, "see", true),
        grant(2, "forum", "topic", Some(0), "view", true),
        grant(3, "writing", "article", Some(0), "see", false),
        grant(4, "forum", "topic", Some(3), "see", true),
    ];
    let groups = build(&store, &grants);
    let ids: Vec<i32> = groups.iter().flat_map(|g| g.have.iter().chain(&g.disabled)).map(|a| a.id).collect();
    assert_eq!(ids, vec![4]);
    assert!(groups.iter().all(|g| !catalog::is_require_item_id(&g.section, &g.item) || g.item_id.is_some()));
}

#[test]
fn section_wide_grants_merge_into_catalog_groups() {
    let store = MemoryStore::new();
    let grants = vec![grant(1, "news", "post", None, "see", true), grant(2, "news", "post", Some(0), "edit", false)];
    let groups = build(&store, &grants);
    let news: Vec<_> = groups.iter().filter(|g| g.section == "news").collect();
    assert_eq!(news.len(), 1);
    assert_eq!(news[0].have[0].name, "see");
    assert_eq!(news[0].disabled[0].name, "edit");
    assert_eq!(news[0].available, vec!["view", "reply", "post", "label"]);
}

#[test]
fn forum_labels_walk_the_category_tree() {
    let store = forum_store();
    let grants = vec![
        grant(5, "forum", "category", Some(2), "see", true),
        grant(6, "forum", "topic", Some(10), "view", true),
        grant(7, "forum", "thread", Some(77), "reply", true),
    ];
    let groups = build(&store, &grants);
    let find = |item: &str| groups.iter().find(|g| g.item == item).unwrap();

    assert_eq!(find("category").info, "General/Announcements");
    assert_eq!(find("category").link, "/admin/forum/category/2/grants#g5");
    assert_eq!(find("topic").info, "Releases (General/Announcements)");
    assert_eq!(find("topic").link, "/admin/forum/topic/10/grants#g6");
    assert_eq!(find("thread").info, "Releases thread (General/Announcements)");
    assert_eq!(find("thread").link, "");
}

#[test]
fn cyclic_categories_still_label() {
    let store = MemoryStore::new();
    store.put_resource(ResourceKind::ForumCategory, ResourceRecord::new(1, "A").with_parent(2));
    store.put_resource(ResourceKind::ForumCategory, ResourceRecord::new(2, "B").with_parent(1));
    let groups = build(&store, &[grant(1, "forum", "category", Some(2), "see", true)]);
    let cat = groups.iter().find(|g| g.item == "category").unwrap();
    assert_eq!(cat.info, "A/B");
}

#[test]
fn faq_questions_are_cut_and_tagged_with_language() {
    let store = MemoryStore::new();
    store.put_language(1, "en");
    let question = "How do I change the password on my account settings page?";
    store.put_resource(ResourceKind::FaqQuestion, ResourceRecord::new(3, question).with_language(1));
    store.put_resource(ResourceKind::FaqQuestion, ResourceRecord::new(4, "Short?").with_language(9));
    let groups = build(
        &store,
        &[grant(1, "faq", "question", Some(3), "see", true), grant(2, "faq", "question", Some(4), "see", true)],
    );
    let q3 = groups.iter().find(|g| g.item_id == Some(3)).unwrap();
    assert_eq!(q3.info, format!("[en] {}...", &question[..40]));
    let q4 = groups.iter().find(|g| g.item_id == Some(4)).unwrap();
    assert_eq!(q4.info, "Short?");
}

#[test]
fn role_section_grants_link_to_the_role_and_stay_unsupported() {
    let store = MemoryStore::new();
    let editor = store.transact(|tx| {
        tx.upsert_role(&RoleUpsert { name: "editor".into(), can_login: true, is_admin: false, private_labels: true })
    });
    let editor = editor.unwrap();
    let groups = build(&store, &[grant(12, "role", "", None, "editor", true)]);
    let g = groups.iter().find(|g| g.section == "role").unwrap();
    assert_eq!(g.link, format!("/admin/role/{}#g12", editor));
    assert!(g.unsupported);
    assert!(g.have[0].unsupported);
}

/// Store whose label lookups always fail
struct BrokenLabels(MemoryStore);

impl StoreRead for BrokenLabels {
    fn list_grants_by_role(&self, role_id: i32) -> Result<Vec<Grant>> {
        self.0.list_grants_by_role(role_id)
    }
    fn list_grants_by_user(&self, user_id: i32) -> Result<Vec<Grant>> {
        self.0.list_grants_by_user(user_id)
    }
    fn list_grants_anyone(&self) -> Result<Vec<Grant>> {
        self.0.list_grants_anyone()
    }
    fn list_all_grants(&self) -> Result<Vec<Grant>> {
        self.0.list_all_grants()
    }
    fn get_role_by_name(&self, _: &str) -> Result<Option<Role>> {
        Err(GrantError::Store("down".into()))
    }
    fn list_roles(&self) -> Result<Vec<Role>> {
        Err(GrantError::Store("down".into()))
    }
    fn list_resources(&self, _: ResourceKind) -> Result<Vec<ResourceRecord>> {
        Err(GrantError::Store("down".into()))
    }
    fn get_resource(&self, _: ResourceKind, _: i32) -> Result<Option<ResourceRecord>> {
        Err(GrantError::Store("down".into()))
    }
    fn list_languages(&self) -> Result<Vec<Language>> {
        Err(GrantError::Store("down".into()))
    }
}

#[test]
fn label_failures_leave_labels_blank() {
    let inner = forum_store();
    inner
        .transact(|tx| tx.create_grant(NewGrant::new(Subject::Role(1), &ResourceRef::new("forum", "topic", Some(10)), "see", true)))
        .unwrap();
    let store = BrokenLabels(inner);
    let groups = build_for_subject(&store, Subject::Role(1)).unwrap();
    let topic = groups.iter().find(|g| g.item == "topic").unwrap();
    assert_eq!(topic.info, "");
    assert_eq!(topic.have.len(), 1);
}

/// Store whose grant enumeration fails
struct BrokenGrants;

impl StoreRead for BrokenGrants {
    fn list_grants_by_role(&self, _: i32) -> Result<Vec<Grant>> {
        Err(GrantError::Store("down".into()))
    }
    fn list_grants_by_user(&self, _: i32) -> Result<Vec<Grant>> {
        Err(GrantError::Store("down".into()))
    }
    fn list_grants_anyone(&self) -> Result<Vec<Grant>> {
        Err(GrantError::Store("down".into()))
    }
    fn list_all_grants(&self) -> Result<Vec<Grant>> {
        Err(GrantError::Store("down".into()))
    }
    fn get_role_by_name(&self, _: &str) -> Result<Option<Role>> {
        Ok(None)
    }
    fn list_roles(&self) -> Result<Vec<Role>> {
        Ok(Vec::new())
    }
    fn list_resources(&self, _: ResourceKind) -> Result<Vec<ResourceRecord>> {
        Ok(Vec::new())
    }
    fn get_resource(&self, _: ResourceKind, _: i32) -> Result<Option<ResourceRecord>> {
        Ok(None)
    }
    fn list_languages(&self) -> Result<Vec<Language>> {
        Ok(Vec::new())
    }
}

#[test]
fn grant_enumeration_failure_aborts() {
    assert!(matches!(build_for_subject(&BrokenGrants, Subject::Anyone), Err(GrantError::Store(_))));
}

#[test]
fn empty_resolver_builds_unlabelled_groups() {
    let store = forum_store();
    let resolver = ResourcePathResolver::empty();
    let groups = GrantGroupBuilder::new(&resolver).build(&store, &[grant(1, "forum", "topic", Some(10), "see", true)]);
    let topic = groups.iter().find(|g| g.item == "topic").unwrap();
    assert!(topic.info.is_empty() && topic.link.is_empty());
}

/// editor (role 1) and reader (role 2) plus user and anyone grants
fn mixed_subjects() -> MemoryStore {
    let store = forum_store();
    let topic = ResourceRef::new("forum", "topic", Some(10));
    let news = ResourceRef::new("news", "post", None);
    store
        .transact(|tx| {
            for name in ["editor", "reader"] {
                tx.upsert_role(&RoleUpsert { name: name.into(), can_login: true, is_admin: false, private_labels: true })?;
            }
            tx.create_grant(NewGrant::new(Subject::Role(1), &topic, "see", true))?;
            tx.create_grant(NewGrant::new(Subject::Role(1), &topic, "view", false))?;
            tx.create_grant(NewGrant::new(Subject::Role(2), &topic, "see", true))?;
            tx.create_grant(NewGrant::new(Subject::User(7), &news, "see", false))?;
            tx.create_grant(NewGrant::new(Subject::Anyone, &news, "see", true))?;
            tx.create_grant(NewGrant::new(Subject::Role(1), &news, "edit", true))
        })
        .unwrap();
    store
}

#[test]
fn search_groups_every_subject_by_resource() {
    let store = mixed_subjects();
    let groups = search_grants(&store, &GrantFilter::default()).unwrap();
    let subjects: Vec<_> = groups.iter().map(|g| (g.id, g.subject)).collect();
    assert_eq!(
        subjects,
        vec![
            (1, Subject::Role(1)),
            (3, Subject::Role(2)),
            (4, Subject::User(7)),
            (5, Subject::Anyone),
            (6, Subject::Role(1)),
        ]
    );
    let editor_topic = &groups[0];
    assert_eq!(editor_topic.role_name, "editor");
    assert_eq!(editor_topic.item_id, Some(10));
    assert!(editor_topic.info.starts_with("Releases"));
    let actions: Vec<_> = editor_topic.actions.iter().map(|a| (a.name.as_str(), a.active)).collect();
    assert_eq!(actions, vec![("see", true), ("view", false)]);
    assert_eq!(groups[2].role_name, "");
}

#[test]
fn search_filters_combine() {
    let store = mixed_subjects();
    let count = |f: GrantFilter| search_grants(&store, &f).unwrap().len();

    assert_eq!(count(GrantFilter { role: Some("edit".into()), ..Default::default() }), 2);
    assert_eq!(count(GrantFilter { role: Some("r".into()), ..Default::default() }), 3);
    assert_eq!(count(GrantFilter { role: Some("nobody".into()), ..Default::default() }), 0);
    assert_eq!(count(GrantFilter { user_id: Some(7), ..Default::default() }), 1);
    assert_eq!(count(GrantFilter { anyone: true, ..Default::default() }), 1);
    assert_eq!(count(GrantFilter { active: Some(false), ..Default::default() }), 2);
    assert_eq!(count(GrantFilter { item_id: Some(0), ..Default::default() }), 3);
    let topic = GrantFilter {
        section: Some("forum".into()),
        item: Some("topic".into()),
        item_id: Some(10),
        ..Default::default()
    };
    assert_eq!(count(topic), 2);
    assert_eq!(count(GrantFilter { item: Some(String::new()), ..Default::default() }), 0);
}

#[test]
fn search_sorts_by_column() {
    let store = mixed_subjects();
    let mut groups = search_grants(&store, &GrantFilter::default()).unwrap();

    sort_subject_groups(&mut groups, SortField::Role, true);
    let roles: Vec<_> = groups.iter().map(|g| g.role_name.as_str()).collect();
    assert_eq!(roles, vec!["reader", "editor", "editor", "", ""]);

    sort_subject_groups(&mut groups, SortField::Section, false);
    let sections: Vec<_> = groups.iter().map(|g| g.section.as_str()).collect();
    assert_eq!(sections, vec!["forum", "forum", "news", "news", "news"]);

    sort_subject_groups(&mut groups, SortField::Id, false);
    assert_eq!(groups.iter().map(|g| g.id).collect::<Vec<_>>(), vec![1, 3, 4, 5, 6]);
    assert_eq!("item_id".parse::<SortField>().unwrap(), SortField::ItemId);
    assert!("colour".parse::<SortField>().is_err());
}

#[test]
fn search_propagates_enumeration_failure() {
    assert!(matches!(search_grants(&BrokenGrants, &GrantFilter::default()), Err(GrantError::Store(_))));
    let broken = BrokenLabels(mixed_subjects());
    let groups = search_grants(&broken, &GrantFilter::default()).unwrap();
    assert!(groups.iter().all(|g| g.role_name.is_empty()));
    assert!(search_grants(&broken, &GrantFilter { role: Some("edit".into()), ..Default::default() }).is_err());
}
