mod common;

use common::{check_import, registry, user};
use definition_registry::AppError;
use definition_registry::db::enums::{DefinitionKind, DefinitionStatus};

#[tokio::test]
async fn test_new_check_gets_fresh_snapshot() {
    let registry = registry().await;
    let u1 = user("u1", &["A"]);

    let before = registry.current_snapshot_id(DefinitionKind::Check).await.unwrap();
    let result = registry
        .create_or_update_check_definition(check_import("foo", Some("A")), &u1)
        .await
        .unwrap();

    assert!(result.is_new_entity);
    assert!(!result.permission_denied);
    assert!(result.snapshot_id > before);

    let check = result.entity.unwrap();
    assert_eq!(check.owning_team, "A");
    assert_eq!(check.created_by, "u1");
    assert_eq!(check.last_modified_by, "u1");
    assert_eq!(check.last_modified_snapshot_id, result.snapshot_id);
    assert_eq!(
        registry.current_snapshot_id(DefinitionKind::Check).await.unwrap(),
        result.snapshot_id
    );
}

#[tokio::test]
async fn test_team_ownership_scenario() {
    let registry = registry().await;
    let u1 = user("u1", &["A"]);
    let u2 = user("u2", &["B"]);
    let u3 = user("u3", &["A"]);

    // No owning team given: the creator's first team owns it.
    let created = registry
        .create_or_update_check_definition(check_import("foo", None), &u1)
        .await
        .unwrap();
    assert!(created.is_new_entity);
    let foo = created.entity.unwrap();
    assert_eq!(foo.owning_team, "A");

    let mut by_key = check_import("foo", Some("A"));
    by_key.command = "http('http://evil').code()".to_string();
    let denied = registry
        .create_or_update_check_definition(by_key, &u2)
        .await
        .unwrap();
    assert!(denied.permission_denied);
    assert!(!denied.is_new_entity);
    assert_eq!(denied.snapshot_id, created.snapshot_id);

    let mut by_id = check_import("foo", None);
    by_id.id = Some(foo.id);
    let denied = registry
        .create_or_update_check_definition(by_id, &u2)
        .await
        .unwrap();
    assert!(denied.permission_denied);

    let stored = registry
        .get_check_definitions_by_ids(None, &[foo.id])
        .await
        .unwrap();
    assert_eq!(stored, vec![foo.clone()]);

    let mut update = check_import("foo", None);
    update.interval = 30;
    let updated = registry
        .create_or_update_check_definition(update, &u3)
        .await
        .unwrap();
    assert!(!updated.permission_denied);
    assert!(!updated.is_new_entity);
    assert!(updated.snapshot_id > created.snapshot_id);

    let check = updated.entity.unwrap();
    assert_eq!(check.id, foo.id);
    assert_eq!(check.interval, 30);
    assert_eq!(check.created_by, "u1");
    assert_eq!(check.last_modified_by, "u3");
}

#[tokio::test]
async fn test_last_author_may_modify_after_leaving_team() {
    let registry = registry().await;
    let created = registry
        .create_or_update_check_definition(check_import("bar", Some("A")), &user("u1", &["A"]))
        .await
        .unwrap();

    let moved_on = user("u1", &["C"]);
    let result = registry
        .create_or_update_check_definition(check_import("bar", Some("A")), &moved_on)
        .await
        .unwrap();

    assert!(!result.permission_denied);
    assert_eq!(result.entity.unwrap().id, created.entity.unwrap().id);
}

#[tokio::test]
async fn test_create_for_foreign_team_is_denied() {
    let registry = registry().await;
    let result = registry
        .create_or_update_check_definition(check_import("foo", Some("B")), &user("u1", &["A"]))
        .await
        .unwrap();

    assert!(result.permission_denied);
    assert!(result.entity.is_none());
    assert_eq!(result.snapshot_id, 0);
    assert!(registry.get_check_definitions(None).await.unwrap().definitions.is_empty());
}

#[tokio::test]
async fn test_teamless_caller_cannot_create() {
    let registry = registry().await;
    let nobody = user("u1", &[]);

    let implicit = registry
        .create_or_update_check_definition(check_import("orphan", None), &nobody)
        .await
        .unwrap();
    assert!(implicit.permission_denied);
    assert!(implicit.entity.is_none());

    let explicit = registry
        .create_or_update_check_definition(check_import("orphan", Some("A")), &nobody)
        .await
        .unwrap();
    assert!(explicit.permission_denied);

    assert_eq!(registry.current_snapshot_id(DefinitionKind::Check).await.unwrap(), 0);
    assert!(registry.get_check_definitions(None).await.unwrap().definitions.is_empty());
}

#[tokio::test]
async fn test_teamless_author_keeps_modify_rights() {
    let registry = registry().await;
    let created = registry
        .create_or_update_check_definition(check_import("foo", Some("A")), &user("u1", &["A"]))
        .await
        .unwrap();
    let id = created.entity.unwrap().id;

    let mut update = check_import("foo", None);
    update.id = Some(id);
    update.interval = 15;
    let result = registry
        .create_or_update_check_definition(update, &user("u1", &[]))
        .await
        .unwrap();

    assert!(!result.permission_denied);
    let check = result.entity.unwrap();
    assert_eq!(check.owning_team, "A");
    assert_eq!(check.interval, 15);
}

#[tokio::test]
async fn test_source_url_match_renames_in_place() {
    let registry = registry().await;
    let u1 = user("u1", &["A"]);

    let mut import = check_import("old name", Some("A"));
    import.source_url = Some("git://checks/http.yaml".to_string());
    let created = registry
        .create_or_update_check_definition(import, &u1)
        .await
        .unwrap();
    let id = created.entity.unwrap().id;

    let mut renamed = check_import("new name", None);
    renamed.source_url = Some("git://checks/http.yaml".to_string());
    let result = registry
        .create_or_update_check_definition(renamed, &u1)
        .await
        .unwrap();

    assert!(!result.is_new_entity);
    let check = result.entity.unwrap();
    assert_eq!(check.id, id);
    assert_eq!(check.name, "new name");
    assert_eq!(check.owning_team, "A");
    assert_eq!(registry.get_check_definitions(None).await.unwrap().definitions.len(), 1);
}

#[tokio::test]
async fn test_rename_onto_existing_key_is_rejected() {
    let registry = registry().await;
    let u1 = user("u1", &["A"]);

    let first = registry
        .create_or_update_check_definition(check_import("first", Some("A")), &u1)
        .await
        .unwrap();
    registry
        .create_or_update_check_definition(check_import("second", Some("A")), &u1)
        .await
        .unwrap();
    let before = registry.current_snapshot_id(DefinitionKind::Check).await.unwrap();

    let mut rename = check_import("second", Some("A"));
    rename.id = first.entity.map(|c| c.id);
    let result = registry.create_or_update_check_definition(rename, &u1).await;

    assert!(matches!(result, Err(AppError::DuplicateDefinition(_))));
    assert_eq!(
        registry.current_snapshot_id(DefinitionKind::Check).await.unwrap(),
        before
    );
}

#[tokio::test]
async fn test_invalid_import_fails_before_store_access() {
    let registry = registry().await;
    let mut import = check_import("  ", Some("A"));
    import.interval = 0;

    let result = registry
        .create_or_update_check_definition(import, &user("u1", &["A"]))
        .await;

    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert_eq!(registry.current_snapshot_id(DefinitionKind::Check).await.unwrap(), 0);
}

#[tokio::test]
async fn test_queries_by_status_ids_and_teams() {
    let registry = registry().await;
    let u = user("u1", &["A", "B"]);

    let active = registry
        .create_or_update_check_definition(check_import("active", Some("A")), &u)
        .await
        .unwrap()
        .entity
        .unwrap();
    let mut inactive_import = check_import("inactive", Some("B"));
    inactive_import.status = DefinitionStatus::Inactive;
    let inactive = registry
        .create_or_update_check_definition(inactive_import, &u)
        .await
        .unwrap()
        .entity
        .unwrap();

    let all = registry.get_check_definitions(None).await.unwrap();
    assert_eq!(all.definitions.len(), 2);
    assert_eq!(all.snapshot_id, 2);

    let only_active = registry
        .get_check_definitions(Some(DefinitionStatus::Active))
        .await
        .unwrap();
    assert_eq!(only_active.definitions, vec![active.clone()]);

    let only_inactive = registry
        .get_check_definitions(Some(DefinitionStatus::Inactive))
        .await
        .unwrap();
    assert_eq!(only_inactive.definitions, vec![inactive.clone()]);

    let by_ids = registry
        .get_check_definitions_by_ids(None, &[inactive.id, 999, active.id])
        .await
        .unwrap();
    assert_eq!(by_ids, vec![active.clone(), inactive.clone()]);

    let by_team = registry
        .get_check_definitions_by_owning_teams(None, &["B".to_string(), "X".to_string()])
        .await
        .unwrap();
    assert_eq!(by_team, vec![inactive]);

    assert!(registry
        .get_check_definitions_by_ids(None, &[])
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_delete_is_soft_and_idempotent() {
    let registry = registry().await;
    let u1 = user("u1", &["A"]);

    let created = registry
        .create_or_update_check_definition(check_import("foo", Some("A")), &u1)
        .await
        .unwrap();
    let id = created.entity.unwrap().id;

    let missing = registry.delete_check_definition(&u1, "nope", "A").await.unwrap();
    assert!(missing.entity.is_none());
    assert!(!missing.permission_denied);
    assert_eq!(
        registry.current_snapshot_id(DefinitionKind::Check).await.unwrap(),
        created.snapshot_id
    );

    let denied = registry
        .delete_check_definition(&user("u2", &["B"]), "foo", "A")
        .await
        .unwrap();
    assert!(denied.permission_denied);
    assert_eq!(denied.entity.unwrap().status, DefinitionStatus::Active);

    let deleted = registry.delete_check_definition(&u1, "foo", "A").await.unwrap();
    let check = deleted.entity.unwrap();
    assert_eq!(check.status, DefinitionStatus::Deleted);
    assert!(check.last_modified_snapshot_id > created.snapshot_id);

    let again = registry.delete_check_definition(&u1, "foo", "A").await.unwrap();
    assert!(again.entity.is_none());

    // Row still exists, only its status changed.
    let stored = registry.get_check_definitions_by_ids(None, &[id]).await.unwrap();
    assert_eq!(stored[0].status, DefinitionStatus::Deleted);

    // A deleted row no longer claims its natural key.
    let recreated = registry
        .create_or_update_check_definition(check_import("foo", Some("A")), &u1)
        .await
        .unwrap();
    assert!(recreated.is_new_entity);
    assert_ne!(recreated.entity.unwrap().id, id);
}

#[tokio::test]
async fn test_concurrent_imports_get_distinct_snapshots() {
    let registry = registry().await;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .create_or_update_check_definition(
                        check_import(&format!("check-{i}"), Some("A")),
                        &user("u1", &["A"]),
                    )
                    .await
            })
        })
        .collect();

    let mut snapshots = Vec::new();
    for handle in handles {
        snapshots.push(handle.await.unwrap().unwrap().snapshot_id);
    }
    snapshots.sort_unstable();

    assert_eq!(snapshots, (1..=8).collect::<Vec<i64>>());
    assert_eq!(registry.current_snapshot_id(DefinitionKind::Check).await.unwrap(), 8);
}
