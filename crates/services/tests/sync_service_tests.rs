//! End-to-end sync behavior over an in-memory record store.

mod common;

use std::sync::Arc;

use common::*;
use db::models::{account::Account, user::CachedUser};
use ragic::{ListQuery, RagicEntity, RagicRepository};
use serde_json::json;
use services::services::{
    account_sync::{AccountSyncService, RagicAccount},
    sync::{RecordSync, SyncError, SyncPhase},
    sync_manager::{SyncManager, SyncManagerError, WebhookAction},
    user_sync::UserSyncService,
};

fn user_service(store: &Arc<InMemoryStore>, db: &db::DBService) -> UserSyncService {
    UserSyncService::new(
        Arc::clone(store) as Arc<dyn ragic::RecordStore>,
        test_registry(),
        db.clone(),
        test_cipher(),
    )
    .unwrap()
}

fn account_service(store: &Arc<InMemoryStore>, db: &db::DBService) -> AccountSyncService {
    AccountSyncService::new(
        Arc::clone(store) as Arc<dyn ragic::RecordStore>,
        test_registry(),
        db.clone(),
        test_cipher(),
    )
    .unwrap()
}

#[tokio::test]
async fn full_sync_upserts_one_row_per_remote_record() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(USER_SHEET, 1, user_record("U001", "a@example.com", "Alice"));
    store.insert(USER_SHEET, 2, user_record("U002", "b@example.com", "Bob"));
    store.insert(USER_SHEET, 3, user_record("U003", "c@example.com", "Cara"));

    let db = test_db().await;
    let service = user_service(&store, &db);

    let result = service.sync_all_data().await;
    assert_eq!(result.synced, 3);
    assert_eq!(result.errors, 0);
    assert_eq!(service.phase(), SyncPhase::Idle);
    assert_eq!(CachedUser::count(&db.pool).await.unwrap(), 3);

    let cipher = test_cipher();
    let row = CachedUser::find_by_ragic_id(&db.pool, 2).await.unwrap().unwrap();
    assert_eq!(row.display_name.as_deref(), Some("Bob"));
    assert_eq!(cipher.decrypt(&row.email).unwrap(), "b@example.com");
    assert_eq!(row.email_hash, cipher.blind_index("b@example.com"));
}

#[tokio::test]
async fn repeated_sync_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(USER_SHEET, 1, user_record("U001", "a@example.com", "Alice"));
    store.insert(USER_SHEET, 2, user_record("U002", "b@example.com", "Bob"));

    let db = test_db().await;
    let service = user_service(&store, &db);

    let first = service.sync_all_data().await;
    let second = service.sync_all_data().await;

    assert_eq!(first.synced, 2);
    assert_eq!(second.synced, 2);
    assert_eq!(second.errors, 0);
    assert_eq!(CachedUser::count(&db.pool).await.unwrap(), 2);
}

#[tokio::test]
async fn one_bad_record_does_not_abort_the_batch() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(ACCOUNT_SHEET, 1, {
        let mut fields = account_record("A001", "Alice", "a@example.com");
        fields.insert(ACCOUNT_APPROVAL_DATE.to_string(), json!("2024-03-01"));
        fields
    });
    store.insert(ACCOUNT_SHEET, 2, {
        let mut fields = account_record("A002", "Bob", "b@example.com");
        fields.insert(ACCOUNT_APPROVAL_DATE.to_string(), json!("not-a-date"));
        fields
    });
    store.insert(ACCOUNT_SHEET, 3, account_record("A003", "Cara", "c@example.com"));

    let db = test_db().await;
    let service = account_service(&store, &db);

    let result = service.sync_all_data().await;
    assert_eq!(result.synced, 2);
    assert_eq!(result.errors, 1);
    assert!(result.error_messages[0].contains("APPROVAL_DATE"));
    assert!(result.error_messages[0].contains("not-a-date"));
    assert_eq!(Account::count(&db.pool).await.unwrap(), 2);
    assert!(Account::find_by_ragic_id(&db.pool, 2).await.unwrap().is_none());
}

#[tokio::test]
async fn remote_fetch_failure_aborts_the_run_as_failed() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_listings(true);

    let db = test_db().await;
    let service = user_service(&store, &db);

    let result = service.sync_all_data().await;
    assert_eq!(result.errors, 1);
    assert_eq!(result.synced, 0);
    assert_eq!(service.phase(), SyncPhase::Failed);
    assert_eq!(CachedUser::count(&db.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn blank_email_falls_back_to_identity_cache_by_display_name() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(USER_SHEET, 10, user_record("U010", "chen@example.com", "Chen Yi"));
    store.insert(ACCOUNT_SHEET, 20, account_record("A020", "Chen Yi", ""));

    let db = test_db().await;
    user_service(&store, &db).sync_all_data().await;

    let service = account_service(&store, &db);
    let result = service.sync_all_data().await;

    assert_eq!(result.synced, 1);
    assert_eq!(result.skipped, 0);

    let cipher = test_cipher();
    let row = Account::find_by_ragic_id(&db.pool, 20).await.unwrap().unwrap();
    assert_eq!(
        cipher.decrypt(row.primary_email.as_deref().unwrap()).unwrap(),
        "chen@example.com"
    );
    assert_eq!(
        row.primary_email_hash.as_deref(),
        Some(cipher.blind_index("chen@example.com").as_str())
    );
}

#[tokio::test]
async fn blank_email_with_no_identity_match_skips_with_warning() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(ACCOUNT_SHEET, 21, account_record("A021", "Nobody Known", ""));

    let db = test_db().await;
    let service = account_service(&store, &db);

    let result = service.sync_all_data().await;
    assert_eq!(result.synced, 0);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.errors, 0);
    assert!(result.warnings[0].contains("Nobody Known"));
    assert_eq!(Account::count(&db.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn ambiguous_display_name_match_is_not_used() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(USER_SHEET, 1, user_record("U001", "a@example.com", "Chen Yi"));
    store.insert(USER_SHEET, 2, user_record("U002", "b@example.com", "Chen Yi"));
    store.insert(ACCOUNT_SHEET, 3, account_record("A003", "Chen Yi", ""));

    let db = test_db().await;
    user_service(&store, &db).sync_all_data().await;

    let result = account_service(&store, &db).sync_all_data().await;
    assert_eq!(result.skipped, 1);
    assert_eq!(Account::count(&db.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn single_record_sync_and_delete_round_trip() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(USER_SHEET, 42, user_record("U042", "x@example.com", "Xavier"));

    let db = test_db().await;
    let service = user_service(&store, &db);

    service.sync_record(42).await.unwrap();
    assert!(CachedUser::find_by_ragic_id(&db.pool, 42).await.unwrap().is_some());

    assert!(service.delete_record(42).await.unwrap());
    assert!(!service.delete_record(42).await.unwrap());
    assert!(CachedUser::find_by_ragic_id(&db.pool, 42).await.unwrap().is_none());

    assert!(matches!(
        service.sync_record(999).await,
        Err(SyncError::RecordNotFound(999))
    ));
}

#[tokio::test]
async fn manager_dispatches_webhooks_by_source_key() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(USER_SHEET, 42, user_record("U042", "x@example.com", "Xavier"));

    let db = test_db().await;
    let manager = SyncManager::new();
    manager
        .register(
            "core_user",
            "User Identity",
            "core",
            Arc::new(user_service(&store, &db)),
            true,
        )
        .unwrap();

    let result = manager
        .handle_webhook("core_user", 42, WebhookAction::Update)
        .await
        .unwrap();
    assert_eq!(result.synced, 1);
    assert!(CachedUser::find_by_ragic_id(&db.pool, 42).await.unwrap().is_some());

    let result = manager
        .handle_webhook("core_user", 42, WebhookAction::Delete)
        .await
        .unwrap();
    assert_eq!(result.deleted, 1);
    assert_eq!(CachedUser::count(&db.pool).await.unwrap(), 0);

    assert!(matches!(
        manager.handle_webhook("unknown", 1, WebhookAction::Update).await,
        Err(SyncManagerError::UnknownKey(_))
    ));
}

#[tokio::test]
async fn repository_save_creates_then_updates() {
    let store = Arc::new(InMemoryStore::new());
    let repo: RagicRepository<RagicAccount> = RagicRepository::new(
        Arc::clone(&store) as Arc<dyn ragic::RecordStore>,
        test_registry(),
    );

    let account = RagicAccount {
        account_id: Some("A100".to_string()),
        name: Some("Dana".to_string()),
        status: true,
        emails: Some("dana@example.com".to_string()),
        ..RagicAccount::default()
    };

    let saved = repo.save(account).await.unwrap();
    let ragic_id = saved.ragic_id().unwrap();

    let mut renamed = saved;
    renamed.name = Some("Dana L.".to_string());
    repo.save(renamed).await.unwrap();

    let fetched = repo.get(ragic_id).await.unwrap().unwrap().unwrap();
    assert_eq!(fetched.name.as_deref(), Some("Dana L."));

    let by_name = repo.find_by("NAME", "Dana L.").await.unwrap();
    assert_eq!(by_name.len(), 1);

    repo.delete_by_id(ragic_id).await.unwrap();
    assert!(repo.get(ragic_id).await.unwrap().is_none());
}

#[tokio::test]
async fn find_all_reports_per_record_outcomes() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(ACCOUNT_SHEET, 1, account_record("A001", "Alice", "a@example.com"));
    store.insert(ACCOUNT_SHEET, 2, {
        let mut fields = account_record("A002", "Bob", "b@example.com");
        fields.insert(ACCOUNT_APPROVAL_DATE.to_string(), json!("garbage"));
        fields
    });

    let repo: RagicRepository<RagicAccount> = RagicRepository::new(
        Arc::clone(&store) as Arc<dyn ragic::RecordStore>,
        test_registry(),
    );

    let outcomes = repo.find_all(&ListQuery::default()).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].is_err());
}
