//! Data layer integration tests

use std::sync::Arc;
use std::time::Duration;

use tournd::api::{id_from_path, DataApi};
use tournd::common::Error;
use tournd::store::{CoordinationStore, LockMode};
use tournd::MemoryStore;

const LOCK_WAIT: Duration = Duration::from_millis(200);
const PASSWORD: &str = "s3cret";

async fn setup() -> (Arc<MemoryStore>, DataApi<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let mut api = DataApi::new(Arc::clone(&store), LOCK_WAIT);
    api.set_root_path(tournd::api::DEFAULT_ROOT_PATH)
        .await
        .unwrap();
    (store, api)
}

fn roster(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

async fn create(api: &DataApi<MemoryStore>, players: &[&str]) -> u64 {
    let path = api
        .create_tournament("Spring Open", 0, PASSWORD, &roster(players))
        .await
        .unwrap();
    id_from_path(&path).unwrap()
}

#[tokio::test]
async fn test_create_initializes_classification() {
    let (_, api) = setup().await;
    for n in 1..=5 {
        let names: Vec<String> = (0..n).map(|i| format!("player{i}")).collect();
        let path = api
            .create_tournament("Open", 0, PASSWORD, &names)
            .await
            .unwrap();
        let info = api.get_tournament(id_from_path(&path).unwrap()).await.unwrap();
        assert_eq!(info.classification.len(), n - 1);
        assert!(info.classification.chars().all(|c| c == 'U'));
    }
}

#[tokio::test]
async fn test_create_get_round_trip() {
    let (_, api) = setup().await;
    let path = api
        .create_tournament("Autumn Cup", 2, PASSWORD, &roster(&["ana", "bo", "cai"]))
        .await
        .unwrap();
    let id = id_from_path(&path).unwrap();

    let info = api.get_tournament(id).await.unwrap();
    assert_eq!(info.name, "Autumn Cup");
    assert_eq!(info.modality, 2);
    assert_eq!(info.version, 0);
    assert_eq!(info.classification, "UU");

    // Child enumeration is reverse creation order.
    let names: Vec<&str> = info.players.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["cai", "bo", "ana"]);
    for player in &info.players {
        assert_eq!(player.points, 0);
        assert_eq!(player.wins, 0);
        assert_eq!(player.losses, 0);
        assert!(!player.disqualified);
    }
}

#[tokio::test]
async fn test_create_rejects_empty_roster() {
    let (_, api) = setup().await;
    let err = api
        .create_tournament("Nobody", 0, PASSWORD, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedRequest(_)));
}

#[tokio::test]
async fn test_create_rolls_back_on_transaction_failure() {
    let (store, api) = setup().await;
    store.fail_next_transaction();

    let err = api
        .create_tournament("Doomed", 0, PASSWORD, &roster(&["ana", "bo"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StoreError(_)));

    // Either all nodes exist or none do.
    assert!(api.get_tournament_list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_bumps_version_and_classification() {
    let (_, api) = setup().await;
    let id = create(&api, &["ana", "bo", "cai"]).await;

    api.update_tournament(id, 0, "1U", PASSWORD).await.unwrap();

    let info = api.get_tournament(id).await.unwrap();
    assert_eq!(info.classification, "1U");
    assert_eq!(info.version, 1);
    // Known gap: player stats stay untouched by classification updates.
    assert!(info.players.iter().all(|p| p.wins == 0 && p.losses == 0));
}

#[tokio::test]
async fn test_update_with_stale_version_fails() {
    let (_, api) = setup().await;
    let id = create(&api, &["ana", "bo", "cai"]).await;

    api.update_tournament(id, 0, "1U", PASSWORD).await.unwrap();
    let err = api
        .update_tournament(id, 0, "2U", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::VersionMismatch {
            expected: 0,
            stored: 1
        }
    ));

    // The losing write left no trace.
    let info = api.get_tournament(id).await.unwrap();
    assert_eq!(info.classification, "1U");
    assert_eq!(info.version, 1);
}

#[tokio::test]
async fn test_update_with_wrong_password_fails() {
    let (_, api) = setup().await;
    let id = create(&api, &["ana", "bo"]).await;

    let err = api
        .update_tournament(id, 0, "1", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PasswordMismatch));

    let info = api.get_tournament(id).await.unwrap();
    assert_eq!(info.classification, "U");
    assert_eq!(info.version, 0);
}

#[tokio::test]
async fn test_update_rejects_bad_symbol_before_locking() {
    let (store, api) = setup().await;
    let id = create(&api, &["ana", "bo"]).await;

    // Hold the exclusive lock: a validation-first update must fail on the
    // symbol, never on the lock.
    let _held = store
        .lock("/tournd/t0000000000", LockMode::Exclusive, LOCK_WAIT)
        .await
        .unwrap();
    let err = api.update_tournament(id, 0, "X", PASSWORD).await.unwrap_err();
    assert!(matches!(err, Error::ClassificationValue('X')));
}

#[tokio::test]
async fn test_update_rejects_wrong_length() {
    let (_, api) = setup().await;
    let id = create(&api, &["ana", "bo", "cai"]).await;

    let err = api
        .update_tournament(id, 0, "1", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ClassificationLength {
            expected: 2,
            actual: 1
        }
    ));
}

#[tokio::test]
async fn test_update_while_locked_times_out() {
    let (store, api) = setup().await;
    let id = create(&api, &["ana", "bo"]).await;

    let _held = store
        .lock("/tournd/t0000000000", LockMode::Exclusive, LOCK_WAIT)
        .await
        .unwrap();
    let err = api.update_tournament(id, 0, "1", PASSWORD).await.unwrap_err();
    assert!(matches!(err, Error::LockTimeout(_, _)));

    drop(_held);
    // The failed attempt released nothing it should not have: a fresh
    // update goes through.
    api.update_tournament(id, 0, "1", PASSWORD).await.unwrap();
}

#[tokio::test]
async fn test_get_succeeds_under_shared_lock() {
    let (store, api) = setup().await;
    let id = create(&api, &["ana", "bo"]).await;

    // A concurrent reader holds the shared lock; reads are compatible.
    let _reader = store
        .lock("/tournd/t0000000000", LockMode::Shared, LOCK_WAIT)
        .await
        .unwrap();
    let info = api.get_tournament(id).await.unwrap();
    assert_eq!(info.players.len(), 2);
}

#[tokio::test]
async fn test_get_filters_lock_artifacts() {
    let (store, api) = setup().await;
    let id = create(&api, &["ana", "bo", "cai"]).await;

    // Readers see the artifact as a sibling of the players and must skip it.
    let _reader = store
        .lock("/tournd/t0000000000", LockMode::Shared, LOCK_WAIT)
        .await
        .unwrap();
    let raw_children = store.get_children("/tournd/t0000000000").await.unwrap();
    assert_eq!(raw_children.len(), 4);

    let info = api.get_tournament(id).await.unwrap();
    assert_eq!(info.players.len(), 3);
}

#[tokio::test]
async fn test_get_missing_tournament() {
    let (_, api) = setup().await;
    let err = api.get_tournament(99).await.unwrap_err();
    assert!(matches!(err, Error::NoSuchNode(_)));
}

#[tokio::test]
async fn test_delete_with_wrong_password_keeps_tournament() {
    let (_, api) = setup().await;
    let id = create(&api, &["ana", "bo"]).await;

    let err = api.delete_tournament(id, "wrong").await.unwrap_err();
    assert!(matches!(err, Error::PasswordMismatch));
    assert!(api.get_tournament(id).await.is_ok());
}

#[tokio::test]
async fn test_delete_removes_tournament_and_players() {
    let (store, api) = setup().await;
    let id = create(&api, &["ana", "bo"]).await;

    api.delete_tournament(id, PASSWORD).await.unwrap();

    let err = api.get_tournament(id).await.unwrap_err();
    assert!(matches!(err, Error::NoSuchNode(_)));
    // Player children went with it.
    assert!(store.get_children("/tournd/t0000000000").await.is_err());
}

#[tokio::test]
async fn test_delete_absent_is_success() {
    let (_, api) = setup().await;
    let id = create(&api, &["ana"]).await;

    api.delete_tournament(id, PASSWORD).await.unwrap();
    // Second delete of the same id: idempotent success, any password.
    api.delete_tournament(id, "whatever").await.unwrap();
    api.delete_tournament(404, "whatever").await.unwrap();
}

#[tokio::test]
async fn test_list_matches_live_state() {
    let (_, api) = setup().await;
    api.create_tournament("A", 0, PASSWORD, &roster(&["p1", "p2"]))
        .await
        .unwrap();
    api.create_tournament("B", 1, PASSWORD, &roster(&["p1", "p2", "p3"]))
        .await
        .unwrap();

    let mut list = api.get_tournament_list().await.unwrap();
    list.sort_by_key(|t| t.id);
    assert_eq!(list.len(), 2);
    assert_eq!((list[0].id, list[0].name.as_str(), list[0].players), (0, "A", 2));
    assert_eq!((list[1].id, list[1].name.as_str(), list[1].players), (1, "B", 3));

    // Entries track live child counts.
    for entry in &list {
        let info = api.get_tournament(entry.id).await.unwrap();
        assert_eq!(entry.players, info.players.len());
    }
}

#[tokio::test]
async fn test_set_root_path_rebinds_and_creates() {
    let (store, api) = setup().await;
    let mut api = api;
    api.set_root_path("/custom/root").await.unwrap();

    let path = api
        .create_tournament("Elsewhere", 0, PASSWORD, &roster(&["ana"]))
        .await
        .unwrap();
    assert!(path.starts_with("/custom/root/t"));
    assert_eq!(store.get_children("/custom/root").await.unwrap().len(), 1);
}
