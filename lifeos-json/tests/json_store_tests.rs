use chrono::{TimeZone, Utc};
use lifeos_core::{schedule, AccessControl, CardLearningState, CardStore, CoreError, Grade};
use lifeos_json::JsonStore;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn states_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("recall.json");
    let backups = dir.path().join("backups");
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
    let user = Uuid::new_v4();
    let project = Uuid::new_v4();

    let card_id = {
        let store = JsonStore::open_with(file.clone(), backups.clone(), 3).await.unwrap();
        store.grant(user, project).await.unwrap();
        let card = store
            .add_card(project, "hola", "hello", Some("greeting"), &["es".into()], now)
            .await
            .unwrap();
        let next = schedule(&CardLearningState::Unreviewed, Grade::Easy, now).unwrap();
        let v = store
            .put_state(user, card.id, 0, &CardLearningState::Reviewed(next))
            .await
            .unwrap();
        assert_eq!(v, 1);
        card.id
    };

    let store = JsonStore::open_with(file, backups.clone(), 3).await.unwrap();
    assert!(store.has_access(user, project).await.unwrap());
    let card = store.get_card(card_id).await.unwrap();
    assert_eq!(card.hint.as_deref(), Some("greeting"));
    let state = store.get_state(user, card_id).await.unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.value.reviewed().unwrap().repetitions, 1);

    let kept = std::fs::read_dir(&backups).unwrap().count();
    assert!(kept >= 1 && kept <= 3);
}

#[tokio::test]
async fn compare_and_swap_and_cascade() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::open_with(
        dir.path().join("recall.json"),
        dir.path().join("backups"),
        2,
    )
    .await
    .unwrap();
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
    let user = Uuid::new_v4();
    let project = Uuid::new_v4();
    let card = store.add_card(project, "q", "a", None, &[], now).await.unwrap();

    let next = CardLearningState::Reviewed(
        schedule(&CardLearningState::Unreviewed, Grade::Good, now).unwrap(),
    );
    store.put_state(user, card.id, 0, &next).await.unwrap();
    assert!(matches!(
        store.put_state(user, card.id, 0, &next).await,
        Err(CoreError::Conflict(_))
    ));
    assert_eq!(store.put_state(user, card.id, 1, &next).await.unwrap(), 2);

    store.delete_card(card.id).await.unwrap();
    assert!(store.list_entries(user, Some(project)).await.unwrap().is_empty());
    assert!(matches!(
        store.put_state(user, card.id, 0, &next).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_all_reach_disk() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("recall.json");
    let backups = dir.path().join("backups");
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
    let user = Uuid::new_v4();
    let project = Uuid::new_v4();

    let store = Arc::new(JsonStore::open_with(file.clone(), backups.clone(), 2).await.unwrap());
    let mut cards = Vec::new();
    for i in 0..12 {
        let card = store
            .add_card(project, &format!("q{i}"), "a", None, &[], now)
            .await
            .unwrap();
        cards.push(card.id);
    }

    let next = CardLearningState::Reviewed(
        schedule(&CardLearningState::Unreviewed, Grade::Good, now).unwrap(),
    );
    let writers: Vec<_> = cards
        .iter()
        .map(|&card_id| {
            let store = store.clone();
            let next = next.clone();
            tokio::spawn(async move { store.put_state(user, card_id, 0, &next).await })
        })
        .collect();
    for w in writers {
        assert_eq!(w.await.unwrap().unwrap(), 1);
    }
    drop(store);

    let reopened = JsonStore::open_with(file, backups, 2).await.unwrap();
    for card_id in cards {
        assert_eq!(reopened.get_state(user, card_id).await.unwrap().version, 1);
    }
}

#[tokio::test]
async fn failed_write_leaves_memory_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("recall.json");
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
    let user = Uuid::new_v4();
    let store = JsonStore::open_with(file.clone(), dir.path().join("backups"), 2)
        .await
        .unwrap();
    let card = store.add_card(Uuid::new_v4(), "q", "a", None, &[], now).await.unwrap();

    // A directory in place of the store file makes the final rename fail.
    std::fs::remove_file(&file).unwrap();
    std::fs::create_dir(&file).unwrap();

    let next = CardLearningState::Reviewed(
        schedule(&CardLearningState::Unreviewed, Grade::Good, now).unwrap(),
    );
    assert!(matches!(
        store.put_state(user, card.id, 0, &next).await,
        Err(CoreError::Storage(_))
    ));
    let state = store.get_state(user, card.id).await.unwrap();
    assert_eq!(state.version, 0);
    assert!(state.value.is_new());

    std::fs::remove_dir(&file).unwrap();
    assert_eq!(store.put_state(user, card.id, 0, &next).await.unwrap(), 1);
}

