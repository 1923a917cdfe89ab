use std::collections::BTreeMap;

use pairwise_prioritizer::{
    SessionKey, SessionState, SessionStateStore, SqliteSessionStore, StoreError, ValueScore,
};
use tempfile::tempdir;

fn sample_state() -> SessionState {
    let mut choices = BTreeMap::new();
    choices.insert("Self-esteem-Trust".to_string(), "Self-esteem".to_string());
    choices.insert("Trust-Self-esteem".to_string(), "Self-esteem".to_string());
    SessionState {
        top15_values: vec!["Trust".to_string(), "Self-esteem".to_string(), "Joy".to_string()],
        final7_values: vec!["Self-esteem".to_string(), "Trust".to_string()],
        pairwise_choices: choices,
        value_scores: vec![
            ValueScore {
                value: "Self-esteem".to_string(),
                score: 1,
            },
            ValueScore {
                value: "Trust".to_string(),
                score: 0,
            },
        ],
    }
}

#[tokio::test]
async fn sessions_require_a_registered_method() {
    let dir = tempdir().unwrap();
    let store = SqliteSessionStore::new(dir.path().join("sessions.sqlite")).unwrap();
    let key = SessionKey::new("actor-1", "values");

    let err = store.fetch_or_create(&key).await.unwrap_err();
    assert!(matches!(err, StoreError::UnknownMethod(ref m) if m == "values"));
    let err = store.save(&key, &SessionState::empty()).await.unwrap_err();
    assert!(matches!(err, StoreError::UnknownMethod(_)));

    store
        .register_method("values", Some("core values workshop"))
        .await
        .unwrap();
    let created = store.fetch_or_create(&key).await.unwrap();
    assert_eq!(created.state, SessionState::empty());
    assert_eq!(created.created_at, created.updated_at);

    let methods = store.list_methods().await.unwrap();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].description.as_deref(), Some("core values workshop"));
}

#[tokio::test]
async fn saved_blob_round_trips_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sessions.sqlite");
    let key = SessionKey::new("actor-1", "values");
    let state = sample_state();
    {
        let store = SqliteSessionStore::new(&path).unwrap();
        store.register_method("values", None).await.unwrap();
        store.fetch_or_create(&key).await.unwrap();
        store.save(&key, &state).await.unwrap();
    }

    let store = SqliteSessionStore::new(&path).unwrap();
    let fetched = store.fetch_or_create(&key).await.unwrap();
    assert_eq!(fetched.state, state);

    let session = fetched.state.to_session().unwrap();
    assert_eq!(session.comparisons.winner("Trust", "Self-esteem"), Some("Self-esteem"));
    assert_eq!(SessionState::from_session(&session), state);
}

#[tokio::test]
async fn repeated_save_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = SqliteSessionStore::new(dir.path().join("sessions.sqlite")).unwrap();
    store.register_method("values", None).await.unwrap();
    let key = SessionKey::new("actor-1", "values");
    let state = sample_state();

    let first = store.save(&key, &state).await.unwrap();
    let second = store.save(&key, &state).await.unwrap();
    assert_eq!(first.state, second.state);
    assert_eq!(first.created_at, second.created_at);

    let sessions = store.list_sessions("actor-1").await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].state, state);
}

#[tokio::test]
async fn group_sessions_are_separate_rows() {
    let dir = tempdir().unwrap();
    let store = SqliteSessionStore::new(dir.path().join("sessions.sqlite")).unwrap();
    store.register_method("values", None).await.unwrap();

    let solo = SessionKey::new("actor-1", "values");
    let team = SessionKey::new("actor-1", "values").with_group("team-a");
    store.save(&team, &sample_state()).await.unwrap();
    store.fetch_or_create(&solo).await.unwrap();

    assert_eq!(
        store.get(&solo).await.unwrap().unwrap().state,
        SessionState::empty()
    );
    assert_eq!(store.get(&team).await.unwrap().unwrap().state, sample_state());
    assert!(store
        .get(&SessionKey::new("actor-2", "values"))
        .await
        .unwrap()
        .is_none());

    let mut keys: Vec<SessionKey> = store
        .list_sessions("actor-1")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.key)
        .collect();
    keys.sort_by_key(|k| k.to_string());
    assert_eq!(keys, vec![solo, team]);
}

#[tokio::test]
async fn lock_file_sits_next_to_the_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sessions.sqlite");
    let store = SqliteSessionStore::new(&path).unwrap();
    let lock = store.lock_exclusive().unwrap();
    assert!(dir.path().join("sessions.lock").exists());
    drop(lock);
    assert_eq!(store.path(), path.as_path());
}
