use chrono::Duration;
use progress_core::model::{ContentKey, ProgressState, SectionId};
use progress_core::time::fixed_now;
use storage::repository::{ProgressCacheRepository, Storage, StorageError, TokenRepository};
use storage::sqlite::SqliteRepository;

fn sample_progress() -> ProgressState {
    ProgressState::from_persisted(
        35.0,
        14.5,
        312.0,
        false,
        vec![SectionId::new("warmup"), SectionId::new("scales")],
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_token_slot_round_trips() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_tokens?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    assert_eq!(repo.get_token().await.unwrap(), None);

    repo.save_token("first").await.unwrap();
    repo.save_token("second").await.unwrap();
    assert_eq!(repo.get_token().await.unwrap().as_deref(), Some("second"));

    repo.clear_token().await.unwrap();
    assert_eq!(repo.get_token().await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_progress_cache_upserts_by_content_key() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_progress?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let tutorial = ContentKey::tutorial("t1");
    let course = ContentKey::course("t1");

    repo.upsert_progress(&tutorial, &sample_progress(), fixed_now())
        .await
        .unwrap();

    assert!(matches!(
        repo.get_progress(&course).await,
        Err(StorageError::NotFound)
    ));

    let cached = repo.get_progress(&tutorial).await.unwrap();
    assert_eq!(cached.key, tutorial);
    assert_eq!(cached.progress, sample_progress());
    assert_eq!(cached.updated_at, fixed_now());

    let mut finished = sample_progress();
    finished.progress_percentage = 100.0;
    let later = fixed_now() + Duration::minutes(5);
    repo.upsert_progress(&tutorial, &finished, later).await.unwrap();

    let cached = repo.get_progress(&tutorial).await.unwrap();
    assert!(cached.progress.is_completed);
    assert_eq!(
        cached.progress.completed_sections,
        vec![SectionId::new("warmup"), SectionId::new("scales")]
    );
    assert_eq!(cached.updated_at, later);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.migrate().await.expect("second migrate");
}

#[tokio::test]
async fn storage_facade_uses_sqlite_backend() {
    let storage = Storage::sqlite("sqlite:file:memdb_facade?mode=memory&cache=shared")
        .await
        .expect("storage");
    storage.tokens.save_token("bearer").await.unwrap();
    assert_eq!(
        storage.tokens.get_token().await.unwrap().as_deref(),
        Some("bearer")
    );
}
