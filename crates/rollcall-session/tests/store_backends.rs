//! `SessionStore` against both backends, plus collision and outage
//! behaviour using a scripted repository.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rollcall_protocol::{Session, UserId};
use rollcall_session::{SessionError, SessionPolicy, SessionStore, is_valid};
use rollcall_store::{MemoryStore, SessionRepository, SqliteStore, StoreError, UniqueKey};

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

async fn create_and_resolve<R: SessionRepository>(repo: Arc<R>) {
    let store = SessionStore::new(repo, SessionPolicy::default());
    let owner = UserId::new("teacher-1");
    let t0 = Utc.with_ymd_and_hms(2025, 9, 8, 10, 0, 0).unwrap();

    let created = store.create_at("Algebra I", &owner, minutes(30), t0).await.unwrap();
    let resolved = store.resolve_by_token(&created.token).await.unwrap();

    assert_eq!(resolved, created);
    assert!(is_valid(&resolved, t0 + chrono::Duration::minutes(29)));
    assert!(!is_valid(&resolved, t0 + chrono::Duration::minutes(30)));
    assert_eq!(store.list_by_owner(&owner).await.unwrap(), vec![created]);
}

#[tokio::test]
async fn test_create_and_resolve_memory() {
    create_and_resolve(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_create_and_resolve_sqlite() {
    create_and_resolve(Arc::new(SqliteStore::in_memory().await.unwrap())).await;
}

#[tokio::test]
async fn test_sub_millisecond_duration_round_trips_sqlite() {
    let store = SessionStore::new(
        Arc::new(SqliteStore::in_memory().await.unwrap()),
        SessionPolicy::default(),
    );
    let t0 = Utc.with_ymd_and_hms(2025, 9, 8, 10, 0, 0).unwrap();

    let created = store
        .create_at("A", &UserId::new("t1"), minutes(30) + Duration::from_micros(500), t0)
        .await
        .unwrap();
    let resolved = store.resolve_by_token(&created.token).await.unwrap();

    assert_eq!(resolved, created);
    assert_eq!(created.expires_at, t0 + chrono::Duration::minutes(30));
}

/// Fails the first `collisions` inserts with a token violation, then
/// behaves like a memory store. With `stall` set, lookups never finish.
struct ScriptedRepo {
    inner: MemoryStore,
    collisions: u32,
    attempts: AtomicU32,
    stall: bool,
}

impl ScriptedRepo {
    fn new(collisions: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            collisions,
            attempts: AtomicU32::new(0),
            stall: false,
        }
    }
}

impl SessionRepository for ScriptedRepo {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.collisions {
            return Err(StoreError::UniqueViolation(UniqueKey::SessionToken));
        }
        self.inner.insert_session(session).await
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.inner.find_session_by_token(token).await
    }

    async fn sessions_by_owner(&self, owner_id: &UserId) -> Result<Vec<Session>, StoreError> {
        self.inner.sessions_by_owner(owner_id).await
    }
}

#[tokio::test]
async fn test_create_token_collision_retries_with_fresh_token() {
    let repo = Arc::new(ScriptedRepo::new(2));
    let store = SessionStore::new(Arc::clone(&repo), SessionPolicy::default());

    let session = store
        .create("Algebra I", &UserId::new("t1"), minutes(30))
        .await
        .unwrap();

    assert_eq!(repo.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(store.resolve_by_token(&session.token).await.unwrap(), session);
}

#[tokio::test]
async fn test_create_persistent_collision_reports_store_error() {
    let repo = Arc::new(ScriptedRepo::new(u32::MAX));
    let store = SessionStore::new(Arc::clone(&repo), SessionPolicy::default());

    let result = store.create("Algebra I", &UserId::new("t1"), minutes(30)).await;

    assert!(matches!(
        result,
        Err(SessionError::Store(StoreError::UniqueViolation(UniqueKey::SessionToken)))
    ));
    assert_eq!(repo.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_resolve_stalled_backend_times_out() {
    let mut repo = ScriptedRepo::new(0);
    repo.stall = true;
    let policy = SessionPolicy {
        storage_timeout: Some(Duration::from_millis(200)),
        ..SessionPolicy::default()
    };
    let store = SessionStore::new(Arc::new(repo), policy);

    let result = store.resolve_by_token("teacher-1-0-abc").await;

    match result {
        Err(SessionError::Store(e)) => assert!(e.is_transient()),
        other => panic!("expected a storage timeout, got {other:?}"),
    }
}
