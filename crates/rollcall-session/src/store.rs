//! The session store: creates sessions and resolves tokens.
//!
//! Unlike an in-process registry, `SessionStore` holds no state of its
//! own. Everything lives in the [`SessionRepository`] behind an `Arc`,
//! so clones of the store are cheap and every connection task can hold
//! one.
//!
//! ## Tokens are issued, never reused
//!
//! A token is generated per insert attempt. If the store reports that the
//! token (or the random session id) is already taken, a fresh one is
//! generated and the insert is tried again, up to a small fixed number of
//! attempts. With 128 random bits a real collision is practically
//! impossible, so hitting the limit points at a broken repository rather
//! than bad luck, and it is reported as a storage failure.
//!
//! ## Timestamps
//!
//! Storage keeps whole milliseconds. Both instants of a new session are
//! truncated before the insert, so the value returned to the creator is
//! exactly what every later reader sees, whichever backend is in use.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use rollcall_protocol::{Session, SessionId, UserId};
use rollcall_store::{SessionRepository, StoreError, UniqueKey, with_deadline};

use crate::{SessionError, SessionPolicy, ValidationError, token};

/// Attempts at inserting a session before a token collision is
/// reported as a storage failure.
const MAX_INSERT_ATTEMPTS: u32 = 3;

/// Returns `true` while `session` accepts check-ins at `now`.
///
/// The expiry instant itself is already closed: a session created at
/// 10:00 for 30 minutes accepts 10:29:59.999 and rejects 10:30:00.000.
pub fn is_valid(session: &Session, now: DateTime<Utc>) -> bool {
    now < session.expires_at
}

/// Creates and looks up attendance sessions.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ [persisted, token issued] ──→ resolve_by_token() ...
///                                               │
///                   (now >= expires_at) ────────┘ is_valid() == false
/// ```
pub struct SessionStore<R> {
    repo: Arc<R>,
    policy: SessionPolicy,
}

impl<R> Clone for SessionStore<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            policy: self.policy.clone(),
        }
    }
}

impl<R: SessionRepository> SessionStore<R> {
    pub fn new(repo: Arc<R>, policy: SessionPolicy) -> Self {
        Self { repo, policy }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Creates a session starting now. See [`create_at`](Self::create_at).
    pub async fn create(
        &self,
        subject: &str,
        owner_id: &UserId,
        duration: Duration,
    ) -> Result<Session, SessionError> {
        self.create_at(subject, owner_id, duration, Utc::now()).await
    }

    /// Creates a session that starts at `now` and lasts `duration`.
    ///
    /// The subject is trimmed before validation and storage.
    ///
    /// Both `created_at` and `expires_at` are truncated to whole
    /// milliseconds, the resolution storage keeps, so the session returned
    /// here is exactly the one later read back by any backend. Truncating
    /// `expires_at` can only shorten the window by less than a millisecond;
    /// it never lets a check-in through after the instant the caller sees.
    ///
    /// # Errors
    /// - [`SessionError::Validation`] for a bad subject or duration, or an
    ///   owner id too long to fit in a token; nothing is written.
    /// - [`SessionError::Store`] if the repository fails or times out.
    pub async fn create_at(
        &self,
        subject: &str,
        owner_id: &UserId,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let subject = self.policy.validate(subject, duration)?;
        let span = chrono::Duration::from_std(duration).map_err(|_| {
            ValidationError::DurationOutOfRange {
                min: self.policy.min_duration.as_secs() / 60,
                max: self.policy.max_duration.as_secs() / 60,
                actual: duration.as_secs() / 60,
            }
        })?;
        let created_at = now.trunc_subsecs(3);
        let expires_at = (created_at + span).trunc_subsecs(3);
        check_owner_fits(owner_id, created_at)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let session = Session {
                id: SessionId::new(),
                subject: subject.clone(),
                owner_id: owner_id.clone(),
                token: token::generate(owner_id, created_at),
                created_at,
                expires_at,
                active: true,
            };

            let result =
                with_deadline(self.policy.storage_timeout, self.repo.insert_session(&session))
                    .await;
            match result {
                Ok(()) => {
                    tracing::info!(
                        session_id = %session.id,
                        %owner_id,
                        subject = %session.subject,
                        %expires_at,
                        "session created"
                    );
                    return Ok(session);
                }
                Err(StoreError::UniqueViolation(key @ (UniqueKey::SessionToken | UniqueKey::SessionId)))
                    if attempt < MAX_INSERT_ATTEMPTS =>
                {
                    tracing::warn!(%owner_id, %key, attempt, "session insert collided, regenerating");
                }
                Err(e) => {
                    tracing::error!(%owner_id, error = %e, "session insert failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Finds the session whose token equals `token` exactly.
    ///
    /// Expiry is not checked here; use [`is_valid`] on the result.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if no session has this token.
    /// - [`SessionError::Store`] if the repository fails or times out.
    pub async fn resolve_by_token(&self, token: &str) -> Result<Session, SessionError> {
        if token.is_empty() || token.len() > token::MAX_LEN {
            return Err(SessionError::NotFound);
        }

        with_deadline(self.policy.storage_timeout, self.repo.find_session_by_token(token))
            .await?
            .ok_or(SessionError::NotFound)
    }

    /// All sessions opened by `owner_id`, newest first.
    pub async fn list_by_owner(&self, owner_id: &UserId) -> Result<Vec<Session>, SessionError> {
        Ok(with_deadline(self.policy.storage_timeout, self.repo.sessions_by_owner(owner_id)).await?)
    }
}

/// Rejects owners whose token would be longer than [`token::MAX_LEN`].
///
/// Only the random tail varies between attempts and its length is fixed,
/// so the token length is known before any attempt.
fn check_owner_fits(owner_id: &UserId, issued_at: DateTime<Utc>) -> Result<(), ValidationError> {
    let owner_len = owner_id.as_str().len();
    let token_len =
        format!("{owner_id}-{}-", issued_at.timestamp_millis()).len() + token::RANDOM_BYTES * 2;
    if token_len > token::MAX_LEN {
        return Err(ValidationError::OwnerIdTooLong {
            max: token::MAX_LEN - (token_len - owner_len),
            actual: owner_len,
        });
    }
    Ok(())
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rollcall_store::MemoryStore;

    use super::*;

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 8, 10, 0, 0).unwrap()
    }

    fn store() -> SessionStore<MemoryStore> {
        SessionStore::new(Arc::new(MemoryStore::new()), SessionPolicy::default())
    }

    #[tokio::test]
    async fn test_create_at_sets_expiry_and_trims_subject() {
        let store = store();
        let owner = UserId::new("teacher-1");

        let session = store
            .create_at("  Algebra I ", &owner, minutes(30), t0())
            .await
            .unwrap();

        assert_eq!(session.subject, "Algebra I");
        assert_eq!(session.owner_id, owner);
        assert_eq!(session.created_at, t0());
        assert_eq!(session.expires_at, t0() + chrono::Duration::minutes(30));
        assert!(session.active);
        assert!(session.token.starts_with("teacher-1-"));
    }

    #[tokio::test]
    async fn test_create_at_truncates_to_millis() {
        let store = store();
        let now = t0() + chrono::Duration::nanoseconds(1_234_567);

        let session = store
            .create_at("Algebra I", &UserId::new("t1"), minutes(30), now)
            .await
            .unwrap();

        assert_eq!(session.created_at, t0() + chrono::Duration::milliseconds(1));
    }

    #[tokio::test]
    async fn test_create_at_sub_millisecond_duration_truncates_expiry() {
        let store = store();
        let duration = minutes(30) + Duration::from_micros(500);

        let session = store
            .create_at("A", &UserId::new("t1"), duration, t0())
            .await
            .unwrap();

        assert_eq!(session.expires_at, t0() + chrono::Duration::minutes(30));
        assert_eq!(store.resolve_by_token(&session.token).await.unwrap(), session);
    }

    #[tokio::test]
    async fn test_create_at_longest_owner_token_still_resolves() {
        let store = store();
        // 13-digit millis plus two separators plus the hex tail.
        let overhead = 1 + 13 + 1 + token::RANDOM_BYTES * 2;
        let owner = UserId::new("o".repeat(token::MAX_LEN - overhead));

        let session = store.create_at("A", &owner, minutes(30), t0()).await.unwrap();

        assert_eq!(session.token.len(), token::MAX_LEN);
        assert_eq!(store.resolve_by_token(&session.token).await.unwrap(), session);
    }

    #[tokio::test]
    async fn test_create_at_owner_too_long_for_token_writes_nothing() {
        let store = store();
        let overhead = 1 + 13 + 1 + token::RANDOM_BYTES * 2;
        let max = token::MAX_LEN - overhead;
        let owner = UserId::new("o".repeat(max + 15));

        let result = store.create_at("A", &owner, minutes(30), t0()).await;

        assert!(matches!(
            result,
            Err(SessionError::Validation(ValidationError::OwnerIdTooLong { max: m, actual }))
                if m == max && actual == max + 15
        ));
        assert!(store.list_by_owner(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_at_duration_boundaries() {
        let store = store();
        let owner = UserId::new("t1");

        assert!(store.create_at("A", &owner, minutes(5), t0()).await.is_ok());
        assert!(store.create_at("A", &owner, minutes(180), t0()).await.is_ok());
        assert!(matches!(
            store.create_at("A", &owner, minutes(4), t0()).await,
            Err(SessionError::Validation(ValidationError::DurationOutOfRange { .. }))
        ));
        assert!(matches!(
            store.create_at("A", &owner, minutes(181), t0()).await,
            Err(SessionError::Validation(ValidationError::DurationOutOfRange { .. }))
        ));
        assert_eq!(store.list_by_owner(&owner).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_empty_subject_writes_nothing() {
        let store = store();
        let owner = UserId::new("t1");

        let result = store.create("   ", &owner, minutes(30)).await;

        assert!(matches!(
            result,
            Err(SessionError::Validation(ValidationError::EmptySubject))
        ));
        assert!(store.list_by_owner(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_by_token_returns_own_session_only() {
        let store = store();
        let owner = UserId::new("t1");
        let a = store.create_at("Algebra I", &owner, minutes(30), t0()).await.unwrap();
        let b = store.create_at("Biology", &owner, minutes(30), t0()).await.unwrap();

        assert_ne!(a.token, b.token);
        assert_eq!(store.resolve_by_token(&a.token).await.unwrap(), a);
        assert_eq!(store.resolve_by_token(&b.token).await.unwrap(), b);
    }

    #[tokio::test]
    async fn test_resolve_by_token_unknown_or_oversized_not_found() {
        let store = store();
        let s = store
            .create_at("Algebra I", &UserId::new("t1"), minutes(30), t0())
            .await
            .unwrap();

        let truncated = &s.token[..s.token.len() - 1];
        assert!(matches!(
            store.resolve_by_token(truncated).await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(store.resolve_by_token("").await, Err(SessionError::NotFound)));
        assert!(matches!(
            store.resolve_by_token(&"x".repeat(token::MAX_LEN + 1)).await,
            Err(SessionError::NotFound)
        ));
    }

    #[test]
    fn test_is_valid_boundary_at_expiry() {
        let session = Session {
            id: SessionId::new(),
            subject: "Algebra I".into(),
            owner_id: UserId::new("t1"),
            token: "tok".into(),
            created_at: t0(),
            expires_at: t0() + chrono::Duration::minutes(30),
            active: true,
        };

        assert!(is_valid(&session, t0()));
        assert!(is_valid(&session, session.expires_at - chrono::Duration::milliseconds(1)));
        assert!(!is_valid(&session, session.expires_at));
        assert!(!is_valid(&session, session.expires_at + chrono::Duration::seconds(1)));
    }
}
