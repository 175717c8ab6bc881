//! SQLite backend (via `sqlx`).
//!
//! Uniqueness lives in the schema: `sessions.token UNIQUE` and
//! `attendance UNIQUE(session_id, student_id)`. An insert that collides
//! fails inside the database as one statement, and the error is mapped
//! to [`StoreError::UniqueViolation`]. No existence check precedes it.
//!
//! Ids are stored as hyphenated UUID text and timestamps as Unix
//! milliseconds. Every row read back is validated into a typed entity;
//! anything that doesn't fit becomes [`StoreError::Corrupt`].

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rollcall_protocol::{
    AttendanceEntry, AttendanceRecord, AttendanceStatus, RecordId, Session, SessionId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use uuid::Uuid;

use crate::{AttendanceRepository, SessionRepository, StoreError, UniqueKey};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sessions (
        id          TEXT PRIMARY KEY NOT NULL,
        subject     TEXT NOT NULL,
        owner_id    TEXT NOT NULL,
        token       TEXT NOT NULL UNIQUE,
        created_at  INTEGER NOT NULL,
        expires_at  INTEGER NOT NULL,
        active      INTEGER NOT NULL DEFAULT 1,
        CHECK (expires_at > created_at)
    )",
    "CREATE INDEX IF NOT EXISTS idx_sessions_owner
        ON sessions (owner_id, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS attendance (
        id          TEXT PRIMARY KEY NOT NULL,
        session_id  TEXT NOT NULL REFERENCES sessions (id),
        student_id  TEXT NOT NULL,
        status      TEXT NOT NULL,
        timestamp   INTEGER NOT NULL,
        UNIQUE (session_id, student_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_attendance_student
        ON attendance (student_id, timestamp DESC)",
];

/// A [`SessionRepository`] + [`AttendanceRepository`] backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url` and applies the
    /// schema.
    ///
    /// In-memory URLs (`sqlite::memory:`) are pinned to one connection
    /// that is never recycled, because each SQLite connection to
    /// `:memory:` would otherwise see its own empty database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            // Readers don't block the writer; writers queue on the busy timeout.
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(from_sqlx)?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(url, "sqlite store ready");
        Ok(store)
    }

    /// A fresh private in-memory database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:", 1).await
    }

    /// Wraps an existing pool. The caller is responsible for
    /// [`migrate`](Self::migrate).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the tables and indexes if they don't exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(from_sqlx)?;
        }
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl SessionRepository for SqliteStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (id, subject, owner_id, token, created_at, expires_at, active)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.0.to_string())
        .bind(&session.subject)
        .bind(session.owner_id.as_str())
        .bind(&session.token)
        .bind(session.created_at.timestamp_millis())
        .bind(session.expires_at.timestamp_millis())
        .bind(session.active)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(e, |msg| {
                if msg.contains("token") {
                    UniqueKey::SessionToken
                } else {
                    UniqueKey::SessionId
                }
            })
        })?;
        Ok(())
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            "SELECT id, subject, owner_id, token, created_at, expires_at, active
             FROM sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(from_sqlx)?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn sessions_by_owner(&self, owner_id: &UserId) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, subject, owner_id, token, created_at, expires_at, active
             FROM sessions WHERE owner_id = ?
             ORDER BY created_at DESC",
        )
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)?;

        rows.iter().map(session_from_row).collect()
    }
}

impl AttendanceRepository for SqliteStore {
    async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO attendance (id, session_id, student_id, status, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.id.0.to_string())
        .bind(record.session_id.0.to_string())
        .bind(record.student_id.as_str())
        .bind(record.status.as_str())
        .bind(record.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(e, |msg| {
                if msg.contains("student_id") {
                    UniqueKey::SessionStudent
                } else {
                    UniqueKey::RecordId
                }
            })
        })?;
        Ok(())
    }

    async fn attendance_by_student(
        &self,
        student_id: &UserId,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT a.id, a.session_id, a.student_id, a.status, a.timestamp,
                    s.subject, s.created_at AS session_created_at
             FROM attendance a
             JOIN sessions s ON s.id = a.session_id
             WHERE a.student_id = ?
             ORDER BY a.timestamp DESC",
        )
        .bind(student_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)?;

        rows.iter()
            .map(|row| {
                Ok(AttendanceEntry {
                    record: record_from_row(row)?,
                    subject: column(row, "subject")?,
                    session_created_at: millis(row, "session_created_at")?,
                })
            })
            .collect()
    }

    async fn count_attendance(&self, session_id: SessionId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE session_id = ?")
            .bind(session_id.0.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(from_sqlx)?;
        Ok(count.max(0) as u64)
    }

    async fn attendance_counts_by_owner(
        &self,
        owner_id: &UserId,
    ) -> Result<HashMap<SessionId, u64>, StoreError> {
        let rows = sqlx::query(
            "SELECT a.session_id, COUNT(*) AS cnt
             FROM attendance a
             JOIN sessions s ON s.id = a.session_id
             WHERE s.owner_id = ?
             GROUP BY a.session_id",
        )
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)?;

        rows.iter()
            .map(|row| {
                let id = SessionId(uuid(row, "session_id")?);
                let count: i64 = column(row, "cnt")?;
                Ok((id, count.max(0) as u64))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn session_from_row(row: &SqliteRow) -> Result<Session, StoreError> {
    let session = Session {
        id: SessionId(uuid(row, "id")?),
        subject: column(row, "subject")?,
        owner_id: UserId(column(row, "owner_id")?),
        token: column(row, "token")?,
        created_at: millis(row, "created_at")?,
        expires_at: millis(row, "expires_at")?,
        active: column(row, "active")?,
    };

    if session.expires_at <= session.created_at {
        return Err(StoreError::Corrupt(format!(
            "session {} expires before it was created",
            session.id
        )));
    }
    Ok(session)
}

fn record_from_row(row: &SqliteRow) -> Result<AttendanceRecord, StoreError> {
    let status: String = column(row, "status")?;
    Ok(AttendanceRecord {
        id: RecordId(uuid(row, "id")?),
        session_id: SessionId(uuid(row, "session_id")?),
        student_id: UserId(column(row, "student_id")?),
        status: AttendanceStatus::from_str(&status)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        timestamp: millis(row, "timestamp")?,
    })
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

fn uuid(row: &SqliteRow, name: &str) -> Result<Uuid, StoreError> {
    let raw: String = column(row, name)?;
    Uuid::parse_str(&raw).map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

fn millis(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: i64 = column(row, name)?;
    DateTime::<Utc>::from_timestamp_millis(raw)
        .ok_or_else(|| StoreError::Corrupt(format!("column {name}: timestamp {raw} out of range")))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Maps a failed write, naming the unique key from the database message.
fn write_error(e: sqlx::Error, key_for: impl FnOnce(&str) -> UniqueKey) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation(key_for(db.message()));
        }
        if db.is_foreign_key_violation() || db.is_check_violation() {
            return StoreError::Constraint(db.message().to_string());
        }
    }
    from_sqlx(e)
}

fn from_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(e.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 8, 10, 0, 0).unwrap()
    }

    fn session(owner: &str, token: &str) -> Session {
        Session {
            id: SessionId::new(),
            subject: "Algebra I".into(),
            owner_id: UserId::new(owner),
            token: token.into(),
            created_at: t0(),
            expires_at: t0() + Duration::minutes(30),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_insert_then_find_by_token_round_trips_session() {
        let store = SqliteStore::in_memory().await.unwrap();
        let s = session("t1", "tok-1");
        store.insert_session(&s).await.unwrap();

        let found = store.find_session_by_token("tok-1").await.unwrap();

        assert_eq!(found, Some(s));
    }

    #[tokio::test]
    async fn test_insert_session_duplicate_token_maps_to_session_token_key() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_session(&session("t1", "tok-1")).await.unwrap();

        let result = store.insert_session(&session("t2", "tok-1")).await;

        assert!(matches!(
            result,
            Err(StoreError::UniqueViolation(UniqueKey::SessionToken))
        ));
    }

    #[tokio::test]
    async fn test_insert_attendance_duplicate_pair_maps_to_session_student_key() {
        let store = SqliteStore::in_memory().await.unwrap();
        let s = session("t1", "tok-1");
        store.insert_session(&s).await.unwrap();
        store
            .insert_attendance(&AttendanceRecord::present(s.id, UserId::new("s1"), t0()))
            .await
            .unwrap();

        let result = store
            .insert_attendance(&AttendanceRecord::present(s.id, UserId::new("s1"), t0()))
            .await;

        assert!(matches!(
            result,
            Err(StoreError::UniqueViolation(UniqueKey::SessionStudent))
        ));
        assert_eq!(store.count_attendance(s.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_attendance_unknown_session_is_constraint_violation() {
        let store = SqliteStore::in_memory().await.unwrap();
        let record = AttendanceRecord::present(SessionId::new(), UserId::new("s1"), t0());

        let result = store.insert_attendance(&record).await;

        assert!(matches!(result, Err(StoreError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_unknown_status_in_row_is_reported_corrupt() {
        let store = SqliteStore::in_memory().await.unwrap();
        let s = session("t1", "tok-1");
        store.insert_session(&s).await.unwrap();
        sqlx::query(
            "INSERT INTO attendance (id, session_id, student_id, status, timestamp)
             VALUES (?, ?, 's1', 'teleported', 0)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(s.id.0.to_string())
        .execute(&store.pool)
        .await
        .unwrap();

        let result = store.attendance_by_student(&UserId::new("s1")).await;

        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_external_status_values_read_back_intact() {
        let store = SqliteStore::in_memory().await.unwrap();
        let s = session("t1", "tok-1");
        store.insert_session(&s).await.unwrap();
        let mut record = AttendanceRecord::present(s.id, UserId::new("s1"), t0());
        record.status = AttendanceStatus::Excused;
        store.insert_attendance(&record).await.unwrap();

        let entries = store.attendance_by_student(&UserId::new("s1")).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record, record);
        assert_eq!(entries[0].session_created_at, s.created_at);
    }
}
