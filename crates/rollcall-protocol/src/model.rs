//! Entities and read projections.
//!
//! [`Session`] and [`AttendanceRecord`] are the two persistent entities.
//! Everything else in this module is a read-side view assembled from them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, RecordId, SessionId, UserId};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One open attendance window.
///
/// Immutable once created, apart from `active`, which is display state
/// only. Whether a session still accepts check-ins is always decided by
/// comparing `expires_at` with the current time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Free-text label shown to students ("Algebra I").
    pub subject: String,

    /// The instructor who opened the session.
    pub owner_id: UserId,

    /// The shared secret embedded in the scannable code.
    /// Unique across all sessions.
    pub token: String,

    pub created_at: DateTime<Utc>,

    /// Exclusive end of the validity window.
    pub expires_at: DateTime<Utc>,

    /// Advisory display flag. Never consulted for validity.
    pub active: bool,
}

// ---------------------------------------------------------------------------
// AttendanceStatus
// ---------------------------------------------------------------------------

/// The status stored on an attendance record.
///
/// Check-ins only ever produce `Present`. The other values exist because
/// external processes (absence marking, manual corrections) write to the
/// same table and their rows must read back intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    /// Returns the lowercase label stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "late" => Ok(Self::Late),
            "excused" => Ok(Self::Excused),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown attendance status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// AttendanceRecord
// ---------------------------------------------------------------------------

/// Durable proof that a student checked in to a session.
///
/// At most one record exists per `(session_id, student_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub session_id: SessionId,
    pub student_id: UserId,
    pub status: AttendanceStatus,
    pub timestamp: DateTime<Utc>,
}

impl AttendanceRecord {
    /// Builds the record a successful check-in produces.
    pub fn present(
        session_id: SessionId,
        student_id: UserId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            session_id,
            student_id,
            status: AttendanceStatus::Present,
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Read projections
// ---------------------------------------------------------------------------

/// One row of an instructor's session list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session: Session,
    pub attendance_count: u64,
    /// Whether the session accepted check-ins at the time of the query.
    pub open: bool,
}

/// One row of a student's attendance history: the record joined with the
/// session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub record: AttendanceRecord,
    pub subject: String,
    pub session_created_at: DateTime<Utc>,
}

/// Headline counts for an instructor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherOverview {
    pub total_sessions: u64,
    pub open_sessions: u64,
    pub total_check_ins: u64,
}

impl TeacherOverview {
    /// Folds a session list into its headline counts.
    pub fn from_summaries(summaries: &[SessionSummary]) -> Self {
        summaries.iter().fold(Self::default(), |mut acc, s| {
            acc.total_sessions += 1;
            if s.open {
                acc.open_sessions += 1;
            }
            acc.total_check_ins += s.attendance_count;
            acc
        })
    }
}

/// Headline counts for a student.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentOverview {
    pub total_records: u64,
    pub present_records: u64,
    /// Share of records marked present, as a whole percentage (0–100).
    pub attendance_rate: u8,
}

impl StudentOverview {
    /// Counts a student's history. An empty history has a rate of 0.
    pub fn from_entries(entries: &[AttendanceEntry]) -> Self {
        let total_records = entries.len() as u64;
        let present_records = entries
            .iter()
            .filter(|e| e.record.status == AttendanceStatus::Present)
            .count() as u64;

        let attendance_rate = if total_records == 0 {
            0
        } else {
            // Integer round-half-up of 100 * present / total.
            ((present_records * 200 + total_records) / (total_records * 2)) as u8
        };

        Self {
            total_records,
            present_records,
            attendance_rate,
        }
    }
}
