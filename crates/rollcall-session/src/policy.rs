//! Limits applied to create-session requests.

use std::time::Duration;

use crate::ValidationError;

/// Validation and storage limits for [`SessionStore`](crate::SessionStore).
///
/// Start from `SessionPolicy::default()` and override the fields you
/// care about.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Shortest session a teacher may open. Default: 5 minutes.
    pub min_duration: Duration,

    /// Longest session a teacher may open. Default: 180 minutes.
    pub max_duration: Duration,

    /// Maximum subject length in characters, after trimming. Default: 200.
    pub max_subject_len: usize,

    /// Deadline for each storage call. `None` waits indefinitely.
    /// Default: 5 seconds.
    pub storage_timeout: Option<Duration>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            min_duration: Duration::from_secs(5 * 60),
            max_duration: Duration::from_secs(180 * 60),
            max_subject_len: 200,
            storage_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl SessionPolicy {
    /// Checks a create request and returns the trimmed subject.
    ///
    /// Bounds are inclusive on both ends.
    pub fn validate(&self, subject: &str, duration: Duration) -> Result<String, ValidationError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(ValidationError::EmptySubject);
        }

        let len = subject.chars().count();
        if len > self.max_subject_len {
            return Err(ValidationError::SubjectTooLong {
                max: self.max_subject_len,
                actual: len,
            });
        }

        if duration < self.min_duration || duration > self.max_duration {
            return Err(ValidationError::DurationOutOfRange {
                min: self.min_duration.as_secs() / 60,
                max: self.max_duration.as_secs() / 60,
                actual: duration.as_secs() / 60,
            });
        }

        Ok(subject.to_string())
    }
}
