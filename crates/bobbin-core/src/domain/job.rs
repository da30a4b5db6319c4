//! Job record and status management.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::params::JobParams;

/// One result row as returned by the query engine.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Aggregated result: operation name -> rows.
pub type JobResult = BTreeMap<String, Vec<Row>>;

/// Flat job status, as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job state together with its terminal payload.
///
/// State transitions:
/// - Queued -> Running -> Succeeded
/// - Queued -> Running -> Failed
/// - Queued -> Failed (a delivery that cannot even start)
///
/// The payload lives inside the variant, so a succeeded job without a result
/// (or a failed job without an error) cannot be constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded { result: JobResult },
    Failed { error: String },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Queued => JobStatus::Queued,
            JobState::Running => JobStatus::Running,
            JobState::Succeeded { .. } => JobStatus::Succeeded,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// The terminal payload a worker commits.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    Succeeded(JobResult),
    Failed(String),
}

impl TerminalOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            TerminalOutcome::Succeeded(_) => JobStatus::Succeeded,
            TerminalOutcome::Failed(_) => JobStatus::Failed,
        }
    }

    fn into_state(self) -> JobState {
        match self {
            TerminalOutcome::Succeeded(result) => JobState::Succeeded { result },
            TerminalOutcome::Failed(error) => JobState::Failed { error },
        }
    }
}

/// Result of applying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The record changed.
    Applied,
    /// The record already was in the requested state; nothing changed.
    Unchanged,
}

/// A transition the state machine refuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move from {from} back to {to}")]
    Regression { from: JobStatus, to: JobStatus },

    #[error("already {stored}; refusing conflicting {attempted} update")]
    Conflict {
        stored: JobStatus,
        attempted: JobStatus,
    },
}

/// Job record: the single source of truth for a job.
///
/// Design:
/// - Owned by the Job Store; everything else works on copies.
/// - State transitions via methods (not direct field access).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,

    #[serde(flatten)]
    pub state: JobState,

    #[serde(default, deserialize_with = "super::params::nullable")]
    pub params: JobParams,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Fresh record in `queued`.
    pub fn queued(id: JobId, params: JobParams, now: DateTime<Utc>) -> Self {
        Self {
            id,
            state: JobState::Queued,
            params,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn result(&self) -> Option<&JobResult> {
        match &self.state {
            JobState::Succeeded { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Queued -> Running. Running again is a no-op.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<Transition, TransitionError> {
        match self.status() {
            JobStatus::Queued => {
                self.state = JobState::Running;
                self.touch(now);
                Ok(Transition::Applied)
            }
            JobStatus::Running => Ok(Transition::Unchanged),
            from => Err(TransitionError::Regression {
                from,
                to: JobStatus::Running,
            }),
        }
    }

    /// Commit the terminal outcome.
    ///
    /// Repeating the exact same outcome is a no-op; any other outcome on a
    /// terminal record is a conflict and leaves the record untouched.
    pub fn finish(
        &mut self,
        outcome: TerminalOutcome,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        if self.is_terminal() {
            let attempted = outcome.status();
            let next = outcome.into_state();
            if next == self.state {
                return Ok(Transition::Unchanged);
            }
            return Err(TransitionError::Conflict {
                stored: self.status(),
                attempted,
            });
        }
        self.state = outcome.into_state();
        self.touch(now);
        Ok(Transition::Applied)
    }

    /// Bump `updated_at` without letting it go backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Client-safe projection of a job record.
///
/// Timestamps are epoch seconds. `result` is present only for succeeded jobs
/// and `error` only for failed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub params: JobParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobRecord> for JobView {
    fn from(record: JobRecord) -> Self {
        let status = record.status();
        let (result, error) = match record.state {
            JobState::Succeeded { result } => (Some(result), None),
            JobState::Failed { error } => (None, Some(error)),
            JobState::Queued | JobState::Running => (None, None),
        };
        Self {
            id: record.id,
            status,
            created_at: record.created_at.timestamp(),
            updated_at: record.updated_at.timestamp(),
            params: record.params,
            result,
            error,
        }
    }
}
