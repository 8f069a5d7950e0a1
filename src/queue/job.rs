//! Queue job records
//!
//! Lifecycle: `queued -> running -> completed | failed`, or
//! `queued -> cancelled` before a slot is granted. Terminal states never
//! change again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Status of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a concurrency slot
    Queued,
    /// Holding a slot
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Withdrawn before it started
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// A typed unit of work tracked by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueJob {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl QueueJob {
    pub fn new(job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            status: JobStatus::Queued,
            payload,
            result: None,
            error: None,
            enqueued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply a transition's status, timestamps and outcome
    pub fn apply(&mut self, transition: &JobTransition) {
        self.status = transition.status;
        if transition.status == JobStatus::Running {
            self.started_at = Some(transition.at);
        }
        if transition.status.is_terminal() {
            self.finished_at = Some(transition.at);
        }
        if transition.error.is_some() {
            self.error = transition.error.clone();
        }
        if transition.result.is_some() {
            self.result = transition.result.clone();
        }
    }
}

/// A status change plus what it records
#[derive(Debug, Clone, PartialEq)]
pub struct JobTransition {
    pub status: JobStatus,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
    pub result: Option<Value>,
}

impl JobTransition {
    fn to(status: JobStatus) -> Self {
        Self {
            status,
            at: Utc::now(),
            error: None,
            result: None,
        }
    }

    pub fn running() -> Self {
        Self::to(JobStatus::Running)
    }

    pub fn completed(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::to(JobStatus::Completed)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::to(JobStatus::Failed)
        }
    }

    pub fn cancelled() -> Self {
        Self::to(JobStatus::Cancelled)
    }

    /// `started_at` written by this transition, if any
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        (self.status == JobStatus::Running).then_some(self.at)
    }

    /// `finished_at` written by this transition, if any
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.status.is_terminal().then_some(self.at)
    }
}

/// Query for listing jobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, job: &QueueJob) -> bool {
        self.status.map_or(true, |status| job.status == status)
            && self
                .job_type
                .as_deref()
                .map_or(true, |job_type| job.job_type == job_type)
    }
}
