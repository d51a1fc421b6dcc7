//! Persisted job and step records

use media_pipeline_common::Args;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job file format version
pub const JOB_VERSION: &str = "1";

/// Job status; also the name of the directory holding the job file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, still accepting steps
    Drafted,
    Queued,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [Self::Drafted, Self::Queued, Self::Completed, Self::Failed];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drafted => "drafted",
            Self::Queued => "queued",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown job status '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Drafted,
    Queued,
    Started,
    Completed,
    Failed,
}

/// One processing invocation within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub args: Args,
    pub status: StepStatus,
}

impl Step {
    #[must_use]
    pub fn new(args: Args) -> Self {
        Self {
            args,
            status: StepStatus::Drafted,
        }
    }

    /// String argument, if present
    #[must_use]
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }
}

/// Contents of a job file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub version: String,
    /// RFC 3339
    pub date_created: String,
    pub date_updated: Option<String>,
    pub steps: Vec<Step>,
}

impl Job {
    #[must_use]
    pub fn new(date_created: String) -> Self {
        Self {
            version: JOB_VERSION.to_string(),
            date_created,
            date_updated: None,
            steps: Vec::new(),
        }
    }

    /// Resolve a possibly negative step index (`-1` = last step)
    #[must_use]
    pub fn resolve_step_index(&self, index: i64) -> Option<usize> {
        let total = i64::try_from(self.steps.len()).ok()?;
        let resolved = if index < 0 { total + index } else { index };
        (0..total).contains(&resolved).then_some(resolved as usize)
    }
}
