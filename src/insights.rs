use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetch::FetchSummary;
use crate::model::{BuildState, StepState};

/// One execution of a selected step, the unit of duration analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSample {
    pub build_number: u64,
    pub build_url: String,
    pub branch: String,
    pub build_state: BuildState,
    pub step_key: String,
    pub step_label: Option<String>,
    pub step_state: StepState,
    pub retried: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatistics {
    pub step_key: String,
    pub executions: usize,
    pub passed: usize,
    pub failed: usize,
    pub retried: usize,
    pub failure_rate: f64,
    pub flakiness_rate: f64,
    pub duration_min: f64,
    pub duration_mean: f64,
    pub duration_max: f64,
    pub duration_p50: f64,
    pub duration_p95: f64,
    pub duration_p99: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StepDurationReport {
    pub pipeline: String,
    pub branch: String,
    pub collected_at: DateTime<Utc>,
    pub fetch: FetchSummary,
    pub samples: Vec<DurationSample>,
    pub steps: Vec<StepStatistics>,
}

/// An annotation that matched the search pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationMatch {
    pub build_number: u64,
    pub build_url: String,
    pub branch: String,
    pub build_state: BuildState,
    pub created_at: DateTime<Utc>,
    pub context: Option<String>,
    /// Plain-text window around the first match
    pub excerpt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnnotationSearchReport {
    pub pipeline: String,
    pub branch: String,
    pub pattern: String,
    pub collected_at: DateTime<Utc>,
    pub fetch: FetchSummary,
    pub matches: Vec<AnnotationMatch>,
}
