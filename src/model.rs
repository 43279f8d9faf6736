use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Pipelines known to the Materialize Buildkite organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Pipeline {
    Cleanup,
    Coverage,
    Deploy,
    DeployMzLspServer,
    DeployMz,
    DeployWebsite,
    License,
    Nightly,
    ReleaseQualification,
    Security,
    Slt,
    Test,
    Www,
}

impl Pipeline {
    /// Pipeline slug used in API paths.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Cleanup => "cleanup",
            Self::Coverage => "coverage",
            Self::Deploy => "deploy",
            Self::DeployMzLspServer => "deploy-mz-lsp-server",
            Self::DeployMz => "deploy-mz",
            Self::DeployWebsite => "deploy-website",
            Self::License => "license",
            Self::Nightly => "nightly",
            Self::ReleaseQualification => "release-qualification",
            Self::Security => "security",
            Self::Slt => "slt",
            Self::Test => "test",
            Self::Www => "www",
        }
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Overall state of a Buildkite build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum BuildState {
    Running,
    Scheduled,
    Passed,
    Failing,
    Failed,
    Blocked,
    Canceled,
    Canceling,
    Skipped,
    NotRun,
    Finished,
}

impl BuildState {
    /// Value understood by the `state[]` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Scheduled => "scheduled",
            Self::Passed => "passed",
            Self::Failing => "failing",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Canceled => "canceled",
            Self::Canceling => "canceling",
            Self::Skipped => "skipped",
            Self::NotRun => "not_run",
            Self::Finished => "finished",
        }
    }
}

/// State of a single step (job) execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum StepState {
    Assigned,
    Broken,
    Canceled,
    Failed,
    Passed,
    Running,
    Scheduled,
    Skipped,
    TimedOut,
    Unblocked,
    Waiting,
    WaitingFailed,
}

impl StepState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Broken => "broken",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Passed => "passed",
            Self::Running => "running",
            Self::Scheduled => "scheduled",
            Self::Skipped => "skipped",
            Self::TimedOut => "timed_out",
            Self::Unblocked => "unblocked",
            Self::Waiting => "waiting",
            Self::WaitingFailed => "waiting_failed",
        }
    }

    /// States that count as a failure of the step itself.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

/// One execution of a build step. Retried steps appear once per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: String,
    pub step_key: Option<String>,
    pub label: Option<String>,
    pub state: StepState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether a later attempt superseded this one
    #[serde(default)]
    pub retried: bool,
    pub web_url: Option<String>,
}

impl StepExecution {
    /// Wall-clock duration in seconds, absent until the step has both timestamps.
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.step_key.as_deref() == Some(key)
    }
}

/// Free-form diagnostic content attached to a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    /// Annotation context, usually naming the step that produced it
    pub context: Option<String>,
    pub style: Option<String>,
    /// Rendered body as delivered by the API (HTML)
    pub body: String,
}

/// A build as held in memory during one invocation.
///
/// Steps and annotations are either loaded whole (`Some`) or not loaded at all
/// (`None`). Predicates that need them are only evaluated once they are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub number: u64,
    pub web_url: String,
    pub branch: String,
    pub state: BuildState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Option<Vec<StepExecution>>,
    pub annotations: Option<Vec<Annotation>>,
}

impl Build {
    /// Loaded steps, or an empty slice when they have not been loaded.
    pub fn steps(&self) -> &[StepExecution] {
        self.steps.as_deref().unwrap_or_default()
    }

    /// Loaded annotations, or an empty slice when they have not been loaded.
    pub fn annotations(&self) -> &[Annotation] {
        self.annotations.as_deref().unwrap_or_default()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn step_duration_uses_both_timestamps() {
        let step = step("cargo-test", StepState::Passed, 120);
        assert_eq!(step.duration_secs(), Some(120.0));
    }

    #[test]
    fn running_step_has_no_duration() {
        let mut step = step("cargo-test", StepState::Running, 0);
        step.finished_at = None;
        assert_eq!(step.duration_secs(), None);
    }

    #[test]
    fn failure_equivalent_states() {
        assert!(StepState::Failed.is_failure());
        assert!(StepState::TimedOut.is_failure());
        assert!(!StepState::Passed.is_failure());
        assert!(!StepState::Broken.is_failure());
    }

    #[test]
    fn states_deserialize_from_api_names() {
        let state: BuildState = serde_json::from_str("\"not_run\"").unwrap();
        assert_eq!(state, BuildState::NotRun);
        let state: StepState = serde_json::from_str("\"waiting_failed\"").unwrap();
        assert_eq!(state, StepState::WaitingFailed);
        assert_eq!(StepState::TimedOut.as_str(), "timed_out");
    }

    #[test]
    fn pipeline_slugs_match_cli_names() {
        for pipeline in Pipeline::value_variants() {
            let name = pipeline.to_possible_value().unwrap();
            assert_eq!(name.get_name(), pipeline.slug());
        }
    }

    #[test]
    fn unloaded_collections_read_as_empty() {
        let mut build = build(1, "main", BuildState::Passed);
        build.steps = None;
        build.annotations = None;
        assert!(build.steps().is_empty());
        assert!(build.annotations().is_empty());
    }
}
