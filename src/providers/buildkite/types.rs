use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;

use crate::model::{Annotation, Build, BuildState, StepExecution, StepState};

/// A build as returned by `GET .../pipelines/{slug}/builds`.
#[derive(Debug, Deserialize)]
pub struct ApiBuild {
    pub number: u64,
    pub web_url: String,
    #[serde(default)]
    pub branch: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Absent when the listing excluded jobs
    pub jobs: Option<Vec<ApiJob>>,
}

/// A job within a build. Only `script` jobs are command steps; waiters,
/// block steps and triggers carry no duration of their own.
#[derive(Debug, Deserialize)]
pub struct ApiJob {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,
    pub step_key: Option<String>,
    pub state: Option<String>,
    pub web_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retried: bool,
}

/// An annotation as returned by `GET .../builds/{number}/annotations`.
#[derive(Debug, Deserialize)]
pub struct ApiAnnotation {
    pub id: String,
    pub context: Option<String>,
    pub style: Option<String>,
    #[serde(default)]
    pub body_html: String,
}

/// Error payload sent alongside non-success statuses.
#[derive(Debug, Deserialize)]
pub struct ApiMessage {
    pub message: String,
}

fn parse_state<T: serde::de::DeserializeOwned>(state: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(state.to_string())).ok()
}

impl ApiJob {
    fn into_step(self) -> Option<StepExecution> {
        if self.kind != "script" {
            return None;
        }
        let Some(state) = self.state.as_deref().and_then(parse_state::<StepState>) else {
            debug!("Ignoring job {} in state {:?}", self.id, self.state);
            return None;
        };

        Some(StepExecution {
            id: self.id,
            step_key: self.step_key,
            label: self.name,
            state,
            started_at: self.started_at,
            finished_at: self.finished_at,
            retried: self.retried,
            web_url: self.web_url,
        })
    }
}

/// Converts jobs to step executions, keeping API order.
pub fn steps_from_jobs(jobs: Vec<ApiJob>) -> Vec<StepExecution> {
    jobs.into_iter().filter_map(ApiJob::into_step).collect()
}

impl ApiBuild {
    /// Returns `None` for builds in a state this tool does not know.
    pub fn into_build(self) -> Option<Build> {
        let Some(state) = parse_state::<BuildState>(&self.state) else {
            debug!("Ignoring build #{} in state {}", self.number, self.state);
            return None;
        };

        Some(Build {
            number: self.number,
            web_url: self.web_url,
            branch: self.branch,
            state,
            created_at: self.created_at,
            finished_at: self.finished_at,
            steps: self.jobs.map(steps_from_jobs),
            annotations: None,
        })
    }
}

impl From<ApiAnnotation> for Annotation {
    fn from(api: ApiAnnotation) -> Self {
        Self {
            id: api.id,
            context: api.context,
            style: api.style,
            body: api.body_html,
        }
    }
}
