use log::{info, warn};

use super::client::BuildkiteClient;
use crate::analysis::annotation_search::{search_annotations, AnnotationSearchQuery};
use crate::analysis::step_durations::{analyze_step_durations, StepDurationQuery};
use crate::auth::Token;
use crate::config::BuildkiteConfig;
use crate::error::Result;
use crate::fetch::FetchSummary;
use crate::insights::{AnnotationSearchReport, StepDurationReport};
use crate::output::FetchProgress;

/// Runs analyses against the live Buildkite API.
///
/// Nothing is cached between runs, so every analysis starts without
/// resident builds.
pub struct BuildkiteProvider {
    client: BuildkiteClient,
}

impl BuildkiteProvider {
    pub fn new(config: &BuildkiteConfig, token: Token) -> Result<Self> {
        Ok(Self {
            client: BuildkiteClient::new(config, token)?,
        })
    }

    pub async fn collect_step_durations(
        &self,
        query: &StepDurationQuery,
    ) -> Result<StepDurationReport> {
        info!(
            "Collecting durations of {} in pipeline {}",
            query.step_keys.join(", "),
            query.pipeline
        );

        let progress = FetchProgress::start(&format!("{} builds", query.pipeline));
        let result = analyze_step_durations(&self.client, query, Vec::new()).await;
        finish(progress, result, |report| &report.fetch)
    }

    pub async fn search_annotations(
        &self,
        query: &AnnotationSearchQuery,
    ) -> Result<AnnotationSearchReport> {
        info!(
            "Searching annotations of pipeline {} for {:?}",
            query.pipeline, query.pattern_text
        );

        let progress = FetchProgress::start(&format!("{} builds and annotations", query.pipeline));
        let result = search_annotations(&self.client, query, Vec::new()).await;
        finish(progress, result, |report| &report.fetch)
    }
}

fn finish<T>(
    progress: FetchProgress,
    result: Result<T>,
    fetch: impl Fn(&T) -> &FetchSummary,
) -> Result<T> {
    match &result {
        Ok(report) => progress.finish(fetch(report)),
        Err(e) => {
            progress.fail();
            if e.is_rate_limited() {
                warn!("Buildkite rate limit hit; retry later or lower the page limit");
            }
        }
    }
    result
}
