use chrono::Utc;
use log::{debug, info, warn};

use super::step_metrics::calculate_step_statistics;
use crate::error::{InsightsError, Result};
use crate::fetch::{
    ensure_steps, BranchFilter, BuildFilter, BuildQuery, BuildSource, FetchController,
    FetchPolicy, PageConsumer, Predicate, ResultAccumulator, StepMatcher,
};
use crate::insights::{DurationSample, StepDurationReport};
use crate::model::{Build, BuildState, Pipeline, StepState};

/// Parameters of one step-duration analysis.
#[derive(Debug, Clone)]
pub struct StepDurationQuery {
    pub pipeline: Pipeline,
    pub branch: BranchFilter,
    pub step_keys: Vec<String>,
    /// Empty means every step state
    pub step_states: Vec<StepState>,
    /// Empty means every build state
    pub build_states: Vec<BuildState>,
    pub fetch: FetchPolicy,
    pub max_fetches: usize,
    pub first_page: u32,
    /// Stop once this many builds passed the build filters
    pub max_builds: Option<usize>,
    /// Stop once every step key has this many samples
    pub samples_per_step: Option<usize>,
    pub max_results: Option<usize>,
}

impl StepDurationQuery {
    fn build_query(&self) -> BuildQuery {
        BuildQuery {
            pipeline: self.pipeline.slug().to_string(),
            branch: self.branch.server_value().map(ToString::to_string),
            states: self.build_states.clone(),
        }
    }

    fn build_filter(&self) -> BuildFilter {
        BuildFilter::new()
            .with(Predicate::Branch(self.branch.clone()))
            .with(Predicate::BuildState(self.build_states.iter().copied().collect()))
            .with(Predicate::Step(self.step_matcher()))
    }

    fn step_matcher(&self) -> StepMatcher {
        StepMatcher::new(self.step_keys.clone(), self.step_states.iter().copied())
    }
}

/// Turns each page into duration samples, one per matching step execution.
struct SampleCollector<'a, S> {
    source: &'a S,
    filter: BuildFilter,
    matcher: StepMatcher,
    accumulator: ResultAccumulator<DurationSample>,
}

impl<S: BuildSource> PageConsumer for SampleCollector<'_, S> {
    async fn consume(&mut self, builds: Vec<Build>) -> Result<()> {
        for mut build in builds {
            if self.accumulator.is_full() {
                break;
            }
            if !self.filter.accepts_summary(&build) {
                debug!("Skipping build #{} on branch {}", build.number, build.branch);
                continue;
            }

            ensure_steps(self.source, &mut build).await?;
            if !self.filter.accepts(&build) {
                debug!("Build #{} has no matching step", build.number);
                continue;
            }

            self.accumulator.note_build();
            for step in self.matcher.matching_steps(&build) {
                let Some(duration_secs) = step.duration_secs() else {
                    debug!("Step {} of build #{} has no duration yet", step.id, build.number);
                    continue;
                };
                let step_key = step.step_key.clone().unwrap_or_default();
                let sample = DurationSample {
                    build_number: build.number,
                    build_url: build.web_url.clone(),
                    branch: build.branch.clone(),
                    build_state: build.state,
                    step_key: step_key.clone(),
                    step_label: step.label.clone(),
                    step_state: step.state,
                    retried: step.retried,
                    started_at: step.started_at,
                    duration_secs,
                    web_url: step.web_url.clone(),
                };
                self.accumulator.offer(build.number, Some(&step_key), sample);
            }
        }
        Ok(())
    }

    fn is_satisfied(&self) -> bool {
        self.accumulator.is_satisfied()
    }
}

/// Collects duration samples for the requested steps and summarizes them.
///
/// # Errors
///
/// Returns a configuration error for an empty step key list or an unusable
/// fetch policy, and propagates the first remote error.
pub async fn analyze_step_durations<S: BuildSource>(
    source: &S,
    query: &StepDurationQuery,
    resident: Vec<Build>,
) -> Result<StepDurationReport> {
    if query.step_keys.is_empty() {
        return Err(InsightsError::Config(
            "at least one step key is required".to_string(),
        ));
    }

    let mut collector = SampleCollector {
        source,
        filter: query.build_filter(),
        matcher: query.step_matcher(),
        accumulator: ResultAccumulator::new(query.max_results)
            .with_build_ceiling(query.max_builds)
            .with_sample_target(&query.step_keys, query.samples_per_step),
    };

    let mut controller =
        FetchController::new(source, query.build_query(), query.fetch, query.max_fetches)
            .starting_at_page(query.first_page)
            .with_resident(resident);
    let fetch = controller.run(&mut collector).await?;

    if collector.accumulator.is_empty() {
        warn!("No matching step executions found");
    } else {
        info!(
            "Collected {} samples from {} builds",
            collector.accumulator.len(),
            collector.accumulator.builds_seen()
        );
    }

    let samples = collector.accumulator.into_items();
    let steps = calculate_step_statistics(&samples);

    Ok(StepDurationReport {
        pipeline: query.pipeline.slug().to_string(),
        branch: branch_label(&query.branch),
        collected_at: Utc::now(),
        fetch,
        samples,
        steps,
    })
}

pub(crate) fn branch_label(branch: &BranchFilter) -> String {
    match branch {
        BranchFilter::Any => crate::fetch::predicate::ANY_BRANCH.to_string(),
        BranchFilter::Exact(name) => name.clone(),
    }
}
