use std::sync::LazyLock;

use chrono::Utc;
use log::{debug, info, warn};
use regex::Regex;

use super::step_durations::branch_label;
use crate::error::{InsightsError, Result};
use crate::fetch::{
    ensure_annotations, ensure_steps, BranchFilter, BuildFilter, BuildQuery, BuildSource,
    FetchController, FetchPolicy, Offer, PageConsumer, Predicate, ResultAccumulator, TextPattern,
};
use crate::insights::{AnnotationMatch, AnnotationSearchReport};
use crate::model::{Annotation, Build, BuildState, Pipeline};

const EXCERPT_RADIUS: usize = 120;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Parameters of one annotation search.
#[derive(Debug, Clone)]
pub struct AnnotationSearchQuery {
    pub pipeline: Pipeline,
    pub branch: BranchFilter,
    /// Pattern as typed by the user, kept for the report
    pub pattern_text: String,
    pub pattern: TextPattern,
    pub fetch_builds: FetchPolicy,
    pub fetch_annotations: FetchPolicy,
    pub max_build_fetches: usize,
    pub first_build_page: u32,
    pub max_results: Option<usize>,
    pub only_one_result_per_build: bool,
    pub only_failed_builds: bool,
    pub only_failed_build_step_key: Option<String>,
    /// Empty means every build state
    pub build_states: Vec<BuildState>,
}

impl AnnotationSearchQuery {
    /// Build states requested from the server. `only_failed_builds` narrows an
    /// explicit state list instead of replacing it.
    fn effective_states(&self) -> Result<Vec<BuildState>> {
        if !self.only_failed_builds {
            return Ok(self.build_states.clone());
        }
        if self.build_states.is_empty() || self.build_states.contains(&BuildState::Failed) {
            return Ok(vec![BuildState::Failed]);
        }
        Err(InsightsError::Config(
            "only failed builds were requested, but the build state filter excludes 'failed'"
                .to_string(),
        ))
    }

    fn build_query(&self, states: &[BuildState]) -> BuildQuery {
        BuildQuery {
            pipeline: self.pipeline.slug().to_string(),
            branch: self.branch.server_value().map(ToString::to_string),
            states: states.to_vec(),
        }
    }

    fn build_filter(&self, states: &[BuildState]) -> BuildFilter {
        let filter = BuildFilter::new()
            .with(Predicate::Branch(self.branch.clone()))
            .with(Predicate::BuildState(states.iter().copied().collect()))
            .with(Predicate::Annotation(self.pattern.clone()));

        match &self.only_failed_build_step_key {
            Some(key) => filter.with(Predicate::FailedStep(key.clone())),
            None => filter,
        }
    }
}

struct AnnotationCollector<'a, S> {
    source: &'a S,
    filter: BuildFilter,
    pattern: TextPattern,
    fetch_annotations: FetchPolicy,
    accumulator: ResultAccumulator<AnnotationMatch>,
}

impl<S: BuildSource> AnnotationCollector<'_, S> {
    /// Makes the build's annotations available according to the annotation
    /// fetch policy. Returns false when the build should be skipped.
    async fn load_annotations(&self, build: &mut Build) -> Result<bool> {
        match self.fetch_annotations {
            FetchPolicy::Never => {
                if build.annotations.is_none() {
                    debug!("Annotations of build #{} are not resident", build.number);
                    return Ok(false);
                }
            }
            FetchPolicy::Auto => {
                if !self.accumulator.would_accept(build.number) {
                    return Ok(false);
                }
                ensure_annotations(self.source, build).await?;
            }
            FetchPolicy::Always => ensure_annotations(self.source, build).await?,
        }
        Ok(true)
    }
}

impl<S: BuildSource> PageConsumer for AnnotationCollector<'_, S> {
    async fn consume(&mut self, builds: Vec<Build>) -> Result<()> {
        for mut build in builds {
            if self.fetch_annotations == FetchPolicy::Auto && self.accumulator.is_satisfied() {
                break;
            }
            if !self.filter.accepts_summary(&build) {
                debug!("Skipping build #{} ({:?})", build.number, build.state);
                continue;
            }
            if self.filter.needs_steps() {
                ensure_steps(self.source, &mut build).await?;
            }
            if !self.filter.accepts_without_annotations(&build) {
                debug!("Build #{} has no failed step of interest", build.number);
                continue;
            }

            self.accumulator.note_build();
            if !self.load_annotations(&mut build).await? {
                continue;
            }

            for annotation in self.filter.matching_annotations(&build) {
                let found = annotation_match(&build, annotation, &self.pattern);
                match self.accumulator.offer(build.number, None, found) {
                    Offer::Accepted => {}
                    Offer::Full | Offer::DuplicateBuild => break,
                }
            }
        }
        Ok(())
    }

    fn is_satisfied(&self) -> bool {
        self.accumulator.is_satisfied()
    }
}

fn annotation_match(build: &Build, annotation: &Annotation, pattern: &TextPattern) -> AnnotationMatch {
    AnnotationMatch {
        build_number: build.number,
        build_url: build.web_url.clone(),
        branch: build.branch.clone(),
        build_state: build.state,
        created_at: build.created_at,
        context: annotation.context.clone(),
        excerpt: excerpt(&annotation.body, pattern),
    }
}

/// Strips markup from an annotation body and collapses whitespace.
pub fn plain_text(body: &str) -> String {
    let text = TAG.replace_all(body, " ");
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Plain-text window around the first match, or the start of the text when
/// the match only exists in the markup.
pub fn excerpt(body: &str, pattern: &TextPattern) -> String {
    let text = plain_text(body);
    let (start, end) = match pattern.find(&text) {
        Some(range) => (
            floor_char_boundary(&text, range.start.saturating_sub(EXCERPT_RADIUS)),
            ceil_char_boundary(&text, range.end + EXCERPT_RADIUS),
        ),
        None => (0, ceil_char_boundary(&text, 2 * EXCERPT_RADIUS)),
    };

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(&text[start..end]);
    if end < text.len() {
        out.push_str("...");
    }
    out
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Searches build annotations for the pattern.
///
/// # Errors
///
/// Returns a configuration error for contradictory filters or fetch policies
/// that cannot be honored (checked before any request), and propagates the
/// first remote error.
pub async fn search_annotations<S: BuildSource>(
    source: &S,
    query: &AnnotationSearchQuery,
    resident: Vec<Build>,
) -> Result<AnnotationSearchReport> {
    let states = query.effective_states()?;

    if query.fetch_annotations == FetchPolicy::Never
        && !resident.iter().any(|b| b.annotations.is_some())
    {
        return Err(InsightsError::Config(
            "annotation fetching is disabled but no annotations are loaded".to_string(),
        ));
    }

    let mut collector = AnnotationCollector {
        source,
        filter: query.build_filter(&states),
        pattern: query.pattern.clone(),
        fetch_annotations: query.fetch_annotations,
        accumulator: ResultAccumulator::new(query.max_results)
            .one_result_per_build(query.only_one_result_per_build),
    };

    let mut controller = FetchController::new(
        source,
        query.build_query(&states),
        query.fetch_builds,
        query.max_build_fetches,
    )
    .starting_at_page(query.first_build_page)
    .with_resident(resident);
    let fetch = controller.run(&mut collector).await?;

    if collector.accumulator.is_empty() {
        warn!("No matching annotations found");
    } else {
        info!(
            "Found {} matches in {} builds",
            collector.accumulator.len(),
            collector.accumulator.builds_seen()
        );
    }

    Ok(AnnotationSearchReport {
        pipeline: query.pipeline.slug().to_string(),
        branch: branch_label(&query.branch),
        pattern: query.pattern_text.clone(),
        collected_at: Utc::now(),
        fetch,
        matches: collector.accumulator.into_items(),
    })
}
