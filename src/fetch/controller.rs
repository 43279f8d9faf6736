use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::source::{BuildQuery, BuildSource, PageCursor};
use crate::error::{InsightsError, Result};
use crate::model::Build;

/// How many pages of remote data a run may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FetchPolicy {
    /// Fetch page by page until the results are sufficient
    #[default]
    Auto,
    /// Fetch up to the page limit regardless of the results
    Always,
    /// Only use data already held in memory
    Never,
}

/// Why fetching ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// Only resident data was used (`never`)
    Resident,
    /// The consumer reported enough results (`auto` only)
    Satisfied,
    /// The source reported no further pages
    Exhausted,
    /// `max_fetches` pages were requested
    LimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Fetching,
    Finished(FetchOutcome),
    Done(FetchOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSummary {
    pub outcome: FetchOutcome,
    pub pages_fetched: usize,
    pub builds_seen: usize,
}

/// Receives each page of builds, in source order, as soon as it arrives.
#[allow(async_fn_in_trait)]
pub trait PageConsumer {
    async fn consume(&mut self, builds: Vec<Build>) -> Result<()>;

    /// Stop signal consulted after every page under [`FetchPolicy::Auto`].
    fn is_satisfied(&self) -> bool;
}

/// Pulls pages from a [`BuildSource`] one at a time and decides when to stop.
///
/// The page cursor advances after every request, including pages whose builds
/// were all filtered out, so `max_fetches` always bounds the number of calls.
/// A failing request aborts the run; results consumed so far are not reported.
pub struct FetchController<'a, S> {
    source: &'a S,
    query: BuildQuery,
    policy: FetchPolicy,
    max_fetches: usize,
    cursor: PageCursor,
    pages_fetched: usize,
    builds_seen: usize,
    resident: Vec<Build>,
    state: FetchState,
}

impl<'a, S: BuildSource> FetchController<'a, S> {
    pub fn new(source: &'a S, query: BuildQuery, policy: FetchPolicy, max_fetches: usize) -> Self {
        Self {
            source,
            query,
            policy,
            max_fetches,
            cursor: PageCursor::default(),
            pages_fetched: 0,
            builds_seen: 0,
            resident: Vec::new(),
            state: FetchState::Idle,
        }
    }

    #[must_use]
    pub fn starting_at_page(mut self, page: u32) -> Self {
        self.cursor = PageCursor::starting_at(page);
        self
    }

    /// Builds already held in memory, used by [`FetchPolicy::Never`].
    #[must_use]
    pub fn with_resident(mut self, builds: Vec<Build>) -> Self {
        self.resident = builds;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Drives the consumer to completion.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any request when the policy cannot
    /// be honored, and propagates the first source or consumer error.
    pub async fn run<C: PageConsumer>(&mut self, consumer: &mut C) -> Result<FetchSummary> {
        if self.state != FetchState::Idle {
            return Err(InsightsError::Config(
                "fetch controller has already been run".to_string(),
            ));
        }

        let outcome = match self.policy {
            FetchPolicy::Never => self.consume_resident(consumer).await?,
            FetchPolicy::Auto | FetchPolicy::Always => {
                if self.max_fetches == 0 {
                    return Err(InsightsError::Config(
                        "max fetches must be at least 1 unless fetching is disabled".to_string(),
                    ));
                }
                self.transition(FetchState::Fetching);
                loop {
                    if let Some(outcome) = self.fetch_next(consumer).await? {
                        break outcome;
                    }
                }
            }
        };

        self.transition(FetchState::Finished(outcome));
        self.transition(FetchState::Done(outcome));

        Ok(FetchSummary {
            outcome,
            pages_fetched: self.pages_fetched,
            builds_seen: self.builds_seen,
        })
    }

    async fn consume_resident<C: PageConsumer>(&mut self, consumer: &mut C) -> Result<FetchOutcome> {
        if self.resident.is_empty() {
            return Err(InsightsError::Config(format!(
                "fetching is disabled but no build data for pipeline '{}' is loaded",
                self.query.pipeline
            )));
        }

        let builds = std::mem::take(&mut self.resident);
        info!("Using {} resident builds, fetching disabled", builds.len());
        self.builds_seen += builds.len();
        consumer.consume(builds).await?;

        Ok(FetchOutcome::Resident)
    }

    async fn fetch_next<C: PageConsumer>(&mut self, consumer: &mut C) -> Result<Option<FetchOutcome>> {
        let page = self.source.list_builds(&self.query, self.cursor).await?;
        self.pages_fetched += 1;
        let next = self.cursor.advance();
        if let Some(next) = next {
            self.cursor = next;
        }

        // A page can be empty while later pages are not, e.g. when every build
        // on it was in a state the source does not report.
        let has_more = page.has_more && next.is_some();
        match page.builds.last() {
            Some(oldest) => {
                info!(
                    "Fetched {} builds, created at {}.",
                    page.builds.len(),
                    oldest.created_at
                );
                self.builds_seen += page.builds.len();
                consumer.consume(page.builds).await?;
            }
            None => debug!("Page {} held no usable builds", self.pages_fetched),
        }

        if self.policy == FetchPolicy::Auto && consumer.is_satisfied() {
            info!("Enough results after {} pages.", self.pages_fetched);
            return Ok(Some(FetchOutcome::Satisfied));
        }
        if !has_more {
            info!("No further results.");
            return Ok(Some(FetchOutcome::Exhausted));
        }
        if self.pages_fetched >= self.max_fetches {
            info!("Max fetches reached.");
            return Ok(Some(FetchOutcome::LimitReached));
        }

        Ok(None)
    }

    fn transition(&mut self, next: FetchState) {
        debug!("Fetch state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
