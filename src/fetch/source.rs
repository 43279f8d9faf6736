use crate::error::Result;
use crate::model::{Annotation, Build, BuildState, StepExecution};

/// Server-side filters passed through verbatim with every `list_builds` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildQuery {
    pub pipeline: String,
    /// `None` requests builds on any branch
    pub branch: Option<String>,
    pub states: Vec<BuildState>,
}

/// Position of the next page to request. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor(u32);

impl PageCursor {
    /// Cursor for the given 1-based page; page 0 is treated as page 1.
    pub fn starting_at(page: u32) -> Self {
        Self(page.max(1))
    }

    pub fn page(self) -> u32 {
        self.0
    }

    /// The following page, or `None` once the page number cannot grow.
    #[must_use]
    pub fn advance(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl Default for PageCursor {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// One page of builds in the source's native order (most recent first).
#[derive(Debug, Clone, Default)]
pub struct BuildPage {
    pub builds: Vec<Build>,
    pub has_more: bool,
}

/// The remote build history.
///
/// Implementations perform I/O only: no retries, no caching and no filtering
/// beyond the server-side filters in [`BuildQuery`].
#[allow(async_fn_in_trait)]
pub trait BuildSource {
    async fn list_builds(&self, query: &BuildQuery, cursor: PageCursor) -> Result<BuildPage>;

    async fn list_steps(&self, build: &Build) -> Result<Vec<StepExecution>>;

    async fn list_annotations(&self, build: &Build) -> Result<Vec<Annotation>>;
}

/// Loads the build's steps whole if they are not resident yet.
pub async fn ensure_steps<S: BuildSource>(source: &S, build: &mut Build) -> Result<()> {
    if build.steps.is_none() {
        build.steps = Some(source.list_steps(build).await?);
    }
    Ok(())
}

/// Loads the build's annotations whole if they are not resident yet.
pub async fn ensure_annotations<S: BuildSource>(source: &S, build: &mut Build) -> Result<()> {
    if build.annotations.is_none() {
        build.annotations = Some(source.list_annotations(build).await?);
    }
    Ok(())
}
