//! In-memory [`BuildSource`] for tests.

use std::cell::{Cell, RefCell};

use super::source::{BuildPage, BuildQuery, BuildSource, PageCursor};
use crate::error::{InsightsError, Result};
use crate::model::{Annotation, Build, StepExecution};

/// Serves pre-built pages and counts every call made against it.
#[derive(Default)]
pub struct FakeSource {
    pages: Vec<Vec<Build>>,
    annotations: Vec<(u64, Vec<Annotation>)>,
    fail_on_page: Option<u32>,
    pub page_requests: Cell<usize>,
    pub annotation_requests: Cell<usize>,
    pub step_requests: Cell<usize>,
    pub queries: RefCell<Vec<(BuildQuery, u32)>>,
}

impl FakeSource {
    pub fn with_pages(pages: Vec<Vec<Build>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    /// Annotations returned for a build whose annotations are not embedded.
    pub fn with_annotations(mut self, number: u64, annotations: Vec<Annotation>) -> Self {
        self.annotations.push((number, annotations));
        self
    }

    pub fn failing_on_page(mut self, page: u32) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn total_calls(&self) -> usize {
        self.page_requests.get() + self.annotation_requests.get() + self.step_requests.get()
    }
}

impl BuildSource for FakeSource {
    async fn list_builds(&self, query: &BuildQuery, cursor: PageCursor) -> Result<BuildPage> {
        self.page_requests.set(self.page_requests.get() + 1);
        self.queries.borrow_mut().push((query.clone(), cursor.page()));

        if self.fail_on_page == Some(cursor.page()) {
            return Err(InsightsError::remote(Some(429), "rate limit exceeded"));
        }

        let index = cursor.page() as usize - 1;
        let builds = self.pages.get(index).cloned().unwrap_or_default();
        Ok(BuildPage {
            builds,
            has_more: index + 1 < self.pages.len(),
        })
    }

    async fn list_steps(&self, _build: &Build) -> Result<Vec<StepExecution>> {
        self.step_requests.set(self.step_requests.get() + 1);
        Ok(vec![])
    }

    async fn list_annotations(&self, build: &Build) -> Result<Vec<Annotation>> {
        self.annotation_requests.set(self.annotation_requests.get() + 1);
        Ok(self
            .annotations
            .iter()
            .find(|(number, _)| *number == build.number)
            .map(|(_, annotations)| annotations.clone())
            .unwrap_or_default())
    }
}
