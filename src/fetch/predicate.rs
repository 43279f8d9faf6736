use std::collections::BTreeSet;
use std::ops::Range;

use regex::Regex;

use crate::error::Result;
use crate::model::{Annotation, Build, BuildState, StepExecution, StepState};

/// Branch token that matches builds on every branch.
pub const ANY_BRANCH: &str = "*";

/// Branch filter; the mode is picked from the literal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchFilter {
    Any,
    Exact(String),
}

impl BranchFilter {
    pub fn parse(value: &str) -> Self {
        if value == ANY_BRANCH {
            Self::Any
        } else {
            Self::Exact(value.to_string())
        }
    }

    pub fn accepts(&self, branch: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == branch,
        }
    }

    /// Value for the server-side `branch` parameter, if any.
    pub fn server_value(&self) -> Option<&str> {
        match self {
            Self::Any => None,
            Self::Exact(branch) => Some(branch),
        }
    }
}

/// Annotation search pattern, resolved once before fetching.
#[derive(Debug, Clone)]
pub enum TextPattern {
    Literal(String),
    Regex(Regex),
}

impl TextPattern {
    /// Builds the pattern, compiling it when `use_regex` is set.
    ///
    /// # Errors
    ///
    /// Returns a pattern error if the regular expression does not compile.
    pub fn new(pattern: &str, use_regex: bool) -> Result<Self> {
        if use_regex {
            Ok(Self::Regex(Regex::new(pattern)?))
        } else {
            Ok(Self::Literal(pattern.to_string()))
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Literal(needle) => text.contains(needle.as_str()),
            Self::Regex(regex) => regex.is_match(text),
        }
    }

    /// Byte range of the first match.
    pub fn find(&self, text: &str) -> Option<Range<usize>> {
        match self {
            Self::Literal(needle) => text
                .find(needle.as_str())
                .map(|start| start..start + needle.len()),
            Self::Regex(regex) => regex.find(text).map(|m| m.range()),
        }
    }
}

/// Selects step executions by key and state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMatcher {
    pub keys: Vec<String>,
    /// Empty means every state is accepted
    pub states: BTreeSet<StepState>,
}

impl StepMatcher {
    pub fn new(keys: Vec<String>, states: impl IntoIterator<Item = StepState>) -> Self {
        Self {
            keys,
            states: states.into_iter().collect(),
        }
    }

    pub fn accepts(&self, step: &StepExecution) -> bool {
        self.keys.iter().any(|key| step.has_key(key))
            && (self.states.is_empty() || self.states.contains(&step.state))
    }

    /// Matching step instances in source order; retried steps yield one each.
    pub fn matching_steps<'a>(
        &'a self,
        build: &'a Build,
    ) -> impl Iterator<Item = &'a StepExecution> + 'a {
        build.steps().iter().filter(move |step| self.accepts(step))
    }
}

/// One client-side condition on a build. Every variant is a pure function of
/// the build it is given.
#[derive(Debug, Clone)]
pub enum Predicate {
    Branch(BranchFilter),
    BuildState(BTreeSet<BuildState>),
    Step(StepMatcher),
    Annotation(TextPattern),
    FailedStep(String),
}

impl Predicate {
    pub fn accepts(&self, build: &Build) -> bool {
        match self {
            Self::Branch(filter) => filter.accepts(&build.branch),
            Self::BuildState(states) => states.is_empty() || states.contains(&build.state),
            Self::Step(matcher) => matcher.matching_steps(build).next().is_some(),
            Self::Annotation(pattern) => build
                .annotations()
                .iter()
                .any(|annotation| pattern.is_match(&annotation.body)),
            Self::FailedStep(key) => build
                .steps()
                .iter()
                .any(|step| step.has_key(key) && step.state.is_failure()),
        }
    }

    /// Whether the predicate reads the build's steps.
    pub fn needs_steps(&self) -> bool {
        matches!(self, Self::Step(_) | Self::FailedStep(_))
    }

    /// Whether the predicate reads the build's annotations.
    pub fn needs_annotations(&self) -> bool {
        matches!(self, Self::Annotation(_))
    }
}

/// Logical AND over a set of predicates.
#[derive(Debug, Clone, Default)]
pub struct BuildFilter {
    predicates: Vec<Predicate>,
}

impl BuildFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn accepts(&self, build: &Build) -> bool {
        self.predicates.iter().all(|p| p.accepts(build))
    }

    /// Evaluates only the predicates that need neither steps nor annotations,
    /// so a build can be rejected before anything else is loaded.
    pub fn accepts_summary(&self, build: &Build) -> bool {
        self.predicates
            .iter()
            .filter(|p| !p.needs_steps() && !p.needs_annotations())
            .all(|p| p.accepts(build))
    }

    /// Evaluates every predicate except the annotation ones.
    pub fn accepts_without_annotations(&self, build: &Build) -> bool {
        self.predicates
            .iter()
            .filter(|p| !p.needs_annotations())
            .all(|p| p.accepts(build))
    }

    pub fn needs_steps(&self) -> bool {
        self.predicates.iter().any(Predicate::needs_steps)
    }

    /// Annotations of the build that satisfy every annotation predicate.
    pub fn matching_annotations<'a>(
        &'a self,
        build: &'a Build,
    ) -> impl Iterator<Item = &'a Annotation> + 'a {
        build.annotations().iter().filter(move |annotation| {
            self.predicates.iter().all(|p| match p {
                Predicate::Annotation(pattern) => pattern.is_match(&annotation.body),
                _ => true,
            })
        })
    }
}
