//! Incremental fetch-and-filter pipeline shared by every analysis.

pub mod accumulator;
pub mod controller;
pub mod predicate;
pub mod source;

#[cfg(test)]
pub(crate) mod fake;

pub use accumulator::{Offer, ResultAccumulator};
pub use controller::{FetchController, FetchOutcome, FetchPolicy, FetchSummary, PageConsumer};
pub use predicate::{BranchFilter, BuildFilter, Predicate, StepMatcher, TextPattern};
pub use source::{ensure_annotations, ensure_steps, BuildPage, BuildQuery, BuildSource, PageCursor};
