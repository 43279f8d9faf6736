pub mod annotation_search;
pub mod step_durations;
pub mod step_metrics;
