mod buildkite;

pub use buildkite::BuildkiteProvider;
