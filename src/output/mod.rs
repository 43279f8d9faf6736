mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::{export_durations, export_matches, DurationFormat, SearchFormat};
pub use progress::FetchProgress;
pub use styling::{dim, magenta_bold};

/// Prints the bkinsights banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔍 bkinsights"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Buildkite build history insights")
    );
}
