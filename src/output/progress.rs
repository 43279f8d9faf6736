use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{failure, outcome, pending, success};
use crate::fetch::FetchSummary;

/// Spinner shown on stderr while builds are being fetched.
pub struct FetchProgress {
    pb: ProgressBar,
}

impl FetchProgress {
    pub fn start(what: &str) -> Self {
        let pb = create_spinner(pending(format!("Fetching {what}")).to_string());
        Self { pb }
    }

    pub fn finish(self, summary: &FetchSummary) {
        self.pb.finish_with_message(format!(
            "{} ({})",
            success(format!(
                "Fetched {} pages, {} builds ✓",
                summary.pages_fetched, summary.builds_seen
            )),
            outcome(summary.outcome)
        ));
    }

    pub fn fail(self) {
        self.pb
            .abandon_with_message(failure("Fetching failed ✗").to_string());
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
