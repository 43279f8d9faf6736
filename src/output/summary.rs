use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use super::styling::{bright, cyan, dim, outcome, pending};
use super::tables::{
    color_coded_duration_cell, color_coded_failure_cell, color_coded_flakiness_cell,
    create_table, step_state_cell,
};
use crate::fetch::FetchSummary;
use crate::insights::{AnnotationSearchReport, StepDurationReport};

/// Renders a step duration report as terminal tables.
///
/// The short variant omits the per-sample table and only shows statistics.
pub fn render_durations(report: &StepDurationReport, short: bool) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");
    add_overview(&mut output, &report.pipeline, &report.branch, &report.fetch);
    let _ = writeln!(
        output,
        "  {} {}\n",
        dim("Samples:"),
        pending(report.samples.len())
    );

    if !short && !report.samples.is_empty() {
        add_section_header(&mut output, "⏱️", "Samples");
        let mut table = create_table();
        table.set_header(create_cyan_header(&[
            "Build", "Branch", "Step", "State", "Retried", "Duration", "Started",
        ]));
        for sample in &report.samples {
            table.add_row(vec![
                Cell::new(format!("#{}", sample.build_number)),
                Cell::new(&sample.branch),
                Cell::new(&sample.step_key),
                step_state_cell(sample.step_state),
                Cell::new(if sample.retried { "yes" } else { "" }),
                color_coded_duration_cell(sample.duration_secs),
                Cell::new(
                    sample
                        .started_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default(),
                ),
            ]);
        }
        let _ = writeln!(output, "{table}\n");
    }

    if report.steps.is_empty() {
        let _ = writeln!(output, "  {}", dim("No matching step executions."));
        return output;
    }

    add_section_header(&mut output, "📈", "Step Statistics");
    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Step", "Runs", "Passed", "Failed", "Failure Rate", "Retry Rate", "Min", "Mean", "P50",
        "P95", "P99", "Max",
    ]));
    for step in &report.steps {
        table.add_row(vec![
            Cell::new(&step.step_key),
            Cell::new(step.executions),
            Cell::new(step.passed),
            Cell::new(step.failed),
            color_coded_failure_cell(step.failure_rate),
            color_coded_flakiness_cell(step.flakiness_rate),
            color_coded_duration_cell(step.duration_min),
            color_coded_duration_cell(step.duration_mean),
            color_coded_duration_cell(step.duration_p50),
            color_coded_duration_cell(step.duration_p95),
            color_coded_duration_cell(step.duration_p99),
            color_coded_duration_cell(step.duration_max),
        ]);
    }
    let _ = writeln!(output, "{table}");

    output
}

/// Renders annotation matches, one row per match.
pub fn render_matches(report: &AnnotationSearchReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🔎", "Search");
    add_overview(&mut output, &report.pipeline, &report.branch, &report.fetch);
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n",
        dim("Pattern:"),
        cyan(&report.pattern),
        dim("Matches:"),
        pending(report.matches.len())
    );

    if report.matches.is_empty() {
        let _ = writeln!(output, "  {}", dim("No matching annotations."));
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&["Build", "Branch", "State", "Context", "Excerpt"]));
    for found in &report.matches {
        table.add_row(vec![
            Cell::new(format!("#{}\n{}", found.build_number, found.build_url)),
            Cell::new(&found.branch),
            Cell::new(found.build_state.as_str()),
            Cell::new(found.context.as_deref().unwrap_or("")),
            Cell::new(&found.excerpt),
        ]);
    }
    let _ = writeln!(output, "{table}");

    output
}

fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn add_overview(output: &mut String, pipeline: &str, branch: &str, fetch: &FetchSummary) {
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {} ({})\n  {} {}",
        dim("Pipeline:"),
        cyan(pipeline),
        dim("Branch:"),
        cyan(branch),
        dim("Pages fetched:"),
        pending(fetch.pages_fetched),
        outcome(fetch.outcome),
        dim("Builds seen:"),
        pending(fetch.builds_seen),
    );
}
