use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

use super::summary::{render_durations, render_matches};
use crate::insights::{AnnotationSearchReport, StepDurationReport};

/// Output formats of the step duration analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DurationFormat {
    /// Sample table followed by per-step statistics
    #[default]
    Txt,
    /// Per-step statistics only
    TxtShort,
    /// One CSV row per sample
    Csv,
    Json,
}

/// Output formats of the annotation search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SearchFormat {
    #[default]
    Txt,
    Csv,
    Json,
}

pub fn export_durations(
    report: &StepDurationReport,
    format: DurationFormat,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    match format {
        DurationFormat::Txt => write!(output, "{}", render_durations(report, false))?,
        DurationFormat::TxtShort => write!(output, "{}", render_durations(report, true))?,
        DurationFormat::Csv => export_durations_csv(report, output)?,
        DurationFormat::Json => export_json(report, pretty, output)?,
    }
    Ok(())
}

pub fn export_matches(
    report: &AnnotationSearchReport,
    format: SearchFormat,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    match format {
        SearchFormat::Txt => write!(output, "{}", render_matches(report))?,
        SearchFormat::Csv => export_matches_csv(report, output)?,
        SearchFormat::Json => export_json(report, pretty, output)?,
    }
    Ok(())
}

fn export_json<T: Serialize>(report: &T, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

fn export_durations_csv(report: &StepDurationReport, output: &mut dyn Write) -> Result<()> {
    writeln!(
        output,
        "Build,Build URL,Branch,Build State,Step Key,Step State,Retried,Started At,Duration Seconds"
    )?;

    for sample in &report.samples {
        writeln!(
            output,
            "{},{},{},{},{},{},{},{},{:.1}",
            sample.build_number,
            csv_field(&sample.build_url),
            csv_field(&sample.branch),
            sample.build_state.as_str(),
            csv_field(&sample.step_key),
            sample.step_state.as_str(),
            sample.retried,
            sample
                .started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            sample.duration_secs,
        )?;
    }

    Ok(())
}

fn export_matches_csv(report: &AnnotationSearchReport, output: &mut dyn Write) -> Result<()> {
    writeln!(output, "Build,Build URL,Branch,Build State,Created At,Context,Excerpt")?;

    for found in &report.matches {
        writeln!(
            output,
            "{},{},{},{},{},{},{}",
            found.build_number,
            csv_field(&found.build_url),
            csv_field(&found.branch),
            found.build_state.as_str(),
            found.created_at.to_rfc3339(),
            csv_field(found.context.as_deref().unwrap_or("")),
            csv_field(&found.excerpt),
        )?;
    }

    Ok(())
}

/// Quotes a field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchOutcome, FetchSummary};
    use crate::insights::{AnnotationMatch, DurationSample};
    use crate::model::fixtures::ts;
    use crate::model::{BuildState, StepState};

    fn fetch() -> FetchSummary {
        FetchSummary {
            outcome: FetchOutcome::LimitReached,
            pages_fetched: 3,
            builds_seen: 300,
        }
    }

    fn durations_report() -> StepDurationReport {
        StepDurationReport {
            pipeline: "test".to_string(),
            branch: "main".to_string(),
            collected_at: ts(0),
            fetch: fetch(),
            samples: vec![DurationSample {
                build_number: 81234,
                build_url: "https://buildkite.com/materialize/test/builds/81234".to_string(),
                branch: "main".to_string(),
                build_state: BuildState::Failed,
                step_key: "cargo-test".to_string(),
                step_label: Some("Cargo test".to_string()),
                step_state: StepState::TimedOut,
                retried: true,
                started_at: None,
                duration_secs: 45.0,
                web_url: None,
            }],
            steps: Vec::new(),
        }
    }

    fn search_report() -> AnnotationSearchReport {
        AnnotationSearchReport {
            pipeline: "nightly".to_string(),
            branch: "*".to_string(),
            pattern: "panicked".to_string(),
            collected_at: ts(0),
            fetch: fetch(),
            matches: vec![AnnotationMatch {
                build_number: 9,
                build_url: "https://buildkite.com/materialize/nightly/builds/9".to_string(),
                branch: "main".to_string(),
                build_state: BuildState::Failed,
                created_at: ts(0),
                context: None,
                excerpt: "thread \"main\" panicked, exiting".to_string(),
            }],
        }
    }

    #[test]
    fn test_export_durations_csv() {
        let mut output = Vec::new();
        export_durations(&durations_report(), DurationFormat::Csv, false, &mut output).unwrap();
        let csv = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Build,Build URL"));
        assert_eq!(
            lines[1],
            "81234,https://buildkite.com/materialize/test/builds/81234,main,failed,cargo-test,timed_out,true,,45.0"
        );
    }

    #[test]
    fn test_export_matches_csv_quotes_excerpt() {
        let mut output = Vec::new();
        export_matches(&search_report(), SearchFormat::Csv, false, &mut output).unwrap();
        let csv = String::from_utf8(output).unwrap();
        assert!(csv.contains(r#""thread ""main"" panicked, exiting""#));
    }

    #[test]
    fn test_export_json() {
        let mut output = Vec::new();
        export_matches(&search_report(), SearchFormat::Json, false, &mut output).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["pattern"], "panicked");
        assert_eq!(json["fetch"]["outcome"], "limit_reached");
        assert_eq!(json["matches"][0]["build_number"], 9);
    }

    #[test]
    fn test_export_json_pretty() {
        let mut output = Vec::new();
        export_durations(&durations_report(), DurationFormat::Json, true, &mut output).unwrap();
        let json_str = String::from_utf8(output).unwrap();
        assert!(json_str.contains('\n'));
        assert!(json_str.contains("\"step_state\": \"timed_out\""));
    }

    #[test]
    fn test_csv_field_plain_value_untouched() {
        assert_eq!(csv_field("cargo-test"), "cargo-test");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
    }
}
