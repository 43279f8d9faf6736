use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::io::Write;
use std::path::PathBuf;

use crate::analysis::annotation_search::AnnotationSearchQuery;
use crate::analysis::step_durations::StepDurationQuery;
use crate::auth::{Token, TOKEN_ENV};
use crate::config::Config;
use crate::fetch::{BranchFilter, FetchPolicy, TextPattern};
use crate::model::{BuildState, Pipeline, StepState};
use crate::output::{export_durations, export_matches, DurationFormat, SearchFormat};
use crate::providers::BuildkiteProvider;

#[derive(Parser)]
#[command(name = "bkinsights")]
#[command(author, version, about = "Buildkite build history insights", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Buildkite API token
    #[arg(short, long, global = true, env = TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,

    /// Configuration file (defaults to ./bkinsights.toml or the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the report to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty-print JSON reports
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze how long selected steps take
    StepDurations(StepDurationsArgs),
    /// Search build annotations for a pattern
    AnnotationSearch(AnnotationSearchArgs),
}

#[derive(Args)]
struct StepDurationsArgs {
    #[arg(value_enum)]
    pipeline: Pipeline,

    /// Step key to analyze; may be repeated
    #[arg(long = "step-key", required = true)]
    step_keys: Vec<String>,

    /// Only count step executions in these states
    #[arg(long = "step-state", value_enum)]
    step_states: Vec<StepState>,

    /// Only consider builds in these states
    #[arg(long = "build-state", value_enum)]
    build_states: Vec<BuildState>,

    /// Branch to analyze, "*" for every branch
    #[arg(short, long)]
    branch: Option<String>,

    #[arg(long, value_enum, default_value_t = FetchPolicy::Auto)]
    fetch: FetchPolicy,

    /// Maximum number of build pages to request
    #[arg(long)]
    max_fetches: Option<usize>,

    #[arg(long, default_value_t = 1)]
    first_page: u32,

    /// Stop after this many matching builds
    #[arg(long)]
    max_builds: Option<usize>,

    /// Stop once every step key has this many samples
    #[arg(long)]
    samples: Option<usize>,

    /// Keep at most this many samples in total
    #[arg(long)]
    max_results: Option<usize>,

    #[arg(short, long, value_enum, default_value_t = DurationFormat::Txt)]
    format: DurationFormat,
}

#[derive(Args)]
struct AnnotationSearchArgs {
    #[arg(value_enum)]
    pipeline: Pipeline,

    /// Text to search for (a regular expression with --use-regex)
    pattern: String,

    /// Branch to search, "*" for every branch
    #[arg(short, long)]
    branch: Option<String>,

    #[arg(long, value_enum, default_value_t = FetchPolicy::Auto)]
    fetch_builds: FetchPolicy,

    #[arg(long, value_enum, default_value_t = FetchPolicy::Auto)]
    fetch_annotations: FetchPolicy,

    /// Maximum number of build pages to request
    #[arg(long)]
    max_build_fetches: Option<usize>,

    #[arg(long, default_value_t = 1)]
    first_build_page: u32,

    #[arg(long)]
    max_results: Option<usize>,

    #[arg(long)]
    only_one_result_per_build: bool,

    #[arg(long)]
    only_failed_builds: bool,

    /// Only builds in which this step failed
    #[arg(long)]
    only_failed_build_step_key: Option<String>,

    #[arg(long)]
    use_regex: bool,

    /// Only consider builds in these states
    #[arg(long = "build-state", value_enum)]
    build_states: Vec<BuildState>,

    #[arg(short, long, value_enum, default_value_t = SearchFormat::Txt)]
    format: SearchFormat,
}

impl StepDurationsArgs {
    fn to_query(&self, config: &Config) -> StepDurationQuery {
        StepDurationQuery {
            pipeline: self.pipeline,
            branch: BranchFilter::parse(self.branch.as_deref().unwrap_or(&config.defaults.branch)),
            step_keys: self.step_keys.clone(),
            step_states: self.step_states.clone(),
            build_states: self.build_states.clone(),
            fetch: self.fetch,
            max_fetches: self.max_fetches.unwrap_or(config.defaults.max_fetches),
            first_page: self.first_page,
            max_builds: self.max_builds,
            samples_per_step: self.samples,
            max_results: self.max_results,
        }
    }
}

impl AnnotationSearchArgs {
    /// Compiles the pattern, so an invalid regex fails before any request.
    fn to_query(&self, config: &Config) -> Result<AnnotationSearchQuery> {
        let pattern = TextPattern::new(&self.pattern, self.use_regex)
            .with_context(|| format!("Invalid search pattern: {}", self.pattern))?;

        Ok(AnnotationSearchQuery {
            pipeline: self.pipeline,
            branch: BranchFilter::parse(self.branch.as_deref().unwrap_or(&config.defaults.branch)),
            pattern_text: self.pattern.clone(),
            pattern,
            fetch_builds: self.fetch_builds,
            fetch_annotations: self.fetch_annotations,
            max_build_fetches: self
                .max_build_fetches
                .unwrap_or(config.defaults.max_build_fetches),
            first_build_page: self.first_build_page,
            max_results: Some(self.max_results.unwrap_or(config.defaults.max_results)),
            only_one_result_per_build: self.only_one_result_per_build,
            only_failed_builds: self.only_failed_builds,
            only_failed_build_step_key: self.only_failed_build_step_key.clone(),
            build_states: self.build_states.clone(),
        })
    }
}

impl Cli {
    fn provider(&self, config: &Config) -> Result<BuildkiteProvider> {
        let token = Token::resolve(self.token.as_deref(), config.buildkite.token.as_deref())?;
        Ok(BuildkiteProvider::new(&config.buildkite, token)?)
    }

    fn write_report(&self, render: impl FnOnce(&mut dyn Write) -> Result<()>) -> Result<()> {
        if let Some(output_path) = &self.output {
            let mut file = std::fs::File::create(output_path)
                .with_context(|| format!("Failed to create {}", output_path.display()))?;
            render(&mut file)?;
            info!("Report written to: {}", output_path.display());
        } else {
            let stdout = std::io::stdout();
            render(&mut stdout.lock())?;
        }
        Ok(())
    }

    async fn execute_step_durations(&self, args: &StepDurationsArgs, config: &Config) -> Result<()> {
        let query = args.to_query(config);
        let provider = self.provider(config)?;
        let report = provider.collect_step_durations(&query).await?;

        let pretty = self.pretty || config.output.pretty;
        self.write_report(|out| export_durations(&report, args.format, pretty, out))
    }

    async fn execute_annotation_search(
        &self,
        args: &AnnotationSearchArgs,
        config: &Config,
    ) -> Result<()> {
        let query = args.to_query(config)?;
        let provider = self.provider(config)?;
        let report = provider.search_annotations(&query).await?;

        let pretty = self.pretty || config.output.pretty;
        self.write_report(|out| export_matches(&report, args.format, pretty, out))
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::StepDurations(args) => self.execute_step_durations(args, &config).await,
            Commands::AnnotationSearch(args) => {
                self.execute_annotation_search(args, &config).await
            }
        }
    }
}
