use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use seismo_pipeline::app::App;
use seismo_pipeline::config::{ConfigLoader, ResolvedConfig};
use seismo_pipeline::domain::{FillPolicy, GatherSize};
use seismo_pipeline::error::PipelineError;
use seismo_pipeline::fetch::HttpFetcher;
use seismo_pipeline::output::JsonOutput;
use seismo_pipeline::plan::RequestPlan;

#[derive(Parser)]
#[command(name = "seismo-pipeline")]
#[command(about = "Download, consolidate and audit seismometer waveform chunks")]
#[command(version, author)]
struct Cli {
    /// Path to the JSON config (defaults to ./seismo-pipeline.json)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch every chunk of the configured request plan")]
    Download,
    #[command(about = "Merge chunk files into day, hour or minute files")]
    Gather(GatherArgs),
    #[command(about = "List windows with no consolidated data")]
    Gaps(GapsArgs),
    #[command(about = "Download the windows listed in a saved gap file")]
    Backfill(BackfillArgs),
}

#[derive(Args)]
struct GatherArgs {
    #[arg(long, value_enum, default_value_t = GatherSize::Day)]
    size: GatherSize,

    #[arg(long, value_enum, default_value_t = FillPolicy::ZeroFill)]
    fill: FillPolicy,
}

#[derive(Args)]
struct GapsArgs {
    #[arg(long, value_enum, default_value_t = GatherSize::Day)]
    size: GatherSize,

    /// Smallest discontinuity reported, in samples
    #[arg(long, default_value_t = 1)]
    min_gap: u64,

    /// Save the gaps as request records for `backfill`
    #[arg(long)]
    out: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct BackfillArgs {
    #[arg(long)]
    records: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::MissingConfig
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_)
        | PipelineError::MissingField(_)
        | PipelineError::Validation(_)
        | PipelineError::InvalidTimeOrder { .. }
        | PipelineError::InvalidIdentifier(_)
        | PipelineError::InvalidEndpoint(_)
        | PipelineError::InvalidConcurrency(_)
        | PipelineError::InvalidChunkSize(_)
        | PipelineError::EmptyPlan => 2,
        PipelineError::Http(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    let fetcher = HttpFetcher::new(resolved.pipeline.timeout)?;
    let ResolvedConfig { pipeline, plan } = resolved;
    let app = App::new(pipeline, fetcher);

    match cli.command {
        Commands::Download => {
            let report = app.download(&require_plan(plan)?, &JsonOutput)?;
            JsonOutput::print_download(&report).into_diagnostic()?;
        }
        Commands::Gather(args) => {
            let report = app.gather(&require_plan(plan)?, args.size, args.fill, &JsonOutput)?;
            JsonOutput::print_gather(&report).into_diagnostic()?;
        }
        Commands::Gaps(args) => {
            let report = app.find_gaps(
                &require_plan(plan)?,
                args.size,
                args.min_gap,
                args.out.as_deref(),
                &JsonOutput,
            )?;
            JsonOutput::print_gaps(&report).into_diagnostic()?;
        }
        Commands::Backfill(args) => {
            let report = app.backfill(&args.records, &JsonOutput)?;
            JsonOutput::print_download(&report).into_diagnostic()?;
        }
    }
    Ok(())
}

fn require_plan(plan: Option<RequestPlan>) -> Result<RequestPlan, PipelineError> {
    plan.ok_or_else(|| PipelineError::MissingField("request".to_string()))
}
