mod batch;
mod error;
mod input;
mod logging;
mod model;
mod pipeline;
mod report;
mod sections;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use crate::batch::{BatchLog, BatchOptions, run_batch};
use crate::error::ReportResult;
use crate::model::config::PipelineConfig;

#[derive(Debug, Parser)]
#[command(name = "kira-neuroreport", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Subject reports followed by the grand average.
    Run(RunArgs),
    /// Grand-average reports only.
    Average(RunArgs),
}

impl Command {
    fn args(&self) -> &RunArgs {
        match self {
            Command::Run(args) | Command::Average(args) => args,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    #[arg(long)]
    config: PathBuf,
    #[arg(long)]
    jobs: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long = "n-permutations")]
    n_permutations: Option<usize>,
    #[arg(long = "n-boot")]
    n_boot: Option<usize>,
    #[arg(long = "subject")]
    subjects: Vec<String>,
    #[arg(long)]
    skip_average: bool,
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logging::init_logging(cli.command.args().log_level.as_deref()) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    match run(&cli.command) {
        Ok(log) if !log.has_failures() => ExitCode::SUCCESS,
        Ok(log) => {
            tracing::error!("{} report tasks failed", log.n_failed());
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: &Command) -> ReportResult<BatchLog> {
    let cfg = load_config(command.args())?;
    let opts = batch_options(command, &cfg);
    run_batch(&cfg, &opts)
}

fn load_config(args: &RunArgs) -> ReportResult<PipelineConfig> {
    let mut cfg = PipelineConfig::load(&args.config)?;
    apply_overrides(&mut cfg, args);
    cfg.validate()?;
    Ok(cfg)
}

fn apply_overrides(cfg: &mut PipelineConfig, args: &RunArgs) {
    if let Some(jobs) = args.jobs {
        cfg.n_jobs = jobs;
    }
    if let Some(seed) = args.seed {
        cfg.random_state = seed;
    }
    if let Some(n) = args.n_permutations {
        cfg.cluster_n_permutations = n;
    }
    if let Some(n) = args.n_boot {
        cfg.n_boot = n;
    }
}

fn batch_options(command: &Command, cfg: &PipelineConfig) -> BatchOptions {
    let args = command.args();
    let mut opts = BatchOptions::from_config(cfg);
    if !args.subjects.is_empty() {
        opts.subjects = Some(args.subjects.clone());
    }
    match command {
        Command::Run(_) => opts.grand_average = !args.skip_average,
        Command::Average(_) => opts.subject_reports = false,
    }
    opts
}

#[cfg(test)]
#[path = "../tests/src_inline/main_inline.rs"]
mod tests;
