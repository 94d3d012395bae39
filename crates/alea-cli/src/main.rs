//! alea CLI

mod submitter;

use alea_toymc::{runner_arguments, str_to_arg, Runner, RunnerConfig};
use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use submitter::{execute_ticket, SubmissionConfig, Submitter};

#[derive(Parser)]
#[command(name = "alea")]
#[command(about = "alea - toy Monte Carlo for statistical inference")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one toy Monte Carlo job
    RunToymc(RunToymcArgs),

    /// Expand a submission config into run-toymc jobs
    Submit {
        /// Submission config (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Computation to expand (overrides the config)
        #[arg(long)]
        computation: Option<String>,

        /// Output folder (overrides the config)
        #[arg(long)]
        outputfolder: Option<PathBuf>,

        /// Only keep the first job
        #[arg(long)]
        debug: bool,

        /// Run the jobs in this process instead of printing them
        #[arg(long)]
        execute: bool,
    },

    /// Print version
    Version,
}

/// `run-toymc` flags, one per runner argument, parsed through the runner schema.
#[derive(Debug, Default)]
struct RunToymcArgs {
    arguments: Map<String, Value>,
}

impl clap::FromArgMatches for RunToymcArgs {
    fn from_arg_matches(matches: &ArgMatches) -> Result<Self, clap::Error> {
        let mut args = Self::default();
        args.update_from_arg_matches(matches)?;
        Ok(args)
    }

    fn update_from_arg_matches(&mut self, matches: &ArgMatches) -> Result<(), clap::Error> {
        for spec in runner_arguments() {
            if let Some(text) = matches.get_one::<String>(spec.name) {
                let value = str_to_arg(text, spec.kind).map_err(|e| {
                    clap::Error::raw(
                        clap::error::ErrorKind::ValueValidation,
                        format!("invalid value for --{}: {}\n", spec.name, e),
                    )
                })?;
                self.arguments.insert(spec.name.to_string(), value);
            }
        }
        Ok(())
    }
}

impl clap::Args for RunToymcArgs {
    fn augment_args(cmd: clap::Command) -> clap::Command {
        // a repeated flag keeps its last value
        runner_arguments().into_iter().fold(cmd.args_override_self(true), |cmd, spec| {
            cmd.arg(
                Arg::new(spec.name)
                    .long(spec.name)
                    .value_name(spec.kind.as_str())
                    .help(spec.help)
                    .action(ArgAction::Set)
                    .value_parser(clap::value_parser!(String)),
            )
        })
    }

    fn augment_args_for_update(cmd: clap::Command) -> clap::Command {
        Self::augment_args(cmd)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::RunToymc(args) => cmd_run_toymc(args.arguments),
        Commands::Submit { config, computation, outputfolder, debug, execute } => {
            cmd_submit(&config, computation, outputfolder, debug, execute)
        }
        Commands::Version => {
            println!("alea {}", alea_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_run_toymc(arguments: Map<String, Value>) -> Result<()> {
    let config = RunnerConfig::from_arguments(&arguments)?;
    let mut runner = Runner::new(config)?;
    runner.set_progress(|done, total| tracing::info!(done, total, "toy Monte Carlo progress"));
    runner.run()?;

    let config = runner.config();
    write_json(serde_json::json!({
        "statistical_model": runner.model().name(),
        "poi": config.poi,
        "n_mc": config.n_mc,
        "seed": runner.seed(),
        "toydata_mode": config.toydata_mode.as_str(),
        "toydata_file": config.toydata_file,
        "output_file": if config.only_toydata { None } else { config.output_file.clone() },
    }))
}

fn cmd_submit(
    config: &Path,
    computation: Option<String>,
    outputfolder: Option<PathBuf>,
    debug: bool,
    execute: bool,
) -> Result<()> {
    let mut submission = SubmissionConfig::read(config)?;
    if let Some(computation) = computation {
        submission.computation = computation;
    }
    if let Some(outputfolder) = outputfolder {
        submission.outputfolder = Some(outputfolder);
    }

    let executable = std::env::current_exe()
        .ok()
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "alea".to_string());
    let submitter = Submitter::new(submission, debug)?.with_executable(executable);
    let tickets = submitter.computation_tickets()?;
    tracing::info!(
        n_tickets = tickets.len(),
        outputfolder = %submitter.outputfolder().display(),
        "expanded computation"
    );

    for (i, ticket) in tickets.iter().enumerate() {
        if execute {
            tracing::info!(
                ticket = i,
                output_file = ?ticket.output_file,
                "running {}",
                ticket.script
            );
            execute_ticket(ticket)?;
        } else {
            println!("{}", ticket.script);
        }
    }
    Ok(())
}

fn write_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
