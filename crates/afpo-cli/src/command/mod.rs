use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use crate::{config::RunConfig, util};

use self::{
    clean::CleanArg, evolve::EvolveArg, replay::ReplayArg, synthetic_eval::SyntheticEvalArg,
};

mod clean;
mod evolve;
mod replay;
mod synthetic_eval;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Increase log verbosity (-v: debug, -vv: trace); `RUST_LOG` takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Evolve controllers with Age-Fitness Pareto Optimization
    Evolve(#[clap(flatten)] EvolveArg),
    /// Evaluate a saved best model again in interactive mode
    Replay(#[clap(flatten)] ReplayArg),
    /// Remove leftover brain and fitness files from the working directory
    Clean(#[clap(flatten)] CleanArg),
    /// Score a brain file with a cheap deterministic objective (stand-in evaluator)
    SyntheticEval(#[clap(flatten)] SyntheticEvalArg),
}

/// Options shared by every subcommand that reads a run configuration.
#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct RunConfigArg {
    /// JSON run configuration; unspecified fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory shared with the evaluator processes
    #[arg(long)]
    workdir: Option<PathBuf>,
    /// Evaluator command; the mode and the individual id are appended to it
    #[arg(last = true)]
    evaluator_command: Vec<String>,
}

impl RunConfigArg {
    /// Loads the configuration file, if any, and applies the overrides given on the command line.
    ///
    /// The result is not validated yet so that callers can apply their own overrides first.
    pub(crate) fn load(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => util::read_json_file("run configuration", path)?,
            None => RunConfig::default(),
        };
        if let Some(workdir) = &self.workdir {
            config.workdir.clone_from(workdir);
        }
        if !self.evaluator_command.is_empty() {
            config.evaluator_command.clone_from(&self.evaluator_command);
        }
        Ok(config)
    }
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    init_tracing(args.verbose);
    match args.mode {
        Mode::Evolve(arg) => evolve::run(&arg)?,
        Mode::Replay(arg) => replay::run(&arg)?,
        Mode::Clean(arg) => clean::run(&arg)?,
        Mode::SyntheticEval(arg) => synthetic_eval::run(&arg)?,
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn test_cli_definition() {
        CommandArgs::command().debug_assert();
    }

    #[test]
    fn test_evaluator_command_after_separator() {
        let args = CommandArgs::try_parse_from([
            "afpo",
            "evolve",
            "--generations",
            "3",
            "--",
            "python3",
            "simulate.py",
            "--fast",
        ])
        .unwrap();
        let Mode::Evolve(arg) = args.mode else {
            panic!("expected evolve");
        };
        let config = arg.load_config().unwrap();
        assert_eq!(config.generations, 3);
        assert_eq!(
            config.evaluator_command,
            ["python3", "simulate.py", "--fast"]
        );
    }

    #[test]
    fn test_verbose_is_global() {
        let args = CommandArgs::try_parse_from(["afpo", "clean", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }
}
