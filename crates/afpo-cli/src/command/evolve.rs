use std::path::PathBuf;

use afpo_evaluator::ProcessEvaluator;
use afpo_training::{controller::AfpoController, report::GenerationReport};
use anyhow::Context as _;
use chrono::Utc;
use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;
use tracing::info;

use crate::{command::RunConfigArg, config::RunConfig, model::BestModel, util};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct EvolveArg {
    #[clap(flatten)]
    run_config: RunConfigArg,
    /// Number of individuals kept between generations
    #[arg(long)]
    population_size: Option<usize>,
    /// Number of generations to run
    #[arg(long)]
    generations: Option<usize>,
    /// Fresh random individuals injected per generation
    #[arg(long)]
    inject: Option<usize>,
    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
    /// Output file path for the best model (stdout if omitted)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Evaluate the best individual again in interactive mode when the run finishes
    #[arg(long)]
    show_best: bool,
}

impl EvolveArg {
    pub(crate) fn load_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = self.run_config.load()?;
        if let Some(n) = self.population_size {
            config.population_size = n;
        }
        if let Some(n) = self.generations {
            config.generations = n;
        }
        if let Some(n) = self.inject {
            config.injected_per_generation = n;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate().context("Invalid run configuration")?;
        Ok(config)
    }
}

pub(crate) fn run(arg: &EvolveArg) -> anyhow::Result<()> {
    let config = arg.load_config()?;
    let evaluator = ProcessEvaluator::new(
        config.mailbox(),
        config.evaluator_command()?,
        config.brain_layout(),
        config.poll_settings(),
    );
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    info!(
        seed,
        workdir = %config.workdir.display(),
        command = ?config.evaluator_command,
        "starting evolution"
    );

    let mut controller =
        AfpoController::new(config.afpo_params(), &evaluator, Pcg32::seed_from_u64(seed))?;
    controller.run(print_report)?;

    let best = controller
        .select_best()
        .context("No individual was evaluated")?;
    let model = BestModel::new(best, controller.generation(), Utc::now());
    util::save_json(&model, arg.output.as_deref())?;

    eprintln!();
    eprintln!("Evolution completed (seed {seed})");
    if let Some(path) = &arg.output {
        eprintln!("  Path: {}", path.display());
    }
    eprintln!("  Best individual: #{}", model.id);
    eprintln!("  Age: {}", model.age);
    match model.fitness {
        Some(fitness) => eprintln!("  Fitness: {fitness:.3}"),
        None => eprintln!("  Fitness: evaluation failed"),
    }
    eprintln!("  Ids issued: {}", controller.ids_issued());

    if arg.show_best
        && let Some((id, fitness)) = controller.replay_best()?
    {
        eprintln!("Replayed #{id} => {fitness:.3}");
    }
    Ok(())
}

fn print_report(report: &GenerationReport) {
    eprintln!("Generation #{}:", report.generation);
    eprintln!(
        "  Evaluated: {} ({} failed), {} -> {} individuals",
        report.evaluated, report.failed, report.expanded_size, report.population_size,
    );
    let contraction = &report.contraction;
    eprintln!(
        "  Culled:    {} dominated, {} truncated, {} samples{}",
        contraction.dominated,
        contraction.truncated,
        contraction.samples,
        if contraction.fallback { " (fallback)" } else { "" },
    );
    if let Some(fitness) = &report.fitness {
        eprintln!("  Fitness Stats:");
        eprintln!("    Min:    {:.3}", fitness.min);
        eprintln!("    Median: {:.3}", fitness.median);
        eprintln!("    Mean:   {:.3}", fitness.mean);
        eprintln!("    Max:    {:.3}", fitness.max);
    }
    if let Some(age) = &report.age {
        eprintln!("  Age Stats:");
        eprintln!("    Min:  {:.0}", age.min);
        eprintln!("    Mean: {:.2}", age.mean);
        eprintln!("    Max:  {:.0}", age.max);
    }
    if let Some(champion) = &report.champion {
        eprintln!(
            "  Best: #{} (age {}) => {:.3}",
            champion.id, champion.age, champion.fitness
        );
    }
}
