use std::path::PathBuf;

use afpo_evaluator::{EvaluationMode, FitnessEvaluator as _, ProcessEvaluator};
use anyhow::{Context as _, ensure};
use tracing::warn;

use crate::{command::RunConfigArg, model::BestModel, util};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct ReplayArg {
    #[clap(flatten)]
    run_config: RunConfigArg,
    /// Best model saved by `afpo evolve`
    #[arg(long)]
    model: PathBuf,
}

pub(crate) fn run(arg: &ReplayArg) -> anyhow::Result<()> {
    let model: BestModel = util::read_json_file("best model", &arg.model)?;
    let config = arg.run_config.load()?;
    config.validate().context("Invalid run configuration")?;

    let layout = config.brain_layout();
    let shape = model.genome.shape();
    ensure!(
        layout.fits(shape),
        "Model genome is {shape} but the configured brain layout names {} sensors and {} motors",
        layout.sensor_links().len(),
        layout.motor_joints().len(),
    );

    let evaluator = ProcessEvaluator::new(
        config.mailbox(),
        config.evaluator_command()?,
        layout,
        config.poll_settings(),
    );
    if evaluator.mailbox().take_result(model.id)?.is_some() {
        warn!(id = %model.id, "discarded a stale result");
    }

    eprintln!("Replaying individual #{} ({})", model.id, model.trained_at);
    let fitness = evaluator
        .evaluate(model.id, &model.genome, EvaluationMode::Interactive)
        .with_context(|| format!("Failed to replay individual #{}", model.id))?;

    eprintln!("  Fitness: {fitness:.3}");
    if let Some(saved) = model.fitness {
        eprintln!("  Saved fitness: {saved:.3}");
    }
    Ok(())
}
