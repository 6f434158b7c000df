//! A stand-in for the physics simulator, for running the whole pipeline without one.
//!
//! Invoked the same way as the real evaluator (`... synthetic-eval MODE ID`) from inside the
//! mailbox directory. It reads `brain{ID}.nndf`, scores the synapse weights and posts
//! `fitness{ID}.txt`.

use std::{fs::File, io::BufReader, path::PathBuf};

use afpo_core::{Fitness, Genome, GenomeShape, IndividualId};
use afpo_evaluator::{EvaluationMode, Mailbox, brain};
use anyhow::{Context as _, ensure};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SyntheticEvalArg {
    /// DIRECT or GUI
    mode: EvaluationMode,
    /// Individual id
    id: u64,
    /// Number of sensor neurons in the brain description
    #[arg(long, default_value_t = 8)]
    sensors: usize,
    /// Number of motor neurons in the brain description
    #[arg(long, default_value_t = 4)]
    motors: usize,
    /// Mailbox directory
    #[arg(long, default_value = ".")]
    workdir: PathBuf,
}

pub(crate) fn run(arg: &SyntheticEvalArg) -> anyhow::Result<()> {
    ensure!(
        arg.sensors > 0 && arg.motors > 0,
        "Neuron counts must be positive"
    );
    let id = IndividualId::new(arg.id);
    let mailbox = Mailbox::new(&arg.workdir);
    let path = mailbox.brain_path(id);
    let file = File::open(&path)
        .with_context(|| format!("Failed to open brain file: {}", path.display()))?;
    let genome = brain::read_genome(
        BufReader::new(file),
        GenomeShape::new(arg.sensors, arg.motors),
    )
    .with_context(|| format!("Failed to parse brain file: {}", path.display()))?;

    let fitness = score(&genome);
    if arg.mode == EvaluationMode::Interactive {
        for row in genome.rows() {
            eprintln!("  {row:+.3?}");
        }
        eprintln!("#{id} => {fitness:.3}");
    }
    mailbox.post_result(id, fitness)?;
    Ok(())
}

/// Lower when every synapse is strongly excitatory; the optimum is `-(sensors * motors)`.
fn score(genome: &Genome) -> Fitness {
    -genome.as_slice().iter().sum::<f64>()
}

#[cfg(test)]
mod tests {
    use afpo_evaluator::BrainLayout;

    use super::*;

    #[test]
    fn test_score() {
        let genome = Genome::from_fn(GenomeShape::new(2, 2), |row, col| {
            if row == col { 1.0 } else { -0.25 }
        });
        assert_eq!(score(&genome), -1.5);
    }

    #[test]
    fn test_posts_result_for_brain_file() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = Mailbox::new(dir.path());
        let id = IndividualId::new(5);
        let genome = Genome::from_fn(GenomeShape::new(3, 2), |_, _| 0.5);
        brain::write_brain_file(mailbox.brain_path(id), &genome, &BrainLayout::default()).unwrap();

        let arg = SyntheticEvalArg {
            mode: EvaluationMode::Headless,
            id: 5,
            sensors: 3,
            motors: 2,
            workdir: dir.path().to_owned(),
        };
        run(&arg).unwrap();

        assert_eq!(mailbox.take_result(id).unwrap(), Some(-3.0));
    }

    #[test]
    fn test_missing_brain_file() {
        let dir = tempfile::tempdir().unwrap();
        let arg = SyntheticEvalArg {
            mode: EvaluationMode::Headless,
            id: 1,
            sensors: 8,
            motors: 4,
            workdir: dir.path().to_owned(),
        };
        assert!(run(&arg).is_err());
        assert!(!dir.path().join("fitness1.txt").exists());
    }
}
