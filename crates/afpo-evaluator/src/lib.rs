//! Evaluation client: turns genomes into fitness scores using an external evaluator.
//!
//! Fitness comes from a simulation this crate knows nothing about. The contract with that
//! simulation is small:
//!
//! 1. The client writes a brain description keyed by the individual's id ([`brain`])
//! 2. The client launches the evaluator with the evaluation mode and the id ([`process`])
//! 3. The evaluator writes a single number to a staging file and renames it to the result
//!    artifact for that id ([`mailbox`])
//! 4. The client picks the artifact up, parses it and deletes it
//!
//! # Architecture
//!
//! ```text
//! AFPO Controller (afpo-training)
//!     ↓ fans out through
//! batch::evaluate_all (bounded worker pool, full barrier)
//!     ↓ calls
//! FitnessEvaluator (submit + await_result)
//!     ↓ implemented by
//! ProcessEvaluator → Mailbox (shared directory) ← external evaluator process
//! ```
//!
//! # Failure Handling
//!
//! Waiting is bounded by [`PollSettings::timeout`]. An evaluator that times out or exits without
//! producing a result does not stall the run: the batch layer records
//! [`afpo_core::FAILURE_FITNESS`] for that individual and keeps going. A result artifact that is
//! not a number is treated as fatal, since the generation cannot be ranked without it.

use std::{fmt, io, path::PathBuf, process::ExitStatus, str::FromStr, time::Duration};

use afpo_core::{Fitness, Genome, IndividualId};

pub use self::{
    batch::{BatchSettings, EvaluationJob, EvaluationOutcome, evaluate_all},
    brain::BrainLayout,
    mailbox::{Mailbox, MailboxError},
    process::{EvaluatorCommand, PollSettings, ProcessEvaluator},
};

pub mod batch;
pub mod brain;
pub mod mailbox;
pub mod process;

/// How the external evaluator should run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
pub enum EvaluationMode {
    /// No rendering; used for every evaluation during evolution.
    #[default]
    #[display("DIRECT")]
    Headless,
    /// Rendered in a window for inspection.
    #[display("GUI")]
    Interactive,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("unknown evaluation mode {input:?} (expected DIRECT or GUI)")]
pub struct ParseModeError {
    #[error(not(source))]
    input: String,
}

impl FromStr for EvaluationMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "headless" => Ok(Self::Headless),
            "gui" | "interactive" => Ok(Self::Interactive),
            _ => Err(ParseModeError {
                input: s.to_owned(),
            }),
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum EvaluationError {
    #[display("failed to clear stale artifacts in {}", dir.display())]
    ClearStale { dir: PathBuf, source: io::Error },
    #[display("failed to write brain description for individual {id}")]
    WriteBrain { id: IndividualId, source: io::Error },
    #[display("failed to launch evaluator for individual {id}")]
    Spawn { id: IndividualId, source: io::Error },
    #[display("failed to query evaluator process for individual {id}")]
    Wait { id: IndividualId, source: io::Error },
    #[display("individual {id} was never submitted")]
    NotSubmitted {
        #[error(not(source))]
        id: IndividualId,
    },
    #[display("evaluator for individual {id} produced no result within {timeout:?}")]
    TimedOut { id: IndividualId, timeout: Duration },
    #[display("evaluator for individual {id} exited ({status}) without producing a result")]
    Exited { id: IndividualId, status: ExitStatus },
    #[display("evaluation of individual {id} failed: {message}")]
    Rejected { id: IndividualId, message: String },
    #[display("{_0}")]
    #[from]
    Mailbox(MailboxError),
}

impl EvaluationError {
    /// Returns `true` if the run can continue by assigning the failure fitness.
    ///
    /// Launch and I/O problems point at a misconfigured run and are not recoverable; neither is
    /// a malformed result, because the evaluator did report and the value cannot be trusted.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TimedOut { .. } | Self::Exited { .. } | Self::Rejected { .. }
        )
    }
}

/// Produces fitness scores for genomes.
///
/// `submit` must not wait for the evaluation to finish; `await_result` blocks until the result
/// for one id is available. Implementations must allow concurrent calls for different ids.
pub trait FitnessEvaluator: fmt::Debug + Send + Sync {
    /// Clears leftovers of previous runs. Called once before the first generation.
    fn prepare(&self) -> Result<(), EvaluationError> {
        Ok(())
    }

    /// Starts evaluating `genome` under `id`.
    fn submit(
        &self,
        id: IndividualId,
        genome: &Genome,
        mode: EvaluationMode,
    ) -> Result<(), EvaluationError>;

    /// Blocks until the fitness for `id` is available and consumes it.
    fn await_result(&self, id: IndividualId) -> Result<Fitness, EvaluationError>;

    /// Submits and waits for a single genome.
    fn evaluate(
        &self,
        id: IndividualId,
        genome: &Genome,
        mode: EvaluationMode,
    ) -> Result<Fitness, EvaluationError> {
        self.submit(id, genome, mode)?;
        self.await_result(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_command_line_names() {
        assert_eq!(EvaluationMode::Headless.to_string(), "DIRECT");
        assert_eq!(EvaluationMode::Interactive.to_string(), "GUI");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("DIRECT".parse::<EvaluationMode>().unwrap(), EvaluationMode::Headless);
        assert_eq!("gui".parse::<EvaluationMode>().unwrap(), EvaluationMode::Interactive);
        assert_eq!(
            "interactive".parse::<EvaluationMode>().unwrap(),
            EvaluationMode::Interactive
        );
        let err = "fast".parse::<EvaluationMode>().unwrap_err();
        assert!(err.to_string().contains("\"fast\""));
    }

    #[test]
    fn test_recoverable_errors() {
        let id = IndividualId::new(3);
        assert!(
            EvaluationError::TimedOut {
                id,
                timeout: Duration::from_secs(1)
            }
            .is_recoverable()
        );
        assert!(
            EvaluationError::Rejected {
                id,
                message: "crashed".to_owned()
            }
            .is_recoverable()
        );
        assert!(!EvaluationError::NotSubmitted { id }.is_recoverable());
        assert!(
            !EvaluationError::Spawn {
                id,
                source: io::Error::other("missing")
            }
            .is_recoverable()
        );
    }
}
