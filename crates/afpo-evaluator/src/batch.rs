//! Fan-out/fan-in evaluation of a whole generation.
//!
//! [`evaluate_all`] runs every job on a bounded pool of scoped worker threads and returns only
//! after every job has produced an outcome, so callers get an absolute barrier: no result is
//! handed back while any evaluation of the batch is still running.
//!
//! With the default settings there is one worker per job, which submits every evaluation before
//! waiting on any of them. Limiting [`BatchSettings::max_parallel`] caps the number of
//! concurrently running evaluators instead.
//!
//! Recoverable failures (see [`EvaluationError::is_recoverable`]) become
//! [`EvaluationOutcome::Failed`]. The first fatal error stops workers from starting new jobs;
//! evaluations already in flight are still awaited before the error is returned.

use std::{
    num::NonZeroUsize,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
};

use afpo_core::{FAILURE_FITNESS, Fitness, Genome, IndividualId};
use tracing::{debug, warn};

use crate::{EvaluationError, EvaluationMode, FitnessEvaluator};

/// One genome to evaluate.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationJob<'a> {
    pub id: IndividualId,
    pub genome: &'a Genome,
}

/// Result of one job in a batch.
#[derive(Debug, Clone, PartialEq, derive_more::IsVariant)]
pub enum EvaluationOutcome {
    Measured(Fitness),
    /// The evaluator failed in a way the run survives; carries the reason for reporting.
    Failed(String),
}

impl EvaluationOutcome {
    /// Fitness to record: the measured value, or [`FAILURE_FITNESS`].
    #[must_use]
    pub fn fitness(&self) -> Fitness {
        match self {
            Self::Measured(fitness) => *fitness,
            Self::Failed(_) => FAILURE_FITNESS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSettings {
    pub mode: EvaluationMode,
    /// Maximum number of concurrent evaluations; `None` runs every job at once.
    pub max_parallel: Option<NonZeroUsize>,
}

/// Evaluates every job and returns the outcomes sorted by id.
pub fn evaluate_all<E>(
    evaluator: &E,
    jobs: Vec<EvaluationJob<'_>>,
    settings: &BatchSettings,
) -> Result<Vec<(IndividualId, EvaluationOutcome)>, EvaluationError>
where
    E: FitnessEvaluator + ?Sized,
{
    if jobs.is_empty() {
        return Ok(vec![]);
    }
    let workers = settings
        .max_parallel
        .map_or(jobs.len(), |n| n.get().min(jobs.len()));
    debug!(jobs = jobs.len(), workers, "evaluating batch");

    let mode = settings.mode;
    let queue = Mutex::new(jobs.into_iter());
    let cancelled = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel();

    let mut outcomes = vec![];
    let mut fatal = None;
    thread::scope(|s| {
        let queue = &queue;
        let cancelled = &cancelled;
        for _ in 0..workers {
            let tx = tx.clone();
            s.spawn(move || {
                while !cancelled.load(Ordering::Acquire) {
                    let job = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
                    let Some(job) = job else {
                        break;
                    };
                    let result = evaluate_one(evaluator, job, mode);
                    if result.is_err() {
                        cancelled.store(true, Ordering::Release);
                    }
                    if tx.send((job.id, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        for (id, result) in rx {
            match result {
                Ok(outcome) => outcomes.push((id, outcome)),
                Err(e) => {
                    warn!(%id, error = %e, "fatal evaluation error; draining in-flight jobs");
                    fatal.get_or_insert(e);
                }
            }
        }
    });

    if let Some(e) = fatal {
        return Err(e);
    }
    outcomes.sort_by_key(|(id, _)| *id);
    Ok(outcomes)
}

fn evaluate_one<E>(
    evaluator: &E,
    job: EvaluationJob<'_>,
    mode: EvaluationMode,
) -> Result<EvaluationOutcome, EvaluationError>
where
    E: FitnessEvaluator + ?Sized,
{
    match evaluator.evaluate(job.id, job.genome, mode) {
        Ok(fitness) => Ok(EvaluationOutcome::Measured(fitness)),
        Err(e) if e.is_recoverable() => {
            warn!(id = %job.id, error = %e, "evaluation failed; assigning failure fitness");
            Ok(EvaluationOutcome::Failed(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::AtomicUsize,
        time::{Duration, Instant},
    };

    use afpo_core::GenomeShape;

    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Sum,
        Reject,
        Fatal,
    }

    /// Scores genomes by their weight sum, tracking how many evaluations overlap.
    #[derive(Debug)]
    struct StubEvaluator {
        behavior: HashMap<IndividualId, Behavior>,
        delay: Duration,
        pending: Mutex<HashMap<IndividualId, Fitness>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        submitted: AtomicUsize,
    }

    impl StubEvaluator {
        fn new(delay: Duration) -> Self {
            Self {
                behavior: HashMap::new(),
                delay,
                pending: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                submitted: AtomicUsize::new(0),
            }
        }

        fn with(mut self, id: u64, behavior: Behavior) -> Self {
            self.behavior.insert(IndividualId::new(id), behavior);
            self
        }
    }

    impl FitnessEvaluator for StubEvaluator {
        fn submit(
            &self,
            id: IndividualId,
            genome: &Genome,
            _mode: EvaluationMode,
        ) -> Result<(), EvaluationError> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let fitness = genome.as_slice().iter().sum();
            self.pending.lock().unwrap().insert(id, fitness);
            Ok(())
        }

        fn await_result(&self, id: IndividualId) -> Result<Fitness, EvaluationError> {
            thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let fitness = self.pending.lock().unwrap().remove(&id);
            match self.behavior.get(&id).copied().unwrap_or(Behavior::Sum) {
                Behavior::Sum => fitness.ok_or(EvaluationError::NotSubmitted { id }),
                Behavior::Reject => Err(EvaluationError::Rejected {
                    id,
                    message: "simulator crashed".to_owned(),
                }),
                Behavior::Fatal => Err(EvaluationError::NotSubmitted { id }),
            }
        }
    }

    fn genomes(count: usize) -> Vec<Genome> {
        (0..count)
            .map(|i| {
                #[expect(clippy::cast_precision_loss)]
                let value = i as f64 / 100.0;
                Genome::from_fn(GenomeShape::new(2, 2), |_, _| value)
            })
            .collect()
    }

    fn jobs(genomes: &[Genome]) -> Vec<EvaluationJob<'_>> {
        genomes
            .iter()
            .enumerate()
            .map(|(i, genome)| EvaluationJob {
                id: IndividualId::new(i as u64),
                genome,
            })
            .collect()
    }

    #[test]
    fn test_every_job_gets_an_outcome() {
        let genomes = genomes(10);
        let evaluator = StubEvaluator::new(Duration::from_millis(1));

        let outcomes = evaluate_all(&evaluator, jobs(&genomes), &BatchSettings::default()).unwrap();

        assert_eq!(outcomes.len(), 10);
        for (i, (id, outcome)) in outcomes.iter().enumerate() {
            assert_eq!(id.get(), i as u64);
            let expected = genomes[i].as_slice().iter().sum::<f64>();
            assert_eq!(outcome, &EvaluationOutcome::Measured(expected));
        }
    }

    #[test]
    fn test_unbounded_batch_runs_everything_concurrently() {
        let genomes = genomes(8);
        let evaluator = StubEvaluator::new(Duration::from_millis(100));

        let started = Instant::now();
        evaluate_all(&evaluator, jobs(&genomes), &BatchSettings::default()).unwrap();

        assert_eq!(evaluator.peak.load(Ordering::SeqCst), 8);
        assert!(started.elapsed() < Duration::from_millis(800));
    }

    #[test]
    fn test_max_parallel_bounds_concurrency() {
        let genomes = genomes(9);
        let evaluator = StubEvaluator::new(Duration::from_millis(20));
        let settings = BatchSettings {
            max_parallel: NonZeroUsize::new(3),
            ..BatchSettings::default()
        };

        let outcomes = evaluate_all(&evaluator, jobs(&genomes), &settings).unwrap();

        assert_eq!(outcomes.len(), 9);
        assert!(evaluator.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_recoverable_failure_gets_failure_fitness() {
        let genomes = genomes(4);
        let evaluator = StubEvaluator::new(Duration::ZERO).with(2, Behavior::Reject);

        let outcomes = evaluate_all(&evaluator, jobs(&genomes), &BatchSettings::default()).unwrap();

        let (_, failed) = &outcomes[2];
        assert!(failed.is_failed());
        assert_eq!(failed.fitness(), FAILURE_FITNESS);
        assert!(outcomes.iter().filter(|(_, o)| o.is_measured()).count() == 3);
    }

    #[test]
    fn test_fatal_error_stops_dispatch() {
        let genomes = genomes(20);
        let evaluator = StubEvaluator::new(Duration::from_millis(5)).with(0, Behavior::Fatal);
        let settings = BatchSettings {
            max_parallel: NonZeroUsize::new(1),
            ..BatchSettings::default()
        };

        let err = evaluate_all(&evaluator, jobs(&genomes), &settings).unwrap_err();

        assert!(matches!(err, EvaluationError::NotSubmitted { .. }));
        assert_eq!(evaluator.submitted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_batch() {
        let evaluator = StubEvaluator::new(Duration::ZERO);
        let outcomes = evaluate_all(&evaluator, vec![], &BatchSettings::default()).unwrap();
        assert!(outcomes.is_empty());
    }
}
