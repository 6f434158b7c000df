//! Generational loop of Age-Fitness Pareto Optimization.
//!
//! Each generation moves through four phases:
//!
//! ```text
//! Expanding ──→ Evaluating ──→ Contracting ──→ Aging ──→ Expanding (next generation)
//!                                                  └──→ Done (after the last generation)
//! ```
//!
//! - **Expanding** - every survivor contributes one mutated offspring and fresh random
//!   individuals are injected
//! - **Evaluating** - every individual without a fitness is evaluated; the phase ends only when
//!   all of them have a result (a full barrier)
//! - **Contracting** - dominated individuals are culled until the population is back at its
//!   target size
//! - **Aging** - every survivor's age grows by one
//!
//! The controller owns the id allocator, the population and the random number generator, and
//! borrows the evaluator.

use std::num::NonZeroUsize;

use afpo_core::{Fitness, GenomeShape, IdAllocator, Individual, IndividualId};
use afpo_evaluator::{
    BatchSettings, EvaluationError, EvaluationMode, FitnessEvaluator, evaluate_all,
};
use rand::Rng;
use tracing::{debug, info};

use crate::{
    population::{Population, PopulationError},
    report::{GenerationProgress, GenerationReport},
};

/// Parameters of an AFPO run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AfpoParams {
    /// Number of individuals kept between generations.
    pub population_size: usize,
    /// Number of generations to run.
    pub generations: usize,
    /// Fresh random individuals added in each expansion.
    pub injected_per_generation: usize,
    pub genome_shape: GenomeShape,
    /// Consecutive non-removing samples tolerated before contraction falls back to a
    /// deterministic scan.
    pub max_contraction_attempts: usize,
    /// Maximum number of concurrent evaluations; `None` evaluates the whole population at once.
    pub max_parallel_evaluations: Option<NonZeroUsize>,
}

impl AfpoParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.population_size == 0 {
            return Err(ParamsError::ZeroPopulationSize);
        }
        if self.max_contraction_attempts == 0 {
            return Err(ParamsError::ZeroContractionAttempts);
        }
        Ok(())
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ParamsError {
    #[display("population size must be positive")]
    ZeroPopulationSize,
    #[display("contraction must be allowed at least one sampling attempt")]
    ZeroContractionAttempts,
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ControllerError {
    #[display("{_0}")]
    #[from]
    Evaluation(EvaluationError),
    #[display("{_0}")]
    #[from]
    Population(PopulationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum Phase {
    Expanding,
    Evaluating,
    Contracting,
    Aging,
    Done,
}

/// Drives a population through AFPO generations.
///
/// # Example
///
/// ```rust,ignore
/// use afpo_training::controller::{AfpoController, AfpoParams};
///
/// let mut controller = AfpoController::new(params, &evaluator, rand::rng())?;
/// controller.run(|report| eprintln!("{report:?}"))?;
/// let best = controller.select_best();
/// ```
#[derive(Debug)]
pub struct AfpoController<'e, E, R>
where
    E: ?Sized,
{
    params: AfpoParams,
    evaluator: &'e E,
    rng: R,
    ids: IdAllocator,
    population: Population,
    phase: Phase,
    generation: usize,
    prepared: bool,
    progress: GenerationProgress,
}

impl<'e, E, R> AfpoController<'e, E, R>
where
    E: FitnessEvaluator + ?Sized,
    R: Rng,
{
    /// Creates a controller with a population of fresh random individuals.
    pub fn new(params: AfpoParams, evaluator: &'e E, mut rng: R) -> Result<Self, ParamsError> {
        params.validate()?;
        let mut ids = IdAllocator::new();
        let population =
            Population::random(params.population_size, params.genome_shape, &mut ids, &mut rng);
        let phase = if params.generations == 0 {
            Phase::Done
        } else {
            Phase::Expanding
        };
        Ok(Self {
            params,
            evaluator,
            rng,
            ids,
            population,
            phase,
            generation: 0,
            prepared: false,
            progress: GenerationProgress::default(),
        })
    }

    #[must_use]
    pub fn params(&self) -> &AfpoParams {
        &self.params
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of completed generations.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Number of individual ids issued so far.
    #[must_use]
    pub fn ids_issued(&self) -> u64 {
        self.ids.issued()
    }

    /// Runs the current phase and moves to the next one.
    ///
    /// Returns the report when this step completed a generation.
    pub fn step(&mut self) -> Result<Option<GenerationReport>, ControllerError> {
        match self.phase {
            Phase::Expanding => {
                self.expand()?;
                self.phase = Phase::Evaluating;
            }
            Phase::Evaluating => {
                self.evaluate()?;
                self.phase = Phase::Contracting;
            }
            Phase::Contracting => {
                self.progress.contraction = self.population.contract(
                    self.params.population_size,
                    self.params.max_contraction_attempts,
                    &mut self.rng,
                )?;
                self.phase = Phase::Aging;
            }
            Phase::Aging => {
                self.population.increment_all_ages();
                let report = GenerationReport::new(self.generation, &self.progress, &self.population);
                self.log_report(&report);
                self.generation += 1;
                self.progress = GenerationProgress::default();
                self.phase = if self.generation >= self.params.generations {
                    Phase::Done
                } else {
                    Phase::Expanding
                };
                return Ok(Some(report));
            }
            Phase::Done => {}
        }
        Ok(None)
    }

    /// Runs phases until the current generation completes.
    ///
    /// Returns `None` if every generation has already run.
    pub fn run_generation(&mut self) -> Result<Option<GenerationReport>, ControllerError> {
        while !self.phase.is_done() {
            if let Some(report) = self.step()? {
                return Ok(Some(report));
            }
        }
        Ok(None)
    }

    /// Runs every remaining generation, handing each report to `on_generation`.
    pub fn run<F>(&mut self, mut on_generation: F) -> Result<(), ControllerError>
    where
        F: FnMut(&GenerationReport),
    {
        while let Some(report) = self.run_generation()? {
            on_generation(&report);
        }
        Ok(())
    }

    /// Returns the individual with the lowest fitness in the current population.
    #[must_use]
    pub fn select_best(&self) -> Option<&Individual> {
        self.population.best()
    }

    /// Evaluates the best individual again in interactive mode for inspection.
    ///
    /// Returns the id and the fitness of the replay, or `None` if nothing has been evaluated.
    pub fn replay_best(&self) -> Result<Option<(IndividualId, Fitness)>, EvaluationError> {
        let Some(best) = self.select_best() else {
            return Ok(None);
        };
        info!(id = %best.id(), fitness = ?best.fitness(), "replaying best individual");
        let fitness =
            self.evaluator
                .evaluate(best.id(), best.genome(), EvaluationMode::Interactive)?;
        Ok(Some((best.id(), fitness)))
    }

    fn expand(&mut self) -> Result<(), ControllerError> {
        if !self.prepared {
            self.evaluator.prepare()?;
            self.prepared = true;
        }
        self.population.expand(
            self.params.population_size,
            self.params.injected_per_generation,
            self.params.genome_shape,
            &mut self.ids,
            &mut self.rng,
        )?;
        self.progress.expanded_size = self.population.len();
        Ok(())
    }

    fn evaluate(&mut self) -> Result<(), ControllerError> {
        let jobs = self.population.pending_jobs();
        debug!(
            generation = self.generation,
            jobs = jobs.len(),
            "evaluating population"
        );
        let settings = BatchSettings {
            mode: EvaluationMode::Headless,
            max_parallel: self.params.max_parallel_evaluations,
        };
        let outcomes = evaluate_all(self.evaluator, jobs, &settings)?;
        for (id, outcome) in outcomes {
            self.progress.evaluated += 1;
            if outcome.is_failed() {
                self.progress.failed += 1;
            }
            self.population.record_fitness(id, outcome.fitness())?;
        }
        Ok(())
    }

    fn log_report(&self, report: &GenerationReport) {
        let (best, mean) = report
            .fitness
            .map_or((Fitness::NAN, Fitness::NAN), |s| (s.min, s.mean));
        info!(
            generation = report.generation,
            size = report.population_size,
            evaluated = report.evaluated,
            failed = report.failed,
            culled = report.contraction.removed(),
            fallback = report.contraction.fallback,
            best,
            mean,
            "generation complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
    };

    use afpo_core::Genome;
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    /// Scores genomes by their weight sum, so lower weights are fitter.
    #[derive(Debug, Default)]
    struct SumEvaluator {
        pending: Mutex<HashMap<IndividualId, Fitness>>,
        submissions: Mutex<Vec<(IndividualId, EvaluationMode)>>,
        prepared: Mutex<usize>,
        fail: HashSet<IndividualId>,
    }

    impl FitnessEvaluator for SumEvaluator {
        fn prepare(&self) -> Result<(), EvaluationError> {
            *self.prepared.lock().unwrap() += 1;
            Ok(())
        }

        fn submit(
            &self,
            id: IndividualId,
            genome: &Genome,
            mode: EvaluationMode,
        ) -> Result<(), EvaluationError> {
            self.submissions.lock().unwrap().push((id, mode));
            self.pending
                .lock()
                .unwrap()
                .insert(id, genome.as_slice().iter().sum());
            Ok(())
        }

        fn await_result(&self, id: IndividualId) -> Result<Fitness, EvaluationError> {
            let fitness = self.pending.lock().unwrap().remove(&id);
            if self.fail.contains(&id) {
                return Err(EvaluationError::Rejected {
                    id,
                    message: "no result".to_owned(),
                });
            }
            fitness.ok_or(EvaluationError::NotSubmitted { id })
        }
    }

    fn params(generations: usize) -> AfpoParams {
        AfpoParams {
            population_size: 6,
            generations,
            injected_per_generation: 2,
            genome_shape: GenomeShape::new(4, 2),
            max_contraction_attempts: 1000,
            max_parallel_evaluations: None,
        }
    }

    #[test]
    fn test_phase_sequence() {
        let evaluator = SumEvaluator::default();
        let mut controller =
            AfpoController::new(params(2), &evaluator, Pcg32::seed_from_u64(1)).unwrap();

        let mut phases = vec![controller.phase()];
        while !controller.phase().is_done() {
            controller.step().unwrap();
            phases.push(controller.phase());
        }

        use Phase::*;
        assert_eq!(
            phases,
            [
                Expanding, Evaluating, Contracting, Aging, Expanding, Evaluating, Contracting,
                Aging, Done
            ]
        );
        assert_eq!(*evaluator.prepared.lock().unwrap(), 1);
        assert_eq!(controller.generation(), 2);
    }

    #[test]
    fn test_population_size_per_phase() {
        let evaluator = SumEvaluator::default();
        let mut controller =
            AfpoController::new(params(10), &evaluator, Pcg32::seed_from_u64(2)).unwrap();

        while !controller.phase().is_done() {
            let before = controller.phase();
            controller.step().unwrap();
            match before {
                Phase::Expanding => assert_eq!(controller.population().len(), 6 * 2 + 2),
                Phase::Contracting | Phase::Aging => {
                    assert_eq!(controller.population().len(), 6);
                }
                Phase::Evaluating | Phase::Done => {}
            }
        }
    }

    #[test]
    fn test_evaluation_barrier_before_contraction() {
        let evaluator = SumEvaluator::default();
        let mut controller =
            AfpoController::new(params(3), &evaluator, Pcg32::seed_from_u64(3)).unwrap();

        while !controller.phase().is_done() {
            if controller.phase() == Phase::Contracting {
                assert!(controller.population().iter().all(Individual::is_evaluated));
            }
            controller.step().unwrap();
        }
    }

    #[test]
    fn test_only_unevaluated_individuals_are_submitted() {
        let evaluator = SumEvaluator::default();
        let mut controller =
            AfpoController::new(params(3), &evaluator, Pcg32::seed_from_u64(4)).unwrap();

        let mut reports = vec![];
        controller.run(|r| reports.push(r.clone())).unwrap();

        // generation 0 evaluates the initial population too
        assert_eq!(reports[0].evaluated, 6 + 6 + 2);
        assert_eq!(reports[1].evaluated, 6 + 2);
        let submissions = evaluator.submissions.lock().unwrap();
        let unique = submissions.iter().map(|(id, _)| *id).collect::<HashSet<_>>();
        assert_eq!(unique.len(), submissions.len());
        assert!(
            submissions
                .iter()
                .all(|(_, mode)| *mode == EvaluationMode::Headless)
        );
    }

    #[test]
    fn test_ages_and_ids() {
        let evaluator = SumEvaluator::default();
        let mut controller =
            AfpoController::new(params(5), &evaluator, Pcg32::seed_from_u64(5)).unwrap();

        let mut previous: HashMap<IndividualId, u32> = HashMap::new();
        while let Some(report) = controller.run_generation().unwrap() {
            for ind in controller.population().iter() {
                // survivors age by exactly one per generation, newcomers start at one
                let expected = previous.get(&ind.id()).map_or(1, |age| age + 1);
                assert_eq!(ind.age(), expected, "generation {}", report.generation);
            }
            previous = controller
                .population()
                .iter()
                .map(|ind| (ind.id(), ind.age()))
                .collect();
        }
        assert_eq!(controller.ids_issued(), 6 + 5 * (6 + 2));
    }

    #[test]
    fn test_best_fitness_never_regresses() {
        let evaluator = SumEvaluator::default();
        let mut controller =
            AfpoController::new(params(30), &evaluator, Pcg32::seed_from_u64(6)).unwrap();

        let mut bests = vec![];
        controller
            .run(|r| bests.push(r.champion.unwrap().fitness))
            .unwrap();

        assert_eq!(bests.len(), 30);
        assert!(bests.windows(2).all(|w| w[1] <= w[0]), "{bests:?}");
        assert!(bests.last() < bests.first());
    }

    #[test]
    fn test_failed_evaluations_get_failure_fitness() {
        let mut evaluator = SumEvaluator::default();
        evaluator.fail.insert(IndividualId::new(0));
        let mut controller =
            AfpoController::new(params(1), &evaluator, Pcg32::seed_from_u64(7)).unwrap();

        let report = controller.run_generation().unwrap().unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(controller.population().len(), 6);
    }

    #[test]
    fn test_replay_best_uses_interactive_mode() {
        let evaluator = SumEvaluator::default();
        let mut controller =
            AfpoController::new(params(2), &evaluator, Pcg32::seed_from_u64(8)).unwrap();
        assert!(controller.replay_best().unwrap().is_none());

        controller.run(|_| {}).unwrap();
        let best = controller.select_best().unwrap();
        let (id, fitness) = controller.replay_best().unwrap().unwrap();

        assert_eq!(id, best.id());
        assert_eq!(Some(fitness), best.fitness());
        let submissions = evaluator.submissions.lock().unwrap();
        assert_eq!(submissions.last(), Some(&(id, EvaluationMode::Interactive)));
    }

    #[test]
    fn test_zero_generations() {
        let evaluator = SumEvaluator::default();
        let mut controller =
            AfpoController::new(params(0), &evaluator, Pcg32::seed_from_u64(9)).unwrap();
        assert!(controller.phase().is_done());
        assert!(controller.run_generation().unwrap().is_none());
        assert_eq!(*evaluator.prepared.lock().unwrap(), 0);
    }

    #[test]
    fn test_invalid_params() {
        let evaluator = SumEvaluator::default();
        let mut bad = params(1);
        bad.population_size = 0;
        assert!(matches!(
            AfpoController::new(bad, &evaluator, Pcg32::seed_from_u64(0)),
            Err(ParamsError::ZeroPopulationSize)
        ));
    }

    #[test]
    fn test_fatal_evaluation_error_aborts() {
        #[derive(Debug)]
        struct Broken;
        impl FitnessEvaluator for Broken {
            fn submit(
                &self,
                _id: IndividualId,
                _genome: &Genome,
                _mode: EvaluationMode,
            ) -> Result<(), EvaluationError> {
                Ok(())
            }
            fn await_result(&self, id: IndividualId) -> Result<Fitness, EvaluationError> {
                Err(EvaluationError::NotSubmitted { id })
            }
        }

        let mut controller =
            AfpoController::new(params(1), &Broken, Pcg32::seed_from_u64(0)).unwrap();
        let err = controller.run(|_| {}).unwrap_err();
        assert!(matches!(err, ControllerError::Evaluation(_)));
    }
}
