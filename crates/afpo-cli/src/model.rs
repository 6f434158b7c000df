use afpo_core::{Fitness, Genome, Individual, IndividualId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fittest individual of a finished run, as saved by `afpo evolve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct BestModel {
    pub(crate) id: IndividualId,
    pub(crate) age: u32,
    /// `None` when the individual's evaluation failed.
    pub(crate) fitness: Option<Fitness>,
    /// Number of generations the run completed.
    pub(crate) generations: usize,
    pub(crate) trained_at: DateTime<Utc>,
    pub(crate) genome: Genome,
}

impl BestModel {
    pub(crate) fn new(best: &Individual, generations: usize, trained_at: DateTime<Utc>) -> Self {
        Self {
            id: best.id(),
            age: best.age(),
            fitness: best.fitness().filter(|f| f.is_finite()),
            generations,
            trained_at,
            genome: best.genome().clone(),
        }
    }
}
