use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Fitness, Genome, GenomeShape, MutatedCell};

/// Durable identity of an individual.
///
/// Ids are issued by an [`IdAllocator`], strictly increasing and never reused within a run, even
/// after the individual they named has been culled. Result artifacts exchanged with external
/// evaluators are keyed by this value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct IndividualId(u64);

impl IndividualId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Monotonic source of [`IndividualId`]s.
///
/// Owned by the controller of a run; there is no global counter.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Like [`Self::new`], but continues after ids that were issued elsewhere.
    #[must_use]
    pub const fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// Issues the next id.
    pub fn next_id(&mut self) -> IndividualId {
        let id = IndividualId(self.next);
        self.next += 1;
        id
    }

    /// Returns the number of ids issued so far.
    #[must_use]
    pub const fn issued(&self) -> u64 {
        self.next
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("individual {id} has not been evaluated yet")]
pub struct NotEvaluatedError {
    #[error(not(source))]
    pub id: IndividualId,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("individual {id} already has fitness {fitness}")]
pub struct AlreadyEvaluatedError {
    pub id: IndividualId,
    pub fitness: Fitness,
}

/// A candidate controller: a genome plus the bookkeeping AFPO needs.
///
/// # Lifecycle
///
/// 1. Created either fresh ([`Individual::random`]) or as an [`Individual::offspring`] of a
///    surviving individual, with age 0 and no fitness
/// 2. Offspring are mutated once ([`Individual::mutate`]); fresh individuals are not
/// 3. Fitness is recorded once its evaluation finishes and never changes afterwards
/// 4. Age grows by one for each generation survived
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    id: IndividualId,
    age: u32,
    fitness: Option<Fitness>,
    genome: Genome,
}

impl Individual {
    /// Creates a fresh individual with uniformly random weights.
    pub fn random<R>(id: IndividualId, shape: GenomeShape, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::with_genome(id, Genome::random(shape, rng))
    }

    #[must_use]
    pub fn with_genome(id: IndividualId, genome: Genome) -> Self {
        Self {
            id,
            age: 0,
            fitness: None,
            genome,
        }
    }

    /// Creates a copy of this individual's genome under a new identity.
    ///
    /// The offspring owns an independent genome, starts at age 0 and has no fitness.
    #[must_use]
    pub fn offspring(&self, id: IndividualId) -> Self {
        Self::with_genome(id, self.genome.clone())
    }

    #[must_use]
    pub fn id(&self) -> IndividualId {
        self.id
    }

    #[must_use]
    pub fn age(&self) -> u32 {
        self.age
    }

    #[must_use]
    pub fn fitness(&self) -> Option<Fitness> {
        self.fitness
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    #[must_use]
    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    /// Mutates exactly one weight of the genome.
    pub fn mutate<R>(&mut self, rng: &mut R) -> MutatedCell
    where
        R: Rng + ?Sized,
    {
        self.genome.mutate(rng)
    }

    pub fn increment_age(&mut self) {
        self.age += 1;
    }

    /// Stores the result of this individual's evaluation.
    ///
    /// Fitness is write-once: recording a second value is rejected.
    pub fn record_fitness(&mut self, fitness: Fitness) -> Result<(), AlreadyEvaluatedError> {
        if let Some(existing) = self.fitness {
            return Err(AlreadyEvaluatedError {
                id: self.id,
                fitness: existing,
            });
        }
        self.fitness = Some(fitness);
        Ok(())
    }

    /// Returns the fitness, or an error naming this individual if it is not evaluated.
    pub fn evaluated_fitness(&self) -> Result<Fitness, NotEvaluatedError> {
        self.fitness.ok_or(NotEvaluatedError { id: self.id })
    }

    /// Returns `true` if `self` is not older than `other` and strictly fitter.
    ///
    /// Both individuals must have been evaluated.
    pub fn dominates(&self, other: &Self) -> Result<bool, NotEvaluatedError> {
        let mine = self.evaluated_fitness()?;
        let theirs = other.evaluated_fitness()?;
        Ok(self.age <= other.age && mine < theirs)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    fn evaluated(id: u64, age: u32, fitness: Fitness) -> Individual {
        let mut rng = Pcg32::seed_from_u64(id);
        let mut ind = Individual::random(IndividualId::new(id), GenomeShape::new(2, 2), &mut rng);
        ind.age = age;
        ind.record_fitness(fitness).unwrap();
        ind
    }

    #[test]
    fn test_id_allocator_is_strictly_increasing() {
        let mut ids = IdAllocator::new();
        let issued = (0..100).map(|_| ids.next_id()).collect::<Vec<_>>();
        assert!(issued.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids.issued(), 100);

        let mut resumed = IdAllocator::starting_at(100);
        assert!(resumed.next_id() > *issued.last().unwrap());
    }

    #[test]
    fn test_offspring_is_independent_copy() {
        let mut rng = Pcg32::seed_from_u64(7);
        let mut ids = IdAllocator::new();
        let mut parent = Individual::random(ids.next_id(), GenomeShape::new(8, 4), &mut rng);
        parent.increment_age();
        parent.record_fitness(-1.5).unwrap();
        let original = parent.genome().clone();

        let mut child = parent.offspring(ids.next_id());
        assert!(child.id() > parent.id());
        assert_eq!(child.age(), 0);
        assert_eq!(child.fitness(), None);
        assert_eq!(child.genome(), parent.genome());

        for _ in 0..10 {
            child.mutate(&mut rng);
        }
        assert_eq!(parent.genome(), &original);
    }

    #[test]
    fn test_dominance_requires_not_older_and_strictly_fitter() {
        let young_fit = evaluated(0, 0, -5.0);
        let old_unfit = evaluated(1, 3, -1.0);
        let young_tie = evaluated(2, 0, -5.0);
        let old_fit = evaluated(3, 4, -9.0);

        assert!(young_fit.dominates(&old_unfit).unwrap());
        assert!(!old_unfit.dominates(&young_fit).unwrap());
        // equal fitness never dominates
        assert!(!young_fit.dominates(&young_tie).unwrap());
        assert!(!young_tie.dominates(&young_fit).unwrap());
        // older but fitter does not dominate a younger individual
        assert!(!old_fit.dominates(&young_fit).unwrap());
        assert!(!young_fit.dominates(&old_fit).unwrap());
    }

    #[test]
    fn test_equal_age_strictly_fitter_dominates() {
        let a = evaluated(0, 2, -3.0);
        let b = evaluated(1, 2, -2.0);
        assert!(a.dominates(&b).unwrap());
        assert!(!b.dominates(&a).unwrap());
    }

    #[test]
    fn test_failure_fitness_is_dominated() {
        let ok = evaluated(0, 1, 1000.0);
        let failed = evaluated(1, 1, crate::FAILURE_FITNESS);
        assert!(ok.dominates(&failed).unwrap());
    }

    #[test]
    fn test_dominance_on_unevaluated_is_error() {
        let mut rng = Pcg32::seed_from_u64(1);
        let pending = Individual::random(IndividualId::new(9), GenomeShape::new(2, 2), &mut rng);
        let done = evaluated(1, 0, 0.0);

        let err = done.dominates(&pending).unwrap_err();
        assert_eq!(err.id, IndividualId::new(9));
        assert!(pending.dominates(&done).is_err());
    }

    #[test]
    fn test_fitness_is_write_once() {
        let mut ind = evaluated(4, 0, -3.275);
        let err = ind.record_fitness(1.0).unwrap_err();
        assert_eq!(err.id, IndividualId::new(4));
        assert_eq!(ind.fitness(), Some(-3.275));
    }

    #[test]
    fn test_increment_age() {
        let mut ind = evaluated(0, 0, 0.0);
        ind.increment_age();
        ind.increment_age();
        assert_eq!(ind.age(), 2);
    }
}
