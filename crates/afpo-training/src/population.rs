//! Population storage and the age-fitness culling that shrinks it.
//!
//! Individuals live in an arena keyed by their durable [`IndividualId`]; a separate dense list
//! of ids gives every individual a transient positional *slot* in `[0, len)`. Membership tests
//! go through the arena, slot access through the list.
//!
//! # Contraction
//!
//! [`Population::contract`] repeatedly samples two distinct individuals uniformly and removes
//! the one dominated by the other, if any. Removal during sampling is a `swap_remove` on a
//! scratch list of candidates, and the slot order is rebuilt once at the end, so each removal
//! costs O(1) instead of shifting every later slot.
//!
//! Sampling alone need not terminate: a population of fitness ties never exhibits dominance.
//! After `max_attempts` consecutive samples without a removal, contraction falls back to a full
//! scan for any dominated individual, and only if none exists truncates by fitness rank.

use std::{cmp::Ordering, collections::HashMap};

use afpo_core::{
    AlreadyEvaluatedError, Fitness, GenomeShape, IdAllocator, Individual, IndividualId,
    NotEvaluatedError,
};
use afpo_evaluator::EvaluationJob;
use rand::{Rng, seq::index};
use tracing::{debug, warn};

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum PopulationError {
    #[display("{_0}")]
    #[from]
    NotEvaluated(NotEvaluatedError),
    #[display("{_0}")]
    #[from]
    AlreadyEvaluated(AlreadyEvaluatedError),
    #[display("individual {id} is not in the population")]
    Unknown {
        #[error(not(source))]
        id: IndividualId,
    },
    #[display("individual {id} is already in the population")]
    Duplicate {
        #[error(not(source))]
        id: IndividualId,
    },
    #[display("population has {actual} individuals, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// What a call to [`Population::contract`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContractionSummary {
    /// Random pairs drawn.
    pub samples: usize,
    /// Individuals removed because another individual dominated them.
    pub dominated: usize,
    /// Individuals removed by fitness-rank truncation.
    pub truncated: usize,
    /// Whether sampling gave up and the deterministic fallback ran.
    pub fallback: bool,
}

impl ContractionSummary {
    #[must_use]
    pub fn removed(&self) -> usize {
        self.dominated + self.truncated
    }
}

#[derive(Debug, Clone, Default)]
pub struct Population {
    order: Vec<IndividualId>,
    arena: HashMap<IndividualId, Individual>,
}

impl Population {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `size` fresh individuals with ids drawn from `ids`.
    pub fn random<R>(size: usize, shape: GenomeShape, ids: &mut IdAllocator, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut population = Self::new();
        for _ in 0..size {
            population.push(Individual::random(ids.next_id(), shape, rng));
        }
        population
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: IndividualId) -> bool {
        self.arena.contains_key(&id)
    }

    /// Returns the individual currently at `slot`.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&Individual> {
        self.order.get(slot).map(|id| &self.arena[id])
    }

    #[must_use]
    pub fn get_by_id(&self, id: IndividualId) -> Option<&Individual> {
        self.arena.get(&id)
    }

    /// Iterates over individuals in slot order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Individual> + '_ {
        self.order.iter().map(|id| &self.arena[id])
    }

    /// Appends `individual` at the next free slot and returns that slot.
    pub fn insert(&mut self, individual: Individual) -> Result<usize, PopulationError> {
        let id = individual.id();
        if self.arena.contains_key(&id) {
            return Err(PopulationError::Duplicate { id });
        }
        Ok(self.push(individual))
    }

    fn push(&mut self, individual: Individual) -> usize {
        let slot = self.order.len();
        self.order.push(individual.id());
        self.arena.insert(individual.id(), individual);
        slot
    }

    /// Removes the individual at `slot`; every later individual moves down one slot.
    pub fn remove_slot(&mut self, slot: usize) -> Option<Individual> {
        if slot >= self.order.len() {
            return None;
        }
        let id = self.order.remove(slot);
        self.arena.remove(&id)
    }

    /// Grows the population for a new generation.
    ///
    /// Each of the first `target` individuals contributes one mutated offspring, then `inject`
    /// fresh random individuals are added, giving `2 * target + inject` individuals. The
    /// population must hold exactly `target` individuals beforehand.
    pub fn expand<R>(
        &mut self,
        target: usize,
        inject: usize,
        shape: GenomeShape,
        ids: &mut IdAllocator,
        rng: &mut R,
    ) -> Result<(), PopulationError>
    where
        R: Rng + ?Sized,
    {
        if self.len() != target {
            return Err(PopulationError::SizeMismatch {
                expected: target,
                actual: self.len(),
            });
        }
        for slot in 0..target {
            let mut child = self.arena[&self.order[slot]].offspring(ids.next_id());
            child.mutate(rng);
            self.push(child);
        }
        for _ in 0..inject {
            self.push(Individual::random(ids.next_id(), shape, rng));
        }
        debug!(size = self.len(), "population expanded");
        Ok(())
    }

    /// Individuals whose fitness is still unset, in slot order.
    #[must_use]
    pub fn pending_jobs(&self) -> Vec<EvaluationJob<'_>> {
        self.iter()
            .filter(|ind| !ind.is_evaluated())
            .map(|ind| EvaluationJob {
                id: ind.id(),
                genome: ind.genome(),
            })
            .collect()
    }

    pub fn record_fitness(
        &mut self,
        id: IndividualId,
        fitness: Fitness,
    ) -> Result<(), PopulationError> {
        let individual = self
            .arena
            .get_mut(&id)
            .ok_or(PopulationError::Unknown { id })?;
        individual.record_fitness(fitness)?;
        Ok(())
    }

    /// Culls dominated individuals until only `target` remain.
    ///
    /// Every individual must be evaluated. Survivors keep their relative slot order.
    pub fn contract<R>(
        &mut self,
        target: usize,
        max_attempts: usize,
        rng: &mut R,
    ) -> Result<ContractionSummary, PopulationError>
    where
        R: Rng + ?Sized,
    {
        for individual in self.iter() {
            individual.evaluated_fitness()?;
        }

        let mut summary = ContractionSummary::default();
        let mut candidates = self.order.clone();
        let mut idle = 0;
        while candidates.len() > target && candidates.len() >= 2 && idle < max_attempts {
            summary.samples += 1;
            let picked = index::sample(rng, candidates.len(), 2);
            let (a, b) = (picked.index(0), picked.index(1));
            match self.loser(candidates[a], candidates[b])? {
                Some(loser) => {
                    let slot = if loser == candidates[a] { a } else { b };
                    candidates.swap_remove(slot);
                    self.arena.remove(&loser);
                    summary.dominated += 1;
                    idle = 0;
                }
                None => idle += 1,
            }
        }

        if candidates.len() > target {
            summary.fallback = true;
            warn!(
                remaining = candidates.len(),
                target,
                samples = summary.samples,
                "random dominance sampling stalled; falling back to exhaustive scan"
            );
            while candidates.len() > target {
                let Some(slot) = self.find_dominated(&candidates)? else {
                    break;
                };
                let loser = candidates.swap_remove(slot);
                self.arena.remove(&loser);
                summary.dominated += 1;
            }
            if candidates.len() > target {
                candidates.sort_by(|a, b| rank(&self.arena[a], &self.arena[b]));
                for loser in candidates.drain(target..) {
                    self.arena.remove(&loser);
                    summary.truncated += 1;
                }
            }
        }

        self.order.retain(|id| self.arena.contains_key(id));
        debug!(size = self.len(), ?summary, "population contracted");
        Ok(summary)
    }

    /// Returns the id of whichever of `a` and `b` is dominated by the other.
    fn loser(
        &self,
        a: IndividualId,
        b: IndividualId,
    ) -> Result<Option<IndividualId>, PopulationError> {
        let (ia, ib) = (&self.arena[&a], &self.arena[&b]);
        if ia.dominates(ib)? {
            Ok(Some(b))
        } else if ib.dominates(ia)? {
            Ok(Some(a))
        } else {
            Ok(None)
        }
    }

    /// Finds the position in `candidates` of an individual dominated by another candidate.
    fn find_dominated(&self, candidates: &[IndividualId]) -> Result<Option<usize>, PopulationError> {
        for (i, victim) in candidates.iter().enumerate() {
            let victim = &self.arena[victim];
            for (j, other) in candidates.iter().enumerate() {
                if i != j && self.arena[other].dominates(victim)? {
                    return Ok(Some(i));
                }
            }
        }
        Ok(None)
    }

    pub fn increment_all_ages(&mut self) {
        for individual in self.arena.values_mut() {
            individual.increment_age();
        }
    }

    /// Returns the evaluated individual with the lowest fitness.
    ///
    /// Ties go to the younger individual, then to the earlier slot.
    #[must_use]
    pub fn best(&self) -> Option<&Individual> {
        self.iter()
            .filter(|ind| ind.is_evaluated())
            .min_by(|a, b| rank(a, b))
    }
}

/// Orders individuals from most to least worth keeping: lower fitness, then younger, then
/// older id.
fn rank(a: &Individual, b: &Individual) -> Ordering {
    let fa = a.fitness().unwrap_or(Fitness::INFINITY);
    let fb = b.fitness().unwrap_or(Fitness::INFINITY);
    fa.total_cmp(&fb)
        .then(a.age().cmp(&b.age()))
        .then(a.id().cmp(&b.id()))
}
