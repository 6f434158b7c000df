//! Per-generation summaries for progress reporting.

use afpo_core::{Fitness, IndividualId};

use crate::population::{ContractionSummary, Population};

/// Minimum, maximum, mean and median of a set of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl Summary {
    /// Summarizes `values`. Returns `None` if there are none.
    ///
    /// ```
    /// use afpo_training::report::Summary;
    ///
    /// let summary = Summary::new([3.0, -1.0, 2.0]).unwrap();
    /// assert_eq!(summary.min, -1.0);
    /// assert_eq!(summary.max, 3.0);
    /// assert_eq!(summary.median, 2.0);
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values = values.into_iter().collect::<Vec<_>>();
        values.sort_by(f64::total_cmp);
        let min = *values.first()?;
        let max = *values.last()?;
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let median = values[values.len() / 2];
        Some(Self {
            min,
            max,
            mean,
            median,
        })
    }
}

/// The fittest individual at the end of a generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Champion {
    pub id: IndividualId,
    pub age: u32,
    pub fitness: Fitness,
}

/// What happened in one completed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    /// Zero-based index of the generation.
    pub generation: usize,
    /// Population size after expansion.
    pub expanded_size: usize,
    /// Population size after contraction.
    pub population_size: usize,
    /// Evaluations run in this generation.
    pub evaluated: usize,
    /// Evaluations that ended with the failure fitness.
    pub failed: usize,
    pub contraction: ContractionSummary,
    /// Summary of the survivors' finite fitness values.
    pub fitness: Option<Summary>,
    /// Summary of the survivors' ages, after aging.
    pub age: Option<Summary>,
    pub champion: Option<Champion>,
}

impl GenerationReport {
    pub(crate) fn new(
        generation: usize,
        progress: &GenerationProgress,
        population: &Population,
    ) -> Self {
        let fitness = Summary::new(
            population
                .iter()
                .filter_map(|ind| ind.fitness())
                .filter(|f| f.is_finite()),
        );
        let age = Summary::new(population.iter().map(|ind| f64::from(ind.age())));
        let champion = population.best().and_then(|ind| {
            Some(Champion {
                id: ind.id(),
                age: ind.age(),
                fitness: ind.fitness()?,
            })
        });
        Self {
            generation,
            expanded_size: progress.expanded_size,
            population_size: population.len(),
            evaluated: progress.evaluated,
            failed: progress.failed,
            contraction: progress.contraction,
            fitness,
            age,
            champion,
        }
    }
}

/// Bookkeeping collected while a generation is in flight.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct GenerationProgress {
    pub(crate) expanded_size: usize,
    pub(crate) evaluated: usize,
    pub(crate) failed: usize,
    pub(crate) contraction: ContractionSummary,
}
