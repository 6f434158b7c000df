//! Core data model for Age-Fitness Pareto Optimization (AFPO).
//!
//! This crate holds the pieces of the evolutionary system that carry no I/O:
//!
//! - [`genome`] - A fixed-shape sensor-to-motor weight matrix and its single-cell mutation
//! - [`individual`] - A genome wrapped with a durable id, an age and an optional fitness, plus
//!   the age-fitness dominance relation used for culling
//!
//! Fitness follows the minimization convention: lower values are better, so a robot that walks
//! further along the negative x axis produces a more negative (fitter) score.
//!
//! # Example
//!
//! ```
//! use afpo_core::{GenomeShape, IdAllocator, Individual};
//!
//! let mut rng = rand::rng();
//! let mut ids = IdAllocator::new();
//! let shape = GenomeShape::new(8, 4);
//!
//! let mut parent = Individual::random(ids.next_id(), shape, &mut rng);
//! let mut child = parent.offspring(ids.next_id());
//! child.mutate(&mut rng);
//!
//! parent.record_fitness(-1.0).unwrap();
//! child.record_fitness(-2.0).unwrap();
//! assert!(child.dominates(&parent).unwrap());
//! ```

pub use self::{genome::*, individual::*};

pub mod genome;
pub mod individual;

/// Fitness score produced by an evaluator. Lower is better.
pub type Fitness = f64;

/// Fitness assigned to an individual whose evaluation failed.
///
/// Every finite fitness is strictly better than this value, so a failed individual is dominated
/// by any evaluated individual that is not older.
pub const FAILURE_FITNESS: Fitness = f64::INFINITY;
