//! Age-Fitness Pareto Optimization of sensor-to-motor weight matrices.
//!
//! This crate runs the evolutionary loop. Fitness comes from an external evaluator (see
//! `afpo-evaluator`), where lower values are better.
//!
//! # How a Run Works
//!
//! 1. **Initialization** - Create a population of random genomes, all aged zero
//! 2. **Expansion** - Every survivor produces one mutated offspring; a few fresh random
//!    individuals are injected to keep diversity entering at age zero
//! 3. **Evaluation** - Every individual without a fitness is evaluated concurrently
//! 4. **Contraction** - Randomly paired individuals are compared and the dominated one is culled,
//!    until the population is back at its target size
//! 5. **Aging** - Every survivor gets one generation older
//! 6. **Repeat** - Continue for the configured number of generations
//!
//! An individual *dominates* another when it is no older and strictly fitter. Protecting young
//! individuals from old, well-adapted ones keeps the search from collapsing onto one lineage.
//!
//! # Architecture
//!
//! ```text
//! AfpoController (controller)
//!     ↓ owns
//! Population (population)
//!     ↓ hands pending genomes to
//! evaluate_all (afpo-evaluator)
//!     ↓ records fitness into
//! Population::contract
//!     ↓ summarized as
//! GenerationReport (report)
//! ```
//!
//! # Modules
//!
//! - [`controller`] - The phase machine driving each generation
//! - [`population`] - Storage, expansion and dominance-based culling
//! - [`report`] - Per-generation statistics

pub mod controller;
pub mod population;
pub mod report;
