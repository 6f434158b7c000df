//! Run configuration loaded from JSON.

use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

use afpo_core::GenomeShape;
use afpo_evaluator::{BrainLayout, EvaluatorCommand, Mailbox, PollSettings};
use afpo_training::controller::AfpoParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RunConfig {
    pub(crate) population_size: usize,
    pub(crate) generations: usize,
    pub(crate) injected_per_generation: usize,
    pub(crate) sensor_neuron_count: usize,
    pub(crate) motor_neuron_count: usize,
    /// Link names of the sensor neurons; empty leaves them unnamed.
    pub(crate) sensor_links: Vec<String>,
    /// Joint names of the motor neurons; empty leaves them unnamed.
    pub(crate) motor_joints: Vec<String>,
    pub(crate) workdir: PathBuf,
    pub(crate) evaluator_command: Vec<String>,
    pub(crate) poll_interval_ms: u64,
    /// `None` waits for every evaluation indefinitely.
    pub(crate) evaluation_timeout_secs: Option<u64>,
    /// `None` runs one evaluator per pending individual.
    pub(crate) max_parallel_evaluations: Option<NonZeroUsize>,
    pub(crate) max_contraction_attempts: usize,
    /// `None` seeds from OS entropy.
    pub(crate) seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let layout = BrainLayout::quadruped();
        Self {
            population_size: 10,
            generations: 10,
            injected_per_generation: 2,
            sensor_neuron_count: layout.sensor_links().len(),
            motor_neuron_count: layout.motor_joints().len(),
            sensor_links: layout.sensor_links().to_vec(),
            motor_joints: layout.motor_joints().to_vec(),
            workdir: PathBuf::from("."),
            evaluator_command: vec!["python3".to_owned(), "simulate.py".to_owned()],
            poll_interval_ms: 10,
            evaluation_timeout_secs: Some(600),
            max_parallel_evaluations: None,
            max_contraction_attempts: 10_000,
            seed: None,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub(crate) enum ConfigError {
    #[display("`{field}` must be positive")]
    NotPositive {
        #[error(not(source))]
        field: &'static str,
    },
    #[display("`{field}` names {names} neurons but {count} are configured")]
    NameCount {
        field: &'static str,
        names: usize,
        count: usize,
    },
    #[display("`evaluator_command` must not be empty")]
    EmptyCommand,
}

impl RunConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("population_size", self.population_size),
            ("sensor_neuron_count", self.sensor_neuron_count),
            ("motor_neuron_count", self.motor_neuron_count),
            ("max_contraction_attempts", self.max_contraction_attempts),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive { field });
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::NotPositive {
                field: "poll_interval_ms",
            });
        }
        if self.evaluation_timeout_secs == Some(0) {
            return Err(ConfigError::NotPositive {
                field: "evaluation_timeout_secs",
            });
        }
        for (field, names, count) in [
            ("sensor_links", &self.sensor_links, self.sensor_neuron_count),
            ("motor_joints", &self.motor_joints, self.motor_neuron_count),
        ] {
            if !names.is_empty() && names.len() != count {
                return Err(ConfigError::NameCount {
                    field,
                    names: names.len(),
                    count,
                });
            }
        }
        if self.evaluator_command.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        Ok(())
    }

    /// Only meaningful once [`RunConfig::validate`] has succeeded.
    pub(crate) fn genome_shape(&self) -> GenomeShape {
        GenomeShape::new(self.sensor_neuron_count, self.motor_neuron_count)
    }

    pub(crate) fn afpo_params(&self) -> AfpoParams {
        AfpoParams {
            population_size: self.population_size,
            generations: self.generations,
            injected_per_generation: self.injected_per_generation,
            genome_shape: self.genome_shape(),
            max_contraction_attempts: self.max_contraction_attempts,
            max_parallel_evaluations: self.max_parallel_evaluations,
        }
    }

    pub(crate) fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: self.evaluation_timeout_secs.map(Duration::from_secs),
        }
    }

    pub(crate) fn brain_layout(&self) -> BrainLayout {
        BrainLayout::new(self.sensor_links.clone(), self.motor_joints.clone())
    }

    pub(crate) fn mailbox(&self) -> Mailbox {
        Mailbox::new(&self.workdir)
    }

    pub(crate) fn evaluator_command(&self) -> Result<EvaluatorCommand, ConfigError> {
        EvaluatorCommand::from_argv(&self.evaluator_command).ok_or(ConfigError::EmptyCommand)
    }
}
