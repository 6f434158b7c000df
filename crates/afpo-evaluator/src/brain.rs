//! Neural network description handed to the external evaluator.
//!
//! The file lists sensor neurons, then motor neurons, then one synapse per genome cell:
//!
//! ```text
//! <neuralNetwork>
//!     <neuron name = "0" type = "sensor" linkName = "BackLeg" />
//!     ...
//!     <neuron name = "8" type = "motor" jointName = "BackLeg_BackLowerLeg" />
//!     ...
//!     <synapse sourceNeuronName = "0" targetNeuronName = "8" weight = "0.25" />
//!     ...
//! </neuralNetwork>
//! ```
//!
//! Sensor neuron `i` is named `i`; motor neuron `j` is named `sensors + j`. The weight of the
//! synapse from sensor `i` to motor `j` is genome cell `(i, j)`. Weights are written with full
//! precision so [`read_genome`] reproduces the genome bit for bit.

use std::{
    fs::File,
    io::{self, BufRead, BufWriter, Write},
    num::{ParseFloatError, ParseIntError},
    path::Path,
};

use afpo_core::{Genome, GenomeShape};

/// Names of the body parts neurons attach to.
///
/// Either list may be empty, in which case the corresponding attribute is omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrainLayout {
    sensor_links: Vec<String>,
    motor_joints: Vec<String>,
}

impl BrainLayout {
    #[must_use]
    pub fn new(sensor_links: Vec<String>, motor_joints: Vec<String>) -> Self {
        Self {
            sensor_links,
            motor_joints,
        }
    }

    /// Eight touch sensors on the legs of the four-legged walker and its four knee joints.
    #[must_use]
    pub fn quadruped() -> Self {
        let links = [
            "BackLeg",
            "BackLowerLeg",
            "FrontLeg",
            "FrontLowerLeg",
            "LeftLeg",
            "LeftLowerLeg",
            "RightLeg",
            "RightLowerLeg",
        ];
        let joints = [
            "BackLeg_BackLowerLeg",
            "FrontLeg_FrontLowerLeg",
            "LeftLeg_LeftLowerLeg",
            "RightLeg_RightLowerLeg",
        ];
        Self::new(
            links.map(str::to_owned).to_vec(),
            joints.map(str::to_owned).to_vec(),
        )
    }

    #[must_use]
    pub fn sensor_links(&self) -> &[String] {
        &self.sensor_links
    }

    #[must_use]
    pub fn motor_joints(&self) -> &[String] {
        &self.motor_joints
    }

    /// Returns `true` if every named list matches the genome's dimensions.
    #[must_use]
    pub fn fits(&self, shape: GenomeShape) -> bool {
        (self.sensor_links.is_empty() || self.sensor_links.len() == shape.sensors())
            && (self.motor_joints.is_empty() || self.motor_joints.len() == shape.motors())
    }
}

/// Writes the description of `genome` to `writer`.
pub fn write_brain<W>(writer: &mut W, genome: &Genome, layout: &BrainLayout) -> io::Result<()>
where
    W: Write + ?Sized,
{
    let shape = genome.shape();
    writeln!(writer, "<neuralNetwork>")?;
    for sensor in 0..shape.sensors() {
        match layout.sensor_links.get(sensor) {
            Some(link) => writeln!(
                writer,
                "    <neuron name = \"{sensor}\" type = \"sensor\" linkName = \"{link}\" />"
            )?,
            None => writeln!(writer, "    <neuron name = \"{sensor}\" type = \"sensor\" />")?,
        }
    }
    for motor in 0..shape.motors() {
        let name = shape.sensors() + motor;
        match layout.motor_joints.get(motor) {
            Some(joint) => writeln!(
                writer,
                "    <neuron name = \"{name}\" type = \"motor\" jointName = \"{joint}\" />"
            )?,
            None => writeln!(writer, "    <neuron name = \"{name}\" type = \"motor\" />")?,
        }
    }
    for (sensor, row) in genome.rows().enumerate() {
        for (motor, weight) in row.iter().enumerate() {
            let target = shape.sensors() + motor;
            writeln!(
                writer,
                "    <synapse sourceNeuronName = \"{sensor}\" targetNeuronName = \"{target}\" weight = \"{weight}\" />"
            )?;
        }
    }
    writeln!(writer, "</neuralNetwork>")?;
    Ok(())
}

/// Writes the description of `genome` to a file at `path`, replacing any existing file.
pub fn write_brain_file<P>(path: P, genome: &Genome, layout: &BrainLayout) -> io::Result<()>
where
    P: AsRef<Path>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    write_brain(&mut writer, genome, layout)?;
    writer.flush()
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum BrainParseError {
    #[display("failed to read brain description")]
    Io(io::Error),
    #[display("line {line}: missing attribute {attribute}")]
    MissingAttribute {
        line: usize,
        attribute: &'static str,
    },
    #[display("line {line}: invalid neuron name")]
    InvalidNeuron { line: usize, source: ParseIntError },
    #[display("line {line}: invalid weight")]
    InvalidWeight {
        line: usize,
        source: ParseFloatError,
    },
    #[display("line {line}: synapse {source_neuron} -> {target_neuron} does not fit a {shape} genome")]
    OutOfShape {
        line: usize,
        source_neuron: usize,
        target_neuron: usize,
        shape: GenomeShape,
    },
    #[display("expected {expected} synapses, found {found}")]
    SynapseCount { expected: usize, found: usize },
}

/// Reads synapse weights back into a genome of the given shape.
///
/// Neuron declarations are ignored. Every cell must be covered by exactly one synapse.
pub fn read_genome<R>(reader: R, shape: GenomeShape) -> Result<Genome, BrainParseError>
where
    R: BufRead,
{
    let mut cells = vec![None; shape.len()];
    let mut found = 0;
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(BrainParseError::Io)?;
        let line = line.trim();
        if !line.starts_with("<synapse") {
            continue;
        }
        let source = attribute(line, "sourceNeuronName", line_no)?
            .parse::<usize>()
            .map_err(|source| BrainParseError::InvalidNeuron {
                line: line_no,
                source,
            })?;
        let target = attribute(line, "targetNeuronName", line_no)?
            .parse::<usize>()
            .map_err(|source| BrainParseError::InvalidNeuron {
                line: line_no,
                source,
            })?;
        let weight = attribute(line, "weight", line_no)?
            .parse::<f64>()
            .map_err(|source| BrainParseError::InvalidWeight {
                line: line_no,
                source,
            })?;
        let motor = target.checked_sub(shape.sensors());
        let cell = match motor {
            Some(motor) if source < shape.sensors() && motor < shape.motors() => {
                &mut cells[source * shape.motors() + motor]
            }
            _ => {
                return Err(BrainParseError::OutOfShape {
                    line: line_no,
                    source_neuron: source,
                    target_neuron: target,
                    shape,
                });
            }
        };
        *cell = Some(weight);
        found += 1;
    }
    if found != shape.len() || cells.iter().any(Option::is_none) {
        return Err(BrainParseError::SynapseCount {
            expected: shape.len(),
            found,
        });
    }
    let mut weights = cells.into_iter().flatten();
    Ok(Genome::from_fn(shape, |_, _| weights.next().unwrap_or_default()))
}

/// Extracts `name = "value"` from a single-line element.
fn attribute<'a>(
    line: &'a str,
    name: &'static str,
    line_no: usize,
) -> Result<&'a str, BrainParseError> {
    let missing = || BrainParseError::MissingAttribute {
        line: line_no,
        attribute: name,
    };
    let mut rest = line;
    while let Some(pos) = rest.find(name) {
        let after = &rest[pos + name.len()..];
        let preceded_by_space = rest[..pos].ends_with(char::is_whitespace);
        if let Some(value) = after.trim_start().strip_prefix('=') {
            let value = value.trim_start().strip_prefix('"').ok_or_else(missing)?;
            let end = value.find('"').ok_or_else(missing)?;
            if preceded_by_space {
                return Ok(&value[..end]);
            }
        }
        rest = after;
    }
    Err(missing())
}
