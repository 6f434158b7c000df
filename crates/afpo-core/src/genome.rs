use std::fmt;

use rand::Rng;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::Error as _,
    ser::SerializeSeq as _,
};

/// Dimensions of a genome's weight matrix.
///
/// Rows correspond to sensor neurons and columns to motor neurons. The shape is fixed for the
/// lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenomeShape {
    sensors: usize,
    motors: usize,
}

impl GenomeShape {
    /// Creates a shape with `sensors` rows and `motors` columns.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero.
    #[must_use]
    pub const fn new(sensors: usize, motors: usize) -> Self {
        assert!(sensors > 0 && motors > 0, "genome dimensions must be positive");
        Self { sensors, motors }
    }

    #[must_use]
    pub const fn sensors(self) -> usize {
        self.sensors
    }

    #[must_use]
    pub const fn motors(self) -> usize {
        self.motors
    }

    /// Total number of weight cells.
    #[must_use]
    pub const fn len(self) -> usize {
        self.sensors * self.motors
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for GenomeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.sensors, self.motors)
    }
}

/// A cell overwritten by [`Genome::mutate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutatedCell {
    pub row: usize,
    pub col: usize,
    pub previous: f64,
    pub current: f64,
}

/// Sensor-to-motor synapse weights of a neural controller.
///
/// Weights are stored row-major (`sensors` rows of `motors` values) and always lie in
/// `[-1.0, 1.0]`.
///
/// Serialized as a list of rows so that saved models stay readable:
///
/// ```
/// use afpo_core::{Genome, GenomeShape};
///
/// let genome = Genome::from_fn(GenomeShape::new(2, 2), |row, col| (row * 2 + col) as f64 / 4.0);
/// let json = serde_json::to_string(&genome).unwrap();
/// assert_eq!(json, "[[0.0,0.25],[0.5,0.75]]");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Genome {
    shape: GenomeShape,
    weights: Vec<f64>,
}

impl Genome {
    pub const MIN_WEIGHT: f64 = -1.0;
    pub const MAX_WEIGHT: f64 = 1.0;

    /// Creates a genome whose weights are drawn uniformly from `[-1.0, 1.0]`.
    pub fn random<R>(shape: GenomeShape, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::from_fn(shape, |_, _| random_weight(rng))
    }

    /// Creates a genome by evaluating `f(row, col)` for every cell.
    ///
    /// Values are clamped into the valid weight range.
    pub fn from_fn<F>(shape: GenomeShape, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        let mut weights = Vec::with_capacity(shape.len());
        for row in 0..shape.sensors {
            for col in 0..shape.motors {
                weights.push(f(row, col).clamp(Self::MIN_WEIGHT, Self::MAX_WEIGHT));
            }
        }
        Self { shape, weights }
    }

    #[must_use]
    pub fn shape(&self) -> GenomeShape {
        self.shape
    }

    /// Returns the weight of the synapse from sensor `row` to motor `col`.
    ///
    /// # Panics
    ///
    /// Panics if the cell is outside the genome's shape.
    #[must_use]
    pub fn weight(&self, row: usize, col: usize) -> f64 {
        assert!(row < self.shape.sensors && col < self.shape.motors);
        self.weights[row * self.shape.motors + col]
    }

    /// Returns an iterator over rows (one slice of motor weights per sensor).
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.weights.chunks_exact(self.shape.motors)
    }

    /// Returns all weights in row-major order.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    /// Overwrites one uniformly chosen cell with a fresh uniform value in `[-1.0, 1.0]`.
    ///
    /// Every other cell is left untouched.
    pub fn mutate<R>(&mut self, rng: &mut R) -> MutatedCell
    where
        R: Rng + ?Sized,
    {
        let row = rng.random_range(0..self.shape.sensors);
        let col = rng.random_range(0..self.shape.motors);
        let cell = &mut self.weights[row * self.shape.motors + col];
        let previous = *cell;
        *cell = random_weight(rng);
        MutatedCell {
            row,
            col,
            previous,
            current: *cell,
        }
    }
}

fn random_weight<R>(rng: &mut R) -> f64
where
    R: Rng + ?Sized,
{
    rng.random_range(Genome::MIN_WEIGHT..=Genome::MAX_WEIGHT)
}

impl Serialize for Genome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.shape.sensors))?;
        for row in self.rows() {
            seq.serialize_element(row)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Genome {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
        let sensors = rows.len();
        let motors = rows.first().map_or(0, Vec::len);
        if sensors == 0 || motors == 0 {
            return Err(D::Error::custom("genome must have at least one row and column"));
        }
        if let Some(bad) = rows.iter().position(|row| row.len() != motors) {
            return Err(D::Error::custom(format!(
                "genome row {bad} has {} weights, expected {motors}",
                rows[bad].len()
            )));
        }
        let weights: Vec<f64> = rows.into_iter().flatten().collect();
        if let Some(w) = weights
            .iter()
            .find(|w| !(Self::MIN_WEIGHT..=Self::MAX_WEIGHT).contains(*w))
        {
            return Err(D::Error::custom(format!("genome weight {w} out of range")));
        }
        Ok(Self {
            shape: GenomeShape::new(sensors, motors),
            weights,
        })
    }
}
