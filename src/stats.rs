//! Running statistics over a stream of feature values.

/// Accumulates values and reports summary statistics.
///
/// Values are retained so the variance can be computed in two passes
/// around the exact mean. Variance is the population variance
/// `Σ(x - mean)² / count`; a single value has variance 0. Every getter
/// returns NaN while the aggregator is empty.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    values: Vec<f32>,
    sum: f64,
    min: f32,
    max: f32,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f32) {
        if self.values.is_empty() {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += f64::from(value);
        self.values.push(value);
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn sum(&self) -> f64 {
        if self.values.is_empty() {
            f64::NAN
        } else {
            self.sum
        }
    }

    pub fn min(&self) -> f32 {
        if self.values.is_empty() {
            f32::NAN
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f32 {
        if self.values.is_empty() {
            f32::NAN
        } else {
            self.max
        }
    }

    pub fn mean(&self) -> f64 {
        self.sum() / self.count() as f64
    }

    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        let mean = self.mean();
        let squares: f64 = self
            .values
            .iter()
            .map(|&v| {
                let d = f64::from(v) - mean;
                d * d
            })
            .sum();
        squares / self.count() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

impl Extend<f32> for Statistics {
    fn extend<I: IntoIterator<Item = f32>>(&mut self, iter: I) {
        for v in iter {
            self.add(v);
        }
    }
}

impl FromIterator<f32> for Statistics {
    fn from_iter<I: IntoIterator<Item = f32>>(iter: I) -> Self {
        let mut stats = Statistics::new();
        stats.extend(iter);
        stats
    }
}
