//! Output transforms applied to a model's raw score.

/// Post-processing applied to the summed tree outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalizer {
    #[default]
    Noop,
    Sigmoid,
}

impl Normalizer {
    #[inline]
    pub fn normalize(self, value: f32) -> f32 {
        match self {
            Normalizer::Noop => value,
            Normalizer::Sigmoid => (1.0 / (1.0 + (-f64::from(value)).exp())) as f32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Normalizer::Noop => "noop",
            Normalizer::Sigmoid => "sigmoid",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "noop" => Some(Normalizer::Noop),
            "sigmoid" => Some(Normalizer::Sigmoid),
            _ => None,
        }
    }
}
