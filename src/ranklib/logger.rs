//! Training progress reporting.
//!
//! The library never installs a `tracing` subscriber; callers decide where
//! the events go. [`Verbosity`] gates which events are emitted at all so a
//! silent training run does not pay for formatting.

use serde::{Deserialize, Serialize};

/// How much a training run reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Silent,
    Warning,
    Info,
    Debug,
}

/// Emits structured training events through `tracing`.
#[derive(Debug, Clone)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    ranker: &'static str,
}

impl TrainingLogger {
    pub fn new(ranker: &'static str, verbosity: Verbosity) -> Self {
        Self { verbosity, ranker }
    }

    pub fn silent() -> Self {
        Self::new("", Verbosity::Silent)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// A logger for another ranker sharing this verbosity.
    pub fn for_ranker(&self, ranker: &'static str) -> Self {
        Self::new(ranker, self.verbosity)
    }

    #[inline]
    pub fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }

    pub fn start(&self, n_samples: usize, n_features: usize) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(ranker = self.ranker, n_samples, n_features, "training started");
        }
    }

    /// One optimisation round with its training (and optional validation) score.
    pub fn round(&self, round: usize, metric: &str, train: f64, validation: Option<f64>) {
        if self.enabled(Verbosity::Info) {
            match validation {
                Some(validation) => tracing::info!(
                    ranker = self.ranker,
                    round,
                    metric,
                    score = train,
                    validation,
                    "round finished"
                ),
                None => tracing::info!(
                    ranker = self.ranker,
                    round,
                    metric,
                    score = train,
                    "round finished"
                ),
            }
        }
    }

    pub fn detail(&self, message: &str) {
        if self.enabled(Verbosity::Debug) {
            tracing::debug!(ranker = self.ranker, "{message}");
        }
    }

    pub fn early_stopping(&self, round: usize, best_round: usize, metric: &str) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(ranker = self.ranker, round, best_round, metric, "early stopping");
        }
    }

    pub fn warn(&self, message: &str) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!(ranker = self.ranker, "{message}");
        }
    }

    pub fn finish(&self, metric: &str, train: f64, validation: Option<f64>) {
        if self.enabled(Verbosity::Info) {
            match validation {
                Some(validation) => tracing::info!(
                    ranker = self.ranker,
                    metric,
                    score = train,
                    validation,
                    "training finished"
                ),
                None => {
                    tracing::info!(ranker = self.ranker, metric, score = train, "training finished")
                }
            }
        }
    }
}

impl Default for TrainingLogger {
    fn default() -> Self {
        Self::silent()
    }
}

// =============================================================================
// Early stopping
// =============================================================================

/// Tracks the best validation round of a higher-is-better metric.
///
/// `patience == None` never stops, but still remembers the best round so a
/// model can be rolled back to it.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: Option<usize>,
    best_value: Option<f64>,
    best_round: usize,
    current_round: usize,
}

impl EarlyStopping {
    pub fn new(patience: Option<usize>) -> Self {
        Self {
            patience,
            best_value: None,
            best_round: 0,
            current_round: 0,
        }
    }

    /// Record this round's value; `true` once the patience window is exhausted.
    pub fn should_stop(&mut self, value: f64) -> bool {
        if self.best_value.map_or(true, |best| value > best) {
            self.best_value = Some(value);
            self.best_round = self.current_round;
        }
        self.current_round += 1;
        match self.patience {
            Some(patience) => self.current_round - self.best_round > patience,
            None => false,
        }
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    pub fn best_round(&self) -> usize {
        self.best_round
    }

    pub fn current_round(&self) -> usize {
        self.current_round
    }
}
