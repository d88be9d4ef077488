//! Self-healing win classifier.
//!
//! Holds the cumulative training history, retrains every
//! [`RETRAIN_BATCH`] samples once [`MIN_TRAINING_SAMPLES`] are available and
//! can distort its own history via [`SelfHealingModel::self_heal`] when
//! misclassification records pile up.

use anyhow::Result;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::boosting::{BoostingParams, GradientBoostingClassifier};
use crate::config::{ModelConfig, FEATURE_NAMES};
use crate::encoder::OneHotEncoder;
use crate::types::{ErrorAnalysis, FeatureRow, TrainingSample};

/// Retrain whenever the history length is a multiple of this
pub const RETRAIN_BATCH: usize = 20;

/// Minimum history size for a retrain
pub const MIN_TRAINING_SAMPLES: usize = 50;

/// Share of the history held out for scoring
pub const TEST_FRACTION: f64 = 0.2;

/// Error records needed before callers run a self-heal
pub const SELF_HEAL_THRESHOLD: usize = 10;

/// Most recent error records inspected by a self-heal
const HEAL_WINDOW: usize = 5;

/// Number of top-ranked features a self-heal reacts to
const TOP_FEATURES: usize = 3;

const DISTANCE_SUITABILITY_BOOST: f64 = 1.1;
const RECENT_FORM_BOOST: f64 = 1.05;

/// Score returned for every row before the first retrain
const NEUTRAL_SCORE: f64 = 0.5;

/// Outcome of one `train()` call
#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    /// History below [`MIN_TRAINING_SAMPLES`]; nothing changed
    InsufficientData { samples: usize },
    Trained {
        accuracy: f64,
        errors: usize,
        samples: usize,
    },
    /// Fitting failed; previous classifier kept
    Failed(String),
}

impl TrainOutcome {
    #[cfg(test)]
    pub fn is_trained(&self) -> bool {
        matches!(self, TrainOutcome::Trained { .. })
    }
}

/// Long-lived model state: encoder, classifier, history and logs
pub struct SelfHealingModel {
    config: ModelConfig,
    encoder: OneHotEncoder,
    classifier: GradientBoostingClassifier,
    history: Vec<TrainingSample>,
    accuracy_history: Vec<f64>,
    error_analysis: Vec<ErrorAnalysis>,
    train_calls: usize,
    retrains: usize,
    self_heals: usize,
}

impl SelfHealingModel {
    /// Empty history, unfit encoder and classifier
    pub fn new(config: ModelConfig) -> Self {
        let params = BoostingParams::from(&config);
        Self {
            config,
            encoder: OneHotEncoder::new(),
            classifier: GradientBoostingClassifier::new(params),
            history: Vec::new(),
            accuracy_history: Vec::new(),
            error_analysis: Vec::new(),
            train_calls: 0,
            retrains: 0,
            self_heals: 0,
        }
    }

    /// Positive-class probability per row; neutral before the first retrain
    pub fn predict(&self, rows: &[FeatureRow]) -> Vec<f64> {
        if !self.is_trained() {
            return vec![NEUTRAL_SCORE; rows.len()];
        }

        match self.encoder.transform(rows) {
            Ok(x) => self.classifier.predict_proba(&x),
            Err(e) => {
                warn!("Prediction fell back to neutral scores: {}", e);
                vec![NEUTRAL_SCORE; rows.len()]
            }
        }
    }

    /// Append realized samples; retrains when the history length hits a
    /// multiple of [`RETRAIN_BATCH`].
    pub fn add_results(&mut self, samples: Vec<TrainingSample>) -> Option<TrainOutcome> {
        self.history.extend(samples);
        debug!("Training history: {} samples", self.history.len());

        if !self.history.is_empty() && self.history.len() % RETRAIN_BATCH == 0 {
            Some(self.train())
        } else {
            None
        }
    }

    /// Refit encoder and classifier on a fixed 80/20 split of the history.
    pub fn train(&mut self) -> TrainOutcome {
        self.train_calls += 1;

        let n = self.history.len();
        if n < MIN_TRAINING_SAMPLES {
            warn!(
                "Insufficient data for training ({} < {} samples)",
                n, MIN_TRAINING_SAMPLES
            );
            return TrainOutcome::InsufficientData { samples: n };
        }

        match self.fit_and_score() {
            Ok((accuracy, errors)) => {
                self.retrains += 1;
                info!(
                    "Model retrained | Accuracy: {:.2} | Samples: {}",
                    accuracy, n
                );
                TrainOutcome::Trained {
                    accuracy,
                    errors,
                    samples: n,
                }
            }
            Err(e) => {
                error!("Model retrain failed: {}", e);
                TrainOutcome::Failed(e.to_string())
            }
        }
    }

    fn fit_and_score(&mut self) -> Result<(f64, usize)> {
        let n = self.history.len();
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        indices.shuffle(&mut rng);

        let n_test = ((n as f64) * TEST_FRACTION).ceil() as usize;
        let (test_idx, train_idx) = indices.split_at(n_test);

        let train_rows: Vec<FeatureRow> = train_idx.iter().map(|&i| self.history[i].row).collect();
        let train_y: Vec<u8> = train_idx.iter().map(|&i| self.history[i].outcome).collect();
        let test_rows: Vec<FeatureRow> = test_idx.iter().map(|&i| self.history[i].row).collect();
        let test_y: Vec<u8> = test_idx.iter().map(|&i| self.history[i].outcome).collect();

        let mut encoder = OneHotEncoder::new();
        let x_train = encoder.fit_transform(&train_rows);
        let mut classifier = GradientBoostingClassifier::new(BoostingParams::from(&self.config));
        classifier.fit(&x_train, &train_y)?;

        let x_test = encoder.transform(&test_rows)?;
        let predicted = classifier.predict(&x_test);

        let misclassified: Vec<&FeatureRow> = test_rows
            .iter()
            .zip(predicted.iter().zip(&test_y))
            .filter(|(_, (p, t))| p != t)
            .map(|(row, _)| row)
            .collect();

        let accuracy = (test_y.len() - misclassified.len()) as f64 / test_y.len() as f64;
        self.accuracy_history.push(accuracy);

        if !misclassified.is_empty() {
            self.error_analysis.push(ErrorAnalysis {
                timestamp: Utc::now(),
                error_count: misclassified.len(),
                feature_means: feature_means(&misclassified),
            });
        }

        self.encoder = encoder;
        self.classifier = classifier;

        Ok((accuracy, misclassified.len()))
    }

    /// Heuristic correction driven by the error log.
    ///
    /// For each of the last five error records, inflates
    /// `distance_suitability` (x1.1) and/or `recent_form` (x1.05) across the
    /// whole history when that feature ranks in the classifier's top three.
    /// Always clears the error log. Returns false on an empty log.
    pub fn self_heal(&mut self) -> bool {
        if self.error_analysis.is_empty() {
            return false;
        }

        let important: Vec<&str> = self
            .ranked_features()
            .into_iter()
            .take(TOP_FEATURES)
            .map(|(name, _)| name)
            .collect();
        let boost_distance = important.contains(&"distance_suitability");
        let boost_form = important.contains(&"recent_form");

        let start = self.error_analysis.len().saturating_sub(HEAL_WINDOW);
        for _ in &self.error_analysis[start..] {
            if boost_distance {
                for sample in self.history.iter_mut() {
                    sample.row.features.distance_suitability *= DISTANCE_SUITABILITY_BOOST;
                }
            }
            if boost_form {
                for sample in self.history.iter_mut() {
                    sample.row.features.recent_form *= RECENT_FORM_BOOST;
                }
            }
        }

        info!(
            "Self-healing applied based on error analysis (top features: {:?})",
            important
        );
        self.error_analysis.clear();
        self.self_heals += 1;
        true
    }

    /// Named features by learned importance, most important first
    pub fn ranked_features(&self) -> Vec<(&'static str, f64)> {
        let importances = self.classifier.feature_importances();
        let offset = self.encoder.numeric_offset();

        let mut ranked: Vec<(&'static str, f64)> = FEATURE_NAMES
            .iter()
            .enumerate()
            .map(|(j, name)| (*name, importances.get(offset + j).copied().unwrap_or(0.0)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// True once a retrain has succeeded
    pub fn is_trained(&self) -> bool {
        self.encoder.is_fitted() && self.classifier.is_fitted()
    }

    pub fn history(&self) -> &[TrainingSample] {
        &self.history
    }

    pub fn accuracy_history(&self) -> &[f64] {
        &self.accuracy_history
    }

    /// Mean of the last `n` accuracies (0 when none)
    pub fn recent_accuracy(&self, n: usize) -> f64 {
        let start = self.accuracy_history.len().saturating_sub(n);
        let recent = &self.accuracy_history[start..];
        if recent.is_empty() {
            0.0
        } else {
            recent.iter().sum::<f64>() / recent.len() as f64
        }
    }

    pub fn error_analysis(&self) -> &[ErrorAnalysis] {
        &self.error_analysis
    }

    /// True when the error log has grown past [`SELF_HEAL_THRESHOLD`]
    pub fn needs_self_heal(&self) -> bool {
        self.error_analysis.len() > SELF_HEAL_THRESHOLD
    }

    pub fn train_calls(&self) -> usize {
        self.train_calls
    }

    pub fn retrains(&self) -> usize {
        self.retrains
    }

    pub fn self_heals(&self) -> usize {
        self.self_heals
    }
}

/// Mean of every named feature over the given rows
fn feature_means(rows: &[&FeatureRow]) -> HashMap<String, f64> {
    let mut sums = [0.0; FEATURE_NAMES.len()];
    for row in rows {
        for (acc, v) in sums.iter_mut().zip(row.features.to_array()) {
            *acc += v;
        }
    }
    let n = rows.len().max(1) as f64;
    FEATURE_NAMES
        .iter()
        .zip(sums)
        .map(|(name, sum)| (name.to_string(), sum / n))
        .collect()
}
