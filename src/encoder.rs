//! One-hot encoding of the categorical race context.

use anyhow::{bail, Result};
use ndarray::Array2;
use std::collections::BTreeSet;

use crate::config::FEATURE_NAMES;
use crate::types::{FeatureRow, Going, Weather};

/// Encodes `going` and `weather` as one-hot columns followed by the numeric
/// features in model order. Categories are learned at fit time; values not
/// seen during fit encode as all zeros.
#[derive(Debug, Clone, Default)]
pub struct OneHotEncoder {
    going: Vec<Going>,
    weather: Vec<Weather>,
    fitted: bool,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Learn the category sets (sorted)
    pub fn fit(&mut self, rows: &[FeatureRow]) {
        let going: BTreeSet<Going> = rows.iter().map(|r| r.going).collect();
        let weather: BTreeSet<Weather> = rows.iter().map(|r| r.weather).collect();
        self.going = going.into_iter().collect();
        self.weather = weather.into_iter().collect();
        self.fitted = true;
    }

    /// Total encoded width
    pub fn n_columns(&self) -> usize {
        self.numeric_offset() + FEATURE_NAMES.len()
    }

    /// Column index of the first numeric feature
    pub fn numeric_offset(&self) -> usize {
        self.going.len() + self.weather.len()
    }

    /// Encode rows into a (n_rows, n_columns) matrix
    pub fn transform(&self, rows: &[FeatureRow]) -> Result<Array2<f64>> {
        if !self.fitted {
            bail!("Encoder used before fit");
        }
        Ok(self.encode(rows))
    }

    /// Fit then transform
    pub fn fit_transform(&mut self, rows: &[FeatureRow]) -> Array2<f64> {
        self.fit(rows);
        self.encode(rows)
    }

    fn encode(&self, rows: &[FeatureRow]) -> Array2<f64> {
        let offset = self.numeric_offset();
        let mut x = Array2::<f64>::zeros((rows.len(), self.n_columns()));

        for (i, row) in rows.iter().enumerate() {
            if let Some(j) = self.going.iter().position(|g| *g == row.going) {
                x[[i, j]] = 1.0;
            }
            if let Some(j) = self.weather.iter().position(|w| *w == row.weather) {
                x[[i, self.going.len() + j]] = 1.0;
            }
            for (j, &val) in row.features.to_array().iter().enumerate() {
                x[[i, offset + j]] = val;
            }
        }

        x
    }
}
