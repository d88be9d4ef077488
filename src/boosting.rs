//! Gradient-boosted decision trees for binary classification.
//!
//! Log-loss boosting: each round fits a regression tree to the residuals
//! `y - p` and sets leaf values with a single Newton step
//! `sum(residual) / sum(p * (1 - p))`.

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1};

use crate::config::ModelConfig;

/// Clamp for the base rate so the initial log-odds stay finite
const PRIOR_EPS: f64 = 1e-6;

/// Minimum hessian mass of a leaf before its value is zeroed
const MIN_HESSIAN: f64 = 1e-12;

/// Minimum squared-error reduction for a split to be kept
const MIN_GAIN: f64 = 1e-12;

/// Boosting hyperparameters
#[derive(Debug, Clone, Copy)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for BoostingParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            learning_rate: config.learning_rate,
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf.max(1),
        }
    }
}

/// Regression tree stored as flat arrays.
///
/// A child reference `>= 0` points at an internal node, `< 0` at leaf
/// `-child - 1`.
#[derive(Debug, Clone)]
struct RegressionTree {
    root: i32,
    split_features: Vec<usize>,
    thresholds: Vec<f64>,
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    leaf_values: Vec<f64>,
}

/// Best split found for one node
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
    /// Number of sorted samples going left
    n_left: usize,
}

/// Per-round fitting inputs shared by every node of a tree
struct TreeTarget<'a> {
    x: &'a Array2<f64>,
    residuals: &'a [f64],
    hessians: &'a [f64],
    params: &'a BoostingParams,
}

impl RegressionTree {
    fn fit(target: &TreeTarget<'_>, importances: &mut [f64]) -> Self {
        let mut tree = Self {
            root: -1,
            split_features: Vec::new(),
            thresholds: Vec::new(),
            left_child: Vec::new(),
            right_child: Vec::new(),
            leaf_values: Vec::new(),
        };
        let indices: Vec<usize> = (0..target.residuals.len()).collect();
        tree.root = tree.build(target, indices, 0, importances);
        tree
    }

    fn build(
        &mut self,
        target: &TreeTarget<'_>,
        mut indices: Vec<usize>,
        depth: usize,
        importances: &mut [f64],
    ) -> i32 {
        let can_split = depth < target.params.max_depth
            && indices.len() >= 2 * target.params.min_samples_leaf;

        let split = if can_split {
            Self::best_split(target, &indices)
        } else {
            None
        };

        let Some(split) = split else {
            return self.push_leaf(target, &indices);
        };

        importances[split.feature] += split.gain;

        indices.sort_by(|&a, &b| {
            target.x[[a, split.feature]].total_cmp(&target.x[[b, split.feature]])
        });
        let right = indices.split_off(split.n_left);
        let left = indices;

        let node = self.split_features.len();
        self.split_features.push(split.feature);
        self.thresholds.push(split.threshold);
        self.left_child.push(-1);
        self.right_child.push(-1);

        let l = self.build(target, left, depth + 1, importances);
        let r = self.build(target, right, depth + 1, importances);
        self.left_child[node] = l;
        self.right_child[node] = r;

        node as i32
    }

    fn push_leaf(&mut self, target: &TreeTarget<'_>, indices: &[usize]) -> i32 {
        let (sum_r, sum_h) = indices.iter().fold((0.0, 0.0), |acc, &i| {
            (acc.0 + target.residuals[i], acc.1 + target.hessians[i])
        });
        let value = if sum_h.abs() < MIN_HESSIAN {
            0.0
        } else {
            sum_r / sum_h
        };
        self.leaf_values.push(value);
        -(self.leaf_values.len() as i32)
    }

    /// Squared-error split search over every feature
    fn best_split(target: &TreeTarget<'_>, indices: &[usize]) -> Option<Split> {
        let n = indices.len();
        let min_leaf = target.params.min_samples_leaf;
        let total: f64 = indices.iter().map(|&i| target.residuals[i]).sum();
        let parent_score = total * total / n as f64;

        let mut best: Option<Split> = None;
        let mut order = indices.to_vec();

        for feature in 0..target.x.ncols() {
            order.sort_by(|&a, &b| target.x[[a, feature]].total_cmp(&target.x[[b, feature]]));

            let mut sum_left = 0.0;
            for k in 0..n - 1 {
                sum_left += target.residuals[order[k]];
                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let here = target.x[[order[k], feature]];
                let next = target.x[[order[k + 1], feature]];
                if here == next {
                    continue;
                }

                let sum_right = total - sum_left;
                let gain = sum_left * sum_left / n_left as f64
                    + sum_right * sum_right / n_right as f64
                    - parent_score;

                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                        n_left,
                    });
                }
            }
        }

        best
    }

    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self.root;
        while node >= 0 {
            let i = node as usize;
            node = if row[self.split_features[i]] <= self.thresholds[i] {
                self.left_child[i]
            } else {
                self.right_child[i]
            };
        }
        self.leaf_values[(-node - 1) as usize]
    }
}

/// Gradient-boosted binary classifier
#[derive(Debug, Clone)]
pub struct GradientBoostingClassifier {
    params: BoostingParams,
    init_score: f64,
    trees: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
    n_features: usize,
}

impl GradientBoostingClassifier {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            init_score: 0.0,
            trees: Vec::new(),
            feature_importances: Vec::new(),
            n_features: 0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.n_features > 0
    }

    #[cfg(test)]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Fit on a (n_samples, n_features) matrix and 0/1 labels
    pub fn fit(&mut self, x: &Array2<f64>, y: &[u8]) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            bail!("Cannot fit on an empty matrix");
        }
        if x.nrows() != y.len() {
            bail!("Feature rows ({}) and labels ({}) differ", x.nrows(), y.len());
        }

        let n = y.len();
        let y: Vec<f64> = y.iter().map(|&v| if v > 0 { 1.0 } else { 0.0 }).collect();
        let base_rate = (y.iter().sum::<f64>() / n as f64).clamp(PRIOR_EPS, 1.0 - PRIOR_EPS);

        self.init_score = (base_rate / (1.0 - base_rate)).ln();
        self.trees.clear();
        self.n_features = x.ncols();

        let mut raw = vec![self.init_score; n];
        let mut importances = vec![0.0; x.ncols()];
        let mut tree_importances = vec![0.0; x.ncols()];

        for _ in 0..self.params.n_estimators {
            let probs: Vec<f64> = raw.iter().map(|&r| sigmoid(r)).collect();
            let residuals: Vec<f64> = y.iter().zip(&probs).map(|(t, p)| t - p).collect();
            let hessians: Vec<f64> = probs.iter().map(|p| p * (1.0 - p)).collect();

            tree_importances.iter_mut().for_each(|v| *v = 0.0);
            let target = TreeTarget {
                x,
                residuals: &residuals,
                hessians: &hessians,
                params: &self.params,
            };
            let tree = RegressionTree::fit(&target, &mut tree_importances);

            for (i, r) in raw.iter_mut().enumerate() {
                *r += self.params.learning_rate * tree.predict(x.row(i));
            }

            // Each tree contributes its normalized impurity decrease
            let tree_total: f64 = tree_importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&tree_importances) {
                    *acc += v / tree_total;
                }
            }

            self.trees.push(tree);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = importances;

        Ok(())
    }

    /// Raw log-odds per row
    pub fn decision_function(&self, x: &Array2<f64>) -> Vec<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                self.init_score
                    + self
                        .trees
                        .iter()
                        .map(|t| self.params.learning_rate * t.predict(row))
                        .sum::<f64>()
            })
            .collect()
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        self.decision_function(x).into_iter().map(sigmoid).collect()
    }

    /// Hard labels (positive when probability > 0.5)
    pub fn predict(&self, x: &Array2<f64>) -> Vec<u8> {
        self.predict_proba(x)
            .into_iter()
            .map(|p| u8::from(p > 0.5))
            .collect()
    }

    /// Normalized impurity-based importance per input column
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> BoostingParams {
        BoostingParams {
            n_estimators: 30,
            learning_rate: 0.3,
            max_depth: 3,
            min_samples_leaf: 1,
        }
    }

    /// Label depends only on column 1 (> 0.5); column 0 is noise
    fn separable() -> (Array2<f64>, Vec<u8>) {
        let n = 40;
        let mut x = Array2::<f64>::zeros((n, 2));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            x[[i, 0]] = ((i * 7) % 11) as f64;
            x[[i, 1]] = i as f64 / n as f64;
            y.push(u8::from(i as f64 / n as f64 > 0.5));
        }
        (x, y)
    }

    #[test]
    fn test_fit_separable() {
        let (x, y) = separable();
        let mut clf = GradientBoostingClassifier::new(small_params());
        clf.fit(&x, &y).unwrap();

        assert!(clf.is_fitted());
        assert_eq!(clf.n_trees(), 30);
        assert_eq!(clf.predict(&x), y);
    }

    #[test]
    fn test_probabilities_in_range() {
        let (x, y) = separable();
        let mut clf = GradientBoostingClassifier::new(small_params());
        clf.fit(&x, &y).unwrap();

        for p in clf.predict_proba(&x) {
            assert!(p > 0.0 && p < 1.0);
        }
    }

    #[test]
    fn test_importance_on_informative_feature() {
        let (x, y) = separable();
        let mut clf = GradientBoostingClassifier::new(small_params());
        clf.fit(&x, &y).unwrap();

        let imp = clf.feature_importances();
        assert_eq!(imp.len(), 2);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[1] > imp[0]);
    }

    #[test]
    fn test_single_class_is_stable() {
        let x = Array2::<f64>::from_shape_fn((10, 3), |(i, j)| (i + j) as f64);
        let y = vec![0u8; 10];
        let mut clf = GradientBoostingClassifier::new(small_params());
        clf.fit(&x, &y).unwrap();

        for p in clf.predict_proba(&x) {
            assert!(p.is_finite());
            assert!(p < 0.01);
        }
        assert!(clf.feature_importances().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let mut clf = GradientBoostingClassifier::new(small_params());
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(clf.fit(&empty, &[]).is_err());

        let x = Array2::<f64>::zeros((3, 2));
        assert!(clf.fit(&x, &[0, 1]).is_err());
        assert!(!clf.is_fitted());
    }

    #[test]
    fn test_depth_zero_is_prior() {
        let (x, y) = separable();
        let params = BoostingParams {
            max_depth: 0,
            ..small_params()
        };
        let mut clf = GradientBoostingClassifier::new(params);
        clf.fit(&x, &y).unwrap();

        let probs = clf.predict_proba(&x);
        let first = probs[0];
        assert!(probs.iter().all(|p| (p - first).abs() < 1e-12));
    }
}
