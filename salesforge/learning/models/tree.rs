use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::{errors::TrainingError, models::Regressor};

const LABEL: &str = "Decision Tree Regressor";

/// Node of a fitted regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Terminal node predicting the mean target of its samples.
    Leaf {
        /// Predicted value.
        value: f64,
        /// Training samples that reached the node.
        samples: usize,
    },
    /// Internal node; rows with `x[feature] <= threshold` go left.
    Split {
        /// Feature column index.
        feature: usize,
        /// Midpoint between two adjacent observed values.
        threshold: f64,
        /// Left subtree.
        left: Box<TreeNode>,
        /// Right subtree.
        right: Box<TreeNode>,
        /// Training samples that reached the node.
        samples: usize,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                Self::Leaf { value, .. } => return *value,
                Self::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            Self::Leaf { .. } => 0,
            Self::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn leaves(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Split { left, right, .. } => left.leaves() + right.leaves(),
        }
    }
}

/// CART regression tree minimizing squared error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    max_depth: Option<usize>,
    min_samples_split: usize,
    root: Option<TreeNode>,
    n_features: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    cost: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl DecisionTreeRegressor {
    /// Unfitted tree. `max_depth = None` grows until leaves are pure or too
    /// small to split.
    #[must_use]
    pub fn new(max_depth: Option<usize>, min_samples_split: usize) -> Self {
        Self {
            max_depth,
            min_samples_split: min_samples_split.max(2),
            root: None,
            n_features: 0,
        }
    }

    /// Depth of the fitted tree (0 for a single leaf or an unfitted tree).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    /// Leaf count of the fitted tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::leaves)
    }

    fn build(&self, x: &Array2<f64>, y: &Array1<f64>, indices: Vec<usize>, depth: usize) -> TreeNode {
        let samples = indices.len();
        let (sum, sum_sq) = indices
            .iter()
            .fold((0.0, 0.0), |(s, q), &i| (s + y[i], y[i].mul_add(y[i], q)));
        let mean = sum / samples as f64;
        let node_cost = sum.mul_add(-mean, sum_sq);

        let depth_reached = self.max_depth.is_some_and(|limit| depth >= limit);
        let pure = indices.iter().all(|&i| (y[i] - y[indices[0]]).abs() <= f64::EPSILON);
        if samples < self.min_samples_split || depth_reached || pure {
            return TreeNode::Leaf { value: mean, samples };
        }

        match self.best_split(x, y, &indices) {
            Some(split) if split.cost < node_cost - 1e-12 * node_cost.abs().max(1.0) => {
                TreeNode::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left: Box::new(self.build(x, y, split.left, depth + 1)),
                    right: Box::new(self.build(x, y, split.right, depth + 1)),
                    samples,
                }
            }
            _ => TreeNode::Leaf { value: mean, samples },
        }
    }

    /// Scans every feature in order and every threshold in ascending order,
    /// keeping the first split with the lowest summed squared error.
    fn best_split(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> Option<SplitCandidate> {
        let n = indices.len();
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in 0..self.n_features {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

            let total_sum: f64 = order.iter().map(|&i| y[i]).sum();
            let total_sq: f64 = order.iter().map(|&i| y[i] * y[i]).sum();
            let (mut left_sum, mut left_sq) = (0.0, 0.0);

            for pos in 0..n - 1 {
                let row = order[pos];
                left_sum += y[row];
                left_sq += y[row] * y[row];
                let here = x[[row, feature]];
                let next = x[[order[pos + 1], feature]];
                if next <= here {
                    continue;
                }
                let left_n = (pos + 1) as f64;
                let right_n = (n - pos - 1) as f64;
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let cost = (left_sq - left_sum * left_sum / left_n)
                    + (right_sq - right_sum * right_sum / right_n);
                if best.map_or(true, |(_, _, best_cost)| cost < best_cost) {
                    best = Some((feature, here + (next - here) / 2.0, cost));
                }
            }
        }

        best.map(|(feature, threshold, cost)| {
            let (left, right) = indices
                .iter()
                .copied()
                .partition(|&i| x[[i, feature]] <= threshold);
            SplitCandidate {
                feature,
                threshold,
                cost,
                left,
                right,
            }
        })
    }
}

impl Regressor for DecisionTreeRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), TrainingError> {
        if x.nrows() != y.len() {
            return Err(TrainingError::ShapeMismatch {
                rows: x.nrows(),
                targets: y.len(),
            });
        }
        if x.nrows() == 0 {
            return Err(TrainingError::EmptyTrainingSet {
                family: LABEL.into(),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(TrainingError::NonFinite {
                family: LABEL.into(),
            });
        }
        self.n_features = x.ncols();
        self.root = Some(self.build(x, y, (0..x.nrows()).collect(), 0));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError> {
        let root = self.root.as_ref().ok_or_else(|| TrainingError::NotFitted {
            family: LABEL.into(),
        })?;
        if x.ncols() != self.n_features {
            return Err(TrainingError::FeatureWidth {
                family: LABEL.into(),
                expected: self.n_features,
                found: x.ncols(),
            });
        }
        Ok(x.rows().into_iter().map(|row| root.predict_row(row)).collect())
    }
}
