use serde::{Deserialize, Serialize};

use crate::models::{HyperParams, ModelFamily};

const RIDGE_ALPHAS: [f64; 4] = [0.1, 1.0, 10.0, 100.0];
const FIT_INTERCEPT: [bool; 2] = [true, false];
const TREE_MAX_DEPTHS: [usize; 4] = [5, 10, 15, 20];
const TREE_MIN_SAMPLES_SPLIT: [usize; 3] = [2, 5, 10];

/// A model family and the hyper-parameter grid searched for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// Family searched.
    pub family: ModelFamily,
    /// Grid points in search order.
    pub grid: Vec<HyperParams>,
}

impl ModelCandidate {
    /// Family label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.family.label()
    }
}

/// The fixed candidate catalogue, in tie-break order.
///
/// Grid points are enumerated over parameter names in alphabetical order with
/// the last name varying fastest.
#[must_use]
pub fn catalogue() -> Vec<ModelCandidate> {
    vec![
        ModelCandidate {
            family: ModelFamily::Ridge,
            grid: RIDGE_ALPHAS
                .iter()
                .flat_map(|&alpha| {
                    FIT_INTERCEPT.iter().map(move |&fit_intercept| HyperParams::Ridge {
                        alpha,
                        fit_intercept,
                    })
                })
                .collect(),
        },
        ModelCandidate {
            family: ModelFamily::Linear,
            grid: FIT_INTERCEPT
                .iter()
                .map(|&fit_intercept| HyperParams::Linear { fit_intercept })
                .collect(),
        },
        ModelCandidate {
            family: ModelFamily::DecisionTree,
            grid: TREE_MAX_DEPTHS
                .iter()
                .flat_map(|&max_depth| {
                    TREE_MIN_SAMPLES_SPLIT
                        .iter()
                        .map(move |&min_samples_split| HyperParams::DecisionTree {
                            max_depth,
                            min_samples_split,
                        })
                })
                .collect(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_order_and_sizes() {
        let catalogue = catalogue();
        let families: Vec<ModelFamily> = catalogue.iter().map(|c| c.family).collect();
        assert_eq!(
            families,
            vec![ModelFamily::Ridge, ModelFamily::Linear, ModelFamily::DecisionTree]
        );
        let sizes: Vec<usize> = catalogue.iter().map(|c| c.grid.len()).collect();
        assert_eq!(sizes, vec![8, 2, 12]);
    }

    #[test]
    fn grid_points_match_their_family() {
        for candidate in catalogue() {
            assert!(candidate.grid.iter().all(|p| p.family() == candidate.family));
        }
    }

    #[test]
    fn last_parameter_varies_fastest() {
        let ridge = &catalogue()[0].grid;
        assert_eq!(
            ridge[0],
            HyperParams::Ridge {
                alpha: 0.1,
                fit_intercept: true
            }
        );
        assert_eq!(
            ridge[1],
            HyperParams::Ridge {
                alpha: 0.1,
                fit_intercept: false
            }
        );
    }
}
