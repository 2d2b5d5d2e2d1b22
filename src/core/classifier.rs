//! Burn-probability classification
//!
//! Applies a pretrained random forest to the predictor stack. Training
//! happens elsewhere; the forest arrives as a serialized ensemble of
//! decision trees whose leaves hold the burnt-class fraction, so the
//! ensemble probability is the mean leaf value.

use crate::core::burn_metrics::{predictor_vector, Predictor};
use crate::types::{BandImage, BandKey, BandStack, BurnError, BurnResult, PixelValue, NODATA};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hyperparameters the forest was trained with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub number_of_trees: usize,
    /// `None` means the trainer's default (square root of the feature count)
    pub variables_per_split: Option<usize>,
    pub min_leaf_population: usize,
    pub bag_fraction: f64,
    pub max_nodes: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            number_of_trees: 100,
            variables_per_split: None,
            min_leaf_population: 1,
            bag_fraction: 0.7,
            max_nodes: 560,
            seed: 0,
        }
    }
}

/// A node of one decision tree, addressed by position in the tree's node list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go left if `features[feature] < threshold`
    Split {
        feature: usize,
        threshold: f32,
        left: u32,
        right: u32,
    },
    /// Fraction of burnt training samples in the leaf
    Leaf { value: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Leaf value reached by a feature vector; nodes are validated on load
    pub fn evaluate(&self, features: &[PixelValue]) -> f32 {
        let mut index = 0usize;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[*feature] < *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
            }
        }
    }

    fn validate(&self, tree: usize, n_features: usize, max_nodes: usize) -> BurnResult<()> {
        if self.nodes.is_empty() {
            return Err(BurnError::Model(format!("tree {} has no nodes", tree)));
        }
        if self.nodes.len() > max_nodes {
            return Err(BurnError::Model(format!(
                "tree {} has {} nodes, limit is {}",
                tree,
                self.nodes.len(),
                max_nodes
            )));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(BurnError::Model(format!(
                            "tree {} node {} splits on feature {} of {}",
                            tree, i, feature, n_features
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(BurnError::Model(format!(
                            "tree {} node {} has a non-finite threshold",
                            tree, i
                        )));
                    }
                    // Children must follow their parent, which rules out cycles
                    for child in [*left as usize, *right as usize] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(BurnError::Model(format!(
                                "tree {} node {} has invalid child {}",
                                tree, i, child
                            )));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !(0.0..=1.0).contains(value) {
                        return Err(BurnError::Model(format!(
                            "tree {} leaf {} value {} outside [0, 1]",
                            tree, i, value
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Pretrained probability-mode random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub config: ForestConfig,
    /// Input feature names in vector order
    pub feature_names: Vec<String>,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Check the ensemble against its configuration
    pub fn validate(&self) -> BurnResult<()> {
        if self.trees.len() != self.config.number_of_trees {
            return Err(BurnError::Model(format!(
                "expected {} trees, found {}",
                self.config.number_of_trees,
                self.trees.len()
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(i, self.feature_names.len(), self.config.max_nodes)?;
        }
        Ok(())
    }
}

/// A read-only model mapping a feature vector to a probability
pub trait ProbabilityModel: Send + Sync {
    /// Feature names the model expects, in vector order
    fn feature_names(&self) -> Vec<String>;

    /// Probability in `[0, 1]` for a vector of finite features
    fn probability(&self, features: &[PixelValue]) -> f32;
}

impl ProbabilityModel for RandomForest {
    fn feature_names(&self) -> Vec<String> {
        self.feature_names.clone()
    }

    fn probability(&self, features: &[PixelValue]) -> f32 {
        let sum: f64 = self.trees.iter().map(|t| t.evaluate(features) as f64).sum();
        (sum / self.trees.len().max(1) as f64) as f32
    }
}

/// Applies a shared pretrained model to predictor rasters
#[derive(Clone)]
pub struct ProbabilityClassifier {
    model: Arc<dyn ProbabilityModel>,
}

impl std::fmt::Debug for ProbabilityClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbabilityClassifier")
            .field("features", &self.model.feature_names())
            .finish()
    }
}

impl ProbabilityClassifier {
    /// Wrap a model, checking that it consumes the predictor bands in order
    pub fn new(model: Arc<dyn ProbabilityModel>) -> BurnResult<Self> {
        let expected: Vec<&str> = Predictor::ALL.iter().map(|p| p.name()).collect();
        let actual = model.feature_names();
        if actual.len() != expected.len()
            || actual.iter().zip(expected.iter()).any(|(a, e)| a.as_str() != *e)
        {
            return Err(BurnError::Model(format!(
                "model features {:?} do not match predictors {:?}",
                actual, expected
            )));
        }
        Ok(Self { model })
    }

    /// Validate and wrap a random forest
    pub fn from_forest(forest: RandomForest) -> BurnResult<Self> {
        forest.validate()?;
        log::info!(
            "Loaded random forest: {} trees, features {:?}",
            forest.trees.len(),
            forest.feature_names
        );
        Self::new(Arc::new(forest))
    }

    /// Probability of one pixel; no-data when any predictor is no-data
    pub fn classify_pixel(&self, features: &[PixelValue]) -> PixelValue {
        if features.iter().any(|v| !v.is_finite()) {
            return NODATA;
        }
        self.model.probability(features).clamp(0.0, 1.0)
    }

    /// Single-band probability raster
    pub fn classify(&self, predictors: &BandStack<Predictor>) -> BurnResult<BandImage> {
        let (rows, cols) = predictors.dim();
        log::debug!("Classifying {}x{} predictor raster", rows, cols);

        #[cfg(feature = "parallel")]
        let values: Vec<PixelValue> = {
            use rayon::prelude::*;
            (0..rows * cols)
                .into_par_iter()
                .map(|i| self.classify_pixel(&predictor_vector(predictors, i / cols, i % cols)))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let values: Vec<PixelValue> = (0..rows * cols)
            .map(|i| self.classify_pixel(&predictor_vector(predictors, i / cols, i % cols)))
            .collect();

        Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| BurnError::Processing(format!("probability raster: {}", e)))
    }
}
