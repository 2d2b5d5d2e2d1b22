//! Core burn detection stages

pub mod harmonize;
pub mod indices;
pub mod collection;
pub mod composite;
pub mod burn_metrics;
pub mod land_mask;
pub mod classifier;
pub mod deviation;
pub mod fusion;
pub mod vectorize;
pub mod backend;

// Re-export main types
pub use harmonize::{SensorHarmonizer, HarmonizeParams, MaskPolicy, RawScene};
pub use indices::{IndexEngine, SpectralIndex, FeatureImage, Reflectance};
pub use collection::{DateWindow, SeasonWindow, ObservationSet, LandsatArchive, merge_archives};
pub use composite::{TemporalCompositor, Reducer, CompositeRole, SeasonalComposite, stack_nan_min};
pub use burn_metrics::{BurnMetricCalculator, BurnMetric, Predictor};
pub use land_mask::LandMask;
pub use classifier::{ProbabilityClassifier, ProbabilityModel, RandomForest, ForestConfig, DecisionTree, TreeNode};
pub use deviation::{DeviationDetector, Deviations};
pub use fusion::{RuleFusion, RuleThresholds, DecisionRasters};
pub use vectorize::{Vectorizer, Connectivity, TileGrid, Tile, CandidatePolygon};
pub use backend::{ComputeBackend, SequentialBackend, DefaultBackend};
#[cfg(feature = "parallel")]
pub use backend::RayonBackend;
