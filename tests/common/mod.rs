#![allow(dead_code)]

use chrono::NaiveDate;
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::Arc;
use tundraburn::core::classifier::{
    DecisionTree, ForestConfig, ProbabilityClassifier, RandomForest, TreeNode,
};
use tundraburn::core::harmonize::RawScene;
use tundraburn::{BoundingBox, GeoTransform, RasterGrid, Sensor};

/// Clear-sky Landsat 8 QA word (clear, low cloud confidence)
pub const QA_CLEAR: u16 = 21824;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Surface reflectance of one pixel: blue, green, red, nir, sswir, lswir
pub type Spectrum = [f64; 6];

pub const VEGETATED: Spectrum = [0.03, 0.06, 0.05, 0.30, 0.18, 0.10];
pub const BURNED: Spectrum = [0.04, 0.06, 0.08, 0.12, 0.20, 0.22];

/// Stored digital number of a reflectance under Collection-2 scaling
pub fn to_dn(reflectance: f64) -> u16 {
    ((reflectance + 0.2) / 0.0000275).round() as u16
}

pub fn grid(rows: usize, cols: usize) -> RasterGrid {
    RasterGrid::new(GeoTransform::north_up(500_000.0, 7_600_000.0, 60.0), rows, cols)
}

/// A Landsat 8 scene whose pixels take `spectrum(row, col)`
pub fn landsat8_scene(
    grid: &RasterGrid,
    date: NaiveDate,
    spectrum: impl Fn(usize, usize) -> Spectrum,
) -> RawScene {
    let names = ["SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7"];
    let mut bands = HashMap::new();
    for (i, name) in names.iter().enumerate() {
        let band = Array2::from_shape_fn(grid.shape(), |(r, c)| to_dn(spectrum(r, c)[i]));
        bands.insert(name.to_string(), band);
    }
    bands.insert("QA_PIXEL".to_string(), Array2::from_elem(grid.shape(), QA_CLEAR));
    RawScene {
        product_id: format!("LC08_L2SP_076012_{}_20200908_02_T1", date.format("%Y%m%d")),
        sensor: Sensor::Landsat8,
        acquired: date,
        footprint: grid.bounds(),
        bands,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Single-split forest on DNBR2: 0.95 at or above `threshold`, else 0.05
pub fn dnbr2_forest(threshold: f32) -> RandomForest {
    RandomForest {
        config: ForestConfig {
            number_of_trees: 1,
            ..ForestConfig::default()
        },
        feature_names: vec!["DNBR2".into(), "DTCG".into(), "DTCB".into()],
        trees: vec![DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: 0.05 },
                TreeNode::Leaf { value: 0.95 },
            ],
        }],
    }
}

pub fn dnbr2_classifier(threshold: f32) -> ProbabilityClassifier {
    ProbabilityClassifier::new(Arc::new(dnbr2_forest(threshold))).unwrap()
}

pub fn roi(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
    BoundingBox::new(min_x, min_y, max_x, max_y)
}
