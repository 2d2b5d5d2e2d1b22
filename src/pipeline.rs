//! End-to-end candidate fire detection for one analysis year and ROI

use crate::config::RunConfig;
use crate::core::backend::{ComputeBackend, DefaultBackend};
use crate::core::burn_metrics::{BurnMetric, BurnMetricCalculator};
use crate::core::classifier::ProbabilityClassifier;
use crate::core::collection::{merge_archives, DateWindow, LandsatArchive, ObservationSet};
use crate::core::composite::{CompositeRole, TemporalCompositor};
use crate::core::deviation::{DeviationDetector, Deviations, BASELINE_YEARS};
use crate::core::fusion::{DecisionRasters, RuleFusion};
use crate::core::harmonize::SensorHarmonizer;
use crate::core::indices::{FeatureImage, IndexEngine};
use crate::core::land_mask::LandMask;
use crate::core::vectorize::{CandidatePolygon, Tile};
use crate::io::archive::SceneArchive;
use crate::io::export::{export_name, tile_target, ExportSink, VectorDataset};
use crate::types::{BandImage, BandStack, BoundingBox, BurnError, BurnResult, Mask, RasterGrid};

/// Everything one run produces
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub metrics: BandStack<BurnMetric>,
    pub probability: BandImage,
    pub deviations: Deviations,
    pub rules: DecisionRasters,
    /// Candidate fire mask on the analysis grid
    pub candidates: Mask,
    /// Polygons of every tile, in tile order
    pub polygons: Vec<CandidatePolygon>,
    /// Names of the datasets handed to the export sink
    pub exports: Vec<String>,
}

/// Pixel window `(row_offset, col_offset, rows, cols)` of the grid covered by `bounds`
pub fn pixel_window(grid: &RasterGrid, bounds: &BoundingBox) -> (usize, usize, usize, usize) {
    let t = &grid.transform;
    let to_index = |v: f64, limit: usize| v.max(0.0).min(limit as f64) as usize;
    let c0 = to_index(((bounds.min_x - t.top_left_x) / t.pixel_width).floor(), grid.cols);
    let c1 = to_index(((bounds.max_x - t.top_left_x) / t.pixel_width).ceil(), grid.cols);
    let r0 = to_index(((t.top_left_y - bounds.max_y) / t.pixel_height.abs()).floor(), grid.rows);
    let r1 = to_index(((t.top_left_y - bounds.min_y) / t.pixel_height.abs()).ceil(), grid.rows);
    (r0, c0, r1.saturating_sub(r0), c1.saturating_sub(c0))
}

/// Pixels whose centre lies inside `bounds`
pub fn roi_mask(grid: &RasterGrid, bounds: &BoundingBox) -> Mask {
    Mask::from_shape_fn(grid.shape(), |(r, c)| {
        let (x, y) = grid.transform.corner(c as f64 + 0.5, r as f64 + 0.5);
        x >= bounds.min_x && x < bounds.max_x && y >= bounds.min_y && y < bounds.max_y
    })
}

pub struct FirePipeline<B: ComputeBackend = DefaultBackend> {
    config: RunConfig,
    grid: RasterGrid,
    classifier: ProbabilityClassifier,
    land: LandMask,
    harmonizer: SensorHarmonizer,
    backend: B,
}

impl FirePipeline<DefaultBackend> {
    pub fn new(
        config: RunConfig,
        grid: RasterGrid,
        classifier: ProbabilityClassifier,
        land: LandMask,
    ) -> BurnResult<Self> {
        Self::with_backend(config, grid, classifier, land, DefaultBackend::default())
    }
}

impl<B: ComputeBackend> FirePipeline<B> {
    pub fn with_backend(
        config: RunConfig,
        grid: RasterGrid,
        classifier: ProbabilityClassifier,
        land: LandMask,
        backend: B,
    ) -> BurnResult<Self> {
        config.validate()?;
        if land.dim() != grid.shape() {
            return Err(BurnError::ShapeMismatch {
                expected: grid.shape(),
                actual: land.dim(),
            });
        }
        Ok(Self {
            config,
            grid,
            classifier,
            land,
            harmonizer: SensorHarmonizer::new(),
            backend,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Acquisition window spanning the baseline seasons through the post-fire season
    fn query_window(&self) -> BurnResult<DateWindow> {
        let year = self.config.analysis_year;
        let first = self.config.season.for_year(year - BASELINE_YEARS)?;
        let last = self.config.season.for_year(year + 1)?;
        DateWindow::new(first.start, last.end)
    }

    /// Harmonized feature observations of every archive, merged and restricted to the ROI
    pub fn collect(&self, archive: &dyn SceneArchive) -> BurnResult<ObservationSet<FeatureImage>> {
        let roi = self.config.roi.bounds(&self.grid);
        let window = self.query_window()?;

        let year = self.config.analysis_year;
        let years = year - BASELINE_YEARS..=year + 1;

        let mut sets = Vec::with_capacity(LandsatArchive::ALL.len());
        for source in LandsatArchive::ALL {
            if !years.clone().any(|y| source.covers_year(y)) {
                log::debug!("{:?}: no acquisitions in {:?}, skipped", source, years);
                continue;
            }
            let scenes = archive.query(source, &roi, &window)?;
            let policy = source.mask_policy();
            let observations = scenes
                .iter()
                .map(|scene| {
                    let harmonized = self.harmonizer.harmonize(scene, policy)?;
                    IndexEngine::features(&harmonized)
                })
                .collect::<BurnResult<Vec<_>>>()?;
            log::info!("{:?}: harmonized {} scenes", source, observations.len());
            sets.push((source, ObservationSet::new(observations)));
        }
        Ok(merge_archives(sets, &roi))
    }

    /// Land-masked burn metrics and the burn-probability raster
    pub fn probability(
        &self,
        set: &ObservationSet<FeatureImage>,
    ) -> BurnResult<(BandStack<BurnMetric>, BandImage)> {
        let compositor = TemporalCompositor::new(self.grid.shape());
        let year = self.config.analysis_year;
        let season = &self.config.season;
        let pre = compositor.seasonal(set, season, year, CompositeRole::Pre)?;
        let post = compositor.seasonal(set, season, year, CompositeRole::Post)?;

        let metrics = BurnMetricCalculator::compute(&pre, &post)?;
        let metrics = BurnMetricCalculator::masked(&metrics, &self.land)?;
        let predictors = BurnMetricCalculator::predictors(&metrics)?;
        let probability = self.classifier.classify(&predictors)?;
        Ok((metrics, probability))
    }

    /// Run every stage, exporting per-tile datasets when export is enabled
    pub fn run(
        &self,
        archive: &dyn SceneArchive,
        sink: Option<&dyn ExportSink>,
    ) -> BurnResult<RunOutput> {
        let year = self.config.analysis_year;
        log::info!(
            "Detecting candidate fires for {} over ROI '{}' ({} backend)",
            year,
            self.config.roi.id(),
            self.backend.name()
        );

        let set = self.collect(archive)?;
        let (metrics, probability) = self.probability(&set)?;

        let deviations = DeviationDetector::new(self.grid.shape(), self.config.season)
            .detect(&set, year, &self.land)?;

        let fusion = RuleFusion::new(self.config.rule_thresholds);
        let rules = fusion.decisions(&probability, &deviations)?;
        let mut candidates = fusion.candidate_mask(&rules, &self.land)?;
        let roi = self.config.roi.bounds(&self.grid);
        let inside = roi_mask(&self.grid, &roi);
        ndarray::Zip::from(&mut candidates)
            .and(&inside)
            .for_each(|c, &i| *c = *c && i);

        let (polygons, exports) = self.vectorize_and_export(&candidates, &roi, sink)?;
        log::info!(
            "{} candidate polygons in {} exported datasets",
            polygons.len(),
            exports.len()
        );

        Ok(RunOutput {
            metrics,
            probability,
            deviations,
            rules,
            candidates,
            polygons,
            exports,
        })
    }

    fn vectorize_and_export(
        &self,
        candidates: &Mask,
        roi: &BoundingBox,
        sink: Option<&dyn ExportSink>,
    ) -> BurnResult<(Vec<CandidatePolygon>, Vec<String>)> {
        let vectorizer = self.config.vectorizer();
        let (mask, grid) = vectorizer.resample(candidates, &self.grid)?;
        let (row_offset, col_offset, rows, cols) = pixel_window(&grid, roi);
        let tiles = self
            .config
            .tile_grid
            .tiles_within(row_offset, col_offset, (rows, cols));
        if tiles.is_empty() {
            log::warn!("ROI '{}' does not overlap the analysis grid", self.config.roi.id());
        }

        let sink = if self.config.export_enabled { sink } else { None };
        let year = self.config.analysis_year;
        let roi_id = self.config.roi.id();

        let per_tile = self.backend.map_tiles(&tiles, |tile: &Tile| {
            let polygons = vectorizer.vectorize_tile(&mask, &grid, tile)?;
            let mut exported = None;
            if let Some(sink) = sink {
                if polygons.is_empty() {
                    log::warn!("Tile {} of '{}' has no candidate polygons", tile.index, roi_id);
                }
                let name = export_name(
                    year,
                    &tile_target(roi_id, tile.index),
                    vectorizer.pixel_filter,
                    vectorizer.resolution_m,
                );
                sink.export(&VectorDataset {
                    name: name.clone(),
                    features: polygons.clone(),
                })?;
                exported = Some(name);
            }
            Ok((polygons, exported))
        })?;

        let mut polygons = Vec::new();
        let mut exports = Vec::new();
        for (tile_polygons, name) in per_tile {
            polygons.extend(tile_polygons);
            exports.extend(name);
        }
        Ok((polygons, exports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoiMode;
    use crate::core::classifier::{DecisionTree, ForestConfig, RandomForest, TreeNode};
    use crate::core::harmonize::RawScene;
    use crate::types::GeoTransform;
    use std::sync::Mutex;

    /// Records which archives were queried
    #[derive(Default)]
    struct RecordingArchive {
        queried: Mutex<Vec<LandsatArchive>>,
    }

    impl SceneArchive for RecordingArchive {
        fn query(
            &self,
            archive: LandsatArchive,
            _bounds: &BoundingBox,
            _window: &DateWindow,
        ) -> BurnResult<Vec<RawScene>> {
            if let Ok(mut queried) = self.queried.lock() {
                queried.push(archive);
            }
            Ok(Vec::new())
        }
    }

    fn constant_classifier() -> ProbabilityClassifier {
        let forest = RandomForest {
            config: ForestConfig {
                number_of_trees: 1,
                ..ForestConfig::default()
            },
            feature_names: vec!["DNBR2".into(), "DTCG".into(), "DTCB".into()],
            trees: vec![DecisionTree {
                nodes: vec![TreeNode::Leaf { value: 0.5 }],
            }],
        };
        ProbabilityClassifier::from_forest(forest).unwrap()
    }

    #[test]
    fn test_collect_skips_archives_outside_their_years() {
        let grid = RasterGrid::new(GeoTransform::north_up(0.0, 120.0, 60.0), 2, 2);
        let queried_for = |year: i32| {
            let pipeline = FirePipeline::with_backend(
                RunConfig::new(year, RoiMode::DefaultRegion),
                grid,
                constant_classifier(),
                LandMask::all_land(grid.shape()),
                crate::core::backend::SequentialBackend,
            )
            .unwrap();
            let archive = RecordingArchive::default();
            let set = pipeline.collect(&archive).unwrap();
            assert!(set.is_empty());
            let queried = archive.queried.lock().unwrap().clone();
            queried
        };

        assert_eq!(
            queried_for(2015),
            vec![
                LandsatArchive::Landsat5,
                LandsatArchive::Landsat7SlcOff,
                LandsatArchive::Landsat8
            ]
        );
        assert_eq!(
            queried_for(1988),
            vec![LandsatArchive::Landsat4, LandsatArchive::Landsat5]
        );
        assert!(queried_for(2022).contains(&LandsatArchive::Landsat9));
    }

    #[test]
    fn test_pixel_window_clamps_to_grid() {
        let grid = RasterGrid::new(GeoTransform::north_up(0.0, 600.0, 60.0), 10, 10);
        assert_eq!(pixel_window(&grid, &grid.bounds()), (0, 0, 10, 10));
        let roi = BoundingBox::new(100.0, 100.0, 250.0, 900.0);
        assert_eq!(pixel_window(&grid, &roi), (0, 1, 9, 4));
        let outside = BoundingBox::new(1000.0, 1000.0, 2000.0, 2000.0);
        let (_, _, rows, cols) = pixel_window(&grid, &outside);
        assert_eq!(rows * cols, 0);
    }

    #[test]
    fn test_roi_mask_uses_pixel_centres() {
        let grid = RasterGrid::new(GeoTransform::north_up(0.0, 120.0, 60.0), 2, 2);
        let mask = roi_mask(&grid, &BoundingBox::new(0.0, 0.0, 40.0, 120.0));
        assert_eq!(mask, ndarray::array![[true, false], [true, false]]);
    }
}
