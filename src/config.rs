//! Run configuration

use crate::core::collection::SeasonWindow;
use crate::core::deviation::BASELINE_YEARS;
use crate::core::fusion::RuleThresholds;
use crate::core::vectorize::{Connectivity, TileGrid, Vectorizer, DEFAULT_RESOLUTION_M};
use crate::types::{BoundingBox, BurnError, BurnResult, RasterGrid};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// First and last analysis years with pre- and post-fire seasons on record
pub const FIRST_ANALYSIS_YEAR: i32 = 1985;
pub const LAST_ANALYSIS_YEAR: i32 = 2023;

/// Identifier used for the default region
pub const DEFAULT_REGION_ID: &str = "default";

/// Region of interest selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoiMode {
    /// User-drawn rectangle in grid CRS units
    Drawn { id: String, bounds: BoundingBox },
    /// The full analysis grid
    DefaultRegion,
}

impl RoiMode {
    pub fn id(&self) -> &str {
        match self {
            RoiMode::Drawn { id, .. } => id,
            RoiMode::DefaultRegion => DEFAULT_REGION_ID,
        }
    }

    pub fn bounds(&self, grid: &RasterGrid) -> BoundingBox {
        match self {
            RoiMode::Drawn { bounds, .. } => *bounds,
            RoiMode::DefaultRegion => grid.bounds(),
        }
    }
}

fn default_pixel_filter() -> usize {
    1
}

fn default_resolution() -> f64 {
    DEFAULT_RESOLUTION_M
}

fn default_true() -> bool {
    true
}

/// Immutable settings of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub analysis_year: i32,
    pub roi: RoiMode,
    #[serde(default)]
    pub export_enabled: bool,
    /// Minimum pixel count of an exported polygon
    #[serde(default = "default_pixel_filter")]
    pub pixel_filter: usize,
    #[serde(default = "default_resolution")]
    pub resolution_m: f64,
    #[serde(default)]
    pub tile_grid: TileGrid,
    #[serde(default = "default_true")]
    pub eight_connected: bool,
    #[serde(default)]
    pub rule_thresholds: RuleThresholds,
    #[serde(default)]
    pub season: SeasonWindow,
}

impl RunConfig {
    pub fn new(analysis_year: i32, roi: RoiMode) -> Self {
        Self {
            analysis_year,
            roi,
            export_enabled: false,
            pixel_filter: default_pixel_filter(),
            resolution_m: DEFAULT_RESOLUTION_M,
            tile_grid: TileGrid::default(),
            eight_connected: true,
            rule_thresholds: RuleThresholds::default(),
            season: SeasonWindow::default(),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> BurnResult<Self> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> BurnResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loading run configuration from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> BurnResult<()> {
        if !(FIRST_ANALYSIS_YEAR..=LAST_ANALYSIS_YEAR).contains(&self.analysis_year) {
            return Err(BurnError::Config(format!(
                "analysis year {} outside {}..={}",
                self.analysis_year, FIRST_ANALYSIS_YEAR, LAST_ANALYSIS_YEAR
            )));
        }
        if let RoiMode::Drawn { id, bounds } = &self.roi {
            if id.is_empty()
                || !id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(BurnError::Config(format!(
                    "ROI id '{}' must be non-empty and use only letters, digits, '-' or '_'",
                    id
                )));
            }
            if !bounds.is_valid() {
                return Err(BurnError::Config(format!("empty ROI bounds {:?}", bounds)));
            }
        }
        if self.tile_grid.is_empty() {
            return Err(BurnError::Config("tile grid has no tiles".into()));
        }
        if !(self.resolution_m.is_finite() && self.resolution_m > 0.0) {
            return Err(BurnError::Config(format!(
                "export resolution {} must be positive",
                self.resolution_m
            )));
        }
        for year in [self.analysis_year - BASELINE_YEARS, self.analysis_year + 1] {
            self.season.for_year(year)?;
        }
        Ok(())
    }

    pub fn connectivity(&self) -> Connectivity {
        if self.eight_connected {
            Connectivity::Eight
        } else {
            Connectivity::Four
        }
    }

    pub fn vectorizer(&self) -> Vectorizer {
        Vectorizer {
            connectivity: self.connectivity(),
            pixel_filter: self.pixel_filter,
            resolution_m: self.resolution_m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config = RunConfig::from_json_str(
            r#"{"analysis_year": 2015, "roi": {"mode": "default_region"}}"#,
        )
        .unwrap();
        assert_eq!(config, RunConfig::new(2015, RoiMode::DefaultRegion));
        assert_eq!(config.tile_grid, TileGrid::new(4, 4));
        assert_eq!(config.connectivity(), Connectivity::Eight);
    }

    #[test]
    fn test_drawn_roi() {
        let config = RunConfig::from_json_str(
            r#"{
                "analysis_year": 2007,
                "roi": {"mode": "drawn", "id": "anaktuvuk",
                        "bounds": {"min_x": 0, "max_x": 10, "min_y": 0, "max_y": 5}},
                "export_enabled": true,
                "pixel_filter": 3
            }"#,
        )
        .unwrap();
        assert_eq!(config.roi.id(), "anaktuvuk");
        assert!(config.export_enabled);
        assert_eq!(config.vectorizer().pixel_filter, 3);
    }

    #[test]
    fn test_default_region_covers_grid() {
        let grid = RasterGrid::new(GeoTransform::north_up(0.0, 600.0, 60.0), 10, 10);
        assert_eq!(
            RoiMode::DefaultRegion.bounds(&grid),
            BoundingBox::new(0.0, 0.0, 600.0, 600.0)
        );
        assert_eq!(RoiMode::DefaultRegion.id(), DEFAULT_REGION_ID);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        assert!(RunConfig::new(1984, RoiMode::DefaultRegion).validate().is_err());
        assert!(RunConfig::new(2024, RoiMode::DefaultRegion).validate().is_err());
        assert!(RunConfig::new(1985, RoiMode::DefaultRegion).validate().is_ok());

        let flat = RoiMode::Drawn {
            id: "x".into(),
            bounds: BoundingBox::new(0.0, 0.0, 10.0, 0.0),
        };
        assert!(RunConfig::new(2000, flat).validate().is_err());

        let slashed = RoiMode::Drawn {
            id: "../x".into(),
            bounds: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        };
        assert!(RunConfig::new(2000, slashed).validate().is_err());

        let mut config = RunConfig::new(2000, RoiMode::DefaultRegion);
        config.tile_grid = TileGrid::new(0, 4);
        assert!(config.validate().is_err());
        config.tile_grid = TileGrid::default();
        config.resolution_m = 0.0;
        assert!(config.validate().is_err());
    }
}
