//! tundraburn: candidate tundra wildfire detection from multi-decade Landsat imagery
//!
//! Harmonizes Landsat 4-9 surface reflectance into one canonical band set,
//! derives spectral indices and seasonal composites, and combines a pretrained
//! burn-probability classifier with multi-year deviation rules into a
//! candidate fire mask that is polygonized tile by tile for export.

pub mod types;
pub mod core;
pub mod io;
pub mod config;
pub mod pipeline;
pub mod palette;

// Re-export main types and functions for easier access
pub use types::{
    BandImage, BandKey, BandStack, BoundingBox, BurnError, BurnResult, CanonicalBand,
    GeoTransform, Mask, Observation, PixelValue, RasterGrid, Sensor, NODATA,
};

pub use config::{RoiMode, RunConfig};
pub use pipeline::{FirePipeline, RunOutput};
pub use io::{ExportSink, GeoJsonFolderSink, MemoryArchive, MemorySink, SceneArchive};
