//! Vector export of candidate fire polygons
//!
//! Every tile becomes one named dataset. Names follow
//! `candidateFires__<year>__<target>_<pixelFilter>px<resolution>m`, where the
//! target is the ROI id, suffixed with the tile index for tiled exports.

use crate::core::vectorize::CandidatePolygon;
use crate::types::{BurnError, BurnResult};
use geo::{LineString, Polygon};
use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Dataset name for one export
pub fn export_name(year: i32, target: &str, pixel_filter: usize, resolution_m: f64) -> String {
    format!(
        "candidateFires__{}__{}_{}px{}m",
        year, target, pixel_filter, resolution_m
    )
}

/// Export target of one tile of an ROI
pub fn tile_target(roi_id: &str, tile_index: usize) -> String {
    format!("{}-t{:02}", roi_id, tile_index)
}

/// A named set of polygons ready for export
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDataset {
    pub name: String,
    pub features: Vec<CandidatePolygon>,
}

fn ring_coordinates(ring: &LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

fn polygon_coordinates(polygon: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors().iter())
        .map(ring_coordinates)
        .collect()
}

impl VectorDataset {
    /// GeoJSON FeatureCollection
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self
            .features
            .iter()
            .map(|f| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": polygon_coordinates(&f.geometry),
                    },
                    "properties": {
                        "label": f.label,
                        "count": f.count,
                        "area_m2": f.area_m2,
                        "tile": f.tile,
                    },
                })
            })
            .collect();
        json!({
            "type": "FeatureCollection",
            "name": self.name,
            "features": features,
        })
    }
}

/// Destination of exported datasets; may be called concurrently per tile
pub trait ExportSink: Send + Sync {
    fn export(&self, dataset: &VectorDataset) -> BurnResult<()>;
}

/// Writes `<name>.geojson` files into a folder, never overwriting
#[derive(Debug, Clone)]
pub struct GeoJsonFolderSink {
    folder: PathBuf,
}

impl GeoJsonFolderSink {
    pub fn new<P: AsRef<Path>>(folder: P) -> BurnResult<Self> {
        fs::create_dir_all(folder.as_ref())?;
        Ok(Self {
            folder: folder.as_ref().to_path_buf(),
        })
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.folder.join(format!("{}.geojson", name))
    }
}

impl ExportSink for GeoJsonFolderSink {
    fn export(&self, dataset: &VectorDataset) -> BurnResult<()> {
        let path = self.path_for(&dataset.name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    BurnError::Export(format!("{} already exists", path.display()))
                }
                _ => BurnError::Io(e),
            })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &dataset.to_geojson())?;
        writer.flush()?;
        log::info!(
            "Exported {} polygons to {}",
            dataset.features.len(),
            path.display()
        );
        Ok(())
    }
}

/// Keeps exported datasets in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    datasets: Mutex<Vec<VectorDataset>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exported datasets sorted by name
    pub fn datasets(&self) -> BurnResult<Vec<VectorDataset>> {
        let mut datasets = self
            .datasets
            .lock()
            .map_err(|_| BurnError::Export("memory sink lock poisoned".into()))?
            .clone();
        datasets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(datasets)
    }
}

impl ExportSink for MemorySink {
    fn export(&self, dataset: &VectorDataset) -> BurnResult<()> {
        let mut datasets = self
            .datasets
            .lock()
            .map_err(|_| BurnError::Export("memory sink lock poisoned".into()))?;
        if datasets.iter().any(|d| d.name == dataset.name) {
            return Err(BurnError::Export(format!("{} already exported", dataset.name)));
        }
        datasets.push(dataset.clone());
        Ok(())
    }
}
