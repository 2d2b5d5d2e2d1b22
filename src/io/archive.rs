use crate::core::collection::{DateWindow, LandsatArchive};
use crate::core::harmonize::RawScene;
use crate::io::metadata::SceneMetadata;
use crate::types::{BoundingBox, BurnResult};
use ndarray::Array2;
use std::collections::HashMap;

/// Source of raw scenes, queried per sensor archive
pub trait SceneArchive: Send + Sync {
    /// Scenes of one archive intersecting `bounds` and acquired within `window`
    fn query(
        &self,
        archive: LandsatArchive,
        bounds: &BoundingBox,
        window: &DateWindow,
    ) -> BurnResult<Vec<RawScene>>;
}

/// Archive backed by scenes already in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    scenes: Vec<RawScene>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scene: RawScene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl FromIterator<RawScene> for MemoryArchive {
    fn from_iter<I: IntoIterator<Item = RawScene>>(iter: I) -> Self {
        Self {
            scenes: iter.into_iter().collect(),
        }
    }
}

impl SceneArchive for MemoryArchive {
    fn query(
        &self,
        archive: LandsatArchive,
        bounds: &BoundingBox,
        window: &DateWindow,
    ) -> BurnResult<Vec<RawScene>> {
        Ok(self
            .scenes
            .iter()
            .filter(|s| LandsatArchive::for_scene(s.sensor, s.acquired) == archive)
            .filter(|s| s.footprint.intersects(bounds) && window.contains(s.acquired))
            .cloned()
            .collect())
    }
}

/// Raw scene from parsed metadata and grid-aligned band data
pub fn scene_from_metadata(
    metadata: &SceneMetadata,
    bands: HashMap<String, Array2<u16>>,
) -> RawScene {
    RawScene {
        product_id: metadata.product_id.clone(),
        sensor: metadata.sensor,
        acquired: metadata.acquired,
        footprint: metadata.footprint,
        bands,
    }
}
