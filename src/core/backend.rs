use crate::core::vectorize::Tile;
use crate::types::BurnResult;

/// Evaluates per-tile work.
///
/// Tile results are returned in tile order whatever the evaluation order.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn map_tiles<T, F>(&self, tiles: &[Tile], f: F) -> BurnResult<Vec<T>>
    where
        T: Send,
        F: Fn(&Tile) -> BurnResult<T> + Send + Sync;
}

/// One tile after another on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialBackend;

impl ComputeBackend for SequentialBackend {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn map_tiles<T, F>(&self, tiles: &[Tile], f: F) -> BurnResult<Vec<T>>
    where
        T: Send,
        F: Fn(&Tile) -> BurnResult<T> + Send + Sync,
    {
        tiles.iter().map(f).collect()
    }
}

/// Tiles spread over the rayon thread pool
#[cfg(feature = "parallel")]
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonBackend;

#[cfg(feature = "parallel")]
impl ComputeBackend for RayonBackend {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn map_tiles<T, F>(&self, tiles: &[Tile], f: F) -> BurnResult<Vec<T>>
    where
        T: Send,
        F: Fn(&Tile) -> BurnResult<T> + Send + Sync,
    {
        use rayon::prelude::*;
        tiles.par_iter().map(f).collect()
    }
}

#[cfg(feature = "parallel")]
pub type DefaultBackend = RayonBackend;

#[cfg(not(feature = "parallel"))]
pub type DefaultBackend = SequentialBackend;
