//! Candidate mask polygonization
//!
//! The mask is resampled to the export resolution and cut into a regular
//! grid of tiles. Within each tile, connected true pixels are labelled and
//! the outline of every component is traced along pixel edges into a
//! polygon whose exterior runs counter-clockwise and whose holes run
//! clockwise.

use crate::types::{BurnError, BurnResult, GeoTransform, Mask, RasterGrid};
use geo::{Coord, LineString, Polygon};
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Export ground sampling distance in grid units
pub const DEFAULT_RESOLUTION_M: f64 = 60.0;

/// Pixel neighbourhood that makes two true pixels contiguous
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Edge neighbours only
    Four,
    /// Edge and corner neighbours
    Eight,
}

impl Connectivity {
    fn offsets(&self) -> &'static [(isize, isize)] {
        const D4: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
        const D8: [(isize, isize); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        match self {
            Connectivity::Four => &D4,
            Connectivity::Eight => &D8,
        }
    }
}

/// Regular partition of the ROI into `rows x cols` tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    pub rows: usize,
    pub cols: usize,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self { rows: 4, cols: 4 }
    }
}

/// A rectangular window of the analysis grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Row-major position in the tile grid
    pub index: usize,
    pub row_offset: usize,
    pub col_offset: usize,
    pub rows: usize,
    pub cols: usize,
}

impl TileGrid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tiles covering a raster of the given shape
    pub fn tiles(&self, shape: (usize, usize)) -> Vec<Tile> {
        self.tiles_within(0, 0, shape)
    }

    /// Tiles covering a window of a raster; empty tiles are skipped when
    /// the window has fewer pixels than the grid has tiles
    pub fn tiles_within(
        &self,
        row_offset: usize,
        col_offset: usize,
        shape: (usize, usize),
    ) -> Vec<Tile> {
        let split = |len: usize, parts: usize, i: usize| (i * len / parts, (i + 1) * len / parts);
        let mut tiles = Vec::with_capacity(self.len());
        for tr in 0..self.rows {
            let (r0, r1) = split(shape.0, self.rows, tr);
            for tc in 0..self.cols {
                let (c0, c1) = split(shape.1, self.cols, tc);
                if r1 > r0 && c1 > c0 {
                    tiles.push(Tile {
                        index: tr * self.cols + tc,
                        row_offset: row_offset + r0,
                        col_offset: col_offset + c0,
                        rows: r1 - r0,
                        cols: c1 - c0,
                    });
                }
            }
        }
        tiles
    }
}

/// Label connected true pixels starting at 1; 0 is background.
/// Returns the label raster and the pixel count of each label (index 0 unused).
pub fn label_components(mask: ArrayView2<bool>, connectivity: Connectivity) -> (Array2<u32>, Vec<usize>) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut counts = vec![0usize];
    let mut stack = Vec::new();

    for r in 0..rows {
        for c in 0..cols {
            if !mask[[r, c]] || labels[[r, c]] != 0 {
                continue;
            }
            let label = counts.len() as u32;
            let mut count = 0usize;
            labels[[r, c]] = label;
            stack.push((r, c));

            while let Some((cr, cc)) = stack.pop() {
                count += 1;
                for &(dr, dc) in connectivity.offsets() {
                    let nr = cr as isize + dr;
                    let nc = cc as isize + dc;
                    if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if mask[[nr, nc]] && labels[[nr, nc]] == 0 {
                        labels[[nr, nc]] = label;
                        stack.push((nr, nc));
                    }
                }
            }
            counts.push(count);
        }
    }
    (labels, counts)
}

/// Pixel-corner vertex: x = column, y = -row
type Vertex = (i64, i64);
type Edge = (Vertex, Vertex);

/// Directed boundary edges of one component, foreground on the left
fn boundary_edges(labels: &Array2<u32>, label: u32) -> Vec<Edge> {
    let (rows, cols) = labels.dim();
    let inside = |r: isize, c: isize| {
        r >= 0
            && c >= 0
            && (r as usize) < rows
            && (c as usize) < cols
            && labels[[r as usize, c as usize]] == label
    };

    let mut edges = Vec::new();
    for ((r, c), &l) in labels.indexed_iter() {
        if l != label {
            continue;
        }
        let (ri, ci) = (r as isize, c as isize);
        let (x, y) = (c as i64, -(r as i64));
        if !inside(ri - 1, ci) {
            edges.push(((x + 1, y), (x, y)));
        }
        if !inside(ri, ci - 1) {
            edges.push(((x, y), (x, y - 1)));
        }
        if !inside(ri + 1, ci) {
            edges.push(((x, y - 1), (x + 1, y - 1)));
        }
        if !inside(ri, ci + 1) {
            edges.push(((x + 1, y - 1), (x + 1, y)));
        }
    }
    edges
}

/// Follow edges into closed rings.
///
/// Where two rings touch at a corner the walk turns right, so diagonal
/// neighbours end up on the same ring.
fn trace_rings(edges: &[Edge]) -> BurnResult<Vec<Vec<Vertex>>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::with_capacity(edges.len());
    for (i, (from, _)) in edges.iter().enumerate() {
        outgoing.entry(*from).or_default().push(i);
    }

    let next_edge = |current: usize| -> Option<usize> {
        let (from, to) = edges[current];
        let candidates = outgoing.get(&to)?;
        if candidates.len() == 1 {
            return Some(candidates[0]);
        }
        let right = (to.1 - from.1, from.0 - to.0);
        candidates.iter().copied().find(|&i| {
            let (s, e) = edges[i];
            (e.0 - s.0, e.1 - s.1) == right
        })
    };

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut ring = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            ring.push(edges[current].0);
            match next_edge(current) {
                Some(next) if next == start => break,
                Some(next) if !used[next] => current = next,
                _ => {
                    return Err(BurnError::Processing(format!(
                        "open boundary at vertex {:?}",
                        edges[current].1
                    )))
                }
            }
        }
        rings.push(drop_collinear(ring));
    }
    Ok(rings)
}

fn drop_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    let direction = |a: Vertex, b: Vertex| ((b.0 - a.0).signum(), (b.1 - a.1).signum());
    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let next = ring[(i + 1) % n];
            direction(prev, ring[i]) != direction(ring[i], next)
        })
        .map(|i| ring[i])
        .collect()
}

/// Twice the signed ring area; positive for counter-clockwise rings
fn doubled_area(ring: &[Vertex]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum()
}

/// One vectorized component
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePolygon {
    /// Component id within its tile
    pub label: u32,
    /// Contiguous pixel count
    pub count: usize,
    pub area_m2: f64,
    /// Tile index
    pub tile: usize,
    pub geometry: Polygon<f64>,
}

/// Polygonizes candidate masks tile by tile
#[derive(Debug, Clone)]
pub struct Vectorizer {
    pub connectivity: Connectivity,
    /// Components with fewer pixels are dropped
    pub pixel_filter: usize,
    pub resolution_m: f64,
}

impl Default for Vectorizer {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Eight,
            pixel_filter: 1,
            resolution_m: DEFAULT_RESOLUTION_M,
        }
    }
}

impl Vectorizer {
    /// Nearest-neighbour resampling of the mask to the export resolution.
    ///
    /// The resolution must be a whole multiple of the grid's pixel size.
    pub fn resample(&self, mask: &Mask, grid: &RasterGrid) -> BurnResult<(Mask, RasterGrid)> {
        if mask.dim() != grid.shape() {
            return Err(BurnError::ShapeMismatch {
                expected: grid.shape(),
                actual: mask.dim(),
            });
        }
        let pixel = grid.transform.pixel_width.abs();
        let ratio = self.resolution_m / pixel;
        let factor = ratio.round();
        if !ratio.is_finite() || factor < 1.0 || (ratio - factor).abs() > 1e-6 {
            return Err(BurnError::Config(format!(
                "export resolution {} is not a whole multiple of the {} pixel size",
                self.resolution_m, pixel
            )));
        }
        let k = factor as usize;
        if k == 1 {
            return Ok((mask.clone(), *grid));
        }

        let rows = (grid.rows + k - 1) / k;
        let cols = (grid.cols + k - 1) / k;
        let resampled = Array2::from_shape_fn((rows, cols), |(r, c)| mask[[r * k, c * k]]);
        let transform = GeoTransform {
            top_left_x: grid.transform.top_left_x,
            pixel_width: grid.transform.pixel_width * factor,
            top_left_y: grid.transform.top_left_y,
            pixel_height: grid.transform.pixel_height * factor,
        };
        log::debug!(
            "Resampled {}x{} mask to {}x{} at {}",
            grid.rows,
            grid.cols,
            rows,
            cols,
            self.resolution_m
        );
        Ok((resampled, RasterGrid::new(transform, rows, cols)))
    }

    /// Polygons of one tile of an already resampled mask
    pub fn vectorize_tile(
        &self,
        mask: &Mask,
        grid: &RasterGrid,
        tile: &Tile,
    ) -> BurnResult<Vec<CandidatePolygon>> {
        let window = mask.slice(s![
            tile.row_offset..tile.row_offset + tile.rows,
            tile.col_offset..tile.col_offset + tile.cols
        ]);
        let (labels, counts) = label_components(window, self.connectivity);

        let mut polygons = Vec::new();
        for (label, &count) in counts.iter().enumerate().skip(1) {
            if count < self.pixel_filter {
                continue;
            }
            let label = label as u32;
            let rings = trace_rings(&boundary_edges(&labels, label))?;
            let geometry = self.assemble(rings, &grid.transform, tile)?;
            polygons.push(CandidatePolygon {
                label,
                count,
                area_m2: count as f64 * grid.transform.pixel_area(),
                tile: tile.index,
                geometry,
            });
        }

        if polygons.is_empty() {
            log::debug!("Tile {}: no candidate polygons", tile.index);
        } else {
            log::debug!("Tile {}: {} polygons", tile.index, polygons.len());
        }
        Ok(polygons)
    }

    /// Vectorize every tile in order on the calling thread
    pub fn vectorize(
        &self,
        mask: &Mask,
        grid: &RasterGrid,
        tiles: &TileGrid,
    ) -> BurnResult<Vec<Vec<CandidatePolygon>>> {
        let (mask, grid) = self.resample(mask, grid)?;
        tiles
            .tiles(grid.shape())
            .iter()
            .map(|tile| self.vectorize_tile(&mask, &grid, tile))
            .collect()
    }

    fn assemble(
        &self,
        rings: Vec<Vec<Vertex>>,
        transform: &GeoTransform,
        tile: &Tile,
    ) -> BurnResult<Polygon<f64>> {
        let to_map = |ring: &[Vertex]| -> LineString<f64> {
            ring.iter()
                .map(|&(x, y)| {
                    let col = tile.col_offset as f64 + x as f64;
                    let row = tile.row_offset as f64 - y as f64;
                    let (mx, my) = transform.corner(col, row);
                    Coord { x: mx, y: my }
                })
                .collect::<Vec<_>>()
                .into()
        };

        let mut exterior: Option<Vec<Vertex>> = None;
        let mut holes = Vec::new();
        for ring in rings {
            if doubled_area(&ring) > 0 {
                if exterior.is_some() {
                    return Err(BurnError::Processing(
                        "component traced into more than one exterior ring".into(),
                    ));
                }
                exterior = Some(ring);
            } else {
                holes.push(to_map(&ring));
            }
        }
        let exterior = exterior
            .ok_or_else(|| BurnError::Processing("component has no exterior ring".into()))?;
        Ok(Polygon::new(to_map(&exterior), holes))
    }
}
