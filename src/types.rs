use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Surface reflectance or derived index value
pub type PixelValue = f32;

/// 2D single-band raster (rows x cols)
pub type BandImage = Array2<PixelValue>;

/// 2D boolean raster
pub type Mask = Array2<bool>;

/// Sentinel for pixels without a valid observation.
///
/// Arithmetic on it yields no-data again and every comparison against it is
/// false, so a decision raster never turns a no-data pixel into a candidate.
pub const NODATA: PixelValue = f32::NAN;

/// Returns true when the pixel carries no valid value
#[inline]
pub fn is_nodata(value: PixelValue) -> bool {
    !value.is_finite()
}

/// Narrow a computed value to single precision, mapping non-finite results to no-data
#[inline]
pub fn finite_or_nodata(value: f64) -> PixelValue {
    if value.is_finite() {
        value as PixelValue
    } else {
        NODATA
    }
}

/// Landsat sensor families covered by the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    Landsat4,
    Landsat5,
    Landsat7,
    Landsat8,
    Landsat9,
}

impl Sensor {
    /// Band layout of the Collection-2 surface reflectance product
    pub fn band_layout(&self) -> BandLayout {
        match self {
            Sensor::Landsat4 | Sensor::Landsat5 | Sensor::Landsat7 => BandLayout::Legacy,
            Sensor::Landsat8 | Sensor::Landsat9 => BandLayout::Oli,
        }
    }

    /// Parse a spacecraft identifier such as `LANDSAT_8` or a product prefix such as `LC08`
    pub fn from_identifier(id: &str) -> Option<Self> {
        let id = id.trim().to_uppercase();
        match id.as_str() {
            "LANDSAT_4" | "LT04" | "LM04" => Some(Sensor::Landsat4),
            "LANDSAT_5" | "LT05" | "LM05" => Some(Sensor::Landsat5),
            "LANDSAT_7" | "LE07" => Some(Sensor::Landsat7),
            "LANDSAT_8" | "LC08" => Some(Sensor::Landsat8),
            "LANDSAT_9" | "LC09" => Some(Sensor::Landsat9),
            _ => None,
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sensor::Landsat4 => write!(f, "LT04"),
            Sensor::Landsat5 => write!(f, "LT05"),
            Sensor::Landsat7 => write!(f, "LE07"),
            Sensor::Landsat8 => write!(f, "LC08"),
            Sensor::Landsat9 => write!(f, "LC09"),
        }
    }
}

/// Raw band naming of a sensor family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandLayout {
    /// TM / ETM+: SR_B1..SR_B5, SR_B7
    Legacy,
    /// OLI: SR_B2..SR_B7
    Oli,
}

/// Geospatial bounding box in the analysis grid's CRS units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    /// True when the box encloses a non-zero area
    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.max_x > self.min_x
            && self.max_y > self.min_y
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

/// Geospatial transformation parameters (north-up grids only)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub top_left_y: f64,
    /// Negative for north-up grids
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            top_left_y,
            pixel_height: -pixel_size,
        }
    }

    /// Map coordinate of a pixel corner (col, row may run one past the last pixel)
    pub fn corner(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.top_left_x + col * self.pixel_width,
            self.top_left_y + row * self.pixel_height,
        )
    }

    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }
}

/// Analysis grid every harmonized raster is co-registered to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterGrid {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
}

impl RasterGrid {
    pub fn new(transform: GeoTransform, rows: usize, cols: usize) -> Self {
        Self { transform, rows, cols }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn bounds(&self) -> BoundingBox {
        let (x0, y0) = self.transform.corner(0.0, 0.0);
        let (x1, y1) = self.transform.corner(self.cols as f64, self.rows as f64);
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// Strongly-typed band identifier of a fixed band schema
pub trait BandKey: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Every band of the schema, in storage order
    const ALL: &'static [Self];

    /// Storage position of the band
    fn position(self) -> usize;

    /// Output band name
    fn name(self) -> &'static str;
}

/// The seven bands common to every harmonized sensor output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalBand {
    Blue,
    Green,
    Red,
    Nir,
    /// Short-wave infrared 1 (~1.6 um)
    Sswir,
    /// Short-wave infrared 2 (~2.2 um)
    Lswir,
    Qa,
}

impl CanonicalBand {
    /// The six reflective bands, excluding QA
    pub const REFLECTIVE: [CanonicalBand; 6] = [
        CanonicalBand::Blue,
        CanonicalBand::Green,
        CanonicalBand::Red,
        CanonicalBand::Nir,
        CanonicalBand::Sswir,
        CanonicalBand::Lswir,
    ];
}

impl BandKey for CanonicalBand {
    const ALL: &'static [Self] = &[
        CanonicalBand::Blue,
        CanonicalBand::Green,
        CanonicalBand::Red,
        CanonicalBand::Nir,
        CanonicalBand::Sswir,
        CanonicalBand::Lswir,
        CanonicalBand::Qa,
    ];

    fn position(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            CanonicalBand::Blue => "blue",
            CanonicalBand::Green => "green",
            CanonicalBand::Red => "red",
            CanonicalBand::Nir => "nir",
            CanonicalBand::Sswir => "sswir",
            CanonicalBand::Lswir => "lswir",
            CanonicalBand::Qa => "qa",
        }
    }
}

/// Fixed-schema multi-band raster; every band has the same shape
#[derive(Debug, Clone, PartialEq)]
pub struct BandStack<K: BandKey> {
    bands: Vec<BandImage>,
    _schema: PhantomData<K>,
}

impl<K: BandKey> BandStack<K> {
    /// Build from bands given in schema order
    pub fn from_bands(bands: Vec<BandImage>) -> BurnResult<Self> {
        if bands.len() != K::ALL.len() {
            return Err(BurnError::Schema(format!(
                "expected {} bands, got {}",
                K::ALL.len(),
                bands.len()
            )));
        }
        let shape = bands[0].dim();
        if let Some(bad) = bands.iter().position(|b| b.dim() != shape) {
            return Err(BurnError::ShapeMismatch {
                expected: shape,
                actual: bands[bad].dim(),
            });
        }
        Ok(Self { bands, _schema: PhantomData })
    }

    /// Build from name-keyed bands; every schema band must be present
    pub fn from_named(mut named: HashMap<String, BandImage>) -> BurnResult<Self> {
        let mut bands = Vec::with_capacity(K::ALL.len());
        for key in K::ALL {
            let band = named.remove(key.name()).ok_or_else(|| {
                BurnError::Schema(format!("missing band '{}'", key.name()))
            })?;
            bands.push(band);
        }
        Self::from_bands(bands)
    }

    /// Build by evaluating one closure per band
    pub fn from_fn(mut f: impl FnMut(K) -> BandImage) -> BurnResult<Self> {
        Self::from_bands(K::ALL.iter().map(|&k| f(k)).collect())
    }

    /// Every band filled with one constant
    pub fn filled(shape: (usize, usize), value: PixelValue) -> Self {
        Self {
            bands: K::ALL.iter().map(|_| Array2::from_elem(shape, value)).collect(),
            _schema: PhantomData,
        }
    }

    /// Full band set with every pixel no-data
    pub fn no_data(shape: (usize, usize)) -> Self {
        Self::filled(shape, NODATA)
    }

    pub fn band(&self, key: K) -> &BandImage {
        &self.bands[key.position()]
    }

    pub fn band_mut(&mut self, key: K) -> &mut BandImage {
        &mut self.bands[key.position()]
    }

    pub fn dim(&self) -> (usize, usize) {
        self.bands[0].dim()
    }

    pub fn band_names(&self) -> Vec<&'static str> {
        K::ALL.iter().map(|k| k.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &BandImage)> {
        K::ALL.iter().copied().zip(self.bands.iter())
    }

    /// Combine two stacks band by band, pixel by pixel
    pub fn zip_pixels(
        &self,
        other: &Self,
        f: impl Fn(PixelValue, PixelValue) -> PixelValue,
    ) -> BurnResult<Self> {
        if self.dim() != other.dim() {
            return Err(BurnError::ShapeMismatch {
                expected: self.dim(),
                actual: other.dim(),
            });
        }
        let bands = self
            .bands
            .iter()
            .zip(other.bands.iter())
            .map(|(a, b)| {
                let mut out = a.clone();
                ndarray::Zip::from(&mut out).and(b).for_each(|x, &y| *x = f(*x, y));
                out
            })
            .collect();
        Ok(Self { bands, _schema: PhantomData })
    }

    /// Number of pixels with a valid value in the given band
    pub fn valid_count(&self, key: K) -> usize {
        self.band(key).iter().filter(|v| !is_nodata(**v)).count()
    }
}

/// Types carrying a fixed band schema
pub trait HasBands<K: BandKey> {
    fn bands(&self) -> &BandStack<K>;
}

impl<K: BandKey> HasBands<K> for BandStack<K> {
    fn bands(&self) -> &BandStack<K> {
        self
    }
}

/// One dated acquisition on the analysis grid
#[derive(Debug, Clone)]
pub struct Observation<P> {
    pub product_id: String,
    pub sensor: Sensor,
    pub acquired: NaiveDate,
    pub footprint: BoundingBox,
    pub image: P,
}

impl<P> Observation<P> {
    /// Replace the payload keeping identity, timestamp and footprint
    pub fn with_image<Q>(&self, image: Q) -> Observation<Q> {
        Observation {
            product_id: self.product_id.clone(),
            sensor: self.sensor,
            acquired: self.acquired,
            footprint: self.footprint,
            image,
        }
    }
}

/// Error types for burn detection
#[derive(Debug, thiserror::Error)]
pub enum BurnError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Band schema violation: {0}")]
    Schema(String),

    #[error("Raster shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Export error: {0}")]
    Export(String),
}

/// Result type for burn detection operations
pub type BurnResult<T> = Result<T, BurnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_named_requires_every_band() {
        let mut named = HashMap::new();
        for band in CanonicalBand::REFLECTIVE {
            named.insert(band.name().to_string(), Array2::zeros((2, 2)));
        }
        let err = BandStack::<CanonicalBand>::from_named(named).unwrap_err();
        assert!(matches!(err, BurnError::Schema(ref msg) if msg.contains("qa")));
    }

    #[test]
    fn test_from_bands_rejects_ragged_shapes() {
        let mut bands: Vec<BandImage> = (0..7).map(|_| Array2::zeros((3, 3))).collect();
        bands[4] = Array2::zeros((3, 4));
        let err = BandStack::<CanonicalBand>::from_bands(bands).unwrap_err();
        assert!(matches!(err, BurnError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_no_data_stack_keeps_band_names() {
        let stack = BandStack::<CanonicalBand>::no_data((4, 5));
        assert_eq!(stack.band_names(), vec!["blue", "green", "red", "nir", "sswir", "lswir", "qa"]);
        assert_eq!(stack.valid_count(CanonicalBand::Nir), 0);
    }

    #[test]
    fn test_grid_bounds() {
        let grid = RasterGrid::new(GeoTransform::north_up(1000.0, 5000.0, 60.0), 10, 20);
        let bounds = grid.bounds();
        assert_eq!(bounds, BoundingBox::new(1000.0, 4400.0, 2200.0, 5000.0));
        assert!(bounds.intersects(&BoundingBox::new(2100.0, 4900.0, 3000.0, 6000.0)));
        assert!(!bounds.intersects(&BoundingBox::new(2200.0, 4400.0, 3000.0, 6000.0)));
    }
}
