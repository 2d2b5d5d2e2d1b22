use crate::types::{BandImage, BandKey, BandStack, BurnError, BurnResult, Mask, NODATA};
use ndarray::{Array2, Zip};

/// Default permanent-water occurrence (percent) at or above which a pixel is water
pub const DEFAULT_WATER_OCCURRENCE: f32 = 90.0;

/// Land, non-permanent-water pixels of the analysis grid
#[derive(Debug, Clone, PartialEq)]
pub struct LandMask {
    valid: Mask,
}

impl LandMask {
    /// Wrap a precomputed validity raster (true = land and not water)
    pub fn new(valid: Mask) -> Self {
        Self { valid }
    }

    /// Every pixel valid
    pub fn all_land(shape: (usize, usize)) -> Self {
        Self::new(Array2::from_elem(shape, true))
    }

    /// Build from a surface-water occurrence raster and a rasterized shoreline.
    ///
    /// `occurrence` is the percentage of time a pixel was water; no-data
    /// occurrence counts as never water. `land` is true inside the shoreline.
    pub fn from_reference(
        occurrence: &BandImage,
        land: &Mask,
        water_threshold: f32,
    ) -> BurnResult<Self> {
        if occurrence.dim() != land.dim() {
            return Err(BurnError::ShapeMismatch {
                expected: land.dim(),
                actual: occurrence.dim(),
            });
        }
        let mut valid = land.clone();
        Zip::from(&mut valid)
            .and(occurrence)
            .for_each(|v, &occ| *v = *v && (occ.is_nan() || occ < water_threshold));

        let masked = valid.iter().filter(|v| !**v).count();
        log::info!(
            "Land mask: {} of {} pixels excluded as ocean or permanent water",
            masked,
            valid.len()
        );
        Ok(Self { valid })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.valid.dim()
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[[row, col]]
    }

    pub fn as_mask(&self) -> &Mask {
        &self.valid
    }

    fn check_shape(&self, shape: (usize, usize)) -> BurnResult<()> {
        if shape != self.dim() {
            return Err(BurnError::ShapeMismatch {
                expected: self.dim(),
                actual: shape,
            });
        }
        Ok(())
    }

    /// Shape-checked by the callers
    fn mask_band(&self, band: &BandImage) -> BandImage {
        let mut out = band.clone();
        Zip::from(&mut out).and(&self.valid).for_each(|v, &ok| {
            if !ok {
                *v = NODATA;
            }
        });
        out
    }

    /// Set pixels outside the mask to no-data
    pub fn apply(&self, band: &BandImage) -> BurnResult<BandImage> {
        self.check_shape(band.dim())?;
        Ok(self.mask_band(band))
    }

    /// [`apply`](Self::apply) over every band
    pub fn apply_stack<K: BandKey>(&self, stack: &BandStack<K>) -> BurnResult<BandStack<K>> {
        self.check_shape(stack.dim())?;
        BandStack::from_fn(|key: K| self.mask_band(stack.band(key)))
    }

    /// Clear decisions outside the mask
    pub fn apply_decision(&self, decision: &Mask) -> BurnResult<Mask> {
        self.check_shape(decision.dim())?;
        let mut out = decision.clone();
        Zip::from(&mut out)
            .and(&self.valid)
            .for_each(|v, &ok| *v = *v && ok);
        Ok(out)
    }
}
