//! Spectral indices
//!
//! Fixed catalog of single-band indices computed from the canonical
//! reflectance bands of one harmonized observation. Every index is a pure
//! per-pixel function; a pixel that is no-data in any input band, or whose
//! formula has no finite value (zero denominator, negative root), is no-data
//! in the output.

use crate::types::{
    finite_or_nodata, BandImage, BandKey, BandStack, BurnResult, CanonicalBand, HasBands,
    Observation, PixelValue,
};
use ndarray::Array2;

/// Tasseled-cap coefficients over (blue, green, red, nir, sswir, lswir),
/// one universal set for every sensor
pub const TC_BRIGHTNESS: [f64; 6] = [0.2043, 0.4158, 0.5524, 0.5741, 0.3124, 0.2303];
pub const TC_GREENNESS: [f64; 6] = [-0.1603, -0.2819, -0.4934, 0.7940, -0.0002, -0.1446];
pub const TC_WETNESS: [f64; 6] = [0.0315, 0.2021, 0.3102, 0.1594, -0.6806, -0.6109];

/// Spectral index catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectralIndex {
    /// Normalized Burn Ratio (nir, lswir)
    Nbr,
    /// Normalized Burn Ratio 2 (sswir, lswir)
    Nbr2,
    /// Normalized Difference Vegetation Index (nir, red)
    Ndvi,
    /// Normalized Difference Moisture Index (nir, sswir)
    Ndmi,
    /// Normalized Difference Water Index (green, nir)
    Ndwi,
    /// Enhanced Vegetation Index
    Evi,
    /// Mid-Infrared Burn Index
    Mirbi,
    /// Burned Area Index
    Bai,
    /// Modified Burned Area Index
    Baims,
    /// Char Soil Index
    Csi,
    /// Bare Soil Index
    Bsi,
    /// Modified Soil Adjusted Vegetation Index
    Msavi,
    /// Tasseled-cap brightness
    Tcb,
    /// Tasseled-cap greenness
    Tcg,
    /// Tasseled-cap wetness
    Tcw,
}

impl BandKey for SpectralIndex {
    const ALL: &'static [Self] = &[
        SpectralIndex::Nbr,
        SpectralIndex::Nbr2,
        SpectralIndex::Ndvi,
        SpectralIndex::Ndmi,
        SpectralIndex::Ndwi,
        SpectralIndex::Evi,
        SpectralIndex::Mirbi,
        SpectralIndex::Bai,
        SpectralIndex::Baims,
        SpectralIndex::Csi,
        SpectralIndex::Bsi,
        SpectralIndex::Msavi,
        SpectralIndex::Tcb,
        SpectralIndex::Tcg,
        SpectralIndex::Tcw,
    ];

    fn position(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            SpectralIndex::Nbr => "nbr",
            SpectralIndex::Nbr2 => "nbr2",
            SpectralIndex::Ndvi => "ndvi",
            SpectralIndex::Ndmi => "ndmi",
            SpectralIndex::Ndwi => "ndwi",
            SpectralIndex::Evi => "evi",
            SpectralIndex::Mirbi => "mirbi",
            SpectralIndex::Bai => "bai",
            SpectralIndex::Baims => "baims",
            SpectralIndex::Csi => "csi",
            SpectralIndex::Bsi => "bsi",
            SpectralIndex::Msavi => "msavi",
            SpectralIndex::Tcb => "tcb",
            SpectralIndex::Tcg => "tcg",
            SpectralIndex::Tcw => "tcw",
        }
    }
}

/// Reflectance of one pixel across the six canonical reflective bands
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reflectance {
    pub blue: f64,
    pub green: f64,
    pub red: f64,
    pub nir: f64,
    pub sswir: f64,
    pub lswir: f64,
}

impl Reflectance {
    /// Read one pixel of a canonical stack
    pub fn at(stack: &BandStack<CanonicalBand>, row: usize, col: usize) -> Self {
        let get = |band: CanonicalBand| stack.band(band)[[row, col]] as f64;
        Self {
            blue: get(CanonicalBand::Blue),
            green: get(CanonicalBand::Green),
            red: get(CanonicalBand::Red),
            nir: get(CanonicalBand::Nir),
            sswir: get(CanonicalBand::Sswir),
            lswir: get(CanonicalBand::Lswir),
        }
    }

    fn as_array(&self) -> [f64; 6] {
        [self.blue, self.green, self.red, self.nir, self.sswir, self.lswir]
    }

    fn tasseled_cap(&self, coefficients: &[f64; 6]) -> f64 {
        self.as_array()
            .iter()
            .zip(coefficients.iter())
            .map(|(band, coef)| band * coef)
            .sum()
    }
}

/// `(a - b) / (a + b)`
#[inline]
pub fn normalized_difference(a: f64, b: f64) -> f64 {
    (a - b) / (a + b)
}

impl SpectralIndex {
    /// Evaluate the index formula for one pixel (may be non-finite)
    pub fn evaluate(self, p: &Reflectance) -> f64 {
        match self {
            SpectralIndex::Nbr => normalized_difference(p.nir, p.lswir),
            SpectralIndex::Nbr2 => normalized_difference(p.sswir, p.lswir),
            SpectralIndex::Ndvi => normalized_difference(p.nir, p.red),
            SpectralIndex::Ndmi => normalized_difference(p.nir, p.sswir),
            SpectralIndex::Ndwi => normalized_difference(p.green, p.nir),
            SpectralIndex::Evi => {
                2.5 * (p.nir - p.red) / (p.nir + 6.0 * p.red - 7.5 * p.blue + 1.0)
            }
            SpectralIndex::Mirbi => 10.0 * p.lswir - 9.8 * p.sswir + 2.0,
            SpectralIndex::Bai => 1.0 / ((0.1 - p.red).powi(2) + (0.06 - p.nir).powi(2)),
            SpectralIndex::Baims => {
                1.0 / ((p.nir - 0.05 * p.nir).powi(2) + (p.sswir - 0.2 * p.sswir).powi(2))
            }
            SpectralIndex::Csi => p.nir / p.sswir,
            SpectralIndex::Bsi => {
                let soil = p.red + p.sswir;
                let vegetation = p.nir + p.blue;
                (soil - vegetation) / (soil + vegetation)
            }
            SpectralIndex::Msavi => {
                let term = 2.0 * p.nir + 1.0;
                (term - (term * term - 8.0 * (p.nir - p.red)).sqrt()) / 2.0
            }
            SpectralIndex::Tcb => p.tasseled_cap(&TC_BRIGHTNESS),
            SpectralIndex::Tcg => p.tasseled_cap(&TC_GREENNESS),
            SpectralIndex::Tcw => p.tasseled_cap(&TC_WETNESS),
        }
    }

    /// Compute this index over a whole canonical raster
    pub fn compute(self, stack: &BandStack<CanonicalBand>) -> BandImage {
        Array2::from_shape_fn(stack.dim(), |(row, col)| {
            finite_or_nodata(self.evaluate(&Reflectance::at(stack, row, col)))
        })
    }
}

/// Per-observation feature raster: the fifteen indices plus the QA band
#[derive(Debug, Clone)]
pub struct FeatureImage {
    pub indices: BandStack<SpectralIndex>,
    pub qa: BandImage,
}

impl FeatureImage {
    /// Output band names, indices first then `qa`
    pub fn band_names(&self) -> Vec<&'static str> {
        let mut names = self.indices.band_names();
        names.push(CanonicalBand::Qa.name());
        names
    }
}

impl HasBands<SpectralIndex> for FeatureImage {
    fn bands(&self) -> &BandStack<SpectralIndex> {
        &self.indices
    }
}

/// Computes the full index catalog for harmonized observations
pub struct IndexEngine;

impl IndexEngine {
    /// All fifteen indices of one canonical raster, one pass over the pixels
    pub fn compute_all(stack: &BandStack<CanonicalBand>) -> BurnResult<BandStack<SpectralIndex>> {
        let shape = stack.dim();
        let mut outputs: Vec<BandImage> = SpectralIndex::ALL
            .iter()
            .map(|_| Array2::<PixelValue>::zeros(shape))
            .collect();

        for row in 0..shape.0 {
            for col in 0..shape.1 {
                let pixel = Reflectance::at(stack, row, col);
                for (index, out) in SpectralIndex::ALL.iter().zip(outputs.iter_mut()) {
                    out[[row, col]] = finite_or_nodata(index.evaluate(&pixel));
                }
            }
        }

        BandStack::from_bands(outputs)
    }

    /// Feature raster of one harmonized observation
    pub fn features(
        observation: &Observation<BandStack<CanonicalBand>>,
    ) -> BurnResult<Observation<FeatureImage>> {
        let indices = Self::compute_all(&observation.image)?;
        let qa = observation.image.band(CanonicalBand::Qa).clone();
        Ok(observation.with_image(FeatureImage { indices, qa }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{is_nodata, NODATA};
    use approx::assert_relative_eq;

    fn pixel() -> Reflectance {
        Reflectance {
            blue: 0.03,
            green: 0.06,
            red: 0.05,
            nir: 0.30,
            sswir: 0.18,
            lswir: 0.10,
        }
    }

    fn uniform_stack(p: Reflectance) -> BandStack<CanonicalBand> {
        BandStack::from_fn(|band| {
            let value = match band {
                CanonicalBand::Blue => p.blue,
                CanonicalBand::Green => p.green,
                CanonicalBand::Red => p.red,
                CanonicalBand::Nir => p.nir,
                CanonicalBand::Sswir => p.sswir,
                CanonicalBand::Lswir => p.lswir,
                CanonicalBand::Qa => 21824.0,
            };
            Array2::from_elem((3, 3), value as f32)
        })
        .unwrap()
    }

    #[test]
    fn test_normalized_difference_pairs() {
        let p = pixel();
        assert_relative_eq!(SpectralIndex::Nbr.evaluate(&p), 0.2 / 0.4, epsilon = 1e-12);
        assert_relative_eq!(SpectralIndex::Nbr2.evaluate(&p), 0.08 / 0.28, epsilon = 1e-12);
        assert_relative_eq!(SpectralIndex::Ndvi.evaluate(&p), 0.25 / 0.35, epsilon = 1e-12);
        assert_relative_eq!(SpectralIndex::Ndmi.evaluate(&p), 0.12 / 0.48, epsilon = 1e-12);
        assert_relative_eq!(SpectralIndex::Ndwi.evaluate(&p), -0.24 / 0.36, epsilon = 1e-12);
    }

    #[test]
    fn test_normalized_difference_scale_invariant_and_bounded() {
        let samples = [(0.3, 0.1), (0.02, 0.4), (0.5, 0.5), (0.0001, 0.9)];
        for (a, b) in samples {
            let base = normalized_difference(a, b);
            assert!((-1.0..=1.0).contains(&base));
            for k in [0.5, 3.0, 1000.0] {
                assert_relative_eq!(normalized_difference(a * k, b * k), base, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_remaining_formulas() {
        let p = pixel();
        assert_relative_eq!(
            SpectralIndex::Evi.evaluate(&p),
            2.5 * 0.25 / (0.30 + 0.30 - 0.225 + 1.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(SpectralIndex::Mirbi.evaluate(&p), 1.0 - 1.764 + 2.0, epsilon = 1e-12);
        assert_relative_eq!(
            SpectralIndex::Bai.evaluate(&p),
            1.0 / (0.05f64.powi(2) + 0.24f64.powi(2)),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            SpectralIndex::Baims.evaluate(&p),
            1.0 / (0.285f64.powi(2) + 0.144f64.powi(2)),
            epsilon = 1e-12
        );
        assert_relative_eq!(SpectralIndex::Csi.evaluate(&p), 0.30 / 0.18, epsilon = 1e-12);
        assert_relative_eq!(SpectralIndex::Bsi.evaluate(&p), (0.23 - 0.33) / (0.23 + 0.33), epsilon = 1e-12);
        let msavi = (1.6 - (1.6f64 * 1.6 - 8.0 * 0.25).sqrt()) / 2.0;
        assert_relative_eq!(SpectralIndex::Msavi.evaluate(&p), msavi, epsilon = 1e-12);
    }

    #[test]
    fn test_tasseled_cap_uses_all_six_bands() {
        let unit = Reflectance {
            blue: 1.0,
            green: 1.0,
            red: 1.0,
            nir: 1.0,
            sswir: 1.0,
            lswir: 1.0,
        };
        assert_relative_eq!(SpectralIndex::Tcb.evaluate(&unit), TC_BRIGHTNESS.iter().sum::<f64>(), epsilon = 1e-12);
        assert_relative_eq!(SpectralIndex::Tcg.evaluate(&unit), TC_GREENNESS.iter().sum::<f64>(), epsilon = 1e-12);
        assert_relative_eq!(SpectralIndex::Tcw.evaluate(&unit), TC_WETNESS.iter().sum::<f64>(), epsilon = 1e-12);
    }

    #[test]
    fn test_compute_all_matches_single_index() {
        let stack = uniform_stack(pixel());
        let all = IndexEngine::compute_all(&stack).unwrap();
        assert_eq!(all.band_names().len(), 15);
        for index in SpectralIndex::ALL {
            assert_eq!(all.band(*index), &index.compute(&stack));
        }
    }

    #[test]
    fn test_nodata_propagates() {
        let mut stack = uniform_stack(pixel());
        stack.band_mut(CanonicalBand::Nir)[[1, 1]] = NODATA;
        let all = IndexEngine::compute_all(&stack).unwrap();
        assert!(is_nodata(all.band(SpectralIndex::Nbr)[[1, 1]]));
        assert!(!is_nodata(all.band(SpectralIndex::Nbr)[[0, 0]]));
        // MIRBI does not read NIR
        assert!(!is_nodata(all.band(SpectralIndex::Mirbi)[[1, 1]]));
    }

    #[test]
    fn test_zero_denominator_is_nodata() {
        let mut p = pixel();
        p.sswir = 0.0;
        p.lswir = 0.0;
        let stack = uniform_stack(p);
        assert!(is_nodata(SpectralIndex::Nbr2.compute(&stack)[[0, 0]]));
        assert!(is_nodata(SpectralIndex::Csi.compute(&stack)[[0, 0]]));
    }
}
