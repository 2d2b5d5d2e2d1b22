use crate::types::{
    BandImage, BandKey, BandLayout, BandStack, BoundingBox, BurnError, BurnResult, CanonicalBand,
    Observation, Sensor, NODATA,
};
use chrono::NaiveDate;
use ndarray::{Array2, Zip};
use std::collections::HashMap;

/// Collection-2 pixel quality band name
pub const QA_BAND: &str = "QA_PIXEL";

/// QA_PIXEL bit positions
pub mod qa_bits {
    pub const DILATED_CLOUD: u16 = 1;
    pub const CLOUD: u16 = 3;
    pub const CLOUD_SHADOW: u16 = 4;
    pub const SNOW: u16 = 5;
    pub const WATER: u16 = 7;
    pub const CLOUD_CONFIDENCE_LOW: u16 = 8;
    pub const CLOUD_CONFIDENCE_HIGH: u16 = 9;
}

/// Bits whose presence always rejects a pixel
const DEFECT_BITS: [u16; 5] = [
    qa_bits::DILATED_CLOUD,
    qa_bits::CLOUD,
    qa_bits::CLOUD_SHADOW,
    qa_bits::WATER,
    qa_bits::SNOW,
];

/// Summed confidence-bit values and the confidence class each maps to
const CONFIDENCE_BREAKPOINTS: [f32; 4] = [0.0, 256.0, 512.0, 768.0];
const CONFIDENCE_CLASSES: [f32; 4] = [0.0, 1.0, 2.0, 3.0];

/// Confidence class at or above which the degraded policy rejects a pixel
const MEDIUM_CONFIDENCE: u8 = 2;

/// Raw dataset as delivered by a sensor archive, co-registered to the analysis grid
#[derive(Debug, Clone)]
pub struct RawScene {
    pub product_id: String,
    pub sensor: Sensor,
    pub acquired: NaiveDate,
    pub footprint: BoundingBox,
    /// Stored digital numbers keyed by product band name (`SR_B4`, `QA_PIXEL`, ...)
    pub bands: HashMap<String, Array2<u16>>,
}

/// Pixel rejection policy applied during harmonization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPolicy {
    /// Reject dilated cloud, cloud, shadow, water and snow
    Standard,
    /// Standard rejections plus medium/high cloud confidence
    Degraded,
}

/// Reflectance rescaling parameters
#[derive(Debug, Clone)]
pub struct HarmonizeParams {
    pub scale: f64,
    pub offset: f64,
}

impl Default for HarmonizeParams {
    fn default() -> Self {
        // Collection-2 Level-2 surface reflectance
        Self {
            scale: 0.0000275,
            offset: -0.2,
        }
    }
}

/// Product band names feeding each reflective canonical band
pub fn reflective_band_names(layout: BandLayout) -> [(&'static str, CanonicalBand); 6] {
    match layout {
        BandLayout::Legacy => [
            ("SR_B1", CanonicalBand::Blue),
            ("SR_B2", CanonicalBand::Green),
            ("SR_B3", CanonicalBand::Red),
            ("SR_B4", CanonicalBand::Nir),
            ("SR_B5", CanonicalBand::Sswir),
            ("SR_B7", CanonicalBand::Lswir),
        ],
        BandLayout::Oli => [
            ("SR_B2", CanonicalBand::Blue),
            ("SR_B3", CanonicalBand::Green),
            ("SR_B4", CanonicalBand::Red),
            ("SR_B5", CanonicalBand::Nir),
            ("SR_B6", CanonicalBand::Sswir),
            ("SR_B7", CanonicalBand::Lswir),
        ],
    }
}

/// Piecewise-linear interpolation over ascending breakpoints, clamped at both ends
pub fn interpolate_clamped(value: f32, from: &[f32], to: &[f32]) -> f32 {
    debug_assert_eq!(from.len(), to.len());
    if value <= from[0] {
        return to[0];
    }
    for i in 1..from.len() {
        if value <= from[i] {
            let weight = (value - from[i - 1]) / (from[i] - from[i - 1]);
            return to[i - 1] + weight * (to[i] - to[i - 1]);
        }
    }
    to[to.len() - 1]
}

/// Cloud confidence class 0..=3 from bits 8 and 9
pub fn cloud_confidence(qa: u16) -> u8 {
    let low = qa & (1 << qa_bits::CLOUD_CONFIDENCE_LOW);
    let high = qa & (1 << qa_bits::CLOUD_CONFIDENCE_HIGH);
    let summed = (low + high) as f32;
    interpolate_clamped(summed, &CONFIDENCE_BREAKPOINTS, &CONFIDENCE_CLASSES).round() as u8
}

/// True when the QA word marks the pixel as unusable under the policy
pub fn is_defective(qa: u16, policy: MaskPolicy) -> bool {
    let flagged = DEFECT_BITS.iter().any(|&bit| qa & (1 << bit) != 0);
    match policy {
        MaskPolicy::Standard => flagged,
        MaskPolicy::Degraded => flagged || cloud_confidence(qa) >= MEDIUM_CONFIDENCE,
    }
}

/// Quality mask of a QA band; true marks a rejected pixel
pub fn quality_mask(qa: &Array2<u16>, policy: MaskPolicy) -> Array2<bool> {
    qa.mapv(|word| is_defective(word, policy))
}

/// Renames, rescales and masks raw scenes into the canonical band schema
pub struct SensorHarmonizer {
    params: HarmonizeParams,
}

impl SensorHarmonizer {
    /// Create a harmonizer with Collection-2 rescaling
    pub fn new() -> Self {
        Self {
            params: HarmonizeParams::default(),
        }
    }

    pub fn with_params(params: HarmonizeParams) -> Self {
        Self { params }
    }

    /// Harmonize one raw scene.
    ///
    /// Rejected pixels become no-data in every band, QA included, so they drop
    /// out of all later reductions.
    pub fn harmonize(
        &self,
        scene: &RawScene,
        policy: MaskPolicy,
    ) -> BurnResult<Observation<BandStack<CanonicalBand>>> {
        log::debug!(
            "Harmonizing {} ({}, {}) with {:?} mask",
            scene.product_id,
            scene.sensor,
            scene.acquired,
            policy
        );

        let qa = self.raw_band(scene, QA_BAND)?;
        let shape = qa.dim();
        let rejected = quality_mask(qa, policy);

        let mut named: HashMap<String, BandImage> = HashMap::with_capacity(7);
        for (raw_name, canonical) in reflective_band_names(scene.sensor.band_layout()) {
            let raw = self.raw_band(scene, raw_name)?;
            if raw.dim() != shape {
                return Err(BurnError::ShapeMismatch {
                    expected: shape,
                    actual: raw.dim(),
                });
            }
            named.insert(canonical.name().to_string(), self.rescale(raw, &rejected));
        }

        let mut qa_band = qa.mapv(|word| word as f32);
        Zip::from(&mut qa_band).and(&rejected).for_each(|v, &bad| {
            if bad {
                *v = NODATA;
            }
        });
        named.insert(CanonicalBand::Qa.name().to_string(), qa_band);

        let rejected_count = rejected.iter().filter(|&&r| r).count();
        log::debug!(
            "{}: {} of {} pixels rejected",
            scene.product_id,
            rejected_count,
            rejected.len()
        );

        Ok(Observation {
            product_id: scene.product_id.clone(),
            sensor: scene.sensor,
            acquired: scene.acquired,
            footprint: scene.footprint,
            image: BandStack::from_named(named)?,
        })
    }

    fn raw_band<'a>(&self, scene: &'a RawScene, name: &str) -> BurnResult<&'a Array2<u16>> {
        scene.bands.get(name).ok_or_else(|| {
            BurnError::Schema(format!(
                "{} ({}) is missing band {}",
                scene.product_id, scene.sensor, name
            ))
        })
    }

    fn rescale(&self, raw: &Array2<u16>, rejected: &Array2<bool>) -> BandImage {
        let mut out = Array2::from_elem(raw.dim(), NODATA);
        Zip::from(&mut out)
            .and(raw)
            .and(rejected)
            .for_each(|o, &dn, &bad| {
                if !bad {
                    *o = (dn as f64 * self.params.scale + self.params.offset) as f32;
                }
            });
        out
    }
}

impl Default for SensorHarmonizer {
    fn default() -> Self {
        Self::new()
    }
}
