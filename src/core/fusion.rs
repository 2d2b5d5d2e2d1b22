use crate::core::deviation::Deviations;
use crate::core::indices::SpectralIndex;
use crate::core::land_mask::LandMask;
use crate::types::{BandImage, BurnError, BurnResult, Mask, PixelValue};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Thresholds of the four detection rules
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    /// Burn probability must exceed this
    pub probability_min: f32,
    /// NBR2 ratio to baseline must be below this
    pub nbr2_ratio_max: f32,
    /// NBR2 difference from baseline must be below this
    pub nbr2_difference_max: f32,
    /// Minimum NBR must be below this
    pub nbr_min_max: f32,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            probability_min: 0.9,
            nbr2_ratio_max: 0.5,
            nbr2_difference_max: -0.1,
            nbr_min_max: 0.0,
        }
    }
}

/// Threshold a raster; no-data pixels are always false
pub fn decision(raster: &BandImage, predicate: impl Fn(PixelValue) -> bool) -> Mask {
    raster.mapv(|v| v.is_finite() && predicate(v))
}

/// The four decision rasters, in rule order
#[derive(Debug, Clone)]
pub struct DecisionRasters {
    pub probability: Mask,
    pub ratio: Mask,
    pub difference: Mask,
    pub minimum: Mask,
}

impl DecisionRasters {
    /// Number of rules satisfied per pixel
    pub fn rule_count(&self) -> Array2<u8> {
        let mut count = Array2::<u8>::zeros(self.probability.dim());
        Zip::from(&mut count)
            .and(&self.probability)
            .and(&self.ratio)
            .and(&self.difference)
            .and(&self.minimum)
            .for_each(|c, &a, &b, &d, &m| *c = a as u8 + b as u8 + d as u8 + m as u8);
        count
    }

    /// Pixels satisfying all four rules
    pub fn all(&self) -> Mask {
        self.rule_count().mapv(|c| c == 4)
    }
}

pub struct RuleFusion {
    thresholds: RuleThresholds,
}

impl RuleFusion {
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self { thresholds }
    }

    pub fn decisions(
        &self,
        probability: &BandImage,
        deviations: &Deviations,
    ) -> BurnResult<DecisionRasters> {
        let t = self.thresholds;
        let ratio = deviations.div.band(SpectralIndex::Nbr2);
        let difference = deviations.sub.band(SpectralIndex::Nbr2);
        let minimum = deviations.min.band(SpectralIndex::Nbr);
        for raster in [ratio, difference, minimum] {
            if raster.dim() != probability.dim() {
                return Err(BurnError::ShapeMismatch {
                    expected: probability.dim(),
                    actual: raster.dim(),
                });
            }
        }

        Ok(DecisionRasters {
            probability: decision(probability, |p| p > t.probability_min),
            ratio: decision(ratio, |v| v < t.nbr2_ratio_max),
            difference: decision(difference, |v| v < t.nbr2_difference_max),
            minimum: decision(minimum, |v| v < t.nbr_min_max),
        })
    }

    /// Candidate fire mask: all four rules, land only
    pub fn candidate_mask(&self, rules: &DecisionRasters, land: &LandMask) -> BurnResult<Mask> {
        let mask = land.apply_decision(&rules.all())?;
        log::info!(
            "{} candidate fire pixels ({} pass the probability rule)",
            mask.iter().filter(|v| **v).count(),
            rules.probability.iter().filter(|v| **v).count()
        );
        Ok(mask)
    }

    pub fn fuse(
        &self,
        probability: &BandImage,
        deviations: &Deviations,
        land: &LandMask,
    ) -> BurnResult<Mask> {
        let rules = self.decisions(probability, deviations)?;
        self.candidate_mask(&rules, land)
    }
}
