//! Pre/post-fire change metrics
//!
//! Differences of the seasonal index composites, scaled and truncated to
//! integers the way the detection thresholds and the trained classifier
//! expect them. `pre_nbr3` is the only fractional band.

use crate::core::composite::{CompositeRole, SeasonalComposite};
use crate::core::indices::SpectralIndex;
use crate::core::land_mask::LandMask;
use crate::types::{
    finite_or_nodata, BandImage, BandKey, BandStack, BurnError, BurnResult, PixelValue, NODATA,
};
use ndarray::Array2;

/// Smallest `|pre_nbr|` used in the RdNBR denominator
pub const PRE_NBR_FLOOR: f64 = 0.001;

/// Offset keeping the RBR denominator positive
pub const RBR_OFFSET: f64 = 1.001;

/// Burn metric bands, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BurnMetric {
    Dnbr,
    Rbr,
    PreNbr3,
    Rdnbr,
    Dndvi,
    Devi,
    Dndmi,
    Dmirbi,
    Dnbr2,
    Dndwi,
    Dbai,
    Dbaims,
    Dcsi,
    Dbsi,
    Dtcb,
    Dtcg,
    Dtcw,
    Dmsavi,
}

impl BandKey for BurnMetric {
    const ALL: &'static [Self] = &[
        BurnMetric::Dnbr,
        BurnMetric::Rbr,
        BurnMetric::PreNbr3,
        BurnMetric::Rdnbr,
        BurnMetric::Dndvi,
        BurnMetric::Devi,
        BurnMetric::Dndmi,
        BurnMetric::Dmirbi,
        BurnMetric::Dnbr2,
        BurnMetric::Dndwi,
        BurnMetric::Dbai,
        BurnMetric::Dbaims,
        BurnMetric::Dcsi,
        BurnMetric::Dbsi,
        BurnMetric::Dtcb,
        BurnMetric::Dtcg,
        BurnMetric::Dtcw,
        BurnMetric::Dmsavi,
    ];

    fn position(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            BurnMetric::Dnbr => "dnbr",
            BurnMetric::Rbr => "rbr",
            BurnMetric::PreNbr3 => "pre_nbr3",
            BurnMetric::Rdnbr => "rdnbr",
            BurnMetric::Dndvi => "dndvi",
            BurnMetric::Devi => "devi",
            BurnMetric::Dndmi => "dndmi",
            BurnMetric::Dmirbi => "dmirbi",
            BurnMetric::Dnbr2 => "dnbr2",
            BurnMetric::Dndwi => "dndwi",
            BurnMetric::Dbai => "dbai",
            BurnMetric::Dbaims => "dbaims",
            BurnMetric::Dcsi => "dcsi",
            BurnMetric::Dbsi => "dbsi",
            BurnMetric::Dtcb => "dtcb",
            BurnMetric::Dtcg => "dtcg",
            BurnMetric::Dtcw => "dtcw",
            BurnMetric::Dmsavi => "dmsavi",
        }
    }
}

impl BurnMetric {
    /// Plain pre-minus-post differences: (source index, metric, scale factor)
    const DIFFERENCES: [(SpectralIndex, BurnMetric, f64); 14] = [
        (SpectralIndex::Ndvi, BurnMetric::Dndvi, 1000.0),
        (SpectralIndex::Evi, BurnMetric::Devi, 1000.0),
        (SpectralIndex::Ndmi, BurnMetric::Dndmi, 1000.0),
        (SpectralIndex::Mirbi, BurnMetric::Dmirbi, 1000.0),
        (SpectralIndex::Nbr2, BurnMetric::Dnbr2, 1000.0),
        (SpectralIndex::Ndwi, BurnMetric::Dndwi, 1000.0),
        (SpectralIndex::Bai, BurnMetric::Dbai, 1.0),
        (SpectralIndex::Baims, BurnMetric::Dbaims, 10.0),
        (SpectralIndex::Csi, BurnMetric::Dcsi, 1000.0),
        (SpectralIndex::Bsi, BurnMetric::Dbsi, 1000.0),
        (SpectralIndex::Tcb, BurnMetric::Dtcb, 100.0),
        (SpectralIndex::Tcg, BurnMetric::Dtcg, 100.0),
        (SpectralIndex::Tcw, BurnMetric::Dtcw, 100.0),
        (SpectralIndex::Msavi, BurnMetric::Dmsavi, 1000.0),
    ];
}

/// Truncate toward zero, keeping no-data
#[inline]
fn truncate(value: f64) -> f64 {
    if value.is_finite() {
        value.trunc()
    } else {
        f64::NAN
    }
}

/// `(pre - post) * scale`, truncated
#[inline]
pub fn scaled_difference(pre: f64, post: f64, scale: f64) -> f64 {
    truncate((pre - post) * scale)
}

/// dNBR: `(pre_nbr - post_nbr) * 1000`, truncated
#[inline]
pub fn dnbr(pre_nbr: f64, post_nbr: f64) -> f64 {
    scaled_difference(pre_nbr, post_nbr, 1000.0)
}

/// RBR: `dnbr / (pre_nbr + 1.001)`, truncated
#[inline]
pub fn rbr(dnbr: f64, pre_nbr: f64) -> f64 {
    truncate(dnbr / (pre_nbr + RBR_OFFSET))
}

/// RdNBR denominator `sqrt(|pre_nbr|)` with `|pre_nbr| < 0.001` replaced by 0.001
#[inline]
pub fn pre_nbr3(pre_nbr: f64) -> f64 {
    let guarded = if pre_nbr.abs() < PRE_NBR_FLOOR {
        PRE_NBR_FLOOR
    } else {
        pre_nbr
    };
    guarded.abs().sqrt()
}

/// RdNBR: `dnbr / pre_nbr3`, truncated
#[inline]
pub fn rdnbr(dnbr: f64, pre_nbr3: f64) -> f64 {
    truncate(dnbr / pre_nbr3)
}

/// Derives burn metrics from a pre/post composite pair
pub struct BurnMetricCalculator;

impl BurnMetricCalculator {
    /// Compute every metric band
    pub fn compute(
        pre: &SeasonalComposite,
        post: &SeasonalComposite,
    ) -> BurnResult<BandStack<BurnMetric>> {
        if pre.role != CompositeRole::Pre || post.role != CompositeRole::Post {
            return Err(BurnError::Processing(format!(
                "burn metrics need a pre/post pair, got {:?}/{:?}",
                pre.role, post.role
            )));
        }
        Self::compute_bands(&pre.bands, &post.bands)
    }

    /// Compute every metric band from bare index stacks
    pub fn compute_bands(
        pre: &BandStack<SpectralIndex>,
        post: &BandStack<SpectralIndex>,
    ) -> BurnResult<BandStack<BurnMetric>> {
        let shape = pre.dim();
        if post.dim() != shape {
            return Err(BurnError::ShapeMismatch {
                expected: shape,
                actual: post.dim(),
            });
        }
        log::info!("Computing burn metrics over {}x{} pixels", shape.0, shape.1);

        let mut out: Vec<BandImage> = BurnMetric::ALL
            .iter()
            .map(|_| Array2::from_elem(shape, NODATA))
            .collect();

        let pre_nbr = pre.band(SpectralIndex::Nbr);
        let post_nbr = post.band(SpectralIndex::Nbr);

        for row in 0..shape.0 {
            for col in 0..shape.1 {
                let pre_v = pre_nbr[[row, col]] as f64;
                let post_v = post_nbr[[row, col]] as f64;

                let d = dnbr(pre_v, post_v);
                let nbr3 = if pre_v.is_finite() { pre_nbr3(pre_v) } else { f64::NAN };
                out[BurnMetric::Dnbr.position()][[row, col]] = finite_or_nodata(d);
                out[BurnMetric::Rbr.position()][[row, col]] = finite_or_nodata(rbr(d, pre_v));
                out[BurnMetric::PreNbr3.position()][[row, col]] = finite_or_nodata(nbr3);
                out[BurnMetric::Rdnbr.position()][[row, col]] = finite_or_nodata(rdnbr(d, nbr3));

                for (index, metric, scale) in BurnMetric::DIFFERENCES {
                    let a = pre.band(index)[[row, col]] as f64;
                    let b = post.band(index)[[row, col]] as f64;
                    out[metric.position()][[row, col]] =
                        finite_or_nodata(scaled_difference(a, b, scale));
                }
            }
        }

        BandStack::from_bands(out)
    }

    /// Metrics restricted to land, non-permanent-water pixels
    pub fn masked(
        metrics: &BandStack<BurnMetric>,
        land: &LandMask,
    ) -> BurnResult<BandStack<BurnMetric>> {
        land.apply_stack(metrics)
    }

    /// The classifier's predictor subset
    pub fn predictors(metrics: &BandStack<BurnMetric>) -> BurnResult<BandStack<Predictor>> {
        BandStack::from_fn(|p: Predictor| metrics.band(p.source()).clone())
    }
}

/// Predictor bands consumed by the probability classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predictor {
    Dnbr2,
    Dtcg,
    Dtcb,
}

impl Predictor {
    /// Metric band the predictor is taken from
    pub fn source(self) -> BurnMetric {
        match self {
            Predictor::Dnbr2 => BurnMetric::Dnbr2,
            Predictor::Dtcg => BurnMetric::Dtcg,
            Predictor::Dtcb => BurnMetric::Dtcb,
        }
    }
}

impl BandKey for Predictor {
    const ALL: &'static [Self] = &[Predictor::Dnbr2, Predictor::Dtcg, Predictor::Dtcb];

    fn position(self) -> usize {
        self as usize
    }

    /// Feature names as the trained model knows them
    fn name(self) -> &'static str {
        match self {
            Predictor::Dnbr2 => "DNBR2",
            Predictor::Dtcg => "DTCG",
            Predictor::Dtcb => "DTCB",
        }
    }
}

/// Read the predictor vector of one pixel
pub fn predictor_vector(stack: &BandStack<Predictor>, row: usize, col: usize) -> [PixelValue; 3] {
    [
        stack.band(Predictor::Dnbr2)[[row, col]],
        stack.band(Predictor::Dtcg)[[row, col]],
        stack.band(Predictor::Dtcb)[[row, col]],
    ]
}
