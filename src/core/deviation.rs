//! Multi-year deviation from a pre-fire baseline
//!
//! The baseline is the median of the three seasons before the analysis
//! year. Each observation of the fire season and the season after it is
//! compared to that baseline, and each comparison is reduced per season and
//! then combined across the two seasons with a no-data-aware minimum, so a
//! fire that shows up in either season is kept.

use crate::core::collection::{DateWindow, ObservationSet, SeasonWindow};
use crate::core::composite::{stack_nan_min, Reducer, TemporalCompositor};
use crate::core::indices::SpectralIndex;
use crate::core::land_mask::LandMask;
use crate::types::{finite_or_nodata, BandStack, BurnResult, HasBands};

/// Number of seasons before the analysis year in the baseline
pub const BASELINE_YEARS: i32 = 3;

/// Baseline and deviation composites for one analysis year
#[derive(Debug, Clone)]
pub struct Deviations {
    /// Median over the three preceding seasons
    pub baseline: BandStack<SpectralIndex>,
    /// Ratio to baseline, seasonal median, minimum of the two seasons
    pub div: BandStack<SpectralIndex>,
    /// Difference from baseline, seasonal mean, minimum of the two seasons
    pub sub: BandStack<SpectralIndex>,
    /// Seasonal minimum of the raw indices, minimum of the two seasons.
    /// Historically exported as `meanCol`.
    pub min: BandStack<SpectralIndex>,
}

pub struct DeviationDetector {
    compositor: TemporalCompositor,
    season: SeasonWindow,
}

impl DeviationDetector {
    pub fn new(shape: (usize, usize), season: SeasonWindow) -> Self {
        Self {
            compositor: TemporalCompositor::new(shape),
            season,
        }
    }

    /// Seasons entering the baseline: Y-1, Y-2, Y-3
    pub fn baseline_windows(&self, analysis_year: i32) -> BurnResult<Vec<DateWindow>> {
        self.season
            .for_years((1..=BASELINE_YEARS).map(|k| analysis_year - k))
    }

    /// Seasons evaluated against the baseline: Y and Y+1
    pub fn evaluation_windows(&self, analysis_year: i32) -> BurnResult<[DateWindow; 2]> {
        Ok([
            self.season.for_year(analysis_year)?,
            self.season.for_year(analysis_year + 1)?,
        ])
    }

    pub fn detect<P: HasBands<SpectralIndex>>(
        &self,
        set: &ObservationSet<P>,
        analysis_year: i32,
        land: &LandMask,
    ) -> BurnResult<Deviations> {
        log::info!("Computing deviations for {}", analysis_year);

        let baseline: BandStack<SpectralIndex> = self.compositor.composite_windows(
            set,
            &self.baseline_windows(analysis_year)?,
            Reducer::Median,
        )?;

        let windows = self.evaluation_windows(analysis_year)?;
        let evaluated = set.filter_windows(&windows);
        log::debug!(
            "{} observations in the evaluation seasons",
            evaluated.len()
        );

        let ratios = evaluated.try_map(|o| {
            o.image
                .bands()
                .zip_pixels(&baseline, |v, b| finite_or_nodata(v as f64 / b as f64))
        })?;
        let differences = evaluated.try_map(|o| {
            o.image
                .bands()
                .zip_pixels(&baseline, |v, b| finite_or_nodata(v as f64 - b as f64))
        })?;

        let div = self.min_of_seasons(&ratios, &windows, Reducer::Median)?;
        let sub = self.min_of_seasons(&differences, &windows, Reducer::Mean)?;
        let min = self.min_of_seasons(&evaluated, &windows, Reducer::Min)?;

        Ok(Deviations {
            baseline,
            div: land.apply_stack(&div)?,
            sub: land.apply_stack(&sub)?,
            min: land.apply_stack(&min)?,
        })
    }

    /// Reduce each season separately, then take the pixelwise minimum
    fn min_of_seasons<P: HasBands<SpectralIndex>>(
        &self,
        set: &ObservationSet<P>,
        windows: &[DateWindow; 2],
        reducer: Reducer,
    ) -> BurnResult<BandStack<SpectralIndex>> {
        let first: BandStack<SpectralIndex> = self.compositor.composite(set, &windows[0], reducer)?;
        let second: BandStack<SpectralIndex> =
            self.compositor.composite(set, &windows[1], reducer)?;
        stack_nan_min(&first, &second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{is_nodata, BoundingBox, Observation, Sensor};
    use chrono::NaiveDate;
    use ndarray::array;

    fn obs(year: i32, month: u32, day: u32, nbr2: f32) -> Observation<BandStack<SpectralIndex>> {
        let mut stack = BandStack::<SpectralIndex>::filled((1, 2), 0.2);
        stack.band_mut(SpectralIndex::Nbr2).fill(nbr2);
        Observation {
            product_id: format!("{}{:02}{:02}", year, month, day),
            sensor: Sensor::Landsat8,
            acquired: NaiveDate::from_ymd_opt(year, month, day).unwrap(),
            footprint: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            image: stack,
        }
    }

    #[test]
    fn test_deviations_against_baseline() {
        let set = ObservationSet::new(vec![
            obs(2014, 7, 1, 0.40),
            obs(2013, 7, 1, 0.30),
            obs(2012, 7, 1, 0.50),
            obs(2011, 7, 1, -5.0), // outside the baseline
            obs(2015, 7, 1, 0.10),
            obs(2015, 8, 1, 0.30),
            obs(2016, 7, 1, 0.36),
        ]);
        let detector = DeviationDetector::new((1, 2), SeasonWindow::default());
        let land = LandMask::new(array![[true, false]]);
        let dev = detector.detect(&set, 2015, &land).unwrap();

        let nbr2 = SpectralIndex::Nbr2;
        assert!((dev.baseline.band(nbr2)[[0, 0]] - 0.4).abs() < 1e-6);
        // 2015 ratios 0.25 and 0.75 -> median 0.5; 2016 ratio 0.9
        assert!((dev.div.band(nbr2)[[0, 0]] - 0.5).abs() < 1e-6);
        // 2015 differences -0.3 and -0.1 -> mean -0.2; 2016 difference -0.04
        assert!((dev.sub.band(nbr2)[[0, 0]] + 0.2).abs() < 1e-6);
        assert!((dev.min.band(nbr2)[[0, 0]] - 0.1).abs() < 1e-6);

        assert!(is_nodata(dev.div.band(nbr2)[[0, 1]]));
        assert!(is_nodata(dev.sub.band(nbr2)[[0, 1]]));
        assert!(is_nodata(dev.min.band(nbr2)[[0, 1]]));
    }

    #[test]
    fn test_one_empty_season_uses_the_other() {
        let set = ObservationSet::new(vec![obs(2014, 7, 1, 0.4), obs(2016, 7, 1, 0.2)]);
        let detector = DeviationDetector::new((1, 2), SeasonWindow::default());
        let dev = detector
            .detect(&set, 2015, &LandMask::all_land((1, 2)))
            .unwrap();
        assert!((dev.div.band(SpectralIndex::Nbr2)[[0, 0]] - 0.5).abs() < 1e-6);
        assert!((dev.sub.band(SpectralIndex::Nbr2)[[0, 0]] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_no_history_is_nodata() {
        let set = ObservationSet::new(vec![obs(2015, 7, 1, 0.1)]);
        let detector = DeviationDetector::new((1, 2), SeasonWindow::default());
        let dev = detector
            .detect(&set, 2015, &LandMask::all_land((1, 2)))
            .unwrap();
        assert!(is_nodata(dev.div.band(SpectralIndex::Nbr2)[[0, 0]]));
        assert!((dev.min.band(SpectralIndex::Nbr2)[[0, 0]] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_window_years() {
        let detector = DeviationDetector::new((1, 1), SeasonWindow::default());
        let years: Vec<i32> = detector
            .baseline_windows(2000)
            .unwrap()
            .iter()
            .map(|w| chrono::Datelike::year(&w.start))
            .collect();
        assert_eq!(years, vec![1999, 1998, 1997]);
    }
}
