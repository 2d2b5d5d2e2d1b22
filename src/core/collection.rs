use crate::core::harmonize::MaskPolicy;
use crate::types::{BoundingBox, BurnError, BurnResult, Observation, Sensor};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Half-open date interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> BurnResult<Self> {
        if end <= start {
            return Err(BurnError::Config(format!(
                "date window end {} is not after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// Recurring day-of-year window, e.g. June 15 to September 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonWindow {
    pub start_month: u32,
    pub start_day: u32,
    /// Exclusive
    pub end_month: u32,
    /// Exclusive
    pub end_day: u32,
}

impl Default for SeasonWindow {
    fn default() -> Self {
        Self {
            start_month: 6,
            start_day: 15,
            end_month: 9,
            end_day: 1,
        }
    }
}

impl SeasonWindow {
    /// The window within one calendar year
    pub fn for_year(&self, year: i32) -> BurnResult<DateWindow> {
        let start = NaiveDate::from_ymd_opt(year, self.start_month, self.start_day);
        let end = NaiveDate::from_ymd_opt(year, self.end_month, self.end_day);
        match (start, end) {
            (Some(start), Some(end)) => DateWindow::new(start, end),
            _ => Err(BurnError::Config(format!(
                "invalid season {:02}-{:02}..{:02}-{:02} for {}",
                self.start_month, self.start_day, self.end_month, self.end_day, year
            ))),
        }
    }

    /// The window in each of the given years
    pub fn for_years(&self, years: impl IntoIterator<Item = i32>) -> BurnResult<Vec<DateWindow>> {
        years.into_iter().map(|y| self.for_year(y)).collect()
    }
}

/// Immutable multi-sensor set of observations.
///
/// Observations are shared, so filtering and merging only copy handles.
#[derive(Debug, Clone)]
pub struct ObservationSet<P> {
    observations: Vec<Arc<Observation<P>>>,
}

impl<P> Default for ObservationSet<P> {
    fn default() -> Self {
        Self {
            observations: Vec::new(),
        }
    }
}

impl<P> ObservationSet<P> {
    pub fn new(observations: Vec<Observation<P>>) -> Self {
        Self {
            observations: observations.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation<P>> {
        self.observations.iter().map(|o| o.as_ref())
    }

    /// Observations whose footprint intersects the bounds
    pub fn filter_bounds(&self, bounds: &BoundingBox) -> Self {
        self.filter(|o| o.footprint.intersects(bounds))
    }

    /// Observations acquired within the window
    pub fn filter_date(&self, window: &DateWindow) -> Self {
        self.filter(|o| window.contains(o.acquired))
    }

    /// Observations acquired within any of the windows
    pub fn filter_windows(&self, windows: &[DateWindow]) -> Self {
        self.filter(|o| windows.iter().any(|w| w.contains(o.acquired)))
    }

    pub fn filter(&self, keep: impl Fn(&Observation<P>) -> bool) -> Self {
        Self {
            observations: self
                .observations
                .iter()
                .filter(|o| keep(o))
                .cloned()
                .collect(),
        }
    }

    /// Concatenate sets without deduplication
    pub fn merge(sets: impl IntoIterator<Item = ObservationSet<P>>) -> Self {
        let mut observations = Vec::new();
        for set in sets {
            observations.extend(set.observations);
        }
        Self { observations }
    }

    /// Same set ordered by acquisition date (stable for equal dates)
    pub fn sorted_by_date(&self) -> Self {
        let mut observations = self.observations.clone();
        observations.sort_by_key(|o| o.acquired);
        Self { observations }
    }

    /// Transform every observation's payload
    pub fn try_map<Q>(
        &self,
        f: impl Fn(&Observation<P>) -> BurnResult<Q>,
    ) -> BurnResult<ObservationSet<Q>> {
        let observations = self
            .observations
            .iter()
            .map(|o| f(o).map(|image| Arc::new(o.with_image(image))))
            .collect::<BurnResult<Vec<_>>>()?;
        Ok(ObservationSet { observations })
    }
}

/// Date after which Landsat 7 acquisitions carry scan-line-corrector gaps
pub fn landsat7_slc_failure() -> NaiveDate {
    NaiveDate::from_ymd_opt(2003, 5, 31).unwrap_or(NaiveDate::MIN)
}

/// The six sensor-generation archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LandsatArchive {
    Landsat4,
    Landsat5,
    /// Landsat 7 before the scan-line-corrector failure
    Landsat7,
    /// Landsat 7 after the scan-line-corrector failure
    Landsat7SlcOff,
    Landsat8,
    Landsat9,
}

impl LandsatArchive {
    pub const ALL: [LandsatArchive; 6] = [
        LandsatArchive::Landsat4,
        LandsatArchive::Landsat5,
        LandsatArchive::Landsat7,
        LandsatArchive::Landsat7SlcOff,
        LandsatArchive::Landsat8,
        LandsatArchive::Landsat9,
    ];

    pub fn sensor(&self) -> Sensor {
        match self {
            LandsatArchive::Landsat4 => Sensor::Landsat4,
            LandsatArchive::Landsat5 => Sensor::Landsat5,
            LandsatArchive::Landsat7 | LandsatArchive::Landsat7SlcOff => Sensor::Landsat7,
            LandsatArchive::Landsat8 => Sensor::Landsat8,
            LandsatArchive::Landsat9 => Sensor::Landsat9,
        }
    }

    /// Quality mask applied to this archive's scenes
    pub fn mask_policy(&self) -> MaskPolicy {
        match self {
            LandsatArchive::Landsat7SlcOff => MaskPolicy::Degraded,
            _ => MaskPolicy::Standard,
        }
    }

    /// Archive a scene belongs to
    pub fn for_scene(sensor: Sensor, acquired: NaiveDate) -> Self {
        match sensor {
            Sensor::Landsat4 => LandsatArchive::Landsat4,
            Sensor::Landsat5 => LandsatArchive::Landsat5,
            Sensor::Landsat7 if acquired >= landsat7_slc_failure() => LandsatArchive::Landsat7SlcOff,
            Sensor::Landsat7 => LandsatArchive::Landsat7,
            Sensor::Landsat8 => LandsatArchive::Landsat8,
            Sensor::Landsat9 => LandsatArchive::Landsat9,
        }
    }

    /// True when the archive can hold acquisitions from the given year
    pub fn covers_year(&self, year: i32) -> bool {
        let (first, last) = match self {
            LandsatArchive::Landsat4 => (1982, 1993),
            LandsatArchive::Landsat5 => (1984, 2012),
            LandsatArchive::Landsat7 => (1999, 2003),
            LandsatArchive::Landsat7SlcOff => (2003, i32::MAX),
            LandsatArchive::Landsat8 => (2013, i32::MAX),
            LandsatArchive::Landsat9 => (2021, i32::MAX),
        };
        year >= first && year <= last
    }
}

/// Concatenate per-archive sets into one set restricted to the ROI
pub fn merge_archives<P>(
    sets: Vec<(LandsatArchive, ObservationSet<P>)>,
    roi: &BoundingBox,
) -> ObservationSet<P> {
    let mut parts = Vec::with_capacity(sets.len());
    for (archive, set) in sets {
        let in_roi = set.filter_bounds(roi);
        log::debug!(
            "{:?}: {} of {} observations intersect the ROI",
            archive,
            in_roi.len(),
            set.len()
        );
        parts.push(in_roi);
    }
    let merged = ObservationSet::merge(parts).sorted_by_date();
    log::info!("Merged {} observations from all archives", merged.len());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn obs(id: &str, sensor: Sensor, acquired: NaiveDate, footprint: BoundingBox) -> Observation<u8> {
        Observation {
            product_id: id.to_string(),
            sensor,
            acquired,
            footprint,
            image: 0,
        }
    }

    #[test]
    fn test_season_window_is_half_open() {
        let window = SeasonWindow::default().for_year(2015).unwrap();
        assert!(window.contains(date(2015, 6, 15)));
        assert!(window.contains(date(2015, 8, 31)));
        assert!(!window.contains(date(2015, 9, 1)));
        assert!(!window.contains(date(2015, 6, 14)));
    }

    #[test]
    fn test_merge_keeps_same_day_duplicates() {
        let roi = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let inside = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let outside = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        let day = date(2015, 7, 1);

        let l8 = ObservationSet::new(vec![
            obs("a", Sensor::Landsat8, day, inside),
            obs("b", Sensor::Landsat8, day, outside),
        ]);
        let l7 = ObservationSet::new(vec![obs("c", Sensor::Landsat7, day, inside)]);

        let merged = merge_archives(
            vec![(LandsatArchive::Landsat8, l8), (LandsatArchive::Landsat7SlcOff, l7)],
            &roi,
        );
        let ids: Vec<_> = merged.iter().map(|o| o.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_filter_windows_union() {
        let fp = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let set = ObservationSet::new(vec![
            obs("2012", Sensor::Landsat5, date(2012, 7, 1), fp),
            obs("2013", Sensor::Landsat8, date(2013, 7, 1), fp),
            obs("2013-late", Sensor::Landsat8, date(2013, 10, 1), fp),
            obs("2015", Sensor::Landsat8, date(2015, 7, 1), fp),
        ]);
        let windows = SeasonWindow::default().for_years([2012, 2013, 2014]).unwrap();
        assert_eq!(set.filter_windows(&windows).len(), 2);
    }

    #[test]
    fn test_landsat7_split_by_slc_failure() {
        assert_eq!(
            LandsatArchive::for_scene(Sensor::Landsat7, date(2003, 5, 30)),
            LandsatArchive::Landsat7
        );
        let after = LandsatArchive::for_scene(Sensor::Landsat7, date(2003, 5, 31));
        assert_eq!(after, LandsatArchive::Landsat7SlcOff);
        assert_eq!(after.mask_policy(), MaskPolicy::Degraded);
        assert_eq!(LandsatArchive::Landsat8.mask_policy(), MaskPolicy::Standard);
    }
}
