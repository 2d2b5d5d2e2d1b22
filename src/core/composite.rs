use crate::core::collection::{DateWindow, ObservationSet, SeasonWindow};
use crate::core::indices::SpectralIndex;
use crate::types::{BandImage, BandKey, BandStack, BurnError, BurnResult, HasBands, NODATA};
use ndarray::Array2;
use num_traits::Float;

/// Pixelwise aggregation applied across a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Median,
    Min,
    Mean,
}

impl Reducer {
    /// Reduce the valid values of one pixel; no-data when none are valid
    pub fn reduce<T: Float>(&self, values: &mut Vec<T>) -> T {
        values.retain(|v| v.is_finite());
        if values.is_empty() {
            return T::nan();
        }
        match self {
            Reducer::Min => values.iter().copied().fold(T::infinity(), T::min),
            Reducer::Mean => {
                let sum = values.iter().copied().fold(T::zero(), |acc, v| acc + v);
                let count = <T as num_traits::NumCast>::from(values.len()).unwrap_or_else(T::one);
                sum / count
            }
            Reducer::Median => {
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = values.len() / 2;
                if values.len() % 2 == 1 {
                    values[mid]
                } else {
                    let two = T::one() + T::one();
                    (values[mid - 1] + values[mid]) / two
                }
            }
        }
    }
}

/// Pixelwise minimum of two rasters that ignores no-data on either side
pub fn nan_min(a: &BandImage, b: &BandImage) -> BandImage {
    let mut out = a.clone();
    ndarray::Zip::from(&mut out).and(b).for_each(|x, &y| {
        *x = match (x.is_finite(), y.is_finite()) {
            (true, true) => x.min(y),
            (false, true) => y,
            (_, false) => *x,
        };
    });
    out
}

/// Band-wise [`nan_min`] of two stacks
pub fn stack_nan_min<K: BandKey>(a: &BandStack<K>, b: &BandStack<K>) -> BurnResult<BandStack<K>> {
    BandStack::from_fn(|key| nan_min(a.band(key), b.band(key)))
}

/// Which side of the fire year a seasonal composite describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeRole {
    /// Season before the analysis year
    Pre,
    /// Season after the analysis year
    Post,
}

impl CompositeRole {
    pub fn prefix(&self) -> &'static str {
        match self {
            CompositeRole::Pre => "pre_",
            CompositeRole::Post => "post_",
        }
    }

    /// Year offset from the analysis year
    pub fn year_offset(&self) -> i32 {
        match self {
            CompositeRole::Pre => -1,
            CompositeRole::Post => 1,
        }
    }
}

/// Index composite tagged with its role relative to the fire year
#[derive(Debug, Clone)]
pub struct SeasonalComposite {
    pub role: CompositeRole,
    pub window: DateWindow,
    pub bands: BandStack<SpectralIndex>,
}

impl SeasonalComposite {
    /// Band names carrying the `pre_` / `post_` prefix
    pub fn band_names(&self) -> Vec<String> {
        self.bands
            .band_names()
            .into_iter()
            .map(|name| format!("{}{}", self.role.prefix(), name))
            .collect()
    }
}

/// Reduces observation sets over time windows into composite rasters
pub struct TemporalCompositor {
    shape: (usize, usize),
}

impl TemporalCompositor {
    /// Compositor for the analysis grid shape
    pub fn new(shape: (usize, usize)) -> Self {
        Self { shape }
    }

    /// Composite one time window.
    ///
    /// The output always carries the full band set; a window with no
    /// observations yields an all-no-data stack instead of failing.
    pub fn composite<K, P>(
        &self,
        set: &ObservationSet<P>,
        window: &DateWindow,
        reducer: Reducer,
    ) -> BurnResult<BandStack<K>>
    where
        K: BandKey,
        P: HasBands<K>,
    {
        let in_window = set.filter_date(window);
        self.reduce_set(&in_window, reducer, &format!("{}..{}", window.start, window.end))
    }

    /// Composite the union of several windows
    pub fn composite_windows<K, P>(
        &self,
        set: &ObservationSet<P>,
        windows: &[DateWindow],
        reducer: Reducer,
    ) -> BurnResult<BandStack<K>>
    where
        K: BandKey,
        P: HasBands<K>,
    {
        let in_windows = set.filter_windows(windows);
        self.reduce_set(&in_windows, reducer, &format!("{} windows", windows.len()))
    }

    /// Pre- or post-fire seasonal median for an analysis year
    pub fn seasonal<P: HasBands<SpectralIndex>>(
        &self,
        set: &ObservationSet<P>,
        season: &SeasonWindow,
        analysis_year: i32,
        role: CompositeRole,
    ) -> BurnResult<SeasonalComposite> {
        let window = season.for_year(analysis_year + role.year_offset())?;
        let bands = self.composite(set, &window, Reducer::Median)?;
        Ok(SeasonalComposite { role, window, bands })
    }

    fn reduce_set<K, P>(
        &self,
        set: &ObservationSet<P>,
        reducer: Reducer,
        label: &str,
    ) -> BurnResult<BandStack<K>>
    where
        K: BandKey,
        P: HasBands<K>,
    {
        if set.is_empty() {
            log::warn!("No observations in {}; emitting no-data composite", label);
            return Ok(BandStack::no_data(self.shape));
        }

        let stacks: Vec<&BandStack<K>> = set.iter().map(|o| o.image.bands()).collect();
        if let Some(bad) = stacks.iter().find(|s| s.dim() != self.shape) {
            return Err(BurnError::ShapeMismatch {
                expected: self.shape,
                actual: bad.dim(),
            });
        }

        log::debug!("{:?} composite of {} observations over {}", reducer, stacks.len(), label);

        let (rows, cols) = self.shape;
        BandStack::from_fn(|key| {
            let mut out = Array2::from_elem(self.shape, NODATA);
            let mut values = Vec::with_capacity(stacks.len());
            for row in 0..rows {
                for col in 0..cols {
                    values.clear();
                    values.extend(stacks.iter().map(|s| s.band(key)[[row, col]]));
                    out[[row, col]] = reducer.reduce(&mut values);
                }
            }
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{is_nodata, BoundingBox, Observation, Sensor};
    use chrono::NaiveDate;

    fn obs(month: u32, day: u32, year: i32, nbr: f32) -> Observation<BandStack<SpectralIndex>> {
        let mut stack = BandStack::<SpectralIndex>::filled((2, 2), 0.1);
        stack.band_mut(SpectralIndex::Nbr).fill(nbr);
        Observation {
            product_id: format!("{}-{}-{}", year, month, day),
            sensor: Sensor::Landsat8,
            acquired: NaiveDate::from_ymd_opt(year, month, day).unwrap(),
            footprint: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            image: stack,
        }
    }

    #[test]
    fn test_reducers_skip_nodata() {
        let values = vec![3.0f32, f32::NAN, 1.0, 2.0, 10.0];
        assert_eq!(Reducer::Min.reduce(&mut values.clone()), 1.0);
        assert_eq!(Reducer::Mean.reduce(&mut values.clone()), 4.0);
        assert_eq!(Reducer::Median.reduce(&mut values.clone()), 2.5);
        assert!(Reducer::Median.reduce(&mut vec![f32::NAN]).is_nan());
    }

    #[test]
    fn test_empty_window_yields_full_nodata_stack() {
        let compositor = TemporalCompositor::new((3, 4));
        let set: ObservationSet<BandStack<SpectralIndex>> = ObservationSet::default();
        let window = SeasonWindow::default().for_year(1990).unwrap();
        let composite: BandStack<SpectralIndex> =
            compositor.composite(&set, &window, Reducer::Median).unwrap();
        assert_eq!(composite.band_names().len(), 15);
        assert_eq!(composite.dim(), (3, 4));
        for (_, band) in composite.iter() {
            assert!(band.iter().all(|v| is_nodata(*v)));
        }
    }

    #[test]
    fn test_seasonal_composites_use_adjacent_years() {
        let set = ObservationSet::new(vec![
            obs(7, 1, 2014, 0.6),
            obs(7, 20, 2014, 0.4),
            obs(8, 10, 2014, 0.5),
            obs(9, 5, 2014, -0.9),
            obs(7, 1, 2015, 0.0),
            obs(7, 1, 2016, -0.2),
        ]);
        let compositor = TemporalCompositor::new((2, 2));
        let season = SeasonWindow::default();

        let pre = compositor.seasonal(&set, &season, 2015, CompositeRole::Pre).unwrap();
        assert_eq!(pre.bands.band(SpectralIndex::Nbr)[[0, 0]], 0.5);
        assert_eq!(pre.band_names()[0], "pre_nbr");

        let post = compositor.seasonal(&set, &season, 2015, CompositeRole::Post).unwrap();
        assert_eq!(post.bands.band(SpectralIndex::Nbr)[[1, 1]], -0.2);
        assert_eq!(post.band_names()[1], "post_nbr2");
    }

    #[test]
    fn test_nan_min_prefers_valid_side() {
        let a = Array2::from_shape_vec((1, 3), vec![f32::NAN, 0.2, f32::NAN]).unwrap();
        let b = Array2::from_shape_vec((1, 3), vec![0.5, 0.7, f32::NAN]).unwrap();
        let out = nan_min(&a, &b);
        assert_eq!(out[[0, 0]], 0.5);
        assert_eq!(out[[0, 1]], 0.2);
        assert!(out[[0, 2]].is_nan());
    }
}
