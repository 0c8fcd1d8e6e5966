//! Projection of irregular peak lists onto a fixed grid of m/z bins.
use nalgebra::DMatrix;

use crate::mass_error::Tolerance;
use crate::spectrum::Spectrum;

/// Bins spectrum peaks onto a fixed set of non-overlapping m/z intervals.
///
/// Built once per demultiplexing block from the target spectrum's m/z axis
/// and a mass tolerance. Where tolerance intervals of adjacent targets
/// overlap, both edges are snapped to the midpoint of the overlap region so
/// that a peak lands in exactly one bin and total intensity is conserved
/// even on profile data.
#[derive(Debug, Clone)]
pub struct SpectrumPeakExtractor {
    /// Closed `[low, high]` intervals, one per target m/z, ascending and
    /// disjoint after snapping
    ranges: Vec<(f64, f64)>,
    min_value: f64,
    max_value: f64,
    /// The widest half-interval, bounding how far below a query a bin
    /// containing it can start
    max_delta: f64,
}

impl SpectrumPeakExtractor {
    pub fn new(peak_mzs: &[f64], mass_error: Tolerance) -> Self {
        let mut max_delta = 0.0f64;
        let mut ranges: Vec<(f64, f64)> = Vec::with_capacity(peak_mzs.len());
        for &mz in peak_mzs {
            let delta = mass_error.delta(mz);
            max_delta = max_delta.max(delta);
            ranges.push((mz - delta, mz + delta));
        }

        for i in 1..ranges.len() {
            if ranges[i - 1].1 > ranges[i].0 {
                let center = (ranges[i - 1].0 + ranges[i - 1].1 + ranges[i].0 + ranges[i].1) / 4.0;
                ranges[i - 1].1 = center;
                ranges[i].0 = center;
            }
        }

        let min_value = ranges.first().map(|r| r.0).unwrap_or(f64::INFINITY);
        let max_value = ranges.last().map(|r| r.1).unwrap_or(f64::NEG_INFINITY);
        Self {
            ranges,
            min_value,
            max_value,
            max_delta,
        }
    }

    /// The number of bins
    pub fn num_bins(&self) -> usize {
        self.ranges.len()
    }

    /// Sweep the peaks of `spectrum` into row `row` of `m`, zeroing the row
    /// first and scaling it by `weight` afterwards.
    ///
    /// Peaks and bins are both ascending, so a single cursor pass rejects
    /// out-of-range peaks and locates candidate bins in O(1) amortized per
    /// peak.
    pub fn extract_into(&self, spectrum: &Spectrum, m: &mut DMatrix<f64>, row: usize, weight: f64) {
        m.row_mut(row).fill(0.0);

        let mut bin_start = 0usize;
        for (&query, &intensity) in spectrum.mzs.iter().zip(spectrum.intensities.iter()) {
            if query < self.min_value {
                continue;
            }
            if query > self.max_value {
                break;
            }
            // advance the shared cursor to the first bin that could contain
            // this or any later peak; a containing bin is at most one full
            // interval width below the query
            let min_start = query - 2.0 * self.max_delta;
            while bin_start < self.ranges.len() && self.ranges[bin_start].0 < min_start {
                bin_start += 1;
            }
            for (offset, &(low, high)) in self.ranges[bin_start..].iter().enumerate() {
                if low > query {
                    break;
                }
                if query <= high {
                    m[(row, bin_start + offset)] += intensity;
                }
            }
        }

        if weight != 1.0 {
            m.row_mut(row).scale_mut(weight);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::SpectrumDescription;

    fn spectrum_of(mzs: Vec<f64>, intensities: Vec<f64>) -> Spectrum {
        Spectrum::new(SpectrumDescription::default(), mzs, intensities)
    }

    #[test]
    fn test_extract_basic() {
        let targets = vec![100.0, 200.0, 300.0];
        let extractor = SpectrumPeakExtractor::new(&targets, Tolerance::Da(0.5));
        assert_eq!(extractor.num_bins(), 3);

        let spectrum = spectrum_of(
            vec![99.8, 100.2, 150.0, 200.1, 300.4, 300.6],
            vec![1.0, 2.0, 100.0, 5.0, 7.0, 50.0],
        );
        let mut m = DMatrix::zeros(1, 3);
        extractor.extract_into(&spectrum, &mut m, 0, 1.0);
        // the two peaks near 100 accumulate, 150 falls between bins,
        // 300.6 falls past the last bin edge
        assert_eq!(m[(0, 0)], 3.0);
        assert_eq!(m[(0, 1)], 5.0);
        assert_eq!(m[(0, 2)], 7.0);
    }

    #[test]
    fn test_extract_weight_and_rezero() {
        let targets = vec![100.0, 200.0];
        let extractor = SpectrumPeakExtractor::new(&targets, Tolerance::Da(0.5));
        let spectrum = spectrum_of(vec![100.0, 200.0], vec![4.0, 8.0]);
        let mut m = DMatrix::from_element(2, 2, 3.0);
        extractor.extract_into(&spectrum, &mut m, 1, 0.25);
        assert_eq!(m[(1, 0)], 1.0);
        assert_eq!(m[(1, 1)], 2.0);
        // the other row is untouched
        assert_eq!(m[(0, 0)], 3.0);
    }

    #[test]
    fn test_overlapping_bins_snap_to_midpoint() {
        // 0.6 Da tolerance overlaps the 1.0-spaced targets
        let targets = vec![500.0, 501.0];
        let extractor = SpectrumPeakExtractor::new(&targets, Tolerance::Da(0.6));
        let spectrum = spectrum_of(vec![500.4, 500.6], vec![10.0, 20.0]);
        let mut m = DMatrix::zeros(1, 2);
        extractor.extract_into(&spectrum, &mut m, 0, 1.0);
        // the shared region splits at 500.5: each peak lands once
        assert_eq!(m[(0, 0)], 10.0);
        assert_eq!(m[(0, 1)], 20.0);
        assert_eq!(m.sum(), 30.0);
    }

    #[test]
    fn test_out_of_range_peaks() {
        let targets = vec![100.0, 200.0];
        let extractor = SpectrumPeakExtractor::new(&targets, Tolerance::PPM(20.0));
        let spectrum = spectrum_of(vec![50.0, 100.0005, 250.0], vec![1.0, 2.0, 3.0]);
        let mut m = DMatrix::zeros(1, 2);
        extractor.extract_into(&spectrum, &mut m, 0, 1.0);
        assert_eq!(m[(0, 0)], 2.0);
        assert_eq!(m[(0, 1)], 0.0);
    }

    #[test]
    fn test_empty_grid() {
        let extractor = SpectrumPeakExtractor::new(&[], Tolerance::Da(0.5));
        let spectrum = spectrum_of(vec![100.0], vec![1.0]);
        let mut m = DMatrix::zeros(1, 0);
        extractor.extract_into(&spectrum, &mut m, 0, 1.0);
        assert_eq!(extractor.num_bins(), 0);
    }
}
