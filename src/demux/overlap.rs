//! Demultiplexing of overlapping-window DIA acquisitions, where each cycle
//! repeats with an m/z offset so neighboring spectra share window
//! boundaries rather than whole windows.
use std::cmp::Ordering;
use std::sync::Arc;

use nalgebra::DMatrix;

use crate::io::SpectrumSource;
use crate::mass_error::Tolerance;

use super::codec::PrecursorMaskCodec;
use super::extractor::SpectrumPeakExtractor;
use super::helpers::find_nearby_spectra;
use super::msx::elution_weight;
use super::spline::CubicSpline;
use super::{DemuxBlock, DemuxError, Demultiplexer};

/// Sort tolerance for centroid distances; candidates whose distances agree
/// to within this are treated as tied and keep their encounter order
const DISTANCE_EPS: f64 = 1e-3;

#[derive(Debug, Clone)]
pub struct OverlapParams {
    pub apply_weighting: bool,
    pub mass_error: Tolerance,
    pub interpolate_retention_time: bool,
}

impl Default for OverlapParams {
    fn default() -> Self {
        Self {
            apply_weighting: false,
            mass_error: Tolerance::default(),
            interpolate_retention_time: true,
        }
    }
}

/// Builds small demultiplexing blocks over the band of windows around the
/// target spectrum in precursor-m/z space.
///
/// Neighbors are ranked by the distance between their window centroids and
/// the target's, selecting spectra that cover the same m/z region from
/// adjacent (offset) cycles rather than the temporally nearest spectra.
/// Their intensities are then resampled onto the target's retention time
/// with a cubic spline across same-phase repeats, unless interpolation is
/// disabled.
pub struct OverlapDemultiplexer {
    source: Arc<dyn SpectrumSource>,
    codec: Arc<PrecursorMaskCodec>,
    params: OverlapParams,
    /// Windows (and neighbor spectra) per approximation block
    overlap_regions_in_approx: usize,
    /// Same-phase repeats used for retention-time interpolation
    cycles_in_block: usize,
}

impl OverlapDemultiplexer {
    pub fn new(
        source: Arc<dyn SpectrumSource>,
        codec: Arc<PrecursorMaskCodec>,
        params: OverlapParams,
    ) -> Self {
        Self {
            source,
            codec,
            params,
            overlap_regions_in_approx: 7,
            cycles_in_block: 3,
        }
    }

    fn window_centroid(&self, indices: &[usize]) -> f64 {
        indices.iter().sum::<usize>() as f64 / indices.len() as f64
    }
}

/// Compare with near-ties considered equal so that a stable sort keeps the
/// encounter order of equivalent candidates
fn cmp_with_eps(left: f64, right: f64) -> Ordering {
    if left < right && right - left > DISTANCE_EPS {
        Ordering::Less
    } else if right < left && left - right > DISTANCE_EPS {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

impl Demultiplexer for OverlapDemultiplexer {
    fn block_indices(&self, index: usize, block_extra: f64) -> Result<Vec<usize>, DemuxError> {
        let block_extra = block_extra.max(0.0);
        let count = self.codec.spectra_per_cycle()
            + (block_extra * self.codec.spectra_per_cycle() as f64).round() as usize;
        find_nearby_spectra(self.source.as_ref(), index, count, 1)
    }

    fn build_block(&self, index: usize, mux_indices: &[usize]) -> Result<DemuxBlock, DemuxError> {
        let target = self.source.spectrum(index)?;
        let extractor = SpectrumPeakExtractor::new(&target.mzs, self.params.mass_error);

        let num_rows = self.overlap_regions_in_approx; // m
        let num_windows = self.overlap_regions_in_approx; // n
        let num_transitions = target.len(); // k

        let deconv_indices = self.codec.spectrum_to_indices(&target)?;
        let centroid = self.window_centroid(&deconv_indices);

        // The segment of the full mask vector this block approximates
        let ideal_lower = (centroid - num_windows as f64 / 2.0).round() as i64;
        let max_lower = self.codec.num_demux_windows().saturating_sub(num_windows) as i64;
        let lower_mz_bound = ideal_lower.clamp(0, max_lower.max(0)) as usize;

        // Rank the candidate spectra by how far their window centroids sit
        // from the target's in m/z space
        let mut distances: Vec<(f64, usize)> = Vec::with_capacity(mux_indices.len());
        for &scan_index in mux_indices {
            let neighbor = self.source.spectrum(scan_index)?;
            let neighbor_indices = self.codec.spectrum_to_indices(&neighbor)?;
            let distance = self.window_centroid(&neighbor_indices) - centroid;
            distances.push((distance, scan_index));
        }
        if distances.len() < num_rows {
            return Err(DemuxError::InsufficientNeighbors {
                index,
                needed: num_rows,
            });
        }
        distances.sort_by(|l, r| cmp_with_eps(l.0.abs(), r.0.abs()));
        distances.truncate(num_rows);
        distances.sort_by(|l, r| cmp_with_eps(l.0, r.0));
        let scans_in_deconv: Vec<usize> = distances.iter().map(|&(_, scan)| scan).collect();

        let mut masks = DMatrix::zeros(num_rows, num_windows);
        for (row, &current) in scans_in_deconv.iter().enumerate() {
            let spectrum = self.source.spectrum(current)?;
            let full_mask = self.codec.mask(&spectrum, 1.0)?;
            for column in 0..num_windows {
                masks[(row, column)] = full_mask[lower_mz_bound + column];
            }
        }

        let mut signal = DMatrix::zeros(num_rows, num_transitions);
        if self.params.interpolate_retention_time {
            let target_time = target
                .start_time()
                .ok_or(DemuxError::MissingRetentionTime { index })?;

            let mut binned = DMatrix::zeros(self.cycles_in_block, num_transitions);
            let mut scan_times = vec![0.0; self.cycles_in_block];
            let mut column_values = vec![0.0; self.cycles_in_block];
            for (row, &scan) in scans_in_deconv.iter().enumerate() {
                // same-phase spectra from adjacent cycles bracket the
                // target in time
                let interpolation_indices = find_nearby_spectra(
                    self.source.as_ref(),
                    scan,
                    self.cycles_in_block,
                    self.codec.spectra_per_cycle(),
                )?;

                for (i, &spectrum_index) in interpolation_indices.iter().enumerate() {
                    let spectrum = self.source.spectrum(spectrum_index)?;
                    scan_times[i] = spectrum.start_time().ok_or(
                        DemuxError::MissingRetentionTime {
                            index: spectrum_index,
                        },
                    )?;
                    extractor.extract_into(&spectrum, &mut binned, i, 1.0);
                }

                for transition in 0..num_transitions {
                    for (i, value) in column_values.iter_mut().enumerate() {
                        *value = binned[(i, transition)];
                    }
                    let spline = CubicSpline::new(&scan_times, &column_values)?;
                    signal[(row, transition)] = spline.evaluate(target_time).max(0.0);
                }
            }
        } else {
            let spectra_per_cycle = self.codec.spectra_per_cycle();
            for (row, &current) in scans_in_deconv.iter().enumerate() {
                let spectrum = self.source.spectrum(current)?;
                let weight = if self.params.apply_weighting {
                    elution_weight(index, current, spectra_per_cycle)
                } else {
                    1.0
                };
                extractor.extract_into(&spectrum, &mut signal, row, weight);
            }
        }

        // Columns of the solution that carry the target's own windows,
        // relative to the block's segment
        let reference_indices = deconv_indices
            .iter()
            .map(|&window_index| {
                debug_assert!(window_index >= lower_mz_bound);
                window_index.saturating_sub(lower_mz_bound)
            })
            .collect();

        Ok(DemuxBlock {
            masks,
            signal,
            reference_indices,
        })
    }
}
