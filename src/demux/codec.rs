//! Inference of the acquisition scheme from an ordered spectrum list and
//! translation of multiplexed spectra into design-matrix rows.
use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::io::SpectrumSource;
use crate::spectrum::{Precursor, Spectrum};

use super::helpers::{precursor_fill_time, precursor_key};
use super::window::{hash_mz, DemuxWindow, IsolationWindow, MzHash};
use super::{DemuxError, DemuxParams};

/// Decodes the precursor multiplexing scheme of an acquisition and maps
/// individual multiplexed spectra onto the columns of the demultiplexing
/// design matrix.
///
/// Constructed once per input list by scanning forward until the cycle of
/// distinct isolation windows stabilizes, then resolving window overlap
/// into non-overlapping sub-windows. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct PrecursorMaskCodec {
    /// The resolved, sorted, de-duplicated demultiplexing windows
    isolation_windows: Vec<IsolationWindow>,
    spectra_per_cycle: usize,
    precursors_per_spectrum: usize,
    overlaps_per_cycle: usize,
    variable_fill: bool,
}

impl PrecursorMaskCodec {
    pub fn from_source(
        source: &dyn SpectrumSource,
        params: &DemuxParams,
    ) -> Result<Self, DemuxError> {
        let (precursor_windows, precursors_per_spectrum) = Self::identify_cycle(source)?;
        let spectra_per_cycle = precursor_windows.len() / precursors_per_spectrum;
        let (isolation_windows, overlaps_per_cycle) =
            Self::identify_overlap(precursor_windows, params.minimum_window_size);
        debug!(
            "Inferred acquisition scheme: {} windows, {} spectra/cycle, {} precursors/spectrum, {} overlaps/cycle",
            isolation_windows.len(),
            spectra_per_cycle,
            precursors_per_spectrum,
            overlaps_per_cycle
        );
        Ok(Self {
            isolation_windows,
            spectra_per_cycle,
            precursors_per_spectrum,
            overlaps_per_cycle,
            variable_fill: params.variable_fill,
        })
    }

    /// Walk the list forward collecting distinct precursor isolation
    /// windows until the set has been seen through twice without growing,
    /// which marks a stable repeating cycle.
    fn identify_cycle(
        source: &dyn SpectrumSource,
    ) -> Result<(Vec<IsolationWindow>, usize), DemuxError> {
        let mut precursors_per_spectrum = 0usize;
        let mut first_ms2 = None;
        for index in 0..source.len() {
            let spectrum = source.spectrum(index)?;
            if spectrum.ms_level() == 2 {
                precursors_per_spectrum = spectrum.precursors().len();
                first_ms2 = Some(index);
                break;
            }
        }
        let first_ms2 = first_ms2.ok_or(DemuxError::NoMs2Spectra)?;
        if precursors_per_spectrum == 0 {
            return Err(DemuxError::NoPrecursors { index: first_ms2 });
        }

        let mut precursor_map: IndexMap<String, Precursor> = IndexMap::new();
        let mut mapped_already = 0usize;
        for index in first_ms2..source.len() {
            if mapped_already > 2 * precursor_map.len() {
                break;
            }
            let spectrum = source.spectrum(index)?;
            if spectrum.ms_level() != 2 {
                continue;
            }
            if spectrum.precursors().len() != precursors_per_spectrum {
                return Err(DemuxError::PrecursorCountVaries {
                    index,
                    expected: precursors_per_spectrum,
                    found: spectrum.precursors().len(),
                });
            }
            for precursor in spectrum.precursors() {
                let key = precursor_key(precursor)?;
                if precursor_map.contains_key(&key) {
                    mapped_already += 1;
                } else {
                    mapped_already = 0;
                    precursor_map.insert(key, precursor.clone());
                }
            }
        }

        let mut keyed: Vec<(f64, &Precursor)> = precursor_map
            .iter()
            .map(|(key, p)| (key.parse().unwrap_or(f64::NAN), p))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut windows = Vec::with_capacity(keyed.len());
        for (_, precursor) in keyed {
            windows.push(IsolationWindow::from_precursor(precursor)?);
        }
        Ok((windows, precursors_per_spectrum))
    }

    /// Resolve overlapping precursor windows into the sorted set of
    /// non-overlapping sub-windows they cover, and the maximum multiplicity
    /// with which any sub-window is covered.
    fn identify_overlap(
        windows: Vec<IsolationWindow>,
        minimum_window_size: f64,
    ) -> (Vec<IsolationWindow>, usize) {
        if windows.len() <= 1 {
            return (windows, 1);
        }
        let min_hash_gap = hash_mz(minimum_window_size);

        // Every distinct boundary, keyed on hash; the first full-precision
        // value seen for a hash is the representative
        let mut boundaries: BTreeMap<MzHash, f64> = BTreeMap::new();
        for w in windows.iter() {
            boundaries.entry(w.window.mz_low).or_insert(w.low_mz);
            boundaries.entry(w.window.mz_high).or_insert(w.high_mz);
        }
        let boundaries: Vec<(MzHash, f64)> = boundaries.into_iter().collect();

        // Merge boundary pairs closer than the minimum window size to their
        // midpoint. A narrow gap usually is a shared detector edge observed
        // twice; if it is instead a genuinely tiny window, the center match
        // below discards the spurious merged edge.
        let mut exact: Vec<f64> = Vec::with_capacity(boundaries.len());
        let mut low = 0usize;
        while low + 1 < boundaries.len() {
            if boundaries[low + 1].0 - boundaries[low].0 > min_hash_gap {
                exact.push(boundaries[low].1);
                low += 1;
            } else {
                exact.push((boundaries[low].1 + boundaries[low + 1].1) / 2.0);
                low += 2;
            }
        }
        if low < boundaries.len() {
            exact.push(boundaries[low].1);
        }

        // Candidate sub-windows between successive boundaries
        let candidates: Vec<IsolationWindow> = exact
            .windows(2)
            .map(|pair| IsolationWindow::new(pair[0], pair[1]))
            .collect();

        // Keep each candidate covered by at least one precursor window and
        // count the deepest coverage
        let mut used = Vec::with_capacity(candidates.len());
        let mut max_count = 1usize;
        for candidate in candidates {
            let count = windows
                .iter()
                .filter(|w| w.window.contains_center(&candidate.window))
                .count();
            if count > 0 {
                used.push(candidate);
                max_count = max_count.max(count);
            }
        }
        (used, max_count)
    }

    /// The design-matrix column indices covered by the precursors of
    /// `spectrum`, exactly `overlaps_per_cycle * precursors_per_spectrum`
    /// of them.
    pub fn spectrum_to_indices(&self, spectrum: &Spectrum) -> Result<Vec<usize>, DemuxError> {
        if spectrum.precursors().len() != self.precursors_per_spectrum {
            return Err(DemuxError::PrecursorCountVaries {
                index: spectrum.index(),
                expected: self.precursors_per_spectrum,
                found: spectrum.precursors().len(),
            });
        }

        let mut precursor_windows = Vec::with_capacity(spectrum.precursors().len());
        for precursor in spectrum.precursors() {
            precursor_windows.push(DemuxWindow::from_precursor(precursor)?);
        }
        precursor_windows.sort_unstable();

        let mut indices = Vec::with_capacity(self.overlaps_per_cycle * precursor_windows.len());
        // Both the precursor windows and the resolved windows are sorted,
        // so the search can resume where the previous precursor stopped
        let mut search_lower_bound = 0usize;
        for window in precursor_windows.iter() {
            for (offset, candidate) in self.isolation_windows[search_lower_bound..]
                .iter()
                .enumerate()
            {
                if window.mz_high <= candidate.window.mz_low {
                    // every remaining window starts past this precursor
                    break;
                }
                if window.contains_center(&candidate.window) {
                    let position = search_lower_bound + offset;
                    indices.push(position);
                }
            }
            if let Some(last) = indices.last() {
                search_lower_bound = last + 1;
            }
        }

        let expected = self.overlaps_per_cycle * self.precursors_per_spectrum;
        if indices.len() != expected {
            return Err(DemuxError::WindowCountMismatch {
                index: spectrum.index(),
                expected,
                found: indices.len(),
            });
        }
        Ok(indices)
    }

    /// The `(column, value)` marks that make up the design-matrix row for
    /// `spectrum` at the given weight
    fn mask_marks(
        &self,
        spectrum: &Spectrum,
        weight: f64,
    ) -> Result<Vec<(usize, f64)>, DemuxError> {
        let indices = self.spectrum_to_indices(spectrum)?;
        if !self.variable_fill {
            return Ok(indices.into_iter().map(|i| (i, weight)).collect());
        }

        // Each mark carries the fill time of the precursor whose window
        // contains the marked sub-window
        let demux_windows: Vec<DemuxWindow> = indices
            .iter()
            .map(|&i| self.isolation_windows[i].window)
            .collect();
        let mut marks: Vec<(usize, f64)> = Vec::with_capacity(indices.len());
        for precursor in spectrum.precursors() {
            let precursor_window = DemuxWindow::from_precursor(precursor)?;
            for (i, window) in demux_windows.iter().enumerate() {
                if precursor_window.contains_center(window) {
                    marks.push((indices[i], weight * precursor_fill_time(precursor)?));
                    break;
                }
            }
        }
        Ok(marks)
    }

    /// The design-matrix row for `spectrum` as a standalone vector of
    /// length [`demux_block_size`](Self::demux_block_size)
    pub fn mask(&self, spectrum: &Spectrum, weight: f64) -> Result<DVector<f64>, DemuxError> {
        let mut mask = DVector::zeros(self.demux_block_size());
        for (index, value) in self.mask_marks(spectrum, weight)? {
            mask[index] = value;
        }
        Ok(mask)
    }

    /// Write the design-matrix row for `spectrum` into row `row` of `m`,
    /// zeroing it first
    pub fn write_mask(
        &self,
        spectrum: &Spectrum,
        m: &mut DMatrix<f64>,
        row: usize,
        weight: f64,
    ) -> Result<(), DemuxError> {
        let marks = self.mask_marks(spectrum, weight)?;
        m.row_mut(row).fill(0.0);
        for (index, value) in marks {
            m[(row, index)] = value;
        }
        Ok(())
    }

    /// The full-precision window at design-matrix column `i`
    pub fn isolation_window(&self, i: usize) -> &IsolationWindow {
        &self.isolation_windows[i]
    }

    /// The number of resolved demultiplexing windows, the index domain of
    /// [`spectrum_to_indices`](Self::spectrum_to_indices)
    pub fn num_demux_windows(&self) -> usize {
        self.isolation_windows.len()
    }

    /// The number of MS2 spectra required to cover every precursor window
    /// once, ignoring overlap
    pub fn spectra_per_cycle(&self) -> usize {
        self.spectra_per_cycle
    }

    /// The number of precursor isolations per MS2 spectrum, constant across
    /// the input
    pub fn precursors_per_spectrum(&self) -> usize {
        self.precursors_per_spectrum
    }

    /// The maximum multiplicity with which any sub-window is covered across
    /// a cycle; 1 means no overlap
    pub fn overlaps_per_cycle(&self) -> usize {
        self.overlaps_per_cycle
    }

    /// The number of columns of the full design matrix
    pub fn demux_block_size(&self) -> usize {
        self.spectra_per_cycle * self.precursors_per_spectrum * self.overlaps_per_cycle
    }
}
