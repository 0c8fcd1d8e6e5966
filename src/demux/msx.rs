//! Demultiplexing of MSX acquisitions, where each MS2 spectrum co-isolates
//! several disjoint precursor windows.
use std::sync::Arc;

use nalgebra::DMatrix;

use crate::io::SpectrumSource;
use crate::mass_error::Tolerance;

use super::codec::PrecursorMaskCodec;
use super::extractor::SpectrumPeakExtractor;
use super::helpers::{find_nearby_spectra, precursor_fill_time};
use super::{DemuxBlock, DemuxError, Demultiplexer};

#[derive(Debug, Clone, Default)]
pub struct MsxParams {
    pub apply_weighting: bool,
    pub mass_error: Tolerance,
    pub variable_fill: bool,
}

/// Builds demultiplexing blocks whose design rows are whole-cycle mask
/// vectors: one row per neighbor spectrum, one column per demultiplexing
/// window in the cycle.
pub struct MsxDemultiplexer {
    source: Arc<dyn SpectrumSource>,
    codec: Arc<PrecursorMaskCodec>,
    params: MsxParams,
}

impl MsxDemultiplexer {
    pub fn new(
        source: Arc<dyn SpectrumSource>,
        codec: Arc<PrecursorMaskCodec>,
        params: MsxParams,
    ) -> Self {
        Self {
            source,
            codec,
            params,
        }
    }
}

/// Weight that models intensity decay across the chromatographic peak: the
/// further a neighbor is from the target in scan index, the less its
/// intensities resemble the target's, with the falloff scaled to a width
/// on the order of one acquisition cycle.
pub(super) fn elution_weight(target: usize, neighbor: usize, spectra_per_cycle: usize) -> f64 {
    let scan_diff = target as f64 - neighbor as f64;
    1.0 / (1.0 + (5.0 * scan_diff / spectra_per_cycle as f64).powi(2))
}

impl Demultiplexer for MsxDemultiplexer {
    fn block_indices(&self, index: usize, block_extra: f64) -> Result<Vec<usize>, DemuxError> {
        let block_extra = block_extra.max(0.0);
        let count = self.codec.demux_block_size()
            + (block_extra * self.codec.spectra_per_cycle() as f64).round() as usize;
        find_nearby_spectra(self.source.as_ref(), index, count, 1)
    }

    fn build_block(&self, index: usize, mux_indices: &[usize]) -> Result<DemuxBlock, DemuxError> {
        let target = self.source.spectrum(index)?;
        let extractor = SpectrumPeakExtractor::new(&target.mzs, self.params.mass_error);

        let mut masks = DMatrix::zeros(mux_indices.len(), self.codec.demux_block_size());
        let mut signal = DMatrix::zeros(mux_indices.len(), target.len());

        let spectra_per_cycle = self.codec.spectra_per_cycle();
        for (row, &current) in mux_indices.iter().enumerate() {
            let spectrum = self.source.spectrum(current)?;
            let mut weight = if self.params.apply_weighting {
                elution_weight(index, current, spectra_per_cycle)
            } else {
                1.0
            };
            self.codec.write_mask(&spectrum, &mut masks, row, weight)?;

            if self.params.variable_fill {
                // intensities in a variable-fill scan are rescaled by the
                // total accumulation time, in seconds
                let mut total_fill = 0.0;
                for precursor in spectrum.precursors() {
                    total_fill += precursor_fill_time(precursor)?;
                }
                weight *= total_fill;
            }
            extractor.extract_into(&spectrum, &mut signal, row, weight);
        }

        let reference_indices = self.codec.spectrum_to_indices(&target)?;
        Ok(DemuxBlock {
            masks,
            signal,
            reference_indices,
        })
    }
}
