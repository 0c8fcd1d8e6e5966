//! The demultiplexed view over a spectrum list: a virtual expansion where
//! every multiplexed MS2 spectrum appears once per demultiplexing window it
//! covers.
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use nalgebra::DMatrix;

use crate::io::{
    CachingSpectrumList, SpectrumAccessError, SpectrumIdentity, SpectrumSource,
};
use crate::meta::{demux_processing_method, DataProcessing};
use crate::spectrum::{IsolationWindow as IsolationWindowDescr, Spectrum};

use super::codec::PrecursorMaskCodec;
use super::debug::DemuxDebugWriter;
use super::helpers::inject_scan_id;
use super::msx::{MsxDemultiplexer, MsxParams};
use super::overlap::{OverlapDemultiplexer, OverlapParams};
use super::solver::NnlsSolver;
use super::{DemuxError, DemuxParams, Demultiplexer, Optimization};

/// Bound on the number of original spectra kept resident; every original
/// MS2 is consulted at least `precursors * overlaps` times
const SPECTRUM_CACHE_SIZE: usize = 1000;

/// One output spectrum's coordinates in the original list
#[derive(Debug, Clone, Copy)]
struct DemuxEntry {
    ms_level: u8,
    /// Index of the multiplexed spectrum this entry is derived from
    original_index: usize,
    /// Which precursor of the original spectrum this entry descends from
    precursor_index: usize,
    /// Position of this entry among the original spectrum's outputs, in
    /// `[0, precursors * overlaps)`
    demux_index: usize,
}

/// The most recent NNLS solve. Every output spectrum derived from the same
/// original reuses it, so sequential consumption solves each original once.
struct SolvedBlock {
    original_index: usize,
    solution: DMatrix<f64>,
    /// Solution rows carrying the original spectrum's own windows
    reference_indices: Vec<usize>,
}

/// A demultiplexing facade over a [`SpectrumSource`].
///
/// Presents the expanded list: MS1 spectra pass through with rewritten
/// identifiers, each MS2 spectrum is replaced by `precursors_per_spectrum *
/// overlaps_per_cycle` single-window spectra whose intensities come from
/// the non-negative least squares solution of a local demultiplexing block.
pub struct SpectrumListDemux {
    source: Arc<dyn SpectrumSource>,
    codec: Arc<PrecursorMaskCodec>,
    demultiplexer: Box<dyn Demultiplexer>,
    solver: NnlsSolver,
    params: DemuxParams,
    index_map: Vec<DemuxEntry>,
    identities: Vec<SpectrumIdentity>,
    last_solved: Mutex<Option<SolvedBlock>>,
    debug_writer: Option<Mutex<DemuxDebugWriter>>,
}

impl SpectrumListDemux {
    /// Wrap `source`, inferring its acquisition scheme and stamping the
    /// transformation onto `data_processing`.
    ///
    /// Fails if the scheme cannot be inferred (no MS2 spectra, varying
    /// precursor counts) or the debug output file cannot be created.
    pub fn new(
        source: Arc<dyn SpectrumSource>,
        params: DemuxParams,
        data_processing: &mut DataProcessing,
    ) -> Result<Self, DemuxError> {
        let codec = Arc::new(PrecursorMaskCodec::from_source(&source, &params)?);

        let mut index_map = Vec::new();
        let mut identities = Vec::new();
        for original_index in 0..source.len() {
            let spectrum = source.spectrum(original_index)?;
            let ms_level = spectrum.ms_level();
            let expansion = if ms_level == 2 {
                codec.precursors_per_spectrum() * codec.overlaps_per_cycle()
            } else {
                1
            };
            for demux_index in 0..expansion {
                index_map.push(DemuxEntry {
                    ms_level,
                    original_index,
                    precursor_index: demux_index / codec.overlaps_per_cycle(),
                    demux_index,
                });
                // scan numbers are 1-based positions in the expanded list
                let id = inject_scan_id(spectrum.id(), index_map.len(), demux_index);
                identities.push(SpectrumIdentity::new(index_map.len() - 1, id));
            }
        }
        debug!(
            "Expanded {} original spectra into {} demultiplexed entries",
            source.len(),
            index_map.len()
        );

        let cached: Arc<dyn SpectrumSource> =
            Arc::new(CachingSpectrumList::new(source, SPECTRUM_CACHE_SIZE));
        let demultiplexer: Box<dyn Demultiplexer> = match params.optimization {
            Optimization::Msx => Box::new(MsxDemultiplexer::new(
                cached.clone(),
                codec.clone(),
                MsxParams {
                    apply_weighting: params.apply_weighting,
                    mass_error: params.mass_error,
                    variable_fill: params.variable_fill,
                },
            )),
            Optimization::OverlapOnly => Box::new(OverlapDemultiplexer::new(
                cached.clone(),
                codec.clone(),
                OverlapParams {
                    apply_weighting: params.apply_weighting,
                    mass_error: params.mass_error,
                    interpolate_retention_time: params.interpolate_retention_time,
                },
            )),
        };

        data_processing.push(demux_processing_method(data_processing.len() as i8));

        let debug_writer = match params.debug_output.as_ref() {
            Some(path) => Some(Mutex::new(DemuxDebugWriter::create(path)?)),
            None => None,
        };

        Ok(Self {
            source: cached,
            codec,
            demultiplexer,
            solver: NnlsSolver::new(params.nnls_max_iter, params.nnls_eps),
            params,
            index_map,
            identities,
            last_solved: Mutex::new(None),
            debug_writer,
        })
    }

    /// The number of spectra in the expanded list
    pub fn len(&self) -> usize {
        self.index_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_map.is_empty()
    }

    /// The scheme decoder backing this facade
    pub fn codec(&self) -> &PrecursorMaskCodec {
        &self.codec
    }

    /// The identity of the output spectrum at `index`; precomputed, no I/O
    pub fn spectrum_identity(&self, index: usize) -> Option<&SpectrumIdentity> {
        self.identities.get(index)
    }

    /// Produce the output spectrum at `index` of the expanded list
    pub fn spectrum(&self, index: usize) -> Result<Spectrum, DemuxError> {
        let entry = *self
            .index_map
            .get(index)
            .ok_or(DemuxError::IndexOutOfRange {
                index,
                size: self.index_map.len(),
            })?;

        if entry.ms_level != 2 {
            let original = self.source.spectrum(entry.original_index)?;
            let mut passthrough = (*original).clone();
            passthrough.description.index = index;
            passthrough.rewrite_id(self.identities[index].id.clone());
            return Ok(passthrough);
        }
        self.demux_spectrum(index, entry)
    }

    fn demux_spectrum(&self, index: usize, entry: DemuxEntry) -> Result<Spectrum, DemuxError> {
        let reference = self.source.spectrum(entry.original_index)?;

        let mut guard = self
            .last_solved
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let solved = match guard.take() {
            // other demux indices of the same original share the solve
            Some(solved) if solved.original_index == entry.original_index => {
                guard.insert(solved)
            }
            _ => {
                let mux_indices = self
                    .demultiplexer
                    .block_indices(entry.original_index, self.params.demux_block_extra)?;
                let block = self
                    .demultiplexer
                    .build_block(entry.original_index, &mux_indices)?;
                let solution = self.solver.solve(&block.masks, &block.signal);

                if let Some(writer) = &self.debug_writer {
                    writer
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .write_block(
                            entry.original_index as u64,
                            &block.masks,
                            &block.signal,
                            &solution,
                        )?;
                }

                guard.insert(SolvedBlock {
                    original_index: entry.original_index,
                    solution,
                    reference_indices: block.reference_indices,
                })
            }
        };

        // The resolved window this output spectrum isolates
        let deconv_indices = self.codec.spectrum_to_indices(&reference)?;
        let window = self.codec.isolation_window(deconv_indices[entry.demux_index]);

        let mut demuxed = (*reference).clone();
        demuxed.description.index = index;

        // A single precursor descends from the one whose window contained
        // this output's demux window, narrowed to the resolved bounds
        let offset = window.half_width();
        let target_mz = window.low_mz + offset;
        let mut precursor = reference.precursors()[entry.precursor_index].clone();
        precursor.isolation_window = IsolationWindowDescr::new(target_mz, offset, offset);
        if let Some(ion) = precursor.ion_mut() {
            ion.mz = target_mz;
            // splitting the window invalidates the recorded precursor
            // intensity
            ion.intensity = 0.0;
        }
        demuxed.description.precursors = vec![precursor];
        demuxed.rewrite_id(self.identities[index].id.clone());

        // Rebuild the signal arrays from the solution row for this window
        let row = solved.reference_indices[entry.demux_index];
        let solution = &solved.solution;
        let mut summed = vec![0.0f64; solution.ncols()];
        for &r in solved.reference_indices.iter() {
            for (i, total) in summed.iter_mut().enumerate() {
                *total += solution[(r, i)];
            }
        }

        let is_profile = reference.signal_continuity().is_profile();
        let mut new_mzs = Vec::with_capacity(reference.len());
        let mut new_intensities = Vec::with_capacity(reference.len());
        for i in 0..reference.len() {
            let raw = solution[(row, i)];
            // zero bins are retained for profile data so the m/z spacing
            // stays even for downstream centroiders
            if raw <= 0.0 && !is_profile {
                continue;
            }
            let original_intensity = reference.intensities[i];
            if original_intensity <= 0.0 && !is_profile {
                continue;
            }
            new_mzs.push(reference.mzs[i]);
            if self.params.variable_fill {
                // variable-fill solutions are already in ions per unit time
                new_intensities.push(raw);
            } else if summed[i] > 0.0 {
                // rescale so the windows jointly sum to the measured signal
                new_intensities.push(original_intensity * raw / summed[i]);
            } else {
                new_intensities.push(0.0);
            }
        }
        demuxed.mzs = new_mzs;
        demuxed.intensities = new_intensities;
        Ok(demuxed)
    }

    /// Finalize the debug matrix file, if one was configured
    pub fn finish_debug_output(&self) -> Result<(), DemuxError> {
        if let Some(writer) = &self.debug_writer {
            writer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .finish()?;
        }
        Ok(())
    }
}

impl SpectrumSource for SpectrumListDemux {
    fn len(&self) -> usize {
        self.index_map.len()
    }

    fn spectrum_identity(&self, index: usize) -> Option<SpectrumIdentity> {
        self.identities.get(index).cloned()
    }

    fn spectrum(&self, index: usize) -> Result<Arc<Spectrum>, SpectrumAccessError> {
        SpectrumListDemux::spectrum(self, index)
            .map(Arc::new)
            .map_err(|e| SpectrumAccessError::SourceFailure(Box::new(e)))
    }
}
