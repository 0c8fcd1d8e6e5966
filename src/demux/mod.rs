//! Demultiplexing of multiplexed tandem mass spectra.
//!
//! Data-independent acquisition methods may co-isolate several precursor
//! m/z windows in one fragmentation event (MSX) or repeat each cycle with
//! an m/z offset (overlapping-window DIA). Either way the product-ion
//! spectrum mixes fragments from multiple isolation regions. This module
//! inverts that mixing: it infers the acquisition scheme from the spectrum
//! list, frames each spectrum's neighborhood as a non-negative
//! least-squares problem over the co-isolation design matrix, and presents
//! the results as an expanded spectrum list with one output spectrum per
//! recovered isolation region.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mzdemux::demux::{DemuxParams, SpectrumListDemux};
//! use mzdemux::io::{MemorySpectrumList, SpectrumSource};
//! use mzdemux::meta::DataProcessing;
//!
//! # fn load() -> MemorySpectrumList { MemorySpectrumList::default() }
//! let source: Arc<dyn SpectrumSource> = Arc::new(load());
//! let mut provenance = DataProcessing::default();
//! let demuxed =
//!     SpectrumListDemux::new(source, DemuxParams::default(), &mut provenance)?;
//! for index in 0..demuxed.len() {
//!     let spectrum = demuxed.spectrum(index)?;
//!     println!("{}: {} peaks", spectrum.id(), spectrum.len());
//! }
//! # Ok::<(), mzdemux::demux::DemuxError>(())
//! ```
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use nalgebra::DMatrix;
use thiserror::Error;

use crate::io::SpectrumAccessError;
use crate::mass_error::Tolerance;

pub mod codec;
pub mod debug;
pub mod extractor;
pub mod helpers;
pub mod list;
pub mod msx;
pub mod overlap;
pub mod solver;
pub mod spline;
pub mod window;

pub use codec::PrecursorMaskCodec;
pub use debug::{DemuxDebugReader, DemuxDebugWriter};
pub use extractor::SpectrumPeakExtractor;
pub use list::SpectrumListDemux;
pub use solver::NnlsSolver;
pub use spline::{CubicSpline, SplineError};

/// Which demultiplexer implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Optimization {
    /// General MSX demultiplexing over whole-cycle blocks
    #[default]
    Msx,
    /// Overlapping-window demultiplexing over a small m/z-local band, with
    /// retention-time interpolation
    OverlapOnly,
}

impl Display for Optimization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Msx => f.write_str("msx"),
            Self::OverlapOnly => f.write_str("overlap_only"),
        }
    }
}

impl FromStr for Optimization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "msx" => Ok(Self::Msx),
            "overlap_only" => Ok(Self::OverlapOnly),
            _ => Err(format!("Unknown demultiplexing optimization: {s}")),
        }
    }
}

/// Tunable parameters for the demultiplexing pipeline. All tunables flow
/// through this object; there is no global state.
#[derive(Debug, Clone)]
pub struct DemuxParams {
    /// Which demultiplexer variant to run
    pub optimization: Optimization,
    /// Tolerance used to project neighbor peaks onto the target's m/z grid
    pub mass_error: Tolerance,
    /// m/z tolerance for merging window boundaries during overlap
    /// inference
    pub minimum_window_size: f64,
    /// Weight neighbors down by their scan distance from the target
    pub apply_weighting: bool,
    /// Scale masks by per-precursor fill times and emit raw NNLS
    /// intensities
    pub variable_fill: bool,
    /// Resample neighbor intensities onto the target's retention time
    /// (overlap variant)
    pub interpolate_retention_time: bool,
    /// NNLS iteration cap
    pub nnls_max_iter: usize,
    /// NNLS convergence tolerance
    pub nnls_eps: f64,
    /// Extra neighbors for the MSX block, as a fraction of one cycle
    pub demux_block_extra: f64,
    /// Dump every `(masks, signal, solution)` triple to this file
    pub debug_output: Option<PathBuf>,
}

impl Default for DemuxParams {
    fn default() -> Self {
        Self {
            optimization: Optimization::default(),
            mass_error: Tolerance::PPM(10.0),
            minimum_window_size: 0.2,
            apply_weighting: false,
            variable_fill: false,
            interpolate_retention_time: true,
            nnls_max_iter: 50,
            nnls_eps: 1e-10,
            demux_block_extra: 0.0,
            debug_output: None,
        }
    }
}

/// Errors raised while inferring an acquisition scheme or demultiplexing a
/// spectrum
#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("No MS2 spectra found; cannot infer a demultiplexing scheme")]
    NoMs2Spectra,
    #[error("Spectrum {index} is an MS2 scan without precursors")]
    NoPrecursors { index: usize },
    #[error(
        "Precursor count changed from {expected} to {found} at spectrum {index}; \
         cannot infer a demultiplexing scheme"
    )]
    PrecursorCountVaries {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("A precursor is missing its {field}")]
    MissingPrecursorField { field: &'static str },
    #[error("Positive values expected for the {field}, got {value}")]
    NonPositiveOffset { field: &'static str, value: f64 },
    #[error(
        "Variable-fill demultiplexing requires a MultiFillTime parameter on every precursor"
    )]
    MissingFillTime,
    #[error("Retention-time interpolation requires a scan start time on spectrum {index}")]
    MissingRetentionTime { index: usize },
    #[error("Not enough MS2 spectra around spectrum {index} to gather {needed} neighbors")]
    InsufficientNeighbors { index: usize, needed: usize },
    #[error(
        "Expected {expected} demultiplexing windows for spectrum {index} but matched {found}; \
         the window boundary tolerance may be set too low"
    )]
    WindowCountMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("Spectrum {index} must be an MS2 scan")]
    NotAnMs2Spectrum { index: usize },
    #[error("Spectrum index {index} is out of range for a list of {size}")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("Failed to read a spectrum from the wrapped list: {0}")]
    SpectrumAccess(
        #[from]
        #[source]
        SpectrumAccessError,
    ),
    #[error("Retention-time interpolation failed: {0}")]
    Interpolation(
        #[from]
        #[source]
        SplineError,
    ),
    #[error("Debug matrix file error: {0}")]
    DebugFile(
        #[from]
        #[source]
        std::io::Error,
    ),
}

/// One assembled demultiplexing problem
#[derive(Debug, Clone)]
pub struct DemuxBlock {
    /// Design matrix: rows index neighbor spectra, columns index candidate
    /// demultiplexing windows
    pub masks: DMatrix<f64>,
    /// Response matrix: rows index neighbor spectra, columns index
    /// product-ion m/z bins of the target spectrum
    pub signal: DMatrix<f64>,
    /// Solution rows corresponding to the target spectrum's own windows,
    /// indexed by demux index
    pub reference_indices: Vec<usize>,
}

/// A strategy for assembling the demultiplexing block around one spectrum
pub trait Demultiplexer {
    /// Choose the original-list indices of the spectra participating in
    /// the block for `index`
    fn block_indices(&self, index: usize, block_extra: f64) -> Result<Vec<usize>, DemuxError>;

    /// Assemble the design and response matrices over `mux_indices`
    fn build_block(&self, index: usize, mux_indices: &[usize]) -> Result<DemuxBlock, DemuxError>;
}
