//! `mzdemux` demultiplexes multiplexed tandem mass spectra produced by
//! data-independent acquisition methods in Rust.
//!
//! When an instrument co-isolates several precursor m/z windows in one
//! fragmentation event (MSX), or repeats its isolation cycle with an m/z
//! offset (overlapping-window DIA), every recorded MS2 spectrum is a
//! mixture of fragments from multiple isolation regions. This crate
//! recovers per-region spectra:
//!
//!   1. [`demux::PrecursorMaskCodec`] infers the acquisition scheme from
//!      the ordered spectrum list, including window overlap.
//!   2. A demultiplexer variant ([`demux::msx`] or [`demux::overlap`])
//!      assembles, per spectrum, a small design/response matrix pair over
//!      a neighborhood of spectra with differing co-isolation patterns.
//!   3. [`demux::NnlsSolver`] solves the block column-by-column under a
//!      non-negativity constraint, in parallel when the `parallelism`
//!      feature is enabled.
//!   4. [`demux::SpectrumListDemux`] presents the results as a virtual
//!      expanded spectrum list with coherent identifier and precursor
//!      rewriting, consumable through the same [`io::SpectrumSource`]
//!      interface as the input.
//!
//! Raw-file parsing is out of scope: anything that can expose an ordered,
//! index-addressable sequence of [`spectrum::Spectrum`] values can be
//! demultiplexed by implementing [`io::SpectrumSource`].
pub mod demux;
pub mod io;
pub mod mass_error;
pub mod meta;
pub mod params;
pub mod prelude;
pub mod spectrum;

pub use crate::demux::{DemuxError, DemuxParams, Optimization, SpectrumListDemux};
pub use crate::mass_error::Tolerance;
pub use crate::spectrum::Spectrum;
