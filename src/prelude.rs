//! A set of foundational traits used throughout the library.
pub use crate::demux::Demultiplexer;
pub use crate::io::{SpectrumAccessError, SpectrumSource};
pub use crate::params::ParamDescribed;
