//! A value-typed representation of mass spectra and the acquisition
//! metadata the demultiplexer reads and rewrites.
//!
//! The model deliberately stores precursors and scan descriptors as plain
//! structs inside the spectrum value rather than as shared handles, so that
//! a cloned spectrum can have its identifier, precursor, and signal arrays
//! rewritten without touching the original.
use std::fmt::Display;

use num_traits::Float;

use crate::params::{impl_param_described, ParamList};

/// The interval around the precursor ion that was co-isolated for
/// fragmentation, described by a target m/z and offsets on either side.
///
/// Source files are not obligated to carry every field, so each is
/// optional; the demultiplexer validates presence at the point of use.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IsolationWindow {
    /// The recorded isolation window target m/z, which may actually be
    /// off-center in the window
    pub target: Option<f64>,
    /// The m/z distance from `target` to the lower bound of the window
    pub lower_offset: Option<f64>,
    /// The m/z distance from `target` to the upper bound of the window
    pub upper_offset: Option<f64>,
}

impl IsolationWindow {
    pub fn new(target: f64, lower_offset: f64, upper_offset: f64) -> Self {
        Self {
            target: Some(target),
            lower_offset: Some(lower_offset),
            upper_offset: Some(upper_offset),
        }
    }

    /// An isolation window of width `width` centered on `target`
    pub fn around(target: f64, width: f64) -> Self {
        Self::new(target, width / 2.0, width / 2.0)
    }

    pub fn contains<F: Float>(&self, point: F) -> bool {
        let point = point.to_f64().unwrap_or(f64::NAN);
        match (self.target, self.lower_offset, self.upper_offset) {
            (Some(target), Some(lo), Some(hi)) => {
                target - lo <= point && point <= target + hi
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_none() && self.lower_offset.is_none() && self.upper_offset.is_none()
    }
}

/// A single selected ion from a precursor isolation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectedIon {
    /// The selected ion's m/z as reported, may not be the monoisotopic peak
    pub mz: f64,
    pub intensity: f32,
    /// The reported precursor ion's charge state. May be absent in
    /// some source files.
    pub charge: Option<i32>,
    pub params: ParamList,
}

impl SelectedIon {
    pub fn new(mz: f64, intensity: f32, charge: Option<i32>) -> Self {
        Self {
            mz,
            intensity,
            charge,
            params: ParamList::default(),
        }
    }
}

/// Describes the precursor ion of the owning spectrum
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Precursor {
    /// Describes the selected ion's properties
    pub ions: Vec<SelectedIon>,
    /// Describes the isolation window around the selected ion
    pub isolation_window: IsolationWindow,
    /// The native ID of the spectrum this precursor belongs to, if assigned
    pub spectrum_reference: Option<String>,
    /// The precursor scan ID, if given
    pub precursor_id: Option<String>,
    pub params: ParamList,
}

impl Precursor {
    /// Get a reference to the first selected ion, if it exists
    pub fn ion(&self) -> Option<&SelectedIon> {
        self.ions.first()
    }

    pub fn ion_mut(&mut self) -> Option<&mut SelectedIon> {
        self.ions.first_mut()
    }

    pub fn add_ion(&mut self, ion: SelectedIon) {
        self.ions.push(ion);
    }
}

impl_param_described!(Precursor, SelectedIon);

/// Describes a single scan event. Unless additional post-processing is
/// done, there is usually only one event per spectrum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanEvent {
    /// When did the scan start acquisition relative to the run start, in
    /// minutes. May be absent from partially described source files.
    pub start_time: Option<f64>,
    /// The time spent filling the ion trapping device, in milliseconds
    pub injection_time: f32,
    /// The native ID of the spectrum this scan produced, if assigned
    pub spectrum_reference: Option<String>,
}

impl ScanEvent {
    pub fn new(start_time: f64) -> Self {
        Self {
            start_time: Some(start_time),
            ..Default::default()
        }
    }
}

/// Describes the initial representation of the signal of a spectrum
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Hash, Eq)]
pub enum SignalContinuity {
    #[default]
    Unknown = 0,
    /// The spectrum is a discrete peak list
    Centroid = 3,
    /// The spectrum is a continuous profile, with evenly spaced samples
    /// spanning zero-signal regions
    Profile = 5,
}

impl SignalContinuity {
    pub const fn is_profile(&self) -> bool {
        matches!(self, Self::Profile)
    }

    pub const fn is_centroid(&self) -> bool {
        matches!(self, Self::Centroid)
    }
}

impl Display for SignalContinuity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The set of descriptive metadata that give context for how a mass
/// spectrum was acquired within a particular run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumDescription {
    /// The spectrum's native identifier, a set of space-separated
    /// `key=value` tokens containing at least `scan=<int>`
    pub id: String,
    /// The ordinal sequence number for the spectrum
    pub index: usize,
    /// The degree of exponentiation of the spectrum, e.g MS1, MS2, MS3
    pub ms_level: u8,
    /// Whether the spectrum is centroided or profile
    pub signal_continuity: SignalContinuity,
    /// The scan events that acquired the spectrum
    pub scans: Vec<ScanEvent>,
    /// The parent ion or ions and their isolation descriptions
    pub precursors: Vec<Precursor>,
    pub params: ParamList,
}

impl_param_described!(SpectrumDescription);

impl SpectrumDescription {
    /// The retention time of the first scan event, in minutes
    pub fn start_time(&self) -> Option<f64> {
        self.scans.first().and_then(|s| s.start_time)
    }

    pub fn first_scan_mut(&mut self) -> Option<&mut ScanEvent> {
        if self.scans.is_empty() {
            self.scans.push(ScanEvent::default());
        }
        self.scans.first_mut()
    }
}

/// A mass spectrum with its signal stored as parallel m/z and intensity
/// arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    pub description: SpectrumDescription,
    /// The m/z axis, ascending
    pub mzs: Vec<f64>,
    /// The measured signal at each m/z
    pub intensities: Vec<f64>,
}

impl Spectrum {
    pub fn new(description: SpectrumDescription, mzs: Vec<f64>, intensities: Vec<f64>) -> Self {
        Self {
            description,
            mzs,
            intensities,
        }
    }

    /// The native identifier of the spectrum
    pub fn id(&self) -> &str {
        &self.description.id
    }

    /// The position of the spectrum in its source list
    pub fn index(&self) -> usize {
        self.description.index
    }

    pub fn ms_level(&self) -> u8 {
        self.description.ms_level
    }

    pub fn signal_continuity(&self) -> SignalContinuity {
        self.description.signal_continuity
    }

    /// The retention time of the spectrum, in minutes
    pub fn start_time(&self) -> Option<f64> {
        self.description.start_time()
    }

    pub fn precursors(&self) -> &[Precursor] {
        &self.description.precursors
    }

    /// The number of points in the signal arrays
    pub fn len(&self) -> usize {
        self.mzs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mzs.is_empty()
    }

    /// Replace the native ID and propagate it to all scan and precursor
    /// back-references.
    pub fn rewrite_id(&mut self, id: String) {
        for scan in self.description.scans.iter_mut() {
            scan.spectrum_reference = Some(id.clone());
        }
        for precursor in self.description.precursors.iter_mut() {
            precursor.spectrum_reference = Some(id.clone());
        }
        self.description.id = id;
    }
}
