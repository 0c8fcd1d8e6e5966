//! A simulated mass spectrometer for exercising the demultiplexing
//! pipeline: repeating acquisition schemes over a single analyte with
//! Gaussian elution and no noise.
#![allow(dead_code)]
use mzdemux::io::MemorySpectrumList;
use mzdemux::params::UserParam;
use mzdemux::spectrum::{
    IsolationWindow, Precursor, ScanEvent, SelectedIon, SignalContinuity, Spectrum,
    SpectrumDescription,
};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// A single species with a fixed fragment pattern
#[derive(Debug, Clone)]
pub struct SimulatedAnalyte {
    pub precursor_mz: f64,
    pub fragment_mzs: Vec<f64>,
    pub fragment_intensities: Vec<f64>,
}

impl SimulatedAnalyte {
    /// A deterministic analyte with `num_fragments` seeded fragments
    pub fn seeded(seed: u64, precursor_mz: f64, num_fragments: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut fragment_mzs: Vec<f64> = (0..num_fragments)
            .map(|_| rng.gen_range(200.0..1200.0))
            .collect();
        fragment_mzs.sort_by(f64::total_cmp);
        let fragment_intensities = (0..num_fragments)
            .map(|_| rng.gen_range(0.1..1.0))
            .collect();
        Self {
            precursor_mz,
            fragment_mzs,
            fragment_intensities,
        }
    }
}

/// Chromatographic elution modeled as a Gaussian over run time (minutes)
#[derive(Debug, Clone, Copy)]
pub struct GaussianElution {
    pub center: f64,
    pub sigma: f64,
    pub scale: f64,
}

impl GaussianElution {
    pub fn intensity(&self, time: f64) -> f64 {
        self.scale * (-((time - self.center).powi(2)) / (2.0 * self.sigma * self.sigma)).exp()
    }
}

/// One scan slot of a repeating acquisition cycle
#[derive(Debug, Clone)]
pub enum ScanTemplate {
    Ms1,
    /// Isolation windows as `(center, width)` pairs
    Ms2(Vec<(f64, f64)>),
}

/// A repeating cycle of scan events
#[derive(Debug, Clone)]
pub struct AcquisitionScheme {
    pub scans: Vec<ScanTemplate>,
}

impl AcquisitionScheme {
    /// A DIA scheme where every cycle is repeated `overlaps` extra times
    /// with a fractional-window m/z offset, one precursor per spectrum,
    /// preceded by an MS1 scan per repeat.
    pub fn overlapped(
        ms2_scans_per_cycle: usize,
        overlaps: usize,
        start_precursor_mz: f64,
        end_precursor_mz: f64,
    ) -> Self {
        let width = (end_precursor_mz - start_precursor_mz) / ms2_scans_per_cycle as f64;
        let mut scans = Vec::new();
        for overlap_num in 0..=overlaps {
            let offset = overlap_num as f64 * width / (overlaps + 1) as f64;
            scans.push(ScanTemplate::Ms1);
            for slot in 0..ms2_scans_per_cycle {
                let center = offset + start_precursor_mz + width / 2.0 + slot as f64 * width;
                scans.push(ScanTemplate::Ms2(vec![(center, width)]));
            }
        }
        Self { scans }
    }

    /// An MSX scheme: the precursor range is split into
    /// `ms2_scans_per_cycle * precursors_per_spectrum` windows and each
    /// cycle pairs them into spectra with a seeded shuffle, so that window
    /// combinations vary between cycles.
    pub fn msx(
        ms2_scans_per_cycle: usize,
        precursors_per_spectrum: usize,
        num_cycles: usize,
        start_precursor_mz: f64,
        end_precursor_mz: f64,
        seed: u64,
    ) -> Self {
        let num_windows = ms2_scans_per_cycle * precursors_per_spectrum;
        let width = (end_precursor_mz - start_precursor_mz) / num_windows as f64;
        let center_of = |w: usize| start_precursor_mz + width / 2.0 + w as f64 * width;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut scans = Vec::new();
        for _ in 0..num_cycles {
            scans.push(ScanTemplate::Ms1);
            let mut windows: Vec<usize> = (0..num_windows).collect();
            windows.shuffle(&mut rng);
            for chunk in windows.chunks(precursors_per_spectrum) {
                let precursors = chunk.iter().map(|&w| (center_of(w), width)).collect();
                scans.push(ScanTemplate::Ms2(precursors));
            }
        }
        Self { scans }
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }
}

/// A complete simulated run
#[derive(Debug, Clone)]
pub struct SimulatedRun {
    pub scheme: AcquisitionScheme,
    pub analyte: SimulatedAnalyte,
    pub elution: GaussianElution,
    /// Number of times the scheme repeats; for pre-expanded schemes
    /// (see [`AcquisitionScheme::msx`]) use 1
    pub num_cycles: usize,
    /// Minutes between consecutive scans
    pub scan_period: f64,
    /// `MultiFillTime` attached to every precursor, in milliseconds
    pub fill_time_ms: Option<f64>,
    pub signal_continuity: SignalContinuity,
}

impl SimulatedRun {
    pub fn new(scheme: AcquisitionScheme, analyte: SimulatedAnalyte) -> Self {
        Self {
            scheme,
            analyte,
            elution: GaussianElution {
                center: 1.0,
                sigma: 0.5,
                scale: 1000.0,
            },
            num_cycles: 5,
            scan_period: 0.01,
            fill_time_ms: None,
            signal_continuity: SignalContinuity::Centroid,
        }
    }

    fn precursor(&self, center: f64, width: f64) -> Precursor {
        let mut precursor = Precursor {
            isolation_window: IsolationWindow::around(center, width),
            ..Default::default()
        };
        precursor.add_ion(SelectedIon::new(center, 0.0, Some(2)));
        if let Some(fill) = self.fill_time_ms {
            precursor
                .params
                .push(UserParam::new("MultiFillTime", fill));
        }
        precursor
    }

    pub fn build(&self) -> MemorySpectrumList {
        let mut list = MemorySpectrumList::default();
        let mut scan_number = 0usize;
        for _ in 0..self.num_cycles {
            for template in self.scheme.scans.iter() {
                let time = scan_number as f64 * self.scan_period;
                let abundance = self.elution.intensity(time);
                let (ms_level, precursors, mzs, intensities) = match template {
                    ScanTemplate::Ms1 => (
                        1,
                        Vec::new(),
                        vec![self.analyte.precursor_mz],
                        vec![abundance],
                    ),
                    ScanTemplate::Ms2(windows) => {
                        let precursors: Vec<Precursor> = windows
                            .iter()
                            .map(|&(center, width)| self.precursor(center, width))
                            .collect();
                        let isolated = windows.iter().any(|&(center, width)| {
                            (self.analyte.precursor_mz - center).abs() <= width / 2.0
                        });
                        if isolated {
                            let intensities = self
                                .analyte
                                .fragment_intensities
                                .iter()
                                .map(|rel| rel * abundance)
                                .collect();
                            (2, precursors, self.analyte.fragment_mzs.clone(), intensities)
                        } else {
                            (2, precursors, Vec::new(), Vec::new())
                        }
                    }
                };

                let description = SpectrumDescription {
                    id: format!(
                        "controllerType=0 controllerNumber=1 scan={}",
                        scan_number + 1
                    ),
                    index: scan_number,
                    ms_level,
                    signal_continuity: self.signal_continuity,
                    scans: vec![ScanEvent::new(time)],
                    precursors,
                    params: Vec::new(),
                };
                list.push(Spectrum::new(description, mzs, intensities));
                scan_number += 1;
            }
        }
        list
    }
}
