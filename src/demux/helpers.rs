//! Support functions shared across the demultiplexing pipeline: validated
//! access to precursor isolation fields, `key=value` native-ID token
//! handling, and the neighbor-spectrum finder.
use crate::io::SpectrumSource;
use crate::params::ParamDescribed;
use crate::spectrum::Precursor;

use super::DemuxError;

/// The user parameter carrying the per-precursor ion accumulation time in
/// milliseconds for variable-fill acquisition methods
pub const MULTI_FILL_TIME_PARAM: &str = "MultiFillTime";

pub fn precursor_target(p: &Precursor) -> Result<f64, DemuxError> {
    p.isolation_window
        .target
        .ok_or(DemuxError::MissingPrecursorField {
            field: "isolation window target m/z",
        })
}

pub fn precursor_lower_offset(p: &Precursor) -> Result<f64, DemuxError> {
    let offset = p
        .isolation_window
        .lower_offset
        .ok_or(DemuxError::MissingPrecursorField {
            field: "isolation window lower offset",
        })?;
    if offset <= 0.0 {
        return Err(DemuxError::NonPositiveOffset {
            field: "isolation window lower offset",
            value: offset,
        });
    }
    Ok(offset)
}

pub fn precursor_upper_offset(p: &Precursor) -> Result<f64, DemuxError> {
    let offset = p
        .isolation_window
        .upper_offset
        .ok_or(DemuxError::MissingPrecursorField {
            field: "isolation window upper offset",
        })?;
    if offset <= 0.0 {
        return Err(DemuxError::NonPositiveOffset {
            field: "isolation window upper offset",
            value: offset,
        });
    }
    Ok(offset)
}

pub fn precursor_mz_low(p: &Precursor) -> Result<f64, DemuxError> {
    Ok(precursor_target(p)? - precursor_lower_offset(p)?)
}

pub fn precursor_mz_high(p: &Precursor) -> Result<f64, DemuxError> {
    Ok(precursor_target(p)? + precursor_upper_offset(p)?)
}

pub fn precursor_iso_center(p: &Precursor) -> Result<f64, DemuxError> {
    Ok((precursor_mz_low(p)? + precursor_mz_high(p)?) / 2.0)
}

pub fn precursor_iso_width(p: &Precursor) -> Result<f64, DemuxError> {
    Ok(precursor_lower_offset(p)? + precursor_upper_offset(p)?)
}

/// The map key used to collect distinct isolation windows during cycle
/// inference. Rounding to two decimal places absorbs scheduling jitter
/// between repeats of the same window.
pub fn precursor_key(p: &Precursor) -> Result<String, DemuxError> {
    Ok(format!("{:.2}", precursor_iso_center(p)?))
}

/// The precursor's `MultiFillTime` in seconds
pub fn precursor_fill_time(p: &Precursor) -> Result<f64, DemuxError> {
    let param = p
        .user_param(MULTI_FILL_TIME_PARAM)
        .ok_or(DemuxError::MissingFillTime)?;
    let millis: f64 = param.value_as().map_err(|_| DemuxError::MissingFillTime)?;
    Ok(millis / 1000.0)
}

/// Find the value of the `name=` token in a space-separated `key=value`
/// native ID string.
pub fn scan_id_token<'a>(id: &'a str, name: &str) -> Option<&'a str> {
    id.split_whitespace()
        .filter_map(|token| token.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Read the `scan=` number from a native ID
pub fn scan_number(id: &str) -> Option<u64> {
    scan_id_token(id, "scan").and_then(|v| v.parse().ok())
}

/// Read the `originalScan=` number a demultiplexed native ID points back to
pub fn original_scan_number(id: &str) -> Option<u64> {
    scan_id_token(id, "originalScan").and_then(|v| v.parse().ok())
}

/// Read the `demux=` index of a demultiplexed native ID
pub fn demux_index(id: &str) -> Option<usize> {
    scan_id_token(id, "demux").and_then(|v| v.parse().ok())
}

/// Rewrite a native ID for a demultiplexed spectrum: the `scan=N` token is
/// replaced by `originalScan=N demux=<demux_index> scan=<scan_number>`,
/// leaving every other token in place.
pub fn inject_scan_id(id: &str, scan_number: usize, demux_index: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for token in id.split_whitespace() {
        match token.split_once('=') {
            Some(("scan", value)) => {
                parts.push(format!("originalScan={value}"));
                parts.push(format!("demux={demux_index}"));
                parts.push(format!("scan={scan_number}"));
            }
            _ => parts.push(token.to_string()),
        }
    }
    parts.join(" ")
}

/// Find `count` MS2 spectra as close as possible to `center_index`,
/// distributed as evenly as possible on either side of it, skipping
/// non-MS2 spectra entirely.
///
/// A `stride` of `s` picks every `s`-th MS2 spectrum walking outward,
/// which selects same-phase spectra across repeats of an acquisition
/// cycle. When one end of the list is reached before enough spectra are
/// found on that side, the remainder is drawn from the other side. The
/// center index itself is always included and the result is sorted
/// ascending.
pub fn find_nearby_spectra(
    source: &dyn SpectrumSource,
    center_index: usize,
    count: usize,
    stride: usize,
) -> Result<Vec<usize>, DemuxError> {
    if center_index >= source.len() {
        return Err(DemuxError::IndexOutOfRange {
            index: center_index,
            size: source.len(),
        });
    }
    let center = source.spectrum(center_index)?;
    if center.ms_level() != 2 {
        return Err(DemuxError::NotAnMs2Spectrum {
            index: center_index,
        });
    }

    let mut indices = Vec::with_capacity(count);
    indices.push(center_index);

    let mut backwards_needed = ((count.saturating_sub(1)) as f64 / 2.0).round() as usize;
    let mut after_needed = count - 1 - backwards_needed;

    let mut index_loc = center_index;
    let mut step_count = 0usize;
    while backwards_needed > 0 && index_loc != 0 {
        index_loc -= 1;
        if source.spectrum(index_loc)?.ms_level() == 2 {
            step_count += 1;
            if step_count == stride {
                indices.push(index_loc);
                backwards_needed -= 1;
                step_count = 0;
            }
        }
    }

    // Hit the beginning of the run: take the shortfall from the far side
    after_needed += backwards_needed;
    index_loc = center_index + 1;
    step_count = 0;
    while index_loc < source.len() && after_needed > 0 {
        if source.spectrum(index_loc)?.ms_level() == 2 {
            step_count += 1;
            if step_count == stride {
                indices.push(index_loc);
                after_needed -= 1;
                step_count = 0;
            }
        }
        index_loc += 1;
    }

    // Hit the end of the run too: resume backwards from the earliest pick
    if after_needed > 0 {
        index_loc = indices.iter().copied().min().unwrap_or(center_index);
    }
    while after_needed > 0 && index_loc != 0 {
        index_loc -= 1;
        if source.spectrum(index_loc)?.ms_level() == 2 {
            step_count += 1;
            if step_count == stride {
                indices.push(index_loc);
                after_needed -= 1;
                step_count = 0;
            }
        }
    }

    if indices.len() != count {
        return Err(DemuxError::InsufficientNeighbors {
            index: center_index,
            needed: count,
        });
    }

    indices.sort_unstable();
    Ok(indices)
}
