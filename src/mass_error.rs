use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

/// A mass accuracy tolerance, either absolute (Daltons) or relative
/// (parts-per-million).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum Tolerance {
    Da(f64),
    PPM(f64),
}

impl Tolerance {
    /// The half-width of the tolerance interval around `query`
    pub fn delta(&self, query: f64) -> f64 {
        match self {
            Self::Da(tol) => *tol,
            Self::PPM(tol) => query * tol * 1e-6,
        }
    }

    pub fn lower_bound(&self, query: f64) -> f64 {
        query - self.delta(query)
    }

    pub fn upper_bound(&self, query: f64) -> f64 {
        query + self.delta(query)
    }

    /// The `(lower, upper)` interval around `query`
    pub fn bounds(&self, query: f64) -> (f64, f64) {
        let delta = self.delta(query);
        (query - delta, query + delta)
    }

    pub fn test(&self, query: f64, alt: f64) -> bool {
        let (lo, hi) = self.bounds(query);
        alt >= lo && alt <= hi
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::PPM(10.0)
    }
}

impl Display for Tolerance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Da(tol) => write!(f, "{tol}Da"),
            Self::PPM(tol) => write!(f, "{tol}PPM"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToleranceParsingError {
    #[error("Failed to parse tolerance magnitude: {0}")]
    UnparsedMagnitude(String),
    #[error("Unknown tolerance unit: {0}")]
    UnknownUnit(String),
}

impl FromStr for Tolerance {
    type Err = ToleranceParsingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(s.len());
        let (magnitude, unit) = s.split_at(split);
        let magnitude: f64 = magnitude
            .trim()
            .parse()
            .map_err(|_| ToleranceParsingError::UnparsedMagnitude(magnitude.to_string()))?;
        match unit.to_ascii_lowercase().as_str() {
            "da" | "th" | "mz" | "" => Ok(Self::Da(magnitude)),
            "ppm" => Ok(Self::PPM(magnitude)),
            _ => Err(ToleranceParsingError::UnknownUnit(unit.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bounds() {
        let tol = Tolerance::Da(0.02);
        let (lo, hi) = tol.bounds(500.0);
        assert!((lo - 499.98).abs() < 1e-9);
        assert!((hi - 500.02).abs() < 1e-9);

        let tol = Tolerance::PPM(10.0);
        let (lo, hi) = tol.bounds(500.0);
        assert!((lo - (500.0 - 500.0 * 1e-5)).abs() < 1e-9);
        assert!((hi - (500.0 + 500.0 * 1e-5)).abs() < 1e-9);
    }

    #[test]
    fn test_parse() {
        let tol: Tolerance = "10ppm".parse().unwrap();
        assert_eq!(tol, Tolerance::PPM(10.0));
        let tol: Tolerance = "0.5Da".parse().unwrap();
        assert_eq!(tol, Tolerance::Da(0.5));
        assert!("10lightyears".parse::<Tolerance>().is_err());
        assert!("tenppm".parse::<Tolerance>().is_err());
    }
}
