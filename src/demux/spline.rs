//! One-dimensional natural cubic spline interpolation, used to resample
//! neighbor-spectrum intensities onto a common retention time.
use thiserror::Error;

/// Reasons a [`CubicSpline`] cannot be built from its inputs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplineError {
    #[error("No sample points were provided")]
    Empty,
    #[error("Mismatched sample lengths: {points} abscissas, {values} values")]
    LengthMismatch { points: usize, values: usize },
    #[error("Sample abscissas must be in ascending order")]
    NotAscending,
    #[error("Sample abscissas contain near-duplicates (within 1e-5)")]
    DuplicateAbscissa,
}

#[derive(Debug, Clone, Copy)]
struct SplineSegment {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    x: f64,
}

/// A natural cubic spline through a set of `(x, y)` samples.
///
/// Evaluation outside the sampled range extrapolates the nearest segment's
/// polynomial; callers interpolating intensities clamp the result at zero.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    segments: Vec<SplineSegment>,
}

impl CubicSpline {
    pub fn new(points: &[f64], values: &[f64]) -> Result<Self, SplineError> {
        Self::validate(points, values)?;

        if points.len() == 1 {
            // a single sample degenerates to a constant
            return Ok(Self {
                segments: vec![SplineSegment {
                    a: values[0],
                    b: 0.0,
                    c: 0.0,
                    d: 0.0,
                    x: points[0],
                }],
            });
        }

        let n = points.len() - 1;
        let a = values;
        let h: Vec<f64> = (0..n).map(|i| points[i + 1] - points[i]).collect();

        let mut alpha = vec![0.0; n.max(1)];
        for i in 1..n {
            alpha[i] = 3.0 * (a[i + 1] - a[i]) / h[i] - 3.0 * (a[i] - a[i - 1]) / h[i - 1];
        }

        let mut c = vec![0.0; n + 1];
        let mut l = vec![1.0; n + 1];
        let mut mu = vec![0.0; n + 1];
        let mut z = vec![0.0; n + 1];
        for i in 1..n {
            l[i] = 2.0 * (points[i + 1] - points[i - 1]) - h[i - 1] * mu[i - 1];
            mu[i] = h[i] / l[i];
            z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
        }

        let mut b = vec![0.0; n];
        let mut d = vec![0.0; n];
        for j in (0..n).rev() {
            c[j] = z[j] - mu[j] * c[j + 1];
            b[j] = (a[j + 1] - a[j]) / h[j] - h[j] * (c[j + 1] + 2.0 * c[j]) / 3.0;
            d[j] = (c[j + 1] - c[j]) / (3.0 * h[j]);
        }

        let segments = (0..n)
            .map(|i| SplineSegment {
                a: a[i],
                b: b[i],
                c: c[i],
                d: d[i],
                x: points[i],
            })
            .collect();
        Ok(Self { segments })
    }

    fn validate(points: &[f64], values: &[f64]) -> Result<(), SplineError> {
        if points.is_empty() || values.is_empty() {
            return Err(SplineError::Empty);
        }
        if points.len() != values.len() {
            return Err(SplineError::LengthMismatch {
                points: points.len(),
                values: values.len(),
            });
        }
        if points.windows(2).any(|w| w[0] > w[1]) {
            return Err(SplineError::NotAscending);
        }
        if points.windows(2).any(|w| (w[1] - w[0]).abs() < 1e-5) {
            return Err(SplineError::DuplicateAbscissa);
        }
        Ok(())
    }

    /// Evaluate the spline at `x`
    pub fn evaluate(&self, x: f64) -> f64 {
        let mut j = self
            .segments
            .iter()
            .position(|s| s.x > x)
            .unwrap_or(self.segments.len());
        j = j.saturating_sub(1);

        let segment = &self.segments[j];
        let dx = x - segment.x;
        segment.a + segment.b * dx + segment.c * dx * dx + segment.d * dx * dx * dx
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            CubicSpline::new(&[], &[]),
            Err(SplineError::Empty)
        ));
        assert!(matches!(
            CubicSpline::new(&[1.0, 2.0], &[1.0]),
            Err(SplineError::LengthMismatch {
                points: 2,
                values: 1
            })
        ));
        assert!(matches!(
            CubicSpline::new(&[2.0, 1.0, 3.0], &[0.0, 0.0, 0.0]),
            Err(SplineError::NotAscending)
        ));
        assert!(matches!(
            CubicSpline::new(&[1.0, 1.0 + 5e-6, 2.0], &[0.0, 0.0, 0.0]),
            Err(SplineError::DuplicateAbscissa)
        ));
    }

    #[test]
    fn test_interpolates_sinc_like_function() {
        let f = |x: f64| (2.0 * x).sin() / x;
        let start = std::f64::consts::PI;
        let end = 5.0 * std::f64::consts::PI;
        let n = 20;
        let step = (end - start) / (n as f64 - 1.0);
        let points: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
        let values: Vec<f64> = points.iter().map(|&x| f(x)).collect();

        let spline = CubicSpline::new(&points, &values).unwrap();
        let probe_end = 4.0 * std::f64::consts::PI;
        let probe_step = (probe_end - start) / 19.0;
        for i in 0..20 {
            let x = start + i as f64 * probe_step;
            assert!(
                (spline.evaluate(x) - f(x)).abs() < 1.0,
                "interpolation error too large at {x}"
            );
        }
    }

    #[test]
    fn test_passes_through_samples() {
        let points = vec![0.0, 1.0, 2.5, 4.0];
        let values = vec![1.0, 3.0, -2.0, 0.5];
        let spline = CubicSpline::new(&points, &values).unwrap();
        for (x, y) in points.iter().zip(values.iter()) {
            assert!((spline.evaluate(*x) - y).abs() < 1e-9);
        }
    }
}
