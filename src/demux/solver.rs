//! Batched non-negative least squares over the columns of the response
//! matrix.
use nalgebra::{DMatrix, DVector};

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

/// Solves `min ||A x - b||^2` subject to `x >= 0` for every column `b` of a
/// response matrix, using the Lawson-Hanson active-set method.
///
/// Columns are independent, so they are distributed across a worker pool
/// when the `parallelism` feature is enabled; each worker keeps one
/// [`NnlsWorkspace`] and reuses it for every column it serves. Hitting the
/// iteration cap is not an error: the current iterate is returned.
#[derive(Debug, Clone)]
pub struct NnlsSolver {
    max_iterations: usize,
    tolerance: f64,
}

impl Default for NnlsSolver {
    fn default() -> Self {
        Self::new(50, 1e-10)
    }
}

impl NnlsSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// Solve one system per column of `signal` against the design matrix
    /// `masks` (`m x n`), producing the `n x k` non-negative solution
    /// matrix.
    pub fn solve(&self, masks: &DMatrix<f64>, signal: &DMatrix<f64>) -> DMatrix<f64> {
        let n = masks.ncols();
        let k = signal.ncols();
        let mut solution = DMatrix::zeros(n, k);

        #[cfg(feature = "parallelism")]
        let columns: Vec<DVector<f64>> = (0..k)
            .into_par_iter()
            .map_init(
                || NnlsWorkspace::new(masks, self.max_iterations, self.tolerance),
                |workspace, j| workspace.solve(&signal.column(j).into_owned()),
            )
            .collect();

        #[cfg(not(feature = "parallelism"))]
        let columns: Vec<DVector<f64>> = {
            let mut workspace = NnlsWorkspace::new(masks, self.max_iterations, self.tolerance);
            (0..k)
                .map(|j| workspace.solve(&signal.column(j).into_owned()))
                .collect()
        };

        for (j, column) in columns.iter().enumerate() {
            solution.set_column(j, column);
        }
        solution
    }
}

/// Worker-local state for the active-set iteration, reused across the
/// columns served by one worker.
struct NnlsWorkspace {
    a: DMatrix<f64>,
    at: DMatrix<f64>,
    max_iterations: usize,
    tolerance: f64,
    passive: Vec<bool>,
    x: DVector<f64>,
}

impl NnlsWorkspace {
    fn new(a: &DMatrix<f64>, max_iterations: usize, tolerance: f64) -> Self {
        let n = a.ncols();
        Self {
            a: a.clone(),
            at: a.transpose(),
            max_iterations,
            tolerance,
            passive: vec![false; n],
            x: DVector::zeros(n),
        }
    }

    fn solve(&mut self, b: &DVector<f64>) -> DVector<f64> {
        let n = self.a.ncols();
        self.passive.fill(false);
        self.x.fill(0.0);

        let mut iterations = 0usize;
        while iterations < self.max_iterations {
            iterations += 1;

            // residual gradient; the free variable with the steepest
            // descent direction enters the passive set
            let w = &self.at * (b - &self.a * &self.x);
            let entering = (0..n)
                .filter(|&j| !self.passive[j] && w[j] > self.tolerance)
                .max_by(|&i, &j| w[i].total_cmp(&w[j]));
            let Some(entering) = entering else {
                break;
            };
            self.passive[entering] = true;

            // inner loop: keep the unconstrained passive-set solution
            // feasible, demoting variables driven to zero
            let mut inner_guard = 0usize;
            loop {
                let z = self.solve_passive(b);
                let feasible = (0..n).filter(|&j| self.passive[j]).all(|j| z[j] > 0.0);
                if feasible {
                    for j in 0..n {
                        self.x[j] = if self.passive[j] { z[j] } else { 0.0 };
                    }
                    break;
                }

                let mut alpha = f64::INFINITY;
                for j in (0..n).filter(|&j| self.passive[j] && z[j] <= 0.0) {
                    let denom = self.x[j] - z[j];
                    if denom > 0.0 {
                        alpha = alpha.min(self.x[j] / denom);
                    }
                }
                if !alpha.is_finite() {
                    for j in (0..n).filter(|&j| self.passive[j]) {
                        self.x[j] = z[j].max(0.0);
                    }
                    break;
                }
                let passive_js: Vec<usize> = (0..n).filter(|&j| self.passive[j]).collect();
                for j in passive_js {
                    self.x[j] += alpha * (z[j] - self.x[j]);
                    if self.x[j] <= self.tolerance {
                        self.x[j] = 0.0;
                        self.passive[j] = false;
                    }
                }

                inner_guard += 1;
                if inner_guard > n {
                    break;
                }
            }
        }
        self.x.clone()
    }

    /// Unconstrained least squares restricted to the passive columns,
    /// scattered back to full length with zeros elsewhere
    fn solve_passive(&self, b: &DVector<f64>) -> DVector<f64> {
        let columns: Vec<usize> = (0..self.a.ncols()).filter(|&j| self.passive[j]).collect();
        let mut z = DVector::zeros(self.a.ncols());
        if columns.is_empty() {
            return z;
        }
        let sub = DMatrix::from_fn(self.a.nrows(), columns.len(), |r, c| {
            self.a[(r, columns[c])]
        });
        match sub.svd(true, true).solve(b, 1e-14) {
            Ok(solved) => {
                for (c, &j) in columns.iter().enumerate() {
                    z[j] = solved[c];
                }
            }
            Err(e) => {
                // keep the zero vector; the caller's feasibility check will
                // unwind the passive set
                log::warn!("NNLS passive-set solve failed: {e}");
            }
        }
        z
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// The banded design matrix produced by single-overlap demultiplexing:
    /// row `i` covers windows `i` and `i + 1`
    fn bidiagonal_masks(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| if j == i || j == i + 1 { 1.0 } else { 0.0 })
    }

    fn assert_recovers(expected: &[f64]) {
        let masks = bidiagonal_masks(expected.len());
        let x = DVector::from_column_slice(expected);
        let signal = &masks * &x;
        let signal = DMatrix::from_column_slice(expected.len(), 1, signal.as_slice());

        let solver = NnlsSolver::default();
        let solution = solver.solve(&masks, &signal);
        assert_eq!(solution.shape(), (expected.len(), 1));
        for (i, &value) in expected.iter().enumerate() {
            assert!(
                (solution[(i, 0)] - value).abs() < 1e-4,
                "column {i}: {} != {value}",
                solution[(i, 0)]
            );
        }
    }

    #[test]
    fn test_sparse_solution() {
        assert_recovers(&[0.0, 0.0, 0.0, 11.0, 13.0, 0.0, 0.0]);
    }

    #[test]
    fn test_dense_solution() {
        assert_recovers(&[5.0, 3.0, 2.0, 11.0, 13.0, 9.0, 3.0]);
    }

    #[test]
    fn test_negative_data_clamps_to_zero() {
        let masks = bidiagonal_masks(4);
        // a right-hand side no non-negative solution can reach exactly
        let signal = DMatrix::from_column_slice(4, 1, &[-5.0, -1.0, -2.0, -3.0]);
        let solution = NnlsSolver::default().solve(&masks, &signal);
        assert!(solution.iter().all(|&v| v >= 0.0));
        assert!(solution.iter().all(|&v| v.abs() < 1e-9));
    }

    #[test]
    fn test_many_columns() {
        let masks = bidiagonal_masks(5);
        let num_columns = 64;
        let mut expected = Vec::new();
        let mut signal = DMatrix::zeros(5, num_columns);
        for j in 0..num_columns {
            let x = DVector::from_fn(5, |i, _| ((i + j) % 3) as f64 * 2.0);
            let b = &masks * &x;
            signal.set_column(j, &b);
            expected.push(x);
        }
        let solution = NnlsSolver::default().solve(&masks, &signal);
        for (j, x) in expected.iter().enumerate() {
            for i in 0..5 {
                assert!(
                    (solution[(i, j)] - x[i]).abs() < 1e-4,
                    "entry ({i}, {j}) diverged"
                );
            }
        }
    }
}
