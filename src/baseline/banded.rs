//! Banded matrices and the linear solves done once per IRPLS iteration.
//!
//! Storage is row-major over the band: row `i` keeps columns
//! `i - lower ..= i + upper`. Symmetric systems go through a banded
//! Cholesky factorisation, everything else through banded LU with partial
//! pivoting (which needs `lower` extra super-diagonals for fill-in).

/// Why a banded solve could not produce a solution.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// Cholesky met a non-positive pivot: the matrix is not positive definite.
    NotPositiveDefinite { row: usize, pivot: f64 },
    /// LU met a (numerically) zero pivot.
    Singular { row: usize },
    DimensionMismatch { n: usize, rhs: usize },
}

impl std::fmt::Display for SolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPositiveDefinite { row, pivot } => {
                write!(f, "matrix not positive definite at row {row} (pivot {pivot:e})")
            }
            Self::Singular { row } => write!(f, "matrix singular at row {row}"),
            Self::DimensionMismatch { n, rhs } => {
                write!(f, "{n}x{n} system with a right-hand side of length {rhs}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandMatrix {
    n: usize,
    lower: usize,
    upper: usize,
    data: Vec<f64>,
}

impl BandMatrix {
    pub fn zeros(n: usize, lower: usize, upper: usize) -> Self {
        Self {
            n,
            lower,
            upper,
            data: vec![0.0; n * (lower + upper + 1)],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, 0, 0);
        m.data.fill(1.0);
        m
    }

    pub fn from_diagonal(diagonal: &[f64]) -> Self {
        Self {
            n: diagonal.len(),
            lower: 0,
            upper: 0,
            data: diagonal.to_vec(),
        }
    }

    /// `DᵀD` for the `order`-th forward difference operator over `n` samples.
    pub fn difference_penalty(n: usize, order: usize) -> Self {
        let stencil = difference_stencil(order);
        let mut m = Self::zeros(n, order, order);
        if n <= order {
            return m;
        }
        for row in 0..n - order {
            for (p, &sp) in stencil.iter().enumerate() {
                for (q, &sq) in stencil.iter().enumerate() {
                    m.add(row + p, row + q, sp * sq);
                }
            }
        }
        m
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn lower(&self) -> usize {
        self.lower
    }

    pub fn upper(&self) -> usize {
        self.upper
    }

    fn width(&self) -> usize {
        self.lower + self.upper + 1
    }

    fn in_band(&self, i: usize, j: usize) -> bool {
        i < self.n && j < self.n && j + self.lower >= i && j <= i + self.upper
    }

    fn offset(&self, i: usize, j: usize) -> usize {
        i * self.width() + (j + self.lower - i)
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        if self.in_band(i, j) {
            self.data[self.offset(i, j)]
        } else {
            0.0
        }
    }

    /// Adds `value` at `(i, j)`. Entries outside the band are a programming error.
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        assert!(
            self.in_band(i, j),
            "({i}, {j}) lies outside a band of ({}, {})",
            self.lower,
            self.upper
        );
        let k = self.offset(i, j);
        self.data[k] += value;
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        assert!(self.in_band(i, j), "({i}, {j}) lies outside the band");
        let k = self.offset(i, j);
        self.data[k] = value;
    }

    /// Returns a copy whose band is at least `(lower, upper)` wide.
    pub fn widened(&self, lower: usize, upper: usize) -> Self {
        let lower = lower.max(self.lower);
        let upper = upper.max(self.upper);
        if lower == self.lower && upper == self.upper {
            return self.clone();
        }
        let mut out = Self::zeros(self.n, lower, upper);
        for i in 0..self.n {
            for j in i.saturating_sub(self.lower)..=(i + self.upper).min(self.n - 1) {
                out.set(i, j, self.get(i, j));
            }
        }
        out
    }

    /// `self + scale * other`, widening the band as needed.
    pub fn plus_scaled(&self, other: &Self, scale: f64) -> Self {
        assert_eq!(self.n, other.n, "band matrices of different size");
        let mut out = self.widened(other.lower, other.upper);
        for i in 0..other.n {
            for j in i.saturating_sub(other.lower)..=(i + other.upper).min(other.n - 1) {
                out.add(i, j, scale * other.get(i, j));
            }
        }
        out
    }

    pub fn add_diagonal(&mut self, diagonal: &[f64]) {
        assert_eq!(diagonal.len(), self.n, "diagonal length mismatch");
        for (i, &d) in diagonal.iter().enumerate() {
            self.add(i, i, d);
        }
    }

    /// Multiplies row `i` by `factors[i]`, i.e. `diag(factors) · self`.
    pub fn scale_rows(&mut self, factors: &[f64]) {
        assert_eq!(factors.len(), self.n, "row factor length mismatch");
        let width = self.width();
        for (row, &f) in self.data.chunks_mut(width).zip(factors) {
            row.iter_mut().for_each(|v| *v *= f);
        }
    }

    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.n, "vector length mismatch");
        (0..self.n)
            .map(|i| {
                (i.saturating_sub(self.lower)..=(i + self.upper).min(self.n - 1))
                    .map(|j| self.get(i, j) * v[j])
                    .sum()
            })
            .collect()
    }

    pub fn is_symmetric(&self) -> bool {
        if self.lower != self.upper {
            return false;
        }
        (0..self.n).all(|i| {
            (i + 1..=(i + self.upper).min(self.n.saturating_sub(1))).all(|j| {
                let a = self.get(i, j);
                let b = self.get(j, i);
                (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
            })
        })
    }
}

fn difference_stencil(order: usize) -> Vec<f64> {
    // binomial coefficients with alternating sign: order 2 -> [1, -2, 1]
    let mut stencil = vec![1.0];
    for _ in 0..order {
        let mut next = vec![0.0; stencil.len() + 1];
        for (k, &c) in stencil.iter().enumerate() {
            next[k] -= c;
            next[k + 1] += c;
        }
        stencil = next;
    }
    stencil
}

/// The banded linear solve consumed by the penalized smoother.
pub trait BandedSolver {
    fn solve(&self, a: &BandMatrix, b: &[f64]) -> Result<Vec<f64>, SolveError>;
}

/// Cholesky for symmetric systems, LU with partial pivoting otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBandedSolver;

impl BandedSolver for DefaultBandedSolver {
    fn solve(&self, a: &BandMatrix, b: &[f64]) -> Result<Vec<f64>, SolveError> {
        if a.is_symmetric() {
            cholesky_solve(a, b)
        } else {
            lu_solve(a, b)
        }
    }
}

/// Solves a symmetric positive definite banded system. Only the lower band
/// of `a` is read.
pub fn cholesky_solve(a: &BandMatrix, b: &[f64]) -> Result<Vec<f64>, SolveError> {
    let n = a.n;
    if b.len() != n {
        return Err(SolveError::DimensionMismatch { n, rhs: b.len() });
    }
    let k = a.lower;
    // lb[t * n + i] holds L[i][i - t]
    let mut lb = vec![0.0; (k + 1) * n];
    let scale = (0..n).map(|i| a.get(i, i).abs()).fold(0.0, f64::max);
    let tiny = f64::EPSILON * scale.max(f64::MIN_POSITIVE);

    for i in 0..n {
        let jmin = i.saturating_sub(k);
        for j in jmin..=i {
            let mut sum = a.get(i, j);
            let mmin = i.saturating_sub(k).max(j.saturating_sub(k));
            for m in mmin..j {
                sum -= lb[(i - m) * n + i] * lb[(j - m) * n + j];
            }
            if i == j {
                if sum <= tiny || !sum.is_finite() {
                    return Err(SolveError::NotPositiveDefinite { row: i, pivot: sum });
                }
                lb[i] = sum.sqrt();
            } else {
                lb[(i - j) * n + i] = sum / lb[j];
            }
        }
    }

    let mut z = b.to_vec();
    for i in 0..n {
        for t in 1..=i.min(k) {
            z[i] -= lb[t * n + i] * z[i - t];
        }
        z[i] /= lb[i];
    }
    for i in (0..n).rev() {
        for t in 1..=k.min(n - 1 - i) {
            z[i] -= lb[t * n + (i + t)] * z[i + t];
        }
        z[i] /= lb[i];
    }
    Ok(z)
}

/// Solves a general banded system with partial pivoting.
pub fn lu_solve(a: &BandMatrix, b: &[f64]) -> Result<Vec<f64>, SolveError> {
    let n = a.n;
    if b.len() != n {
        return Err(SolveError::DimensionMismatch { n, rhs: b.len() });
    }
    let kl = a.lower;
    let ku = a.upper + kl;
    let mut m = a.widened(kl, ku);
    let mut rhs = b.to_vec();
    let scale = m.data.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let tiny = f64::EPSILON * scale.max(f64::MIN_POSITIVE);

    for col in 0..n {
        let last_row = (col + kl).min(n - 1);
        let pivot_row = (col..=last_row)
            .max_by(|&r1, &r2| m.get(r1, col).abs().total_cmp(&m.get(r2, col).abs()))
            .unwrap_or(col);
        let pivot = m.get(pivot_row, col);
        if pivot.abs() <= tiny || !pivot.is_finite() {
            return Err(SolveError::Singular { row: col });
        }

        let last_col = (col + ku).min(n - 1);
        if pivot_row != col {
            for j in col..=last_col {
                let upper_value = m.get(col, j);
                let lower_value = m.get(pivot_row, j);
                m.set(col, j, lower_value);
                m.set(pivot_row, j, upper_value);
            }
            rhs.swap(col, pivot_row);
        }

        for row in col + 1..=last_row {
            let factor = m.get(row, col) / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in col..=last_col {
                let v = m.get(col, j);
                m.add(row, j, -factor * v);
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let last_col = (i + ku).min(n - 1);
        let sum: f64 = (i + 1..=last_col).map(|j| m.get(i, j) * x[j]).sum();
        x[i] = (rhs[i] - sum) / m.get(i, i);
    }
    Ok(x)
}
