//! Matrix Factorization using Alternating Least Squares (ALS)
//!
//! Binary implicit feedback: each observed entry is a 1. Every row with at
//! least one entry solves `(VᵗV + λI) x = Vᵗ·1` over the factors of the
//! columns it touches, then columns do the same against the rows.

use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

const INIT_SCALE: f32 = 0.01;

/// ALS configuration parameters
#[derive(Debug, Clone)]
pub struct ALSConfig {
    /// Number of latent factors (embedding dimension)
    pub latent_factors: usize,
    /// Regularization parameter (lambda)
    pub regularization: f32,
    /// Number of iterations
    pub iterations: usize,
}

impl Default for ALSConfig {
    fn default() -> Self {
        Self {
            latent_factors: 64,
            regularization: 0.01,
            iterations: 15,
        }
    }
}

/// Sparse user-item interaction matrix with a fixed shape
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    /// (user_index, item_index) -> value
    pub entries: BTreeMap<(usize, usize), f32>,
    pub num_users: usize,
    pub num_items: usize,
}

impl SparseMatrix {
    pub fn new(num_users: usize, num_items: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            num_users,
            num_items,
        }
    }

    /// Insert an entry; indices outside the shape are ignored
    pub fn insert(&mut self, user_idx: usize, item_idx: usize, value: f32) -> bool {
        if user_idx >= self.num_users || item_idx >= self.num_items {
            return false;
        }
        self.entries.insert((user_idx, item_idx), value);
        true
    }

    pub fn get(&self, user_idx: usize, item_idx: usize) -> f32 {
        *self.entries.get(&(user_idx, item_idx)).unwrap_or(&0.0)
    }

    pub fn contains(&self, user_idx: usize, item_idx: usize) -> bool {
        self.entries.contains_key(&(user_idx, item_idx))
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Item indices of one user, ascending
    pub fn user_items(&self, user_idx: usize) -> Vec<usize> {
        self.entries
            .range((user_idx, 0)..(user_idx + 1, 0))
            .map(|(&(_, i), _)| i)
            .collect()
    }

    fn by_user(&self) -> Vec<Vec<usize>> {
        let mut rows = vec![Vec::new(); self.num_users];
        for &(u, i) in self.entries.keys() {
            rows[u].push(i);
        }
        rows
    }

    fn by_item(&self) -> Vec<Vec<usize>> {
        let mut cols = vec![Vec::new(); self.num_items];
        for &(u, i) in self.entries.keys() {
            cols[i].push(u);
        }
        cols
    }
}

/// ALS-based matrix factorization
#[derive(Debug, Clone)]
pub struct MatrixFactorization {
    config: ALSConfig,
    /// User latent factors: [num_users x latent_factors]
    pub user_factors: Array2<f32>,
    /// Item latent factors: [num_items x latent_factors]
    pub item_factors: Array2<f32>,
}

impl MatrixFactorization {
    /// Untrained model with zero factors of the given shape
    pub fn new(config: ALSConfig, num_users: usize, num_items: usize) -> Self {
        let k = config.latent_factors;
        Self {
            config,
            user_factors: Array2::zeros((num_users, k)),
            item_factors: Array2::zeros((num_items, k)),
        }
    }

    /// Rebuild from persisted factors
    pub fn from_factors(user_factors: Array2<f32>, item_factors: Array2<f32>) -> Result<Self> {
        if user_factors.ncols() != item_factors.ncols() {
            anyhow::bail!(
                "Factor width mismatch: users {} vs items {}",
                user_factors.ncols(),
                item_factors.ncols()
            );
        }
        Ok(Self {
            config: ALSConfig {
                latent_factors: user_factors.ncols(),
                ..ALSConfig::default()
            },
            user_factors,
            item_factors,
        })
    }

    pub fn latent_factors(&self) -> usize {
        self.config.latent_factors
    }

    /// Train ALS model on sparse matrix
    pub fn fit(&mut self, matrix: &SparseMatrix, rng: &mut StdRng) -> Result<()> {
        let k = self.config.latent_factors;
        let lambda = self.config.regularization as f64;

        let normal = Normal::new(0.0f32, 1.0).context("Invalid normal distribution")?;
        let mut user_factors =
            Array2::from_shape_fn((matrix.num_users, k), |_| normal.sample(rng) * INIT_SCALE);
        let mut item_factors =
            Array2::from_shape_fn((matrix.num_items, k), |_| normal.sample(rng) * INIT_SCALE);

        let user_items = matrix.by_user();
        let item_users = matrix.by_item();

        // ALS iterations
        for iteration in 0..self.config.iterations {
            // Update user factors
            for (u, items) in user_items.iter().enumerate() {
                if !items.is_empty() {
                    let x = Self::solve_factor(items, &item_factors, k, lambda)
                        .with_context(|| format!("Failed to solve user factors for row {}", u))?;
                    user_factors.row_mut(u).assign(&x);
                }
            }

            // Update item factors
            for (i, users) in item_users.iter().enumerate() {
                if !users.is_empty() {
                    let x = Self::solve_factor(users, &user_factors, k, lambda)
                        .with_context(|| format!("Failed to solve item factors for column {}", i))?;
                    item_factors.row_mut(i).assign(&x);
                }
            }

            if iteration % 2 == 0 {
                let loss = Self::compute_loss(matrix, &user_factors, &item_factors);
                tracing::debug!("ALS iteration {}: loss = {:.4}", iteration, loss);
            }
        }

        self.user_factors = user_factors;
        self.item_factors = item_factors;

        Ok(())
    }

    /// Solve `(VᵗV + λI) x = Vᵗ·1` where V stacks the rows of `factors` named by `indices`
    fn solve_factor(
        indices: &[usize],
        factors: &Array2<f32>,
        k: usize,
        lambda: f64,
    ) -> Result<Array1<f32>> {
        let mut a = Array2::<f64>::zeros((k, k));
        let mut b = Array1::<f64>::zeros(k);

        for &idx in indices {
            let v = factors.row(idx);
            for i in 0..k {
                let vi = v[i] as f64;
                for j in 0..k {
                    a[[i, j]] += vi * v[j] as f64;
                }
                b[i] += vi;
            }
        }

        for i in 0..k {
            a[[i, i]] += lambda;
        }

        let x = Self::solve_least_squares(&a, &b)?;
        Ok(x.mapv(|v| v as f32))
    }

    /// Solve least squares system A * x = b using Cholesky decomposition
    /// For positive definite matrix A (which we guarantee by adding regularization)
    fn solve_least_squares(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
        let n = a.nrows();

        // A = L * L^T
        let mut l = Array2::<f64>::zeros((n, n));

        for i in 0..n {
            for j in 0..=i {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l[[i, k]] * l[[j, k]];
                }

                if i == j {
                    let diag = a[[i, i]] - sum;
                    if diag <= 0.0 {
                        anyhow::bail!("Matrix is not positive definite");
                    }
                    l[[i, j]] = diag.sqrt();
                } else {
                    l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
                }
            }
        }

        // L * y = b
        let mut y = Array1::<f64>::zeros(n);
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += l[[i, j]] * y[j];
            }
            y[i] = (b[i] - sum) / l[[i, i]];
        }

        // L^T * x = y
        let mut x = Array1::<f64>::zeros(n);
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += l[[j, i]] * x[j];
            }
            x[i] = (y[i] - sum) / l[[i, i]];
        }

        Ok(x)
    }

    /// Mean squared reconstruction error over observed entries
    fn compute_loss(
        matrix: &SparseMatrix,
        user_factors: &Array2<f32>,
        item_factors: &Array2<f32>,
    ) -> f32 {
        if matrix.entries.is_empty() {
            return 0.0;
        }

        let total: f32 = matrix
            .entries
            .iter()
            .map(|(&(u, i), &value)| {
                let prediction = user_factors.row(u).dot(&item_factors.row(i));
                (value - prediction).powi(2)
            })
            .sum();

        total / matrix.entries.len() as f32
    }

    /// Dot product of factors; 0 outside the trained shape
    pub fn predict(&self, user_idx: usize, item_idx: usize) -> f32 {
        if user_idx >= self.user_factors.nrows() || item_idx >= self.item_factors.nrows() {
            return 0.0;
        }
        self.user_factors
            .row(user_idx)
            .dot(&self.item_factors.row(item_idx))
    }

    /// Scores of every item for one user
    pub fn score_items(&self, user_idx: usize) -> Array1<f32> {
        self.item_factors.dot(&self.user_factors.row(user_idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn small_matrix() -> SparseMatrix {
        let mut matrix = SparseMatrix::new(3, 4);
        matrix.insert(0, 0, 1.0);
        matrix.insert(0, 1, 1.0);
        matrix.insert(1, 0, 1.0);
        matrix.insert(1, 2, 1.0);
        matrix
    }

    #[test]
    fn test_sparse_matrix() {
        let mut matrix = small_matrix();
        assert_eq!(matrix.nnz(), 4);
        assert_eq!(matrix.get(0, 1), 1.0);
        assert_eq!(matrix.get(2, 3), 0.0);
        assert_eq!(matrix.user_items(0), vec![0, 1]);
        assert!(matrix.user_items(2).is_empty());
        assert!(!matrix.insert(5, 0, 1.0));
    }

    #[test]
    fn test_solve_least_squares_identity() {
        let a = Array2::<f64>::eye(3) * 2.0;
        let b = Array1::from_vec(vec![2.0, 4.0, 6.0]);
        let x = MatrixFactorization::solve_least_squares(&a, &b).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
        assert!((x[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_rejects_non_positive_definite() {
        let a = Array2::<f64>::zeros((2, 2));
        let b = Array1::<f64>::zeros(2);
        assert!(MatrixFactorization::solve_least_squares(&a, &b).is_err());
    }

    #[test]
    fn test_als_fit_shapes() {
        let matrix = small_matrix();
        let mut mf = MatrixFactorization::new(
            ALSConfig {
                latent_factors: 4,
                regularization: 0.01,
                iterations: 5,
            },
            matrix.num_users,
            matrix.num_items,
        );
        mf.fit(&matrix, &mut StdRng::seed_from_u64(11)).unwrap();

        assert_eq!(mf.user_factors.dim(), (3, 4));
        assert_eq!(mf.item_factors.dim(), (4, 4));
    }

    #[test]
    fn test_als_reconstructs_observed_entries() {
        let matrix = small_matrix();
        let mut mf = MatrixFactorization::new(
            ALSConfig {
                latent_factors: 8,
                regularization: 0.01,
                iterations: 15,
            },
            matrix.num_users,
            matrix.num_items,
        );
        mf.fit(&matrix, &mut StdRng::seed_from_u64(5)).unwrap();

        for (&(u, i), _) in &matrix.entries {
            assert!(mf.predict(u, i) > 0.5, "entry ({}, {}) = {}", u, i, mf.predict(u, i));
        }
        assert_eq!(mf.predict(99, 0), 0.0);
    }

    #[test]
    fn test_rows_without_entries_keep_initial_scale() {
        let matrix = small_matrix();
        let mut mf = MatrixFactorization::new(ALSConfig::default(), 3, 4);
        mf.fit(&matrix, &mut StdRng::seed_from_u64(5)).unwrap();

        // user 2 never interacted, item 3 was never touched
        assert!(mf.user_factors.row(2).iter().all(|v| v.abs() < 0.1));
        assert!(mf.item_factors.row(3).iter().all(|v| v.abs() < 0.1));
    }

    #[test]
    fn test_from_factors_rejects_width_mismatch() {
        let users = Array2::<f32>::zeros((2, 3));
        let items = Array2::<f32>::zeros((2, 4));
        assert!(MatrixFactorization::from_factors(users, items).is_err());
    }
}
