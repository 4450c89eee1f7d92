use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::AnalysisError;
use crate::data::model::ImageShape;

/// Extra directions carried by the subspace iteration beyond `n_components`.
const OVERSAMPLING: usize = 10;

// ---------------------------------------------------------------------------
// Builder-style configuration
// ---------------------------------------------------------------------------

/// Principal Component Analysis of a dense sample matrix (rows are samples).
///
/// Only the leading `n_components` eigenpairs of the sample covariance are
/// computed, by randomized block subspace iteration with Rayleigh–Ritz
/// extraction. The covariance is never formed: every iteration multiplies the
/// centered data and its transpose with a thin `d × (k + p)` block, so wide
/// image data (thousands of pixels per row) stays cheap.
#[derive(Debug, Clone)]
pub struct Pca {
    n_components: usize,
    seed: u64,
    max_iterations: usize,
    tolerance: f64,
    fitted: Option<FittedPca>,
}

#[derive(Debug, Clone)]
struct FittedPca {
    mean: Array1<f64>,
    /// `k × d`, one orthonormal component per row.
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    explained_variance_ratio: Array1<f64>,
    total_variance: f64,
    n_iterations: usize,
}

impl Pca {
    pub fn new(n_components: usize) -> Self {
        Pca {
            n_components,
            seed: 0,
            max_iterations: 200,
            tolerance: 1e-9,
            fitted: None,
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Relative change of the leading eigenvalues that counts as converged.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    // -----------------------------------------------------------------------
    // Fitting
    // -----------------------------------------------------------------------

    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<(), AnalysisError> {
        let (n_samples, n_features) = x.dim();
        if n_samples < 2 {
            return Err(AnalysisError::TooFewSamples {
                needed: 2,
                found: n_samples,
            });
        }
        let k = self.n_components.min(n_samples).min(n_features);
        if k == 0 {
            return Err(AnalysisError::FeatureMismatch {
                expected: 1,
                found: 0,
            });
        }
        let block = (k + OVERSAMPLING).min(n_features);

        let mean = x.mean_axis(Axis(0)).ok_or(AnalysisError::TooFewSamples {
            needed: 2,
            found: 0,
        })?;
        let total_variance = x.var_axis(Axis(0), 1.0).sum();

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut q = Array2::from_shape_fn((n_features, block), |_| rng.random::<f64>() - 0.5);
        orthonormalize(&mut q, &mut rng);

        let mut previous: Option<Array1<f64>> = None;
        let mut n_iterations = 0;
        let (values, vectors) = loop {
            n_iterations += 1;
            let z = covariance_product(x, &mean, &q, n_samples);

            // Rayleigh–Ritz on the current basis.
            let (values, rotation) = symmetric_eigen(&q.t().dot(&z))?;

            let converged = previous.as_ref().is_some_and(|prev| {
                let scale = values[0].abs().max(f64::MIN_POSITIVE);
                (0..k).all(|i| (values[i] - prev[i]).abs() <= self.tolerance * scale)
            });
            if converged || n_iterations >= self.max_iterations {
                break (values, q.dot(&rotation));
            }

            previous = Some(values);
            q = z;
            orthonormalize(&mut q, &mut rng);
        };

        log::debug!("PCA subspace iteration finished after {n_iterations} iterations");

        let mut components = vectors.slice(s![.., ..k]).t().to_owned();
        flip_signs(&mut components);

        let explained_variance = values.slice(s![..k]).mapv(|v| v.max(0.0));
        let explained_variance_ratio = if total_variance > 0.0 {
            &explained_variance / total_variance
        } else {
            Array1::zeros(k)
        };

        self.fitted = Some(FittedPca {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
            total_variance,
            n_iterations,
        });
        Ok(())
    }

    /// Project samples onto the fitted components.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, AnalysisError> {
        let fitted = self.fitted(x.ncols())?;
        let offset = fitted.mean.dot(&fitted.components.t());
        Ok(x.dot(&fitted.components.t()) - &offset)
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>, AnalysisError> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Map projections back into feature space.
    pub fn inverse_transform(&self, scores: ArrayView2<f64>) -> Result<Array2<f64>, AnalysisError> {
        let fitted = self.fitted.as_ref().ok_or(AnalysisError::NotFitted("PCA"))?;
        let k = fitted.components.nrows();
        if scores.ncols() != k {
            return Err(AnalysisError::FeatureMismatch {
                expected: k,
                found: scores.ncols(),
            });
        }
        Ok(scores.dot(&fitted.components) + &fitted.mean)
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    /// Number of components actually fitted (may be below the requested one).
    pub fn n_components(&self) -> usize {
        self.fitted
            .as_ref()
            .map(|f| f.components.nrows())
            .unwrap_or(self.n_components)
    }

    pub fn components(&self) -> Option<&Array2<f64>> {
        self.fitted.as_ref().map(|f| &f.components)
    }

    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.explained_variance)
    }

    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.explained_variance_ratio)
    }

    pub fn total_variance(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.total_variance)
    }

    pub fn n_iterations(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.n_iterations)
    }

    /// Share of the total variance held by the first `n` components.
    pub fn cumulative_ratio(&self, n: usize) -> Option<f64> {
        self.explained_variance_ratio()
            .map(|r| r.iter().take(n).sum())
    }

    /// Component `index` laid out as an image.
    pub fn component_image(&self, index: usize, shape: ImageShape) -> Result<Array2<f64>, AnalysisError> {
        let fitted = self.fitted(shape.len())?;
        let available = fitted.components.nrows();
        if index >= available {
            return Err(AnalysisError::ComponentOutOfRange { index, available });
        }
        let row = fitted.components.row(index).to_owned();
        row.into_shape_with_order((shape.height, shape.width))
            .map_err(|_| AnalysisError::FeatureMismatch {
                expected: fitted.mean.len(),
                found: shape.len(),
            })
    }

    fn fitted(&self, n_features: usize) -> Result<&FittedPca, AnalysisError> {
        let fitted = self.fitted.as_ref().ok_or(AnalysisError::NotFitted("PCA"))?;
        if fitted.mean.len() != n_features {
            return Err(AnalysisError::FeatureMismatch {
                expected: fitted.mean.len(),
                found: n_features,
            });
        }
        Ok(fitted)
    }
}

// ---------------------------------------------------------------------------
// Linear algebra helpers
// ---------------------------------------------------------------------------

/// `Xcᵀ·Xc·q / (n − 1)` with `Xc = x − mean`, without materialising `Xc`.
fn covariance_product(x: ArrayView2<f64>, mean: &Array1<f64>, q: &Array2<f64>, n: usize) -> Array2<f64> {
    let mut y = x.dot(q);
    y -= &mean.dot(q);

    let col_sums = y.sum_axis(Axis(0));
    let mut z = x.t().dot(&y);
    let correction = mean
        .view()
        .insert_axis(Axis(1))
        .dot(&col_sums.view().insert_axis(Axis(0)));
    z -= &correction;
    z /= (n - 1) as f64;
    z
}

/// Modified Gram–Schmidt on the columns of `q`. A column that collapses onto
/// the previous ones is redrawn once; if it collapses again it is zeroed.
fn orthonormalize(q: &mut Array2<f64>, rng: &mut ChaCha8Rng) {
    let n_cols = q.ncols();
    for j in 0..n_cols {
        for attempt in 0..2 {
            let before = q.column(j).dot(&q.column(j)).sqrt();
            for i in 0..j {
                let proj = q.column(i).dot(&q.column(j));
                let prev = q.column(i).to_owned();
                q.column_mut(j).scaled_add(-proj, &prev);
            }
            let norm = q.column(j).dot(&q.column(j)).sqrt();
            if norm > 1e-10 * before && norm > 0.0 {
                q.column_mut(j).mapv_inplace(|v| v / norm);
                break;
            }
            if attempt == 0 {
                q.column_mut(j).mapv_inplace(|_| rng.random::<f64>() - 0.5);
            } else {
                q.column_mut(j).fill(0.0);
            }
        }
    }
}

/// Eigen-decomposition of a small symmetric matrix, sorted by decreasing
/// eigenvalue. Eigenvectors are the columns of the returned matrix.
fn symmetric_eigen(b: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>), AnalysisError> {
    let m = b.nrows();
    let sym = DMatrix::from_fn(m, m, |i, j| 0.5 * (b[[i, j]] + b[[j, i]]));
    if sym.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::NonFinite);
    }
    let eig = SymmetricEigen::new(sym);

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    let values = Array1::from_iter(order.iter().map(|&i| eig.eigenvalues[i]));
    let vectors = Array2::from_shape_fn((m, m), |(r, c)| eig.eigenvectors[(r, order[c])]);
    Ok((values, vectors))
}

/// Make the largest-magnitude entry of every row positive.
fn flip_signs(components: &mut Array2<f64>) {
    for mut row in components.rows_mut() {
        let pivot = row
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);
        if pivot < 0.0 {
            row.mapv_inplace(|v| -v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        // Unequal column scales give well separated eigenvalues.
        Array2::from_shape_fn((rows, cols), |(_, c)| (rng.random::<f64>() - 0.5) * (c + 1) as f64)
    }

    #[test]
    fn finds_dominant_direction() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut x = Array2::zeros((200, 3));
        for mut row in x.rows_mut() {
            let t = (rng.random::<f64>() - 0.5) * 20.0;
            let noise = (rng.random::<f64>() - 0.5) * 0.1;
            row[0] = t + noise;
            row[1] = t - noise;
            row[2] = (rng.random::<f64>() - 0.5) * 0.1;
        }

        let mut pca = Pca::new(2).seed(1);
        pca.fit(x.view()).unwrap();
        let first = pca.components().unwrap().row(0).to_owned();
        let expected = array![1.0, 1.0, 0.0] / 2f64.sqrt();
        assert!(first.dot(&expected) > 0.999);
        assert!(pca.explained_variance_ratio().unwrap()[0] > 0.99);
    }

    #[test]
    fn matches_full_eigendecomposition() {
        let x = random_matrix(60, 6, 3);
        let mut pca = Pca::new(3).seed(11);
        pca.fit(x.view()).unwrap();

        let mean = x.mean_axis(Axis(0)).unwrap();
        let xc = &x - &mean;
        let cov = xc.t().dot(&xc) / 59.0;
        let (values, vectors) = symmetric_eigen(&cov).unwrap();

        let ev = pca.explained_variance().unwrap();
        let comps = pca.components().unwrap();
        for i in 0..3 {
            assert_relative_eq!(ev[i], values[i], max_relative = 1e-8);
            let alignment = comps.row(i).dot(&vectors.column(i)).abs();
            assert_relative_eq!(alignment, 1.0, epsilon = 1e-6);
        }
        assert_relative_eq!(pca.total_variance().unwrap(), values.sum(), max_relative = 1e-10);
    }

    #[test]
    fn converges_when_block_is_narrower_than_features() {
        let x = random_matrix(300, 40, 13);
        let mut pca = Pca::new(2).seed(5);
        pca.fit(x.view()).unwrap();
        assert!(pca.n_iterations().unwrap() > 1);

        let mean = x.mean_axis(Axis(0)).unwrap();
        let xc = &x - &mean;
        let cov = xc.t().dot(&xc) / 299.0;
        let (values, vectors) = symmetric_eigen(&cov).unwrap();

        let ev = pca.explained_variance().unwrap();
        let comps = pca.components().unwrap();
        for i in 0..2 {
            assert_relative_eq!(ev[i], values[i], max_relative = 1e-6);
            assert!(comps.row(i).dot(&vectors.column(i)).abs() > 1.0 - 1e-4);
        }
    }

    #[test]
    fn components_are_orthonormal_and_sorted() {
        let x = random_matrix(80, 12, 5);
        let mut pca = Pca::new(5).seed(2);
        pca.fit(x.view()).unwrap();

        let c = pca.components().unwrap();
        let gram = c.dot(&c.t());
        for i in 0..5 {
            for j in 0..5 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(gram[[i, j]], expected, epsilon = 1e-9);
            }
        }

        let ratio = pca.explained_variance_ratio().unwrap();
        assert!(ratio.windows(2).into_iter().all(|w| w[0] >= w[1]));
        assert!(ratio.sum() <= 1.0 + 1e-12);
        assert_relative_eq!(pca.cumulative_ratio(2).unwrap(), ratio[0] + ratio[1]);
    }

    #[test]
    fn projection_variance_equals_explained_variance() {
        let x = random_matrix(100, 8, 9);
        let mut pca = Pca::new(4);
        let scores = pca.fit_transform(x.view()).unwrap();
        assert_eq!(scores.dim(), (100, 4));

        let ev = pca.explained_variance().unwrap();
        for (i, col) in scores.columns().into_iter().enumerate() {
            assert_relative_eq!(col.mean().unwrap(), 0.0, epsilon = 1e-9);
            assert_relative_eq!(col.var(1.0), ev[i], max_relative = 1e-8);
        }
    }

    #[test]
    fn full_rank_reconstruction_is_exact() {
        let x = random_matrix(30, 4, 21);
        let mut pca = Pca::new(4);
        let scores = pca.fit_transform(x.view()).unwrap();
        let back = pca.inverse_transform(scores.view()).unwrap();
        for (a, b) in back.iter().zip(x.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-8);
        }
    }

    #[test]
    fn signs_are_deterministic() {
        let x = random_matrix(50, 6, 4);
        let mut a = Pca::new(3).seed(1);
        let mut b = Pca::new(3).seed(99);
        a.fit(x.view()).unwrap();
        b.fit(x.view()).unwrap();
        for (u, v) in a.components().unwrap().iter().zip(b.components().unwrap().iter()) {
            assert_relative_eq!(u, v, epsilon = 1e-6);
        }
    }

    #[test]
    fn clamps_components_and_reports_errors() {
        let x = random_matrix(5, 3, 1);
        let mut pca = Pca::new(10);
        pca.fit(x.view()).unwrap();
        assert_eq!(pca.n_components(), 3);

        let unfitted = Pca::new(2);
        assert_eq!(
            unfitted.transform(x.view()).unwrap_err(),
            AnalysisError::NotFitted("PCA")
        );

        let one_row = random_matrix(1, 3, 1);
        assert!(matches!(
            Pca::new(2).fit(one_row.view()),
            Err(AnalysisError::TooFewSamples { needed: 2, found: 1 })
        ));

        let wide = random_matrix(5, 4, 1);
        assert!(matches!(
            pca.transform(wide.view()),
            Err(AnalysisError::FeatureMismatch { expected: 3, found: 4 })
        ));
    }

    #[test]
    fn reshapes_components_into_images() {
        let x = random_matrix(40, 6, 8);
        let mut pca = Pca::new(2);
        pca.fit(x.view()).unwrap();

        let img = pca.component_image(1, ImageShape::new(2, 3)).unwrap();
        assert_eq!(img.dim(), (2, 3));
        assert_eq!(img[[1, 0]], pca.components().unwrap()[[1, 3]]);

        assert!(matches!(
            pca.component_image(2, ImageShape::new(2, 3)),
            Err(AnalysisError::ComponentOutOfRange { index: 2, available: 2 })
        ));
    }
}
