use ndarray::{Array1, Array2, ArrayView2, ArrayViewMut2, Axis};
use rayon::prelude::*;

use super::AnalysisError;

/// Per-feature standardization to zero mean and unit variance.
///
/// The standard deviation is the population one (ddof 0). Features with zero
/// variance keep scale 1 so they map to 0 instead of NaN.
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<(), AnalysisError> {
        let mean = x.mean_axis(Axis(0)).ok_or(AnalysisError::TooFewSamples {
            needed: 1,
            found: 0,
        })?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });

        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(())
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, AnalysisError> {
        let mut out = x.to_owned();
        self.transform_inplace(out.view_mut())?;
        Ok(out)
    }

    /// Standardize `x` without allocating a second matrix.
    pub fn transform_inplace(&self, mut x: ArrayViewMut2<f64>) -> Result<(), AnalysisError> {
        let (mean, scale) = self.fitted(x.ncols())?;
        x.axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut row| {
                row -= mean;
                row /= scale;
            });
        Ok(())
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>, AnalysisError> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Map standardized values back to the original units.
    pub fn inverse_transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, AnalysisError> {
        let (mean, scale) = self.fitted(x.ncols())?;
        let mut out = x.to_owned();
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut row| {
                row *= scale;
                row += mean;
            });
        Ok(out)
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }

    fn fitted(&self, n_features: usize) -> Result<(&Array1<f64>, &Array1<f64>), AnalysisError> {
        let (Some(mean), Some(scale)) = (&self.mean, &self.scale) else {
            return Err(AnalysisError::NotFitted("StandardScaler"));
        };
        if mean.len() != n_features {
            return Err(AnalysisError::FeatureMismatch {
                expected: mean.len(),
                found: n_features,
            });
        }
        Ok((mean, scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn standardizes_columns() {
        let x = array![[1.0, 10.0, 5.0], [3.0, 20.0, 5.0], [5.0, 60.0, 5.0]];
        let mut scaler = StandardScaler::new();
        let z = scaler.fit_transform(x.view()).unwrap();

        for (j, col) in z.columns().into_iter().enumerate() {
            assert_relative_eq!(col.mean().unwrap(), 0.0, epsilon = 1e-12);
            let expected_std = if j == 2 { 0.0 } else { 1.0 };
            assert_relative_eq!(col.std(0.0), expected_std, epsilon = 1e-12);
        }
        assert_eq!(scaler.scale().unwrap()[2], 1.0);
        assert_relative_eq!(z[[0, 0]], -1.224744871391589, epsilon = 1e-12);
    }

    #[test]
    fn inplace_matches_copy_and_inverts() {
        let x = array![[0.0, 2.0], [4.0, 3.0], [8.0, 7.0], [1.0, 1.0]];
        let mut scaler = StandardScaler::new();
        scaler.fit(x.view()).unwrap();

        let copied = scaler.transform(x.view()).unwrap();
        let mut inplace = x.clone();
        scaler.transform_inplace(inplace.view_mut()).unwrap();
        assert_eq!(copied, inplace);

        let back = scaler.inverse_transform(inplace.view()).unwrap();
        for (a, b) in back.iter().zip(x.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn rejects_unfitted_and_mismatched_input() {
        let scaler = StandardScaler::new();
        let x = array![[1.0, 2.0]];
        assert_eq!(
            scaler.transform(x.view()).unwrap_err(),
            AnalysisError::NotFitted("StandardScaler")
        );

        let mut scaler = StandardScaler::new();
        scaler.fit(x.view()).unwrap();
        let wide = array![[1.0, 2.0, 3.0]];
        assert_eq!(
            scaler.transform(wide.view()).unwrap_err(),
            AnalysisError::FeatureMismatch { expected: 2, found: 3 }
        );
    }
}
