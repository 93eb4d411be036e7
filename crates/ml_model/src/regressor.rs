//! Linear regression scoring on Burn tensors.

use anyhow::{Result, anyhow, ensure};
use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

/// Fitted coefficients of a linear regression, `y = x · w + b`, stored in
/// full double precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    /// One weight per input feature.
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegression {
    #[must_use]
    pub const fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }

    /// Number of input features the regression expects.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }
}

/// A single linear layer holding the fitted regression weights.
#[derive(Module, Debug)]
pub struct RegressorModule<B: Backend> {
    linear: Linear<B>,
}

impl<B: Backend> RegressorModule<B> {
    /// Builds the layer from fitted coefficients.
    ///
    /// # Errors
    ///
    /// Returns an error if the regression has no coefficients.
    pub fn new(regression: &LinearRegression, device: &B::Device) -> Result<Self> {
        let n_features = regression.n_features();
        ensure!(n_features > 0, "regression must have at least one coefficient");

        let mut linear = LinearConfig::new(n_features, 1).init(device);

        let weight = Tensor::<B, 2>::from_data(
            TensorData::new(regression.coefficients.clone(), [n_features, 1])
                .convert::<B::FloatElem>(),
            device,
        );
        let bias = Tensor::<B, 1>::from_data(
            TensorData::new(vec![regression.intercept], [1]).convert::<B::FloatElem>(),
            device,
        );

        linear.weight = Param::from_tensor(weight);
        linear.bias = Some(Param::from_tensor(bias));

        Ok(Self { linear })
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape [`batch_size`, `n_features`]
    ///
    /// # Returns
    ///
    /// Tensor of shape [`batch_size`, 1] with one prediction per row.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.linear.forward(input)
    }

    /// Scores a dense row-major matrix of `rows` rows.
    ///
    /// Values are computed in the backend's float element type, so a
    /// backend with `f32` elements keeps about seven significant digits.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix is not `rows` by `n_features`, or the
    /// output tensor cannot be read back.
    pub fn predict_rows(&self, matrix: Vec<f64>, rows: usize, device: &B::Device) -> Result<Vec<f64>> {
        if rows == 0 {
            return Ok(Vec::new());
        }

        let [n_features, _] = self.linear.weight.dims();
        ensure!(
            matrix.len() == rows * n_features,
            "feature matrix has {} values, expected {rows} rows of {n_features} features",
            matrix.len()
        );

        let input = Tensor::<B, 2>::from_data(
            TensorData::new(matrix, [rows, n_features]).convert::<B::FloatElem>(),
            device,
        );
        let output = self.forward(input);

        output
            .into_data()
            .convert::<f64>()
            .to_vec()
            .map_err(|e| anyhow!("Failed to read predictions from tensor: {e:?}"))
    }
}
