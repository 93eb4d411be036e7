//! ML model crate for ride duration prediction.
//!
//! Loads the fitted vectorizer and linear regression from a model artifact
//! and scores feature dictionaries with the Burn framework. Scoring runs in
//! fixed-size row chunks so the dense feature matrix of a whole month is
//! never materialized at once.

mod artifact;
mod regressor;

use anyhow::Result;
use burn::prelude::*;
use feature_extractor::{DictVectorizer, FeatureDict};

pub use artifact::ModelArtifact;
pub use regressor::{LinearRegression, RegressorModule};

/// Backend used for batch scoring, with `f64` elements to match the
/// precision the regression was fitted in.
pub type InferenceBackend = burn::backend::NdArray<f64>;

/// Rows scored per forward pass.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// A loaded duration model, ready for scoring.
pub struct DurationModel<B: Backend> {
    vectorizer: DictVectorizer,
    regressor: RegressorModule<B>,
    device: B::Device,
    batch_size: usize,
}

impl<B: Backend> DurationModel<B> {
    /// Builds the model from an artifact on the given device.
    ///
    /// # Errors
    ///
    /// Returns an error if the regressor cannot be built.
    pub fn new(artifact: ModelArtifact, device: &B::Device) -> Result<Self> {
        let regressor = RegressorModule::new(&artifact.regressor, device)?;

        Ok(Self {
            vectorizer: artifact.vectorizer,
            regressor,
            device: device.clone(),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Sets the number of rows scored per forward pass.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub const fn vectorizer(&self) -> &DictVectorizer {
        &self.vectorizer
    }

    /// Predicts one duration per feature dictionary, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if scoring a chunk fails.
    pub fn predict(&self, dicts: &[FeatureDict<'_>]) -> Result<Vec<f64>> {
        let mut predictions = Vec::with_capacity(dicts.len());

        for chunk in dicts.chunks(self.batch_size) {
            let matrix = self.vectorizer.transform(chunk);
            predictions.extend(self.regressor.predict_rows(matrix, chunk.len(), &self.device)?);
        }

        Ok(predictions)
    }
}

/// Mean of the predictions, or `None` if there are none.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
