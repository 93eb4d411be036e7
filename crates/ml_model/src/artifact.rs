//! The model artifact: a fitted vectorizer and regression stored together.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use feature_extractor::DictVectorizer;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::regressor::LinearRegression;

/// The `(vectorizer, regressor)` pair written after training.
///
/// Stored on disk with `bincode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub vectorizer: DictVectorizer,
    pub regressor: LinearRegression,
}

impl ModelArtifact {
    /// Pairs a vectorizer with a regression fitted on its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the regression does not take exactly one
    /// coefficient per vectorizer feature.
    pub fn new(vectorizer: DictVectorizer, regressor: LinearRegression) -> Result<Self> {
        let artifact = Self {
            vectorizer,
            regressor,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.vectorizer.n_features() > 0,
            "Model artifact has an empty vectorizer"
        );
        ensure!(
            self.vectorizer.n_features() == self.regressor.n_features(),
            "Vectorizer produces {} features but the regressor expects {}",
            self.vectorizer.n_features(),
            self.regressor.n_features()
        );
        Ok(())
    }

    /// Loads an artifact from a local file. The file is read in full and
    /// closed before decoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a model artifact,
    /// or its parts do not fit together.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Cannot read model artifact '{}'", path.display()))?;

        let artifact: Self = bincode::deserialize(&bytes)
            .with_context(|| format!("Cannot decode model artifact '{}'", path.display()))?;
        artifact
            .validate()
            .with_context(|| format!("Invalid model artifact '{}'", path.display()))?;

        debug!(
            path = %path.display(),
            features = artifact.vectorizer.n_features(),
            "Loaded model artifact"
        );

        Ok(artifact)
    }

    /// Saves the artifact to a local file, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self).context("Failed to encode model artifact")?;

        fs::write(path, bytes)
            .with_context(|| format!("Cannot write model artifact '{}'", path.display()))?;

        debug!(path = %path.display(), "Saved model artifact");
        Ok(())
    }
}
