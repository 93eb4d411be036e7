//! Feature extractor crate for the duration model.
//!
//! Each prepared trip is turned into a feature dictionary mapping a column
//! name to its value. A fitted [`DictVectorizer`] maps those dictionaries to
//! fixed-width numeric rows.
//!
//! Naming follows the usual dictionary vectorizer rules:
//! - a text value `v` under key `k` sets the one-hot feature `k=v` to 1.0
//! - a numeric value `x` under key `k` sets the feature `k` to `x`
//!
//! Keys or values the vectorizer was not fitted on are ignored and
//! contribute nothing to the row.

use std::collections::{BTreeSet, HashMap};

use anyhow::bail;
use serde::{Deserialize, Serialize};
use trip_data::PreparedTrips;

/// Default separator between key and text value in feature names.
pub const DEFAULT_SEPARATOR: &str = "=";

/// A single feature value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue<'a> {
    Text(&'a str),
    Number(f64),
}

/// Column name to value mapping for one row.
pub type FeatureDict<'a> = Vec<(&'a str, FeatureValue<'a>)>;

/// Builds the feature dictionary of every prepared trip, in trip order.
///
/// Every categorical column becomes a text feature.
#[must_use]
pub fn trip_features(trips: &PreparedTrips) -> Vec<FeatureDict<'_>> {
    trips
        .rows
        .iter()
        .map(|row| {
            trips
                .categorical_pairs(row)
                .map(|(key, value)| (key, FeatureValue::Text(value)))
                .collect()
        })
        .collect()
}

/// Serialized form of a [`DictVectorizer`].
#[derive(Serialize, Deserialize)]
struct VectorizerRecord {
    separator: String,
    feature_names: Vec<String>,
}

/// A fitted mapping from feature dictionaries to dense numeric rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VectorizerRecord", into = "VectorizerRecord")]
pub struct DictVectorizer {
    separator: String,
    feature_names: Vec<String>,
    vocabulary: HashMap<String, usize>,
}

impl TryFrom<VectorizerRecord> for DictVectorizer {
    type Error = anyhow::Error;

    fn try_from(record: VectorizerRecord) -> anyhow::Result<Self> {
        Self::from_feature_names(record.feature_names, record.separator)
    }
}

impl From<DictVectorizer> for VectorizerRecord {
    fn from(vectorizer: DictVectorizer) -> Self {
        Self {
            separator: vectorizer.separator,
            feature_names: vectorizer.feature_names,
        }
    }
}

impl DictVectorizer {
    /// Creates a vectorizer from already fitted feature names. Column `i` of
    /// the output holds feature `feature_names[i]`.
    ///
    /// # Errors
    ///
    /// Returns an error if a feature name appears twice.
    pub fn from_feature_names(
        feature_names: Vec<String>,
        separator: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let mut vocabulary = HashMap::with_capacity(feature_names.len());
        for (index, name) in feature_names.iter().enumerate() {
            if vocabulary.insert(name.clone(), index).is_some() {
                bail!("Duplicate feature name '{name}' in vectorizer");
            }
        }

        Ok(Self {
            separator: separator.into(),
            feature_names,
            vocabulary,
        })
    }

    /// Learns the feature names seen in `dicts`, sorted lexicographically.
    pub fn fit<'a, I>(dicts: I) -> Self
    where
        I: IntoIterator<Item = &'a FeatureDict<'a>>,
    {
        let mut names = BTreeSet::new();
        for dict in dicts {
            for (key, value) in dict {
                names.insert(feature_name(key, value, DEFAULT_SEPARATOR));
            }
        }

        let feature_names: Vec<String> = names.into_iter().collect();
        let vocabulary = feature_names
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), index))
            .collect();

        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            feature_names,
            vocabulary,
        }
    }

    /// Width of the rows produced by [`Self::transform`].
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Returns the column index of a feature name.
    #[must_use]
    pub fn index_of(&self, feature_name: &str) -> Option<usize> {
        self.vocabulary.get(feature_name).copied()
    }

    /// Adds one dictionary into `row`, which must be `n_features` wide.
    /// Repeated keys accumulate.
    ///
    /// # Panics
    ///
    /// Panics if `row` is narrower than [`Self::n_features`].
    pub fn transform_into(&self, dict: &FeatureDict<'_>, row: &mut [f64]) {
        for (key, value) in dict {
            let name = feature_name(key, value, &self.separator);
            let Some(&index) = self.vocabulary.get(&name) else {
                continue;
            };
            row[index] += match value {
                FeatureValue::Text(_) => 1.0,
                FeatureValue::Number(x) => *x,
            };
        }
    }

    /// Transforms dictionaries into a dense row-major matrix of
    /// `dicts.len()` rows by [`Self::n_features`] columns.
    #[must_use]
    pub fn transform(&self, dicts: &[FeatureDict<'_>]) -> Vec<f64> {
        let width = self.n_features();
        let mut matrix = vec![0.0; dicts.len() * width];

        if width == 0 {
            return matrix;
        }

        for (dict, row) in dicts.iter().zip(matrix.chunks_exact_mut(width)) {
            self.transform_into(dict, row);
        }

        matrix
    }
}

fn feature_name(key: &str, value: &FeatureValue<'_>, separator: &str) -> String {
    match value {
        FeatureValue::Text(text) => format!("{key}{separator}{text}"),
        FeatureValue::Number(_) => key.to_string(),
    }
}
