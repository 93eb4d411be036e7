//! Taxi trip data crate.
//!
//! Decodes monthly trip files from Parquet, derives the ride duration,
//! drops rides outside the modelled range and normalizes the categorical
//! location columns. Also encodes the predictions file written at the end
//! of a batch.

mod predictions;
mod prepare;
mod reader;

pub use predictions::{PREDICTED_DURATION_COLUMN, RIDE_ID_COLUMN, decode_predictions, encode_predictions};
pub use prepare::{MAX_DURATION_MINUTES, MIN_DURATION_MINUTES, MISSING_CATEGORY, prepare_batch};
pub use reader::read_trips;

/// Pickup timestamp column of the yellow taxi trip files.
pub const PICKUP_COLUMN: &str = "tpep_pickup_datetime";

/// Dropoff timestamp column of the yellow taxi trip files.
pub const DROPOFF_COLUMN: &str = "tpep_dropoff_datetime";

/// Categorical columns the duration model is trained on.
pub const CATEGORICAL_COLUMNS: [&str; 2] = ["PULocationID", "DOLocationID"];

/// A single trip that survived cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    /// Position of the row in the source file, counted from zero.
    pub row_index: usize,
    /// Dropoff minus pickup, in minutes.
    pub duration_minutes: f64,
    /// Categorical values as strings, in the order of
    /// [`PreparedTrips::categorical_columns`].
    pub categorical: Vec<String>,
}

/// Cleaned trips of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedTrips {
    pub categorical_columns: Vec<String>,
    pub rows: Vec<TripRecord>,
}

impl PreparedTrips {
    /// Creates an empty set of trips for the given categorical columns.
    #[must_use]
    pub const fn new(categorical_columns: Vec<String>) -> Self {
        Self {
            categorical_columns,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the `(column, value)` pairs of one row.
    pub fn categorical_pairs<'a>(
        &'a self,
        row: &'a TripRecord,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.categorical_columns
            .iter()
            .map(String::as_str)
            .zip(row.categorical.iter().map(String::as_str))
    }
}

/// One scored ride, as written to the predictions file.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub ride_id: String,
    pub predicted_duration: f64,
}

/// Builds the ride identifier of a trip, e.g. `2021/02_17`.
#[must_use]
pub fn ride_id(year: i64, month: i64, row_index: usize) -> String {
    format!("{year:04}/{month:02}_{row_index}")
}
