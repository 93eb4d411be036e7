//! Batch command - scores one month of trips and writes the predictions.

use anyhow::Result;
use config::Settings;
use feature_extractor::trip_features;
use ml_model::{DurationModel, InferenceBackend, ModelArtifact, mean};
use storage::StorageOptions;
use tracing::{info, warn};
use trip_data::{CATEGORICAL_COLUMNS, PredictionRecord, PreparedTrips, ride_id};

/// What a batch run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub input_file: String,
    pub output_file: String,
    pub rides_scored: usize,
    pub mean_duration: Option<f64>,
}

/// Runs the batch command for one year and month.
///
/// Steps run strictly in order and the first failure aborts the run:
/// resolve locations, load the model, read and clean the trips, build
/// features, predict, write the predictions.
///
/// # Errors
///
/// Returns an error if any step fails.
pub async fn run(settings: &Settings, year: i64, month: i64) -> Result<BatchSummary> {
    let input_file = settings.input_path(year, month)?;
    let output_file = settings.output_path(year, month)?;
    let storage_options = StorageOptions::with_endpoint(settings.s3_endpoint_url.clone());

    info!(path = %settings.model_path.display(), "Loading model");
    let artifact = ModelArtifact::load(&settings.model_path)?;
    let model = DurationModel::<InferenceBackend>::new(artifact, &Default::default())?;

    let categorical: Vec<String> = CATEGORICAL_COLUMNS.iter().map(ToString::to_string).collect();

    info!(%input_file, "Reading input file");
    let trips = read_data(&input_file, &categorical, &storage_options).await?;

    info!(rides = trips.len(), "Making transformations");
    let dicts = trip_features(&trips);

    info!("Making predictions");
    let predictions = model.predict(&dicts)?;

    let mean_duration = mean(&predictions);
    match mean_duration {
        Some(mean_duration) => info!(mean_duration, "Predicted mean duration"),
        None => warn!("No rides left to score after filtering"),
    }

    let records: Vec<PredictionRecord> = trips
        .rows
        .iter()
        .zip(predictions)
        .map(|(trip, predicted_duration)| PredictionRecord {
            ride_id: ride_id(year, month, trip.row_index),
            predicted_duration,
        })
        .collect();

    info!(%output_file, rides = records.len(), "Writing result");
    save_data(&records, &output_file, &storage_options).await?;

    Ok(BatchSummary {
        input_file,
        output_file,
        rides_scored: records.len(),
        mean_duration,
    })
}

/// Reads a trip file and returns the cleaned trips.
///
/// # Errors
///
/// Returns an error if the location cannot be read or the data is not a
/// valid trip file.
pub async fn read_data(
    location: &str,
    categorical: &[String],
    storage_options: &StorageOptions,
) -> Result<PreparedTrips> {
    let data = storage::read_location(location, storage_options).await?;
    trip_data::read_trips(data, categorical)
}

/// Writes predictions to a location, replacing any existing file.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub async fn save_data(
    records: &[PredictionRecord],
    location: &str,
    storage_options: &StorageOptions,
) -> Result<()> {
    let data = trip_data::encode_predictions(records)?;
    storage::write_location(location, storage_options, data).await
}
