//! Encoding of the predictions file.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, AsArray, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::PredictionRecord;

/// Ride identifier column of the predictions file.
pub const RIDE_ID_COLUMN: &str = "ride_id";

/// Predicted duration column of the predictions file.
pub const PREDICTED_DURATION_COLUMN: &str = "predicted_duration";

fn predictions_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(RIDE_ID_COLUMN, DataType::Utf8, false),
        Field::new(PREDICTED_DURATION_COLUMN, DataType::Float64, false),
    ]))
}

/// Encodes predictions as a Snappy-compressed Parquet file with exactly
/// the `ride_id` and `predicted_duration` columns.
///
/// # Errors
///
/// Returns an error if Parquet encoding fails.
pub fn encode_predictions(records: &[PredictionRecord]) -> Result<Bytes> {
    let schema = predictions_schema();

    let ride_ids = StringArray::from_iter_values(records.iter().map(|r| r.ride_id.as_str()));
    let durations = Float64Array::from_iter_values(records.iter().map(|r| r.predicted_duration));
    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(ride_ids), Arc::new(durations)])
        .context("Failed to build predictions record batch")?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))
        .context("Failed to create Parquet writer")?;
    writer
        .write(&batch)
        .context("Failed to write predictions")?;
    writer.close().context("Failed to finish predictions file")?;

    Ok(Bytes::from(buffer))
}

/// Decodes a predictions file written by [`encode_predictions`].
///
/// # Errors
///
/// Returns an error if the data is not a predictions Parquet file.
pub fn decode_predictions(data: Bytes) -> Result<Vec<PredictionRecord>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(data)
        .context("Failed to open predictions as Parquet")?
        .build()
        .context("Failed to build Parquet reader")?;

    let mut records = Vec::new();

    for batch in reader {
        let batch = batch.context("Failed to decode predictions record batch")?;
        if batch.schema().fields().len() != 2 {
            bail!(
                "Predictions file has {} columns, expected 2",
                batch.schema().fields().len()
            );
        }

        let ride_ids = batch
            .column_by_name(RIDE_ID_COLUMN)
            .and_then(|c| c.as_string_opt::<i32>())
            .with_context(|| format!("Predictions file has no string column '{RIDE_ID_COLUMN}'"))?;
        let durations = batch
            .column_by_name(PREDICTED_DURATION_COLUMN)
            .and_then(|c| c.as_primitive_opt::<Float64Type>())
            .with_context(|| {
                format!("Predictions file has no float column '{PREDICTED_DURATION_COLUMN}'")
            })?;

        if ride_ids.null_count() > 0 || durations.null_count() > 0 {
            bail!("Predictions file contains null values");
        }

        records.extend(
            ride_ids
                .iter()
                .zip(durations.values().iter())
                .map(|(ride_id, &predicted_duration)| PredictionRecord {
                    ride_id: ride_id.unwrap_or_default().to_string(),
                    predicted_duration,
                }),
        );
    }

    Ok(records)
}
