//! Decoding of monthly trip files.

use anyhow::{Context, Result};
use bytes::Bytes;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use crate::prepare::prepare_batch;
use crate::{DROPOFF_COLUMN, PICKUP_COLUMN, PreparedTrips};

/// Rows decoded per record batch.
const READ_BATCH_SIZE: usize = 65_536;

/// Decodes a Parquet trip file and returns the cleaned trips.
///
/// Only the pickup, dropoff and categorical columns are decoded. Row
/// indices of the returned trips refer to positions in the whole file.
///
/// # Errors
///
/// Returns an error if the data is not valid Parquet, a required column is
/// missing, or cleaning fails.
pub fn read_trips(data: Bytes, categorical: &[String]) -> Result<PreparedTrips> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)
        .context("Failed to open trip data as Parquet")?;

    let wanted: Vec<&str> = [PICKUP_COLUMN, DROPOFF_COLUMN]
        .into_iter()
        .chain(categorical.iter().map(String::as_str))
        .collect();

    for name in &wanted {
        builder
            .schema()
            .index_of(name)
            .with_context(|| format!("Trip data is missing column '{name}'"))?;
    }

    let projection = ProjectionMask::columns(builder.parquet_schema(), wanted.iter().copied());
    let reader = builder
        .with_projection(projection)
        .with_batch_size(READ_BATCH_SIZE)
        .build()
        .context("Failed to build Parquet reader")?;

    let mut trips = PreparedTrips::new(categorical.to_vec());
    let mut rows_read = 0;
    let mut rows_dropped = 0;

    for batch in reader {
        let batch = batch.context("Failed to decode trip record batch")?;
        rows_dropped += prepare_batch(&batch, categorical, rows_read, &mut trips.rows)?;
        rows_read += batch.num_rows();
    }

    debug!(
        rows_read,
        rows_dropped,
        rows_kept = trips.len(),
        "Prepared trip records"
    );

    Ok(trips)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array, TimestampNanosecondArray};
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
    use parquet::file::properties::WriterProperties;

    use super::*;

    const MINUTE: i64 = 60 * 1_000_000_000;

    fn categorical() -> Vec<String> {
        vec!["PULocationID".to_string(), "DOLocationID".to_string()]
    }

    /// Writes trips as Parquet with a small row group size so the reader
    /// sees several batches.
    fn encode(durations_minutes: &[i64], extra_column: bool) -> Bytes {
        encode_compressed(durations_minutes, extra_column, Compression::UNCOMPRESSED)
    }

    fn encode_compressed(
        durations_minutes: &[i64],
        extra_column: bool,
        compression: Compression,
    ) -> Bytes {
        let ts = DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()));
        let mut fields = vec![
            Field::new(PICKUP_COLUMN, ts.clone(), true),
            Field::new(DROPOFF_COLUMN, ts, true),
            Field::new("PULocationID", DataType::Int64, true),
            Field::new("DOLocationID", DataType::Int64, true),
        ];
        let n = durations_minutes.len();
        let pickup: Vec<i64> = (0..n as i64).map(|i| i * MINUTE).collect();
        let dropoff: Vec<i64> = pickup
            .iter()
            .zip(durations_minutes)
            .map(|(p, d)| p + d * MINUTE)
            .collect();
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(TimestampNanosecondArray::from(pickup).with_timezone("UTC")),
            Arc::new(TimestampNanosecondArray::from(dropoff).with_timezone("UTC")),
            Arc::new(Int64Array::from_iter_values(0..n as i64)),
            Arc::new(Int64Array::from_iter_values((0..n as i64).map(|i| i + 100))),
        ];
        if extra_column {
            fields.push(Field::new("fare_amount", DataType::Int64, true));
            columns.push(Arc::new(Int64Array::from_iter_values(0..n as i64)));
        }

        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        let props = WriterProperties::builder()
            .set_max_row_group_size(2)
            .set_compression(compression)
            .build();

        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props)).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        Bytes::from(buffer)
    }

    #[test]
    fn test_read_and_prepare() {
        let data = encode(&[10, 61, 0, 30, 1, 60, 5], true);

        let trips = read_trips(data, &categorical()).unwrap();

        let indices: Vec<_> = trips.rows.iter().map(|r| r.row_index).collect();
        assert_eq!(indices, vec![0, 3, 4, 5, 6]);
        assert_eq!(trips.rows[1].categorical, vec!["3", "103"]);
        assert_eq!(trips.categorical_columns, categorical());
    }

    #[test]
    fn test_missing_categorical_column() {
        let data = encode(&[10], false);

        let error = read_trips(data, &["RatecodeID".to_string()]).unwrap_err();
        assert!(error.to_string().contains("RatecodeID"));
    }

    #[test]
    fn test_reads_other_codecs() {
        for compression in [
            Compression::ZSTD(ZstdLevel::default()),
            Compression::GZIP(GzipLevel::default()),
            Compression::LZ4_RAW,
            Compression::BROTLI(BrotliLevel::default()),
        ] {
            let data = encode_compressed(&[10, 61, 5], false, compression);

            let trips = read_trips(data, &categorical()).unwrap();

            let indices: Vec<_> = trips.rows.iter().map(|r| r.row_index).collect();
            assert_eq!(indices, vec![0, 2], "{compression:?}");
        }
    }

    #[test]
    fn test_invalid_parquet() {
        let result = read_trips(Bytes::from_static(b"not parquet"), &categorical());
        assert!(result.is_err());
    }
}
