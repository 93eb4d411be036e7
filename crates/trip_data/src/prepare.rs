//! Duration derivation, range filtering and categorical normalization.

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Float64Type, Int64Type, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
};
use arrow::record_batch::RecordBatch;

use crate::{DROPOFF_COLUMN, PICKUP_COLUMN, TripRecord};

/// Shortest ride kept, in minutes.
pub const MIN_DURATION_MINUTES: f64 = 1.0;

/// Longest ride kept, in minutes.
pub const MAX_DURATION_MINUTES: f64 = 60.0;

/// Value substituted for a missing categorical value.
pub const MISSING_CATEGORY: i64 = -1;

const NANOS_PER_MINUTE: f64 = 60.0 * 1_000_000_000.0;

/// Cleans one record batch and appends the surviving trips to `out`.
///
/// `row_offset` is the position of the batch's first row in the source
/// file. Rows whose duration is missing or outside
/// [`MIN_DURATION_MINUTES`]..=[`MAX_DURATION_MINUTES`] are dropped without
/// warning.
///
/// Returns the number of dropped rows.
///
/// # Errors
///
/// Returns an error if a required column is missing or has an unsupported
/// type, or a categorical value cannot be converted to an integer.
pub fn prepare_batch(
    batch: &RecordBatch,
    categorical: &[String],
    row_offset: usize,
    out: &mut Vec<TripRecord>,
) -> Result<usize> {
    let pickup = timestamp_nanos(required_column(batch, PICKUP_COLUMN)?, PICKUP_COLUMN)?;
    let dropoff = timestamp_nanos(required_column(batch, DROPOFF_COLUMN)?, DROPOFF_COLUMN)?;

    let columns = categorical
        .iter()
        .map(|name| CategoricalColumn::new(name, required_column(batch, name)?))
        .collect::<Result<Vec<_>>>()?;

    let mut dropped = 0;

    for (row, (pickup, dropoff)) in pickup.into_iter().zip(dropoff).enumerate() {
        let Some(duration_minutes) = duration_minutes(pickup, dropoff) else {
            dropped += 1;
            continue;
        };

        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
            dropped += 1;
            continue;
        }

        let categorical = columns
            .iter()
            .map(|column| column.value(row).map(|v| v.to_string()))
            .collect::<Result<Vec<_>>>()?;

        out.push(TripRecord {
            row_index: row_offset + row,
            duration_minutes,
            categorical,
        });
    }

    Ok(dropped)
}

fn required_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Trip data is missing column '{name}'"))
}

fn duration_minutes(pickup: Option<i64>, dropoff: Option<i64>) -> Option<f64> {
    let nanos = dropoff?.checked_sub(pickup?)?;
    Some(nanos as f64 / NANOS_PER_MINUTE)
}

/// Reads a timestamp column of any unit as nanoseconds since the epoch.
/// Values outside the nanosecond range read as missing.
fn timestamp_nanos(array: &ArrayRef, name: &str) -> Result<Vec<Option<i64>>> {
    match array.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => {
            Ok(scaled::<TimestampSecondType>(array, 1_000_000_000))
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            Ok(scaled::<TimestampMillisecondType>(array, 1_000_000))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            Ok(scaled::<TimestampMicrosecondType>(array, 1_000))
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            Ok(scaled::<TimestampNanosecondType>(array, 1))
        }
        other => bail!("Column '{name}' has type {other}, expected a timestamp"),
    }
}

fn scaled<T: ArrowPrimitiveType<Native = i64>>(array: &ArrayRef, factor: i64) -> Vec<Option<i64>> {
    array
        .as_primitive::<T>()
        .iter()
        .map(|value| value.and_then(|v| v.checked_mul(factor)))
        .collect()
}

/// A categorical column viewed through one of the supported value types.
enum CategoricalColumn<'a> {
    Integer(&'a str, Int64Array),
    Float(&'a str, Float64Array),
    Text(&'a str, StringArray),
}

impl<'a> CategoricalColumn<'a> {
    fn new(name: &'a str, array: &ArrayRef) -> Result<Self> {
        if let DataType::Dictionary(_, value_type) = array.data_type() {
            let values = cast(array, value_type).with_context(|| {
                format!("Failed to decode dictionary column '{name}' as {value_type}")
            })?;
            return Self::new(name, &values);
        }

        let data_type = array.data_type();
        let cast_to = |target: &DataType| {
            cast(array, target)
                .with_context(|| format!("Failed to cast column '{name}' to {target}"))
        };

        if data_type.is_integer() {
            let values = cast_to(&DataType::Int64)?;
            Ok(Self::Integer(name, values.as_primitive::<Int64Type>().clone()))
        } else if data_type.is_floating() {
            let values = cast_to(&DataType::Float64)?;
            Ok(Self::Float(name, values.as_primitive::<Float64Type>().clone()))
        } else if matches!(
            data_type,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
        ) {
            let values = cast_to(&DataType::Utf8)?;
            Ok(Self::Text(name, values.as_string::<i32>().clone()))
        } else {
            bail!("Categorical column '{name}' has unsupported type {data_type}")
        }
    }

    /// Returns the integer value of a row, or [`MISSING_CATEGORY`] if missing.
    fn value(&self, row: usize) -> Result<i64> {
        match self {
            Self::Integer(_, values) => Ok(if values.is_null(row) {
                MISSING_CATEGORY
            } else {
                values.value(row)
            }),
            Self::Float(name, values) => {
                if values.is_null(row) || values.value(row).is_nan() {
                    return Ok(MISSING_CATEGORY);
                }
                let value = values.value(row);
                if !value.is_finite() {
                    bail!("Categorical column '{name}' has non-finite value {value} at row {row}");
                }
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "float ids are truncated toward zero like an integer cast"
                )]
                let id = value.trunc() as i64;
                Ok(id)
            }
            Self::Text(name, values) => {
                if values.is_null(row) {
                    return Ok(MISSING_CATEGORY);
                }
                let raw = values.value(row);
                raw.trim().parse().with_context(|| {
                    format!("Categorical column '{name}' has non-integer value '{raw}' at row {row}")
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{
        DictionaryArray, Float64Array, Int32Array, TimestampMicrosecondArray, TimestampSecondArray,
    };
    use arrow::datatypes::Int32Type;
    use arrow::datatypes::{Field, Schema};
    use chrono::NaiveDate;

    use super::*;

    fn micros(hour: u32, minute: u32, second: u32) -> i64 {
        NaiveDate::from_ymd_opt(2021, 2, 1)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
            .and_utc()
            .timestamp_micros()
    }

    fn batch(
        pickup: Vec<Option<i64>>,
        dropoff: Vec<Option<i64>>,
        pu: ArrayRef,
        dol: ArrayRef,
    ) -> RecordBatch {
        let ts = DataType::Timestamp(TimeUnit::Microsecond, None);
        let schema = Schema::new(vec![
            Field::new(PICKUP_COLUMN, ts.clone(), true),
            Field::new(DROPOFF_COLUMN, ts, true),
            Field::new("PULocationID", pu.data_type().clone(), true),
            Field::new("DOLocationID", dol.data_type().clone(), true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(TimestampMicrosecondArray::from(pickup)),
                Arc::new(TimestampMicrosecondArray::from(dropoff)),
                pu,
                dol,
            ],
        )
        .unwrap()
    }

    fn categorical() -> Vec<String> {
        vec!["PULocationID".to_string(), "DOLocationID".to_string()]
    }

    #[test]
    fn test_duration_filter() {
        let start = micros(0, 0, 0);
        let batch = batch(
            vec![Some(start); 5],
            vec![
                Some(micros(0, 10, 0)),
                Some(micros(1, 1, 0)),
                Some(micros(0, 0, 59)),
                Some(micros(0, 1, 0)),
                Some(micros(1, 0, 0)),
            ],
            Arc::new(Int32Array::from(vec![1, 2, 3, 4, 5])),
            Arc::new(Int32Array::from(vec![10, 20, 30, 40, 50])),
        );

        let mut out = Vec::new();
        let dropped = prepare_batch(&batch, &categorical(), 0, &mut out).unwrap();

        assert_eq!(dropped, 2);
        let kept: Vec<_> = out.iter().map(|r| (r.row_index, r.duration_minutes)).collect();
        assert_eq!(kept, vec![(0, 10.0), (3, 1.0), (4, 60.0)]);
        assert!(
            out.iter()
                .all(|r| (MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&r.duration_minutes))
        );
    }

    #[test]
    fn test_missing_timestamps_are_dropped() {
        let batch = batch(
            vec![None, Some(micros(0, 0, 0)), Some(micros(0, 20, 0))],
            vec![Some(micros(0, 10, 0)), None, Some(micros(0, 0, 0))],
            Arc::new(Int32Array::from(vec![1, 2, 3])),
            Arc::new(Int32Array::from(vec![1, 2, 3])),
        );

        let mut out = Vec::new();
        let dropped = prepare_batch(&batch, &categorical(), 0, &mut out).unwrap();

        assert_eq!(dropped, 3);
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_categories_become_sentinel() {
        let start = micros(0, 0, 0);
        let end = micros(0, 10, 0);
        let batch = batch(
            vec![Some(start); 3],
            vec![Some(end); 3],
            Arc::new(Float64Array::from(vec![None, Some(132.0), Some(f64::NAN)])),
            Arc::new(Int32Array::from(vec![Some(7), None, Some(236)])),
        );

        let mut out = Vec::new();
        prepare_batch(&batch, &categorical(), 0, &mut out).unwrap();

        let values: Vec<_> = out.iter().map(|r| r.categorical.clone()).collect();
        assert_eq!(
            values,
            vec![
                vec!["-1".to_string(), "7".to_string()],
                vec!["132".to_string(), "-1".to_string()],
                vec!["-1".to_string(), "236".to_string()],
            ]
        );
    }

    #[test]
    fn test_text_categories_are_parsed() {
        let batch = batch(
            vec![Some(micros(0, 0, 0)); 2],
            vec![Some(micros(0, 5, 0)); 2],
            Arc::new(StringArray::from(vec![Some("041"), None])),
            Arc::new(StringArray::from(vec![Some("7"), Some("12")])),
        );

        let mut out = Vec::new();
        prepare_batch(&batch, &categorical(), 0, &mut out).unwrap();

        assert_eq!(out[0].categorical, vec!["41", "7"]);
        assert_eq!(out[1].categorical, vec!["-1", "12"]);
    }

    #[test]
    fn test_dictionary_categories_are_decoded() {
        let pu: DictionaryArray<Int32Type> = vec![Some("43"), None, Some("43")].into_iter().collect();
        let dol: DictionaryArray<Int32Type> = vec![Some("7"), Some("151"), None].into_iter().collect();
        let batch = batch(
            vec![Some(micros(0, 0, 0)); 3],
            vec![Some(micros(0, 5, 0)); 3],
            Arc::new(pu),
            Arc::new(dol),
        );

        let mut out = Vec::new();
        prepare_batch(&batch, &categorical(), 0, &mut out).unwrap();

        let values: Vec<_> = out.iter().map(|r| r.categorical.clone()).collect();
        assert_eq!(
            values,
            vec![vec!["43", "7"], vec!["-1", "151"], vec!["43", "-1"]]
        );
    }

    #[test]
    fn test_out_of_range_timestamps_read_as_missing() {
        let array: ArrayRef = Arc::new(TimestampSecondArray::from(vec![
            Some(i64::MAX / 2),
            Some(60),
            None,
        ]));

        let nanos = timestamp_nanos(&array, PICKUP_COLUMN).unwrap();

        assert_eq!(nanos, vec![None, Some(60_000_000_000), None]);
    }

    #[test]
    fn test_non_integer_text_category_fails() {
        let batch = batch(
            vec![Some(micros(0, 0, 0))],
            vec![Some(micros(0, 5, 0))],
            Arc::new(StringArray::from(vec!["downtown"])),
            Arc::new(StringArray::from(vec!["7"])),
        );

        assert!(prepare_batch(&batch, &categorical(), 0, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_row_offset_is_applied() {
        let batch = batch(
            vec![Some(micros(0, 0, 0)); 2],
            vec![Some(micros(0, 2, 0)); 2],
            Arc::new(Int32Array::from(vec![1, 2])),
            Arc::new(Int32Array::from(vec![1, 2])),
        );

        let mut out = Vec::new();
        prepare_batch(&batch, &categorical(), 100, &mut out).unwrap();

        assert_eq!(out[0].row_index, 100);
        assert_eq!(out[1].row_index, 101);
    }

    #[test]
    fn test_missing_column_fails() {
        let schema = Schema::new(vec![Field::new(
            PICKUP_COLUMN,
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        )]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(TimestampMicrosecondArray::from(vec![Some(0)]))],
        )
        .unwrap();

        let error = prepare_batch(&batch, &categorical(), 0, &mut Vec::new()).unwrap_err();
        assert!(error.to_string().contains(DROPOFF_COLUMN));
    }

    #[test]
    fn test_non_timestamp_column_fails() {
        let schema = Schema::new(vec![
            Field::new(PICKUP_COLUMN, DataType::Int64, true),
            Field::new(DROPOFF_COLUMN, DataType::Int64, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![0])),
                Arc::new(Int64Array::from(vec![600])),
            ],
        )
        .unwrap();

        assert!(prepare_batch(&batch, &[], 0, &mut Vec::new()).is_err());
    }
}
