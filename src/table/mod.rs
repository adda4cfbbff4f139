// src/table/mod.rs
//
// Small helpers over Arrow RecordBatches. Every pipeline stage works on
// batches, so column lookup, replacement, and row selection live here.

use anyhow::{anyhow, Result};
use arrow::array::{Array, ArrayRef, StringArray, UInt32Array};
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Index of `name` in the batch schema, if present.
pub fn column_index(batch: &RecordBatch, name: &str) -> Option<usize> {
    batch.schema().index_of(name).ok()
}

/// Borrow a column as a `StringArray`. Returns `None` when the column is
/// absent or not Utf8.
pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    let idx = column_index(batch, name)?;
    batch.column(idx).as_any().downcast_ref::<StringArray>()
}

/// Replace `name` with `array` (or append it if the column does not exist).
/// The resulting field is always nullable since cleaning can introduce nulls.
pub fn with_column(batch: &RecordBatch, name: &str, array: ArrayRef) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    let field = Field::new(name, array.data_type().clone(), true);
    match schema.index_of(name) {
        Ok(idx) => {
            fields[idx] = field;
            columns[idx] = array;
        }
        Err(_) => {
            fields.push(field);
            columns.push(array);
        }
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Apply `f` to every value of a text column. A missing column is a no-op,
/// not an error; non-Utf8 columns are cast to text first.
pub fn map_string_column<F>(batch: &RecordBatch, name: &str, f: F) -> Result<RecordBatch>
where
    F: Fn(Option<&str>) -> Option<String>,
{
    let Some(idx) = column_index(batch, name) else {
        return Ok(batch.clone());
    };
    let col = batch.column(idx);
    let col = if col.data_type() == &DataType::Utf8 {
        col.clone()
    } else {
        cast(col.as_ref(), &DataType::Utf8)?
    };
    let strings = col
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("column {name} is not utf8 after cast"))?;
    let mapped: StringArray = strings.iter().map(&f).collect();
    with_column(batch, name, Arc::new(mapped))
}

/// Select rows by index, in order. Null indices produce all-null rows, which
/// is what the left join relies on for unmatched students.
pub fn take_rows(batch: &RecordBatch, indices: &UInt32Array) -> Result<RecordBatch> {
    let columns = batch
        .columns()
        .iter()
        .map(|c| take(c.as_ref(), indices, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DedupCounts {
    /// Rows belonging to a key that occurs more than once.
    pub found: usize,
    /// Rows actually dropped (everything after the first occurrence).
    pub removed: usize,
}

/// Drop rows whose `key` column value was already seen, keeping the first
/// occurrence in original order. Null keys are treated as one shared value.
pub fn dedup_keep_first(batch: &RecordBatch, key: &str) -> Result<(RecordBatch, DedupCounts)> {
    let keys = string_column(batch, key)
        .ok_or_else(|| anyhow!("dedup key column {key} missing or not utf8"))?;

    let mut occurrences: HashMap<Option<&str>, usize> = HashMap::new();
    for i in 0..keys.len() {
        let k = if keys.is_null(i) { None } else { Some(keys.value(i)) };
        *occurrences.entry(k).or_default() += 1;
    }

    let mut seen: HashSet<Option<&str>> = HashSet::new();
    let mut keep: Vec<u32> = Vec::with_capacity(keys.len());
    let mut found = 0usize;
    for i in 0..keys.len() {
        let k = if keys.is_null(i) { None } else { Some(keys.value(i)) };
        if occurrences[&k] > 1 {
            found += 1;
        }
        if seen.insert(k) {
            keep.push(i as u32);
        }
    }

    let removed = batch.num_rows() - keep.len();
    let deduped = take_rows(batch, &UInt32Array::from(keep))?;
    Ok((deduped, DedupCounts { found, removed }))
}

/// Null count per column, in schema order.
pub fn null_counts(batch: &RecordBatch) -> Vec<(String, usize)> {
    batch
        .schema()
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(f, c)| (f.name().clone(), c.null_count()))
        .collect()
}

/// Build an all-Utf8 batch from literal columns. Test fixture helper.
#[cfg(test)]
pub(crate) fn utf8_table(columns: &[(&str, &[Option<&str>])]) -> RecordBatch {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|(_, values)| Arc::new(StringArray::from(values.to_vec())) as ArrayRef)
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
}
