// src/clean/demographics.rs

use crate::normalize::{
    normalize_student_id, normalize_tristate_column, parse_date_permissive, scrub_text, title_case,
};
use crate::table;
use anyhow::Result;
use arrow::array::{Array, StringArray};
use arrow::record_batch::RecordBatch;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::cell::Cell;
use std::sync::Arc;
use tracing::{info, warn};

/// Trailing `<non-digits><YYYY-MM-DD>` in a name field. The date belongs in
/// DOB; an upstream merge glued it onto the name.
static NAME_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\D*?)(\d{4}-\d{2}-\d{2})\s*$").unwrap());

#[derive(Debug, Clone, Serialize)]
pub struct DemographicsReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub names_repaired: usize,
    pub unparseable_dob: usize,
    pub duplicate_ids_removed: usize,
}

/// Clean the demographics table. Ordered pipeline:
/// name/DOB repair, name casing, tri-state flags, enrollment status, notes,
/// DOB canonicalization, gender codes, id normalization, keep-first dedup.
pub fn clean_demographics(batch: &RecordBatch) -> Result<(RecordBatch, DemographicsReport)> {
    let rows_in = batch.num_rows();
    info!(rows = rows_in, "cleaning demographics");

    let (batch, names_repaired) = repair_name_dob(batch)?;

    let mut batch = batch;
    for col in ["first_name", "last_name"] {
        batch = table::map_string_column(&batch, col, |v| {
            v.map(|s| title_case(s.trim()))
        })?;
    }

    for col in ["ELL_Status", "IEP_Status", "FRL_Status"] {
        batch = normalize_tristate_column(&batch, col)?;
    }

    batch = table::map_string_column(&batch, "enrollment_status", |v| {
        v.and_then(|s| {
            let t = title_case(s.trim());
            match t.as_str() {
                "" | "\\" | "Nan" | "Na" => None,
                _ => Some(t),
            }
        })
    })?;

    // Sentinels in notes collapse to an empty string, not null, so downstream
    // substring checks stay safe.
    batch = table::map_string_column(&batch, "notes", |v| {
        Some(match v {
            Some(s) => scrub_text(s).unwrap_or_default(),
            None => String::new(),
        })
    })?;

    let unparseable_dob = Cell::new(0usize);
    batch = table::map_string_column(&batch, "DOB", |v| {
        v.and_then(|s| match parse_date_permissive(s) {
            Some(d) => Some(d.format("%Y-%m-%d").to_string()),
            None => {
                unparseable_dob.set(unparseable_dob.get() + 1);
                None
            }
        })
    })?;
    let unparseable_dob = unparseable_dob.get();
    if unparseable_dob > 0 {
        warn!(count = unparseable_dob, "unparseable DOB values set to unknown");
    }

    batch = table::map_string_column(&batch, "gender", |v| {
        v.and_then(|s| match s.trim().to_uppercase().as_str() {
            "M" | "MALE" => Some("M".to_string()),
            "F" | "FEMALE" => Some("F".to_string()),
            _ => None,
        })
    })?;

    batch = normalize_student_id(&batch)?;

    // One row per student after cleaning; later files re-export earlier rows.
    let mut duplicate_ids_removed = 0;
    if table::column_index(&batch, "student_id").is_some() {
        let (deduped, counts) = table::dedup_keep_first(&batch, "student_id")?;
        if counts.removed > 0 {
            info!(removed = counts.removed, "dropped duplicate student_id rows");
        }
        duplicate_ids_removed = counts.removed;
        batch = deduped;
    }

    let report = DemographicsReport {
        rows_in,
        rows_out: batch.num_rows(),
        names_repaired,
        unparseable_dob,
        duplicate_ids_removed,
    };
    Ok((batch, report))
}

/// Row-by-row repair of date fragments embedded in name fields. The pattern
/// is row-local, so this is a per-row scan rather than a columnar rewrite.
fn repair_name_dob(batch: &RecordBatch) -> Result<(RecordBatch, usize)> {
    let n = batch.num_rows();
    let first = table::string_column(batch, "first_name");
    let last = table::string_column(batch, "last_name");
    if first.is_none() && last.is_none() {
        return Ok((batch.clone(), 0));
    }

    let mut dob: Vec<Option<String>> = match table::string_column(batch, "DOB") {
        Some(col) => (0..n)
            .map(|i| (!col.is_null(i)).then(|| col.value(i).to_string()))
            .collect(),
        None => vec![None; n],
    };
    let had_dob = table::column_index(batch, "DOB").is_some();

    let mut repaired = 0usize;
    let mut repair = |col: &StringArray| -> Vec<Option<String>> {
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            if col.is_null(i) {
                out.push(None);
                continue;
            }
            let value = col.value(i);
            match NAME_DATE.captures(value) {
                Some(caps) => {
                    out.push(Some(caps[1].trim().to_string()));
                    dob[i] = Some(caps[2].to_string());
                    repaired += 1;
                }
                None => out.push(Some(value.to_string())),
            }
        }
        out
    };

    let new_first = first.map(&mut repair);
    let new_last = last.map(&mut repair);

    let mut out = batch.clone();
    if let Some(values) = new_first {
        out = table::with_column(&out, "first_name", Arc::new(StringArray::from(values)))?;
    }
    if let Some(values) = new_last {
        out = table::with_column(&out, "last_name", Arc::new(StringArray::from(values)))?;
    }
    if had_dob || repaired > 0 {
        out = table::with_column(&out, "DOB", Arc::new(StringArray::from(dob)))?;
    }
    if repaired > 0 {
        info!(count = repaired, "repaired names with embedded dates");
    }
    Ok((out, repaired))
}
