// src/normalize/mod.rs
//
// Column-level field normalizers shared by the record cleaners and the
// transformer. Everything here is a pure function: malformed input degrades
// to None (our "unknown"), never to an error.

use crate::table;
use anyhow::Result;
use arrow::array::BooleanArray;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

static ID_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)(SID-|S-)").unwrap());

/// Raw string literals that stand in for "no value" in the source exports.
pub const NULL_SENTINELS: &[&str] = &["", "NULL", "N/A", "na", "NaN", "nan", "None"];

/// Canonical form of a student identifier: trimmed, `SID-`/`S-` prefix
/// stripped, uppercased. Idempotent, so defensive re-runs are safe.
pub fn normalize_id(raw: &str) -> String {
    let stripped = ID_PREFIX.replace(raw.trim(), "");
    stripped.trim().to_uppercase()
}

/// Normalize the `student_id` column of a batch; absent column is a no-op.
pub fn normalize_student_id(batch: &RecordBatch) -> Result<RecordBatch> {
    table::map_string_column(batch, "student_id", |v| v.map(normalize_id))
}

/// Tri-state boolean: yes/true/y/1 and no/false/n/0, case-insensitive.
/// Anything else, including null, is unknown (`None`) - never false.
pub fn parse_tristate(raw: Option<&str>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "y" | "1" => Some(true),
        "no" | "false" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Rewrite a text flag column as a nullable Boolean column (null = unknown).
/// Absent column is a no-op.
pub fn normalize_tristate_column(batch: &RecordBatch, name: &str) -> Result<RecordBatch> {
    let Some(idx) = table::column_index(batch, name) else {
        return Ok(batch.clone());
    };
    let col = batch.column(idx);
    let col = if col.data_type() == &DataType::Utf8 {
        col.clone()
    } else {
        arrow::compute::cast(col.as_ref(), &DataType::Utf8)?
    };
    let strings = col
        .as_any()
        .downcast_ref::<arrow::array::StringArray>()
        .ok_or_else(|| anyhow::anyhow!("column {name} is not utf8 after cast"))?;
    let flags: BooleanArray = strings.iter().map(parse_tristate).collect();
    table::with_column(batch, name, Arc::new(flags))
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%b-%Y",
    "%B %d, %Y",
];

/// Permissive free-form date parse; unparseable input becomes None.
pub fn parse_date_permissive(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Fix an 8-digit compact date exported through a float cast.
///
/// Handles three upstream defects: a trailing `.0` render artifact, a
/// `YYYYMMDD-YYYYMMDD` range (first date wins), and a dropped leading `2`
/// that leaves 7 digits (`0250903` -> `20250903`).
pub fn fix_compact_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let s = s.split('.').next().unwrap_or(s);
    let s = s.split('-').next().unwrap_or(s);
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let fixed = if s.len() == 7 {
        format!("20{}", &s[1..])
    } else {
        s.to_string()
    };
    if fixed.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(&fixed, "%Y%m%d").ok()
}

/// Days-since-epoch for an Arrow Date32 cell.
pub fn to_date32(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch");
    (date - epoch).num_days() as i32
}

/// Trim, drop trailing backslash export artifacts, and collapse null
/// sentinels to None.
pub fn scrub_text(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_end_matches('\\').trim_end();
    if NULL_SENTINELS.contains(&cleaned) {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Letter grade -> midpoint of its numeric range.
static LETTER_GRADES: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    let ranges: &[(&str, f64, f64)] = &[
        ("A+", 97.0, 100.0),
        ("A", 93.0, 96.0),
        ("A-", 90.0, 92.0),
        ("B+", 87.0, 89.0),
        ("B", 83.0, 86.0),
        ("B-", 80.0, 82.0),
        ("C+", 77.0, 79.0),
        ("C", 73.0, 76.0),
        ("C-", 70.0, 72.0),
        ("D+", 67.0, 69.0),
        ("D", 63.0, 66.0),
        ("D-", 60.0, 62.0),
        ("F", 0.0, 59.0),
    ];
    ranges.iter().map(|&(g, lo, hi)| (g, (lo + hi) / 2.0)).collect()
});

/// Numeric value for a raw grade: direct float parses win, then the letter
/// grade midpoint table (case-insensitive). Unrecognized grades are unknown.
pub fn grade_to_numeric(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<f64>() {
        if v.is_finite() {
            return Some(v);
        }
        return None;
    }
    LETTER_GRADES.get(s.to_uppercase().as_str()).copied()
}

/// Python `str.title()` semantics: uppercase every letter that follows a
/// non-letter, lowercase the rest.
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;
    for ch in raw.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}
