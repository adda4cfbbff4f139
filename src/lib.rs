//! Batch ETL pipeline for per-student education records.
//!
//! Raw demographics, gradebook, and attendance exports are cleaned and
//! normalized column by column, checked for duplicates, joined into one
//! row-per-student table, and published for a warehouse together with the
//! SQL defining the derived feature view.

pub mod clean;
pub mod features;
pub mod ingest;
pub mod normalize;
pub mod pipeline;
pub mod quality;
pub mod sink;
pub mod table;
pub mod transform;
pub mod unify;
