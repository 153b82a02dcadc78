//! # ncov-ingest
//!
//! Streaming normalization of SARS-CoV-2 surveillance records.
//!
//! Raw GISAID (newline-delimited JSON) or GenBank/BioSample (delimited text)
//! records flow one at a time through a lazy chain of stages and come out as
//! a fixed-column metadata table plus a FASTA sequence archive.
//!
//! ## Overview
//!
//! - **Sources** ([`datasource`]): hand out cursors over raw records
//! - **Stages** ([`transforms`], [`filters`]): map or drop one record at a time
//! - **Curation** ([`geo_rules`], [`annotations`]): user-maintained location
//!   rewrites and per-record overrides, with use counts for stale entries
//! - **Sinks** ([`sink`]): write records as they pass
//!
//! ## Example
//!
//! ```
//! use ncov_ingest::{NdjsonSource, DataSource, Stage, collect_records};
//! use ncov_ingest::transforms::{AbbreviateAuthors, ParseSex};
//!
//! let mut chain = NdjsonSource::from_lines([
//!     r#"{"authors": "Smith, J., Doe, A.", "sex": "female"}"#,
//! ])
//! .pipe(Stage::transform(AbbreviateAuthors))
//! .pipe(Stage::transform(ParseSex));
//!
//! let records = collect_records(&mut chain).unwrap();
//! assert_eq!(records[0].get_str("authors"), Some("Smith et al"));
//! assert_eq!(records[0].get_str("sex"), Some("Female"));
//! ```

pub mod annotations;
pub mod config;
pub mod datasource;
pub mod error;
pub mod filters;
pub mod geo_rules;
pub mod gisaid;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod transforms;

#[cfg(test)]
mod test_support;

pub use annotations::Annotations;
pub use config::TransformConfig;
pub use datasource::{NdjsonSource, RecordsSource, TabularSource};
pub use error::{PipelineError, Result};
pub use geo_rules::{GeoRules, GeoTuple};
pub use gisaid::{GisaidOutputs, gisaid_stages};
pub use pipeline::{
    Chained, Cursor, DataSource, Filter, Stage, Transformer, chain_all, collect_records, drain,
};
pub use record::{LINE_NUMBER_KEY, Record, Value};
