//! Transform configuration.
//!
//! Every table the pipeline consults (column names, date formats, title-case
//! exceptions, strain prefixes, hardcoded metadata, output layout) lives in
//! one immutable [`TransformConfig`]. `Default` carries the GISAID values;
//! a TOML file can override any subset of them.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn string_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn string_map(items: &[(&str, &str)]) -> BTreeMap<String, String> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Input field name → output field name.
    pub column_map: BTreeMap<String, String>,
    /// Metadata output columns, in order.
    pub metadata_columns: Vec<String>,
    /// Fields reformatted as ISO dates.
    pub date_columns: Vec<String>,
    /// Accepted input date formats (chrono syntax).
    pub date_formats: Vec<String>,
    /// Lower-case words kept lower-case when title-casing locations.
    pub articles: BTreeSet<String>,
    /// Upper-case abbreviations kept upper-case when title-casing locations.
    pub abbreviations: BTreeSet<String>,
    /// Strain name prefix patterns, most specific first.
    pub strain_prefixes: Vec<String>,
    /// Pattern a canonical strain name must match.
    pub strain_pattern: String,
    /// Strain name accepted even though it does not match `strain_pattern`.
    pub strain_exception: String,
    /// Constant fields set on every record.
    pub hardcoded_metadata: BTreeMap<String, String>,
    /// Rendering of missing values in the metadata output.
    pub placeholder: String,
    /// Metadata output delimiter.
    pub delimiter: char,
    /// Drop records whose sequence is shorter than this.
    pub min_length: Option<usize>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            column_map: string_map(&[
                ("covv_virus_name", "strain"),
                ("covv_accession_id", "gisaid_epi_isl"),
                ("covv_collection_date", "date"),
                ("covv_host", "host"),
                ("covv_orig_lab", "originating_lab"),
                ("covv_subm_lab", "submitting_lab"),
                ("covv_authors", "authors"),
                ("covv_patient_age", "age"),
                ("covv_gender", "sex"),
                ("covv_lineage", "pangolin_lineage"),
                ("covv_clade", "GISAID_clade"),
                ("covv_add_host_info", "additional_host_info"),
                ("covv_add_location", "additional_location_info"),
                ("covv_subm_date", "date_submitted"),
                ("covv_location", "location"),
            ]),
            metadata_columns: strings(&[
                "strain",
                "virus",
                "gisaid_epi_isl",
                "genbank_accession",
                "date",
                "region",
                "country",
                "division",
                "location",
                "region_exposure",
                "country_exposure",
                "division_exposure",
                "segment",
                "length",
                "host",
                "age",
                "sex",
                "pangolin_lineage",
                "GISAID_clade",
                "originating_lab",
                "submitting_lab",
                "authors",
                "url",
                "title",
                "paper_url",
                "date_submitted",
                "purpose_of_sequencing",
            ]),
            date_columns: strings(&["date", "date_submitted"]),
            date_formats: strings(&["%Y-%m-%d", "%Y-%m-%dT%H:%M:%SZ"]),
            articles: string_set(&[
                "and", "de", "del", "des", "di", "do", "en", "l", "la", "las", "le", "los", "nad",
                "of", "op", "sur", "the", "y",
            ]),
            abbreviations: string_set(&["USA", "DC"]),
            strain_prefixes: strings(&[
                r"(?i)^SARS[- ]?CoV[- ]?2/human/",
                r"(?i)^SARS[- ]?CoV[- ]?2/environment/",
                r"(?i)^SARS[- ]?CoV[- ]?2/",
                r"(?i)^[hn]CoV[- ]?19/",
                r"(?i)^BetaCoV/",
            ]),
            strain_pattern: r"^([^/]+/)?[^/]+/[^/]+/\d{4}$".to_string(),
            strain_exception: "Wuhan-Hu-1/2019".to_string(),
            hardcoded_metadata: string_map(&[
                ("virus", "ncov"),
                ("genbank_accession", "?"),
                ("url", "https://www.gisaid.org"),
                ("segment", "genome"),
                ("title", "?"),
                ("paper_url", "?"),
                ("purpose_of_sequencing", "?"),
            ]),
            placeholder: "?".to_string(),
            delimiter: '\t',
            min_length: None,
        }
    }
}

impl TransformConfig {
    /// Read overrides from a TOML file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: TransformConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.metadata_columns.iter().any(|c| c == "sequence") {
            return Err(PipelineError::Config(
                "sequence must not appear in metadata_columns".to_string(),
            ));
        }
        if !self.delimiter.is_ascii() {
            return Err(PipelineError::Config(format!(
                "delimiter {:?} is not a single-byte character",
                self.delimiter
            )));
        }
        Ok(())
    }

    /// Metadata delimiter as the byte the CSV writer expects.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }
}
