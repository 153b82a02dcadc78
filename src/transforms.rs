//! Record-level transformers.
//!
//! Each stage does one normalization step and is meant to be chained after
//! the ones it depends on, roughly in the order they appear here.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::info;
use unicode_normalization::UnicodeNormalization;

use crate::annotations::Annotations;
use crate::error::Result;
use crate::geo_rules::{GeoRules, GeoTuple, LOCATION_COLUMNS};
use crate::normalize::{
    PLACEHOLDER, StrainNamer, abbreviate_authors, collapse_whitespace, format_date,
    mask_collection_date, parse_age, parse_sex, strip_strain_prefix, titlecase,
};
use crate::pipeline::Transformer;
use crate::record::{Record, Value};

/// Renames input fields; a missing input field yields an empty output field.
pub struct RenameAndAddColumns {
    column_map: BTreeMap<String, String>,
}

impl RenameAndAddColumns {
    pub fn new(column_map: BTreeMap<String, String>) -> Self {
        Self { column_map }
    }
}

impl Transformer for RenameAndAddColumns {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        for (from, to) in &self.column_map {
            record.rename(from, to);
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "rename-and-add-columns"
    }
}

/// Cleans up raw GISAID values.
///
/// 1. Removes newlines from the sequence and records its length, 0 when
///    the record carries no sequence text.
/// 2. Converts every string to Unicode NFC and trims it.
/// 3. Reformats date columns as `YYYY-MM-DD`.
/// 4. Strips the `hCoV-19/` prefix and whitespace from the strain name.
/// 5. Numbers records from 1.
pub struct StandardizeData {
    date_columns: Vec<String>,
    date_formats: Vec<String>,
    line_count: u64,
}

impl StandardizeData {
    pub fn new(date_columns: Vec<String>, date_formats: Vec<String>) -> Self {
        Self {
            date_columns,
            date_formats,
            line_count: 1,
        }
    }
}

impl Transformer for StandardizeData {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        match record.get_str("sequence") {
            Some(sequence) => {
                let sequence = sequence.replace(['\n', '\r'], "");
                record.set("length", sequence.len());
                record.set("sequence", sequence);
            }
            None => record.set("length", 0i64),
        }

        for (_, value) in record.iter_mut() {
            if let Value::Str(s) = value {
                *s = s.nfc().collect::<String>().trim().to_string();
            }
        }

        for column in &self.date_columns {
            if let Some(date) = record.get_str(column) {
                let formatted = format_date(date, &self.date_formats);
                record.set(column.as_str(), formatted);
            }
        }

        if let Some(strain) = record.get_str("strain") {
            let strain = strip_strain_prefix(strain);
            record.set("strain", strain);
        }

        record.assign_line_number(self.line_count);
        self.line_count += 1;

        Ok(record)
    }

    fn name(&self) -> &str {
        "standardize-data"
    }
}

/// Removes the sequence payload, leaving only metadata.
pub struct DropSequenceData;

impl Transformer for DropSequenceData {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        record.remove("sequence");
        Ok(record)
    }

    fn name(&self) -> &str {
        "drop-sequence-data"
    }
}

/// Splits `location` ("region/country/division/location") into four
/// title-cased fields.
pub struct ExpandLocation {
    articles: BTreeSet<String>,
    abbreviations: BTreeSet<String>,
}

impl ExpandLocation {
    pub fn new(articles: BTreeSet<String>, abbreviations: BTreeSet<String>) -> Self {
        Self {
            articles,
            abbreviations,
        }
    }
}

impl Transformer for ExpandLocation {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        let parts: Vec<String> = record
            .str_or_empty("location")
            .splitn(LOCATION_COLUMNS.len() + 1, '/')
            .map(|part| part.replace('_', " ").trim().to_string())
            .collect();

        for (index, column) in LOCATION_COLUMNS.iter().enumerate() {
            let part = parts.get(index).map(String::as_str).unwrap_or("");
            record.set(
                *column,
                titlecase(part, &self.articles, &self.abbreviations),
            );
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "expand-location"
    }
}

/// Collapses whitespace in lab names and fixes recurring misspellings.
pub struct FixLabs;

impl FixLabs {
    fn cleanup(value: &str) -> String {
        collapse_whitespace(value)
            .replace("Contorl", "Control")
            .replace("Dieases", "Disease")
    }
}

impl Transformer for FixLabs {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        for key in ["originating_lab", "submitting_lab"] {
            let cleaned = Self::cleanup(record.str_or_empty(key));
            record.set(key, cleaned);
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "fix-labs"
    }
}

/// Shortens `authors` to "<first author> et al".
pub struct AbbreviateAuthors;

impl Transformer for AbbreviateAuthors {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        let authors = abbreviate_authors(record.str_or_empty("authors"));
        record.set("authors", authors);
        Ok(record)
    }

    fn name(&self) -> &str {
        "abbreviate-authors"
    }
}

pub struct ParsePatientAge;

impl Transformer for ParsePatientAge {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        let age = match record.get("age") {
            Some(Value::Int(n)) if *n > 0 => Value::Int(*n),
            Some(Value::Str(s)) => parse_age(s),
            _ => Value::from(PLACEHOLDER),
        };
        record.set("age", age);
        Ok(record)
    }

    fn name(&self) -> &str {
        "parse-patient-age"
    }
}

pub struct ParseSex;

impl Transformer for ParseSex {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        let sex = parse_sex(record.str_or_empty("sex"));
        record.set("sex", sex);
        Ok(record)
    }

    fn name(&self) -> &str {
        "parse-sex"
    }
}

/// Sets fields that are constant for the whole feed.
pub struct AddHardcodedMetadata {
    fields: BTreeMap<String, String>,
}

impl AddHardcodedMetadata {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

impl Transformer for AddHardcodedMetadata {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        for (key, value) in &self.fields {
            record.set(key.as_str(), value.as_str());
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "add-hardcoded-metadata"
    }
}

/// Replaces the strain name with its canonical form, falling back to the
/// accession when the name does not have strain structure.
pub struct CanonicalizeStrainName {
    namer: StrainNamer,
    accession_field: String,
}

impl CanonicalizeStrainName {
    pub fn new(namer: StrainNamer, accession_field: impl Into<String>) -> Self {
        Self {
            namer,
            accession_field: accession_field.into(),
        }
    }
}

impl Transformer for CanonicalizeStrainName {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        let strain = self.namer.canonicalize(
            record.str_or_empty("strain"),
            record.str_or_empty(&self.accession_field),
        );
        record.set("strain", strain);
        Ok(record)
    }

    fn name(&self) -> &str {
        "canonicalize-strain-name"
    }
}

/// Masks a collection date that is not before the submission date.
pub struct MaskCollectionDate {
    collection_field: String,
    submission_field: String,
}

impl MaskCollectionDate {
    pub fn new(collection_field: impl Into<String>, submission_field: impl Into<String>) -> Self {
        Self {
            collection_field: collection_field.into(),
            submission_field: submission_field.into(),
        }
    }
}

impl Default for MaskCollectionDate {
    fn default() -> Self {
        Self::new("date", "date_submitted")
    }
}

impl Transformer for MaskCollectionDate {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        if let Some(masked) = mask_collection_date(
            record.str_or_empty(&self.collection_field),
            record.str_or_empty(&self.submission_field),
        ) {
            record.set(self.collection_field.as_str(), masked);
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "mask-collection-date"
    }
}

/// Applies curated overrides for the record's identifier, in order.
pub struct MergeUserAnnotatedMetadata {
    annotations: Rc<Annotations>,
    id_field: String,
}

impl MergeUserAnnotatedMetadata {
    pub fn new(annotations: Rc<Annotations>, id_field: impl Into<String>) -> Self {
        Self {
            annotations,
            id_field: id_field.into(),
        }
    }
}

impl Transformer for MergeUserAnnotatedMetadata {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        let id = record.str_or_empty(&self.id_field).to_string();
        for (key, value) in self.annotations.get_user_annotations(&id) {
            if record.render(key).as_deref() == Some(value.as_str()) {
                info!(id = %id, field = %key, value = %value, "redundant annotated metadata");
            }
            record.set(key.as_str(), value.as_str());
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "merge-user-annotated-metadata"
    }
}

/// Runs the location through the curated geo substitution rules.
pub struct ApplyUserGeoLocationSubstitutionRules {
    rules: Rc<GeoRules>,
}

impl ApplyUserGeoLocationSubstitutionRules {
    pub fn new(rules: Rc<GeoRules>) -> Self {
        Self { rules }
    }
}

impl Transformer for ApplyUserGeoLocationSubstitutionRules {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        let start: GeoTuple = LOCATION_COLUMNS.map(|c| record.str_or_empty(c).to_string());
        let arrival = self.rules.get_user_rules(&start)?;
        for (column, value) in LOCATION_COLUMNS.into_iter().zip(arrival) {
            record.set(column, value);
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "apply-user-geo-location-substitution-rules"
    }
}

/// Fills an empty division from the country and defaults the exposure
/// fields to the sample location unless annotations already set them.
pub struct FillDefaultLocationData;

impl Transformer for FillDefaultLocationData {
    fn transform(&mut self, mut record: Record) -> Result<Record> {
        if record.str_or_empty("division").is_empty() {
            let country = record.str_or_empty("country").to_string();
            record.set("division", country);
        }
        for base in ["region", "country", "division"] {
            let value = record.str_or_empty(base).to_string();
            record.set_default(&format!("{base}_exposure"), value);
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "fill-default-location-data"
    }
}
