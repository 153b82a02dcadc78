//! Field-level normalization helpers.
//!
//! Every helper here degrades gracefully: input it cannot make sense of
//! comes back unchanged or as the `?` placeholder, never as an error.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::record::Value;

/// Value written for unknown or unparseable fields.
pub const PLACEHOLDER: &str = "?";

/// Collection date written when it falls on or after the submission date.
pub const MASKED_DATE: &str = "XXXX-XX-XX";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static STRAIN_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^[hn]CoV-19/)|\s+").expect("strain prefix regex")
});

static AUTHOR_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\s*[,，;；]\s*|\s+(?:and|&)\s+)").expect("author separator regex")
});

static ET_AL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bet\.? al\.?$").expect("et al regex"));

static AGE_DECADE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+'?[A-Za-z]").expect("age decade regex"));
static AGE_YEARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+) years?$").expect("age years regex"));
static AGE_MONTHS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+) months?").expect("age months regex"));

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("iso date regex"));

/// Reformat `value` as `YYYY-MM-DD` using the first accepted format that
/// parses it. Returns the input unchanged when none does.
pub fn format_date(value: &str, formats: &[String]) -> String {
    for format in formats {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return datetime.date().format("%Y-%m-%d").to_string();
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    value.to_string()
}

/// Title-case `text` word by word.
///
/// Words found in `abbreviations` (compared upper-cased) are upper-cased.
/// Words found in `articles` (compared lower-cased) are lower-cased unless
/// they open the text. Everything else gets a capital after each non-letter.
///
/// Words are rejoined with single spaces, so runs of whitespace collapse and
/// the result is trimmed.
pub fn titlecase(text: &str, articles: &BTreeSet<String>, abbreviations: &BTreeSet<String>) -> String {
    text.split_whitespace()
        .enumerate()
        .map(|(index, word)| {
            let upper = word.to_uppercase();
            if abbreviations.contains(&upper) {
                return upper;
            }
            let lower = word.to_lowercase();
            if index > 0 && articles.contains(&lower) {
                return lower;
            }
            title_word(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut after_letter = false;
    for c in word.chars() {
        if after_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        after_letter = c.is_alphabetic();
    }
    out
}

/// Drop the `hCoV-19/` or `nCoV-19/` prefix and all whitespace from a
/// GISAID virus name.
pub fn strip_strain_prefix(strain: &str) -> String {
    STRAIN_PREFIX.replace_all(strain, "").into_owned()
}

/// Ordered prefix stripping plus structural validation of strain names.
pub struct StrainNamer {
    prefixes: Vec<Regex>,
    structure: Regex,
    exception: String,
}

impl StrainNamer {
    /// Compile the prefix patterns, most specific first.
    pub fn new(prefixes: &[String], structure: &str, exception: &str) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| PipelineError::Config(format!("invalid strain pattern {pattern:?}: {e}")))
        };
        Ok(Self {
            prefixes: prefixes
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>>>()?,
            structure: compile(structure)?,
            exception: exception.to_string(),
        })
    }

    /// Canonical strain name, or `accession` when the stripped name does not
    /// look like a strain.
    pub fn canonicalize(&self, strain: &str, accession: &str) -> String {
        let mut name = WHITESPACE.replace_all(strain.trim(), "").into_owned();
        for prefix in &self.prefixes {
            name = prefix.replace(&name, "").into_owned();
        }
        if self.structure.is_match(&name) || name == self.exception {
            name
        } else {
            accession.to_string()
        }
    }
}

/// `"<first author> et al"`, or the placeholder for an empty list.
pub fn abbreviate_authors(authors: &str) -> String {
    let collapsed = WHITESPACE.replace_all(authors.trim(), " ");
    let first = AUTHOR_SEPARATOR
        .split(&collapsed)
        .next()
        .unwrap_or("")
        .trim();
    if first.is_empty() {
        PLACEHOLDER.to_string()
    } else if ET_AL.is_match(first) {
        first.to_string()
    } else {
        format!("{first} et al")
    }
}

/// Patient age in years.
///
/// Decade ranges ("60s", "50's"), zero and anything non-numeric become the
/// placeholder. Month ages become years, kept as a two-decimal string when
/// not a whole number.
pub fn parse_age(raw: &str) -> Value {
    let age = raw.trim();
    if AGE_DECADE.is_match(age) {
        return Value::from(PLACEHOLDER);
    }
    let age = AGE_YEARS.replace(age, "$1");

    if let Some(caps) = AGE_MONTHS.captures(&age) {
        let months: i64 = match caps[1].parse() {
            Ok(m) => m,
            Err(_) => return Value::from(PLACEHOLDER),
        };
        if months == 0 {
            return Value::from(PLACEHOLDER);
        }
        if months % 12 == 0 {
            return Value::Int(months / 12);
        }
        let years = format!("{:.2}", months as f64 / 12.0);
        return Value::Str(years.trim_end_matches('0').to_string());
    }

    if age == "0" {
        return Value::from(PLACEHOLDER);
    }
    match age.parse::<f64>() {
        Ok(years) if years.is_finite() && years >= 0.0 => Value::Int(years.trunc() as i64),
        _ => Value::from(PLACEHOLDER),
    }
}

/// `Male`, `Female`, or the placeholder.
pub fn parse_sex(raw: &str) -> &'static str {
    match raw.trim().to_lowercase().as_str() {
        "male" | "m" => "Male",
        "female" | "f" | "femal" => "Female",
        _ => PLACEHOLDER,
    }
}

/// Masked collection date when it is not strictly before submission.
///
/// Only applies when both dates are complete `YYYY-MM-DD` strings.
pub fn mask_collection_date(collected: &str, submitted: &str) -> Option<&'static str> {
    let strict = |s: &str| {
        if !ISO_DATE.is_match(s) {
            return None;
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
    };
    let collected = strict(collected)?;
    let submitted = strict(submitted)?;
    (collected >= submitted).then_some(MASKED_DATE)
}

/// Collapse runs of whitespace to a single space.
pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE.replace_all(value, " ").into_owned()
}
