//! Record filters.

use std::collections::HashSet;

use crate::error::{PipelineError, Result};
use crate::pipeline::Filter;
use crate::record::{Record, Value};

/// Passes records whose `length` is at least `min_length`.
///
/// A record without a numeric `length` is an error for that record.
pub struct SequenceLengthFilter {
    min_length: usize,
}

impl SequenceLengthFilter {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl Filter for SequenceLengthFilter {
    fn test(&mut self, record: &Record) -> Result<bool> {
        match record.get("length") {
            Some(Value::Int(length)) => Ok(*length >= 0 && *length as usize >= self.min_length),
            Some(other) => Err(PipelineError::InvalidValue {
                field: "length".to_string(),
                value: other.to_string(),
                reason: "expected an integer".to_string(),
            }),
            None => Err(PipelineError::MissingField {
                field: "length".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "sequence-length-filter"
    }
}

/// Passes records whose assigned line number is in the set.
pub struct LineNumberFilter {
    line_numbers: HashSet<u64>,
}

impl LineNumberFilter {
    pub fn new(line_numbers: impl IntoIterator<Item = u64>) -> Self {
        Self {
            line_numbers: line_numbers.into_iter().collect(),
        }
    }
}

impl Filter for LineNumberFilter {
    fn test(&mut self, record: &Record) -> Result<bool> {
        Ok(record
            .line_number()
            .is_some_and(|n| self.line_numbers.contains(&n)))
    }

    fn name(&self) -> &str {
        "line-number-filter"
    }
}
