//! Root data sources.
//!
//! - [`NdjsonSource`] parses newline-delimited JSON objects, the canonical
//!   GISAID feed. Any failure while handling a record from it is fatal and
//!   reported with the offending raw line.
//! - [`TabularSource`] reads a delimited file with a header row (BioSample
//!   and GenBank feeds arrive pre-flattened this way).
//! - [`RecordsSource`] replays records already held in memory.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::pipeline::{Cursor, DataSource};
use crate::record::Record;

enum LineInput {
    Path(PathBuf),
    Stdin,
    Lines(Vec<String>),
}

/// Newline-delimited JSON, one object per line.
pub struct NdjsonSource {
    input: LineInput,
}

impl NdjsonSource {
    /// Read from a file, reopened for every cursor. `-` reads stdin.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let input = if path.as_os_str() == "-" {
            LineInput::Stdin
        } else {
            LineInput::Path(path)
        };
        Self { input }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: LineInput::Lines(lines.into_iter().map(Into::into).collect()),
        }
    }
}

impl DataSource for NdjsonSource {
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        let lines: Box<dyn Iterator<Item = io::Result<String>> + '_> = match &self.input {
            LineInput::Path(path) => Box::new(BufReader::new(File::open(path)?).lines()),
            LineInput::Stdin => Box::new(io::stdin().lock().lines()),
            LineInput::Lines(lines) => Box::new(lines.iter().cloned().map(Ok)),
        };
        Ok(Box::new(NdjsonCursor {
            lines,
            line_number: 0,
            last_line: String::new(),
        }))
    }
}

struct NdjsonCursor<'a> {
    lines: Box<dyn Iterator<Item = io::Result<String>> + 'a>,
    line_number: u64,
    last_line: String,
}

impl NdjsonCursor<'_> {
    fn parse_failure(&self, reason: String) -> PipelineError {
        PipelineError::Parse {
            line_number: self.line_number,
            line: self.last_line.clone(),
            reason,
        }
    }
}

impl Cursor for NdjsonCursor<'_> {
    fn advance(&mut self) -> Option<Result<Record>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            self.last_line = line;

            return Some(match serde_json::from_str::<serde_json::Value>(&self.last_line) {
                Ok(serde_json::Value::Object(object)) => Ok(Record::from_json_object(object)),
                Ok(_) => Err(self.parse_failure("expected a JSON object".to_string())),
                Err(e) => Err(self.parse_failure(e.to_string())),
            });
        }
    }

    fn escalate(&mut self, err: PipelineError) -> Option<PipelineError> {
        Some(self.parse_failure(err.to_string()))
    }
}

/// Delimited text with a header row; each row becomes a record of strings.
pub struct TabularSource {
    path: PathBuf,
    delimiter: u8,
}

impl TabularSource {
    pub fn new(path: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            path: path.into(),
            delimiter,
        }
    }

    pub fn tsv(path: impl Into<PathBuf>) -> Self {
        Self::new(path, b'\t')
    }
}

impl DataSource for TabularSource {
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        Ok(Box::new(TabularCursor {
            rows: reader.into_records(),
            headers,
            delimiter: char::from(self.delimiter),
            line_number: 1,
            last_row: String::new(),
        }))
    }
}

struct TabularCursor {
    rows: csv::StringRecordsIntoIter<File>,
    headers: csv::StringRecord,
    delimiter: char,
    line_number: u64,
    last_row: String,
}

impl Cursor for TabularCursor {
    fn advance(&mut self) -> Option<Result<Record>> {
        let row = self.rows.next()?;
        self.line_number += 1;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                let line_number = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(self.line_number);
                return Some(Err(PipelineError::Parse {
                    line_number,
                    line: String::new(),
                    reason: e.to_string(),
                }));
            }
        };
        self.last_row = row
            .iter()
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string());
        Some(Ok(self
            .headers
            .iter()
            .zip(row.iter())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()))
    }

    fn escalate(&mut self, err: PipelineError) -> Option<PipelineError> {
        Some(PipelineError::Parse {
            line_number: self.line_number,
            line: self.last_row.clone(),
            reason: err.to_string(),
        })
    }
}

/// Records already in memory, replayed from the start on every cursor.
pub struct RecordsSource {
    records: Vec<Record>,
}

impl RecordsSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl DataSource for RecordsSource {
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        Ok(Box::new(RecordsCursor {
            records: self.records.iter(),
        }))
    }
}

struct RecordsCursor<'a> {
    records: std::slice::Iter<'a, Record>,
}

impl Cursor for RecordsCursor<'_> {
    fn advance(&mut self) -> Option<Result<Record>> {
        self.records.next().cloned().map(Ok)
    }

    fn escalate(&mut self, err: PipelineError) -> Option<PipelineError> {
        Some(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Stage, Transformer, collect_records, drain};
    use crate::record::Value;
    use std::io::Write;

    struct RequireSequence;

    impl Transformer for RequireSequence {
        fn transform(&mut self, record: Record) -> Result<Record> {
            if !record.contains("sequence") {
                return Err(PipelineError::MissingField {
                    field: "sequence".to_string(),
                });
            }
            Ok(record)
        }

        fn name(&self) -> &str {
            "require-sequence"
        }
    }

    #[test]
    fn test_ndjson_parses_objects() {
        let mut source = NdjsonSource::from_lines([
            r#"{"covv_virus_name": "hCoV-19/USA/CA-1/2020", "n": 3}"#,
            "",
            r#"{"covv_virus_name": "hCoV-19/China/WH-1/2019"}"#,
        ]);
        let records = collect_records(&mut source).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].get_str("covv_virus_name"),
            Some("hCoV-19/USA/CA-1/2020")
        );
        assert_eq!(records[0].get("n"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_ndjson_malformed_line_is_fatal() {
        let mut source = NdjsonSource::from_lines([r#"{"a": 1}"#, r#"{"a": "#]);
        match drain(&mut source).unwrap_err() {
            PipelineError::Parse {
                line_number, line, ..
            } => {
                assert_eq!(line_number, 2);
                assert_eq!(line, r#"{"a": "#);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ndjson_non_object_is_fatal() {
        let mut source = NdjsonSource::from_lines(["[1, 2]"]);
        assert!(matches!(
            drain(&mut source).unwrap_err(),
            PipelineError::Parse { .. }
        ));
    }

    #[test]
    fn test_stage_failure_reports_raw_line() {
        let mut chain = NdjsonSource::from_lines([
            r#"{"sequence": "ACGT"}"#,
            r#"{"strain": "no-sequence"}"#,
        ])
        .pipe(Stage::transform(RequireSequence));
        match drain(&mut chain).unwrap_err() {
            PipelineError::Parse {
                line_number,
                line,
                reason,
            } => {
                assert_eq!(line_number, 2);
                assert!(line.contains("no-sequence"));
                assert!(reason.contains("sequence"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ndjson_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"strain": "A/B/2020"}}"#).unwrap();
        writeln!(file, r#"{{"strain": "C/D/2021"}}"#).unwrap();
        file.flush().unwrap();

        let mut source = NdjsonSource::from_path(file.path());
        assert_eq!(drain(&mut source).unwrap(), 2);
        // a second cursor reopens the file
        assert_eq!(drain(&mut source).unwrap(), 2);
    }

    #[test]
    fn test_tabular_rows_become_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "accession\tcountry\tcollection_date").unwrap();
        writeln!(file, "MN908947\tChina\t2019-12-26").unwrap();
        writeln!(file, "MT020880\tUSA\t2020-01-25").unwrap();
        file.flush().unwrap();

        let mut source = TabularSource::tsv(file.path());
        let records = collect_records(&mut source).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get_str("accession"), Some("MT020880"));
        assert_eq!(records[1].get_str("country"), Some("USA"));
    }

    #[test]
    fn test_tabular_stage_failure_reports_row() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "accession\tcountry").unwrap();
        writeln!(file, "MN908947\tChina").unwrap();
        file.flush().unwrap();

        let mut chain = TabularSource::tsv(file.path()).pipe(Stage::transform(RequireSequence));
        match drain(&mut chain).unwrap_err() {
            PipelineError::Parse {
                line_number, line, ..
            } => {
                assert_eq!(line_number, 2);
                assert_eq!(line, "MN908947\tChina");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
