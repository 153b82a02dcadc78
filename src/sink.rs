//! Output stages.
//!
//! Sinks are transformers that write each record as a side effect and pass it
//! on unchanged, so several can sit in one chain. Output handles live as long
//! as the stage; buffered writers flush on drop, so a chain that aborts
//! part-way still leaves every row written so far on disk.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::pipeline::Transformer;
use crate::record::Record;

/// Delimited metadata writer with a fixed column order.
///
/// The header row is written on construction. Missing fields render as the
/// placeholder and fields outside the column list are dropped.
pub struct WriteMetadata {
    writer: csv::Writer<Box<dyn Write>>,
    columns: Vec<String>,
    placeholder: String,
}

impl WriteMetadata {
    pub fn create(
        path: &Path,
        columns: Vec<String>,
        delimiter: u8,
        placeholder: impl Into<String>,
    ) -> Result<Self> {
        let file = File::create(path)?;
        Self::from_writer(Box::new(file), columns, delimiter, placeholder)
    }

    pub fn from_writer(
        out: Box<dyn Write>,
        columns: Vec<String>,
        delimiter: u8,
        placeholder: impl Into<String>,
    ) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(out);
        writer.write_record(&columns)?;
        Ok(Self {
            writer,
            columns,
            placeholder: placeholder.into(),
        })
    }
}

impl Transformer for WriteMetadata {
    fn transform(&mut self, record: Record) -> Result<Record> {
        let row: Vec<String> = self
            .columns
            .iter()
            .map(|column| match record.render(column) {
                Some(value) => value.into_owned(),
                None => self.placeholder.clone(),
            })
            .collect();
        self.writer.write_record(&row)?;
        Ok(record)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "write-metadata"
    }
}

/// FASTA writer: `>strain` followed by the sequence on one line.
pub struct WriteFasta {
    out: BufWriter<Box<dyn Write>>,
}

impl WriteFasta {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::from_writer(Box::new(File::create(path)?)))
    }

    pub fn from_writer(out: Box<dyn Write>) -> Self {
        Self {
            out: BufWriter::new(out),
        }
    }
}

impl Transformer for WriteFasta {
    fn transform(&mut self, record: Record) -> Result<Record> {
        match (record.get_str("strain"), record.get_str("sequence")) {
            (Some(strain), Some(sequence)) => {
                writeln!(self.out, ">{strain}")?;
                writeln!(self.out, "{sequence}")?;
            }
            _ => debug!(line = ?record.line_number(), "record without strain or sequence, not archived"),
        }
        Ok(record)
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "write-fasta"
    }
}

/// Gathers the distinct location hierarchy rows seen in the stream.
///
/// Both the sample location and the `<column>_exposure` location count, with
/// missing fields read as empty; an all-empty row is kept like any other. The
/// sorted rows are written as TSV when the stage is flushed.
pub struct CollectLocationHierarchy {
    path: PathBuf,
    columns: Vec<String>,
    rows: BTreeSet<Vec<String>>,
}

impl CollectLocationHierarchy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_columns(path, ["region", "country", "division"])
    }

    pub fn with_columns<I, S>(path: impl Into<PathBuf>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: BTreeSet::new(),
        }
    }
}

impl Transformer for CollectLocationHierarchy {
    fn transform(&mut self, record: Record) -> Result<Record> {
        for suffix in ["", "_exposure"] {
            let row: Vec<String> = self
                .columns
                .iter()
                .map(|column| record.str_or_empty(&format!("{column}{suffix}")).to_string())
                .collect();
            self.rows.insert(row);
        }
        Ok(record)
    }

    fn flush(&mut self) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(&self.path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        debug!(rows = self.rows.len(), path = %self.path.display(), "wrote location hierarchy");
        Ok(())
    }

    fn name(&self) -> &str {
        "collect-location-hierarchy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::RecordsSource;
    use crate::error::PipelineError;
    use crate::pipeline::{DataSource, Stage, drain};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn record(fields: &[(&str, &str)]) -> Record {
        fields.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_metadata_column_order_and_placeholder() {
        let buf = SharedBuf::default();
        let mut sink = WriteMetadata::from_writer(
            Box::new(buf.clone()),
            columns(&["strain", "date", "age"]),
            b'\t',
            "?",
        )
        .unwrap();

        let mut input = record(&[("date", "2020-01-05"), ("extra", "x"), ("strain", "A/B/2020")]);
        input.set("age", 40i64);
        sink.transform(input).unwrap();
        sink.transform(record(&[("strain", "C/D/2020")])).unwrap();
        sink.flush().unwrap();

        assert_eq!(
            buf.text(),
            "strain\tdate\tage\nA/B/2020\t2020-01-05\t40\nC/D/2020\t?\t?\n"
        );
    }

    #[test]
    fn test_metadata_renders_line_number() {
        let buf = SharedBuf::default();
        let mut sink = WriteMetadata::from_writer(
            Box::new(buf.clone()),
            columns(&["strain", "_line_number"]),
            b',',
            "",
        )
        .unwrap();
        let mut input = record(&[("strain", "A/B/2020")]);
        input.assign_line_number(7);
        sink.transform(input).unwrap();
        sink.flush().unwrap();
        assert_eq!(buf.text(), "strain,_line_number\nA/B/2020,7\n");
    }

    #[test]
    fn test_metadata_rows_survive_abort() {
        struct AbortOnSecond(usize);

        impl Transformer for AbortOnSecond {
            fn transform(&mut self, record: Record) -> Result<Record> {
                self.0 += 1;
                if self.0 == 2 {
                    return Err(PipelineError::Config("stop".to_string()));
                }
                Ok(record)
            }

            fn name(&self) -> &str {
                "abort-on-second"
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.tsv");
        {
            let mut chain = RecordsSource::new(vec![
                record(&[("strain", "first")]),
                record(&[("strain", "second")]),
            ])
            .pipe(Stage::transform(
                WriteMetadata::create(&path, columns(&["strain"]), b'\t', "?").unwrap(),
            ))
            .pipe(Stage::transform(AbortOnSecond(0)));
            assert!(drain(&mut chain).is_err());
        }
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "strain\nfirst\nsecond\n"
        );
    }

    #[test]
    fn test_fasta_output() {
        let buf = SharedBuf::default();
        let mut sink = WriteFasta::from_writer(Box::new(buf.clone()));
        sink.transform(record(&[("strain", "A/B/2020"), ("sequence", "ACGT")]))
            .unwrap();
        sink.transform(record(&[("strain", "no-sequence")])).unwrap();
        sink.flush().unwrap();
        assert_eq!(buf.text(), ">A/B/2020\nACGT\n");
    }

    #[test]
    fn test_location_hierarchy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hierarchy.tsv");
        let mut chain = RecordsSource::new(vec![
            record(&[
                ("region", "Europe"),
                ("country", "Iceland"),
                ("division", "Reykjavik"),
                ("region_exposure", "Europe"),
                ("country_exposure", "Austria"),
                ("division_exposure", "Tyrol"),
            ]),
            record(&[
                ("region", "Europe"),
                ("country", "Iceland"),
                ("division", "Reykjavik"),
            ]),
        ])
        .pipe(Stage::transform(CollectLocationHierarchy::new(&path)));
        assert_eq!(drain(&mut chain).unwrap(), 2);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "region\tcountry\tdivision\n\
             \t\t\n\
             Europe\tAustria\tTyrol\n\
             Europe\tIceland\tReykjavik\n"
        );
    }
}
