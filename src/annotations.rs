//! User-curated metadata overrides keyed by record identifier.
//!
//! Each identifier holds an ordered list of `(field, value)` overrides. The
//! store counts lookups per identifier so curation that never matched any
//! record can be reported once the pass is over.

use std::cell::Cell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::error::{PipelineError, Result};

#[derive(Default)]
struct AnnotationEntry {
    overrides: Vec<(String, String)>,
    uses: Cell<u64>,
}

#[derive(Default)]
pub struct Annotations {
    entries: HashMap<String, AnnotationEntry>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an override for `id`. Adding resets the identifier's use count.
    pub fn add_user_annotation(&mut self, id: &str, field: &str, value: &str) {
        let entry = self.entries.entry(id.to_string()).or_default();
        entry.overrides.push((field.to_string(), value.to_string()));
        entry.uses.set(0);
    }

    /// Overrides for `id` in insertion order; empty when none exist.
    pub fn get_user_annotations(&self, id: &str) -> &[(String, String)] {
        match self.entries.get(id) {
            Some(entry) => {
                entry.uses.set(entry.uses.get() + 1);
                &entry.overrides
            }
            None => &[],
        }
    }

    pub fn use_count(&self, id: &str) -> Option<u64> {
        self.entries.get(id).map(|entry| entry.uses.get())
    }

    /// Identifiers whose overrides were never looked up, sorted.
    pub fn unused_annotations(&self) -> Vec<String> {
        let mut unused: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.uses.get() == 0)
            .map(|(id, _)| id.clone())
            .collect();
        unused.sort();
        unused
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), path)
    }

    /// Parse `id<TAB>field<TAB>value` lines.
    ///
    /// Lines starting with `#` are skipped and a ` #` inside the value starts
    /// a trailing comment.
    pub fn from_reader(reader: impl BufRead, path: &Path) -> Result<Self> {
        let mut annotations = Annotations::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.trim().is_empty() || trimmed.trim_start().starts_with('#') {
                continue;
            }

            let mut fields = trimmed.splitn(3, '\t');
            let (Some(id), Some(field), Some(value)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(PipelineError::AnnotationFile {
                    path: path.to_path_buf(),
                    line_number: index + 1,
                    reason: "expected id, field and value separated by tabs".to_string(),
                });
            };
            let value = match value.find(" #") {
                Some(pos) => &value[..pos],
                None => value,
            };
            annotations.add_user_annotation(id.trim(), field.trim(), value.trim());
        }
        debug!(ids = annotations.len(), path = %path.display(), "loaded annotations");
        Ok(annotations)
    }
}
