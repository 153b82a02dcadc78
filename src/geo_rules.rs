//! Curated geographic substitution rules.
//!
//! Rules map a `(region, country, division, location)` key to a replacement
//! of the same shape. Either side may use `*`: in a key it matches any value
//! at that position, in a replacement it keeps the original value.
//!
//! Rules are stored in a four-level trie keyed region → country → division
//! → location. Lookup descends one level at a time, taking the exact child
//! when it exists and the wildcard child only when the exact child is
//! absent. The choice is never revisited: if the exact branch dead-ends
//! deeper down, the lookup fails even if the wildcard branch would have
//! matched. Curation data relies on specific entries shadowing general ones
//! this way.
//!
//! Substitution applies rules repeatedly until none matches or a rule stops
//! changing the location, so a general rename (`EU → Europe`) composes with
//! more specific rules written against the renamed value.

use std::cell::Cell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// `(region, country, division, location)`.
pub type GeoTuple = [String; 4];

/// Matches or preserves any value at its position.
pub const WILDCARD: &str = "*";

/// Substitutions allowed on one location before the rule set is declared
/// cyclic.
pub const MAX_RULE_APPLICATIONS: usize = 1000;

/// Location columns, in tuple order.
pub const LOCATION_COLUMNS: [&str; 4] = ["region", "country", "division", "location"];

struct Rule {
    key: GeoTuple,
    target: GeoTuple,
    uses: Cell<u64>,
}

#[derive(Default)]
struct RuleNode {
    children: HashMap<String, RuleNode>,
    rule: Option<Rule>,
}

/// The rule trie plus per-rule use counts.
#[derive(Default)]
pub struct GeoRules {
    root: RuleNode,
    len: usize,
}

/// Build a tuple from four string-like parts.
pub fn geo_tuple(parts: [&str; 4]) -> GeoTuple {
    parts.map(str::to_string)
}

impl GeoRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. A second rule with the same key replaces the first
    /// and starts with a fresh use count.
    pub fn add_rule(&mut self, start: GeoTuple, target: GeoTuple) {
        let mut node = &mut self.root;
        for part in &start {
            node = node.children.entry(part.clone()).or_default();
        }
        if node.rule.is_some() {
            debug!(?start, "replacing geo rule");
        } else {
            self.len += 1;
        }
        node.rule = Some(Rule {
            key: start,
            target,
            uses: Cell::new(0),
        });
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn find_applicable_rule(&self, start: &GeoTuple) -> Option<&Rule> {
        let mut node = &self.root;
        for part in start {
            node = node
                .children
                .get(part)
                .or_else(|| node.children.get(WILDCARD))?;
        }
        node.rule.as_ref()
    }

    /// Key of the rule that would apply to `start`, if any.
    pub fn applicable_rule(&self, start: &GeoTuple) -> Option<&GeoTuple> {
        self.find_applicable_rule(start).map(|rule| &rule.key)
    }

    /// Apply rules to `start` until none applies or a fixpoint is reached.
    ///
    /// Fails with [`PipelineError::RuleCycle`] once more than
    /// [`MAX_RULE_APPLICATIONS`] substitutions have been made.
    pub fn get_user_rules(&self, start: &GeoTuple) -> Result<GeoTuple> {
        let mut current = start.clone();
        let mut applied = 0;

        while let Some(rule) = self.find_applicable_rule(&current) {
            let next = replace_entry(&current, &rule.target);
            rule.uses.set(rule.uses.get() + 1);
            applied += 1;

            if next == current {
                break;
            }
            current = next;

            if applied > MAX_RULE_APPLICATIONS {
                return Err(PipelineError::RuleCycle {
                    start: start.clone(),
                    limit: MAX_RULE_APPLICATIONS,
                });
            }
        }

        Ok(current)
    }

    /// How often the rule registered under `key` has been applied.
    pub fn use_count(&self, key: &GeoTuple) -> Option<u64> {
        let mut node = &self.root;
        for part in key {
            node = node.children.get(part)?;
        }
        node.rule.as_ref().map(|rule| rule.uses.get())
    }

    /// Keys of rules that never applied, sorted.
    pub fn unused_rules(&self) -> Vec<GeoTuple> {
        let mut unused = Vec::new();
        collect_unused(&self.root, &mut unused);
        unused.sort();
        unused
    }

    /// Load a rule file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), path)
    }

    /// Parse rules from a reader; `path` only labels errors.
    ///
    /// Each line is `region/country/division/location<TAB>region/country/division/location`,
    /// optionally followed by a `#` comment. The legacy layout with eight
    /// tab-separated columns is accepted with a warning.
    pub fn from_reader(reader: impl BufRead, path: &Path) -> Result<Self> {
        let mut rules = GeoRules::new();
        let mut warned_legacy = false;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = index + 1;
            let content = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line.as_str(),
            };
            let content = content.trim_end_matches(['\r', '\n', ' ']);
            if content.trim().is_empty() {
                continue;
            }

            let rule_error = |reason: String| PipelineError::RuleFile {
                path: path.to_path_buf(),
                line_number,
                reason,
            };

            let fields: Vec<&str> = content.split('\t').collect();
            let (start, target) = if fields[0].contains('/') {
                let tuples: Vec<&str> = fields
                    .iter()
                    .map(|f| f.trim())
                    .filter(|f| !f.is_empty())
                    .collect();
                if tuples.len() != 2 {
                    return Err(rule_error(format!(
                        "expected 2 tab-separated locations, found {}",
                        tuples.len()
                    )));
                }
                (
                    split_tuple(tuples[0]).map_err(&rule_error)?,
                    split_tuple(tuples[1]).map_err(&rule_error)?,
                )
            } else {
                if fields.len() < 8 || fields[8..].iter().any(|f| !f.trim().is_empty()) {
                    return Err(rule_error(format!(
                        "expected 8 tab-separated columns, found {}",
                        fields.len()
                    )));
                }
                if !warned_legacy {
                    warn!(
                        path = %path.display(),
                        line_number,
                        "geo rule file uses the legacy 8-column layout"
                    );
                    warned_legacy = true;
                }
                let part = |i: usize| fields[i].trim().to_string();
                (
                    [part(0), part(1), part(2), part(3)],
                    [part(4), part(5), part(6), part(7)],
                )
            };
            rules.add_rule(start, target);
        }

        debug!(rules = rules.len(), path = %path.display(), "loaded geo rules");
        Ok(rules)
    }
}

fn replace_entry(current: &GeoTuple, target: &GeoTuple) -> GeoTuple {
    let mut next = current.clone();
    for (slot, value) in next.iter_mut().zip(target) {
        if value != WILDCARD {
            *slot = value.clone();
        }
    }
    next
}

fn split_tuple(text: &str) -> std::result::Result<GeoTuple, String> {
    let parts: Vec<&str> = text.split('/').map(str::trim).collect();
    match parts.as_slice() {
        [region, country, division, location] => {
            Ok(geo_tuple([*region, *country, *division, *location]))
        }
        _ => Err(format!(
            "location {text:?} has {} parts, expected region/country/division/location",
            parts.len()
        )),
    }
}

fn collect_unused(node: &RuleNode, out: &mut Vec<GeoTuple>) {
    if let Some(rule) = &node.rule
        && rule.uses.get() == 0
    {
        out.push(rule.key.clone());
    }
    for child in node.children.values() {
        collect_unused(child, out);
    }
}
