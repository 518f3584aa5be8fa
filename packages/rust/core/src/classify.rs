//! Filename classification.
//!
//! A filename is either paginated (it matches the primary pagination
//! pattern), a structural match (it ends in `_<filepart><digit?><r|v?>.<ext>`
//! for one of the configured fileparts), or unmatched.

use regex::Regex;
use tracing::debug;

use folioscan_shared::{AnalyzerConfig, FolioError, Result, StructureRule};

/// Identifier of a structural node within one build: the filepart followed
/// by its optional group digit (`VS`, `VS1`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureKey(String);

impl StructureKey {
    pub fn new(filepart: &str, group_number: &str) -> Self {
        Self(format!("{filepart}{group_number}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StructureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StructureKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Outcome of classifying one filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Matched the pagination pattern; `label` is its first capture.
    Paginated { label: String },
    /// Matched a filepart rule.
    StructureMatch {
        key: StructureKey,
        type_name: String,
    },
    /// Matched nothing.
    Unmatched,
}

/// A filepart rule with its derived pattern.
#[derive(Debug, Clone)]
struct FilepartMatcher {
    filepart: String,
    type_name: String,
    pattern: Regex,
}

/// Classifies filenames against the pagination pattern and the ordered
/// filepart rules. Patterns are compiled once.
#[derive(Debug, Clone)]
pub struct Classifier {
    pagination: Regex,
    fileparts: Vec<FilepartMatcher>,
}

impl Classifier {
    /// Compile the classifier from the analyzer configuration.
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        Self::from_parts(&config.pagination_regex, &config.structure)
    }

    /// Compile from a pagination pattern and ordered rules.
    pub fn from_parts(pagination_regex: &str, rules: &[StructureRule]) -> Result<Self> {
        // Whole-name match: the pattern must account for the full filename.
        let pagination = Regex::new(&format!("^(?:{pagination_regex})$")).map_err(|e| {
            FolioError::config(format!("invalid pagination_regex '{pagination_regex}': {e}"))
        })?;
        if pagination.captures_len() < 2 {
            return Err(FolioError::config(format!(
                "pagination_regex '{pagination_regex}' needs a capturing group for the page label"
            )));
        }

        let fileparts = rules
            .iter()
            .map(|rule| {
                // ASCII classes: a non-ASCII digit is not a group number.
                let source = format!(
                    r"^.*_{}([0-9]?)[rv]?\.[A-Za-z0-9_]+$",
                    regex::escape(&rule.filepart)
                );
                let pattern = Regex::new(&source).map_err(|e| {
                    FolioError::config(format!("invalid filepart '{}': {e}", rule.filepart))
                })?;
                Ok(FilepartMatcher {
                    filepart: rule.filepart.clone(),
                    type_name: rule.docstruct.clone(),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            pagination,
            fileparts,
        })
    }

    /// Classify one filename.
    pub fn classify(&self, filename: &str) -> Classification {
        if let Some(caps) = self.pagination.captures(filename) {
            let label = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            return Classification::Paginated {
                label: label.to_string(),
            };
        }

        for matcher in &self.fileparts {
            if let Some(caps) = matcher.pattern.captures(filename) {
                let group = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let key = StructureKey::new(&matcher.filepart, group);
                debug!(filename, %key, type_name = %matcher.type_name, "structural match");
                return Classification::StructureMatch {
                    key,
                    type_name: matcher.type_name.clone(),
                };
            }
        }

        Classification::Unmatched
    }

    /// Number of filepart rules.
    pub fn rule_count(&self) -> usize {
        self.fileparts.len()
    }
}
