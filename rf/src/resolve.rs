//! Column resolution
//!
//! Binds each canonical output column of a rule to at most one entry of an
//! input header. Exact, case-sensitive matches win; otherwise a trimmed,
//! case-insensitive match is tried.

use serde::Serialize;
use tracing::debug;

use crate::rule::MappingRule;
use crate::stage::WarningKind;

/// How one output column was bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// No mapping configured; the column is blank on purpose
    Blank,
    /// Case-sensitive exact match
    Exact,
    /// Trimmed case-insensitive match
    Fallback,
    /// Mapping configured but the source column was not found
    Unresolved,
}

/// Binding of one output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub output: String,
    pub source: Option<String>,
    /// Position in the input header
    pub index: Option<usize>,
    pub resolution: Resolution,
}

/// Output column to header position map, in output column order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedMap {
    pub columns: Vec<ResolvedColumn>,
    pub warnings: Vec<WarningKind>,
}

impl ResolvedMap {
    /// Header position bound to an output column
    pub fn index_of(&self, output: &str) -> Option<usize> {
        self.columns.iter().find(|c| c.output == output).and_then(|c| c.index)
    }

    /// Output columns whose configured source was not found
    pub fn unresolved(&self) -> impl Iterator<Item = &ResolvedColumn> {
        self.columns.iter().filter(|c| c.resolution == Resolution::Unresolved)
    }
}

/// Resolve every output column of `rule` against `header`
pub fn resolve(rule: &MappingRule, header: &[String]) -> ResolvedMap {
    debug!(rule = %rule.key(), header_len = header.len(), "resolve: called");
    let mut map = ResolvedMap::default();

    for output in &rule.output_columns {
        let Some(source) = rule.mapping.get(output) else {
            map.columns.push(ResolvedColumn {
                output: output.clone(),
                source: None,
                index: None,
                resolution: Resolution::Blank,
            });
            continue;
        };

        let (index, resolution) = match header.iter().position(|h| h == source) {
            Some(i) => (Some(i), Resolution::Exact),
            None => {
                let wanted = source.trim().to_lowercase();
                let matches: Vec<usize> = header
                    .iter()
                    .enumerate()
                    .filter(|(_, h)| h.trim().to_lowercase() == wanted)
                    .map(|(i, _)| i)
                    .collect();

                match matches.as_slice() {
                    [] => {
                        map.warnings.push(WarningKind::UnresolvedColumn {
                            column: output.clone(),
                            source_column: source.clone(),
                        });
                        (None, Resolution::Unresolved)
                    }
                    [only] => (Some(*only), Resolution::Fallback),
                    [first, ..] => {
                        map.warnings.push(WarningKind::AmbiguousMatch {
                            column: output.clone(),
                            source_column: source.clone(),
                            matches: matches.len(),
                        });
                        (Some(*first), Resolution::Fallback)
                    }
                }
            }
        };

        map.columns.push(ResolvedColumn {
            output: output.clone(),
            source: Some(source.clone()),
            index,
            resolution,
        });
    }

    debug!(warnings = map.warnings.len(), "resolve: done");
    map
}
