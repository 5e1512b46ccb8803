// ABOUTME: Central filtering logic for selecting audit tables to sync
// ABOUTME: Handles the explicit include/exclude table list and audit-name markers

use anyhow::{bail, Result};

/// Name fragment that identifies an audit table.
///
/// A configured prefix replaces the suffix entirely. Matching is a
/// case-insensitive "contains" test, so the marker does not have to sit at
/// the very start or end of the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditMarker {
    Prefix(String),
    Suffix(String),
}

impl AuditMarker {
    pub fn from_parts(prefix: Option<&str>, suffix: &str) -> Self {
        match prefix {
            Some(prefix) if !prefix.is_empty() => AuditMarker::Prefix(prefix.to_string()),
            _ => AuditMarker::Suffix(suffix.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuditMarker::Prefix(marker) | AuditMarker::Suffix(marker) => marker,
        }
    }

    pub fn matches(&self, table_name: &str) -> bool {
        let marker = self.as_str();
        if marker.is_empty() {
            return true;
        }
        table_name
            .to_lowercase()
            .contains(&marker.to_lowercase())
    }
}

/// Why a table was left out of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotInTableList,
    ExcludedByTableList,
    NotAnAuditTable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotInTableList => write!(f, "not in output list"),
            SkipReason::ExcludedByTableList => write!(f, "excluded by table list"),
            SkipReason::NotAnAuditTable => write!(f, "appears to be a non-audit table"),
        }
    }
}

/// Represents the table selection rules for one sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFilter {
    tables: Option<Vec<String>>,
    exclude: bool,
    marker: AuditMarker,
}

impl TableFilter {
    /// Creates a filter from the explicit table list and marker settings
    pub fn new(tables: Option<Vec<String>>, exclude: bool, marker: AuditMarker) -> Result<Self> {
        let tables = tables.map(|list| {
            list.into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        });

        if exclude && tables.as_ref().map_or(true, |t| t.is_empty()) {
            bail!("--exclude requires a non-empty --tables list");
        }

        Ok(Self {
            tables,
            exclude,
            marker,
        })
    }

    /// Parses a comma separated table list as given on the command line
    pub fn parse_table_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn tables(&self) -> Option<&Vec<String>> {
        self.tables.as_ref()
    }

    pub fn is_exclude(&self) -> bool {
        self.exclude
    }

    pub fn marker(&self) -> &AuditMarker {
        &self.marker
    }

    /// Returns why a table should be skipped, or `None` if it should be synced
    pub fn skip_reason(&self, table_name: &str) -> Option<SkipReason> {
        if let Some(ref tables) = self.tables {
            let listed = tables.iter().any(|t| t == table_name);
            if !self.exclude && !listed {
                return Some(SkipReason::NotInTableList);
            }
            if self.exclude && listed {
                return Some(SkipReason::ExcludedByTableList);
            }
        }

        if !self.marker.matches(table_name) {
            return Some(SkipReason::NotAnAuditTable);
        }

        None
    }
}

impl Default for TableFilter {
    fn default() -> Self {
        Self {
            tables: None,
            exclude: false,
            marker: AuditMarker::Suffix("_audit".to_string()),
        }
    }
}
