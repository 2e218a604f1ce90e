//! Rule storage
//!
//! Rules and column catalogs live in one YAML document. Loading a rule fills
//! its output columns from the catalog and validates it, so callers only ever
//! hold valid rules.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::catalog::{default_advances_rule, default_columns, default_sales_rule};
use super::model::{Domain, MappingRule, RuleKey, ValidationError, validate, validate_columns};

/// Rule storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No rule configured for {0}")]
    NotFound(RuleKey),

    #[error("Invalid rule {key}: {}", join_errors(.errors))]
    Invalid { key: RuleKey, errors: Vec<ValidationError> },

    #[error("Invalid {domain} output columns: {}", join_errors(.errors))]
    InvalidCatalog { domain: Domain, errors: Vec<ValidationError> },

    #[error("The {0} rule is required and cannot be deleted")]
    Required(RuleKey),

    #[error("Failed to access rules file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rules file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize rules: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("Rule store lock poisoned")]
    Poisoned,
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Source of mapping rules and canonical output columns
pub trait RuleStore: Send + Sync {
    /// Load a validated rule with its output columns filled in
    fn load_rule(&self, key: &RuleKey) -> Result<MappingRule, StoreError>;

    /// Insert or replace a rule; invalid rules are rejected
    fn save_rule(&self, rule: MappingRule) -> Result<(), StoreError>;

    /// Ordered canonical output columns for a domain
    fn output_columns(&self, domain: Domain) -> Result<Vec<String>, StoreError>;

    /// Names of the configured banks, in stored order
    fn list_banks(&self) -> Result<Vec<String>, StoreError>;

    /// Replace a domain's output columns
    ///
    /// Rejected when the list is empty, repeats a name, or would leave a
    /// stored rule of that domain invalid.
    fn save_output_columns(&self, domain: Domain, columns: Vec<String>) -> Result<(), StoreError>;

    /// Remove a bank rule; Sales and Advances rules cannot be removed
    fn delete_rule(&self, key: &RuleKey) -> Result<(), StoreError>;
}

/// Ordered output column names per domain
///
/// A domain left out of the document keeps its default catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalogs {
    #[serde(default = "default_sales_columns")]
    pub sales: Vec<String>,
    #[serde(default = "default_advances_columns")]
    pub advances: Vec<String>,
    #[serde(default = "default_bank_columns")]
    pub bank: Vec<String>,
}

fn default_sales_columns() -> Vec<String> {
    default_columns(Domain::Sales)
}

fn default_advances_columns() -> Vec<String> {
    default_columns(Domain::Advances)
}

fn default_bank_columns() -> Vec<String> {
    default_columns(Domain::Bank)
}

impl Default for Catalogs {
    fn default() -> Self {
        Self {
            sales: default_columns(Domain::Sales),
            advances: default_columns(Domain::Advances),
            bank: default_columns(Domain::Bank),
        }
    }
}

impl Catalogs {
    pub fn columns(&self, domain: Domain) -> &[String] {
        match domain {
            Domain::Sales => &self.sales,
            Domain::Advances => &self.advances,
            Domain::Bank => &self.bank,
        }
    }

    fn columns_mut(&mut self, domain: Domain) -> &mut Vec<String> {
        match domain {
            Domain::Sales => &mut self.sales,
            Domain::Advances => &mut self.advances,
            Domain::Bank => &mut self.bank,
        }
    }
}

/// The persisted rules document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesDocument {
    #[serde(default)]
    pub catalogs: Catalogs,
    #[serde(default)]
    pub rules: Vec<MappingRule>,
}

impl RulesDocument {
    /// Document with the default catalogs and the default Sales/Advances rules
    pub fn seeded() -> Self {
        debug!("RulesDocument::seeded: called");
        Self {
            catalogs: Catalogs::default(),
            rules: vec![default_sales_rule(), default_advances_rule()],
        }
    }

    fn with_columns(&self, rule: MappingRule) -> MappingRule {
        columns_from(&self.catalogs, rule)
    }

    fn load(&self, key: &RuleKey) -> Result<MappingRule, StoreError> {
        let rule = self
            .rules
            .iter()
            .find(|r| &r.key() == key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let rule = self.with_columns(rule);
        let errors = validate(&rule);
        if !errors.is_empty() {
            warn!(rule = %key, count = errors.len(), "Stored rule failed validation");
            return Err(StoreError::Invalid {
                key: key.clone(),
                errors,
            });
        }
        Ok(rule)
    }

    fn upsert(&mut self, rule: MappingRule) -> Result<(), StoreError> {
        let key = rule.key();
        let checked = self.with_columns(rule);
        let errors = validate(&checked);
        if !errors.is_empty() {
            return Err(StoreError::Invalid { key, errors });
        }

        let mut stored = checked;
        stored.output_columns.clear();
        match self.rules.iter_mut().find(|r| r.key() == key) {
            Some(existing) => *existing = stored,
            None => self.rules.push(stored),
        }
        Ok(())
    }

    fn replace_columns(&mut self, domain: Domain, columns: Vec<String>) -> Result<(), StoreError> {
        let mut updated = self.catalogs.clone();
        *updated.columns_mut(domain) = columns;

        let mut errors = validate_columns(&format!("{} catalog", domain), updated.columns(domain));
        if errors.is_empty() {
            for rule in self.rules.iter().filter(|r| r.domain() == domain) {
                errors.extend(validate(&columns_from(&updated, rule.clone())));
            }
        }
        if !errors.is_empty() {
            return Err(StoreError::InvalidCatalog { domain, errors });
        }

        self.catalogs = updated;
        Ok(())
    }

    fn remove(&mut self, key: &RuleKey) -> Result<(), StoreError> {
        if !matches!(key, RuleKey::Bank(_)) {
            return Err(StoreError::Required(key.clone()));
        }
        let before = self.rules.len();
        self.rules.retain(|r| &r.key() != key);
        if self.rules.len() == before {
            return Err(StoreError::NotFound(key.clone()));
        }
        Ok(())
    }

    fn banks(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|r| r.bank_name().map(str::to_string))
            .collect()
    }
}

fn columns_from(catalogs: &Catalogs, mut rule: MappingRule) -> MappingRule {
    rule.output_columns = catalogs.columns(rule.domain()).to_vec();
    rule
}

/// In-memory rule store
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    doc: RwLock<RulesDocument>,
}

impl MemoryRuleStore {
    pub fn new(doc: RulesDocument) -> Self {
        Self { doc: RwLock::new(doc) }
    }

    /// Store holding the default catalogs and rules
    pub fn seeded() -> Self {
        Self::new(RulesDocument::seeded())
    }
}

impl RuleStore for MemoryRuleStore {
    fn load_rule(&self, key: &RuleKey) -> Result<MappingRule, StoreError> {
        debug!(rule = %key, "MemoryRuleStore::load_rule: called");
        self.doc.read().map_err(|_| StoreError::Poisoned)?.load(key)
    }

    fn save_rule(&self, rule: MappingRule) -> Result<(), StoreError> {
        debug!(rule = %rule.key(), "MemoryRuleStore::save_rule: called");
        self.doc.write().map_err(|_| StoreError::Poisoned)?.upsert(rule)
    }

    fn output_columns(&self, domain: Domain) -> Result<Vec<String>, StoreError> {
        let doc = self.doc.read().map_err(|_| StoreError::Poisoned)?;
        Ok(doc.catalogs.columns(domain).to_vec())
    }

    fn list_banks(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.doc.read().map_err(|_| StoreError::Poisoned)?.banks())
    }

    fn save_output_columns(&self, domain: Domain, columns: Vec<String>) -> Result<(), StoreError> {
        debug!(%domain, count = columns.len(), "MemoryRuleStore::save_output_columns: called");
        self.doc
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .replace_columns(domain, columns)
    }

    fn delete_rule(&self, key: &RuleKey) -> Result<(), StoreError> {
        debug!(rule = %key, "MemoryRuleStore::delete_rule: called");
        self.doc.write().map_err(|_| StoreError::Poisoned)?.remove(key)
    }
}

/// Rule store persisted as a YAML file
#[derive(Debug)]
pub struct YamlRuleStore {
    path: PathBuf,
    doc: RwLock<RulesDocument>,
}

impl YamlRuleStore {
    /// Open the rules file, seeding it with defaults when it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "YamlRuleStore::open: called");

        let doc = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_yaml::from_str(&content).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            info!(?path, "Rules file not found, seeding defaults");
            let doc = RulesDocument::seeded();
            write_document(&path, &doc)?;
            doc
        };

        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the document and persist it; memory only
    /// changes once the file is written
    fn update(&self, change: impl FnOnce(&mut RulesDocument) -> Result<(), StoreError>) -> Result<(), StoreError> {
        let mut doc = self.doc.write().map_err(|_| StoreError::Poisoned)?;
        let mut updated = doc.clone();
        change(&mut updated)?;
        write_document(&self.path, &updated)?;
        *doc = updated;
        Ok(())
    }
}

fn write_document(path: &Path, doc: &RulesDocument) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let content = serde_yaml::to_string(doc).map_err(StoreError::Serialize)?;
    fs::write(path, content).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl RuleStore for YamlRuleStore {
    fn load_rule(&self, key: &RuleKey) -> Result<MappingRule, StoreError> {
        debug!(rule = %key, "YamlRuleStore::load_rule: called");
        self.doc.read().map_err(|_| StoreError::Poisoned)?.load(key)
    }

    fn save_rule(&self, rule: MappingRule) -> Result<(), StoreError> {
        let key = rule.key();
        debug!(rule = %key, "YamlRuleStore::save_rule: called");
        self.update(|doc| doc.upsert(rule))?;
        info!(rule = %key, path = ?self.path, "Saved rule");
        Ok(())
    }

    fn output_columns(&self, domain: Domain) -> Result<Vec<String>, StoreError> {
        let doc = self.doc.read().map_err(|_| StoreError::Poisoned)?;
        Ok(doc.catalogs.columns(domain).to_vec())
    }

    fn list_banks(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.doc.read().map_err(|_| StoreError::Poisoned)?.banks())
    }

    fn save_output_columns(&self, domain: Domain, columns: Vec<String>) -> Result<(), StoreError> {
        debug!(%domain, count = columns.len(), "YamlRuleStore::save_output_columns: called");
        self.update(|doc| doc.replace_columns(domain, columns))?;
        info!(%domain, path = ?self.path, "Saved output columns");
        Ok(())
    }

    fn delete_rule(&self, key: &RuleKey) -> Result<(), StoreError> {
        debug!(rule = %key, "YamlRuleStore::delete_rule: called");
        self.update(|doc| doc.remove(key))?;
        info!(rule = %key, path = ?self.path, "Deleted rule");
        Ok(())
    }
}
