//! Reconflow configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main Reconflow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where rules, outputs and the status file live
    pub storage: StorageConfig,

    /// Combine stage settings
    pub combine: CombineConfig,

    /// Final stage settings
    #[serde(rename = "final")]
    pub final_mis: FinalConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .reconflow.yml
        let local_config = PathBuf::from(".reconflow.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/reconflow/reconflow.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("reconflow").join("reconflow.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn data_dir() -> PathBuf {
    // XDG data directory (~/.local/share/reconflow on Linux)
    dirs::data_dir()
        .map(|d| d.join("reconflow"))
        .unwrap_or_else(|| PathBuf::from(".reconflow"))
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// YAML document holding rules and column catalogs
    #[serde(rename = "rules-file")]
    pub rules_file: PathBuf,

    /// Directory generated workbooks are written to
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// Latest-run summary
    #[serde(rename = "status-file")]
    pub status_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = data_dir();
        Self {
            rules_file: base.join("rules.yml"),
            output_dir: base.join("output"),
            status_file: base.join("status.json"),
        }
    }
}

/// Combine stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Sheet read from every combine workbook
    #[serde(rename = "sheet-name")]
    pub sheet_name: String,

    /// 1-based header row
    #[serde(rename = "start-row")]
    pub start_row: usize,

    /// Name of the appended store/date key column
    #[serde(rename = "key-column")]
    pub key_column: String,

    /// Highest allowed position (1-based) of the key column
    #[serde(rename = "max-columns")]
    pub max_columns: usize,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            sheet_name: "MIS Working".to_string(),
            start_row: 3,
            key_column: "CK".to_string(),
            // spreadsheet column CK
            max_columns: 89,
        }
    }
}

/// Final stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalConfig {
    /// Sheet that receives combine values
    #[serde(rename = "sheet-name")]
    pub sheet_name: String,

    /// 1-based header row used for every sheet of the workbook
    #[serde(rename = "start-row")]
    pub start_row: usize,

    /// Columns copied from combine data on key match, in append order
    #[serde(rename = "update-columns")]
    pub update_columns: Vec<String>,
}

impl Default for FinalConfig {
    fn default() -> Self {
        let update_columns = [
            "HB-Card",
            "HB-Cash",
            "HB-Online",
            "MR-Card",
            "MR-Cash",
            "MR-Online",
            "CO-Card",
            "CO-Cash",
            "CO-Online-Paytm",
            "CO-Online-Other",
            "CO-CCN",
            "CO-Bank Offer",
            "Remarks",
            "Performa Invoice Number",
            "Ad-Card",
            "Ad-Cash",
            "Ad-Online - PayTm",
            "Ad-Online - Other",
            "Ad-CCN",
            "Ad-Store Correction",
            "Ad-Bank Offer",
        ];
        Self {
            sheet_name: "Reconciliation by Date by Store".to_string(),
            start_row: 3,
            update_columns: update_columns.iter().map(|s| s.to_string()).collect(),
        }
    }
}
