//! CLI command definitions and subcommands

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::inspect::InspectTarget;
use crate::rule::{Domain, RuleKey};
use crate::transform::DateRange;

/// Reconflow - rule-driven spreadsheet reconciliation
#[derive(Parser)]
#[command(
    name = "reconflow",
    about = "Normalize sales, advances and bank exports and build the reconciliation MIS",
    version,
    after_help = "Logs are written to: ~/.local/share/reconflow/logs/reconflow.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Where a stage writes its workbook
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Output xlsx path (defaults to a timestamped file in the output dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Normalize a sales export
    Sales {
        /// Sales export (xlsx, xls, xlsb, ods or csv)
        file: PathBuf,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Normalize an advances export against processed sales
    Advances {
        /// Advances export
        file: PathBuf,

        /// Output of an earlier `sales` run
        #[arg(short, long)]
        sales: PathBuf,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Normalize one or more bank exports into one table
    Banking {
        /// Uploads as BANK=FILE, optionally BANK=FILE@FROM..TO (dates as YYYY-MM-DD)
        #[arg(required = true, value_name = "BANK=FILE")]
        uploads: Vec<BankArg>,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Merge MIS working files and compute match keys
    Combine {
        /// MIS working files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Update the final MIS from combined output
    Final {
        /// Final MIS workbook
        file: PathBuf,

        /// Outputs of earlier `combine` runs
        #[arg(long = "combine", required = true)]
        combine: Vec<PathBuf>,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Combine then update the final MIS in one run
    CombineFinal {
        /// Final MIS workbook
        #[arg(long = "final")]
        final_file: PathBuf,

        /// MIS working files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Show sheets and header columns of a file without processing it
    Inspect {
        /// What the file is for (sales, advances, bank:<name>, combine, final)
        target: InspectTarget,

        /// File to inspect
        file: PathBuf,
    },

    /// Manage mapping rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },

    /// Show a rule's output columns with their letter labels
    Letters {
        /// Rule key (sales, advances, bank:<name>)
        rule: RuleKey,
    },

    /// Show the result of the latest run
    Status,
}

/// Rule management subcommands
#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// List configured rules
    List,

    /// Print a rule as YAML
    Show {
        /// Rule key (sales, advances, bank:<name>)
        rule: RuleKey,
    },

    /// Validate and save a rule from a YAML file
    Import {
        /// YAML file holding one rule
        file: PathBuf,
    },

    /// Delete a bank rule
    Delete {
        /// Rule key (bank:<name>)
        rule: RuleKey,
    },

    /// Show or replace a domain's output columns
    Columns {
        /// Domain (sales, advances, bank)
        domain: Domain,

        /// Replace the columns from a file, one per line; `A: ` labels are dropped
        #[arg(long)]
        set: Option<PathBuf>,
    },
}

/// One bank upload on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct BankArg {
    pub bank: String,
    pub path: PathBuf,
    pub range: Option<DateRange>,
}

impl std::str::FromStr for BankArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bank, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("Expected BANK=FILE, got: {}", s))?;
        let bank = bank.trim();
        if bank.is_empty() {
            return Err(format!("Missing bank name in: {}", s));
        }

        let (path, range) = match rest.rsplit_once('@') {
            Some((path, spec)) if spec.contains("..") => (path, Some(parse_range(spec)?)),
            _ => (rest, None),
        };
        if path.is_empty() {
            return Err(format!("Missing file in: {}", s));
        }

        Ok(Self {
            bank: bank.to_string(),
            path: PathBuf::from(path),
            range,
        })
    }
}

fn parse_range(spec: &str) -> Result<DateRange, String> {
    let (from, to) = spec
        .split_once("..")
        .ok_or_else(|| format!("Expected FROM..TO, got: {}", spec))?;
    let parse = |s: &str| -> Result<Option<NaiveDate>, String> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| format!("Invalid date '{}': {}", s, e))
    };
    Ok(DateRange::new(parse(from)?, parse(to)?))
}

/// Output format for command results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
