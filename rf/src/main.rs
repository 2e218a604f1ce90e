//! Reconflow - rule-driven spreadsheet reconciliation
//!
//! CLI entry point: reads uploads, runs one stage and writes its workbook.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use reconflow::cli::{BankArg, Cli, Command, OutputArgs, OutputFormat, RulesCommand};
use reconflow::config::Config;
use reconflow::inspect::InspectTarget;
use reconflow::io::{load_workbooks, read_workbook_file, write_tables};
use reconflow::pipeline::{BankFile, Pipeline, RunSummary, StatusReport, load_summary, save_summary};
use reconflow::rule::{
    MappingRule, RuleKey, RuleStore, YamlRuleStore, column_letter, lettered_columns, parse_column_lines,
};
use reconflow::stage::{RunResult, SALES_SHEET};
use reconflow::table::{NamedTable, OutputTable, Workbook};

fn setup_logging(verbose: bool) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reconflow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("reconflow.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(rules_file = %config.storage.rules_file.display(), "Reconflow loaded config");

    let format = cli.format;
    match dispatch(cli.command, &config, format).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) if format == OutputFormat::Json => {
            print_json_error(&format!("{:#}", e))?;
            std::process::exit(1)
        }
        Err(e) => Err(e),
    }
}

/// Run one command; `Ok(false)` means a stage ran and failed
async fn dispatch(command: Command, config: &Config, format: OutputFormat) -> Result<bool> {
    debug!(?command, "dispatch: called");
    match command {
        Command::Sales { file, out } => {
            let pipeline = open_pipeline(config)?;
            let workbook = read_one(&file).await?;
            let result = pipeline.run_sales(Some(&workbook));
            finish_run(config, format, &result, &out)
        }
        Command::Advances { file, sales, out } => {
            let pipeline = open_pipeline(config)?;
            let mut workbooks = load_workbooks(&[file, sales]).await?.into_iter();
            let (Some(workbook), Some(sales_wb)) = (workbooks.next(), workbooks.next()) else {
                eyre::bail!("Expected two workbooks");
            };
            let reference = output_table(&sales_wb, SALES_SHEET);
            let result = pipeline.run_advances(Some(&workbook), reference.as_ref());
            finish_run(config, format, &result, &out)
        }
        Command::Banking { uploads, out } => {
            let pipeline = open_pipeline(config)?;
            let files = read_bank_files(uploads).await?;
            let result = pipeline.run_banking(files);
            finish_run(config, format, &result, &out)
        }
        Command::Combine { files, out } => {
            let pipeline = open_pipeline(config)?;
            let workbooks = load_workbooks(&files).await?;
            let result = pipeline.run_combine(&workbooks);
            finish_run(config, format, &result, &out)
        }
        Command::Final { file, combine, out } => {
            let pipeline = open_pipeline(config)?;
            let workbook = read_one(&file).await?;
            let combine_workbooks = load_workbooks(&combine).await?;
            let result = pipeline.run_final_from_outputs(&combine_workbooks, Some(&workbook));
            finish_run(config, format, &result, &out)
        }
        Command::CombineFinal { final_file, files, out } => {
            let pipeline = open_pipeline(config)?;
            let final_wb = read_one(&final_file).await?;
            let workbooks = load_workbooks(&files).await?;
            let result = pipeline.run_combine_final(&workbooks, Some(&final_wb));
            finish_run(config, format, &result, &out)
        }
        Command::Inspect { target, file } => cmd_inspect(config, &target, &file).await,
        Command::Rules { command } => cmd_rules(config, command, format),
        Command::Letters { rule } => cmd_letters(config, &rule, format),
        Command::Status => cmd_status(config, format),
    }
}

fn open_store(config: &Config) -> Result<YamlRuleStore> {
    YamlRuleStore::open(&config.storage.rules_file).context("Failed to open rules file")
}

fn open_pipeline(config: &Config) -> Result<Pipeline> {
    let store = open_store(config)?;
    Ok(Pipeline::new(Arc::new(store), config))
}

async fn read_one(path: &Path) -> Result<Workbook> {
    let mut workbooks = load_workbooks(&[path.to_path_buf()]).await?;
    workbooks.pop().ok_or_else(|| eyre::eyre!("No workbook read from {}", path.display()))
}

async fn read_bank_files(uploads: Vec<BankArg>) -> Result<Vec<BankFile>> {
    debug!(count = uploads.len(), "read_bank_files: called");
    let paths: Vec<PathBuf> = uploads.iter().map(|u| u.path.clone()).collect();
    let workbooks = load_workbooks(&paths).await?;
    Ok(uploads
        .into_iter()
        .zip(workbooks)
        .map(|(upload, workbook)| {
            let file = BankFile::new(upload.bank, workbook);
            match upload.range {
                Some(range) => file.with_range(range),
                None => file,
            }
        })
        .collect())
}

/// Table written by an earlier run, read back from its output workbook
fn output_table(workbook: &Workbook, sheet: &str) -> Option<OutputTable> {
    let selection = workbook.select_sheet(sheet)?;
    selection.sheet.table(1).map(OutputTable::from_input)
}

fn default_output_path(config: &Config, result: &RunResult) -> PathBuf {
    config.storage.output_dir.join(format!(
        "{}_{}.xlsx",
        result.stage,
        result.finished_at.format("%Y%m%d_%H%M%S")
    ))
}

/// Write output on success, then persist status and report the outcome
///
/// The summary is saved only once the workbook is on disk; a failed write
/// is recorded as a failed run.
fn finish_run(config: &Config, format: OutputFormat, result: &RunResult, out: &OutputArgs) -> Result<bool> {
    debug!(stage = %result.stage, status = %result.status, "finish_run: called");
    let written = match &result.output {
        Some(tables) => {
            let path = out.output.clone().unwrap_or_else(|| default_output_path(config, result));
            if let Err(e) = write_output(&path, tables) {
                let summary = RunSummary::from_result(result).with_error(format!("{:#}", e));
                save_summary(&config.storage.status_file, &summary)?;
                return Err(e);
            }
            Some(path)
        }
        None => None,
    };
    save_summary(&config.storage.status_file, &RunSummary::from_result(result))?;

    match format {
        OutputFormat::Json => {
            if let Some(err) = result.first_error() {
                print_json_error(&err.to_string())?;
            } else {
                let json = serde_json::json!({
                    "run_id": result.run_id,
                    "stage": result.stage,
                    "status": result.status,
                    "output": written,
                    "sheets": result.output.iter().flatten().map(|t| &t.name).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
        }
        OutputFormat::Text => {
            match (&written, result.first_error()) {
                (Some(path), _) => println!(
                    "{} {} succeeded: {}",
                    "✓".green(),
                    result.stage.to_string().cyan(),
                    path.display()
                ),
                (None, Some(err)) => println!("{} {}", "Error:".red(), err),
                (None, None) => println!("{} {} finished without output", "!".yellow(), result.stage),
            }
            for warning in &result.warnings {
                println!("  {} {}", "warning:".yellow(), warning);
            }
        }
    }

    Ok(result.is_success())
}

fn write_output(path: &Path, tables: &[NamedTable]) -> Result<()> {
    debug!(?path, tables = tables.len(), "write_output: called");
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    let bytes = write_tables(tables)?;
    fs::write(path, bytes).context(format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote output workbook");
    Ok(())
}

fn print_json_error(message: &str) -> Result<()> {
    let json = serde_json::json!({ "error": message });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn cmd_inspect(config: &Config, target: &InspectTarget, file: &Path) -> Result<bool> {
    debug!(%target, ?file, "cmd_inspect: called");
    let pipeline = open_pipeline(config)?;
    let path = file.to_path_buf();
    let workbook = tokio::task::spawn_blocking(move || read_workbook_file(&path))
        .await
        .context("Inspection read task failed")??;
    let result = pipeline.inspect(target, &workbook)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(true)
}

fn cmd_rules(config: &Config, command: RulesCommand, format: OutputFormat) -> Result<bool> {
    debug!(?command, "cmd_rules: called");
    let store = open_store(config)?;
    match command {
        RulesCommand::List => {
            let mut keys = vec![RuleKey::Sales, RuleKey::Advances];
            keys.extend(store.list_banks()?.into_iter().map(RuleKey::Bank));
            match format {
                OutputFormat::Json => {
                    let names: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                    println!("{}", serde_json::to_string_pretty(&names)?);
                }
                OutputFormat::Text => {
                    for key in keys {
                        match store.load_rule(&key) {
                            Ok(rule) => println!(
                                "{} (sheet: {}, start row: {}, mapped: {})",
                                key.to_string().cyan(),
                                rule.sheet_name,
                                rule.start_row,
                                rule.mapping.len()
                            ),
                            Err(e) => println!("{} {}", key.to_string().cyan(), e.to_string().red()),
                        }
                    }
                }
            }
        }
        RulesCommand::Show { rule } => {
            let rule = store.load_rule(&rule)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rule)?),
                OutputFormat::Text => print!("{}", serde_yaml::to_string(&rule)?),
            }
        }
        RulesCommand::Import { file } => {
            let content = fs::read_to_string(&file).context(format!("Failed to read {}", file.display()))?;
            let rule: MappingRule = serde_yaml::from_str(&content).context("Failed to parse rule")?;
            let key = rule.key();
            store.save_rule(rule)?;
            println!("{} Saved rule: {}", "✓".green(), key.to_string().cyan());
        }
        RulesCommand::Delete { rule } => {
            store.delete_rule(&rule)?;
            println!("{} Deleted rule: {}", "✓".green(), rule.to_string().cyan());
        }
        RulesCommand::Columns { domain, set } => {
            if let Some(file) = set {
                let content = fs::read_to_string(&file).context(format!("Failed to read {}", file.display()))?;
                let columns = parse_column_lines(&content);
                let count = columns.len();
                store.save_output_columns(domain, columns)?;
                if format == OutputFormat::Text {
                    println!("{} Saved {} {} output columns", "✓".green(), count, domain.to_string().cyan());
                }
            }
            let columns = store.output_columns(domain)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&columns)?),
                OutputFormat::Text => {
                    for (i, column) in columns.iter().enumerate() {
                        println!("{}: {}", column_letter(i), column);
                    }
                }
            }
        }
    }
    Ok(true)
}

fn cmd_letters(config: &Config, key: &RuleKey, format: OutputFormat) -> Result<bool> {
    debug!(rule = %key, "cmd_letters: called");
    let store = open_store(config)?;
    let rule = store.load_rule(key)?;
    let rows: Vec<(String, &str, Option<&str>)> = lettered_columns(&rule)
        .into_iter()
        .map(|(letter, column)| (letter, column, rule.mapping.get(column).map(String::as_str)))
        .collect();

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = rows
                .iter()
                .map(|(letter, column, source)| serde_json::json!({"letter": letter, "column": column, "source": source}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            for (letter, column, source) in rows {
                match source {
                    Some(source) => println!("{:>3}  {} <- {}", letter.yellow(), column, source),
                    None => println!("{:>3}  {}", letter.yellow(), column.dimmed()),
                }
            }
        }
    }
    Ok(true)
}

fn cmd_status(config: &Config, format: OutputFormat) -> Result<bool> {
    debug!("cmd_status: called");
    let summary = load_summary(&config.storage.status_file)?;
    let report = StatusReport::from_summary(summary.as_ref());

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("Reconflow Status");
            println!("----------------");
            if !report.available {
                println!("No runs yet");
                return Ok(true);
            }
            if let Some(stage) = report.stage {
                println!("Stage: {}", stage);
            }
            if let Some(finished_at) = report.finished_at {
                println!("Finished: {}", finished_at.to_rfc3339());
            }
            let outcome = if report.has_errors { "failed".red() } else { "succeeded".green() };
            println!("Outcome: {}", outcome);
            println!("Errors: {}", report.error_count);
            println!("Warnings: {}", report.warning_count);
            if let Some(message) = report.message {
                println!("Message: {}", message);
            }
        }
    }
    Ok(true)
}
