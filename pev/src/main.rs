//! Predict-execute-verify engine tooling.
//!
//! Manages the engine config (`pev.toml`) and evaluates prediction checks
//! against JSON context snapshots, so predictions can be exercised without
//! running a machine.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, info};

use pev::core::check::evaluate;
use pev::core::types::Prediction;
use pev::core::verify::default_verdict;
use pev::exit_codes;
use pev::io::config::{CONFIG_FILE, EngineConfig, load_config, write_config};
use pev::logging;

const PREDICTION_SCHEMA: &str = include_str!("../schemas/prediction.schema.json");

#[derive(Parser)]
#[command(
    name = "pev",
    version,
    about = "Predict-execute-verify reconciliation engine tooling"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `pev.toml` if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
        /// Config file to write.
        #[arg(long, default_value = CONFIG_FILE)]
        path: PathBuf,
    },
    /// Load, validate and print the resolved config.
    Config {
        /// Config file to read (defaults apply when missing).
        #[arg(long, default_value = CONFIG_FILE)]
        path: PathBuf,
    },
    /// Evaluate a prediction against old/new JSON context snapshots.
    Check {
        /// Prediction file: `{ "description": ..., "checks": [...] }`.
        #[arg(long)]
        checks: PathBuf,
        /// Pre-action context (JSON).
        #[arg(long)]
        old: PathBuf,
        /// Post-action context (JSON).
        #[arg(long)]
        new: PathBuf,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, path } => cmd_init(&path, force),
        Command::Config { path } => cmd_config(&path),
        Command::Check { checks, old, new } => cmd_check(&checks, &old, &new),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        info!(path = %path.display(), "config exists; leaving it untouched");
        return Ok(exit_codes::OK);
    }
    write_config(path, &EngineConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(exit_codes::OK)
}

fn cmd_config(path: &Path) -> Result<i32> {
    let cfg = load_config(path).context("load engine config")?;
    let rendered = toml::to_string_pretty(&cfg).context("serialize config toml")?;
    print!("{rendered}");
    Ok(exit_codes::OK)
}

fn cmd_check(checks_path: &Path, old_path: &Path, new_path: &Path) -> Result<i32> {
    let prediction = parse_prediction(&read_json(checks_path)?)?;
    let old_ctx = read_json(old_path)?;
    let new_ctx = read_json(new_path)?;

    let evaluation = evaluate(&prediction.checks, &old_ctx, &new_ctx);
    let verdict = default_verdict(Some(&prediction), &evaluation);
    debug!(
        pass = verdict.pass,
        diffs = verdict.diffs.len(),
        "prediction evaluated"
    );

    let rendered = serde_json::to_string_pretty(&verdict).context("serialize verdict")?;
    println!("{rendered}");
    Ok(if verdict.pass {
        exit_codes::OK
    } else {
        exit_codes::CHECKS_FAILED
    })
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Schema conformance first, then the typed parse.
fn parse_prediction(instance: &Value) -> Result<Prediction> {
    let schema: Value =
        serde_json::from_str(PREDICTION_SCHEMA).context("parse prediction schema")?;
    validate_schema(instance, &schema)?;
    serde_json::from_value(instance.clone()).context("parse prediction")
}

/// Validate JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
