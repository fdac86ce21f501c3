//! Run report written after a machine reaches a terminal state.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::core::types::VerifyResult;
use crate::io::config::EngineConfig;
use crate::machine::domain::GuardKey;
use crate::machine::factory::DomainMachine;
use crate::machine::runner::RunOutcome;
use crate::registry::ActionRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct CompletedEntry {
    pub kind: String,
    pub result: Value,
    pub verified: bool,
}

/// Terminal snapshot of one run, in report form.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub machine: String,
    pub state: String,
    pub failed: bool,
    pub cycle_count: u32,
    pub max_cycles: u32,
    pub error: Option<String>,
    pub verify_result: Option<VerifyResult>,
    pub failure_verdict: Option<VerifyResult>,
    pub failed_action: Option<String>,
    pub completed_actions: Vec<CompletedEntry>,
    pub domain: Value,
}

impl RunReport {
    pub fn from_outcome<R, C, K>(
        machine: &DomainMachine<R, C, K>,
        outcome: &RunOutcome<R, C>,
    ) -> Result<Self>
    where
        R: ActionRegistry,
        K: GuardKey,
    {
        let registry = machine.registry();
        let ctx = &outcome.context;
        let completed_actions = ctx
            .completed_actions()
            .iter()
            .map(|completed| -> Result<CompletedEntry> {
                Ok(CompletedEntry {
                    kind: registry.kind(&completed.action).to_string(),
                    result: serde_json::to_value(&completed.result)
                        .context("serialize action result")?,
                    verified: completed.verified,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            machine: machine.id().to_string(),
            state: outcome.state_name().to_string(),
            failed: outcome.state.is_failure(),
            cycle_count: ctx.cycle_count(),
            max_cycles: ctx.max_cycles(),
            error: ctx.error().map(str::to_string),
            verify_result: ctx.verify_result().cloned(),
            failure_verdict: ctx.failure_verdict().cloned(),
            failed_action: ctx
                .failed_action()
                .map(|action| registry.kind(action).to_string()),
            completed_actions,
            domain: serde_json::to_value(&ctx.domain).context("serialize final domain")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub dir: PathBuf,
    pub report_path: PathBuf,
}

impl ReportPaths {
    pub fn new(report_dir: &Path, machine_id: &str) -> Self {
        let dir = report_dir.join(machine_id);
        Self {
            report_path: dir.join("report.json"),
            dir,
        }
    }
}

/// Write `report.json` under `<report_dir>/<machine>/`, replacing any
/// previous report for the same machine.
pub fn write_run_report(report_dir: &Path, report: &RunReport) -> Result<ReportPaths> {
    let paths = ReportPaths::new(report_dir, &report.machine);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create report dir {}", paths.dir.display()))?;
    let mut buf = serde_json::to_string_pretty(report).context("serialize run report")?;
    buf.push('\n');
    fs::write(&paths.report_path, buf)
        .with_context(|| format!("write {}", paths.report_path.display()))?;
    Ok(paths)
}

/// Write the report under the configured `report_dir`.
pub fn write_run_report_for(cfg: &EngineConfig, report: &RunReport) -> Result<ReportPaths> {
    write_run_report(&cfg.report_dir, report)
}
