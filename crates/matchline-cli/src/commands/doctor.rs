//! Doctor command - integrity check and repair
//!
//! Without flags, scans and auto-repairs warning-level issues only;
//! error-level issues (corrupted rows) are reported and left alone until
//! the operator passes `--repair`.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use matchline_backup::{AutoRepairOutcome, IntegrityChecker, Repairer};

use crate::commands::CliContext;
use crate::output::{print_json, OutputFormat};

/// Check store integrity and repair issues
#[derive(Debug, Args)]
pub struct DoctorCommand {
    /// Repair everything repairable, including error-severity issues
    #[arg(long)]
    repair: bool,
}

impl DoctorCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let ctx = CliContext::open(config_path).await?;
        let now = Utc::now();

        if self.repair {
            let repairer = Repairer::new(ctx.store());
            let report = repairer.repair(now).await?;
            if format.is_json() {
                print_json(&serde_json::to_value(&report)?);
            } else {
                println!(
                    "Repair finished: {} fixed, {} failed",
                    report.fixed.len(),
                    report.failed.len()
                );
                for action in &report.fixed {
                    println!("  fixed {} {} ({})", action.kind, action.id, action.detail);
                }
                for action in &report.failed {
                    println!("  FAILED {} {} ({})", action.kind, action.id, action.detail);
                }
            }
            return Ok(());
        }

        let checker = IntegrityChecker::new(ctx.store());
        let report = checker.check(now).await?;

        if format.is_json() {
            print_json(&serde_json::to_value(&report)?);
        } else if report.is_healthy {
            println!("Store integrity OK");
        } else {
            println!("Integrity issues found:");
            for issue in &report.issues {
                println!(
                    "  [{:?}] {} ({} affected)",
                    issue.severity, issue.message, issue.count
                );
            }
        }

        if !report.is_healthy {
            let repairer = Repairer::new(ctx.store());
            match repairer.auto_repair(now).await? {
                AutoRepairOutcome::Repaired(repair) => {
                    println!("Auto-repaired {} warning-level issues", repair.fixed.len());
                }
                AutoRepairOutcome::RequiresManual(_) => {
                    println!("Error-severity issues present; run with --repair to fix");
                }
                AutoRepairOutcome::Healthy => {}
            }
        }

        Ok(())
    }
}
