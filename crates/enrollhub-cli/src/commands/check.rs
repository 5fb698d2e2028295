//! Offline consistency audit of persisted state.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use enrollhub_admission::bootstrap::build_service;
use enrollhub_admission::reconciler::ConsistencyReport;
use enrollhub_core::error::AppError;

/// Arguments for the check command
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Snapshot file; defaults to the configured one
    #[arg(long)]
    pub snapshot: Option<String>,
}

/// One finding
#[derive(Debug, Serialize, Tabled)]
struct FindingRow {
    /// Kind of finding
    kind: String,
    /// Entity concerned
    subject: String,
    /// What was observed
    observed: String,
    /// What was expected
    expected: String,
}

fn findings(report: &ConsistencyReport) -> Vec<FindingRow> {
    let mut rows = Vec::new();
    for d in &report.ledger_drift {
        rows.push(FindingRow {
            kind: "ledger_drift".to_string(),
            subject: format!("{} / {}", d.consumer_id, d.term),
            observed: d.cached.to_string(),
            expected: d.expected.to_string(),
        });
    }
    for d in &report.held_drift {
        rows.push(FindingRow {
            kind: "held_drift".to_string(),
            subject: format!("resource {}", d.resource_id),
            observed: d.held.to_string(),
            expected: d.active.to_string(),
        });
    }
    for r in &report.over_capacity {
        rows.push(FindingRow {
            kind: "over_capacity".to_string(),
            subject: format!("resource {}", r.id),
            observed: r.held.to_string(),
            expected: format!("<= {}", r.capacity),
        });
    }
    for d in &report.duplicate_active {
        rows.push(FindingRow {
            kind: "duplicate_active".to_string(),
            subject: format!("{} / resource {}", d.consumer_id, d.resource_id),
            observed: d.count.to_string(),
            expected: "1".to_string(),
        });
    }
    rows
}

/// Execute the check command
pub async fn execute(args: &CheckArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let mut config = super::load_config(config_path)?;
    if let Some(ref snapshot) = args.snapshot {
        config.store.snapshot_path = Some(snapshot.clone());
    }
    if config.store.snapshot_path.is_none() {
        return Err(AppError::validation("No snapshot file configured"));
    }

    let service = build_service(&config).await?;
    let report = service.verify().await?;

    match format {
        OutputFormat::Json => output::print_json(&report),
        OutputFormat::Table => {
            let snapshot = service.snapshot().await?;
            output::print_kv("Resources", &snapshot.resources.len().to_string());
            output::print_kv("Allocations", &snapshot.allocations.len().to_string());
            if report.is_consistent() {
                output::print_success("State is consistent");
            } else {
                output::print_warning("Inconsistencies found");
                output::print_list(&findings(&report), format);
            }
        }
    }

    if report.is_consistent() {
        Ok(())
    } else {
        Err(AppError::conflict("Snapshot failed the consistency audit"))
    }
}
