//! Seed data inspection.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use enrollhub_admission::collaborator::SeedData;
use enrollhub_core::error::AppError;

/// Arguments for seed commands
#[derive(Debug, Args)]
pub struct SeedArgs {
    /// Seed subcommand
    #[command(subcommand)]
    pub command: SeedCommand,
}

/// Seed subcommands
#[derive(Debug, Subcommand)]
pub enum SeedCommand {
    /// List the resources and consumers in a seed file
    Show {
        /// Seed file; defaults to the configured one
        #[arg(long)]
        path: Option<String>,
    },
}

/// Resource display row
#[derive(Debug, Serialize, Tabled)]
struct ResourceRow {
    /// Resource ID
    id: u64,
    /// Course code
    course: String,
    /// Term
    term: String,
    /// Capacity
    capacity: u32,
    /// Credits
    credits: String,
    /// Canceled
    canceled: String,
}

/// Consumer display row
#[derive(Debug, Serialize, Tabled)]
struct ConsumerRow {
    /// Consumer ID
    id: String,
    /// Name
    name: String,
    /// Eligibility
    eligibility: String,
    /// Quota tier
    tier: String,
    /// Completed courses
    completed: usize,
}

/// Execute seed commands
pub async fn execute(
    args: &SeedArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        SeedCommand::Show { path } => {
            let path = match path {
                Some(path) => path.clone(),
                None => super::load_config(config_path)?
                    .store
                    .seed_path
                    .ok_or_else(|| AppError::validation("No seed file configured"))?,
            };
            let seed = SeedData::load(&path).await?;

            let resources: Vec<ResourceRow> = seed
                .resources
                .iter()
                .map(|r| ResourceRow {
                    id: r.id.value(),
                    course: r.course_code.clone().unwrap_or_else(|| "-".to_string()),
                    term: r.term.to_string(),
                    capacity: r.capacity,
                    credits: r.credit_weight.to_string(),
                    canceled: if r.canceled { "yes" } else { "no" }.to_string(),
                })
                .collect();
            let consumers: Vec<ConsumerRow> = seed
                .consumers
                .iter()
                .map(|c| ConsumerRow {
                    id: c.id.to_string(),
                    name: c.name.clone().unwrap_or_else(|| "-".to_string()),
                    eligibility: c.eligibility.to_string(),
                    tier: c.quota_tier.to_string(),
                    completed: c.completed_courses.len(),
                })
                .collect();

            if format == OutputFormat::Table {
                output::print_heading(&format!("Resources ({})", resources.len()));
            }
            output::print_list(&resources, format);
            if format == OutputFormat::Table {
                output::print_heading(&format!("Consumers ({})", consumers.len()));
            }
            output::print_list(&consumers, format);
            Ok(())
        }
    }
}
