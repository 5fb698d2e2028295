//! Start the EnrollHub server.

use clap::Args;

use enrollhub_core::error::AppError;

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Override the server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the server host
    #[arg(long)]
    pub host: Option<String>,

    /// Override the snapshot file
    #[arg(long)]
    pub snapshot: Option<String>,
}

/// Execute the serve command
pub async fn execute(args: &ServeArgs, config_path: &str) -> Result<(), AppError> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(ref snapshot) = args.snapshot {
        config.store.snapshot_path = Some(snapshot.clone());
    }

    println!("Starting EnrollHub server...");
    println!("  Host: {}", config.server.host);
    println!("  Port: {}", config.server.port);
    println!("  Lock policy: {}", config.admission.lock_policy);

    enrollhub_api::app::run_server(config).await
}
