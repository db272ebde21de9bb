mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pcosync",
    about = "Build and deploy the Planning Center to BigQuery sync worker on Cloud Run"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write pcosync.toml and .env.example in the current project
    Init,
    /// Build the worker image and deploy it to Cloud Run
    Deploy {
        /// Allow deploying with uncommitted changes
        #[arg(long)]
        allow_dirty: bool,
    },
    /// Manage runtime secrets in Secret Manager
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
    /// Eject Dockerfile for manual customization
    Eject,
    /// Delete the Cloud Run service or job, images, and local bundle
    Destroy {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
        /// Also delete secrets from Secret Manager
        #[arg(long)]
        include_secrets: bool,
    },
    /// Check GCP setup and readiness
    Doctor,
    /// Show the deployed service or job
    Status,
    /// Print recent worker logs
    Logs {
        /// Number of log entries to show
        #[arg(long, short = 'n', default_value_t = 100)]
        tail: u32,
    },
}

#[derive(Subcommand)]
enum SecretAction {
    /// Set a secret (KEY=VALUE)
    Set {
        /// Secret in KEY=VALUE format
        key_value: String,
    },
    /// List all secrets
    List,
    /// Delete a secret
    Delete {
        /// Secret name
        key: String,
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init_project().await?,
        Commands::Deploy { allow_dirty } => commands::deploy(allow_dirty).await?,
        Commands::Secret { action } => match action {
            SecretAction::Set { key_value } => commands::secret_set(&key_value).await?,
            SecretAction::List => commands::secret_list().await?,
            SecretAction::Delete { key, yes } => commands::secret_delete(&key, yes).await?,
        },
        Commands::Eject => commands::eject().await?,
        Commands::Destroy {
            yes,
            include_secrets,
        } => commands::destroy(yes, include_secrets).await?,
        Commands::Doctor => commands::doctor().await?,
        Commands::Status => commands::status().await?,
        Commands::Logs { tail } => commands::logs(tail).await?,
    }

    Ok(())
}
