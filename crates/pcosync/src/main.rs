use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pcosync::{AppState, Settings, TriggerMode, Worker};

#[derive(Parser)]
#[command(
    name = "pcosync-worker",
    version,
    about = "Sync Planning Center data into BigQuery"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP trigger on $PORT
    Serve {
        /// Respond only after the run finishes, with its result
        #[arg(long)]
        wait: bool,
    },
    /// Run one sync and exit
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;
    let worker = Worker::from_settings(&settings)
        .await
        .context("failed to initialize sync clients")?;

    match cli.command {
        Command::Serve { wait } => {
            let mode = if wait {
                TriggerMode::Wait
            } else {
                TriggerMode::Background
            };
            let state = AppState::new(worker, mode, settings.trigger_key.clone());
            pcosync::server::serve(state, settings.port)
                .await
                .context("server error")?;
        }
        Command::Run => {
            let report = worker.run_today().await.context("sync run failed")?;
            print!("{report}");
            println!("All endpoints processed successfully.");
        }
    }

    Ok(())
}
