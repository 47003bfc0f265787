pub mod types;
pub mod config;
pub mod error;
pub mod data;
pub mod processing;
pub mod render;
pub mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the interactive dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the dashboard views for one selection
    Summary {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Comma separated chain names
        #[arg(long, value_delimiter = ',')]
        chains: Option<Vec<String>>,
        #[arg(long)]
        state: Option<String>,
        /// Case-insensitive city substring
        #[arg(long)]
        city: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            info!("Serving dashboard with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;
            let dataset = load(&app_config)?;

            server::start_server(app_config, dataset).await?;
        }
        Commands::Summary { config, chains, state, city } => {
            let app_config = config::AppConfig::load_from_file(&config)?;
            let dataset = load(&app_config)?;

            let engine = processing::ViewEngine::new(dataset, &app_config);
            let criteria = engine.criteria(chains, state, city);
            let dashboard = engine.dashboard(&criteria);

            match render::render_summary_text(&dashboard) {
                Ok(text) => print!("{}", text),
                Err(e) => tracing::error!("Something went wrong displaying the summary: {}", e),
            }
        }
    }

    Ok(())
}

/// Loaded once per process and shared read-only from then on.
fn load(app_config: &config::AppConfig) -> anyhow::Result<Arc<data::Dataset>> {
    let dataset = data::load_dataset(&app_config.input.data_csv)
        .with_context(|| format!("Failed to load {:?}", app_config.input.data_csv))?;
    Ok(Arc::new(dataset))
}
