use std::path::PathBuf;

use anyhow::Context;
use bookstore_app::App;
use bookstore_kernel::settings::Settings;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bookstore", version, about = "Online bookstore backend")]
struct Cli {
    /// Directory holding `base.toml` and the per-environment overlays.
    #[arg(long, global = true, env = "BOOKSTORE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Environment overlay to apply (local, staging, production).
    #[arg(long, global = true, env = "BOOKSTORE_ENV", default_value = "local")]
    env: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server until Ctrl+C or SIGTERM.
    Serve {
        /// Override the configured port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the merged OpenAPI document.
    Openapi {
        /// Write to a file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration. Secrets are omitted.
    Config,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let dir = self
            .config_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("config"));
        Settings::load_from(&dir, &self.env)
            .with_context(|| format!("failed to load settings from {}", dir.display()))
    }
}

fn main() -> anyhow::Result<()> {
    // A missing `.env` is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let mut settings = cli.settings()?;

    match cli.command {
        Command::Serve { port } => {
            bookstore_telemetry::init(&settings.telemetry)?;
            if let Some(port) = port {
                tracing::info!(port, "port overridden on the command line");
                settings.server.port = port;
            }
            let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            let app = App::build(settings)?;
            runtime.block_on(app.run(bookstore_http::shutdown_signal()))
        }
        Command::Openapi { output } => {
            // The document does not depend on stored data.
            settings.database.path = None;
            let document = serde_json::to_string_pretty(&App::build(settings)?.openapi())?;
            match output {
                Some(path) => std::fs::write(&path, document)
                    .with_context(|| format!("failed to write {}", path.display())),
                None => {
                    println!("{document}");
                    Ok(())
                }
            }
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}
