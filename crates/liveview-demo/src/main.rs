//! # liveview-demo
//!
//! Multi-user chat built on the liveview runtime. Open the page in several
//! tabs, pick a nickname in each, and send public or private messages.

#![deny(unsafe_code)]

mod chat;
mod page;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use liveview_server::{LiveviewServer, config};
use liveview_settings::LiveviewSettings;

/// Liveview chat demo.
#[derive(Parser, Debug)]
#[command(name = "liveview-demo", about = "Multi-user chat served over liveview")]
struct Cli {
    /// Settings file (defaults to `~/.liveview/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long, short)]
    port: Option<u16>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn settings(&self) -> Result<LiveviewSettings> {
        let mut settings = match &self.config {
            Some(path) => liveview_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => liveview_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    if settings.logging.json {
        liveview_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        liveview_core::logging::init_subscriber(&settings.logging.level);
    }

    let metrics = liveview_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let (server_config, session_config) = config::from_settings(&settings);
    let page = page::render("liveview chat", &server_config.ws_path);
    let room = Arc::new(chat::ChatRoom::new());
    let server = LiveviewServer::new(server_config, session_config, chat::factory(room))
        .with_metrics(metrics)
        .with_page(page);

    let addr = server.listen().await.context("Failed to bind server")?;
    tracing::info!("liveview chat listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = server.close().await;
    tracing::info!(
        sessions_closed = report.sessions_closed,
        timed_out = report.timed_out,
        "Shutdown complete"
    );
    Ok(())
}
