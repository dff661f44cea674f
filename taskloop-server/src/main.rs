//! Agent server: exposes the task loop over HTTP and WebSocket.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use taskloop::io::config::{DEFAULT_CONFIG_FILE, load_config};
use taskloop::io::model::build_model;
use taskloop::io::tools::ToolRegistry;
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "taskloop-server")]
#[command(about = "HTTP/WebSocket front end for the taskloop agent")]
struct Args {
    /// Config file (missing file means defaults)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Address to bind, overriding `server.bind`
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on, overriding `server.port`
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("taskloop_server=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let cfg = load_config(&args.config)?;
    let bind = args.bind.unwrap_or_else(|| cfg.server.bind.clone());
    let port = args.port.unwrap_or(cfg.server.port);
    let backend = format!("{:?}", cfg.model.backend).to_lowercase();

    // Blocking HTTP clients must be built off the async runtime.
    let model_cfg = cfg.clone();
    let model = tokio::task::spawn_blocking(move || build_model(&model_cfg))
        .await
        .context("build model")??;
    let tools = ToolRegistry::from_config(&cfg.tools);
    info!(backend = %backend, tools = ?tools.names(), "starting taskloop-server");

    let state = AppState::new(Arc::from(model), tools, cfg.loop_.clone(), backend);
    let app = routes::app(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
