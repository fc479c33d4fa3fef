use anyhow::Result;
use axum::Router;
use clap::Parser;
use folio_server::{build_app, open_state, spawn_orphan_sweeper, ServerOptions};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "folio-server", about = "HTTP search service over a folio library")]
struct Args {
    /// Library directory (index + uploads)
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    /// Engine config JSON; defaults to <data-dir>/folio.json when present
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Keep the index in memory
    #[arg(long, default_value_t = false)]
    memory: bool,
    /// Seconds between orphan sweeps
    #[arg(long, default_value_t = 60)]
    sweep_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let state = open_state(&ServerOptions { data_dir: args.data_dir.clone(), config: args.config.clone(), in_memory: args.memory })?;
    spawn_orphan_sweeper(state.engine.clone(), Duration::from_secs(args.sweep_secs.max(1)));
    let app: Router = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, data_dir = %args.data_dir.display(), in_memory = args.memory, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
