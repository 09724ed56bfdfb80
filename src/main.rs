//! tinydice server binary.
//!
//! Parses flags, sets up logging, builds the runtime the chosen engine wants,
//! and serves until Ctrl+C.

use clap::Parser;
use std::time::Duration;
use tinydice::config::{MAX_CONNECTIONS, READ_BUFFER_SIZE};
use tinydice::{CommandTable, Mode, Reactor, ServerConfig, ThreadedServer, DEFAULT_HOST, DEFAULT_PORT};
use tokio::runtime::{Builder, Runtime};
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tinydice", version, about = "In-memory key-value server speaking RESP")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Connection engine: threaded (task per client) or reactor (single task)
    #[arg(short, long, default_value = "threaded")]
    mode: Mode,
    /// Milliseconds between active expiry cycles
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    cron_interval_ms: u64,
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            mode: args.mode,
            cron_interval: Duration::from_millis(args.cron_interval_ms),
            max_connections: args.max_connections,
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
tinydice v{}
──────────────────────────────────────
Listening on {} ({} engine)
Use Ctrl+C to shut down.
"#,
        tinydice::VERSION,
        config.bind_address(),
        config.mode
    );
}

fn runtime_for(mode: Mode) -> std::io::Result<Runtime> {
    match mode {
        Mode::Threaded => Builder::new_multi_thread().enable_all().build(),
        Mode::Reactor => Builder::new_current_thread().enable_all().build(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Shutdown signal received, stopping server...");
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let table = CommandTable::with_keyspace();
    match config.mode {
        Mode::Threaded => {
            let server = ThreadedServer::bind(config, table).await?;
            server.run(shutdown_signal()).await;
        }
        Mode::Reactor => {
            let reactor = Reactor::bind(config, table).await?;
            let store = reactor.run(shutdown_signal()).await;
            info!(keys = store.len(), "Reactor released the keyspace");
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tinydice=info".into()),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from(Args::parse());
    print_banner(&config);

    runtime_for(config.mode)?.block_on(serve(config))?;

    info!("Server shutdown complete");
    Ok(())
}
