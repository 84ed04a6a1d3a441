use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::heartbeat::run_heartbeat;
use server::server::Server;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "server.json")]
    config: PathBuf,

    /// Address to bind to, overriding the config file
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on, overriding the config file
    #[arg(short, long)]
    port: Option<u16>,
}

/// Parses arguments, loads the config and runs the server until Ctrl+C.
/// Lines typed on stdin are broadcast as server announcements.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = ServerConfig::load_or_create(&args.config)?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate();

    let server = Server::new(config)?;
    let listener = server.bind().await?;
    info!(
        "Serving '{}' ({}/{} players)",
        server.name(),
        server.player_count(),
        server.max_users()
    );

    let scheduler_handle = server.spawn_scheduler();

    if server.is_public() {
        tokio::spawn(run_heartbeat(Arc::clone(&server)));
    }

    let server_handle = tokio::spawn(Arc::clone(&server).serve(listener));

    let console_handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if !line.trim().is_empty() => {
                        server.announce(line.trim());
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read console input: {}", e);
                        break;
                    }
                }
            }
        })
    };

    tokio::select! {
        result = server_handle => {
            if let Err(e) = result {
                error!("Accept loop panicked: {}", e);
            }
        }
        result = scheduler_handle => {
            if let Err(e) = result {
                error!("Scheduler panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    console_handle.abort();
    Ok(())
}
