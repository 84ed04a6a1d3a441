use clap::Parser;
use client::network::{describe, Client};
use log::{debug, error, info};
use protocol::ServerPacket;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:25565")]
    server: String,

    /// Username to log in with
    #[arg(short = 'u', long, default_value = "Player")]
    username: String,

    /// Verification token; any value works when the server does not verify
    #[arg(short = 'm', long, default_value = "-")]
    mppass: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Connecting to {} as {}", args.server, args.username);
    let mut client = Client::connect(&args.server, &args.username, &args.mppass).await?;
    let level = client.receive_level().await?;
    info!(
        "Joined '{}' ({}x{}x{})",
        client.info().name,
        level.size.0,
        level.size.1,
        level.size.2
    );
    info!("Type a line to chat; Ctrl+C to quit");

    let (mut reader, mut sender) = client.into_split();

    let inbound = tokio::spawn(async move {
        loop {
            match ServerPacket::read(&mut reader).await {
                Ok(ServerPacket::Message { text, .. }) => println!("{}", text),
                Ok(ServerPacket::Disconnect { reason }) => {
                    println!("Disconnected: {}", reason);
                    break;
                }
                Ok(packet) => debug!("Received {}", describe(&packet)),
                Err(e) => {
                    error!("Connection lost: {}", e);
                    break;
                }
            }
        }
    });

    let outbound = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            if let Err(e) = sender.send_message(&line).await {
                error!("Failed to send message: {}", e);
                break;
            }
        }
    });

    tokio::select! {
        _ = inbound => {}
        _ = outbound => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, disconnecting...");
        }
    }

    Ok(())
}
