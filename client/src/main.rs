use clap::Parser;
use client::network::{Client, ConnectPolicy};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Ask the server for a personal hit threshold
    #[arg(long)]
    hit_threshold: Option<u32>,

    /// Connect attempts before giving up
    #[arg(long, default_value = "5")]
    connect_attempts: u32,

    /// Wait per connect attempt in milliseconds
    #[arg(long, default_value = "500")]
    connect_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    println!("Commands: fire|lob [x y], hit <id>, say <text>, r, roster, reset, quit");

    let policy = ConnectPolicy {
        attempts: args.connect_attempts,
        attempt_timeout: Duration::from_millis(args.connect_timeout_ms),
    };

    let mut client = Client::new(&args.server, args.fake_ping, args.hit_threshold).await?;
    client.run(policy).await?;

    Ok(())
}
