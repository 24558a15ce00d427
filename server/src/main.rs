use clap::Parser;
use log::info;
use server::config::SessionConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Maximum number of connected players
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Hits that end the session for players without their own threshold
    #[arg(long, default_value = "3")]
    hit_threshold: u32,

    /// Delay before a consumed projectile is removed
    #[arg(long, default_value = "50")]
    removal_grace_ms: u64,

    /// Minimum time between shots from one player
    #[arg(long, default_value = "500")]
    fire_cooldown_ms: u64,

    /// Lifetime of a projectile that never hits anything
    #[arg(long, default_value = "5000")]
    projectile_lifetime_ms: u64,

    /// Silence after which a player is dropped
    #[arg(long, default_value = "5000")]
    client_timeout_ms: u64,

    /// Maximum relayed action payload in bytes
    #[arg(long, default_value = "256")]
    max_action_len: usize,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let tick_duration = if self.tick_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / self.tick_rate as f64)
        };

        SessionConfig {
            default_hit_threshold: self.hit_threshold,
            removal_grace: Duration::from_millis(self.removal_grace_ms),
            fire_cooldown: Duration::from_millis(self.fire_cooldown_ms),
            projectile_lifetime: Duration::from_millis(self.projectile_lifetime_ms),
            client_timeout: Duration::from_millis(self.client_timeout_ms),
            max_clients: self.max_clients,
            max_action_len: self.max_action_len,
            tick_duration,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.session_config();
    let address = format!("{}:{}", args.host, args.port);

    info!(
        "Starting server on {} ({} Hz, {} hits to lose)",
        address, args.tick_rate, config.default_hit_threshold
    );

    let mut server = Server::new(&address, config).await?;
    let handle = server.handle();
    let mut server_task = tokio::spawn(async move { server.run().await });

    tokio::select! {
        result = &mut server_task => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
            server_task.await??;
        }
    }

    Ok(())
}
