use clap::Parser;
use tokio::net::TcpListener;

use tactoe_net::broker::{self, Broker};

/// The matchmaker process. Clients and game hosts both dial this address;
/// the first frame on each connection says which one they are.
#[derive(Parser, Debug)]
#[command(name = "broker", version, about = "Tic-Tac-Toe matchmaking broker")]
struct Cli {
    /// Overrides the HOST environment variable.
    #[arg(long)]
    host: Option<String>,

    /// Overrides the PORT environment variable.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let host = cli.host.or_else(|| std::env::var("HOST").ok()).unwrap_or_else(|| "0.0.0.0".to_string());
    let port: u16 = cli
        .port
        .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .expect("PORT must be set via --port or the PORT environment variable");

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    broker::console::log_green(&format!("Socket initialized successfully on {host}:{port}"));

    let broker = Broker::new();

    let console_broker = broker.clone();
    tokio::spawn(async move {
        broker::console::run(console_broker).await;
    });

    loop {
        let (stream, _addr) = listener.accept().await?;
        let broker = broker.clone();
        tokio::spawn(async move {
            broker::accept(stream, broker).await;
        });
    }
}
