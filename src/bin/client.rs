use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use tactoe_net::messages::Message;
use tactoe_net::wire;

/// The terminal front-end: a thin username-negotiation handshake followed
/// by two independent loops, one printing whatever the broker sends and
/// one forwarding typed lines as `ClientMessage` frames (spec.md §4.6).
#[derive(Parser, Debug)]
#[command(name = "client", version, about = "Tic-Tac-Toe terminal client")]
struct Cli {
    /// Overrides the HOST environment variable (the broker's address).
    #[arg(long)]
    host: Option<String>,

    /// Overrides the PORT environment variable.
    #[arg(long)]
    port: Option<u16>,

    /// Skips the interactive username prompt.
    #[arg(long)]
    username: Option<String>,
}

async fn prompt_username(stdin: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>) -> std::io::Result<String> {
    loop {
        print!("Username: ");
        std::io::Write::flush(&mut std::io::stdout())?;
        let Some(line) = stdin.next_line().await? else {
            std::process::exit(0);
        };
        if !line.trim().is_empty() {
            return Ok(line);
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let host = cli.host.or_else(|| std::env::var("HOST").ok()).unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = cli
        .port
        .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .expect("PORT must be set via --port or the PORT environment variable");

    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut username = match cli.username {
        Some(username) if !username.trim().is_empty() => username,
        _ => prompt_username(&mut stdin_lines).await?,
    };

    let mut stream = TcpStream::connect((host.as_str(), port)).await?;

    loop {
        wire::send_message(&mut stream, &Message::ClientInit { username: username.clone() }).await?;
        match wire::recv_message(&mut stream).await {
            Ok(Some(Message::ClientInitResponse { is_valid: true, .. })) => break,
            Ok(Some(Message::ClientInitResponse { is_valid: false, message })) => {
                print!("{message}");
                username = prompt_username(&mut stdin_lines).await?;
            }
            _ => {
                eprintln!("The broker didn't follow the initialization protocol. Connection closed.");
                return Ok(());
            }
        }
    }

    let (mut read_half, mut write_half) = stream.into_split();

    let receive_task = tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => print!("{}", String::from_utf8_lossy(&buf[..n])),
            }
        }
    });

    loop {
        let Some(line) = stdin_lines.next_line().await? else {
            break;
        };
        if line == "/exit" {
            break;
        }
        if wire::send_message(&mut write_half, &Message::ClientMessage { text: line }).await.is_err() {
            break;
        }
    }

    let _ = write_half.shutdown().await;
    receive_task.abort();
    let _ = receive_task.await;

    println!("Good bye!");
    Ok(())
}
