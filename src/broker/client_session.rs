//! Per-connection client handler. Mirrors `_handle_client` from the
//! original, split into the three phases spec.md §4.3 names explicitly:
//!
//! - Phase A: read the initial `ClientInit` frame.
//! - Phase B: validate/negotiate a username, looping on rejection.
//! - Phase C: menu and in-game command routing for the life of the
//!   connection.

use tokio::io::BufReader;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;

use crate::broker::console;
use crate::broker::state::{
    Admission, AdmitResult, Broker, ClientId, ClientStatus, GameKind, PostDisconnect,
    TERMINATE_POLL_MILLIS, TERMINATE_TIMEOUT_SECS,
};
use crate::messages::Message;
use crate::wire::{self, WireError};

/// Drives a client connection from Phase B onward. `init_username` is the
/// username from the `ClientInit` frame the acceptor already read to decide
/// this was a client connection rather than a host one (spec.md §4.2).
pub async fn handle(stream: TcpStream, broker: Broker, init_username: String) {
    let address = match stream.peer_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => return,
    };

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let (username, client_id, generation, admission) =
        match negotiate_username(&mut reader, &mut write_half, &broker, &address, &tx, init_username).await {
            Some(result) => result,
            None => return,
        };

    let writer_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if wire::write_text(&mut write_half, &text).await.is_err() {
                break;
            }
        }
    });

    let _ = tx.send(console::colorize(
        "Successfully connected to the WebServer.\n",
        termion::color::Green,
    ));
    if admission == Admission::New {
        broker.send_menu(client_id);
    }
    console::log_blue(&format!(
        "{} client \"{username}\" [{address}]",
        if admission == Admission::New { "New" } else { "Reconnected" }
    ));

    run(&mut reader, &broker, client_id, generation, &username).await;

    drop(tx);
    let _ = writer_task.await;
}

/// Phase B: validates and admits `username` (already read from the
/// `ClientInit` frame) in one lock-held `Broker::admit` call per attempt, so
/// there is no window between checking availability and claiming the name
/// for two connections to race through (spec.md §9 / SPEC_FULL.md §D).
/// Loops on rejection. Returns the accepted username plus the admission
/// outcome, or `None` if the connection should be dropped (protocol
/// violation or early close).
async fn negotiate_username(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    write_half: &mut OwnedWriteHalf,
    broker: &Broker,
    address: &str,
    sink: &UnboundedSender<String>,
    username: String,
) -> Option<(String, ClientId, u64, Admission)> {
    let mut username = username;

    loop {
        match broker.admit(username.clone(), address.to_string(), sink.clone()) {
            AdmitResult::Rejected => {
                let rejection = Message::ClientInitResponse {
                    is_valid: false,
                    message: console::colorize("Username already exists. Try another one\n", termion::color::Red),
                };
                if wire::send_message(write_half, &rejection).await.is_err() {
                    return None;
                }
                match wire::recv_message(reader).await {
                    Ok(Some(Message::ClientInit { username: next })) => username = next,
                    _ => {
                        console::log_red("Incoming client didn't follow the initialization protocol. Connection closed");
                        return None;
                    }
                }
            }
            AdmitResult::Admitted { client_id, generation, admission } => {
                let accepted = Message::ClientInitResponse {
                    is_valid: true,
                    message: console::colorize("Username accepted by the webserver", termion::color::Green),
                };
                wire::send_message(write_half, &accepted).await.ok()?;
                return Some((username, client_id, generation, admission));
            }
        }
    }
}

/// Phase C: the connection's steady-state command loop.
async fn run(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    broker: &Broker,
    client_id: ClientId,
    generation: u64,
    username: &str,
) {
    loop {
        let received = wire::recv_message(reader).await;
        match received {
            Ok(Some(Message::ClientMessage { text })) => {
                dispatch(broker, client_id, &text);
            }
            Ok(Some(_)) => {
                console::log_red("Wrong message type from client. It should be ClientMessage");
                break;
            }
            Ok(None) => break,
            Err(WireError::Io(_)) | Err(WireError::UnexpectedEof) => break,
            Err(_) => {
                console::log_red(&format!("Malformed frame from client \"{username}\""));
                break;
            }
        }
    }

    match broker.disconnect(client_id, generation) {
        PostDisconnect::Nothing => {}
        PostDisconnect::SpawnTimeoutSupervisor { client_id, generation } => {
            let broker = broker.clone();
            tokio::spawn(async move { supervise_timeout(broker, client_id, generation).await });
        }
    }
    console::log_red(&format!("Client \"{username}\" disconnected."));
}

fn dispatch(broker: &Broker, client_id: ClientId, text: &str) {
    if text == "/users" {
        broker.send_to_client(
            client_id,
            console::colorize(&format!("Users online: {}\n", broker.client_count()), termion::color::Magenta),
        );
        return;
    }

    let Some(status) = broker.client_status(client_id) else {
        return;
    };

    match status {
        ClientStatus::InMenu => match text {
            "/solo" => broker.request_game(client_id, GameKind::Solo),
            "/dual" => broker.request_game(client_id, GameKind::Dual),
            _ => {
                broker.send_to_client(
                    client_id,
                    format!("{}{}", console::colorize("Invalid input\n", termion::color::Red), Broker::menu_text()),
                );
            }
        },
        ClientStatus::PlayingSolo | ClientStatus::PlayingDual => {
            broker.forward_to_host(client_id, text.to_string());
        }
        ClientStatus::WaitingForSolo | ClientStatus::WaitingForDual | ClientStatus::WaitingForOpponent => {
            if text == "/exchange" {
                if broker.exchange(client_id).is_ok() {
                    broker.send_to_client(client_id, Broker::menu_text());
                }
            } else {
                broker.send_to_client(
                    client_id,
                    console::colorize(
                        "You will be assigned to a server ASAP. Please wait... (/exchange to change the playing mode)\n",
                        termion::color::Cyan,
                    ),
                );
            }
        }
    }
}

/// The 20s/0.5s-poll grace window for a client whose connection dropped
/// mid-match (spec.md §4.7).
async fn supervise_timeout(broker: Broker, client_id: ClientId, generation: u64) {
    let username = broker.username_of(client_id).unwrap_or_default();
    console::log_yellow(&format!(
        "Client \"{username}\" timed out while playing. It will be removed after {TERMINATE_TIMEOUT_SECS} seconds"
    ));

    let ticks = (TERMINATE_TIMEOUT_SECS * 1000) / TERMINATE_POLL_MILLIS;
    for _ in 0..ticks {
        tokio::time::sleep(std::time::Duration::from_millis(TERMINATE_POLL_MILLIS)).await;
        if broker.poll_timeout(client_id, generation) {
            console::log_yellow(&format!(
                "Timed out client \"{username}\" returned to the server and won't be removed."
            ));
            return;
        }
    }

    broker.expire_timeout(client_id, generation);
}
