//! Per-connection game host handler (the broker's side of spec.md §4.5).
//! A host only ever says three things to the broker: "a match ended", "pass
//! this text to client X", or (implicitly, by disconnecting) "I died".

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::broker::console;
use crate::broker::state::Broker;
use crate::messages::Message;
use crate::wire;

pub async fn handle(stream: TcpStream, broker: Broker) {
    let address = match stream.peer_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => return,
    };

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    if wire::write_text(
        &mut write_half,
        &console::colorize("Successfully connected to the WebServer.\n", termion::color::Green),
    )
    .await
    .is_err()
    {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if wire::send_message(&mut write_half, &message).await.is_err() {
                break;
            }
        }
    });

    let host_id = broker.register_host(address.clone(), tx.clone());
    console::log_blue(&format!("New host connected [{address}]"));

    loop {
        match wire::recv_message(&mut reader).await {
            Ok(Some(Message::EndGame { is_tie, winner_address })) => {
                broker.handle_end_game(host_id, is_tie, winner_address);
                console::log_green(&format!("Match on host {address} ended"));
            }
            Ok(Some(Message::ServerToClient { client_address, text })) => {
                broker.route_to_client(&client_address, text);
            }
            Ok(Some(_)) => {
                console::log_red("Wrong message type from host. It should be EndGame or ServerToClient");
            }
            Ok(None) | Err(_) => break,
        }
    }

    drop(tx);
    let _ = writer_task.await;
    broker.host_disconnected(host_id);
    console::log_red(&format!("Host [{address}] disconnected."));
}
