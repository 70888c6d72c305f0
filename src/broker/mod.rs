pub mod client_session;
pub mod console;
pub mod host_session;
pub mod state;

pub use state::Broker;

use tokio::net::TcpStream;

use crate::messages::Message;
use crate::wire;

/// Reads a new connection's first frame and routes it to the client or
/// host handler, per spec.md §4.2 ("accept & classify"). Anything else
/// gets a plain-text rejection and the socket is dropped.
pub async fn accept(mut stream: TcpStream, broker: Broker) {
    match wire::recv_message(&mut stream).await {
        Ok(Some(Message::ServerInit)) => host_session::handle(stream, broker).await,
        Ok(Some(Message::ClientInit { username })) => client_session::handle(stream, broker, username).await,
        _ => {
            let _ = wire::write_text(
                &mut stream,
                &console::colorize(
                    "Invalid initialization message type. It should be either ServerInit or ClientInit.\n",
                    termion::color::Red,
                ),
            )
            .await;
        }
    }
}
