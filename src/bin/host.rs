use clap::Parser;
use termion::color;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

use tactoe_net::broker::console as broker_console;
use tactoe_net::game::{Game, Mark, HELP_BOARD};
use tactoe_net::messages::{ClientDescriptor, Message};
use tactoe_net::wire;

/// A game host process: connects to the broker, is handed one match at a
/// time, and runs the Tic-Tac-Toe rule engine for it (spec.md §4.5,
/// recovered features in SPEC_FULL.md §C).
#[derive(Parser, Debug)]
#[command(name = "host", version, about = "Tic-Tac-Toe game host")]
struct Cli {
    /// Overrides the HOST environment variable (the broker's address).
    #[arg(long)]
    host: Option<String>,

    /// Overrides the PORT environment variable.
    #[arg(long)]
    port: Option<u16>,
}

fn colorize(text: &str, color: impl color::Color) -> String {
    format!("{}{}{}", color::Fg(color), text, color::Fg(color::Reset))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Waiting,
    PlayingSolo,
    PlayingDual,
}

struct GameServer {
    status: Status,
    clients: Vec<ClientDescriptor>,
    game: Option<Game>,
}

impl GameServer {
    fn new() -> Self {
        Self {
            status: Status::Waiting,
            clients: Vec::new(),
            game: None,
        }
    }

    fn client_by_address(&self, address: &str) -> Option<&ClientDescriptor> {
        self.clients.iter().find(|c| c.address == address)
    }

    fn opponent_label(&self) -> &str {
        if self.clients.len() == 2 {
            self.clients[1].username.as_str()
        } else {
            "Computer"
        }
    }

    fn board_and_turn_string(&self) -> String {
        let game = self.game.as_ref().expect("game in progress");
        let mut out = game.to_string();
        out.push('\n');
        out.push_str(&format!(
            "{}: X | {}: O\n",
            self.clients[0].username,
            self.opponent_label()
        ));
        match self.status {
            Status::PlayingSolo => {
                if game.turn() == Mark::X {
                    out.push_str(&format!("Turn: {}", self.clients[0].username));
                } else {
                    out.push_str("Turn: Computer");
                }
            }
            _ => {
                let idx = if game.turn() == Mark::X { 0 } else { 1 };
                out.push_str(&format!("Turn: {}", self.clients[idx].username));
            }
        }
        out.push('\n');
        out
    }

    fn turn_client_address(&self) -> Option<&str> {
        let game = self.game.as_ref()?;
        match self.status {
            Status::PlayingSolo => {
                if game.turn() == Mark::X {
                    Some(self.clients[0].address.as_str())
                } else {
                    None
                }
            }
            Status::PlayingDual => {
                let idx = if game.turn() == Mark::X { 0 } else { 1 };
                Some(self.clients[idx].address.as_str())
            }
            Status::Waiting => None,
        }
    }

    fn help_string(&self) -> String {
        format!(
            "{}Use the command \"/put (x, y)\" to put your sign on the board.\nUse the command \"/msg message\" to send your message\n",
            HELP_BOARD
        )
    }

    fn reset(&mut self) {
        self.status = Status::Waiting;
        self.clients.clear();
        self.game = None;
    }
}

/// Parses `/put (x, y)`, mirroring the original's `PUT_COMMAND_REGEX`
/// (`^\/put \((\d+), (\d+)\)$`) exactly: each coordinate must be a bare
/// digit group, so a leading `-` doesn't match and falls through to the
/// generic invalid-command reply instead of "Invalid coord!".
fn parse_put(text: &str) -> Option<(i32, i32)> {
    let inner = text.strip_prefix("/put (")?.strip_suffix(')')?;
    let (x, y) = inner.split_once(", ")?;
    if !x.chars().all(|c| c.is_ascii_digit()) || !y.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let x: i32 = x.parse().ok()?;
    let y: i32 = y.parse().ok()?;
    Some((x, y))
}

/// Parses `/msg <text>`, mirroring `MSG_COMMAND_REGEX`.
fn parse_msg(text: &str) -> Option<&str> {
    text.strip_prefix("/msg ")
}

enum Outbound {
    ToClient(String, String),
    EndGame { is_tie: bool, winner_address: Option<String> },
}

impl GameServer {
    fn init_solo(&mut self, client: ClientDescriptor) -> Vec<Outbound> {
        self.clients = vec![client];
        self.status = Status::PlayingSolo;
        let first_turn = rand::random::<bool>() as u8 + 1;
        let mut game = Game::new(first_turn);

        let mut log_lines = Vec::new();
        if game.turn() == Mark::O {
            let (x, y) = game.random_play();
            log_lines.push(format!("Computer played random move /put ({x}, {y})"));
        }
        self.game = Some(game);

        for line in log_lines {
            broker_console::log_cyan(&line);
        }

        let text = format!(
            "{}{}",
            colorize("Game started. Enjoy!\n", color::Green),
            colorize(&self.board_and_turn_string(), color::Blue)
        );
        vec![Outbound::ToClient(self.clients[0].address.clone(), text)]
    }

    fn init_dual(&mut self, clients: [ClientDescriptor; 2]) -> Vec<Outbound> {
        self.clients = clients.to_vec();
        self.status = Status::PlayingDual;
        let first_turn = rand::random::<bool>() as u8 + 1;
        self.game = Some(Game::new(first_turn));

        let text = format!(
            "{}{}",
            colorize("Game started. Enjoy!\n", color::Green),
            colorize(&self.board_and_turn_string(), color::Blue)
        );
        self.clients
            .iter()
            .map(|c| Outbound::ToClient(c.address.clone(), text.clone()))
            .collect()
    }

    fn help(&self, client_address: &str) -> Vec<Outbound> {
        vec![Outbound::ToClient(
            client_address.to_string(),
            colorize(&self.help_string(), color::Yellow),
        )]
    }

    fn broadcast(&self, from_address: &str, text: &str) -> Vec<Outbound> {
        let Some(sender) = self.client_by_address(from_address) else {
            return Vec::new();
        };
        let line = format!("{}: {}\n", sender.username, text);
        self.clients
            .iter()
            .map(|c| Outbound::ToClient(c.address.clone(), line.clone()))
            .collect()
    }

    /// Applies an accepted move, runs the computer's reply in solo matches,
    /// and reports game-end. Returns both the outbound traffic and whether
    /// the match just ended (so the caller knows to reset local state).
    fn check_end_of_game(&mut self) -> (Vec<Outbound>, bool) {
        let game = self.game.as_ref().unwrap();
        if !game.is_finished() {
            return (Vec::new(), false);
        }

        let mut out = Vec::new();
        if game.is_draw() {
            for c in &self.clients {
                out.push(Outbound::ToClient(
                    c.address.clone(),
                    colorize("Game finished. Result: Tie\n", color::Cyan),
                ));
            }
            out.push(Outbound::EndGame { is_tie: true, winner_address: None });
        } else {
            let winner_mark = game.winner().unwrap();
            match self.status {
                Status::PlayingSolo => {
                    let human_won = winner_mark == Mark::X;
                    let verb = if human_won { "won" } else { "lost" };
                    out.push(Outbound::ToClient(
                        self.clients[0].address.clone(),
                        colorize(&format!("Game finished. You {verb} the game!\n"), color::Cyan),
                    ));
                    out.push(Outbound::EndGame {
                        is_tie: false,
                        winner_address: human_won.then(|| self.clients[0].address.clone()),
                    });
                }
                Status::PlayingDual => {
                    let winner_idx = if winner_mark == Mark::X { 0 } else { 1 };
                    for (idx, c) in self.clients.iter().enumerate() {
                        let text = if idx == winner_idx {
                            "Game finished. You won the game!\n"
                        } else {
                            "Game finished. You lost the game!\n"
                        };
                        out.push(Outbound::ToClient(c.address.clone(), colorize(text, color::Cyan)));
                    }
                    out.push(Outbound::EndGame {
                        is_tie: false,
                        winner_address: Some(self.clients[winner_idx].address.clone()),
                    });
                }
                Status::Waiting => unreachable!("a finished game implies a match is in progress"),
            }
        }
        (out, true)
    }

    fn handle_put(&mut self, client_address: &str, x: i32, y: i32) -> Vec<Outbound> {
        let Some(turn_address) = self.turn_client_address() else {
            return vec![Outbound::ToClient(
                client_address.to_string(),
                colorize("It's not your turn to play!\n", color::Red),
            )];
        };
        if turn_address != client_address {
            return vec![Outbound::ToClient(
                client_address.to_string(),
                colorize("It's not your turn to play!\n", color::Red),
            )];
        }

        let game = self.game.as_mut().unwrap();
        if !Game::is_coord_valid(x, y) {
            return vec![Outbound::ToClient(
                client_address.to_string(),
                colorize("Invalid coord! See /help for more help.\n", color::Red),
            )];
        }
        if !game.is_cell_empty(x as usize, y as usize) {
            return vec![Outbound::ToClient(
                client_address.to_string(),
                colorize("The cell is already filled. Try another one\n", color::Red),
            )];
        }

        game.put(x, y).expect("coord validated above");

        let (mut out, mut finished) = self.check_end_of_game();
        if !finished && self.status == Status::PlayingSolo {
            let (x_new, y_new) = self.game.as_mut().unwrap().random_play();
            broker_console::log_blue(&format!("Computer played random move /put ({x_new}, {y_new})"));
            let (end_out, end_finished) = self.check_end_of_game();
            out.extend(end_out);
            finished = end_finished;
        }
        if !finished {
            let text = colorize(&self.board_and_turn_string(), color::Blue);
            for c in &self.clients {
                out.push(Outbound::ToClient(c.address.clone(), text.clone()));
            }
        } else {
            self.reset();
        }
        out
    }

    fn update_client(&mut self, client: ClientDescriptor) -> Vec<Outbound> {
        let Some(idx) = self.clients.iter().position(|c| c.username == client.username) else {
            return Vec::new();
        };
        self.clients[idx] = client.clone();

        let text = format!(
            "{}{}",
            colorize("Reconnected to the server!\n", color::Green),
            colorize(&self.board_and_turn_string(), color::Blue)
        );
        vec![Outbound::ToClient(client.address, text)]
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

    let stream = TcpStream::connect((host.as_str(), port)).await?;
    let mut reader = BufReader::new(stream);

    wire::send_message(reader.get_mut(), &Message::ServerInit).await?;

    let mut greeting = String::new();
    reader.read_line(&mut greeting).await?;
    print!("{greeting}");

    let mut server = GameServer::new();

    loop {
        let message = match wire::recv_message(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(_) => break,
        };

        let outbound = match (server.status, message) {
            (Status::Waiting, Message::StartSolo { client }) => server.init_solo(client),
            (Status::Waiting, Message::StartDual { clients }) => server.init_dual(clients),
            (Status::Waiting, _) => {
                broker_console::log_red(
                    "Invalid message type. It should be either StartSolo or StartDual.",
                );
                Vec::new()
            }
            (_, Message::ForceTerminate) => {
                server.reset();
                Vec::new()
            }
            (_, Message::UpdateClient { client }) => server.update_client(client),
            (_, Message::ClientToServer { client_address, text }) => {
                if text == "/help" {
                    server.help(&client_address)
                } else if let Some(content) = parse_msg(&text) {
                    server.broadcast(&client_address, content)
                } else if let Some((x, y)) = parse_put(&text) {
                    server.handle_put(&client_address, x, y)
                } else {
                    vec![Outbound::ToClient(
                        client_address,
                        colorize("Invalid command. See /help for more help\n", color::Red),
                    )]
                }
            }
            (_, _) => {
                broker_console::log_red("Invalid message type. It should be ClientToServerMessage");
                Vec::new()
            }
        };

        for item in outbound {
            let result = match item {
                Outbound::ToClient(client_address, text) => {
                    wire::send_message(reader.get_mut(), &Message::ServerToClient { client_address, text }).await
                }
                Outbound::EndGame { is_tie, winner_address } => {
                    wire::send_message(reader.get_mut(), &Message::EndGame { is_tie, winner_address }).await
                }
            };
            if result.is_err() {
                return Ok(());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_put_command() {
        assert_eq!(parse_put("/put (1, 2)"), Some((1, 2)));
        assert_eq!(parse_put("/put (0, 0)"), Some((0, 0)));
        assert_eq!(parse_put("/put (1,2)"), None);
        assert_eq!(parse_put("/solo"), None);
    }

    #[test]
    fn rejects_negative_coordinates_like_the_original_regex_does() {
        assert_eq!(parse_put("/put (-1, 0)"), None);
        assert_eq!(parse_put("/put (0, -1)"), None);
        assert_eq!(parse_put("/put (-1, -1)"), None);
    }

    #[test]
    fn parses_msg_command() {
        assert_eq!(parse_msg("/msg hello there"), Some("hello there"));
        assert_eq!(parse_msg("/msg "), Some(""));
        assert_eq!(parse_msg("/put (1, 2)"), None);
    }

    #[test]
    fn solo_board_string_names_computer_as_opponent() {
        let mut server = GameServer::new();
        server.clients = vec![ClientDescriptor {
            username: "alice".into(),
            address: "1.1.1.1:1".into(),
        }];
        server.status = Status::PlayingSolo;
        server.game = Some(Game::new(1));
        let rendered = server.board_and_turn_string();
        assert!(rendered.contains("Computer"));
        assert!(rendered.contains("Turn: alice"));
    }
}
