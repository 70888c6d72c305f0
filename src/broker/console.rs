//! Broker-local logging and the operator console (spec.md §4.8). The
//! original has no structured logging crate, just colored stdout lines
//! through `termcolor`'s `colored()`; this keeps the same texture with
//! `termion::color`, which is what `acquire` already uses for its own
//! board rendering (`game/company.rs`).

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::io::Write as _;

use termion::color::{self, Color};

use super::state::{ClientId, ClientRecord, ClientStatus, HostId, HostRecord};

pub fn colorize(text: &str, color: impl Color) -> String {
    format!("{}{}{}", color::Fg(color), text, color::Fg(color::Reset))
}

fn log(color: impl Color, text: &str) {
    println!("{}", colorize(text, color));
    let _ = std::io::stdout().flush();
}

pub fn log_green(text: &str) {
    log(color::Green, text);
}

pub fn log_cyan(text: &str) {
    log(color::Cyan, text);
}

pub fn log_blue(text: &str) {
    log(color::Blue, text);
}

pub fn log_yellow(text: &str) {
    log(color::Yellow, text);
}

pub fn log_red(text: &str) {
    log(color::Red, text);
}

pub fn log_magenta(text: &str) {
    log(color::Magenta, text);
}

/// A point-in-time copy of the matchmaker's state, cheap enough to build
/// under the lock and hand back to the console task to print without it.
pub struct Snapshot {
    pub clients: Vec<ClientSummary>,
    pub solo_queue_usernames: Vec<String>,
    pub dual_queue_usernames: Vec<String>,
    pub waiting_for_opponent: Option<String>,
    pub hosts_total: usize,
    pub free_hosts: usize,
    pub host_waiting_for_opponent: Option<String>,
    pub hosts_playing_solo: usize,
    pub hosts_playing_dual: usize,
}

pub struct ClientSummary {
    pub username: String,
    pub wins: u32,
    pub ties: u32,
    pub losses: u32,
}

impl Snapshot {
    pub fn capture(
        clients: &std::collections::HashMap<ClientId, ClientRecord>,
        hosts: &std::collections::HashMap<HostId, HostRecord>,
        solo_queue: &VecDeque<ClientId>,
        dual_queue: &VecDeque<ClientId>,
        free_hosts: &[HostId],
        waiting_dual_host: Option<HostId>,
    ) -> Self {
        let name_of = |id: &ClientId| clients[id].username.clone();

        let waiting_for_opponent = clients
            .values()
            .find(|c| c.status == ClientStatus::WaitingForOpponent)
            .map(|c| c.username.clone());

        let host_waiting_for_opponent = waiting_dual_host.map(|id| hosts[&id].address.clone());

        let hosts_playing_solo = hosts
            .values()
            .filter(|h| h.clients.len() == 1 && clients[&h.clients[0]].status == ClientStatus::PlayingSolo)
            .count();
        let hosts_playing_dual = hosts
            .values()
            .filter(|h| h.clients.len() == 2 && clients[&h.clients[0]].status == ClientStatus::PlayingDual)
            .count();

        Self {
            clients: clients
                .values()
                .map(|c| ClientSummary {
                    username: c.username.clone(),
                    wins: c.wins,
                    ties: c.ties,
                    losses: c.losses,
                })
                .collect(),
            solo_queue_usernames: solo_queue.iter().map(name_of).collect(),
            dual_queue_usernames: dual_queue.iter().map(name_of).collect(),
            waiting_for_opponent,
            hosts_total: hosts.len(),
            free_hosts: free_hosts.len(),
            host_waiting_for_opponent,
            hosts_playing_solo,
            hosts_playing_dual,
        }
    }

    fn print_queues_stat(&self) {
        let lines = [
            format!("Clients : {}", self.clients.len()),
            format!("Clients waiting for solo play : {:?}", self.solo_queue_usernames),
            format!("Clients waiting for dual play : {:?}", self.dual_queue_usernames),
            format!(
                "Client waiting for opponent : {}",
                self.waiting_for_opponent.as_deref().unwrap_or("-")
            ),
            format!("Hosts : {}", self.hosts_total),
            format!("Free hosts : {}", self.free_hosts),
            format!(
                "Host waiting for opponent : {}",
                self.host_waiting_for_opponent.as_deref().unwrap_or("-")
            ),
            format!("Hosts playing solo game : {}", self.hosts_playing_solo),
            format!("Hosts playing dual game : {}", self.hosts_playing_dual),
        ];
        let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 2;

        let mut out = String::new();
        let _ = writeln!(out, "\u{250f}\u{2501} Queues Stat {}\u{2513}", "\u{2501}".repeat(width.saturating_sub(13)));
        for line in &lines {
            let _ = writeln!(out, "\u{2503} {line:<width$}\u{2503}", width = width - 1);
        }
        let _ = write!(out, "\u{2517}{}\u{251b}", "\u{2501}".repeat(width + 1));
        log_magenta(&out);
    }

    fn print_scoreboard(&self) {
        let mut sorted: Vec<&ClientSummary> = self.clients.iter().collect();
        sorted.sort_by(|a, b| {
            b.wins
                .cmp(&a.wins)
                .then(b.ties.cmp(&a.ties))
                .then(a.losses.cmp(&b.losses))
                .then(a.username.cmp(&b.username))
        });

        let mut out = String::new();
        let _ = writeln!(out, "{:<4} {:<16} {:>4} {:>4} {:>6}", "Rank", "Username", "Wins", "Ties", "Losses");
        for (rank, c) in sorted.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:<4} {:<16} {:>4} {:>4} {:>6}",
                rank + 1,
                c.username,
                c.wins,
                c.ties,
                c.losses
            );
        }
        log_magenta(out.trim_end());
    }
}

const HELP_MENU: &str = "\u{250f}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501} Help Menu \u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2513}\n\
\u{2523}\u{2501}\u{2501} /users : Number of online users    \u{2503}\n\
\u{2523}\u{2501}\u{2501} /qstat : Stats about queues        \u{2503}\n\
\u{2523}\u{2501}\u{2501} /scoreboard : Scoreboard           \u{2503}\n\
\u{2517}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{251b}";

/// Reads operator commands from stdin for the lifetime of the broker
/// process (spec.md §4.8). Runs as its own task alongside the TCP accept
/// loop.
pub async fn run(broker: crate::broker::state::Broker) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    log_green("Broker initialized successfully. See /help for list of commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "/users" => log_magenta(&format!("Users online: {}", broker.client_count())),
            "/qstat" => broker.snapshot().print_queues_stat(),
            "/scoreboard" => broker.snapshot().print_scoreboard(),
            "/help" => log_yellow(HELP_MENU),
            _ => log_red("Invalid command. See /help for the list of commands."),
        }
    }
}
