//! The matchmaker core: client/host records, queues, and the assignment
//! algorithms that wire them together (spec.md §3, §4.4). Everything here
//! is synchronous and runs under a single broker-wide mutex — mirrors the
//! original's one `threading.Lock` guarding all of `WebServer`'s mutable
//! state (spec.md §5). Methods never `.await`; they only ever push onto
//! unbounded channels, so holding the lock across a method body is cheap.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use crate::messages::{ClientDescriptor, Message};

pub const TERMINATE_TIMEOUT_SECS: u64 = 20;
pub const TERMINATE_POLL_MILLIS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    InMenu,
    WaitingForSolo,
    WaitingForDual,
    WaitingForOpponent,
    PlayingSolo,
    PlayingDual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameKind {
    Solo,
    Dual,
}

/// Whether a Phase B admission created a brand new client record or took
/// over an existing TIMEOUT one. Resolves spec.md §9's flagged ambiguity
/// about the membership test after a username has already been validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    New,
    Reconnect,
}

/// Outcome of a single `Broker::admit` call. The availability check and the
/// admission itself happen under the same lock acquisition, so there is no
/// window between "is this username free" and "claim it" for two concurrent
/// connections to race through (spec.md §9 / SPEC_FULL.md §D).
pub enum AdmitResult {
    Admitted {
        client_id: ClientId,
        generation: u64,
        admission: Admission,
    },
    /// The username is held by an ONLINE client. Nothing was mutated; the
    /// caller should reject this attempt and try another username.
    Rejected,
}

pub struct ClientRecord {
    pub id: ClientId,
    pub username: String,
    pub address: String,
    pub status: ClientStatus,
    pub connectivity: Connectivity,
    pub wins: u32,
    pub ties: u32,
    pub losses: u32,
    pub host: Option<HostId>,
    /// Bumped every time this username is admitted (new or reconnect).
    /// A task captures the generation current at admission time and checks
    /// it again before acting on a disconnect or timeout expiry, so a stale
    /// task from a since-replaced connection is a no-op (spec.md §9,
    /// reconnect races).
    pub generation: u64,
    pub sink: UnboundedSender<String>,
}

pub struct HostRecord {
    pub id: HostId,
    pub address: String,
    pub clients: Vec<ClientId>,
    pub sink: UnboundedSender<Message>,
}

struct Inner {
    next_client_id: u64,
    next_host_id: u64,

    clients: HashMap<ClientId, ClientRecord>,
    address_to_client: HashMap<String, ClientId>,
    username_to_client: HashMap<String, ClientId>,

    solo_queue: VecDeque<ClientId>,
    dual_queue: VecDeque<ClientId>,

    hosts: HashMap<HostId, HostRecord>,
    waiting_dual_host: Option<HostId>,
    free_hosts: Vec<HostId>,
}

impl Inner {
    fn new() -> Self {
        Self {
            next_client_id: 0,
            next_host_id: 0,
            clients: HashMap::new(),
            address_to_client: HashMap::new(),
            username_to_client: HashMap::new(),
            solo_queue: VecDeque::new(),
            dual_queue: VecDeque::new(),
            hosts: HashMap::new(),
            waiting_dual_host: None,
            free_hosts: Vec::new(),
        }
    }

    fn alloc_client_id(&mut self) -> ClientId {
        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        id
    }

    fn alloc_host_id(&mut self) -> HostId {
        let id = HostId(self.next_host_id);
        self.next_host_id += 1;
        id
    }

    fn client_menu_text() -> String {
        format!(
            "{}\n",
            crate::broker::console::colorize(
                "\u{250f}\u{2501} Menu \u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2513}\n\
                 \u{2523}\u{2501}\u{2501}\u{2501}  /solo : Play with computer   \u{2503}\n\
                 \u{2523}\u{2501}\u{2501}\u{2501}  /dual : Play with opponent   \u{2503}\n\
                 \u{2517}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{251b}",
                termion::color::Yellow,
            )
        )
    }

    fn send_text(&self, client_id: ClientId, text: impl Into<String>) {
        if let Some(record) = self.clients.get(&client_id) {
            let _ = record.sink.send(text.into());
        }
    }

    fn send_host(&self, host_id: HostId, message: Message) {
        if let Some(host) = self.hosts.get(&host_id) {
            let _ = host.sink.send(message);
        }
    }

    fn descriptor(&self, client_id: ClientId) -> ClientDescriptor {
        let record = &self.clients[&client_id];
        ClientDescriptor {
            username: record.username.clone(),
            address: record.address.clone(),
        }
    }

    fn remove_client(&mut self, client_id: ClientId) {
        if let Some(record) = self.clients.remove(&client_id) {
            self.address_to_client.remove(&record.address);
            self.username_to_client.remove(&record.username);
        }
    }

    fn init_solo_game(&mut self, host_id: HostId, client_id: ClientId) {
        {
            let host = self.hosts.get_mut(&host_id).unwrap();
            host.clients = vec![client_id];
        }
        let record = self.clients.get_mut(&client_id).unwrap();
        record.host = Some(host_id);
        record.status = ClientStatus::PlayingSolo;

        self.send_text(
            client_id,
            crate::broker::console::colorize(
                "You have been assigned to a server. Enjoy!\n",
                termion::color::Green,
            ),
        );
        let descriptor = self.descriptor(client_id);
        self.send_host(host_id, Message::StartSolo { client: descriptor });
    }

    fn init_waiting_dual_game(&mut self, host_id: HostId, client_id: ClientId) {
        self.waiting_dual_host = Some(host_id);
        {
            let host = self.hosts.get_mut(&host_id).unwrap();
            host.clients = vec![client_id];
        }
        let record = self.clients.get_mut(&client_id).unwrap();
        record.host = Some(host_id);
        record.status = ClientStatus::WaitingForOpponent;

        self.send_text(
            client_id,
            crate::broker::console::colorize(
                "You have been assigned to a server. Waiting for opponent...\n",
                termion::color::Cyan,
            ),
        );
    }

    fn assign_host_to_two_clients(&mut self, host_id: HostId) {
        let first = self.dual_queue.pop_front().expect("dual queue has >= 2 entries");
        let second = self.dual_queue.pop_front().expect("dual queue has >= 2 entries");
        {
            let host = self.hosts.get_mut(&host_id).unwrap();
            host.clients = vec![first, second];
        }
        for &client_id in &[first, second] {
            let record = self.clients.get_mut(&client_id).unwrap();
            record.host = Some(host_id);
            record.status = ClientStatus::PlayingDual;
            self.send_text(
                client_id,
                crate::broker::console::colorize(
                    "Opponent has been found. Your game starts now!\n",
                    termion::color::Cyan,
                ),
            );
        }
        let clients = [self.descriptor(first), self.descriptor(second)];
        self.send_host(host_id, Message::StartDual { clients });
    }

    fn add_client_to_waiting_dual_host(&mut self, client_id: ClientId) {
        let host_id = self.waiting_dual_host.take().expect("a host is waiting for an opponent");
        let waiting_client_id = {
            let host = self.hosts.get_mut(&host_id).unwrap();
            host.clients.push(client_id);
            host.clients[0]
        };

        {
            let record = self.clients.get_mut(&client_id).unwrap();
            record.host = Some(host_id);
            record.status = ClientStatus::PlayingDual;
        }
        {
            let record = self.clients.get_mut(&waiting_client_id).unwrap();
            record.status = ClientStatus::PlayingDual;
        }

        for &id in &[waiting_client_id, client_id] {
            self.send_text(
                id,
                crate::broker::console::colorize(
                    "Opponent has been found. Your game starts now!\n",
                    termion::color::Cyan,
                ),
            );
        }
        let clients = [self.descriptor(waiting_client_id), self.descriptor(client_id)];
        self.send_host(host_id, Message::StartDual { clients });
    }

    fn put_client_on_wait(&mut self, client_id: ClientId, kind: GameKind) {
        let record = self.clients.get_mut(&client_id).unwrap();
        record.host = None;
        record.status = match kind {
            GameKind::Solo => ClientStatus::WaitingForSolo,
            GameKind::Dual => ClientStatus::WaitingForDual,
        };
        match kind {
            GameKind::Solo => self.solo_queue.push_back(client_id),
            GameKind::Dual => self.dual_queue.push_back(client_id),
        }
        self.send_text(
            client_id,
            crate::broker::console::colorize(
                "You will be assigned to a server ASAP. Please wait... (/exchange to change the playing mode)\n",
                termion::color::Cyan,
            ),
        );
    }

    /// Hands a newly-available host (new connection, or one just freed by
    /// `EndGame`) to whichever waiting client(s) it can serve.
    fn assign_available_host(&mut self, host_id: HostId) {
        if let Some(client_id) = self.solo_queue.pop_front() {
            self.init_solo_game(host_id, client_id);
        } else if !self.dual_queue.is_empty() {
            if self.dual_queue.len() >= 2 {
                self.assign_host_to_two_clients(host_id);
            } else {
                let client_id = self.dual_queue.pop_front().unwrap();
                self.init_waiting_dual_game(host_id, client_id);
            }
        } else {
            if let Some(host) = self.hosts.get_mut(&host_id) {
                host.clients.clear();
            }
            self.free_hosts.push(host_id);
        }
    }

    /// Hands a client that just asked for a game to whichever host can
    /// serve it right now, or queues it.
    fn assign_available_client(&mut self, client_id: ClientId, kind: GameKind) {
        match kind {
            GameKind::Solo => {
                if let Some(host_id) = self.free_hosts.pop() {
                    self.init_solo_game(host_id, client_id);
                } else {
                    self.put_client_on_wait(client_id, GameKind::Solo);
                }
            }
            GameKind::Dual => {
                if self.waiting_dual_host.is_some() {
                    self.add_client_to_waiting_dual_host(client_id);
                } else if let Some(host_id) = self.free_hosts.pop() {
                    self.init_waiting_dual_game(host_id, client_id);
                } else {
                    self.put_client_on_wait(client_id, GameKind::Dual);
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct Broker {
    inner: Arc<Mutex<Inner>>,
}

/// What a disconnect handler should do once the lock is released — only
/// `Playing*` disconnects need a follow-up async task (the timeout
/// supervisor), so the locked portion reports that back instead of
/// spawning from inside the critical section.
pub enum PostDisconnect {
    Nothing,
    SpawnTimeoutSupervisor { client_id: ClientId, generation: u64 },
}

impl Broker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
        }
    }

    pub fn menu_text() -> String {
        Inner::client_menu_text()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("broker mutex poisoned")
    }

    /// Point-in-time read, useful for diagnostics/tests. Not safe as a
    /// pre-check before `admit` — the two calls aren't atomic together, so
    /// `admit` re-derives this itself under its own lock acquisition.
    pub fn username_is_available(&self, username: &str) -> bool {
        let inner = self.lock();
        match inner.username_to_client.get(username) {
            None => true,
            Some(id) => inner.clients[id].connectivity == Connectivity::Timeout,
        }
    }

    /// Validates and admits a username in one lock-held step: creates a
    /// fresh `IN_MENU` record, re-attaches to an existing TIMEOUT record
    /// (reconnect), or rejects outright if the name is held by an ONLINE
    /// client. The availability check and the mutation that claims the name
    /// happen under the same `lock()` call, so two connections racing on the
    /// same brand-new username can't both observe it as free (spec.md §9 /
    /// SPEC_FULL.md §D).
    pub fn admit(&self, username: String, address: String, sink: UnboundedSender<String>) -> AdmitResult {
        let mut inner = self.lock();

        if let Some(&id) = inner.username_to_client.get(&username) {
            if inner.clients[&id].connectivity != Connectivity::Timeout {
                return AdmitResult::Rejected;
            }

            let old_address = inner.clients[&id].address.clone();
            inner.address_to_client.remove(&old_address);
            inner.address_to_client.insert(address.clone(), id);

            let record = inner.clients.get_mut(&id).unwrap();
            record.address = address;
            record.connectivity = Connectivity::Online;
            record.sink = sink;
            record.generation += 1;
            let generation = record.generation;
            let status = record.status;
            let host = record.host;

            if matches!(status, ClientStatus::PlayingSolo | ClientStatus::PlayingDual) {
                if let Some(host_id) = host {
                    let descriptor = inner.descriptor(id);
                    inner.send_host(host_id, Message::UpdateClient { client: descriptor });
                }
            }

            AdmitResult::Admitted {
                client_id: id,
                generation,
                admission: Admission::Reconnect,
            }
        } else {
            let id = inner.alloc_client_id();
            let generation = 0;
            let record = ClientRecord {
                id,
                username: username.clone(),
                address: address.clone(),
                status: ClientStatus::InMenu,
                connectivity: Connectivity::Online,
                wins: 0,
                ties: 0,
                losses: 0,
                host: None,
                generation,
                sink,
            };
            inner.clients.insert(id, record);
            inner.address_to_client.insert(address, id);
            inner.username_to_client.insert(username, id);
            AdmitResult::Admitted {
                client_id: id,
                generation,
                admission: Admission::New,
            }
        }
    }

    pub fn send_menu(&self, client_id: ClientId) {
        let inner = self.lock();
        inner.send_text(client_id, Inner::client_menu_text());
    }

    pub fn send_to_client(&self, client_id: ClientId, text: String) {
        let inner = self.lock();
        inner.send_text(client_id, text);
    }

    pub fn client_status(&self, client_id: ClientId) -> Option<ClientStatus> {
        self.lock().clients.get(&client_id).map(|r| r.status)
    }

    pub fn username_of(&self, client_id: ClientId) -> Option<String> {
        self.lock().clients.get(&client_id).map(|r| r.username.clone())
    }

    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn request_game(&self, client_id: ClientId, kind: GameKind) {
        let mut inner = self.lock();
        inner.assign_available_client(client_id, kind);
    }

    /// `/exchange`: pulls a waiting client back to the menu from whichever
    /// queue or held host it currently occupies.
    pub fn exchange(&self, client_id: ClientId) -> Result<(), &'static str> {
        let mut inner = self.lock();
        let status = inner.clients[&client_id].status;
        match status {
            ClientStatus::WaitingForDual => {
                inner.dual_queue.retain(|&id| id != client_id);
            }
            ClientStatus::WaitingForSolo => {
                inner.solo_queue.retain(|&id| id != client_id);
            }
            ClientStatus::WaitingForOpponent => {
                let host_id = inner.clients.get_mut(&client_id).unwrap().host.take();
                if let Some(host_id) = host_id {
                    if let Some(host) = inner.hosts.get_mut(&host_id) {
                        host.clients.clear();
                    }
                    if inner.waiting_dual_host == Some(host_id) {
                        inner.waiting_dual_host = None;
                    }
                    inner.assign_available_host(host_id);
                }
            }
            _ => return Err("Why here?!"),
        }
        let record = inner.clients.get_mut(&client_id).unwrap();
        record.status = ClientStatus::InMenu;
        record.host = None;
        Ok(())
    }

    /// Looks up the host currently serving `client_id` and forwards the
    /// client's raw command text to it, tagged with the client's address.
    pub fn forward_to_host(&self, client_id: ClientId, text: String) {
        let inner = self.lock();
        if let Some(record) = inner.clients.get(&client_id) {
            if let Some(host_id) = record.host {
                inner.send_host(
                    host_id,
                    Message::ClientToServer {
                        client_address: record.address.clone(),
                        text,
                    },
                );
            }
        }
    }

    /// Routes text a host sent (`ServerToClient`) to the named client.
    pub fn route_to_client(&self, client_address: &str, text: String) {
        let inner = self.lock();
        if let Some(&client_id) = inner.address_to_client.get(client_address) {
            inner.send_text(client_id, text);
        }
    }

    pub fn register_host(&self, address: String, sink: UnboundedSender<Message>) -> HostId {
        let mut inner = self.lock();
        let id = inner.alloc_host_id();
        inner.hosts.insert(
            id,
            HostRecord {
                id,
                address,
                clients: Vec::new(),
                sink,
            },
        );
        inner.assign_available_host(id);
        id
    }

    pub fn handle_end_game(&self, host_id: HostId, is_tie: bool, winner_address: Option<String>) {
        let mut inner = self.lock();
        let clients = match inner.hosts.get(&host_id) {
            Some(host) => host.clients.clone(),
            None => return,
        };

        if is_tie {
            for &client_id in &clients {
                inner.clients.get_mut(&client_id).unwrap().ties += 1;
            }
        } else if let Some(winner_address) = winner_address {
            if clients.len() == 1 {
                inner.clients.get_mut(&clients[0]).unwrap().wins += 1;
            } else {
                let winner_id = *inner
                    .address_to_client
                    .get(&winner_address)
                    .expect("winner address refers to a tracked client");
                let loser_id = *clients.iter().find(|&&id| id != winner_id).unwrap();
                inner.clients.get_mut(&winner_id).unwrap().wins += 1;
                inner.clients.get_mut(&loser_id).unwrap().losses += 1;
            }
        } else {
            inner.clients.get_mut(&clients[0]).unwrap().losses += 1;
        }

        for &client_id in &clients {
            let record = inner.clients.get_mut(&client_id).unwrap();
            record.host = None;
            record.status = ClientStatus::InMenu;
            inner.send_text(client_id, Inner::client_menu_text());
        }
        if let Some(host) = inner.hosts.get_mut(&host_id) {
            host.clients.clear();
        }
        inner.assign_available_host(host_id);
    }

    /// Symmetric counterpart to client disconnect handling, for when the
    /// host's own transport drops (spec.md §9 / SPEC_FULL.md §D: not
    /// specially handled in the source, handled here rather than left
    /// unspecified).
    pub fn host_disconnected(&self, host_id: HostId) {
        let mut inner = self.lock();
        let Some(host) = inner.hosts.remove(&host_id) else {
            return;
        };
        if inner.waiting_dual_host == Some(host_id) {
            inner.waiting_dual_host = None;
        }
        inner.free_hosts.retain(|&id| id != host_id);
        for client_id in host.clients {
            if let Some(record) = inner.clients.get_mut(&client_id) {
                record.host = None;
                record.status = ClientStatus::InMenu;
            }
            inner.send_text(
                client_id,
                crate::broker::console::colorize(
                    "Your match was aborted: the game host disconnected.\n",
                    termion::color::Red,
                ),
            );
            inner.send_text(client_id, Inner::client_menu_text());
        }
    }

    /// Handles a client connection ending. Returns what the caller should
    /// do once the lock is dropped.
    pub fn disconnect(&self, client_id: ClientId, generation: u64) -> PostDisconnect {
        let mut inner = self.lock();
        let Some(record) = inner.clients.get(&client_id) else {
            return PostDisconnect::Nothing;
        };
        if record.generation != generation {
            return PostDisconnect::Nothing;
        }

        match record.status {
            ClientStatus::InMenu => {
                inner.remove_client(client_id);
                PostDisconnect::Nothing
            }
            ClientStatus::WaitingForSolo => {
                inner.solo_queue.retain(|&id| id != client_id);
                inner.remove_client(client_id);
                PostDisconnect::Nothing
            }
            ClientStatus::WaitingForDual => {
                inner.dual_queue.retain(|&id| id != client_id);
                inner.remove_client(client_id);
                PostDisconnect::Nothing
            }
            ClientStatus::WaitingForOpponent => {
                if let Some(host_id) = inner.clients[&client_id].host {
                    if let Some(host) = inner.hosts.get_mut(&host_id) {
                        host.clients.clear();
                    }
                    if inner.waiting_dual_host == Some(host_id) {
                        inner.waiting_dual_host = None;
                    }
                    inner.assign_available_host(host_id);
                }
                inner.remove_client(client_id);
                PostDisconnect::Nothing
            }
            ClientStatus::PlayingSolo | ClientStatus::PlayingDual => {
                inner.clients.get_mut(&client_id).unwrap().connectivity = Connectivity::Timeout;
                PostDisconnect::SpawnTimeoutSupervisor { client_id, generation }
            }
        }
    }

    /// One poll tick of the 20s/0.5s grace window. Returns `true` once the
    /// caller should stop polling (either the client is gone for good, or
    /// it came back online and the supervisor should just exit quietly).
    pub fn poll_timeout(&self, client_id: ClientId, generation: u64) -> bool {
        let inner = self.lock();
        match inner.clients.get(&client_id) {
            None => true,
            Some(record) if record.generation != generation => true,
            Some(record) => record.connectivity == Connectivity::Online,
        }
    }

    /// Grace window expired: remove the client (and, for a dual match, deal
    /// with its opponent) the way `_terminate_timed_out_client` does.
    pub fn expire_timeout(&self, client_id: ClientId, generation: u64) {
        let mut inner = self.lock();
        let Some(record) = inner.clients.get(&client_id) else {
            return;
        };
        if record.generation != generation {
            return;
        }

        let username = record.username.clone();
        let status = record.status;
        let host_id = record.host;

        match status {
            ClientStatus::PlayingSolo => {
                if let Some(host_id) = host_id {
                    if let Some(host) = inner.hosts.get_mut(&host_id) {
                        host.clients.clear();
                    }
                    if inner.waiting_dual_host == Some(host_id) {
                        inner.waiting_dual_host = None;
                    }
                    inner.send_host(host_id, Message::ForceTerminate);
                    inner.assign_available_host(host_id);
                }
                inner.remove_client(client_id);
                crate::broker::console::log_red(&format!("Timed out client \"{username}\" removed"));
            }
            ClientStatus::PlayingDual => {
                let host_id = host_id.expect("dual match always has a host");
                let opponent_id = {
                    let host = &inner.hosts[&host_id];
                    *host.clients.iter().find(|&&id| id != client_id).expect("dual match has two clients")
                };
                if let Some(host) = inner.hosts.get_mut(&host_id) {
                    host.clients.clear();
                }
                inner.send_host(host_id, Message::ForceTerminate);

                let opponent_online = inner.clients[&opponent_id].connectivity == Connectivity::Online;
                let opponent_username = inner.clients[&opponent_id].username.clone();
                if opponent_online {
                    inner.send_text(
                        opponent_id,
                        crate::broker::console::colorize(
                            "Your opponent left the game.\n",
                            termion::color::Cyan,
                        ),
                    );
                    inner.clients.get_mut(&opponent_id).unwrap().host = None;
                    inner.assign_available_client(opponent_id, GameKind::Dual);
                } else {
                    inner.remove_client(opponent_id);
                    crate::broker::console::log_red(&format!(
                        "Timed out {username}'s opponent \"{opponent_username}\" also removed"
                    ));
                }

                inner.assign_available_host(host_id);
                inner.remove_client(client_id);
                crate::broker::console::log_red(&format!("Timed out client \"{username}\" removed"));
            }
            _ => {}
        }
    }

    pub fn snapshot(&self) -> crate::broker::console::Snapshot {
        let inner = self.lock();
        crate::broker::console::Snapshot::capture(&inner.clients, &inner.hosts, &inner.solo_queue, &inner.dual_queue, &inner.free_hosts, inner.waiting_dual_host)
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> (UnboundedSender<String>, tokio::sync::mpsc::UnboundedReceiver<String>) {
        tokio::sync::mpsc::unbounded_channel()
    }

    fn host_sink() -> (
        UnboundedSender<Message>,
        tokio::sync::mpsc::UnboundedReceiver<Message>,
    ) {
        tokio::sync::mpsc::unbounded_channel()
    }

    fn admit_ok(broker: &Broker, username: &str, address: &str, sink: UnboundedSender<String>) -> (ClientId, u64, Admission) {
        match broker.admit(username.to_string(), address.to_string(), sink) {
            AdmitResult::Admitted { client_id, generation, admission } => (client_id, generation, admission),
            AdmitResult::Rejected => panic!("expected admission of \"{username}\" to succeed"),
        }
    }

    #[test]
    fn solo_client_then_host_pairs_immediately() {
        let broker = Broker::new();
        let (tx, _rx) = sink();
        let (id, _gen, _adm) = admit_ok(&broker, "alice", "1.1.1.1:1", tx);
        broker.request_game(id, GameKind::Solo);

        let (htx, mut hrx) = host_sink();
        broker.register_host("2.2.2.2:2".into(), htx);

        let msg = hrx.try_recv().expect("host should receive StartSolo");
        assert!(matches!(msg, Message::StartSolo { .. }));
    }

    #[test]
    fn host_then_solo_client_pairs_immediately() {
        let broker = Broker::new();
        let (htx, mut hrx) = host_sink();
        broker.register_host("2.2.2.2:2".into(), htx);

        let (tx, _rx) = sink();
        let (id, _gen, _adm) = admit_ok(&broker, "alice", "1.1.1.1:1", tx);
        broker.request_game(id, GameKind::Solo);

        let msg = hrx.try_recv().expect("host should receive StartSolo");
        assert!(matches!(msg, Message::StartSolo { .. }));
    }

    #[test]
    fn two_dual_clients_from_backlog_pair_on_next_host() {
        let broker = Broker::new();
        let (tx1, _rx1) = sink();
        let (id1, _g1, _) = admit_ok(&broker, "alice", "1.1.1.1:1", tx1);
        broker.request_game(id1, GameKind::Dual);

        let (tx2, _rx2) = sink();
        let (id2, _g2, _) = admit_ok(&broker, "bob", "1.1.1.1:2", tx2);
        broker.request_game(id2, GameKind::Dual);

        let (htx, mut hrx) = host_sink();
        broker.register_host("2.2.2.2:2".into(), htx);

        let msg = hrx.try_recv().expect("host should receive StartDual");
        assert!(matches!(msg, Message::StartDual { .. }));
    }

    #[test]
    fn dual_pairing_from_a_single_waiting_host() {
        let broker = Broker::new();
        let (htx, mut hrx) = host_sink();
        broker.register_host("2.2.2.2:2".into(), htx);

        let (tx1, _rx1) = sink();
        let (id1, _g1, _) = admit_ok(&broker, "alice", "1.1.1.1:1", tx1);
        broker.request_game(id1, GameKind::Dual);
        assert!(hrx.try_recv().is_err());

        let (tx2, _rx2) = sink();
        let (id2, _g2, _) = admit_ok(&broker, "bob", "1.1.1.1:2", tx2);
        broker.request_game(id2, GameKind::Dual);

        let msg = hrx.try_recv().expect("host should receive StartDual once the second client arrives");
        assert!(matches!(msg, Message::StartDual { .. }));
    }

    #[test]
    fn username_is_available_once_previous_holder_timed_out() {
        let broker = Broker::new();
        let (tx, _rx) = sink();
        let (id, _gen, _adm) = admit_ok(&broker, "alice", "1.1.1.1:1", tx);
        assert!(!broker.username_is_available("alice"));

        match broker.disconnect(id, 0) {
            PostDisconnect::Nothing => {}
            _ => panic!("IN_MENU disconnect should not spawn a supervisor"),
        }
        // IN_MENU disconnect removes the record outright, so the username
        // frees up without ever needing TIMEOUT.
        assert!(broker.username_is_available("alice"));
    }

    #[test]
    fn playing_disconnect_spawns_a_supervisor_and_reconnect_cancels_it() {
        let broker = Broker::new();
        let (tx, _rx) = sink();
        let (id, gen0, _) = admit_ok(&broker, "alice", "1.1.1.1:1", tx);
        broker.request_game(id, GameKind::Solo);
        let (htx, _hrx) = host_sink();
        broker.register_host("2.2.2.2:2".into(), htx);

        match broker.disconnect(id, gen0) {
            PostDisconnect::SpawnTimeoutSupervisor { client_id, generation } => {
                assert_eq!(client_id, id);
                assert_eq!(generation, gen0);
            }
            PostDisconnect::Nothing => panic!("PLAYING_SOLO disconnect should spawn a supervisor"),
        }

        let (tx2, _rx2) = sink();
        let (id2, gen1, admission) = admit_ok(&broker, "alice", "1.1.1.1:9", tx2);
        assert_eq!(id2, id);
        assert_ne!(gen1, gen0);
        assert_eq!(admission, Admission::Reconnect);

        // The stale supervisor's generation no longer matches, so it is a
        // no-op even though the client record still exists.
        assert!(broker.poll_timeout(id, gen0));
        assert!(!broker.poll_timeout(id, gen1));
    }

    #[test]
    fn second_admit_of_an_online_username_is_rejected_not_treated_as_reconnect() {
        let broker = Broker::new();
        let (tx1, _rx1) = sink();
        let (id1, _gen1, admission1) = admit_ok(&broker, "alice", "1.1.1.1:1", tx1);
        assert_eq!(admission1, Admission::New);

        // A second connection racing in with the same still-ONLINE username
        // must be rejected outright, not silently merged into the first
        // connection's record (spec.md §3 invariant 5).
        let (tx2, _rx2) = sink();
        match broker.admit("alice".to_string(), "1.1.1.1:2".to_string(), tx2) {
            AdmitResult::Rejected => {}
            AdmitResult::Admitted { .. } => panic!("an ONLINE username must not be admitted twice"),
        }

        // The original connection's record is untouched: same id, same
        // address.
        assert_eq!(broker.client_status(id1), Some(ClientStatus::InMenu));
        assert!(!broker.username_is_available("alice"));
    }
}
