//! Star-topology message routing between local clients and remote connections
//!
//! A primary node is the hub: it owns the game engine ("@"), local bots and one
//! connection per secondary node. A secondary node owns its local (human)
//! clients and exactly one upstream connection to the primary.
//!
//! Shared state is split by concern, each behind its own lock:
//! - the local client directory (name -> inbox)
//! - the connections map (transport sessions and the remote names they own)
//! - the ban list (identity -> name, primary only)
//!
//! When more than one lock is needed they are always taken in that order.
//! Guards are scoped, so every exit path releases them.

use crate::client::Client;
use crate::error::{FrameError, JoinError, NodeError};
use crate::message::{Message, MessageKind, EVERYBODY, GAME_NAME, SERVER_NAME};
use crate::packet::Packet;
use crate::roles::{GameRole, JoinRequest};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

pub type ConnectionId = u32;

/// Refuse reason sent to a kicked client
pub const KICK_REASON: &str = "You have been removed from the game";

/// Refuse reason sent to local clients when the upstream link drops
pub const CONNECTION_LOST_REASON: &str = "Connection to the server was lost";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRole {
    Primary { password: Option<String> },
    Secondary,
}

/// Notifications published by a node to whoever hosts it
#[derive(Debug)]
pub enum NodeEvent {
    Error { error: NodeError, is_warning: bool },
    SerializationError { payload: Vec<u8>, error: FrameError },
    Joined { name: String, role: GameRole },
    Left { name: String },
}

/// A live transport session
#[derive(Debug)]
struct Connection {
    /// Ban key for everything this connection owns (peer address)
    identity: String,
    /// Remote client names reachable through this connection
    names: HashSet<String>,
    outbound: mpsc::UnboundedSender<Packet>,
}

pub struct Node {
    role: NodeRole,
    clients: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    banned: Mutex<HashMap<String, String>>,
    events: mpsc::UnboundedSender<NodeEvent>,
    next_connection_id: AtomicU32,
}

impl Node {
    pub fn new(role: NodeRole) -> (Arc<Self>, mpsc::UnboundedReceiver<NodeEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let node = Arc::new(Self {
            role,
            clients: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            banned: Mutex::new(HashMap::new()),
            events,
            next_connection_id: AtomicU32::new(1),
        });
        (node, events_rx)
    }

    pub fn primary(password: Option<String>) -> (Arc<Self>, mpsc::UnboundedReceiver<NodeEvent>) {
        Self::new(NodeRole::Primary { password })
    }

    pub fn secondary() -> (Arc<Self>, mpsc::UnboundedReceiver<NodeEvent>) {
        Self::new(NodeRole::Secondary)
    }

    pub fn is_main(&self) -> bool {
        matches!(self.role, NodeRole::Primary { .. })
    }

    /// Registers a local endpoint bound to this node
    pub async fn add_client(self: &Arc<Self>, name: &str) -> Result<Client, NodeError> {
        let mut clients = self.clients.write().await;
        let taken_remotely = {
            let connections = self.connections.read().await;
            connections.values().any(|c| c.names.contains(name))
        };

        if clients.contains_key(name) || taken_remotely {
            return Err(NodeError::DuplicateName(name.to_string()));
        }

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        clients.insert(name.to_string(), inbox_tx);
        debug!("Local client {:?} added", name);

        Ok(Client::new(name.to_string(), Arc::clone(self), inbox_rx))
    }

    /// Removes a local endpoint; returns false when it was not registered
    ///
    /// A secondary tells the primary that the client left. A primary tells
    /// everybody, unless the client is the game itself.
    pub async fn delete_client(&self, name: &str) -> bool {
        let removed = self.clients.write().await.remove(name).is_some();
        if !removed {
            return false;
        }

        debug!("Local client {:?} removed", name);
        if self.is_main() {
            if name != GAME_NAME {
                self.broadcast_disconnect(name).await;
            }
        } else {
            let connections = self.connections.read().await;
            for connection in connections.values() {
                let _ = connection.outbound.send(Packet::Leave {
                    name: name.to_string(),
                });
            }
        }
        true
    }

    /// True for a local client or a remote one owned by some connection
    pub async fn contains(&self, name: &str) -> bool {
        if self.clients.read().await.contains_key(name) {
            return true;
        }
        self.connections
            .read()
            .await
            .values()
            .any(|c| c.names.contains(name))
    }

    pub async fn client_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.read().await.keys().cloned().collect();
        names.extend(
            self.connections
                .read()
                .await
                .values()
                .flat_map(|c| c.names.iter().cloned()),
        );
        names.sort();
        names
    }

    /// Routes a message submitted by a local client
    pub async fn send(&self, message: Message) {
        self.route(message, None).await;
    }

    /// Adds a transport session and returns its id
    pub async fn register_connection(
        &self,
        identity: impl Into<String>,
        outbound: mpsc::UnboundedSender<Packet>,
    ) -> ConnectionId {
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let identity = identity.into();
        info!("Connection {} registered from {}", id, identity);

        self.connections.write().await.insert(
            id,
            Connection {
                identity,
                names: HashSet::new(),
                outbound,
            },
        );
        id
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Validates a join handshake and binds the name to the connection
    ///
    /// On success the `Accepted` packet is queued before the name becomes
    /// routable, so the candidate never sees traffic ahead of its handshake.
    pub async fn join(&self, connection: ConnectionId, request: &JoinRequest) -> Result<GameRole, JoinError> {
        let NodeRole::Primary { password } = &self.role else {
            return Err(JoinError::NotPrimary);
        };

        let name = request.name.trim();
        if name.is_empty() {
            return Err(JoinError::EmptyName);
        }

        let role: GameRole = request
            .role
            .parse()
            .map_err(|_| JoinError::InvalidRole(request.role.clone()))?;

        if password.is_some() && request.password != *password {
            return Err(JoinError::WrongPassword);
        }

        let clients = self.clients.read().await;
        let mut connections = self.connections.write().await;

        let identity = match connections.get(&connection) {
            Some(c) => c.identity.clone(),
            None => return Err(JoinError::Forbidden),
        };

        if self.banned.lock().await.contains_key(&identity) {
            info!("Rejected banned identity {} ({:?})", identity, name);
            return Err(JoinError::Forbidden);
        }

        let reserved = name == GAME_NAME || name == EVERYBODY;
        if reserved || clients.contains_key(name) || connections.values().any(|c| c.names.contains(name)) {
            return Err(JoinError::DuplicateName(name.to_string()));
        }

        if let Some(entry) = connections.get_mut(&connection) {
            if entry
                .outbound
                .send(Packet::Accepted {
                    name: name.to_string(),
                })
                .is_err()
            {
                return Err(JoinError::Forbidden);
            }
            entry.names.insert(name.to_string());
        }

        info!("{:?} joined as {} via connection {}", name, role, connection);
        let _ = self.events.send(NodeEvent::Joined {
            name: name.to_string(),
            role,
        });
        Ok(role)
    }

    /// Handles one decoded packet from a connection
    pub async fn receive(&self, connection: ConnectionId, packet: Packet) {
        match packet {
            Packet::Join(request) => match self.join(connection, &request).await {
                Ok(role) => {
                    let connect = MessageKind::Connect
                        .text()
                        .arg(role)
                        .arg(request.name.trim())
                        .arg(request.sex);
                    self.route(Message::new(request.name.trim(), GAME_NAME, connect), Some(connection))
                        .await;
                }
                Err(error) => {
                    info!("Join of {:?} refused: {}", request.name, error);
                    let connections = self.connections.read().await;
                    if let Some(c) = connections.get(&connection) {
                        let _ = c.outbound.send(Packet::Refused {
                            name: request.name.clone(),
                            error,
                        });
                    }
                }
            },

            Packet::Data(message) => {
                if self.is_main() {
                    let owns_sender = self
                        .connections
                        .read()
                        .await
                        .get(&connection)
                        .is_some_and(|c| c.names.contains(message.sender()));
                    if !owns_sender {
                        warn!(
                            "Dropping message from {:?}: not owned by connection {}",
                            message.sender(),
                            connection
                        );
                        return;
                    }
                    if message.is_system() {
                        warn!(
                            "Dropping system message from {:?} on connection {}",
                            message.sender(),
                            connection
                        );
                        return;
                    }
                }

                let refused = !self.is_main()
                    && message.is_system()
                    && message.kind() == Some(MessageKind::Refuse)
                    && message.receiver() != EVERYBODY;
                let receiver = message.receiver().to_string();

                self.route(message, Some(connection)).await;

                if refused {
                    self.clients.write().await.remove(&receiver);
                }
            }

            Packet::Leave { name } => {
                let removed = {
                    let mut connections = self.connections.write().await;
                    connections
                        .get_mut(&connection)
                        .is_some_and(|c| c.names.remove(&name))
                };
                if removed {
                    info!("{:?} left", name);
                    self.broadcast_disconnect(&name).await;
                }
            }

            Packet::Accepted { .. } | Packet::Refused { .. } => {
                warn!("Unexpected handshake packet on connection {}", connection);
            }
        }
    }

    /// A dropped connection is a normal leave for every client it owned
    pub async fn connection_closed(&self, connection: ConnectionId) {
        let removed = self.connections.write().await.remove(&connection);
        let Some(removed) = removed else {
            return;
        };

        info!("Connection {} closed ({})", connection, removed.identity);
        if self.is_main() {
            for name in removed.names {
                self.broadcast_disconnect(&name).await;
            }
        } else {
            let clients = self.clients.read().await;
            for (name, inbox) in clients.iter() {
                let refuse = MessageKind::Refuse.text().arg(CONNECTION_LOST_REASON);
                let _ = inbox.send(Message::system(SERVER_NAME, name.as_str(), refuse));
            }
        }
    }

    /// Removes a client, optionally banning its identity
    ///
    /// Returns the banned identity when `ban` is set and the client was
    /// remote. Local clients have no identity and are only removed.
    pub async fn kick(&self, name: &str, ban: bool) -> Result<Option<String>, NodeError> {
        if !self.is_main() {
            return Err(NodeError::NotPrimary);
        }

        if name == GAME_NAME {
            return Err(NodeError::UnknownClient(name.to_string()));
        }

        if self.delete_client(name).await {
            info!("Local client {:?} kicked", name);
            return Ok(None);
        }

        let banned_identity = {
            let mut connections = self.connections.write().await;
            let owner = connections
                .iter()
                .find(|(_, c)| c.names.contains(name))
                .map(|(id, _)| *id);
            let Some(owner) = owner else {
                return Err(NodeError::UnknownClient(name.to_string()));
            };

            let mut close = false;
            let mut banned_identity = None;
            if let Some(connection) = connections.get_mut(&owner) {
                let refuse = MessageKind::Refuse.text().arg(KICK_REASON);
                let _ = connection
                    .outbound
                    .send(Packet::Data(Message::system(SERVER_NAME, name, refuse)));
                connection.names.remove(name);
                close = connection.names.is_empty();

                if ban {
                    self.banned
                        .lock()
                        .await
                        .insert(connection.identity.clone(), name.to_string());
                    banned_identity = Some(connection.identity.clone());
                }
            }

            if close {
                connections.remove(&owner);
            }
            banned_identity
        };

        info!("{:?} kicked (ban: {})", name, ban);
        self.broadcast_disconnect(name).await;
        Ok(banned_identity)
    }

    pub async fn unban(&self, identity: &str) -> bool {
        let removed = self.banned.lock().await.remove(identity);
        if let Some(name) = &removed {
            info!("Identity {} ({:?}) unbanned", identity, name);
        }
        removed.is_some()
    }

    /// Current bans as (identity, name) pairs
    pub async fn banned(&self) -> Vec<(String, String)> {
        let mut list: Vec<(String, String)> = self
            .banned
            .lock()
            .await
            .iter()
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect();
        list.sort();
        list
    }

    /// Single funnel for node faults
    pub fn report_error(&self, error: NodeError, is_warning: bool) {
        if is_warning {
            warn!("Node warning: {}", error);
        } else {
            error!("Node error: {}", error);
        }
        let _ = self.events.send(NodeEvent::Error { error, is_warning });
    }

    /// A payload could not be decoded; it is dropped and traffic continues
    pub fn serialization_error(&self, payload: Vec<u8>, error: FrameError) {
        warn!("Dropping malformed payload ({} bytes): {}", payload.len(), error);
        let _ = self
            .events
            .send(NodeEvent::SerializationError { payload, error });
    }

    async fn broadcast_disconnect(&self, name: &str) {
        let _ = self.events.send(NodeEvent::Left {
            name: name.to_string(),
        });
        let text = MessageKind::Disconnect.text().arg(name);
        self.route(Message::system(SERVER_NAME, EVERYBODY, text), None)
            .await;
    }

    async fn route(&self, message: Message, origin: Option<ConnectionId>) {
        if message.is_broadcast() {
            self.route_broadcast(&message, origin).await;
            return;
        }

        let receiver = message.receiver().to_string();
        let local = self.clients.read().await.get(&receiver).cloned();
        if let Some(inbox) = local {
            if inbox.send(message).is_err() {
                self.report_error(NodeError::InboxClosed(receiver), true);
            }
            return;
        }

        let connections = self.connections.read().await;
        let target = if self.is_main() {
            connections
                .iter()
                .find(|(id, c)| Some(**id) != origin && c.names.contains(&receiver))
        } else if origin.is_none() {
            connections.iter().next()
        } else {
            None
        };

        match target {
            Some((id, connection)) => {
                if connection.outbound.send(Packet::Data(message)).is_err() {
                    self.report_error(NodeError::ConnectionClosed(*id), true);
                }
            }
            None => debug!("No route to {:?}, message dropped", receiver),
        }
    }

    async fn route_broadcast(&self, message: &Message, origin: Option<ConnectionId>) {
        let sender = message.sender();
        let mut failed = Vec::new();
        {
            let clients = self.clients.read().await;
            for (name, inbox) in clients.iter() {
                if name != sender && inbox.send(message.clone()).is_err() {
                    failed.push(name.clone());
                }
            }
        }

        for name in failed {
            self.report_error(NodeError::InboxClosed(name), true);
        }

        let connections = self.connections.read().await;
        for (id, connection) in connections.iter() {
            if Some(*id) == origin || connection.names.contains(sender) {
                continue;
            }
            if self.is_main() && connection.names.is_empty() {
                continue;
            }
            if connection.outbound.send(Packet::Data(message.clone())).is_err() {
                self.report_error(NodeError::ConnectionClosed(*id), true);
            }
        }
    }
}
