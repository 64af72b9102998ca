//! Server network layer: TCP listener feeding connections into the primary node

use log::{debug, error, info, warn};
use shared::packet::{read_frame, write_packet};
use shared::{ConnectionId, Node, NodeError, Packet};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long a new connection may take to send its first frame
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts TCP connections for one primary node
pub struct Server {
    listener: TcpListener,
    node: Arc<Node>,
    handshake_timeout: Duration,
}

impl Server {
    pub async fn bind(addr: &str, node: Arc<Node>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            node,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        })
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop; runs until the task is dropped
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let node = Arc::clone(&self.node);
                    let handshake_timeout = self.handshake_timeout;
                    tokio::spawn(serve_connection(node, stream, peer, handshake_timeout));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Drives one connection until it closes
///
/// Outgoing packets are written by a separate task draining the connection's
/// outbound queue, so a slow peer never blocks routing.
async fn serve_connection(node: Arc<Node>, stream: TcpStream, peer: SocketAddr, handshake_timeout: Duration) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", peer, e);
    }
    let (reader, writer) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let connection = node.register_connection(peer.ip().to_string(), outbound_tx).await;

    tokio::spawn(spawn_writer(Arc::clone(&node), writer, outbound_rx));
    read_loop(&node, connection, reader, peer, handshake_timeout).await;

    node.connection_closed(connection).await;
    info!("Connection {} from {} finished", connection, peer);
}

async fn spawn_writer(node: Arc<Node>, mut writer: OwnedWriteHalf, mut outbound: mpsc::UnboundedReceiver<Packet>) {
    while let Some(packet) = outbound.recv().await {
        if let Err(e) = write_packet(&mut writer, &packet).await {
            if !e.is_disconnect() {
                node.report_error(NodeError::Frame(e), true);
            }
            break;
        }
    }
}

async fn read_loop(
    node: &Arc<Node>,
    connection: ConnectionId,
    mut reader: OwnedReadHalf,
    peer: SocketAddr,
    handshake_timeout: Duration,
) {
    let mut greeted = false;

    loop {
        let frame = if greeted {
            read_frame(&mut reader).await
        } else {
            match timeout(handshake_timeout, read_frame(&mut reader)).await {
                Ok(frame) => frame,
                Err(_) => {
                    warn!("No handshake from {} within {:?}", peer, handshake_timeout);
                    node.report_error(NodeError::Handshake(peer.to_string()), true);
                    return;
                }
            }
        };

        let payload = match frame {
            Ok(payload) => payload,
            Err(e) if e.is_disconnect() => return,
            Err(e) => {
                // The stream cannot be resynchronized after a bad length prefix
                node.report_error(NodeError::Frame(e), true);
                return;
            }
        };

        match Packet::decode(&payload) {
            Ok(packet) => {
                greeted = true;
                node.receive(connection, packet).await;
            }
            Err(e) => node.serialization_error(payload, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::packet::{read_packet, write_frame};
    use shared::{GameRole, JoinError, JoinRequest, NodeEvent, Sex};

    async fn start(password: Option<String>) -> (Arc<Node>, mpsc::UnboundedReceiver<NodeEvent>, SocketAddr) {
        let (node, events) = Node::primary(password);
        let server = Server::bind("127.0.0.1:0", Arc::clone(&node))
            .await
            .unwrap()
            .with_handshake_timeout(Duration::from_millis(200));
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        (node, events, addr)
    }

    #[tokio::test]
    async fn test_join_over_tcp() {
        let (node, _events, addr) = start(None).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let request = JoinRequest::new("alice", GameRole::Player, Sex::Female);
        write_packet(&mut stream, &Packet::Join(request)).await.unwrap();

        let reply = read_packet(&mut stream).await.unwrap();
        assert_eq!(reply, Packet::Accepted { name: "alice".into() });
        assert!(node.contains("alice").await);
    }

    #[tokio::test]
    async fn test_wrong_password_refused() {
        let (node, _events, addr) = start(Some("secret".into())).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let request = JoinRequest::new("bob", GameRole::Player, Sex::Male).with_password("guess");
        write_packet(&mut stream, &Packet::Join(request)).await.unwrap();

        let reply = read_packet(&mut stream).await.unwrap();
        assert_eq!(
            reply,
            Packet::Refused {
                name: "bob".into(),
                error: JoinError::WrongPassword
            }
        );
        assert!(!node.contains("bob").await);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped_and_connection_survives() {
        let (node, mut events, addr) = start(None).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        write_frame(&mut stream, &[0xff, 0xff, 0xff]).await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, NodeEvent::SerializationError { .. }));

        let request = JoinRequest::new("carol", GameRole::Viewer, Sex::Female);
        write_packet(&mut stream, &Packet::Join(request)).await.unwrap();
        let reply = read_packet(&mut stream).await.unwrap();
        assert_eq!(reply, Packet::Accepted { name: "carol".into() });
        assert!(node.contains("carol").await);
    }

    #[tokio::test]
    async fn test_silent_connection_is_dropped_after_handshake_timeout() {
        let (node, mut events, addr) = start(None).await;
        let _stream = TcpStream::connect(addr).await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            NodeEvent::Error {
                error: NodeError::Handshake(_),
                is_warning: true
            }
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(node.connection_count().await, 0);
    }
}
