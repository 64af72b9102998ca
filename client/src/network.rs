//! Secondary node: joins a remote primary over TCP and bridges the link

use log::{debug, info, warn};
use shared::packet::{read_frame, read_packet, write_packet};
use shared::{Client, FrameError, JoinRequest, Node, NodeError, NodeEvent, Packet};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long the primary may take to answer a join
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A local person seated in a remote game
pub struct Session {
    pub node: Arc<Node>,
    pub client: Client,
    pub events: mpsc::UnboundedReceiver<NodeEvent>,
}

/// Performs the join handshake and starts routing through a secondary node
///
/// Nothing is registered locally unless the primary accepts the request.
pub async fn connect(addr: &str, request: JoinRequest) -> Result<Session, NodeError> {
    info!("Connecting to {} as {:?}", addr, request.name);
    let stream = TcpStream::connect(addr).await.map_err(FrameError::from)?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle: {}", e);
    }
    let (mut reader, mut writer) = stream.into_split();

    write_packet(&mut writer, &Packet::Join(request)).await?;
    let reply = timeout(JOIN_TIMEOUT, read_packet(&mut reader))
        .await
        .map_err(|_| NodeError::Handshake(format!("no reply from {}", addr)))??;

    let name = match reply {
        Packet::Accepted { name } => name,
        Packet::Refused { error, .. } => return Err(NodeError::Refused(error)),
        other => return Err(NodeError::Handshake(format!("unexpected reply {:?}", other))),
    };
    info!("Joined {} as {:?}", addr, name);

    let (node, events) = Node::secondary();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let connection = node.register_connection(addr.to_string(), outbound_tx).await;
    let client = node.add_client(&name).await?;

    tokio::spawn(spawn_writer(Arc::clone(&node), writer, outbound_rx));
    {
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            read_loop(&node, connection, reader).await;
            node.connection_closed(connection).await;
        });
    }

    Ok(Session { node, client, events })
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

async fn read_loop(node: &Arc<Node>, connection: u32, mut reader: OwnedReadHalf) {
    loop {
        let payload = match read_frame(&mut reader).await {
            Ok(payload) => payload,
            Err(e) if e.is_disconnect() => {
                warn!("Server closed the connection");
                return;
            }
            Err(e) => {
                node.report_error(NodeError::Frame(e), false);
                return;
            }
        };

        match Packet::decode(&payload) {
            Ok(packet) => node.receive(connection, packet).await,
            Err(e) => node.serialization_error(payload, e),
        }
    }
}
