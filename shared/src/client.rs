use crate::message::Message;
use crate::node::Node;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A locally addressable endpoint bound to exactly one node
///
/// Created by [`Node::add_client`]. Messages addressed to the client's name
/// arrive in its inbox in the order each sender submitted them.
pub struct Client {
    name: String,
    node: Arc<Node>,
    inbox: mpsc::UnboundedReceiver<Message>,
}

impl Client {
    pub(crate) fn new(name: String, node: Arc<Node>, inbox: mpsc::UnboundedReceiver<Message>) -> Self {
        Self { name, node, inbox }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node this client is registered with
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub async fn send(&self, receiver: &str, text: impl Into<String>) {
        self.node
            .send(Message::new(self.name.as_str(), receiver, text))
            .await;
    }

    /// Sends a prebuilt message, re-stamped with this client as sender
    pub async fn send_message(&self, message: &Message) {
        let stamped = if message.is_system() {
            Message::system(self.name.as_str(), message.receiver(), message.text())
        } else {
            Message::new(self.name.as_str(), message.receiver(), message.text())
        };
        self.node.send(stamped).await;
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.inbox.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.inbox.try_recv().ok()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("main", &self.node.is_main())
            .finish_non_exhaustive()
    }
}
