//! One-to-one binding between a client and the logic that reacts to it
//!
//! An actor owns its client for its whole lifetime. Its task drains the
//! client's inbox in order, hands each message to the [`Logic`], and sends
//! whatever the logic queued in the [`Outbox`]. Disposal stops the task,
//! runs [`Logic::on_disposed`] and removes the client from its node.

use crate::client::Client;
use crate::error::NodeError;
use crate::message::{Message, EVERYBODY, GAME_NAME};
use crate::node::Node;
use log::debug;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Messages a logic wants sent in reaction to one incoming message
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<(String, String)>,
    finished: bool,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, receiver: impl Into<String>, text: impl Into<String>) {
        self.messages.push((receiver.into(), text.into()));
    }

    pub fn to_game(&mut self, text: impl Into<String>) {
        self.send(GAME_NAME, text);
    }

    pub fn broadcast(&mut self, text: impl Into<String>) {
        self.send(EVERYBODY, text);
    }

    /// Asks the actor to stop after this message
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn drain(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.messages)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Reaction to protocol traffic for one client
pub trait Logic: Send + 'static {
    fn on_message(&mut self, message: &Message, out: &mut Outbox);

    fn on_disposed(&mut self) {}
}

pub struct Actor;

impl Actor {
    pub fn spawn<L: Logic>(client: Client, logic: L) -> ActorHandle {
        let name = client.name().to_string();
        let node = Arc::clone(client.node());
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(Self::run(client, logic, stop_rx));

        ActorHandle {
            name,
            node,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    async fn run<L: Logic>(mut client: Client, mut logic: L, mut stop: oneshot::Receiver<()>) {
        let mut outbox = Outbox::new();

        loop {
            tokio::select! {
                _ = &mut stop => break,
                message = client.recv() => {
                    let Some(message) = message else {
                        debug!("Inbox of {:?} closed", client.name());
                        break;
                    };

                    logic.on_message(&message, &mut outbox);
                    for (receiver, text) in outbox.drain() {
                        client.send(&receiver, text).await;
                    }
                    if outbox.is_finished() {
                        break;
                    }
                }
            }
        }

        logic.on_disposed();
    }
}

/// Owner's side of a running actor
pub struct ActorHandle {
    name: String,
    node: Arc<Node>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ActorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends on behalf of the bound client, e.g. a command typed by a human
    pub async fn send(&self, receiver: &str, text: impl Into<String>) {
        self.node
            .send(Message::new(self.name.as_str(), receiver, text))
            .await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Stops the actor and unbinds its client
    ///
    /// Teardown failures are reported to the node as warnings.
    pub async fn dispose(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                self.node.report_error(NodeError::Actor(e.to_string()), true);
            }
        }

        if !self.node.delete_client(&self.name).await {
            self.node
                .report_error(NodeError::UnknownClient(self.name.clone()), true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use crate::node::NodeEvent;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Echo {
        disposed: Arc<AtomicBool>,
    }

    impl Logic for Echo {
        fn on_message(&mut self, message: &Message, out: &mut Outbox) {
            out.send(message.sender(), message.text());
        }

        fn on_disposed(&mut self) {
            self.disposed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_actor_replies_and_disposes() {
        let (node, _events) = Node::primary(None);
        let echo_client = node.add_client("echo").await.unwrap();
        let mut caller = node.add_client("caller").await.unwrap();

        let disposed = Arc::new(AtomicBool::new(false));
        let handle = Actor::spawn(
            echo_client,
            Echo {
                disposed: Arc::clone(&disposed),
            },
        );

        caller.send("echo", MessageKind::Replic.text().arg("ping")).await;
        let reply = caller.recv().await.unwrap();
        assert_eq!(reply.sender(), "echo");
        assert_eq!(reply.args()[1], "ping");

        handle.dispose().await;
        assert!(disposed.load(Ordering::SeqCst));
        assert!(!node.contains("echo").await);
    }

    #[tokio::test]
    async fn test_dispose_after_removal_reports_warning() {
        let (node, mut events) = Node::primary(None);
        let client = node.add_client("ghost").await.unwrap();
        let handle = Actor::spawn(
            client,
            Echo {
                disposed: Arc::new(AtomicBool::new(false)),
            },
        );

        node.delete_client("ghost").await;
        handle.dispose().await;

        let mut warned = false;
        while let Ok(event) = events.try_recv() {
            if let NodeEvent::Error {
                error: NodeError::UnknownClient(name),
                is_warning: true,
            } = event
            {
                warned = name == "ghost";
            }
        }
        assert!(warned);
    }
}
