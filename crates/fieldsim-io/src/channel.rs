//! ---
//! fds_section: "02-messaging-ipc-data-model"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Publish/update bridge between device memory and the simulator."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
//! In-process transports, primarily for tests and single-process
//! integration.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{trace, warn};

use crate::bridge::{parse_provider_reply, PointSender, Subscriber, Updater};
use crate::point::PointData;
use crate::Result;

/// Subscriber fed by an in-process frame channel instead of a socket.
pub struct InMemorySubscriber {
    handlers: HashMap<String, Vec<PointSender>>,
    frames: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

impl InMemorySubscriber {
    /// Create the subscriber plus the publish handle used to inject
    /// frames, each a comma-separated `name:value` list.
    pub fn new() -> (Self, mpsc::Sender<String>) {
        let (tx, rx) = mpsc::channel(64);
        (
            Self {
                handlers: HashMap::new(),
                frames: tokio::sync::Mutex::new(rx),
            },
            tx,
        )
    }
}

#[async_trait]
impl Subscriber for InMemorySubscriber {
    fn subscribe_to_point(&mut self, point: &str, handler: PointSender) {
        self.handlers.entry(point.to_owned()).or_default().push(handler);
        trace!(point = %point, "subscribed");
    }

    async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut frames = self.frames.lock().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                frame = frames.recv() => {
                    let Some(frame) = frame else { return Ok(()) };

                    for point in frame.split(',') {
                        let Ok(data) = PointData::parse(point) else {
                            continue;
                        };
                        let Some(handlers) = self.handlers.get(&data.name) else {
                            continue;
                        };
                        for handler in handlers {
                            if handler.try_send(data.clone()).is_err() {
                                warn!(point = %data.name, "handler queue full; dropping point");
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Updater that records messages instead of writing a socket.
///
/// Replies can be scripted per message; unscripted sends are ACKed.
#[derive(Default)]
pub struct InMemoryUpdater {
    sent: Mutex<Vec<String>>,
    replies: Mutex<VecDeque<String>>,
    // The wire serialization mutex a socket-backed updater would need.
    socket: tokio::sync::Mutex<()>,
}

impl InMemoryUpdater {
    /// Create an updater that ACKs everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the reply for the next unanswered send.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(reply.into());
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Updater for InMemoryUpdater {
    async fn send_update(&self, message: &str) -> Result<()> {
        let _socket = self.socket.lock().await;
        self.sent.lock().push(message.to_owned());

        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| "ACK=ok".to_owned());
        parse_provider_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;

    #[tokio::test]
    async fn subscriber_routes_frames_to_registered_handlers() {
        let (mut subscriber, publish) = InMemorySubscriber::new();
        let (tx, mut rx) = mpsc::channel(8);
        subscriber.subscribe_to_point("bus-1.mw", tx);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(async move { subscriber.run(shutdown_rx).await });

        publish
            .send("bus-1.mw:37.5,unknown:1.0,garbage".to_owned())
            .await
            .unwrap();

        let point = rx.recv().await.unwrap();
        assert_eq!(point.name, "bus-1.mw");
        assert_eq!(point.value, 37.5);

        let _ = shutdown_tx.send(());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn updater_batches_commit_as_one_message() {
        let updater = InMemoryUpdater::new();

        let mut batch = crate::UpdateBatch::default();
        batch.update_analog_field("bus-1.mw", 37.5);
        batch.update_binary_field("bus-1.breaker", false);
        updater.commit(batch).await.unwrap();

        assert_eq!(updater.sent(), vec!["bus-1.mw:37.5,bus-1.breaker:false"]);
    }

    #[tokio::test]
    async fn empty_batches_never_touch_the_wire() {
        let updater = InMemoryUpdater::new();
        updater.commit(crate::UpdateBatch::default()).await.unwrap();
        assert!(updater.sent().is_empty());
    }

    #[tokio::test]
    async fn scripted_rejections_surface_as_errors() {
        let updater = InMemoryUpdater::new();
        updater.push_reply("ERR=unknown point");

        let err = updater.update_analog_field("ghost", 1.0).await.unwrap_err();
        assert!(matches!(err, BridgeError::Rejected(reason) if reason == "unknown point"));

        // Back to the default ACK afterwards.
        updater.update_analog_field("bus-1.mw", 1.0).await.unwrap();
    }
}
