//! ---
//! fds_section: "02-messaging-ipc-data-model"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Publish/update bridge between device memory and the simulator."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::point::PointData;
use crate::{BridgeError, Result};

/// Bounded queue feeding one subscription handler.
pub type PointSender = mpsc::Sender<PointData>;

/// Inbound side of the bridge: receives point publications from the
/// simulator and fans each one out to every handler registered for its
/// name.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Register a handler queue for a point name. Delivery is ordered per
    /// handler but carries no guarantee across handlers.
    fn subscribe_to_point(&mut self, point: &str, handler: PointSender);

    /// Listen until the shutdown signal fires. Receive errors are logged
    /// and polling continues; only cancellation ends the loop.
    async fn run(&self, shutdown: broadcast::Receiver<()>) -> Result<()>;
}

/// Outbound side of the bridge.
///
/// `send_update` is the serialized primitive: implementations own a
/// non-thread-safe socket and must guard it with their own mutex. The
/// field and batch helpers all funnel through it.
#[async_trait]
pub trait Updater: Send + Sync {
    /// Transmit one update message and await the provider reply.
    async fn send_update(&self, message: &str) -> Result<()>;

    /// Send a single binary field update.
    async fn update_binary_field(&self, point: &str, status: bool) -> Result<()> {
        debug!(point = %point, status, "sending update");
        self.send_update(&PointData::format_binary(point, status)).await
    }

    /// Send a single analog field update.
    async fn update_analog_field(&self, point: &str, value: f64) -> Result<()> {
        debug!(point = %point, value, "sending update");
        self.send_update(&PointData::format_analog(point, value)).await
    }

    /// Commit an accumulated batch as one message. An empty batch is a
    /// no-op that never touches the wire.
    async fn commit(&self, batch: UpdateBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        debug!(updates = batch.len(), "committing batch update");
        self.send_update(&batch.message()).await
    }
}

/// A group of point updates committed atomically to the simulator.
///
/// Updates within a batch carry no order guarantee the peer may rely on.
#[derive(Debug, Default)]
pub struct UpdateBatch {
    updates: Vec<String>,
}

impl UpdateBatch {
    /// Queue a binary field update.
    pub fn update_binary_field(&mut self, point: &str, status: bool) {
        debug!(point = %point, status, "queueing batch update");
        self.updates.push(PointData::format_binary(point, status));
    }

    /// Queue an analog field update.
    pub fn update_analog_field(&mut self, point: &str, value: f64) {
        debug!(point = %point, value, "queueing batch update");
        self.updates.push(PointData::format_analog(point, value));
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Number of queued updates.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// The combined wire message.
    pub fn message(&self) -> String {
        self.updates.join(",")
    }
}

/// Interpret a provider reply: `ACK=<info>` carries on, `ERR=<reason>` is
/// a rejection, anything else is a protocol error. Lowercase prefixes are
/// accepted for compatibility with older providers.
pub(crate) fn parse_provider_reply(reply: &str) -> Result<()> {
    let Some((prefix, detail)) = reply.split_once('=') else {
        return Err(BridgeError::Protocol(reply.to_owned()));
    };

    match prefix {
        "ACK" | "ack" => {
            debug!(message = %detail, "received ACK from provider");
            Ok(())
        }
        "ERR" | "err" => Err(BridgeError::Rejected(detail.to_owned())),
        _ => Err(BridgeError::Protocol(reply.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_join_updates_with_commas() {
        let mut batch = UpdateBatch::default();
        batch.update_binary_field("bus-1.breaker", true);
        batch.update_analog_field("bus-1.mw", 37.5);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.message(), "bus-1.breaker:true,bus-1.mw:37.5");
    }

    #[test]
    fn replies_split_into_ack_err_and_garbage() {
        assert!(parse_provider_reply("ACK=done").is_ok());
        assert!(parse_provider_reply("ack=done").is_ok());
        assert!(matches!(
            parse_provider_reply("ERR=bad point"),
            Err(BridgeError::Rejected(reason)) if reason == "bad point"
        ));
        assert!(matches!(
            parse_provider_reply("err=bad point"),
            Err(BridgeError::Rejected(_))
        ));
        assert!(matches!(
            parse_provider_reply("HELLO"),
            Err(BridgeError::Protocol(_))
        ));
        assert!(matches!(
            parse_provider_reply("NAK=nope"),
            Err(BridgeError::Protocol(_))
        ));
    }
}
