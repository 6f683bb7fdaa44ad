//! ---
//! fds_section: "02-messaging-ipc-data-model"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Publish/update bridge between device memory and the simulator."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! The simulation-plane bridge.
//!
//! Inbound, a [`Subscriber`] delivers point publications from the power
//! simulator into per-handler bounded queues; the [`InputModule`] moves
//! them into the device namespace of the tag memory. Outbound, the
//! [`OutputModule`] drains dirtied tags into an [`UpdateBatch`] and commits
//! it through an [`Updater`] as a single atomic message.
//!
//! Transports are pluggable: the in-memory pair backs tests and
//! single-process integration, the TCP pair talks NUL-framed text to a
//! real provider.

mod bridge;
mod channel;
mod input;
mod output;
mod point;
mod tcp;

/// Shared result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures crossing the simulation-plane bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Wrapper for IO errors on the underlying transport.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    /// The transport gave up waiting for the peer.
    #[error("transport error: {0}")]
    Transport(String),
    /// The provider reply had an unexpected shape.
    #[error("malformed provider response: {0}")]
    Protocol(String),
    /// The provider answered `ERR=` to an update.
    #[error("provider rejected update: {0}")]
    Rejected(String),
    /// A published point string did not parse.
    #[error("invalid point string: {0}")]
    InvalidPoint(String),
}

pub use bridge::{PointSender, Subscriber, UpdateBatch, Updater};
pub use channel::{InMemorySubscriber, InMemoryUpdater};
pub use input::InputModule;
pub use output::OutputModule;
pub use point::PointData;
pub use tcp::{TcpSubscriber, TcpUpdater};
