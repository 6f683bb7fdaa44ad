//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Tag memory shared by every field device module."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Typed, multi-namespace tag store.
//!
//! Every other module of a field device (logic, IO, outstations) holds a
//! reference to a single [`TagMemory`]. The memory mediates all concurrency:
//! an internal reader-writer lock guards the maps themselves, while a
//! separate caller-facing exclusive lock lets the output flush and register
//! write handlers group several operations into one atomic batch.

mod store;

/// Shared result type for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Name-resolution and freeze-state failures raised by the tag memory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// The tag is not present in any namespace.
    #[error("unknown tag {0}")]
    UnknownTag(String),
    /// The tag exists but not with the requested kind.
    #[error("tag {0} is not a {1} tag")]
    WrongKind(String, &'static str),
    /// An external tag points at an IO module with no device binding, or at
    /// a device that was never registered.
    #[error("unbound IO module for tag {0}")]
    UnboundModule(String),
    /// A device-namespace write referenced an unregistered device.
    #[error("unknown device {0}")]
    UnknownDevice(String),
    /// `freeze` was called while a freeze was already in effect.
    #[error("memory is already frozen")]
    AlreadyFrozen,
    /// `unfreeze` was called with no freeze in effect.
    #[error("memory is not frozen")]
    NotFrozen,
}

pub use store::{Snapshot, TagMemory};
