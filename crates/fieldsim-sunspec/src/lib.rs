//! ---
//! fds_section: "05-networking-external-interfaces"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "SunSpec register map served over Modbus/TCP."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! The control-plane outstation.
//!
//! A [`SunSpecOutstation`] listens for Modbus/TCP masters and maps 16-bit
//! holding registers onto typed tags in the shared memory. Only Read
//! Holding Registers (3) and Write Multiple Registers (16) are served;
//! every other function code receives an IllegalFunction exception, since
//! SunSpec uses none of them.

mod frame;
mod register;
mod server;

/// Shared result type for register codec operations.
pub type Result<T> = std::result::Result<T, RegisterError>;

/// Register lookup and codec failures.
///
/// `Unmapped` surfaces on the wire as IllegalDataAddress; the codec
/// variants surface as SlaveDeviceFailure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// No tag is mapped at the address.
    #[error("register does not exist: {0}")]
    Unmapped(u16),
    /// A tag value could not be encoded with the register's type.
    #[error("cannot encode a {0} register from a {1} value")]
    Encoding(&'static str, &'static str),
    /// Payload bytes could not be decoded with the register's type.
    #[error("cannot decode register data as {0}")]
    Decoding(&'static str),
}

pub use frame::{ExceptionCode, RequestFrame, FN_READ_HOLDING_REGISTERS, FN_WRITE_MULTIPLE_REGISTERS};
pub use register::{RegisterBank, SunSpecType};
pub use server::SunSpecOutstation;
