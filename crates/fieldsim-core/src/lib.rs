//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Field device lifecycle and cycle orchestration."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
//! Assembles one simulated field device from configuration and drives its
//! concurrent tasks: the subscriber listener, the input router, the cycle
//! engine, and the Modbus outstations.

pub mod cycle;
pub mod device;

pub use cycle::CycleEngine;
pub use device::{DeviceHandle, FieldDevice};
