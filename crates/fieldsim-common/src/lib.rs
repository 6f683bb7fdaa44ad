//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Shared primitives and utilities for the fieldsim runtime."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
//! Configuration model and logging bootstrap shared by the daemon and the
//! device crates.

pub mod config;
pub mod logging;
