//! ---
//! fds_section: "05-networking-external-interfaces"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "SunSpec register map served over Modbus/TCP."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::BytesMut;
use fieldsim_common::config::SunSpecServerConfig;
use fieldsim_memory::TagMemory;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::frame::{
    ExceptionCode, RequestFrame, FN_READ_HOLDING_REGISTERS, FN_WRITE_MULTIPLE_REGISTERS,
};
use crate::register::RegisterBank;

// Socket waits are bounded so cancellation is observed promptly.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A SunSpec Modbus/TCP outstation bound to one register bank.
#[derive(Debug)]
pub struct SunSpecOutstation {
    endpoint: String,
    memory: Arc<TagMemory>,
    bank: RegisterBank,
}

impl SunSpecOutstation {
    /// Build an outstation from its config entry, validating the register
    /// map against the memory.
    pub fn from_config(config: &SunSpecServerConfig, memory: Arc<TagMemory>) -> Result<Self> {
        let bank = RegisterBank::from_config(&config.register, &memory)?;
        Ok(Self {
            endpoint: format!("{}:{}", config.ip, config.port),
            memory,
            bank,
        })
    }

    /// Bind the listener and serve until the shutdown signal fires.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind(&self.endpoint)
            .await
            .with_context(|| format!("binding SunSpec outstation to {}", self.endpoint))?;
        info!(endpoint = %self.endpoint, "SunSpec outstation listening");
        self.serve(listener, shutdown).await
    }

    /// Accept connections on an existing listener until shutdown.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let station = Arc::new(self);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(endpoint = %station.endpoint, "SunSpec outstation shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "master connected");
                            let station = station.clone();
                            let shutdown = shutdown.resubscribe();
                            tokio::spawn(async move {
                                if let Err(err) = station.connection(stream, shutdown).await {
                                    warn!(peer = %peer, error = %err, "connection closed with error");
                                }
                            });
                        }
                        Err(err) => {
                            error!(error = %err, "accepting master connection");
                        }
                    }
                }
            }
        }
    }

    async fn connection(
        &self,
        mut stream: TcpStream,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut buf = BytesMut::with_capacity(512);
        let mut chunk = [0u8; 256];

        loop {
            if let Some(frame) = RequestFrame::try_parse(&mut buf) {
                let response = self.handle(&frame);
                stream.write_all(&response).await?;
                continue;
            }

            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                read = timeout(POLL_INTERVAL, stream.read(&mut chunk)) => {
                    match read {
                        // Poll timeout; loop back around to check shutdown.
                        Err(_) => continue,
                        Ok(Ok(0)) => return Ok(()),
                        Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                        Ok(Err(err)) => return Err(err.into()),
                    }
                }
            }
        }
    }

    /// Dispatch one request to its handler and build the response ADU.
    pub fn handle(&self, frame: &RequestFrame) -> Vec<u8> {
        let result = match frame.function {
            FN_READ_HOLDING_REGISTERS => self.handle_read(&frame.data),
            FN_WRITE_MULTIPLE_REGISTERS => self.handle_write(&frame.data),
            other => {
                warn!(function = other, "non-implemented function called");
                Err(ExceptionCode::IllegalFunction)
            }
        };

        match result {
            Ok(payload) => frame.response(&payload),
            Err(code) => frame.exception(code),
        }
    }

    /// Read Holding Registers: walk the range in type-length strides and
    /// encode each mapped tag.
    pub fn handle_read(&self, data: &[u8]) -> std::result::Result<Vec<u8>, ExceptionCode> {
        let (start, count) = request_range(data)?;
        debug!(start, count, "SunSpec read request");

        let mut payload = Vec::new();
        let mut address = u32::from(start);
        let end = u32::from(start) + u32::from(count);

        while address < end {
            let register = address as u16;
            let tag = self.bank.tag(register).map_err(|err| {
                error!(error = %err, "IllegalDataAddress");
                ExceptionCode::IllegalDataAddress
            })?;
            let ty = self.bank.kind(tag);
            let scaling = self.bank.scaling(register);

            let bytes = if ty.is_string() {
                let text = self.memory.string_value(tag).map_err(|err| {
                    error!(tag = %tag, error = %err, "no value in datastore for tag");
                    ExceptionCode::SlaveDeviceFailure
                })?;
                ty.encode_string(&text)
            } else {
                // Most registers map to analogs; fall back to a binary
                // status rendered as 1.0 / 0.0.
                let value = match self.memory.analog_value(tag) {
                    Ok(value) => value,
                    Err(_) => match self.memory.binary_status(tag) {
                        Ok(status) => {
                            if status {
                                1.0
                            } else {
                                0.0
                            }
                        }
                        Err(err) => {
                            error!(tag = %tag, error = %err, "no value in datastore for tag");
                            return Err(ExceptionCode::SlaveDeviceFailure);
                        }
                    },
                };
                ty.encode_number(value, scaling)
            };

            let bytes = bytes.map_err(|err| {
                error!(tag = %tag, error = %err, "encoding register");
                ExceptionCode::SlaveDeviceFailure
            })?;

            payload.extend_from_slice(&bytes);
            address += u32::from(ty.length());
        }

        let mut response = Vec::with_capacity(1 + payload.len());
        response.push(payload.len() as u8);
        response.extend_from_slice(&payload);
        Ok(response)
    }

    /// Write Multiple Registers: decode each stride and update the mapped
    /// tag, holding the memory's exclusive lock so the whole request is
    /// one batch against the output flush.
    pub fn handle_write(&self, data: &[u8]) -> std::result::Result<Vec<u8>, ExceptionCode> {
        let (start, count) = request_range(data)?;
        debug!(start, count, "SunSpec write request");

        // Payload offset: start register, register count, and byte count.
        let mut offset = 5usize;

        let _batch = self.memory.exclusive();

        let mut address = u32::from(start);
        let end = u32::from(start) + u32::from(count);

        while address < end {
            let register = address as u16;
            let tag = self.bank.tag(register).map_err(|err| {
                error!(error = %err, "IllegalDataAddress");
                ExceptionCode::IllegalDataAddress
            })?;
            let ty = self.bank.kind(tag);
            let scaling = self.bank.scaling(register);

            let width = usize::from(ty.length()) * 2;
            let Some(bytes) = data.get(offset..offset + width) else {
                error!(register, "write request payload too short");
                return Err(ExceptionCode::SlaveDeviceFailure);
            };

            let value = ty.decode(bytes, scaling).map_err(|err| {
                error!(register, error = %err, "converting data to value");
                ExceptionCode::SlaveDeviceFailure
            })?;

            // If the analog update fails, convert to a status and try the
            // binary tag before giving up.
            if self.memory.update_analog(tag, value).is_err() {
                let status = value != 0.0;
                if let Err(err) = self.memory.update_binary(tag, status) {
                    error!(tag = %tag, register, error = %err, "updating tag");
                    return Err(ExceptionCode::SlaveDeviceFailure);
                }
            }

            offset += width;
            address += u32::from(ty.length());
        }

        // Echo the start register and register count.
        Ok(data[0..4].to_vec())
    }
}

fn request_range(data: &[u8]) -> std::result::Result<(u16, u16), ExceptionCode> {
    if data.len() < 4 {
        return Err(ExceptionCode::SlaveDeviceFailure);
    }
    let start = u16::from_be_bytes([data[0], data[1]]);
    let count = u16::from_be_bytes([data[2], data[3]]);
    Ok((start, count))
}
