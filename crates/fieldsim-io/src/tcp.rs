//! ---
//! fds_section: "02-messaging-ipc-data-model"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Publish/update bridge between device memory and the simulator."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
//! TCP transports speaking NUL-framed text.
//!
//! Outbound updates carry a `WRITE=` prefix and a single NUL terminator;
//! the provider answers one `ACK=` / `ERR=` frame. Inbound publications
//! are NUL-framed comma-separated point lists.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::bridge::{parse_provider_reply, PointSender, Subscriber, Updater};
use crate::point::PointData;
use crate::{BridgeError, Result};

// Socket waits are bounded so cancellation is observed promptly.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
// How many poll intervals the updater waits for a provider reply.
const REPLY_POLL_LIMIT: u32 = 5;

fn host_port(endpoint: &str) -> &str {
    endpoint.strip_prefix("tcp://").unwrap_or(endpoint)
}

/// Subscriber reading NUL-framed publications from a TCP provider.
pub struct TcpSubscriber {
    endpoint: String,
    handlers: HashMap<String, Vec<PointSender>>,
}

impl TcpSubscriber {
    /// Create a subscriber for the given `tcp://host:port` endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            handlers: HashMap::new(),
        }
    }

    fn deliver(&self, frame: &str) {
        for point in frame.split(',') {
            trace!(point = %point, "received point");

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

#[async_trait]
impl Subscriber for TcpSubscriber {
    fn subscribe_to_point(&mut self, point: &str, handler: PointSender) {
        self.handlers.entry(point.to_owned()).or_default().push(handler);
        debug!(point = %point, "subscribed");
    }

    async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(endpoint = %self.endpoint, "listening for publishes");

        let mut stream: Option<TcpStream> = None;
        let mut buf = BytesMut::with_capacity(4096);
        let mut chunk = [0u8; 1024];

        loop {
            if shutdown.try_recv().is_ok() {
                return Ok(());
            }

            let Some(socket) = stream.as_mut() else {
                match TcpStream::connect(host_port(&self.endpoint)).await {
                    Ok(socket) => {
                        info!(endpoint = %self.endpoint, "connected to publisher");
                        stream = Some(socket);
                    }
                    Err(err) => {
                        warn!(endpoint = %self.endpoint, error = %err, "connecting to publisher");
                        tokio::select! {
                            _ = shutdown.recv() => return Ok(()),
                            _ = tokio::time::sleep(POLL_INTERVAL) => {}
                        }
                    }
                }
                continue;
            };

            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                read = tokio::time::timeout(POLL_INTERVAL, socket.read(&mut chunk)) => {
                    match read {
                        // Poll timeout; loop back around to check shutdown.
                        Err(_) => continue,
                        Ok(Ok(0)) => {
                            warn!(endpoint = %self.endpoint, "publisher closed the connection");
                            stream = None;
                            buf.clear();
                        }
                        Ok(Ok(n)) => {
                            buf.extend_from_slice(&chunk[..n]);
                            while let Some(end) = buf.iter().position(|&b| b == 0) {
                                let frame = buf.split_to(end + 1);
                                if let Ok(text) = std::str::from_utf8(&frame[..end]) {
                                    trace!(msg = %text, "received publish");
                                    self.deliver(text);
                                }
                            }
                        }
                        Ok(Err(err)) => {
                            warn!(endpoint = %self.endpoint, error = %err, "receiving publish");
                            stream = None;
                            buf.clear();
                        }
                    }
                }
            }
        }
    }
}

/// Updater speaking the `WRITE=` request/reply protocol over TCP.
///
/// The socket is not shareable between concurrent sends, so every send
/// holds the connection mutex for the whole request/reply exchange.
pub struct TcpUpdater {
    endpoint: String,
    connection: tokio::sync::Mutex<Option<TcpStream>>,
}

impl TcpUpdater {
    /// Create an updater for the given `tcp://host:port` endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connection: tokio::sync::Mutex::new(None),
        }
    }

    async fn read_reply(socket: &mut TcpStream) -> Result<String> {
        let mut buf = BytesMut::with_capacity(256);
        let mut chunk = [0u8; 256];
        let mut polls = 0;

        loop {
            if let Some(end) = buf.iter().position(|&b| b == 0) {
                let frame = buf.split_to(end + 1);
                return String::from_utf8(frame[..end].to_vec())
                    .map_err(|_| BridgeError::Protocol("non-UTF-8 reply".to_owned()));
            }
            if polls >= REPLY_POLL_LIMIT {
                return Err(BridgeError::Transport(
                    "timed out waiting for provider reply".to_owned(),
                ));
            }

            match tokio::time::timeout(POLL_INTERVAL, socket.read(&mut chunk)).await {
                Err(_) => polls += 1,
                Ok(Ok(0)) => {
                    return Err(BridgeError::Transport("provider closed the connection".to_owned()))
                }
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(err)) => return Err(err.into()),
            }
        }
    }
}

#[async_trait]
impl Updater for TcpUpdater {
    async fn send_update(&self, message: &str) -> Result<()> {
        let mut connection = self.connection.lock().await;

        if connection.is_none() {
            info!(endpoint = %self.endpoint, "connecting to provider");
            let socket = TcpStream::connect(host_port(&self.endpoint)).await?;
            *connection = Some(socket);
        }
        let socket = connection.as_mut().expect("connection established above");

        let framed = format!("WRITE={message}\0");
        if let Err(err) = socket.write_all(framed.as_bytes()).await {
            // Drop the broken connection so the next send reconnects.
            *connection = None;
            return Err(err.into());
        }

        match Self::read_reply(socket).await {
            Ok(reply) => parse_provider_reply(&reply),
            Err(err) => {
                *connection = None;
                Err(err)
            }
        }
    }
}
