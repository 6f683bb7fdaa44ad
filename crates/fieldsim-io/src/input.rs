//! ---
//! fds_section: "02-messaging-ipc-data-model"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Publish/update bridge between device memory and the simulator."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::sync::Arc;

use fieldsim_common::config::IoConfig;
use fieldsim_memory::TagMemory;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};

use crate::bridge::Subscriber;
use crate::point::PointData;

// Bounded queue between the subscriber listener and this module, so a
// slow cycle cannot block the listener.
const HANDLER_QUEUE_DEPTH: usize = 256;

/// Moves inbound simulator publications into the device namespace.
pub struct InputModule {
    memory: Arc<TagMemory>,
    points: mpsc::Receiver<PointData>,
    sender: mpsc::Sender<PointData>,
}

impl InputModule {
    /// Register this config's device points and IO module bindings.
    ///
    /// Each `id` is bound to its own entry's point name, so one input
    /// block may declare any number of points.
    pub fn from_config(config: &IoConfig, memory: Arc<TagMemory>) -> Self {
        for point in &config.binary {
            memory.add_binary_device(&point.name);
            memory.add_binary_module(&point.id, &point.name);
        }
        for point in &config.analog {
            memory.add_analog_device(&point.name);
            memory.add_analog_module(&point.id, &point.name);
        }

        let (sender, points) = mpsc::channel(HANDLER_QUEUE_DEPTH);
        Self {
            memory,
            points,
            sender,
        }
    }

    /// Subscribe this module's queue for every device point in memory,
    /// covering both the input (r/o) and output (r/w) declarations.
    pub fn subscribe(&self, subscriber: &mut dyn Subscriber) {
        for device in self.memory.device_points() {
            subscriber.subscribe_to_point(&device, self.sender.clone());
        }
    }

    /// Route delivered points until the shutdown signal fires.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                point = self.points.recv() => {
                    let Some(point) = point else { return };
                    debug!(point = ?point, "handling publication");

                    if self.memory.is_binary_device(&point.name) {
                        if let Err(err) = self.memory.set_binary_device(&point.name, point.status) {
                            warn!(point = %point.name, error = %err, "storing binary publication");
                        }
                    } else if self.memory.is_analog_device(&point.name) {
                        if let Err(err) = self.memory.set_analog_device(&point.name, point.value) {
                            warn!(point = %point.name, error = %err, "storing analog publication");
                        }
                    } else {
                        trace!(point = %point.name, "point not managed");
                    }
                }
            }
        }
    }
}
