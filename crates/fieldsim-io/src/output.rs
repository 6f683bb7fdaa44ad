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
use tracing::{debug, warn};

use crate::bridge::{UpdateBatch, Updater};
use crate::Result;

/// Flushes dirtied output tags to the simulator as one batch per cycle.
pub struct OutputModule {
    memory: Arc<TagMemory>,
    updater: Arc<dyn Updater>,
}

impl OutputModule {
    /// Register this config's device points and IO module bindings, and
    /// attach the updater used by [`flush`].
    ///
    /// [`flush`]: OutputModule::flush
    pub fn from_config(config: &IoConfig, memory: Arc<TagMemory>, updater: Arc<dyn Updater>) -> Self {
        for point in &config.binary {
            memory.add_binary_device(&point.name);
            memory.add_binary_module(&point.id, &point.name);
        }
        for point in &config.analog {
            memory.add_analog_device(&point.name);
            memory.add_analog_module(&point.id, &point.name);
        }

        Self { memory, updater }
    }

    /// Drain pending outputs into a batch and commit it.
    ///
    /// The memory's exclusive lock is held across both drains so writers
    /// batching their own updates are never interleaved, then released
    /// before the commit goes to the wire.
    pub async fn flush(&self) -> Result<()> {
        let mut batch = UpdateBatch::default();

        {
            let _lock = self.memory.exclusive();

            let drained = self.memory.drain_binary_outputs(|point, status| -> Result<()> {
                debug!(point = %point, status, "handling cycle time update");
                batch.update_binary_field(point, status);
                Ok(())
            });
            if let Err(err) = drained {
                warn!(error = %err, "updating binary devices");
            }

            let drained = self.memory.drain_analog_outputs(|point, value| -> Result<()> {
                debug!(point = %point, value, "handling cycle time update");
                batch.update_analog_field(point, value);
                Ok(())
            });
            if let Err(err) = drained {
                warn!(error = %err, "updating analog devices");
            }
        }

        self.updater.commit(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InMemoryUpdater;
    use fieldsim_common::config::IoPointConfig;

    fn output_setup() -> (Arc<TagMemory>, Arc<InMemoryUpdater>, OutputModule) {
        let memory = Arc::new(TagMemory::new());
        memory.register_external_analog("mw", "bus-1_mw");
        memory.register_external_binary("breaker", "bus-1_breaker");

        let config = IoConfig {
            endpoint: "inproc://test".to_owned(),
            binary: vec![IoPointConfig {
                id: "bus-1_breaker".to_owned(),
                name: "bus-1.breaker".to_owned(),
            }],
            analog: vec![IoPointConfig {
                id: "bus-1_mw".to_owned(),
                name: "bus-1.mw".to_owned(),
            }],
        };

        let updater = Arc::new(InMemoryUpdater::new());
        let module = OutputModule::from_config(&config, memory.clone(), updater.clone());
        (memory, updater, module)
    }

    #[tokio::test]
    async fn flush_commits_dirty_outputs_as_one_message() {
        let (memory, updater, module) = output_setup();

        memory.update_analog("mw", 37.5).unwrap();
        memory.update_binary("breaker", true).unwrap();
        module.flush().await.unwrap();

        let sent = updater.sent();
        assert_eq!(sent.len(), 1);
        // Drain order across kinds is binary first, analog second; order
        // within a kind is not guaranteed.
        assert_eq!(sent[0], "bus-1.breaker:true,bus-1.mw:37.5");

        // The device namespace now carries the committed values.
        assert_eq!(memory.analog_device_value("bus-1.mw"), Some(37.5));
        assert_eq!(memory.binary_device_status("bus-1.breaker"), Some(true));
    }

    #[tokio::test]
    async fn unchanged_outputs_are_suppressed_entirely() {
        let (memory, updater, module) = output_setup();

        memory.set_analog_device("bus-1.mw", 3.14).unwrap();
        memory.update_analog("mw", 3.14).unwrap();
        module.flush().await.unwrap();

        assert!(updater.sent().is_empty());
    }

    #[tokio::test]
    async fn clean_cycles_commit_nothing() {
        let (_, updater, module) = output_setup();
        module.flush().await.unwrap();
        assert!(updater.sent().is_empty());
    }
}
