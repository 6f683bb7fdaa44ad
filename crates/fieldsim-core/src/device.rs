//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Field device lifecycle and cycle orchestration."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use fieldsim_common::config::FieldDeviceConfig;
use fieldsim_io::{InputModule, OutputModule, Subscriber, Updater};
use fieldsim_logic::LogicProgram;
use fieldsim_memory::TagMemory;
use fieldsim_sunspec::SunSpecOutstation;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// One simulated field device, assembled from configuration.
///
/// Every module shares the single [`TagMemory`]; freeze/thaw state lives
/// inside the memory, not in its clients.
pub struct FieldDevice {
    name: String,
    memory: Arc<TagMemory>,
    subscriber: Option<Box<dyn Subscriber>>,
    input: Option<InputModule>,
    engine: super::CycleEngine,
    outstations: Vec<SunSpecOutstation>,
}

impl FieldDevice {
    /// Build the device: populate the memory from the tag declarations,
    /// compile the logic program, wire the IO modules to the supplied
    /// transports, and validate the outstation register maps.
    pub fn from_config(
        config: &FieldDeviceConfig,
        subscriber: Option<Box<dyn Subscriber>>,
        updater: Arc<dyn Updater>,
    ) -> Result<Self> {
        let memory = Arc::new(TagMemory::new());

        for tag in &config.tags.internal_tag {
            if let Some(value) = tag.value {
                memory.register_internal_analog(&tag.name, value);
            } else if let Some(status) = tag.status {
                memory.register_internal_binary(&tag.name, status);
            } else if let Some(text) = &tag.string {
                memory.register_internal_string(&tag.name, text);
            }
        }
        for tag in &config.tags.external_tag {
            match tag.kind {
                fieldsim_common::config::TagKindConfig::Binary => {
                    memory.register_external_binary(&tag.name, &tag.io);
                }
                fieldsim_common::config::TagKindConfig::Analog => {
                    memory.register_external_analog(&tag.name, &tag.io);
                }
            }
        }

        let logic = LogicProgram::compile(&config.logic)
            .with_context(|| format!("compiling logic for device {}", config.name))?;

        // Input and output both register device points; the input module
        // subscribes afterwards so it covers the output's points too.
        let input = config
            .input
            .as_ref()
            .map(|io| InputModule::from_config(io, memory.clone()));

        let output_config = config.output.clone().unwrap_or_default();
        let output = OutputModule::from_config(&output_config, memory.clone(), updater);

        let mut subscriber = subscriber;
        if let (Some(input), Some(subscriber)) = (&input, subscriber.as_mut()) {
            debug!(device = %config.name, "initializing input module");
            input.subscribe(subscriber.as_mut());
        }

        let engine = super::CycleEngine::new(
            memory.clone(),
            logic,
            output,
            config.cycle_time,
        );

        let mut outstations = Vec::new();
        for server in &config.comms.sunspec_tcp_server {
            let station = SunSpecOutstation::from_config(server, memory.clone())
                .with_context(|| format!("configuring outstation for device {}", config.name))?;
            outstations.push(station);
        }

        Ok(Self {
            name: config.name.clone(),
            memory,
            subscriber,
            input,
            engine,
            outstations,
        })
    }

    /// The shared tag memory.
    pub fn memory(&self) -> Arc<TagMemory> {
        self.memory.clone()
    }

    /// Spawn every device task and return a handle for joined shutdown.
    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> DeviceHandle {
        let name = self.name;
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if let Some(subscriber) = self.subscriber {
            let rx = shutdown.subscribe();
            let device = name.clone();
            tasks.push(tokio::spawn(async move {
                debug!(device = %device, "starting input module");
                if let Err(err) = subscriber.run(rx).await {
                    error!(device = %device, error = %err, "subscriber listener failed");
                }
            }));
        }

        if let Some(input) = self.input {
            tasks.push(tokio::spawn(input.run(shutdown.subscribe())));
        }

        {
            let rx = shutdown.subscribe();
            let device = name.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = self.engine.run(rx).await {
                    error!(device = %device, error = %err, "cycle engine failed");
                }
            }));
        }

        for station in self.outstations {
            let rx = shutdown.subscribe();
            let device = name.clone();
            tasks.push(tokio::spawn(async move {
                debug!(device = %device, "starting comms module");
                if let Err(err) = station.run(rx).await {
                    error!(device = %device, error = %err, "outstation failed");
                }
            }));
        }

        info!(device = %name, tasks = tasks.len(), "field device running");
        DeviceHandle { name, tasks }
    }
}

/// Handle over a running device's tasks.
pub struct DeviceHandle {
    name: String,
    tasks: Vec<JoinHandle<()>>,
}

impl DeviceHandle {
    /// Await every device task; call after firing the shutdown signal.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(device = %self.name, error = %err, "device task join error");
            }
        }
        info!(device = %self.name, "field device stopped");
    }
}
