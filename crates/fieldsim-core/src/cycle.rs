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
use std::time::Duration;

use anyhow::{Context, Result};
use fieldsim_io::OutputModule;
use fieldsim_logic::LogicProgram;
use fieldsim_memory::TagMemory;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, trace};

/// The periodic freeze -> logic -> flush -> thaw pipeline.
///
/// Logic and flush failures are logged and the next tick proceeds; a
/// freeze or thaw failure is a broken invariant and aborts the engine.
pub struct CycleEngine {
    memory: Arc<TagMemory>,
    logic: LogicProgram,
    output: OutputModule,
    period: Duration,
}

impl CycleEngine {
    /// Create an engine ticking at `period`.
    pub fn new(
        memory: Arc<TagMemory>,
        logic: LogicProgram,
        output: OutputModule,
        period: Duration,
    ) -> Self {
        Self {
            memory,
            logic,
            output,
            period,
        }
    }

    /// Tick until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately; consume it so the
        // first cycle lands one period after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("cycle engine shutdown");
                    return Ok(());
                }
                now = ticker.tick() => {
                    trace!(at = ?now, "cycle time ticker");

                    self.memory.freeze().context("freezing memory")?;

                    if let Err(err) = self.logic.execute(&self.memory) {
                        error!(error = %err, "executing logic");
                    }

                    if let Err(err) = self.output.flush().await {
                        error!(error = %err, "updating outputs");
                    }

                    self.memory.unfreeze().context("unfreezing memory")?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsim_common::config::{IoConfig, IoPointConfig};
    use fieldsim_io::InMemoryUpdater;

    fn engine_setup(period: Duration) -> (Arc<TagMemory>, Arc<InMemoryUpdater>, CycleEngine) {
        let memory = Arc::new(TagMemory::new());
        memory.register_internal_analog("current", 2.5);
        memory.register_external_analog("A", "io-A");

        let output_config = IoConfig {
            endpoint: "inproc://test".to_owned(),
            binary: Vec::new(),
            analog: vec![IoPointConfig {
                id: "io-A".to_owned(),
                name: "bus-1.A".to_owned(),
            }],
        };

        let updater = Arc::new(InMemoryUpdater::new());
        let output = OutputModule::from_config(&output_config, memory.clone(), updater.clone());
        let logic = LogicProgram::compile("A = current\n").unwrap();
        let engine = CycleEngine::new(memory.clone(), logic, output, period);
        (memory, updater, engine)
    }

    #[tokio::test]
    async fn a_cycle_runs_logic_and_flushes_outputs() {
        let (memory, updater, engine) = engine_setup(Duration::from_millis(10));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(engine.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if updater.sent().iter().any(|m| m == "bus-1.A:2.5") {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("cycle never flushed the logic result");

        // The memory thawed after the cycle.
        assert_eq!(memory.analog_device_value("bus-1.A"), Some(2.5));

        let _ = shutdown_tx.send(());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_the_ticker() {
        let (_, _, engine) = engine_setup(Duration::from_secs(3600));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(engine.run(shutdown_rx));

        let _ = shutdown_tx.send(());
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("engine ignored the shutdown signal")
            .unwrap()
            .unwrap();
    }
}
