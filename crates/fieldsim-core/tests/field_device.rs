//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "test"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Full-device integration: subscribe, cycle, flush, serve."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use fieldsim_common::config::{AppConfig, FieldDeviceConfig};
use fieldsim_core::FieldDevice;
use fieldsim_io::{InMemorySubscriber, InMemoryUpdater, Subscriber};
use tokio::sync::broadcast;

const CONFIG: &str = r#"
[[field-device]]
name = "inverter-1"
cycle-time = 20
logic = ""

[[field-device.tags.internal-tag]]
name = "WRtg"
value = 75.0

[[field-device.tags.external-tag]]
name = "current"
io = "bus-1_current"
type = "analog"

[[field-device.tags.external-tag]]
name = "A"
io = "bus-1_A"
type = "analog"

[field-device.input]
endpoint = "inproc://input"

[[field-device.input.analog]]
id = "bus-1_current"
name = "bus-1.current"

[field-device.output]
endpoint = "inproc://output"

[[field-device.output.analog]]
id = "bus-1_A"
name = "bus-1.A"
"#;

fn device_config() -> FieldDeviceConfig {
    let mut config: AppConfig = CONFIG.parse().unwrap();
    let mut device = config.field_devices.remove(0);
    device.logic = "A = current * 2\n".to_owned();
    device
}

#[tokio::test]
async fn publications_flow_through_logic_to_committed_outputs() {
    let config = device_config();

    let (subscriber, publish) = InMemorySubscriber::new();
    let updater = Arc::new(InMemoryUpdater::new());

    let device = FieldDevice::from_config(
        &config,
        Some(Box::new(subscriber) as Box<dyn Subscriber>),
        updater.clone(),
    )
    .unwrap();
    let memory = device.memory();

    let (shutdown_tx, _keep) = broadcast::channel(4);
    let handle = device.spawn(&shutdown_tx);

    publish.send("bus-1.current:2.5".to_owned()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if updater.sent().iter().any(|m| m == "bus-1.A:5") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("logic result never reached the updater");

    // The committed value is also the new device reading.
    assert_eq!(memory.analog_device_value("bus-1.A"), Some(5.0));
    assert_eq!(memory.analog_value("A"), Ok(5.0));

    // A steady input publishes nothing further: the next cycles suppress
    // the unchanged output.
    let committed = updater.sent().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(updater.sent().len(), committed);

    let _ = shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .expect("device tasks ignored shutdown");
}

#[tokio::test]
async fn bad_logic_fails_device_construction() {
    let mut config = device_config();
    config.logic = "A = 1 +\n".to_owned();

    let updater = Arc::new(InMemoryUpdater::new());
    let result = FieldDevice::from_config(&config, None, updater);
    assert!(result.is_err());
}
