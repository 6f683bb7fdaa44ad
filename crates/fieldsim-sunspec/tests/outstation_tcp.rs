//! ---
//! fds_section: "05-networking-external-interfaces"
//! fds_subsection: "test"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Modbus/TCP round trips against a live outstation."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::sync::Arc;

use fieldsim_common::config::{RegisterConfig, SunSpecServerConfig};
use fieldsim_memory::TagMemory;
use fieldsim_sunspec::SunSpecOutstation;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

async fn start_outstation(memory: Arc<TagMemory>) -> (std::net::SocketAddr, broadcast::Sender<()>) {
    let config = SunSpecServerConfig {
        ip: "127.0.0.1".to_owned(),
        port: 0,
        register: vec![
            RegisterConfig {
                address: 40000,
                scaling_factor: 0,
                kind: "uint16".to_owned(),
                tag: "var_I0".to_owned(),
            },
            RegisterConfig {
                address: 40001,
                scaling_factor: 0,
                kind: "uint16".to_owned(),
                tag: "var_I1".to_owned(),
            },
        ],
    };

    let station = SunSpecOutstation::from_config(&config, memory).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        station.serve(listener, shutdown_rx).await.unwrap();
    });

    (addr, shutdown_tx)
}

async fn exchange(stream: &mut TcpStream, request: &[u8], response_len: usize) -> Vec<u8> {
    stream.write_all(request).await.unwrap();
    let mut response = vec![0u8; response_len];
    stream.read_exact(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn serves_reads_and_writes_over_tcp() {
    let memory = Arc::new(TagMemory::new());
    memory.register_internal_analog("var_I0", 5.0);
    memory.register_internal_analog("var_I1", 10.0);

    let (addr, shutdown) = start_outstation(memory.clone()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Read both registers.
    let request = [
        0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x9C, 0x40, 0x00, 0x02,
    ];
    let response = exchange(&mut stream, &request, 13).await;
    assert_eq!(
        response,
        vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x00, 0x05, 0x00, 0x0A]
    );

    // Write var_I0 = 1 and observe it in memory.
    let request = [
        0x00, 0x02, 0x00, 0x00, 0x00, 0x09, 0x01, 0x10, 0x9C, 0x40, 0x00, 0x01, 0x02, 0x00, 0x01,
    ];
    let response = exchange(&mut stream, &request, 12).await;
    assert_eq!(
        response,
        vec![0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x10, 0x9C, 0x40, 0x00, 0x01]
    );
    assert_eq!(memory.analog_value("var_I0"), Ok(1.0));

    // Unserved function codes answer with IllegalFunction.
    let request = [
        0x00, 0x03, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01,
    ];
    let response = exchange(&mut stream, &request, 9).await;
    assert_eq!(response[7], 0x81);
    assert_eq!(response[8], 0x01);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unmapped_reads_answer_with_illegal_data_address() {
    let memory = Arc::new(TagMemory::new());
    memory.register_internal_analog("var_I0", 5.0);
    memory.register_internal_analog("var_I1", 10.0);

    let (addr, shutdown) = start_outstation(memory).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = [
        0x00, 0x09, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x01, 0x00, 0x01,
    ];
    let response = exchange(&mut stream, &request, 9).await;
    assert_eq!(response[7], 0x83);
    assert_eq!(response[8], 0x02);

    let _ = shutdown.send(());
}
