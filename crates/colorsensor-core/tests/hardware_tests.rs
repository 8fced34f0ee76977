//! Hardware integration tests for colorsensor-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```text
//! cargo test --package colorsensor-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Set the `COLORSENSOR_DEVICE` environment variable to the advertised name of
//! the sensor to test. If not set, "ColorSensor" is used.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use colorsensor_core::btle::default_adapter;
use colorsensor_core::{
    BtleRadio, ColorSensorCentral, ConnectionState, EventDispatcher, SensorEvent,
};
use tokio::time::timeout;

/// Default timeout for BLE operations.
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

fn get_device_name() -> String {
    env::var("COLORSENSOR_DEVICE")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "ColorSensor".to_string())
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_and_receive_color() {
    let name = get_device_name();
    println!("Connecting to sensor: {}", name);

    let adapter = default_adapter().await.expect("no Bluetooth adapter");
    let radio = Arc::new(BtleRadio::new(adapter).expect("runtime"));
    let events = Arc::new(EventDispatcher::default());
    let mut rx = events.subscribe();

    let central = ColorSensorCentral::new(name.as_str(), radio, &events);
    assert!(central.connect());

    let result = timeout(BLE_TIMEOUT, async {
        let mut setup_finished = false;
        loop {
            let event = rx.recv().await.expect("event channel closed");
            println!("{:?}", event.event);
            match event.event {
                SensorEvent::StateChanged(ConnectionState::SetupFinished) => setup_finished = true,
                SensorEvent::ValueReceived(color) => return (setup_finished, color),
                SensorEvent::Error(kind) if kind.is_terminal() => panic!("setup failed: {}", kind),
                _ => {}
            }
        }
    })
    .await;

    central.close();

    let (setup_finished, color) = result.expect("no color received in time");
    assert!(setup_finished, "values arrived before setup finished");
    println!("Received #{}", color.hex_string());
}
