//! Example: Streaming Colors From One Sensor
//!
//! This example connects to a color sensor by its advertised name and prints
//! every color it reports until Ctrl-C is pressed or the connection ends.
//!
//! Run with: `cargo run --example watch_sensor -- <DEVICE_NAME>`

use std::env;
use std::sync::Arc;

use colorsensor_core::btle::default_adapter;
use colorsensor_core::{
    BtleRadio, ColorSensorCentral, ConnectionState, EventDispatcher, SensorEvent,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let Some(name) = args.get(1) else {
        eprintln!("Usage: {} <DEVICE_NAME>", args[0]);
        std::process::exit(1);
    };

    let adapter = default_adapter().await?;
    let radio = Arc::new(BtleRadio::new(adapter)?);
    let events = Arc::new(EventDispatcher::default());
    let mut rx = events.subscribe();

    let central = ColorSensorCentral::new(name.as_str(), radio, &events);
    central.connect();
    println!("Scanning for {}...", name);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => {
                let Ok(event) = event else { break };
                match event.event {
                    SensorEvent::StateChanged(ConnectionState::Disconnected) => {
                        println!("Sensor disconnected");
                        break;
                    }
                    SensorEvent::StateChanged(state) => println!("State: {:?}", state),
                    SensorEvent::ValueReceived(color) => println!("#{}", color.hex_string()),
                    SensorEvent::Error(kind) if kind.is_terminal() => {
                        eprintln!("Error: {}", kind);
                        break;
                    }
                    SensorEvent::Error(kind) => eprintln!("Warning: {}", kind),
                }
            }
        }
    }

    central.close();
    Ok(())
}
