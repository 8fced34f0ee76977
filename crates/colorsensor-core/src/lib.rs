//! Core BLE library for color sensors.
//!
//! This crate implements the client side of a small BLE protocol: a sensor
//! advertises one service with one characteristic, and pushes a 3-byte RGB
//! reading through notifications once the client enabled them.
//!
//! # Features
//!
//! - **Connection state machine**: [`ColorSensorCentral`] scans, connects,
//!   discovers services, enables notifications, and streams readings for one
//!   sensor, closing itself on any protocol error
//! - **Radio abstraction**: the [`Radio`](radio::Radio) trait, with a
//!   btleplug implementation ([`BtleRadio`]) and a scripted one for tests
//!   ([`MockRadio`])
//! - **Event delivery**: [`EventSink`] for callers, [`EventDispatcher`] to fan
//!   events out over a broadcast channel
//! - **Multi-sensor monitoring**: [`Monitor`] with staggered starts and
//!   connect deadlines
//!
//! # Lifecycle
//!
//! ```text
//!            connect()          match            link up
//! Closed ─────────────▶ Scanning ──────▶ Connecting ──────▶ Connected
//!   ▲                                                          │
//!   └──────────── close(), any error, remote disconnect ◀──────┘
//! ```
//!
//! Nothing is retried automatically. After an error or a disconnect the
//! central is closed and the caller decides whether to call `connect()` again.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use colorsensor_core::{BtleRadio, ColorSensorCentral, EventDispatcher, SensorEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = colorsensor_core::btle::default_adapter().await?;
//!     let radio = Arc::new(BtleRadio::new(adapter)?);
//!     let events = Arc::new(EventDispatcher::default());
//!     let mut rx = events.subscribe();
//!
//!     let central = ColorSensorCentral::new("ColorSensor", radio, &events);
//!     central.connect();
//!
//!     while let Ok(event) = rx.recv().await {
//!         if let SensorEvent::ValueReceived(color) = event.event {
//!             println!("#{}", color.hex_string());
//!             break;
//!         }
//!     }
//!
//!     central.close();
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod central;
pub mod error;
pub mod events;
pub mod mock;
pub mod monitor;
pub mod radio;

// Re-export types and uuid modules from colorsensor-types
pub use colorsensor_types::types;
pub use colorsensor_types::uuid;

// Core exports
pub use btle::BtleRadio;
pub use central::{ColorSensorCentral, ConnectionPhase};
pub use error::{Error, ErrorKind, Result};
pub use events::{
    ConnectionState, DeviceEvent, EventDispatcher, EventReceiver, EventSender, EventSink,
    SensorEvent,
};
pub use mock::MockRadio;
pub use monitor::{Monitor, MonitorConfig};

// Re-export from colorsensor-types
pub use colorsensor_types::uuid as uuids;
pub use colorsensor_types::{COLOR_SENSOR, ColorValue, ParseError, PeripheralDescriptor};

/// Type alias for a central driving the btleplug radio.
pub type BtleCentral = ColorSensorCentral<BtleRadio>;
