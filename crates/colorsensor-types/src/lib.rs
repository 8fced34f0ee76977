//! Platform-agnostic types for BLE color sensors.
//!
//! This crate provides the pieces of the color sensor protocol that do not
//! depend on a Bluetooth stack, so they can be shared by the core library,
//! the CLI, and tests.
//!
//! # Features
//!
//! - [`ColorValue`]: the 3-byte RGB reading and its codec
//! - [`PeripheralDescriptor`]: service, characteristic and descriptor UUIDs
//! - Error types for payload parsing
//!
//! # Example
//!
//! ```
//! use colorsensor_types::{ColorValue, COLOR_SENSOR};
//!
//! let value = ColorValue::decode(&[0x12, 0x34, 0x56]).unwrap();
//! assert_eq!(value.rgb(), 0x123456);
//! assert_ne!(COLOR_SENSOR.service, COLOR_SENSOR.characteristic);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::ColorValue;
pub use uuid as uuids;
pub use uuid::{COLOR_SENSOR, PeripheralDescriptor};
