//! Bluetooth UUIDs for color sensor peripherals.
//!
//! The sensor firmware exposes a single custom service carrying one
//! notify-capable characteristic. Notifications are enabled by writing the
//! standard Client Characteristic Configuration descriptor.

use uuid::{Uuid, uuid};

// --- Color sensor service and characteristic ---

/// Custom color sensor service UUID, also advertised for scan filtering.
pub const COLOR_SENSOR_SERVICE: Uuid = uuid!("9D86A3DA-467C-4224-B96C-36D5F85C1725");

/// Color reading characteristic (3 bytes, R/G/B), pushed via notifications.
pub const COLOR_READING: Uuid = uuid!("BEB5483E-36E1-4688-B7F5-EA07361B26A8");

// --- Standard descriptors ---

/// Client Characteristic Configuration descriptor (CCCD).
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// The identifiers a central needs to find and configure a color sensor.
///
/// Every field is a `Uuid`, so a descriptor is `Copy` and the shared
/// [`COLOR_SENSOR`] constant can be used from any thread without locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeripheralDescriptor {
    /// Service advertised by the peripheral and hosting the characteristic.
    pub service: Uuid,
    /// Characteristic carrying the readings.
    pub characteristic: Uuid,
    /// Descriptor written to enable notifications on the characteristic.
    pub config_descriptor: Uuid,
}

/// Descriptor of the color sensor firmware.
pub const COLOR_SENSOR: PeripheralDescriptor = PeripheralDescriptor {
    service: COLOR_SENSOR_SERVICE,
    characteristic: COLOR_READING,
    config_descriptor: CLIENT_CHARACTERISTIC_CONFIG,
};

impl Default for PeripheralDescriptor {
    fn default() -> Self {
        COLOR_SENSOR
    }
}
