//! Error types for colorsensor-core.
//!
//! Two families of errors live here:
//!
//! - [`ErrorKind`] is the protocol error taxonomy of a connection attempt. These
//!   never escape as `Err` values: a [`ColorSensorCentral`](crate::ColorSensorCentral)
//!   reports them to its event sink, after it has already closed the link.
//! - [`Error`] covers everything around the state machine: acquiring a
//!   Bluetooth adapter, invalid configuration, and similar failures that are
//!   returned through [`Result`].
//!
//! # Recovery
//!
//! No error is retried by the core. Every [`ErrorKind`] except
//! [`ErrorKind::InvalidValue`] ends the current attempt and leaves the central
//! in the closed phase, so the caller decides whether and when to call
//! `connect()` again.
//!
//! | Error Kind | Link after report | Typical cause |
//! |------------|-------------------|---------------|
//! | [`ErrorKind::ConnectGatt`] | closed | Stack refused to open a link |
//! | [`ErrorKind::ConnectionState`] | closed | Link failed or dropped with an error status |
//! | [`ErrorKind::DiscoverServices`] | closed | Discovery request rejected |
//! | [`ErrorKind::ServiceDiscovery`] | closed | Discovery completed with an error |
//! | [`ErrorKind::ServiceNotFound`] | closed | Wrong peripheral or firmware |
//! | [`ErrorKind::CharacteristicNotFound`] | closed | Wrong firmware |
//! | [`ErrorKind::EnableNotification`] | closed | Notify not supported or request rejected |
//! | [`ErrorKind::DescriptorWrite`] | closed | CCCD write failed |
//! | [`ErrorKind::InvalidValue`] | **open** | A single malformed reading |
//! | [`ErrorKind::Fatal`] | closed | The radio layer misbehaved |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors reported through [`EventSink::on_error`](crate::EventSink::on_error).
///
/// Each occurrence is reported exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The radio could not open a link to the matched peripheral.
    #[error("failed to open a GATT link")]
    ConnectGatt,

    /// A link state change arrived with a failure status.
    #[error("connection state change reported an error")]
    ConnectionState,

    /// The radio rejected the service discovery request.
    #[error("service discovery request was rejected")]
    DiscoverServices,

    /// Service discovery completed with a failure status.
    #[error("service discovery failed")]
    ServiceDiscovery,

    /// The color sensor service is missing from the discovered services.
    #[error("color sensor service not found")]
    ServiceNotFound,

    /// The color reading characteristic is missing from the service.
    #[error("color reading characteristic not found")]
    CharacteristicNotFound,

    /// Enabling notifications on the characteristic was rejected.
    #[error("failed to enable notifications")]
    EnableNotification,

    /// Writing the notification configuration descriptor failed.
    #[error("descriptor write failed")]
    DescriptorWrite,

    /// A notification carried a payload that is not a valid color reading.
    #[error("invalid color value received")]
    InvalidValue,

    /// The radio layer delivered something it never should have, such as a
    /// callback without a link or a write to an unexpected descriptor.
    #[error("fatal radio error")]
    Fatal,
}

impl ErrorKind {
    /// Every error kind, in the order a setup sequence can produce them.
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::ConnectGatt,
        ErrorKind::ConnectionState,
        ErrorKind::DiscoverServices,
        ErrorKind::ServiceDiscovery,
        ErrorKind::ServiceNotFound,
        ErrorKind::CharacteristicNotFound,
        ErrorKind::EnableNotification,
        ErrorKind::DescriptorWrite,
        ErrorKind::InvalidValue,
        ErrorKind::Fatal,
    ];

    /// Whether reporting this error also closes the link.
    ///
    /// Only a malformed reading leaves the session streaming.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ErrorKind::InvalidValue)
    }
}

/// Errors returned by the fallible, non-protocol parts of colorsensor-core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter is available on this host.
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    /// No Tokio runtime is available to drive radio requests.
    #[error("No Tokio runtime available: {0}")]
    NoRuntime(String),

    /// The adapter stopped delivering events while a scan was running.
    #[error("Adapter event stream closed")]
    EventStreamClosed,

    /// A sensor name was empty or otherwise unusable.
    #[error("Invalid sensor name: {0:?}")]
    InvalidName(String),

    /// A connect deadline expired before the sensor connected.
    #[error("Sensor '{name}' did not connect within {duration:?}")]
    Timeout {
        /// The sensor that timed out.
        name: String,
        /// The deadline that expired.
        duration: Duration,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a timeout error for a sensor.
    pub fn timeout(name: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            name: name.into(),
            duration,
        }
    }
}

/// Result type alias using colorsensor-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
