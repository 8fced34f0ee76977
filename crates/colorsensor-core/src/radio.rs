//! Abstract Bluetooth radio capability.
//!
//! This module provides the [`Radio`] trait that abstracts over a real
//! Bluetooth stack ([`BtleRadio`](crate::btle::BtleRadio)) and the scripted
//! [`MockRadio`](crate::mock::MockRadio) used in tests.
//!
//! The surface mirrors how BLE centrals are driven on most platforms: request
//! methods return immediately with an accept/reject answer, and the outcome
//! arrives later through a callback on an arbitrary thread.
//!
//! # Callback contract
//!
//! Implementations must never invoke a callback from inside one of the request
//! methods. A [`ColorSensorCentral`](crate::ColorSensorCentral) issues requests
//! while holding its internal lock, and callbacks re-acquire that lock.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Identity of an open link, assigned by the radio.
///
/// Callbacks carry the id of the link they belong to so a central can tell a
/// late callback from a previous attempt apart from one for its current link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Physical state reported by a link state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Filter applied by the radio while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    /// Only report peripherals advertising this service.
    pub service: Uuid,
    /// Only report peripherals whose advertised name equals this exactly.
    pub name: String,
}

impl ScanFilter {
    /// Create a filter for a service and an exact device name.
    pub fn new(service: Uuid, name: impl Into<String>) -> Self {
        Self {
            service,
            name: name.into(),
        }
    }

    /// Check an advertisement against the filter.
    pub fn matches(&self, services: &[Uuid], name: Option<&str>) -> bool {
        services.contains(&self.service) && name == Some(self.name.as_str())
    }
}

/// An open link owned by a central.
pub trait LinkHandle: Send {
    /// The id that callbacks for this link will carry.
    fn id(&self) -> LinkId;
}

/// Receives advertisement matches for a running scan.
pub trait ScanCallback<D>: Send + Sync {
    /// A peripheral matching the scan filter was seen.
    fn on_advertisement_matched(&self, device: D);

    /// The scan could not start, or stopped on its own before
    /// [`Radio::stop_scan`] was called. No further matches will arrive.
    fn on_scan_failed(&self);
}

/// Receives the asynchronous outcomes of requests made on one link.
///
/// Every method takes the link the event belongs to. `None` means the radio
/// failed to identify the link, which a central treats as a fatal error.
pub trait GattCallback: Send + Sync {
    /// The link connected, disconnected, or failed.
    fn on_connection_state_changed(&self, link: Option<LinkId>, success: bool, state: LinkState);

    /// A service discovery accepted by [`Radio::discover_services`] completed.
    fn on_services_discovered(&self, link: Option<LinkId>, success: bool);

    /// A descriptor write completed, typically the one issued by
    /// [`Radio::enable_notifications`].
    fn on_descriptor_write(&self, link: Option<LinkId>, success: bool, descriptor: Option<Uuid>);

    /// A characteristic pushed a new value.
    fn on_characteristic_changed(
        &self,
        link: Option<LinkId>,
        characteristic: Option<Uuid>,
        value: &[u8],
    );
}

/// The platform capability a central drives.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use colorsensor_core::radio::{Radio, ScanCallback, ScanFilter};
/// use colorsensor_core::uuid::COLOR_SENSOR_SERVICE;
///
/// fn start<R: Radio>(radio: &R, on_match: Arc<dyn ScanCallback<R::Device>>) {
///     radio.start_filtered_scan(ScanFilter::new(COLOR_SENSOR_SERVICE, "S1"), on_match);
/// }
/// ```
pub trait Radio: Send + Sync + 'static {
    /// A discovered peripheral that a link can be opened to.
    type Device: Send + 'static;
    /// An open link.
    type Link: LinkHandle + 'static;
    /// A discovered GATT service.
    type Service;
    /// A discovered GATT characteristic.
    type Characteristic;

    /// Start scanning. Matches are reported to `on_match` until
    /// [`stop_scan`](Self::stop_scan) is called.
    fn start_filtered_scan(&self, filter: ScanFilter, on_match: Arc<dyn ScanCallback<Self::Device>>);

    /// Stop the scan started by this radio, if any.
    fn stop_scan(&self);

    /// Open a link to `device`. Returns `None` if the stack refused.
    ///
    /// The radio keeps `callback` for the lifetime of the link and releases it
    /// in [`close_link`](Self::close_link).
    fn open_link(&self, device: Self::Device, callback: Arc<dyn GattCallback>)
    -> Option<Self::Link>;

    /// Disconnect and release a link.
    fn close_link(&self, link: Self::Link);

    /// Request service discovery. Returns whether the request was accepted.
    fn discover_services(&self, link: &Self::Link) -> bool;

    /// Look up a discovered service.
    fn lookup_service(&self, link: &Self::Link, service: Uuid) -> Option<Self::Service>;

    /// Look up a characteristic within a service.
    fn lookup_characteristic(
        &self,
        service: &Self::Service,
        characteristic: Uuid,
    ) -> Option<Self::Characteristic>;

    /// Enable notifications on a characteristic by writing its configuration
    /// descriptor. Returns whether every step of the request was accepted.
    fn enable_notifications(&self, link: &Self::Link, characteristic: &Self::Characteristic)
    -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use colorsensor_types::uuid::{COLOR_READING, COLOR_SENSOR_SERVICE};

    #[test]
    fn test_scan_filter_requires_service_and_exact_name() {
        let filter = ScanFilter::new(COLOR_SENSOR_SERVICE, "S1");

        assert!(filter.matches(&[COLOR_SENSOR_SERVICE], Some("S1")));
        assert!(!filter.matches(&[COLOR_SENSOR_SERVICE], Some("S10")));
        assert!(!filter.matches(&[COLOR_SENSOR_SERVICE], Some("s1")));
        assert!(!filter.matches(&[COLOR_SENSOR_SERVICE], None));
        assert!(!filter.matches(&[COLOR_READING], Some("S1")));
        assert!(!filter.matches(&[], Some("S1")));
    }

    #[test]
    fn test_link_id_display() {
        assert_eq!(LinkId(7).to_string(), "link#7");
    }
}
