//! Mock radio implementation for testing.
//!
//! This module provides a scripted [`Radio`] that can be used to drive a
//! [`ColorSensorCentral`](crate::ColorSensorCentral) through every protocol
//! path without Bluetooth hardware.
//!
//! The mock records every request it receives and keeps the callbacks it was
//! handed. Nothing happens asynchronously on its own: the test plays the part
//! of the platform by calling [`MockRadio::advertise`],
//! [`MockRadio::link_state`] and friends, which invoke the stored callbacks
//! from the test thread after the request that registered them returned.
//!
//! # Features
//!
//! - **Failure injection**: fail the scan, refuse links, reject discovery or notification requests
//! - **GATT layout control**: remove the service or characteristic
//! - **Call log**: assert on the exact requests a central issued

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use colorsensor_types::uuid::{COLOR_READING, COLOR_SENSOR_SERVICE};

use crate::radio::{
    GattCallback, LinkHandle, LinkId, LinkState, Radio, ScanCallback, ScanFilter,
};

/// A peripheral seen by the mock radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPeripheral {
    /// Advertised name.
    pub name: String,
}

/// A link opened by the mock radio.
#[derive(Debug, PartialEq, Eq)]
pub struct MockLink {
    id: LinkId,
}

impl LinkHandle for MockLink {
    fn id(&self) -> LinkId {
        self.id
    }
}

/// A GATT service in the mock's attribute table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockService {
    /// Service UUID.
    pub uuid: Uuid,
    /// UUIDs of the characteristics in the service.
    pub characteristics: Vec<Uuid>,
}

/// A request received by the mock radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartScan(ScanFilter),
    StopScan,
    OpenLink(String),
    CloseLink(LinkId),
    DiscoverServices(LinkId),
    LookupService(Uuid),
    LookupCharacteristic(Uuid),
    EnableNotifications(LinkId, Uuid),
}

struct MockState {
    calls: Vec<RadioCall>,
    scan: Option<(ScanFilter, Arc<dyn ScanCallback<MockPeripheral>>)>,
    links: HashMap<LinkId, Arc<dyn GattCallback>>,
    current_link: Option<LinkId>,
    services: Vec<MockService>,
    refuse_links: bool,
    reject_discovery: bool,
    reject_notifications: bool,
}

/// A scripted radio for testing centrals.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use colorsensor_core::{ColorSensorCentral, ConnectionPhase, EventDispatcher, MockRadio};
/// use colorsensor_core::radio::LinkState;
///
/// let radio = Arc::new(MockRadio::new());
/// let events = Arc::new(EventDispatcher::default());
/// let central = ColorSensorCentral::new("S1", radio.clone(), &events);
///
/// central.connect();
/// assert!(radio.advertise("S1"));
/// radio.link_state(true, LinkState::Connected);
/// assert_eq!(central.phase(), ConnectionPhase::Connected);
/// ```
pub struct MockRadio {
    state: Mutex<MockState>,
    next_link: AtomicU64,
}

impl std::fmt::Debug for MockRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MockRadio")
            .field("calls", &state.calls.len())
            .field("scanning", &state.scan.is_some())
            .field("open_links", &state.links.len())
            .finish()
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    /// Create a mock radio exposing a well-formed color sensor.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                scan: None,
                links: HashMap::new(),
                current_link: None,
                services: vec![MockService {
                    uuid: COLOR_SENSOR_SERVICE,
                    characteristics: vec![COLOR_READING],
                }],
                refuse_links: false,
                reject_discovery: false,
                reject_notifications: false,
            }),
            next_link: AtomicU64::new(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Failure injection ---

    /// Make `open_link` return `None`.
    pub fn refuse_links(&self, refuse: bool) {
        self.state().refuse_links = refuse;
    }

    /// Make `discover_services` reject the request.
    pub fn reject_discovery(&self, reject: bool) {
        self.state().reject_discovery = reject;
    }

    /// Make `enable_notifications` reject the request.
    pub fn reject_notifications(&self, reject: bool) {
        self.state().reject_notifications = reject;
    }

    /// Replace the attribute table.
    pub fn set_services(&self, services: Vec<MockService>) {
        self.state().services = services;
    }

    /// Remove the color sensor service from the attribute table.
    pub fn remove_service(&self) {
        self.state()
            .services
            .retain(|s| s.uuid != COLOR_SENSOR_SERVICE);
    }

    /// Remove the reading characteristic from the color sensor service.
    pub fn remove_characteristic(&self) {
        for service in &mut self.state().services {
            service.characteristics.retain(|c| *c != COLOR_READING);
        }
    }

    // --- Platform events ---

    /// Report an advertisement from a peripheral named `name`.
    ///
    /// Returns `true` if a running scan matched it and its callback was
    /// invoked.
    pub fn advertise(&self, name: &str) -> bool {
        let callback = {
            let state = self.state();
            match &state.scan {
                Some((filter, callback)) if filter.matches(&[filter.service], Some(name)) => {
                    Arc::clone(callback)
                }
                _ => return false,
            }
        };
        callback.on_advertisement_matched(MockPeripheral {
            name: name.to_string(),
        });
        true
    }

    /// Report that the running scan failed.
    ///
    /// Returns `true` if a scan was running and its callback was invoked.
    pub fn fail_scan(&self) -> bool {
        let callback = match &self.state().scan {
            Some((_, callback)) => Arc::clone(callback),
            None => return false,
        };
        callback.on_scan_failed();
        true
    }

    /// The callback and id of the most recently opened link, while it is open.
    pub fn gatt_callback(&self) -> Option<(LinkId, Arc<dyn GattCallback>)> {
        let state = self.state();
        let id = state.current_link?;
        state.links.get(&id).map(|cb| (id, Arc::clone(cb)))
    }

    /// Report a link state change on the current link.
    pub fn link_state(&self, success: bool, link_state: LinkState) -> bool {
        self.with_current_link(|id, cb| cb.on_connection_state_changed(Some(id), success, link_state))
    }

    /// Report completion of service discovery on the current link.
    pub fn services_discovered(&self, success: bool) -> bool {
        self.with_current_link(|id, cb| cb.on_services_discovered(Some(id), success))
    }

    /// Report completion of a descriptor write on the current link.
    pub fn descriptor_written(&self, success: bool, descriptor: Uuid) -> bool {
        self.with_current_link(|id, cb| cb.on_descriptor_write(Some(id), success, Some(descriptor)))
    }

    /// Push a notification for `characteristic` on the current link.
    pub fn notify(&self, characteristic: Uuid, value: &[u8]) -> bool {
        self.with_current_link(|id, cb| {
            cb.on_characteristic_changed(Some(id), Some(characteristic), value)
        })
    }

    fn with_current_link(&self, f: impl FnOnce(LinkId, &dyn GattCallback)) -> bool {
        match self.gatt_callback() {
            Some((id, callback)) => {
                f(id, callback.as_ref());
                true
            }
            None => false,
        }
    }

    // --- Inspection ---

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<RadioCall> {
        self.state().calls.clone()
    }

    /// Number of recorded requests matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&RadioCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of `start_filtered_scan` requests.
    pub fn start_scan_count(&self) -> usize {
        self.count(|c| matches!(c, RadioCall::StartScan(_)))
    }

    /// Number of `stop_scan` requests.
    pub fn stop_scan_count(&self) -> usize {
        self.count(|c| matches!(c, RadioCall::StopScan))
    }

    /// Number of `open_link` requests, refused ones included.
    pub fn open_link_count(&self) -> usize {
        self.count(|c| matches!(c, RadioCall::OpenLink(_)))
    }

    /// Number of links released through `close_link`.
    pub fn close_link_count(&self) -> usize {
        self.count(|c| matches!(c, RadioCall::CloseLink(_)))
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.state().scan.is_some()
    }

    /// Number of links opened and not yet closed.
    pub fn open_links(&self) -> usize {
        self.state().links.len()
    }
}

impl Radio for MockRadio {
    type Device = MockPeripheral;
    type Link = MockLink;
    type Service = MockService;
    type Characteristic = Uuid;

    fn start_filtered_scan(&self, filter: ScanFilter, on_match: Arc<dyn ScanCallback<MockPeripheral>>) {
        let mut state = self.state();
        state.calls.push(RadioCall::StartScan(filter.clone()));
        state.scan = Some((filter, on_match));
    }

    fn stop_scan(&self) {
        let mut state = self.state();
        state.calls.push(RadioCall::StopScan);
        state.scan = None;
    }

    fn open_link(&self, device: MockPeripheral, callback: Arc<dyn GattCallback>) -> Option<MockLink> {
        let mut state = self.state();
        state.calls.push(RadioCall::OpenLink(device.name));
        if state.refuse_links {
            return None;
        }
        let id = LinkId(self.next_link.fetch_add(1, Ordering::Relaxed));
        state.links.insert(id, callback);
        state.current_link = Some(id);
        Some(MockLink { id })
    }

    fn close_link(&self, link: MockLink) {
        let mut state = self.state();
        state.calls.push(RadioCall::CloseLink(link.id));
        state.links.remove(&link.id);
    }

    fn discover_services(&self, link: &MockLink) -> bool {
        let mut state = self.state();
        state.calls.push(RadioCall::DiscoverServices(link.id));
        !state.reject_discovery
    }

    fn lookup_service(&self, _link: &MockLink, service: Uuid) -> Option<MockService> {
        let mut state = self.state();
        state.calls.push(RadioCall::LookupService(service));
        state.services.iter().find(|s| s.uuid == service).cloned()
    }

    fn lookup_characteristic(&self, service: &MockService, characteristic: Uuid) -> Option<Uuid> {
        self.state()
            .calls
            .push(RadioCall::LookupCharacteristic(characteristic));
        service
            .characteristics
            .iter()
            .copied()
            .find(|c| *c == characteristic)
    }

    fn enable_notifications(&self, link: &MockLink, characteristic: &Uuid) -> bool {
        let mut state = self.state();
        state
            .calls
            .push(RadioCall::EnableNotifications(link.id, *characteristic));
        !state.reject_notifications
    }
}
