//! Connection state machine for a single color sensor.
//!
//! A [`ColorSensorCentral`] monitors one sensor, identified by its advertised
//! name. It drives the radio through the setup sequence
//!
//! ```text
//! Closed -> Scanning -> Connecting -> Connected -> (SetupFinished) streaming
//! ```
//!
//! and reports every milestone, reading and error to its [`EventSink`].
//!
//! Errors end the attempt: the central closes itself (stopping the scan and
//! releasing the link) before the error reaches the sink, and waits for the
//! caller to call [`connect`](ColorSensorCentral::connect) again. The only
//! exception is a malformed reading, which is reported while streaming
//! continues.
//!
//! # Concurrency
//!
//! Phase and link live behind one mutex. Radio requests are issued with the
//! mutex held, and the sink is always invoked after it is released. Radio
//! callbacks may arrive on any thread; a callback that races a
//! [`close`](ColorSensorCentral::close) finds the central closed and does
//! nothing.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use colorsensor_types::{COLOR_SENSOR, ColorValue, PeripheralDescriptor};

use crate::error::ErrorKind;
use crate::events::{ConnectionState, EventSink, SensorEvent};
use crate::radio::{GattCallback, LinkHandle, LinkId, LinkState, Radio, ScanCallback, ScanFilter};

/// Lifecycle phase of a central.
///
/// Within one attempt phases only move forward, in declaration order. Every
/// way out of an attempt leads back to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionPhase {
    /// Idle. No scan and no link.
    Closed,
    /// A filtered scan is running.
    Scanning,
    /// A link was opened and is waiting for the peripheral.
    Connecting,
    /// The link is up. Setup continues (or streaming runs) in this phase.
    Connected,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionPhase::Closed => "closed",
            ConnectionPhase::Scanning => "scanning",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
        };
        f.write_str(s)
    }
}

struct Inner<L> {
    phase: ConnectionPhase,
    /// Present only while `phase` is `Connecting` or `Connected`.
    link: Option<L>,
    /// Set once notifications are enabled on the current link.
    setup_finished: bool,
}

/// Result of checking a callback's link against the held one.
enum LinkCheck {
    Current,
    Stale,
    Missing,
}

/// Client-side connection to one color sensor.
///
/// Created through [`new`](Self::new), which returns an `Arc` because radio
/// callbacks need a way back to the central. Callbacks only hold a weak
/// reference, so dropping the last `Arc` ends the central.
///
/// # Cleanup
///
/// Call [`close`](Self::close) when monitoring stops. Dropping a central that
/// is not closed releases its radio resources and logs a warning.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use colorsensor_core::{ColorSensorCentral, ConnectionPhase, EventDispatcher, MockRadio};
///
/// let radio = Arc::new(MockRadio::new());
/// let events = Arc::new(EventDispatcher::default());
/// let central = ColorSensorCentral::new("S1", radio.clone(), &events);
///
/// assert!(central.connect());
/// assert_eq!(central.phase(), ConnectionPhase::Scanning);
/// assert!(!central.connect());
///
/// central.close();
/// assert_eq!(central.phase(), ConnectionPhase::Closed);
/// ```
pub struct ColorSensorCentral<R: Radio> {
    device_name: String,
    descriptor: PeripheralDescriptor,
    radio: Arc<R>,
    sink: Weak<dyn EventSink>,
    inner: Mutex<Inner<R::Link>>,
    this: Weak<Self>,
}

impl<R: Radio> fmt::Debug for ColorSensorCentral<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorSensorCentral")
            .field("device_name", &self.device_name)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl<R: Radio> ColorSensorCentral<R> {
    /// Create a central for the sensor advertising as `device_name`.
    ///
    /// The central keeps only a weak reference to `sink`.
    pub fn new<S>(device_name: impl Into<String>, radio: Arc<R>, sink: &Arc<S>) -> Arc<Self>
    where
        S: EventSink + 'static,
    {
        let sink: Weak<S> = Arc::downgrade(sink);
        Self::with_descriptor(device_name, COLOR_SENSOR, radio, sink)
    }

    /// Create a central for a peripheral with custom identifiers.
    pub fn with_descriptor(
        device_name: impl Into<String>,
        descriptor: PeripheralDescriptor,
        radio: Arc<R>,
        sink: Weak<dyn EventSink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            device_name: device_name.into(),
            descriptor,
            radio,
            sink,
            inner: Mutex::new(Inner {
                phase: ConnectionPhase::Closed,
                link: None,
                setup_finished: false,
            }),
            this: this.clone(),
        })
    }

    /// Name of the monitored sensor.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Identifiers this central looks for.
    pub fn descriptor(&self) -> &PeripheralDescriptor {
        &self.descriptor
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.lock().phase
    }

    /// Whether the central is idle.
    pub fn is_closed(&self) -> bool {
        self.phase() == ConnectionPhase::Closed
    }

    /// Start a connection attempt.
    ///
    /// Starts a scan filtered on the sensor service and exact device name, and
    /// returns `true`. If an attempt is already running, nothing happens and
    /// `false` is returned.
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.device_name))]
    pub fn connect(&self) -> bool {
        {
            let mut inner = self.lock();
            if inner.phase != ConnectionPhase::Closed {
                debug!(phase = %inner.phase, "connect ignored, attempt already running");
                return false;
            }
            let filter = ScanFilter::new(self.descriptor.service, self.device_name.as_str());
            self.radio.start_filtered_scan(filter, self.dispatch());
            inner.phase = ConnectionPhase::Scanning;
        }
        info!("Scanning for sensor...");
        self.emit(vec![SensorEvent::StateChanged(ConnectionState::Scanning)]);
        true
    }

    /// Stop the scan, release the link and return to `Closed`.
    ///
    /// Safe to call from any phase and any number of times.
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.device_name))]
    pub fn close(&self) {
        let mut inner = self.lock();
        self.close_locked(&mut inner);
    }

    fn lock(&self) -> MutexGuard<'_, Inner<R::Link>> {
        // Phase and link stay consistent even if a sink panicked on another
        // thread, since the sink never runs under this lock.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self) -> Arc<Dispatch<R>> {
        Arc::new(Dispatch {
            central: self.this.clone(),
        })
    }

    fn close_locked(&self, inner: &mut Inner<R::Link>) {
        if inner.phase == ConnectionPhase::Scanning {
            self.radio.stop_scan();
        }
        if let Some(link) = inner.link.take() {
            debug!(link = %link.id(), "releasing link");
            self.radio.close_link(link);
        }
        if inner.phase != ConnectionPhase::Closed {
            debug!(from = %inner.phase, "closed");
        }
        inner.phase = ConnectionPhase::Closed;
        inner.setup_finished = false;
    }

    /// Close the attempt and produce the error event for `kind`.
    fn fail(&self, inner: &mut Inner<R::Link>, kind: ErrorKind) -> SensorEvent {
        self.close_locked(inner);
        SensorEvent::Error(kind)
    }

    fn check_link(&self, inner: &Inner<R::Link>, link: Option<LinkId>) -> LinkCheck {
        let Some(held) = inner.link.as_ref() else {
            // Closed (or still scanning): the callback lost a race with close()
            // or belongs to an earlier attempt.
            return LinkCheck::Stale;
        };
        match link {
            None => LinkCheck::Missing,
            Some(id) if id == held.id() => LinkCheck::Current,
            Some(id) => {
                warn!(device = %self.device_name, link = %id, current = %held.id(), "callback for a stale link");
                LinkCheck::Stale
            }
        }
    }

    fn emit(&self, events: Vec<SensorEvent>) {
        if events.is_empty() {
            return;
        }
        let Some(sink) = self.sink.upgrade() else {
            trace!(device = %self.device_name, "event sink dropped, discarding events");
            return;
        };
        for event in events {
            if let SensorEvent::Error(kind) = event {
                warn!(device = %self.device_name, error = %kind, terminal = kind.is_terminal(), "sensor error");
            }
            sink.deliver(&self.device_name, event);
        }
    }

    // --- Radio callback handlers ---

    fn handle_advertisement_matched(&self, device: R::Device) {
        let event = {
            let mut inner = self.lock();
            if inner.phase != ConnectionPhase::Scanning {
                debug!(device = %self.device_name, phase = %inner.phase, "ignoring advertisement");
                return;
            }
            self.radio.stop_scan();
            inner.phase = ConnectionPhase::Connecting;

            match self.radio.open_link(device, self.dispatch()) {
                Some(link) => {
                    info!(device = %self.device_name, link = %link.id(), "Sensor found, connecting...");
                    inner.link = Some(link);
                    SensorEvent::StateChanged(ConnectionState::Connecting)
                }
                None => self.fail(&mut inner, ErrorKind::ConnectGatt),
            }
        };
        self.emit(vec![event]);
    }

    fn handle_scan_failed(&self) {
        let event = {
            let mut inner = self.lock();
            if inner.phase != ConnectionPhase::Scanning {
                debug!(device = %self.device_name, phase = %inner.phase, "ignoring scan failure");
                return;
            }
            self.fail(&mut inner, ErrorKind::Fatal)
        };
        self.emit(vec![event]);
    }

    fn handle_connection_state_changed(&self, link: Option<LinkId>, success: bool, state: LinkState) {
        let events = {
            let mut inner = self.lock();
            match self.check_link(&inner, link) {
                LinkCheck::Stale => return,
                LinkCheck::Missing => vec![self.fail(&mut inner, ErrorKind::Fatal)],
                LinkCheck::Current if !success => {
                    vec![self.fail(&mut inner, ErrorKind::ConnectionState)]
                }
                LinkCheck::Current => match state {
                    LinkState::Connected if inner.phase != ConnectionPhase::Connecting => {
                        debug!(device = %self.device_name, "duplicate connected notification");
                        return;
                    }
                    LinkState::Connected => {
                        info!(device = %self.device_name, "Connected!");
                        inner.phase = ConnectionPhase::Connected;
                        let mut events = vec![SensorEvent::StateChanged(ConnectionState::Connected)];
                        let accepted = inner
                            .link
                            .as_ref()
                            .is_some_and(|link| self.radio.discover_services(link));
                        if accepted {
                            debug!(device = %self.device_name, "service discovery requested");
                        } else {
                            events.push(self.fail(&mut inner, ErrorKind::DiscoverServices));
                        }
                        events
                    }
                    LinkState::Disconnected => {
                        info!(device = %self.device_name, "Sensor disconnected");
                        self.close_locked(&mut inner);
                        vec![SensorEvent::StateChanged(ConnectionState::Disconnected)]
                    }
                },
            }
        };
        self.emit(events);
    }

    fn handle_services_discovered(&self, link: Option<LinkId>, success: bool) {
        let event = {
            let mut inner = self.lock();
            match self.check_link(&inner, link) {
                LinkCheck::Stale => return,
                LinkCheck::Missing => self.fail(&mut inner, ErrorKind::Fatal),
                LinkCheck::Current if inner.phase != ConnectionPhase::Connected => {
                    warn!(device = %self.device_name, phase = %inner.phase, "services discovered before the link connected");
                    self.fail(&mut inner, ErrorKind::Fatal)
                }
                LinkCheck::Current if !success => self.fail(&mut inner, ErrorKind::ServiceDiscovery),
                LinkCheck::Current => {
                    let outcome = match inner.link.as_ref() {
                        Some(link) => self.request_notifications(link),
                        None => Err(ErrorKind::Fatal),
                    };
                    match outcome {
                        Ok(()) => {
                            debug!(device = %self.device_name, "notification enable requested");
                            return;
                        }
                        Err(kind) => self.fail(&mut inner, kind),
                    }
                }
            }
        };
        self.emit(vec![event]);
    }

    fn request_notifications(&self, link: &R::Link) -> Result<(), ErrorKind> {
        let service = self
            .radio
            .lookup_service(link, self.descriptor.service)
            .ok_or(ErrorKind::ServiceNotFound)?;
        let characteristic = self
            .radio
            .lookup_characteristic(&service, self.descriptor.characteristic)
            .ok_or(ErrorKind::CharacteristicNotFound)?;
        if self.radio.enable_notifications(link, &characteristic) {
            Ok(())
        } else {
            Err(ErrorKind::EnableNotification)
        }
    }

    fn handle_descriptor_write(&self, link: Option<LinkId>, success: bool, descriptor: Option<Uuid>) {
        let event = {
            let mut inner = self.lock();
            match self.check_link(&inner, link) {
                LinkCheck::Stale => return,
                LinkCheck::Missing => self.fail(&mut inner, ErrorKind::Fatal),
                LinkCheck::Current if inner.phase != ConnectionPhase::Connected => {
                    warn!(device = %self.device_name, phase = %inner.phase, "descriptor written before the link connected");
                    self.fail(&mut inner, ErrorKind::Fatal)
                }
                LinkCheck::Current if !success => self.fail(&mut inner, ErrorKind::DescriptorWrite),
                LinkCheck::Current if descriptor == Some(self.descriptor.config_descriptor) => {
                    info!(device = %self.device_name, "Setup finished, streaming readings");
                    inner.setup_finished = true;
                    SensorEvent::StateChanged(ConnectionState::SetupFinished)
                }
                LinkCheck::Current => {
                    warn!(device = %self.device_name, ?descriptor, "write completed on unexpected descriptor");
                    self.fail(&mut inner, ErrorKind::Fatal)
                }
            }
        };
        self.emit(vec![event]);
    }

    fn handle_characteristic_changed(
        &self,
        link: Option<LinkId>,
        characteristic: Option<Uuid>,
        value: &[u8],
    ) {
        let event = {
            let mut inner = self.lock();
            match self.check_link(&inner, link) {
                LinkCheck::Stale => return,
                LinkCheck::Missing => self.fail(&mut inner, ErrorKind::Fatal),
                LinkCheck::Current => match characteristic {
                    None => self.fail(&mut inner, ErrorKind::Fatal),
                    Some(uuid) if uuid != self.descriptor.characteristic => {
                        trace!(device = %self.device_name, %uuid, "ignoring notification");
                        return;
                    }
                    Some(_) if !inner.setup_finished => {
                        debug!(device = %self.device_name, "ignoring reading before setup finished");
                        return;
                    }
                    Some(_) => match ColorValue::decode(value) {
                        Some(color) => SensorEvent::ValueReceived(color),
                        // A bad reading does not end the session.
                        None => SensorEvent::Error(ErrorKind::InvalidValue),
                    },
                },
            }
        };
        self.emit(vec![event]);
    }
}

impl<R: Radio> Drop for ColorSensorCentral<R> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.phase == ConnectionPhase::Closed {
            return;
        }
        warn!(
            device = %self.device_name,
            phase = %inner.phase,
            "Central dropped without calling close() - releasing radio resources"
        );
        if inner.phase == ConnectionPhase::Scanning {
            self.radio.stop_scan();
        }
        if let Some(link) = inner.link.take() {
            self.radio.close_link(link);
        }
        inner.phase = ConnectionPhase::Closed;
    }
}

/// Callback handle given to the radio.
///
/// Holds no state of its own and forwards every callback to the central's
/// locked handlers. Once the central is gone, callbacks are dropped.
struct Dispatch<R: Radio> {
    central: Weak<ColorSensorCentral<R>>,
}

impl<R: Radio> ScanCallback<R::Device> for Dispatch<R> {
    fn on_advertisement_matched(&self, device: R::Device) {
        if let Some(central) = self.central.upgrade() {
            central.handle_advertisement_matched(device);
        }
    }

    fn on_scan_failed(&self) {
        if let Some(central) = self.central.upgrade() {
            central.handle_scan_failed();
        }
    }
}

impl<R: Radio> GattCallback for Dispatch<R> {
    fn on_connection_state_changed(&self, link: Option<LinkId>, success: bool, state: LinkState) {
        if let Some(central) = self.central.upgrade() {
            central.handle_connection_state_changed(link, success, state);
        }
    }

    fn on_services_discovered(&self, link: Option<LinkId>, success: bool) {
        if let Some(central) = self.central.upgrade() {
            central.handle_services_discovered(link, success);
        }
    }

    fn on_descriptor_write(&self, link: Option<LinkId>, success: bool, descriptor: Option<Uuid>) {
        if let Some(central) = self.central.upgrade() {
            central.handle_descriptor_write(link, success, descriptor);
        }
    }

    fn on_characteristic_changed(
        &self,
        link: Option<LinkId>,
        characteristic: Option<Uuid>,
        value: &[u8],
    ) {
        if let Some(central) = self.central.upgrade() {
            central.handle_characteristic_changed(link, characteristic, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(ConnectionPhase::Closed < ConnectionPhase::Scanning);
        assert!(ConnectionPhase::Scanning < ConnectionPhase::Connecting);
        assert!(ConnectionPhase::Connecting < ConnectionPhase::Connected);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ConnectionPhase::Closed.to_string(), "closed");
        assert_eq!(ConnectionPhase::Connected.to_string(), "connected");
    }
}
