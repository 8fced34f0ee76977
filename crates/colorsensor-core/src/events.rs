//! Sensor event model and event sinks.
//!
//! A [`ColorSensorCentral`](crate::ColorSensorCentral) reports everything that
//! happens on its connection through an [`EventSink`]. The central only keeps a
//! weak reference to its sink: when the sink is dropped, events are silently
//! discarded.
//!
//! Sinks are invoked on whatever thread the radio delivered the triggering
//! callback on. A sink that needs events on a particular execution context
//! (a UI loop, a single task) must marshal them itself. [`EventDispatcher`] does
//! exactly that by forwarding every event into a tokio broadcast channel.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use colorsensor_types::ColorValue;

use crate::error::ErrorKind;

/// Connection milestones reported to an [`EventSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// A filtered scan for the sensor started.
    Scanning,
    /// The sensor was found and a link is being opened.
    Connecting,
    /// The link is up; service discovery has been requested.
    Connected,
    /// Notifications are enabled and readings will follow.
    SetupFinished,
    /// The peripheral dropped the link.
    Disconnected,
}

/// One notification from a central.
///
/// All events are serializable for logging, persistence, and IPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SensorEvent {
    /// The connection reached a new milestone.
    StateChanged(ConnectionState),
    /// A color reading arrived.
    ValueReceived(ColorValue),
    /// An error occurred. See [`ErrorKind::is_terminal`].
    Error(ErrorKind),
}

/// Consumer of central events.
///
/// Implementations must be cheap and non-blocking: they run on radio callback
/// threads, although never while a central holds its lock.
pub trait EventSink: Send + Sync {
    /// The connection of `device_name` reached `state`.
    fn on_state_changed(&self, device_name: &str, state: ConnectionState);

    /// `device_name` pushed a color reading.
    fn on_value_received(&self, device_name: &str, value: ColorValue);

    /// `device_name` hit an error.
    fn on_error(&self, device_name: &str, error: ErrorKind);

    /// Deliver a [`SensorEvent`] to the matching method.
    fn deliver(&self, device_name: &str, event: SensorEvent) {
        match event {
            SensorEvent::StateChanged(state) => self.on_state_changed(device_name, state),
            SensorEvent::ValueReceived(value) => self.on_value_received(device_name, value),
            SensorEvent::Error(error) => self.on_error(device_name, error),
        }
    }
}

/// A sensor event tagged with its source and arrival time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    /// Name of the sensor the event came from.
    pub device: String,
    /// The event itself.
    #[serde(flatten)]
    pub event: SensorEvent,
    /// When the event reached the dispatcher.
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

/// Sender for device events.
pub type EventSender = broadcast::Sender<DeviceEvent>;

/// Receiver for device events.
pub type EventReceiver = broadcast::Receiver<DeviceEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}

/// Event sink that fans events out to broadcast receivers.
///
/// Receivers consume events on their own task, which keeps rendering and other
/// slow work off the radio callback threads.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, device: &str, event: SensorEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(DeviceEvent {
            device: device.to_string(),
            event,
            received_at: OffsetDateTime::now_utc(),
        });
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EventSink for EventDispatcher {
    fn on_state_changed(&self, device_name: &str, state: ConnectionState) {
        self.send(device_name, SensorEvent::StateChanged(state));
    }

    fn on_value_received(&self, device_name: &str, value: ColorValue) {
        self.send(device_name, SensorEvent::ValueReceived(value));
    }

    fn on_error(&self, device_name: &str, error: ErrorKind) {
        self.send(device_name, SensorEvent::Error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatcher_forwards_events() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx = dispatcher.subscribe();

        dispatcher.on_state_changed("S1", ConnectionState::SetupFinished);
        dispatcher.on_value_received("S1", ColorValue::new(1, 2, 3));
        dispatcher.on_error("S2", ErrorKind::InvalidValue);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.device, "S1");
        assert_eq!(
            first.event,
            SensorEvent::StateChanged(ConnectionState::SetupFinished)
        );

        let second = rx.recv().await.unwrap();
        assert_eq!(
            second.event,
            SensorEvent::ValueReceived(ColorValue::new(1, 2, 3))
        );

        let third = rx.recv().await.unwrap();
        assert_eq!(third.device, "S2");
        assert_eq!(third.event, SensorEvent::Error(ErrorKind::InvalidValue));
    }

    #[test]
    fn test_dispatcher_without_receivers_does_not_fail() {
        let dispatcher = EventDispatcher::default();
        assert_eq!(dispatcher.receiver_count(), 0);
        dispatcher.on_error("S1", ErrorKind::Fatal);
    }

    #[test]
    fn test_deliver_routes_by_variant() {
        let dispatcher = EventDispatcher::new(4);
        let mut rx = dispatcher.subscribe();

        dispatcher.deliver("S1", SensorEvent::Error(ErrorKind::ServiceNotFound));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, SensorEvent::Error(ErrorKind::ServiceNotFound));
    }

    #[test]
    fn test_device_event_json_shape() {
        let event = DeviceEvent {
            device: "S1".to_string(),
            event: SensorEvent::ValueReceived(ColorValue::new(0x12, 0x34, 0x56)),
            received_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["device"], "S1");
        assert_eq!(json["type"], "value_received");
        assert_eq!(json["data"], serde_json::json!([0x12, 0x34, 0x56]));
        assert_eq!(json["received_at"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionState::SetupFinished).unwrap();
        assert_eq!(json, "\"setup_finished\"");
    }
}
