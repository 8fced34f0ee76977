//! Monitoring several sensors at once.
//!
//! A [`Monitor`] owns one [`ColorSensorCentral`] per sensor name, all reporting
//! to a shared [`EventDispatcher`]. Centrals never coordinate with each other;
//! the monitor only applies the caller's policies on top of them: staggered
//! starts and an optional connect deadline.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::central::{ColorSensorCentral, ConnectionPhase};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver};
use crate::radio::Radio;

/// Configuration for a [`Monitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Delay between starting consecutive centrals.
    pub stagger: Duration,
    /// How long a central may take to connect before
    /// [`Monitor::enforce_deadline`] gives up on it.
    pub connect_deadline: Option<Duration>,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stagger: Duration::ZERO,
            connect_deadline: None,
            event_capacity: 100,
        }
    }
}

impl MonitorConfig {
    /// Create a configuration with defaults: no stagger and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay between consecutive starts.
    #[must_use]
    pub fn stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Set the connect deadline.
    #[must_use]
    pub fn connect_deadline(mut self, deadline: Duration) -> Self {
        self.connect_deadline = Some(deadline);
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        if self.connect_deadline.is_some_and(|d| d.is_zero()) {
            return Err(Error::invalid_config("connect_deadline must be > 0"));
        }
        Ok(())
    }
}

/// A set of centrals, one per sensor name, sharing one event dispatcher.
pub struct Monitor<R: Radio> {
    config: MonitorConfig,
    events: Arc<EventDispatcher>,
    centrals: Vec<Arc<ColorSensorCentral<R>>>,
}

impl<R: Radio> std::fmt::Debug for Monitor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("centrals", &self.centrals)
            .finish()
    }
}

impl<R: Radio> Monitor<R> {
    /// Create a monitor for `names`.
    ///
    /// Names are deduplicated and kept in sorted order, which is also the order
    /// [`start`](Self::start) connects them in. `radio_for` is called once per
    /// name to get the radio that name's central drives.
    pub fn new<I, S, F>(names: I, config: MonitorConfig, mut radio_for: F) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(&str) -> Arc<R>,
    {
        config.validate()?;

        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if let Some(name) = names.iter().find(|n| n.trim().is_empty()) {
            return Err(Error::InvalidName(name.clone()));
        }

        let events = Arc::new(EventDispatcher::new(config.event_capacity));
        let centrals = names
            .into_iter()
            .map(|name| {
                let radio = radio_for(&name);
                ColorSensorCentral::new(name, radio, &events)
            })
            .collect();

        Ok(Self {
            config,
            events,
            centrals,
        })
    }

    /// The monitor configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The dispatcher every central reports to.
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// Subscribe to events from all centrals.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// All centrals, in name order.
    pub fn centrals(&self) -> &[Arc<ColorSensorCentral<R>>] {
        &self.centrals
    }

    /// The central monitoring `name`.
    pub fn central(&self, name: &str) -> Option<&Arc<ColorSensorCentral<R>>> {
        self.centrals.iter().find(|c| c.device_name() == name)
    }

    /// Number of monitored sensors.
    pub fn len(&self) -> usize {
        self.centrals.len()
    }

    /// Whether the monitor has no sensors.
    pub fn is_empty(&self) -> bool {
        self.centrals.is_empty()
    }

    /// Start a connection attempt on every closed central.
    ///
    /// Consecutive starts are separated by [`MonitorConfig::stagger`]. Returns
    /// the number of attempts started.
    pub async fn start(&self) -> usize {
        let mut started = 0;
        for (index, central) in self.centrals.iter().enumerate() {
            if index > 0 && !self.config.stagger.is_zero() {
                tokio::time::sleep(self.config.stagger).await;
            }
            if central.connect() {
                started += 1;
            }
        }
        info!(started, total = self.centrals.len(), "Monitoring sensors");
        started
    }

    /// Close every central still scanning or connecting.
    ///
    /// Intended to be called once the connect deadline has passed. Returns a
    /// [`Error::Timeout`] for each central that was given up on.
    pub fn enforce_deadline(&self) -> Vec<Error> {
        let deadline = self.config.connect_deadline.unwrap_or_default();
        self.centrals
            .iter()
            .filter(|central| {
                matches!(
                    central.phase(),
                    ConnectionPhase::Scanning | ConnectionPhase::Connecting
                )
            })
            .map(|central| {
                warn!(device = %central.device_name(), ?deadline, "Connect deadline expired");
                central.close();
                Error::timeout(central.device_name(), deadline)
            })
            .collect()
    }

    /// Wait for the connect deadline, then enforce it.
    ///
    /// Without a configured deadline this never completes.
    pub async fn deadline_expired(&self) -> Vec<Error> {
        match self.config.connect_deadline {
            Some(deadline) => {
                tokio::time::sleep(deadline).await;
                self.enforce_deadline()
            }
            None => std::future::pending().await,
        }
    }

    /// Close every central.
    pub fn close_all(&self) {
        debug!(count = self.centrals.len(), "closing all centrals");
        for central in &self.centrals {
            central.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::events::{ConnectionState, SensorEvent};
    use crate::mock::MockRadio;
    use crate::radio::LinkState;

    type Radios = Arc<Mutex<Vec<(String, Arc<MockRadio>)>>>;

    fn monitor_with(names: &[&str], config: MonitorConfig) -> (Monitor<MockRadio>, Radios) {
        let radios: Radios = Arc::default();
        let created = Arc::clone(&radios);
        let monitor = Monitor::new(names.iter().copied(), config, move |name| {
            let radio = Arc::new(MockRadio::new());
            created.lock().unwrap().push((name.to_string(), Arc::clone(&radio)));
            radio
        })
        .unwrap();
        (monitor, radios)
    }

    fn radio(radios: &Radios, name: &str) -> Arc<MockRadio> {
        radios
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| Arc::clone(r))
            .unwrap()
    }

    #[test]
    fn test_config_defaults_and_builder() {
        let config = MonitorConfig::default();
        assert_eq!(config.stagger, Duration::ZERO);
        assert_eq!(config.connect_deadline, None);
        assert_eq!(config.event_capacity, 100);

        let config = MonitorConfig::new()
            .stagger(Duration::from_millis(250))
            .connect_deadline(Duration::from_secs(30))
            .event_capacity(16);
        assert_eq!(config.stagger, Duration::from_millis(250));
        assert_eq!(config.connect_deadline, Some(Duration::from_secs(30)));
        assert_eq!(config.event_capacity, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(MonitorConfig::new().event_capacity(0).validate().is_err());
        assert!(
            MonitorConfig::new()
                .connect_deadline(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_names_sorted_and_deduplicated() {
        let (monitor, radios) = monitor_with(&["S3", "S1", "S2", "S1"], MonitorConfig::default());

        let names: Vec<_> = monitor.centrals().iter().map(|c| c.device_name()).collect();
        assert_eq!(names, ["S1", "S2", "S3"]);
        assert_eq!(radios.lock().unwrap().len(), 3);
        assert_eq!(monitor.len(), 3);
        assert!(monitor.central("S2").is_some());
        assert!(monitor.central("S4").is_none());
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = Monitor::new(["S1", " "], MonitorConfig::default(), |_| {
            Arc::new(MockRadio::new())
        });
        assert!(matches!(result, Err(Error::InvalidName(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_staggers_connects() {
        let config = MonitorConfig::new().stagger(Duration::from_secs(1));
        let (monitor, radios) = monitor_with(&["S1", "S2", "S3"], config);

        let begin = tokio::time::Instant::now();
        assert_eq!(monitor.start().await, 3);
        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));

        for (_, radio) in radios.lock().unwrap().iter() {
            assert!(radio.is_scanning());
        }
        monitor.close_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_skips_running_centrals() {
        let (monitor, _radios) = monitor_with(&["S1", "S2"], MonitorConfig::default());
        monitor.central("S1").unwrap().connect();

        assert_eq!(monitor.start().await, 1);
        monitor.close_all();
        assert!(monitor.centrals().iter().all(|c| c.is_closed()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_closes_unconnected_centrals() {
        let config = MonitorConfig::new().connect_deadline(Duration::from_secs(10));
        let (monitor, radios) = monitor_with(&["S1", "S2"], config);
        let mut rx = monitor.subscribe();
        monitor.start().await;

        let s1 = radio(&radios, "S1");
        assert!(s1.advertise("S1"));
        assert!(s1.link_state(true, LinkState::Connected));

        let timed_out = monitor.deadline_expired().await;
        assert_eq!(timed_out.len(), 1);
        assert!(matches!(&timed_out[0], Error::Timeout { name, .. } if name == "S2"));

        assert_eq!(
            monitor.central("S1").unwrap().phase(),
            ConnectionPhase::Connected
        );
        assert!(monitor.central("S2").unwrap().is_closed());
        assert!(!radio(&radios, "S2").is_scanning());

        // Both centrals announced their scan; the timeout itself is silent.
        let mut scanning = 0;
        while let Ok(event) = rx.try_recv() {
            if event.event == SensorEvent::StateChanged(ConnectionState::Scanning) {
                scanning += 1;
            }
        }
        assert_eq!(scanning, 2);

        monitor.close_all();
    }
}
