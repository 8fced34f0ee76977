//! [`Radio`] implementation on top of btleplug.
//!
//! btleplug exposes an async API, while a central expects request methods that
//! answer immediately and report outcomes through callbacks. [`BtleRadio`]
//! bridges the two by spawning one Tokio task per request on the runtime it was
//! created in; each task invokes the matching callback when the btleplug
//! future resolves. Callbacks therefore always run on runtime worker threads,
//! never inside a request method.
//!
//! Several radios may share one adapter (one radio per monitored sensor). The
//! adapter-level scan is started by the first radio that scans and stopped when
//! the last one stops. Adapter scan start and stop requests are serialized, and
//! a stop only goes through if no radio is scanning by the time it runs.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter as BtleScanFilter, Service,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use colorsensor_types::uuid::CLIENT_CHARACTERISTIC_CONFIG;

use crate::error::{Error, Result};
use crate::radio::{GattCallback, LinkHandle, LinkId, LinkState, Radio, ScanCallback, ScanFilter};

/// Get the first available Bluetooth adapter.
pub async fn default_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters.into_iter().next().ok_or(Error::NoAdapter)
}

struct Shared {
    adapter: Adapter,
    runtime: Handle,
    scans: AdapterScans,
    next_link: AtomicU64,
}

/// Adapter-level scan bookkeeping shared by sibling radios.
#[derive(Debug, Default)]
struct AdapterScans {
    /// Radios with a scan running.
    active: AtomicUsize,
    /// Held across adapter `start_scan`/`stop_scan` calls.
    control: tokio::sync::Mutex<()>,
}

impl AdapterScans {
    fn acquire(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns `true` if the caller held the last running scan.
    fn release(&self) -> bool {
        self.active.fetch_sub(1, Ordering::SeqCst) == 1
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Run `start` under the control lock, unless `token` was cancelled while
    /// waiting for it.
    async fn start<T>(&self, token: &CancellationToken, start: impl Future<Output = T>) -> Option<T> {
        let _guard = self.control.lock().await;
        if token.is_cancelled() {
            return None;
        }
        Some(start.await)
    }

    /// Run `stop` under the control lock, unless a radio started scanning
    /// after the last release.
    async fn stop_if_idle<T>(&self, stop: impl Future<Output = T>) -> Option<T> {
        let _guard = self.control.lock().await;
        if self.active() > 0 {
            return None;
        }
        Some(stop.await)
    }
}

/// A link opened through btleplug.
pub struct BtleLink {
    id: LinkId,
    peripheral: Peripheral,
    callback: Arc<dyn GattCallback>,
    /// Cancelled when the link is closed; stops every task working on it.
    token: CancellationToken,
}

impl LinkHandle for BtleLink {
    fn id(&self) -> LinkId {
        self.id
    }
}

/// Bluetooth radio backed by a btleplug adapter.
///
/// Create one radio per central: the scan state belongs to the radio. Use
/// [`sibling`](Self::sibling) to get another radio on the same adapter.
pub struct BtleRadio {
    shared: Arc<Shared>,
    scan: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for BtleRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleRadio")
            .field("scanning", &self.scan_slot().is_some())
            .field("active_scans", &self.shared.scans.active())
            .finish_non_exhaustive()
    }
}

impl BtleRadio {
    /// Create a radio on `adapter`, spawning its work on the current Tokio runtime.
    pub fn new(adapter: Adapter) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(adapter, runtime))
    }

    /// Create a radio on `adapter` that spawns its work on `runtime`.
    pub fn with_runtime(adapter: Adapter, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                adapter,
                runtime,
                scans: AdapterScans::default(),
                next_link: AtomicU64::new(1),
            }),
            scan: Mutex::new(None),
        }
    }

    /// Another radio on the same adapter, with its own scan state.
    pub fn sibling(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            scan: Mutex::new(None),
        }
    }

    fn scan_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.scan.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Radio for BtleRadio {
    type Device = Peripheral;
    type Link = BtleLink;
    type Service = Service;
    type Characteristic = Characteristic;

    fn start_filtered_scan(&self, filter: ScanFilter, on_match: Arc<dyn ScanCallback<Peripheral>>) {
        let token = CancellationToken::new();
        match self.scan_slot().replace(token.clone()) {
            Some(previous) => previous.cancel(),
            None => self.shared.scans.acquire(),
        }

        let shared = Arc::clone(&self.shared);
        self.shared.runtime.spawn(async move {
            if let Err(e) = run_scan(&shared, &filter, on_match.as_ref(), &token).await {
                if token.is_cancelled() {
                    debug!(name = %filter.name, "Scan ended after stop: {}", e);
                    return;
                }
                warn!(name = %filter.name, "Scan failed: {}", e);
                on_match.on_scan_failed();
            }
        });
    }

    fn stop_scan(&self) {
        let Some(token) = self.scan_slot().take() else {
            return;
        };
        token.cancel();
        if self.shared.scans.release() {
            let shared = Arc::clone(&self.shared);
            self.shared.runtime.spawn(async move {
                match shared.scans.stop_if_idle(shared.adapter.stop_scan()).await {
                    None => debug!("Adapter scan still in use, not stopping"),
                    Some(Err(e)) => debug!("Failed to stop adapter scan: {}", e),
                    Some(Ok(())) => {}
                }
            });
        }
    }

    fn open_link(&self, device: Peripheral, callback: Arc<dyn GattCallback>) -> Option<BtleLink> {
        let id = LinkId(self.shared.next_link.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        let link = BtleLink {
            id,
            peripheral: device.clone(),
            callback: Arc::clone(&callback),
            token: token.clone(),
        };

        let shared = Arc::clone(&self.shared);
        self.shared.runtime.spawn(async move {
            // Subscribe before connecting so a quick drop is not missed.
            let mut events = match shared.adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!(link = %id, "Failed to watch adapter events: {}", e);
                    callback.on_connection_state_changed(Some(id), false, LinkState::Disconnected);
                    return;
                }
            };

            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = device.connect() => result,
            };
            if let Err(e) = result {
                warn!(link = %id, "Connection failed: {}", e);
                callback.on_connection_state_changed(Some(id), false, LinkState::Disconnected);
                return;
            }
            callback.on_connection_state_changed(Some(id), true, LinkState::Connected);

            let peripheral_id = device.id();
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    event = events.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(pid)) if pid == peripheral_id => {
                            callback.on_connection_state_changed(Some(id), true, LinkState::Disconnected);
                            return;
                        }
                        Some(_) => {}
                        None => return,
                    },
                }
            }
        });

        Some(link)
    }

    fn close_link(&self, link: BtleLink) {
        link.token.cancel();
        let peripheral = link.peripheral;
        let id = link.id;
        self.shared.runtime.spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                debug!(link = %id, "Disconnect failed: {}", e);
            }
        });
    }

    fn discover_services(&self, link: &BtleLink) -> bool {
        if link.token.is_cancelled() {
            return false;
        }
        let peripheral = link.peripheral.clone();
        let callback = Arc::clone(&link.callback);
        let token = link.token.clone();
        let id = link.id;

        self.shared.runtime.spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = peripheral.discover_services() => result,
            };
            if let Err(e) = &result {
                warn!(link = %id, "Service discovery failed: {}", e);
            }
            callback.on_services_discovered(Some(id), result.is_ok());
        });
        true
    }

    fn lookup_service(&self, link: &BtleLink, service: Uuid) -> Option<Service> {
        link.peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
    }

    fn lookup_characteristic(&self, service: &Service, characteristic: Uuid) -> Option<Characteristic> {
        service
            .characteristics
            .iter()
            .find(|c| c.uuid == characteristic)
            .cloned()
    }

    fn enable_notifications(&self, link: &BtleLink, characteristic: &Characteristic) -> bool {
        if link.token.is_cancelled() {
            return false;
        }
        if !characteristic
            .properties
            .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
        {
            debug!(link = %link.id, uuid = %characteristic.uuid, "characteristic cannot notify");
            return false;
        }

        let peripheral = link.peripheral.clone();
        let callback = Arc::clone(&link.callback);
        let token = link.token.clone();
        let characteristic = characteristic.clone();
        let id = link.id;

        self.shared.runtime.spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(link = %id, "Failed to open notification stream: {}", e);
                    callback.on_descriptor_write(Some(id), false, Some(CLIENT_CHARACTERISTIC_CONFIG));
                    return;
                }
            };

            // subscribe() writes the CCCD of the characteristic.
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = peripheral.subscribe(&characteristic) => result,
            };
            if let Err(e) = &result {
                warn!(link = %id, "Subscribe failed: {}", e);
            }
            callback.on_descriptor_write(Some(id), result.is_ok(), Some(CLIENT_CHARACTERISTIC_CONFIG));
            if result.is_err() {
                return;
            }

            info!(link = %id, uuid = %characteristic.uuid, "Streaming notifications");
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    notification = notifications.next() => match notification {
                        Some(n) => callback.on_characteristic_changed(Some(id), Some(n.uuid), &n.value),
                        None => return,
                    },
                }
            }
        });
        true
    }
}

/// Run one radio's scan until `token` is cancelled.
///
/// Returns an error if the scan could not start or the adapter stopped
/// delivering events. Failures looking up a single advertiser only skip that
/// advertisement.
async fn run_scan(
    shared: &Shared,
    filter: &ScanFilter,
    on_match: &dyn ScanCallback<Peripheral>,
    token: &CancellationToken,
) -> Result<()> {
    let adapter = &shared.adapter;
    let mut events = adapter.events().await?;
    let scan_filter = BtleScanFilter {
        services: vec![filter.service],
    };
    match shared.scans.start(token, adapter.start_scan(scan_filter)).await {
        Some(result) => result?,
        None => return Ok(()),
    }
    debug!(name = %filter.name, "Scan started");

    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events.next() => event,
        };
        let id = match event {
            Some(CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) => id,
            Some(_) => continue,
            None => return Err(Error::EventStreamClosed),
        };

        let peripheral = match adapter.peripheral(&id).await {
            Ok(peripheral) => peripheral,
            Err(e) => {
                debug!(name = %filter.name, peripheral = ?id, "Skipping advertiser: {}", e);
                continue;
            }
        };
        let properties = match peripheral.properties().await {
            Ok(Some(properties)) => properties,
            Ok(None) => continue,
            Err(e) => {
                debug!(name = %filter.name, peripheral = ?id, "Skipping advertiser: {}", e);
                continue;
            }
        };
        if filter.matches(&properties.services, properties.local_name.as_deref()) {
            debug!(name = %filter.name, "Advertisement matched");
            on_match.on_advertisement_matched(peripheral);
        }
    }

    debug!(name = %filter.name, "Scan stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_stop_skipped_when_sibling_started_again() {
        let scans = AdapterScans::default();
        scans.acquire();
        assert!(scans.release());

        // A sibling starts before the spawned stop runs.
        scans.acquire();
        let stopped = AtomicBool::new(false);
        let result = scans
            .stop_if_idle(async { stopped.store(true, Ordering::SeqCst) })
            .await;

        assert!(result.is_none());
        assert!(!stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_runs_when_idle() {
        let scans = AdapterScans::default();
        scans.acquire();
        scans.acquire();
        assert!(!scans.release());
        assert!(scans.release());

        assert_eq!(scans.stop_if_idle(async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn test_start_skipped_after_cancel() {
        let scans = AdapterScans::default();
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(scans.start(&token, async { 1 }).await, None);
    }

    #[tokio::test]
    async fn test_start_and_stop_do_not_overlap() {
        let scans = Arc::new(AdapterScans::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let release = Arc::new(Notify::new());
        let token = CancellationToken::new();

        let start = tokio::spawn({
            let (scans, log, release) = (scans.clone(), log.clone(), release.clone());
            async move {
                scans
                    .start(&token, async {
                        release.notified().await;
                        log.lock().unwrap().push("start");
                    })
                    .await
            }
        });
        tokio::task::yield_now().await;

        let stop = tokio::spawn({
            let (scans, log) = (scans.clone(), log.clone());
            async move {
                scans
                    .stop_if_idle(async { log.lock().unwrap().push("stop") })
                    .await
            }
        });
        tokio::task::yield_now().await;
        assert!(log.lock().unwrap().is_empty());

        release.notify_one();
        assert!(start.await.unwrap().is_some());
        assert!(stop.await.unwrap().is_some());
        assert_eq!(*log.lock().unwrap(), ["start", "stop"]);
    }
}
