//! Camera discovery and connection-lifecycle management.
//!
//! `CameraManager` owns network discovery, a timer-driven re-scan, and
//! connect/disconnect orchestration. All registry and settings mutation
//! happens on one spawned owner task; public methods and background I/O
//! tasks talk to it over a command channel, so no two mutations ever race.
//! Network I/O (probes, handshakes, keepalives) runs on background tasks
//! and marshals results back to the owner before touching shared state.

use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::constants::{channels, timeouts};
use crate::models::{CameraError, CameraEvent, DeviceInfo};
use crate::policy::{AutoconnectDecision, decide};
use crate::registry::{ConnectedCamera, DeviceRegistry};
use crate::settings::{
    GeneralSettings, SettingsStore, WifiPolicyChange, WifiPolicySeed, apply_wifi_change,
    wifi_policy_seed,
};
use crate::transport::CameraTransport;

/// Requests from the public API to the owner task.
enum Command {
    StartListening(oneshot::Sender<Result<()>>),
    StopListening(oneshot::Sender<()>),
    Search(oneshot::Sender<Result<()>>),
    Connect(DeviceInfo, oneshot::Sender<Result<ConnectedCamera>>),
    Disconnect(String, oneshot::Sender<Result<()>>),
    ConnectableDevices(oneshot::Sender<Vec<DeviceInfo>>),
    ConnectedCameras(oneshot::Sender<Vec<ConnectedCamera>>),
    SelectedDevice(oneshot::Sender<Option<DeviceInfo>>),
    Settings(oneshot::Sender<GeneralSettings>),
    WifiSeed(oneshot::Sender<WifiPolicySeed>),
    ApplyWifiChange(WifiPolicyChange, oneshot::Sender<()>),
}

/// Results marshaled back from background I/O tasks.
enum Internal {
    Announced(DeviceInfo),
    Probed {
        devices: Vec<DeviceInfo>,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    ProbeFailed {
        error: CameraError,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    ConnectDone {
        device: DeviceInfo,
        result: Result<Arc<dyn crate::transport::ControlSession>>,
        reply: Option<oneshot::Sender<Result<ConnectedCamera>>>,
    },
    /// A keepalive detected a lost session; the camera is still connected
    /// as far as the registry knows.
    SessionLost { udn: String, still_reachable: bool },
    /// A deliberate disconnect finished its close/reachability work; the
    /// camera was already demoted.
    Departed {
        device: DeviceInfo,
        still_reachable: bool,
    },
    ListenerStopped,
}

/// Discovers cameras on the local network and manages their connection
/// lifecycle.
///
/// Dropping the manager (or calling [`shutdown`](Self::shutdown)) cancels
/// discovery, the re-scan timer, and all session keepalives.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use lmxrs::{CameraManager, SsdpTransport};
///
/// # async fn example(store: Arc<dyn lmxrs::SettingsStore>) -> lmxrs::Result<()> {
/// let transport = Arc::new(SsdpTransport::new("lmxrs")?);
/// let settings = store.load()?;
/// let manager = CameraManager::new(transport, settings, store);
///
/// manager.start_listening().await?;
/// let mut events = manager.subscribe();
/// while let Ok(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct CameraManager {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<CameraEvent>,
    cancel: CancellationToken,
}

impl CameraManager {
    /// Creates the manager and starts its owner task. The re-scan timer
    /// begins immediately and runs for the manager's lifetime, independent
    /// of passive listening.
    pub fn new(
        transport: Arc<dyn CameraTransport>,
        settings: GeneralSettings,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(channels::COMMAND_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::channel(channels::COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(channels::EVENT_CAPACITY);
        let cancel = CancellationToken::new();

        let owner = Owner {
            transport,
            settings,
            store,
            registry: DeviceRegistry::new(),
            connecting: HashSet::new(),
            departing: HashSet::new(),
            monitors: HashMap::new(),
            listener: None,
            internal_tx,
            events: events.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(owner.run(command_rx, internal_rx));

        Self {
            commands,
            events,
            cancel,
        }
    }

    /// Begins passive discovery and kicks off one immediate probe.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyListening` if called again without an intervening
    /// [`stop_listening`](Self::stop_listening).
    pub async fn start_listening(&self) -> Result<()> {
        self.request(Command::StartListening).await?
    }

    /// Halts passive discovery. Safe to call when not listening. Does not
    /// abort in-flight connects or stop the re-scan timer.
    pub async fn stop_listening(&self) -> Result<()> {
        self.request(Command::StopListening).await
    }

    /// Runs one active discovery probe cycle and folds the results in.
    ///
    /// Safe to call while the timer-driven re-scan or another search is in
    /// flight; a device reported by several overlapping cycles is
    /// discovered once.
    pub async fn search_cameras(&self) -> Result<()> {
        self.request(Command::Search).await?
    }

    /// Establishes a control session to a device.
    ///
    /// The handshake is bounded: it completes or fails with a typed error
    /// (`Timeout` at the latest) within the connect deadline. On failure
    /// the device remains in the connectable set.
    pub async fn connect_camera(&self, device: &DeviceInfo) -> Result<ConnectedCamera> {
        let device = device.clone();
        self.request(move |tx| Command::Connect(device, tx)).await?
    }

    /// Closes the control session to a connected camera.
    ///
    /// If the device still answers discovery probes afterwards it re-enters
    /// the connectable set as a manual candidate; autoconnect is
    /// deliberately not re-run, so a flapping camera cannot thrash.
    pub async fn disconnect_camera(&self, udn: &str) -> Result<()> {
        let udn = udn.to_string();
        self.request(move |tx| Command::Disconnect(udn, tx)).await?
    }

    /// Snapshot of the connectable set, in discovery order.
    pub async fn connectable_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.request(Command::ConnectableDevices).await
    }

    /// Snapshot of the connected cameras.
    pub async fn connected_cameras(&self) -> Result<Vec<ConnectedCamera>> {
        self.request(Command::ConnectedCameras).await
    }

    /// The default device selection, if any connectable device holds it.
    pub async fn selected_device(&self) -> Result<Option<DeviceInfo>> {
        self.request(Command::SelectedDevice).await
    }

    /// Snapshot of the current settings, for the persistence collaborator.
    pub async fn settings(&self) -> Result<GeneralSettings> {
        self.request(Command::Settings).await
    }

    /// Seed values for the Wi-Fi policy surface. Read once at startup;
    /// afterwards settings flow one way, from the surface into the store.
    pub async fn wifi_policy_seed(&self) -> Result<WifiPolicySeed> {
        self.request(Command::WifiSeed).await
    }

    /// Mirrors a Wi-Fi policy change into the settings and persists them.
    /// A store failure is logged, never surfaced.
    pub async fn apply_wifi_change(&self, change: WifiPolicyChange) -> Result<()> {
        self.request(move |tx| Command::ApplyWifiChange(change, tx))
            .await
    }

    /// Subscribes to lifecycle events. Events for one device arrive in
    /// lifecycle order; drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.events.subscribe()
    }

    /// Stops the owner task and every background task it spawned.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| CameraError::ManagerClosed)?;
        rx.await.map_err(|_| CameraError::ManagerClosed)
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned exclusively by the owner task.
struct Owner {
    transport: Arc<dyn CameraTransport>,
    settings: GeneralSettings,
    store: Arc<dyn SettingsStore>,
    registry: DeviceRegistry,
    /// Devices with a handshake in flight. Kept outside the registry so a
    /// connecting device is neither listed nor re-offered to policy.
    connecting: HashSet<String>,
    /// Devices demoted by a deliberate disconnect whose close/reachability
    /// work has not finished. A probe landing in that window must not
    /// rediscover them.
    departing: HashSet<String>,
    /// Keepalive cancellation per connected camera.
    monitors: HashMap<String, CancellationToken>,
    listener: Option<CancellationToken>,
    internal_tx: mpsc::Sender<Internal>,
    events: broadcast::Sender<CameraEvent>,
    cancel: CancellationToken,
}

impl Owner {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::Receiver<Internal>,
    ) {
        let period = timeouts::search_interval();
        let mut search_tick = interval_at(tokio::time::Instant::now() + period, period);
        search_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = search_tick.tick() => self.spawn_probe(None),
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break, // manager dropped
                },
                Some(msg) = internal.recv() => self.handle_internal(msg),
            }
        }
        debug!("Camera manager owner task exiting");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::StartListening(reply) => {
                let _ = reply.send(self.start_listening());
            }
            Command::StopListening(reply) => {
                if let Some(token) = self.listener.take() {
                    debug!("Stopping discovery listener");
                    token.cancel();
                }
                let _ = reply.send(());
            }
            Command::Search(reply) => self.spawn_probe(Some(reply)),
            Command::Connect(device, reply) => {
                if self.registry.connected_by_udn(&device.udn).is_some() {
                    let _ = reply.send(Err(CameraError::AlreadyConnected(device.udn)));
                } else if self.connecting.contains(&device.udn) {
                    let _ = reply.send(Err(CameraError::ConnectPending(device.udn)));
                } else {
                    self.begin_connect(device, Some(reply));
                }
            }
            Command::Disconnect(udn, reply) => {
                let _ = reply.send(self.begin_disconnect(&udn));
            }
            Command::ConnectableDevices(reply) => {
                let _ = reply.send(self.registry.connectable().to_vec());
            }
            Command::ConnectedCameras(reply) => {
                let _ = reply.send(self.registry.connected().to_vec());
            }
            Command::SelectedDevice(reply) => {
                let _ = reply.send(self.registry.selected().cloned());
            }
            Command::Settings(reply) => {
                let _ = reply.send(self.settings.clone());
            }
            Command::WifiSeed(reply) => {
                let _ = reply.send(wifi_policy_seed(&self.settings));
            }
            Command::ApplyWifiChange(change, reply) => {
                apply_wifi_change(change, &mut self.settings, &*self.store);
                let _ = reply.send(());
            }
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Announced(device) => self.device_sighted(device),
            Internal::Probed { devices, reply } => {
                for device in devices {
                    self.device_sighted(device);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
            }
            Internal::ProbeFailed { error, reply } => {
                // Transient by contract: the timer retries on its cadence.
                warn!("Discovery probe failed: {error}");
                if let Some(reply) = reply {
                    let _ = reply.send(Err(error));
                }
            }
            Internal::ConnectDone {
                device,
                result,
                reply,
            } => self.finish_connect(device, result, reply),
            Internal::SessionLost {
                udn,
                still_reachable,
            } => {
                self.monitors.remove(&udn);
                match self.registry.demote(&udn) {
                    Ok(camera) => {
                        info!("Lost session to {} (reachable: {still_reachable})", camera.device);
                        self.finish_disconnect(camera.device, still_reachable);
                    }
                    // Already demoted by a deliberate disconnect.
                    Err(_) => debug!("Stale session-loss report for {udn}"),
                }
            }
            Internal::Departed {
                device,
                still_reachable,
            } => {
                self.departing.remove(&device.udn);
                self.finish_disconnect(device, still_reachable);
            }
            Internal::ListenerStopped => {
                self.listener = None;
            }
        }
    }

    fn start_listening(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Err(CameraError::AlreadyListening);
        }

        let token = self.cancel.child_token();
        let (announce_tx, mut announce_rx) = mpsc::channel(channels::COMMAND_CAPACITY);

        let forward = self.internal_tx.clone();
        tokio::spawn(async move {
            while let Some(device) = announce_rx.recv().await {
                if forward.send(Internal::Announced(device)).await.is_err() {
                    break;
                }
            }
        });

        let transport = self.transport.clone();
        let internal = self.internal_tx.clone();
        let listen_token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.listen(announce_tx, listen_token).await {
                warn!("Discovery listener failed: {e}");
            }
            let _ = internal.send(Internal::ListenerStopped).await;
        });

        self.listener = Some(token);
        info!("Started listening for camera announcements");

        // Devices already on the network won't announce themselves for a
        // while; probe right away instead of waiting for the timer.
        self.spawn_probe(None);
        Ok(())
    }

    fn spawn_probe(&self, reply: Option<oneshot::Sender<Result<()>>>) {
        let transport = self.transport.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            match transport.probe().await {
                Ok(devices) => {
                    let _ = internal.send(Internal::Probed { devices, reply }).await;
                }
                Err(error) => {
                    let _ = internal.send(Internal::ProbeFailed { error, reply }).await;
                }
            }
        });
    }

    /// Handles one discovery sighting. Repeat sightings of a known or
    /// currently-connecting device are dropped here, which is what makes
    /// overlapping scans safe and keeps policy to one run per device.
    fn device_sighted(&mut self, device: DeviceInfo) {
        if self.registry.is_known(&device.udn)
            || self.connecting.contains(&device.udn)
            || self.departing.contains(&device.udn)
        {
            return;
        }

        info!("Discovered {device}");
        self.emit(CameraEvent::DeviceDiscovered(device.clone()));

        match decide(&device, &self.settings) {
            AutoconnectDecision::Connect => {
                debug!("Autoconnecting to {device}");
                self.begin_connect(device, None);
            }
            AutoconnectDecision::Offer => {
                if self.registry.add_connectable(device) {
                    self.emit_connectable_changed();
                }
            }
        }
    }

    /// Starts a handshake on a background task, bounded by the connect
    /// deadline. `reply` is `None` on the autoconnect path.
    fn begin_connect(
        &mut self,
        device: DeviceInfo,
        reply: Option<oneshot::Sender<Result<ConnectedCamera>>>,
    ) {
        self.connecting.insert(device.udn.clone());

        let transport = self.transport.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = match timeout(
                timeouts::connect_timeout(),
                transport.open_session(&device),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CameraError::Timeout),
            };
            let _ = internal
                .send(Internal::ConnectDone {
                    device,
                    result,
                    reply,
                })
                .await;
        });
    }

    fn finish_connect(
        &mut self,
        device: DeviceInfo,
        result: Result<Arc<dyn crate::transport::ControlSession>>,
        reply: Option<oneshot::Sender<Result<ConnectedCamera>>>,
    ) {
        self.connecting.remove(&device.udn);

        match result {
            Ok(session) => {
                let settings = self.settings.camera_or_default(&device.udn).clone();
                let was_listed = self
                    .registry
                    .connectable()
                    .iter()
                    .any(|d| d.udn == device.udn);

                match self.registry.promote(device.clone(), settings, session) {
                    Ok(camera) => {
                        info!("Connected to {device}");
                        if was_listed {
                            self.emit_connectable_changed();
                        }
                        self.emit(CameraEvent::CameraConnected(device));
                        self.spawn_keepalive(&camera);
                        if let Some(reply) = reply {
                            let _ = reply.send(Ok(camera));
                        }
                    }
                    Err(e) => {
                        // Two sessions for one device is a logic bug; the
                        // connecting-set guard should make this unreachable.
                        error!("Promoting {device} failed: {e}");
                        if let Some(reply) = reply {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
            }
            Err(e) => {
                // Not silently dropped: the device stays available for a
                // manual retry.
                if self.registry.add_connectable(device.clone()) {
                    self.emit_connectable_changed();
                }
                match reply {
                    Some(reply) => {
                        let _ = reply.send(Err(e));
                    }
                    None => error!("Autoconnect to {device} failed: {e}"),
                }
            }
        }
    }

    /// Demotes the camera and finishes the close on a background task.
    fn begin_disconnect(&mut self, udn: &str) -> Result<()> {
        if let Some(token) = self.monitors.remove(udn) {
            token.cancel();
        }
        let camera = self.registry.demote(udn)?;
        self.departing.insert(udn.to_string());
        info!("Disconnecting from {}", camera.device);

        let transport = self.transport.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = camera.session().close().await {
                debug!("Close of session to {} failed: {e}", camera.udn());
            }
            let still_reachable = probe_contains(&*transport, camera.udn()).await;
            let _ = internal
                .send(Internal::Departed {
                    device: camera.device,
                    still_reachable,
                })
                .await;
        });
        Ok(())
    }

    /// Common tail of both disconnect paths: re-list the device if it is
    /// still on the network, and tell subscribers. Autoconnect is not
    /// re-run here; a re-listed device is a manual candidate.
    fn finish_disconnect(&mut self, device: DeviceInfo, still_reachable: bool) {
        // A fast reconnect may already own the identifier again; re-listing
        // it then would break the set-disjointness invariant.
        let relistable = still_reachable
            && !self.connecting.contains(&device.udn)
            && self.registry.connected_by_udn(&device.udn).is_none();
        if relistable && self.registry.add_connectable(device.clone()) {
            self.emit_connectable_changed();
        }
        self.emit(CameraEvent::CameraDisconnected {
            device,
            still_reachable,
        });
    }

    fn spawn_keepalive(&mut self, camera: &ConnectedCamera) {
        let token = self.cancel.child_token();
        self.monitors.insert(camera.udn().to_string(), token.clone());

        let session = camera.session().clone();
        let transport = self.transport.clone();
        let internal = self.internal_tx.clone();
        let udn = camera.udn().to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(timeouts::keepalive_interval()) => {
                        if let Err(e) = session.ping().await {
                            debug!("Keepalive to {udn} failed: {e}");
                            let still_reachable = probe_contains(&*transport, &udn).await;
                            let _ = internal
                                .send(Internal::SessionLost { udn, still_reachable })
                                .await;
                            return;
                        }
                    }
                }
            }
        });
    }

    fn emit(&self, event: CameraEvent) {
        // A send error just means nobody is subscribed right now.
        let _ = self.events.send(event);
    }

    fn emit_connectable_changed(&self) {
        self.emit(CameraEvent::ConnectableChanged(
            self.registry.connectable().to_vec(),
        ));
    }
}

/// Whether one probe cycle still sees the device. Used to distinguish "lost
/// the session but the camera is on the network" from "camera is gone".
async fn probe_contains(transport: &dyn CameraTransport, udn: &str) -> bool {
    match transport.probe().await {
        Ok(devices) => devices.iter().any(|d| d.udn == udn),
        Err(e) => {
            warn!("Reachability probe failed: {e}");
            false
        }
    }
}
