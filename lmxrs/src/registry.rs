//! Connectable/connected device bookkeeping.
//!
//! The registry holds the set of discovered-but-not-connected devices and
//! the set of live cameras, and enforces that a device identifier is never
//! in both at once. All mutation happens on the manager's owner task, so
//! the registry itself needs no locking.

use std::sync::Arc;

use crate::Result;
use crate::models::{CameraError, DeviceInfo};
use crate::settings::CameraSettings;
use crate::transport::ControlSession;

/// A live camera: one control session bound to one discovered device.
///
/// Created on successful connect, destroyed on disconnect. Cloning is
/// cheap; the session handle is shared.
#[derive(Clone)]
pub struct ConnectedCamera {
    pub device: DeviceInfo,
    pub settings: CameraSettings,
    /// Output profile selected for this camera, seeded from the settings.
    pub selected_lut: Option<String>,
    /// Aspect/cropping choice, seeded from the settings.
    pub selected_aspect: String,
    pub aspect_anamorphic_video_only: bool,
    session: Arc<dyn ControlSession>,
}

impl ConnectedCamera {
    pub(crate) fn new(
        device: DeviceInfo,
        settings: CameraSettings,
        session: Arc<dyn ControlSession>,
    ) -> Self {
        Self {
            device,
            selected_lut: settings.lut_id.clone(),
            selected_aspect: settings.aspect.clone(),
            aspect_anamorphic_video_only: settings.aspect_anamorphic_video_only,
            settings,
            session,
        }
    }

    pub fn udn(&self) -> &str {
        &self.device.udn
    }

    /// The control session for this camera.
    pub fn session(&self) -> &Arc<dyn ControlSession> {
        &self.session
    }
}

impl std::fmt::Debug for ConnectedCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedCamera")
            .field("device", &self.device)
            .field("settings", &self.settings)
            .field("selected_lut", &self.selected_lut)
            .field("selected_aspect", &self.selected_aspect)
            .finish_non_exhaustive()
    }
}

/// Holds the connectable and connected device sets.
///
/// Invariant: the intersection of the connectable-identifier set and the
/// connected-identifier set is always empty. Checked after every mutation
/// in debug builds.
#[derive(Default)]
pub struct DeviceRegistry {
    connectable: Vec<DeviceInfo>,
    connected: Vec<ConnectedCamera>,
    selected: Option<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a device into the connectable set.
    ///
    /// Idempotent: returns `false` without changes if the device is already
    /// present. The first connectable device is elected as the default
    /// selection when nothing is selected.
    pub fn add_connectable(&mut self, device: DeviceInfo) -> bool {
        if self.connectable.iter().any(|d| d.udn == device.udn) {
            return false;
        }
        debug_assert!(
            self.connected_by_udn(&device.udn).is_none(),
            "device {} added as connectable while connected",
            device.udn
        );

        if self.selected.is_none() {
            self.selected = Some(device.udn.clone());
        }
        self.connectable.push(device);
        self.assert_disjoint();
        true
    }

    /// Removes a device from the connectable set by identifier.
    ///
    /// No-op if absent. If the removed device held the default selection,
    /// the selection advances to the first remaining connectable device.
    pub fn remove_connectable(&mut self, udn: &str) -> Option<DeviceInfo> {
        let pos = self.connectable.iter().position(|d| d.udn == udn)?;
        let removed = self.connectable.remove(pos);

        if self.selected.as_deref() == Some(udn) {
            self.selected = self.connectable.first().map(|d| d.udn.clone());
        }
        Some(removed)
    }

    /// Atomically moves a device from the connectable set into the
    /// connected set, constructing its [`ConnectedCamera`].
    ///
    /// The device need not currently be connectable (autoconnect promotes
    /// straight from discovery). Fails with `AlreadyConnected` if the
    /// identifier is already in the connected set.
    pub fn promote(
        &mut self,
        device: DeviceInfo,
        settings: CameraSettings,
        session: Arc<dyn ControlSession>,
    ) -> Result<ConnectedCamera> {
        if self.connected_by_udn(&device.udn).is_some() {
            return Err(CameraError::AlreadyConnected(device.udn));
        }

        self.remove_connectable(&device.udn);
        let camera = ConnectedCamera::new(device, settings, session);
        self.connected.push(camera.clone());
        self.assert_disjoint();
        Ok(camera)
    }

    /// Removes a camera from the connected set by identifier.
    ///
    /// Fails with `NotConnected` if absent.
    pub fn demote(&mut self, udn: &str) -> Result<ConnectedCamera> {
        let pos = self
            .connected
            .iter()
            .position(|c| c.udn() == udn)
            .ok_or_else(|| CameraError::NotConnected(udn.to_string()))?;
        let camera = self.connected.remove(pos);
        self.assert_disjoint();
        Ok(camera)
    }

    /// Current connectable devices, in discovery order.
    pub fn connectable(&self) -> &[DeviceInfo] {
        &self.connectable
    }

    /// Currently connected cameras.
    pub fn connected(&self) -> &[ConnectedCamera] {
        &self.connected
    }

    pub fn connected_by_udn(&self, udn: &str) -> Option<&ConnectedCamera> {
        self.connected.iter().find(|c| c.udn() == udn)
    }

    /// Whether the identifier is present in either set.
    pub fn is_known(&self, udn: &str) -> bool {
        self.connectable.iter().any(|d| d.udn == udn) || self.connected_by_udn(udn).is_some()
    }

    /// The default device selection, if any.
    pub fn selected(&self) -> Option<&DeviceInfo> {
        let udn = self.selected.as_deref()?;
        self.connectable.iter().find(|d| d.udn == udn)
    }

    fn assert_disjoint(&self) {
        debug_assert!(
            self.connectable
                .iter()
                .all(|d| self.connected_by_udn(&d.udn).is_none()),
            "connectable and connected sets overlap"
        );
    }
}
