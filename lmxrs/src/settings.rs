//! Persisted connection policy and the settings bridge.
//!
//! `GeneralSettings` holds process-wide policy and the per-device
//! `CameraSettings` map. It is constructed once (normally from
//! [`SettingsStore::load`]) and handed to the camera manager, which owns all
//! mutation. The bridge functions mirror changes from the Wi-Fi policy
//! surface into the settings and write them back through the store.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Result;

/// Per-device persisted policy, keyed by the device UDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub udn: String,
    /// Connect automatically when this device is discovered.
    #[serde(default)]
    pub autoconnect: bool,
    /// Identifier of the last-used output profile (LUT), if any.
    #[serde(default)]
    pub lut_id: Option<String>,
    /// Selected aspect/cropping choice.
    #[serde(default = "default_aspect")]
    pub aspect: String,
    /// Apply the anamorphic de-squeeze only while in a video mode.
    #[serde(default)]
    pub aspect_anamorphic_video_only: bool,
}

fn default_aspect() -> String {
    "16:9".to_string()
}

impl CameraSettings {
    /// Default settings for a device seen for the first time.
    pub fn new(udn: impl Into<String>) -> Self {
        Self {
            udn: udn.into(),
            autoconnect: false,
            lut_id: None,
            aspect: default_aspect(),
            aspect_anamorphic_video_only: false,
        }
    }
}

/// Process-wide persisted policy.
///
/// Loaded at process start, mutated on the manager's owner task throughout
/// the run, and flushed back through the [`SettingsStore`] collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Global autoconnect default for devices without a stored record.
    #[serde(default)]
    pub autoconnect: bool,
    /// Per-device settings, keyed by UDN.
    #[serde(default)]
    pub cameras: HashMap<String, CameraSettings>,
    /// Join known camera access points automatically.
    #[serde(default)]
    pub wifi_autoconnect_always: bool,
    /// Ordered list of access-point identifiers eligible for autoconnect.
    #[serde(default)]
    pub wifi_autoconnect_access_points: Vec<String>,
}

impl GeneralSettings {
    /// Looks up the settings record for a device, if one exists.
    pub fn camera(&self, udn: &str) -> Option<&CameraSettings> {
        self.cameras.get(udn)
    }

    /// Returns the settings for a device, creating a default record on
    /// first use.
    pub fn camera_or_default(&mut self, udn: &str) -> &mut CameraSettings {
        self.cameras
            .entry(udn.to_string())
            .or_insert_with(|| CameraSettings::new(udn))
    }
}

/// Boundary to the persistence collaborator.
///
/// The storage format and location are external concerns; implementations
/// are expected to be cheap local reads/writes.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<GeneralSettings>;
    fn save(&self, settings: &GeneralSettings) -> Result<()>;
}

/// Initial values read once at startup to seed the Wi-Fi policy surface.
///
/// After seeding, settings are only written, never re-read, which keeps the
/// bridge from feeding its own writes back to itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiPolicySeed {
    pub autoconnect_always: bool,
    pub access_points: Vec<String>,
}

/// A change observed on the Wi-Fi policy surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiPolicyChange {
    AutoconnectAlways(bool),
    AccessPoints(Vec<String>),
}

/// Reads the seed values for the Wi-Fi policy surface.
pub fn wifi_policy_seed(settings: &GeneralSettings) -> WifiPolicySeed {
    WifiPolicySeed {
        autoconnect_always: settings.wifi_autoconnect_always,
        access_points: settings.wifi_autoconnect_access_points.clone(),
    }
}

/// Mirrors a Wi-Fi policy change into the settings and persists them.
///
/// A store failure is logged and swallowed: the in-memory settings are
/// already updated and must keep working without persistence.
pub fn apply_wifi_change(
    change: WifiPolicyChange,
    settings: &mut GeneralSettings,
    store: &dyn SettingsStore,
) {
    match change {
        WifiPolicyChange::AutoconnectAlways(value) => {
            settings.wifi_autoconnect_always = value;
        }
        WifiPolicyChange::AccessPoints(aps) => {
            settings.wifi_autoconnect_access_points = aps;
        }
    }

    if let Err(e) = store.save(settings) {
        warn!("Failed to persist Wi-Fi policy change: {e}");
    }
}
