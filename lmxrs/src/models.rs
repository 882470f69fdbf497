use bitflags::bitflags;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use thiserror::Error;

bitflags! {
    /// Capabilities of a camera shooting mode.
    ///
    /// Describes which manual exposure controls a mode supports and which
    /// media type it produces. An empty set means the mode is not actionable
    /// for capability queries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CameraModeFlags: u8 {
        /// Shutter speed is manually controllable.
        const SHUTTER = 1 << 0;
        /// Aperture is manually controllable.
        const APERTURE = 1 << 1;
        /// The mode records video.
        const VIDEO = 1 << 2;
        /// The mode records still photos.
        const PHOTO = 1 << 3;
    }
}

/// Camera operating mode as reported on the control channel.
///
/// These values correspond to the positions of the camera's mode dial.
/// Use `CameraMode::from(code)` to convert from the raw codes the camera
/// reports; unrecognized codes map to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    /// Intelligent auto.
    IAuto,
    /// Program auto exposure.
    Program,
    /// Aperture priority.
    Aperture,
    /// Shutter priority.
    Shutter,
    /// Manual exposure.
    Manual,
    /// Creative video, program exposure.
    VideoProgram,
    /// Creative video, aperture priority.
    VideoAperture,
    /// Creative video, shutter priority.
    VideoShutter,
    /// Creative video, manual exposure.
    VideoManual,
    /// Mode not reported or not recognized. Carries no capabilities.
    Unknown,
}

impl CameraMode {
    /// Every defined mode, for iteration in capability checks and tests.
    pub const ALL: [CameraMode; 10] = [
        Self::IAuto,
        Self::Program,
        Self::Aperture,
        Self::Shutter,
        Self::Manual,
        Self::VideoProgram,
        Self::VideoAperture,
        Self::VideoShutter,
        Self::VideoManual,
        Self::Unknown,
    ];

    /// Returns the capability bitmask for this mode.
    ///
    /// Total over the enumeration; the match is exhaustive so every variant
    /// is covered at compile time. `Unknown` is the only mode that returns
    /// the empty set, and callers must treat an empty set as "mode not
    /// actionable" rather than an error.
    pub fn capabilities(self) -> CameraModeFlags {
        match self {
            Self::IAuto => CameraModeFlags::PHOTO,
            Self::Program => CameraModeFlags::PHOTO,
            Self::Aperture => CameraModeFlags::APERTURE.union(CameraModeFlags::PHOTO),
            Self::Shutter => CameraModeFlags::SHUTTER.union(CameraModeFlags::PHOTO),
            Self::Manual => CameraModeFlags::APERTURE
                .union(CameraModeFlags::SHUTTER)
                .union(CameraModeFlags::PHOTO),
            Self::VideoProgram => CameraModeFlags::VIDEO,
            Self::VideoAperture => CameraModeFlags::APERTURE.union(CameraModeFlags::VIDEO),
            Self::VideoShutter => CameraModeFlags::SHUTTER.union(CameraModeFlags::VIDEO),
            Self::VideoManual => CameraModeFlags::APERTURE
                .union(CameraModeFlags::SHUTTER)
                .union(CameraModeFlags::VIDEO),
            Self::Unknown => CameraModeFlags::empty(),
        }
    }

    /// Returns whether the mode supports manual shutter control.
    pub fn has_shutter(self) -> bool {
        self.capabilities().contains(CameraModeFlags::SHUTTER)
    }

    /// Returns whether the mode supports manual aperture control.
    pub fn has_aperture(self) -> bool {
        self.capabilities().contains(CameraModeFlags::APERTURE)
    }

    /// Returns whether the mode records video.
    pub fn is_video(self) -> bool {
        self.capabilities().contains(CameraModeFlags::VIDEO)
    }
}

impl From<u32> for CameraMode {
    fn from(code: u32) -> Self {
        match code {
            9 => Self::IAuto,
            1 => Self::Program,
            2 => Self::Aperture,
            3 => Self::Shutter,
            4 => Self::Manual,
            0x3c => Self::VideoProgram,
            0x3d => Self::VideoAperture,
            0x3e => Self::VideoShutter,
            0x3f => Self::VideoManual,
            _ => Self::Unknown,
        }
    }
}

impl Display for CameraMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IAuto => write!(f, "iA"),
            Self::Program => write!(f, "P"),
            Self::Aperture => write!(f, "A"),
            Self::Shutter => write!(f, "S"),
            Self::Manual => write!(f, "M"),
            Self::VideoProgram => write!(f, "vP"),
            Self::VideoAperture => write!(f, "vA"),
            Self::VideoShutter => write!(f, "vS"),
            Self::VideoManual => write!(f, "vM"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A camera reachable on the network, as reported by discovery.
///
/// Immutable once discovered. Equality and hashing use only the UDN, so a
/// device re-discovered at a new address still compares equal to its
/// earlier announcement.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Unique device name, stable across discovery and connection events.
    pub udn: String,
    /// Model name, e.g. "DMC-GH4".
    pub model_name: String,
    /// Friendly name the camera advertises, if any.
    pub friendly_name: String,
    /// Host address for the control endpoint.
    pub host: String,
}

impl DeviceInfo {
    pub fn new(
        udn: impl Into<String>,
        model_name: impl Into<String>,
        friendly_name: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            udn: udn.into(),
            model_name: model_name.into(),
            friendly_name: friendly_name.into(),
            host: host.into(),
        }
    }
}

impl PartialEq for DeviceInfo {
    fn eq(&self, other: &Self) -> bool {
        self.udn == other.udn
    }
}

impl Eq for DeviceInfo {}

impl Hash for DeviceInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.udn.hash(state);
    }
}

impl Display for DeviceInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.friendly_name.is_empty() {
            write!(f, "{} ({})", self.model_name, self.host)
        } else {
            write!(f, "{} ({})", self.friendly_name, self.host)
        }
    }
}

/// Lifecycle events published by the camera manager.
///
/// Delivered in order per device through a broadcast channel; subscribe via
/// `CameraManager::subscribe` and unsubscribe by dropping the receiver.
#[derive(Debug, Clone)]
pub enum CameraEvent {
    /// A device was seen for the first time. Fired exactly once per device
    /// transition into the connectable lifecycle, not per network packet.
    DeviceDiscovered(DeviceInfo),
    /// The connectable set changed; carries a snapshot for list consumers.
    ConnectableChanged(Vec<DeviceInfo>),
    /// A control session was established.
    CameraConnected(DeviceInfo),
    /// A control session was lost or deliberately closed.
    CameraDisconnected {
        device: DeviceInfo,
        /// Whether the device still answers discovery probes. If so it was
        /// re-added to the connectable set as a manual candidate.
        still_reachable: bool,
    },
}

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// A discovery I/O error occurred. Transient: the re-scan timer keeps
    /// retrying on its cadence.
    #[error("discovery I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An HTTP error occurred on the control channel.
    #[error("control channel error: {0}")]
    Http(#[from] reqwest::Error),

    /// The camera rejected the control handshake.
    #[error("handshake rejected: {0}")]
    Handshake(String),

    /// The camera returned a reply that could not be interpreted.
    #[error("invalid reply from camera: {0}")]
    InvalidReply(String),

    /// The connection handshake did not complete within its deadline.
    #[error("connection timeout")]
    Timeout,

    /// The device is already in the connected set. Indicates a logic bug in
    /// registry usage, not a runtime condition.
    #[error("camera {0} is already connected")]
    AlreadyConnected(String),

    /// The device is not in the connected set. Indicates a logic bug in
    /// registry usage, not a runtime condition.
    #[error("camera {0} is not connected")]
    NotConnected(String),

    /// A connect for this device is already in flight.
    #[error("connection to {0} already in progress")]
    ConnectPending(String),

    /// `start_listening` was called while already listening.
    #[error("discovery is already listening")]
    AlreadyListening,

    /// The manager has been shut down.
    #[error("camera manager is closed")]
    ManagerClosed,

    /// The settings store failed to persist a change. Logged; never blocks
    /// in-memory operation.
    #[error("settings sync failed: {0}")]
    SettingsSync(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_mode_from_u32_all_known_codes() {
        assert_eq!(CameraMode::from(9), CameraMode::IAuto);
        assert_eq!(CameraMode::from(1), CameraMode::Program);
        assert_eq!(CameraMode::from(2), CameraMode::Aperture);
        assert_eq!(CameraMode::from(3), CameraMode::Shutter);
        assert_eq!(CameraMode::from(4), CameraMode::Manual);
        assert_eq!(CameraMode::from(0x3c), CameraMode::VideoProgram);
        assert_eq!(CameraMode::from(0x3d), CameraMode::VideoAperture);
        assert_eq!(CameraMode::from(0x3e), CameraMode::VideoShutter);
        assert_eq!(CameraMode::from(0x3f), CameraMode::VideoManual);
    }

    #[test]
    fn camera_mode_from_u32_unknown_codes() {
        assert_eq!(CameraMode::from(0), CameraMode::Unknown);
        assert_eq!(CameraMode::from(5), CameraMode::Unknown);
        assert_eq!(CameraMode::from(0x40), CameraMode::Unknown);
        assert_eq!(CameraMode::from(999), CameraMode::Unknown);
    }

    #[test]
    fn every_real_mode_has_capabilities() {
        for mode in CameraMode::ALL {
            if mode == CameraMode::Unknown {
                continue;
            }
            assert!(
                !mode.capabilities().is_empty(),
                "mode {mode} has an empty capability mask"
            );
        }
    }

    #[test]
    fn unknown_mode_has_no_capabilities() {
        assert_eq!(CameraMode::Unknown.capabilities(), CameraModeFlags::empty());
        assert!(!CameraMode::Unknown.has_shutter());
        assert!(!CameraMode::Unknown.has_aperture());
        assert!(!CameraMode::Unknown.is_video());
    }

    #[test]
    fn manual_mode_capabilities() {
        let caps = CameraMode::Manual.capabilities();
        assert!(caps.contains(CameraModeFlags::SHUTTER));
        assert!(caps.contains(CameraModeFlags::APERTURE));
        assert!(caps.contains(CameraModeFlags::PHOTO));
        assert!(!caps.contains(CameraModeFlags::VIDEO));
    }

    #[test]
    fn video_modes_are_video_only() {
        for mode in [
            CameraMode::VideoProgram,
            CameraMode::VideoAperture,
            CameraMode::VideoShutter,
            CameraMode::VideoManual,
        ] {
            assert!(mode.is_video());
            assert!(!mode.capabilities().contains(CameraModeFlags::PHOTO));
        }
    }

    #[test]
    fn priority_modes_expose_one_control() {
        assert!(CameraMode::Aperture.has_aperture());
        assert!(!CameraMode::Aperture.has_shutter());
        assert!(CameraMode::Shutter.has_shutter());
        assert!(!CameraMode::Shutter.has_aperture());
        assert!(CameraMode::VideoAperture.has_aperture());
        assert!(!CameraMode::VideoAperture.has_shutter());
    }

    #[test]
    fn camera_mode_display() {
        assert_eq!(format!("{}", CameraMode::IAuto), "iA");
        assert_eq!(format!("{}", CameraMode::Manual), "M");
        assert_eq!(format!("{}", CameraMode::VideoShutter), "vS");
        assert_eq!(format!("{}", CameraMode::Unknown), "unknown");
    }

    #[test]
    fn device_info_equality_by_udn() {
        let a = DeviceInfo::new("uuid-1", "DMC-GH4", "GH4", "192.168.1.5");
        let b = DeviceInfo::new("uuid-1", "DC-S5", "S5", "192.168.1.9");
        let c = DeviceInfo::new("uuid-2", "DMC-GH4", "GH4", "192.168.1.5");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn device_info_display_prefers_friendly_name() {
        let named = DeviceInfo::new("uuid-1", "DMC-GH4", "Studio GH4", "192.168.1.5");
        assert_eq!(format!("{named}"), "Studio GH4 (192.168.1.5)");
        let unnamed = DeviceInfo::new("uuid-1", "DMC-GH4", "", "192.168.1.5");
        assert_eq!(format!("{unnamed}"), "DMC-GH4 (192.168.1.5)");
    }

    #[test]
    fn camera_error_display() {
        assert_eq!(
            format!("{}", CameraError::AlreadyConnected("uuid-1".into())),
            "camera uuid-1 is already connected"
        );
        assert_eq!(
            format!("{}", CameraError::NotConnected("uuid-1".into())),
            "camera uuid-1 is not connected"
        );
        assert_eq!(format!("{}", CameraError::Timeout), "connection timeout");
        assert_eq!(
            format!("{}", CameraError::AlreadyListening),
            "discovery is already listening"
        );
    }
}
