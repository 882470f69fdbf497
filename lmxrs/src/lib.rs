//! A Rust library for discovering and controlling Panasonic Lumix cameras
//! over Wi-Fi.
//!
//! This crate provides a high-level async API for the camera connection
//! lifecycle:
//!
//! - Discovering cameras via SSDP (passive announcements and active probes)
//! - Auto-connecting known cameras according to persisted per-device policy
//! - Tracking connectable vs. connected device sets
//! - Exposing the camera's shooting mode as a capability bitmask
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lmxrs::{CameraEvent, CameraManager, SsdpTransport};
//!
//! # async fn example(store: Arc<dyn lmxrs::SettingsStore>) -> lmxrs::Result<()> {
//! let transport = Arc::new(SsdpTransport::new("lmxrs")?);
//! let settings = store.load()?;
//! let manager = CameraManager::new(transport, settings, store);
//!
//! manager.start_listening().await?;
//!
//! let mut events = manager.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let CameraEvent::DeviceDiscovered(device) = event {
//!         let camera = manager.connect_camera(&device).await?;
//!         let mode = camera.session().current_mode().await?;
//!         println!("{device} is in mode {mode}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! All registry and settings mutation is serialized on one owner task
//! inside [`CameraManager`]; network I/O runs on background tasks and
//! marshals its results back to the owner. Public methods are safe to call
//! from any task.
//!
//! # Error Handling
//!
//! All operations return `Result<T, CameraError>`. Discovery I/O errors are
//! transient (logged and retried on the re-scan timer); connect failures
//! surface to the caller and leave the device connectable.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade. To see log
//! output, add a logging implementation like `env_logger`.

// Internal implementation modules
mod constants;
mod session;
mod utils;

// Public API modules
pub mod manager;
pub mod models;
pub mod policy;
pub mod registry;
pub mod settings;
pub mod ssdp;
pub mod transport;

// Re-exported public API
pub use manager::CameraManager;
pub use models::{CameraError, CameraEvent, CameraMode, CameraModeFlags, DeviceInfo};
pub use policy::{AutoconnectDecision, decide};
pub use registry::{ConnectedCamera, DeviceRegistry};
pub use settings::{
    CameraSettings, GeneralSettings, SettingsStore, WifiPolicyChange, WifiPolicySeed,
    apply_wifi_change, wifi_policy_seed,
};
pub use ssdp::SsdpTransport;
pub use transport::{CameraTransport, ControlSession};

/// A specialized `Result` type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;
