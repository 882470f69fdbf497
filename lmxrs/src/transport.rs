//! Network-layer boundary traits.
//!
//! The manager consumes three primitives: listen for presence
//! announcements, send a discovery probe, and open a control session to an
//! address. [`SsdpTransport`](crate::ssdp::SsdpTransport) is the Lumix
//! implementation; tests substitute their own.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::models::{CameraMode, DeviceInfo};

/// Discovery and session-establishment primitives for one camera family.
///
/// Implementations report every announcement they see; de-duplication by
/// identifier happens at the manager, so repeated announcements for a known
/// device are expected and harmless.
#[async_trait]
pub trait CameraTransport: Send + Sync + 'static {
    /// Listens for passive presence announcements until cancelled, sending
    /// each announced device through `announcements`.
    async fn listen(
        &self,
        announcements: mpsc::Sender<DeviceInfo>,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Runs one active discovery probe cycle and returns the devices that
    /// answered within the scan window.
    async fn probe(&self) -> Result<Vec<DeviceInfo>>;

    /// Opens a control session to the device.
    ///
    /// The handshake itself may take arbitrarily long on a sick network;
    /// the manager bounds the call with a deadline.
    async fn open_session(&self, device: &DeviceInfo) -> Result<Arc<dyn ControlSession>>;
}

/// A live control session to one camera.
#[async_trait]
pub trait ControlSession: Send + Sync {
    /// UDN of the camera this session is bound to.
    fn udn(&self) -> &str;

    /// Queries the camera's current operating mode.
    async fn current_mode(&self) -> Result<CameraMode>;

    /// Cheap liveness check. An error means the session is lost.
    async fn ping(&self) -> Result<()>;

    /// Closes the session. Best-effort: the camera may already be gone.
    async fn close(&self) -> Result<()>;
}
