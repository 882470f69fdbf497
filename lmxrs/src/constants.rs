//! Constants for the Lumix discovery and control protocol.
//!
//! These values correspond to the SSDP/UPnP discovery parameters and the
//! timing constants used by the connection-lifecycle manager.

/// SSDP discovery constants.
pub mod ssdp {
    use std::net::Ipv4Addr;

    /// Multicast group for SSDP presence announcements and search probes.
    pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
    pub const MULTICAST_PORT: u16 = 1900;

    /// Search target the cameras answer to. Lumix bodies advertise
    /// themselves as UPnP media servers.
    pub const SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:MediaServer:1";

    /// Maximum response delay requested in M-SEARCH probes (seconds).
    pub const SEARCH_MX: u32 = 2;

    /// Marker in the SERVER/NOTIFY headers identifying Lumix firmware.
    pub const VENDOR_MARKER: &str = "Panasonic";

    /// Maximum datagram size accepted from the discovery socket.
    pub const MAX_DATAGRAM: usize = 2048;
}

/// Timeout and interval constants.
pub mod timeouts {
    use std::time::Duration;

    pub const SEARCH_INTERVAL_SECS: u64 = 5;
    pub const SCAN_WINDOW_SECS: u64 = 2;
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const REQUEST_TIMEOUT_SECS: u64 = 5;
    pub const KEEPALIVE_INTERVAL_SECS: u64 = 3;

    /// Cadence of the timer-driven re-scan.
    pub fn search_interval() -> Duration {
        Duration::from_secs(SEARCH_INTERVAL_SECS)
    }

    /// How long one probe cycle collects responses before returning.
    pub fn scan_window() -> Duration {
        Duration::from_secs(SCAN_WINDOW_SECS)
    }

    /// Upper bound on the connect handshake.
    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }

    /// Per-request timeout on the HTTP control channel.
    pub fn request_timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }

    /// Cadence of the per-session liveness ping.
    pub fn keepalive_interval() -> Duration {
        Duration::from_secs(KEEPALIVE_INTERVAL_SECS)
    }
}

/// Event channel sizing.
pub mod channels {
    /// Broadcast buffer for lifecycle events.
    pub const EVENT_CAPACITY: usize = 64;
    /// Command/internal message buffer for the owner task.
    pub const COMMAND_CAPACITY: usize = 32;
}
