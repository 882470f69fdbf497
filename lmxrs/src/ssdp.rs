//! SSDP discovery transport for Lumix cameras.
//!
//! Lumix bodies advertise themselves as UPnP media servers. Active
//! discovery sends an M-SEARCH probe to the SSDP multicast group and
//! collects unicast responses within a bounded scan window; passive
//! discovery joins the multicast group and watches `ssdp:alive`
//! announcements. Both paths report every sighting — de-duplication by
//! identifier is the manager's job.

use async_trait::async_trait;
use futures_timer::Delay;
use log::{debug, warn};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::Result;
use crate::constants::{ssdp, timeouts};
use crate::models::DeviceInfo;
use crate::session::LumixSession;
use crate::transport::{CameraTransport, ControlSession};
use crate::utils::{host_from_url, xml_field};

/// Delay between the two M-SEARCH datagrams of one probe cycle. SSDP runs
/// over UDP; a repeated probe papers over single-datagram loss.
const PROBE_REPEAT_DELAY: Duration = Duration::from_millis(100);

/// Lumix-family implementation of the network layer.
pub struct SsdpTransport {
    http: reqwest::Client,
    client_id: String,
    client_name: String,
}

impl SsdpTransport {
    /// Creates a transport with a freshly generated controller id.
    /// `client_name` is shown on the camera display during pairing.
    pub fn new(client_name: impl Into<String>) -> Result<Self> {
        Self::with_client_id(Uuid::new_v4().to_string(), client_name)
    }

    /// Creates a transport with a persisted controller id, so cameras
    /// recognize a controller they were already paired with.
    pub fn with_client_id(
        client_id: impl Into<String>,
        client_name: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeouts::request_timeout())
            .build()?;
        Ok(Self {
            http,
            client_id: client_id.into(),
            client_name: client_name.into(),
        })
    }

    /// Resolves model and friendly name from the device description
    /// document the camera serves at its LOCATION URL.
    ///
    /// Failures are tolerated: discovery headers already carry everything
    /// needed to connect, the names are cosmetic.
    async fn describe(&self, location: &str, udn: &str, host: &str) -> DeviceInfo {
        match self.http.get(location).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => {
                    let (model, friendly) = parse_description(&body);
                    DeviceInfo::new(udn, model, friendly, host)
                }
                Err(e) => {
                    debug!("Failed to read device description from {location}: {e}");
                    DeviceInfo::new(udn, "", "", host)
                }
            },
            Err(e) => {
                debug!("Failed to fetch device description from {location}: {e}");
                DeviceInfo::new(udn, "", "", host)
            }
        }
    }
}

#[async_trait]
impl CameraTransport for SsdpTransport {
    async fn listen(
        &self,
        announcements: mpsc::Sender<DeviceInfo>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, ssdp::MULTICAST_PORT)).await?;
        socket.join_multicast_v4(ssdp::MULTICAST_ADDR, Ipv4Addr::UNSPECIFIED)?;
        debug!("Listening for SSDP announcements on {}", ssdp::MULTICAST_PORT);

        let mut buf = vec![0u8; ssdp::MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("SSDP listener cancelled");
                    return Ok(());
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, peer) = received?;
                    let text = String::from_utf8_lossy(&buf[..len]);
                    if let Some((udn, location)) = parse_notify(&text) {
                        let Some(host) = host_from_url(&location) else {
                            warn!("Announcement from {peer} carries unusable location {location}");
                            continue;
                        };
                        let device = self.describe(&location, &udn, host).await;
                        debug!("SSDP alive from {device}");
                        if announcements.send(device).await.is_err() {
                            // Receiver gone: the manager shut down.
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn probe(&self) -> Result<Vec<DeviceInfo>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        let target = (ssdp::MULTICAST_ADDR, ssdp::MULTICAST_PORT);

        let request = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\r\n",
            ssdp::MULTICAST_ADDR,
            ssdp::MULTICAST_PORT,
            ssdp::SEARCH_MX,
            ssdp::SEARCH_TARGET,
        );

        socket.send_to(request.as_bytes(), target).await?;
        Delay::new(PROBE_REPEAT_DELAY).await;
        socket.send_to(request.as_bytes(), target).await?;

        let mut found: HashMap<String, (String, String)> = HashMap::new();
        let mut buf = vec![0u8; ssdp::MAX_DATAGRAM];
        let deadline = Instant::now() + timeouts::scan_window();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, _peer))) => {
                    let text = String::from_utf8_lossy(&buf[..len]);
                    if let Some((udn, location)) = parse_probe_response(&text) {
                        if let Some(host) = host_from_url(&location) {
                            let host = host.to_string();
                            found.entry(udn).or_insert((location, host));
                        }
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break, // scan window elapsed
            }
        }

        let mut devices = Vec::with_capacity(found.len());
        for (udn, (location, host)) in found {
            devices.push(self.describe(&location, &udn, &host).await);
        }
        debug!("Probe cycle found {} camera(s)", devices.len());
        Ok(devices)
    }

    async fn open_session(&self, device: &DeviceInfo) -> Result<Arc<dyn ControlSession>> {
        let session = LumixSession::open(
            self.http.clone(),
            device.clone(),
            &self.client_id,
            &self.client_name,
        )
        .await?;
        Ok(Arc::new(session))
    }
}

/// Parses one `NOTIFY * HTTP/1.1` announcement. Returns the UDN and
/// LOCATION URL when the datagram is a Lumix `ssdp:alive` for the media
/// server target.
fn parse_notify(text: &str) -> Option<(String, String)> {
    let mut lines = text.lines();
    if !lines.next()?.starts_with("NOTIFY") {
        return None;
    }
    let headers = header_map(lines);

    if headers.get("nts").map(String::as_str) != Some("ssdp:alive") {
        return None;
    }
    if headers.get("nt").map(String::as_str) != Some(ssdp::SEARCH_TARGET) {
        return None;
    }
    device_from_headers(&headers)
}

/// Parses one unicast M-SEARCH response. Returns the UDN and LOCATION URL
/// when the response is a Lumix media server.
fn parse_probe_response(text: &str) -> Option<(String, String)> {
    let mut lines = text.lines();
    let status = lines.next()?;
    if !status.starts_with("HTTP/1.1 200") {
        return None;
    }
    let headers = header_map(lines);

    if headers.get("st").map(String::as_str) != Some(ssdp::SEARCH_TARGET) {
        return None;
    }
    device_from_headers(&headers)
}

fn device_from_headers(headers: &HashMap<String, String>) -> Option<(String, String)> {
    let server = headers.get("server")?;
    if !server.contains(ssdp::VENDOR_MARKER) {
        return None;
    }

    let udn = udn_from_usn(headers.get("usn")?)?;
    let location = headers.get("location")?.clone();
    Some((udn, location))
}

fn header_map<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    headers
}

/// Extracts and validates the UDN from a USN header.
///
/// A USN looks like `uuid:4D454930-...::urn:schemas-upnp-org:...`; the UDN
/// is the `uuid:` part. Announcements with a malformed UUID are dropped
/// with a warning rather than propagated.
fn udn_from_usn(usn: &str) -> Option<String> {
    let udn = usn.split("::").next()?;
    let raw = udn.strip_prefix("uuid:")?;
    match Uuid::parse_str(raw) {
        Ok(_) => Some(udn.to_string()),
        Err(e) => {
            warn!("Dropping announcement with malformed UDN '{udn}': {e}");
            None
        }
    }
}

/// Extracts model and friendly name from a UPnP device description body.
fn parse_description(body: &str) -> (String, String) {
    let model = xml_field(body, "modelName").unwrap_or_default().to_string();
    let friendly = xml_field(body, "friendlyName")
        .unwrap_or_default()
        .to_string();
    (model, friendly)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UDN: &str = "uuid:4d454930-0100-1000-8000-0080f0c1d2e3";

    fn probe_response() -> String {
        format!(
            "HTTP/1.1 200 OK\r\n\
             CACHE-CONTROL: max-age=1800\r\n\
             EXT:\r\n\
             LOCATION: http://192.168.1.5:60606/Server0/ddd\r\n\
             SERVER: Panasonic UPnP/1.0 DLNADOC/1.50\r\n\
             ST: {}\r\n\
             USN: {}::{}\r\n\r\n",
            ssdp::SEARCH_TARGET,
            UDN,
            ssdp::SEARCH_TARGET,
        )
    }

    fn notify(nts: &str) -> String {
        format!(
            "NOTIFY * HTTP/1.1\r\n\
             HOST: 239.255.255.250:1900\r\n\
             NT: {}\r\n\
             NTS: {}\r\n\
             LOCATION: http://192.168.1.5:60606/Server0/ddd\r\n\
             SERVER: Panasonic UPnP/1.0 DLNADOC/1.50\r\n\
             USN: {}::{}\r\n\r\n",
            ssdp::SEARCH_TARGET,
            nts,
            UDN,
            ssdp::SEARCH_TARGET,
        )
    }

    #[test]
    fn probe_response_is_parsed() {
        let (udn, location) = parse_probe_response(&probe_response()).unwrap();
        assert_eq!(udn, UDN);
        assert_eq!(location, "http://192.168.1.5:60606/Server0/ddd");
    }

    #[test]
    fn non_panasonic_response_is_ignored() {
        let text = probe_response().replace("Panasonic", "SomeNas");
        assert!(parse_probe_response(&text).is_none());
    }

    #[test]
    fn wrong_search_target_is_ignored() {
        let text = probe_response().replace("MediaServer", "MediaRenderer");
        assert!(parse_probe_response(&text).is_none());
    }

    #[test]
    fn error_status_is_ignored() {
        let text = probe_response().replace("200 OK", "503 Unavailable");
        assert!(parse_probe_response(&text).is_none());
    }

    #[test]
    fn alive_notify_is_parsed() {
        let (udn, _) = parse_notify(&notify("ssdp:alive")).unwrap();
        assert_eq!(udn, UDN);
    }

    #[test]
    fn byebye_notify_is_ignored() {
        assert!(parse_notify(&notify("ssdp:byebye")).is_none());
    }

    #[test]
    fn malformed_udn_is_dropped() {
        let text = probe_response().replace(UDN, "uuid:not-a-uuid");
        assert!(parse_probe_response(&text).is_none());
    }

    #[test]
    fn usn_without_uuid_prefix_is_dropped() {
        assert!(udn_from_usn("4d454930-0100-1000-8000-0080f0c1d2e3").is_none());
    }

    #[test]
    fn description_names_are_extracted() {
        let body = "<root><device><friendlyName>Studio GH4</friendlyName>\
                    <modelName>DMC-GH4</modelName></device></root>";
        let (model, friendly) = parse_description(body);
        assert_eq!(model, "DMC-GH4");
        assert_eq!(friendly, "Studio GH4");
    }

    #[test]
    fn missing_description_fields_default_empty() {
        let (model, friendly) = parse_description("<root/>");
        assert!(model.is_empty());
        assert!(friendly.is_empty());
    }
}
