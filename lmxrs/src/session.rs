//! HTTP control session to one Lumix camera.
//!
//! Cameras expose a `cam.cgi` endpoint; a controller requests access with
//! `req_acc`, identifying itself with a stable client id, and afterwards
//! issues stateless commands. Every request carries the transport's
//! per-request timeout, so no call can hang past its deadline.

use async_trait::async_trait;
use log::debug;

use crate::Result;
use crate::models::{CameraError, CameraMode, DeviceInfo};
use crate::transport::ControlSession;
use crate::utils::xml_field;

/// Handshake results the camera reports for an accepted controller.
const ACCEPTED_RESULTS: [&str; 2] = ["ok", "ok_under_research_no_msg"];

/// A live control session over the camera's HTTP endpoint.
pub struct LumixSession {
    http: reqwest::Client,
    device: DeviceInfo,
    base_url: String,
}

impl LumixSession {
    /// Performs the access handshake and returns the session.
    ///
    /// `client_id` must be stable across runs so the camera recognizes the
    /// controller it was paired with; `client_name` is shown on the camera
    /// display during pairing.
    pub(crate) async fn open(
        http: reqwest::Client,
        device: DeviceInfo,
        client_id: &str,
        client_name: &str,
    ) -> Result<Self> {
        let base_url = format!("http://{}/cam.cgi", device.host);
        let session = Self {
            http,
            device,
            base_url,
        };

        let body = session
            .command(&[
                ("mode", "accctrl"),
                ("type", "req_acc"),
                ("value", client_id),
                ("value2", client_name),
            ])
            .await?;

        match parse_handshake_result(&body) {
            Some(result) if ACCEPTED_RESULTS.contains(&result) => {
                debug!("Camera {} accepted control session", session.device.udn);
                Ok(session)
            }
            Some(result) => Err(CameraError::Handshake(result.to_string())),
            None => Err(CameraError::InvalidReply(truncated(&body))),
        }
    }

    async fn command(&self, query: &[(&str, &str)]) -> Result<String> {
        let response = self
            .http
            .get(&self.base_url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ControlSession for LumixSession {
    fn udn(&self) -> &str {
        &self.device.udn
    }

    async fn current_mode(&self) -> Result<CameraMode> {
        let body = self.command(&[("mode", "getstate")]).await?;
        Ok(parse_mode(&body))
    }

    async fn ping(&self) -> Result<()> {
        self.command(&[("mode", "getstate")]).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // The protocol has no logout command; dropping the session is the
        // disconnect. The camera frees the slot when the controller stops
        // talking.
        debug!("Closing control session to {}", self.device.udn);
        Ok(())
    }
}

/// Extracts the `<result>` field of a handshake reply.
fn parse_handshake_result(body: &str) -> Option<&str> {
    xml_field(body, "result")
}

/// Extracts the operating mode from a `getstate` reply.
///
/// A missing or non-numeric `cammode` field maps to `Unknown` — callers
/// treat that as "not actionable", the same as an unrecognized code.
fn parse_mode(body: &str) -> CameraMode {
    match xml_field(body, "cammode").and_then(|v| v.parse::<u32>().ok()) {
        Some(code) => CameraMode::from(code),
        None => {
            debug!("No usable cammode in getstate reply");
            CameraMode::Unknown
        }
    }
}

fn truncated(body: &str) -> String {
    const MAX: usize = 120;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_result_is_extracted() {
        let body = "<?xml version=\"1.0\"?><camrply><result>ok</result></camrply>";
        assert_eq!(parse_handshake_result(body), Some("ok"));
    }

    #[test]
    fn handshake_result_missing() {
        assert_eq!(parse_handshake_result("<camrply></camrply>"), None);
    }

    #[test]
    fn accepted_results_include_research_firmware() {
        assert!(ACCEPTED_RESULTS.contains(&"ok"));
        assert!(ACCEPTED_RESULTS.contains(&"ok_under_research_no_msg"));
        assert!(!ACCEPTED_RESULTS.contains(&"err_busy"));
    }

    #[test]
    fn mode_is_parsed_from_getstate() {
        let body = "<camrply><result>ok</result><state><cammode>4</cammode></state></camrply>";
        assert_eq!(parse_mode(body), CameraMode::Manual);

        let video = body.replace("<cammode>4</cammode>", "<cammode>60</cammode>");
        assert_eq!(parse_mode(&video), CameraMode::VideoProgram);
    }

    #[test]
    fn missing_or_garbled_mode_is_unknown() {
        assert_eq!(parse_mode("<camrply><result>ok</result></camrply>"), CameraMode::Unknown);
        assert_eq!(
            parse_mode("<camrply><cammode>rec</cammode></camrply>"),
            CameraMode::Unknown
        );
    }

    #[test]
    fn truncated_caps_long_bodies() {
        let short = truncated("short");
        assert_eq!(short, "short");
        let long = truncated(&"x".repeat(500));
        assert!(long.len() < 200);
    }
}
