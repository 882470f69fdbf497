//! Autoconnect decision for newly discovered devices.

use crate::models::DeviceInfo;
use crate::settings::GeneralSettings;

/// What to do with a newly discovered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoconnectDecision {
    /// Connect without user action.
    Connect,
    /// Surface the device for manual selection.
    Offer,
}

/// Decides whether a newly discovered device should be connected
/// automatically.
///
/// Strict two-level override: when a per-device record exists, its
/// `autoconnect` flag decides — a stored `false` is never overridden by the
/// global default, and a stored `true` connects even when the global
/// default is off. Devices without a record follow the global default.
///
/// Runs exactly once per device, on its transition into the connectable
/// lifecycle; re-scans and post-disconnect re-listings do not come back
/// here.
pub fn decide(device: &DeviceInfo, settings: &GeneralSettings) -> AutoconnectDecision {
    let autoconnect = match settings.camera(&device.udn) {
        Some(camera) => camera.autoconnect,
        None => settings.autoconnect,
    };

    if autoconnect {
        AutoconnectDecision::Connect
    } else {
        AutoconnectDecision::Offer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceInfo;

    fn device(udn: &str) -> DeviceInfo {
        DeviceInfo::new(udn, "DMC-GH4", "", "192.168.1.5")
    }

    fn settings_with(udn: &str, autoconnect: bool, global: bool) -> GeneralSettings {
        let mut settings = GeneralSettings {
            autoconnect: global,
            ..Default::default()
        };
        settings.camera_or_default(udn).autoconnect = autoconnect;
        settings
    }

    #[test]
    fn stored_true_connects_despite_global_off() {
        let settings = settings_with("uuid-1", true, false);
        assert_eq!(
            decide(&device("uuid-1"), &settings),
            AutoconnectDecision::Connect
        );
    }

    #[test]
    fn stored_false_offers_despite_global_on() {
        let settings = settings_with("uuid-1", false, true);
        assert_eq!(
            decide(&device("uuid-1"), &settings),
            AutoconnectDecision::Offer
        );
    }

    #[test]
    fn unknown_device_follows_global_default() {
        let on = GeneralSettings {
            autoconnect: true,
            ..Default::default()
        };
        assert_eq!(decide(&device("uuid-9"), &on), AutoconnectDecision::Connect);

        let off = GeneralSettings::default();
        assert_eq!(decide(&device("uuid-9"), &off), AutoconnectDecision::Offer);
    }

    #[test]
    fn record_for_other_device_does_not_leak() {
        let settings = settings_with("uuid-1", true, false);
        assert_eq!(
            decide(&device("uuid-2"), &settings),
            AutoconnectDecision::Offer
        );
    }
}
