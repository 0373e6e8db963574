/// JSON status protocol for a serial companion (logger, phone app).
///
/// All messages are newline-delimited JSON (NDJSON).
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::String;
use serde::Serialize;

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// Maximum length for SSID strings (802.11 caps SSIDs at 32 bytes)
pub type NameString = String<32>;

/// Messages sent from the device to the companion
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// Newly logged access point
    #[serde(rename = "wifi")]
    Network {
        mac: &'a MacString,
        ssid: &'a NameString,
        /// WiGLE auth label, e.g. "WPA2_PSK"
        auth: &'static str,
        ch: u8,
        rssi: i8,
        lat: f64,
        lon: f64,
        /// Networks logged so far this session
        n: u32,
    },
    /// Receiver diagnostics while waiting for a fresh fix
    #[serde(rename = "fix")]
    Fix {
        valid: bool,
        lat: f64,
        lon: f64,
        alt: f64,
        hdop: f64,
        sats: u8,
    },
    /// Session state change or final summary
    #[serde(rename = "status")]
    Status {
        /// Session phase or outcome, e.g. "waiting_fix", "gps_not_found"
        state: &'static str,
        /// Networks logged so far this session
        networks: u32,
        /// Selected storage medium ("sd" / "flash"), once known
        #[serde(skip_serializing_if = "Option::is_none")]
        medium: Option<&'static str>,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    fn to_json(msg: &DeviceMessage) -> std::string::String {
        let mut buf = [0u8; MAX_MSG_LEN];
        let len = serde_json_core::to_slice(msg, &mut buf).unwrap();
        core::str::from_utf8(&buf[..len]).unwrap().into()
    }

    #[test]
    fn serialize_network_message() {
        let mac = MacString::try_from("AA:BB:CC:DD:EE:FF").unwrap();
        let ssid = NameString::try_from("TestNet").unwrap();
        let json = to_json(&DeviceMessage::Network {
            mac: &mac,
            ssid: &ssid,
            auth: "WPA2_PSK",
            ch: 6,
            rssi: -47,
            lat: 10.5,
            lon: -20.25,
            n: 3,
        });
        assert!(json.contains(r#""type":"wifi""#));
        assert!(json.contains(r#""mac":"AA:BB:CC:DD:EE:FF""#));
        assert!(json.contains(r#""ssid":"TestNet""#));
        assert!(json.contains(r#""auth":"WPA2_PSK""#));
        assert!(json.contains(r#""ch":6"#));
        assert!(json.contains(r#""rssi":-47"#));
        assert!(json.contains(r#""lat":10.5"#));
        assert!(json.contains(r#""lon":-20.25"#));
        assert!(json.contains(r#""n":3"#));
    }

    #[test]
    fn serialize_fix_message() {
        let json = to_json(&DeviceMessage::Fix {
            valid: false,
            lat: 0.0,
            lon: 0.0,
            alt: 0.0,
            hdop: 2.5,
            sats: 4,
        });
        assert!(json.contains(r#""type":"fix""#));
        assert!(json.contains(r#""valid":false"#));
        assert!(json.contains(r#""sats":4"#));
        assert!(json.contains(r#""hdop":2.5"#));
    }

    #[test]
    fn serialize_status_message() {
        let json = to_json(&DeviceMessage::Status {
            state: "scanning",
            networks: 12,
            medium: Some("sd"),
            board: "test_board",
            version: "0.1.0",
        });
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""state":"scanning""#));
        assert!(json.contains(r#""networks":12"#));
        assert!(json.contains(r#""medium":"sd""#));
        assert!(json.contains(r#""board":"test_board""#));
    }

    #[test]
    fn status_without_medium_omits_field() {
        let json = to_json(&DeviceMessage::Status {
            state: "storage_unavailable",
            networks: 0,
            medium: None,
            board: "test_board",
            version: "0.1.0",
        });
        assert!(!json.contains("medium"));
    }

    // ── Version constant ────────────────────────────────────────────

    #[test]
    fn version_is_semver() {
        let parts: heapless::Vec<&str, 4> = VERSION.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "VERSION should be semver (major.minor.patch)"
        );
        for part in &parts {
            assert!(part.parse::<u32>().is_ok(), "'{part}' is not a number");
        }
    }
}
