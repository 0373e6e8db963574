/// WiFi scan results and the scanner seam.
///
/// The radio performs one blocking active scan per call and hands back the
/// full access point list in its own order. Platform adapters translate the
/// driver's records into [`NetworkObservation`]s.

use alloc::vec::Vec;

use crate::protocol::{MacString, NameString};

/// Access point authentication mode as reported by the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
    WapiPsk,
    Unknown,
}

impl AuthMode {
    /// Label written into the survey file's AuthMode column
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Open => "OPEN",
            AuthMode::Wep => "WEP",
            AuthMode::WpaPsk => "WPA_PSK",
            AuthMode::Wpa2Psk => "WPA2_PSK",
            AuthMode::WpaWpa2Psk => "WPA_WPA2_PSK",
            AuthMode::Wpa2Enterprise => "WPA2_ENTERPRISE",
            AuthMode::Wpa3Psk => "WPA3_PSK",
            AuthMode::Wpa2Wpa3Psk => "WPA2_WPA3_PSK",
            AuthMode::WapiPsk => "WAPI_PSK",
            AuthMode::Unknown => "UNKNOWN",
        }
    }
}

/// One access point seen by a scan
#[derive(Debug, Clone)]
pub struct NetworkObservation {
    pub bssid: [u8; 6],
    pub ssid: NameString,
    pub auth: AuthMode,
    pub channel: u8,
    pub rssi: i8,
}

impl NetworkObservation {
    pub fn new(bssid: [u8; 6], ssid: &str, auth: AuthMode, channel: u8, rssi: i8) -> Self {
        let mut name = NameString::new();
        // SSIDs are at most 32 bytes; anything longer is a driver bug
        for ch in ssid.chars() {
            if name.push(ch).is_err() {
                break;
            }
        }
        Self {
            bssid,
            ssid: name,
            auth,
            channel,
            rssi,
        }
    }

    /// BSSID as "AA:BB:CC:DD:EE:FF"
    pub fn mac(&self) -> MacString {
        let mut buf = MacString::new();
        format_mac(&self.bssid, &mut buf);
        buf
    }
}

/// A radio that can perform one blocking WiFi scan.
pub trait NetworkScanner {
    /// Scan all channels and return every access point heard.
    /// Returns an empty list when nothing is in range or the radio failed.
    fn scan(&mut self) -> Vec<NetworkObservation>;
}

impl<T: NetworkScanner + ?Sized> NetworkScanner for &mut T {
    fn scan(&mut self) -> Vec<NetworkObservation> {
        (**self).scan()
    }
}

/// Format a 6-byte MAC address into "AA:BB:CC:DD:EE:FF" string
pub fn format_mac(mac: &[u8; 6], buf: &mut MacString) {
    use core::fmt::Write;
    let _ = write!(
        buf,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}
