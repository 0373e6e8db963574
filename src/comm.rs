/// Serial plumbing shared by the GPS decoder and the NDJSON status stream.
///
/// Incoming serial data (NMEA sentences from the receiver) is accumulated
/// line by line; outgoing status is newline-delimited JSON on the console.

use crate::board;
use crate::export::Medium;
use crate::protocol::{DeviceMessage, MAX_MSG_LEN, VERSION};
use crate::scanner::NetworkObservation;
use crate::wardrive::{StatusEvent, StatusSink};

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

// ── NDJSON status sink ─────────────────────────────────────────────────

/// Status sink that turns session events into NDJSON lines for a serial
/// companion. Each complete line (newline included) is handed to `write`.
pub struct NdjsonSink<W: FnMut(&[u8])> {
    write: W,
    medium: Option<Medium>,
    networks: u32,
}

impl<W: FnMut(&[u8])> NdjsonSink<W> {
    pub fn new(write: W) -> Self {
        Self {
            write,
            medium: None,
            networks: 0,
        }
    }

    fn emit(&mut self, msg: &DeviceMessage) {
        let mut buf = [0u8; MAX_MSG_LEN];
        match serialize_message(msg, &mut buf) {
            Some(len) => (self.write)(&buf[..len]),
            None => log::warn!("Status message too large, dropped"),
        }
    }

    fn status(&mut self, state: &'static str) {
        self.emit(&DeviceMessage::Status {
            state,
            networks: self.networks,
            medium: self.medium.map(|m| m.as_str()),
            board: board::BOARD_NAME,
            version: VERSION,
        });
    }

    fn network(&mut self, network: &NetworkObservation, lat: f64, lon: f64, n: u32) {
        let mac = network.mac();
        self.emit(&DeviceMessage::Network {
            mac: &mac,
            ssid: &network.ssid,
            auth: network.auth.as_str(),
            ch: network.channel,
            rssi: network.rssi,
            lat,
            lon,
            n,
        });
    }
}

impl<W: FnMut(&[u8])> StatusSink for NdjsonSink<W> {
    fn notify(&mut self, event: &StatusEvent<'_>) {
        match *event {
            StatusEvent::Banner
            | StatusEvent::Connectivity { .. }
            | StatusEvent::GpsDataAvailable
            | StatusEvent::LoggingBatch { .. } => {}
            StatusEvent::StorageSelected(medium) => {
                self.medium = Some(medium);
                self.status(event.name());
            }
            StatusEvent::FixUpdated(fix) | StatusEvent::FixNotUpdated(fix) => {
                self.emit(&DeviceMessage::Fix {
                    valid: fix.valid,
                    lat: fix.latitude,
                    lon: fix.longitude,
                    alt: fix.altitude_m,
                    hdop: fix.hdop,
                    sats: fix.satellites,
                });
            }
            StatusEvent::NetworkLogged {
                network,
                fix,
                networks_found,
                ..
            } => {
                self.networks = networks_found;
                self.network(network, fix.latitude, fix.longitude, networks_found);
            }
            StatusEvent::Summary {
                outcome,
                networks_found,
                medium,
            } => {
                self.networks = networks_found;
                self.medium = medium;
                self.status(outcome.as_str());
            }
            _ => self.status(event.name()),
        }
    }
}

// ── Serial line reader ─────────────────────────────────────────────────

/// Serial line reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader<const N: usize> {
    buf: [u8; N],
    pos: usize,
    overflowed: bool,
}

impl<const N: usize> LineReader<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            pos: 0,
            overflowed: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            let overflowed = core::mem::replace(&mut self.overflowed, false);
            let len = core::mem::replace(&mut self.pos, 0);
            if len > 0 && !overflowed {
                Some(&self.buf[..len])
            } else {
                None
            }
        } else if self.overflowed {
            None
        } else if self.pos < N {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow: drop the rest of this line
            self.overflowed = true;
            self.pos = 0;
            None
        }
    }
}

impl<const N: usize> Default for LineReader<N> {
    fn default() -> Self {
        Self::new()
    }
}
