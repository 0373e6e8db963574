/// GPS receiver decoding: NMEA 0183 over UART.
///
/// The receiver streams `$..GGA` and `$..RMC` sentences at 9600 baud. Bytes
/// are fed in as they arrive; complete, checksummed sentences update the
/// current [`PositionFix`]. A sentence carrying a valid position raises the
/// fresh-fix flag, which stays set until the controller consumes it.
///
/// Decoding is best effort: partial sentences wait for their terminator,
/// and anything malformed is dropped without surfacing an error.

use chrono::{NaiveDate, NaiveTime};
use heapless::Vec;

use crate::comm::LineReader;

/// Receiver UART baud rate
pub const GPS_BAUD: u32 = 9600;

/// NMEA caps sentences at 82 bytes; leave headroom for chatty receivers.
const MAX_SENTENCE_LEN: usize = 96;

/// Maximum comma-separated fields considered per sentence
const MAX_FIELDS: usize = 24;

/// Serial byte source for the GPS receiver.
pub trait GpsSource {
    /// Number of bytes buffered and ready to read (0 when the line is idle).
    fn available(&mut self) -> usize;

    /// Read up to `buf.len()` buffered bytes without blocking.
    /// Returns the number of bytes copied.
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

impl<T: GpsSource + ?Sized> GpsSource for &mut T {
    fn available(&mut self) -> usize {
        (**self).available()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }
}

/// Latest decoded position report
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionFix {
    /// Decimal degrees, north positive
    pub latitude: f64,
    /// Decimal degrees, east positive
    pub longitude: f64,
    /// Meters above mean sea level
    pub altitude_m: f64,
    /// Horizontal dilution of precision
    pub hdop: f64,
    /// Satellites used in the solution
    pub satellites: u8,
    /// UTC date (RMC only)
    pub date: Option<NaiveDate>,
    /// UTC time of the last sentence
    pub time: Option<NaiveTime>,
    /// Whether a valid location has ever been decoded
    pub valid: bool,
}

/// Incremental NMEA decoder holding the current fix.
pub struct PositionReader {
    line: LineReader<MAX_SENTENCE_LEN>,
    fix: PositionFix,
    updated: bool,
    decoded: u32,
    rejected: u32,
}

impl PositionReader {
    pub const fn new() -> Self {
        Self {
            line: LineReader::new(),
            fix: PositionFix {
                latitude: 0.0,
                longitude: 0.0,
                altitude_m: 0.0,
                hdop: 0.0,
                satellites: 0,
                date: None,
                time: None,
                valid: false,
            },
            updated: false,
            decoded: 0,
            rejected: 0,
        }
    }

    /// Feed raw receiver bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.feed_byte(byte);
        }
    }

    /// Feed a single receiver byte.
    pub fn feed_byte(&mut self, byte: u8) {
        // Copy the line out so the reader borrow ends before we mutate self
        let mut sentence = [0u8; MAX_SENTENCE_LEN];
        let len = match self.line.feed(byte) {
            Some(line) => {
                sentence[..line.len()].copy_from_slice(line);
                line.len()
            }
            None => return,
        };

        match core::str::from_utf8(&sentence[..len])
            .ok()
            .and_then(parse_sentence)
        {
            Some(update) => {
                self.decoded = self.decoded.wrapping_add(1);
                self.apply(update);
            }
            None => {
                self.rejected = self.rejected.wrapping_add(1);
                log::trace!("Discarded NMEA sentence ({} bytes)", len);
            }
        }
    }

    /// True when a new fix arrived and has not been consumed yet.
    pub fn has_fresh_fix(&self) -> bool {
        self.updated
    }

    /// Consume the fresh-fix flag, returning the fix if one was pending.
    pub fn take_fresh_fix(&mut self) -> Option<PositionFix> {
        if core::mem::replace(&mut self.updated, false) {
            Some(self.fix)
        } else {
            None
        }
    }

    /// Latest fix regardless of freshness.
    pub fn current_fix(&self) -> &PositionFix {
        &self.fix
    }

    /// Sentences that passed checksum and field validation
    pub fn sentences_decoded(&self) -> u32 {
        self.decoded
    }

    /// Sentences dropped as corrupt, unsupported, or malformed
    pub fn sentences_rejected(&self) -> u32 {
        self.rejected
    }

    fn apply(&mut self, update: SentenceUpdate) {
        if let Some(time) = update.time {
            self.fix.time = Some(time);
        }
        if let Some(date) = update.date {
            self.fix.date = Some(date);
        }
        if let Some(sats) = update.satellites {
            self.fix.satellites = sats;
        }
        if let Some(hdop) = update.hdop {
            self.fix.hdop = hdop;
        }
        if let Some(alt) = update.altitude_m {
            self.fix.altitude_m = alt;
        }
        if let Some((lat, lon)) = update.location {
            self.fix.latitude = lat;
            self.fix.longitude = lon;
            self.fix.valid = true;
            self.updated = true;
        }
    }
}

impl Default for PositionReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Fields extracted from one sentence; `None` leaves the fix untouched.
#[derive(Debug, Default, PartialEq)]
struct SentenceUpdate {
    time: Option<NaiveTime>,
    date: Option<NaiveDate>,
    location: Option<(f64, f64)>,
    satellites: Option<u8>,
    hdop: Option<f64>,
    altitude_m: Option<f64>,
}

/// Validate framing and checksum, then dispatch on sentence type.
fn parse_sentence(line: &str) -> Option<SentenceUpdate> {
    // NMEA is 7-bit ASCII; anything else is line noise and would break
    // the fixed-offset field slicing below
    if !line.is_ascii() {
        return None;
    }
    let body = line.strip_prefix('$')?;
    let (payload, checksum) = body.split_once('*')?;
    let expected = u8::from_str_radix(checksum.get(..2)?, 16).ok()?;
    let actual = payload.bytes().fold(0u8, |acc, b| acc ^ b);
    if actual != expected {
        return None;
    }

    let mut fields: Vec<&str, MAX_FIELDS> = Vec::new();
    for field in payload.split(',') {
        fields.push(field).ok()?;
    }

    // Talker ID (GP, GN, GL, GA, BD...) followed by a 3-letter type
    let address = fields.first()?;
    if address.len() != 5 {
        return None;
    }
    match &address[2..] {
        "GGA" => parse_gga(&fields),
        "RMC" => parse_rmc(&fields),
        _ => None,
    }
}

/// `$--GGA,time,lat,N,lon,E,quality,sats,hdop,alt,M,geoid,M,age,station`
fn parse_gga(fields: &[&str]) -> Option<SentenceUpdate> {
    let quality: u8 = fields.get(6)?.parse().ok()?;
    let location = if quality > 0 {
        Some(parse_location(fields.get(2..6)?)?)
    } else {
        None
    };
    Some(SentenceUpdate {
        time: optional(fields.get(1)?, parse_time)?,
        date: None,
        location,
        satellites: optional(fields.get(7)?, |s| s.parse().ok())?,
        hdop: optional(fields.get(8)?, |s| s.parse().ok())?,
        altitude_m: optional(fields.get(9)?, |s| s.parse().ok())?,
    })
}

/// `$--RMC,time,status,lat,N,lon,E,speed,course,date,magvar,E`
fn parse_rmc(fields: &[&str]) -> Option<SentenceUpdate> {
    let location = match *fields.get(2)? {
        "A" => Some(parse_location(fields.get(3..7)?)?),
        "V" => None,
        _ => return None,
    };
    Some(SentenceUpdate {
        time: optional(fields.get(1)?, parse_time)?,
        date: optional(fields.get(9)?, parse_date)?,
        location,
        ..SentenceUpdate::default()
    })
}

/// Empty fields are absent data; present fields must parse.
fn optional<T>(field: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<Option<T>> {
    if field.is_empty() {
        Some(None)
    } else {
        parse(field).map(Some)
    }
}

/// `[ddmm.mmmm, N|S, dddmm.mmmm, E|W]` → signed decimal degrees
fn parse_location(fields: &[&str]) -> Option<(f64, f64)> {
    let lat = parse_coordinate(fields[0], fields[1], 'N', 'S', 90.0)?;
    let lon = parse_coordinate(fields[2], fields[3], 'E', 'W', 180.0)?;
    Some((lat, lon))
}

fn parse_coordinate(value: &str, hemisphere: &str, pos: char, neg: char, limit: f64) -> Option<f64> {
    let raw: f64 = value.parse().ok()?;
    if raw < 0.0 {
        return None;
    }
    let degrees = (raw / 100.0) as u32 as f64;
    let minutes = raw - degrees * 100.0;
    if minutes >= 60.0 {
        return None;
    }
    let decimal = degrees + minutes / 60.0;
    if decimal > limit {
        return None;
    }
    let mut chars = hemisphere.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c == pos => Some(decimal),
        (Some(c), None) if c == neg => Some(-decimal),
        _ => None,
    }
}

/// `hhmmss[.sss]`
fn parse_time(field: &str) -> Option<NaiveTime> {
    let (hms, fraction) = match field.split_once('.') {
        Some((hms, fraction)) => (hms, fraction),
        None => (field, ""),
    };
    if hms.len() != 6 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis = fraction
        .bytes()
        .chain(core::iter::repeat(b'0'))
        .take(3)
        .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'));
    NaiveTime::from_hms_milli_opt(
        two_digits(&hms[0..2])?,
        two_digits(&hms[2..4])?,
        two_digits(&hms[4..6])?,
        millis,
    )
}

/// `ddmmyy`, years 2000-2099
fn parse_date(field: &str) -> Option<NaiveDate> {
    if field.len() != 6 {
        return None;
    }
    let day = two_digits(&field[0..2])?;
    let month = two_digits(&field[2..4])?;
    let year = two_digits(&field[4..6])?;
    NaiveDate::from_ymd_opt(2000 + year as i32, month, day)
}

fn two_digits(s: &str) -> Option<u32> {
    let bytes = s.as_bytes();
    if bytes.len() == 2 && bytes.iter().all(u8::is_ascii_digit) {
        Some(u32::from(bytes[0] - b'0') * 10 + u32::from(bytes[1] - b'0'))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    /// Wrap a sentence body with `$` and a correct checksum.
    fn sentence(body: &str) -> String {
        let checksum = body.bytes().fold(0u8, |acc, b| acc ^ b);
        format!("${body}*{checksum:02X}\r\n")
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";

    #[test]
    fn gga_updates_position_altitude_hdop_satellites() {
        let mut reader = PositionReader::new();
        reader.feed(GGA.as_bytes());

        let fix = reader.current_fix();
        assert!(fix.valid);
        assert!(close(fix.latitude, 48.1173));
        assert!(close(fix.longitude, 11.0 + 31.0 / 60.0));
        assert!(close(fix.altitude_m, 545.4));
        assert!(close(fix.hdop, 0.9));
        assert_eq!(fix.satellites, 8);
        assert_eq!(fix.time, NaiveTime::from_hms_opt(12, 35, 19));
        assert!(fix.date.is_none());
        assert!(reader.has_fresh_fix());
    }

    #[test]
    fn rmc_supplies_date() {
        let mut reader = PositionReader::new();
        reader.feed(RMC.as_bytes());

        let fix = reader.current_fix();
        assert_eq!(fix.date, NaiveDate::from_ymd_opt(2094, 3, 23));
        assert!(reader.has_fresh_fix());
        let date = fix.date.unwrap();
        let time = fix.time.unwrap();
        assert_eq!((date.month(), date.day(), time.hour()), (3, 23, 12));
    }

    #[test]
    fn fresh_flag_is_edge_triggered() {
        let mut reader = PositionReader::new();
        reader.feed(GGA.as_bytes());

        assert!(reader.has_fresh_fix());
        assert!(reader.take_fresh_fix().is_some());
        assert!(!reader.has_fresh_fix());
        assert!(reader.take_fresh_fix().is_none());

        // Current fix survives consumption
        assert!(reader.current_fix().valid);

        reader.feed(GGA.as_bytes());
        assert!(reader.has_fresh_fix());
    }

    #[test]
    fn partial_sentence_waits_for_terminator() {
        let mut reader = PositionReader::new();
        let (head, tail) = GGA.as_bytes().split_at(30);
        reader.feed(head);
        assert!(!reader.has_fresh_fix());
        assert_eq!(reader.sentences_decoded(), 0);
        reader.feed(tail);
        assert!(reader.has_fresh_fix());
    }

    #[test]
    fn byte_at_a_time_matches_bulk_feed() {
        let mut reader = PositionReader::new();
        for &b in RMC.as_bytes() {
            reader.feed_byte(b);
        }
        assert!(reader.has_fresh_fix());
        assert_eq!(reader.sentences_decoded(), 1);
    }

    #[test]
    fn bad_checksum_is_discarded() {
        let mut reader = PositionReader::new();
        reader.feed(b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48\r\n");
        assert!(!reader.has_fresh_fix());
        assert!(!reader.current_fix().valid);
        assert_eq!(reader.sentences_rejected(), 1);
    }

    #[test]
    fn missing_checksum_is_discarded() {
        let mut reader = PositionReader::new();
        reader.feed(b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,\r\n");
        assert!(!reader.has_fresh_fix());
        assert_eq!(reader.sentences_rejected(), 1);
    }

    #[test]
    fn garbage_between_sentences_does_not_break_decoding() {
        let mut reader = PositionReader::new();
        reader.feed(b"\x00\xff noise\r\n$GPG");
        reader.feed(b"\r\n");
        reader.feed(GGA.as_bytes());
        assert!(reader.has_fresh_fix());
        assert_eq!(reader.sentences_decoded(), 1);
    }

    #[test]
    fn gga_without_fix_updates_time_but_not_location() {
        let mut reader = PositionReader::new();
        reader.feed(sentence("GPGGA,080000,,,,,0,03,,,,,,,").as_bytes());

        assert!(!reader.has_fresh_fix());
        let fix = reader.current_fix();
        assert!(!fix.valid);
        assert_eq!(fix.satellites, 3);
        assert_eq!(fix.time, NaiveTime::from_hms_opt(8, 0, 0));
    }

    #[test]
    fn rmc_void_status_is_not_a_fix() {
        let mut reader = PositionReader::new();
        reader.feed(sentence("GNRMC,101010.00,V,,,,,,,010624,,,N").as_bytes());

        assert!(!reader.has_fresh_fix());
        assert_eq!(reader.current_fix().date, NaiveDate::from_ymd_opt(2024, 6, 1));
    }

    #[test]
    fn southern_and_western_hemispheres_are_negative() {
        let mut reader = PositionReader::new();
        reader.feed(sentence("GNGGA,000001,3351.000,S,15112.000,W,1,10,1.0,12.0,M,,M,,").as_bytes());

        let fix = reader.current_fix();
        assert!(close(fix.latitude, -(33.0 + 51.0 / 60.0)));
        assert!(close(fix.longitude, -(151.0 + 12.0 / 60.0)));
    }

    #[test]
    fn fractional_seconds_are_kept_as_millis() {
        let mut reader = PositionReader::new();
        reader.feed(sentence("GPGGA,120000.25,1000.000,N,02000.000,E,1,05,1.1,5.2,M,,M,,").as_bytes());
        let time = reader.current_fix().time.unwrap();
        assert_eq!(time.nanosecond(), 250_000_000);
    }

    #[test]
    fn malformed_field_rejects_whole_sentence() {
        let mut reader = PositionReader::new();
        reader.feed(sentence("GPGGA,123519,48x7.038,N,01131.000,E,1,08,0.9,545.4,M,,M,,").as_bytes());
        assert!(!reader.has_fresh_fix());
        assert_eq!(reader.current_fix().satellites, 0);
    }

    #[test]
    fn out_of_range_coordinates_rejected() {
        let mut reader = PositionReader::new();
        reader.feed(sentence("GPGGA,123519,9100.000,N,01131.000,E,1,08,0.9,1.0,M,,M,,").as_bytes());
        reader.feed(sentence("GPGGA,123519,4875.000,N,01131.000,E,1,08,0.9,1.0,M,,M,,").as_bytes());
        assert!(!reader.has_fresh_fix());
        assert_eq!(reader.sentences_rejected(), 2);
    }

    #[test]
    fn unsupported_sentences_are_ignored() {
        let mut reader = PositionReader::new();
        reader.feed(sentence("GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00").as_bytes());
        reader.feed(sentence("PUBX,00,081350.00,4717.113210,N").as_bytes());
        assert!(!reader.has_fresh_fix());
        assert_eq!(reader.sentences_decoded(), 0);
    }

    #[test]
    fn later_sentences_keep_earlier_fields() {
        let mut reader = PositionReader::new();
        reader.feed(RMC.as_bytes());
        reader.take_fresh_fix();
        reader.feed(GGA.as_bytes());

        let fix = reader.current_fix();
        assert!(fix.date.is_some(), "date from RMC must survive a GGA");
        assert_eq!(fix.satellites, 8);
    }

    #[test]
    fn non_ascii_address_is_rejected() {
        let mut reader = PositionReader::new();
        reader.feed(sentence("€GG,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,").as_bytes());
        assert!(!reader.has_fresh_fix());
        assert_eq!(reader.sentences_rejected(), 1);
    }

    #[test]
    fn non_ascii_time_and_date_fields_are_rejected() {
        let mut reader = PositionReader::new();
        reader.feed(sentence("GPGGA,1€45,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,").as_bytes());
        reader.feed(sentence("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,2€094,003.1,W").as_bytes());
        assert!(!reader.has_fresh_fix());
        assert_eq!(reader.sentences_rejected(), 2);
        assert!(reader.current_fix().time.is_none());

        // Decoder keeps working afterwards
        reader.feed(GGA.as_bytes());
        assert!(reader.has_fresh_fix());
    }
}
