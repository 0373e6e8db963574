/// WiGLE CSV survey export.
///
/// One survey file per storage medium. The two-line WiGLE header is written
/// only when the file is created; every later open appends. Rows are
/// formatted into a fixed buffer and flushed one at a time, so a crash
/// between scans never loses a row that was reported as written.
///
/// Storage is reached through three small capabilities, [`StorageMount`],
/// [`SurveyStorage`] and [`SurveyFile`], so the same writer runs against
/// an SD card, on-chip flash, a host directory, or an in-memory fake.

use core::fmt::{self, Write};

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use heapless::String;

use crate::board;
use crate::gps::PositionFix;
use crate::protocol::{MacString, VERSION};
use crate::scanner::{format_mac, NetworkObservation};

/// WiGLE CSV format revision written in the metadata line
pub const WIGLE_FORMAT: &str = "WigleWifi-1.4";

/// Column header line (second line of every survey file)
pub const COLUMN_HEADER: &str = "MAC,SSID,AuthMode,FirstSeen,Channel,RSSI,CurrentLatitude,CurrentLongitude,AltitudeMeters,AccuracyMeters,Type";

/// Application identity written as `device=` and `brand=`
pub const APP_NAME: &str = "wardhound";

/// Row buffer size. A 32-byte SSID that needs quoting expands to 66 bytes;
/// the rest of a row stays well under 160.
const ROW_CAPACITY: usize = 256;

/// Header block buffer size
const HEADER_CAPACITY: usize = 320;

/// Physical storage medium backing a survey file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Medium {
    /// Removable SD card (preferred)
    Removable,
    /// Built-in flash filesystem (fallback)
    Internal,
}

impl Medium {
    pub fn as_str(&self) -> &'static str {
        match self {
            Medium::Removable => "sd",
            Medium::Internal => "flash",
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open survey file handle.
pub trait SurveyFile {
    type Error: fmt::Debug;

    fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Push buffered bytes down to the medium.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Flush and release the handle.
    fn close(self) -> Result<(), Self::Error>;
}

/// A mounted storage medium holding survey files.
pub trait SurveyStorage {
    type Error: fmt::Debug;
    type File: SurveyFile<Error = Self::Error>;

    fn medium(&self) -> Medium;

    fn exists(&mut self, path: &str) -> bool;

    /// Open for writing, creating or truncating.
    fn create(&mut self, path: &str) -> Result<Self::File, Self::Error>;

    /// Open an existing file for appending.
    fn append(&mut self, path: &str) -> Result<Self::File, Self::Error>;

    fn remove(&mut self, path: &str) -> Result<(), Self::Error>;
}

/// Mounts storage media on demand.
pub trait StorageMount {
    type Storage: SurveyStorage;

    /// Try to mount `medium`; `None` when it is absent or fails to mount.
    fn mount(&mut self, medium: Medium) -> Option<Self::Storage>;
}

/// Pick the session's storage: removable media first, then built-in flash.
/// Called once per session; the choice is not revisited.
pub fn select_storage<M: StorageMount + ?Sized>(mount: &mut M) -> Option<M::Storage> {
    for medium in [Medium::Removable, Medium::Internal] {
        match mount.mount(medium) {
            Some(storage) => {
                log::info!("Survey storage: {}", medium);
                return Some(storage);
            }
            None => log::warn!("Storage medium '{}' unavailable", medium),
        }
    }
    None
}

/// Survey write failures
#[derive(Debug, thiserror::Error)]
pub enum SurveyError<E: fmt::Debug> {
    #[error("failed to open survey file: {0:?}")]
    Open(E),
    #[error("failed to write survey file: {0:?}")]
    Write(E),
    #[error("survey record exceeds {max} bytes")]
    RowTooLong { max: usize },
}

/// Date/time written into the FirstSeen column.
///
/// Fields the receiver has not reported yet render as zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirstSeen {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl FirstSeen {
    pub fn from_fix(fix: &PositionFix) -> Self {
        Self {
            date: fix.date,
            time: fix.time,
        }
    }
}

impl fmt::Display for FirstSeen {
    /// `MM/DD/YY HH:MM:SS`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (month, day, year) = self
            .date
            .map(|d| (d.month(), d.day(), d.year().rem_euclid(100) as u32))
            .unwrap_or_default();
        let (hour, minute, second) = self
            .time
            .map(|t| (t.hour(), t.minute(), t.second()))
            .unwrap_or_default();
        write!(
            f,
            "{:02}/{:02}/{:02} {:02}:{:02}:{:02}",
            month, day, year, hour, minute, second
        )
    }
}

/// Write the metadata line and column header, each newline-terminated.
pub fn write_header(out: &mut impl Write) -> fmt::Result {
    let display = if board::HAS_DISPLAY { "SPI TFT" } else { "none" };
    writeln!(
        out,
        "{},appRelease={},model={},release={},device={},display={},board={},brand={}",
        WIGLE_FORMAT,
        VERSION,
        board::BOARD_NAME,
        VERSION,
        APP_NAME,
        display,
        board::BOARD_NAME,
        APP_NAME
    )?;
    writeln!(out, "{}", COLUMN_HEADER)
}

/// Write one newline-terminated survey row.
pub fn write_row(
    out: &mut impl Write,
    obs: &NetworkObservation,
    fix: &PositionFix,
    first_seen: FirstSeen,
) -> fmt::Result {
    let mut mac = MacString::new();
    format_mac(&obs.bssid, &mut mac);
    write!(out, "{},", mac)?;
    write_ssid(out, &obs.ssid)?;
    writeln!(
        out,
        ",[{}],{},{},{},{:.6},{:.6},{:.6},{:.6},WIFI",
        obs.auth.as_str(),
        first_seen,
        obs.channel,
        obs.rssi,
        fix.latitude,
        fix.longitude,
        fix.altitude_m,
        fix.hdop
    )
}

/// SSIDs are opaque bytes from the air. Quote the ones that would split the
/// record; pass everything else through untouched.
fn write_ssid(out: &mut impl Write, ssid: &str) -> fmt::Result {
    if !ssid.contains([',', '"', '\r', '\n']) {
        return out.write_str(ssid);
    }
    out.write_char('"')?;
    for ch in ssid.chars() {
        match ch {
            '"' => out.write_str("\"\"")?,
            '\r' | '\n' => out.write_char(' ')?,
            _ => out.write_char(ch)?,
        }
    }
    out.write_char('"')
}

/// Append-only writer for one logging batch.
///
/// Opened when a batch has its first new network, closed at the end of the
/// batch. Never kept across controller iterations.
pub struct SurveyLogWriter<F: SurveyFile> {
    file: F,
    created: bool,
    rows: u32,
}

impl<F: SurveyFile> SurveyLogWriter<F> {
    /// Open `path` on `storage`, writing the header block if the file is new.
    pub fn open<S>(storage: &mut S, path: &str) -> Result<Self, SurveyError<F::Error>>
    where
        S: SurveyStorage<File = F, Error = F::Error>,
    {
        let created = !storage.exists(path);
        let file = if created {
            let mut header: String<HEADER_CAPACITY> = String::new();
            write_header(&mut header).map_err(|_| SurveyError::RowTooLong {
                max: HEADER_CAPACITY,
            })?;
            let mut file = storage.create(path).map_err(SurveyError::Open)?;
            if let Err(e) = file.write_all(header.as_bytes()).and_then(|()| file.flush()) {
                // A file without its header would be appended to forever,
                // so take it away and let the next open start over.
                drop(file);
                if let Err(rm) = storage.remove(path) {
                    log::warn!("Could not remove headerless {}: {:?}", path, rm);
                }
                return Err(SurveyError::Write(e));
            }
            log::info!("Created survey file {} on {}", path, storage.medium());
            file
        } else {
            storage.append(path).map_err(SurveyError::Open)?
        };

        Ok(Self {
            file,
            created,
            rows: 0,
        })
    }

    /// Format, append and flush one row.
    pub fn write_row(
        &mut self,
        obs: &NetworkObservation,
        fix: &PositionFix,
        first_seen: FirstSeen,
    ) -> Result<(), SurveyError<F::Error>> {
        let mut row: String<ROW_CAPACITY> = String::new();
        write_row(&mut row, obs, fix, first_seen)
            .map_err(|_| SurveyError::RowTooLong { max: ROW_CAPACITY })?;
        self.file
            .write_all(row.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(SurveyError::Write)?;
        self.rows += 1;
        log::debug!("Logged {}", row.trim_end());
        Ok(())
    }

    /// Whether this open created the file (and wrote the header)
    pub fn created(&self) -> bool {
        self.created
    }

    /// Rows written through this handle
    pub fn rows_written(&self) -> u32 {
        self.rows
    }

    pub fn close(self) -> Result<(), SurveyError<F::Error>> {
        self.file.close().map_err(SurveyError::Write)
    }
}

/// In-memory storage for tests. Files live in a shared map so assertions
/// can inspect them after the storage has been moved into a session.
#[cfg(test)]
pub(crate) mod memfs {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    pub struct MemFs {
        pub files: BTreeMap<std::string::String, std::string::String>,
        /// exists/create/append/remove calls
        pub ops: usize,
        /// Fail the Nth write_all (0-based) across all handles
        pub fail_write_at: Option<usize>,
        pub writes: usize,
        pub fail_open: bool,
    }

    pub type Shared = Rc<RefCell<MemFs>>;

    #[derive(Debug, PartialEq)]
    pub struct MemError(pub &'static str);

    pub struct MemStorage {
        pub medium: Medium,
        pub fs: Shared,
    }

    impl MemStorage {
        pub fn new(medium: Medium) -> (Self, Shared) {
            let fs = Shared::default();
            (
                Self {
                    medium,
                    fs: fs.clone(),
                },
                fs,
            )
        }
    }

    pub struct MemFile {
        fs: Shared,
        path: std::string::String,
        pending: std::string::String,
    }

    impl SurveyFile for MemFile {
        type Error = MemError;

        fn write_all(&mut self, data: &[u8]) -> Result<(), MemError> {
            let mut fs = self.fs.borrow_mut();
            let n = fs.writes;
            fs.writes += 1;
            if fs.fail_write_at == Some(n) {
                return Err(MemError("write failed"));
            }
            self.pending
                .push_str(core::str::from_utf8(data).map_err(|_| MemError("utf8"))?);
            Ok(())
        }

        fn flush(&mut self) -> Result<(), MemError> {
            let mut fs = self.fs.borrow_mut();
            let file = fs.files.get_mut(&self.path).ok_or(MemError("vanished"))?;
            file.push_str(&self.pending);
            self.pending.clear();
            Ok(())
        }

        fn close(mut self) -> Result<(), MemError> {
            self.flush()
        }
    }

    impl SurveyStorage for MemStorage {
        type Error = MemError;
        type File = MemFile;

        fn medium(&self) -> Medium {
            self.medium
        }

        fn exists(&mut self, path: &str) -> bool {
            let mut fs = self.fs.borrow_mut();
            fs.ops += 1;
            fs.files.contains_key(path)
        }

        fn create(&mut self, path: &str) -> Result<MemFile, MemError> {
            let mut fs = self.fs.borrow_mut();
            fs.ops += 1;
            if fs.fail_open {
                return Err(MemError("open failed"));
            }
            fs.files.insert(path.into(), std::string::String::new());
            Ok(MemFile {
                fs: self.fs.clone(),
                path: path.into(),
                pending: std::string::String::new(),
            })
        }

        fn append(&mut self, path: &str) -> Result<MemFile, MemError> {
            let mut fs = self.fs.borrow_mut();
            fs.ops += 1;
            if fs.fail_open {
                return Err(MemError("open failed"));
            }
            if !fs.files.contains_key(path) {
                return Err(MemError("not found"));
            }
            Ok(MemFile {
                fs: self.fs.clone(),
                path: path.into(),
                pending: std::string::String::new(),
            })
        }

        fn remove(&mut self, path: &str) -> Result<(), MemError> {
            let mut fs = self.fs.borrow_mut();
            fs.ops += 1;
            fs.files.remove(path).map(|_| ()).ok_or(MemError("not found"))
        }
    }

    /// Mount table for tests: each medium either mounts (yielding storage
    /// over its own shared map) or does not.
    pub struct MemMount {
        pub removable: Option<Shared>,
        pub internal: Option<Shared>,
        pub attempts: std::vec::Vec<Medium>,
    }

    impl MemMount {
        pub fn new(removable: Option<Shared>, internal: Option<Shared>) -> Self {
            Self {
                removable,
                internal,
                attempts: std::vec::Vec::new(),
            }
        }
    }

    impl StorageMount for MemMount {
        type Storage = MemStorage;

        fn mount(&mut self, medium: Medium) -> Option<MemStorage> {
            self.attempts.push(medium);
            let fs = match medium {
                Medium::Removable => self.removable.clone(),
                Medium::Internal => self.internal.clone(),
            }?;
            Some(MemStorage { medium, fs })
        }
    }
}
