//! Directory-backed survey storage over `std::fs`.
//!
//! On ESP-IDF the SD card and flash partitions are mounted into the VFS
//! (`/sdcard`, `/spiffs`) before a session starts; on a host any directory
//! works. Survey paths are absolute within the medium (`/wardriving_log.csv`)
//! and resolved under the mount root.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::export::{Medium, StorageMount, SurveyFile, SurveyStorage};

/// A mounted medium rooted at a directory.
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
    medium: Medium,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>, medium: Medium) -> Self {
        Self {
            root: root.into(),
            medium,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

/// Open survey file; every flush is synced to the medium.
#[derive(Debug)]
pub struct DirFile {
    file: File,
}

impl SurveyFile for DirFile {
    type Error = io::Error;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }

    fn close(mut self) -> io::Result<()> {
        self.flush()
    }
}

impl SurveyStorage for DirStorage {
    type Error = io::Error;
    type File = DirFile;

    fn medium(&self) -> Medium {
        self.medium
    }

    fn exists(&mut self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn create(&mut self, path: &str) -> io::Result<DirFile> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.resolve(path))?;
        Ok(DirFile { file })
    }

    fn append(&mut self, path: &str) -> io::Result<DirFile> {
        let file = OpenOptions::new().append(true).open(self.resolve(path))?;
        Ok(DirFile { file })
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        std::fs::remove_file(self.resolve(path))
    }
}

/// Mount table of media already attached to the filesystem.
///
/// A medium counts as mounted when its root directory exists.
#[derive(Debug, Clone, Default)]
pub struct DirMount {
    removable: Option<PathBuf>,
    internal: Option<PathBuf>,
}

impl DirMount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_removable(mut self, root: impl Into<PathBuf>) -> Self {
        self.removable = Some(root.into());
        self
    }

    pub fn with_internal(mut self, root: impl Into<PathBuf>) -> Self {
        self.internal = Some(root.into());
        self
    }
}

impl StorageMount for DirMount {
    type Storage = DirStorage;

    fn mount(&mut self, medium: Medium) -> Option<DirStorage> {
        let root = match medium {
            Medium::Removable => self.removable.as_ref(),
            Medium::Internal => self.internal.as_ref(),
        }?;
        if root.is_dir() {
            Some(DirStorage::new(root.clone(), medium))
        } else {
            log::debug!("Mount root {} missing", root.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{select_storage, FirstSeen, SurveyLogWriter, COLUMN_HEADER};
    use crate::gps::PositionFix;
    use crate::scanner::{AuthMode, NetworkObservation};
    use tempfile::TempDir;

    const PATH: &str = "/wardriving_log.csv";

    fn net(last: u8) -> NetworkObservation {
        NetworkObservation::new([0x10, 0x20, 0x30, 0x40, 0x50, last], "Lab", AuthMode::Wpa3Psk, 11, -60)
    }

    fn log_one(storage: &mut DirStorage, obs: &NetworkObservation) {
        let fix = PositionFix::default();
        let mut writer = SurveyLogWriter::open(storage, PATH).unwrap();
        writer.write_row(obs, &fix, FirstSeen::from_fix(&fix)).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn resolves_paths_under_root() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::new(dir.path(), Medium::Removable);
        assert_eq!(storage.resolve(PATH), dir.path().join("wardriving_log.csv"));
    }

    #[test]
    fn header_written_once_across_sessions() {
        let dir = TempDir::new().unwrap();

        // Two sessions, each with its own storage handle
        let mut first = DirStorage::new(dir.path(), Medium::Removable);
        log_one(&mut first, &net(1));
        let mut second = DirStorage::new(dir.path(), Medium::Removable);
        assert!(second.exists(PATH));
        log_one(&mut second, &net(2));

        let contents = std::fs::read_to_string(dir.path().join("wardriving_log.csv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("WigleWifi-1.4"));
        assert_eq!(lines[1], COLUMN_HEADER);
        assert!(lines[2].starts_with("10:20:30:40:50:01,Lab,[WPA3_PSK],"));
        assert!(lines[3].starts_with("10:20:30:40:50:02,"));
    }

    #[test]
    fn append_to_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let mut storage = DirStorage::new(dir.path(), Medium::Internal);
        assert!(storage.append(PATH).is_err());
    }

    #[test]
    fn remove_deletes_the_file() {
        let dir = TempDir::new().unwrap();
        let mut storage = DirStorage::new(dir.path(), Medium::Removable);
        log_one(&mut storage, &net(3));
        assert!(storage.exists(PATH));
        storage.remove(PATH).unwrap();
        assert!(!storage.exists(PATH));
        assert!(storage.remove(PATH).is_err());
    }

    #[test]
    fn mount_requires_existing_root() {
        let dir = TempDir::new().unwrap();
        let mut mount = DirMount::new()
            .with_removable(dir.path().join("sdcard"))
            .with_internal(dir.path());
        assert!(mount.mount(Medium::Removable).is_none());
        let storage = mount.mount(Medium::Internal).unwrap();
        assert_eq!(storage.root(), dir.path());
        assert_eq!(storage.medium(), Medium::Internal);
    }

    #[test]
    fn fallback_medium_gets_its_own_header() {
        let sd = TempDir::new().unwrap();
        let flash = TempDir::new().unwrap();
        // A survey already on the SD card must not suppress the flash header
        std::fs::write(sd.path().join("wardriving_log.csv"), "old\n").unwrap();

        let mut mount = DirMount::new()
            .with_removable(sd.path().join("not-mounted"))
            .with_internal(flash.path());
        let mut storage = select_storage(&mut mount).unwrap();
        assert_eq!(storage.medium(), Medium::Internal);
        log_one(&mut storage, &net(9));

        let contents = std::fs::read_to_string(flash.path().join("wardriving_log.csv")).unwrap();
        assert!(contents.starts_with("WigleWifi-1.4"));
        assert_eq!(
            std::fs::read_to_string(sd.path().join("wardriving_log.csv")).unwrap(),
            "old\n"
        );
    }
}
