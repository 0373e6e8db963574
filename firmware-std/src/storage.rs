//! Survey storage media, mounted into the ESP-IDF VFS.
//!
//! The SD card (XIAO Sense expansion board) is mounted once at boot; the
//! SPIFFS partition is only registered when a session has to fall back to it.
//! Both are then plain directories for `wardhound::storage::DirStorage`.

use core::ffi::CStr;

use esp_idf_svc::sys::{esp, esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register, EspError};

use wardhound::export::{Medium, StorageMount};
use wardhound::storage::DirStorage;

pub const SDCARD_ROOT: &str = "/sdcard";
pub const FLASH_ROOT: &str = "/spiffs";
const FLASH_ROOT_C: &CStr = c"/spiffs";
const MAX_OPEN_FILES: usize = 4;

#[cfg(feature = "xiao")]
pub fn mount_sdcard<'d>(
    spi: impl esp_idf_svc::hal::peripheral::Peripheral<P = impl esp_idf_svc::hal::spi::SpiAnyPins> + 'd,
    sck: impl esp_idf_svc::hal::peripheral::Peripheral<P = impl esp_idf_svc::hal::gpio::OutputPin> + 'd,
    mosi: impl esp_idf_svc::hal::peripheral::Peripheral<P = impl esp_idf_svc::hal::gpio::OutputPin> + 'd,
    miso: impl esp_idf_svc::hal::peripheral::Peripheral<P = impl esp_idf_svc::hal::gpio::InputPin> + 'd,
    cs: impl esp_idf_svc::hal::peripheral::Peripheral<P = impl esp_idf_svc::hal::gpio::OutputPin> + 'd,
) -> anyhow::Result<impl Sized + 'd> {
    use esp_idf_svc::fs::fatfs::Fatfs;
    use esp_idf_svc::hal::gpio::AnyIOPin;
    use esp_idf_svc::hal::sd::spi::SdSpiHostDriver;
    use esp_idf_svc::hal::sd::{SdCardConfiguration, SdCardDriver};
    use esp_idf_svc::hal::spi::{config::DriverConfig, Dma, SpiDriver};
    use esp_idf_svc::io::vfs::MountedFatfs;

    let spi = SpiDriver::new(
        spi,
        sck,
        mosi,
        Some(miso),
        &DriverConfig::default().dma(Dma::Auto(4096)),
    )?;
    let host = SdSpiHostDriver::new(
        spi,
        Some(cs),
        AnyIOPin::none(),
        AnyIOPin::none(),
        AnyIOPin::none(),
        None,
    )?;
    let card = SdCardDriver::new_spi(host, &SdCardConfiguration::new())?;
    let fatfs = Fatfs::new_sdcard(0, card)?;
    let mounted = MountedFatfs::mount(fatfs, SDCARD_ROOT, MAX_OPEN_FILES)?;
    log::info!("SD card mounted at {}", SDCARD_ROOT);
    Ok(mounted)
}

fn mount_spiffs() -> Result<(), EspError> {
    let conf = esp_vfs_spiffs_conf_t {
        base_path: FLASH_ROOT_C.as_ptr(),
        partition_label: core::ptr::null(),
        max_files: MAX_OPEN_FILES,
        format_if_mount_failed: true,
    };
    esp!(unsafe { esp_vfs_spiffs_register(&conf) })?;
    log::info!("SPIFFS mounted at {}", FLASH_ROOT);
    Ok(())
}

/// Mount table for the board. `T` keeps the SD card mount alive.
pub struct BoardMount<T> {
    sdcard: Option<T>,
    flash_mounted: bool,
}

impl<T> BoardMount<T> {
    pub fn new(sdcard: Option<T>) -> Self {
        Self {
            sdcard,
            flash_mounted: false,
        }
    }
}

impl<T> StorageMount for BoardMount<T> {
    type Storage = DirStorage;

    fn mount(&mut self, medium: Medium) -> Option<DirStorage> {
        match medium {
            Medium::Removable => self
                .sdcard
                .as_ref()
                .map(|_| DirStorage::new(SDCARD_ROOT, medium)),
            Medium::Internal => {
                if !self.flash_mounted {
                    if let Err(e) = mount_spiffs() {
                        log::warn!("SPIFFS mount failed: {:?}", e);
                        return None;
                    }
                    self.flash_mounted = true;
                }
                Some(DirStorage::new(FLASH_ROOT, medium))
            }
        }
    }
}
