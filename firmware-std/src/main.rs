//! WardHound: ESP-IDF std firmware
//!
//! Single-threaded: the wardriving session blocks the main task, exactly
//! like the session loop it drives. Platform pieces are thin adapters:
//! WiFi scans via esp-idf-svc, the GPS receiver on a UART, the cancel
//! button on a GPIO, storage mounted into the VFS, status on the console
//! (and the screen on M5StickC).

#[cfg(feature = "m5stickc")]
mod display;
mod storage;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::{FreeRtos, NON_BLOCK};
use esp_idf_svc::hal::gpio::{AnyIOPin, Input, InputPin, OutputPin, Pin, PinDriver};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::uart::{self, Uart, UartDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AccessPointInfo, AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use wardhound::comm::NdjsonSink;
use wardhound::gps::{GpsSource, GPS_BAUD};
use wardhound::protocol::VERSION;
use wardhound::scanner::{AuthMode, NetworkObservation, NetworkScanner};
use wardhound::wardrive::{CancelInput, LogSink, StatusSink, WardriveConfig, WardrivingController};
use wardhound::{board, export::StorageMount};

// ── Radio ────────────────────────────────────────────────────────────

/// Station-mode radio doing blocking active scans.
struct WifiScanner<'d> {
    wifi: BlockingWifi<EspWifi<'d>>,
}

impl NetworkScanner for WifiScanner<'_> {
    fn scan(&mut self) -> Vec<NetworkObservation> {
        match self.wifi.scan() {
            Ok(aps) => aps.iter().map(observation).collect(),
            Err(e) => {
                log::warn!("WiFi scan failed: {:?}", e);
                Vec::new()
            }
        }
    }
}

fn observation(ap: &AccessPointInfo) -> NetworkObservation {
    NetworkObservation::new(
        ap.bssid,
        ap.ssid.as_str(),
        auth_mode(ap.auth_method),
        ap.channel,
        ap.signal_strength,
    )
}

fn auth_mode(method: Option<AuthMethod>) -> AuthMode {
    match method {
        Some(AuthMethod::None) => AuthMode::Open,
        Some(AuthMethod::WEP) => AuthMode::Wep,
        Some(AuthMethod::WPA) => AuthMode::WpaPsk,
        Some(AuthMethod::WPA2Personal) => AuthMode::Wpa2Psk,
        Some(AuthMethod::WPAWPA2Personal) => AuthMode::WpaWpa2Psk,
        Some(AuthMethod::WPA2Enterprise) => AuthMode::Wpa2Enterprise,
        Some(AuthMethod::WPA3Personal) => AuthMode::Wpa3Psk,
        Some(AuthMethod::WPA2WPA3Personal) => AuthMode::Wpa2Wpa3Psk,
        Some(AuthMethod::WAPIPersonal) => AuthMode::WapiPsk,
        _ => AuthMode::Unknown,
    }
}

// ── GPS receiver ─────────────────────────────────────────────────────

struct UartGps<'d> {
    uart: UartDriver<'d>,
}

impl<'d> UartGps<'d> {
    fn new(
        uart: impl Peripheral<P = impl Uart> + 'd,
        tx: impl Peripheral<P = impl OutputPin> + 'd,
        rx: impl Peripheral<P = impl InputPin> + 'd,
    ) -> anyhow::Result<Self> {
        let config = uart::config::Config::default().baudrate(Hertz(GPS_BAUD));
        let uart = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &config,
        )?;
        Ok(Self { uart })
    }
}

impl GpsSource for UartGps<'_> {
    fn available(&mut self) -> usize {
        self.uart.remaining_read().unwrap_or(0)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.uart.read(buf, NON_BLOCK).unwrap_or(0)
    }
}

// ── Cancel button ────────────────────────────────────────────────────

/// Active-low push button (both boards pull it up externally).
struct Button<'d, P: Pin> {
    pin: PinDriver<'d, P, Input>,
}

impl<'d, P: InputPin> Button<'d, P> {
    fn new(pin: impl Peripheral<P = P> + 'd) -> anyhow::Result<Self> {
        Ok(Self {
            pin: PinDriver::input(pin)?,
        })
    }

    fn pressed(&self) -> bool {
        self.pin.is_low()
    }
}

impl<P: InputPin> CancelInput for Button<'_, P> {
    fn cancel_requested(&mut self) -> bool {
        self.pressed()
    }
}

// ── Pin map ──────────────────────────────────────────────────────────

/// Hand back `pin` if it is the GPIO `wardhound::board` assigns to `role`.
///
/// Peripherals are typed per GPIO, so the firmware has to name them
/// literally; this keeps those names from drifting away from the board table.
fn board_pin<P: Pin>(pin: P, expected: u8, role: &str) -> anyhow::Result<P> {
    let actual = i32::from(pin.pin());
    if actual != i32::from(expected) {
        anyhow::bail!("{} wired to GPIO{}, board table says GPIO{}", role, actual, expected);
    }
    Ok(pin)
}

// ── Serial status ────────────────────────────────────────────────────

fn console_line(line: &[u8]) {
    if let Ok(s) = core::str::from_utf8(line) {
        log::info!("{}", s.trim_end());
    }
}

// ── Session loop ─────────────────────────────────────────────────────

type Controller<'d, P> = WardrivingController<UartGps<'d>, WifiScanner<'d>, Button<'d, P>, FreeRtos>;

/// Run sessions back to back. After a normal end the button starts the next
/// one; a session without storage halts the device.
fn session_loop<P, M, S>(controller: &mut Controller<'_, P>, mount: &mut M, status: &mut S) -> !
where
    P: InputPin,
    M: StorageMount + ?Sized,
    S: StatusSink + ?Sized,
{
    loop {
        let report = controller.run(mount, status);
        log::info!(
            "Session over: {} ({} networks)",
            report.outcome.as_str(),
            report.networks_found
        );

        if !report.outcome.resumes_menu() {
            log::error!("No usable storage, halting");
            loop {
                FreeRtos::delay_ms(1000);
            }
        }

        log::info!("Press the button to start a new session");
        let button = controller.cancel_input_mut();
        while button.pressed() {
            FreeRtos::delay_ms(50);
        }
        while !button.pressed() {
            FreeRtos::delay_ms(50);
        }
        while button.pressed() {
            FreeRtos::delay_ms(50);
        }
    }
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();

    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("WardHound v{} starting on {}", VERSION, board::BOARD_NAME);

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // Hold power on (M5StickC Plus2)
    #[cfg(feature = "m5stickc")]
    let _power_hold = {
        let mut p = PinDriver::output(board_pin(peripherals.pins.gpio4, board::POWER_HOLD_PIN, "power hold")?)?;
        p.set_high()?;
        p
    };

    // ── WiFi (station mode, not associated) ──────────────────────────

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
    wifi.start()?;
    log::info!("WiFi started in station mode for scanning");
    let scanner = WifiScanner { wifi };

    // ── GPS UART + cancel button ─────────────────────────────────────

    #[cfg(feature = "xiao")]
    let (gps, button) = (
        UartGps::new(
            peripherals.uart1,
            board_pin(peripherals.pins.gpio5, board::GPS_TX_PIN, "GPS TX")?,
            board_pin(peripherals.pins.gpio6, board::GPS_RX_PIN, "GPS RX")?,
        )?,
        Button::new(board_pin(peripherals.pins.gpio0, board::CANCEL_BUTTON_PIN, "cancel button")?)?,
    );
    #[cfg(feature = "m5stickc")]
    let (gps, button) = (
        UartGps::new(
            peripherals.uart1,
            board_pin(peripherals.pins.gpio32, board::GPS_TX_PIN, "GPS TX")?,
            board_pin(peripherals.pins.gpio33, board::GPS_RX_PIN, "GPS RX")?,
        )?,
        Button::new(board_pin(peripherals.pins.gpio37, board::CANCEL_BUTTON_PIN, "cancel button")?)?,
    );
    log::info!(
        "GPS on UART1 at {} baud (RX {}, TX {}), cancel on GPIO{}",
        GPS_BAUD,
        board::GPS_RX_PIN,
        board::GPS_TX_PIN,
        board::CANCEL_BUTTON_PIN
    );

    // ── Storage ──────────────────────────────────────────────────────

    #[cfg(feature = "xiao")]
    let sdcard = if board::HAS_SD_SLOT {
        log::info!(
            "SD card on SPI2 (SCK {}, MOSI {}, MISO {}, CS {})",
            board::SD_SCK_PIN,
            board::SD_MOSI_PIN,
            board::SD_MISO_PIN,
            board::SD_CS_PIN
        );
        storage::mount_sdcard(
            peripherals.spi2,
            board_pin(peripherals.pins.gpio7, board::SD_SCK_PIN, "SD SCK")?,
            board_pin(peripherals.pins.gpio9, board::SD_MOSI_PIN, "SD MOSI")?,
            board_pin(peripherals.pins.gpio8, board::SD_MISO_PIN, "SD MISO")?,
            board_pin(peripherals.pins.gpio21, board::SD_CS_PIN, "SD CS")?,
        )
        .map_err(|e| log::warn!("SD card mount failed: {:?}", e))
        .ok()
    } else {
        None
    };
    #[cfg(not(feature = "xiao"))]
    let sdcard: Option<()> = {
        if !board::HAS_SD_SLOT {
            log::info!("No SD slot on {}, surveys go to internal flash", board::BOARD_NAME);
        }
        None
    };
    let mut mount = storage::BoardMount::new(sdcard);

    // ── Session ──────────────────────────────────────────────────────

    let mut controller = WardrivingController::new(WardriveConfig::new(), gps, scanner, button, FreeRtos);
    let mut serial = (LogSink, NdjsonSink::new(console_line));

    #[cfg(feature = "m5stickc")]
    return display::with_display(
        display::DisplayPins {
            spi: peripherals.spi2,
            mosi: board_pin(peripherals.pins.gpio15, board::DISPLAY_MOSI_PIN, "display MOSI")?,
            clk: board_pin(peripherals.pins.gpio13, board::DISPLAY_CLK_PIN, "display CLK")?,
            cs: board_pin(peripherals.pins.gpio5, board::DISPLAY_CS_PIN, "display CS")?,
            dc: board_pin(peripherals.pins.gpio14, board::DISPLAY_DC_PIN, "display DC")?,
            rst: board_pin(peripherals.pins.gpio12, board::DISPLAY_RST_PIN, "display RST")?,
            backlight: board_pin(peripherals.pins.gpio27, board::DISPLAY_BL_PIN, "display backlight")?,
        },
        |screen| session_loop(&mut controller, &mut mount, &mut (&mut serial, screen)),
    );

    #[cfg(not(feature = "m5stickc"))]
    session_loop(&mut controller, &mut mount, &mut serial)
}
