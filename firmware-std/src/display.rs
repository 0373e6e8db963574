//! Status screen for M5StickC Plus2 (ST7789V2, 135x240, SPI).
//!
//! ESP-IDF std version: esp-idf-svc SPI driver + mipidsi. The screen is a
//! [`StatusSink`] driven directly by the session, so it only redraws when
//! something happens. Each event replaces the body; the header band keeps
//! the GPS/WiFi indicators.

use core::fmt::{self, Write};
use std::time::Duration;

use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::Text;
use esp_idf_svc::hal::delay::Delay;
use esp_idf_svc::hal::gpio::*;
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::spi::config::Config as SpiConfig;
use esp_idf_svc::hal::spi::config::DriverConfig as SpiDriverConfig;
use esp_idf_svc::hal::spi::{SpiAnyPins, SpiDeviceDriver, SpiDriver};
use esp_idf_svc::hal::units::Hertz;
use mipidsi::interface::SpiInterface;
use mipidsi::models::ST7789;
use mipidsi::options::{ColorInversion, ColorOrder, Orientation, Rotation};
use mipidsi::Builder;

use wardhound::board;
use wardhound::protocol::VERSION;
use wardhound::wardrive::{StatusEvent, StatusSink};

// ── Display geometry ─────────────────────────────────────────────────

const W: i32 = board::DISPLAY_HEIGHT as i32; // landscape
const H: i32 = board::DISPLAY_WIDTH as i32;
const ROW_H: i32 = 14;
const LINE_W: usize = (W / 6) as usize;

// ── Color palette ────────────────────────────────────────────────────

const BG: Rgb565 = Rgb565::BLACK;
const HEADER_BG: Rgb565 = Rgb565::new(2, 4, 12);
const FG: Rgb565 = Rgb565::WHITE;
const ACCENT: Rgb565 = Rgb565::new(0, 50, 0);
const DIM: Rgb565 = Rgb565::new(12, 24, 12);
const WARN: Rgb565 = Rgb565::RED;

// ── Screen renderer ──────────────────────────────────────────────────

/// Line buffer that keeps what fits and drops the rest.
struct Line(heapless::String<LINE_W>);

impl Write for Line {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.0.push(ch).is_err() {
                break;
            }
        }
        Ok(())
    }
}

struct Screen<'a, D> {
    display: &'a mut D,
    y: i32,
    buf: Line,
}

impl<'a, D: DrawTarget<Color = Rgb565>> Screen<'a, D> {
    fn new(display: &'a mut D) -> Self {
        Self::at(display, 0)
    }

    fn at(display: &'a mut D, y: i32) -> Self {
        Self {
            display,
            y,
            buf: Line(heapless::String::new()),
        }
    }

    fn clear(&mut self) {
        let _ = self.display.clear(BG);
        self.y = 0;
    }

    /// Blank everything from the cursor down.
    fn clear_below(&mut self) {
        let _ = Rectangle::new(Point::new(0, self.y), Size::new(W as u32, (H - self.y).max(0) as u32))
            .into_styled(PrimitiveStyle::with_fill(BG))
            .draw(self.display);
    }

    fn skip(&mut self, pixels: i32) {
        self.y += pixels;
    }

    fn fill_band(&mut self, height: i32, color: Rgb565) {
        let _ = Rectangle::new(Point::new(0, self.y), Size::new(W as u32, height as u32))
            .into_styled(PrimitiveStyle::with_fill(color))
            .draw(self.display);
    }

    fn row(&mut self, color: Rgb565, args: fmt::Arguments<'_>) {
        self.buf.0.clear();
        let _ = self.buf.write_fmt(args);
        self.pad();
        self.emit(color, BG, 0);
        self.y += ROW_H;
    }

    fn centered(&mut self, color: Rgb565, args: fmt::Arguments<'_>) {
        self.buf.0.clear();
        let _ = self.buf.write_fmt(args);
        let x = (W - self.buf.0.len() as i32 * 6) / 2;
        self.emit(color, BG, x);
        self.y += ROW_H;
    }

    fn header(&mut self, gps: bool, wifi: bool) {
        self.fill_band(ROW_H, HEADER_BG);
        self.buf.0.clear();
        let _ = write!(self.buf, " WARDHOUND v{}", VERSION);
        self.emit(FG, HEADER_BG, 0);

        let mut x = W - 2;
        for (label, on) in [("WiFi", wifi), ("GPS", gps)] {
            x -= label.len() as i32 * 6;
            let _ = Text::new(
                label,
                Point::new(x, self.y + 10),
                Self::text_style(if on { Rgb565::GREEN } else { DIM }, HEADER_BG),
            )
            .draw(self.display);
            x -= 6;
        }
        self.y += ROW_H;
    }

    fn divider(&mut self) {
        let _ = Rectangle::new(Point::new(0, self.y), Size::new(W as u32, 1))
            .into_styled(PrimitiveStyle::with_fill(DIM))
            .draw(self.display);
        self.y += 3;
    }

    fn pad(&mut self) {
        while self.buf.0.len() < LINE_W {
            let _ = self.buf.0.push(' ');
        }
    }

    fn emit(&mut self, fg: Rgb565, bg: Rgb565, x: i32) {
        let _ = Text::new(&self.buf.0, Point::new(x, self.y + 10), Self::text_style(fg, bg))
            .draw(self.display);
    }

    fn text_style(fg: Rgb565, bg: Rgb565) -> MonoTextStyle<'static, Rgb565> {
        MonoTextStyleBuilder::new()
            .font(&FONT_6X10)
            .text_color(fg)
            .background_color(bg)
            .build()
    }
}

macro_rules! row {
    ($s:expr, $color:expr, $($arg:tt)*) => {
        $s.row($color, format_args!($($arg)*))
    };
}

macro_rules! centered {
    ($s:expr, $color:expr, $($arg:tt)*) => {
        $s.centered($color, format_args!($($arg)*))
    };
}

// ── Status sink ──────────────────────────────────────────────────────

/// Body starts below the header band
const BODY_Y: i32 = ROW_H + 2;

pub struct DisplaySink<D> {
    display: D,
    gps: bool,
    wifi: bool,
    /// Cursor for the running network list
    list_y: i32,
}

impl<D: DrawTarget<Color = Rgb565>> DisplaySink<D> {
    fn new(display: D) -> Self {
        Self {
            display,
            gps: false,
            wifi: false,
            list_y: BODY_Y,
        }
    }

    fn splash(&mut self) {
        let mut s = Screen::new(&mut self.display);
        s.clear();
        s.skip(42);
        centered!(s, FG, "WARDRIVING");
        centered!(s, ACCENT, "v{}", VERSION);
        s.skip(12);
        centered!(s, DIM, "{}", board::BOARD_NAME);
    }

    fn header(&mut self) {
        let (gps, wifi) = (self.gps, self.wifi);
        Screen::new(&mut self.display).header(gps, wifi);
    }

    /// Replace the body with a single message.
    fn message(&mut self, color: Rgb565, event: &StatusEvent<'_>) {
        let mut s = Screen::at(&mut self.display, BODY_Y);
        s.clear_below();
        s.skip(ROW_H);
        row!(s, color, " {}", event);
        self.list_y = BODY_Y;
    }
}

impl<D: DrawTarget<Color = Rgb565>> StatusSink for DisplaySink<D> {
    fn notify(&mut self, event: &StatusEvent<'_>) {
        match event {
            StatusEvent::Banner => self.splash(),
            StatusEvent::Connectivity { gps, wifi } => {
                self.gps = *gps;
                self.wifi = *wifi;
                self.header();
            }
            StatusEvent::GpsDataAvailable => {}
            StatusEvent::LoggingBatch { networks_found } => {
                let mut s = Screen::at(&mut self.display, BODY_Y);
                s.clear_below();
                row!(s, ACCENT, " Networks found: {}", networks_found);
                s.divider();
                self.list_y = s.y;
            }
            StatusEvent::NetworkLogged {
                network,
                fix,
                networks_found,
                redraw,
            } => {
                let mut s = Screen::at(&mut self.display, BODY_Y);
                row!(s, ACCENT, " Networks found: {}", networks_found);
                s.divider();
                if *redraw {
                    s.clear_below();
                    self.list_y = s.y;
                }
                s.y = self.list_y;
                row!(s, FG, " WIFI: {} |[{}]", network.ssid, network.auth.as_str());
                row!(s, DIM, " GPS: {:.4} , {:.4}", fix.latitude, fix.longitude);
                self.list_y = s.y;
            }
            StatusEvent::StorageUnavailable
            | StatusEvent::OpenFailed
            | StatusEvent::WriteFailed
            | StatusEvent::GpsNotFound => self.message(WARN, event),
            StatusEvent::FixNotUpdated(_) | StatusEvent::NoGpsData { .. } => self.message(DIM, event),
            _ => self.message(FG, event),
        }
    }
}

// ── Setup ────────────────────────────────────────────────────────────

pub struct DisplayPins<SPI, MOSI, CLK, CS, DC, RST, BL> {
    pub spi: SPI,
    pub mosi: MOSI,
    pub clk: CLK,
    pub cs: CS,
    pub dc: DC,
    pub rst: RST,
    pub backlight: BL,
}

/// Bring up the panel and hand a status sink for it to `run`.
pub fn with_display<SPI, MOSI, CLK, CS, DC, RST, BL>(
    pins: DisplayPins<SPI, MOSI, CLK, CS, DC, RST, BL>,
    run: impl FnOnce(&mut dyn StatusSink) -> !,
) -> anyhow::Result<()>
where
    SPI: Peripheral + 'static,
    SPI::P: SpiAnyPins,
    MOSI: Peripheral + 'static,
    MOSI::P: OutputPin,
    CLK: Peripheral + 'static,
    CLK::P: OutputPin,
    CS: Peripheral + 'static,
    CS::P: OutputPin,
    DC: Peripheral + 'static,
    DC::P: OutputPin,
    RST: Peripheral + 'static,
    RST::P: IOPin,
    BL: Peripheral + 'static,
    BL::P: OutputPin,
{
    // Manual hardware reset
    let mut rst = PinDriver::output(pins.rst)?;
    rst.set_low()?;
    std::thread::sleep(Duration::from_millis(20));
    rst.set_high()?;
    std::thread::sleep(Duration::from_millis(120));
    log::info!("Display RST toggled");

    // SPI bus
    let spi_driver = SpiDriver::new(
        pins.spi,
        pins.clk,
        pins.mosi,
        None::<AnyIOPin>,
        &SpiDriverConfig::new(),
    )?;
    let spi_config = SpiConfig::new()
        .baudrate(Hertz(board::DISPLAY_SPI_FREQ_MHZ * 1_000_000))
        .data_mode(embedded_hal::spi::MODE_0);
    let spi_device = SpiDeviceDriver::new(spi_driver, Some(pins.cs), &spi_config)?;

    // mipidsi SPI interface
    let dc = PinDriver::output(pins.dc)?;
    let mut buffer = [0u8; 512];
    let di = SpiInterface::new(spi_device, dc, &mut buffer);

    let mut delay = Delay::new_default();
    let display = Builder::new(ST7789, di)
        .display_size(board::DISPLAY_WIDTH, board::DISPLAY_HEIGHT)
        .display_offset(52, 40)
        .invert_colors(ColorInversion::Inverted)
        .color_order(ColorOrder::Bgr)
        .orientation(Orientation::new().rotate(Rotation::Deg90))
        .init(&mut delay)
        .map_err(|e| anyhow::anyhow!("display init failed: {:?}", e))?;
    log::info!("Display initialized ({}x{} landscape)", W, H);

    let mut backlight = PinDriver::output(pins.backlight)?;
    backlight.set_high()?;

    let mut sink = DisplaySink::new(display);
    run(&mut sink)
}
