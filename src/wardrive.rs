/// Wardriving session controller.
///
/// One session is a single cooperative loop:
///
/// ```text
/// Init ─► Warmup ─► WaitFix ⇄ ScanAndLog
///  │                  │
///  ▼                  ├─► Cancelled
/// StorageUnavailable  └─► GpsNotFound
/// ```
///
/// `WaitFix` polls the cancel input, drains the GPS UART and waits for a
/// fresh fix. A fresh fix triggers one blocking WiFi scan; every access point
/// not yet in the session's registry gets one survey row. All waiting is
/// blocking delay. Cancellation is only noticed at the top of `WaitFix`,
/// and the warm-up cannot be interrupted.

use core::fmt;

use embedded_hal::delay::DelayNs;

use crate::export::{select_storage, FirstSeen, Medium, StorageMount, SurveyLogWriter, SurveyStorage};
use crate::gps::{GpsSource, PositionFix, PositionReader};
use crate::scanner::{NetworkObservation, NetworkScanner};
use crate::tracker::DedupRegistry;

/// Session timing and file configuration.
#[derive(Clone, Copy, Debug)]
pub struct WardriveConfig {
    /// Uninterruptible wait for the receiver to acquire satellites
    pub warmup_ms: u32,
    /// Sleep between `WaitFix` iterations
    pub poll_interval_ms: u32,
    /// Consecutive empty GPS polls tolerated; one more ends the session
    pub no_data_limit: u8,
    /// Status redraw cadence while logging (every Nth new network)
    pub redraw_every: u32,
    /// Pause on each redraw so the operator can read the list
    pub batch_pause_ms: u32,
    /// Pause after a cancel / GPS-not-found message before returning
    pub exit_pause_ms: u32,
    /// Survey file path on the selected medium
    pub log_path: &'static str,
}

impl WardriveConfig {
    pub const fn new() -> Self {
        Self {
            warmup_ms: 20_000,
            poll_interval_ms: 10_000,
            no_data_limit: 5,
            redraw_every: 3,
            batch_pause_ms: 500,
            exit_pause_ms: 2_000,
            log_path: "/wardriving_log.csv",
        }
    }
}

impl Default for WardriveConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Operator cancel input (button), polled once per `WaitFix` iteration.
pub trait CancelInput {
    fn cancel_requested(&mut self) -> bool;
}

impl<T: CancelInput + ?Sized> CancelInput for &mut T {
    fn cancel_requested(&mut self) -> bool {
        (**self).cancel_requested()
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Operator pressed cancel
    Cancelled,
    /// Receiver silent for too many consecutive polls
    GpsNotFound,
    /// Neither storage medium could be mounted
    StorageUnavailable,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Cancelled => "cancelled",
            SessionOutcome::GpsNotFound => "gps_not_found",
            SessionOutcome::StorageUnavailable => "storage_unavailable",
        }
    }

    /// Whether the surrounding menu should take over again.
    /// A session that could not mount storage is a fatal halt.
    pub fn resumes_menu(&self) -> bool {
        !matches!(self, SessionOutcome::StorageUnavailable)
    }
}

/// Per-session state, owned by the controller for the duration of `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Networks logged this session
    pub networks_found: u32,
    /// Consecutive `WaitFix` polls with no receiver bytes
    pub empty_polls: u8,
    pub cancelled: bool,
    /// Receiver warmed up and being polled
    pub gps_connected: bool,
    /// A fix arrived and scanning is active
    pub wifi_connected: bool,
}

/// Result handed back to the caller when a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub networks_found: u32,
    /// Medium the survey was written to, if one was mounted
    pub medium: Option<Medium>,
    pub state: SessionState,
}

/// One-way status notifications from the session.
#[derive(Debug, Clone, Copy)]
pub enum StatusEvent<'a> {
    Banner,
    Initializing,
    StorageSelected(Medium),
    StorageUnavailable,
    WarmingUp { secs: u32 },
    Connectivity { gps: bool, wifi: bool },
    GpsDataAvailable,
    FixUpdated(&'a PositionFix),
    /// Receiver talked but no new position; diagnostics for the operator
    FixNotUpdated(&'a PositionFix),
    NoGpsData { empty_polls: u8 },
    NoNetworks,
    LoggingBatch { networks_found: u32 },
    NetworkLogged {
        network: &'a NetworkObservation,
        fix: &'a PositionFix,
        networks_found: u32,
        /// Start of a new group on screen
        redraw: bool,
    },
    OpenFailed,
    WriteFailed,
    Cancelled,
    GpsNotFound,
    Summary {
        outcome: SessionOutcome,
        networks_found: u32,
        medium: Option<Medium>,
    },
}

impl StatusEvent<'_> {
    /// Stable machine-readable event name
    pub fn name(&self) -> &'static str {
        match self {
            StatusEvent::Banner => "banner",
            StatusEvent::Initializing => "initializing",
            StatusEvent::StorageSelected(_) => "storage_ready",
            StatusEvent::StorageUnavailable => "storage_unavailable",
            StatusEvent::WarmingUp { .. } => "warming_up",
            StatusEvent::Connectivity { .. } => "connectivity",
            StatusEvent::GpsDataAvailable => "gps_data",
            StatusEvent::FixUpdated(_) => "fix_updated",
            StatusEvent::FixNotUpdated(_) => "fix_not_updated",
            StatusEvent::NoGpsData { .. } => "no_gps_data",
            StatusEvent::NoNetworks => "no_networks",
            StatusEvent::LoggingBatch { .. } => "logging",
            StatusEvent::NetworkLogged { .. } => "network_logged",
            StatusEvent::OpenFailed => "open_failed",
            StatusEvent::WriteFailed => "write_failed",
            StatusEvent::Cancelled => "cancelled",
            StatusEvent::GpsNotFound => "gps_not_found",
            StatusEvent::Summary { .. } => "summary",
        }
    }
}

impl fmt::Display for StatusEvent<'_> {
    /// Operator-facing one-liner
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Banner => write!(f, "WARDRIVING v{}", crate::protocol::VERSION),
            StatusEvent::Initializing => f.write_str("Initializing..."),
            StatusEvent::StorageSelected(Medium::Removable) => f.write_str("SD card mounted"),
            StatusEvent::StorageSelected(Medium::Internal) => f.write_str("No SD card, using flash"),
            StatusEvent::StorageUnavailable => f.write_str("No storage available"),
            StatusEvent::WarmingUp { secs } => {
                write!(f, "Waiting for GPS data, please wait {} seconds", secs)
            }
            StatusEvent::Connectivity { gps, wifi } => write!(
                f,
                "GPS {} / WiFi {}",
                if *gps { "on" } else { "off" },
                if *wifi { "on" } else { "off" }
            ),
            StatusEvent::GpsDataAvailable => f.write_str("GPS data available"),
            StatusEvent::FixUpdated(_) => f.write_str("GPS location updated"),
            StatusEvent::FixNotUpdated(fix) => {
                let seen = FirstSeen::from_fix(fix);
                write!(
                    f,
                    "GPS location not updated | {} | Sats: {} | HDOP: {:.2}",
                    seen, fix.satellites, fix.hdop
                )
            }
            StatusEvent::NoGpsData { empty_polls } => {
                write!(f, "No GPS data available ({})", empty_polls)
            }
            StatusEvent::NoNetworks => f.write_str("No Wi-Fi networks found"),
            StatusEvent::LoggingBatch { networks_found } => {
                write!(f, "WARDRIVING: Wi-Fi networks found: {}", networks_found)
            }
            StatusEvent::NetworkLogged { network, fix, .. } => write!(
                f,
                "WIFI: {} |[{}] GPS: {:.4}, {:.4}",
                network.ssid,
                network.auth.as_str(),
                fix.latitude,
                fix.longitude
            ),
            StatusEvent::OpenFailed => f.write_str("Failed to open file for writing"),
            StatusEvent::WriteFailed => f.write_str("Failed to write survey row"),
            StatusEvent::Cancelled => f.write_str("User interrupted scanning"),
            StatusEvent::GpsNotFound => f.write_str("GPS not found!"),
            StatusEvent::Summary {
                outcome,
                networks_found,
                medium,
            } => {
                write!(f, "Session {}: {} networks logged", outcome.as_str(), networks_found)?;
                if let Some(medium) = medium {
                    write!(f, " to {}", medium)?;
                }
                Ok(())
            }
        }
    }
}

/// Receives status notifications. Nothing flows back into the session.
pub trait StatusSink {
    fn notify(&mut self, event: &StatusEvent<'_>);
}

impl<T: StatusSink + ?Sized> StatusSink for &mut T {
    fn notify(&mut self, event: &StatusEvent<'_>) {
        (**self).notify(event)
    }
}

/// Fan out to two sinks
impl<A: StatusSink, B: StatusSink> StatusSink for (A, B) {
    fn notify(&mut self, event: &StatusEvent<'_>) {
        self.0.notify(event);
        self.1.notify(event);
    }
}

/// Status sink that writes each event through the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn notify(&mut self, event: &StatusEvent<'_>) {
        match event {
            StatusEvent::StorageUnavailable
            | StatusEvent::OpenFailed
            | StatusEvent::WriteFailed
            | StatusEvent::GpsNotFound => log::error!("{}", event),
            StatusEvent::NoGpsData { .. } | StatusEvent::NoNetworks => log::warn!("{}", event),
            StatusEvent::FixNotUpdated(_) | StatusEvent::Connectivity { .. } => {
                log::debug!("{}", event)
            }
            _ => log::info!("{}", event),
        }
    }
}

/// Controller phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Warmup,
    WaitFix,
    ScanAndLog,
    Done(SessionOutcome),
}

/// Everything that lives exactly as long as one `run`.
struct Session<St> {
    state: SessionState,
    registry: DedupRegistry,
    reader: PositionReader,
    fix: PositionFix,
    storage: Option<St>,
}

/// Drives wardriving sessions over the GPS, radio, cancel input and delay.
pub struct WardrivingController<G, W, C, D> {
    config: WardriveConfig,
    gps: G,
    scanner: W,
    cancel: C,
    delay: D,
}

impl<G, W, C, D> WardrivingController<G, W, C, D>
where
    G: GpsSource,
    W: NetworkScanner,
    C: CancelInput,
    D: DelayNs,
{
    pub fn new(config: WardriveConfig, gps: G, scanner: W, cancel: C, delay: D) -> Self {
        Self {
            config,
            gps,
            scanner,
            cancel,
            delay,
        }
    }

    /// The cancel input, e.g. to wait for a restart press between sessions.
    pub fn cancel_input_mut(&mut self) -> &mut C {
        &mut self.cancel
    }

    /// Run one session to a terminal state.
    ///
    /// Each call starts from a clean registry and counters; survey files
    /// left by earlier sessions are appended to.
    pub fn run<M, S>(&mut self, mount: &mut M, status: &mut S) -> SessionReport
    where
        M: StorageMount + ?Sized,
        S: StatusSink + ?Sized,
    {
        let mut session = Session {
            state: SessionState::default(),
            registry: DedupRegistry::new(),
            reader: PositionReader::new(),
            fix: PositionFix::default(),
            storage: None,
        };

        let mut phase = Phase::Init;
        loop {
            log::trace!("Phase {:?}", phase);
            phase = match phase {
                Phase::Init => self.init(mount, &mut session, status),
                Phase::Warmup => self.warm_up(&mut session, status),
                Phase::WaitFix => self.wait_fix(&mut session, status),
                Phase::ScanAndLog => self.scan_and_log(&mut session, status),
                Phase::Done(outcome) => return self.finish(outcome, session, status),
            };
        }
    }

    fn init<M, S>(&mut self, mount: &mut M, session: &mut Session<M::Storage>, status: &mut S) -> Phase
    where
        M: StorageMount + ?Sized,
        S: StatusSink + ?Sized,
    {
        status.notify(&StatusEvent::Banner);
        status.notify(&StatusEvent::Initializing);

        match select_storage(mount) {
            Some(storage) => {
                status.notify(&StatusEvent::StorageSelected(storage.medium()));
                session.storage = Some(storage);
                Phase::Warmup
            }
            None => {
                log::error!("No storage medium could be mounted");
                status.notify(&StatusEvent::StorageUnavailable);
                Phase::Done(SessionOutcome::StorageUnavailable)
            }
        }
    }

    fn warm_up<St, S>(&mut self, session: &mut Session<St>, status: &mut S) -> Phase
    where
        S: StatusSink + ?Sized,
    {
        status.notify(&StatusEvent::WarmingUp {
            secs: self.config.warmup_ms / 1000,
        });
        self.sleep(self.config.warmup_ms);

        session.state.gps_connected = true;
        notify_connectivity(&session.state, status);
        log::info!("Warm-up complete, polling GPS");
        Phase::WaitFix
    }

    fn wait_fix<St, S>(&mut self, session: &mut Session<St>, status: &mut S) -> Phase
    where
        S: StatusSink + ?Sized,
    {
        if self.cancel.cancel_requested() {
            session.state.cancelled = true;
            status.notify(&StatusEvent::Cancelled);
            return Phase::Done(SessionOutcome::Cancelled);
        }

        if self.gps.available() > 0 {
            session.state.empty_polls = 0;
            status.notify(&StatusEvent::GpsDataAvailable);
            self.drain_gps(&mut session.reader);

            if let Some(fix) = session.reader.take_fresh_fix() {
                session.fix = fix;
                status.notify(&StatusEvent::FixUpdated(&session.fix));
                if !session.state.wifi_connected {
                    session.state.wifi_connected = true;
                    notify_connectivity(&session.state, status);
                }
                // Poll interval is taken after the scan
                return Phase::ScanAndLog;
            }
            status.notify(&StatusEvent::FixNotUpdated(session.reader.current_fix()));
        } else {
            session.state.empty_polls = session.state.empty_polls.saturating_add(1);
            if session.state.empty_polls > self.config.no_data_limit {
                log::error!(
                    "No GPS data for {} consecutive polls",
                    session.state.empty_polls
                );
                status.notify(&StatusEvent::GpsNotFound);
                return Phase::Done(SessionOutcome::GpsNotFound);
            }
            status.notify(&StatusEvent::NoGpsData {
                empty_polls: session.state.empty_polls,
            });
        }

        self.sleep(self.config.poll_interval_ms);
        Phase::WaitFix
    }

    fn scan_and_log<St, S>(&mut self, session: &mut Session<St>, status: &mut S) -> Phase
    where
        St: SurveyStorage,
        S: StatusSink + ?Sized,
    {
        let networks = self.scanner.scan();
        log::info!("Scan found {} networks", networks.len());

        if networks.is_empty() {
            status.notify(&StatusEvent::NoNetworks);
        } else {
            self.log_networks(&networks, session, status);
        }

        self.sleep(self.config.poll_interval_ms);
        Phase::WaitFix
    }

    /// Write one row per network not yet in the registry. The survey file is
    /// opened at the first new network and closed when the batch ends; a
    /// storage failure abandons the rest of the batch.
    fn log_networks<St, S>(
        &mut self,
        networks: &[NetworkObservation],
        session: &mut Session<St>,
        status: &mut S,
    ) where
        St: SurveyStorage,
        S: StatusSink + ?Sized,
    {
        let Some(storage) = session.storage.as_mut() else {
            return;
        };

        status.notify(&StatusEvent::LoggingBatch {
            networks_found: session.state.networks_found,
        });

        let first_seen = FirstSeen::from_fix(&session.fix);
        let redraw_every = self.config.redraw_every.max(1);
        let mut writer: Option<SurveyLogWriter<St::File>> = None;
        let mut new_in_batch = 0u32;

        for network in networks {
            if session.registry.contains(&network.bssid) {
                continue;
            }

            if writer.is_none() {
                match SurveyLogWriter::open(storage, self.config.log_path) {
                    Ok(opened) => writer = Some(opened),
                    Err(e) => {
                        log::warn!("{}", e);
                        status.notify(&StatusEvent::OpenFailed);
                        break;
                    }
                }
            }
            let Some(out) = writer.as_mut() else {
                break;
            };

            if let Err(e) = out.write_row(network, &session.fix, first_seen) {
                log::warn!("{}", e);
                status.notify(&StatusEvent::WriteFailed);
                break;
            }

            session.registry.insert(network.bssid);
            session.state.networks_found += 1;

            let redraw = new_in_batch % redraw_every == 0;
            if redraw {
                self.sleep(self.config.batch_pause_ms);
            }
            new_in_batch += 1;

            status.notify(&StatusEvent::NetworkLogged {
                network,
                fix: &session.fix,
                networks_found: session.state.networks_found,
                redraw,
            });
        }

        if let Some(out) = writer {
            if let Err(e) = out.close() {
                log::warn!("{}", e);
                status.notify(&StatusEvent::WriteFailed);
            }
        }
    }

    fn finish<St, S>(&mut self, outcome: SessionOutcome, session: Session<St>, status: &mut S) -> SessionReport
    where
        St: SurveyStorage,
        S: StatusSink + ?Sized,
    {
        if outcome.resumes_menu() {
            // Leave the last message on screen before handing back
            self.sleep(self.config.exit_pause_ms);
        }

        let mut state = session.state;
        state.gps_connected = false;
        state.wifi_connected = false;
        notify_connectivity(&state, status);

        let medium = session.storage.as_ref().map(|s| s.medium());
        status.notify(&StatusEvent::Summary {
            outcome,
            networks_found: state.networks_found,
            medium,
        });
        log::info!(
            "Session ended ({}), {} networks logged",
            outcome.as_str(),
            state.networks_found
        );

        SessionReport {
            outcome,
            networks_found: state.networks_found,
            medium,
            state,
        }
    }

    /// Pull everything the UART has buffered into the decoder.
    fn drain_gps(&mut self, reader: &mut PositionReader) {
        let mut buf = [0u8; 64];
        loop {
            let n = self.gps.read(&mut buf);
            if n == 0 {
                break;
            }
            reader.feed(&buf[..n]);
        }
    }

    fn sleep(&mut self, ms: u32) {
        if ms > 0 {
            self.delay.delay_ms(ms);
        }
    }
}

fn notify_connectivity<S: StatusSink + ?Sized>(state: &SessionState, status: &mut S) {
    status.notify(&StatusEvent::Connectivity {
        gps: state.gps_connected,
        wifi: state.wifi_connected,
    });
}
