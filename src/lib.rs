//! WardHound library: portable wardriving engine.
//!
//! Fuses a GPS fix stream with periodic WiFi scans, deduplicates access
//! points seen during a session, and appends WiGLE CSV survey rows to
//! whichever storage medium is mounted. All of the session logic lives here
//! with no platform dependencies, testable on any host with `cargo test`.
//! Platform binaries (ESP-IDF firmware) are thin consumers that provide the
//! UART, radio, storage mounts, cancel button and status output.
//!
//! Module layers:
//! - `gps`, `scanner`, `tracker`, `export`, `wardrive`, `comm`, `protocol`,
//!   `board`: `no_std` with `alloc`.
//! - `storage`: `std::fs` directory backend, behind the `std` feature.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod board;
pub mod comm;
pub mod export;
pub mod gps;
pub mod protocol;
pub mod scanner;
#[cfg(any(test, feature = "std"))]
pub mod storage;
pub mod tracker;
pub mod wardrive;
