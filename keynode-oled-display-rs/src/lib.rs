//! Async status display for the keynode keyboard module (SSD1306, 128×32).
//!
//! This crate provides [`OledDriver`], a wrapper around the [`ssd1306`]
//! crate in async buffered-graphics mode, and (behind the `task` feature)
//! `display_update_task`, a periodic loop that copies the shared
//! [`StateStore`](keynode::StateStore) and shows the key bitmap, the
//! pressed note, the volume and the last frame received over CAN.
//!
//! # Quick Start
//!
//! ```ignore
//! use keynode_oled_display_rs::{OledDriver, DisplayConfig, display_update_task};
//!
//! let oled = OledDriver::new(i2c, 0x3C);
//! spawner.spawn(unwrap!(oled_task(oled, store, &KNOB, DisplayConfig::default())));
//! ```
//!
//! # Crate Features
//!
//! - **`defmt`**: structured logging via [`defmt`].
//! - **`task`**: the `display_update_task` loop (pulls in `embassy-sync`
//!   and `embassy-time`).

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "task")]
pub mod display_task;
pub mod driver;
pub mod error;
pub mod layout;

// ── Re-exports for convenience ───────────────────────────────────────────

#[cfg(feature = "task")]
pub use display_task::display_update_task;
pub use driver::OledDriver;
pub use error::OledError;
pub use layout::{render_display, DisplayChanges, DisplayConfig, DisplayState};
