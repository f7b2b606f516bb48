//! Real-time core of a networked keyboard node.
//!
//! This crate holds everything that runs on the node between the pins and
//! the CAN bus driver: the shared state store, the quadrature knob decoder,
//! the key scanner with its edge detector, the note message codec, the
//! inbound message decoder and the phase-accumulator synthesis routine.
//!
//! # Architecture
//!
//! ```text
//!  KeyMatrix ──► KeyScanner ──► NoteSink (bus TX path) ──► CAN
//!                    │   └──► KnobDecoder ──► KnobRotation ─┐
//!                    ▼                                      ▼
//!               StateStore ──── StepCell (atomic) ──► Synthesizer ──► DAC
//!                    ▲
//!  CAN ──► FrameSource (bus RX path) ──► MessageDecoder
//! ```
//!
//! The [`StateStore`](state::StateStore) mutex is the only lock. The audio
//! routine never touches it: it reads the step size and the knob rotation
//! through atomic cells that the lock holders keep in sync.
//!
//! # `no_std` Compatibility
//!
//! No heap allocation anywhere. Tasks are plain `async fn`s generic over
//! the hardware traits so the firmware can wrap them in concrete Embassy
//! tasks.
//!
//! # Crate Features
//!
//! - **`defmt`**: structured logging and [`defmt::Format`] on public types.
//! - **`task`**: the periodic [`scan_keys_task`](scanner::scan_keys_task)
//!   loop and bounded-wait store writes (pulls in `embassy-time`).

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod decoder;
pub mod error;
pub mod knob;
pub mod message;
pub mod notes;
pub mod scanner;
pub mod state;
pub mod synth;

pub use config::{NodeConfig, OctavePolicy, Role};
pub use decoder::{decode_task, FrameSource, MessageDecoder};
pub use error::{ConfigError, MessageError, StoreError};
pub use knob::{Direction, KnobDecoder, KnobRotation};
pub use message::{NoteEvent, NoteMessage, RawFrame};
pub use scanner::{KeyMatrix, KeyScanner, NoteSink, ScanReport};
pub use state::{InputSnapshot, KeyPolarity, SharedState, StateStore, StepCell};
pub use synth::Synthesizer;

/// Number of playable keys on one module (one equal-tempered octave).
pub const NUM_KEYS: usize = 12;

/// Audio sample rate in Hz. The synthesis routine runs once per sample.
pub const SAMPLE_RATE_HZ: u32 = 22_000;

/// Period of the key scanning task in milliseconds.
pub const SCAN_PERIOD_MS: u64 = 20;

/// Loudest knob setting; also the largest attenuation shift.
pub const MAX_VOLUME: u8 = 8;
