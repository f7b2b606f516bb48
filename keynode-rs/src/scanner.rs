//! Key scanner and edge detector.
//!
//! Every scan period the scanner walks the key matrix row by row, samples
//! the knob lines on the reserved row, diffs the fresh snapshot against the
//! previous one and turns every changed key into exactly one
//! [`NoteMessage`].
//!
//! ```text
//!            col 0   col 1   col 2   col 3
//! row 0  :   C       C#      D       D#       bits  0..4
//! row 1  :   E       F       F#      G        bits  4..8
//! row 2  :   G#      A       A#      B        bits  8..12
//! row 3  :   knob A  knob B  -       -        bits 12..16
//! ```

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::config::NodeConfig;
use crate::error::ConfigError;
use crate::knob::KnobDecoder;
use crate::message::{NoteEvent, NoteMessage};
use crate::notes::step_size_for;
use crate::state::{InputSnapshot, StateStore};
use crate::NUM_KEYS;

/// Number of matrix rows carrying keys.
pub const KEY_ROWS: u8 = 3;

/// Number of column inputs per row.
pub const COLUMNS: u8 = 4;

/// Row whose columns carry the knob phase lines.
pub const KNOB_ROW: u8 = 3;

/// Column of the knob's A line on [`KNOB_ROW`].
pub const KNOB_A_COLUMN: u8 = 0;

/// Column of the knob's B line on [`KNOB_ROW`].
pub const KNOB_B_COLUMN: u8 = 1;

/// Row-select / column-sense access to the key matrix.
///
/// Implementations own the settle delay between selecting a row and the
/// columns being valid.
pub trait KeyMatrix {
    /// Drive the row select lines to `row` and wait for the columns to
    /// settle.
    fn select_row(&mut self, row: u8);

    /// Sampled column levels of the selected row, bit *n* = column *n*.
    fn read_columns(&mut self) -> u8;
}

/// Destination for outgoing note messages (the bus transmit path).
#[allow(async_fn_in_trait)]
pub trait NoteSink {
    /// Queue a message, waiting for space if the queue is full.
    async fn submit(&self, message: NoteMessage);
}

/// Result of one pass over the matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Fresh snapshot, keys and knob row included.
    pub snapshot: InputSnapshot,
    /// Last pressed key in scan order, if any.
    pub pressed_key: Option<u8>,
    /// Step size for `pressed_key` (0 if none).
    pub step_size: u32,
    /// One message per key whose pressed state changed, in key order.
    pub messages: Vec<NoteMessage, NUM_KEYS>,
}

/// Compute the note messages for the key-bit difference between two
/// snapshots.
///
/// Exactly one message per changed key, in ascending key order.
pub fn edge_messages(
    previous: InputSnapshot,
    current: InputSnapshot,
    config: &NodeConfig,
) -> Vec<NoteMessage, NUM_KEYS> {
    let mut messages = Vec::new();
    let changed = current.changed_since(previous, NUM_KEYS);

    for key in 0..NUM_KEYS as u8 {
        if changed & (1 << key) == 0 {
            continue;
        }
        let event = if current.is_pressed(key as usize, config.polarity) {
            NoteEvent::Press
        } else {
            NoteEvent::Release
        };
        // `key < NUM_KEYS`, and capacity equals the number of keys.
        if let Ok(message) = NoteMessage::new(event, config.octave, key) {
            let _ = messages.push(message);
        }
    }

    messages
}

/// Periodic matrix scanner for one keyboard module.
pub struct KeyScanner<'a> {
    knob: KnobDecoder<'a>,
    previous: InputSnapshot,
    config: NodeConfig,
}

impl<'a> KeyScanner<'a> {
    /// Create a scanner.
    ///
    /// The previous snapshot starts as "everything released" so the first
    /// cycle reports only keys that are actually held.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails [`NodeConfig::validate`].
    pub fn new(knob: KnobDecoder<'a>, config: NodeConfig) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        Ok(Self {
            knob,
            previous: InputSnapshot::all_released(config.polarity),
            config,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn knob(&self) -> &KnobDecoder<'a> {
        &self.knob
    }

    /// Snapshot retained from the last cycle.
    pub fn previous(&self) -> InputSnapshot {
        self.previous
    }

    /// Scan the matrix once, feed the knob decoder and detect edges.
    ///
    /// The fresh snapshot becomes the new "previous" before this returns.
    pub fn scan<K: KeyMatrix>(&mut self, matrix: &mut K) -> ScanReport {
        let polarity = self.config.polarity;
        let mut snapshot = InputSnapshot::all_released(polarity);
        let mut pressed_key = None;

        for row in 0..KEY_ROWS {
            matrix.select_row(row);
            let columns = matrix.read_columns();
            for col in 0..COLUMNS {
                let key = (row * COLUMNS + col) as usize;
                if key >= NUM_KEYS {
                    continue;
                }
                let level = columns & (1 << col) != 0;
                snapshot.set_level(key, level);
                if polarity.is_pressed(level) {
                    pressed_key = Some(key as u8);
                }
            }
        }

        matrix.select_row(KNOB_ROW);
        let knob_columns = matrix.read_columns();
        for col in 0..COLUMNS {
            let index = (KNOB_ROW * COLUMNS + col) as usize;
            snapshot.set_level(index, knob_columns & (1 << col) != 0);
        }
        self.knob.update(
            knob_columns & (1 << KNOB_A_COLUMN) != 0,
            knob_columns & (1 << KNOB_B_COLUMN) != 0,
        );
        self.knob.constrain_rotation();

        let messages = edge_messages(self.previous, snapshot, &self.config);
        let step_size = pressed_key
            .and_then(|key| step_size_for(key, self.config.octave, self.config.octave_policy))
            .unwrap_or(0);

        self.previous = snapshot;

        ScanReport {
            snapshot,
            pressed_key,
            step_size,
            messages,
        }
    }

    /// Hand the report's messages to the transmit path, in key order.
    ///
    /// A receiver-role node sends nothing.
    pub async fn transmit<S: NoteSink>(&self, report: &ScanReport, sink: &S) {
        if !self.config.transmits() {
            return;
        }
        for message in &report.messages {
            sink.submit(*message).await;
        }
    }

    /// Publish the report to the shared store in one critical section.
    ///
    /// A sender writes snapshot and step size together. A receiver only
    /// writes the snapshot: its step size belongs to the message decoder.
    pub async fn publish<M: RawMutex>(&self, report: &ScanReport, store: &StateStore<M>) {
        if self.config.plays_local_keys() {
            store.write(report.snapshot, report.step_size).await;
        } else {
            store.write_inputs(report.snapshot).await;
        }
    }

    /// One full scan period: scan, transmit edges, publish.
    pub async fn run_cycle<K, S, M>(
        &mut self,
        matrix: &mut K,
        sink: &S,
        store: &StateStore<M>,
    ) -> ScanReport
    where
        K: KeyMatrix,
        S: NoteSink,
        M: RawMutex,
    {
        let report = self.scan(matrix);
        self.transmit(&report, sink).await;
        self.publish(&report, store).await;
        report
    }
}

/// Longest the scan task waits for the store lock before skipping a
/// publish.
#[cfg(feature = "task")]
pub const STORE_LOCK_TIMEOUT_MS: u64 = 5;

/// Periodic key scanning loop.
///
/// This is a regular `async fn`, not an Embassy `#[task]`. Wrap it in a
/// concrete task in the firmware, since Embassy tasks cannot be generic.
///
/// Runs every [`SCAN_PERIOD_MS`](crate::SCAN_PERIOD_MS) on a
/// [`Ticker`](embassy_time::Ticker), so a slow cycle does not drift the
/// schedule. A publish that cannot get the store lock within
/// [`STORE_LOCK_TIMEOUT_MS`] is logged and skipped; the next cycle
/// publishes a fresh snapshot anyway.
#[cfg(feature = "task")]
pub async fn scan_keys_task<K, S, M>(
    mut scanner: KeyScanner<'_>,
    mut matrix: K,
    sink: &S,
    store: &StateStore<M>,
) -> !
where
    K: KeyMatrix,
    S: NoteSink,
    M: RawMutex,
{
    use embassy_time::{Duration, Ticker};

    let mut ticker = Ticker::every(Duration::from_millis(crate::SCAN_PERIOD_MS));
    let lock_timeout = Duration::from_millis(STORE_LOCK_TIMEOUT_MS);

    #[cfg(feature = "defmt")]
    defmt::info!("Key scan task started");

    loop {
        ticker.next().await;

        let report = scanner.scan(&mut matrix);
        scanner.transmit(&report, sink).await;

        if scanner.config().plays_local_keys() {
            if let Err(_e) = store
                .write_within(report.snapshot, report.step_size, lock_timeout)
                .await
            {
                #[cfg(feature = "defmt")]
                defmt::warn!("Scan publish skipped: {}", _e);
            }
        } else {
            store.write_inputs(report.snapshot).await;
        }

        #[cfg(feature = "defmt")]
        if !report.messages.is_empty() {
            defmt::debug!(
                "Scan: inputs={=u32:X} edges={} volume={}",
                report.snapshot.bits(),
                report.messages.len(),
                scanner.knob().rotation()
            );
        }
    }
}
