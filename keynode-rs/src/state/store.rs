use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;

#[cfg(feature = "task")]
use crate::error::StoreError;
use crate::message::RawFrame;

use super::snapshot::InputSnapshot;

/// Everything the tasks share, copied in and out as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SharedState {
    /// Latest matrix snapshot from the scan task.
    pub inputs: InputSnapshot,
    /// Oscillator step size currently playing (0 = silent).
    pub step_size: u32,
    /// Last frame taken off the bus, kept for the display.
    pub last_received: Option<RawFrame>,
}

/// Lock-free copy of the step size for the audio routine.
///
/// Written only while the [`StateStore`] lock is held; read from interrupt
/// context without locking. A reader may see the previous value for up to
/// one scan period.
pub struct StepCell(AtomicU32);

impl StepCell {
    pub const fn new(step: u32) -> Self {
        Self(AtomicU32::new(step))
    }

    /// Current step size. Safe to call from interrupt context.
    pub fn load(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    fn store(&self, step: u32) {
        self.0.store(step, Ordering::Relaxed);
    }
}

/// The mutex-guarded shared state store.
///
/// Construct once at boot (typically in a `StaticCell`) and hand out
/// `&'static` references to every task.
///
/// # Examples
///
/// ```
/// use embassy_sync::blocking_mutex::raw::NoopRawMutex;
/// use keynode::{InputSnapshot, KeyPolarity, StateStore};
///
/// let store: StateStore<NoopRawMutex> =
///     StateStore::new(InputSnapshot::all_released(KeyPolarity::ActiveLow));
///
/// embassy_futures::block_on(async {
///     store.write(InputSnapshot::from_bits(0xFFE), 85_899_345).await;
///     let (inputs, step) = store.read().await;
///     assert_eq!(inputs.bits(), 0xFFE);
///     assert_eq!(step, 85_899_345);
/// });
/// assert_eq!(store.step_cell().load(), 85_899_345);
/// ```
pub struct StateStore<M: RawMutex> {
    state: Mutex<M, SharedState>,
    step: StepCell,
}

impl<M: RawMutex> StateStore<M> {
    /// Create a store holding `inputs`, a zero step size and no received
    /// frame.
    pub const fn new(inputs: InputSnapshot) -> Self {
        Self {
            state: Mutex::new(SharedState {
                inputs,
                step_size: 0,
                last_received: None,
            }),
            step: StepCell::new(0),
        }
    }

    /// Replace the snapshot and the step size in one critical section.
    pub async fn write(&self, inputs: InputSnapshot, step_size: u32) {
        let mut state = self.state.lock().await;
        state.inputs = inputs;
        state.step_size = step_size;
        self.step.store(step_size);
    }

    /// Like [`write`](Self::write), but gives up after `timeout` instead of
    /// waiting for the lock indefinitely.
    #[cfg(feature = "task")]
    pub async fn write_within(
        &self,
        inputs: InputSnapshot,
        step_size: u32,
        timeout: embassy_time::Duration,
    ) -> Result<(), StoreError> {
        let mut state = embassy_time::with_timeout(timeout, self.state.lock())
            .await
            .map_err(|_| StoreError::LockTimeout)?;
        state.inputs = inputs;
        state.step_size = step_size;
        self.step.store(step_size);
        Ok(())
    }

    /// Replace only the snapshot, leaving the step size to someone else.
    pub async fn write_inputs(&self, inputs: InputSnapshot) {
        self.state.lock().await.inputs = inputs;
    }

    /// Replace only the step size.
    pub async fn set_step_size(&self, step_size: u32) {
        let mut state = self.state.lock().await;
        state.step_size = step_size;
        self.step.store(step_size);
    }

    /// Record the last frame received from the bus.
    pub async fn set_last_received(&self, frame: RawFrame) {
        self.state.lock().await.last_received = Some(frame);
    }

    /// Snapshot and step size, read together.
    pub async fn read(&self) -> (InputSnapshot, u32) {
        let state = self.state.lock().await;
        (state.inputs, state.step_size)
    }

    /// Copy of the whole shared record.
    pub async fn snapshot(&self) -> SharedState {
        *self.state.lock().await
    }

    /// The lock-free step size cell for the audio routine.
    pub fn step_cell(&self) -> &StepCell {
        &self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::KeyPolarity;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};

    fn store() -> StateStore<NoopRawMutex> {
        StateStore::new(InputSnapshot::all_released(KeyPolarity::ActiveLow))
    }

    #[test]
    fn new_store_is_silent_and_released() {
        let s = store();
        let state = block_on(s.snapshot());
        assert_eq!(state.inputs, InputSnapshot::from_bits(u32::MAX));
        assert_eq!(state.step_size, 0);
        assert_eq!(state.last_received, None);
        assert_eq!(s.step_cell().load(), 0);
    }

    #[test]
    fn write_updates_both_fields_and_fast_path() {
        let s = store();
        block_on(s.write(InputSnapshot::from_bits(0x0FE), 1234));
        assert_eq!(block_on(s.read()), (InputSnapshot::from_bits(0x0FE), 1234));
        assert_eq!(s.step_cell().load(), 1234);
    }

    #[test]
    fn write_inputs_leaves_step_alone() {
        let s = store();
        block_on(s.set_step_size(77));
        block_on(s.write_inputs(InputSnapshot::from_bits(5)));
        assert_eq!(block_on(s.read()), (InputSnapshot::from_bits(5), 77));
        assert_eq!(s.step_cell().load(), 77);
    }

    #[test]
    fn last_received_is_cached() {
        let s = store();
        let frame = [b'P', 4, 5, 0, 0, 0, 0, 0];
        block_on(s.set_last_received(frame));
        assert_eq!(block_on(s.snapshot()).last_received, Some(frame));
    }

    #[test]
    fn concurrent_readers_never_see_torn_pairs() {
        // Each write pairs snapshot k with step k * 7 + 1.
        let s: StateStore<CriticalSectionRawMutex> = StateStore::new(InputSnapshot::from_bits(0));
        let paired = |bits: u32, step: u32| (bits == 0 && step == 0) || step == bits * 7 + 1;

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for k in 1..5_000u32 {
                    block_on(s.write(InputSnapshot::from_bits(k), k * 7 + 1));
                }
            });

            for _ in 0..2 {
                scope.spawn(|| {
                    for _ in 0..5_000 {
                        let (inputs, step) = block_on(s.read());
                        assert!(paired(inputs.bits(), step), "torn read: {:?} / {}", inputs, step);

                        let state = block_on(s.snapshot());
                        assert!(paired(state.inputs.bits(), state.step_size));
                    }
                });
            }
        });

        assert_eq!(block_on(s.read()), (InputSnapshot::from_bits(4_999), 4_999 * 7 + 1));
    }
}
