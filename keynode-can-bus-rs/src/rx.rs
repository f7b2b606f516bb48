//! Inbound path: filter, pad and queue frames from the receive interrupt.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use keynode::message::FRAME_LEN;
use keynode::{FrameSource, RawFrame};

/// What [`RxPath::on_frame_received`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxOutcome {
    /// Queued for the decoder.
    Queued,
    /// Identifier did not match; discarded.
    Filtered,
    /// Queue full; the new frame was discarded.
    Dropped,
}

/// Queue of inbound frames for the message decoder.
///
/// When the queue is full the newest frame is dropped and counted; frames
/// already queued are kept.
pub struct RxPath<M: RawMutex, const N: usize> {
    queue: Channel<M, RawFrame, N>,
    bus_id: u16,
    overruns: AtomicU32,
    filtered: AtomicU32,
}

impl<M: RawMutex, const N: usize> RxPath<M, N> {
    /// Create an empty path accepting only standard identifier `bus_id`.
    pub const fn new(bus_id: u16) -> Self {
        Self {
            queue: Channel::new(),
            bus_id,
            overruns: AtomicU32::new(0),
            filtered: AtomicU32::new(0),
        }
    }

    /// Accept a frame from the receive interrupt.
    ///
    /// Never waits. Payloads shorter than 8 bytes are zero-padded, longer
    /// ones truncated.
    pub fn on_frame_received(&self, id: u16, data: &[u8]) -> RxOutcome {
        if id != self.bus_id {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            return RxOutcome::Filtered;
        }

        let mut frame: RawFrame = [0; FRAME_LEN];
        let len = data.len().min(FRAME_LEN);
        frame[..len].copy_from_slice(&data[..len]);

        match self.queue.try_send(frame) {
            Ok(()) => RxOutcome::Queued,
            Err(_) => {
                self.overruns.fetch_add(1, Ordering::Relaxed);
                RxOutcome::Dropped
            }
        }
    }

    /// Wait for the oldest queued frame.
    pub async fn receive(&self) -> RawFrame {
        self.queue.receive().await
    }

    /// Frames dropped because the queue was full.
    pub fn overrun_count(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Frames discarded for carrying a foreign identifier.
    pub fn filtered_count(&self) -> u32 {
        self.filtered.load(Ordering::Relaxed)
    }

    pub fn bus_id(&self) -> u16 {
        self.bus_id
    }
}

impl<M: RawMutex, const N: usize> FrameSource for RxPath<M, N> {
    async fn next_frame(&self) -> RawFrame {
        self.receive().await
    }

    fn overrun_count(&self) -> u32 {
        RxPath::overrun_count(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DEFAULT_BUS_ID, RX_QUEUE_LEN};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    type Path = RxPath<NoopRawMutex, RX_QUEUE_LEN>;

    #[test]
    fn short_payload_is_zero_padded() {
        let rx = Path::new(DEFAULT_BUS_ID);
        assert_eq!(rx.on_frame_received(0x123, &[b'P', 4, 9]), RxOutcome::Queued);
        assert_eq!(block_on(rx.receive()), [b'P', 4, 9, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn long_payload_is_truncated() {
        let rx = Path::new(DEFAULT_BUS_ID);
        rx.on_frame_received(0x123, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(block_on(rx.receive()), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn foreign_ids_are_filtered() {
        let rx = Path::new(DEFAULT_BUS_ID);
        assert_eq!(rx.on_frame_received(0x124, &[b'P', 4, 9]), RxOutcome::Filtered);
        assert_eq!(rx.on_frame_received(0x000, &[b'P', 4, 9]), RxOutcome::Filtered);
        assert_eq!(rx.filtered_count(), 2);
        assert_eq!(rx.overrun_count(), 0);
        assert!(rx.queue.is_empty());
    }

    #[test]
    fn overrun_drops_newest_and_counts() {
        let rx = Path::new(DEFAULT_BUS_ID);
        for note in 0..RX_QUEUE_LEN {
            assert_eq!(rx.on_frame_received(0x123, &[b'P', 4, note as u8]), RxOutcome::Queued);
        }
        assert_eq!(rx.on_frame_received(0x123, &[b'R', 4, 0]), RxOutcome::Dropped);
        assert_eq!(rx.on_frame_received(0x123, &[b'R', 4, 1]), RxOutcome::Dropped);
        assert_eq!(rx.overrun_count(), 2);
        assert_eq!(FrameSource::overrun_count(&rx), 2);

        // The oldest frames survive, in order.
        assert_eq!(block_on(rx.next_frame())[2], 0);
        assert_eq!(block_on(rx.next_frame())[2], 1);
        assert_eq!(rx.queue.len(), RX_QUEUE_LEN - 2);
    }

    #[test]
    fn frames_reach_the_decoder() {
        use keynode::notes::STEP_SIZES;
        use keynode::{InputSnapshot, KeyPolarity, MessageDecoder, StateStore};

        let rx = Path::new(DEFAULT_BUS_ID);
        let store: StateStore<NoopRawMutex> =
            StateStore::new(InputSnapshot::all_released(KeyPolarity::ActiveLow));
        let decoder = MessageDecoder::default();

        rx.on_frame_received(0x123, &[b'P', 4, 9]);
        let frame = block_on(rx.next_frame());
        block_on(decoder.handle_frame(frame, &store)).unwrap();
        assert_eq!(store.step_cell().load(), STEP_SIZES[9]);
    }
}
