//! Inbound note message decoder.
//!
//! Frames arrive from the bus receive path undecoded. The decoder caches
//! every frame for the display, then turns valid ones into a step size
//! update through the shared store. Malformed frames are logged and
//! dropped.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::config::{NodeConfig, OctavePolicy};
use crate::error::MessageError;
use crate::message::{NoteEvent, NoteMessage, RawFrame};
use crate::notes::step_size_for;
use crate::state::StateStore;

/// Source of inbound frames (the bus receive path).
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    /// Wait for the next frame.
    async fn next_frame(&self) -> RawFrame;

    /// Frames lost because the source's queue was full. Sources that
    /// cannot overrun report 0.
    fn overrun_count(&self) -> u32 {
        0
    }
}

/// Stateless frame interpreter.
#[derive(Debug, Clone, Copy)]
pub struct MessageDecoder {
    policy: OctavePolicy,
    drives_step: bool,
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new(OctavePolicy::default())
    }
}

impl MessageDecoder {
    /// A decoder that writes every decoded step size to the store.
    pub fn new(policy: OctavePolicy) -> Self {
        Self {
            policy,
            drives_step: true,
        }
    }

    /// A decoder for a node running `config`.
    ///
    /// On a node whose scanner owns the step size, decoded frames are only
    /// cached for the display. Frames heard back through CAN loopback then
    /// cannot override the locally played key.
    pub fn for_config(config: &NodeConfig) -> Self {
        Self {
            policy: config.octave_policy,
            drives_step: !config.plays_local_keys(),
        }
    }

    /// Returns `true` if decoded frames update the step size.
    pub fn drives_step(&self) -> bool {
        self.drives_step
    }

    /// Parse a frame and compute the step size it asks for.
    ///
    /// `Release` always asks for silence, whichever note and octave it
    /// names. `Press` looks the note up with this decoder's octave policy;
    /// any octave byte is accepted.
    ///
    /// # Examples
    ///
    /// ```
    /// use keynode::{MessageDecoder, OctavePolicy};
    /// use keynode::notes::STEP_SIZES;
    ///
    /// let decoder = MessageDecoder::new(OctavePolicy::Shift);
    /// let (_, step) = decoder.decode(&[b'P', 4, 5, 0, 0, 0, 0, 0]).unwrap();
    /// assert_eq!(step, STEP_SIZES[5]);
    /// ```
    pub fn decode(&self, frame: &RawFrame) -> Result<(NoteMessage, u32), MessageError> {
        let message = NoteMessage::from_bytes(frame)?;
        let step = match message.event() {
            NoteEvent::Release => 0,
            NoteEvent::Press => step_size_for(message.note(), message.octave(), self.policy)
                .ok_or(MessageError::NoteOutOfRange(message.note()))?,
        };
        Ok((message, step))
    }

    /// Cache `frame` for the display and apply it to the store.
    ///
    /// The frame is cached even if it does not decode. On error, or if this
    /// decoder does not drive the step, the step size is left untouched.
    pub async fn handle_frame<M: RawMutex>(
        &self,
        frame: RawFrame,
        store: &StateStore<M>,
    ) -> Result<NoteMessage, MessageError> {
        store.set_last_received(frame).await;
        let (message, step) = self.decode(&frame)?;
        if self.drives_step {
            store.set_step_size(step).await;
        }
        Ok(message)
    }
}

/// Inbound message loop.
///
/// This is a regular `async fn`, not an Embassy `#[task]`; wrap it in a
/// concrete task in the firmware.
///
/// Waits on `source` indefinitely. Decode failures and receive overruns are
/// logged, never fatal.
pub async fn decode_task<S, M>(decoder: MessageDecoder, source: &S, store: &StateStore<M>) -> !
where
    S: FrameSource,
    M: RawMutex,
{
    #[cfg(feature = "defmt")]
    defmt::info!("Decode task started");

    let mut overruns_seen = source.overrun_count();

    loop {
        let frame = source.next_frame().await;

        match decoder.handle_frame(frame, store).await {
            Ok(_message) => {
                #[cfg(feature = "defmt")]
                defmt::debug!(
                    "Decoded: {} oct={} note={}",
                    _message.event().as_char(),
                    _message.octave(),
                    _message.note()
                );
            }
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Dropped frame {:02X}: {}", frame, _e);
            }
        }

        let overruns = source.overrun_count();
        if overruns != overruns_seen {
            #[cfg(feature = "defmt")]
            defmt::warn!("Receive queue overrun: {} frames lost", overruns.wrapping_sub(overruns_seen));
            overruns_seen = overruns;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::STEP_SIZES;
    use crate::state::{InputSnapshot, KeyPolarity};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn store() -> StateStore<NoopRawMutex> {
        StateStore::new(InputSnapshot::all_released(KeyPolarity::ActiveLow))
    }

    const PRESS_5: RawFrame = [b'P', 4, 5, 0, 0, 0, 0, 0];
    const RELEASE_5: RawFrame = [b'R', 4, 5, 0, 0, 0, 0, 0];

    #[test]
    fn press_then_release_sets_then_clears_step() {
        let decoder = MessageDecoder::default();
        let s = store();

        block_on(decoder.handle_frame(PRESS_5, &s)).unwrap();
        assert_eq!(s.step_cell().load(), STEP_SIZES[5]);

        // Malformed frames in between leave the step alone.
        let _ = block_on(decoder.handle_frame([b'Z', 4, 5, 0, 0, 0, 0, 0], &s));
        let _ = block_on(decoder.handle_frame([b'P', 4, 99, 0, 0, 0, 0, 0], &s));
        let _ = block_on(decoder.handle_frame([0; 8], &s));
        assert_eq!(s.step_cell().load(), STEP_SIZES[5]);

        block_on(decoder.handle_frame(RELEASE_5, &s)).unwrap();
        assert_eq!(s.step_cell().load(), 0);
        assert_eq!(block_on(s.read()).1, 0);
    }

    #[test]
    fn last_valid_event_wins() {
        let decoder = MessageDecoder::default();
        let s = store();

        block_on(decoder.handle_frame(PRESS_5, &s)).unwrap();
        block_on(decoder.handle_frame([b'P', 4, 3, 0, 0, 0, 0, 0], &s)).unwrap();
        assert_eq!(s.step_cell().load(), STEP_SIZES[3]);

        // A release for another note still silences.
        block_on(decoder.handle_frame([b'R', 4, 3, 0, 0, 0, 0, 0], &s)).unwrap();
        assert_eq!(s.step_cell().load(), 0);

        block_on(decoder.handle_frame(PRESS_5, &s)).unwrap();
        assert_eq!(s.step_cell().load(), STEP_SIZES[5]);
        block_on(decoder.handle_frame(RELEASE_5, &s)).unwrap();
        assert_eq!(s.step_cell().load(), 0);
    }

    #[test]
    fn release_in_high_octave_silences() {
        let decoder = MessageDecoder::new(OctavePolicy::Ignore);
        let s = store();
        block_on(decoder.handle_frame(PRESS_5, &s)).unwrap();

        let message = block_on(decoder.handle_frame([b'R', 9, 5, 0, 0, 0, 0, 0], &s)).unwrap();
        assert_eq!(message.octave(), 9);
        assert_eq!(s.step_cell().load(), 0);
    }

    #[test]
    fn press_in_high_octave_plays() {
        let frame = [b'P', 9, 5, 0, 0, 0, 0, 0];
        let ignore = MessageDecoder::new(OctavePolicy::Ignore);
        assert_eq!(ignore.decode(&frame).unwrap().1, STEP_SIZES[5]);

        // Shifting saturates instead of wrapping or rejecting.
        let shift = MessageDecoder::new(OctavePolicy::Shift);
        assert_eq!(shift.decode(&frame).unwrap().1, STEP_SIZES[5] << 5);
        assert_eq!(shift.decode(&[b'P', 0xFF, 5, 0, 0, 0, 0, 0]).unwrap().1, u32::MAX);
    }

    #[test]
    fn release_of_any_note_silences() {
        let decoder = MessageDecoder::default();
        let s = store();
        block_on(decoder.handle_frame(PRESS_5, &s)).unwrap();
        block_on(decoder.handle_frame([b'R', 4, 0, 0, 0, 0, 0, 0], &s)).unwrap();
        assert_eq!(s.step_cell().load(), 0);
    }

    #[test]
    fn out_of_range_note_is_rejected_not_indexed() {
        let decoder = MessageDecoder::default();
        assert_eq!(
            decoder.decode(&[b'P', 4, 12, 0, 0, 0, 0, 0]),
            Err(MessageError::NoteOutOfRange(12))
        );
    }

    #[test]
    fn every_frame_is_cached_for_display() {
        let decoder = MessageDecoder::default();
        let s = store();
        let junk = [b'?', 1, 2, 3, 4, 5, 6, 7];
        assert!(block_on(decoder.handle_frame(junk, &s)).is_err());
        assert_eq!(block_on(s.snapshot()).last_received, Some(junk));
    }

    #[test]
    fn octave_policy_applies_to_received_notes() {
        let frame = [b'P', 6, 9, 0, 0, 0, 0, 0];
        let shift = MessageDecoder::new(OctavePolicy::Shift);
        let ignore = MessageDecoder::new(OctavePolicy::Ignore);
        assert_eq!(shift.decode(&frame).unwrap().1, STEP_SIZES[9] * 4);
        assert_eq!(ignore.decode(&frame).unwrap().1, STEP_SIZES[9]);
    }

    #[test]
    fn sender_keeps_its_own_step() {
        let decoder = MessageDecoder::for_config(&NodeConfig::default());
        assert!(!decoder.drives_step());
        let s = store();
        block_on(s.set_step_size(STEP_SIZES[9]));

        // Our own release of another key, heard back through loopback.
        let message = block_on(decoder.handle_frame([b'R', 4, 2, 0, 0, 0, 0, 0], &s)).unwrap();
        assert_eq!(message.event(), NoteEvent::Release);
        assert_eq!(s.step_cell().load(), STEP_SIZES[9]);
        assert_eq!(block_on(s.snapshot()).last_received, Some([b'R', 4, 2, 0, 0, 0, 0, 0]));

        block_on(decoder.handle_frame([b'P', 4, 2, 0, 0, 0, 0, 0], &s)).unwrap();
        assert_eq!(s.step_cell().load(), STEP_SIZES[9]);
    }

    #[test]
    fn receiver_follows_the_bus() {
        let config = NodeConfig {
            role: crate::config::Role::Receiver,
            octave_policy: OctavePolicy::Ignore,
            ..NodeConfig::default()
        };
        let decoder = MessageDecoder::for_config(&config);
        assert!(decoder.drives_step());
        let s = store();

        block_on(decoder.handle_frame([b'P', 6, 2, 0, 0, 0, 0, 0], &s)).unwrap();
        assert_eq!(s.step_cell().load(), STEP_SIZES[2]);
    }

    #[test]
    fn decode_task_drains_source() {
        use core::cell::Cell;
        use embassy_futures::select::{select, Either};
        use embassy_sync::channel::Channel;

        struct ChannelSource<'a> {
            frames: &'a Channel<NoopRawMutex, RawFrame, 4>,
            consumed: Cell<usize>,
        }

        impl FrameSource for ChannelSource<'_> {
            async fn next_frame(&self) -> RawFrame {
                let frame = self.frames.receive().await;
                self.consumed.set(self.consumed.get() + 1);
                frame
            }
        }

        let frames = Channel::<NoopRawMutex, RawFrame, 4>::new();
        let source = ChannelSource {
            frames: &frames,
            consumed: Cell::new(0),
        };
        let s = store();

        frames.try_send(PRESS_5).unwrap();
        frames.try_send([b'P', 4, 2, 0, 0, 0, 0, 0]).unwrap();

        let outcome = block_on(select(
            decode_task(MessageDecoder::default(), &source, &s),
            async {
                while source.consumed.get() < 2 || !frames.is_empty() {
                    embassy_futures::yield_now().await;
                }
                // Let the task finish handling the last frame.
                embassy_futures::yield_now().await;
            },
        ));

        assert!(matches!(outcome, Either::Second(())));
        assert_eq!(s.step_cell().load(), STEP_SIZES[2]);
    }
}
