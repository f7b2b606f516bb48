//! Phase-accumulator sawtooth synthesis.
//!
//! One call to [`Synthesizer::next_sample`] per audio sample. It never
//! locks or waits: the step size and the volume come from atomic cells
//! kept up to date by the scan and decode tasks.

use crate::knob::KnobRotation;
use crate::state::StepCell;
use crate::MAX_VOLUME;

/// Sawtooth oscillator feeding an 8-bit DAC.
pub struct Synthesizer<'a> {
    phase: u32,
    step: &'a StepCell,
    volume: &'a KnobRotation,
}

impl<'a> Synthesizer<'a> {
    /// Start at phase 0, reading the step size from `step` and the volume
    /// from `volume` on every sample.
    pub fn new(step: &'a StepCell, volume: &'a KnobRotation) -> Self {
        Self {
            phase: 0,
            step,
            volume,
        }
    }

    /// Advance the accumulator by one step and return the DAC code.
    ///
    /// A step size of 0 holds the phase, so the output stays at whatever
    /// level it last produced.
    pub fn next_sample(&mut self) -> u8 {
        self.phase = self.phase.wrapping_add(self.step.load());
        sample_for(self.phase, self.volume.load())
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }
}

/// DAC code for accumulator `phase` at knob `rotation`.
///
/// The top byte of the phase is a sawtooth centred on 0. It is attenuated by
/// `MAX_VOLUME - rotation` bits and re-centred on 128, so rotation 8 spans
/// the full 0..=255 range and rotation 0 is a flat 128 (or 127 on the lower
/// half cycle).
///
/// ```
/// use keynode::synth::sample_for;
///
/// assert_eq!(sample_for(0xFF00_0000, 8), 255);
/// assert_eq!(sample_for(0x0000_0000, 8), 0);
/// assert_eq!(sample_for(0xFF00_0000, 4), 135);
/// ```
pub fn sample_for(phase: u32, rotation: u8) -> u8 {
    let saw = (phase >> 24) as i32 - 128;
    let shift = MAX_VOLUME - rotation.min(MAX_VOLUME);
    ((saw >> shift) + 128) as u8
}
