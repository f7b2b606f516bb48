//! Note table: phase-accumulator step sizes and display names.
//!
//! Step sizes are `floor(2^32 * f / SAMPLE_RATE_HZ)` for the twelve
//! semitones C4..B4, tuned to A4 = 440 Hz. They are written out as literals
//! because float `powf` is not available in `const` context.

use crate::config::{OctavePolicy, REFERENCE_OCTAVE};
use crate::NUM_KEYS;

/// Per-sample phase increments, indexed by note (0 = C, 11 = B).
pub const STEP_SIZES: [u32; NUM_KEYS] = [
    51_076_056, // C4  261.63 Hz
    54_113_197, // C#4 277.18 Hz
    57_330_935, // D4  293.66 Hz
    60_740_009, // D#4 311.13 Hz
    64_351_798, // E4  329.63 Hz
    68_178_356, // F4  349.23 Hz
    72_232_452, // F#4 369.99 Hz
    76_527_617, // G4  392.00 Hz
    81_078_186, // G#4 415.30 Hz
    85_899_345, // A4  440.00 Hz
    91_007_186, // A#4 466.16 Hz
    96_418_755, // B4  493.88 Hz
];

/// Human-readable note names, indexed like [`STEP_SIZES`].
pub const NOTE_NAMES: [&str; NUM_KEYS] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Bounds-checked lookup of the reference-octave step size.
///
/// Returns `None` for `note >= 12`.
///
/// # Examples
///
/// ```
/// use keynode::notes::{step_size, STEP_SIZES};
///
/// assert_eq!(step_size(9), Some(STEP_SIZES[9]));
/// assert_eq!(step_size(12), None);
/// ```
pub fn step_size(note: u8) -> Option<u32> {
    STEP_SIZES.get(note as usize).copied()
}

/// Step size for `note` played in `octave` under `policy`.
///
/// Returns `None` for an out-of-range note. Shifting up saturates at
/// `u32::MAX` rather than wrapping.
pub fn step_size_for(note: u8, octave: u8, policy: OctavePolicy) -> Option<u32> {
    let base = step_size(note)?;
    Some(match policy {
        OctavePolicy::Ignore => base,
        OctavePolicy::Shift => shift_octave(base, octave),
    })
}

/// Display name for a note index, or `None` if out of range.
pub fn note_name(note: u8) -> Option<&'static str> {
    NOTE_NAMES.get(note as usize).copied()
}

fn shift_octave(step: u32, octave: u8) -> u32 {
    if octave >= REFERENCE_OCTAVE {
        let up = u32::from(octave - REFERENCE_OCTAVE).min(32);
        u32::try_from(u64::from(step) << up).unwrap_or(u32::MAX)
    } else {
        let down = u32::from(REFERENCE_OCTAVE - octave);
        step.checked_shr(down).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SAMPLE_RATE_HZ;

    #[test]
    fn table_is_strictly_increasing() {
        for pair in STEP_SIZES.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn adjacent_ratio_is_one_semitone() {
        let semitone = 2f64.powf(1.0 / 12.0);
        for pair in STEP_SIZES.windows(2) {
            let ratio = pair[1] as f64 / pair[0] as f64;
            assert!((ratio - semitone).abs() < 1e-6, "ratio {}", ratio);
        }
    }

    #[test]
    fn a4_matches_440_hz() {
        let expected = (4_294_967_296.0 * 440.0 / SAMPLE_RATE_HZ as f64) as u32;
        assert_eq!(STEP_SIZES[9], expected);
    }

    #[test]
    fn lookup_rejects_out_of_range_note() {
        assert_eq!(step_size(11), Some(STEP_SIZES[11]));
        assert_eq!(step_size(12), None);
        assert_eq!(step_size(255), None);
        assert_eq!(step_size_for(200, 4, OctavePolicy::Shift), None);
    }

    #[test]
    fn shift_policy_doubles_and_halves() {
        let a4 = STEP_SIZES[9];
        assert_eq!(step_size_for(9, 4, OctavePolicy::Shift), Some(a4));
        assert_eq!(step_size_for(9, 5, OctavePolicy::Shift), Some(a4 * 2));
        assert_eq!(step_size_for(9, 3, OctavePolicy::Shift), Some(a4 / 2));
        assert_eq!(step_size_for(9, 0, OctavePolicy::Shift), Some(a4 >> 4));
    }

    #[test]
    fn shift_policy_saturates() {
        assert_eq!(step_size_for(11, 40, OctavePolicy::Shift), Some(u32::MAX));
    }

    #[test]
    fn ignore_policy_keeps_reference_octave() {
        assert_eq!(step_size_for(5, 7, OctavePolicy::Ignore), Some(STEP_SIZES[5]));
        assert_eq!(step_size_for(5, 1, OctavePolicy::Ignore), Some(STEP_SIZES[5]));
    }

    #[test]
    fn names_line_up_with_table() {
        assert_eq!(note_name(0), Some("C"));
        assert_eq!(note_name(9), Some("A"));
        assert_eq!(note_name(12), None);
    }
}
