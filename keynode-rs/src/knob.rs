//! Quadrature knob decoder.
//!
//! The knob's two phase lines A and B form a 2-bit Gray code
//! `(B << 1) | A`. One detent of clockwise rotation walks
//! `00 → 01 → 11 → 10 → 00`; counter-clockwise walks the other way.
//!
//! | previous | current | direction |
//! |----------|---------|-----------|
//! | 00 | 01 | +1 |
//! | 00 | 10 | −1 |
//! | 01 | 11 | +1 |
//! | 10 | 11 | −1 |
//! | 11 | 10 | +1 |
//! | 11 | 01 | −1 |
//!
//! `00 ↔ 11` means a sample was missed. The decoder then repeats the last
//! valid direction, which is right far more often than it is wrong.
//!
//! The decoded value lives in a [`KnobRotation`] cell: written only by the
//! scan task, read lock-free by the audio routine.

use core::sync::atomic::{AtomicU8, Ordering};

/// Upper bound of the rotation value (inclusive). The lower bound is 0.
pub const ROTATION_MAX: u8 = 8;

/// Lock-free rotation value shared between the scan task and the audio
/// routine.
///
/// Single writer ([`KnobDecoder`]), any number of readers. Readers may see
/// a value one scan period old.
pub struct KnobRotation(AtomicU8);

impl KnobRotation {
    /// Create a cell holding `initial`, clamped to `0..=ROTATION_MAX`.
    pub const fn new(initial: u8) -> Self {
        let value = if initial > ROTATION_MAX { ROTATION_MAX } else { initial };
        Self(AtomicU8::new(value))
    }

    /// Current rotation. Safe to call from interrupt context.
    pub fn load(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    fn store(&self, value: u8) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// Rotation direction of one valid phase edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

impl Direction {
    /// Signed step: `+1` clockwise, `-1` counter-clockwise.
    pub fn delta(self) -> i8 {
        match self {
            Direction::Clockwise => 1,
            Direction::CounterClockwise => -1,
        }
    }
}

/// What a pair of phase codes means.
enum Transition {
    Step(Direction),
    Skip,
    Idle,
}

fn classify(previous: u8, current: u8) -> Transition {
    match (previous, current) {
        (0b00, 0b01) | (0b01, 0b11) | (0b11, 0b10) => Transition::Step(Direction::Clockwise),
        (0b00, 0b10) | (0b10, 0b11) | (0b11, 0b01) => Transition::Step(Direction::CounterClockwise),
        (0b00, 0b11) | (0b11, 0b00) => Transition::Skip,
        _ => Transition::Idle,
    }
}

/// State machine for one physical knob.
pub struct KnobDecoder<'a> {
    rotation: &'a KnobRotation,
    previous: u8,
    last_direction: Option<Direction>,
}

impl<'a> KnobDecoder<'a> {
    /// Create a decoder publishing into `rotation`.
    ///
    /// The previous phase code starts at `00` and no direction is known
    /// until the first valid edge.
    pub fn new(rotation: &'a KnobRotation) -> Self {
        Self {
            rotation,
            previous: 0b00,
            last_direction: None,
        }
    }

    /// Feed one sample of the two phase lines.
    ///
    /// Returns the direction that was applied, if any. The published
    /// rotation is clamped before this returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use keynode::{KnobDecoder, KnobRotation, Direction};
    ///
    /// let rotation = KnobRotation::new(4);
    /// let mut knob = KnobDecoder::new(&rotation);
    /// assert_eq!(knob.update(true, false), Some(Direction::Clockwise)); // 00 -> 01
    /// assert_eq!(rotation.load(), 5);
    /// ```
    pub fn update(&mut self, a: bool, b: bool) -> Option<Direction> {
        let current = (u8::from(b) << 1) | u8::from(a);

        let applied = match classify(self.previous, current) {
            Transition::Step(direction) => {
                self.last_direction = Some(direction);
                Some(direction)
            }
            Transition::Skip => self.last_direction,
            Transition::Idle => None,
        };

        if let Some(direction) = applied {
            let next = i16::from(self.rotation.load()) + i16::from(direction.delta());
            self.publish(next);
        }

        self.previous = current;
        applied
    }

    /// Clamp the published rotation to `0..=ROTATION_MAX`.
    ///
    /// Saturates, never wraps. [`update`](Self::update) already calls this,
    /// so calling it again is a no-op.
    pub fn constrain_rotation(&self) {
        self.publish(i16::from(self.rotation.load()));
    }

    /// Current rotation value (lock-free).
    pub fn rotation(&self) -> u8 {
        self.rotation.load()
    }

    /// Direction of the most recent valid edge.
    pub fn last_direction(&self) -> Option<Direction> {
        self.last_direction
    }

    fn publish(&self, value: i16) {
        let clamped = value.clamp(0, i16::from(ROTATION_MAX)) as u8;
        self.rotation.store(clamped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(code: u8) -> (bool, bool) {
        (code & 0b01 != 0, code & 0b10 != 0)
    }

    /// Decoder primed so that `previous == code`, rotation in mid-range.
    fn primed(rotation: &KnobRotation, code: u8) -> KnobDecoder<'_> {
        let mut knob = KnobDecoder::new(rotation);
        knob.previous = code;
        knob
    }

    #[test]
    fn valid_edges_match_sign_table() {
        let table = [
            (0b00, 0b01, Direction::Clockwise),
            (0b00, 0b10, Direction::CounterClockwise),
            (0b01, 0b11, Direction::Clockwise),
            (0b10, 0b11, Direction::CounterClockwise),
            (0b11, 0b10, Direction::Clockwise),
            (0b11, 0b01, Direction::CounterClockwise),
        ];

        for (prev, cur, expected) in table {
            let rotation = KnobRotation::new(4);
            let mut knob = primed(&rotation, prev);
            let (a, b) = levels(cur);
            assert_eq!(knob.update(a, b), Some(expected), "{:02b} -> {:02b}", prev, cur);
            assert_eq!(knob.last_direction(), Some(expected));
            assert_eq!(rotation.load() as i8, 4 + expected.delta());
        }
    }

    #[test]
    fn skip_applies_previous_direction_and_keeps_it() {
        for (from, to) in [(0b00, 0b11), (0b11, 0b00)] {
            for dir in [Direction::Clockwise, Direction::CounterClockwise] {
                let rotation = KnobRotation::new(4);
                let mut knob = primed(&rotation, from);
                knob.last_direction = Some(dir);

                let (a, b) = levels(to);
                assert_eq!(knob.update(a, b), Some(dir));
                assert_eq!(knob.last_direction(), Some(dir));
                assert_eq!(rotation.load() as i8, 4 + dir.delta());
            }
        }
    }

    #[test]
    fn skip_before_any_valid_edge_is_ignored() {
        let rotation = KnobRotation::new(4);
        let mut knob = KnobDecoder::new(&rotation);
        assert_eq!(knob.update(true, true), None); // 00 -> 11
        assert_eq!(rotation.load(), 4);
        assert_eq!(knob.last_direction(), None);
    }

    #[test]
    fn unscored_transitions_leave_rotation_alone() {
        for (prev, cur) in [(0b00, 0b00), (0b01, 0b00), (0b10, 0b00), (0b01, 0b10), (0b10, 0b01)] {
            let rotation = KnobRotation::new(4);
            let mut knob = primed(&rotation, prev);
            let (a, b) = levels(cur);
            assert_eq!(knob.update(a, b), None);
            assert_eq!(rotation.load(), 4);
        }
    }

    #[test]
    fn full_clockwise_cycle_scores_three_steps() {
        let rotation = KnobRotation::new(0);
        let mut knob = KnobDecoder::new(&rotation);
        for code in [0b01, 0b11, 0b10, 0b00] {
            let (a, b) = levels(code);
            knob.update(a, b);
        }
        // 10 -> 00 is not in the scored subset.
        assert_eq!(rotation.load(), 3);
    }

    #[test]
    fn rotation_saturates_at_both_ends() {
        let rotation = KnobRotation::new(0);
        let mut knob = KnobDecoder::new(&rotation);

        // Spin clockwise for a long time.
        for _ in 0..50 {
            for code in [0b01, 0b11, 0b10, 0b00] {
                let (a, b) = levels(code);
                knob.update(a, b);
                assert!(rotation.load() <= ROTATION_MAX);
            }
        }
        assert_eq!(rotation.load(), ROTATION_MAX);

        // And back again.
        for _ in 0..50 {
            for code in [0b10, 0b11, 0b01, 0b00] {
                let (a, b) = levels(code);
                knob.update(a, b);
            }
        }
        assert_eq!(rotation.load(), 0);
    }

    #[test]
    fn rotation_stays_in_range_for_arbitrary_sequences() {
        // Deterministic pseudo-random walk over all codes.
        let rotation = KnobRotation::new(3);
        let mut knob = KnobDecoder::new(&rotation);
        let mut seed: u32 = 0x1234_5678;
        for _ in 0..10_000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let code = ((seed >> 16) & 0b11) as u8;
            let (a, b) = levels(code);
            knob.update(a, b);
            knob.constrain_rotation();
            assert!(knob.rotation() <= ROTATION_MAX);
        }
    }

    #[test]
    fn new_cell_clamps_initial_value() {
        assert_eq!(KnobRotation::new(200).load(), ROTATION_MAX);
    }
}
