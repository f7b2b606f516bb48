/// Electrical level that means "pressed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyPolarity {
    /// A low column level means pressed (pull-up matrix).
    #[default]
    ActiveLow,
    /// A high column level means pressed.
    ActiveHigh,
}

impl KeyPolarity {
    /// Interpret one sampled level.
    pub fn is_pressed(self, level: bool) -> bool {
        match self {
            KeyPolarity::ActiveLow => !level,
            KeyPolarity::ActiveHigh => level,
        }
    }

    /// The level an idle (released) input reads.
    pub const fn released_level(self) -> bool {
        match self {
            KeyPolarity::ActiveLow => true,
            KeyPolarity::ActiveHigh => false,
        }
    }
}

/// Raw sampled levels of every key and control input, one bit each.
///
/// Bit *i* holds the level of logical input *i*. The snapshot stores
/// levels, not key states: whether a bit means "pressed" is decided by a
/// [`KeyPolarity`] at the point of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputSnapshot(u32);

impl InputSnapshot {
    /// Number of inputs a snapshot can hold.
    pub const WIDTH: usize = 32;

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// A snapshot where every input reads its released level.
    pub const fn all_released(polarity: KeyPolarity) -> Self {
        if polarity.released_level() {
            Self(u32::MAX)
        } else {
            Self(0)
        }
    }

    /// Sampled level of input `index`. Out-of-range indices read low.
    pub fn level(self, index: usize) -> bool {
        index < Self::WIDTH && self.0 & (1 << index) != 0
    }

    /// Set the level of input `index`. Out-of-range indices are ignored.
    pub fn set_level(&mut self, index: usize, level: bool) {
        if index >= Self::WIDTH {
            return;
        }
        if level {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    pub fn is_pressed(self, index: usize, polarity: KeyPolarity) -> bool {
        index < Self::WIDTH && polarity.is_pressed(self.level(index))
    }

    /// Bit mask of pressed inputs among the lowest `count` bits.
    pub fn pressed_mask(self, polarity: KeyPolarity, count: usize) -> u32 {
        let pressed = match polarity {
            KeyPolarity::ActiveLow => !self.0,
            KeyPolarity::ActiveHigh => self.0,
        };
        pressed & low_mask(count)
    }

    /// Bit mask of inputs among the lowest `count` bits whose level
    /// differs from `previous`.
    ///
    /// A level change is a pressed-state change under either polarity, so
    /// this is the edge set of the key scanner.
    pub fn changed_since(self, previous: InputSnapshot, count: usize) -> u32 {
        (self.0 ^ previous.0) & low_mask(count)
    }

    /// Highest-indexed pressed input among the lowest `count` bits, i.e.
    /// the one scanned last.
    pub fn last_pressed(self, polarity: KeyPolarity, count: usize) -> Option<u8> {
        let mask = self.pressed_mask(polarity, count);
        if mask == 0 {
            None
        } else {
            Some((31 - mask.leading_zeros()) as u8)
        }
    }

    /// Lowest-indexed pressed input among the lowest `count` bits.
    pub fn first_pressed(self, polarity: KeyPolarity, count: usize) -> Option<u8> {
        let mask = self.pressed_mask(polarity, count);
        if mask == 0 {
            None
        } else {
            Some(mask.trailing_zeros() as u8)
        }
    }
}

fn low_mask(count: usize) -> u32 {
    if count >= InputSnapshot::WIDTH {
        u32::MAX
    } else {
        (1u32 << count) - 1
    }
}
