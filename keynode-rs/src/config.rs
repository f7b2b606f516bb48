//! Runtime configuration for one keyboard node.

use crate::error::ConfigError;
use crate::state::KeyPolarity;

/// Octave that the step size table is tuned for (C4..B4).
pub const REFERENCE_OCTAVE: u8 = 4;

/// Highest module octave a node may be configured for.
pub const MAX_OCTAVE: u8 = 8;

/// Which side of the note protocol this node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Plays its own keys and broadcasts every key transition.
    #[default]
    Sender,
    /// Stays quiet on the bus. The step size belongs to the message
    /// decoder, so the scanner only publishes its input snapshot.
    Receiver,
}

/// How the octave byte of a note message affects the step size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OctavePolicy {
    /// Double the step per octave above [`REFERENCE_OCTAVE`], halve it per
    /// octave below.
    #[default]
    Shift,
    /// Play every note in the reference octave regardless of the octave
    /// byte.
    Ignore,
}

/// Configuration shared by the scanner and the message decoder.
///
/// [`NodeConfig::default()`] reproduces a standalone sender module in
/// octave 4 with active-low keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeConfig {
    /// Sender or receiver. Default: [`Role::Sender`].
    pub role: Role,
    /// Octave stamped on outgoing messages and used for local notes,
    /// `0..=MAX_OCTAVE`. Default: 4.
    pub octave: u8,
    /// Default: [`OctavePolicy::Shift`].
    pub octave_policy: OctavePolicy,
    /// Electrical level that means "pressed". Default: active-low.
    pub polarity: KeyPolarity,
    /// Knob rotation at power-on, clamped to `0..=8`. Default: 0.
    pub initial_volume: u8,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: Role::Sender,
            octave: REFERENCE_OCTAVE,
            octave_policy: OctavePolicy::Shift,
            polarity: KeyPolarity::ActiveLow,
            initial_volume: 0,
        }
    }
}

impl NodeConfig {
    /// Check the values that cannot be repaired silently.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.octave > MAX_OCTAVE {
            return Err(ConfigError::OctaveOutOfRange(self.octave));
        }
        Ok(self)
    }

    /// Returns `true` if key transitions should be put on the bus.
    pub fn transmits(&self) -> bool {
        self.role == Role::Sender
    }

    /// Returns `true` if the scanner owns the oscillator step size.
    pub fn plays_local_keys(&self) -> bool {
        self.role == Role::Sender
    }
}
