//! Error types for the keyboard node core.

use core::fmt;

/// Reasons an inbound frame cannot be turned into a [`NoteMessage`].
///
/// None of these are fatal: the decoder logs the frame and moves on.
///
/// [`NoteMessage`]: crate::message::NoteMessage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageError {
    /// Byte 0 is neither `'P'` nor `'R'`.
    UnknownKind(u8),
    /// Byte 2 is not a note index in `0..12`.
    NoteOutOfRange(u8),
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageError::UnknownKind(k) => write!(f, "unknown event kind 0x{:02X}", k),
            MessageError::NoteOutOfRange(n) => write!(f, "note index {} out of range (0-11)", n),
        }
    }
}

/// Rejected [`NodeConfig`](crate::config::NodeConfig) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Module octave above [`MAX_OCTAVE`](crate::config::MAX_OCTAVE).
    OctaveOutOfRange(u8),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::OctaveOutOfRange(o) => write!(f, "module octave {} out of range (0-8)", o),
        }
    }
}

/// Errors from the shared state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// The store mutex was not released within the allowed wait.
    LockTimeout,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::LockTimeout => write!(f, "timed out waiting for the state lock"),
        }
    }
}
