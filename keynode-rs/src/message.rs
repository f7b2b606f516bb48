//! Note message wire format.
//!
//! Every frame on the bus carries an 8-byte payload:
//!
//! ```text
//! byte:   0       1        2      3..8
//!       [kind] [octave] [note] [reserved, zero]
//! kind: 'P' (0x50) press, 'R' (0x52) release
//! ```

use crate::error::MessageError;
use crate::NUM_KEYS;

/// Payload length of a note frame.
pub const FRAME_LEN: usize = 8;

/// An undecoded 8-byte frame payload, exactly as received.
pub type RawFrame = [u8; FRAME_LEN];

/// Key event kind carried in byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NoteEvent {
    Press = b'P',
    Release = b'R',
}

impl NoteEvent {
    /// Parse the kind byte.
    pub fn from_byte(byte: u8) -> Result<Self, MessageError> {
        match byte {
            b'P' => Ok(NoteEvent::Press),
            b'R' => Ok(NoteEvent::Release),
            other => Err(MessageError::UnknownKind(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// The ASCII letter shown on the display.
    pub fn as_char(self) -> char {
        self.as_byte() as char
    }
}

/// A validated note-on / note-off event.
///
/// Construction through [`NoteMessage::new`] or [`NoteMessage::from_bytes`]
/// guarantees `note < 12`. The octave byte is carried as sent; how it
/// affects pitch is up to the receiver's [`OctavePolicy`].
///
/// [`OctavePolicy`]: crate::config::OctavePolicy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoteMessage {
    event: NoteEvent,
    octave: u8,
    note: u8,
}

impl NoteMessage {
    /// Build a message, validating the note index.
    pub fn new(event: NoteEvent, octave: u8, note: u8) -> Result<Self, MessageError> {
        if note as usize >= NUM_KEYS {
            return Err(MessageError::NoteOutOfRange(note));
        }
        Ok(Self { event, octave, note })
    }

    pub fn press(octave: u8, note: u8) -> Result<Self, MessageError> {
        Self::new(NoteEvent::Press, octave, note)
    }

    pub fn release(octave: u8, note: u8) -> Result<Self, MessageError> {
        Self::new(NoteEvent::Release, octave, note)
    }

    pub fn event(&self) -> NoteEvent {
        self.event
    }

    pub fn octave(&self) -> u8 {
        self.octave
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    /// Serialise to the bus payload. Reserved bytes are zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use keynode::NoteMessage;
    ///
    /// let msg = NoteMessage::press(4, 9).unwrap();
    /// assert_eq!(msg.to_bytes(), [b'P', 4, 9, 0, 0, 0, 0, 0]);
    /// ```
    pub fn to_bytes(&self) -> RawFrame {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = self.event.as_byte();
        frame[1] = self.octave;
        frame[2] = self.note;
        frame
    }

    /// Parse a bus payload.
    ///
    /// The kind is checked first, then the note. The octave byte and the
    /// reserved bytes are not inspected.
    pub fn from_bytes(frame: &RawFrame) -> Result<Self, MessageError> {
        let event = NoteEvent::from_byte(frame[0])?;
        Self::new(event, frame[1], frame[2])
    }
}
