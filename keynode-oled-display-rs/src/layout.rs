//! Display layout types and rendering logic.
//!
//! This module defines the immutable [`DisplayState`] snapshot, the
//! [`DisplayChanges`] diff, and the [`render_display`] function that draws
//! a frame using `embedded-graphics`.

use core::fmt::Write;

use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    text::Text,
};
use heapless::String;
use keynode::notes::note_name;
use keynode::{KeyPolarity, SharedState, NUM_KEYS};

// ── DisplayConfig ────────────────────────────────────────────────────────

/// Configuration for the display layout and update task.
///
/// All layout geometry lives here. [`DisplayConfig::default()`] matches the
/// 128×32 panel on the keyboard module, refreshed at 10 Hz.
#[derive(Debug, Clone, Copy)]
pub struct DisplayConfig {
    /// Display refresh rate in Hz. Default: 10.
    pub update_frequency_hz: u32,

    // ── Layout geometry ──────────────────────────────────────────────
    /// Total display width in pixels. Default: 128.
    pub display_width: u32,
    /// Total display height in pixels. Default: 32.
    pub display_height: u32,
    /// Baseline of the key bitmap line. Default: 10.
    pub keys_line_y: i32,
    /// Baseline of the note / volume / last frame line. Default: 22.
    pub status_line_y: i32,
    /// X position of the last received frame on the status line. Default: 66.
    pub frame_x: i32,

    /// How to read the key bits when picking the note name.
    pub key_polarity: KeyPolarity,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            update_frequency_hz: 10,
            display_width: 128,
            display_height: 32,
            keys_line_y: 10,
            status_line_y: 22,
            frame_x: 66,
            key_polarity: KeyPolarity::ActiveLow,
        }
    }
}

impl DisplayConfig {
    /// Convert the configured frequency to a timer period in milliseconds.
    ///
    /// Formula: `1000 / update_frequency_hz`.
    pub fn update_period_ms(&self) -> u64 {
        1000 / self.update_frequency_hz.max(1) as u64
    }
}

// ── DisplayState ─────────────────────────────────────────────────────────

/// Everything the display needs to render one frame.
///
/// Built from a copy of the shared state, so rendering never holds the
/// store lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayState {
    /// Raw levels of the lowest 16 inputs (keys and knob row).
    pub input_bits: u16,
    /// Lowest pressed key, if any.
    pub first_note: Option<u8>,
    /// Knob rotation, 0..=8.
    pub volume: u8,
    /// Kind, octave and note bytes of the last frame off the bus.
    pub last_frame: Option<[u8; 3]>,
}

impl DisplayState {
    /// Build from a store snapshot and the current knob rotation.
    pub fn from_shared(state: &SharedState, volume: u8, polarity: KeyPolarity) -> Self {
        Self {
            input_bits: state.inputs.bits() as u16,
            first_note: state.inputs.first_pressed(polarity, NUM_KEYS),
            volume,
            last_frame: state.last_received.map(|f| [f[0], f[1], f[2]]),
        }
    }

    /// First line: `Keys 0FFF`.
    pub fn keys_line(&self) -> String<16> {
        let mut line = String::new();
        let _ = write!(line, "Keys {:04X}", self.input_bits);
        line
    }

    /// Left half of the second line: note name padded to three columns,
    /// then the volume. `-` when no key is down.
    pub fn status_line(&self) -> String<16> {
        let name = self.first_note.and_then(note_name).unwrap_or("-");
        let mut line = String::new();
        let _ = write!(line, "{:<3}Vol {}", name, self.volume);
        line
    }

    /// Right half of the second line: `<kind><octave> <note>`, e.g. `P4 9`.
    ///
    /// Non-printable kind bytes are shown as `?`.
    pub fn frame_text(&self) -> Option<String<12>> {
        let [kind, octave, note] = self.last_frame?;
        let kind = if kind.is_ascii_graphic() { kind as char } else { '?' };
        let mut text = String::new();
        let _ = write!(text, "{}{} {}", kind, octave, note);
        Some(text)
    }
}

// ── DisplayChanges ───────────────────────────────────────────────────────

/// Which lines differ between two [`DisplayState`] snapshots.
///
/// Used to gate the `flush()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayChanges {
    pub keys_changed: bool,
    pub status_changed: bool,
    pub frame_changed: bool,
}

impl DisplayChanges {
    /// Diff two states line by line.
    pub fn detect(old: &DisplayState, new: &DisplayState) -> Self {
        Self {
            keys_changed: old.input_bits != new.input_bits,
            status_changed: old.first_note != new.first_note || old.volume != new.volume,
            frame_changed: old.last_frame != new.last_frame,
        }
    }

    /// Everything changed; used for the first frame.
    pub fn all() -> Self {
        Self {
            keys_changed: true,
            status_changed: true,
            frame_changed: true,
        }
    }

    pub fn any_changed(&self) -> bool {
        self.keys_changed || self.status_changed || self.frame_changed
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Render a [`DisplayState`] to a display buffer using `embedded-graphics`.
///
/// # Layout
///
/// ```text
/// ┌────────────────────────────────┐
/// │ Keys 0FFF                      │  ← keys_line_y
/// │ C# Vol 6          P4 9         │  ← status_line_y
/// └────────────────────────────────┘
///                     ↑ frame_x
/// ```
pub fn render_display<D>(
    display: &mut D,
    state: &DisplayState,
    config: &DisplayConfig,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let text_style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);

    Text::new(&state.keys_line(), Point::new(0, config.keys_line_y), text_style).draw(display)?;
    Text::new(&state.status_line(), Point::new(0, config.status_line_y), text_style)
        .draw(display)?;

    if let Some(frame) = state.frame_text() {
        Text::new(&frame, Point::new(config.frame_x, config.status_line_y), text_style)
            .draw(display)?;
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use keynode::InputSnapshot;

    /// Counts lit pixels and remembers the rightmost one.
    struct PixelCounter {
        lit: usize,
        max_x: i32,
    }

    impl PixelCounter {
        fn new() -> Self {
            Self { lit: 0, max_x: -1 }
        }
    }

    impl OriginDimensions for PixelCounter {
        fn size(&self) -> Size {
            Size::new(128, 32)
        }
    }

    impl DrawTarget for PixelCounter {
        type Color = BinaryColor;
        type Error = Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            for Pixel(point, color) in pixels {
                if color == BinaryColor::On {
                    self.lit += 1;
                    self.max_x = self.max_x.max(point.x);
                }
            }
            Ok(())
        }
    }

    fn shared(bits: u32, frame: Option<[u8; 8]>) -> SharedState {
        SharedState {
            inputs: InputSnapshot::from_bits(bits),
            step_size: 0,
            last_received: frame,
        }
    }

    #[test]
    fn idle_keyboard_lines() {
        let state = DisplayState::from_shared(&shared(0xFFFF_FFFF, None), 0, KeyPolarity::ActiveLow);
        assert_eq!(state.keys_line().as_str(), "Keys FFFF");
        assert_eq!(state.status_line().as_str(), "-  Vol 0");
        assert!(state.frame_text().is_none());
    }

    #[test]
    fn first_pressed_key_is_named() {
        // Keys 1 and 4 down (active low).
        let bits = 0xFFFF_FFFF & !(1 << 1) & !(1 << 4);
        let state = DisplayState::from_shared(&shared(bits, None), 6, KeyPolarity::ActiveLow);
        assert_eq!(state.first_note, Some(1));
        assert_eq!(state.keys_line().as_str(), "Keys FFED");
        assert_eq!(state.status_line().as_str(), "C# Vol 6");
    }

    #[test]
    fn active_high_polarity() {
        let state = DisplayState::from_shared(&shared(1 << 11, None), 8, KeyPolarity::ActiveHigh);
        assert_eq!(state.status_line().as_str(), "B  Vol 8");
    }

    #[test]
    fn frame_text_formats_kind_octave_note() {
        let frame = [b'P', 4, 9, 0, 0, 0, 0, 0];
        let state = DisplayState::from_shared(&shared(0, Some(frame)), 0, KeyPolarity::ActiveLow);
        assert_eq!(state.frame_text().unwrap().as_str(), "P4 9");

        let junk = [0x01, 200, 255, 0, 0, 0, 0, 0];
        let state = DisplayState::from_shared(&shared(0, Some(junk)), 0, KeyPolarity::ActiveLow);
        assert_eq!(state.frame_text().unwrap().as_str(), "?200 255");
    }

    #[test]
    fn changes_are_detected_per_line() {
        let a = DisplayState::from_shared(&shared(0xFFFF, None), 4, KeyPolarity::ActiveLow);
        let b = DisplayState { volume: 5, ..a };
        let changes = DisplayChanges::detect(&a, &b);
        assert!(!changes.keys_changed);
        assert!(changes.status_changed);
        assert!(!changes.frame_changed);
        assert!(changes.any_changed());

        assert!(!DisplayChanges::detect(&a, &a).any_changed());
        assert!(DisplayChanges::all().any_changed());
    }

    #[test]
    fn frame_is_drawn_right_of_frame_x() {
        let config = DisplayConfig::default();

        let without = DisplayState::from_shared(&shared(0xFFFF, None), 8, KeyPolarity::ActiveLow);
        let mut target = PixelCounter::new();
        render_display(&mut target, &without, &config).unwrap();
        assert!(target.lit > 0);
        assert!(target.max_x < config.frame_x);

        let with = DisplayState {
            last_frame: Some([b'R', 4, 3]),
            ..without
        };
        let mut target = PixelCounter::new();
        render_display(&mut target, &with, &config).unwrap();
        assert!(target.max_x >= config.frame_x);
    }

    #[test]
    fn default_config_values() {
        let c = DisplayConfig::default();
        assert_eq!(c.update_frequency_hz, 10);
        assert_eq!(c.display_width, 128);
        assert_eq!(c.display_height, 32);
        assert_eq!(c.frame_x, 66);
        assert_eq!(c.update_period_ms(), 100);
    }

    #[test]
    fn update_period_never_divides_by_zero() {
        let c = DisplayConfig {
            update_frequency_hz: 0,
            ..DisplayConfig::default()
        };
        assert_eq!(c.update_period_ms(), 1000);
    }
}
