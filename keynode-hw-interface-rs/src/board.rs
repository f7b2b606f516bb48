//! Key matrix and output multiplexer of the keyboard module.
//!
//! Three address lines (RA0..RA2) plus an enable (REN) select one row of the
//! matrix, or one bit of the output multiplexer latch. Four column inputs
//! read the selected row.

use embassy_stm32::gpio::{Input, Output};
use embassy_time::{block_for, Duration};
use keynode::KeyMatrix;

/// Settle time between selecting a row and sampling the columns.
const ROW_SETTLE: Duration = Duration::from_micros(3);

/// Width of the REN strobe that latches an output multiplexer bit.
const LATCH_PULSE: Duration = Duration::from_micros(2);

// ---------------------------------------------------------------------------
// Output multiplexer bits
// ---------------------------------------------------------------------------

/// Display power enable (active high).
pub const DEN_BIT: u8 = 3;
/// Display reset (active low).
pub const DRST_BIT: u8 = 4;

pub struct Board {
    address: [Output<'static>; 3],
    enable: Output<'static>,
    mux_out: Output<'static>,
    columns: [Input<'static>; 4],
}

impl Board {
    pub fn new(
        address: [Output<'static>; 3],
        enable: Output<'static>,
        mux_out: Output<'static>,
        columns: [Input<'static>; 4],
    ) -> Self {
        Self {
            address,
            enable,
            mux_out,
            columns,
        }
    }

    fn drive_address(&mut self, index: u8) {
        for (bit, pin) in self.address.iter_mut().enumerate() {
            pin.set_level((index & (1 << bit) != 0).into());
        }
    }

    /// Latch `value` into output multiplexer bit `bit`.
    pub fn set_out_mux_bit(&mut self, bit: u8, value: bool) {
        self.enable.set_low();
        self.drive_address(bit);
        self.mux_out.set_level(value.into());
        self.enable.set_high();
        block_for(LATCH_PULSE);
        self.enable.set_low();
    }

    /// Pulse the display reset line and switch the display supply on.
    pub fn power_up_display(&mut self) {
        self.set_out_mux_bit(DRST_BIT, false);
        block_for(LATCH_PULSE);
        self.set_out_mux_bit(DRST_BIT, true);
        self.set_out_mux_bit(DEN_BIT, true);
    }
}

impl KeyMatrix for Board {
    fn select_row(&mut self, row: u8) {
        self.enable.set_low();
        self.drive_address(row);
        self.enable.set_high();
        block_for(ROW_SETTLE);
    }

    fn read_columns(&mut self) -> u8 {
        self.columns
            .iter()
            .enumerate()
            .fold(0, |acc, (col, pin)| if pin.is_high() { acc | 1 << col } else { acc })
    }
}
