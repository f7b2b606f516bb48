//! Bus-level constants shared by every module on the keyboard bus.

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Standard identifier used by every module, and the only one accepted.
pub const DEFAULT_BUS_ID: u16 = 0x123;

/// Largest 11-bit standard identifier.
pub const STANDARD_ID_MAX: u16 = 0x7FF;

// ---------------------------------------------------------------------------
// Queue sizing
// ---------------------------------------------------------------------------

/// Outbound queue depth. At most 12 key edges per scan cycle, so this
/// covers three cycles of a stalled bus.
pub const TX_QUEUE_LEN: usize = 36;

/// Inbound queue depth.
pub const RX_QUEUE_LEN: usize = 36;

/// Hardware transmit mailboxes on the bxCAN peripheral.
pub const MAILBOX_COUNT: usize = 3;
