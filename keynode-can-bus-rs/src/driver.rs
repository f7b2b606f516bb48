//! The seam between the transmit path and the bus peripheral.
//!
//! The firmware implements [`BusTransmit`] over its CAN peripheral; tests
//! implement it with a recorder.

use keynode::RawFrame;

/// Hands one frame to a free hardware mailbox.
///
/// The transmit path only calls this while it holds a mailbox permit, so
/// an implementation may assume a mailbox is free and report an error if
/// the hardware disagrees. It must not wait for the frame to go out on the
/// wire: completion is signalled separately through
/// [`TxPath::on_transmit_complete`](crate::TxPath::on_transmit_complete).
#[allow(async_fn_in_trait)]
pub trait BusTransmit {
    type Error;

    async fn transmit(&mut self, id: u16, frame: &RawFrame) -> Result<(), Self::Error>;
}
