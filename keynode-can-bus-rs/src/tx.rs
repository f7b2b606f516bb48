//! Outbound path: message queue and mailbox accounting.

use core::sync::atomic::{AtomicUsize, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::semaphore::{GreedySemaphore, Semaphore};
use keynode::{NoteMessage, NoteSink};

use crate::driver::BusTransmit;
use crate::error::BusError;

/// Queue of outbound note messages, gated by free hardware mailboxes.
///
/// Producers call [`submit`](Self::submit) or
/// [`try_submit`](Self::try_submit). A single [`transmit_task`] pulls
/// messages off in FIFO order and waits for a mailbox permit before each
/// one. The transmit-complete interrupt returns permits with
/// [`on_transmit_complete`](Self::on_transmit_complete).
///
/// Every method takes `&self`, so the path lives in a `static`.
pub struct TxPath<M: RawMutex, const N: usize> {
    queue: Channel<M, NoteMessage, N>,
    mailboxes: GreedySemaphore<M>,
    in_flight: AtomicUsize,
    mailbox_count: usize,
}

impl<M: RawMutex, const N: usize> TxPath<M, N> {
    /// Create an empty path with `mailbox_count` free mailboxes.
    pub const fn new(mailbox_count: usize) -> Self {
        Self {
            queue: Channel::new(),
            mailboxes: GreedySemaphore::new(mailbox_count),
            in_flight: AtomicUsize::new(0),
            mailbox_count,
        }
    }

    // -----------------------------------------------------------------------
    // Producer side
    // -----------------------------------------------------------------------

    /// Queue `message`, waiting for a free slot if the queue is full.
    pub async fn submit(&self, message: NoteMessage) {
        self.queue.send(message).await;
    }

    /// Queue `message` without waiting.
    ///
    /// # Errors
    /// [`BusError::QueueFull`] if all `N` slots are taken; the message is
    /// dropped.
    pub fn try_submit(&self, message: NoteMessage) -> Result<(), BusError> {
        self.queue.try_send(message).map_err(|_| BusError::QueueFull)
    }

    /// Messages queued but not yet handed to the driver.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    // -----------------------------------------------------------------------
    // Interrupt side
    // -----------------------------------------------------------------------

    /// Return `completed` mailboxes to the pool.
    ///
    /// Never waits, so it is safe to call from the transmit-complete
    /// interrupt. Completions beyond the frames actually in flight are
    /// ignored, so the pool never exceeds the mailbox count.
    pub fn on_transmit_complete(&self, completed: usize) {
        let freed = match self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n - completed.min(n))
            }) {
            Ok(previous) | Err(previous) => completed.min(previous),
        };
        if freed > 0 {
            self.mailboxes.release(freed);
        }
    }

    /// Mailboxes not currently holding a frame.
    pub fn free_mailboxes(&self) -> usize {
        self.mailbox_count - self.in_flight.load(Ordering::Acquire).min(self.mailbox_count)
    }

    // -----------------------------------------------------------------------
    // Consumer side
    // -----------------------------------------------------------------------

    /// Wait for the next message and a free mailbox, then hand the message
    /// to `driver` under `id`.
    ///
    /// # Errors
    /// [`BusError::Driver`] if the driver rejects the frame. The mailbox is
    /// given back at once and the message is dropped.
    pub async fn transmit_next<D: BusTransmit>(
        &self,
        driver: &mut D,
        id: u16,
    ) -> Result<NoteMessage, BusError<D::Error>> {
        let message = self.queue.receive().await;

        let permit = match self.mailboxes.acquire(1).await {
            Ok(permit) => permit,
            Err(never) => match never {},
        };
        // Count the frame before the driver sees it so an early completion
        // interrupt finds it.
        permit.disarm();
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        if let Err(e) = driver.transmit(id, &message.to_bytes()).await {
            self.on_transmit_complete(1);
            return Err(BusError::Driver(e));
        }

        Ok(message)
    }
}

impl<M: RawMutex, const N: usize> NoteSink for TxPath<M, N> {
    async fn submit(&self, message: NoteMessage) {
        TxPath::submit(self, message).await;
    }
}

/// Outbound message loop.
///
/// This is a regular `async fn`, not an Embassy `#[task]`; wrap it in a
/// concrete task in the firmware. Driver errors are logged and the loop
/// carries on with the next message.
pub async fn transmit_task<M, D, const N: usize>(tx: &TxPath<M, N>, mut driver: D, id: u16) -> !
where
    M: RawMutex,
    D: BusTransmit,
    D::Error: core::fmt::Debug,
{
    #[cfg(feature = "defmt")]
    defmt::info!("Transmit task started (id {=u16:#X})", id);

    loop {
        match tx.transmit_next(&mut driver, id).await {
            Ok(_message) => {
                #[cfg(feature = "defmt")]
                defmt::trace!("Sent {}", _message);
            }
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Dropped outbound message: {}", defmt::Debug2Format(&_e));
            }
        }
    }
}
