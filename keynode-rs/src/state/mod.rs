//! Shared state between the scan task, the message decoder, the display
//! and the audio routine.
//!
//! # Locking discipline
//!
//! [`StateStore`] wraps [`SharedState`] in one Embassy mutex. Every task
//! reads and writes through it, and no `.await` happens while the guard is
//! held, so the lock is only ever held for a handful of field copies.
//!
//! The audio routine runs at the sample rate and must never wait, so it
//! does not lock at all. It reads the step size from a [`StepCell`] that
//! the store updates inside the same critical section as the locked copy.

mod snapshot;
mod store;

pub use snapshot::{InputSnapshot, KeyPolarity};
pub use store::{SharedState, StateStore, StepCell};
