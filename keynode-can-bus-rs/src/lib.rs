//! CAN bus plumbing for the keynode keyboard module.
//!
//! Every module on the bus shares one standard identifier and exchanges
//! 8-byte note messages. This crate holds the two queues that sit between
//! the tasks and the bus peripheral:
//!
//! - **[`TxPath`]**: outbound queue plus a counting semaphore of free
//!   hardware mailboxes. The scanner submits into it; [`transmit_task`]
//!   drains it one mailbox at a time; the transmit-complete interrupt hands
//!   mailboxes back with [`TxPath::on_transmit_complete`].
//! - **[`RxPath`]**: inbound queue filled from the receive interrupt with
//!   [`RxPath::on_frame_received`], which never waits. It implements
//!   [`keynode::FrameSource`] for the message decoder.
//!
//! The peripheral itself stays behind the [`BusTransmit`] trait so the paths
//! run on the host in tests.
//!
//! # Quick start
//!
//! ```ignore
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use keynode_can_bus::{RxPath, TxPath, DEFAULT_BUS_ID, MAILBOX_COUNT, RX_QUEUE_LEN, TX_QUEUE_LEN};
//!
//! static TX_PATH: TxPath<CriticalSectionRawMutex, TX_QUEUE_LEN> = TxPath::new(MAILBOX_COUNT);
//! static RX_PATH: RxPath<CriticalSectionRawMutex, RX_QUEUE_LEN> = RxPath::new(DEFAULT_BUS_ID);
//!
//! // In the receive interrupt:
//! RX_PATH.on_frame_received(0x123, &[b'P', 4, 9]);
//! // In the transmit-complete interrupt:
//! TX_PATH.on_transmit_complete(1);
//! ```
//!
//! # Features
//!
//! - **`defmt`**: Enable [`defmt::Format`] implementations on the public
//!   types and log from [`transmit_task`].

#![cfg_attr(not(test), no_std)]

pub use driver::BusTransmit;
pub use error::BusError;
pub use protocol::{DEFAULT_BUS_ID, MAILBOX_COUNT, RX_QUEUE_LEN, STANDARD_ID_MAX, TX_QUEUE_LEN};
pub use rx::{RxOutcome, RxPath};
pub use tx::{transmit_task, TxPath};

mod driver;
mod error;
mod protocol;
mod rx;
mod tx;
