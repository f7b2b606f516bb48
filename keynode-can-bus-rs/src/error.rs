//! Error types for the bus paths.

use core::convert::Infallible;
use core::fmt;

/// Errors that can occur when handing a message to the bus.
///
/// `E` is the driver's own error type. Paths that never touch the driver
/// use the default, [`Infallible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError<E = Infallible> {
    /// The bus peripheral rejected the frame.
    Driver(E),

    /// The transmit queue has no free slot.
    QueueFull,
}

// Allow ergonomic `?` propagation from raw driver errors.
impl<E> From<E> for BusError<E> {
    fn from(error: E) -> Self {
        BusError::Driver(error)
    }
}

impl<E: fmt::Debug> fmt::Display for BusError<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BusError::Driver(e) => write!(f, "CAN driver error: {:?}", e),
            BusError::QueueFull => write!(f, "Transmit queue full"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<E: defmt::Format> defmt::Format for BusError<E> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            BusError::Driver(e) => defmt::write!(f, "CAN driver error: {}", e),
            BusError::QueueFull => defmt::write!(f, "Transmit queue full"),
        }
    }
}
