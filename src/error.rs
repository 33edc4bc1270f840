//! # SX127x Error Handling
//!
//! This module defines the Sx127xError enum, which represents the different
//! error types that can occur in the sx127x-rs crate.

use crate::sx127x::hal::HalError;
use thiserror::Error;

/// Represents the different error types that can occur in the SX127x crate.
#[derive(Debug, Error)]
pub enum Sx127xError {
    /// Indicates a register transaction failure, propagated unmodified from
    /// the bus. Never retried by the core.
    #[error("Bus error: {0}")]
    Bus(#[from] HalError),

    /// Indicates the device state could not be read or holds an encoding the
    /// driver does not recognize.
    #[error("Invalid device state: {0}")]
    InvalidState(String),

    /// Indicates a caller supplied an out-of-range or inapplicable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Indicates a request that the hardware state machine forbids, such as a
    /// bank-bit change outside sleep or an RX mode outside its modulation
    /// family.
    #[error("Illegal transition: {0}")]
    IllegalTransition(String),

    /// Indicates a second concurrent open attempt on a device.
    #[error("Device is busy")]
    Busy,

    /// Indicates a deadline-bounded operation did not complete in time.
    #[error("Operation timed out")]
    Timeout,

    /// Indicates a command the device accepts but does not implement.
    #[error("Operation not supported")]
    Unsupported,

    /// Indicates the packet queue has no room for a complete packet.
    #[error("Packet queue is full")]
    QueueFull,
}
