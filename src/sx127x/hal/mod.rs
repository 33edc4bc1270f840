//! # Hardware Abstraction Layer for the SX127x Bus
//!
//! This module defines the HAL trait the register codec is built on. The
//! SX127x exposes a register-addressed SPI protocol: every transaction is a
//! one-byte address (write transactions with bit 7 set) followed by data
//! bytes. Platform implementations provide the raw transfers; the mock
//! implementation in [`mock`] simulates the chip's register file for tests.

use thiserror::Error;

/// Errors that can occur during HAL operations
#[derive(Debug, Error)]
pub enum HalError {
    #[error("SPI communication error")]
    Spi,

    #[error("GPIO operation error")]
    Gpio,

    #[error("Timeout waiting for operation")]
    Timeout,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Hardware Abstraction Layer trait for SX127x bus access
pub trait Hal: Send {
    /// Write `tx` to the bus, then read `rx.len()` bytes in the same
    /// transaction
    fn write_then_read(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), HalError>;

    /// Write `tx` to the bus as a single transaction
    fn write(&mut self, tx: &[u8]) -> Result<(), HalError>;

    /// Largest number of bytes a single transfer may carry
    fn max_transfer_size(&self) -> usize;

    /// Hard-reset the radio module through its reset line
    fn reset(&mut self) -> Result<(), HalError>;
}

// Register-file mock for tests
pub mod mock;

pub use mock::MockBus;
