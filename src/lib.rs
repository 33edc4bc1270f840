//! # sx127x-rs - A Rust Crate for Semtech SX127x Radio Control
//!
//! The sx127x-rs crate implements the control logic for the Semtech SX127x
//! family of LoRa/FSK/OOK sub-GHz transceivers, accessed over a
//! register-addressed SPI bus.
//!
//! ## Features
//!
//! - Register codec for 8/16/24-bit transactions with bank-tagged addresses
//! - Modulation and operating-mode state machine enforcing the hardware's
//!   transition rules (bank bit only in sleep, RX modes per family)
//! - Configuration command layer: sync word, IQ inversion, CRC, carrier
//!   frequency, spreading factor, power amplifier path
//! - Chunked FIFO packet transfers with mandatory readback verification
//! - Event-driven transmit/receive/channel-activity completion built from
//!   polling state machines on a shared scheduler
//! - Blocking single-consumer read/write interface fed by a framed packet
//!   queue
//! - Keyed registry for multi-device setups
//!
//! ## Usage
//!
//! To use the sx127x-rs crate in your Rust project, add the following to
//! your Cargo.toml file:
//!
//! ```toml
//! [dependencies]
//! sx127x-rs = "1.0"
//! ```
//!
//! Then attach a radio through your platform's bus implementation:
//!
//! ```rust,no_run
//! use sx127x_rs::{attach, open, Command, Modulation, OpMode};
//! # use sx127x_rs::sx127x::hal::MockBus;
//!
//! # fn main() -> Result<(), sx127x_rs::Sx127xError> {
//! let device = attach(MockBus::new(), 32_000_000)?;
//! let handle = open(device)?;
//!
//! handle.command(Command::SetOpmode(OpMode::Sleep))?;
//! handle.command(Command::SetModulation(Modulation::Lora))?;
//! handle.command(Command::SetCarrierFrequency(868_000_000))?;
//! handle.command(Command::SetOpmode(OpMode::RxContinuous))?;
//!
//! let mut buf = [0u8; 512];
//! let n = handle.read(&mut buf, None)?;
//! println!("received frame: {}", hex::encode(&buf[..n]));
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod device_manager;
pub mod error;
pub mod logging;
pub mod sx127x;

pub use crate::error::Sx127xError;
pub use crate::logging::{init_logger, log_info};

// Core radio types
pub use device_manager::Sx127xDeviceManager;
pub use sx127x::device::{CodingRate, PaOutput, Sx127x};
pub use sx127x::handle::{Command, Sx127xHandle};
pub use sx127x::opmode::{Modulation, OpMode};
pub use sx127x::poll::{shared_scheduler, IrqFlags, Scheduler, ThreadScheduler};
pub use sx127x::queue::{Packet, PacketHeader};

use sx127x::hal::Hal;
use std::sync::Arc;

/// Attach a radio on the given bus.
///
/// # Arguments
/// * `bus` - Platform bus implementation carrying the SPI transfers
/// * `fosc` - Reference oscillator frequency in Hz (typically 32_000_000)
///
/// # Returns
/// * `Ok(Arc<Sx127x>)` - Attached device, asleep and version-checked
/// * `Err(Sx127xError)` - Reset, version check or initial sleep failed
pub fn attach<B: Hal>(bus: B, fosc: u64) -> Result<Arc<Sx127x<B>>, Sx127xError> {
    Sx127x::attach(bus, fosc)
}

/// Open the blocking consumer interface of an attached device, polling on
/// the process-wide shared scheduler.
///
/// # Arguments
/// * `device` - Device previously returned by [`attach`]
///
/// # Returns
/// * `Ok(Sx127xHandle)` - Exclusive consumer handle
/// * `Err(Sx127xError::Busy)` - The device already has a consumer
pub fn open<B: Hal + 'static>(device: Arc<Sx127x<B>>) -> Result<Sx127xHandle<B>, Sx127xError> {
    Sx127xHandle::open(device, shared_scheduler())
}
