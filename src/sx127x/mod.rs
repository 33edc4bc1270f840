//! # SX127x Driver Core
//!
//! The layers of the transceiver driver, leaves first:
//!
//! - [`hal`]: the bus abstraction the whole driver is written against, plus
//!   a register-file mock for tests
//! - [`regs`]: logical register identifiers and the 8/16/24-bit codec
//! - [`opmode`]: the modulation/operating-mode state model and its
//!   transition legality rules
//! - [`device`]: the per-device context and the configuration command layer
//! - [`fifo`]: windowed packet reads and verified packet writes against the
//!   chip's FIFO
//! - [`queue`]: the framed packet queue between completion engine and reader
//! - [`poll`]: the three polling state machines that emulate interrupt
//!   driven completion, and the scheduler that steps them
//! - [`handle`]: the blocking single-consumer read/write/command surface

pub mod device;
pub mod fifo;
pub mod hal;
pub mod handle;
pub mod opmode;
pub mod poll;
pub mod queue;
pub mod regs;

pub use device::{CodingRate, PaOutput, Sx127x};
pub use handle::{Command, Sx127xHandle};
pub use opmode::{Modulation, OpMode};
pub use queue::{Packet, PacketHeader};
