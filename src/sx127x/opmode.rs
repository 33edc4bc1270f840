//! # Operating Mode and Modulation State Model
//!
//! The SX127x multiplexes its signaling scheme and its operating mode into a
//! single register. The modulation {FSK, OOK, LoRa} selects which register
//! bank is active and which receive modes exist; the operating mode walks the
//! radio through sleep, standby, the synthesizer states and the TX/RX/CAD
//! states.
//!
//! Two hardware rules shape the legality of transitions:
//!
//! - the LoRa bank-select bit may only change while the radio is asleep;
//! - the receive modes partition by modulation family: RX-continuous,
//!   RX-single and CAD exist only under LoRa, while the plain RX mode exists
//!   only under FSK/OOK (both families share the 0x5 mode encoding).

use crate::constants::*;
use crate::error::Sx127xError;
use std::fmt;

/// The radio's signaling scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    Fsk,
    Ook,
    Lora,
}

impl Modulation {
    /// Decode the modulation from a raw OpMode register value.
    ///
    /// Bit 7 selects LoRa; otherwise bits 6:5 select FSK or OOK. Any other
    /// encoding is rejected.
    pub fn from_reg(opmode_reg: u8) -> Result<Self, Sx127xError> {
        if opmode_reg & OPMODE_LONGRANGEMODE_MASK == OPMODE_LONGRANGEMODE_LORA {
            return Ok(Modulation::Lora);
        }
        match opmode_reg & OPMODE_MODULATIONTYPE_MASK {
            OPMODE_MODULATIONTYPE_FSK => Ok(Modulation::Fsk),
            OPMODE_MODULATIONTYPE_OOK => Ok(Modulation::Ook),
            other => Err(Sx127xError::InvalidState(format!(
                "unknown modulation encoding 0x{other:02X}"
            ))),
        }
    }

    pub fn is_lora(self) -> bool {
        self == Modulation::Lora
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modulation::Fsk => "fsk",
            Modulation::Ook => "ook",
            Modulation::Lora => "lora",
        };
        write!(f, "{name}")
    }
}

/// The radio's operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    /// Lowest power state; the only state in which the bank bit may change
    Sleep,
    /// Oscillator running, radio idle
    Standby,
    /// Frequency synthesis for transmit
    FsTx,
    /// Transmitting
    Tx,
    /// Frequency synthesis for receive
    FsRx,
    /// Continuous receive (FSK/OOK family)
    Rx,
    /// Continuous receive (LoRa family)
    RxContinuous,
    /// Single-packet receive (LoRa family)
    RxSingle,
    /// Channel activity detection (LoRa family)
    Cad,
}

impl OpMode {
    /// Decode the operating mode from a raw OpMode register value.
    ///
    /// The 0x5 pattern is ambiguous on the wire; the already-decoded
    /// modulation resolves it to RX-continuous (LoRa) or plain RX (FSK/OOK).
    pub fn from_reg(opmode_reg: u8, modulation: Modulation) -> Result<Self, Sx127xError> {
        let bits = opmode_reg & OPMODE_MODE_MASK;
        match bits {
            OPMODE_MODE_SLEEP => return Ok(OpMode::Sleep),
            OPMODE_MODE_STANDBY => return Ok(OpMode::Standby),
            OPMODE_MODE_FSTX => return Ok(OpMode::FsTx),
            OPMODE_MODE_TX => return Ok(OpMode::Tx),
            OPMODE_MODE_FSRX => return Ok(OpMode::FsRx),
            _ => {}
        }
        if modulation.is_lora() {
            match bits {
                OPMODE_MODE_RXCONTINUOUS => return Ok(OpMode::RxContinuous),
                OPMODE_MODE_RXSINGLE => return Ok(OpMode::RxSingle),
                OPMODE_MODE_CAD => return Ok(OpMode::Cad),
                _ => {}
            }
        } else if bits == OPMODE_MODE_RX {
            return Ok(OpMode::Rx);
        }
        Err(Sx127xError::InvalidState(format!(
            "mode encoding 0x{bits:02X} is not valid under {modulation} modulation"
        )))
    }

    /// The wire encoding of this mode (bits 2:0 of the OpMode register)
    pub fn mode_bits(self) -> u8 {
        match self {
            OpMode::Sleep => OPMODE_MODE_SLEEP,
            OpMode::Standby => OPMODE_MODE_STANDBY,
            OpMode::FsTx => OPMODE_MODE_FSTX,
            OpMode::Tx => OPMODE_MODE_TX,
            OpMode::FsRx => OPMODE_MODE_FSRX,
            OpMode::Rx => OPMODE_MODE_RX,
            OpMode::RxContinuous => OPMODE_MODE_RXCONTINUOUS,
            OpMode::RxSingle => OPMODE_MODE_RXSINGLE,
            OpMode::Cad => OPMODE_MODE_CAD,
        }
    }

    /// Whether a blocking read may be issued in this mode
    pub fn is_receiving(self) -> bool {
        matches!(self, OpMode::RxContinuous | OpMode::RxSingle)
    }
}

impl fmt::Display for OpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpMode::Sleep => "sleep",
            OpMode::Standby => "standby",
            OpMode::FsTx => "fstx",
            OpMode::Tx => "tx",
            OpMode::FsRx => "fsrx",
            OpMode::Rx => "rx",
            OpMode::RxContinuous => "rxcontinuous",
            OpMode::RxSingle => "rxsingle",
            OpMode::Cad => "cad",
        };
        write!(f, "{name}")
    }
}

/// Whether the given modulation family permits a transition to `target`.
///
/// The LoRa-only receive modes are forbidden under FSK/OOK and the plain RX
/// mode is forbidden under LoRa; everything else is reachable from any
/// family.
pub fn transition_allowed(modulation: Modulation, target: OpMode) -> bool {
    match (modulation, target) {
        (Modulation::Lora, OpMode::Rx) => false,
        (Modulation::Lora, _) => true,
        (_, OpMode::RxContinuous | OpMode::RxSingle | OpMode::Cad) => false,
        _ => true,
    }
}
