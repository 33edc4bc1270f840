//! # Device Context and Command Layer
//!
//! [`Sx127x`] owns everything attached to one radio: the bus handle, the
//! oscillator frequency, the cached operating mode and bank-select flag, the
//! single-consumer exclusivity flag, the transmit-completion flag and the
//! packet queue. One mutex serializes every register access and state
//! change; the two condition variables wake the blocking read and write
//! consumers.
//!
//! The command layer implements the configuration surface as read-modify-
//! write operations that enforce the hardware's legality rules before
//! touching the mode register: LoRa-bank registers are gated on the cached
//! bank flag, the bank bit itself only changes while the radio sleeps, and
//! the receive modes stay inside their modulation family. Cached state is
//! updated inside the same locked section as the register write that makes
//! it true.

use crate::constants::*;
use crate::error::Sx127xError;
use crate::sx127x::fifo::{self, FifoRead, WriteVerify};
use crate::sx127x::hal::Hal;
use crate::sx127x::opmode::{transition_allowed, Modulation, OpMode};
use crate::sx127x::queue::PacketQueue;
use crate::sx127x::regs;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Power amplifier output path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaOutput {
    /// RFO pin, lower maximum output power
    Rfo,
    /// PA_BOOST pin, up to +17 dBm
    PaBoost,
}

impl fmt::Display for PaOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaOutput::Rfo => "rfo",
            PaOutput::PaBoost => "paboost",
        };
        write!(f, "{name}")
    }
}

/// LoRa forward error correction rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingRate {
    Cr4of5,
    Cr4of6,
    Cr4of7,
    Cr4of8,
}

impl fmt::Display for CodingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodingRate::Cr4of5 => "4/5",
            CodingRate::Cr4of6 => "4/6",
            CodingRate::Cr4of7 => "4/7",
            CodingRate::Cr4of8 => "4/8",
        };
        write!(f, "{name}")
    }
}

/// Everything the device lock protects
pub struct DeviceState<B: Hal> {
    pub(crate) bus: B,
    pub(crate) fosc: u64,
    /// Last operating mode requested through the command surface
    pub(crate) opmode: OpMode,
    /// Which register bank the hardware currently exposes
    pub(crate) lora_regmap: bool,
    /// Single-consumer exclusivity flag
    pub(crate) open: bool,
    /// Set by the transmit machine when TX-done is observed
    pub(crate) transmitted: bool,
    pub(crate) queue: PacketQueue,
}

impl<B: Hal> DeviceState<B> {
    /// Read the chip version register.
    pub fn get_chipversion(&mut self) -> Result<u8, Sx127xError> {
        Ok(regs::read(&mut self.bus, regs::VERSION)?)
    }

    /// Decode the active modulation from the mode register.
    pub fn get_modulation(&mut self) -> Result<Modulation, Sx127xError> {
        let reg = regs::read(&mut self.bus, regs::OPMODE)?;
        Modulation::from_reg(reg)
    }

    /// Decode the current operating mode from the mode register.
    ///
    /// Fails when the modulation itself is unreadable or invalid, since the
    /// RX mode encodings cannot be resolved without it.
    pub fn get_opmode(&mut self) -> Result<OpMode, Sx127xError> {
        let modulation = self.get_modulation()?;
        let reg = regs::read(&mut self.bus, regs::OPMODE)?;
        OpMode::from_reg(reg, modulation)
    }

    /// Switch the operating mode, enforcing the modulation family rule.
    pub fn set_opmode(&mut self, target: OpMode) -> Result<(), Sx127xError> {
        let current = self.get_opmode()?;
        let modulation = self.get_modulation()?;

        if current == target {
            self.opmode = target;
            return Ok(());
        }

        if !transition_allowed(modulation, target) {
            return Err(Sx127xError::IllegalTransition(format!(
                "opmode {target} is not reachable under {modulation} modulation"
            )));
        }

        log::info!("setting opmode to {target}");

        let mut reg = regs::read(&mut self.bus, regs::OPMODE)?;
        reg &= !OPMODE_MODE_MASK;
        reg |= target.mode_bits();
        regs::write(&mut self.bus, regs::OPMODE, reg)?;
        self.opmode = target;
        Ok(())
    }

    /// Switch the modulation, enforcing the sleep-only bank-bit rule.
    pub fn set_modulation(&mut self, target: Modulation) -> Result<(), Sx127xError> {
        let current_opmode = self.get_opmode()?;
        let current = self.get_modulation()?;

        if current == target {
            return Ok(());
        }

        // crossing into or out of LoRa flips the bank-select bit
        let crosses_bank = current.is_lora() || target.is_lora();
        if crosses_bank && current_opmode != OpMode::Sleep {
            return Err(Sx127xError::IllegalTransition(format!(
                "modulation change to {target} requires sleep mode, device is {current_opmode}"
            )));
        }

        log::info!("setting modulation to {target}");

        let mut reg = regs::read(&mut self.bus, regs::OPMODE)?;
        reg &= !OPMODE_MODULATIONTYPE_MASK;
        if crosses_bank {
            reg &= !OPMODE_LONGRANGEMODE_MASK;
        }
        match target {
            Modulation::Fsk => {
                if crosses_bank {
                    reg |= OPMODE_LONGRANGEMODE_FSK_OOK;
                }
                reg |= OPMODE_MODULATIONTYPE_FSK;
            }
            Modulation::Ook => {
                if crosses_bank {
                    reg |= OPMODE_LONGRANGEMODE_FSK_OOK;
                }
                reg |= OPMODE_MODULATIONTYPE_OOK;
            }
            Modulation::Lora => {
                reg |= OPMODE_LONGRANGEMODE_LORA;
            }
        }
        regs::write(&mut self.bus, regs::OPMODE, reg)?;
        self.lora_regmap = target.is_lora();
        Ok(())
    }

    fn require_lora_bank(&self, what: &str) -> Result<(), Sx127xError> {
        if self.lora_regmap {
            Ok(())
        } else {
            Err(Sx127xError::InvalidArgument(format!(
                "{what} requires the LoRa register bank"
            )))
        }
    }

    /// Program the LoRa sync word.
    pub fn set_syncword(&mut self, syncword: u8) -> Result<(), Sx127xError> {
        self.require_lora_bank("syncword")?;
        log::info!("setting syncword to 0x{syncword:02X}");
        Ok(regs::write(&mut self.bus, regs::LORA_SYNCWORD, syncword)?)
    }

    /// Read back the LoRa sync word.
    pub fn get_syncword(&mut self) -> Result<u8, Sx127xError> {
        self.require_lora_bank("syncword")?;
        Ok(regs::read(&mut self.bus, regs::LORA_SYNCWORD)?)
    }

    /// Enable or disable IQ inversion. A request matching the current state
    /// is a no-op.
    pub fn set_invertiq(&mut self, invert: bool) -> Result<(), Sx127xError> {
        self.require_lora_bank("invertiq")?;
        log::info!("setting invertiq to {invert}");

        let mut reg = regs::read(&mut self.bus, regs::LORA_INVERTIQ)?;
        if reg & INVERTIQ_INVERTIQ != 0 {
            if invert {
                return Ok(());
            }
            reg &= !INVERTIQ_INVERTIQ;
        } else {
            if !invert {
                return Ok(());
            }
            reg |= INVERTIQ_INVERTIQ;
        }
        Ok(regs::write(&mut self.bus, regs::LORA_INVERTIQ, reg)?)
    }

    /// Read back the IQ inversion state.
    pub fn get_invertiq(&mut self) -> Result<bool, Sx127xError> {
        self.require_lora_bank("invertiq")?;
        let reg = regs::read(&mut self.bus, regs::LORA_INVERTIQ)?;
        Ok(reg & INVERTIQ_INVERTIQ != 0)
    }

    /// Enable or disable payload CRC checking. A request matching the
    /// current state is a no-op.
    pub fn set_crc(&mut self, crc: bool) -> Result<(), Sx127xError> {
        self.require_lora_bank("crc")?;
        log::info!("setting crc to {crc}");

        let mut reg = regs::read(&mut self.bus, regs::LORA_MODEMCONFIG1)?;
        if reg & MODEMCONFIG1_RXPAYLOADCRCON != 0 {
            if crc {
                return Ok(());
            }
            reg &= !MODEMCONFIG1_RXPAYLOADCRCON;
        } else {
            if !crc {
                return Ok(());
            }
            reg |= MODEMCONFIG1_RXPAYLOADCRCON;
        }
        Ok(regs::write(&mut self.bus, regs::LORA_MODEMCONFIG1, reg)?)
    }

    /// Read back the payload CRC enable bit.
    pub fn get_crc(&mut self) -> Result<bool, Sx127xError> {
        self.require_lora_bank("crc")?;
        let reg = regs::read(&mut self.bus, regs::LORA_MODEMCONFIG1)?;
        Ok(reg & MODEMCONFIG1_RXPAYLOADCRCON != 0)
    }

    /// Program the carrier frequency in Hz.
    ///
    /// The register value is `freq * 2^19 / f_osc`; no bounds validation
    /// beyond the conversion itself.
    pub fn set_carrierfrequency(&mut self, freq: u64) -> Result<(), Sx127xError> {
        log::info!("setting carrier frequency to {freq}");
        let frf = freq * FRF_DIVIDER / self.fosc;
        Ok(regs::write24(&mut self.bus, regs::FRFMSB, frf as u32)?)
    }

    /// Read back the carrier frequency in Hz via the inverse conversion.
    pub fn get_carrierfrequency(&mut self) -> Result<u64, Sx127xError> {
        let frf = regs::read24(&mut self.bus, regs::FRFMSB)? as u64;
        Ok(frf * self.fosc / FRF_DIVIDER)
    }

    /// Program the LoRa spreading factor, range 6 to 12.
    ///
    /// SF6 requires the detection-optimization field set to 0x5; every other
    /// spreading factor uses 0x3.
    pub fn set_sf(&mut self, sf: u8) -> Result<(), Sx127xError> {
        if !(6..=12).contains(&sf) {
            return Err(Sx127xError::InvalidArgument(format!(
                "spreading factor {sf} outside 6..=12"
            )));
        }

        log::info!("setting spreading factor to {sf}");

        let mut reg = regs::read(&mut self.bus, regs::LORA_MODEMCONFIG2)?;
        reg &= !MODEMCONFIG2_SPREADINGFACTOR_MASK;
        reg |= sf << MODEMCONFIG2_SPREADINGFACTOR_SHIFT;
        regs::write(&mut self.bus, regs::LORA_MODEMCONFIG2, reg)?;

        let mut reg = regs::read(&mut self.bus, regs::LORA_DETECTOPTIMIZATION)?;
        reg &= !DETECTOPTIMIZATION_DETECTIONOPTIMIZE_MASK;
        reg |= if sf == 6 {
            DETECTIONOPTIMIZE_SF6
        } else {
            DETECTIONOPTIMIZE_SF7_TO_SF12
        };
        Ok(regs::write(
            &mut self.bus,
            regs::LORA_DETECTOPTIMIZATION,
            reg,
        )?)
    }

    /// Read back the spreading factor.
    pub fn get_sf(&mut self) -> Result<u8, Sx127xError> {
        let reg = regs::read(&mut self.bus, regs::LORA_MODEMCONFIG2)?;
        Ok(reg >> MODEMCONFIG2_SPREADINGFACTOR_SHIFT)
    }

    /// Select the power amplifier output path.
    pub fn set_paoutput(&mut self, pa: PaOutput) -> Result<(), Sx127xError> {
        log::info!("setting pa output to {pa}");
        let mut reg = regs::read(&mut self.bus, regs::PACONFIG)?;
        match pa {
            PaOutput::Rfo => reg &= !PACONFIG_PASELECT,
            PaOutput::PaBoost => reg |= PACONFIG_PASELECT,
        }
        Ok(regs::write(&mut self.bus, regs::PACONFIG, reg)?)
    }

    /// Read back the power amplifier output path.
    pub fn get_paoutput(&mut self) -> Result<PaOutput, Sx127xError> {
        let reg = regs::read(&mut self.bus, regs::PACONFIG)?;
        Ok(if reg & PACONFIG_PASELECT != 0 {
            PaOutput::PaBoost
        } else {
            PaOutput::Rfo
        })
    }

    /// Current output power in dBm, derived from the PA configuration.
    pub fn get_outputpower(&mut self) -> Result<i8, Sx127xError> {
        let reg = regs::read(&mut self.bus, regs::PACONFIG)?;
        let max = if reg & PACONFIG_PASELECT != 0 {
            17
        } else {
            ((reg & PACONFIG_MAXPOWER_MASK) >> PACONFIG_MAXPOWER_SHIFT) as i8
        };
        Ok(max - (15 - (reg & PACONFIG_OUTPUTPOWER_MASK) as i8))
    }

    /// Signal bandwidth in Hz from the modem configuration.
    pub fn get_bandwidth(&mut self) -> Result<u32, Sx127xError> {
        let reg = regs::read(&mut self.bus, regs::LORA_MODEMCONFIG1)?;
        let idx = reg >> MODEMCONFIG1_BW_SHIFT;
        if idx > MODEMCONFIG1_BW_MAX {
            return Err(Sx127xError::InvalidState(format!(
                "bandwidth index {idx} out of table"
            )));
        }
        Ok(LORA_BANDWIDTH_HZ[idx as usize])
    }

    /// Coding rate from the modem configuration.
    pub fn get_codingrate(&mut self) -> Result<CodingRate, Sx127xError> {
        let reg = regs::read(&mut self.bus, regs::LORA_MODEMCONFIG1)?;
        let cr = (reg & MODEMCONFIG1_CODINGRATE_MASK) >> MODEMCONFIG1_CODINGRATE_SHIFT;
        match cr {
            1 => Ok(CodingRate::Cr4of5),
            2 => Ok(CodingRate::Cr4of6),
            3 => Ok(CodingRate::Cr4of7),
            4 => Ok(CodingRate::Cr4of8),
            other => Err(Sx127xError::InvalidState(format!(
                "coding rate encoding {other} out of range"
            ))),
        }
    }

    /// Whether implicit header mode is active.
    pub fn get_implicitheader(&mut self) -> Result<bool, Sx127xError> {
        let reg = regs::read(&mut self.bus, regs::LORA_MODEMCONFIG1)?;
        Ok(reg & MODEMCONFIG1_IMPLICITHEADERMODEON != 0)
    }

    /// Pull the most recently received packet from the FIFO.
    pub fn fifo_read_packet(&mut self, buf: &mut [u8]) -> FifoRead {
        fifo::read_packet(&mut self.bus, buf)
    }

    /// Write a packet into the FIFO with readback verification.
    pub fn fifo_write_packet(&mut self, payload: &[u8]) -> Result<WriteVerify, Sx127xError> {
        fifo::write_packet(&mut self.bus, payload)
    }
}

/// One attached SX127x radio.
///
/// All register access and state-model reads/writes serialize on the
/// internal mutex; the condition variables carry single-device-scoped
/// wakeups for the blocking reader and writer.
pub struct Sx127x<B: Hal> {
    pub(crate) state: Mutex<DeviceState<B>>,
    /// Signaled when the packet queue becomes non-empty
    pub(crate) read_ready: Condvar,
    /// Signaled when the transmitted flag is set
    pub(crate) write_done: Condvar,
}

impl<B: Hal> fmt::Debug for Sx127x<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sx127x").finish_non_exhaustive()
    }
}

impl<B: Hal> Sx127x<B> {
    /// Attach a radio on the given bus.
    ///
    /// Resets the module, verifies the chip version, and puts the radio to
    /// sleep. Any failure here is fatal to bring-up; everything acquired so
    /// far is released on drop.
    pub fn attach(mut bus: B, fosc: u64) -> Result<Arc<Self>, Sx127xError> {
        bus.reset()?;

        let mut state = DeviceState {
            bus,
            fosc,
            opmode: OpMode::Sleep,
            lora_regmap: false,
            open: false,
            transmitted: false,
            queue: PacketQueue::new(PACKET_QUEUE_CAPACITY),
        };

        let version = state.get_chipversion()?;
        if version != CHIP_VERSION {
            return Err(Sx127xError::InvalidState(format!(
                "unknown chip version 0x{version:02X}"
            )));
        }

        state.lora_regmap = state.get_modulation()?.is_lora();
        state.set_opmode(OpMode::Sleep)?;

        log::info!("sx127x chip version 0x{version:02X} attached");

        Ok(Arc::new(Self {
            state: Mutex::new(state),
            read_ready: Condvar::new(),
            write_done: Condvar::new(),
        }))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DeviceState<B>> {
        self.state.lock().unwrap()
    }

    /// Last operating mode requested through the command surface.
    pub fn cached_opmode(&self) -> OpMode {
        self.lock().opmode
    }

    /// Whether the LoRa register bank is active, per the cached flag.
    pub fn lora_bank_active(&self) -> bool {
        self.lock().lora_regmap
    }

    pub fn get_chipversion(&self) -> Result<u8, Sx127xError> {
        self.lock().get_chipversion()
    }

    pub fn get_modulation(&self) -> Result<Modulation, Sx127xError> {
        self.lock().get_modulation()
    }

    pub fn get_opmode(&self) -> Result<OpMode, Sx127xError> {
        self.lock().get_opmode()
    }

    pub fn set_opmode(&self, target: OpMode) -> Result<(), Sx127xError> {
        self.lock().set_opmode(target)
    }

    pub fn set_modulation(&self, target: Modulation) -> Result<(), Sx127xError> {
        self.lock().set_modulation(target)
    }

    pub fn set_syncword(&self, syncword: u8) -> Result<(), Sx127xError> {
        self.lock().set_syncword(syncword)
    }

    pub fn get_syncword(&self) -> Result<u8, Sx127xError> {
        self.lock().get_syncword()
    }

    pub fn set_invertiq(&self, invert: bool) -> Result<(), Sx127xError> {
        self.lock().set_invertiq(invert)
    }

    pub fn get_invertiq(&self) -> Result<bool, Sx127xError> {
        self.lock().get_invertiq()
    }

    pub fn set_crc(&self, crc: bool) -> Result<(), Sx127xError> {
        self.lock().set_crc(crc)
    }

    pub fn get_crc(&self) -> Result<bool, Sx127xError> {
        self.lock().get_crc()
    }

    pub fn set_carrierfrequency(&self, freq: u64) -> Result<(), Sx127xError> {
        self.lock().set_carrierfrequency(freq)
    }

    pub fn get_carrierfrequency(&self) -> Result<u64, Sx127xError> {
        self.lock().get_carrierfrequency()
    }

    pub fn set_sf(&self, sf: u8) -> Result<(), Sx127xError> {
        self.lock().set_sf(sf)
    }

    pub fn get_sf(&self) -> Result<u8, Sx127xError> {
        self.lock().get_sf()
    }

    pub fn set_paoutput(&self, pa: PaOutput) -> Result<(), Sx127xError> {
        self.lock().set_paoutput(pa)
    }

    pub fn get_paoutput(&self) -> Result<PaOutput, Sx127xError> {
        self.lock().get_paoutput()
    }

    pub fn get_outputpower(&self) -> Result<i8, Sx127xError> {
        self.lock().get_outputpower()
    }

    pub fn get_bandwidth(&self) -> Result<u32, Sx127xError> {
        self.lock().get_bandwidth()
    }

    pub fn get_codingrate(&self) -> Result<CodingRate, Sx127xError> {
        self.lock().get_codingrate()
    }

    pub fn get_implicitheader(&self) -> Result<bool, Sx127xError> {
        self.lock().get_implicitheader()
    }

    pub fn fifo_write_packet(&self, payload: &[u8]) -> Result<WriteVerify, Sx127xError> {
        self.lock().fifo_write_packet(payload)
    }

    pub fn fifo_read_packet(&self, buf: &mut [u8]) -> FifoRead {
        self.lock().fifo_read_packet(buf)
    }
}
