//! SX127x Register Map and Driver Constants
//!
//! This module defines the bit-exact register addresses, field masks and
//! driver limits for the Semtech SX127x transceiver family, as used by the
//! register codec and the command layer.

use std::time::Duration;

// ----------------------------------------------------------------------------
// Register addresses (7-bit, bank tagging is applied by the register codec)
// ----------------------------------------------------------------------------

/// FIFO read/write port
pub const REG_FIFO: u8 = 0x00;

/// Operating mode / modulation register
pub const REG_OPMODE: u8 = 0x01;

/// Carrier frequency, most significant byte
pub const REG_FRFMSB: u8 = 0x06;

/// Carrier frequency, middle byte
pub const REG_FRFMID: u8 = 0x07;

/// Carrier frequency, least significant byte
pub const REG_FRFLSB: u8 = 0x08;

/// Power amplifier configuration
pub const REG_PACONFIG: u8 = 0x09;

/// Chip version (reads 0x22 on supported silicon)
pub const REG_VERSION: u8 = 0x42;

// LoRa-bank register addresses

/// LoRa sync word
pub const REG_LORA_SYNCWORD: u8 = 0x39;

/// LoRa IQ inversion control
pub const REG_LORA_INVERTIQ: u8 = 0x33;

/// LoRa modem configuration 1 (bandwidth, coding rate, header, CRC)
pub const REG_LORA_MODEMCONFIG1: u8 = 0x1D;

/// LoRa modem configuration 2 (spreading factor)
pub const REG_LORA_MODEMCONFIG2: u8 = 0x1E;

/// LoRa detection optimization
pub const REG_LORA_DETECTOPTIMIZATION: u8 = 0x31;

/// Start address of the last received packet in the FIFO
pub const REG_LORA_RXCURRENTADDR: u8 = 0x10;

/// Interrupt mask register
pub const REG_LORA_IRQFLAGSMSK: u8 = 0x11;

/// Interrupt flags register
pub const REG_LORA_IRQFLAGS: u8 = 0x12;

/// Number of bytes of the last received packet
pub const REG_LORA_RXNBBYTES: u8 = 0x13;

/// FIFO address pointer
pub const REG_LORA_FIFOADDRPTR: u8 = 0x0D;

/// FIFO transmit base address
pub const REG_LORA_FIFOTXBASEADDR: u8 = 0x0E;

/// SNR of the last received packet (signed, quarter-dB units)
pub const REG_LORA_PKTSNRVALUE: u8 = 0x19;

/// RSSI of the last received packet (dBm, -157 offset)
pub const REG_LORA_PKTRSSIVALUE: u8 = 0x1A;

/// Transmit payload length
pub const REG_LORA_PAYLOADLENGTH: u8 = 0x22;

// ----------------------------------------------------------------------------
// Interrupt flag bits (REG_LORA_IRQFLAGS / REG_LORA_IRQFLAGSMSK)
// ----------------------------------------------------------------------------

/// Channel activity detected during a CAD scan
pub const IRQFLAGS_CADDETECTED: u8 = 0x1 << 0;

/// Channel activity detection completed
pub const IRQFLAGS_CADDONE: u8 = 0x1 << 2;

/// Packet transmission completed
pub const IRQFLAGS_TXDONE: u8 = 0x1 << 3;

/// Payload CRC validation failed
pub const IRQFLAGS_PAYLOADCRCERROR: u8 = 0x1 << 5;

/// Packet reception completed
pub const IRQFLAGS_RXDONE: u8 = 0x1 << 6;

// ----------------------------------------------------------------------------
// Operating mode register fields (REG_OPMODE)
// ----------------------------------------------------------------------------

/// Long range (LoRa) mode select bit; only mutable while asleep
pub const OPMODE_LONGRANGEMODE_MASK: u8 = 0x1 << 7;

/// Long range mode value for FSK/OOK
pub const OPMODE_LONGRANGEMODE_FSK_OOK: u8 = 0x0 << 7;

/// Long range mode value for LoRa
pub const OPMODE_LONGRANGEMODE_LORA: u8 = 0x1 << 7;

/// Modulation type field (FSK/OOK only)
pub const OPMODE_MODULATIONTYPE_MASK: u8 = 0x3 << 5;

/// Modulation type value for FSK
pub const OPMODE_MODULATIONTYPE_FSK: u8 = 0x0 << 5;

/// Modulation type value for OOK
pub const OPMODE_MODULATIONTYPE_OOK: u8 = 0x1 << 5;

/// Operating mode field
pub const OPMODE_MODE_MASK: u8 = 0x7;

pub const OPMODE_MODE_SLEEP: u8 = 0x0;
pub const OPMODE_MODE_STANDBY: u8 = 0x1;
pub const OPMODE_MODE_FSTX: u8 = 0x2;
pub const OPMODE_MODE_TX: u8 = 0x3;
pub const OPMODE_MODE_FSRX: u8 = 0x4;
/// 0x5 decodes as plain RX under FSK/OOK and RX-continuous under LoRa
pub const OPMODE_MODE_RX: u8 = 0x5;
pub const OPMODE_MODE_RXCONTINUOUS: u8 = 0x5;
pub const OPMODE_MODE_RXSINGLE: u8 = 0x6;
pub const OPMODE_MODE_CAD: u8 = 0x7;

// ----------------------------------------------------------------------------
// LoRa modem configuration fields
// ----------------------------------------------------------------------------

/// Bandwidth field (ModemConfig1)
pub const MODEMCONFIG1_BW_MASK: u8 = 0x3 << 6;
pub const MODEMCONFIG1_BW_SHIFT: u8 = 6;

/// Largest valid bandwidth index
pub const MODEMCONFIG1_BW_MAX: u8 = 2;

/// Signal bandwidth in Hz by register index
pub const LORA_BANDWIDTH_HZ: [u32; 3] = [125_000, 250_000, 500_000];

/// Coding rate field (ModemConfig1), valid values 1..=4 (4/5 .. 4/8)
pub const MODEMCONFIG1_CODINGRATE_MASK: u8 = 0x7 << 3;
pub const MODEMCONFIG1_CODINGRATE_SHIFT: u8 = 3;
pub const MODEMCONFIG1_CODINGRATE_MIN: u8 = 1;
pub const MODEMCONFIG1_CODINGRATE_MAX: u8 = 4;

/// Implicit header mode bit (ModemConfig1)
pub const MODEMCONFIG1_IMPLICITHEADERMODEON: u8 = 0x1 << 2;

/// Receive payload CRC enable bit (ModemConfig1)
pub const MODEMCONFIG1_RXPAYLOADCRCON: u8 = 0x1 << 1;

/// Spreading factor field (ModemConfig2)
pub const MODEMCONFIG2_SPREADINGFACTOR_MASK: u8 = 0xF << 4;
pub const MODEMCONFIG2_SPREADINGFACTOR_SHIFT: u8 = 4;

/// Detection optimization field (DetectOptimization)
pub const DETECTOPTIMIZATION_DETECTIONOPTIMIZE_MASK: u8 = 0x7;

/// Detection optimization value required for SF6
pub const DETECTIONOPTIMIZE_SF6: u8 = 0x5;

/// Detection optimization value for SF7 through SF12
pub const DETECTIONOPTIMIZE_SF7_TO_SF12: u8 = 0x3;

/// IQ inversion bit (InvertIQ)
pub const INVERTIQ_INVERTIQ: u8 = 0x1 << 6;

// ----------------------------------------------------------------------------
// Power amplifier configuration fields (REG_PACONFIG)
// ----------------------------------------------------------------------------

/// Output path select bit: 0 = RFO pin, 1 = PA_BOOST pin
pub const PACONFIG_PASELECT: u8 = 0x1 << 7;

/// Max power field
pub const PACONFIG_MAXPOWER_MASK: u8 = 0x7 << 4;
pub const PACONFIG_MAXPOWER_SHIFT: u8 = 4;

/// Output power field
pub const PACONFIG_OUTPUTPOWER_MASK: u8 = 0xF;

// ----------------------------------------------------------------------------
// Driver limits
// ----------------------------------------------------------------------------

/// Chip version expected at attach time
pub const CHIP_VERSION: u8 = 0x22;

/// Default reference oscillator frequency in Hz
pub const DEFAULT_FOSC: u64 = 32_000_000;

/// Fixed-point divider of the frequency conversion (2^19)
pub const FRF_DIVIDER: u64 = 524_288;

/// Interval between completion engine polling steps
pub const POLLING_DELAY: Duration = Duration::from_millis(10);

/// Upper bound on a blocking transmit wait, per chunk
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest packet payload carried through the FIFO
pub const MAX_PACKET_SIZE: usize = 256;

/// Capacity of the per-device packet queue in bytes
pub const PACKET_QUEUE_CAPACITY: usize = 4096;
