//! # FIFO Transfer Layer
//!
//! The SX127x exposes its 256-byte packet buffer through a single FIFO port
//! register and an address pointer. Reads are windowed: the bus bounds every
//! transfer, so a packet is pulled in chunks, reprogramming the pointer for
//! each window. Writes go out as one bulk transaction and are immediately
//! read back and compared; a mismatch is a diagnostic, not a retried
//! operation.

use crate::error::Sx127xError;
use crate::sx127x::hal::{Hal, HalError};
use crate::sx127x::regs;

/// Outcome of the mandatory post-write readback verification
#[derive(Debug)]
pub enum WriteVerify {
    /// Readback matched the transmitted payload byte for byte
    Verified,
    /// Readback completed but differed from the payload; logged, non-fatal
    Mismatch,
    /// The readback transfer itself failed, so no comparison was possible
    CompareFailed(HalError),
}

/// Result of a windowed packet read.
///
/// `len` always carries the full packet length the status registers
/// announced, even when `status` reports that a window transfer failed
/// part-way through.
#[derive(Debug)]
pub struct FifoRead {
    pub len: usize,
    pub status: Result<(), Sx127xError>,
}

/// Pull the most recently received packet out of the FIFO.
///
/// Reads the packet start address and byte count from the status registers,
/// then transfers the payload in windows no larger than the bus maximum,
/// programming the FIFO address pointer before each window. The first bus
/// error aborts the loop; the announced length is reported either way.
pub fn read_packet<B: Hal>(bus: &mut B, buf: &mut [u8]) -> FifoRead {
    let pktstart = match regs::read(bus, regs::LORA_RXCURRENTADDR) {
        Ok(v) => v,
        Err(e) => {
            return FifoRead {
                len: 0,
                status: Err(e.into()),
            }
        }
    };
    let rxbytes = match regs::read(bus, regs::LORA_RXNBBYTES) {
        Ok(v) => v as usize,
        Err(e) => {
            return FifoRead {
                len: 0,
                status: Err(e.into()),
            }
        }
    };

    let maxtransfer = bus.max_transfer_size();
    let want = rxbytes.min(buf.len());
    let mut status = Ok(());
    let mut off = 0;
    while off < want {
        let readlen = maxtransfer.min(want - off);
        let fifoaddr = pktstart.wrapping_add(off as u8);

        if let Err(e) = regs::write(bus, regs::LORA_FIFOADDRPTR, fifoaddr) {
            status = Err(e.into());
            break;
        }
        if let Err(e) = bus.write_then_read(&[regs::FIFO.addr()], &mut buf[off..off + readlen]) {
            status = Err(e.into());
            break;
        }
        off += readlen;
    }

    FifoRead {
        len: rxbytes,
        status,
    }
}

/// Write a packet into the FIFO and verify it by reading it back.
///
/// Programs the TX base address and address pointer to zero, sets the payload
/// length register, then issues one bulk write prefixed by the write-marked
/// FIFO address. The pointer is reset again and the same number of bytes read
/// back; the comparison outcome is carried in the success value so a
/// diagnostic mismatch never masks a completed write.
pub fn write_packet<B: Hal>(bus: &mut B, payload: &[u8]) -> Result<WriteVerify, Sx127xError> {
    regs::write(bus, regs::LORA_FIFOTXBASEADDR, 0)?;
    regs::write(bus, regs::LORA_FIFOADDRPTR, 0)?;
    regs::write(bus, regs::LORA_PAYLOADLENGTH, payload.len() as u8)?;

    let mut tx = Vec::with_capacity(payload.len() + 1);
    tx.push(regs::FIFO.write_addr());
    tx.extend_from_slice(payload);
    bus.write(&tx)?;

    regs::write(bus, regs::LORA_FIFOADDRPTR, 0)?;
    let mut readback = vec![0u8; payload.len()];
    if let Err(e) = bus.write_then_read(&[regs::FIFO.addr()], &mut readback) {
        log::warn!("fifo readback transfer failed: {e}");
        return Ok(WriteVerify::CompareFailed(e));
    }

    if readback != payload {
        log::error!(
            "fifo readback doesn't match: wrote {}, read {}",
            hex::encode(payload),
            hex::encode(&readback)
        );
        return Ok(WriteVerify::Mismatch);
    }
    Ok(WriteVerify::Verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{REG_LORA_FIFOADDRPTR, REG_LORA_RXCURRENTADDR, REG_LORA_RXNBBYTES};
    use crate::sx127x::hal::mock::{MockBus, Transaction};

    #[test]
    fn write_round_trips_and_verifies() {
        let mut bus = MockBus::new();
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let verify = write_packet(&mut bus, &payload).unwrap();
        assert!(matches!(verify, WriteVerify::Verified));
        assert_eq!(bus.fifo_contents(0, 4), payload.to_vec());
        assert_eq!(bus.reg(crate::constants::REG_LORA_PAYLOADLENGTH), 4);
    }

    #[test]
    fn corrupted_transfer_reports_mismatch_not_error() {
        let mut bus = MockBus::new();
        bus.set_corrupt_fifo_writes(true);
        let verify = write_packet(&mut bus, &[1, 2, 3]).unwrap();
        assert!(matches!(verify, WriteVerify::Mismatch));
    }

    #[test]
    fn failed_readback_is_distinguishable_from_mismatch() {
        let mut bus = MockBus::new();
        // transactions: base, ptr, length, bulk write, ptr, readback
        bus.fail_transaction(5);
        let verify = write_packet(&mut bus, &[1, 2, 3]).unwrap();
        assert!(matches!(verify, WriteVerify::CompareFailed(_)));
    }

    #[test]
    fn read_windows_by_max_transfer_size() {
        let mut bus = MockBus::new().with_max_transfer(16);
        let payload: Vec<u8> = (0..40).collect();
        bus.set_reg(REG_LORA_RXCURRENTADDR, 0x20);
        bus.set_reg(REG_LORA_RXNBBYTES, 40);
        bus.load_fifo(0x20, &payload);
        bus.clear_transactions();

        let mut buf = [0u8; 256];
        let read = read_packet(&mut bus, &mut buf);
        assert!(read.status.is_ok());
        assert_eq!(read.len, 40);
        assert_eq!(&buf[..40], payload.as_slice());

        let ptr_writes: Vec<u8> = bus
            .transactions()
            .iter()
            .filter_map(|t| match t {
                Transaction::Write { addr, data } if *addr == REG_LORA_FIFOADDRPTR => {
                    Some(data[0])
                }
                _ => None,
            })
            .collect();
        assert_eq!(ptr_writes, vec![0x20, 0x30, 0x40]);
    }

    #[test]
    fn aborted_read_still_reports_announced_length() {
        let mut bus = MockBus::new().with_max_transfer(16);
        bus.set_reg(REG_LORA_RXCURRENTADDR, 0);
        bus.set_reg(REG_LORA_RXNBBYTES, 40);
        // transactions: addr read, count read, ptr write, window read, ptr write ...
        bus.fail_transaction(4);

        let mut buf = [0u8; 256];
        let read = read_packet(&mut bus, &mut buf);
        assert!(read.status.is_err());
        assert_eq!(read.len, 40);
    }
}
