//! Mock bus implementation for testing
//!
//! This module provides a mock SX127x bus that simulates the chip's register
//! file and FIFO, so the register codec, command layer and completion engine
//! can be tested without actual hardware.
//!
//! The simulation follows the wire protocol: a transaction starts with one
//! address byte (bit 7 set for writes) and transfers data bytes against the
//! addressed register. Multi-byte transfers auto-increment the register
//! address, except for the FIFO port which advances the FIFO address pointer
//! instead.

use crate::constants::{REG_FIFO, REG_LORA_FIFOADDRPTR, REG_LORA_IRQFLAGS, REG_OPMODE, REG_VERSION};
use crate::sx127x::hal::{Hal, HalError};
use std::sync::{Arc, Mutex};

/// A single bus transaction as observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    /// Register write: 7-bit address and the data bytes that followed it
    Write { addr: u8, data: Vec<u8> },
    /// Register read: 7-bit address and the number of bytes clocked out
    Read { addr: u8, len: usize },
    /// Module reset through the reset line
    Reset,
}

#[derive(Debug)]
struct MockBusInner {
    regs: [u8; 128],
    fifo: [u8; 256],
    max_transfer: usize,
    /// Countdown until an injected failure; `Some(0)` fails the next transaction
    fail_in: Option<usize>,
    /// Flip the last byte of every FIFO-port write, to force readback mismatches
    corrupt_fifo_writes: bool,
    /// Value the version register reports after reset
    version: u8,
    log: Vec<Transaction>,
}

impl MockBusInner {
    fn reset_registers(&mut self) {
        self.regs = [0; 128];
        self.fifo = [0; 256];
        // power-on defaults: standby mode, FSK modulation
        self.regs[REG_OPMODE as usize] = 0x01;
        self.regs[REG_VERSION as usize] = self.version;
    }

    fn take_fault(&mut self) -> Result<(), HalError> {
        match self.fail_in {
            Some(0) => {
                self.fail_in = None;
                Err(HalError::Spi)
            }
            Some(n) => {
                self.fail_in = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn fifo_ptr(&self) -> u8 {
        self.regs[REG_LORA_FIFOADDRPTR as usize]
    }

    fn advance_fifo_ptr(&mut self, by: usize) {
        let ptr = self.regs[REG_LORA_FIFOADDRPTR as usize];
        self.regs[REG_LORA_FIFOADDRPTR as usize] = ptr.wrapping_add(by as u8);
    }
}

/// Mock bus that simulates the SX127x register file and FIFO
#[derive(Debug, Clone)]
pub struct MockBus {
    inner: Arc<Mutex<MockBusInner>>,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    pub fn new() -> Self {
        let mut inner = MockBusInner {
            regs: [0; 128],
            fifo: [0; 256],
            max_transfer: 64,
            fail_in: None,
            corrupt_fifo_writes: false,
            version: 0x22,
            log: Vec::new(),
        };
        inner.reset_registers();
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Limit the number of bytes a single transfer may carry
    pub fn with_max_transfer(self, max_transfer: usize) -> Self {
        self.inner.lock().unwrap().max_transfer = max_transfer;
        self
    }

    /// Report a different chip version, surviving module resets
    pub fn with_version(self, version: u8) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.version = version;
            inner.regs[REG_VERSION as usize] = version;
        }
        self
    }

    /// Fail the `n`-th transaction from now with an SPI error (0 = next)
    pub fn fail_transaction(&self, n: usize) {
        self.inner.lock().unwrap().fail_in = Some(n);
    }

    /// Read a register directly, bypassing the bus protocol
    pub fn reg(&self, addr: u8) -> u8 {
        self.inner.lock().unwrap().regs[(addr & 0x7F) as usize]
    }

    /// Write a register directly, bypassing the bus protocol
    pub fn set_reg(&self, addr: u8, value: u8) {
        self.inner.lock().unwrap().regs[(addr & 0x7F) as usize] = value;
    }

    /// Set interrupt flag bits, as the modem would on a radio event
    pub fn raise_irq(&self, flags: u8) {
        let mut inner = self.inner.lock().unwrap();
        inner.regs[REG_LORA_IRQFLAGS as usize] |= flags;
    }

    /// Copy bytes into the FIFO at the given offset
    pub fn load_fifo(&self, offset: u8, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        for (i, b) in data.iter().enumerate() {
            inner.fifo[(offset as usize + i) % 256] = *b;
        }
    }

    /// Read back a FIFO window
    pub fn fifo_contents(&self, offset: u8, len: usize) -> Vec<u8> {
        let inner = self.inner.lock().unwrap();
        (0..len)
            .map(|i| inner.fifo[(offset as usize + i) % 256])
            .collect()
    }

    /// Corrupt the last byte of every subsequent FIFO-port write, simulating a
    /// transfer fault the readback verification should catch
    pub fn set_corrupt_fifo_writes(&self, corrupt: bool) {
        self.inner.lock().unwrap().corrupt_fifo_writes = corrupt;
    }

    /// All transactions observed so far
    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.lock().unwrap().log.clone()
    }

    /// Forget the transaction log
    pub fn clear_transactions(&self) {
        self.inner.lock().unwrap().log.clear();
    }
}

impl Hal for MockBus {
    fn write_then_read(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), HalError> {
        let mut inner = self.inner.lock().unwrap();
        inner.take_fault()?;

        if tx.len() != 1 {
            return Err(HalError::InvalidConfig(format!(
                "read transaction with {} address bytes",
                tx.len()
            )));
        }
        let addr = tx[0] & 0x7F;
        inner.log.push(Transaction::Read {
            addr,
            len: rx.len(),
        });

        if addr == REG_FIFO {
            let ptr = inner.fifo_ptr();
            for (i, b) in rx.iter_mut().enumerate() {
                *b = inner.fifo[(ptr as usize + i) % 256];
            }
            inner.advance_fifo_ptr(rx.len());
        } else {
            for (i, b) in rx.iter_mut().enumerate() {
                *b = inner.regs[(addr as usize + i) % 128];
            }
        }
        Ok(())
    }

    fn write(&mut self, tx: &[u8]) -> Result<(), HalError> {
        let mut inner = self.inner.lock().unwrap();
        inner.take_fault()?;

        if tx.is_empty() || tx[0] & 0x80 == 0 {
            return Err(HalError::InvalidConfig(
                "write transaction without write marker".into(),
            ));
        }
        let addr = tx[0] & 0x7F;
        let data = &tx[1..];
        inner.log.push(Transaction::Write {
            addr,
            data: data.to_vec(),
        });

        if addr == REG_FIFO {
            let ptr = inner.fifo_ptr();
            let corrupt = inner.corrupt_fifo_writes;
            for (i, b) in data.iter().enumerate() {
                let slot = (ptr as usize + i) % 256;
                inner.fifo[slot] = if corrupt && i == data.len() - 1 {
                    *b ^ 0xFF
                } else {
                    *b
                };
            }
            inner.advance_fifo_ptr(data.len());
        } else {
            for (i, b) in data.iter().enumerate() {
                let slot = (addr as usize + i) % 128;
                if slot == REG_LORA_IRQFLAGS as usize {
                    // interrupt flags are write-1-to-clear
                    inner.regs[slot] &= !*b;
                } else {
                    inner.regs[slot] = *b;
                }
            }
        }
        Ok(())
    }

    fn max_transfer_size(&self) -> usize {
        self.inner.lock().unwrap().max_transfer
    }

    fn reset(&mut self) -> Result<(), HalError> {
        let mut inner = self.inner.lock().unwrap();
        inner.take_fault()?;
        inner.log.push(Transaction::Reset);
        inner.reset_registers();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_write_and_readback() {
        let mut bus = MockBus::new();
        bus.write(&[0x80 | 0x39, 0x34]).unwrap();
        let mut val = [0u8; 1];
        bus.write_then_read(&[0x39], &mut val).unwrap();
        assert_eq!(val[0], 0x34);
    }

    #[test]
    fn burst_write_auto_increments() {
        let mut bus = MockBus::new();
        bus.write(&[0x80 | 0x06, 0xD9, 0x00, 0x00]).unwrap();
        assert_eq!(bus.reg(0x06), 0xD9);
        assert_eq!(bus.reg(0x07), 0x00);
    }

    #[test]
    fn fifo_access_tracks_address_pointer() {
        let mut bus = MockBus::new();
        bus.set_reg(REG_LORA_FIFOADDRPTR, 0x10);
        bus.write(&[0x80, 0xAA, 0xBB]).unwrap();
        assert_eq!(bus.fifo_contents(0x10, 2), vec![0xAA, 0xBB]);
        assert_eq!(bus.reg(REG_LORA_FIFOADDRPTR), 0x12);
    }

    #[test]
    fn injected_fault_fires_once() {
        let mut bus = MockBus::new();
        bus.fail_transaction(0);
        assert!(bus.write(&[0x80 | 0x39, 0x00]).is_err());
        assert!(bus.write(&[0x80 | 0x39, 0x00]).is_ok());
    }
}
