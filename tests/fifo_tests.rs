//! FIFO transfer layer integration tests
//!
//! Covers the chunked windowed read path, the write/readback verification
//! and the error reporting contract through the public device API.

use sx127x_rs::constants::{
    DEFAULT_FOSC, REG_LORA_FIFOADDRPTR, REG_LORA_FIFOTXBASEADDR, REG_LORA_PAYLOADLENGTH,
    REG_LORA_RXCURRENTADDR, REG_LORA_RXNBBYTES,
};
use sx127x_rs::sx127x::fifo::WriteVerify;
use sx127x_rs::sx127x::hal::mock::{MockBus, Transaction};
use sx127x_rs::Sx127x;

#[test]
fn packet_write_programs_registers_and_verifies() {
    let bus = MockBus::new();
    let device = Sx127x::attach(bus.clone(), DEFAULT_FOSC).unwrap();
    let payload: Vec<u8> = (0..100).collect();

    let verify = device.fifo_write_packet(&payload).unwrap();
    assert!(matches!(verify, WriteVerify::Verified));

    assert_eq!(bus.reg(REG_LORA_FIFOTXBASEADDR), 0);
    assert_eq!(bus.reg(REG_LORA_PAYLOADLENGTH), 100);
    assert_eq!(bus.fifo_contents(0, 100), payload);
}

#[test]
fn forced_mismatch_is_a_warning_not_a_failure() {
    let bus = MockBus::new();
    let device = Sx127x::attach(bus.clone(), DEFAULT_FOSC).unwrap();
    bus.set_corrupt_fifo_writes(true);

    // the write still reports success; the mismatch is carried alongside
    let verify = device.fifo_write_packet(&[1, 2, 3, 4]).unwrap();
    assert!(matches!(verify, WriteVerify::Mismatch));
}

#[test]
fn chunked_read_reassembles_across_windows() {
    let bus = MockBus::new().with_max_transfer(32);
    let device = Sx127x::attach(bus.clone(), DEFAULT_FOSC).unwrap();

    let payload: Vec<u8> = (0u8..=199).collect();
    bus.set_reg(REG_LORA_RXCURRENTADDR, 0x10);
    bus.set_reg(REG_LORA_RXNBBYTES, 200);
    bus.load_fifo(0x10, &payload);
    bus.clear_transactions();

    let mut buf = [0u8; 256];
    let read = device.fifo_read_packet(&mut buf);
    assert!(read.status.is_ok());
    assert_eq!(read.len, 200);
    assert_eq!(&buf[..200], payload.as_slice());

    // 200 bytes at 32 bytes per window needs 7 transfers, each preceded by
    // a pointer write
    let ptr_writes: Vec<u8> = bus
        .transactions()
        .iter()
        .filter_map(|t| match t {
            Transaction::Write { addr, data } if *addr == REG_LORA_FIFOADDRPTR => Some(data[0]),
            _ => None,
        })
        .collect();
    assert_eq!(
        ptr_writes,
        vec![0x10, 0x30, 0x50, 0x70, 0x90, 0xB0, 0xD0]
    );

    let window_lens: Vec<usize> = bus
        .transactions()
        .iter()
        .filter_map(|t| match t {
            Transaction::Read { addr, len } if *addr == 0x00 => Some(*len),
            _ => None,
        })
        .collect();
    assert_eq!(window_lens, vec![32, 32, 32, 32, 32, 32, 8]);
}

#[test]
fn read_abort_reports_announced_length() {
    let bus = MockBus::new().with_max_transfer(16);
    let device = Sx127x::attach(bus.clone(), DEFAULT_FOSC).unwrap();

    bus.set_reg(REG_LORA_RXNBBYTES, 48);
    // fail the second window's transfer: addr read, count read, then
    // (pointer write, window read) pairs
    bus.fail_transaction(5);

    let mut buf = [0u8; 256];
    let read = device.fifo_read_packet(&mut buf);
    assert!(read.status.is_err());
    assert_eq!(read.len, 48);
}

#[test]
fn write_and_read_back_through_the_same_fifo() {
    let bus = MockBus::new().with_max_transfer(16);
    let device = Sx127x::attach(bus.clone(), DEFAULT_FOSC).unwrap();

    let payload = b"the quick brown fox jumps over the lazy dog";
    let verify = device.fifo_write_packet(payload).unwrap();
    assert!(matches!(verify, WriteVerify::Verified));

    // stage the receive-side registers as the modem would after reception
    bus.set_reg(REG_LORA_RXCURRENTADDR, 0);
    bus.set_reg(REG_LORA_RXNBBYTES, payload.len() as u8);

    let mut buf = [0u8; 256];
    let read = device.fifo_read_packet(&mut buf);
    assert!(read.status.is_ok());
    assert_eq!(&buf[..read.len], payload.as_slice());
}
