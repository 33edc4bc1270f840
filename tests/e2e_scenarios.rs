//! End-to-end scenarios
//!
//! Walks the full device lifecycle the way a consumer would: attach and
//! version check, modulation and mode configuration, reception through the
//! completion engine and the packet queue, transmission with readback
//! verification, release and reopen.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sx127x_rs::constants::{
    CHIP_VERSION, DEFAULT_FOSC, FRF_DIVIDER, IRQFLAGS_RXDONE, IRQFLAGS_TXDONE,
    REG_LORA_PKTRSSIVALUE, REG_LORA_PKTSNRVALUE, REG_LORA_RXCURRENTADDR, REG_LORA_RXNBBYTES,
};
use sx127x_rs::sx127x::hal::MockBus;
use sx127x_rs::{
    attach, Command, Modulation, OpMode, PaOutput, Packet, Scheduler, Sx127xError, Sx127xHandle,
    ThreadScheduler,
};

#[test]
fn receive_lifecycle() {
    let bus = MockBus::new();

    // attach: reset, version check, initial sleep
    let device = attach(bus.clone(), DEFAULT_FOSC).unwrap();
    assert_eq!(device.get_chipversion().unwrap(), CHIP_VERSION);
    assert_eq!(device.get_opmode().unwrap(), OpMode::Sleep);

    let scheduler: Arc<dyn Scheduler> = Arc::new(ThreadScheduler::new());
    let handle = Sx127xHandle::open(Arc::clone(&device), scheduler).unwrap();

    // configure: LoRa while asleep, then receive continuously
    handle
        .command(Command::SetModulation(Modulation::Lora))
        .unwrap();
    assert!(device.lora_bank_active());
    handle.command(Command::SetSf(7)).unwrap();
    handle.command(Command::SetSyncword(0x34)).unwrap();
    handle.command(Command::SetCrc(true)).unwrap();
    handle
        .command(Command::SetCarrierFrequency(868_100_000))
        .unwrap();
    handle
        .command(Command::SetOpmode(OpMode::RxContinuous))
        .unwrap();

    // the modem lands a packet with known signal metrics
    let modem = bus.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        modem.set_reg(REG_LORA_RXCURRENTADDR, 0x30);
        modem.set_reg(REG_LORA_RXNBBYTES, 11);
        modem.load_fifo(0x30, b"lora packet");
        modem.set_reg(REG_LORA_PKTSNRVALUE, 0xEC); // -5 dB in quarter-dB units
        modem.set_reg(REG_LORA_PKTRSSIVALUE, 37); // -120 dBm
        modem.raise_irq(IRQFLAGS_RXDONE);
    });

    let mut buf = [0u8; 512];
    let n = handle.read(&mut buf, Some(Duration::from_secs(5))).unwrap();
    let packet = Packet::parse(&buf[..n]).unwrap();
    assert_eq!(packet.payload, b"lora packet");
    assert_eq!(packet.header.snr, -20);
    assert_eq!(packet.header.rssi, -120);
    assert!(!packet.header.crc_fail);

    // the consumer drains exactly that packet, nothing more
    assert!(matches!(
        handle.read(&mut buf, Some(Duration::from_millis(80))),
        Err(Sx127xError::Timeout)
    ));
}

#[test]
fn transmit_lifecycle() {
    let bus = MockBus::new();
    let device = attach(bus.clone(), DEFAULT_FOSC).unwrap();
    let scheduler: Arc<dyn Scheduler> = Arc::new(ThreadScheduler::new());
    let handle = Sx127xHandle::open(Arc::clone(&device), scheduler).unwrap();

    handle
        .command(Command::SetModulation(Modulation::Lora))
        .unwrap();
    handle
        .command(Command::SetPaOutput(PaOutput::PaBoost))
        .unwrap();
    handle.command(Command::SetOpmode(OpMode::Tx)).unwrap();

    let modem = bus.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        modem.raise_irq(IRQFLAGS_TXDONE);
    });

    assert_eq!(handle.write(b"beacon").unwrap(), 6);
    assert_eq!(bus.fifo_contents(0, 6), b"beacon".to_vec());
    assert_eq!(device.get_paoutput().unwrap(), PaOutput::PaBoost);
}

#[test]
fn frequency_configuration_round_trips_through_hardware() {
    let device = attach(MockBus::new(), DEFAULT_FOSC).unwrap();
    let step = DEFAULT_FOSC / FRF_DIVIDER + 1;

    for freq in [433_000_000u64, 868_950_000, 915_000_000] {
        device.set_carrierfrequency(freq).unwrap();
        let read = device.get_carrierfrequency().unwrap();
        assert!(
            read.abs_diff(freq) <= step,
            "programmed {freq}, read back {read}"
        );
    }
}

#[test]
fn release_returns_the_radio_to_sleep_for_the_next_consumer() {
    let bus = MockBus::new();
    let device = attach(bus.clone(), DEFAULT_FOSC).unwrap();
    let scheduler: Arc<dyn Scheduler> = Arc::new(ThreadScheduler::new());

    let handle = Sx127xHandle::open(Arc::clone(&device), Arc::clone(&scheduler)).unwrap();
    handle
        .command(Command::SetModulation(Modulation::Lora))
        .unwrap();
    handle
        .command(Command::SetOpmode(OpMode::RxContinuous))
        .unwrap();
    handle.release();

    assert_eq!(device.get_opmode().unwrap(), OpMode::Sleep);

    // the device is reusable: a second consumer can claim it and the LoRa
    // configuration survives
    let handle = Sx127xHandle::open(Arc::clone(&device), scheduler).unwrap();
    assert!(device.lora_bank_active());
    handle
        .command(Command::SetOpmode(OpMode::RxSingle))
        .unwrap();
    assert_eq!(device.cached_opmode(), OpMode::RxSingle);
}
