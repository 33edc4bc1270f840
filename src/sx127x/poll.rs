//! # Completion Engine
//!
//! The SX127x signals transmit, receive and channel-activity completion
//! through a flag register. Without a wired interrupt line the driver
//! emulates interrupt-driven completion with three independent polling state
//! machines, one per completion kind. Arming a machine clears the flag
//! register and programs the interrupt mask; each step re-reads the flags,
//! and on the terminal condition clears mask and flags, performs the
//! completion action and signals the blocked consumer. A step that observes
//! nothing reschedules itself at [`POLLING_DELAY`].
//!
//! Machines are stepped by an external [`Scheduler`]; a step acquires the
//! device lock only for its critical section and never holds it across the
//! inter-poll delay. Each machine accepts an optional deadline: a machine
//! whose deadline passes stops rescheduling and reports a timeout rather
//! than polling forever.

use crate::constants::*;
use crate::error::Sx127xError;
use crate::sx127x::device::{DeviceState, Sx127x};
use crate::sx127x::hal::Hal;
use crate::sx127x::queue::PacketHeader;
use crate::sx127x::regs;
use bitflags::bitflags;
use once_cell::sync::Lazy;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

bitflags! {
    /// Interrupt flag register contents
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqFlags: u8 {
        const CAD_DETECTED = IRQFLAGS_CADDETECTED;
        const CAD_DONE = IRQFLAGS_CADDONE;
        const TX_DONE = IRQFLAGS_TXDONE;
        const PAYLOAD_CRC_ERROR = IRQFLAGS_PAYLOADCRCERROR;
        const RX_DONE = IRQFLAGS_RXDONE;
    }
}

impl IrqFlags {
    /// Transmission completed
    pub fn tx_done(self) -> bool {
        self.contains(IrqFlags::TX_DONE)
    }

    /// Reception completed
    pub fn rx_done(self) -> bool {
        self.contains(IrqFlags::RX_DONE)
    }

    /// Payload CRC validation failed
    pub fn crc_error(self) -> bool {
        self.contains(IrqFlags::PAYLOAD_CRC_ERROR)
    }

    /// Channel activity scan completed
    pub fn cad_done(self) -> bool {
        self.contains(IrqFlags::CAD_DONE)
    }

    /// Channel activity observed during the scan
    pub fn cad_detected(self) -> bool {
        self.contains(IrqFlags::CAD_DETECTED)
    }
}

/// What a polling step observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Terminal condition absent; the machine should be stepped again
    Pending,
    /// Terminal condition observed and handled
    Completed,
    /// Deadline passed before the terminal condition appeared
    TimedOut,
}

fn clear_and_mask<B: Hal>(state: &mut DeviceState<B>, mask: u8) -> Result<(), Sx127xError> {
    regs::write(&mut state.bus, regs::LORA_IRQFLAGS, 0xFF)?;
    regs::write(&mut state.bus, regs::LORA_IRQFLAGSMSK, mask)?;
    Ok(())
}

fn disarm<B: Hal>(state: &mut DeviceState<B>) -> Result<(), Sx127xError> {
    regs::write(&mut state.bus, regs::LORA_IRQFLAGSMSK, 0xFF)?;
    regs::write(&mut state.bus, regs::LORA_IRQFLAGS, 0xFF)?;
    Ok(())
}

fn read_flags<B: Hal>(state: &mut DeviceState<B>) -> Result<IrqFlags, Sx127xError> {
    let raw = regs::read(&mut state.bus, regs::LORA_IRQFLAGS)?;
    Ok(IrqFlags::from_bits_truncate(raw))
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Polling state machine for transmit completion
#[derive(Debug)]
pub struct TransmitPoll {
    deadline: Option<Instant>,
}

impl TransmitPoll {
    /// Clear the flag register, unmask TX-done and reset the transmitted
    /// flag. Must run under the device lock.
    pub fn arm<B: Hal>(
        state: &mut DeviceState<B>,
        deadline: Option<Instant>,
    ) -> Result<Self, Sx127xError> {
        state.transmitted = false;
        clear_and_mask(state, !IRQFLAGS_TXDONE)?;
        Ok(Self { deadline })
    }

    /// Inspect the flag register once.
    pub fn step<B: Hal>(&mut self, state: &mut DeviceState<B>) -> Result<PollOutcome, Sx127xError> {
        let flags = read_flags(state)?;
        if flags.tx_done() {
            disarm(state)?;
            state.transmitted = true;
            log::debug!("tx done");
            return Ok(PollOutcome::Completed);
        }
        if deadline_passed(self.deadline) {
            log::warn!("transmit poll gave up waiting for tx done");
            return Ok(PollOutcome::TimedOut);
        }
        Ok(PollOutcome::Pending)
    }
}

/// Polling state machine for receive completion
#[derive(Debug)]
pub struct ReceivePoll {
    deadline: Option<Instant>,
}

impl ReceivePoll {
    /// Clear the flag register and unmask RX-done and payload-CRC-error.
    /// Must run under the device lock.
    pub fn arm<B: Hal>(
        state: &mut DeviceState<B>,
        deadline: Option<Instant>,
    ) -> Result<Self, Sx127xError> {
        clear_and_mask(state, !(IRQFLAGS_RXDONE | IRQFLAGS_PAYLOADCRCERROR))?;
        Ok(Self { deadline })
    }

    /// Inspect the flag register once; on completion pull the packet out of
    /// the FIFO and enqueue it with its signal metrics.
    pub fn step<B: Hal>(&mut self, state: &mut DeviceState<B>) -> Result<PollOutcome, Sx127xError> {
        let flags = read_flags(state)?;
        if flags.rx_done() || flags.crc_error() {
            log::info!("rx interrupt received");
            disarm(state)?;

            let mut buf = [0u8; MAX_PACKET_SIZE];
            let read = state.fifo_read_packet(&mut buf);
            if let Err(e) = &read.status {
                log::warn!("fifo read failed mid-packet: {e}");
            }
            let len = read.len.min(buf.len());

            let snr = regs::read(&mut state.bus, regs::LORA_PKTSNRVALUE)?;
            let rssi = regs::read(&mut state.bus, regs::LORA_PKTRSSIVALUE)?;
            let header = PacketHeader::from_raw(len, snr, rssi, flags.crc_error());

            if state.queue.push(&header, &buf[..len]).is_err() {
                log::warn!("packet queue full, dropping {len} byte packet");
            }
            return Ok(PollOutcome::Completed);
        }
        if deadline_passed(self.deadline) {
            log::warn!("receive poll gave up waiting for rx done");
            return Ok(PollOutcome::TimedOut);
        }
        Ok(PollOutcome::Pending)
    }
}

/// Polling state machine for channel activity detection
#[derive(Debug)]
pub struct CadPoll {
    deadline: Option<Instant>,
    detected: Option<bool>,
}

impl CadPoll {
    /// Clear the flag register and unmask CAD-done and CAD-detected.
    /// Must run under the device lock.
    pub fn arm<B: Hal>(
        state: &mut DeviceState<B>,
        deadline: Option<Instant>,
    ) -> Result<Self, Sx127xError> {
        clear_and_mask(state, !(IRQFLAGS_CADDONE | IRQFLAGS_CADDETECTED))?;
        Ok(Self {
            deadline,
            detected: None,
        })
    }

    /// Whether the completed scan observed channel activity.
    pub fn activity_detected(&self) -> Option<bool> {
        self.detected
    }

    /// Inspect the flag register once.
    pub fn step<B: Hal>(&mut self, state: &mut DeviceState<B>) -> Result<PollOutcome, Sx127xError> {
        let flags = read_flags(state)?;
        if flags.cad_done() {
            disarm(state)?;
            let detected = flags.cad_detected();
            self.detected = Some(detected);
            if detected {
                log::info!("CAD done, detected activity");
            } else {
                log::info!("CAD done, nothing detected");
            }
            return Ok(PollOutcome::Completed);
        }
        if deadline_passed(self.deadline) {
            log::warn!("cad poll gave up waiting for cad done");
            return Ok(PollOutcome::TimedOut);
        }
        Ok(PollOutcome::Pending)
    }
}

/// A facility that runs deferred tasks after a delay
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>);
}

struct TimerEntry {
    at: Instant,
    seq: u64,
    task: Box<dyn FnOnce() + Send>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // reversed so the BinaryHeap pops the earliest deadline first
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

struct TimerState {
    queue: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

struct TimerShared {
    state: Mutex<TimerState>,
    notify: Condvar,
    shutdown: AtomicBool,
}

/// Shared single-worker timer that executes deferred tasks in deadline order
pub struct ThreadScheduler {
    shared: Arc<TimerShared>,
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadScheduler {
    pub fn new() -> Self {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                queue: BinaryHeap::new(),
                next_seq: 0,
            }),
            notify: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker = Arc::clone(&shared);
        std::thread::spawn(move || Self::run(worker));

        Self { shared }
    }

    fn run(shared: Arc<TimerShared>) {
        let mut state = shared.state.lock().unwrap();
        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            let now = Instant::now();
            let next_at = state.queue.peek().map(|entry| entry.at);
            match next_at {
                Some(at) if at <= now => {
                    let entry = state.queue.pop().unwrap();
                    drop(state);
                    (entry.task)();
                    state = shared.state.lock().unwrap();
                }
                Some(at) => {
                    state = shared.notify.wait_timeout(state, at - now).unwrap().0;
                }
                None => {
                    state = shared.notify.wait(state).unwrap();
                }
            }
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) {
        let mut state = self.shared.state.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(TimerEntry {
            at: Instant::now() + delay,
            seq,
            task,
        });
        self.shared.notify.notify_all();
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.notify.notify_all();
    }
}

static SHARED_SCHEDULER: Lazy<Arc<ThreadScheduler>> = Lazy::new(|| Arc::new(ThreadScheduler::new()));

/// The process-wide timer every device may share, in the manner of a system
/// work queue. Handles that want isolation can construct their own
/// [`ThreadScheduler`] instead.
pub fn shared_scheduler() -> Arc<ThreadScheduler> {
    Arc::clone(&SHARED_SCHEDULER)
}

/// Drive an armed transmit machine to completion on the scheduler.
///
/// On completion the write-side waiter is woken; a timed-out or failed
/// machine simply stops rescheduling.
pub fn spawn_transmit_poll<B: Hal + 'static>(
    device: Arc<Sx127x<B>>,
    scheduler: Arc<dyn Scheduler>,
    mut machine: TransmitPoll,
) {
    let sched = Arc::clone(&scheduler);
    sched.schedule(
        POLLING_DELAY,
        Box::new(move || {
            let outcome = machine.step(&mut device.lock());
            match outcome {
                Ok(PollOutcome::Pending) => spawn_transmit_poll(device, scheduler, machine),
                Ok(PollOutcome::Completed) => device.write_done.notify_all(),
                Ok(PollOutcome::TimedOut) => {}
                Err(e) => log::warn!("transmit poll aborted: {e}"),
            }
        }),
    );
}

/// Drive an armed receive machine to completion on the scheduler.
///
/// On completion the read-side waiter is woken; a timed-out or failed
/// machine simply stops rescheduling.
pub fn spawn_receive_poll<B: Hal + 'static>(
    device: Arc<Sx127x<B>>,
    scheduler: Arc<dyn Scheduler>,
    mut machine: ReceivePoll,
) {
    let sched = Arc::clone(&scheduler);
    sched.schedule(
        POLLING_DELAY,
        Box::new(move || {
            let outcome = machine.step(&mut device.lock());
            match outcome {
                Ok(PollOutcome::Pending) => spawn_receive_poll(device, scheduler, machine),
                Ok(PollOutcome::Completed) => device.read_ready.notify_all(),
                Ok(PollOutcome::TimedOut) => {}
                Err(e) => log::warn!("receive poll aborted: {e}"),
            }
        }),
    );
}

/// Drive an armed channel-activity machine on the scheduler. The result is
/// log-only; no consumer is woken.
pub fn spawn_cad_poll<B: Hal + 'static>(
    device: Arc<Sx127x<B>>,
    scheduler: Arc<dyn Scheduler>,
    mut machine: CadPoll,
) {
    let sched = Arc::clone(&scheduler);
    sched.schedule(
        POLLING_DELAY,
        Box::new(move || {
            let outcome = machine.step(&mut device.lock());
            match outcome {
                Ok(PollOutcome::Pending) => spawn_cad_poll(device, scheduler, machine),
                Ok(PollOutcome::Completed) | Ok(PollOutcome::TimedOut) => {}
                Err(e) => log::warn!("cad poll aborted: {e}"),
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sx127x::hal::MockBus;
    use crate::sx127x::opmode::Modulation;

    fn lora_device() -> (Arc<Sx127x<MockBus>>, MockBus) {
        let bus = MockBus::new();
        let device = Sx127x::attach(bus.clone(), DEFAULT_FOSC).unwrap();
        device.set_modulation(Modulation::Lora).unwrap();
        (device, bus)
    }

    #[test]
    fn transmit_machine_pends_until_flag() {
        let (device, bus) = lora_device();
        let mut state = device.lock();
        let mut machine = TransmitPoll::arm(&mut state, None).unwrap();
        assert_eq!(bus.reg(REG_LORA_IRQFLAGSMSK), !IRQFLAGS_TXDONE);

        assert_eq!(machine.step(&mut state).unwrap(), PollOutcome::Pending);
        assert!(!state.transmitted);

        bus.raise_irq(IRQFLAGS_TXDONE);
        assert_eq!(machine.step(&mut state).unwrap(), PollOutcome::Completed);
        assert!(state.transmitted);
        // mask restored and flags cleared (flags are write-1-to-clear)
        assert_eq!(bus.reg(REG_LORA_IRQFLAGSMSK), 0xFF);
        assert_eq!(bus.reg(REG_LORA_IRQFLAGS), 0x00);
    }

    #[test]
    fn receive_machine_queues_packet_with_metrics() {
        let (device, bus) = lora_device();
        let payload: Vec<u8> = (1..=20).collect();
        bus.set_reg(REG_LORA_RXCURRENTADDR, 0x40);
        bus.set_reg(REG_LORA_RXNBBYTES, payload.len() as u8);
        bus.load_fifo(0x40, &payload);
        bus.set_reg(REG_LORA_PKTSNRVALUE, 0xF8); // -2 dB in quarter-dB units
        bus.set_reg(REG_LORA_PKTRSSIVALUE, 100); // -57 dBm

        let mut state = device.lock();
        let mut machine = ReceivePoll::arm(&mut state, None).unwrap();
        assert_eq!(machine.step(&mut state).unwrap(), PollOutcome::Pending);

        bus.raise_irq(IRQFLAGS_RXDONE);
        assert_eq!(machine.step(&mut state).unwrap(), PollOutcome::Completed);

        let packet = state.queue.pop().unwrap();
        assert_eq!(packet.payload, payload);
        assert_eq!(packet.header.snr, -8);
        assert_eq!(packet.header.rssi, -57);
        assert!(!packet.header.crc_fail);
    }

    #[test]
    fn crc_error_marks_packet() {
        let (device, bus) = lora_device();
        bus.set_reg(REG_LORA_RXNBBYTES, 4);
        bus.load_fifo(0, &[9, 9, 9, 9]);

        let mut state = device.lock();
        let mut machine = ReceivePoll::arm(&mut state, None).unwrap();
        bus.raise_irq(IRQFLAGS_PAYLOADCRCERROR);
        assert_eq!(machine.step(&mut state).unwrap(), PollOutcome::Completed);

        let packet = state.queue.pop().unwrap();
        assert!(packet.header.crc_fail);
    }

    #[test]
    fn cad_machine_reports_detection() {
        let (device, bus) = lora_device();
        let mut state = device.lock();
        let mut machine = CadPoll::arm(&mut state, None).unwrap();
        assert_eq!(machine.step(&mut state).unwrap(), PollOutcome::Pending);

        bus.raise_irq(IRQFLAGS_CADDONE | IRQFLAGS_CADDETECTED);
        assert_eq!(machine.step(&mut state).unwrap(), PollOutcome::Completed);
        assert_eq!(machine.activity_detected(), Some(true));
    }

    #[test]
    fn machine_times_out_past_deadline() {
        let (device, _bus) = lora_device();
        let mut state = device.lock();
        let deadline = Some(Instant::now() - Duration::from_millis(1));
        let mut machine = TransmitPoll::arm(&mut state, deadline).unwrap();
        assert_eq!(machine.step(&mut state).unwrap(), PollOutcome::TimedOut);
    }

    #[test]
    fn scheduler_runs_tasks_in_deadline_order() {
        let scheduler = ThreadScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        scheduler.schedule(
            Duration::from_millis(30),
            Box::new(move || o.lock().unwrap().push(2)),
        );
        let o = Arc::clone(&order);
        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || o.lock().unwrap().push(1)),
        );

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
