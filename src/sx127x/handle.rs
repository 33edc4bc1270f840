//! # Consumer Handle
//!
//! The blocking byte-stream interface over one attached radio. A handle is
//! the single concurrent consumer the device accepts: opening a second one
//! fails with `Busy` until the first is released.
//!
//! Reads require the radio to be in a LoRa receive mode; they arm the
//! receive machine and suspend until the packet queue delivers one framed
//! packet. Writes require transmit mode; each chunk is written to the FIFO
//! from standby, the prior mode restored to start the transmission, and the
//! caller suspended until the transmit machine observes completion, bounded
//! by [`WRITE_TIMEOUT`].

use crate::constants::{MAX_PACKET_SIZE, WRITE_TIMEOUT};
use crate::error::Sx127xError;
use crate::sx127x::device::{PaOutput, Sx127x};
use crate::sx127x::hal::Hal;
use crate::sx127x::opmode::{Modulation, OpMode};
use crate::sx127x::poll::{
    spawn_cad_poll, spawn_receive_poll, spawn_transmit_poll, CadPoll, ReceivePoll, Scheduler,
    TransmitPoll,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The configuration command set exposed to the consumer layer.
///
/// Every `Get*` command is accepted but unimplemented: the original device
/// answered them with success and no data, so they surface as an explicit
/// [`Sx127xError::Unsupported`] here. Typed readback lives on
/// [`Sx127x`](crate::sx127x::device::Sx127x) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetModulation(Modulation),
    GetModulation,
    SetOpmode(OpMode),
    GetOpmode,
    SetCarrierFrequency(u64),
    GetCarrierFrequency,
    SetSf(u8),
    GetSf,
    SetPaOutput(PaOutput),
    GetPaOutput,
    SetSyncword(u8),
    GetSyncword,
    SetCrc(bool),
    GetCrc,
    SetInvertIq(bool),
    GetInvertIq,
}

/// Exclusive blocking consumer of one radio
pub struct Sx127xHandle<B: Hal + 'static> {
    device: Arc<Sx127x<B>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<B: Hal + 'static> Sx127xHandle<B> {
    /// Claim exclusive consumer access to the device.
    ///
    /// Completion machines armed through this handle run on `scheduler`.
    pub fn open(
        device: Arc<Sx127x<B>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, Sx127xError> {
        let mut state = device.lock();
        if state.open {
            log::error!("device already open");
            return Err(Sx127xError::Busy);
        }
        state.open = true;
        drop(state);
        Ok(Self { device, scheduler })
    }

    /// Block until one received packet is available and copy its framed
    /// bytes (header then payload) into `buf`.
    ///
    /// The device must be in RX-continuous or RX-single mode. With a
    /// `timeout` the wait is bounded and `Timeout` surfaces when nothing
    /// arrives in time; without one the call waits indefinitely.
    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, Sx127xError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut state = self.device.lock();
        if !state.opmode.is_receiving() {
            log::error!("device is not in receive mode");
            return Err(Sx127xError::InvalidState(format!(
                "read requires a receive mode, device is {}",
                state.opmode
            )));
        }
        let machine = ReceivePoll::arm(&mut state, deadline)?;
        drop(state);
        spawn_receive_poll(
            Arc::clone(&self.device),
            Arc::clone(&self.scheduler),
            machine,
        );

        let mut state = self.device.lock();
        while state.queue.is_empty() {
            state = match deadline {
                None => self.device.read_ready.wait(state).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Sx127xError::Timeout);
                    }
                    let (state, result) = self
                        .device
                        .read_ready
                        .wait_timeout(state, deadline - now)
                        .unwrap();
                    if result.timed_out() && state.queue.is_empty() {
                        return Err(Sx127xError::Timeout);
                    }
                    state
                }
            };
        }

        let frame_len = match state.queue.peek_frame_len() {
            Some(len) => len,
            None => {
                return Err(Sx127xError::InvalidState(
                    "packet queue holds a truncated frame".into(),
                ))
            }
        };
        if buf.len() < frame_len {
            return Err(Sx127xError::InvalidArgument(format!(
                "buffer of {} bytes cannot hold a {frame_len} byte frame",
                buf.len()
            )));
        }
        let frame = match state.queue.pop_frame() {
            Some(frame) => frame,
            None => {
                return Err(Sx127xError::InvalidState(
                    "packet queue emptied unexpectedly".into(),
                ))
            }
        };
        buf[..frame.len()].copy_from_slice(&frame);

        self.refresh_opmode(&mut state);
        Ok(frame.len())
    }

    /// Transmit `data`, blocking until every chunk has left the radio.
    ///
    /// The device must already be in transmit mode. Each chunk of up to
    /// [`MAX_PACKET_SIZE`] bytes is written to the FIFO from standby, the
    /// transmit mode restored, and the transmit machine awaited with a
    /// [`WRITE_TIMEOUT`] bound.
    pub fn write(&self, data: &[u8]) -> Result<usize, Sx127xError> {
        {
            let state = self.device.lock();
            if state.opmode != OpMode::Tx {
                log::error!("device is not in transmit mode");
                return Err(Sx127xError::InvalidState(format!(
                    "write requires transmit mode, device is {}",
                    state.opmode
                )));
            }
        }

        for chunk in data.chunks(MAX_PACKET_SIZE) {
            let deadline = Instant::now() + WRITE_TIMEOUT;

            let mut state = self.device.lock();
            let prior = state.opmode;
            state.set_opmode(OpMode::Standby)?;
            state.fifo_write_packet(chunk)?;
            state.set_opmode(prior)?;
            let machine = TransmitPoll::arm(&mut state, Some(deadline))?;
            drop(state);
            spawn_transmit_poll(
                Arc::clone(&self.device),
                Arc::clone(&self.scheduler),
                machine,
            );

            let mut state = self.device.lock();
            while !state.transmitted {
                let now = Instant::now();
                if now >= deadline {
                    self.refresh_opmode(&mut state);
                    return Err(Sx127xError::Timeout);
                }
                let (next, result) = self
                    .device
                    .write_done
                    .wait_timeout(state, deadline - now)
                    .unwrap();
                state = next;
                if result.timed_out() && !state.transmitted {
                    self.refresh_opmode(&mut state);
                    return Err(Sx127xError::Timeout);
                }
            }
        }

        let mut state = self.device.lock();
        self.refresh_opmode(&mut state);
        Ok(data.len())
    }

    /// Execute one configuration command.
    pub fn command(&self, cmd: Command) -> Result<(), Sx127xError> {
        match cmd {
            Command::SetModulation(modulation) => self.device.lock().set_modulation(modulation),
            Command::SetOpmode(opmode) => {
                let mut state = self.device.lock();
                state.set_opmode(opmode)?;
                if opmode == OpMode::Cad {
                    let machine = CadPoll::arm(&mut state, None)?;
                    drop(state);
                    spawn_cad_poll(
                        Arc::clone(&self.device),
                        Arc::clone(&self.scheduler),
                        machine,
                    );
                }
                Ok(())
            }
            Command::SetCarrierFrequency(freq) => self.device.lock().set_carrierfrequency(freq),
            Command::SetSf(sf) => self.device.lock().set_sf(sf),
            Command::SetPaOutput(pa) => self.device.lock().set_paoutput(pa),
            Command::SetSyncword(word) => self.device.lock().set_syncword(word),
            Command::SetCrc(crc) => self.device.lock().set_crc(crc),
            Command::SetInvertIq(invert) => self.device.lock().set_invertiq(invert),
            Command::GetModulation
            | Command::GetOpmode
            | Command::GetCarrierFrequency
            | Command::GetSf
            | Command::GetPaOutput
            | Command::GetSyncword
            | Command::GetCrc
            | Command::GetInvertIq => Err(Sx127xError::Unsupported),
        }
    }

    /// Release the device: sleep the radio, drop queued packets, clear the
    /// exclusivity flag. Also performed on drop.
    pub fn release(self) {}

    fn refresh_opmode(&self, state: &mut crate::sx127x::device::DeviceState<B>) {
        match state.get_opmode() {
            Ok(opmode) => state.opmode = opmode,
            Err(e) => log::debug!("could not refresh cached opmode: {e}"),
        }
    }
}

impl<B: Hal + 'static> Drop for Sx127xHandle<B> {
    fn drop(&mut self) {
        let mut state = self.device.lock();
        if let Err(e) = state.set_opmode(OpMode::Sleep) {
            log::warn!("could not sleep radio on release: {e}");
        }
        state.open = false;
        state.queue.reset();
    }
}
