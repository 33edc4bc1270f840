//! # Packet Queue
//!
//! Received packets travel from the completion engine to the blocking reader
//! through a bounded byte queue. Each packet is framed as a fixed-size header
//! followed by the raw payload, so the queue carries a self-describing byte
//! stream the consumer can drain one packet at a time.
//!
//! Wire layout of the header (12 bytes, little-endian):
//!
//! ```text
//! offset 0  hdr_len      u16   size of this header (12)
//! offset 2  payload_len  u16   payload bytes following the header
//! offset 4  len          u16   hdr_len + payload_len
//! offset 6  snr          i16   packet SNR, quarter-dB units
//! offset 8  rssi         i16   packet RSSI in dBm (-157 offset applied)
//! offset 10 crc_fail     u8    1 when the payload failed CRC validation
//! offset 11 (pad)        u8    reserved, written as zero
//! ```
//!
//! The queue is single-producer/single-consumer; in this driver both sides
//! additionally run under the device lock.

use crate::error::Sx127xError;
use bytes::{Buf, BufMut, BytesMut};
use std::collections::VecDeque;

/// Size of the packet header on the wire
pub const PACKET_HEADER_LEN: usize = 12;

/// Fixed-size header preceding every queued payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Size of the header itself
    pub hdr_len: u16,
    /// Number of payload bytes following the header
    pub payload_len: u16,
    /// Total frame size, `hdr_len + payload_len`
    pub len: u16,
    /// Signal-to-noise ratio of the packet, signed, quarter-dB units
    pub snr: i16,
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Whether the payload failed CRC validation
    pub crc_fail: bool,
}

impl PacketHeader {
    /// Build a header from the raw SNR/RSSI register values.
    ///
    /// The SNR register is two's-complement in quarter-dB units; the RSSI
    /// register carries dBm with a -157 offset.
    pub fn from_raw(payload_len: usize, snr_raw: u8, rssi_raw: u8, crc_fail: bool) -> Self {
        Self {
            hdr_len: PACKET_HEADER_LEN as u16,
            payload_len: payload_len as u16,
            len: (PACKET_HEADER_LEN + payload_len) as u16,
            snr: (snr_raw as i8) as i16,
            rssi: -157 + rssi_raw as i16,
            crc_fail,
        }
    }

    /// Encode the header into its 12-byte wire form.
    pub fn encode(&self) -> [u8; PACKET_HEADER_LEN] {
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_LEN);
        buf.put_u16_le(self.hdr_len);
        buf.put_u16_le(self.payload_len);
        buf.put_u16_le(self.len);
        buf.put_i16_le(self.snr);
        buf.put_i16_le(self.rssi);
        buf.put_u8(self.crc_fail as u8);
        buf.put_u8(0);
        let mut out = [0u8; PACKET_HEADER_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Decode a header from the front of `buf`.
    pub fn decode(mut buf: &[u8]) -> Result<Self, Sx127xError> {
        if buf.len() < PACKET_HEADER_LEN {
            return Err(Sx127xError::InvalidArgument(format!(
                "packet header needs {PACKET_HEADER_LEN} bytes, got {}",
                buf.len()
            )));
        }
        let hdr_len = buf.get_u16_le();
        let payload_len = buf.get_u16_le();
        let len = buf.get_u16_le();
        let snr = buf.get_i16_le();
        let rssi = buf.get_i16_le();
        let crc_fail = buf.get_u8() != 0;
        Ok(Self {
            hdr_len,
            payload_len,
            len,
            snr,
            rssi,
            crc_fail,
        })
    }
}

/// One received packet: header plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Parse a framed packet from the byte stream the queue produces.
    pub fn parse(frame: &[u8]) -> Result<Self, Sx127xError> {
        let header = PacketHeader::decode(frame)?;
        let end = PACKET_HEADER_LEN + header.payload_len as usize;
        if frame.len() < end {
            return Err(Sx127xError::InvalidArgument(format!(
                "frame truncated: header announces {} payload bytes, {} present",
                header.payload_len,
                frame.len() - PACKET_HEADER_LEN
            )));
        }
        Ok(Self {
            header,
            payload: frame[PACKET_HEADER_LEN..end].to_vec(),
        })
    }
}

/// Bounded byte queue carrying framed packets
#[derive(Debug)]
pub struct PacketQueue {
    buf: VecDeque<u8>,
    capacity: usize,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of queued bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Enqueue one framed packet.
    ///
    /// A packet that does not fit whole is rejected, keeping the stream
    /// parseable.
    pub fn push(&mut self, header: &PacketHeader, payload: &[u8]) -> Result<(), Sx127xError> {
        let frame_len = PACKET_HEADER_LEN + payload.len();
        if self.capacity - self.buf.len() < frame_len {
            return Err(Sx127xError::QueueFull);
        }
        self.buf.extend(header.encode());
        self.buf.extend(payload.iter().copied());
        Ok(())
    }

    /// Size of the frame at the front of the queue, header included.
    pub fn peek_frame_len(&self) -> Option<usize> {
        if self.buf.len() < PACKET_HEADER_LEN {
            return None;
        }
        let head: Vec<u8> = self.buf.iter().take(PACKET_HEADER_LEN).copied().collect();
        let header = PacketHeader::decode(&head).ok()?;
        Some(PACKET_HEADER_LEN + header.payload_len as usize)
    }

    /// Dequeue one packet's worth of framed bytes.
    pub fn pop_frame(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < PACKET_HEADER_LEN {
            return None;
        }
        let head: Vec<u8> = self.buf.iter().take(PACKET_HEADER_LEN).copied().collect();
        let header = PacketHeader::decode(&head).ok()?;
        let frame_len = PACKET_HEADER_LEN + header.payload_len as usize;
        debug_assert!(self.buf.len() >= frame_len);
        Some(self.buf.drain(..frame_len.min(self.buf.len())).collect())
    }

    /// Dequeue and parse one packet.
    pub fn pop(&mut self) -> Option<Packet> {
        self.pop_frame().and_then(|frame| Packet::parse(&frame).ok())
    }

    /// Discard all queued bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_wire_form() {
        let header = PacketHeader::from_raw(5, 0xF8, 100, true);
        assert_eq!(header.snr, -8);
        assert_eq!(header.rssi, -57);
        assert_eq!(header.len, 17);
        let decoded = PacketHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn queue_frames_packets_in_order() {
        let mut queue = PacketQueue::new(256);
        let first = PacketHeader::from_raw(3, 0x04, 90, false);
        let second = PacketHeader::from_raw(2, 0x00, 80, false);
        queue.push(&first, &[1, 2, 3]).unwrap();
        queue.push(&second, &[4, 5]).unwrap();

        let a = queue.pop().unwrap();
        assert_eq!(a.header, first);
        assert_eq!(a.payload, vec![1, 2, 3]);
        let b = queue.pop().unwrap();
        assert_eq!(b.payload, vec![4, 5]);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn full_queue_rejects_whole_packet() {
        let mut queue = PacketQueue::new(PACKET_HEADER_LEN + 4);
        let header = PacketHeader::from_raw(4, 0, 0, false);
        queue.push(&header, &[0; 4]).unwrap();
        let err = queue.push(&header, &[0; 4]).unwrap_err();
        assert!(matches!(err, Sx127xError::QueueFull));
        // the first frame is still intact
        assert_eq!(queue.pop().unwrap().payload, vec![0; 4]);
    }

    #[test]
    fn reset_discards_everything() {
        let mut queue = PacketQueue::new(256);
        queue
            .push(&PacketHeader::from_raw(1, 0, 0, false), &[9])
            .unwrap();
        queue.reset();
        assert!(queue.is_empty());
    }
}
