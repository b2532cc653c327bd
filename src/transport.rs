//! Moving packets over byte streams and datagrams
//!
//! # Stream framing
//!
//! ```text
//! +-------------+------------------------+
//! | Len u32 BE  | payload (Len bytes)    |
//! +-------------+------------------------+
//! ```
//!
//! The payload is whatever the [`PacketFilter`] produced from the packet
//! data: the raw bytes for [`Plain`], or a compressed or sealed form.
//! Datagrams carry the filtered payload with no length prefix.

use std::borrow::Cow;
use std::io::{ErrorKind, Read, Write};

use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::{MAX_DATAGRAM_SIZE, MAX_PACKET_SIZE};

/// Byte transform applied to packet data on its way to and from the wire
pub trait PacketFilter {
    /// Produce the bytes to transmit for `packet`
    fn on_send<'a>(&mut self, packet: &'a Packet) -> Result<Cow<'a, [u8]>>;

    /// Rebuild `packet` from received bytes, replacing its content
    fn on_receive(&mut self, payload: &[u8], packet: &mut Packet) -> Result<()>;
}

/// Identity filter: packet bytes go on the wire unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl PacketFilter for Plain {
    #[inline]
    fn on_send<'a>(&mut self, packet: &'a Packet) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(packet.data()))
    }

    #[inline]
    fn on_receive(&mut self, payload: &[u8], packet: &mut Packet) -> Result<()> {
        packet.clear();
        packet.append(payload);
        Ok(())
    }
}

#[inline]
fn check_size(size: usize, limit: usize) -> Result<()> {
    if size > limit {
        return Err(Error::PacketTooLarge { size, limit });
    }
    Ok(())
}

/// LZ4 block compression with the uncompressed size prepended
#[cfg(feature = "lz4")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4;

#[cfg(feature = "lz4")]
impl PacketFilter for Lz4 {
    fn on_send<'a>(&mut self, packet: &'a Packet) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Owned(lz4_flex::block::compress_prepend_size(
            packet.data(),
        )))
    }

    fn on_receive(&mut self, payload: &[u8], packet: &mut Packet) -> Result<()> {
        let Some(prefix) = payload.first_chunk::<4>() else {
            return Err(Error::Filter("LZ4 payload shorter than its size prefix".into()));
        };
        // The prefix is little-endian per lz4_flex
        check_size(u32::from_le_bytes(*prefix) as usize, MAX_PACKET_SIZE)?;

        let data = lz4_flex::block::decompress_size_prepended(payload)
            .map_err(|e| Error::Filter(e.to_string()))?;
        packet.clear();
        packet.append(&data);
        Ok(())
    }
}

/// ChaCha20-Poly1305 sealing
///
/// Each payload is `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
/// The nonce is the 4-byte sender prefix followed by a big-endian 64-bit
/// message counter, so two senders sharing a key need distinct prefixes.
#[cfg(feature = "aead")]
pub struct Sealed {
    cipher: chacha20poly1305::ChaCha20Poly1305,
    sender_prefix: [u8; 4],
    counter: u64,
}

#[cfg(feature = "aead")]
impl Sealed {
    const NONCE_LEN: usize = 12;
    const TAG_LEN: usize = 16;

    /// Create a filter sealing with `key`, tagging nonces with `sender_prefix`
    pub fn new(key: &[u8; 32], sender_prefix: [u8; 4]) -> Self {
        use chacha20poly1305::{aead::KeyInit, ChaCha20Poly1305, Key};

        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            sender_prefix,
            counter: 0,
        }
    }

    /// Number of payloads sealed so far
    pub fn sent(&self) -> u64 {
        self.counter
    }
}

#[cfg(feature = "aead")]
impl PacketFilter for Sealed {
    fn on_send<'a>(&mut self, packet: &'a Packet) -> Result<Cow<'a, [u8]>> {
        use chacha20poly1305::{aead::Aead, Nonce};

        let mut nonce = [0u8; Self::NONCE_LEN];
        nonce[..4].copy_from_slice(&self.sender_prefix);
        nonce[4..].copy_from_slice(&self.counter.to_be_bytes());
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| Error::Filter("nonce counter exhausted".into()))?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), packet.data())
            .map_err(|_| Error::Filter("encryption failed".into()))?;

        let mut out = Vec::with_capacity(Self::NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(Cow::Owned(out))
    }

    fn on_receive(&mut self, payload: &[u8], packet: &mut Packet) -> Result<()> {
        use chacha20poly1305::{aead::Aead, Nonce};

        if payload.len() < Self::NONCE_LEN + Self::TAG_LEN {
            return Err(Error::Filter("sealed payload too short".into()));
        }
        let (nonce, ciphertext) = payload.split_at(Self::NONCE_LEN);
        let data = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Filter("authentication failed".into()))?;
        packet.clear();
        packet.append(&data);
        Ok(())
    }
}

/// Write `packet` to `writer` as one length-prefixed frame
pub fn send_packet<W, F>(writer: &mut W, packet: &Packet, filter: &mut F) -> Result<()>
where
    W: Write + ?Sized,
    F: PacketFilter + ?Sized,
{
    let payload = filter.on_send(packet)?;
    check_size(payload.len(), MAX_PACKET_SIZE)?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    writer.write_all(&frame)?;
    Ok(())
}

/// Outcome of [`PacketReceiver::receive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A whole packet was received
    Done,
    /// Part of a packet arrived; call again when more data is ready
    Partial,
    /// No data was available
    NotReady,
    /// The peer closed the stream
    Disconnected,
}

/// Reassembles length-prefixed frames from a possibly non-blocking stream
///
/// Bytes of an incomplete frame are kept between calls, so the same
/// receiver must be used for every read from one stream.
#[derive(Debug, Default)]
pub struct PacketReceiver {
    size_bytes: [u8; 4],
    size_received: usize,
    payload: Vec<u8>,
    payload_received: usize,
}

impl PacketReceiver {
    /// Create a receiver with no buffered data
    pub fn new() -> Self {
        Self::default()
    }

    fn has_partial(&self) -> bool {
        self.size_received > 0
    }

    fn reset(&mut self) {
        self.size_received = 0;
        self.payload.clear();
        self.payload_received = 0;
    }

    /// Pull bytes from `reader` until a frame completes or no data is left
    ///
    /// On [`Status::Done`] `packet` holds the decoded frame. `WouldBlock`
    /// from the reader yields [`Status::Partial`] or [`Status::NotReady`].
    pub fn receive<R, F>(&mut self, reader: &mut R, packet: &mut Packet, filter: &mut F) -> Result<Status>
    where
        R: Read + ?Sized,
        F: PacketFilter + ?Sized,
    {
        loop {
            let size_done = self.size_received == self.size_bytes.len();
            let target = if size_done {
                &mut self.payload[self.payload_received..]
            } else {
                &mut self.size_bytes[self.size_received..]
            };

            if size_done && target.is_empty() {
                let result = filter.on_receive(&self.payload, packet);
                self.reset();
                result?;
                return Ok(Status::Done);
            }

            match reader.read(target) {
                Ok(0) => {
                    self.reset();
                    return Ok(Status::Disconnected);
                }
                Ok(n) if size_done => self.payload_received += n,
                Ok(n) => {
                    self.size_received += n;
                    if self.size_received == self.size_bytes.len() {
                        let size = u32::from_be_bytes(self.size_bytes) as usize;
                        if let Err(e) = check_size(size, MAX_PACKET_SIZE) {
                            self.reset();
                            return Err(e);
                        }
                        self.payload.resize(size, 0);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Ok(if self.has_partial() {
                        Status::Partial
                    } else {
                        Status::NotReady
                    });
                }
                Err(e) => {
                    self.reset();
                    return Err(e.into());
                }
            }
        }
    }
}

/// Filter `packet` into a single datagram payload
pub fn encode_datagram<F>(packet: &Packet, filter: &mut F) -> Result<Vec<u8>>
where
    F: PacketFilter + ?Sized,
{
    let payload = filter.on_send(packet)?;
    check_size(payload.len(), MAX_DATAGRAM_SIZE)?;
    Ok(payload.into_owned())
}

/// Rebuild `packet` from one received datagram
pub fn decode_datagram<F>(datagram: &[u8], packet: &mut Packet, filter: &mut F) -> Result<()>
where
    F: PacketFilter + ?Sized,
{
    check_size(datagram.len(), MAX_DATAGRAM_SIZE)?;
    filter.on_receive(datagram, packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Serves queued chunks, then `WouldBlock` until more are pushed
    #[derive(Default)]
    struct Pipe {
        chunks: VecDeque<Vec<u8>>,
        closed: bool,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                if self.closed {
                    return Ok(0);
                }
                return Err(io::Error::from(ErrorKind::WouldBlock));
            };
            let n = buf.len().min(chunk.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                chunk.drain(..n);
                self.chunks.push_front(chunk);
            }
            Ok(n)
        }
    }

    fn sample_packet() -> Packet {
        let mut packet = Packet::new();
        packet.write_u32(42).write_bool(true).write_string("hi");
        packet
    }

    #[test]
    fn test_frame_layout() {
        let mut wire = Vec::new();
        send_packet(&mut wire, &sample_packet(), &mut Plain).unwrap();

        let body_len = 4 + 1 + 4 + 2;
        assert_eq!(&wire[..4], &(body_len as u32).to_be_bytes());
        assert_eq!(&wire[4..], sample_packet().data());
    }

    #[test]
    fn test_receive_in_pieces() {
        let mut wire = Vec::new();
        send_packet(&mut wire, &sample_packet(), &mut Plain).unwrap();

        let mut pipe = Pipe::default();
        let mut receiver = PacketReceiver::new();
        let mut packet = Packet::new();

        assert_eq!(
            receiver.receive(&mut pipe, &mut packet, &mut Plain).unwrap(),
            Status::NotReady
        );

        pipe.chunks.push_back(wire[..3].to_vec());
        assert_eq!(
            receiver.receive(&mut pipe, &mut packet, &mut Plain).unwrap(),
            Status::Partial
        );

        pipe.chunks.push_back(wire[3..7].to_vec());
        assert_eq!(
            receiver.receive(&mut pipe, &mut packet, &mut Plain).unwrap(),
            Status::Partial
        );

        pipe.chunks.push_back(wire[7..].to_vec());
        assert_eq!(
            receiver.receive(&mut pipe, &mut packet, &mut Plain).unwrap(),
            Status::Done
        );
        assert_eq!(packet.read_u32(), 42);
        assert!(packet.read_bool());
        assert_eq!(packet.read_string(), "hi");
        assert!(packet.end_of_packet());
    }

    #[test]
    fn test_back_to_back_frames_and_empty_packet() {
        let mut wire = Vec::new();
        send_packet(&mut wire, &Packet::new(), &mut Plain).unwrap();
        send_packet(&mut wire, &sample_packet(), &mut Plain).unwrap();

        let mut pipe = Pipe::default();
        pipe.chunks.push_back(wire);
        pipe.closed = true;

        let mut receiver = PacketReceiver::new();
        let mut packet = sample_packet();
        assert_eq!(receiver.receive(&mut pipe, &mut packet, &mut Plain).unwrap(), Status::Done);
        assert_eq!(packet.data_size(), 0);
        assert_eq!(receiver.receive(&mut pipe, &mut packet, &mut Plain).unwrap(), Status::Done);
        assert_eq!(packet.data(), sample_packet().data());
        assert_eq!(
            receiver.receive(&mut pipe, &mut packet, &mut Plain).unwrap(),
            Status::Disconnected
        );
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut pipe = Pipe::default();
        pipe.chunks.push_back(u32::MAX.to_be_bytes().to_vec());

        let mut receiver = PacketReceiver::new();
        let mut packet = Packet::new();
        assert!(matches!(
            receiver.receive(&mut pipe, &mut packet, &mut Plain),
            Err(Error::PacketTooLarge { .. })
        ));
    }

    #[test]
    fn test_datagram_limit() {
        let mut packet = Packet::new();
        packet.append(&vec![0u8; MAX_DATAGRAM_SIZE + 1]);
        assert!(matches!(
            encode_datagram(&packet, &mut Plain),
            Err(Error::PacketTooLarge { .. })
        ));

        let datagram = encode_datagram(&sample_packet(), &mut Plain).unwrap();
        let mut decoded = Packet::new();
        decode_datagram(&datagram, &mut decoded, &mut Plain).unwrap();
        assert_eq!(decoded.read_u32(), 42);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_roundtrip() {
        let mut packet = Packet::new();
        for _ in 0..100 {
            packet.write_string("repetitive payload");
        }

        let mut wire = Vec::new();
        send_packet(&mut wire, &packet, &mut Lz4).unwrap();
        assert!(wire.len() < packet.data_size());

        let mut pipe = Pipe::default();
        pipe.chunks.push_back(wire);
        let mut received = Packet::new();
        let status = PacketReceiver::new()
            .receive(&mut pipe, &mut received, &mut Lz4)
            .unwrap();
        assert_eq!(status, Status::Done);
        assert_eq!(received.data(), packet.data());
    }

    #[cfg(feature = "aead")]
    #[test]
    fn test_sealed_roundtrip_and_tamper() {
        let key = [7u8; 32];
        let mut sender = Sealed::new(&key, *b"peer");
        let mut receiver = Sealed::new(&key, *b"self");

        let first = encode_datagram(&sample_packet(), &mut sender).unwrap();
        let second = encode_datagram(&sample_packet(), &mut sender).unwrap();
        assert_ne!(first, second);
        assert_eq!(sender.sent(), 2);

        let mut packet = Packet::new();
        decode_datagram(&first, &mut packet, &mut receiver).unwrap();
        assert_eq!(packet.data(), sample_packet().data());

        let mut tampered = second.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 1;
        assert!(matches!(
            decode_datagram(&tampered, &mut packet, &mut receiver),
            Err(Error::Filter(_))
        ));
    }
}
