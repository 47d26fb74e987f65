//! Frame codec.
//!
//! Wire layout, octet-exact and little-endian:
//!
//! ```text
//! Header (2 bytes): byte0 = type:4 | hop:4 (low nibble is the type),
//!                   byte1 = dest
//! Footer (2 bytes): trace, little-endian u16
//! Beacon (4 bytes): Header . Footer
//! Data   (4+N bytes): Header . payload[N] . Footer
//! ```
//!
//! Decoding never mutates node state: a frame is only ever accepted after
//! its length has been checked against the declared type's exact
//! serialised size.

use byteorder::{ByteOrder, LittleEndian};
use heapless::Vec;

use crate::config::{TRACE_MASK, TRACE_MAX, TRACE_SHIFT};

/// Upper bound on `Config::max_payload_len` so the payload can live in a
/// fixed-capacity `heapless::Vec` without `alloc`. Matches the original
/// firmware's `MAX_LEN_FRAME` headroom; actual frames are always exactly
/// `4 + max_payload_len` bytes, never this cap.
pub const MAX_PAYLOAD_CAP: usize = 32;

pub const HEADER_LEN: usize = 2;
pub const FOOTER_LEN: usize = 2;
pub const BEACON_LEN: usize = HEADER_LEN + FOOTER_LEN;

/// A frame failed to decode: either its length didn't match any recognised
/// frame size, or its type nibble was not `BEACON`/`DATA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Buffer length didn't match the declared (or any) frame's exact size.
    BadLength,
    /// Type nibble was neither `BEACON` (0) nor `DATA` (1).
    UnknownType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    Beacon = 0,
    Data = 1,
}

impl FrameType {
    fn from_nibble(n: u8) -> Result<FrameType, DecodeError> {
        match n & 0x0f {
            0 => Ok(FrameType::Beacon),
            1 => Ok(FrameType::Data),
            _ => Err(DecodeError::UnknownType),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub frame_type: FrameType,
    /// Beacon: distance from root. Data: remaining hop budget toward root.
    pub hop: u8,
    pub dest: u8,
}

impl Header {
    fn encode(&self, buf: &mut [u8]) {
        buf[0] = (self.frame_type as u8 & 0x0f) | ((self.hop & 0x0f) << 4);
        buf[1] = self.dest;
    }

    fn decode(buf: &[u8]) -> Result<Header, DecodeError> {
        let frame_type = FrameType::from_nibble(buf[0])?;
        let hop = (buf[0] >> 4) & 0x0f;
        let dest = buf[1];
        Ok(Header { frame_type, hop, dest })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Footer {
    pub trace: u16,
}

impl Footer {
    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u16(buf, self.trace);
    }

    fn decode(buf: &[u8]) -> Footer {
        Footer { trace: LittleEndian::read_u16(buf) }
    }

    /// Fragment written into position `slot` (`data.hop` at forward time),
    /// masked to `TRACE_SHIFT` bits, if `slot` is within `TRACE_MAX`.
    pub fn fragment_at(&self, slot: u8) -> Option<u8> {
        if slot >= TRACE_MAX {
            return None;
        }
        Some((self.trace >> (TRACE_SHIFT * slot as u32)) as u8 & TRACE_MASK)
    }

    /// Returns a copy of this footer with `id`'s low `TRACE_SHIFT` bits
    /// written into position `slot`, if `slot < TRACE_MAX`.
    pub fn with_fragment(mut self, slot: u8, id: u8) -> Footer {
        if slot < TRACE_MAX {
            let bits = (TRACE_MASK & id) as u16;
            self.trace |= bits << (TRACE_SHIFT * slot as u32);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Beacon {
    pub hop: u8,
    pub dest: u8,
}

impl Beacon {
    pub fn new(hop: u8, dest: u8) -> Beacon {
        Beacon { hop, dest }
    }

    fn header(&self) -> Header {
        Header { frame_type: FrameType::Beacon, hop: self.hop, dest: self.dest }
    }

    pub fn encode(&self, buf: &mut [u8]) -> usize {
        self.header().encode(&mut buf[..HEADER_LEN]);
        Footer::default().encode(&mut buf[HEADER_LEN..BEACON_LEN]);
        BEACON_LEN
    }

    pub fn decode(buf: &[u8]) -> Result<Beacon, DecodeError> {
        if buf.len() != BEACON_LEN {
            return Err(DecodeError::BadLength);
        }
        let header = Header::decode(buf)?;
        if header.frame_type != FrameType::Beacon {
            return Err(DecodeError::UnknownType);
        }
        Ok(Beacon { hop: header.hop, dest: header.dest })
    }

    /// A rebroadcast of this beacon, one hop further from the root.
    pub fn rebroadcast(&self) -> Beacon {
        Beacon { hop: self.hop + 1, dest: self.dest }
    }
}

/// A data frame with owned, fixed-capacity payload storage.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    pub hop: u8,
    pub dest: u8,
    pub footer: Footer,
    payload: Vec<u8, MAX_PAYLOAD_CAP>,
}

impl Data {
    pub fn new(hop: u8, dest: u8, footer: Footer, payload: &[u8]) -> Data {
        Data { hop, dest, footer, payload: Vec::from_slice(payload).unwrap_or_default() }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn header(&self) -> Header {
        Header { frame_type: FrameType::Data, hop: self.hop, dest: self.dest }
    }

    /// Encode into `buf`, zero-padding the payload out to `max_payload_len`
    /// bytes (frames are always exactly `4 + max_payload_len` long).
    pub fn encode(&self, buf: &mut [u8], max_payload_len: usize) -> usize {
        let len = HEADER_LEN + max_payload_len + FOOTER_LEN;
        self.header().encode(&mut buf[..HEADER_LEN]);

        let body = &mut buf[HEADER_LEN..HEADER_LEN + max_payload_len];
        for b in body.iter_mut() {
            *b = 0;
        }
        let n = self.payload.len().min(max_payload_len);
        body[..n].copy_from_slice(&self.payload[..n]);

        self.footer.encode(&mut buf[HEADER_LEN + max_payload_len..len]);
        len
    }

    pub fn decode(buf: &[u8], max_payload_len: usize) -> Result<Data, DecodeError> {
        let expected = HEADER_LEN + max_payload_len + FOOTER_LEN;
        if buf.len() != expected {
            return Err(DecodeError::BadLength);
        }
        let header = Header::decode(buf)?;
        if header.frame_type != FrameType::Data {
            return Err(DecodeError::UnknownType);
        }
        let payload = &buf[HEADER_LEN..HEADER_LEN + max_payload_len];
        let footer = Footer::decode(&buf[HEADER_LEN + max_payload_len..expected]);

        Ok(Data {
            hop: header.hop,
            dest: header.dest,
            footer,
            payload: Vec::from_slice(payload).map_err(|_| DecodeError::BadLength)?,
        })
    }
}

/// Either frame kind, as produced by [`decode_any`] when the caller doesn't
/// yet know which type a received buffer holds — a beacon can legitimately
/// be heard during a data slot and must still be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    Beacon(Beacon),
    Data(Data),
}

/// Try to decode `buf` as a beacon first, then as a data frame, returning
/// whichever shape matches; `UnknownType`/`BadLength` if neither does.
pub fn decode_any(buf: &[u8], max_payload_len: usize) -> Result<Frame, DecodeError> {
    if buf.len() == BEACON_LEN {
        return Beacon::decode(buf).map(Frame::Beacon);
    }
    if buf.len() == HEADER_LEN + max_payload_len + FOOTER_LEN {
        return Data::decode(buf, max_payload_len).map(Frame::Data);
    }
    Err(DecodeError::BadLength)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn beacon_round_trips() {
        let b = Beacon::new(2, 0xff);
        let mut buf = [0u8; BEACON_LEN];
        let n = b.encode(&mut buf);
        assert_eq!(n, BEACON_LEN);
        let decoded = Beacon::decode(&buf).unwrap();
        assert_eq!(decoded, b);
    }

    #[test]
    fn beacon_rejects_wrong_length() {
        let buf = [0u8; 3];
        assert_eq!(Beacon::decode(&buf), Err(DecodeError::BadLength));
    }

    #[test]
    fn beacon_rejects_data_type_nibble() {
        let mut buf = [0u8; BEACON_LEN];
        buf[0] = FrameType::Data as u8;
        assert_eq!(Beacon::decode(&buf), Err(DecodeError::UnknownType));
    }

    #[test]
    fn data_round_trips_with_padding() {
        let footer = Footer::default().with_fragment(0, 3);
        let d = Data::new(2, 0, footer, &[0xaa, 0xbb]);
        let mut buf = [0u8; HEADER_LEN + 6 + FOOTER_LEN];
        let n = d.encode(&mut buf, 6);
        assert_eq!(n, buf.len());
        // payload bytes beyond what was set are zero-padded
        assert_eq!(&buf[HEADER_LEN..HEADER_LEN + 2], &[0xaa, 0xbb]);
        assert_eq!(&buf[HEADER_LEN + 2..HEADER_LEN + 6], &[0, 0, 0, 0]);

        let decoded = Data::decode(&buf, 6).unwrap();
        assert_eq!(decoded.hop, 2);
        assert_eq!(decoded.dest, 0);
        assert_eq!(decoded.footer.fragment_at(0), Some(3));
    }

    #[test]
    fn data_rejects_wrong_length() {
        let buf = [0u8; 5];
        assert_eq!(Data::decode(&buf, 6), Err(DecodeError::BadLength));
    }

    #[test]
    fn trace_fragments_pack_independently() {
        let f = Footer::default().with_fragment(0, 3).with_fragment(1, 2);
        assert_eq!(f.fragment_at(0), Some(3));
        assert_eq!(f.fragment_at(1), Some(2));
        assert_eq!(f.fragment_at(2), Some(0));
    }

    #[test]
    fn trace_fragment_out_of_range_is_noop() {
        let f = Footer::default().with_fragment(TRACE_MAX, 7);
        assert_eq!(f.trace, 0);
        assert_eq!(f.fragment_at(TRACE_MAX), None);
    }

    #[test]
    fn decode_any_picks_matching_shape() {
        let b = Beacon::new(1, 0xff);
        let mut buf = [0u8; BEACON_LEN];
        b.encode(&mut buf);
        assert_eq!(decode_any(&buf, 6), Ok(Frame::Beacon(b)));

        let d = Data::new(1, 0, Footer::default(), &[1, 2, 3]);
        let mut dbuf = [0u8; HEADER_LEN + 6 + FOOTER_LEN];
        d.encode(&mut dbuf, 6);
        match decode_any(&dbuf, 6).unwrap() {
            Frame::Data(got) => assert_eq!(got.payload(), &[1, 2, 3, 0, 0, 0]),
            Frame::Beacon(_) => panic!("expected data frame"),
        }
    }
}
