//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between peers is a [`Segment`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header word, sequence numbers,
//!   checksum, payload).
//! - Serialising a [`Segment`] into a fixed-size buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`], returning errors
//!   for malformed, corrupted, or wrongly sized input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!   0   1   2   3   4   5   6   7   8   9   a   b   c   d   e   f
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! |VERSION|SYN|FIN|ACK|                  LENGTH                   |
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! |             SEQ #             |             ACK #             |
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! |                           CHECKSUM                            |
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! |                 PAYLOAD (zero-padded to 1440)                 |
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! ```
//!
//! Every encoded segment is exactly [`SEGMENT_LEN`] bytes, so a receiver can
//! always read one fixed-size datagram regardless of the payload length.

use thiserror::Error;

/// Protocol version carried in the top two bits of the header word.
pub const VERSION: u8 = 1;

/// Byte length of the fixed header on the wire.
pub const HEADER_LEN: usize = 6;

/// Largest payload a single segment may carry.
pub const MAX_PAYLOAD_LEN: usize = 1440;

/// Total on-wire size of every segment.
pub const SEGMENT_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN;

/// Sequence and acknowledgement numbers live in `0..SEQ_NUM_BOUND`.
pub const SEQ_NUM_BOUND: u8 = 64;

// Bit layout of the 16-bit header word.
const VERSION_SHIFT: u16 = 14;
const SYN_BIT: u16 = 0x2000;
const FIN_BIT: u16 = 0x1000;
const ACK_BIT: u16 = 0x0800;
const LENGTH_MASK: u16 = 0x07ff;

// Byte offsets of each field within the serialised header.
const OFF_WORD: usize = 0;
const OFF_SEQ: usize = 2;
const OFF_ACK: usize = 3;
const OFF_CHECKSUM: usize = 4;

/// Errors that can arise when building or parsing a segment.
///
/// Every decode failure is a "malformed segment": the state machines treat
/// all variants the same way, the distinction only matters for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("segment is {0} bytes, expected {SEGMENT_LEN}")]
    WrongSize(usize),
    #[error("checksum verification failed")]
    ChecksumMismatch,
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),
    #[error("declared payload length {0} exceeds {MAX_PAYLOAD_LEN}")]
    LengthOutOfRange(usize),
    #[error("payload of {0} bytes exceeds {MAX_PAYLOAD_LEN}")]
    PayloadTooLarge(usize),
}

/// A decoded protocol segment.
///
/// `seq_num` and `ack_num` are always reduced modulo [`SEQ_NUM_BOUND`]; the
/// payload never exceeds [`MAX_PAYLOAD_LEN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub syn: bool,
    pub fin: bool,
    pub ack: bool,
    pub seq_num: u8,
    pub ack_num: u8,
    payload: Vec<u8>,
}

impl Segment {
    /// Build a segment, rejecting payloads longer than [`MAX_PAYLOAD_LEN`].
    pub fn new(payload: Vec<u8>, seq_num: u8, ack_num: u8) -> Result<Self, SegmentError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(SegmentError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            syn: false,
            fin: false,
            ack: false,
            seq_num: seq_num % SEQ_NUM_BOUND,
            ack_num: ack_num % SEQ_NUM_BOUND,
            payload,
        })
    }

    /// Data segment for one chunk of an outbound buffer.
    ///
    /// The caller slices its buffer with `chunks(MAX_PAYLOAD_LEN)`, so the
    /// length bound holds by construction.
    pub(crate) fn data(seq_num: u8, chunk: &[u8]) -> Self {
        debug_assert!(chunk.len() <= MAX_PAYLOAD_LEN);
        Self {
            syn: false,
            fin: false,
            ack: false,
            seq_num: seq_num % SEQ_NUM_BOUND,
            ack_num: 0,
            payload: chunk.to_vec(),
        }
    }

    /// Pure acknowledgement for `ack_num`.
    pub fn ack_for(ack_num: u8) -> Self {
        Self {
            syn: false,
            fin: false,
            ack: true,
            seq_num: 0,
            ack_num: ack_num % SEQ_NUM_BOUND,
            payload: Vec::new(),
        }
    }

    /// End-of-stream marker carrying sequence number `seq_num`.
    pub fn fin(seq_num: u8) -> Self {
        Self {
            syn: false,
            fin: true,
            ack: false,
            seq_num: seq_num % SEQ_NUM_BOUND,
            ack_num: 0,
            payload: Vec::new(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Serialise this segment into a buffer of exactly [`SEGMENT_LEN`] bytes.
    ///
    /// The checksum is computed over the whole padded buffer with the
    /// checksum field zeroed, then written into bytes 4–5.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; SEGMENT_LEN];

        let mut word = (u16::from(VERSION) << VERSION_SHIFT) | self.payload.len() as u16;
        if self.syn {
            word |= SYN_BIT;
        }
        if self.fin {
            word |= FIN_BIT;
        }
        if self.ack {
            word |= ACK_BIT;
        }
        buf[OFF_WORD..OFF_WORD + 2].copy_from_slice(&word.to_be_bytes());
        buf[OFF_SEQ] = self.seq_num % SEQ_NUM_BOUND;
        buf[OFF_ACK] = self.ack_num % SEQ_NUM_BOUND;
        buf[HEADER_LEN..HEADER_LEN + self.payload.len()].copy_from_slice(&self.payload);

        let csum = checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());

        buf
    }

    /// Parse a [`Segment`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is not exactly [`SEGMENT_LEN`] bytes,
    /// - the checksum over the whole buffer does not verify to zero,
    /// - the version bits are not [`VERSION`], or
    /// - the declared length exceeds [`MAX_PAYLOAD_LEN`].
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() != SEGMENT_LEN {
            return Err(SegmentError::WrongSize(buf.len()));
        }
        if checksum(buf) != 0 {
            return Err(SegmentError::ChecksumMismatch);
        }

        let word = u16::from_be_bytes([buf[OFF_WORD], buf[OFF_WORD + 1]]);
        let version = (word >> VERSION_SHIFT) as u8;
        if version != VERSION {
            return Err(SegmentError::BadVersion(version));
        }
        let length = usize::from(word & LENGTH_MASK);
        if length > MAX_PAYLOAD_LEN {
            return Err(SegmentError::LengthOutOfRange(length));
        }

        Ok(Self {
            syn: word & SYN_BIT != 0,
            fin: word & FIN_BIT != 0,
            ack: word & ACK_BIT != 0,
            seq_num: buf[OFF_SEQ] % SEQ_NUM_BOUND,
            ack_num: buf[OFF_ACK] % SEQ_NUM_BOUND,
            payload: buf[HEADER_LEN..HEADER_LEN + length].to_vec(),
        })
    }
}

/// 16-bit one's-complement checksum over `data`.
///
/// Sums consecutive big-endian words (an odd trailing byte is padded with a
/// zero on the right), folds the carry back in twice, and returns the
/// complement.  Over a buffer whose checksum field is already filled in, the
/// result is `0` exactly when the buffer is intact.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for w in &mut words {
        sum += u32::from(u16::from_be_bytes([w[0], w[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }

    // Two folds are enough for any buffer shorter than 64 KiB of words.
    sum = (sum & 0xffff) + (sum >> 16);
    sum = (sum & 0xffff) + (sum >> 16);

    !(sum as u16)
}
