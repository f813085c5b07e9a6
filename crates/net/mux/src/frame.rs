//! Length-prefixed multiplexer frames.
//!
//! Frames are laid out as:
//! - 4 bytes: big-endian stream id
//! - 1 byte: frame kind
//! - 4 bytes: big-endian payload length
//! - N bytes: payload (protocol id for `Open`, stream bytes for `Data`, empty otherwise)

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Header size: 4 bytes stream id + 1 byte kind + 4 bytes length.
pub const HEADER_LEN: usize = 9;

/// Longest accepted protocol identifier.
pub const MAX_PROTOCOL_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Request a new stream; payload is the protocol id.
    Open = 0,
    Accept = 1,
    /// No handler for the requested protocol.
    Reject = 2,
    Data = 3,
    /// Sender will write no more (half-close).
    Close = 4,
    /// Abort the stream in both directions.
    Reset = 5,
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Open,
            1 => Self::Accept,
            2 => Self::Reject,
            3 => Self::Data,
            4 => Self::Close,
            5 => Self::Reset,
            other => return Err(FrameError::UnknownKind(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream_id: u32,
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    fn empty(stream_id: u32, kind: FrameKind) -> Self {
        Self {
            stream_id,
            kind,
            payload: Bytes::new(),
        }
    }

    pub fn open(stream_id: u32, protocol: &str) -> Self {
        Self {
            stream_id,
            kind: FrameKind::Open,
            payload: Bytes::copy_from_slice(protocol.as_bytes()),
        }
    }

    pub fn accept(stream_id: u32) -> Self {
        Self::empty(stream_id, FrameKind::Accept)
    }

    pub fn reject(stream_id: u32) -> Self {
        Self::empty(stream_id, FrameKind::Reject)
    }

    pub fn data(stream_id: u32, payload: Bytes) -> Self {
        Self {
            stream_id,
            kind: FrameKind::Data,
            payload,
        }
    }

    pub fn close(stream_id: u32) -> Self {
        Self::empty(stream_id, FrameKind::Close)
    }

    pub fn reset(stream_id: u32) -> Self {
        Self::empty(stream_id, FrameKind::Reset)
    }

    /// Protocol id carried by an `Open` frame.
    pub fn protocol(&self) -> Result<&str, FrameError> {
        if self.payload.is_empty() || self.payload.len() > MAX_PROTOCOL_LEN {
            return Err(FrameError::InvalidProtocol);
        }
        std::str::from_utf8(&self.payload).map_err(|_| FrameError::InvalidProtocol)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("frame payload too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
    #[error("protocol id must be 1..={MAX_PROTOCOL_LEN} bytes of UTF-8")]
    InvalidProtocol,
}

/// Codec for multiplexer frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
    /// Header of the frame currently being read, once complete.
    current: Option<(u32, FrameKind, usize)>,
}

impl FrameCodec {
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            current: None,
        }
    }
}

impl asynchronous_codec::Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (stream_id, kind, length) = match self.current {
            Some(header) => header,
            None => {
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }

                let stream_id = src.get_u32();
                let kind = FrameKind::try_from(src.get_u8())?;
                let length = src.get_u32() as usize;

                if length > self.max_payload {
                    return Err(FrameError::TooLarge {
                        size: length,
                        max: self.max_payload,
                    });
                }

                let header = (stream_id, kind, length);
                self.current = Some(header);
                header
            }
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        self.current = None;
        let payload = src.split_to(length).freeze();
        Ok(Some(Frame {
            stream_id,
            kind,
            payload,
        }))
    }
}

impl asynchronous_codec::Encoder for FrameCodec {
    type Item<'a> = Frame;
    type Error = FrameError;

    fn encode(&mut self, frame: Self::Item<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = frame.payload.len();
        if length > self.max_payload {
            return Err(FrameError::TooLarge {
                size: length,
                max: self.max_payload,
            });
        }

        dst.reserve(HEADER_LEN + length);
        dst.put_u32(frame.stream_id);
        dst.put_u8(frame.kind as u8);
        dst.put_u32(length as u32);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
