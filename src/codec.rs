//! Stream framing for MessagePack-RPC messages.
//!
//! MessagePack values are self-delimiting, so there is no length prefix. The decoder walks the
//! marker and length headers of the buffered bytes to find where the next value ends, keeping its
//! place between calls, and only parses the value once all of its bytes have arrived.
use std::io::{self, ErrorKind};

use bytes::{BufMut, BytesMut};
use rmp::Marker;
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    error::{ProtocolError, Result, RpcError},
    message::Message,
};

/// Codec for reading and writing [`Message`]s on a byte stream.
#[derive(Debug, Default, Clone)]
pub struct MessageCodec {
    /// Bytes of the current frame already walked.
    scanned: usize,
    /// Items of the current frame still to walk. Zero between frames.
    remaining: u64,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances over complete item headers and payloads. Returns the frame length once the whole
    /// value is buffered.
    fn scan(&mut self, src: &[u8]) -> Option<usize> {
        if self.remaining == 0 {
            if src.is_empty() {
                return None;
            }
            self.scanned = 0;
            self.remaining = 1;
        }
        while self.remaining > 0 {
            let (len, children) = item_extent(&src[self.scanned..])?;
            if self.scanned + len > src.len() {
                return None;
            }
            self.scanned += len;
            self.remaining = self.remaining - 1 + children;
        }
        Some(std::mem::take(&mut self.scanned))
    }
}

/// Size of the item starting at `buf[0]` excluding nested items, and the number of nested items
/// that follow it. `None` if its header is not fully buffered.
fn item_extent(buf: &[u8]) -> Option<(usize, u64)> {
    let extent = match Marker::from_u8(*buf.first()?) {
        Marker::FixPos(_)
        | Marker::FixNeg(_)
        | Marker::Null
        | Marker::True
        | Marker::False
        | Marker::Reserved => (1, 0),
        Marker::U8 | Marker::I8 => (2, 0),
        Marker::U16 | Marker::I16 => (3, 0),
        Marker::U32 | Marker::I32 | Marker::F32 => (5, 0),
        Marker::U64 | Marker::I64 | Marker::F64 => (9, 0),
        Marker::FixStr(len) => (1 + usize::from(len), 0),
        Marker::Str8 | Marker::Bin8 => (2 + header_len(buf, 1)?, 0),
        Marker::Str16 | Marker::Bin16 => (3 + header_len(buf, 2)?, 0),
        Marker::Str32 | Marker::Bin32 => (5 + header_len(buf, 4)?, 0),
        Marker::FixArray(len) => (1, u64::from(len)),
        Marker::Array16 => (3, header_len(buf, 2)? as u64),
        Marker::Array32 => (5, header_len(buf, 4)? as u64),
        Marker::FixMap(len) => (1, 2 * u64::from(len)),
        Marker::Map16 => (3, 2 * header_len(buf, 2)? as u64),
        Marker::Map32 => (5, 2 * header_len(buf, 4)? as u64),
        Marker::FixExt1 => (3, 0),
        Marker::FixExt2 => (4, 0),
        Marker::FixExt4 => (6, 0),
        Marker::FixExt8 => (10, 0),
        Marker::FixExt16 => (18, 0),
        Marker::Ext8 => (3 + header_len(buf, 1)?, 0),
        Marker::Ext16 => (4 + header_len(buf, 2)?, 0),
        Marker::Ext32 => (6 + header_len(buf, 4)?, 0),
    };
    Some(extent)
}

/// Big-endian length of `width` bytes right after the marker.
fn header_len(buf: &[u8], width: usize) -> Option<usize> {
    let bytes = buf.get(1..1 + width)?;
    Some(bytes.iter().fold(0, |len, byte| (len << 8) | usize::from(*byte)))
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let Some(len) = self.scan(&src[..]) else {
            return Ok(None);
        };
        let frame = src.split_to(len);
        let value = match rmpv::decode::read_value(&mut &frame[..]) {
            Ok(value) => value,
            Err(rmpv::decode::Error::DepthLimitExceeded) => {
                return Err(ProtocolError::DepthLimitExceeded.into());
            }
            Err(e) => return Err(e.into()),
        };
        Message::from_value(value).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(RpcError::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                "connection closed mid-message",
            ))),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = RpcError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<()> {
        message.encode(&mut dst.writer())
    }
}
