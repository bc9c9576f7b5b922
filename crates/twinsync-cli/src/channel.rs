//! Command channel framing
//!
//! The synchronizer daemon accepts two opaque commands, `SYNC` and `DROP`,
//! over a duplex byte stream. Frames are a 2-byte big-endian length prefix
//! counting payload bytes, followed by the payload as UTF-16BE text.
//! Replies use the same framing.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Command that triggers one synchronization run
pub const CMD_SYNC: &str = "SYNC";
/// Command that shuts the daemon down gracefully
pub const CMD_DROP: &str = "DROP";

/// Length-prefixed UTF-16 string framing
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandCodec;

impl Decoder for CommandCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::io::Result<Option<String>> {
        if src.len() < 2 {
            return Ok(None);
        }
        let length = u16::from_be_bytes([src[0], src[1]]) as usize;
        if length % 2 != 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "frame length is not a whole number of UTF-16 units",
            ));
        }
        if src.len() < 2 + length {
            src.reserve(2 + length - src.len());
            return Ok(None);
        }
        src.advance(2);
        let payload = src.split_to(length);
        let units: Vec<u16> = payload
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map(Some).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }
}

impl Encoder<String> for CommandCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> std::io::Result<()> {
        let units: Vec<u16> = item.encode_utf16().collect();
        let length = units.len() * 2;
        if length > u16::MAX as usize {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "frame payload too large",
            ));
        }
        dst.reserve(2 + length);
        dst.put_u16(length as u16);
        for unit in units {
            dst.put_u16(unit);
        }
        Ok(())
    }
}
