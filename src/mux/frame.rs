//! Wire frames of the reference multiplexer.
//!
//! ```text
//! +------+-----------+-----------+---------------+
//! | kind | stream id |  length   |    payload    |
//! |  u8  |  u32 (BE) |  u32 (BE) | length bytes  |
//! +------+-----------+-----------+---------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::transport::{TransportError, TransportResult};

pub const HEADER_LEN: usize = 9;

/// Largest payload one frame may carry.
pub const MAX_PAYLOAD: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Open = 1,
    Data = 2,
    Close = 3,
}

impl TryFrom<u8> for FrameKind {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FrameKind::Open),
            2 => Ok(FrameKind::Data),
            3 => Ok(FrameKind::Close),
            other => Err(TransportError::Protocol(format!(
                "unknown frame kind {other:#04x}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn open(stream_id: u32) -> Self {
        Self {
            kind: FrameKind::Open,
            stream_id,
            payload: Bytes::new(),
        }
    }

    pub fn data(stream_id: u32, payload: Bytes) -> Self {
        Self {
            kind: FrameKind::Data,
            stream_id,
            payload,
        }
    }

    pub fn close(stream_id: u32) -> Self {
        Self {
            kind: FrameKind::Close,
            stream_id,
            payload: Bytes::new(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(self.kind as u8);
        dst.put_u32(self.stream_id);
        dst.put_u32(self.payload.len() as u32);
        dst.put_slice(&self.payload);
    }

    /// Parse the fixed-size header: kind, stream id and payload length.
    pub fn decode_header(mut header: &[u8]) -> TransportResult<(FrameKind, u32, usize)> {
        if header.len() < HEADER_LEN {
            return Err(TransportError::Protocol(format!(
                "short frame header: {} bytes",
                header.len()
            )));
        }
        let kind = FrameKind::try_from(header.get_u8())?;
        let stream_id = header.get_u32();
        let len = header.get_u32() as usize;
        if len > MAX_PAYLOAD {
            return Err(TransportError::Protocol(format!(
                "frame payload {len} exceeds {MAX_PAYLOAD}"
            )));
        }
        Ok((kind, stream_id, len))
    }

    /// Read one frame. `Ok(None)` means the peer closed cleanly between
    /// frames.
    pub async fn read_from<R>(reader: &mut R) -> TransportResult<Option<Frame>>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_LEN];
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let (kind, stream_id, len) = Self::decode_header(&header)?;
        let mut payload = BytesMut::zeroed(len);
        reader.read_exact(&mut payload).await?;

        Ok(Some(Frame {
            kind,
            stream_id,
            payload: payload.freeze(),
        }))
    }
}
