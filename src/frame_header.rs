use bytes::{Buf, BufMut, BytesMut};
use anyhow::bail;

/// The 4-byte prefix of every frame in a session's reassembled byte stream: either the length of
///  the message that follows, or the heartbeat sentinel for a frame without payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameHeader {
    Heartbeat,
    Message { len: u32 },
}

impl FrameHeader {
    pub const SERIALIZED_LEN: usize = size_of::<u32>();

    /// all bits set - this is never a valid message length
    pub const HEARTBEAT_SENTINEL: u32 = 0xFFFF_FFFF;

    pub fn for_message(message: &[u8]) -> anyhow::Result<FrameHeader> {
        match u32::try_from(message.len()) {
            Ok(len) if len != Self::HEARTBEAT_SENTINEL => Ok(FrameHeader::Message { len }),
            _ => bail!("message of length {} cannot be framed", message.len()),
        }
    }

    pub fn from_prefix(prefix: [u8; Self::SERIALIZED_LEN]) -> FrameHeader {
        match u32::from_be_bytes(prefix) {
            Self::HEARTBEAT_SENTINEL => FrameHeader::Heartbeat,
            len => FrameHeader::Message { len },
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        match self {
            FrameHeader::Heartbeat => buf.put_u32(Self::HEARTBEAT_SENTINEL),
            FrameHeader::Message { len } => buf.put_u32(*len),
        }
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<FrameHeader> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!("incomplete frame header: {} bytes", buf.remaining());
        }
        Ok(match buf.get_u32() {
            Self::HEARTBEAT_SENTINEL => FrameHeader::Heartbeat,
            len => FrameHeader::Message { len },
        })
    }
}

/// Append a framed message, i.e. length prefix and payload. This is the encoding that peers use
///  on their side of the stream.
pub fn encode_frame(message: &[u8], buf: &mut BytesMut) -> anyhow::Result<()> {
    let header = FrameHeader::for_message(message)?;
    buf.reserve(FrameHeader::SERIALIZED_LEN + message.len());
    header.ser(buf);
    buf.put_slice(message);
    Ok(())
}

pub fn encode_heartbeat(buf: &mut BytesMut) {
    FrameHeader::Heartbeat.ser(buf);
}
