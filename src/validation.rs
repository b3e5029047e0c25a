use anyhow::bail;
use crc::{Crc, CRC_32_ISO_HDLC};
#[cfg(test)] use mockall::automock;
use crate::engine::ENGINE_HEADER_LEN;

/// Optional inbound filter. It is called for every datagram that is long enough to carry a conv,
///  before any session is created or looked up, and sees the checksum prefix followed by the
///  engine header (but not the payload).
///
/// Returning an error drops the datagram.
#[cfg_attr(test, automock)]
pub trait PacketValidator: Send + Sync + 'static {
    fn validate(&self, conv: u32, header: &[u8]) -> anyhow::Result<()>;
}

/// Validator for datagrams prefixed with a big-endian CRC-32 of the engine header.
///
/// NB: The checksum protects the header only. Payload integrity is the engine's concern.
pub struct Crc32Validator {
    crc: Crc<u32>,
}

impl Default for Crc32Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32Validator {
    pub const CHECKSUM_LEN: usize = size_of::<u32>();

    pub fn new() -> Crc32Validator {
        Crc32Validator {
            crc: Crc::<u32>::new(&CRC_32_ISO_HDLC),
        }
    }

    pub fn checksum(&self, engine_header: &[u8]) -> u32 {
        self.crc.checksum(engine_header)
    }

    /// The prefix a peer puts in front of an engine datagram so that it passes validation
    pub fn prefix_for(&self, engine_datagram: &[u8]) -> anyhow::Result<[u8; Self::CHECKSUM_LEN]> {
        if engine_datagram.len() < ENGINE_HEADER_LEN {
            bail!("datagram of {} bytes is shorter than the engine header", engine_datagram.len());
        }
        Ok(self.checksum(&engine_datagram[..ENGINE_HEADER_LEN]).to_be_bytes())
    }
}

impl PacketValidator for Crc32Validator {
    fn validate(&self, conv: u32, header: &[u8]) -> anyhow::Result<()> {
        if header.len() != Self::CHECKSUM_LEN + ENGINE_HEADER_LEN {
            bail!("conv {}: expected {} header bytes, got {}", conv, Self::CHECKSUM_LEN + ENGINE_HEADER_LEN, header.len());
        }

        let (prefix, engine_header) = header.split_at(Self::CHECKSUM_LEN);
        let expected = self.checksum(engine_header);
        let actual = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if actual != expected {
            bail!("conv {}: header checksum mismatch - expected {:08x}, was {:08x}", conv, expected, actual);
        }
        Ok(())
    }
}
