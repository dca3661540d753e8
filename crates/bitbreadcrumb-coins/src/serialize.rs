use bitcoin::consensus::encode::Error;
use bitcoin::consensus::{Decodable, Encodable};

/// Variable-length integer in the MSB base-128 format used by the coins database.
///
/// Each byte carries 7 bits, high groups first, with the continuation bit set on
/// every byte but the last. Every continuation also subtracts one from the
/// remaining value, so each integer has exactly one encoding.
///
/// This is distinct from the `CompactSize` used on the wire.
// https://github.com/bitcoin/bitcoin/blob/0903ce8dbc25d3823b03d52f6e6bff74d19e801e/src/serialize.h#L400
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VarInt(pub u64);

impl From<u64> for VarInt {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<VarInt> for u64 {
    fn from(value: VarInt) -> Self {
        value.0
    }
}

impl VarInt {
    /// Number of bytes used by the encoding of this value.
    pub fn len(&self) -> usize {
        let mut n = self.0;
        let mut len = 1;
        while n > 0x7F {
            n = (n >> 7) - 1;
            len += 1;
        }
        len
    }

    /// Always `false`, an encoded integer occupies at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Encodable for VarInt {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        // A u64 never needs more than 10 groups of 7 bits.
        let mut tmp = [0u8; 10];
        let mut n = self.0;
        let mut len = 0;
        loop {
            tmp[len] = (n & 0x7F) as u8 | if len > 0 { 0x80 } else { 0x00 };
            if n <= 0x7F {
                break;
            }
            n = (n >> 7) - 1;
            len += 1;
        }
        tmp[..=len].reverse();
        writer.write_all(&tmp[..=len])?;
        Ok(len + 1)
    }
}

impl Decodable for VarInt {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let mut n: u64 = 0;
        loop {
            let byte = u8::consensus_decode(reader)?;
            if n > (u64::MAX >> 7) {
                return Err(Error::ParseFailed("VarInt exceeds 64 bits"));
            }
            n = (n << 7) | u64::from(byte & 0x7F);
            if byte & 0x80 != 0 {
                if n == u64::MAX {
                    return Err(Error::ParseFailed("VarInt exceeds 64 bits"));
                }
                n += 1;
            } else {
                return Ok(Self(n));
            }
        }
    }
}
