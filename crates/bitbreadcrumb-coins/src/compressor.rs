//! Compact storage form of transaction outputs.
//!
//! Amounts are stored via [`compress_amount`], and the common standard script
//! templates are reduced to a one byte tag plus the relevant hash or key.

use crate::serialize::VarInt;
use bitcoin::consensus::encode::Error;
use bitcoin::consensus::{Decodable, Encodable};
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, ScriptBuf};
use bitcoin::{Amount, PubkeyHash, PublicKey, ScriptHash, TxOut, opcodes};

/// Number of script tags with a fixed-size payload.
const NUM_SPECIAL_SCRIPTS: usize = 6;

/// Scripts longer than this are replaced by `OP_RETURN` on decode.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_EQUAL: u8 = 0x87;

// https://github.com/bitcoin/bitcoin/blob/0903ce8dbc25d3823b03d52f6e6bff74d19e801e/src/compressor.cpp#L140
pub fn compress_amount(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut e = 0;
    let mut n = n;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }
    if e < 9 {
        let d = n % 10;
        n /= 10;
        1 + (n * 9 + d - 1) * 10 + e
    } else {
        1 + (n - 1) * 10 + 9
    }
}

pub fn decompress_amount(x: u64) -> u64 {
    if x == 0 {
        return 0;
    }
    let mut x = x - 1;
    let e = x % 10;
    x /= 10;
    let mut n = if e < 9 {
        let d = (x % 9) + 1;
        x /= 9;
        x.wrapping_mul(10).wrapping_add(d)
    } else {
        x.wrapping_add(1)
    };
    for _ in 0..e {
        n = n.wrapping_mul(10);
    }
    n
}

fn to_key_id(script: &[u8]) -> Option<&[u8]> {
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        Some(&script[3..23])
    } else {
        None
    }
}

fn to_script_id(script: &[u8]) -> Option<&[u8]> {
    if script.len() == 23 && script[0] == OP_HASH160 && script[1] == 20 && script[22] == OP_EQUAL {
        Some(&script[2..22])
    } else {
        None
    }
}

/// Returns the compressed form of the public key of a pay-to-pubkey script.
fn to_pub_key(script: &[u8]) -> Option<[u8; 33]> {
    let mut out = [0u8; 33];
    if script.len() == 35
        && script[0] == 33
        && script[34] == OP_CHECKSIG
        && (script[1] == 0x02 || script[1] == 0x03)
    {
        out.copy_from_slice(&script[1..34]);
        Some(out)
    } else if script.len() == 67
        && script[0] == 65
        && script[66] == OP_CHECKSIG
        && script[1] == 0x04
    {
        // Keys not on the curve could not be restored from 32 bytes.
        bitcoin::Script::from_bytes(script).p2pk_public_key()?;
        out[0] = 0x04 | (script[65] & 0x01);
        out[1..].copy_from_slice(&script[2..34]);
        Some(out)
    } else {
        None
    }
}

fn compress_script(script: &[u8]) -> Option<Vec<u8>> {
    if let Some(hash) = to_key_id(script) {
        let mut out = Vec::with_capacity(21);
        out.push(0x00);
        out.extend_from_slice(hash);
        Some(out)
    } else if let Some(hash) = to_script_id(script) {
        let mut out = Vec::with_capacity(21);
        out.push(0x01);
        out.extend_from_slice(hash);
        Some(out)
    } else {
        to_pub_key(script).map(|key| key.to_vec())
    }
}

/// Script wrapper serialized in the compressed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCompression(pub ScriptBuf);

fn encode_script<W: bitcoin::io::Write + ?Sized>(
    script: &[u8],
    writer: &mut W,
) -> Result<usize, bitcoin::io::Error> {
    if let Some(compressed_script) = compress_script(script) {
        writer.write_all(&compressed_script)?;
        return Ok(compressed_script.len());
    }

    let size = script.len() + NUM_SPECIAL_SCRIPTS;
    let len = VarInt(size as u64).consensus_encode(writer)?;
    writer.write_all(script)?;
    Ok(len + script.len())
}

impl Encodable for ScriptCompression {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        encode_script(self.0.as_bytes(), writer)
    }
}

impl Decodable for ScriptCompression {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let size = VarInt::consensus_decode(reader)?.0;

        match size {
            0x00 => {
                // P2PKH
                let mut bytes = [0; 20];
                reader.read_exact(&mut bytes)?;
                let pubkey_hash = PubkeyHash::from_byte_array(bytes);
                Ok(Self(ScriptBuf::new_p2pkh(&pubkey_hash)))
            }
            0x01 => {
                // P2SH
                let mut bytes = [0; 20];
                reader.read_exact(&mut bytes)?;
                let script_hash = ScriptHash::from_byte_array(bytes);
                Ok(Self(ScriptBuf::new_p2sh(&script_hash)))
            }
            0x02 | 0x03 => {
                // P2PK (compressed)
                let mut bytes = [0; 32];
                reader.read_exact(&mut bytes)?;

                let mut script_bytes = Vec::with_capacity(35);
                script_bytes.push(opcodes::all::OP_PUSHBYTES_33.to_u8());
                script_bytes.push(size as u8);
                script_bytes.extend_from_slice(&bytes);
                script_bytes.push(opcodes::all::OP_CHECKSIG.to_u8());

                Ok(Self(ScriptBuf::from(script_bytes)))
            }
            0x04 | 0x05 => {
                // P2PK (uncompressed)
                let mut bytes = [0; 32];
                reader.read_exact(&mut bytes)?;

                let mut compressed_pubkey_bytes = Vec::with_capacity(33);
                compressed_pubkey_bytes.push((size - 2) as u8);
                compressed_pubkey_bytes.extend_from_slice(&bytes);

                let compressed_pubkey = PublicKey::from_slice(&compressed_pubkey_bytes)
                    .map_err(|_| Error::ParseFailed("Failed to parse PublicKey"))?;
                let inner_uncompressed = compressed_pubkey.inner.serialize_uncompressed();

                let mut script_bytes = Vec::with_capacity(67);
                script_bytes.push(opcodes::all::OP_PUSHBYTES_65.to_u8());
                script_bytes.extend_from_slice(&inner_uncompressed);
                script_bytes.push(opcodes::all::OP_CHECKSIG.to_u8());

                Ok(Self(ScriptBuf::from(script_bytes)))
            }
            _ => {
                let size = (size - NUM_SPECIAL_SCRIPTS as u64) as usize;
                if size > MAX_SCRIPT_SIZE {
                    // Skipped in chunks, the declared size is untrusted.
                    let mut remaining = size;
                    let mut chunk = [0u8; 4096];
                    while remaining > 0 {
                        let step = remaining.min(chunk.len());
                        reader.read_exact(&mut chunk[..step])?;
                        remaining -= step;
                    }
                    let script = Builder::new()
                        .push_opcode(opcodes::all::OP_RETURN)
                        .into_script();
                    Ok(Self(script))
                } else {
                    let mut bytes = vec![0u8; size];
                    reader.read_exact(&mut bytes)?;
                    Ok(Self(ScriptBuf::from_bytes(bytes)))
                }
            }
        }
    }
}

/// Transaction output serialized as `VarInt(compress_amount(value))` followed
/// by the compressed script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutCompression(pub TxOut);

pub(crate) fn encode_txout<W: bitcoin::io::Write + ?Sized>(
    txout: &TxOut,
    writer: &mut W,
) -> Result<usize, bitcoin::io::Error> {
    let amount = compress_amount(txout.value.to_sat());
    let len = VarInt(amount).consensus_encode(writer)?;
    Ok(len + encode_script(txout.script_pubkey.as_bytes(), writer)?)
}

impl Encodable for TxOutCompression {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        encode_txout(&self.0, writer)
    }
}

impl Decodable for TxOutCompression {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let value = decompress_amount(VarInt::consensus_decode(reader)?.0);
        let ScriptCompression(script_pubkey) = ScriptCompression::consensus_decode(reader)?;
        Ok(Self(TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::consensus::{deserialize, serialize};
    use hex_literal::hex;

    const MAX_MONEY: u64 = crate::amount::MAX_MONEY as u64;

    #[test]
    fn test_compress_amount() {
        for _ in 0..1000 {
            let n = fastrand::u64(..=MAX_MONEY);
            assert_eq!(n, decompress_amount(compress_amount(n)));
        }
    }

    #[test]
    fn test_compress_amount_vectors() {
        let coin = 100_000_000;
        assert_eq!(compress_amount(0), 0x0);
        assert_eq!(compress_amount(1), 0x1);
        assert_eq!(compress_amount(1_000_000), 0x7);
        assert_eq!(compress_amount(coin), 0x9);
        assert_eq!(compress_amount(50 * coin), 0x32);
        assert_eq!(compress_amount(600 * coin), 600);
        assert_eq!(compress_amount(21_000_000 * coin), 0x1406f40);
        assert_eq!(decompress_amount(600), 600 * coin);
    }

    #[test]
    fn test_script_compression_p2pkh() {
        let script = ScriptBuf::from_bytes(
            hex!("76a914816115944e077fe7c803cfa57f29b36bf87c1d3588ac").to_vec(),
        );
        let encoded = serialize(&ScriptCompression(script.clone()));
        assert_eq!(encoded, hex!("00816115944e077fe7c803cfa57f29b36bf87c1d35").to_vec());
        assert_eq!(deserialize::<ScriptCompression>(&encoded).unwrap().0, script);
    }

    #[test]
    fn test_script_compression_p2sh() {
        let script =
            ScriptBuf::from_bytes(hex!("a914e9c3dd0c07aac76179ebc76a6c78d4d67c6c160a87").to_vec());
        let encoded = serialize(&ScriptCompression(script.clone()));
        assert_eq!(encoded.len(), 21);
        assert_eq!(encoded[0], 0x01);
        assert_eq!(deserialize::<ScriptCompression>(&encoded).unwrap().0, script);
    }

    #[test]
    fn test_script_compression_uncompressed_pubkey() {
        // Output script of the first coinbase after genesis.
        let script = ScriptBuf::from_bytes(
            hex!("410496b538e853519c726a2c91e61ec11600ae1390813a627c66fb8be7947be63c52da7589379515d4e0a604f8141781e62294721166bf621e73a82cbf2342c858eeac").to_vec(),
        );
        let encoded = serialize(&ScriptCompression(script.clone()));
        assert_eq!(encoded.len(), 33);
        assert!(encoded[0] == 0x04 || encoded[0] == 0x05);
        assert_eq!(deserialize::<ScriptCompression>(&encoded).unwrap().0, script);
    }

    #[test]
    fn test_script_compression_raw() {
        let script = ScriptBuf::from_bytes(hex!("5121030b3810fd20fd3771517b2b8847d225791035ea06768e17c733a5756b6005bf55210222b6e887bb4d4bca08f97348e6b8561e6d11e0ed96dec0584b34d709078cd4a552ae").to_vec());
        let encoded = serialize(&ScriptCompression(script.clone()));
        assert_eq!(encoded[0] as usize, script.len() + NUM_SPECIAL_SCRIPTS);
        assert_eq!(deserialize::<ScriptCompression>(&encoded).unwrap().0, script);
    }

    #[test]
    fn test_oversized_script_decodes_as_op_return() {
        let size = MAX_SCRIPT_SIZE + 1;
        let mut encoded = serialize(&VarInt((size + NUM_SPECIAL_SCRIPTS) as u64));
        encoded.extend(std::iter::repeat_n(0x51, size));
        let decoded = deserialize::<ScriptCompression>(&encoded).unwrap();
        assert_eq!(decoded.0.as_bytes(), &[opcodes::all::OP_RETURN.to_u8()]);
    }

    #[test]
    fn test_truncated_special_script() {
        assert!(deserialize::<ScriptCompression>(&hex!("00816115944e")).is_err());
    }

    #[test]
    fn test_txout_compression() {
        let txout = TxOut {
            value: Amount::from_sat(60_000_000_000),
            script_pubkey: ScriptBuf::from_bytes(
                hex!("76a914816115944e077fe7c803cfa57f29b36bf87c1d3588ac").to_vec(),
            ),
        };
        let encoded = serialize(&TxOutCompression(txout.clone()));
        assert_eq!(encoded, hex!("835800816115944e077fe7c803cfa57f29b36bf87c1d35").to_vec());
        assert_eq!(deserialize::<TxOutCompression>(&encoded).unwrap().0, txout);
    }
}
