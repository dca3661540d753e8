use crate::compressor::{TxOutCompression, encode_txout};
use crate::serialize::VarInt;
use crate::undo::{TxInUndo, UndoMetadata};
use bitcoin::consensus::encode::Error;
use bitcoin::consensus::{Decodable, Encodable};
use bitcoin::{Transaction, TxOut};

/// Unspent outputs of a single transaction.
///
/// Spent outputs are kept as `None` placeholders so that output indices stay
/// stable, and trailing placeholders are trimmed by [`Coins::cleanup`]. A record
/// whose outputs are all spent is *pruned*, stores represent it by absence.
///
/// ## Serialization
///
/// - `VarInt(version)`
/// - `VarInt(code)`, where bit 0 flags a coinbase, bits 1 and 2 flag the
///   availability of outputs 0 and 1, and `code >> 3` is the number of non-zero
///   bytes in the bitmask that follows (minus one if neither output 0 nor 1 is
///   available).
/// - Availability bitmask of outputs `2..`, eight outputs per byte, least
///   significant bit first, up to the last non-zero byte.
/// - Each available output in [`TxOutCompression`] form.
/// - `VarInt(height)`
///
/// For instance `0104835800816115944e077fe7c803cfa57f29b36bf87c1d358bb85e` is a
/// version 1 record at height 203998 whose only unspent output is a P2PKH
/// output of 600 DUK at index 1.
#[derive(Debug, Clone, Default)]
pub struct Coins {
    /// Whether the transaction was a coinbase.
    pub is_coinbase: bool,
    /// Outputs of the transaction, `None` for spent slots.
    pub outputs: Vec<Option<TxOut>>,
    /// Height of the block that included the transaction.
    pub height: u32,
    /// Version of the transaction.
    pub version: i32,
}

impl Coins {
    /// Creates the record of a freshly included transaction.
    pub fn from_tx(tx: &Transaction, height: u32) -> Self {
        let mut coins = Self {
            is_coinbase: tx.is_coinbase(),
            outputs: tx.output.iter().cloned().map(Some).collect(),
            height,
            version: tx.version.0,
        };
        coins.clear_unspendable();
        coins
    }

    /// Drops trailing spent outputs.
    pub fn cleanup(&mut self) {
        while matches!(self.outputs.last(), Some(None)) {
            self.outputs.pop();
        }
        if self.outputs.is_empty() {
            self.outputs.shrink_to_fit();
        }
    }

    /// Marks outputs that can never be spent as spent.
    pub fn clear_unspendable(&mut self) {
        for output in self.outputs.iter_mut() {
            if output.as_ref().is_some_and(is_unspendable) {
                *output = None;
            }
        }
        self.cleanup();
    }

    /// Resets the record to its default, pruned state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Exchanges the contents of two records.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Spends output `vout`.
    ///
    /// Returns `None` if the output does not exist or is already spent. When
    /// the last unspent output goes, the undo record also captures the record
    /// metadata, which is needed to recreate it.
    pub fn spend(&mut self, vout: u32) -> Option<TxInUndo> {
        let txout = self.outputs.get_mut(vout as usize)?.take()?;
        self.cleanup();
        let metadata = self.outputs.is_empty().then_some(UndoMetadata {
            is_coinbase: self.is_coinbase,
            height: self.height,
            version: self.version,
        });
        Some(TxInUndo { txout, metadata })
    }

    /// Returns `true` if output `vout` exists and is unspent.
    pub fn is_available(&self, vout: u32) -> bool {
        self.output(vout).is_some()
    }

    /// Returns output `vout` if it exists and is unspent.
    pub fn output(&self, vout: u32) -> Option<&TxOut> {
        self.outputs.get(vout as usize).and_then(Option::as_ref)
    }

    /// Returns `true` if every output is spent.
    pub fn is_pruned(&self) -> bool {
        self.outputs.iter().all(Option::is_none)
    }

    /// Number of unspent outputs.
    pub fn available_count(&self) -> usize {
        self.outputs.iter().flatten().count()
    }

    /// Returns `(bytes, nonzero)`, the length of the availability bitmask of
    /// outputs `2..` and how many of its bytes are non-zero.
    pub fn calc_mask_size(&self) -> (usize, usize) {
        let mut bytes = 0;
        let mut nonzero = 0;
        let tail = self.outputs.get(2..).unwrap_or_default();
        for (index, chunk) in tail.chunks(8).enumerate() {
            if chunk.iter().any(Option::is_some) {
                bytes = index + 1;
                nonzero += 1;
            }
        }
        (bytes, nonzero)
    }

    /// Encodes the record for storage, fails for pruned records.
    pub fn encode_for_storage(&self) -> Result<Vec<u8>, bitcoin::io::Error> {
        let mut bytes = Vec::new();
        self.consensus_encode(&mut bytes)?;
        Ok(bytes)
    }

    /// Decodes a stored record, rejecting trailing bytes.
    pub fn decode_from_storage(bytes: &[u8]) -> Result<Self, Error> {
        bitcoin::consensus::deserialize(bytes)
    }

    fn slot_available(&self, index: usize) -> bool {
        self.outputs.get(index).is_some_and(Option::is_some)
    }
}

/// Provably unspendable output script, i.e. one starting with `OP_RETURN`.
fn is_unspendable(output: &TxOut) -> bool {
    output.script_pubkey.is_op_return()
}

impl PartialEq for Coins {
    fn eq(&self, other: &Self) -> bool {
        // Empty records are equal regardless of their metadata.
        if self.is_pruned() && other.is_pruned() {
            return true;
        }
        self.is_coinbase == other.is_coinbase
            && self.height == other.height
            && self.version == other.version
            && self.outputs == other.outputs
    }
}

impl Eq for Coins {}

impl Encodable for Coins {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        if self.is_pruned() {
            return Err(bitcoin::io::Error::from(bitcoin::io::ErrorKind::InvalidInput));
        }

        let (mask_size, mask_code) = self.calc_mask_size();
        let first = self.slot_available(0);
        let second = self.slot_available(1);
        let code = 8 * (mask_code as u64 - u64::from(!(first || second)))
            + u64::from(self.is_coinbase)
            + 2 * u64::from(first)
            + 4 * u64::from(second);

        let mut len = VarInt(u64::from(self.version as u32)).consensus_encode(writer)?;
        len += VarInt(code).consensus_encode(writer)?;

        for byte_index in 0..mask_size {
            let mut avail = 0u8;
            for bit in 0..8 {
                if self.slot_available(2 + byte_index * 8 + bit) {
                    avail |= 1 << bit;
                }
            }
            len += avail.consensus_encode(writer)?;
        }

        for output in self.outputs.iter().flatten() {
            len += encode_txout(output, writer)?;
        }

        len += VarInt(u64::from(self.height)).consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for Coins {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let version = u32::try_from(VarInt::consensus_decode(reader)?.0)
            .map_err(|_| Error::ParseFailed("Coins version out of range"))?
            as i32;

        let code = VarInt::consensus_decode(reader)?.0;
        let is_coinbase = code & 1 != 0;
        let mut avail = vec![code & 2 != 0, code & 4 != 0];
        let mut mask_code = (code / 8) + u64::from(code & 6 == 0);

        while mask_code > 0 {
            let byte = u8::consensus_decode(reader)?;
            avail.extend((0..8).map(|bit| byte & (1 << bit) != 0));
            if byte != 0 {
                mask_code -= 1;
            }
        }

        let outputs = avail
            .into_iter()
            .map(|available| {
                available
                    .then(|| TxOutCompression::consensus_decode(reader).map(|txout| txout.0))
                    .transpose()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let height = u32::try_from(VarInt::consensus_decode(reader)?.0)
            .map_err(|_| Error::ParseFailed("Coins height out of range"))?;

        let mut coins = Self {
            is_coinbase,
            outputs,
            height,
            version,
        };
        coins.cleanup();

        if coins.is_pruned() {
            return Err(Error::ParseFailed("Coins record without unspent outputs"));
        }

        Ok(coins)
    }
}
