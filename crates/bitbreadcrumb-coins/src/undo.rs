//! Undo data for disconnecting transactions during chain reorganizations.
//!
//! When a transaction is connected, every output it spends is recorded in a
//! [`TxInUndo`]. Reverting the transaction restores these outputs, recreating
//! the spent record itself when its last output was consumed.

use crate::cache::CoinsViewCache;
use crate::coins::Coins;
use crate::compressor::{TxOutCompression, encode_txout};
use crate::serialize::VarInt;
use crate::view::CoinsView;
use bitcoin::consensus::encode::{Error, VarInt as CompactSize};
use bitcoin::consensus::{Decodable, Encodable};
use bitcoin::{OutPoint, Transaction, TxOut};

/// Upper bound of entries preallocated while decoding a [`TxUndo`].
const MAX_PREALLOCATED_INPUTS: usize = 1024;

/// Metadata of a record whose last unspent output was spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoMetadata {
    pub is_coinbase: bool,
    pub height: u32,
    pub version: i32,
}

/// Undo information for a single spent output.
///
/// Serialized as `VarInt(height * 2 + coinbase)`, then `VarInt(version)` if the
/// height is non-zero, then the output in compressed form. Without metadata the
/// leading code is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInUndo {
    /// The spent output.
    pub txout: TxOut,
    /// Present if spending this output pruned the record.
    pub metadata: Option<UndoMetadata>,
}

impl TxInUndo {
    /// Undo information of an output whose record still has unspent outputs.
    pub fn new(txout: TxOut) -> Self {
        Self {
            txout,
            metadata: None,
        }
    }
}

impl Encodable for TxInUndo {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        let code = self.metadata.map_or(0, |metadata| {
            u64::from(metadata.height) * 2 + u64::from(metadata.is_coinbase)
        });
        let mut len = VarInt(code).consensus_encode(writer)?;
        if let Some(metadata) = self.metadata.filter(|metadata| metadata.height > 0) {
            len += VarInt(u64::from(metadata.version as u32)).consensus_encode(writer)?;
        }
        len += encode_txout(&self.txout, writer)?;
        Ok(len)
    }
}

impl Decodable for TxInUndo {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let code = VarInt::consensus_decode(reader)?.0;
        let height = u32::try_from(code / 2)
            .map_err(|_| Error::ParseFailed("TxInUndo height out of range"))?;
        let is_coinbase = code & 1 != 0;

        let metadata = if height > 0 {
            let version = u32::try_from(VarInt::consensus_decode(reader)?.0)
                .map_err(|_| Error::ParseFailed("TxInUndo version out of range"))?;
            Some(UndoMetadata {
                is_coinbase,
                height,
                version: version as i32,
            })
        } else {
            None
        };

        let TxOutCompression(txout) = TxOutCompression::consensus_decode(reader)?;

        Ok(Self { txout, metadata })
    }
}

/// Undo information for all inputs of a transaction, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxUndo {
    pub prevouts: Vec<TxInUndo>,
}

impl Encodable for TxUndo {
    fn consensus_encode<W: bitcoin::io::Write + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<usize, bitcoin::io::Error> {
        let mut len = CompactSize(self.prevouts.len() as u64).consensus_encode(writer)?;
        for prevout in &self.prevouts {
            len += prevout.consensus_encode(writer)?;
        }
        Ok(len)
    }
}

impl Decodable for TxUndo {
    fn consensus_decode<R: bitcoin::io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let count = CompactSize::consensus_decode(reader)?.0 as usize;
        let mut prevouts = Vec::with_capacity(count.min(MAX_PREALLOCATED_INPUTS));
        for _ in 0..count {
            prevouts.push(TxInUndo::consensus_decode(reader)?);
        }
        Ok(Self { prevouts })
    }
}

impl<V: CoinsView> CoinsViewCache<V> {
    /// Connects `tx` at `height`: spends its inputs and adds its outputs.
    ///
    /// Returns the undo data needed by [`Self::disconnect_tx`].
    ///
    /// # Panics
    ///
    /// Panics if an input refers to an unavailable output, the caller must have
    /// checked [`Self::have_inputs`] before.
    pub fn update_coins(&mut self, tx: &Transaction, height: u32) -> TxUndo {
        let mut undo = TxUndo::default();

        if !tx.is_coinbase() {
            undo.prevouts.reserve(tx.input.len());
            for input in &tx.input {
                let prevout = input.previous_output;
                let mut coins = self.modify_coins(&prevout.txid);
                let spent = coins.spend(prevout.vout).unwrap_or_else(|| {
                    panic!("Input {prevout} must be available when connecting a transaction")
                });
                undo.prevouts.push(spent);
            }
        }

        let txid = tx.compute_txid();
        *self.modify_coins(&txid) = Coins::from_tx(tx, height);

        tracing::trace!("Connected tx {txid} at height {height}");

        undo
    }

    /// Restores a single spent output from its undo record.
    ///
    /// The output is always restored. Returns `false` if the view was not in
    /// the state expected by the undo data.
    pub fn apply_undo(&mut self, undo: &TxInUndo, outpoint: &OutPoint) -> bool {
        let mut clean = true;
        let mut coins = self.modify_coins(&outpoint.txid);

        if let Some(metadata) = undo.metadata {
            if !coins.is_pruned() {
                tracing::warn!("Undo data overwriting existing transaction {}", outpoint.txid);
                clean = false;
            }
            coins.clear();
            coins.is_coinbase = metadata.is_coinbase;
            coins.height = metadata.height;
            coins.version = metadata.version;
        } else if coins.is_pruned() {
            tracing::warn!("Undo data adding output to missing transaction {}", outpoint.txid);
            clean = false;
        }

        if coins.is_available(outpoint.vout) {
            tracing::warn!("Undo data overwriting existing output {outpoint}");
            clean = false;
        }

        let index = outpoint.vout as usize;
        if coins.outputs.len() <= index {
            coins.outputs.resize(index + 1, None);
        }
        coins.outputs[index] = Some(undo.txout.clone());

        clean
    }

    /// Reverts [`Self::update_coins`]: removes the outputs of `tx` and restores
    /// the outputs it spent.
    ///
    /// Returns `false` if the view did not match the connected state. The
    /// revert is carried out regardless.
    pub fn disconnect_tx(&mut self, tx: &Transaction, height: u32, undo: &TxUndo) -> bool {
        let mut clean = true;
        let txid = tx.compute_txid();

        {
            let mut outputs = self.modify_coins(&txid);
            outputs.clear_unspendable();
            let connected = Coins::from_tx(tx, height);
            if *outputs != connected {
                tracing::warn!("Added transaction {txid} mismatch, the view is corrupted");
                clean = false;
            }
            outputs.clear();
        }

        if !tx.is_coinbase() {
            if undo.prevouts.len() != tx.input.len() {
                tracing::warn!(
                    "Undo data of {txid} has {} entries, expected {}",
                    undo.prevouts.len(),
                    tx.input.len()
                );
                return false;
            }
            for (input, prevout) in tx.input.iter().zip(&undo.prevouts).rev() {
                clean &= self.apply_undo(prevout, &input.previous_output);
            }
        }

        clean
    }
}
