//! Abstract view over the unspent transaction output set.

use crate::coins::Coins;
use crate::serialize::VarInt;
use crate::{Error, Result};
use bitcoin::consensus::Encodable;
use bitcoin::hashes::{Hash, sha256d};
use bitcoin::{Amount, BlockHash, Txid};
use bitflags::bitflags;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

bitflags! {
    /// State of a cache entry relative to the view below it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntryFlags: u8 {
        /// The entry may differ from the parent view and must be written down.
        const DIRTY = 1 << 0;
        /// The parent view has no unspent outputs for this txid, so a pruned
        /// entry can be dropped instead of being written down.
        const FRESH = 1 << 1;
    }
}

/// Cached record together with its cache state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinsCacheEntry {
    pub coins: Coins,
    pub flags: EntryFlags,
}

impl CoinsCacheEntry {
    pub fn new(coins: Coins, flags: EntryFlags) -> Self {
        Self { coins, flags }
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(EntryFlags::DIRTY)
    }

    pub fn is_fresh(&self) -> bool {
        self.flags.contains(EntryFlags::FRESH)
    }
}

/// Batch of cache entries keyed by txid.
pub type CoinsMap = HashMap<Txid, CoinsCacheEntry>;

/// Statistics about the unspent transaction output set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinsStats {
    /// Height of the best block, if the view knows it.
    pub height: Option<u32>,
    pub best_block: BlockHash,
    /// Number of transactions with unspent outputs.
    pub transactions: u64,
    /// Number of unspent outputs.
    pub transaction_outputs: u64,
    /// Size of the stored records, 32 bytes of key included per record.
    pub serialized_size: u64,
    /// Double SHA-256 over the canonical serialization of the set.
    pub hash_serialized: sha256d::Hash,
    pub total_amount: Amount,
}

/// Accumulates [`CoinsStats`] from records visited in key order.
pub struct CoinsStatsBuilder {
    hasher: Sha256,
    buffer: Vec<u8>,
    best_block: BlockHash,
    transactions: u64,
    transaction_outputs: u64,
    serialized_size: u64,
    total_amount: Option<Amount>,
}

impl CoinsStatsBuilder {
    pub fn new(best_block: BlockHash) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(best_block.as_byte_array());
        Self {
            hasher,
            buffer: Vec::new(),
            best_block,
            transactions: 0,
            transaction_outputs: 0,
            serialized_size: 0,
            total_amount: Some(Amount::ZERO),
        }
    }

    /// Adds a record whose stored encoding is `value_size` bytes long.
    pub fn add(&mut self, txid: &Txid, coins: &Coins, value_size: usize) {
        // Writing into a Vec can not fail.
        let buffer = &mut self.buffer;
        buffer.clear();
        buffer.extend_from_slice(txid.as_byte_array());
        let _ = VarInt(u64::from(coins.version as u32)).consensus_encode(buffer);
        buffer.push(if coins.is_coinbase { b'c' } else { b'n' });
        let _ = VarInt(u64::from(coins.height)).consensus_encode(buffer);

        for (index, output) in coins.outputs.iter().enumerate() {
            let Some(output) = output else {
                continue;
            };
            self.transaction_outputs += 1;
            let _ = VarInt(index as u64 + 1).consensus_encode(buffer);
            let _ = output.consensus_encode(buffer);
            self.total_amount = self
                .total_amount
                .and_then(|total| total.checked_add(output.value));
        }

        let _ = VarInt(0).consensus_encode(buffer);
        self.hasher.update(&buffer[..]);

        self.transactions += 1;
        self.serialized_size += 32 + value_size as u64;
    }

    /// Returns `None` if the total amount overflowed.
    pub fn finish(self) -> Option<CoinsStats> {
        let Some(total_amount) = self.total_amount else {
            tracing::error!("Total amount of the coins set overflows");
            return None;
        };
        let first = self.hasher.finalize();
        let hash_serialized = sha256d::Hash::from_byte_array(Sha256::digest(first).into());
        Some(CoinsStats {
            height: None,
            best_block: self.best_block,
            transactions: self.transactions,
            transaction_outputs: self.transaction_outputs,
            serialized_size: self.serialized_size,
            hash_serialized,
            total_amount,
        })
    }
}

/// Abstract view on the unspent transaction output set.
///
/// Read methods take `&mut self`, implementations are free to populate
/// internal caches on lookup. The default implementations describe an empty
/// view which rejects writes.
pub trait CoinsView {
    /// Returns the record of `txid`. Implementations may return pruned
    /// records, callers must not rely on either behavior.
    fn coins(&mut self, _txid: &Txid) -> Option<Coins> {
        None
    }

    /// Returns `true` if there is a record for `txid`. Pruned records may be
    /// reported as present.
    fn have_coins(&mut self, _txid: &Txid) -> bool {
        false
    }

    /// Hash of the block this view represents the state at.
    fn best_block(&mut self) -> BlockHash {
        BlockHash::all_zeros()
    }

    /// Applies a batch of modifications.
    ///
    /// The batch is consumed whether or not the write succeeds.
    fn batch_write(&mut self, _coins: CoinsMap, _best_block: BlockHash) -> Result<()> {
        Err(Error::Unsupported("batch_write"))
    }

    /// Computes statistics over the whole set, if supported.
    fn stats(&mut self) -> Option<CoinsStats> {
        None
    }
}

impl<T: CoinsView + ?Sized> CoinsView for &mut T {
    fn coins(&mut self, txid: &Txid) -> Option<Coins> {
        (**self).coins(txid)
    }

    fn have_coins(&mut self, txid: &Txid) -> bool {
        (**self).have_coins(txid)
    }

    fn best_block(&mut self) -> BlockHash {
        (**self).best_block()
    }

    fn batch_write(&mut self, coins: CoinsMap, best_block: BlockHash) -> Result<()> {
        (**self).batch_write(coins, best_block)
    }

    fn stats(&mut self) -> Option<CoinsStats> {
        (**self).stats()
    }
}

impl<T: CoinsView + ?Sized> CoinsView for Box<T> {
    fn coins(&mut self, txid: &Txid) -> Option<Coins> {
        (**self).coins(txid)
    }

    fn have_coins(&mut self, txid: &Txid) -> bool {
        (**self).have_coins(txid)
    }

    fn best_block(&mut self) -> BlockHash {
        (**self).best_block()
    }

    fn batch_write(&mut self, coins: CoinsMap, best_block: BlockHash) -> Result<()> {
        (**self).batch_write(coins, best_block)
    }

    fn stats(&mut self) -> Option<CoinsStats> {
        (**self).stats()
    }
}

/// The empty view, it has no records and rejects writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCoinsView;

impl CoinsView for EmptyCoinsView {}

/// View that forwards every call to another view, which can be swapped at runtime.
pub struct CoinsViewBacked<'a> {
    base: &'a mut dyn CoinsView,
}

impl<'a> CoinsViewBacked<'a> {
    pub fn new(base: &'a mut dyn CoinsView) -> Self {
        Self { base }
    }

    /// Replaces the backend, returning the previous one.
    pub fn set_backend(&mut self, base: &'a mut dyn CoinsView) -> &'a mut dyn CoinsView {
        std::mem::replace(&mut self.base, base)
    }
}

impl CoinsView for CoinsViewBacked<'_> {
    fn coins(&mut self, txid: &Txid) -> Option<Coins> {
        self.base.coins(txid)
    }

    fn have_coins(&mut self, txid: &Txid) -> bool {
        self.base.have_coins(txid)
    }

    fn best_block(&mut self) -> BlockHash {
        self.base.best_block()
    }

    fn batch_write(&mut self, coins: CoinsMap, best_block: BlockHash) -> Result<()> {
        self.base.batch_write(coins, best_block)
    }

    fn stats(&mut self) -> Option<CoinsStats> {
        self.base.stats()
    }
}
