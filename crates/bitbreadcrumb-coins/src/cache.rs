//! In-memory cache layered over another [`CoinsView`].
//!
//! Lookups that miss are fetched from the base view and kept. Modifications
//! stay in the cache until [`CoinsViewCache::flush`] writes them down in one
//! batch. Caches can be stacked, pushing a cache acts as opening a
//! transaction, flushing commits it and dropping it without flushing rolls
//! it back.

use crate::coins::Coins;
use crate::priority::compute_priority;
use crate::view::{CoinsCacheEntry, CoinsMap, CoinsStats, CoinsView, EntryFlags};
use crate::Result;
use bitcoin::{Amount, BlockHash, Transaction, TxIn, TxOut, Txid};
use std::collections::hash_map::{Entry, OccupiedEntry};
use std::ops::{Deref, DerefMut};

/// Copy-on-write cache over a base view.
///
/// `V` is usually a mutable reference or a box, which allows stacking caches
/// of different lifetimes on top of each other.
pub struct CoinsViewCache<V> {
    base: V,
    best_block: Option<BlockHash>,
    cache_coins: CoinsMap,
}

impl<V: CoinsView> CoinsViewCache<V> {
    /// Creates an empty cache over `base`.
    pub fn new(base: V) -> Self {
        Self {
            base,
            best_block: None,
            cache_coins: CoinsMap::new(),
        }
    }

    /// Discards the cached state and returns the base view.
    pub fn into_base(self) -> V {
        self.base
    }

    /// Ensures `txid` is cached if the base view has a record for it.
    fn fetch(&mut self, txid: &Txid) -> Option<&mut CoinsCacheEntry> {
        match self.cache_coins.entry(*txid) {
            Entry::Occupied(entry) => Some(entry.into_mut()),
            Entry::Vacant(entry) => {
                let coins = self.base.coins(txid)?;
                let flags = if coins.is_pruned() {
                    // Pruned in the base view, nothing to write back if it stays empty.
                    EntryFlags::FRESH
                } else {
                    EntryFlags::empty()
                };
                Some(entry.insert(CoinsCacheEntry::new(coins, flags)))
            }
        }
    }

    /// Returns a reference to the record of `txid`, fetching it on miss.
    ///
    /// Pruned records are reported as missing.
    pub fn access_coins(&mut self, txid: &Txid) -> Option<&Coins> {
        self.fetch(txid)
            .map(|entry| &entry.coins)
            .filter(|coins| !coins.is_pruned())
    }

    /// Returns the cache entry of `txid` without consulting the base view.
    pub fn peek_entry(&self, txid: &Txid) -> Option<&CoinsCacheEntry> {
        self.cache_coins.get(txid)
    }

    /// Returns a guard for modifying the record of `txid`.
    ///
    /// A missing record is created empty. The guard borrows the cache
    /// exclusively, so only one record can be modified at a time:
    ///
    /// ```compile_fail
    /// # use bitbreadcrumb_coins::{CoinsViewCache, EmptyCoinsView};
    /// # use bitcoin::hashes::Hash;
    /// # let txid = bitcoin::Txid::all_zeros();
    /// let mut cache = CoinsViewCache::new(EmptyCoinsView);
    /// let first = cache.modify_coins(&txid);
    /// let second = cache.modify_coins(&txid);
    /// drop(first);
    /// ```
    ///
    /// When the guard is dropped the record is cleaned up, and removed again if
    /// it ended up pruned while the base view has nothing for it.
    pub fn modify_coins(&mut self, txid: &Txid) -> CoinsModifier<'_> {
        let mut entry = match self.cache_coins.entry(*txid) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(entry) => {
                let cache_entry = match self.base.coins(txid) {
                    Some(coins) if !coins.is_pruned() => {
                        CoinsCacheEntry::new(coins, EntryFlags::empty())
                    }
                    Some(coins) => CoinsCacheEntry::new(coins, EntryFlags::FRESH),
                    None => CoinsCacheEntry::new(Coins::default(), EntryFlags::FRESH),
                };
                entry.insert_entry(cache_entry)
            }
        };

        entry.get_mut().flags |= EntryFlags::DIRTY;

        CoinsModifier { entry: Some(entry) }
    }

    /// Sets the block hash this view represents the state at.
    pub fn set_best_block(&mut self, best_block: BlockHash) {
        self.best_block = Some(best_block);
    }

    /// Pushes all modifications down into the base view.
    ///
    /// The cache is empty afterwards, also when the write fails.
    pub fn flush(&mut self) -> Result<()> {
        let best_block = CoinsView::best_block(self);
        let coins = std::mem::take(&mut self.cache_coins);
        let count = coins.len();
        let result = self.base.batch_write(coins, best_block);
        match &result {
            Ok(()) => tracing::debug!("Flushed {count} cached coins at block {best_block}"),
            Err(err) => tracing::error!("Failed to flush {count} cached coins: {err}"),
        }
        result
    }

    /// Number of cached records.
    pub fn cache_size(&self) -> usize {
        self.cache_coins.len()
    }

    /// Returns the output spent by `input`.
    ///
    /// # Panics
    ///
    /// Panics if the output is not available, callers are expected to have
    /// checked [`Self::have_inputs`] before.
    pub fn output_for(&mut self, input: &TxIn) -> &TxOut {
        let prevout = input.previous_output;
        self.access_coins(&prevout.txid)
            .and_then(|coins| coins.output(prevout.vout))
            .unwrap_or_else(|| panic!("Spent output {prevout} must be available"))
    }

    /// Total value of the outputs spent by `tx`, zero for a coinbase.
    ///
    /// # Panics
    ///
    /// Panics if an input is not available.
    pub fn value_in(&mut self, tx: &Transaction) -> Amount {
        if tx.is_coinbase() {
            return Amount::ZERO;
        }
        tx.input
            .iter()
            .map(|input| self.output_for(input).value)
            .fold(Amount::ZERO, |total, value| total + value)
    }

    /// Returns `true` if every output spent by `tx` is available.
    pub fn have_inputs(&mut self, tx: &Transaction) -> bool {
        if tx.is_coinbase() {
            return true;
        }
        tx.input.iter().all(|input| {
            let prevout = input.previous_output;
            self.access_coins(&prevout.txid)
                .is_some_and(|coins| coins.is_available(prevout.vout))
        })
    }

    /// Priority of `tx` if included at `height`.
    ///
    /// Every available input contributes its value times its age, inputs
    /// confirmed at or above `height` contribute nothing.
    pub fn priority(&mut self, tx: &Transaction, height: u32) -> f64 {
        if tx.is_coinbase() {
            return 0.0;
        }
        let mut result = 0.0;
        for input in &tx.input {
            let prevout = input.previous_output;
            let Some(coins) = self.access_coins(&prevout.txid) else {
                continue;
            };
            let Some(output) = coins.output(prevout.vout) else {
                continue;
            };
            if coins.height < height {
                result += output.value.to_sat() as f64 * f64::from(height - coins.height);
            }
        }
        compute_priority(tx, result)
    }
}

impl<V: CoinsView> CoinsView for CoinsViewCache<V> {
    fn coins(&mut self, txid: &Txid) -> Option<Coins> {
        self.fetch(txid).map(|entry| entry.coins.clone())
    }

    fn have_coins(&mut self, txid: &Txid) -> bool {
        // Records emptied in this cache are still present but have no outputs.
        self.fetch(txid).is_some_and(|entry| !entry.coins.outputs.is_empty())
    }

    fn best_block(&mut self) -> BlockHash {
        *self.best_block.get_or_insert_with(|| self.base.best_block())
    }

    fn batch_write(&mut self, coins: CoinsMap, best_block: BlockHash) -> Result<()> {
        for (txid, child) in coins {
            // Clean entries of the child carry nothing new.
            if !child.is_dirty() {
                continue;
            }

            match self.cache_coins.entry(txid) {
                Entry::Vacant(entry) => {
                    if !child.coins.is_pruned() {
                        // The parent never saw this record, so the child must have created it.
                        assert!(
                            child.is_fresh(),
                            "Non-fresh child entry {txid} is missing in the parent cache"
                        );
                        entry.insert(CoinsCacheEntry::new(
                            child.coins,
                            EntryFlags::DIRTY | EntryFlags::FRESH,
                        ));
                    }
                }
                Entry::Occupied(mut entry) => {
                    if entry.get().is_fresh() && child.coins.is_pruned() {
                        entry.remove();
                    } else {
                        let parent = entry.get_mut();
                        parent.coins = child.coins;
                        parent.flags |= EntryFlags::DIRTY;
                    }
                }
            }
        }

        self.best_block = Some(best_block);

        Ok(())
    }

    fn stats(&mut self) -> Option<CoinsStats> {
        self.base.stats()
    }
}

/// Exclusive handle to a cached record, obtained from
/// [`CoinsViewCache::modify_coins`].
pub struct CoinsModifier<'a> {
    entry: Option<OccupiedEntry<'a, Txid, CoinsCacheEntry>>,
}

impl Deref for CoinsModifier<'_> {
    type Target = Coins;

    fn deref(&self) -> &Coins {
        &self
            .entry
            .as_ref()
            .expect("Entry is only taken on drop; qed")
            .get()
            .coins
    }
}

impl DerefMut for CoinsModifier<'_> {
    fn deref_mut(&mut self) -> &mut Coins {
        &mut self
            .entry
            .as_mut()
            .expect("Entry is only taken on drop; qed")
            .get_mut()
            .coins
    }
}

impl Drop for CoinsModifier<'_> {
    fn drop(&mut self) {
        let Some(mut entry) = self.entry.take() else {
            return;
        };
        let cache_entry = entry.get_mut();
        cache_entry.coins.cleanup();
        if cache_entry.is_fresh() && cache_entry.coins.is_pruned() {
            entry.remove();
        }
    }
}
