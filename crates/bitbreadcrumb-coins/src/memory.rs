use crate::coins::Coins;
use crate::view::{CoinsMap, CoinsStats, CoinsStatsBuilder, CoinsView};
use crate::{Error, Result};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Txid};
use std::collections::BTreeMap;

/// Coins store keeping encoded records in an ordered in-memory map.
///
/// Records are stored in the same encoding as on disk, pruned records are
/// represented by absence.
#[derive(Debug, Clone, Default)]
pub struct MemoryCoinsView {
    coins: BTreeMap<Txid, Vec<u8>>,
    best_block: Option<BlockHash>,
}

impl MemoryCoinsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `coins` under `txid`, removing the record if it is pruned.
    pub fn insert(&mut self, txid: Txid, coins: &Coins) -> Result<()> {
        if coins.is_pruned() {
            self.coins.remove(&txid);
        } else {
            let bytes = coins
                .encode_for_storage()
                .map_err(|err| Error::Encode(txid, err))?;
            self.coins.insert(txid, bytes);
        }
        Ok(())
    }

    /// Returns the stored encoding of the record of `txid`.
    pub fn raw(&self, txid: &Txid) -> Option<&[u8]> {
        self.coins.get(txid).map(Vec::as_slice)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    /// Iterates over the txids of the stored records in key order.
    pub fn txids(&self) -> impl Iterator<Item = &Txid> {
        self.coins.keys()
    }
}

impl CoinsView for MemoryCoinsView {
    fn coins(&mut self, txid: &Txid) -> Option<Coins> {
        let bytes = self.coins.get(txid)?;
        let coins = Coins::decode_from_storage(bytes)
            .unwrap_or_else(|err| panic!("Failed to decode stored coins of {txid}: {err}"));
        Some(coins)
    }

    fn have_coins(&mut self, txid: &Txid) -> bool {
        self.coins.contains_key(txid)
    }

    fn best_block(&mut self) -> BlockHash {
        self.best_block.unwrap_or_else(BlockHash::all_zeros)
    }

    fn batch_write(&mut self, coins: CoinsMap, best_block: BlockHash) -> Result<()> {
        // Encode everything first, the store is left untouched on failure.
        let mut changes = Vec::with_capacity(coins.len());
        for (txid, entry) in coins {
            if !entry.is_dirty() {
                continue;
            }
            if entry.coins.is_pruned() {
                changes.push((txid, None));
            } else {
                let bytes = entry
                    .coins
                    .encode_for_storage()
                    .map_err(|err| Error::Encode(txid, err))?;
                changes.push((txid, Some(bytes)));
            }
        }

        let count = changes.len();
        for (txid, change) in changes {
            match change {
                Some(bytes) => {
                    self.coins.insert(txid, bytes);
                }
                None => {
                    self.coins.remove(&txid);
                }
            }
        }
        self.best_block = Some(best_block);

        tracing::debug!("Committed {count} changed coins at block {best_block}");

        Ok(())
    }

    fn stats(&mut self) -> Option<CoinsStats> {
        let mut builder = CoinsStatsBuilder::new(self.best_block());
        for (txid, bytes) in &self.coins {
            let coins = match Coins::decode_from_storage(bytes) {
                Ok(coins) => coins,
                Err(err) => {
                    tracing::error!("Failed to decode stored coins of {txid}: {err}");
                    return None;
                }
            };
            builder.add(txid, &coins, bytes.len());
        }
        builder.finish()
    }
}
