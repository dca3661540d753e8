//! Coins view storage implementation using RocksDB.

use crate::keys::{self, BEST_BLOCK, COINS, coins_key};
use crate::{DbConfig, Error, Result};
use bitbreadcrumb_coins::{Coins, CoinsMap, CoinsStats, CoinsStatsBuilder, CoinsView};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Txid};
use rocksdb::{BlockBasedOptions, Cache, DB, Direction, IteratorMode, Options, WriteBatch};

/// Unspent transaction output set stored in RocksDB.
///
/// Every [`CoinsView::batch_write`] is applied as a single atomic write batch
/// together with the new best block.
pub struct CoinsViewDb {
    db: DB,
}

impl CoinsViewDb {
    /// Open or create the coins database described by `config`.
    pub fn open(config: &DbConfig) -> Result<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);

        if config.wipe {
            tracing::info!("Wiping coins database at {}", config.path.display());
            DB::destroy(&db_opts, &config.path)?;
        }

        // Optimize for point lookups of whole records
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.cache_size_bytes()));
        db_opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&db_opts, &config.path)?;
        let storage = Self { db };

        match storage.read_best_block()? {
            Some(best_block) => tracing::info!(
                "Opened coins database at {} with best block {best_block}",
                config.path.display()
            ),
            None => tracing::info!("Created coins database at {}", config.path.display()),
        }

        Ok(storage)
    }

    /// Create a new storage in a temporary directory for testing.
    #[cfg(test)]
    pub fn open_temp() -> Result<(Self, tempfile::TempDir)> {
        let temp_dir = tempfile::tempdir()?;
        let storage = Self::open(&DbConfig::new(temp_dir.path()))?;
        Ok((storage, temp_dir))
    }

    /// Read the record of `txid`.
    pub fn read_coins(&self, txid: &Txid) -> Result<Option<Coins>> {
        let Some(bytes) = self.db.get_pinned(coins_key(txid))? else {
            return Ok(None);
        };
        Coins::decode_from_storage(&bytes)
            .map(Some)
            .map_err(|source| Error::Decode {
                txid: *txid,
                source,
            })
    }

    /// Check if a record for `txid` exists.
    pub fn contains(&self, txid: &Txid) -> Result<bool> {
        Ok(self.db.get_pinned(coins_key(txid))?.is_some())
    }

    /// Read the hash of the block the stored set corresponds to.
    pub fn read_best_block(&self) -> Result<Option<BlockHash>> {
        let Some(bytes) = self.db.get_pinned(BEST_BLOCK)? else {
            return Ok(None);
        };
        let bytes = <[u8; 32]>::try_from(&bytes[..])
            .map_err(|_| Error::InvalidBestBlock(bytes.len()))?;
        Ok(Some(BlockHash::from_byte_array(bytes)))
    }

    /// Write all dirty entries of `coins` and the new best block atomically.
    pub fn write_coins(&self, coins: CoinsMap, best_block: BlockHash) -> Result<()> {
        let mut batch = WriteBatch::default();
        let mut changed: usize = 0;
        let mut deleted: usize = 0;

        for (txid, entry) in coins {
            if !entry.is_dirty() {
                continue;
            }
            let key = coins_key(&txid);
            if entry.coins.is_pruned() {
                batch.delete(key);
                deleted += 1;
            } else {
                let value = entry
                    .coins
                    .encode_for_storage()
                    .map_err(|err| Error::Encode(txid, err))?;
                batch.put(key, value);
                changed += 1;
            }
        }

        batch.put(BEST_BLOCK, best_block.as_byte_array());

        // Atomic write
        self.db.write(batch)?;

        tracing::debug!(
            "Committed coins database at block {best_block}: {changed} changed, {deleted} deleted"
        );

        Ok(())
    }

    /// Compute statistics over all stored records.
    pub fn compute_stats(&self) -> Result<CoinsStats> {
        let best_block = self.read_best_block()?.unwrap_or_else(BlockHash::all_zeros);
        let mut builder = CoinsStatsBuilder::new(best_block);

        let iter = self
            .db
            .iterator(IteratorMode::From(&[COINS], Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            let Some(txid) = keys::key_to_txid(&key) else {
                break;
            };
            let coins = Coins::decode_from_storage(&value)
                .map_err(|source| Error::Decode { txid, source })?;
            builder.add(&txid, &coins, value.len());
        }

        builder.finish().ok_or(Error::AmountOverflow)
    }
}

impl CoinsView for CoinsViewDb {
    // Read failures are fatal, only an absent key reads as missing.
    fn coins(&mut self, txid: &Txid) -> Option<Coins> {
        self.read_coins(txid)
            .unwrap_or_else(|err| panic!("Failed to read coins of {txid}: {err}"))
    }

    fn have_coins(&mut self, txid: &Txid) -> bool {
        self.contains(txid)
            .unwrap_or_else(|err| panic!("Failed to look up coins of {txid}: {err}"))
    }

    fn best_block(&mut self) -> BlockHash {
        self.read_best_block()
            .unwrap_or_else(|err| panic!("Failed to read best block: {err}"))
            .unwrap_or_else(BlockHash::all_zeros)
    }

    fn batch_write(
        &mut self,
        coins: CoinsMap,
        best_block: BlockHash,
    ) -> bitbreadcrumb_coins::Result<()> {
        Ok(self.write_coins(coins, best_block)?)
    }

    fn stats(&mut self) -> Option<CoinsStats> {
        self.compute_stats()
            .map_err(|err| tracing::error!("Failed to compute coins stats: {err}"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitbreadcrumb_coins::{CoinsCacheEntry, CoinsViewCache, EntryFlags, MemoryCoinsView};
    use bitcoin::{Amount, ScriptBuf, TxOut};

    fn coins(value: u64, height: u32) -> Coins {
        Coins {
            is_coinbase: height == 0,
            outputs: vec![
                None,
                Some(TxOut {
                    value: Amount::from_sat(value),
                    script_pubkey: ScriptBuf::from_bytes(vec![0x51]),
                }),
            ],
            height,
            version: 1,
        }
    }

    fn txid(n: u8) -> Txid {
        Txid::from_byte_array([n; 32])
    }

    #[test]
    fn test_empty_database() {
        let (mut storage, _temp_dir) = CoinsViewDb::open_temp().unwrap();
        assert_eq!(storage.best_block(), BlockHash::all_zeros());
        assert!(!storage.have_coins(&txid(1)));
        assert!(storage.coins(&txid(1)).is_none());

        let stats = storage.stats().unwrap();
        assert_eq!(stats.transactions, 0);
        assert_eq!(stats.serialized_size, 0);
    }

    #[test]
    fn test_batch_write_and_read() {
        let (mut storage, _temp_dir) = CoinsViewDb::open_temp().unwrap();

        let mut batch = CoinsMap::new();
        batch.insert(txid(1), CoinsCacheEntry::new(coins(10, 1), EntryFlags::DIRTY));
        batch.insert(txid(2), CoinsCacheEntry::new(coins(20, 2), EntryFlags::empty()));
        let best_block = BlockHash::from_byte_array([5u8; 32]);
        storage.batch_write(batch, best_block).unwrap();

        assert_eq!(storage.coins(&txid(1)), Some(coins(10, 1)));
        assert!(!storage.have_coins(&txid(2)));
        assert_eq!(storage.best_block(), best_block);

        let mut batch = CoinsMap::new();
        batch.insert(txid(1), CoinsCacheEntry::new(Coins::default(), EntryFlags::DIRTY));
        storage.batch_write(batch, best_block).unwrap();
        assert!(!storage.have_coins(&txid(1)));
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(temp_dir.path());
        let best_block = BlockHash::from_byte_array([8u8; 32]);

        {
            let mut storage = CoinsViewDb::open(&config).unwrap();
            let mut cache = CoinsViewCache::new(&mut storage);
            *cache.modify_coins(&txid(3)) = coins(30, 3);
            cache.set_best_block(best_block);
            cache.flush().unwrap();
        }

        let mut storage = CoinsViewDb::open(&config).unwrap();
        assert_eq!(storage.best_block(), best_block);
        assert_eq!(storage.coins(&txid(3)), Some(coins(30, 3)));
        drop(storage);

        let wiped = DbConfig {
            wipe: true,
            ..config
        };
        let mut storage = CoinsViewDb::open(&wiped).unwrap();
        assert!(!storage.have_coins(&txid(3)));
    }

    #[test]
    fn test_stats_match_memory_view() {
        let (mut storage, _temp_dir) = CoinsViewDb::open_temp().unwrap();
        let mut memory = MemoryCoinsView::new();
        let best_block = BlockHash::from_byte_array([1u8; 32]);

        for view in [&mut storage as &mut dyn CoinsView, &mut memory] {
            let mut cache = CoinsViewCache::new(view);
            for n in 1..=5u8 {
                *cache.modify_coins(&txid(n)) = coins(u64::from(n) * 1000, u32::from(n));
            }
            cache.modify_coins(&txid(3)).spend(1);
            cache.set_best_block(best_block);
            cache.flush().unwrap();
        }

        let db_stats = storage.stats().unwrap();
        let memory_stats = memory.stats().unwrap();
        assert_eq!(db_stats, memory_stats);
        assert_eq!(db_stats.transactions, 4);
        assert_eq!(db_stats.transaction_outputs, 4);
        assert_eq!(db_stats.total_amount, Amount::from_sat(12_000));
        assert_eq!(db_stats.best_block, best_block);
    }

    #[test]
    fn test_corrupted_record() {
        let (mut storage, _temp_dir) = CoinsViewDb::open_temp().unwrap();
        storage.db.put(coins_key(&txid(1)), [0x01]).unwrap();

        assert!(matches!(
            storage.read_coins(&txid(1)),
            Err(Error::Decode { .. })
        ));
        assert!(storage.have_coins(&txid(1)));
        assert!(storage.stats().is_none());
    }

    #[test]
    #[should_panic(expected = "Failed to read coins")]
    fn test_corrupted_record_is_fatal_for_cache() {
        let (mut storage, _temp_dir) = CoinsViewDb::open_temp().unwrap();
        storage.db.put(coins_key(&txid(1)), [0x01]).unwrap();

        let mut cache = CoinsViewCache::new(&mut storage);
        let _coins = cache.modify_coins(&txid(1));
    }

    #[test]
    fn test_stats_total_amount_overflow() {
        let (mut storage, _temp_dir) = CoinsViewDb::open_temp().unwrap();
        let huge = TxOut {
            value: Amount::from_sat(9_000_000_000_000_000_000),
            script_pubkey: ScriptBuf::from_bytes(vec![0x51]),
        };
        let record = Coins {
            is_coinbase: false,
            outputs: vec![Some(huge.clone()), Some(huge.clone()), Some(huge)],
            height: 1,
            version: 1,
        };

        let mut batch = CoinsMap::new();
        batch.insert(txid(1), CoinsCacheEntry::new(record, EntryFlags::DIRTY));
        storage.write_coins(batch, BlockHash::all_zeros()).unwrap();

        assert!(matches!(storage.compute_stats(), Err(Error::AmountOverflow)));
        assert!(storage.stats().is_none());
    }

    #[test]
    #[should_panic(expected = "Failed to read best block")]
    fn test_invalid_best_block_is_fatal() {
        let (mut storage, _temp_dir) = CoinsViewDb::open_temp().unwrap();
        storage.db.put(BEST_BLOCK, [0u8; 3]).unwrap();
        storage.best_block();
    }
}
