use super::serialize_as_duk;
use crate::cli::params::DatabaseParams;
use bitbreadcrumb_coins::CoinsStats;
use bitbreadcrumb_coins::amount::money_range;
use bitcoin::{Amount, BlockHash};
use serde::Serialize;

#[derive(Debug, clap::Args)]
pub struct GetTxOutSetInfo {
    #[allow(missing_docs)]
    #[clap(flatten)]
    pub database_params: DatabaseParams,
}

impl GetTxOutSetInfo {
    pub fn execute(self) -> crate::Result<TxOutSetInfo> {
        let storage = self.database_params.open()?;

        tracing::info!("Computing statistics of the coins set, this may take a while");

        let stats = storage.compute_stats()?;

        Ok(TxOutSetInfo::from(stats))
    }
}

#[derive(Debug, Serialize)]
pub struct TxOutSetInfo {
    height: Option<u32>,
    bestblock: BlockHash,
    transactions: u64,
    txouts: u64,
    bytes_serialized: u64,
    hash_serialized: String,
    #[serde(serialize_with = "serialize_as_duk")]
    total_amount: Amount,
}

impl From<CoinsStats> for TxOutSetInfo {
    fn from(stats: CoinsStats) -> Self {
        let in_range = i64::try_from(stats.total_amount.to_sat()).is_ok_and(money_range);
        if !in_range {
            tracing::warn!(
                "Total amount {} of the coins set is out of the money range",
                stats.total_amount
            );
        }

        Self {
            height: stats.height,
            bestblock: stats.best_block,
            transactions: stats.transactions,
            txouts: stats.transaction_outputs,
            bytes_serialized: stats.serialized_size,
            hash_serialized: stats.hash_serialized.to_string(),
            total_amount: stats.total_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitbreadcrumb_coins::{Coins, CoinsViewCache};
    use bitbreadcrumb_coins_db::{CoinsViewDb, DbConfig};
    use bitcoin::hashes::Hash;
    use bitcoin::{ScriptBuf, TxOut, Txid};
    use serde_json::Value;

    #[test]
    fn test_gettxoutsetinfo() {
        let temp_dir = tempfile::tempdir().unwrap();
        let best_block = BlockHash::from_byte_array([7u8; 32]);

        {
            let mut storage = CoinsViewDb::open(&DbConfig::new(temp_dir.path())).unwrap();
            let mut cache = CoinsViewCache::new(&mut storage);
            for n in 1..=3u8 {
                *cache.modify_coins(&Txid::from_byte_array([n; 32])) = Coins {
                    is_coinbase: false,
                    outputs: vec![Some(TxOut {
                        value: Amount::from_sat(u64::from(n) * 50_000_000),
                        script_pubkey: ScriptBuf::from_bytes(vec![0x51]),
                    })],
                    height: u32::from(n),
                    version: 1,
                };
            }
            cache.set_best_block(best_block);
            cache.flush().unwrap();
        }

        let cmd = GetTxOutSetInfo {
            database_params: DatabaseParams {
                datadir: temp_dir.path().to_path_buf(),
                dbcache: 4,
            },
        };
        let info = cmd.execute().unwrap();
        assert_eq!(info.bestblock, best_block);
        assert_eq!(info.transactions, 3);
        assert_eq!(info.txouts, 3);
        assert_eq!(info.total_amount, Amount::from_sat(300_000_000));

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["height"], Value::Null);
        assert_eq!(json["bestblock"], best_block.to_string());
        assert_eq!(json["txouts"], 3);
        assert_eq!(json["total_amount"], "3.00000000");
    }

    #[test]
    fn test_missing_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cmd = GetTxOutSetInfo {
            database_params: DatabaseParams {
                datadir: temp_dir.path().join("missing"),
                dbcache: 4,
            },
        };
        assert!(matches!(cmd.execute(), Err(crate::Error::MissingDatabase(_))));
        assert!(!temp_dir.path().join("missing").exists());
    }
}
