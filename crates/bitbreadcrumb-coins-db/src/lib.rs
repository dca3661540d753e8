//! RocksDB backed [`CoinsView`](bitbreadcrumb_coins::CoinsView) holding the
//! unspent transaction output set on disk.
//!
//! ## Layout
//!
//! - `'c' || txid`: the [`Coins`](bitbreadcrumb_coins::Coins) record of a
//!   transaction in its storage encoding. Pruned records are deleted.
//! - `'B'`: hash of the block the stored set corresponds to.

mod config;
mod error;
mod storage;

pub use self::config::{DEFAULT_DB_CACHE, DbConfig, MAX_DB_CACHE, MIN_DB_CACHE};
pub use self::error::Error;
pub use self::storage::CoinsViewDb;

/// Result type for coins database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Key prefixes.
mod keys {
    use bitcoin::Txid;
    use bitcoin::hashes::Hash;

    /// Prefix of the per-transaction records.
    pub const COINS: u8 = b'c';

    /// Key of the best block hash.
    pub const BEST_BLOCK: &[u8] = b"B";

    /// Format: 'c' (1 byte) || txid (32 bytes, raw)
    pub fn coins_key(txid: &Txid) -> [u8; 33] {
        let mut key = [0u8; 33];
        key[0] = COINS;
        key[1..].copy_from_slice(txid.as_byte_array());
        key
    }

    /// Parses a record key back to the txid.
    pub fn key_to_txid(key: &[u8]) -> Option<Txid> {
        match key {
            [COINS, txid @ ..] => <[u8; 32]>::try_from(txid).ok().map(Txid::from_byte_array),
            _ => None,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_coins_key_roundtrip() {
            let txid = Txid::from_byte_array([0xab; 32]);
            let key = coins_key(&txid);
            assert_eq!(key[0], b'c');
            assert_eq!(key_to_txid(&key), Some(txid));
            assert_eq!(key_to_txid(BEST_BLOCK), None);
            assert_eq!(key_to_txid(&key[..10]), None);
        }
    }
}
