//! Error types for the coins database.

use bitcoin::Txid;

/// Errors that can occur during coins database operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// RocksDB error.
    #[error("RocksDB error: {0}")]
    Rocksdb(#[from] rocksdb::Error),

    /// Stored record could not be decoded.
    #[error("Failed to decode stored coins of {txid}: {source}")]
    Decode {
        txid: Txid,
        source: bitcoin::consensus::encode::Error,
    },

    /// Record could not be encoded.
    #[error("Failed to encode coins of {0}: {1}")]
    Encode(Txid, bitcoin::io::Error),

    /// The stored best block hash has an unexpected length.
    #[error("Invalid best block hash of {0} bytes")]
    InvalidBestBlock(usize),

    /// The total amount of the stored outputs does not fit in an amount.
    #[error("Total amount of the coins set overflows")]
    AmountOverflow,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Error> for bitbreadcrumb_coins::Error {
    fn from(err: Error) -> Self {
        Self::Backend(Box::new(err))
    }
}
