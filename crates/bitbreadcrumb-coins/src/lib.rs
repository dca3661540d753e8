//! Unspent transaction output set layer of a Bitbreadcrumb full node.
//!
//! The set is seen through [`CoinsView`]s: a persistent store at the bottom
//! and any number of [`CoinsViewCache`]s stacked on top of it. Validation works
//! against the topmost cache, lookups that miss cascade down and
//! modifications are pushed down on [`CoinsViewCache::flush`].
//!
//! Each transaction with unspent outputs is stored as one [`Coins`] record in
//! a compact, bit-exact encoding shared with the on-disk format.

pub mod amount;
mod cache;
mod coins;
mod compressor;
mod error;
mod memory;
mod priority;
mod serialize;
mod undo;
mod view;

pub use self::cache::{CoinsModifier, CoinsViewCache};
pub use self::coins::Coins;
pub use self::compressor::{
    MAX_SCRIPT_SIZE, ScriptCompression, TxOutCompression, compress_amount, decompress_amount,
};
pub use self::error::Error;
pub use self::memory::MemoryCoinsView;
pub use self::priority::{compute_priority, modified_size};
pub use self::serialize::VarInt;
pub use self::undo::{TxInUndo, TxUndo, UndoMetadata};
pub use self::view::{
    CoinsCacheEntry, CoinsMap, CoinsStats, CoinsStatsBuilder, CoinsView, CoinsViewBacked,
    EmptyCoinsView, EntryFlags,
};

/// Result type of coins view operations.
pub type Result<T> = std::result::Result<T, Error>;
