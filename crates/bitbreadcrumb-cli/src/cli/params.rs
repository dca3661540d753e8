use bitbreadcrumb_coins_db::{CoinsViewDb, DEFAULT_DB_CACHE, DbConfig};
use std::path::PathBuf;

#[derive(Debug, Clone, clap::Args)]
pub struct DatabaseParams {
    /// Specify the directory of the coins database.
    #[arg(long, short = 'd', value_name = "PATH")]
    pub datadir: PathBuf,

    /// Database cache size in MiB.
    ///
    /// Values out of range are clamped.
    #[arg(long, value_name = "MiB", default_value_t = DEFAULT_DB_CACHE)]
    pub dbcache: u64,
}

impl DatabaseParams {
    /// Opens the existing database, an inspection never creates one.
    pub fn open(&self) -> crate::Result<CoinsViewDb> {
        if !self.datadir.is_dir() {
            return Err(crate::Error::MissingDatabase(self.datadir.clone()));
        }
        let config = DbConfig {
            cache_size_mib: self.dbcache,
            ..DbConfig::new(&self.datadir)
        };
        Ok(CoinsViewDb::open(&config)?)
    }
}
