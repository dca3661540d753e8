use std::path::PathBuf;

/// Default database cache size in MiB.
pub const DEFAULT_DB_CACHE: u64 = 100;

/// Maximum database cache size in MiB.
pub const MAX_DB_CACHE: u64 = if cfg!(target_pointer_width = "64") { 4096 } else { 1024 };

/// Minimum database cache size in MiB.
pub const MIN_DB_CACHE: u64 = 4;

/// Configuration of the coins database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Directory of the database.
    pub path: PathBuf,
    /// Block cache size in MiB, clamped to `[MIN_DB_CACHE, MAX_DB_CACHE]`.
    pub cache_size_mib: u64,
    /// Destroy any existing database before opening.
    pub wipe: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache_size_mib: DEFAULT_DB_CACHE,
            wipe: false,
        }
    }

    /// Effective block cache size in bytes.
    pub fn cache_size_bytes(&self) -> usize {
        let mib = self.cache_size_mib.clamp(MIN_DB_CACHE, MAX_DB_CACHE);
        (mib as usize) << 20
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_size_is_clamped() {
        let mut config = DbConfig::new("/tmp/coins");
        assert_eq!(config.cache_size_bytes(), 100 << 20);

        config.cache_size_mib = 1;
        assert_eq!(config.cache_size_bytes(), 4 << 20);

        config.cache_size_mib = u64::MAX;
        assert_eq!(config.cache_size_bytes(), (MAX_DB_CACHE as usize) << 20);
    }
}
