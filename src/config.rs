//! Store configuration

use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_MAP_SIZE: usize = 1 << 30;
pub const DEFAULT_MAX_DBS: u32 = 8;

/// Settings for opening an [`LmdbStore`](crate::store::LmdbStore)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the LMDB environment, created if missing
    pub path: PathBuf,
    /// Maximum size of the memory map in bytes
    pub map_size: usize,
    pub max_dbs: u32,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig { path: path.into(), ..Self::default() }
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: PathBuf::from("grantbook.db"),
            map_size: DEFAULT_MAP_SIZE,
            max_dbs: DEFAULT_MAX_DBS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: StoreConfig = serde_json::from_str(r#"{"path": "/tmp/grants"}"#).unwrap();
        assert_eq!(cfg.path, PathBuf::from("/tmp/grants"));
        assert_eq!(cfg.map_size, DEFAULT_MAP_SIZE);
        assert_eq!(cfg.max_dbs, DEFAULT_MAX_DBS);
    }
}
