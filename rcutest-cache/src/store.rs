use crate::cache_root;
use rcutest_structs::{CacheKey, Result};
use std::fs;
use std::path::PathBuf;

/// Subdirectory of the cache root that holds all problem entries.
pub const CACHE_SUBFOLDER: &str = "rcutest_cache";

const MARKER_FILE: &str = ".rcutest_cache";

/// Filesystem-backed store of compiled evaluator artifacts, one directory
/// per cache key.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(cache_root()?))
    }

    pub fn holder_dir(&self) -> PathBuf {
        self.root.join(CACHE_SUBFOLDER)
    }

    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.holder_dir().join(key.canonical())
    }

    /// An entry exists when its directory does. The build pipeline removes
    /// the whole directory on any failure, so presence implies a completed
    /// install.
    pub fn exists(&self, key: &CacheKey) -> bool {
        self.entry_dir(key).is_dir()
    }

    /// Create a fresh, empty entry directory, removing any previous entry.
    /// Also makes sure the holder directory and its marker file exist.
    pub fn prepare(&self, key: &CacheKey) -> Result<PathBuf> {
        let holder = self.holder_dir();
        if !holder.is_dir() {
            fs::create_dir_all(&holder)?;
        }
        let marker = holder.join(MARKER_FILE);
        if !marker.is_file() {
            fs::write(&marker, "rcutest problem cache\n")?;
        }

        self.remove(key)?;
        let dir = self.entry_dir(key);
        fs::create_dir(&dir)?;
        Ok(dir)
    }

    /// Best-effort recursive delete. Missing entries and partially built
    /// entries are fine.
    pub fn remove(&self, key: &CacheKey) -> Result<()> {
        let dir = self.entry_dir(key);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        } else if dir.is_file() {
            fs::remove_file(&dir)?;
        }
        Ok(())
    }

    /// Enumerate cached entries, parsing parameters back out of the
    /// directory names on a best-effort basis.
    pub fn list(&self) -> Result<Vec<CacheKey>> {
        let holder = self.holder_dir();
        let mut keys = Vec::new();
        if !holder.is_dir() {
            return Ok(keys);
        }
        for entry in fs::read_dir(&holder)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(CacheKey::parse_entry_name(name));
            }
        }
        keys.sort_by(|a, b| a.canonical().cmp(&b.canonical()));
        Ok(keys)
    }
}
