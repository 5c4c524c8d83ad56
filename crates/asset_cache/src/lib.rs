//! TTL-backed key/value store for offline asset copies.
//!
//! Expiry is computed once at write time (`now + ttl`); a `get`/`has` after
//! expiry behaves exactly like the key was never set, and evicts the stale
//! record lazily instead of relying on a sweep. A `ttl` of zero expires
//! immediately. Backends are single-process friendly; concurrent writers to
//! the same key are last-write-wins.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub trait AssetCache {
    fn set(&mut self, key: &str, value: &[u8], ttl_secs: u64) -> io::Result<()>;
    fn get(&mut self, key: &str) -> Option<Vec<u8>>;
    fn has(&mut self, key: &str) -> bool;
    fn delete(&mut self, key: &str);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: u64,
}

impl CacheEntry {
    fn expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// HashMap-backed cache, used in tests and embedded setups.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssetCache for MemoryCache {
    fn set(&mut self, key: &str, value: &[u8], ttl_secs: u64) -> io::Result<()> {
        let expires_at = unix_now().saturating_add(ttl_secs);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        let now = unix_now();
        match self.entries.get(key) {
            Some(entry) if !entry.expired(now) => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn has(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// One file per key under a cache directory.
///
/// Layout: the filename is a percent-style encoding of the key, the file is a
/// single `expires_at` header line followed by the raw value bytes. Writes go
/// through a temp file + rename so a concurrent reader never observes a torn
/// entry. A corrupt or unreadable entry reads as a miss.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for_key(&self, key: &str) -> PathBuf {
        self.dir.join(encode_key(key))
    }

    fn read_entry(path: &Path) -> Option<CacheEntry> {
        let bytes = fs::read(path).ok()?;
        let newline = bytes.iter().position(|&b| b == b'\n')?;
        let header = std::str::from_utf8(&bytes[..newline]).ok()?;
        let expires_at = header.trim().parse::<u64>().ok()?;
        Some(CacheEntry {
            value: bytes[newline + 1..].to_vec(),
            expires_at,
        })
    }
}

impl AssetCache for DiskCache {
    fn set(&mut self, key: &str, value: &[u8], ttl_secs: u64) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let expires_at = unix_now().saturating_add(ttl_secs);
        let path = self.file_for_key(key);
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(format!("{expires_at}\n").as_bytes())?;
            file.write_all(value)?;
        }
        fs::rename(&tmp, &path)?;
        log::debug!(target: "defer.cache", "stored {key} ({} bytes, expires {expires_at})", value.len());
        Ok(())
    }

    fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        let path = self.file_for_key(key);
        let entry = Self::read_entry(&path)?;
        if entry.expired(unix_now()) {
            log::debug!(target: "defer.cache", "evicting stale entry {key}");
            let _ = fs::remove_file(&path);
            return None;
        }
        Some(entry.value)
    }

    fn has(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn delete(&mut self, key: &str) {
        let _ = fs::remove_file(self.file_for_key(key));
    }
}

// Filenames must stay unambiguous per key, so everything outside a small
// safe set is %XX-encoded (including '%' itself).
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' | b'_' | b'@' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{b:02X}"));
            }
        }
    }
    out
}
