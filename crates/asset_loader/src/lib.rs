//! Source classification and offline-copy management for the defer runtime.
//!
//! A source path is a web URL, a local file, or unspecified; the
//! classification (not the cache) decides whether inlining is attempted.
//! `get_from_cache` resolves through the chain cache -> live fetch -> bundled
//! fallback, and only total exhaustion of that chain is an error.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io::Read;
use std::time::Duration;

use asset_cache::AssetCache;

/// Bundled copy of the defer runtime, compiled into the binary so the chain
/// always has a last resort that needs neither network nor disk.
pub const DEFERJS_FALLBACK: &str = include_str!("../assets/defer.min.js");

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_BYTE_CAP: u64 = 4 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetSource {
    WebUrl,
    LocalPath,
    Unspecified,
}

/// True for absolute `http(s)://` and protocol-relative `//` prefixes.
pub fn is_web_url(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.starts_with(b"//")
        || (bytes.len() >= 7 && bytes[..7].eq_ignore_ascii_case(b"http://"))
        || (bytes.len() >= 8 && bytes[..8].eq_ignore_ascii_case(b"https://"))
}

/// True iff the path resolves to an existing file.
pub fn is_local(path: &str) -> bool {
    !path.is_empty() && std::path::Path::new(path).is_file()
}

pub fn classify(path: &str) -> AssetSource {
    if is_web_url(path) {
        AssetSource::WebUrl
    } else if is_local(path) {
        AssetSource::LocalPath
    } else {
        AssetSource::Unspecified
    }
}

#[derive(Debug)]
pub enum LoaderError {
    /// Cache, live fetch and bundled fallback are all exhausted. The one hard
    /// error of the engine; everything else degrades.
    Unavailable { src: String },
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderError::Unavailable { src } => write!(
                f,
                "could not load the defer runtime (source: {:?}): no cached copy, \
                 live fetch failed, and no bundled fallback is available; \
                 check the deferjs_src and cache settings",
                src
            ),
        }
    }
}

impl Error for LoaderError {}

pub struct RemoteAssetLoader {
    src: String,
    host: String,
    ttl_secs: u64,
    fallback: &'static str,
    cache: Box<dyn AssetCache>,
}

impl RemoteAssetLoader {
    pub fn new(
        src: impl Into<String>,
        cache: Box<dyn AssetCache>,
        ttl_secs: u64,
        fallback: &'static str,
    ) -> Self {
        Self {
            src: src.into(),
            host: default_host(),
            ttl_secs,
            fallback,
            cache,
        }
    }

    /// Override the host identifier used in cache keys, for deployments that
    /// share one cache directory across logically distinct hosts.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    /// Host-qualified key, so the same cache directory can be shared across
    /// deployments without collisions.
    pub fn cache_key(&self) -> String {
        format!("{}@{}", self.host, self.src)
    }

    /// Current bytes of the source, by classification. `None` means the
    /// source is unusable right now (unspecified, unreachable, unreadable).
    fn fetch(&self) -> Option<Vec<u8>> {
        match classify(&self.src) {
            AssetSource::WebUrl => {
                let url = if self.src.starts_with("//") {
                    format!("https:{}", self.src)
                } else {
                    self.src.clone()
                };
                let agent = ureq::AgentBuilder::new()
                    .timeout(FETCH_TIMEOUT)
                    .build();
                match agent.get(&url).call() {
                    Ok(resp) => {
                        let mut bytes = Vec::new();
                        let mut reader = resp.into_reader().take(FETCH_BYTE_CAP);
                        if let Err(err) = reader.read_to_end(&mut bytes) {
                            log::warn!(target: "defer.loader", "read failed for {url}: {err}");
                            return None;
                        }
                        Some(bytes)
                    }
                    Err(err) => {
                        log::warn!(target: "defer.loader", "fetch failed for {url}: {err}");
                        None
                    }
                }
            }
            AssetSource::LocalPath => fs::read(&self.src).ok(),
            AssetSource::Unspecified => None,
        }
    }

    /// Fetch the source's current bytes and persist them under `key`.
    /// Returns `None` when the fetch fails; the caller falls back.
    pub fn make_offline(&mut self, key: &str, ttl_secs: u64) -> Option<Vec<u8>> {
        let bytes = self.fetch()?;
        if bytes.is_empty() {
            return None;
        }
        if let Err(err) = self.cache.set(key, &bytes, ttl_secs) {
            // A cache write failure degrades to "not cached", nothing worse.
            log::warn!(target: "defer.loader", "cache write failed for {key}: {err}");
        }
        Some(bytes)
    }

    /// Resolve the asset through cache -> live fetch -> bundled fallback.
    pub fn get_from_cache(&mut self) -> Result<Vec<u8>, LoaderError> {
        let key = self.cache_key();
        if let Some(bytes) = self.cache.get(&key) {
            log::debug!(target: "defer.loader", "cache hit for {key}");
            return Ok(bytes);
        }
        if let Some(bytes) = self.make_offline(&key, self.ttl_secs) {
            return Ok(bytes);
        }
        if !self.fallback.trim().is_empty() {
            log::info!(target: "defer.loader", "using bundled fallback for {key}");
            return Ok(self.fallback.as_bytes().to_vec());
        }
        Err(LoaderError::Unavailable {
            src: self.src.clone(),
        })
    }

    /// Explicit cache invalidation, e.g. on a version bump of the asset.
    pub fn purge_offline(&mut self) {
        let key = self.cache_key();
        log::debug!(target: "defer.loader", "purging {key}");
        self.cache.delete(&key);
    }
}

fn default_host() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
