//! Document-rewriting engine: wraps the tree rewrite in the patch pipeline
//! and injects the defer runtime and its helpers.

mod injector;
mod minify;

pub use crate::injector::{
    CUSTOM_TYPE_ID, DEFERJS_ID, DeferAssetInjector, HELPERS_CSS_ID, HELPERS_JS_ID, POLYFILL_ID,
};
pub use crate::minify::{minify_css, minify_js};

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use asset_cache::DiskCache;
use asset_loader::{DEFERJS_FALLBACK, LoaderError, RemoteAssetLoader};
use patches::{PatchOptions, PatchPipeline, PipelineError, ScriptGuardPatch};
use serde::Deserialize;

/// Stock value of the deferred `type` attribute; anything else needs an
/// activation node.
pub const DEFAULT_DEFER_TYPE: &str = "deferjs";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeferOptions {
    /// `type` attribute value marking scripts the user wants deferred.
    pub deferjs_type_attribute: String,
    /// Engine source: web URL, local path, or empty for the bundled copy.
    pub deferjs_src: String,
    /// Polyfill source: web URL, local path, or empty to skip.
    pub polyfill_src: String,
    /// Embed the engine inline (offline copy) instead of referencing by URL.
    pub inline_deferjs: bool,
    /// Emit an operator guide instead of the runtime.
    pub manually_add_deferjs: bool,
    pub offline_cache_path: PathBuf,
    pub offline_cache_ttl: u64,
    /// Default defer delay in milliseconds, prefixed to the helper script.
    pub default_defer_time: Option<u64>,
    /// Replacement text for the helper script's copy array.
    pub custom_splash: Option<String>,
}

impl Default for DeferOptions {
    fn default() -> Self {
        Self {
            deferjs_type_attribute: DEFAULT_DEFER_TYPE.to_string(),
            deferjs_src: String::new(),
            polyfill_src: String::new(),
            inline_deferjs: true,
            manually_add_deferjs: false,
            offline_cache_path: PathBuf::from("cache/deferjs"),
            offline_cache_ttl: 86400,
            default_defer_time: None,
            custom_splash: None,
        }
    }
}

#[derive(Debug)]
pub enum DeferError {
    Pipeline(PipelineError),
    Asset(LoaderError),
}

impl fmt::Display for DeferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferError::Pipeline(err) => err.fmt(f),
            DeferError::Asset(err) => err.fmt(f),
        }
    }
}

impl Error for DeferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DeferError::Pipeline(err) => Some(err),
            DeferError::Asset(err) => Some(err),
        }
    }
}

impl From<PipelineError> for DeferError {
    fn from(err: PipelineError) -> Self {
        DeferError::Pipeline(err)
    }
}

impl From<LoaderError> for DeferError {
    fn from(err: LoaderError) -> Self {
        DeferError::Asset(err)
    }
}

/// Rewrite one document: guard patches around parse -> clean -> inject ->
/// serialize. Deterministic for identical input and options; placeholder
/// tokens never appear in the output.
pub fn rewrite_document(html: &str, options: &DeferOptions) -> Result<String, DeferError> {
    log::debug!(target: "defer.engine", "rewriting document ({} bytes)", html.len());

    let mut pipeline = PatchPipeline::new();
    pipeline.push(Box::new(ScriptGuardPatch::new()));
    let patch_options = PatchOptions {
        deferjs_type_attribute: options.deferjs_type_attribute.clone(),
    };

    let mut injector = DeferAssetInjector::new(options);
    let out = pipeline.run(html.to_string(), &patch_options, |html| {
        let mut doc = dom::parse(&html);
        injector.rewrite(&mut doc).map_err(|e| e.to_string())?;
        Ok(dom::serialize(&doc))
    })?;
    Ok(out)
}

/// Drop the offline copy of the engine script, e.g. on a version bump.
pub fn purge_offline(options: &DeferOptions) {
    let cache = DiskCache::new(&options.offline_cache_path);
    let mut loader = RemoteAssetLoader::new(
        options.deferjs_src.clone(),
        Box::new(cache),
        options.offline_cache_ttl,
        DEFERJS_FALLBACK,
    );
    loader.purge_offline();
}
