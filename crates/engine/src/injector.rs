//! Builds and manages the injected `<script>`/`<style>` nodes.
//!
//! Every injected node carries a reserved id, used both to create it and to
//! find-and-remove it on later runs, so re-processing already-processed
//! output never duplicates nodes. Source classification decides node shape:
//! web URL -> reference node, local/bundled -> inline node with minified
//! contents.

use std::fs;
use std::sync::OnceLock;

use asset_cache::DiskCache;
use asset_loader::{
    AssetSource, DEFERJS_FALLBACK, LoaderError, RemoteAssetLoader, classify, is_web_url,
};
use dom::Node;

use crate::minify::{minify_css, minify_js};
use crate::{DEFAULT_DEFER_TYPE, DeferOptions};

pub const DEFERJS_ID: &str = "defer-js";
pub const POLYFILL_ID: &str = "polyfill-js";
pub const HELPERS_JS_ID: &str = "defer-script";
pub const HELPERS_CSS_ID: &str = "defer-css";
pub const CUSTOM_TYPE_ID: &str = "defer-custom";

const HELPERS_JS: &str = include_str!("../assets/helpers.min.js");
const HELPERS_CSS: &str = include_str!("../assets/styles.min.css");

// Global the helper runtime reads for the default defer delay.
const DELAY_VAR: &str = "deferjs_delay";

pub struct DeferAssetInjector<'a> {
    options: &'a DeferOptions,
    loader: RemoteAssetLoader,
}

impl<'a> DeferAssetInjector<'a> {
    pub fn new(options: &'a DeferOptions) -> Self {
        let cache = DiskCache::new(&options.offline_cache_path);
        let loader = RemoteAssetLoader::new(
            options.deferjs_src.clone(),
            Box::new(cache),
            options.offline_cache_ttl,
            DEFERJS_FALLBACK,
        );
        Self { options, loader }
    }

    /// Remove previously injected engine and polyfill nodes.
    pub fn clean_defer_tags(doc: &mut Node) {
        dom::detach_by_id(doc, "script", DEFERJS_ID);
        dom::detach_by_id(doc, "script", POLYFILL_ID);
        dom::detach_by_id(doc, "script", CUSTOM_TYPE_ID);
    }

    /// Remove previously injected helper nodes.
    pub fn clean_helper_tags(doc: &mut Node) {
        dom::detach_by_id(doc, "script", HELPERS_JS_ID);
        dom::detach_by_id(doc, "style", HELPERS_CSS_ID);
    }

    /// Clean, rebuild and insert the injected nodes at the start of `<head>`.
    pub fn rewrite(&mut self, doc: &mut Node) -> Result<(), LoaderError> {
        Self::clean_defer_tags(doc);
        Self::clean_helper_tags(doc);

        let mut nodes = vec![self.defer_js_node()?];
        nodes.extend(self.polyfill_node());
        nodes.extend(self.custom_type_node());
        nodes.extend(self.helper_js_node());
        nodes.extend(self.helper_css_node());

        let head = dom::ensure_head_mut(doc);
        if let Some(children) = head.children_mut() {
            for (i, node) in nodes.into_iter().enumerate() {
                children.insert(i, node);
            }
        }
        Ok(())
    }

    fn defer_js_node(&mut self) -> Result<Node, LoaderError> {
        if self.options.manually_add_deferjs {
            return Ok(self.guide_node());
        }
        if !self.options.inline_deferjs && is_web_url(&self.options.deferjs_src) {
            return Ok(Node::element(
                "script",
                vec![
                    ("id".to_string(), Some(DEFERJS_ID.to_string())),
                    ("src".to_string(), Some(self.options.deferjs_src.clone())),
                ],
            ));
        }
        self.inline_script_node()
    }

    // Inline engine node: local file, else cache -> fetch -> bundled chain.
    fn inline_script_node(&mut self) -> Result<Node, LoaderError> {
        let src = &self.options.deferjs_src;
        let bytes = match classify(src) {
            AssetSource::LocalPath => match fs::read(src) {
                Ok(bytes) => bytes,
                Err(err) => {
                    log::warn!(target: "defer.inject", "local read failed for {src}: {err}");
                    self.loader.get_from_cache()?
                }
            },
            _ => self.loader.get_from_cache()?,
        };
        let name = if is_web_url(src) {
            src.as_str()
        } else {
            "@deferhtml/defer.js"
        };
        let text = String::from_utf8_lossy(&bytes);
        let body = format!("/*!{name}*/\n{}", minify_js(&text));
        Ok(Node::element_with_text(
            "script",
            vec![("id".to_string(), Some(DEFERJS_ID.to_string()))],
            &body,
        ))
    }

    // Manual mode: instead of the runtime, warn the operator with the exact
    // tag to add by hand.
    fn guide_node(&self) -> Node {
        let src = if self.options.deferjs_src.is_empty() {
            "@deferhtml/defer.js"
        } else {
            self.options.deferjs_src.as_str()
        };
        let tag = format!("<script id=\"{DEFERJS_ID}\" src=\"{src}\"></script>");
        let escaped = tag
            .replace('\\', "\\\\")
            .replace('\'', "\\'")
            .replace('/', "\\/");
        let body =
            format!("console.warn('You should manually add the defer runtime.\\nLike this: {escaped}');");
        Node::element_with_text(
            "script",
            vec![("id".to_string(), Some(DEFERJS_ID.to_string()))],
            &body,
        )
    }

    fn polyfill_node(&self) -> Option<Node> {
        let src = &self.options.polyfill_src;
        let body = match classify(src) {
            AssetSource::WebUrl => format!(
                "'IntersectionObserver'in window||document.write('<script src=\"{src}\"><\\/script>');"
            ),
            AssetSource::LocalPath => {
                let text = fs::read_to_string(src).ok()?;
                minify_js(&text)
            }
            AssetSource::Unspecified => return None,
        };
        if body.is_empty() {
            return None;
        }
        Some(Node::element_with_text(
            "script",
            vec![("id".to_string(), Some(POLYFILL_ID.to_string()))],
            &body,
        ))
    }

    // Renamed deferred types still need activation: the runtime only watches
    // the stock selector by default.
    fn custom_type_node(&self) -> Option<Node> {
        let kind = &self.options.deferjs_type_attribute;
        if kind == DEFAULT_DEFER_TYPE || kind.is_empty() {
            return None;
        }
        Some(Node::element_with_text(
            "script",
            vec![("id".to_string(), Some(CUSTOM_TYPE_ID.to_string()))],
            &format!("Defer.all('script[type=\"{kind}\"]');"),
        ))
    }

    fn helper_js_node(&self) -> Option<Node> {
        // The bundled helper file never changes within a process lifetime.
        static MINIFIED: OnceLock<String> = OnceLock::new();
        let base = MINIFIED.get_or_init(|| minify_js(HELPERS_JS));
        if base.is_empty() {
            return None;
        }

        let mut script = String::new();
        if let Some(ms) = self.options.default_defer_time.filter(|ms| *ms > 0) {
            script.push_str(&format!("var {DELAY_VAR}={ms};"));
        }
        script.push_str(base);
        if let Some(copy) = self.options.custom_splash.as_deref().filter(|c| !c.is_empty()) {
            script = replace_copy_array(&script, copy);
        }

        Some(Node::element_with_text(
            "script",
            vec![("id".to_string(), Some(HELPERS_JS_ID.to_string()))],
            &script,
        ))
    }

    fn helper_css_node(&self) -> Option<Node> {
        static MINIFIED: OnceLock<String> = OnceLock::new();
        let content = MINIFIED.get_or_init(|| minify_css(HELPERS_CSS));
        if content.is_empty() {
            return None;
        }
        Some(Node::element_with_text(
            "style",
            vec![("id".to_string(), Some(HELPERS_CSS_ID.to_string()))],
            content,
        ))
    }
}

// Swaps the helper's `['Optimized ...']` copy array for the caller's text.
// Literal and delimiter-aware: the replacement is escaped into a single
// quoted element, so delimiters inside it cannot break the array.
fn replace_copy_array(script: &str, copy: &str) -> String {
    let lower = script.to_ascii_lowercase();
    let Some(start) = lower.find("['optimized") else {
        return script.to_string();
    };
    let Some(end_rel) = script[start..].find(']') else {
        return script.to_string();
    };
    let end = start + end_rel + 1;

    let escaped = copy
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace("\r\n", "\n")
        .replace(['\r', '\n'], "\\n");

    format!("{}['{}']{}", &script[..start], escaped, &script[end..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeferOptions;

    fn options(dir: &std::path::Path) -> DeferOptions {
        DeferOptions {
            offline_cache_path: dir.to_path_buf(),
            ..DeferOptions::default()
        }
    }

    #[test]
    fn rewrite_inserts_engine_helper_and_style_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        let mut doc = dom::parse("<html><head></head><body></body></html>");
        DeferAssetInjector::new(&opts).rewrite(&mut doc).unwrap();

        assert_eq!(dom::count_by_id(&doc, "script", DEFERJS_ID), 1);
        assert_eq!(dom::count_by_id(&doc, "script", HELPERS_JS_ID), 1);
        assert_eq!(dom::count_by_id(&doc, "style", HELPERS_CSS_ID), 1);
        // No polyfill configured, none injected.
        assert_eq!(dom::count_by_id(&doc, "script", POLYFILL_ID), 0);

        let engine = dom::find_by_id(&doc, "script", DEFERJS_ID).unwrap();
        assert!(engine.text_content().starts_with("/*!@deferhtml/defer.js*/"));
    }

    #[test]
    fn clean_plus_insert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        let mut doc = dom::parse("<html><head><title>t</title></head></html>");

        DeferAssetInjector::new(&opts).rewrite(&mut doc).unwrap();
        let once = dom::serialize(&doc);
        DeferAssetInjector::new(&opts).rewrite(&mut doc).unwrap();
        DeferAssetInjector::new(&opts).rewrite(&mut doc).unwrap();

        assert_eq!(dom::serialize(&doc), once);
        assert_eq!(dom::count_by_id(&doc, "script", DEFERJS_ID), 1);
        assert_eq!(dom::count_by_id(&doc, "script", HELPERS_JS_ID), 1);
        assert_eq!(dom::count_by_id(&doc, "style", HELPERS_CSS_ID), 1);
    }

    #[test]
    fn web_polyfill_injects_conditional_loader() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.polyfill_src = "https://cdn.example.com/io-polyfill.js".to_string();

        let mut doc = dom::parse("<head></head>");
        DeferAssetInjector::new(&opts).rewrite(&mut doc).unwrap();

        let node = dom::find_by_id(&doc, "script", POLYFILL_ID).unwrap();
        let body = node.text_content();
        assert!(body.contains("'IntersectionObserver'in window"));
        assert!(body.contains("io-polyfill.js"));
        assert!(!body.contains("</script>"), "must not close the region");
    }

    #[test]
    fn reference_node_when_inlining_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.inline_deferjs = false;
        opts.deferjs_src = "https://cdn.example.com/defer.min.js".to_string();

        let mut doc = dom::parse("<head></head>");
        DeferAssetInjector::new(&opts).rewrite(&mut doc).unwrap();

        let node = dom::find_by_id(&doc, "script", DEFERJS_ID).unwrap();
        assert_eq!(node.attr("src"), Some("https://cdn.example.com/defer.min.js"));
        assert_eq!(node.text_content(), "");
    }

    #[test]
    fn custom_defer_type_gets_activation_node() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.deferjs_type_attribute = "text/lazyscript".to_string();

        let mut doc = dom::parse("<head></head>");
        DeferAssetInjector::new(&opts).rewrite(&mut doc).unwrap();

        let node = dom::find_by_id(&doc, "script", CUSTOM_TYPE_ID).unwrap();
        assert_eq!(
            node.text_content(),
            "Defer.all('script[type=\"text/lazyscript\"]');"
        );
    }

    #[test]
    fn manual_mode_injects_guide_instead_of_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.manually_add_deferjs = true;

        let mut doc = dom::parse("<head></head>");
        DeferAssetInjector::new(&opts).rewrite(&mut doc).unwrap();

        let node = dom::find_by_id(&doc, "script", DEFERJS_ID).unwrap();
        let body = node.text_content();
        assert!(body.starts_with("console.warn("));
        assert!(!body.contains("</script>"));
    }

    #[test]
    fn default_delay_prefixes_helper_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.default_defer_time = Some(1500);

        let mut doc = dom::parse("<head></head>");
        DeferAssetInjector::new(&opts).rewrite(&mut doc).unwrap();

        let node = dom::find_by_id(&doc, "script", HELPERS_JS_ID).unwrap();
        assert!(node.text_content().starts_with("var deferjs_delay=1500;"));
    }

    #[test]
    fn copy_replacement_is_delimiter_aware() {
        let script = "var copy = ['Optimized by deferhtml']; run(copy);";
        let out = replace_copy_array(script, "it's done]\nnew line");
        assert_eq!(
            out,
            "var copy = ['it\\'s done]\\nnew line']; run(copy);"
        );
    }

    #[test]
    fn copy_replacement_without_marker_is_a_no_op() {
        assert_eq!(replace_copy_array("var x = 1;", "text"), "var x = 1;");
    }
}
