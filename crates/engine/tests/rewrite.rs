use engine::{DEFERJS_ID, DeferOptions, HELPERS_CSS_ID, HELPERS_JS_ID, rewrite_document};

fn options(dir: &std::path::Path) -> DeferOptions {
    DeferOptions {
        offline_cache_path: dir.to_path_buf(),
        ..DeferOptions::default()
    }
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[test]
fn injects_runtime_and_preserves_template_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let template = r#"<div class="row">{{msg}}</div><p>&copy; 2026</p>"#;
    let html = format!(
        "<!DOCTYPE html><html><head><title>x</title></head><body>\
         <script type=\"text/template\" id=\"tpl\">{template}</script>\
         </body></html>"
    );

    let out = rewrite_document(&html, &options(dir.path())).unwrap();

    assert!(out.contains(template), "template body must survive byte-for-byte");
    assert_eq!(count(&out, &format!("id=\"{DEFERJS_ID}\"")), 1);
    assert_eq!(count(&out, &format!("id=\"{HELPERS_JS_ID}\"")), 1);
    assert_eq!(count(&out, &format!("id=\"{HELPERS_CSS_ID}\"")), 1);
    assert!(!out.contains("@@@SCRIPT@@@"), "tokens must never leak");
}

#[test]
fn javascript_markup_is_rewritten_to_string_safe_form() {
    let dir = tempfile::tempdir().unwrap();
    let html = r#"<html><head></head><body><script>document.write("</div>");</script></body></html>"#;

    let out = rewrite_document(html, &options(dir.path())).unwrap();

    assert!(out.contains(r#"document.write("<\/div>");"#), "got: {out}");
    assert!(!out.contains(r#"document.write("</div>");"#));
}

#[test]
fn unknown_entities_in_text_and_attributes_survive() {
    let dir = tempfile::tempdir().unwrap();
    let html = "<html><head></head><body>\
                <p title=\"&rsquo;quoted&rsquo;\">&copy; 2026 &mdash; Acme</p>\
                </body></html>";

    let out = rewrite_document(html, &options(dir.path())).unwrap();

    assert!(out.contains("&copy; 2026 &mdash; Acme"), "got: {out}");
    assert!(out.contains("&rsquo;quoted&rsquo;"));
    assert!(!out.contains("&amp;copy;"), "must not double-escape: {out}");
}

#[test]
fn legacy_comment_hidden_scripts_are_unwrapped() {
    let dir = tempfile::tempdir().unwrap();
    let html = "<html><head></head><body><script>\n<!--\nvar a = 1;\n// -->\n</script></body></html>";

    let out = rewrite_document(html, &options(dir.path())).unwrap();

    assert!(out.contains("<script>var a = 1;</script>"), "got: {out}");
}

#[test]
fn processing_its_own_output_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let opts = options(dir.path());
    let html = "<!DOCTYPE html><html><head><title>t</title></head>\
                <body><p>hello</p><script>var a = 1;</script></body></html>";

    let once = rewrite_document(html, &opts).unwrap();
    let twice = rewrite_document(&once, &opts).unwrap();

    assert_eq!(once, twice, "re-running must not duplicate or drift");
    assert_eq!(count(&twice, &format!("id=\"{DEFERJS_ID}\"")), 1);
}

#[test]
fn deferred_scripts_keep_their_type_until_runtime_swaps_them() {
    let dir = tempfile::tempdir().unwrap();
    let html = r#"<html><head></head><body><script type="deferjs">heavy();</script></body></html>"#;

    let out = rewrite_document(html, &options(dir.path())).unwrap();

    assert!(out.contains(r#"<script type="deferjs">heavy();</script>"#));
}

#[test]
fn options_deserialize_from_toml_with_defaults() {
    let opts: DeferOptions = toml::from_str(
        r#"
            deferjs_type_attribute = "text/lazyload"
            offline_cache_ttl = 60
        "#,
    )
    .unwrap();

    assert_eq!(opts.deferjs_type_attribute, "text/lazyload");
    assert_eq!(opts.offline_cache_ttl, 60);
    assert!(opts.inline_deferjs);
    assert!(opts.deferjs_src.is_empty());
    assert_eq!(opts.default_defer_time, None);
}
