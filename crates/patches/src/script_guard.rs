//! Normalizes `<script>` bodies so a generic tree parser survives them, and
//! hides bodies that stay markup-like behind vault tokens.
//!
//! Executable bodies get legacy comment wrappers stripped, bare character
//! references re-anchored (`&` -> `&#38;`), `</tag>` shapes rewritten to the
//! JS-string-safe `<&#92;/tag>`, and literal backslashes (plus the Yen sign,
//! byte-identical to backslash in some legacy encodings) encoded as `&#92;`.
//! All of these decode back to the intended literal text when the parser
//! resolves character references in script content. Bodies that still carry
//! `</tag>`-shaped text after that (notably inline templates) are unsafe for
//! any parser and are swapped for a placeholder token instead.

use crate::vault::PlaceholderVault;
use crate::{Patch, PatchError, PatchOptions};
use memchr::memchr;

#[derive(Debug, Default)]
pub struct ScriptGuardPatch {
    vault: PlaceholderVault,
}

impl ScriptGuardPatch {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Patch for ScriptGuardPatch {
    fn name(&self) -> &'static str {
        "script-guard"
    }

    fn before(&mut self, html: String, options: &PatchOptions) -> Result<String, PatchError> {
        let regions = find_script_regions(&html);
        if regions.is_empty() {
            return Ok(html);
        }

        let mut out = String::with_capacity(html.len());
        let mut last = 0;
        for region in regions {
            out.push_str(&html[last..region.body_start]);
            let open_tag = &html[region.open_start..region.body_start];
            let body = &html[region.body_start..region.body_end];

            let mut content = if is_executable_js(open_tag, &options.deferjs_type_attribute) {
                normalize_script_body(body)
            } else {
                body.to_string()
            };

            if contains_closing_tag(&content) {
                log::debug!(
                    target: "defer.guard",
                    "hiding markup-like script body ({} bytes)",
                    content.len()
                );
                content = self.vault.hide(content);
            }

            out.push_str(&content);
            last = region.body_end;
        }
        out.push_str(&html[last..]);
        Ok(out)
    }

    fn after(&mut self, html: String, _options: &PatchOptions) -> Result<String, PatchError> {
        if self.vault.is_empty() {
            return Ok(html);
        }
        Ok(self.vault.restore(html))
    }

    fn cleanup(&mut self) {
        self.vault.clear();
    }
}

struct ScriptRegion {
    open_start: usize,
    body_start: usize,
    body_end: usize,
}

// Locates `<script ...>body</script>` regions: case-insensitive, attributes
// in any order, body spanning newlines, shortest close wins. A script with
// no detectable end tag is left untouched (accepted limitation, not an
// error), and nothing after it can start a region either.
fn find_script_regions(html: &str) -> Vec<ScriptRegion> {
    const OPEN: &[u8] = b"<script";
    let bytes = html.as_bytes();
    let mut regions = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let Some(rel) = memchr(b'<', &bytes[i..]) else {
            break;
        };
        let lt = i + rel;
        if !starts_with_ignore_ascii_case(bytes, lt, OPEN) {
            i = lt + 1;
            continue;
        }
        // Reject longer tag names like `<scripting>`.
        let after_name = lt + OPEN.len();
        let boundary = match bytes.get(after_name) {
            Some(&b) => b.is_ascii_whitespace() || b == b'>' || b == b'/',
            None => false,
        };
        if !boundary {
            i = lt + 1;
            continue;
        }
        let Some(gt_rel) = memchr(b'>', &bytes[after_name..]) else {
            break;
        };
        let body_start = after_name + gt_rel + 1;
        let Some(close_start) = find_close_tag(bytes, body_start) else {
            break;
        };
        regions.push(ScriptRegion {
            open_start: lt,
            body_start,
            body_end: close_start,
        });
        i = close_start + 2;
    }

    regions
}

// First `</script>` (case-insensitive, optional whitespace before `>`) at or
// after `from`. Returns the offset of its `<`.
fn find_close_tag(bytes: &[u8], from: usize) -> Option<usize> {
    const CLOSE: &[u8] = b"</script";
    let mut i = from;
    while i < bytes.len() {
        let rel = memchr(b'<', &bytes[i..])?;
        let lt = i + rel;
        if starts_with_ignore_ascii_case(bytes, lt, CLOSE) {
            let mut k = lt + CLOSE.len();
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k < bytes.len() && bytes[k] == b'>' {
                return Some(lt);
            }
        }
        i = lt + 1;
    }
    None
}

fn starts_with_ignore_ascii_case(haystack: &[u8], start: usize, needle: &[u8]) -> bool {
    haystack.len() >= start + needle.len()
        && haystack[start..start + needle.len()].eq_ignore_ascii_case(needle)
}

// A body is real executable script when the opening tag declares no type at
// all, a JavaScript MIME type, or the configured deferred type. The deferred
// type is matched in its double-quoted spelling, like the system it feeds.
fn is_executable_js(open_tag: &str, deferred_type: &str) -> bool {
    let open = open_tag.to_ascii_lowercase();
    !open.contains(" type=")
        || open.contains("/javascript")
        || open.contains(&format!(" type=\"{}\"", deferred_type.to_ascii_lowercase()))
}

fn normalize_script_body(body: &str) -> String {
    let stripped = strip_legacy_comment_markers(body.trim());
    let reanchored = reencode_entity_refs(stripped);
    let escaped = escape_closing_tags(&reanchored);
    escape_backslashes(&escaped)
}

// Legacy authors hid inline JS from ancient browsers behind `<!--` ... `// -->`.
// Strip one leading open marker and one trailing close (or bare `//`) marker.
fn strip_legacy_comment_markers(body: &str) -> &str {
    let mut t = body;
    if let Some(rest) = t.strip_prefix("<!--") {
        t = rest.trim_start();
    }
    if let Some(head) = t.strip_suffix("-->") {
        let head = head.trim_end();
        if let Some(head) = head.strip_suffix("//") {
            t = head.trim_end();
        }
    } else if let Some(head) = t.strip_suffix("//") {
        t = head.trim_end();
    }
    t
}

// `&name;` / `&#123;`-shaped references only ([a-z0-9], '#' optional); the
// ampersand becomes `&#38;` so the parser decodes the reference back to its
// literal spelling instead of to a different character. Malformed or partial
// sequences pass through untouched.
fn reencode_entity_refs(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        let Some(rel) = memchr(b'&', &bytes[i..]) else {
            out.push_str(&s[i..]);
            return out;
        };
        let amp = i + rel;
        out.push_str(&s[i..amp]);

        let mut j = amp + 1;
        if bytes.get(j) == Some(&b'#') {
            j += 1;
        }
        let name_start = j;
        while j < bytes.len() && (bytes[j].is_ascii_digit() || bytes[j].is_ascii_lowercase()) {
            j += 1;
        }
        if j > name_start && bytes.get(j) == Some(&b';') {
            out.push_str("&#38;");
            out.push_str(&s[amp + 1..=j]);
            i = j + 1;
        } else {
            out.push('&');
            i = amp + 1;
        }
    }
    out
}

// `</name>` -> `<&#92;/name>`, which decodes to `<\/name>`: same meaning
// inside JS strings, invisible to script-end detectors.
fn escape_closing_tags(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        let Some(rel) = memchr(b'<', &bytes[i..]) else {
            out.push_str(&s[i..]);
            return out;
        };
        let lt = i + rel;
        out.push_str(&s[i..lt]);
        if bytes.get(lt + 1) == Some(&b'/')
            && let Some(gt_rel) = memchr(b'>', &bytes[lt + 2..])
        {
            let gt = lt + 2 + gt_rel;
            out.push_str("<&#92;/");
            out.push_str(&s[lt + 2..gt]);
            out.push('>');
            i = gt + 1;
        } else {
            out.push('<');
            i = lt + 1;
        }
    }
    out
}

fn escape_backslashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' | '\u{00A5}' => out.push_str("&#92;"),
            other => out.push(other),
        }
    }
    out
}

// `</` eventually followed by `>` anywhere in the body.
fn contains_closing_tag(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let Some(rel) = memchr(b'<', &bytes[i..]) else {
            return false;
        };
        let lt = i + rel;
        if bytes.get(lt + 1) == Some(&b'/') && memchr(b'>', &bytes[lt + 2..]).is_some() {
            return true;
        }
        i = lt + 1;
    }
    false
}
