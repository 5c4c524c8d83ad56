//! Deliberately conservative minification: comment and blank-line stripping
//! only. Never rewrites tokens, so string contents are safe by construction.

/// Drops whole-line `//` comments, leading indentation and blank lines.
/// `/*!` banner comments and inline trailing comments are kept; anything
/// cleverer belongs to a real minifier.
pub fn minify_js(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut in_block_comment = false;
    for line in src.lines() {
        let trimmed = line.trim();
        if in_block_comment {
            if trimmed.ends_with("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        if trimmed.starts_with("/*") && !trimmed.starts_with("/*!") {
            if !trimmed.contains("*/") {
                in_block_comment = true;
            }
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(trimmed);
    }
    out
}

/// Strips `/* ... */` comments (keeping `/*!` banners) and collapses
/// whitespace runs.
pub fn minify_css(src: &str) -> String {
    let stripped = strip_css_comments(src);
    let mut out = String::with_capacity(stripped.len());
    let mut pending_space = false;
    for ch in stripped.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            // No space needed around CSS structural characters.
            let last = out.chars().last();
            if !matches!(last, Some('{' | '}' | ';' | ':' | ','))
                && !matches!(ch, '{' | '}' | ';' | ':' | ',')
            {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

fn strip_css_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail.find("*/").map(|e| e + 2).unwrap_or(tail.len());
        if tail.starts_with("/*!") {
            out.push_str(&tail[..end]);
        }
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}
