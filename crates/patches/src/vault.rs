//! Per-run token-to-fragment mapping used to hide content from the parser.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// Process-wide sequence so tokens stay distinct across vaults too.
static TOKEN_SEQ: AtomicU64 = AtomicU64::new(1);

/// Maps generated placeholder tokens back to the original text fragments.
///
/// Tokens are fixed-width comment-shaped strings, pairwise distinct within a
/// process, and (being equal length and distinct) never substrings of one
/// another. They survive tree parsing unescaped because they contain nothing
/// an HTML parser treats specially.
#[derive(Debug, Default)]
pub struct PlaceholderVault {
    entries: Vec<(String, String)>,
}

impl PlaceholderVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `original` and return the token that stands in for it.
    pub fn hide(&mut self, original: String) -> String {
        let seq = TOKEN_SEQ.fetch_add(1, Ordering::Relaxed);
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let token = format!(
            "/** @@@SCRIPT@@@:{:08x}:{:012x}:{:012x} **/",
            process::id(),
            stamp & 0xffff_ffff_ffff,
            seq & 0xffff_ffff_ffff,
        );
        self.entries.push((token.clone(), original));
        token
    }

    /// Literal (non-pattern) substitution of every token back to its
    /// original fragment.
    pub fn restore(&self, mut html: String) -> String {
        for (token, original) in &self.entries {
            html = html.replace(token.as_str(), original);
        }
        html
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discard all entries. Safe to call repeatedly.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_pairwise_distinct_and_not_substrings() {
        let mut vault = PlaceholderVault::new();
        let tokens: Vec<String> = (0..16)
            .map(|n| vault.hide(format!("body {n}")))
            .collect();
        assert_eq!(vault.len(), 16);
        for (i, a) in tokens.iter().enumerate() {
            for (j, b) in tokens.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                    assert!(!a.contains(b.as_str()), "{b} inside {a}");
                }
            }
        }
    }

    #[test]
    fn restore_substitutes_each_token_exactly() {
        let mut vault = PlaceholderVault::new();
        let t1 = vault.hide("<div>one</div>".to_string());
        let t2 = vault.hide("</p>two".to_string());
        let html = format!("<script>{t1}</script><script>{t2}</script>");
        let restored = vault.restore(html);
        assert_eq!(
            restored,
            "<script><div>one</div></script><script></p>two</script>"
        );
    }

    #[test]
    fn restore_is_literal_not_pattern_based() {
        let mut vault = PlaceholderVault::new();
        // Original containing regex-special characters must come back as-is.
        let original = r"$1 \w+ (.*) [a-z]".to_string();
        let token = vault.hide(original.clone());
        assert_eq!(vault.restore(token), original);
    }

    #[test]
    fn clear_resets_and_is_idempotent() {
        let mut vault = PlaceholderVault::new();
        vault.hide("x".to_string());
        vault.clear();
        assert!(vault.is_empty());
        vault.clear();
        assert_eq!(vault.restore("untouched".to_string()), "untouched");
    }
}
