//! Minimal, explicitly limited entity decoding.
//!
//! Named entities: `&amp;` `&lt;` `&gt;` `&quot;` `&apos;` `&nbsp;`.
//! Numeric entities decode only when well-formed and semicolon-terminated;
//! invalid scalars, unknown names and truncated references pass through
//! unchanged. Intentionally not HTML5-complete; keep the behavior narrow.

use memchr::memchr;

const NAMED: [(&[u8], char); 6] = [
    (b"amp;", '&'),
    (b"lt;", '<'),
    (b"gt;", '>'),
    (b"quot;", '"'),
    (b"apos;", '\''),
    (b"nbsp;", '\u{00A0}'),
];

pub(crate) fn decode_entities(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;

    while i < bytes.len() {
        let Some(rel) = memchr(b'&', &bytes[i..]) else {
            out.push_str(&s[i..]);
            break;
        };
        out.push_str(&s[i..i + rel]);
        let amp = i + rel;

        if let Some((ch, consumed)) = decode_one(&bytes[amp..], s, amp) {
            out.push(ch);
            i = amp + consumed;
        } else {
            out.push('&');
            i = amp + 1;
        }
    }

    out
}

// Attempts to decode the reference starting at `bytes[0] == b'&'`.
// Returns the decoded char and the byte length of the whole reference.
fn decode_one(bytes: &[u8], s: &str, amp: usize) -> Option<(char, usize)> {
    for (name, ch) in NAMED {
        if bytes.len() > name.len() && &bytes[1..1 + name.len()] == name {
            return Some((ch, 1 + name.len()));
        }
    }

    if bytes.len() < 4 || bytes[1] != b'#' {
        return None;
    }

    let (digits_at, radix, max_digits) = if bytes[2] == b'x' || bytes[2] == b'X' {
        (3, 16, 6) // 0x10FFFF
    } else {
        (2, 10, 7) // 1114111
    };

    let mut j = digits_at;
    while j < bytes.len() && j - digits_at <= max_digits {
        let b = bytes[j];
        if b == b';' {
            if j == digits_at {
                return None;
            }
            let digits = &s[amp + digits_at..amp + j];
            let ch = u32::from_str_radix(digits, radix)
                .ok()
                .and_then(char::from_u32)?;
            return Some((ch, j + 1));
        }
        let is_digit = if radix == 16 {
            b.is_ascii_hexdigit()
        } else {
            b.is_ascii_digit()
        };
        if !is_digit {
            return None;
        }
        j += 1;
    }

    None
}

// Length of the reference-shaped run at `s[amp] == '&'` that decoding leaves
// alone, or None when there is no reference shape or it would decode. The
// serializer emits these spans verbatim instead of re-escaping the ampersand,
// so undecoded references round-trip unchanged.
pub(crate) fn undecoded_ref_len(s: &str, amp: usize) -> Option<usize> {
    let bytes = &s.as_bytes()[amp..];
    let len = ref_shape_len(bytes)?;
    match decode_one(bytes, s, amp) {
        Some(_) => None,
        None => Some(len),
    }
}

// `&`, optional `#`, at least one ASCII alphanumeric, `;`.
fn ref_shape_len(bytes: &[u8]) -> Option<usize> {
    let mut j = 1;
    if bytes.get(j) == Some(&b'#') {
        j += 1;
    }
    let run_start = j;
    while bytes.get(j).is_some_and(|b| b.is_ascii_alphanumeric()) {
        j += 1;
    }
    if j > run_start && bytes.get(j) == Some(&b';') {
        Some(j + 1)
    } else {
        None
    }
}
