//! Tolerant single-pass HTML tokenizer.
//!
//! Not an HTML5 state machine: tag and attribute names are restricted to
//! ASCII `[A-Za-z0-9:_.-]`, parse errors degrade to text, and there is no
//! spec error recovery. `<script>`/`<style>` bodies are scanned as rawtext;
//! script bodies get character references decoded on parse (the serializer
//! emits rawtext verbatim, which is what lets an upstream rewriter hide
//! escaped content inside script text and get the literal form back out).

use crate::entities::decode_entities;
use crate::types::{Token, is_rawtext_element, is_void_element};
use memchr::memchr;

pub fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            let start = i;
            i = memchr(b'<', &bytes[i..]).map_or(bytes.len(), |rel| i + rel);
            push_text(&mut out, decode_entities(&input[start..i]));
            continue;
        }

        if input[i..].starts_with("<!--") {
            let body_start = i + 4;
            match input[body_start..].find("-->") {
                Some(end) => {
                    out.push(Token::Comment(input[body_start..body_start + end].to_string()));
                    i = body_start + end + 3;
                }
                None => {
                    out.push(Token::Comment(input[body_start..].to_string()));
                    break;
                }
            }
            continue;
        }

        if starts_with_ignore_ascii_case(bytes, i, b"<!doctype") {
            match memchr(b'>', &bytes[i..]) {
                Some(rel) => {
                    let value = input[i + 9..i + rel].trim().to_string();
                    out.push(Token::Doctype(value));
                    i += rel + 1;
                }
                None => break,
            }
            continue;
        }

        // Other markup declarations and processing instructions are dropped.
        if i + 1 < bytes.len() && (bytes[i + 1] == b'!' || bytes[i + 1] == b'?') {
            log::trace!(target: "defer.dom", "dropping markup declaration at byte {i}");
            match memchr(b'>', &bytes[i..]) {
                Some(rel) => i += rel + 1,
                None => break,
            }
            continue;
        }

        if i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            let mut j = i + 2;
            let name_start = j;
            while j < bytes.len() && is_name_byte(bytes[j]) {
                j += 1;
            }
            let name = input[name_start..j].to_ascii_lowercase();
            match memchr(b'>', &bytes[j..]) {
                Some(rel) => {
                    if !name.is_empty() {
                        out.push(Token::EndTag(name));
                    }
                    i = j + rel + 1;
                }
                None => break,
            }
            continue;
        }

        if i + 1 < bytes.len() && bytes[i + 1].is_ascii_alphabetic() {
            match scan_start_tag(input, i) {
                Some((token, after)) => {
                    let rawtext = match &token {
                        Token::StartTag {
                            name, self_closing, ..
                        } => (!self_closing && !is_void_element(name) && is_rawtext_element(name))
                            .then(|| name.clone()),
                        _ => None,
                    };
                    out.push(token);
                    i = after;
                    if let Some(name) = rawtext {
                        i = scan_rawtext(input, i, &name, &mut out);
                    }
                }
                None => {
                    // No closing '>' in the rest of the input: degrade to text.
                    log::trace!(target: "defer.dom", "unterminated tag at byte {i}, degrading to text");
                    push_text(&mut out, decode_entities(&input[i..]));
                    break;
                }
            }
            continue;
        }

        // Lone '<' that opens nothing tag-like.
        push_text(&mut out, "<".to_string());
        i += 1;
    }

    out
}

fn push_text(out: &mut Vec<Token>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(Token::Text(prev)) = out.last_mut() {
        prev.push_str(&text);
    } else {
        out.push(Token::Text(text));
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b':' | b'_' | b'.' | b'-')
}

fn starts_with_ignore_ascii_case(haystack: &[u8], start: usize, needle: &[u8]) -> bool {
    haystack.len() >= start + needle.len()
        && haystack[start..start + needle.len()].eq_ignore_ascii_case(needle)
}

// Parses `<name attr=... >` starting at the '<'. Returns the token and the
// byte offset just past the closing '>', or None when the tag never closes.
fn scan_start_tag(input: &str, start: usize) -> Option<(Token, usize)> {
    let bytes = input.as_bytes();
    let mut i = start + 1;
    let name_start = i;
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    let name = input[name_start..i].to_ascii_lowercase();

    let mut attributes = Vec::new();
    let mut self_closing = false;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }
        match bytes[i] {
            b'>' => {
                i += 1;
                break;
            }
            b'/' => {
                if bytes.get(i + 1) == Some(&b'>') {
                    self_closing = true;
                    i += 2;
                    break;
                }
                i += 1;
            }
            b if is_name_byte(b) => {
                let attr_start = i;
                while i < bytes.len() && is_name_byte(bytes[i]) {
                    i += 1;
                }
                let attr_name = input[attr_start..i].to_ascii_lowercase();
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                let value = if bytes.get(i) == Some(&b'=') {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    Some(scan_attr_value(input, &mut i))
                } else {
                    None
                };
                attributes.push((attr_name, value));
            }
            _ => {
                // Unexpected byte inside a tag: skip it.
                i += 1;
            }
        }
    }

    Some((
        Token::StartTag {
            name,
            attributes,
            self_closing,
        },
        i,
    ))
}

fn scan_attr_value(input: &str, i: &mut usize) -> String {
    let bytes = input.as_bytes();
    match bytes.get(*i) {
        Some(&q @ (b'"' | b'\'')) => {
            *i += 1;
            let start = *i;
            let end = memchr(q, &bytes[*i..]).map_or(bytes.len(), |rel| *i + rel);
            let value = decode_entities(&input[start..end]);
            *i = (end + 1).min(bytes.len());
            value
        }
        _ => {
            let start = *i;
            while *i < bytes.len() && !bytes[*i].is_ascii_whitespace() && bytes[*i] != b'>' {
                *i += 1;
            }
            decode_entities(&input[start..*i])
        }
    }
}

// Scans a rawtext body up to the matching `</name ...>`. Missing close tags
// swallow the rest of the input, matching browser behavior.
fn scan_rawtext(input: &str, start: usize, name: &str, out: &mut Vec<Token>) -> usize {
    let bytes = input.as_bytes();
    let decode = name.eq_ignore_ascii_case("script");
    let mut i = start;

    while i < bytes.len() {
        let Some(rel) = memchr(b'<', &bytes[i..]) else {
            break;
        };
        let lt = i + rel;
        if bytes.get(lt + 1) == Some(&b'/')
            && starts_with_ignore_ascii_case(bytes, lt + 2, name.as_bytes())
        {
            let mut k = lt + 2 + name.len();
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k < bytes.len() && bytes[k] == b'>' {
                emit_rawtext(out, &input[start..lt], decode);
                out.push(Token::EndTag(name.to_string()));
                return k + 1;
            }
        }
        i = lt + 1;
    }

    log::trace!(target: "defer.dom", "unclosed <{name}> swallows rest of input");
    emit_rawtext(out, &input[start..], decode);
    out.push(Token::EndTag(name.to_string()));
    input.len()
}

fn emit_rawtext(out: &mut Vec<Token>, raw: &str, decode: bool) {
    let text = if decode {
        decode_entities(raw)
    } else {
        raw.to_string()
    };
    push_text(out, text);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_tag(token: &Token) -> (&str, &[(String, Option<String>)], bool) {
        match token {
            Token::StartTag {
                name,
                attributes,
                self_closing,
            } => (name, attributes, *self_closing),
            other => panic!("expected start tag, got {other:?}"),
        }
    }

    #[test]
    fn tokenizes_simple_document() {
        let tokens = tokenize("<!DOCTYPE html><html><body>Hi</body></html>");
        assert_eq!(tokens[0], Token::Doctype("html".to_string()));
        assert_eq!(start_tag(&tokens[1]).0, "html");
        assert_eq!(tokens[3], Token::Text("Hi".to_string()));
        assert_eq!(tokens[5], Token::EndTag("html".to_string()));
    }

    #[test]
    fn parses_attributes_in_any_order_and_case() {
        let tokens = tokenize(r#"<SCRIPT Type="text/template" id=tpl></SCRIPT>"#);
        let (name, attrs, _) = start_tag(&tokens[0]);
        assert_eq!(name, "script");
        assert_eq!(attrs[0], ("type".to_string(), Some("text/template".to_string())));
        assert_eq!(attrs[1], ("id".to_string(), Some("tpl".to_string())));
    }

    #[test]
    fn script_body_is_rawtext_until_close_tag() {
        let tokens = tokenize("<script>if (a < b) { go(); }</script>done");
        assert_eq!(tokens[1], Token::Text("if (a < b) { go(); }".to_string()));
        assert_eq!(tokens[2], Token::EndTag("script".to_string()));
        assert_eq!(tokens[3], Token::Text("done".to_string()));
    }

    #[test]
    fn script_body_decodes_character_references() {
        let tokens = tokenize("<script>a <&#92;/div> &#38;lt;</script>");
        assert_eq!(tokens[1], Token::Text("a <\\/div> &lt;".to_string()));
    }

    #[test]
    fn style_body_stays_verbatim() {
        let tokens = tokenize("<style>a>b{color:red}&amp;</style>");
        assert_eq!(tokens[1], Token::Text("a>b{color:red}&amp;".to_string()));
    }

    #[test]
    fn rawtext_close_tag_allows_whitespace_and_any_case() {
        let tokens = tokenize("<script>x()</SCRIPT  >");
        assert_eq!(tokens[1], Token::Text("x()".to_string()));
        assert_eq!(tokens[2], Token::EndTag("script".to_string()));
    }

    #[test]
    fn unclosed_script_swallows_rest() {
        let tokens = tokenize("<script>var a = 1;");
        assert_eq!(tokens[1], Token::Text("var a = 1;".to_string()));
        assert_eq!(tokens[2], Token::EndTag("script".to_string()));
    }

    #[test]
    fn text_entities_are_decoded() {
        let tokens = tokenize("<p>x &amp; y</p>");
        assert_eq!(tokens[1], Token::Text("x & y".to_string()));
    }

    #[test]
    fn comments_are_preserved() {
        let tokens = tokenize("<!-- note -->");
        assert_eq!(tokens[0], Token::Comment(" note ".to_string()));
    }

    #[test]
    fn lone_angle_bracket_degrades_to_text() {
        let tokens = tokenize("1 < 2");
        assert_eq!(tokens[0], Token::Text("1 < 2".to_string()));
    }

    #[test]
    fn self_closing_and_void_tags() {
        let tokens = tokenize("<br><img src=x.png />");
        assert_eq!(start_tag(&tokens[0]).0, "br");
        let (name, attrs, self_closing) = start_tag(&tokens[1]);
        assert_eq!(name, "img");
        assert_eq!(attrs[0].1.as_deref(), Some("x.png"));
        assert!(self_closing);
    }
}
