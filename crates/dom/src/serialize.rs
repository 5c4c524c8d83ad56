//! Tree to HTML text. Rawtext (`<script>`/`<style>`) children are emitted
//! verbatim; ordinary text re-encodes `&`, `<`, `>`, except where `&` begins
//! a reference the parser left undecoded (those spans come back out as
//! written, so e.g. `&copy;` is not mangled into `&amp;copy;`).

use crate::entities::undecoded_ref_len;
use crate::types::{Node, is_rawtext_element, is_void_element};
use memchr::{memchr2, memchr3};

pub fn serialize(node: &Node) -> String {
    let mut out = String::new();
    write_node(node, false, &mut out);
    out
}

fn write_node(node: &Node, rawtext: bool, out: &mut String) {
    match node {
        Node::Document { doctype, children } => {
            if let Some(dt) = doctype {
                out.push_str("<!DOCTYPE ");
                out.push_str(dt);
                out.push('>');
            }
            for c in children {
                write_node(c, false, out);
            }
        }
        Node::Element {
            name,
            attributes,
            children,
        } => {
            out.push('<');
            out.push_str(name);
            for (key, value) in attributes {
                out.push(' ');
                out.push_str(key);
                if let Some(value) = value {
                    out.push_str("=\"");
                    encode_attr(value, out);
                    out.push('"');
                }
            }
            out.push('>');
            if is_void_element(name) && children.is_empty() {
                return;
            }
            let raw = is_rawtext_element(name);
            for c in children {
                write_node(c, raw, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        Node::Text { text } => {
            if rawtext {
                out.push_str(text);
            } else {
                encode_text(text, out);
            }
        }
        Node::Comment { text } => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

fn encode_text(s: &str, out: &mut String) {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let Some(rel) = memchr3(b'&', b'<', b'>', &bytes[i..]) else {
            out.push_str(&s[i..]);
            return;
        };
        let at = i + rel;
        out.push_str(&s[i..at]);
        match bytes[at] {
            b'&' => {
                if let Some(len) = undecoded_ref_len(s, at) {
                    out.push_str(&s[at..at + len]);
                    i = at + len;
                    continue;
                }
                out.push_str("&amp;");
            }
            b'<' => out.push_str("&lt;"),
            _ => out.push_str("&gt;"),
        }
        i = at + 1;
    }
}

fn encode_attr(s: &str, out: &mut String) {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let Some(rel) = memchr2(b'&', b'"', &bytes[i..]) else {
            out.push_str(&s[i..]);
            return;
        };
        let at = i + rel;
        out.push_str(&s[i..at]);
        if bytes[at] == b'&' {
            if let Some(len) = undecoded_ref_len(s, at) {
                out.push_str(&s[at..at + len]);
                i = at + len;
                continue;
            }
            out.push_str("&amp;");
        } else {
            out.push_str("&quot;");
        }
        i = at + 1;
    }
}
