//! Id-based lookup, detach and insertion, the only selector shapes the
//! rewriter needs (`tag#id` and `<head>` access).

use crate::types::Node;

fn matches(node: &Node, tag: &str, id: &str) -> bool {
    node.is_element_named(tag) && node.attr("id") == Some(id)
}

pub fn find_by_id<'a>(node: &'a Node, tag: &str, id: &str) -> Option<&'a Node> {
    if matches(node, tag, id) {
        return Some(node);
    }
    for c in node.children()? {
        if let Some(found) = find_by_id(c, tag, id) {
            return Some(found);
        }
    }
    None
}

pub fn count_by_id(node: &Node, tag: &str, id: &str) -> usize {
    let mut n = usize::from(matches(node, tag, id));
    if let Some(children) = node.children() {
        for c in children {
            n += count_by_id(c, tag, id);
        }
    }
    n
}

/// Detach every `tag#id` element in the tree. Returns how many were removed.
pub fn detach_by_id(node: &mut Node, tag: &str, id: &str) -> usize {
    let mut removed = 0;
    if let Some(children) = node.children_mut() {
        children.retain(|c| {
            let hit = matches(c, tag, id);
            removed += usize::from(hit);
            !hit
        });
        for c in children.iter_mut() {
            removed += detach_by_id(c, tag, id);
        }
    }
    removed
}

fn find_element_mut<'a>(node: &'a mut Node, name: &str) -> Option<&'a mut Node> {
    if node.is_element_named(name) {
        return Some(node);
    }
    for c in node.children_mut()? {
        if let Some(found) = find_element_mut(c, name) {
            return Some(found);
        }
    }
    None
}

/// The `<head>` element, synthesizing one (inside `<html>` when present)
/// for head-less fragments so injection always has a target.
pub fn ensure_head_mut(doc: &mut Node) -> &mut Node {
    if find_element_mut(doc, "head").is_none() {
        let head = Node::element("head", Vec::new());
        match find_element_mut(doc, "html").and_then(Node::children_mut) {
            Some(children) => children.insert(0, head),
            None => match doc.children_mut() {
                Some(children) => children.insert(0, head),
                None => unreachable!("documents always have children"),
            },
        }
    }
    match find_element_mut(doc, "head") {
        Some(head) => head,
        None => unreachable!("head was just inserted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse, serialize};

    #[test]
    fn finds_and_counts_by_id() {
        let doc = parse(r#"<head><script id="defer-js">x</script></head>"#);
        assert!(find_by_id(&doc, "script", "defer-js").is_some());
        assert!(find_by_id(&doc, "style", "defer-js").is_none());
        assert_eq!(count_by_id(&doc, "script", "defer-js"), 1);
    }

    #[test]
    fn detach_removes_every_match() {
        let mut doc = parse(concat!(
            r#"<head><script id="defer-js">a</script></head>"#,
            r#"<body><script id="defer-js">b</script><script id="other">c</script></body>"#,
        ));
        assert_eq!(detach_by_id(&mut doc, "script", "defer-js"), 2);
        assert_eq!(count_by_id(&doc, "script", "defer-js"), 0);
        assert_eq!(count_by_id(&doc, "script", "other"), 1);
    }

    #[test]
    fn detach_on_absent_id_is_a_no_op() {
        let mut doc = parse("<body><p>x</p></body>");
        assert_eq!(detach_by_id(&mut doc, "script", "defer-js"), 0);
        assert_eq!(serialize(&doc), "<body><p>x</p></body>");
    }

    #[test]
    fn ensure_head_finds_existing() {
        let mut doc = parse("<html><head><title>t</title></head></html>");
        let head = ensure_head_mut(&mut doc);
        assert!(head.children().is_some_and(|c| c[0].is_element_named("title")));
    }

    #[test]
    fn ensure_head_synthesizes_into_html() {
        let mut doc = parse("<html><body></body></html>");
        ensure_head_mut(&mut doc);
        assert_eq!(
            serialize(&doc),
            "<html><head></head><body></body></html>"
        );
    }

    #[test]
    fn ensure_head_synthesizes_at_document_top_without_html() {
        let mut doc = parse("<p>fragment</p>");
        ensure_head_mut(&mut doc);
        assert_eq!(serialize(&doc), "<head></head><p>fragment</p>");
    }
}
