//! Token stream to tree. Tolerant stack discipline: unmatched end tags are
//! ignored, unclosed elements are closed at EOF.

use crate::types::{Node, Token, is_void_element};

pub fn build(tokens: Vec<Token>) -> Node {
    let mut doctype = None;
    let mut top: Vec<Node> = Vec::new();
    let mut stack: Vec<Node> = Vec::new();

    fn attach(stack: &mut [Node], top: &mut Vec<Node>, node: Node) {
        match stack.last_mut() {
            Some(Node::Element { children, .. }) => children.push(node),
            _ => top.push(node),
        }
    }

    for token in tokens {
        match token {
            Token::Doctype(value) => {
                if doctype.is_none() {
                    doctype = Some(value);
                }
            }
            Token::Text(text) => attach(&mut stack, &mut top, Node::Text { text }),
            Token::Comment(text) => attach(&mut stack, &mut top, Node::Comment { text }),
            Token::StartTag {
                name,
                attributes,
                self_closing,
            } => {
                let leaf = self_closing || is_void_element(&name);
                let node = Node::Element {
                    name,
                    attributes,
                    children: Vec::new(),
                };
                if leaf {
                    attach(&mut stack, &mut top, node);
                } else {
                    stack.push(node);
                }
            }
            Token::EndTag(name) => {
                let Some(open_at) = stack.iter().rposition(|n| n.is_element_named(&name)) else {
                    log::trace!(target: "defer.dom", "ignoring unmatched </{name}>");
                    continue;
                };
                while stack.len() > open_at {
                    let node = stack.pop().unwrap_or_else(|| unreachable!());
                    attach(&mut stack, &mut top, node);
                }
            }
        }
    }

    while let Some(node) = stack.pop() {
        attach(&mut stack, &mut top, node);
    }

    Node::Document {
        doctype,
        children: top,
    }
}
