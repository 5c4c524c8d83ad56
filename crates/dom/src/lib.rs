//! Minimal tree API for the rewriter: parse, query by `tag#id`, create
//! nodes, detach, serialize. Deliberately tolerant rather than
//! HTML5-conformant; the patch pipeline upstream is responsible for hiding
//! content this parser must never see.

mod builder;
mod entities;
mod query;
mod serialize;
mod tokenizer;
mod types;

pub use crate::query::{count_by_id, detach_by_id, ensure_head_mut, find_by_id};
pub use crate::serialize::serialize;
pub use crate::tokenizer::tokenize;
pub use crate::types::{Node, Token};

/// Build a document tree from HTML text.
pub fn parse(html: &str) -> Node {
    builder::build(tokenizer::tokenize(html))
}
