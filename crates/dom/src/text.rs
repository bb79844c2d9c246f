//! Rendered-text extraction
//!
//! Two phases:
//!
//! ```text
//! tree ──collect_text──▶ raw text with markers ──reduce_whitespace──▶ visible text
//! ```
//!
//! Markers are private-use code points, so they never collide with page text
//! and are not `char::is_whitespace`.

use std::sync::Arc;

use crate::arena::DomArena;
use crate::error::Result;
use crate::style::{ElementClassifier, HtmlClassifier};
use crate::types::NodeId;

/// Line break before/after a block; runs collapse to one line terminator
pub const BLOCK_SEPARATOR: char = '\u{E000}';
/// Hard line break (`<br>`)
pub const NEW_LINE: char = '\u{E001}';
/// Space that survives whitespace collapsing and trimming
pub const BLANK: char = '\u{E002}';
/// Literal tab
pub const TAB: char = '\u{E003}';

const NBSP: char = '\u{A0}';

/// Platform line terminator
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

enum Step {
    Visit(NodeId),
    Marker(char),
    Literal(String),
}

/// Build the intermediate marker text for the children of `node_id`.
///
/// Text and CDATA leaves contribute their raw data when displayed; other
/// nodes contribute their classifier override or their children's text,
/// wrapped in block separators when they are blocks.
pub fn collect_text(arena: &DomArena, node_id: NodeId) -> Result<String> {
    let classifier: Arc<dyn ElementClassifier> = match arena.services_for(node_id)? {
        Some(services) => Arc::clone(&services.classifier),
        None => Arc::new(HtmlClassifier),
    };

    let mut out = String::new();
    let root = arena.get(node_id)?;
    if let Some(data) = root.kind().rendered_text() {
        if arena.is_displayed(node_id)? {
            out.push_str(data);
        }
        return Ok(out);
    }

    let mut stack: Vec<Step> = Vec::new();
    push_children(arena, node_id, &mut stack)?;

    while let Some(step) = stack.pop() {
        let id = match step {
            Step::Marker(marker) => {
                out.push(marker);
                continue;
            }
            Step::Literal(text) => {
                out.push_str(&text);
                continue;
            }
            Step::Visit(id) => id,
        };

        let node = arena.get(id)?;
        if let Some(data) = node.kind().rendered_text() {
            if arena.is_displayed(id)? {
                out.push_str(data);
            }
            continue;
        }

        // Pushed in reverse: closing separator first
        let block = classifier.is_block(arena, id);
        if block {
            stack.push(Step::Marker(BLOCK_SEPARATOR));
        }
        match classifier.text_override(arena, id) {
            Some(text) => stack.push(Step::Literal(text)),
            None => push_children(arena, id, &mut stack)?,
        }
        if block {
            stack.push(Step::Marker(BLOCK_SEPARATOR));
        }
    }

    Ok(out)
}

fn push_children(arena: &DomArena, node_id: NodeId, stack: &mut Vec<Step>) -> Result<()> {
    let mut children: Vec<NodeId> = arena.children(node_id)?.collect();
    children.reverse();
    stack.extend(children.into_iter().map(Step::Visit));
    Ok(())
}

/// Turn marker text into visible text. Pure; no tree access.
///
/// Order:
/// 1. a newline marker right before a block separator is dropped
/// 2. whitespace runs (non-breaking space included) become one space
/// 3. block separator runs, with the spaces around them, become one line
///    terminator; leading and trailing separators disappear
/// 4. newline markers become line terminators, tab markers tabs
/// 5. the result is trimmed, then blank markers become spaces
pub fn reduce_whitespace(text: &str, line_separator: &str) -> String {
    // 1
    let mut pending_new_line = false;
    let mut step1 = String::with_capacity(text.len());
    for ch in text.chars() {
        if pending_new_line {
            pending_new_line = false;
            if ch != BLOCK_SEPARATOR {
                step1.push(NEW_LINE);
            }
        }
        if ch == NEW_LINE {
            pending_new_line = true;
        } else {
            step1.push(ch);
        }
    }
    if pending_new_line {
        step1.push(NEW_LINE);
    }

    // 2
    let mut step2 = String::with_capacity(step1.len());
    let mut in_whitespace = false;
    for ch in step1.chars() {
        if ch.is_whitespace() || ch == NBSP {
            if !in_whitespace {
                step2.push(' ');
                in_whitespace = true;
            }
        } else {
            step2.push(ch);
            in_whitespace = false;
        }
    }

    // 3 + 4
    let mut out = String::with_capacity(step2.len());
    let mut pending_break = false;
    for ch in step2.chars() {
        match ch {
            BLOCK_SEPARATOR => {
                pending_break = true;
                let kept = out.trim_end_matches(' ').len();
                out.truncate(kept);
            }
            ' ' if pending_break => {}
            _ => {
                if pending_break {
                    if !out.is_empty() {
                        out.push_str(line_separator);
                    }
                    pending_break = false;
                }
                match ch {
                    NEW_LINE => out.push_str(line_separator),
                    TAB => out.push('\t'),
                    _ => out.push(ch),
                }
            }
        }
    }

    // 5
    out.trim().replace(BLANK, " ")
}

impl DomArena {
    /// Text of `node_id` as a browser would render it, joined with the
    /// platform line terminator.
    pub fn as_text(&self, node_id: NodeId) -> Result<String> {
        self.as_text_with(node_id, LINE_SEPARATOR)
    }

    pub fn as_text_with(&self, node_id: NodeId, line_separator: &str) -> Result<String> {
        let raw = collect_text(self, node_id)?;
        Ok(reduce_whitespace(&raw, line_separator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::DocumentServices;

    fn marked(parts: &[&str]) -> String {
        parts.concat()
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(reduce_whitespace("  a \t\n b  ", "\n"), "a b");
        assert_eq!(reduce_whitespace("a\u{A0}\u{A0} b", "\n"), "a b");
    }

    #[test]
    fn test_block_separators_collapse_to_one_line() {
        let bs = BLOCK_SEPARATOR.to_string();
        let raw = marked(&[&bs, "Hello ", &bs, &bs, " ", &bs, " World", &bs]);
        assert_eq!(reduce_whitespace(&raw, "\n"), "Hello\nWorld");
    }

    #[test]
    fn test_new_line_before_block_end_is_dropped() {
        let bs = BLOCK_SEPARATOR.to_string();
        let nl = NEW_LINE.to_string();
        let raw = marked(&[&bs, "line", &nl, &bs, &bs, "next", &bs]);
        assert_eq!(reduce_whitespace(&raw, "\n"), "line\nnext");

        let raw = marked(&["a", &nl, "b"]);
        assert_eq!(reduce_whitespace(&raw, "\r\n"), "a\r\nb");
    }

    #[test]
    fn test_blank_survives_trimming() {
        let blank = BLANK.to_string();
        let raw = marked(&["  ", &blank, "x", &blank, "  "]);
        assert_eq!(reduce_whitespace(&raw, "\n"), " x ");
    }

    #[test]
    fn test_tab_marker() {
        let tab = TAB.to_string();
        let raw = marked(&["a", &tab, "b"]);
        assert_eq!(reduce_whitespace(&raw, "\n"), "a\tb");
    }

    #[test]
    fn test_as_text_blocks_and_inlines() {
        let mut arena = DomArena::new();
        let doc = arena.create_document();
        let body = arena.create_element(Some(doc), "body").unwrap();
        arena.append_child(doc, body).unwrap();

        let p = arena.create_element(Some(doc), "p").unwrap();
        let t1 = arena.create_text(Some(doc), "  one   ").unwrap();
        let b = arena.create_element(Some(doc), "b").unwrap();
        let t2 = arena.create_text(Some(doc), "two").unwrap();
        let br = arena.create_element(Some(doc), "br").unwrap();
        arena.append_child(body, p).unwrap();
        arena.append_child(p, t1).unwrap();
        arena.append_child(p, b).unwrap();
        arena.append_child(b, t2).unwrap();
        arena.append_child(p, br).unwrap();

        let div = arena.create_element(Some(doc), "div").unwrap();
        let t3 = arena.create_text(Some(doc), "three").unwrap();
        arena.append_child(body, div).unwrap();
        arena.append_child(div, t3).unwrap();

        assert_eq!(arena.as_text_with(doc, "\n").unwrap(), "one two\nthree");
    }

    #[test]
    fn test_hidden_text_is_skipped() {
        let mut arena = DomArena::new();
        let doc = arena.create_document();
        arena
            .set_document_services(doc, DocumentServices::default())
            .unwrap();
        let div = arena.create_element(Some(doc), "div").unwrap();
        let shown = arena.create_text(Some(doc), "shown").unwrap();
        let span = arena.create_element(Some(doc), "span").unwrap();
        let hidden = arena.create_text(Some(doc), "hidden").unwrap();
        arena.append_child(doc, div).unwrap();
        arena.append_child(div, shown).unwrap();
        arena.append_child(div, span).unwrap();
        arena.append_child(span, hidden).unwrap();
        arena.set_attribute(span, "style", "display: none").unwrap();

        assert_eq!(arena.as_text(doc).unwrap(), "shown");
    }

    #[test]
    fn test_as_text_is_pure() {
        let mut arena = DomArena::new();
        let doc = arena.create_document();
        let div = arena.create_element(Some(doc), "div").unwrap();
        let t = arena.create_text(Some(doc), " a  b ").unwrap();
        arena.append_child(doc, div).unwrap();
        arena.append_child(div, t).unwrap();

        let before = arena.len();
        let first = arena.as_text(doc).unwrap();
        let second = arena.as_text(doc).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "a b");
        assert_eq!(arena.len(), before);
    }

    #[test]
    fn test_as_text_of_text_leaf() {
        let mut arena = DomArena::new();
        let doc = arena.create_document();
        let t = arena.create_text(Some(doc), "  lone\u{A0}leaf ").unwrap();
        assert_eq!(arena.as_text(t).unwrap(), "lone leaf");
    }

    #[test]
    fn test_deep_tree_does_not_overflow() {
        let mut arena = DomArena::new();
        let doc = arena.create_document();
        let mut parent = doc;
        for _ in 0..5_000 {
            let span = arena.create_element(Some(doc), "span").unwrap();
            arena.append_child(parent, span).unwrap();
            parent = span;
        }
        let t = arena.create_text(Some(doc), "deep").unwrap();
        arena.append_child(parent, t).unwrap();

        assert_eq!(arena.as_text(doc).unwrap(), "deep");
    }
}
