//! Static snapshots of captured content cards.
//!
//! A card arrives as a parsed element tree in which every node carries the
//! computed presentation properties it had at the moment of capture. The
//! snapshot walks that tree in document order and writes each node's computed
//! properties into the serialized clone's inline style, so the resulting
//! markup renders the same without the original stylesheet context. The input
//! tree is never mutated.
//!
//! Skipped computed entries: vendor-prefixed properties (leading `-`) and the
//! non-property entries `length` and `parentRule`. The `float` property is
//! kept in its own slot and serialized after the general property list.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

#[derive(Debug, Error)]
#[error("snapshot serialization failed: {0}")]
pub struct SnapshotError(String);

/// One element of a captured card, with the computed style of the original
/// node it was read from.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementNode {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub computed: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Text(String),
    Element(ElementNode),
}

/// First element in document order whose `data-part` attribute equals `part`.
pub fn find_part<'a>(root: &'a ElementNode, part: &str) -> Option<&'a ElementNode> {
    if root.attrs.get("data-part").map(String::as_str) == Some(part) {
        return Some(root);
    }
    for child in &root.children {
        if let Node::Element(e) = child {
            if let Some(found) = find_part(e, part) {
                return Some(found);
            }
        }
    }
    None
}

/// Concatenated text content, document order, single-space separated.
pub fn flat_text(root: &ElementNode) -> String {
    let mut parts = Vec::new();
    collect_text(root, &mut parts);
    parts.join(" ")
}

fn collect_text(node: &ElementNode, out: &mut Vec<String>) {
    for child in &node.children {
        match child {
            Node::Text(t) => {
                let trimmed = t.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            }
            Node::Element(e) => collect_text(e, out),
        }
    }
}

/// Serialize the node's children as-is (the card body markup).
pub fn inner_markup(node: &ElementNode) -> Result<String, SnapshotError> {
    let mut writer = Writer::new(Vec::new());
    for child in &node.children {
        write_node(&mut writer, child, false)?;
    }
    finish(writer)
}

/// Serialize the full node with computed styles inlined: the self-contained
/// static snapshot.
pub fn styled_markup(root: &ElementNode) -> Result<String, SnapshotError> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, root, true)?;
    finish(writer)
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String, SnapshotError> {
    String::from_utf8(writer.into_inner()).map_err(|e| SnapshotError(e.to_string()))
}

fn write_node(
    writer: &mut Writer<Vec<u8>>,
    node: &Node,
    styled: bool,
) -> Result<(), SnapshotError> {
    match node {
        Node::Text(t) => writer
            .write_event(Event::Text(BytesText::new(t)))
            .map_err(|e| SnapshotError(e.to_string())),
        Node::Element(e) => write_element(writer, e, styled),
    }
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    node: &ElementNode,
    styled: bool,
) -> Result<(), SnapshotError> {
    let mut start = BytesStart::new(node.tag.as_str());
    for (key, value) in &node.attrs {
        // The inlined computed style supersedes any authored style attribute
        if styled && key == "style" {
            continue;
        }
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if styled {
        if let Some(style) = inline_style(node) {
            start.push_attribute(("style", style.as_str()));
        }
    }

    if node.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| SnapshotError(e.to_string()));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| SnapshotError(e.to_string()))?;
    for child in &node.children {
        write_node(writer, child, styled)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(node.tag.as_str())))
        .map_err(|e| SnapshotError(e.to_string()))
}

/// Inline style for one node: every usable computed property, `float` last in
/// its dedicated slot.
fn inline_style(node: &ElementNode) -> Option<String> {
    let mut decls: Vec<String> = Vec::new();
    let mut float_value: Option<&str> = None;

    for (prop, value) in &node.computed {
        if prop == "float" {
            float_value = Some(value);
            continue;
        }
        if prop.starts_with('-') || prop == "length" || prop == "parentRule" {
            continue;
        }
        decls.push(format!("{}: {}", prop, value));
    }

    if let Some(v) = float_value {
        decls.push(format!("float: {}", v));
    }

    if decls.is_empty() {
        None
    } else {
        Some(decls.join("; "))
    }
}
