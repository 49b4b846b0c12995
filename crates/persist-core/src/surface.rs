//! EditingSurface trait: the narrow view this crate has of the rich-text editor.
//!
//! The editor owns the document model. We only need to read and replace its
//! whole state, hear about edits, and make a few targeted post-load fixes
//! (inline formats on text spans, block-level styles on paragraphs).
//!
//! Implementations:
//! - `JsonSurface` - Lexical-style JSON tree held in memory (tests, headless use)
//! - A bridge to the live editor instance on the browser side

use crate::events::{EventBus, Subscription};
use crate::record::DocumentState;
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Invalid document state: {0}")]
    InvalidState(String),
}

/// Callback receiving the latest state after each edit.
pub type MutationCallback = Box<dyn Fn(DocumentState) + Send + Sync>;

pub trait EditingSurface: Send + Sync {
    /// Snapshot of the current document.
    fn get_state(&self) -> DocumentState;

    /// Replace the whole document. Fails if the state cannot be deserialized.
    fn set_state(&self, state: &DocumentState) -> Result<(), SurfaceError>;

    /// Reset to an empty document.
    fn clear(&self);

    /// Get notified with the latest state after every mutation.
    fn subscribe(&self, callback: MutationCallback) -> Subscription<DocumentState>;

    /// Number of text spans in document order.
    fn text_span_count(&self) -> usize;

    /// Whether text span `span` carries inline format `format`.
    fn span_has_format(&self, span: usize, format: &str) -> bool;

    /// Flip inline format `format` on text span `span`.
    fn toggle_span_format(&self, span: usize, format: &str);

    /// Drop block-level style property `style` from every paragraph.
    ///
    /// Returns the number of paragraphs changed.
    fn reduce_block_style(&self, style: &str) -> usize;
}

/// Inline format bits, as Lexical encodes them in a text node's `format`.
const TEXT_FORMATS: &[(&str, u64)] = &[
    ("bold", 1),
    ("italic", 1 << 1),
    ("strikethrough", 1 << 2),
    ("underline", 1 << 3),
    ("code", 1 << 4),
    ("subscript", 1 << 5),
    ("superscript", 1 << 6),
    ("highlight", 1 << 7),
];

fn format_bit(name: &str) -> Option<u64> {
    TEXT_FORMATS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, bit)| *bit)
}

/// Editing surface over a Lexical-style JSON tree.
///
/// ```text
/// { "root": { "type": "root", "children": [
///     { "type": "paragraph", "style": "margin-bottom: 16px", "children": [
///         { "type": "text", "text": "Hello", "format": 128, "style": "" } ] } ] } }
/// ```
///
/// Every content change (including `set_state` and `clear`) notifies
/// subscribers after the write lock is released.
pub struct JsonSurface {
    doc: RwLock<Value>,
    mutations: Arc<EventBus<DocumentState>>,
}

impl Default for JsonSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonSurface {
    pub fn new() -> Self {
        Self {
            doc: RwLock::new(empty_document()),
            mutations: Arc::new(EventBus::new()),
        }
    }

    /// Apply a user edit to the raw tree and notify subscribers.
    pub fn edit(&self, f: impl FnOnce(&mut Value)) {
        {
            let mut doc = self.doc.write().unwrap_or_else(|e| e.into_inner());
            f(&mut doc);
        }
        self.notify();
    }

    /// User edit: append a paragraph holding a single plain text span.
    pub fn append_paragraph(&self, text: &str) {
        self.edit(|doc| {
            if let Some(children) = doc["root"]["children"].as_array_mut() {
                children.push(json!({
                    "type": "paragraph",
                    "style": "",
                    "children": [{"type": "text", "text": text, "format": 0, "style": ""}]
                }));
            }
        });
    }

    /// Concatenated text of every span, paragraphs separated by newlines.
    pub fn plain_text(&self) -> String {
        let doc = self.doc.read().unwrap_or_else(|e| e.into_inner());
        let Some(blocks) = doc["root"]["children"].as_array() else {
            return String::new();
        };
        blocks
            .iter()
            .map(|block| {
                let mut spans = Vec::new();
                collect_text_nodes(block, &mut spans);
                spans
                    .iter()
                    .filter_map(|span| span["text"].as_str())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn notify(&self) {
        let state = self.get_state();
        self.mutations.emit(state);
    }
}

fn empty_document() -> Value {
    json!({"root": {"type": "root", "children": []}})
}

fn is_node_type(node: &Value, ty: &str) -> bool {
    node.get("type").and_then(Value::as_str) == Some(ty)
}

fn collect_text_nodes<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    if is_node_type(node, "text") {
        out.push(node);
        return;
    }
    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children {
            collect_text_nodes(child, out);
        }
    }
}

fn collect_text_nodes_mut<'a>(node: &'a mut Value, out: &mut Vec<&'a mut Value>) {
    if is_node_type(node, "text") {
        out.push(node);
        return;
    }
    if let Some(children) = node.get_mut("children").and_then(Value::as_array_mut) {
        for child in children {
            collect_text_nodes_mut(child, out);
        }
    }
}

/// Remove `property` from every paragraph's inline CSS. Returns paragraphs changed.
fn strip_paragraph_style(node: &mut Value, property: &str) -> usize {
    let mut changed = 0;

    if is_node_type(node, "paragraph") {
        if let Some(Value::String(style)) = node.get_mut("style") {
            let declarations: Vec<&str> = style
                .split(';')
                .map(str::trim)
                .filter(|decl| !decl.is_empty())
                .collect();
            let kept: Vec<&str> = declarations
                .iter()
                .copied()
                .filter(|decl| {
                    decl.split(':')
                        .next()
                        .is_none_or(|name| name.trim() != property)
                })
                .collect();
            if kept.len() != declarations.len() {
                *style = kept.join("; ");
                changed += 1;
            }
        }
    }

    if let Some(children) = node.get_mut("children").and_then(Value::as_array_mut) {
        for child in children {
            changed += strip_paragraph_style(child, property);
        }
    }
    changed
}

impl EditingSurface for JsonSurface {
    fn get_state(&self) -> DocumentState {
        let doc = self.doc.read().unwrap_or_else(|e| e.into_inner());
        DocumentState::new(doc.clone())
    }

    fn set_state(&self, state: &DocumentState) -> Result<(), SurfaceError> {
        let root = state
            .as_value()
            .get("root")
            .ok_or_else(|| SurfaceError::InvalidState("missing root node".into()))?;
        if !root.get("children").is_some_and(Value::is_array) {
            return Err(SurfaceError::InvalidState(
                "root node has no children array".into(),
            ));
        }

        *self.doc.write().unwrap_or_else(|e| e.into_inner()) = state.as_value().clone();
        self.notify();
        Ok(())
    }

    fn clear(&self) {
        *self.doc.write().unwrap_or_else(|e| e.into_inner()) = empty_document();
        self.notify();
    }

    fn subscribe(&self, callback: MutationCallback) -> Subscription<DocumentState> {
        self.mutations.subscribe(callback)
    }

    fn text_span_count(&self) -> usize {
        let doc = self.doc.read().unwrap_or_else(|e| e.into_inner());
        let mut spans = Vec::new();
        collect_text_nodes(&doc["root"], &mut spans);
        spans.len()
    }

    fn span_has_format(&self, span: usize, format: &str) -> bool {
        let Some(bit) = format_bit(format) else {
            return false;
        };
        let doc = self.doc.read().unwrap_or_else(|e| e.into_inner());
        let mut spans = Vec::new();
        collect_text_nodes(&doc["root"], &mut spans);
        spans
            .get(span)
            .and_then(|node| node["format"].as_u64())
            .is_some_and(|flags| flags & bit != 0)
    }

    fn toggle_span_format(&self, span: usize, format: &str) {
        let Some(bit) = format_bit(format) else {
            return;
        };
        let toggled = {
            let mut doc = self.doc.write().unwrap_or_else(|e| e.into_inner());
            let mut spans = Vec::new();
            collect_text_nodes_mut(&mut doc["root"], &mut spans);
            match spans.get_mut(span) {
                Some(node) => {
                    let flags = node["format"].as_u64().unwrap_or(0);
                    node["format"] = Value::from(flags ^ bit);
                    true
                }
                None => false,
            }
        };
        if toggled {
            self.notify();
        }
    }

    fn reduce_block_style(&self, style: &str) -> usize {
        let changed = {
            let mut doc = self.doc.write().unwrap_or_else(|e| e.into_inner());
            strip_paragraph_style(&mut doc["root"], style)
        };
        if changed > 0 {
            self.notify();
        }
        changed
    }
}

/// Build a one-paragraph-per-entry document. Handy for tests and defaults.
pub fn document_from_paragraphs<'a>(paragraphs: impl IntoIterator<Item = &'a str>) -> DocumentState {
    let children: Vec<Value> = paragraphs
        .into_iter()
        .map(|text| {
            json!({
                "type": "paragraph",
                "style": "",
                "children": [{"type": "text", "text": text, "format": 0, "style": ""}]
            })
        })
        .collect();
    DocumentState::new(json!({"root": {"type": "root", "children": children}}))
}
