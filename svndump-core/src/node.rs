//! Node model for dump streams
//!
//! A node is one path-level operation within a revision, optionally
//! carrying properties, a copy-from source and a lazy text reference.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{DumpError, Result};

/// Ordered property mapping.
///
/// Values are raw bytes: payloads are length-prefixed on the wire and may
/// contain arbitrary bytes, not just UTF-8. A `None` value denotes
/// property deletion (a `D` record on the wire).
pub type PropertyMap = BTreeMap<String, Option<Vec<u8>>>;

/// Node action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeAction {
    Add,
    Change,
    Delete,
    Replace,
}

impl NodeAction {
    /// Parse a `Node-action` tag value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(NodeAction::Add),
            "change" => Ok(NodeAction::Change),
            "delete" => Ok(NodeAction::Delete),
            "replace" => Ok(NodeAction::Replace),
            other => Err(DumpError::format(format!("unknown node action '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeAction::Add => "add",
            NodeAction::Change => "change",
            NodeAction::Delete => "delete",
            NodeAction::Replace => "replace",
        }
    }

    /// First letter of the action, used in action filter strings ("ACDR").
    pub fn letter(&self) -> char {
        match self {
            NodeAction::Add => 'A',
            NodeAction::Change => 'C',
            NodeAction::Delete => 'D',
            NodeAction::Replace => 'R',
        }
    }
}

impl std::fmt::Display for NodeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node kind
///
/// Deletes (and adds with copy-from emitted by some converters) carry no
/// kind on the wire, hence `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
    Unknown,
}

impl NodeKind {
    /// Parse a `Node-kind` tag value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(NodeKind::File),
            "dir" => Ok(NodeKind::Dir),
            "" => Ok(NodeKind::Unknown),
            other => Err(DumpError::format(format!("unknown node kind '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Dir => "dir",
            NodeKind::Unknown => "",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the (path, revision) a node's subtree is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyFrom {
    pub path: String,
    pub rev: u64,
}

/// Lazy reference to a node's text: a bounded sub-range of the owning
/// stream plus the advertised content hash. Never eagerly loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRef {
    /// Byte offset of the text within the owning stream.
    pub offset: u64,
    /// Text length in bytes.
    pub length: u64,
    /// Advertised MD5 digest (lowercase hex), if any.
    pub md5: Option<String>,
}

/// One path-level operation within a revision.
#[derive(Debug, Clone)]
pub struct Node {
    /// Repository-relative path, no leading separator.
    pub path: String,
    pub action: NodeAction,
    pub kind: NodeKind,
    pub copy_from: Option<CopyFrom>,
    /// Node properties; `None` means no property block at all, while
    /// `Some` with an empty map is an empty block.
    pub props: Option<PropertyMap>,
    pub text: Option<TextRef>,
}

impl Node {
    pub fn new(path: impl Into<String>, action: NodeAction, kind: NodeKind) -> Self {
        Self {
            path: path.into(),
            action,
            kind,
            copy_from: None,
            props: None,
            text: None,
        }
    }

    /// Composite key identifying a node within its revision.
    pub fn key(&self) -> (char, &str) {
        (self.action.letter(), self.path.as_str())
    }

    pub fn has_copy_from(&self) -> bool {
        self.copy_from.is_some()
    }

    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }

    /// Length of the node text, or 0 if it has none.
    pub fn text_length(&self) -> u64 {
        self.text.as_ref().map(|t| t.length).unwrap_or(0)
    }

    /// Advertised MD5 of the node text, if any.
    pub fn text_md5(&self) -> Option<&str> {
        self.text.as_ref().and_then(|t| t.md5.as_deref())
    }

    /// Set or change a property. `None` records a property deletion.
    pub fn set_property(&mut self, name: impl Into<String>, value: Option<Vec<u8>>) {
        self.props
            .get_or_insert_with(PropertyMap::new)
            .insert(name.into(), value);
    }
}

/// Checks whether a string looks like a lowercase hex MD5 digest.
pub fn is_valid_md5(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
