//! Node history tracking and structural validation
//!
//! [`NodeHistory`] consumes the (revision, node) events of one pass over a
//! dump stream and reconstructs, per path, which revisions the path
//! existed in and as what kind. On top of that it can validate tree
//! operations (does the target exist, is the parent a directory, does the
//! copy source exist) and verify advertised text digests.
//!
//! Violations are never errors: they are accumulated per revision as
//! [`Finding`]s so a full scan yields both a complete history and a
//! complete report. History bookkeeping still runs for flagged nodes,
//! keeping later lookups internally consistent.

use std::collections::BTreeMap;
use std::io::{BufRead, Read, Seek};

use md5::{Digest, Md5};
use serde::Serialize;
use tracing::trace;

use crate::codec::CHUNK_SIZE;
use crate::date::RevDate;
use crate::error::Result;
use crate::node::{Node, NodeAction, NodeKind};
use crate::session::DumpReader;

/// A half-open revision range `[start, end)` during which a path existed.
///
/// `end` is `None` while the interval is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start: u64,
    pub end: Option<u64>,
}

impl Interval {
    fn contains(&self, rev: u64) -> bool {
        self.start <= rev && self.end.map_or(true, |end| rev < end)
    }

    fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Existence history of one path: a fixed kind plus ordered intervals.
///
/// The kind is assigned at first creation and never changes; a replace
/// models as delete plus add, so a path cannot change kind mid-life.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub kind: NodeKind,
    pub intervals: Vec<Interval>,
}

impl HistoryRecord {
    fn live_at(&self, rev: u64) -> bool {
        // most recent interval first
        self.intervals.iter().rev().any(|i| i.contains(rev))
    }
}

/// One structural validation finding. Data, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// Add target already exists at the current revision.
    NodeExists { path: String, action: NodeAction },
    /// Parent segment of an added path does not exist.
    NoParent {
        path: String,
        action: NodeAction,
        parent: String,
    },
    /// Parent segment of an added path is not a directory.
    ParentNotDir {
        path: String,
        action: NodeAction,
        parent: String,
    },
    /// Declared copy-from source did not exist at the source revision.
    NoCopySource {
        path: String,
        action: NodeAction,
        from_path: String,
        from_rev: u64,
    },
    /// Delete/change/replace target does not currently exist.
    NodeGone { path: String, action: NodeAction },
    /// Advertised content hash disagrees with the computed hash.
    DigestMismatch {
        path: String,
        advertised: String,
        computed: String,
    },
    /// Revision date precedes the previous revision's date.
    DateOlder { date: String, previous: String },
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Finding::NodeExists { path, action } => {
                write!(f, "{} '{}': node already exists", action, path)
            }
            Finding::NoParent {
                path,
                action,
                parent,
            } => write!(f, "{} '{}': parent '{}' does not exist", action, path, parent),
            Finding::ParentNotDir {
                path,
                action,
                parent,
            } => write!(f, "{} '{}': parent '{}' is not a directory", action, path, parent),
            Finding::NoCopySource {
                path,
                action,
                from_path,
                from_rev,
            } => write!(
                f,
                "{} '{}': copy source '{}'@{} does not exist",
                action, path, from_path, from_rev
            ),
            Finding::NodeGone { path, action } => {
                write!(f, "{} '{}': node does not exist", action, path)
            }
            Finding::DigestMismatch {
                path,
                advertised,
                computed,
            } => write!(
                f,
                "'{}': advertised MD5 {} but computed {}",
                path, advertised, computed
            ),
            Finding::DateOlder { date, previous } => {
                write!(f, "revision date '{}' older than previous '{}'", date, previous)
            }
        }
    }
}

/// Revision-aware tracker of per-path existence intervals.
///
/// Scoped to one pass over one stream; create a fresh instance (or call
/// [`clear`](Self::clear)) per scan. History tracking is on by default,
/// all checks are opt-in.
pub struct NodeHistory {
    records: BTreeMap<String, HistoryRecord>,
    errors: BTreeMap<u64, Vec<Finding>>,
    track_history: bool,
    check_actions: bool,
    check_dates: bool,
    check_md5: bool,
    prev_date: RevDate,
}

impl NodeHistory {
    pub fn new() -> Self {
        let mut tracker = Self {
            records: BTreeMap::new(),
            errors: BTreeMap::new(),
            track_history: true,
            check_actions: false,
            check_dates: false,
            check_md5: false,
            prev_date: RevDate::default(),
        };
        tracker.seed_root();
        tracker
    }

    /// Reset records and findings for a new scan; configuration is kept.
    pub fn clear(&mut self) {
        self.records.clear();
        self.errors.clear();
        self.prev_date = RevDate::default();
        self.seed_root();
    }

    // the root always exists and is a directory
    fn seed_root(&mut self) {
        self.records.insert(
            String::new(),
            HistoryRecord {
                kind: NodeKind::Dir,
                intervals: vec![Interval {
                    start: 0,
                    end: None,
                }],
            },
        );
    }

    /// Enable or disable history bookkeeping. When disabled, all record
    /// operations are no-ops.
    pub fn set_track_history(&mut self, enable: bool) {
        self.track_history = enable;
    }

    /// Enable structural validation of node actions. Checking actions
    /// requires history, so enabling this also enables tracking.
    pub fn set_check_actions(&mut self, check: bool) {
        self.check_actions = check;
        if check {
            self.track_history = true;
        }
    }

    /// Enable the revision date ordering check.
    pub fn set_check_dates(&mut self, check: bool) {
        self.check_dates = check;
    }

    /// Enable streaming verification of advertised text digests.
    pub fn set_check_md5(&mut self, check: bool) {
        self.check_md5 = check;
    }

    /// Kind of the path if it existed during `rev`, else `None`.
    pub fn kind_at(&self, path: &str, rev: u64) -> Option<NodeKind> {
        let record = self.records.get(path)?;
        if record.live_at(rev) {
            Some(record.kind)
        } else {
            None
        }
    }

    /// All tracked history records, by path.
    pub fn records(&self) -> &BTreeMap<String, HistoryRecord> {
        &self.records
    }

    /// Findings accumulated for one revision.
    pub fn errors(&self, rev: u64) -> Option<&[Finding]> {
        self.errors.get(&rev).map(|v| v.as_slice())
    }

    /// All findings, by revision.
    pub fn all_errors(&self) -> &BTreeMap<u64, Vec<Finding>> {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors.values().any(|v| !v.is_empty())
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().map(|v| v.len()).sum()
    }

    fn add_finding(&mut self, rev: u64, finding: Finding) {
        trace!(rev, finding = %finding, "validation finding");
        self.errors.entry(rev).or_default().push(finding);
    }

    /// Open an existence interval for an added node, propagating
    /// recursively through a directory's copy-from source.
    pub fn record_add(&mut self, rev: u64, node: &Node) {
        if !self.track_history {
            return;
        }
        let kind = match node.kind {
            NodeKind::File => NodeKind::File,
            _ => NodeKind::Dir,
        };
        let record = self
            .records
            .entry(node.path.clone())
            .or_insert_with(|| HistoryRecord {
                kind,
                intervals: Vec::new(),
            });
        record.intervals.push(Interval {
            start: rev,
            end: None,
        });
        let kind = record.kind;

        // recursive copy applies only to copied directories
        let copy_from = match (&node.copy_from, kind) {
            (Some(cf), NodeKind::Dir) => cf.clone(),
            _ => return,
        };
        let src_prefix = format!("{}/", copy_from.path);
        let dst_prefix = format!("{}/", node.path);
        // snapshot the candidate set: propagation must not see the
        // paths it creates itself
        let candidates: Vec<String> = self
            .records
            .keys()
            .filter(|p| p.starts_with(&src_prefix))
            .cloned()
            .collect();
        for src_path in candidates {
            let src_kind = match self.records.get(&src_path) {
                Some(rec) if rec.live_at(copy_from.rev) => rec.kind,
                _ => continue,
            };
            let dst_path = format!("{}{}", dst_prefix, &src_path[src_prefix.len()..]);
            let record = self
                .records
                .entry(dst_path)
                .or_insert_with(|| HistoryRecord {
                    kind: src_kind,
                    intervals: Vec::new(),
                });
            record.intervals.push(Interval {
                start: rev,
                end: None,
            });
        }
    }

    /// Close the open interval for a deleted node at `rev`, recursively
    /// closing everything nested under a deleted directory.
    pub fn record_delete(&mut self, rev: u64, node: &Node) {
        if !self.track_history {
            return;
        }
        let kind = match self.records.get_mut(&node.path) {
            Some(record) => {
                if let Some(last) = record.intervals.last_mut() {
                    if last.is_open() {
                        last.end = Some(rev);
                    }
                }
                record.kind
            }
            None => return,
        };
        if kind == NodeKind::File {
            return;
        }
        let prefix = format!("{}/", node.path);
        for (path, record) in self.records.iter_mut() {
            if !path.starts_with(&prefix) {
                continue;
            }
            if let Some(last) = record.intervals.last_mut() {
                if last.is_open() {
                    last.end = Some(rev);
                }
            }
        }
    }

    /// A replace carrying a copy-from is a delete plus an add at the same
    /// revision. Without copy-from it is a content-only change and does
    /// not alter history.
    pub fn record_replace(&mut self, rev: u64, node: &Node) {
        if node.has_copy_from() {
            self.record_delete(rev, node);
            self.record_add(rev, node);
        }
    }

    /// Validate and record one node of the revision `rev`.
    pub fn track_node(&mut self, rev: u64, node: &Node) {
        if !self.track_history {
            return;
        }
        let existing = self.kind_at(&node.path, rev);
        match node.action {
            NodeAction::Add => {
                if self.check_actions {
                    if existing.is_some() {
                        self.add_finding(
                            rev,
                            Finding::NodeExists {
                                path: node.path.clone(),
                                action: node.action,
                            },
                        );
                    } else {
                        if let Some(slash) = node.path.rfind('/') {
                            let parent = &node.path[..slash];
                            match self.kind_at(parent, rev) {
                                None => self.add_finding(
                                    rev,
                                    Finding::NoParent {
                                        path: node.path.clone(),
                                        action: node.action,
                                        parent: parent.to_string(),
                                    },
                                ),
                                Some(kind) if kind != NodeKind::Dir => self.add_finding(
                                    rev,
                                    Finding::ParentNotDir {
                                        path: node.path.clone(),
                                        action: node.action,
                                        parent: parent.to_string(),
                                    },
                                ),
                                Some(_) => {}
                            }
                        }
                        if let Some(cf) = &node.copy_from {
                            if self.kind_at(&cf.path, cf.rev).is_none() {
                                let finding = Finding::NoCopySource {
                                    path: node.path.clone(),
                                    action: node.action,
                                    from_path: cf.path.clone(),
                                    from_rev: cf.rev,
                                };
                                self.add_finding(rev, finding);
                            }
                        }
                    }
                }
                self.record_add(rev, node);
            }
            NodeAction::Delete => {
                if self.check_actions && existing.is_none() {
                    self.add_finding(
                        rev,
                        Finding::NodeGone {
                            path: node.path.clone(),
                            action: node.action,
                        },
                    );
                }
                self.record_delete(rev, node);
            }
            NodeAction::Change => {
                if self.check_actions && existing.is_none() {
                    self.add_finding(
                        rev,
                        Finding::NodeGone {
                            path: node.path.clone(),
                            action: node.action,
                        },
                    );
                }
            }
            NodeAction::Replace => {
                if self.check_actions && existing.is_none() {
                    self.add_finding(
                        rev,
                        Finding::NodeGone {
                            path: node.path.clone(),
                            action: node.action,
                        },
                    );
                }
                self.record_replace(rev, node);
            }
        }
    }

    /// Verify a node's advertised digest against bytes streamed from
    /// `text`. Non-fatal: a disagreement is recorded as a finding.
    pub fn check_text_md5(&mut self, rev: u64, node: &Node, text: &mut dyn Read) -> Result<()> {
        if !self.check_md5 {
            return Ok(());
        }
        let advertised = match node.text_md5() {
            Some(md5) => md5.to_string(),
            None => return Ok(()),
        };
        let mut hasher = Md5::new();
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = text.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let computed = hex::encode(hasher.finalize());
        if advertised != computed {
            self.add_finding(
                rev,
                Finding::DigestMismatch {
                    path: node.path.clone(),
                    advertised,
                    computed,
                },
            );
        }
        Ok(())
    }

    fn check_rev_date(&mut self, rev: u64, date: RevDate, raw: &str) {
        if self.check_dates {
            if date < self.prev_date {
                self.add_finding(
                    rev,
                    Finding::DateOlder {
                        date: raw.to_string(),
                        previous: self.prev_date.to_svn_string(),
                    },
                );
            }
            self.prev_date = date;
        }
    }

    /// Apply all enabled checks and bookkeeping to the current revision
    /// of a read session.
    pub fn scan_revision<R: BufRead + Seek>(&mut self, dump: &mut DumpReader<R>) -> Result<()> {
        let rev = dump.rev_nr();
        let raw_date = dump.rev_date_str().to_string();
        self.check_rev_date(rev, dump.rev_date(), &raw_date);
        let nodes: Vec<Node> = dump.nodes().cloned().collect();
        for node in &nodes {
            if self.check_md5 && node.has_text() {
                let mut text = dump.text_reader(node)?;
                self.check_text_md5(rev, node, &mut text)?;
            }
            self.track_node(rev, node);
        }
        Ok(())
    }
}

impl Default for NodeHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::CopyFrom;

    fn add(path: &str, kind: NodeKind) -> Node {
        Node::new(path, NodeAction::Add, kind)
    }

    fn add_copy(path: &str, kind: NodeKind, from: &str, rev: u64) -> Node {
        let mut node = Node::new(path, NodeAction::Add, kind);
        node.copy_from = Some(CopyFrom {
            path: from.to_string(),
            rev,
        });
        node
    }

    fn delete(path: &str) -> Node {
        Node::new(path, NodeAction::Delete, NodeKind::Unknown)
    }

    #[test]
    fn root_is_always_a_directory() {
        let hist = NodeHistory::new();
        assert_eq!(hist.kind_at("", 0), Some(NodeKind::Dir));
        assert_eq!(hist.kind_at("", 1_000_000), Some(NodeKind::Dir));
    }

    #[test]
    fn add_then_delete_containment() {
        let mut hist = NodeHistory::new();
        hist.track_node(2, &add("trunk", NodeKind::Dir));
        hist.track_node(2, &add("trunk/foo", NodeKind::File));
        hist.track_node(5, &delete("trunk/foo"));

        assert_eq!(hist.kind_at("trunk/foo", 1), None);
        for rev in 2..5 {
            assert_eq!(hist.kind_at("trunk/foo", rev), Some(NodeKind::File));
        }
        assert_eq!(hist.kind_at("trunk/foo", 5), None);
        assert_eq!(hist.kind_at("trunk/foo", 6), None);
        assert_eq!(hist.kind_at("trunk", 5), Some(NodeKind::Dir));
    }

    #[test]
    fn recursive_copy_propagates_descendants() {
        let mut hist = NodeHistory::new();
        hist.track_node(1, &add("a", NodeKind::Dir));
        hist.track_node(1, &add("a/x", NodeKind::File));
        hist.track_node(1, &add("a/sub", NodeKind::Dir));
        hist.track_node(1, &add("a/sub/y", NodeKind::File));
        hist.track_node(3, &add_copy("b", NodeKind::Dir, "a", 2));

        assert_eq!(hist.kind_at("b", 3), Some(NodeKind::Dir));
        assert_eq!(hist.kind_at("b/x", 3), Some(NodeKind::File));
        assert_eq!(hist.kind_at("b/sub", 3), Some(NodeKind::Dir));
        assert_eq!(hist.kind_at("b/sub/y", 3), Some(NodeKind::File));
        assert_eq!(hist.kind_at("b/x", 2), None);
    }

    #[test]
    fn copy_skips_paths_dead_at_source_revision() {
        let mut hist = NodeHistory::new();
        hist.track_node(1, &add("a", NodeKind::Dir));
        hist.track_node(1, &add("a/x", NodeKind::File));
        hist.track_node(2, &delete("a/x"));
        hist.track_node(4, &add_copy("b", NodeKind::Dir, "a", 3));

        assert_eq!(hist.kind_at("b", 4), Some(NodeKind::Dir));
        assert_eq!(hist.kind_at("b/x", 4), None);
    }

    #[test]
    fn directory_delete_closes_nested_intervals() {
        let mut hist = NodeHistory::new();
        hist.track_node(1, &add("a", NodeKind::Dir));
        hist.track_node(1, &add("a/x", NodeKind::File));
        hist.track_node(4, &delete("a"));

        assert_eq!(hist.kind_at("a", 3), Some(NodeKind::Dir));
        assert_eq!(hist.kind_at("a/x", 3), Some(NodeKind::File));
        assert_eq!(hist.kind_at("a", 4), None);
        assert_eq!(hist.kind_at("a/x", 4), None);
    }

    #[test]
    fn replace_with_copy_from_reopens_at_same_revision() {
        let mut hist = NodeHistory::new();
        hist.set_check_actions(true);
        hist.track_node(1, &add("a", NodeKind::File));
        hist.track_node(2, &add("c", NodeKind::File));
        let mut replace = Node::new("a", NodeAction::Replace, NodeKind::File);
        replace.copy_from = Some(CopyFrom {
            path: "c".to_string(),
            rev: 2,
        });
        hist.track_node(3, &replace);

        assert!(!hist.has_errors());
        assert_eq!(hist.kind_at("a", 2), Some(NodeKind::File));
        assert_eq!(hist.kind_at("a", 3), Some(NodeKind::File));
        assert_eq!(hist.kind_at("a", 4), Some(NodeKind::File));
    }

    #[test]
    fn legal_stream_accumulates_no_findings() {
        let mut hist = NodeHistory::new();
        hist.set_check_actions(true);
        hist.track_node(1, &add("trunk", NodeKind::Dir));
        hist.track_node(2, &add("trunk/f", NodeKind::File));
        hist.track_node(3, &delete("trunk/f"));
        hist.track_node(4, &add_copy("branch", NodeKind::Dir, "trunk", 2));
        assert!(!hist.has_errors());
        assert_eq!(hist.error_count(), 0);
    }

    #[test]
    fn add_over_existing_node_is_flagged_but_recorded() {
        let mut hist = NodeHistory::new();
        hist.set_check_actions(true);
        hist.track_node(1, &add("a", NodeKind::File));
        hist.track_node(2, &add("a", NodeKind::File));

        let errors = hist.errors(2).unwrap();
        assert!(matches!(errors[0], Finding::NodeExists { .. }));
        // history still updated
        assert_eq!(hist.kind_at("a", 2), Some(NodeKind::File));
    }

    #[test]
    fn missing_parent_is_flagged() {
        let mut hist = NodeHistory::new();
        hist.set_check_actions(true);
        hist.track_node(1, &add("missing/child", NodeKind::File));
        assert!(matches!(
            hist.errors(1).unwrap()[0],
            Finding::NoParent { .. }
        ));
    }

    #[test]
    fn file_parent_is_flagged() {
        let mut hist = NodeHistory::new();
        hist.set_check_actions(true);
        hist.track_node(1, &add("f", NodeKind::File));
        hist.track_node(2, &add("f/x", NodeKind::File));
        assert!(matches!(
            hist.errors(2).unwrap()[0],
            Finding::ParentNotDir { .. }
        ));
    }

    #[test]
    fn missing_copy_source_is_flagged() {
        let mut hist = NodeHistory::new();
        hist.set_check_actions(true);
        hist.track_node(1, &add_copy("b", NodeKind::Dir, "nowhere", 1));
        assert!(matches!(
            hist.errors(1).unwrap()[0],
            Finding::NoCopySource { .. }
        ));
    }

    #[test]
    fn delete_of_absent_node_is_flagged() {
        let mut hist = NodeHistory::new();
        hist.set_check_actions(true);
        hist.track_node(1, &delete("ghost"));
        assert!(matches!(
            hist.errors(1).unwrap()[0],
            Finding::NodeGone { .. }
        ));
    }

    #[test]
    fn tracking_disabled_means_no_ops() {
        let mut hist = NodeHistory::new();
        hist.set_track_history(false);
        hist.track_node(1, &add("a", NodeKind::File));
        assert_eq!(hist.kind_at("a", 1), None);
    }

    #[test]
    fn md5_mismatch_is_a_finding() {
        let mut hist = NodeHistory::new();
        hist.set_check_md5(true);
        let body = b"some file body\n";
        let mut node = Node::new("a", NodeAction::Add, NodeKind::File);
        node.text = Some(crate::node::TextRef {
            offset: 0,
            length: body.len() as u64,
            md5: Some("00000000000000000000000000000000".to_string()),
        });
        hist.check_text_md5(1, &node, &mut &body[..]).unwrap();
        assert!(matches!(
            hist.errors(1).unwrap()[0],
            Finding::DigestMismatch { .. }
        ));

        hist.clear();
        let computed = hex::encode(Md5::digest(body));
        node.text.as_mut().unwrap().md5 = Some(computed);
        hist.check_text_md5(1, &node, &mut &body[..]).unwrap();
        assert!(!hist.has_errors());
    }

    #[test]
    fn clear_resets_records_and_findings() {
        let mut hist = NodeHistory::new();
        hist.set_check_actions(true);
        hist.track_node(1, &delete("ghost"));
        hist.track_node(1, &add("a", NodeKind::File));
        assert!(hist.has_errors());

        hist.clear();
        assert!(!hist.has_errors());
        assert_eq!(hist.kind_at("a", 1), None);
        assert_eq!(hist.kind_at("", 0), Some(NodeKind::Dir));
    }
}
