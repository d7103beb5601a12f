//! Structural and content comparison of two dump streams
//!
//! [`DumpDiff`] walks two read sessions revision by revision in lockstep
//! and reports every difference through a caller-supplied [`DiffHandler`].
//! Node texts are compared as bounded streams, never buffered whole, and
//! both sides are hashed on the fly so advertised digests can be verified
//! in the same pass.
//!
//! Text comparison optionally tolerates line-ending differences: with EOL
//! checking enabled, streams that differ only in `\r\n` / `\r` versus
//! `\n` are classified as [`TextCmp::EolOnly`] instead of
//! [`TextCmp::Differs`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{BufRead, Read, Seek};

use md5::{Digest, Md5};
use serde::Serialize;
use tracing::debug;

use crate::codec::CHUNK_SIZE;
use crate::error::Result;
use crate::node::{Node, PropertyMap};
use crate::session::{DumpReader, SVN_PROP_DATE};

/// What aspect of the streams a reported difference concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffKind {
    Uuid,
    RevNr,
    RevDate,
    RevDateStr,
    RevProp,
    NodeCount,
    NodeMissing,
    Kind,
    CopyFromPath,
    CopyFromRev,
    Prop,
    HasText,
    TextLength,
    TextMd5,
    WrongMd5,
    Eol,
    Text,
}

impl DiffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffKind::Uuid => "uuid",
            DiffKind::RevNr => "rev-nr",
            DiffKind::RevDate => "rev-date",
            DiffKind::RevDateStr => "rev-date-str",
            DiffKind::RevProp => "rev-prop",
            DiffKind::NodeCount => "node-count",
            DiffKind::NodeMissing => "node-missing",
            DiffKind::Kind => "kind",
            DiffKind::CopyFromPath => "copy-from-path",
            DiffKind::CopyFromRev => "copy-from-rev",
            DiffKind::Prop => "prop",
            DiffKind::HasText => "has-text",
            DiffKind::TextLength => "text-length",
            DiffKind::TextMd5 => "text-md5",
            DiffKind::WrongMd5 => "wrong-md5",
            DiffKind::Eol => "eol",
            DiffKind::Text => "text",
        }
    }

    /// All reportable kinds, for ignore-flag validation.
    pub fn all() -> &'static [DiffKind] {
        &[
            DiffKind::Uuid,
            DiffKind::RevNr,
            DiffKind::RevDate,
            DiffKind::RevDateStr,
            DiffKind::RevProp,
            DiffKind::NodeCount,
            DiffKind::NodeMissing,
            DiffKind::Kind,
            DiffKind::CopyFromPath,
            DiffKind::CopyFromRev,
            DiffKind::Prop,
            DiffKind::HasText,
            DiffKind::TextLength,
            DiffKind::TextMd5,
            DiffKind::WrongMd5,
            DiffKind::Eol,
            DiffKind::Text,
        ]
    }

    /// Parse a kind name as printed by [`as_str`](Self::as_str).
    pub fn parse(s: &str) -> Option<DiffKind> {
        DiffKind::all().iter().copied().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for DiffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two compared streams a report refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpSide {
    First,
    Second,
}

impl std::fmt::Display for DumpSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DumpSide::First => "dump1",
            DumpSide::Second => "dump2",
        })
    }
}

/// Sink for the differences found during a comparison.
///
/// All methods have empty default bodies so implementors only handle what
/// they care about. Context callbacks (`next_revision`, `next_node`)
/// precede the reports they scope.
pub trait DiffHandler {
    /// A new revision pair is being compared.
    fn next_revision(&mut self, _rev: u64) {}

    /// A matched node pair is being compared.
    fn next_node(&mut self, _path: &str) {}

    /// A revision-level field differs.
    fn rev_diff(&mut self, _kind: DiffKind, _value1: &str, _value2: &str) {}

    /// A revision property present on both sides differs.
    fn revprop_diff(&mut self, _name: &str, _value1: Option<&str>, _value2: Option<&str>) {}

    /// A revision property is missing on `side`.
    fn revprop_missing(&mut self, _side: DumpSide, _name: &str, _value: Option<&str>) {}

    /// A field of the current node pair differs.
    fn node_diff(&mut self, _kind: DiffKind, _value1: &str, _value2: &str) {}

    /// A node property present on both sides differs.
    fn prop_diff(&mut self, _name: &str, _value1: Option<&str>, _value2: Option<&str>) {}

    /// A node property is missing on `side`.
    fn prop_missing(&mut self, _side: DumpSide, _name: &str, _value: Option<&str>) {}

    /// A node has no counterpart on `side`.
    fn node_missing(&mut self, _side: DumpSide, _node: &Node) {}

    /// A side's advertised digest disagrees with its computed digest.
    fn wrong_md5(&mut self, _side: DumpSide, _advertised: &str, _computed: &str) {}

    /// The texts of the current node pair differ ([`DiffKind::Eol`] or
    /// [`DiffKind::Text`]).
    fn text_diff(&mut self, _kind: DiffKind) {}

    /// One stream ended while the other still had revisions; `side` is
    /// the stream that ended.
    fn stream_ended_early(&mut self, _side: DumpSide, _next_rev: u64) {}
}

/// Outcome of a streamed text comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCmp {
    Identical,
    /// Differ only in line endings.
    EolOnly,
    Differs,
}

/// Comparison engine for two dump streams.
#[derive(Debug, Clone, Default)]
pub struct DumpDiff {
    check_eol: bool,
}

impl DumpDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerate line-ending-only text differences, reporting them as
    /// [`DiffKind::Eol`] instead of [`DiffKind::Text`].
    pub fn check_eol(mut self, enable: bool) -> Self {
        self.check_eol = enable;
        self
    }

    /// Compare two freshly opened read sessions, reporting through
    /// `handler`. Returns the number of differences found.
    ///
    /// Comparison is lockstep: a revision number mismatch is reported
    /// once and aborts the walk, since no node pairing is meaningful
    /// beyond that point.
    pub fn compare<R1, R2, H>(
        &self,
        dump1: &mut DumpReader<R1>,
        dump2: &mut DumpReader<R2>,
        handler: &mut H,
    ) -> Result<u64>
    where
        R1: BufRead + Seek,
        R2: BufRead + Seek,
        H: DiffHandler,
    {
        let mut diffs = 0u64;
        let uuid1 = dump1.uuid().unwrap_or("").to_string();
        let uuid2 = dump2.uuid().unwrap_or("").to_string();
        if uuid1 != uuid2 {
            handler.rev_diff(DiffKind::Uuid, &uuid1, &uuid2);
            diffs += 1;
        }
        loop {
            let has1 = dump1.read_next_rev()?;
            let has2 = dump2.read_next_rev()?;
            match (has1, has2) {
                (false, false) => break,
                (true, false) => {
                    handler.stream_ended_early(DumpSide::Second, dump1.rev_nr());
                    diffs += 1;
                    break;
                }
                (false, true) => {
                    handler.stream_ended_early(DumpSide::First, dump2.rev_nr());
                    diffs += 1;
                    break;
                }
                (true, true) => {}
            }
            handler.next_revision(dump1.rev_nr());
            if dump1.rev_nr() != dump2.rev_nr() {
                handler.rev_diff(
                    DiffKind::RevNr,
                    &dump1.rev_nr().to_string(),
                    &dump2.rev_nr().to_string(),
                );
                diffs += 1;
                break;
            }
            debug!(rev = dump1.rev_nr(), "comparing revision");
            if dump1.rev_date() != dump2.rev_date() {
                handler.rev_diff(
                    DiffKind::RevDate,
                    &dump1.rev_date().to_svn_string(),
                    &dump2.rev_date().to_svn_string(),
                );
                diffs += 1;
            }
            let raw1 = dump1.rev_prop_value(SVN_PROP_DATE).unwrap_or(&[]);
            let raw2 = dump2.rev_prop_value(SVN_PROP_DATE).unwrap_or(&[]);
            if raw1 != raw2 {
                handler.rev_diff(
                    DiffKind::RevDateStr,
                    &String::from_utf8_lossy(raw1),
                    &String::from_utf8_lossy(raw2),
                );
                diffs += 1;
            }
            diffs += compare_prop_maps(
                dump1.rev_props(),
                dump2.rev_props(),
                true,
                handler,
            );
            if dump1.node_count() != dump2.node_count() {
                handler.rev_diff(
                    DiffKind::NodeCount,
                    &dump1.node_count().to_string(),
                    &dump2.node_count().to_string(),
                );
                diffs += 1;
            }
            diffs += self.compare_nodes(dump1, dump2, handler)?;
        }
        Ok(diffs)
    }

    fn compare_nodes<R1, R2, H>(
        &self,
        dump1: &mut DumpReader<R1>,
        dump2: &mut DumpReader<R2>,
        handler: &mut H,
    ) -> Result<u64>
    where
        R1: BufRead + Seek,
        R2: BufRead + Seek,
        H: DiffHandler,
    {
        let mut diffs = 0u64;
        // clone so text readers can borrow the sessions below
        let nodes1: Vec<Node> = dump1.nodes().cloned().collect();
        let nodes2: Vec<Node> = dump2.nodes().cloned().collect();
        let index2: HashMap<(char, String), usize> = nodes2
            .iter()
            .enumerate()
            .map(|(i, n)| ((n.action.letter(), n.path.clone()), i))
            .collect();
        let mut matched2 = vec![false; nodes2.len()];
        for node1 in &nodes1 {
            let key = (node1.action.letter(), node1.path.clone());
            let Some(&i) = index2.get(&key) else {
                handler.node_missing(DumpSide::Second, node1);
                diffs += 1;
                continue;
            };
            matched2[i] = true;
            handler.next_node(&node1.path);
            diffs += self.compare_node(dump1, dump2, node1, &nodes2[i], handler)?;
        }
        for (i, node2) in nodes2.iter().enumerate() {
            if !matched2[i] {
                handler.node_missing(DumpSide::First, node2);
                diffs += 1;
            }
        }
        Ok(diffs)
    }

    fn compare_node<R1, R2, H>(
        &self,
        dump1: &mut DumpReader<R1>,
        dump2: &mut DumpReader<R2>,
        node1: &Node,
        node2: &Node,
        handler: &mut H,
    ) -> Result<u64>
    where
        R1: BufRead + Seek,
        R2: BufRead + Seek,
        H: DiffHandler,
    {
        let mut diffs = 0u64;
        // identity fields first; once they diverge the remaining per-node
        // comparison is meaningless and is skipped
        if node1.kind != node2.kind {
            handler.node_diff(DiffKind::Kind, node1.kind.as_str(), node2.kind.as_str());
            return Ok(diffs + 1);
        }
        let from_path1 = node1.copy_from.as_ref().map(|c| c.path.as_str()).unwrap_or("");
        let from_path2 = node2.copy_from.as_ref().map(|c| c.path.as_str()).unwrap_or("");
        if from_path1 != from_path2 {
            handler.node_diff(DiffKind::CopyFromPath, from_path1, from_path2);
            return Ok(diffs + 1);
        }
        let from_rev1 = node1.copy_from.as_ref().map(|c| c.rev.to_string()).unwrap_or_default();
        let from_rev2 = node2.copy_from.as_ref().map(|c| c.rev.to_string()).unwrap_or_default();
        if from_rev1 != from_rev2 {
            handler.node_diff(DiffKind::CopyFromRev, &from_rev1, &from_rev2);
            return Ok(diffs + 1);
        }
        // an absent property block compares like an empty one
        let empty = PropertyMap::new();
        diffs += compare_prop_maps(
            node1.props.as_ref().unwrap_or(&empty),
            node2.props.as_ref().unwrap_or(&empty),
            false,
            handler,
        );
        if node1.has_text() != node2.has_text() {
            handler.node_diff(
                DiffKind::HasText,
                if node1.has_text() { "text" } else { "no text" },
                if node2.has_text() { "text" } else { "no text" },
            );
            return Ok(diffs + 1);
        }
        if !node1.has_text() {
            return Ok(diffs);
        }
        if node1.text_length() != node2.text_length() {
            handler.node_diff(
                DiffKind::TextLength,
                &node1.text_length().to_string(),
                &node2.text_length().to_string(),
            );
            diffs += 1;
        }
        if let (Some(md5_1), Some(md5_2)) = (node1.text_md5(), node2.text_md5()) {
            if md5_1 != md5_2 {
                handler.node_diff(DiffKind::TextMd5, md5_1, md5_2);
                diffs += 1;
            }
        }
        // texts are always streamed so the computed digests can vouch
        // for the advertised ones
        let mut text1 = dump1.text_reader(node1)?;
        let mut text2 = dump2.text_reader(node2)?;
        let (cmp, computed1, computed2) = compare_text(&mut text1, &mut text2, self.check_eol)?;
        if let Some(advertised) = node1.text_md5() {
            if advertised != computed1 {
                handler.wrong_md5(DumpSide::First, advertised, &computed1);
                diffs += 1;
            }
        }
        if let Some(advertised) = node2.text_md5() {
            if advertised != computed2 {
                handler.wrong_md5(DumpSide::Second, advertised, &computed2);
                diffs += 1;
            }
        }
        match cmp {
            TextCmp::Identical => {}
            TextCmp::EolOnly => {
                handler.text_diff(DiffKind::Eol);
                diffs += 1;
            }
            TextCmp::Differs => {
                handler.text_diff(DiffKind::Text);
                diffs += 1;
            }
        }
        Ok(diffs)
    }
}

/// Symmetric difference walk over two property maps.
fn compare_prop_maps<H: DiffHandler>(
    props1: &PropertyMap,
    props2: &PropertyMap,
    rev_props: bool,
    handler: &mut H,
) -> u64 {
    let mut diffs = 0u64;
    for (name, value1) in props1 {
        // the date is compared as a revision field, not as a property
        if rev_props && name == SVN_PROP_DATE {
            continue;
        }
        // comparison is on raw bytes; reports are lossily decoded
        let lossy1 = value1.as_ref().map(|v| String::from_utf8_lossy(v));
        match props2.get(name) {
            Some(value2) if value1 == value2 => {}
            Some(value2) => {
                let lossy2 = value2.as_ref().map(|v| String::from_utf8_lossy(v));
                if rev_props {
                    handler.revprop_diff(name, lossy1.as_deref(), lossy2.as_deref());
                } else {
                    handler.prop_diff(name, lossy1.as_deref(), lossy2.as_deref());
                }
                diffs += 1;
            }
            None => {
                if rev_props {
                    handler.revprop_missing(DumpSide::Second, name, lossy1.as_deref());
                } else {
                    handler.prop_missing(DumpSide::Second, name, lossy1.as_deref());
                }
                diffs += 1;
            }
        }
    }
    for (name, value2) in props2 {
        if rev_props && name == SVN_PROP_DATE {
            continue;
        }
        if !props1.contains_key(name) {
            let lossy2 = value2.as_ref().map(|v| String::from_utf8_lossy(v));
            if rev_props {
                handler.revprop_missing(DumpSide::First, name, lossy2.as_deref());
            } else {
                handler.prop_missing(DumpSide::First, name, lossy2.as_deref());
            }
            diffs += 1;
        }
    }
    diffs
}

// Fold line endings to LF. A CR at the end of a chunk is held back until
// the next chunk (or EOF) decides whether it starts a CRLF pair.
fn normalize_eol(input: &[u8], pending_cr: &mut bool, out: &mut Vec<u8>) {
    for &b in input {
        if *pending_cr {
            out.push(b'\n');
            *pending_cr = false;
            match b {
                b'\n' => continue,
                b'\r' => {
                    *pending_cr = true;
                    continue;
                }
                _ => {}
            }
        }
        if b == b'\r' {
            *pending_cr = true;
        } else {
            out.push(b);
        }
    }
}

/// Compare two bounded text streams chunk by chunk, hashing both sides.
///
/// Returns the comparison outcome and the computed MD5 digest of each
/// stream (lowercase hex). With `check_eol` set, streams whose
/// line-ending-normalized forms agree classify as [`TextCmp::EolOnly`].
pub fn compare_text<A, B>(text1: &mut A, text2: &mut B, check_eol: bool) -> Result<(TextCmp, String, String)>
where
    A: Read,
    B: Read,
{
    let mut hash1 = Md5::new();
    let mut hash2 = Md5::new();
    let mut len1 = 0u64;
    let mut len2 = 0u64;
    let mut eof1 = false;
    let mut eof2 = false;
    let mut eol_equal = check_eol;
    let mut norm1: Vec<u8> = Vec::new();
    let mut norm2: Vec<u8> = Vec::new();
    let mut cr1 = false;
    let mut cr2 = false;
    let mut buf = [0u8; CHUNK_SIZE];

    while !(eof1 && eof2) {
        // while the normalized forms still agree, feed only the side
        // whose backlog is behind so neither buffer outgrows a chunk
        let read1 = !eof1 && (!eol_equal || eof2 || norm1.len() <= norm2.len());
        let read2 = !eof2 && (!eol_equal || eof1 || norm2.len() <= norm1.len());
        if read1 {
            let n = text1.read(&mut buf)?;
            if n == 0 {
                eof1 = true;
                if eol_equal && cr1 {
                    norm1.push(b'\n');
                    cr1 = false;
                }
            } else {
                hash1.update(&buf[..n]);
                len1 += n as u64;
                if eol_equal {
                    normalize_eol(&buf[..n], &mut cr1, &mut norm1);
                }
            }
        }
        if read2 {
            let n = text2.read(&mut buf)?;
            if n == 0 {
                eof2 = true;
                if eol_equal && cr2 {
                    norm2.push(b'\n');
                    cr2 = false;
                }
            } else {
                hash2.update(&buf[..n]);
                len2 += n as u64;
                if eol_equal {
                    normalize_eol(&buf[..n], &mut cr2, &mut norm2);
                }
            }
        }
        if eol_equal {
            let common = norm1.len().min(norm2.len());
            if norm1[..common] != norm2[..common] {
                eol_equal = false;
            } else {
                norm1.drain(..common);
                norm2.drain(..common);
                // a drained side at EOF cannot match further output
                let done1 = eof1 && norm1.is_empty() && !cr1;
                let done2 = eof2 && norm2.is_empty() && !cr2;
                if (done1 && !norm2.is_empty()) || (done2 && !norm1.is_empty()) {
                    eol_equal = false;
                }
            }
            if !eol_equal {
                norm1 = Vec::new();
                norm2 = Vec::new();
            }
        }
    }
    if eol_equal && (!norm1.is_empty() || !norm2.is_empty()) {
        eol_equal = false;
    }
    let computed1 = hex::encode(hash1.finalize());
    let computed2 = hex::encode(hash2.finalize());
    let cmp = if len1 == len2 && computed1 == computed2 {
        TextCmp::Identical
    } else if eol_equal {
        TextCmp::EolOnly
    } else {
        TextCmp::Differs
    };
    Ok((cmp, computed1, computed2))
}

/// Ignore filters plus per-kind difference counters, for building report
/// handlers on top of [`DiffHandler`].
///
/// Suppressed differences still count toward the per-kind totals; the
/// filters only decide what gets reported.
#[derive(Debug, Default)]
pub struct DiffSummary {
    ignored_kinds: HashSet<DiffKind>,
    ignored_revprops: HashSet<String>,
    ignored_props: HashSet<String>,
    counts: BTreeMap<DiffKind, u64>,
    reported: u64,
    suppressed: u64,
}

impl DiffSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_kind(&mut self, kind: DiffKind) {
        self.ignored_kinds.insert(kind);
    }

    pub fn ignore_revprop(&mut self, name: impl Into<String>) {
        self.ignored_revprops.insert(name.into());
    }

    pub fn ignore_prop(&mut self, name: impl Into<String>) {
        self.ignored_props.insert(name.into());
    }

    pub fn is_ignored(&self, kind: DiffKind) -> bool {
        self.ignored_kinds.contains(&kind)
    }

    pub fn is_ignored_revprop(&self, name: &str) -> bool {
        self.ignored_revprops.contains(name)
            || self.ignored_kinds.contains(&DiffKind::RevProp)
    }

    pub fn is_ignored_prop(&self, name: &str) -> bool {
        self.ignored_props.contains(name) || self.ignored_kinds.contains(&DiffKind::Prop)
    }

    fn count(&mut self, kind: DiffKind, suppress: bool) -> bool {
        *self.counts.entry(kind).or_insert(0) += 1;
        if suppress {
            self.suppressed += 1;
        } else {
            self.reported += 1;
        }
        !suppress
    }

    /// Count one difference. Returns `true` when it should be reported,
    /// `false` when an ignore filter suppresses it.
    pub fn record(&mut self, kind: DiffKind) -> bool {
        let suppress = self.is_ignored(kind);
        self.count(kind, suppress)
    }

    /// Count one revision property difference, honoring name filters.
    pub fn record_revprop(&mut self, name: &str) -> bool {
        let suppress = self.is_ignored_revprop(name);
        self.count(DiffKind::RevProp, suppress)
    }

    /// Count one node property difference, honoring name filters.
    pub fn record_prop(&mut self, name: &str) -> bool {
        let suppress = self.is_ignored_prop(name);
        self.count(DiffKind::Prop, suppress)
    }

    /// Per-kind counts of all differences, suppressed included.
    pub fn counts(&self) -> &BTreeMap<DiffKind, u64> {
        &self.counts
    }

    /// All differences seen.
    pub fn total(&self) -> u64 {
        self.reported + self.suppressed
    }

    /// Differences that passed the ignore filters.
    pub fn reported(&self) -> u64 {
        self.reported
    }

    /// Differences suppressed by ignore filters.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
