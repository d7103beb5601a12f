//! Read and write sessions over a dump stream
//!
//! A session is a stateful cursor bound to exactly one underlying stream.
//! [`DumpReader`] parses one revision at a time and exposes its properties
//! and node list; [`DumpWriter`] serializes revisions and nodes, streaming
//! node text from a caller-supplied byte source in fixed-size chunks.
//!
//! Node text is never buffered: on read a node only records a bounded
//! sub-range of the stream ([`TextRef`](crate::node::TextRef)); the bytes
//! are obtained on demand through [`DumpReader::text_reader`]. A text
//! reader borrows the session, so a node's text must be fully consumed
//! before the session advances.

use std::io::{BufRead, Read, Seek, Write};

use tracing::{debug, trace};

use crate::codec::{
    self, StreamReader, CONTENT_LENGTH_TAG, COPYFROM_PATH_TAG, COPYFROM_REV_TAG, FORMAT_VERSION,
    NODE_ACTION_TAG, NODE_KIND_TAG, NODE_PATH_TAG, PROP_LENGTH_TAG, REV_NUMBER_TAG,
    TEXT_LENGTH_TAG, TEXT_MD5_TAG, UUID_TAG, VERSION_TAG,
};
use crate::date::RevDate;
use crate::error::{DumpError, Result};
use crate::node::{CopyFrom, Node, NodeAction, NodeKind, PropertyMap, TextRef};

/// Reserved revision property: author.
pub const SVN_PROP_AUTHOR: &str = "svn:author";
/// Reserved revision property: log message.
pub const SVN_PROP_LOG: &str = "svn:log";
/// Reserved revision property: timestamp string.
pub const SVN_PROP_DATE: &str = "svn:date";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    /// Bound to a stream, header parsed.
    Active,
    /// End of stream reached; terminal.
    Exhausted,
}

/// Bounded sub-reader over one node's text.
///
/// Borrows the owning session, so the session cannot advance or close
/// while the text is being read.
pub struct TextReader<'a, R> {
    inner: &'a mut R,
    remaining: u64,
}

impl<'a, R> TextReader<'a, R> {
    /// Bytes left to read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<'a, R: Read> Read for TextReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let want = buf.len().min(self.remaining as usize);
        let n = self.inner.read(&mut buf[..want])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Read cursor over an existing dump stream.
pub struct DumpReader<R> {
    scan: StreamReader<R>,
    uuid: Option<String>,
    rev_nr: u64,
    rev_date: RevDate,
    rev_props: PropertyMap,
    nodes: Vec<Node>,
    /// Start offset of the next revision.
    rev_start: u64,
    state: ReadState,
    first_rev_read: bool,
}

impl<R: BufRead + Seek> DumpReader<R> {
    /// Bind to a stream and parse the header.
    ///
    /// Fails with [`DumpError::Format`] unless the stream announces dump
    /// format version 2. The UUID tag is optional; when the next tag is
    /// not a UUID the position is rewound to the start of that tag.
    pub fn open(stream: R) -> Result<Self> {
        let mut scan = StreamReader::new(stream);

        match scan.read_tag(true)? {
            Some((name, value)) if name == VERSION_TAG => {
                if value != FORMAT_VERSION {
                    return Err(DumpError::format(format!(
                        "unsupported dump format version '{}' (expected {})",
                        value, FORMAT_VERSION
                    )));
                }
            }
            _ => return Err(DumpError::format("not an svn dump stream")),
        }
        scan.skip_empty_line()?;

        let offset = scan.position()?;
        let uuid = match scan.read_tag(false)? {
            Some((name, value)) if name == UUID_TAG => {
                scan.skip_empty_line()?;
                Some(value)
            }
            _ => {
                scan.seek_to(offset)?;
                None
            }
        };

        let rev_start = scan.position()?;
        debug!(uuid = uuid.as_deref().unwrap_or(""), "opened dump stream");
        Ok(Self {
            scan,
            uuid,
            rev_nr: 0,
            rev_date: RevDate::default(),
            rev_props: PropertyMap::new(),
            nodes: Vec::new(),
            rev_start,
            state: ReadState::Active,
            first_rev_read: false,
        })
    }

    /// Advance to the next revision.
    ///
    /// Returns `false` at end of stream; that is not an error, but the
    /// session is exhausted afterwards and further reads fail with
    /// [`DumpError::State`].
    pub fn read_next_rev(&mut self) -> Result<bool> {
        if self.state == ReadState::Exhausted {
            return Err(DumpError::state("read on an exhausted session"));
        }
        if self.scan.at_eof() {
            self.state = ReadState::Exhausted;
            return Ok(false);
        }

        // a text reader may have moved the position
        if self.scan.position()? != self.rev_start {
            self.scan.seek_to(self.rev_start)?;
        }

        let tags = self.scan.read_tag_list()?;
        if tags.is_empty() && self.scan.at_eof() {
            self.state = ReadState::Exhausted;
            return Ok(false);
        }
        let rev_nr = tags
            .get_u64(REV_NUMBER_TAG)?
            .ok_or_else(|| DumpError::format("missing mandatory tag 'Revision-number'"))?;
        if self.first_rev_read && rev_nr != self.rev_nr + 1 {
            return Err(DumpError::format(format!(
                "revision number {} follows revision {}",
                rev_nr, self.rev_nr
            )));
        }

        let mut props = self.scan.read_prop_block()?;
        self.scan.skip_empty_line()?;
        props
            .entry(SVN_PROP_LOG.to_string())
            .or_insert_with(|| Some(Vec::new()));
        props
            .entry(SVN_PROP_AUTHOR.to_string())
            .or_insert_with(|| Some(Vec::new()));
        // the raw date string is preserved; only writers canonicalize
        self.rev_date = match props.get(SVN_PROP_DATE) {
            Some(Some(raw)) => RevDate::parse(&String::from_utf8_lossy(raw)),
            _ => RevDate::default(),
        };
        self.rev_props = props;

        self.nodes.clear();
        loop {
            let tags = self.scan.read_tag_list()?;
            if tags.is_empty() {
                break;
            }
            if tags.contains(REV_NUMBER_TAG) {
                // peeked into the next revision; rewind to its tag list
                let rewind = self.scan.tag_start();
                self.scan.seek_to(rewind)?;
                break;
            }

            let props = if tags.contains(PROP_LENGTH_TAG) {
                Some(self.scan.read_prop_block()?)
            } else {
                None
            };
            let text = match tags.get_u64(TEXT_LENGTH_TAG)? {
                Some(length) => {
                    let offset = self.scan.position()?;
                    self.scan.skip_bytes(length)?;
                    self.scan.skip_empty_line()?;
                    Some(TextRef {
                        offset,
                        length,
                        md5: tags.get(TEXT_MD5_TAG).map(str::to_string),
                    })
                }
                None => None,
            };

            let path = tags
                .require(NODE_PATH_TAG)?
                .trim_start_matches('/')
                .to_string();
            let action = NodeAction::parse(tags.require(NODE_ACTION_TAG)?)?;
            let kind = NodeKind::parse(tags.get(NODE_KIND_TAG).unwrap_or(""))?;
            let copy_from = match tags.get(COPYFROM_PATH_TAG) {
                Some(cf_path) => {
                    let rev = tags.get_u64(COPYFROM_REV_TAG)?.ok_or_else(|| {
                        DumpError::format("Node-copyfrom-path without Node-copyfrom-rev")
                    })?;
                    Some(CopyFrom {
                        path: cf_path.trim_start_matches('/').to_string(),
                        rev,
                    })
                }
                None => None,
            };

            trace!(path = %path, action = %action, "read node");
            let mut node = Node::new(path, action, kind);
            node.copy_from = copy_from;
            node.props = props;
            node.text = text;
            self.upsert_node(node);
        }

        self.rev_start = self.scan.position()?;
        self.rev_nr = rev_nr;
        self.first_rev_read = true;
        trace!(rev = rev_nr, nodes = self.nodes.len(), "read revision");
        Ok(true)
    }

    // node keys are unique per revision; a duplicate key replaces
    fn upsert_node(&mut self, node: Node) {
        match self.nodes.iter_mut().find(|n| n.key() == node.key()) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
    }

    /// True until end of stream has been reached.
    pub fn has_revision(&self) -> bool {
        self.state == ReadState::Active
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    /// Current revision number.
    pub fn rev_nr(&self) -> u64 {
        self.rev_nr
    }

    /// Parsed date of the current revision.
    pub fn rev_date(&self) -> RevDate {
        self.rev_date
    }

    /// Raw `svn:date` string of the current revision ("" if absent).
    pub fn rev_date_str(&self) -> &str {
        self.prop_str(SVN_PROP_DATE)
    }

    pub fn rev_author(&self) -> &str {
        self.prop_str(SVN_PROP_AUTHOR)
    }

    pub fn rev_log(&self) -> &str {
        self.prop_str(SVN_PROP_LOG)
    }

    // property values are bytes; the reserved ones are expected to be text
    fn prop_str(&self, name: &str) -> &str {
        self.rev_prop_value(name)
            .and_then(|b| std::str::from_utf8(b).ok())
            .unwrap_or("")
    }

    /// All properties of the current revision.
    pub fn rev_props(&self) -> &PropertyMap {
        &self.rev_props
    }

    /// Raw value of one revision property.
    pub fn rev_prop_value(&self, name: &str) -> Option<&[u8]> {
        self.rev_props.get(name).and_then(|v| v.as_deref())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node at the given ordinal index within the current revision.
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Nodes of the current revision in stream order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Nodes matching a path and an action-letter filter string.
    ///
    /// The filter may contain one or more of the letters `A`, `C`, `D`
    /// and `R`; pass `"ACDR"` to match any action.
    pub fn nodes_by_path(&self, path: &str, actions: &str) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.path == path && actions.contains(n.action.letter()))
            .collect()
    }

    /// Obtain a bounded reader over a node's text.
    ///
    /// The node must belong to the current revision of this session; its
    /// text is only valid until the session advances or closes.
    pub fn text_reader(&mut self, node: &Node) -> Result<TextReader<'_, R>> {
        let text = node
            .text
            .as_ref()
            .ok_or_else(|| DumpError::state(format!("node '{}' has no text", node.path)))?;
        self.scan.seek_to(text.offset)?;
        Ok(TextReader {
            inner: self.scan.get_mut(),
            remaining: text.length,
        })
    }

    /// Release the underlying stream. The session is inert afterwards.
    pub fn close(self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    /// Header written, no revision open yet.
    Created,
    /// At least one revision written; nodes may be added.
    InRevision,
}

/// Write cursor producing a new dump stream.
pub struct DumpWriter<W: Write> {
    out: W,
    uuid: Option<String>,
    rev_nr: u64,
    rev_date: RevDate,
    state: WriteState,
}

impl<W: Write> DumpWriter<W> {
    fn write_header(out: &mut W, uuid: Option<&str>) -> Result<()> {
        write!(out, "{}: {}\n\n", VERSION_TAG, FORMAT_VERSION)?;
        if let Some(uuid) = uuid {
            write!(out, "{}: {}\n\n", UUID_TAG, uuid)?;
        }
        Ok(())
    }

    /// Begin a new dump stream starting with a synthetic revision 0 that
    /// carries only a canonicalized timestamp property.
    pub fn create_with_rev_0(mut out: W, uuid: Option<&str>, rev0_date: &str) -> Result<Self> {
        let date = RevDate::parse(rev0_date);
        Self::write_header(&mut out, uuid)?;

        let mut props = PropertyMap::new();
        props.insert(
            SVN_PROP_DATE.to_string(),
            Some(date.to_svn_string().into_bytes()),
        );
        let block = codec::encode_props(&props);
        write!(
            out,
            "{}: 0\n{}: {}\n{}: {}\n\n",
            REV_NUMBER_TAG,
            PROP_LENGTH_TAG,
            block.len(),
            CONTENT_LENGTH_TAG,
            block.len()
        )?;
        out.write_all(&block)?;
        out.write_all(b"\n")?;

        debug!(uuid = uuid.unwrap_or(""), "created dump stream at revision 0");
        Ok(Self {
            out,
            uuid: uuid.map(str::to_string),
            rev_nr: 0,
            rev_date: date,
            state: WriteState::Created,
        })
    }

    /// Begin a new dump stream whose first revision will be
    /// `first_rev_nr` (must be >= 1).
    pub fn create_from_rev(mut out: W, uuid: Option<&str>, first_rev_nr: u64) -> Result<Self> {
        if first_rev_nr < 1 {
            return Err(DumpError::state(format!(
                "invalid first revision number {} (should be >= 1)",
                first_rev_nr
            )));
        }
        Self::write_header(&mut out, uuid)?;
        debug!(
            uuid = uuid.unwrap_or(""),
            first_rev = first_rev_nr,
            "created dump stream"
        );
        Ok(Self {
            out,
            uuid: uuid.map(str::to_string),
            rev_nr: first_rev_nr - 1,
            rev_date: RevDate::default(),
            state: WriteState::Created,
        })
    }

    /// Create a writer mirroring a reader's starting point.
    ///
    /// `uuid` overrides the stream UUID; `None` mirrors the reader's.
    /// When the reader sits on revision 0 a revision-0 genesis is written
    /// and the reader advances past it; otherwise the writer starts at
    /// the reader's current revision number. Returns the writer and
    /// whether the reader still has a revision to copy.
    pub fn create_like<R: BufRead + Seek>(
        out: W,
        src: &mut DumpReader<R>,
        uuid: Option<&str>,
    ) -> Result<(Self, bool)> {
        let uuid = uuid.or_else(|| src.uuid()).map(str::to_string);
        if src.rev_nr() == 0 {
            let rev0_date = src.rev_date_str().to_string();
            let writer = Self::create_with_rev_0(out, uuid.as_deref(), &rev0_date)?;
            let has_rev = src.read_next_rev()?;
            Ok((writer, has_rev))
        } else {
            let writer = Self::create_from_rev(out, uuid.as_deref(), src.rev_nr())?;
            Ok((writer, src.has_revision()))
        }
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    /// Number of the most recently written revision.
    pub fn rev_nr(&self) -> u64 {
        self.rev_nr
    }

    /// Parsed date of the most recently written revision.
    pub fn rev_date(&self) -> RevDate {
        self.rev_date
    }

    /// Append a revision with the given properties.
    ///
    /// Assigns the next sequential number; missing author/log are filled
    /// with empty strings and the date is re-serialized canonically.
    /// Returns the assigned revision number.
    pub fn add_rev(&mut self, props: PropertyMap) -> Result<u64> {
        let mut props = props;
        self.rev_nr += 1;
        self.rev_date = match props.get(SVN_PROP_DATE) {
            Some(Some(raw)) => RevDate::parse(&String::from_utf8_lossy(raw)),
            _ => RevDate::default(),
        };
        props.insert(
            SVN_PROP_DATE.to_string(),
            Some(self.rev_date.to_svn_string().into_bytes()),
        );
        props
            .entry(SVN_PROP_AUTHOR.to_string())
            .or_insert_with(|| Some(Vec::new()));
        props
            .entry(SVN_PROP_LOG.to_string())
            .or_insert_with(|| Some(Vec::new()));

        let block = codec::encode_props(&props);
        write!(
            self.out,
            "{}: {}\n{}: {}\n{}: {}\n\n",
            REV_NUMBER_TAG,
            self.rev_nr,
            PROP_LENGTH_TAG,
            block.len(),
            CONTENT_LENGTH_TAG,
            block.len()
        )?;
        self.out.write_all(&block)?;
        self.out.write_all(b"\n")?;

        self.state = WriteState::InRevision;
        trace!(rev = self.rev_nr, "wrote revision");
        Ok(self.rev_nr)
    }

    /// Append a node to the open revision.
    ///
    /// When the node has text, `text` must supply exactly that many
    /// bytes; they are copied to the output in fixed-size chunks.
    pub fn add_node(&mut self, node: &Node, mut text: Option<&mut dyn Read>) -> Result<()> {
        if self.state != WriteState::InRevision {
            return Err(DumpError::state("add_node without an open revision"));
        }

        write!(self.out, "{}: {}\n", NODE_PATH_TAG, node.path)?;
        // kind is written whenever known, independent of the action:
        // some converters emit adds with copy-from but no kind
        if node.kind != NodeKind::Unknown {
            write!(self.out, "{}: {}\n", NODE_KIND_TAG, node.kind)?;
        }
        write!(self.out, "{}: {}\n", NODE_ACTION_TAG, node.action)?;

        if node.action != NodeAction::Delete {
            if let Some(cf) = &node.copy_from {
                write!(self.out, "{}: {}\n", COPYFROM_REV_TAG, cf.rev)?;
                write!(self.out, "{}: {}\n", COPYFROM_PATH_TAG, cf.path)?;
            }

            let prop_block = node.props.as_ref().map(codec::encode_props);
            let prop_len = prop_block.as_ref().map(|b| b.len() as u64).unwrap_or(0);
            let text_len = node.text_length();

            if prop_block.is_some() {
                write!(self.out, "{}: {}\n", PROP_LENGTH_TAG, prop_len)?;
            }
            if node.has_text() {
                write!(self.out, "{}: {}\n", TEXT_LENGTH_TAG, text_len)?;
                if let Some(md5) = node.text_md5() {
                    write!(self.out, "{}: {}\n", TEXT_MD5_TAG, md5)?;
                }
            }
            if prop_block.is_some() || node.has_text() {
                write!(self.out, "{}: {}\n\n", CONTENT_LENGTH_TAG, prop_len + text_len)?;
            }
            if let Some(block) = prop_block {
                self.out.write_all(&block)?;
            }
            if node.has_text() {
                let src = text.as_deref_mut().ok_or_else(|| {
                    DumpError::state(format!(
                        "node '{}' has text but no text source was supplied",
                        node.path
                    ))
                })?;
                codec::copy_text(src, &mut self.out, text_len)?;
            }
            self.out.write_all(b"\n")?;
        } else {
            self.out.write_all(b"\n")?;
        }
        self.out.write_all(b"\n")?;
        Ok(())
    }

    /// Append a node, streaming its text from the reader it was parsed
    /// from.
    pub fn copy_node_from<R: BufRead + Seek>(
        &mut self,
        node: &Node,
        src: &mut DumpReader<R>,
    ) -> Result<()> {
        if node.has_text() {
            let mut text = src.text_reader(node)?;
            self.add_node(node, Some(&mut text))
        } else {
            self.add_node(node, None)
        }
    }

    /// Append the reader's whole current revision: properties and all
    /// nodes, including streamed text.
    pub fn add_rev_from<R: BufRead + Seek>(&mut self, src: &mut DumpReader<R>) -> Result<()> {
        self.add_rev(src.rev_props().clone())?;
        for index in 0..src.node_count() {
            let node = src.node(index).clone();
            self.copy_node_from(&node, src)?;
        }
        Ok(())
    }

    /// Flush and release the underlying stream. The session is inert
    /// afterwards.
    pub fn close(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md5::Digest;
    use std::io::Cursor;

    fn open_bytes(bytes: Vec<u8>) -> Result<DumpReader<Cursor<Vec<u8>>>> {
        DumpReader::open(Cursor::new(bytes))
    }

    fn simple_dump() -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = DumpWriter::create_with_rev_0(
            &mut out,
            Some("29f22b1d-6eb5-4a0d-9b52-2aa0d42a4b6f"),
            "2004-01-01T12:00:00.000000Z",
        )
        .unwrap();

        let mut props = PropertyMap::new();
        props.insert(SVN_PROP_AUTHOR.to_string(), Some(b"alice".to_vec()));
        props.insert(SVN_PROP_LOG.to_string(), Some(b"add trunk".to_vec()));
        props.insert(
            SVN_PROP_DATE.to_string(),
            Some(b"2004-01-01T12:30:00.000000Z".to_vec()),
        );
        writer.add_rev(props).unwrap();

        let dir = Node::new("trunk", NodeAction::Add, NodeKind::Dir);
        writer.add_node(&dir, None).unwrap();

        let body = b"hello dump\n";
        let mut file = Node::new("trunk/hello.txt", NodeAction::Add, NodeKind::File);
        file.set_property("svn:eol-style", Some(b"native".to_vec()));
        file.text = Some(TextRef {
            offset: 0,
            length: body.len() as u64,
            md5: Some(hex::encode(md5::Md5::digest(body))),
        });
        writer.add_node(&file, Some(&mut &body[..])).unwrap();
        writer.close().unwrap();
        out
    }

    #[test]
    fn open_rejects_bad_version() {
        // the session type is not Debug, so take the error side by hand
        let err = open_bytes(b"SVN-fs-dump-format-version: 3\n\n".to_vec())
            .err()
            .unwrap();
        assert!(matches!(err, DumpError::Format(_)));

        let err = open_bytes(b"Not-a-dump: 1\n\n".to_vec()).err().unwrap();
        assert!(matches!(err, DumpError::Format(_)));
    }

    #[test]
    fn open_tolerates_missing_uuid() {
        let mut bytes = Vec::new();
        let writer = DumpWriter::create_from_rev(&mut bytes, None, 1).unwrap();
        writer.close().unwrap();
        let reader = open_bytes(bytes).unwrap();
        assert_eq!(reader.uuid(), None);
    }

    #[test]
    fn read_simple_dump() {
        let mut dump = open_bytes(simple_dump()).unwrap();
        assert_eq!(
            dump.uuid(),
            Some("29f22b1d-6eb5-4a0d-9b52-2aa0d42a4b6f")
        );

        assert!(dump.read_next_rev().unwrap());
        assert_eq!(dump.rev_nr(), 0);
        assert_eq!(dump.node_count(), 0);
        assert_eq!(dump.rev_author(), "");
        assert_eq!(dump.rev_date_str(), "2004-01-01T12:00:00.000000Z");

        assert!(dump.read_next_rev().unwrap());
        assert_eq!(dump.rev_nr(), 1);
        assert_eq!(dump.rev_author(), "alice");
        assert_eq!(dump.rev_log(), "add trunk");
        assert_eq!(dump.node_count(), 2);

        let dir = dump.node(0);
        assert_eq!(dir.path, "trunk");
        assert_eq!(dir.action, NodeAction::Add);
        assert_eq!(dir.kind, NodeKind::Dir);
        assert!(!dir.has_text());

        let file = dump.node(1).clone();
        assert_eq!(file.path, "trunk/hello.txt");
        assert_eq!(file.kind, NodeKind::File);
        assert_eq!(file.text_length(), 11);
        assert_eq!(
            file.props.as_ref().unwrap().get("svn:eol-style"),
            Some(&Some(b"native".to_vec()))
        );

        let mut text = Vec::new();
        dump.text_reader(&file).unwrap().read_to_end(&mut text).unwrap();
        assert_eq!(text, b"hello dump\n");

        assert!(!dump.read_next_rev().unwrap());
        assert!(!dump.has_revision());
    }

    #[test]
    fn read_after_exhaustion_is_a_state_error() {
        let mut dump = open_bytes(simple_dump()).unwrap();
        while dump.read_next_rev().unwrap() {}
        assert!(matches!(dump.read_next_rev(), Err(DumpError::State(_))));
    }

    #[test]
    fn nodes_by_path_honors_action_filter() {
        let mut dump = open_bytes(simple_dump()).unwrap();
        dump.read_next_rev().unwrap();
        dump.read_next_rev().unwrap();
        assert_eq!(dump.nodes_by_path("trunk", "ACDR").len(), 1);
        assert_eq!(dump.nodes_by_path("trunk", "A").len(), 1);
        assert_eq!(dump.nodes_by_path("trunk", "CDR").len(), 0);
        assert_eq!(dump.nodes_by_path("missing", "ACDR").len(), 0);
    }

    #[test]
    fn revision_numbers_must_increase_by_one() {
        let mut bytes = Vec::new();
        let mut writer = DumpWriter::create_from_rev(&mut bytes, None, 1).unwrap();
        writer.add_rev(PropertyMap::new()).unwrap();
        // forge a gap in the sequence
        writer.rev_nr = 5;
        writer.add_rev(PropertyMap::new()).unwrap();
        writer.close().unwrap();

        let mut dump = open_bytes(bytes).unwrap();
        assert!(dump.read_next_rev().unwrap());
        assert!(matches!(dump.read_next_rev(), Err(DumpError::Format(_))));
    }

    #[test]
    fn add_node_without_revision_is_a_state_error() {
        let mut out = Vec::new();
        let mut writer = DumpWriter::create_from_rev(&mut out, None, 1).unwrap();
        let node = Node::new("trunk", NodeAction::Add, NodeKind::Dir);
        assert!(matches!(
            writer.add_node(&node, None),
            Err(DumpError::State(_))
        ));
    }

    #[test]
    fn create_from_rev_rejects_zero() {
        let out: Vec<u8> = Vec::new();
        assert!(matches!(
            DumpWriter::create_from_rev(out, None, 0),
            Err(DumpError::State(_))
        ));
    }

    #[test]
    fn writer_canonicalizes_dates() {
        let mut out = Vec::new();
        let mut writer = DumpWriter::create_from_rev(&mut out, None, 1).unwrap();
        let mut props = PropertyMap::new();
        props.insert(SVN_PROP_DATE.to_string(), Some(b"garbage".to_vec()));
        writer.add_rev(props).unwrap();
        writer.close().unwrap();

        let mut dump = open_bytes(out).unwrap();
        dump.read_next_rev().unwrap();
        assert_eq!(dump.rev_date_str(), "1970-01-01T00:00:00.000000Z");
        assert_eq!(dump.rev_date(), RevDate::default());
    }

    #[test]
    fn copy_preserves_revisions_and_text() {
        let mut src = open_bytes(simple_dump()).unwrap();
        let mut copied = Vec::new();
        assert!(src.read_next_rev().unwrap());
        let (mut dst, mut has_rev) =
            DumpWriter::create_like(&mut copied, &mut src, None).unwrap();
        while has_rev {
            dst.add_rev_from(&mut src).unwrap();
            has_rev = src.read_next_rev().unwrap();
        }
        dst.close().unwrap();
        src.close();

        let mut a = open_bytes(simple_dump()).unwrap();
        let mut b = open_bytes(copied).unwrap();
        assert_eq!(a.uuid(), b.uuid());
        while a.read_next_rev().unwrap() {
            assert!(b.read_next_rev().unwrap());
            assert_eq!(a.rev_nr(), b.rev_nr());
            assert_eq!(a.rev_props(), b.rev_props());
            assert_eq!(a.node_count(), b.node_count());
        }
        assert!(!b.read_next_rev().unwrap());
    }

    #[test]
    fn non_utf8_property_values_survive_a_round_trip() {
        let raw = vec![0xc3, 0x28, 0x00, 0xff];
        let mut out = Vec::new();
        let mut writer = DumpWriter::create_from_rev(&mut out, None, 1).unwrap();
        writer.add_rev(PropertyMap::new()).unwrap();
        let mut node = Node::new("blob", NodeAction::Add, NodeKind::File);
        node.set_property("svn:mystery", Some(raw.clone()));
        writer.add_node(&node, None).unwrap();
        writer.close().unwrap();

        let mut dump = open_bytes(out).unwrap();
        dump.read_next_rev().unwrap();
        assert_eq!(
            dump.node(0).props.as_ref().unwrap().get("svn:mystery"),
            Some(&Some(raw))
        );
    }

    #[test]
    fn duplicate_node_key_replaces() {
        let mut out = Vec::new();
        let mut writer = DumpWriter::create_from_rev(&mut out, None, 1).unwrap();
        writer.add_rev(PropertyMap::new()).unwrap();
        let mut first = Node::new("trunk/a", NodeAction::Add, NodeKind::File);
        first.set_property("first", Some(b"1".to_vec()));
        let mut second = Node::new("trunk/a", NodeAction::Add, NodeKind::File);
        second.set_property("second", Some(b"2".to_vec()));
        writer.add_node(&first, None).unwrap();
        writer.add_node(&second, None).unwrap();
        writer.close().unwrap();

        let mut dump = open_bytes(out).unwrap();
        dump.read_next_rev().unwrap();
        assert_eq!(dump.node_count(), 1);
        assert!(dump.node(0).props.as_ref().unwrap().contains_key("second"));
    }
}
