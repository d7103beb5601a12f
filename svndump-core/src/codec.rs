//! Line-level codec for the dump stream grammar
//!
//! Knows tags, property blocks and chunked text copies; has no notion of
//! revisions or history. Payloads are length-prefixed and may contain
//! arbitrary bytes including newlines, so nothing here trims or splits
//! inside a counted payload.

use std::collections::BTreeMap;
use std::io::{BufRead, Read, Seek, SeekFrom, Write};

use crate::error::{DumpError, Result};
use crate::node::PropertyMap;

pub(crate) const VERSION_TAG: &str = "SVN-fs-dump-format-version";
pub(crate) const UUID_TAG: &str = "UUID";
pub(crate) const REV_NUMBER_TAG: &str = "Revision-number";
pub(crate) const NODE_PATH_TAG: &str = "Node-path";
pub(crate) const NODE_KIND_TAG: &str = "Node-kind";
pub(crate) const NODE_ACTION_TAG: &str = "Node-action";
pub(crate) const COPYFROM_REV_TAG: &str = "Node-copyfrom-rev";
pub(crate) const COPYFROM_PATH_TAG: &str = "Node-copyfrom-path";
pub(crate) const PROP_LENGTH_TAG: &str = "Prop-content-length";
pub(crate) const TEXT_LENGTH_TAG: &str = "Text-content-length";
pub(crate) const TEXT_MD5_TAG: &str = "Text-content-md5";
pub(crate) const CONTENT_LENGTH_TAG: &str = "Content-length";
pub(crate) const PROPS_END: &str = "PROPS-END";

/// The supported dump format version token.
pub const FORMAT_VERSION: &str = "2";

/// Size of the fixed chunks used for text streaming.
pub(crate) const CHUNK_SIZE: usize = 16 * 1024;

/// Tags of one tag list, keyed by name without the trailing colon.
#[derive(Debug, Default)]
pub(crate) struct TagList(BTreeMap<String, String>);

impl TagList {
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    /// Value of a mandatory tag.
    pub(crate) fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| DumpError::format(format!("missing mandatory tag '{}'", name)))
    }

    /// Numeric value of a tag, if present.
    pub(crate) fn get_u64(&self, name: &str) -> Result<Option<u64>> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .parse::<u64>()
                .map(Some)
                .map_err(|_| DumpError::format(format!("illegal value '{}' for tag '{}'", v, name))),
        }
    }
}

/// Positioned reader over the dump grammar.
///
/// Wraps a seekable buffered stream and records the start offset of the
/// most recent tag list so the caller can rewind when it peeked into the
/// next revision (boundary detection is peek-then-rewind).
pub(crate) struct StreamReader<R> {
    inner: R,
    eof: bool,
    tag_start: u64,
}

impl<R: BufRead + Seek> StreamReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            eof: false,
            tag_start: 0,
        }
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.eof
    }

    /// Offset where the most recent tag list started.
    pub(crate) fn tag_start(&self) -> u64 {
        self.tag_start
    }

    pub(crate) fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub(crate) fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.eof = false;
        Ok(())
    }

    /// Read one line without its trailing LF. `None` means end of stream;
    /// with `required` that is a format error instead.
    pub(crate) fn read_line(&mut self, required: bool) -> Result<Option<String>> {
        let mut buf = Vec::new();
        self.inner.read_until(b'\n', &mut buf)?;
        if buf.is_empty() {
            self.eof = true;
            if required {
                return Err(DumpError::format("unexpected end of stream"));
            }
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        let line = String::from_utf8(buf)
            .map_err(|_| DumpError::format("line is not valid UTF-8"))?;
        Ok(Some(line))
    }

    /// Read one line and check that it is empty.
    pub(crate) fn skip_empty_line(&mut self) -> Result<()> {
        match self.read_line(false)? {
            Some(ref line) if line.is_empty() => Ok(()),
            Some(line) => Err(DumpError::format(format!(
                "expected empty line, found '{}'",
                line
            ))),
            None => Err(DumpError::format("expected empty line, found end of stream")),
        }
    }

    /// Read exactly `length` payload bytes.
    pub(crate) fn read_exact_bytes(&mut self, length: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length as usize];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Skip `length` payload bytes without reading them into memory.
    pub(crate) fn skip_bytes(&mut self, length: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Current(length as i64))?;
        Ok(())
    }

    /// Direct access to the underlying stream, for bounded text reads.
    pub(crate) fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Read one `Name: value` tag line. `None` means a blank line, or end
    /// of stream (check [`at_eof`](Self::at_eof)).
    pub(crate) fn read_tag(&mut self, required: bool) -> Result<Option<(String, String)>> {
        let line = match self.read_line(required)? {
            None => return Ok(None),
            Some(line) => line,
        };
        if line.is_empty() {
            return Ok(None);
        }
        let (name, value) = line
            .split_once(' ')
            .ok_or_else(|| DumpError::format(format!("illegal tag line '{}'", line)))?;
        let name = name
            .strip_suffix(':')
            .ok_or_else(|| DumpError::format(format!("illegal tag line '{}'", line)))?;
        Ok(Some((name.to_string(), value.to_string())))
    }

    /// Read a tag list: consecutive tag lines terminated by a blank line.
    ///
    /// Leading blank lines are skipped. An empty list is returned at end
    /// of stream. The start offset of the list is recorded for rewinding.
    pub(crate) fn read_tag_list(&mut self) -> Result<TagList> {
        let mut tags = TagList::default();
        self.tag_start = self.position()?;
        let mut tag = self.read_tag(false)?;
        while tag.is_none() {
            if self.eof {
                return Ok(tags);
            }
            self.tag_start = self.position()?;
            tag = self.read_tag(false)?;
        }
        while let Some((name, value)) = tag {
            tags.0.insert(name, value);
            // end of stream inside a tag list is a format error
            tag = self.read_tag(true)?;
        }
        Ok(tags)
    }

    /// Read a property block terminated by the `PROPS-END` sentinel.
    pub(crate) fn read_prop_block(&mut self) -> Result<PropertyMap> {
        let mut props = PropertyMap::new();
        loop {
            let line = self
                .read_line(false)?
                .ok_or_else(|| DumpError::format("unterminated property block"))?;
            if line == PROPS_END {
                return Ok(props);
            }
            let (rec, len) = parse_prop_record(&line)?;
            if rec != 'K' && rec != 'D' {
                return Err(DumpError::format(format!(
                    "illegal property record '{}'",
                    line
                )));
            }
            // keys are names; values stay raw bytes
            let key = String::from_utf8_lossy(&self.read_exact_bytes(len)?).into_owned();
            self.skip_empty_line()?;
            let value = if rec == 'K' {
                let line = self
                    .read_line(false)?
                    .ok_or_else(|| DumpError::format("unterminated property block"))?;
                let (rec, len) = parse_prop_record(&line)?;
                if rec != 'V' {
                    return Err(DumpError::format(format!(
                        "illegal property record '{}'",
                        line
                    )));
                }
                let value = self.read_exact_bytes(len)?;
                self.skip_empty_line()?;
                Some(value)
            } else {
                None
            };
            props.insert(key, value);
        }
    }
}

fn parse_prop_record(line: &str) -> Result<(char, u64)> {
    let mut words = line.split_whitespace();
    let rec = words.next().and_then(|w| {
        if w.len() == 1 {
            w.chars().next()
        } else {
            None
        }
    });
    let len = words.next().and_then(|w| w.parse::<u64>().ok());
    match (rec, len, words.next()) {
        (Some(rec), Some(len), None) => Ok((rec, len)),
        _ => Err(DumpError::format(format!(
            "illegal property record '{}'",
            line
        ))),
    }
}

/// Encode a property map as a length-prefixed block including the
/// terminating `PROPS-END` line.
pub(crate) fn encode_props(props: &PropertyMap) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in props {
        match value {
            Some(value) => {
                out.extend_from_slice(format!("K {}\n", key.len()).as_bytes());
                out.extend_from_slice(key.as_bytes());
                out.push(b'\n');
                out.extend_from_slice(format!("V {}\n", value.len()).as_bytes());
                out.extend_from_slice(value);
                out.push(b'\n');
            }
            None => {
                out.extend_from_slice(format!("D {}\n", key.len()).as_bytes());
                out.extend_from_slice(key.as_bytes());
                out.push(b'\n');
            }
        }
    }
    out.extend_from_slice(PROPS_END.as_bytes());
    out.push(b'\n');
    out
}

/// Copy exactly `length` bytes from `src` to `dst` in fixed-size chunks,
/// never materializing the whole payload.
pub(crate) fn copy_text(src: &mut dyn Read, dst: &mut dyn Write, length: u64) -> Result<()> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut remaining = length;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = src.read(&mut buf[..want])?;
        if n == 0 {
            return Err(DumpError::format(format!(
                "text source ended {} bytes early",
                remaining
            )));
        }
        dst.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}
