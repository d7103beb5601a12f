//! Dump stream processing library
//!
//! Streaming reader/writer for subversion dump files (format version 2)
//! plus the analyses built on top of them:
//! - Session types ([`DumpReader`], [`DumpWriter`]) with lazy node text
//! - Node model (actions, kinds, properties, copy-from, text references)
//! - Per-path history tracking and structural validation
//! - Structural and content comparison of two streams
//!
//! Node text is never buffered whole; reads hand out bounded sub-readers
//! and writes copy from caller-supplied byte sources in fixed chunks.

pub mod codec;
pub mod date;
pub mod diff;
pub mod error;
pub mod history;
pub mod node;
pub mod session;

pub use codec::FORMAT_VERSION;
pub use date::RevDate;
pub use diff::{
    compare_text, DiffHandler, DiffKind, DiffSummary, DumpDiff, DumpSide, TextCmp,
};
pub use error::{DumpError, Result};
pub use history::{Finding, HistoryRecord, Interval, NodeHistory};
pub use node::{
    is_valid_md5, CopyFrom, Node, NodeAction, NodeKind, PropertyMap, TextRef,
};
pub use session::{
    DumpReader, DumpWriter, TextReader, SVN_PROP_AUTHOR, SVN_PROP_DATE, SVN_PROP_LOG,
};
