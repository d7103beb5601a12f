//! Integration tests for the on-disk dump cycle (write/read/copy/diff)

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use md5::{Digest, Md5};
use tempfile::TempDir;

use svndump_core::{
    DumpDiff, DumpReader, DumpWriter, Node, NodeAction, NodeHistory, NodeKind, PropertyMap,
    TextRef, SVN_PROP_AUTHOR, SVN_PROP_DATE, SVN_PROP_LOG,
};

const UUID: &str = "b2b0b073-4de3-4b75-a4a2-26bb4e2e1a34";
const BODY: &[u8] = b"first line\nsecond line\n";

fn rev_props(author: &str, log: &str, date: &str) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(SVN_PROP_AUTHOR.to_string(), Some(author.as_bytes().to_vec()));
    props.insert(SVN_PROP_LOG.to_string(), Some(log.as_bytes().to_vec()));
    props.insert(SVN_PROP_DATE.to_string(), Some(date.as_bytes().to_vec()));
    props
}

fn text_ref(body: &[u8]) -> TextRef {
    TextRef {
        offset: 0,
        length: body.len() as u64,
        md5: Some(hex::encode(Md5::digest(body))),
    }
}

/// Write a three-revision repository dump to disk.
fn write_test_dump(path: &Path) {
    let file = File::create(path).unwrap();
    let mut writer =
        DumpWriter::create_with_rev_0(file, Some(UUID), "2010-06-01T08:00:00.000000Z").unwrap();

    writer
        .add_rev(rev_props("alice", "create layout", "2010-06-01T08:15:00.000000Z"))
        .unwrap();
    writer
        .add_node(&Node::new("trunk", NodeAction::Add, NodeKind::Dir), None)
        .unwrap();
    writer
        .add_node(&Node::new("branches", NodeAction::Add, NodeKind::Dir), None)
        .unwrap();

    writer
        .add_rev(rev_props("bob", "add a file", "2010-06-02T09:00:00.000000Z"))
        .unwrap();
    let mut file_node = Node::new("trunk/notes.txt", NodeAction::Add, NodeKind::File);
    file_node.set_property("svn:eol-style", Some(b"native".to_vec()));
    file_node.text = Some(text_ref(BODY));
    writer.add_node(&file_node, Some(&mut &BODY[..])).unwrap();

    writer
        .add_rev(rev_props("alice", "branch it", "2010-06-03T10:00:00.000000Z"))
        .unwrap();
    let mut branch = Node::new("branches/b1", NodeAction::Add, NodeKind::Dir);
    branch.copy_from = Some(svndump_core::CopyFrom {
        path: "trunk".to_string(),
        rev: 2,
    });
    writer.add_node(&branch, None).unwrap();

    writer.close().unwrap();
}

fn open_dump(path: &Path) -> DumpReader<BufReader<File>> {
    DumpReader::open(BufReader::new(File::open(path).unwrap())).unwrap()
}

#[test]
fn written_dump_reads_back() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("test.dump");
    write_test_dump(&path);

    let mut dump = open_dump(&path);
    assert_eq!(dump.uuid(), Some(UUID));

    assert!(dump.read_next_rev().unwrap());
    assert_eq!(dump.rev_nr(), 0);
    assert_eq!(dump.node_count(), 0);
    assert_eq!(dump.rev_date_str(), "2010-06-01T08:00:00.000000Z");

    assert!(dump.read_next_rev().unwrap());
    assert_eq!(dump.rev_nr(), 1);
    assert_eq!(dump.rev_author(), "alice");
    assert_eq!(dump.rev_log(), "create layout");
    assert_eq!(dump.node_count(), 2);

    assert!(dump.read_next_rev().unwrap());
    assert_eq!(dump.rev_nr(), 2);
    let node = dump.node(0).clone();
    assert_eq!(node.path, "trunk/notes.txt");
    assert_eq!(node.text_length(), BODY.len() as u64);
    let mut text = Vec::new();
    std::io::Read::read_to_end(&mut dump.text_reader(&node).unwrap(), &mut text).unwrap();
    assert_eq!(text, BODY);

    assert!(dump.read_next_rev().unwrap());
    assert_eq!(dump.rev_nr(), 3);
    let branch = dump.node(0);
    let cf = branch.copy_from.as_ref().unwrap();
    assert_eq!(cf.path, "trunk");
    assert_eq!(cf.rev, 2);

    assert!(!dump.read_next_rev().unwrap());
}

#[test]
fn copied_dump_matches_the_original() {
    let tmp = TempDir::new().unwrap();
    let src_path = tmp.path().join("src.dump");
    let dst_path = tmp.path().join("dst.dump");
    write_test_dump(&src_path);

    let mut src = open_dump(&src_path);
    assert!(src.read_next_rev().unwrap());
    let out = File::create(&dst_path).unwrap();
    let (mut dst, mut has_rev) = DumpWriter::create_like(out, &mut src, None).unwrap();
    while has_rev {
        dst.add_rev_from(&mut src).unwrap();
        has_rev = src.read_next_rev().unwrap();
    }
    dst.close().unwrap();
    src.close();

    struct Fail;
    impl svndump_core::DiffHandler for Fail {
        fn rev_diff(&mut self, kind: svndump_core::DiffKind, v1: &str, v2: &str) {
            panic!("unexpected {} diff: '{}' vs '{}'", kind, v1, v2);
        }
    }
    let diffs = DumpDiff::new()
        .check_eol(true)
        .compare(&mut open_dump(&src_path), &mut open_dump(&dst_path), &mut Fail)
        .unwrap();
    assert_eq!(diffs, 0);
}

#[test]
fn full_scan_of_a_legal_dump_is_clean() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("test.dump");
    write_test_dump(&path);

    let mut dump = open_dump(&path);
    let mut history = NodeHistory::new();
    history.set_check_actions(true);
    history.set_check_dates(true);
    history.set_check_md5(true);
    while dump.read_next_rev().unwrap() {
        history.scan_revision(&mut dump).unwrap();
    }
    assert!(!history.has_errors(), "{:?}", history.all_errors());

    // the branch copy propagated the copied file
    assert_eq!(history.kind_at("branches/b1/notes.txt", 3), Some(NodeKind::File));
    assert_eq!(history.kind_at("branches/b1/notes.txt", 2), None);
}
