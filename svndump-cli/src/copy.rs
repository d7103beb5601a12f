//! `svndump copy`: read-transform-write loop over a whole dump file

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use svndump_core::{DumpReader, DumpWriter};
use tracing::info;
use uuid::Uuid;

pub fn run(src: &Path, dst: &Path, new_uuid: bool) -> Result<()> {
    let file =
        File::open(src).with_context(|| format!("cannot open dump file '{}'", src.display()))?;
    let mut reader = DumpReader::open(BufReader::new(file))
        .with_context(|| format!("cannot read '{}'", src.display()))?;
    let out = BufWriter::new(
        File::create(dst).with_context(|| format!("cannot create '{}'", dst.display()))?,
    );

    let minted = new_uuid.then(|| Uuid::new_v4().to_string());

    if !reader.read_next_rev()? {
        // revisionless dump, header only
        let uuid = minted.or_else(|| reader.uuid().map(str::to_string));
        DumpWriter::create_from_rev(out, uuid.as_deref(), 1)?.close()?;
        println!("copied 0 revisions");
        return Ok(());
    }

    let genesis = reader.rev_nr() == 0;
    let (mut writer, mut has_rev) =
        DumpWriter::create_like(out, &mut reader, minted.as_deref())?;
    let mut copied = if genesis { 1u64 } else { 0 };
    while has_rev {
        writer.add_rev_from(&mut reader)?;
        copied += 1;
        has_rev = reader.read_next_rev()?;
    }
    writer.close()?;
    reader.close();

    info!(src = %src.display(), dst = %dst.display(), revisions = copied, "copy finished");
    println!("copied {} revisions", copied);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use svndump_core::{Node, NodeAction, NodeKind, PropertyMap, SVN_PROP_LOG};
    use tempfile::TempDir;

    const UUID: &str = "0fb8d742-6a0c-4db9-9cc1-1ae58e5bd0f5";

    fn write_source(path: &Path) {
        let file = File::create(path).unwrap();
        let mut writer =
            DumpWriter::create_with_rev_0(file, Some(UUID), "2020-01-01T00:00:00.000000Z")
                .unwrap();
        let mut props = PropertyMap::new();
        props.insert(SVN_PROP_LOG.to_string(), Some(b"add trunk".to_vec()));
        writer.add_rev(props).unwrap();
        writer
            .add_node(&Node::new("trunk", NodeAction::Add, NodeKind::Dir), None)
            .unwrap();
        writer.close().unwrap();
    }

    fn open(path: &Path) -> DumpReader<BufReader<File>> {
        DumpReader::open(BufReader::new(File::open(path).unwrap())).unwrap()
    }

    #[test]
    fn copy_round_trips_a_dump_file() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.dump");
        let dst = tmp.path().join("dst.dump");
        write_source(&src);
        run(&src, &dst, false).unwrap();

        let mut copied = open(&dst);
        assert_eq!(copied.uuid(), Some(UUID));
        assert!(copied.read_next_rev().unwrap());
        assert_eq!(copied.rev_nr(), 0);
        assert!(copied.read_next_rev().unwrap());
        assert_eq!(copied.rev_nr(), 1);
        assert_eq!(copied.rev_log(), "add trunk");
        assert_eq!(copied.node_count(), 1);
        assert!(!copied.read_next_rev().unwrap());
    }

    #[test]
    fn copy_can_mint_a_fresh_uuid() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.dump");
        let dst = tmp.path().join("dst.dump");
        write_source(&src);
        run(&src, &dst, true).unwrap();

        let copied = open(&dst);
        let uuid = copied.uuid().unwrap().to_string();
        assert_ne!(uuid, UUID);
        assert!(Uuid::parse_str(&uuid).is_ok());
    }
}
