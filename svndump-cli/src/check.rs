//! `svndump check`: full-stream validation scan

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use svndump_core::{DumpReader, NodeHistory};
use tracing::info;

/// Returns `true` when the scan produced findings.
pub fn run(path: &Path, json: bool) -> Result<bool> {
    let file =
        File::open(path).with_context(|| format!("cannot open dump file '{}'", path.display()))?;
    let mut dump = DumpReader::open(BufReader::new(file))
        .with_context(|| format!("cannot read '{}'", path.display()))?;

    let mut history = NodeHistory::new();
    history.set_check_actions(true);
    history.set_check_dates(true);
    history.set_check_md5(true);

    let mut revisions = 0u64;
    while dump.read_next_rev()? {
        history.scan_revision(&mut dump)?;
        revisions += 1;
    }
    dump.close();
    info!(dump = %path.display(), revisions, findings = history.error_count(), "scan finished");

    if json {
        println!("{}", serde_json::to_string_pretty(history.all_errors())?);
    } else {
        for (rev, findings) in history.all_errors() {
            for finding in findings {
                println!("r{}: {}", rev, finding);
            }
        }
        if history.has_errors() {
            println!(
                "{} problems in {} of {} revisions",
                history.error_count(),
                history.all_errors().len(),
                revisions
            );
        } else {
            println!("no problems found in {} revisions", revisions);
        }
    }
    Ok(history.has_errors())
}
