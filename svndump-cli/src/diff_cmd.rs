//! `svndump diff`: compare two dump files and print a report

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use svndump_core::{
    DiffHandler, DiffKind, DiffSummary, DumpDiff, DumpReader, DumpSide, Node,
};

pub struct Options {
    pub check_eol: bool,
    pub ignore: Vec<String>,
    pub ignore_revprop: Vec<String>,
    pub ignore_property: Vec<String>,
    pub quiet: bool,
    pub verbose: bool,
}

/// Printing handler: filters through a [`DiffSummary`] and writes one
/// line per reported difference, prefixed with its revision/node context.
struct Printer {
    summary: DiffSummary,
    quiet: bool,
    verbose: bool,
    rev: u64,
    node: Option<String>,
}

impl Printer {
    fn new(options: &Options) -> Result<Self> {
        let mut summary = DiffSummary::new();
        for name in &options.ignore {
            match DiffKind::parse(name) {
                Some(kind) => summary.ignore_kind(kind),
                None => bail!(
                    "unknown difference kind '{}' (expected one of: {})",
                    name,
                    DiffKind::all()
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }
        }
        for name in &options.ignore_revprop {
            summary.ignore_revprop(name.clone());
        }
        for name in &options.ignore_property {
            summary.ignore_prop(name.clone());
        }
        Ok(Self {
            summary,
            quiet: options.quiet,
            verbose: options.verbose,
            rev: 0,
            node: None,
        })
    }

    fn context(&self) -> String {
        match &self.node {
            Some(path) => format!("r{} '{}'", self.rev, path),
            None => format!("r{}", self.rev),
        }
    }

    fn print(&self, kind: DiffKind, detail: &str) {
        if !self.quiet {
            println!("{}: {}: {}", self.context(), kind, detail);
        }
    }

    fn report(&mut self, kind: DiffKind, detail: &str) {
        if self.summary.record(kind) {
            self.print(kind, detail);
        }
    }

    fn print_summary(&self) {
        if self.quiet {
            return;
        }
        if self.summary.counts().is_empty() {
            println!("dump files are identical");
        } else {
            println!("differences found:");
            for (kind, count) in self.summary.counts() {
                println!("  {:<16} {}", kind.as_str(), count);
            }
            println!("  {:<16} {}", "total", self.summary.total());
            if self.summary.suppressed() > 0 {
                println!("  {:<16} {}", "suppressed", self.summary.suppressed());
            }
        }
    }
}

impl DiffHandler for Printer {
    fn next_revision(&mut self, rev: u64) {
        self.rev = rev;
        self.node = None;
        if self.verbose && !self.quiet {
            println!("comparing r{}", rev);
        }
    }

    fn next_node(&mut self, path: &str) {
        self.node = Some(path.to_string());
    }

    fn rev_diff(&mut self, kind: DiffKind, value1: &str, value2: &str) {
        self.node = None;
        self.report(kind, &format!("'{}' vs '{}'", value1, value2));
    }

    fn revprop_diff(&mut self, name: &str, value1: Option<&str>, value2: Option<&str>) {
        if self.summary.record_revprop(name) {
            self.print(
                DiffKind::RevProp,
                &format!(
                    "'{}': {:?} vs {:?}",
                    name,
                    value1.unwrap_or("<deleted>"),
                    value2.unwrap_or("<deleted>")
                ),
            );
        }
    }

    fn revprop_missing(&mut self, side: DumpSide, name: &str, _value: Option<&str>) {
        if self.summary.record_revprop(name) {
            self.print(DiffKind::RevProp, &format!("'{}' missing in {}", name, side));
        }
    }

    fn node_diff(&mut self, kind: DiffKind, value1: &str, value2: &str) {
        self.report(kind, &format!("'{}' vs '{}'", value1, value2));
    }

    fn prop_diff(&mut self, name: &str, value1: Option<&str>, value2: Option<&str>) {
        if self.summary.record_prop(name) {
            self.print(
                DiffKind::Prop,
                &format!(
                    "'{}': {:?} vs {:?}",
                    name,
                    value1.unwrap_or("<deleted>"),
                    value2.unwrap_or("<deleted>")
                ),
            );
        }
    }

    fn prop_missing(&mut self, side: DumpSide, name: &str, _value: Option<&str>) {
        if self.summary.record_prop(name) {
            self.print(DiffKind::Prop, &format!("'{}' missing in {}", name, side));
        }
    }

    fn node_missing(&mut self, side: DumpSide, node: &Node) {
        self.node = None;
        self.report(
            DiffKind::NodeMissing,
            &format!("{} '{}' has no counterpart in {}", node.action, node.path, side),
        );
    }

    fn wrong_md5(&mut self, side: DumpSide, advertised: &str, computed: &str) {
        self.report(
            DiffKind::WrongMd5,
            &format!("{} advertises {} but content hashes to {}", side, advertised, computed),
        );
    }

    fn text_diff(&mut self, kind: DiffKind) {
        self.report(kind, "text content differs");
    }

    fn stream_ended_early(&mut self, side: DumpSide, next_rev: u64) {
        self.node = None;
        self.report(
            DiffKind::RevNr,
            &format!("{} ends before r{}", side, next_rev),
        );
    }
}

fn open(path: &Path) -> Result<DumpReader<BufReader<File>>> {
    let file =
        File::open(path).with_context(|| format!("cannot open dump file '{}'", path.display()))?;
    DumpReader::open(BufReader::new(file))
        .with_context(|| format!("cannot read '{}'", path.display()))
}

/// Returns `true` when non-suppressed differences were found.
pub fn run(path1: &Path, path2: &Path, options: &Options) -> Result<bool> {
    let mut dump1 = open(path1)?;
    let mut dump2 = open(path2)?;
    let mut printer = Printer::new(options)?;

    DumpDiff::new()
        .check_eol(options.check_eol)
        .compare(&mut dump1, &mut dump2, &mut printer)?;

    printer.print_summary();
    Ok(printer.summary.reported() > 0)
}
