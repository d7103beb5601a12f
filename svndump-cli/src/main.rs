//! Dump file command line tool

mod check;
mod copy;
mod diff_cmd;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "svndump")]
#[command(version = "0.1.0")]
#[command(about = "Copy, validate and compare svn dump files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a dump file, rewriting it in canonical form
    Copy {
        /// Source dump file
        src: String,
        /// Destination dump file
        dst: String,
        /// Write a freshly generated repository UUID
        #[arg(long)]
        new_uuid: bool,
    },

    /// Compare two dump files revision by revision
    Diff {
        dump1: String,
        dump2: String,
        /// Treat line-ending-only text differences separately
        #[arg(long)]
        check_eol: bool,
        /// Suppress differences of this kind (repeatable)
        #[arg(long = "ignore", value_name = "KIND")]
        ignore: Vec<String>,
        /// Suppress differences of this revision property (repeatable)
        #[arg(long = "ignore-revprop", value_name = "NAME")]
        ignore_revprop: Vec<String>,
        /// Suppress differences of this node property (repeatable)
        #[arg(long = "ignore-property", value_name = "NAME")]
        ignore_property: Vec<String>,
        /// Print nothing, only set the exit code
        #[arg(short, long)]
        quiet: bool,
        /// Print revision progress while comparing
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a dump file: structure, dates and content digests
    Check {
        dump: String,
        /// Emit findings as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("svndump_core=info".parse().unwrap())
                .add_directive("svndump_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let failed = match cli.command {
        Commands::Copy { src, dst, new_uuid } => {
            copy::run(Path::new(&src), Path::new(&dst), new_uuid)?;
            false
        }

        Commands::Diff {
            dump1,
            dump2,
            check_eol,
            ignore,
            ignore_revprop,
            ignore_property,
            quiet,
            verbose,
        } => diff_cmd::run(
            Path::new(&dump1),
            Path::new(&dump2),
            &diff_cmd::Options {
                check_eol,
                ignore,
                ignore_revprop,
                ignore_property,
                quiet,
                verbose,
            },
        )?,

        Commands::Check { dump, json } => check::run(Path::new(&dump), json)?,
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
