use clap::Parser;
use std::path::PathBuf;

use wasteland_cli::{or_exit, parse_args, setup, LogLevel};
use wasteland_core::{remap_transitions, RemapSettings};

/// Wasteland transition setter.
///
/// Each op has the form `<from>,<to> <- <from>,<to>`: the transitions in
/// the first location leading to the second are pointed wherever the
/// transition on the right leads. Pairs may also be given as logged, e.g.
/// `[3 RANGER], [4 QUARTZ]`.
#[derive(Debug, Parser)]
#[command(name = "wltset", version)]
struct Args {
    /// Path of the Wasteland directory.
    #[arg(short, long)]
    path: PathBuf,

    #[arg(short, long, value_enum, default_value_t = LogLevel::Warn)]
    loglevel: LogLevel,

    #[arg(value_name = "OP", required = true, num_args = 1..)]
    ops: Vec<String>,
}

fn main() {
    let args: Args = parse_args();
    setup(args.loglevel);

    let settings = RemapSettings {
        dir: args.path,
        op_strings: args.ops,
    };
    or_exit(remap_transitions(&settings));
}
