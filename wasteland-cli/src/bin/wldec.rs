use clap::Parser;
use std::path::PathBuf;

use wasteland_cli::{or_exit, parse_args, setup, LogLevel};
use wasteland_core::{dump_games, DumpSettings};

/// Dump every block of a Wasteland save, decoding map blocks as far as
/// their structure allows.
#[derive(Debug, Parser)]
#[command(name = "wldec", version)]
struct Args {
    /// Directory holding GAME1 and GAME2.
    wl_dir: PathBuf,

    /// Where the per-block directories are written.
    out_dir: PathBuf,

    #[arg(short, long, value_enum, default_value_t = LogLevel::Info)]
    loglevel: LogLevel,
}

fn main() {
    let args: Args = parse_args();
    setup(args.loglevel);

    let settings = DumpSettings {
        in_dir: args.wl_dir,
        out_dir: args.out_dir,
    };
    let summary = or_exit(dump_games(&settings));

    if summary.undecodable() > 0 {
        eprintln!(
            "{} map blocks could not be decoded; raw sections were still written",
            summary.undecodable()
        );
    }
}
