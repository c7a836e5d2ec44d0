use clap::Parser;
use std::path::PathBuf;

use wasteland_cli::{or_exit, parse_args, setup, LogLevel};
use wasteland_core::{transition_report, Repository};

/// Print every map transition of a Wasteland save as JSON.
#[derive(Debug, Parser)]
#[command(name = "wltransloc", version)]
struct Args {
    /// Directory holding GAME1 and GAME2.
    wl_dir: PathBuf,

    #[arg(short, long, value_enum, default_value_t = LogLevel::Info)]
    loglevel: LogLevel,
}

fn main() {
    let args: Args = parse_args();
    setup(args.loglevel);

    let repo = or_exit(Repository::read_dir(&args.wl_dir));
    let report = or_exit(transition_report(&repo));
    println!("{}", or_exit(serde_json::to_string_pretty(&report)));
}
