use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use wasteland_cli::{or_exit, parse_args, setup, LogLevel};
use wasteland_core::{run_cheats, CheatSettings, RosterSchema};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Schema {
    Standard,
    Extended,
}

impl From<Schema> for RosterSchema {
    fn from(s: Schema) -> Self {
        match s {
            Schema::Standard => RosterSchema::Standard,
            Schema::Extended => RosterSchema::Extended,
        }
    }
}

/// Turn off random encounters and max out the party.
#[derive(Debug, Parser)]
#[command(name = "wlcheat", version)]
struct Args {
    /// Directory holding GAME1 and GAME2.
    wl_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Schema::Standard)]
    roster_schema: Schema,

    #[arg(short, long, value_enum, default_value_t = LogLevel::Warn)]
    loglevel: LogLevel,
}

fn main() {
    let args: Args = parse_args();
    setup(args.loglevel);

    or_exit(run_cheats(&CheatSettings {
        dir: args.wl_dir,
        roster_schema: args.roster_schema.into(),
    }));
}
