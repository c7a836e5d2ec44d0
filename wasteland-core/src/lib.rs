use thiserror::Error;

pub mod cheat;
pub mod decode;
pub mod defs;
pub mod dump;
pub mod modify;
pub mod msq;
pub mod repository;
pub mod strings;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
pub mod transform;
pub mod transitions;
pub mod world;

pub use cheat::{run_cheats, CheatSettings, RosterSchema};
pub use decode::CodecError;
pub use dump::{dump_games, DumpSettings, DumpSummary};
pub use msq::MsqError;
pub use repository::Repository;
pub use transform::{OpParseError, TransformOp};
pub use transitions::transition_report;
pub use world::{remap_transitions, RemapSettings};

#[derive(Debug, Error)]
pub enum WastelandError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("game file error: {0}")]
    Msq(#[from] MsqError),

    #[error("format error: {0}")]
    Format(String),

    #[error("{0}")]
    Codec(#[from] CodecError),

    #[error("failed to decode block {partition},{block}: {source}")]
    BlockCodec {
        partition: usize,
        block: usize,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    OpParse(#[from] OpParseError),

    #[error("remap failed: {0}")]
    Remap(String),

    #[error("cheat failed: {0}")]
    Cheat(String),

    #[error("failed to commit world state to block {partition},{block}: {source}")]
    Commit {
        partition: usize,
        block: usize,
        #[source]
        source: CodecError,
    },
}

impl WastelandError {
    pub(crate) fn block_codec(partition: usize, block: usize, source: CodecError) -> Self {
        WastelandError::BlockCodec {
            partition,
            block,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, WastelandError>;
