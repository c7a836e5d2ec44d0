use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::defs::{map_dim, MapDimension, GAME_FILE_NAMES, MAP_BLOCK_COUNTS, PARTITION_COUNT};
use crate::msq::{parse_game, serialize_game, Block};
use crate::{Result, WastelandError};

/// One game file's blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GamePartition {
    pub index: usize,
    pub blocks: Vec<Block>,
}

impl GamePartition {
    pub fn map_block_count(&self) -> usize {
        MAP_BLOCK_COUNTS[self.index]
    }

    pub fn is_map_block(&self, block: usize) -> bool {
        block < self.map_block_count()
    }

    pub fn map_blocks(&self) -> &[Block] {
        &self.blocks[..self.map_block_count()]
    }

    pub fn map_dim(&self, block: usize) -> Option<MapDimension> {
        map_dim(self.index, block)
    }
}

/// Both game partitions, held fully in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repository {
    pub partitions: [GamePartition; PARTITION_COUNT],
}

impl Repository {
    pub fn new(game1: Vec<Block>, game2: Vec<Block>) -> Result<Repository> {
        let partitions = [
            GamePartition {
                index: 0,
                blocks: game1,
            },
            GamePartition {
                index: 1,
                blocks: game2,
            },
        ];

        for p in &partitions {
            if p.blocks.len() < p.map_block_count() {
                return Err(WastelandError::Format(format!(
                    "{} holds {} blocks, expected at least {} map blocks",
                    GAME_FILE_NAMES[p.index],
                    p.blocks.len(),
                    p.map_block_count()
                )));
            }
        }

        Ok(Repository { partitions })
    }

    /// Read and parse both game files. Nothing is returned unless both parse.
    pub fn read_dir(dir: &Path) -> Result<Repository> {
        let mut games = Vec::with_capacity(PARTITION_COUNT);
        for (partition, name) in GAME_FILE_NAMES.iter().enumerate() {
            let path = find_game_file(dir, name)?;
            let raw = fs::read(&path)?;
            let blocks = parse_game(partition, &raw)?;
            info!("read {} blocks from {}", blocks.len(), path.display());
            games.push(blocks);
        }

        let game2 = games.pop().unwrap_or_default();
        let game1 = games.pop().unwrap_or_default();
        Repository::new(game1, game2)
    }

    /// Serialize both partitions, then replace each game file through a
    /// temp file and rename.
    pub fn write_dir(&self, dir: &Path) -> Result<()> {
        let mut outputs = Vec::with_capacity(PARTITION_COUNT);
        for p in &self.partitions {
            let name = GAME_FILE_NAMES[p.index];
            let path = find_game_file(dir, name).unwrap_or_else(|_| dir.join(name));
            outputs.push((path, serialize_game(&p.blocks)));
        }

        for (path, bytes) in outputs {
            let mut tmp = path.clone().into_os_string();
            tmp.push(".tmp");
            let tmp = PathBuf::from(tmp);
            fs::write(&tmp, &bytes)?;
            fs::rename(&tmp, &path)?;
            info!("wrote {} bytes to {}", bytes.len(), path.display());
        }

        Ok(())
    }

    pub fn partition(&self, partition: usize) -> &GamePartition {
        &self.partitions[partition]
    }

    pub fn block(&self, partition: usize, block: usize) -> Option<&Block> {
        self.partitions.get(partition)?.blocks.get(block)
    }

    pub fn block_mut(&mut self, partition: usize, block: usize) -> Option<&mut Block> {
        self.partitions.get_mut(partition)?.blocks.get_mut(block)
    }
}

/// Locate `name` directly inside `dir`, ignoring ASCII case.
pub fn find_game_file(dir: &Path, name: &str) -> Result<PathBuf> {
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            WastelandError::Format(format!("failed to list {}: {}", dir.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            debug!("found {} at {}", name, entry.path().display());
            return Ok(entry.into_path());
        }
    }

    Err(WastelandError::Format(format!(
        "could not find {} under {}",
        name,
        dir.display()
    )))
}
