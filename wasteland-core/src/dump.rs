use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::decode::{
    carve_block, decode_block, decode_central_dir, map_data_len, CENTRAL_DIR_LEN,
};
use crate::defs::MapDimension;
use crate::msq::Block;
use crate::repository::Repository;
use crate::Result;

pub struct DumpSettings {
    pub in_dir: PathBuf,
    pub out_dir: PathBuf,
}

/// Decode strategies, tried in order until one exports something.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpStage {
    /// Full decode of every section.
    Full,
    /// Carve only: region offsets and the central directory.
    Partial,
    /// The central directory read at its fixed position.
    Minimal,
}

impl DumpStage {
    pub const ALL: [DumpStage; 3] = [DumpStage::Full, DumpStage::Partial, DumpStage::Minimal];
}

impl fmt::Display for DumpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DumpStage::Full => "full",
            DumpStage::Partial => "partial",
            DumpStage::Minimal => "minimal",
        };
        f.write_str(name)
    }
}

/// Result of one stage that did not hit a hard error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    Exported,
    /// The stage could not decode the block; the reason is kept for the report.
    Degraded(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockReport {
    pub partition: usize,
    pub block: usize,
    pub map_block: bool,
    /// Stage that exported the block; `None` for opaque or undecodable blocks.
    pub stage: Option<DumpStage>,
    pub degradations: Vec<String>,
    pub failed_steps: Vec<String>,
}

impl BlockReport {
    pub fn undecodable(&self) -> bool {
        self.map_block && self.stage.is_none()
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DumpSummary {
    pub blocks: Vec<BlockReport>,
}

impl DumpSummary {
    pub fn block(&self, partition: usize, block: usize) -> Option<&BlockReport> {
        self.blocks
            .iter()
            .find(|r| r.partition == partition && r.block == block)
    }

    pub fn count_at(&self, stage: DumpStage) -> usize {
        self.blocks.iter().filter(|r| r.stage == Some(stage)).count()
    }

    pub fn undecodable(&self) -> usize {
        self.blocks.iter().filter(|r| r.undecodable()).count()
    }
}

pub fn block_dir_name(partition: usize, block: usize) -> String {
    format!("g{}b{:02}", partition, block)
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, file: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(dir.join(file), json)?;
    Ok(())
}

// Runs export steps for one block; a failing step is logged and recorded
// and the next one still runs.
struct Exporter<'a> {
    dir: &'a Path,
    partition: usize,
    block: usize,
    failed: &'a mut Vec<String>,
}

impl Exporter<'_> {
    fn step(&mut self, name: &str, f: impl FnOnce(&Path) -> Result<()>) {
        match f(self.dir) {
            Ok(()) => debug!("block {},{}: exported {}", self.partition, self.block, name),
            Err(e) => {
                warn!(
                    "block {},{}: failed to export {}: {}",
                    self.partition, self.block, name, e
                );
                self.failed.push(name.to_string());
            }
        }
    }
}

fn run_stage(
    stage: DumpStage,
    block: &Block,
    dim: MapDimension,
    dir: &Path,
    failed: &mut Vec<String>,
) -> Result<StageOutcome> {
    let mut ex = Exporter {
        dir,
        partition: block.partition(),
        block: block.index(),
        failed,
    };

    match stage {
        DumpStage::Full => {
            let decoded = carve_block(block, dim)
                .and_then(|carved| Ok((carved, decode_block(block, dim)?)));
            let (carved, db) = match decoded {
                Ok(both) => both,
                Err(e) => return Ok(StageOutcome::Degraded(e.to_string())),
            };

            ex.step("offsets", |d| write_json(d, "offsets.json", &carved.offsets));
            ex.step("sizes", |d| write_json(d, "sizes.json", &carved.sizes()));
            ex.step("mapdata", |d| Ok(fs::write(d.join("mapdata.txt"), db.map_data.render())?));
            ex.step("centraldir", |d| write_json(d, "centraldir.json", &db.central_dir));
            ex.step("mapinfo", |d| write_json(d, "mapinfo.json", &db.map_info));
            ex.step("transitions", |d| write_json(d, "transitions.json", &db.transitions));
            ex.step("loots", |d| write_json(d, "loots.json", &db.loots));
            if let Some(npcs) = &db.npcs {
                ex.step("npcs", |d| write_json(d, "npcs.json", npcs));
            }
            ex.step("monsternames", |d| write_json(d, "monsternames.json", &db.monster_names));
            ex.step("monsterdata", |d| write_json(d, "monsterdata.json", &db.monster_data));
            ex.step("stringsarea", |d| write_json(d, "stringsarea.json", &db.strings_area));
            ex.step("strings", |d| {
                let strings = db.strings_area.to_strings()?;
                write_json(d, "strings.json", &strings)
            });
        }
        DumpStage::Partial => {
            let carved = match carve_block(block, dim) {
                Ok(carved) => carved,
                Err(e) => return Ok(StageOutcome::Degraded(e.to_string())),
            };

            ex.step("offsets", |d| write_json(d, "offsets.json", &carved.offsets));
            ex.step("sizes", |d| write_json(d, "sizes.json", &carved.sizes()));
            ex.step("centraldir", |d| {
                let cd = decode_central_dir(&carved.central_dir)?;
                write_json(d, "centraldir.json", &cd)
            });
        }
        DumpStage::Minimal => {
            let start = map_data_len(dim);
            let window = block.enc_section().get(start..).unwrap_or(&[]);
            let window = &window[..window.len().min(CENTRAL_DIR_LEN)];
            let cd = match decode_central_dir(window) {
                Ok(cd) => cd,
                Err(e) => return Ok(StageOutcome::Degraded(e.to_string())),
            };

            ex.step("centraldir", |d| write_json(d, "centraldir.json", &cd));
        }
    }

    Ok(StageOutcome::Exported)
}

/// Export one block into `<out_dir>/g<p>b<ii>/`. Raw sections and
/// `meta.json` are always written; map blocks (`dim` given) then go through
/// [`DumpStage::ALL`] until a stage exports.
pub fn dump_block(block: &Block, dim: Option<MapDimension>, out_dir: &Path) -> Result<BlockReport> {
    let (partition, index) = (block.partition(), block.index());
    let dir = out_dir.join(block_dir_name(partition, index));
    fs::create_dir_all(&dir)?;

    fs::write(dir.join("encsection.bin"), block.enc_section())?;
    fs::write(dir.join("plainsection.bin"), block.plain_section())?;
    write_json(&dir, "meta.json", &block.meta(dim.is_some()))?;

    let mut report = BlockReport {
        partition,
        block: index,
        map_block: dim.is_some(),
        stage: None,
        degradations: Vec::new(),
        failed_steps: Vec::new(),
    };

    let dim = match dim {
        Some(dim) => dim,
        None => {
            debug!("block {},{}: not a map block, raw sections only", partition, index);
            return Ok(report);
        }
    };

    for stage in DumpStage::ALL {
        match run_stage(stage, block, dim, &dir, &mut report.failed_steps)? {
            StageOutcome::Exported => {
                report.stage = Some(stage);
                break;
            }
            StageOutcome::Degraded(reason) => {
                warn!("block {},{}: {} decode failed: {}", partition, index, stage, reason);
                report.degradations.push(format!("{}: {}", stage, reason));
            }
        }
    }

    match report.stage {
        Some(stage) => info!("block {},{}: dumped ({} decode)", partition, index, stage),
        None => error!("block {},{}: undecodable, raw sections only", partition, index),
    }

    Ok(report)
}

/// Dump every block of both partitions.
pub fn dump_repository(repo: &Repository, out_dir: &Path) -> Result<DumpSummary> {
    fs::create_dir_all(out_dir)?;

    let mut summary = DumpSummary::default();
    for partition in &repo.partitions {
        for (i, block) in partition.blocks.iter().enumerate() {
            let dim = if partition.is_map_block(i) {
                partition.map_dim(i)
            } else {
                None
            };
            summary.blocks.push(dump_block(block, dim, out_dir)?);
        }
    }

    Ok(summary)
}

/// Read the game directory and dump it.
pub fn dump_games(settings: &DumpSettings) -> Result<DumpSummary> {
    info!(
        "dumping {} into {}",
        settings.in_dir.display(),
        settings.out_dir.display()
    );
    let repo = Repository::read_dir(&settings.in_dir)?;
    let summary = dump_repository(&repo, &settings.out_dir)?;

    info!(
        "dumped {} blocks: {} full, {} partial, {} minimal, {} undecodable",
        summary.blocks.len(),
        summary.count_at(DumpStage::Full),
        summary.count_at(DumpStage::Partial),
        summary.count_at(DumpStage::Minimal),
        summary.undecodable()
    );
    Ok(summary)
}
