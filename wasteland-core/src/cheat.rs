use std::path::PathBuf;

use log::{debug, info};

use crate::decode::decode_block;
use crate::defs::{MapDimension, PARTY_ROSTER_BLOCK};
use crate::modify::BlockModifier;
use crate::repository::Repository;
use crate::{Result, WastelandError};

const MAX_ATTRIBUTE: u8 = 0x7f;
const MAX_LEVEL: u8 = 15;
const INVENTORY_SLOTS: usize = 50;

/// Which party roster layout the save uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RosterSchema {
    #[default]
    Standard,
    /// Saves from the later release carry an eighth attribute.
    Extended,
}

/// Offsets of the patched fields inside the roster block's encrypted
/// section, for the first member. Later members follow at `stride`.
#[derive(Clone, Copy, Debug)]
pub struct RosterLayout {
    pub stride: usize,
    pub members: usize,
    pub attributes: &'static [usize],
    pub level: usize,
    pub inventory: usize,
}

const STANDARD_ATTRIBUTES: [usize; 7] = [0x10e, 0x10f, 0x110, 0x111, 0x112, 0x113, 0x114];
const EXTENDED_ATTRIBUTES: [usize; 8] = [0x10e, 0x10f, 0x110, 0x111, 0x112, 0x113, 0x114, 0x120];

impl RosterSchema {
    pub fn layout(self) -> RosterLayout {
        let attributes: &'static [usize] = match self {
            RosterSchema::Standard => &STANDARD_ATTRIBUTES,
            RosterSchema::Extended => &EXTENDED_ATTRIBUTES,
        };
        RosterLayout {
            stride: 0x100,
            members: 4,
            attributes,
            level: 0x11a,
            inventory: 0x1bd,
        }
    }
}

impl RosterLayout {
    /// Every `(offset, value)` the roster patch writes.
    pub fn patch(&self) -> Vec<(usize, u8)> {
        let mut writes = Vec::new();
        for member in 0..self.members {
            let base = member * self.stride;
            writes.extend(self.attributes.iter().map(|&off| (base + off, MAX_ATTRIBUTE)));
            writes.push((base + self.level, MAX_LEVEL));
            writes.extend(
                (0..INVENTORY_SLOTS).map(|slot| (base + self.inventory + slot, slot as u8)),
            );
        }
        writes
    }
}

fn zero_partition_encounters(repo: &mut Repository, partition: usize) -> Result<usize> {
    let count = repo.partition(partition).map_block_count();

    for i in 0..count {
        let dim: MapDimension = repo.partition(partition).map_dim(i).ok_or_else(|| {
            WastelandError::Format(format!("no map dimension for block {},{}", partition, i))
        })?;
        let block = repo.block(partition, i).cloned().ok_or_else(|| {
            WastelandError::Format(format!("block {},{} is missing", partition, i))
        })?;

        let mut db =
            decode_block(&block, dim).map_err(|e| WastelandError::block_codec(partition, i, e))?;
        db.map_info.encounter_freq = 0;

        let mut m = BlockModifier::new(block, dim)
            .map_err(|e| WastelandError::block_codec(partition, i, e))?;
        m.replace_map_info(&db.map_info)
            .map_err(|e| WastelandError::block_codec(partition, i, e))?;

        if let Some(slot) = repo.block_mut(partition, i) {
            *slot = m.into_block();
        }
        debug!("block {},{}: encounter frequency zeroed", partition, i);
    }

    Ok(count)
}

/// Set the random encounter frequency of every map block to zero.
pub fn zero_encounter_frequency(repo: &mut Repository) -> Result<usize> {
    let mut blocks = 0;
    for partition in 0..repo.partitions.len() {
        blocks += zero_partition_encounters(repo, partition)?;
    }
    info!("zeroed encounter frequency in {} map blocks", blocks);
    Ok(blocks)
}

/// Max out every party member's attributes and level and fill their
/// inventory.
pub fn max_party_roster(repo: &mut Repository, schema: RosterSchema) -> Result<()> {
    let writes = schema.layout().patch();
    let block = repo.block_mut(0, PARTY_ROSTER_BLOCK).ok_or_else(|| {
        WastelandError::Cheat(format!("GAME1 has no party roster block {}", PARTY_ROSTER_BLOCK))
    })?;

    let enc = &mut block.body.enc_section;
    // Check everything first so a short block is left as it was.
    if let Some(&(off, _)) = writes.iter().find(|(off, _)| *off >= enc.len()) {
        return Err(WastelandError::Cheat(format!(
            "roster offset {:#x} is outside the {:#x}-byte roster block",
            off,
            enc.len()
        )));
    }

    for (off, value) in writes {
        enc[off] = value;
    }

    info!("patched party roster ({:?} layout)", schema);
    Ok(())
}

pub struct CheatSettings {
    pub dir: PathBuf,
    pub roster_schema: RosterSchema,
}

/// Apply both cheats to the game in `settings.dir` and write it back.
pub fn run_cheats(settings: &CheatSettings) -> Result<()> {
    let mut repo = Repository::read_dir(&settings.dir)?;
    zero_encounter_frequency(&mut repo)?;
    max_party_roster(&mut repo, settings.roster_schema)?;
    repo.write_dir(&settings.dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::carve_block;
    use crate::defs::PARTITION_COUNT;
    use crate::testkit::{
        corrupt_map_block, roster_block, sample_game_dir, sample_repository, scratch_dir,
    };
    use std::fs;
    use crate::world::WorldState;

    #[test]
    fn encounter_cheat_zeroes_every_map_block_and_nothing_else() {
        let mut repo = sample_repository();
        let original = repo.clone();
        assert_eq!(zero_encounter_frequency(&mut repo).unwrap(), 42);

        let before = WorldState::decode(&original).unwrap();
        let after = WorldState::decode(&repo).unwrap();
        for p in 0..PARTITION_COUNT {
            let partition = repo.partition(p);
            for (b, block) in partition.blocks.iter().enumerate() {
                let old = &original.partition(p).blocks[b];
                if !partition.is_map_block(b) {
                    assert_eq!(block, old);
                    continue;
                }

                let db = &after.partitions[p][b];
                assert_eq!(db.map_info.encounter_freq, 0);
                let mut expected = before.partitions[p][b].clone();
                expected.map_info.encounter_freq = 0;
                assert_eq!(db, &expected);

                let freq_at = carve_block(old, partition.map_dim(b).unwrap())
                    .unwrap()
                    .offsets
                    .map_info
                    + 1;
                for (i, (x, y)) in old.enc_section().iter().zip(block.enc_section()).enumerate() {
                    if i != freq_at {
                        assert_eq!(x, y, "block {p},{b} byte {i:#x}");
                    }
                }
                assert_eq!(block.plain_section(), old.plain_section());
            }
        }
    }

    #[test]
    fn roster_patch_writes_all_four_members() {
        let mut repo = sample_repository();
        let original = roster_block();
        max_party_roster(&mut repo, RosterSchema::Standard).unwrap();
        let enc = repo.block(0, PARTY_ROSTER_BLOCK).unwrap().enc_section();

        for member in 0..4 {
            let base = member * 0x100;
            for off in 0x10e..=0x114 {
                assert_eq!(enc[base + off], 0x7f);
            }
            assert_eq!(enc[base + 0x11a], 15);
            for slot in 0..50 {
                assert_eq!(enc[base + 0x1bd + slot], slot as u8);
            }
            // Outside the patch the roster is untouched.
            assert_eq!(enc[base + 0x115], original.enc_section()[base + 0x115]);
            assert_eq!(enc[base + 0x120], original.enc_section()[base + 0x120]);
            assert_eq!(enc[base + 0x1ef], original.enc_section()[base + 0x1ef]);
        }
        assert_eq!(enc[0x10d], original.enc_section()[0x10d]);
    }

    #[test]
    fn extended_schema_also_patches_the_eighth_attribute() {
        let mut repo = sample_repository();
        max_party_roster(&mut repo, RosterSchema::Extended).unwrap();
        let enc = repo.block(0, PARTY_ROSTER_BLOCK).unwrap().enc_section();
        for member in 0..4 {
            assert_eq!(enc[member * 0x100 + 0x120], 0x7f);
        }
    }

    #[test]
    fn short_roster_block_is_an_error_and_left_unchanged() {
        let mut repo = sample_repository();
        let roster = repo.block_mut(0, PARTY_ROSTER_BLOCK).unwrap();
        roster.body.enc_section.truncate(0x300);
        let before = roster.clone();

        let err = max_party_roster(&mut repo, RosterSchema::Standard).unwrap_err();
        assert!(matches!(err, WastelandError::Cheat(_)));
        assert_eq!(repo.block(0, PARTY_ROSTER_BLOCK).unwrap(), &before);
    }

    #[test]
    fn run_cheats_writes_the_game_back() {
        let (dir, _) = sample_game_dir("cheat-run");
        run_cheats(&CheatSettings {
            dir: dir.clone(),
            roster_schema: RosterSchema::Standard,
        })
        .unwrap();

        let repo = Repository::read_dir(&dir).unwrap();
        let state = WorldState::decode(&repo).unwrap();
        assert!(state
            .partitions
            .iter()
            .flatten()
            .all(|db| db.map_info.encounter_freq == 0));
        assert_eq!(repo.block(0, PARTY_ROSTER_BLOCK).unwrap().enc_section()[0x10e], 0x7f);
    }

    #[test]
    fn undecodable_map_block_fails_cheats_and_writes_nothing() {
        let mut repo = sample_repository();
        corrupt_map_block(&mut repo, 1, 9);
        let dir = scratch_dir("cheat-undecodable");
        repo.write_dir(&dir).unwrap();
        let game1 = fs::read(dir.join("GAME1")).unwrap();
        let game2 = fs::read(dir.join("GAME2")).unwrap();

        let err = run_cheats(&CheatSettings {
            dir: dir.clone(),
            roster_schema: RosterSchema::Standard,
        })
        .unwrap_err();
        assert!(matches!(err, WastelandError::BlockCodec { partition: 1, block: 9, .. }));
        assert_eq!(fs::read(dir.join("GAME1")).unwrap(), game1);
        assert_eq!(fs::read(dir.join("GAME2")).unwrap(), game2);
    }
}
