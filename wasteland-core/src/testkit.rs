//! Deterministic synthetic game data for tests.

use std::fs;
use std::path::PathBuf;

use crate::decode::{
    header_len, map_data_len, CentralDir, Loot, LootItem, MapData, MapInfo, MonsterData, Npc,
    Transition,
};
use crate::defs::{
    map_dim, Location, MapDimension, ACTION_LOOT, ACTION_TRANSITION, LOCATIONS, MAP_BLOCK_COUNTS,
    PARTITION_COUNT, PARTY_ROSTER_BLOCK,
};
use crate::msq::Block;
use crate::repository::Repository;
use crate::strings::{compress_strings_area, CHAR_TABLE_LEN};

pub const TRANSITION_TEST_DIM: MapDimension = MapDimension::new(8, 8);

pub const ROSTER_LEN: usize = 0x600;

pub const CHAR_TABLE: [u8; CHAR_TABLE_LEN] =
    *b" abcdefghijklmnopqrstuvwxyz.,'ABCDEFGHIJKLMNOPQRSTUVWXYZ!?-:";

/// Everything that goes into one synthetic map block.
#[derive(Clone, Debug)]
pub struct MapBlockSpec {
    pub dim: MapDimension,
    pub map_data: MapData,
    pub map_info: MapInfo,
    pub transitions: Vec<Option<Transition>>,
    pub loots: Vec<Option<Loot>>,
    pub monster_names: Vec<String>,
    pub monster_data: Vec<MonsterData>,
    pub npcs: Option<Vec<Option<Npc>>>,
    pub strings: Vec<&'static str>,
    pub tile_map: Vec<u8>,
}

impl MapBlockSpec {
    /// A block whose own location id is `seed`.
    ///
    /// Selector 0 leads to the partition's world map and is placed twice,
    /// selector 1 is null, selector 2 leads to location `seed + 1` and is
    /// placed once, selector 3 leads to `seed + 2` and is not placed.
    pub fn sample(dim: MapDimension, seed: usize) -> MapBlockSpec {
        let n = LOCATIONS.len();
        let home = Location((seed % n) as u8);
        let world = home
            .address()
            .and_then(|(partition, _)| Location::for_block(partition, 0))
            .unwrap_or(Location(0));

        let mut map_data = MapData::new(dim);
        for y in 0..dim.height {
            for x in 0..dim.width {
                map_data.action_selectors[y][x] = ((x + y + seed) % 7) as u8;
            }
        }
        for (x, y, class, selector) in [
            (1, 1, ACTION_TRANSITION, 0),
            (2, 1, ACTION_TRANSITION, 0),
            (dim.width - 1, dim.height - 1, ACTION_TRANSITION, 2),
            (0, dim.height - 1, ACTION_LOOT, 0),
        ] {
            map_data.action_classes[y][x] = class;
            map_data.action_selectors[y][x] = selector;
        }

        let transitions = vec![
            Some(Transition {
                flags: 0,
                x: seed as u8,
                y: 1,
                location: world,
                prompt: 0,
            }),
            None,
            Some(Transition {
                flags: 1,
                x: (seed % dim.width) as u8,
                y: 3,
                location: Location(((seed + 1) % n) as u8),
                prompt: 1,
            }),
            Some(Transition {
                flags: 0,
                x: 5,
                y: 5,
                location: Location(((seed + 2) % n) as u8),
                prompt: 0,
            }),
        ];

        let loots = vec![
            Some(Loot {
                items: vec![
                    LootItem { item: 3, quantity: 1 },
                    LootItem {
                        item: (seed % 50) as u8,
                        quantity: 2,
                    },
                ],
            }),
            None,
        ];

        let monster_data = vec![
            MonsterData {
                hit_dice: 2,
                armor_class: 1,
                to_hit: 3,
                damage_dice: 1,
                attacks: 1,
                weapon: 0,
                group_size: 4,
                flags: 0,
            },
            MonsterData {
                hit_dice: 5 + (seed % 3) as u8,
                armor_class: 2,
                to_hit: 5,
                damage_dice: 2,
                attacks: 2,
                weapon: 7,
                group_size: 3,
                flags: 1,
            },
        ];

        let npcs = (seed % 2 == 1).then(|| {
            vec![
                Some(Npc {
                    name: "Ace".to_string(),
                    attributes: [10, 11, 12, 13, 14, 15, 16],
                    constitution: 30,
                    weapon: 4,
                }),
                None,
            ]
        });

        MapBlockSpec {
            dim,
            map_data,
            map_info: MapInfo {
                flags: 0,
                encounter_freq: 5 + (seed % 20) as u8,
                tileset: (seed % 4) as u8,
                last_monster: 1,
                max_encounters: 3,
                background_tile: 2,
                time_per_step: 60,
                heal_rate: 1,
                combat_map: 0,
            },
            transitions,
            loots,
            monster_names: vec!["RAT".to_string(), "BANDIT".to_string()],
            monster_data,
            npcs,
            strings: vec!["Welcome to the Wasteland.", "A door leads out."],
            tile_map: (0..16).map(|i| (i * (seed + 1)) as u8).collect(),
        }
    }

    /// The sample block for a real map block address.
    pub fn for_block(partition: usize, block: usize) -> MapBlockSpec {
        let dim = map_dim(partition, block).expect("map block address");
        let seed = Location::for_block(partition, block)
            .map(|loc| loc.0 as usize)
            .expect("every map block has a location");
        MapBlockSpec::sample(dim, seed)
    }

    /// Lay the block out: fixed header, then transition, loot and npc
    /// tables, monster names and data, strings area. The tile map follows
    /// in the plain section.
    pub fn enc_section(&self) -> Vec<u8> {
        let mut cd = CentralDir::default();
        let mut body: Vec<u8> = Vec::new();
        let base = header_len(self.dim);

        let at = base + body.len();
        cd.action_tables[ACTION_TRANSITION as usize] = at as u16;
        body.extend(encode_table(at, &self.transitions, |t| t.to_bytes().to_vec()));

        let at = base + body.len();
        cd.action_tables[ACTION_LOOT as usize] = at as u16;
        body.extend(encode_table(at, &self.loots, Loot::to_bytes));

        if let Some(npcs) = &self.npcs {
            let at = base + body.len();
            cd.npcs = at as u16;
            body.extend(encode_table(at, npcs, |n| n.to_bytes().to_vec()));
        }

        if !self.monster_names.is_empty() {
            cd.monster_names = (base + body.len()) as u16;
            for name in &self.monster_names {
                body.extend_from_slice(name.as_bytes());
                body.push(0);
            }
            cd.monster_data = (base + body.len()) as u16;
            for m in &self.monster_data {
                body.extend_from_slice(&m.to_bytes());
            }
        }

        cd.strings = (base + body.len()) as u16;
        body.extend(
            compress_strings_area(&CHAR_TABLE, &self.strings)
                .expect("sample strings are encodable"),
        );

        if !self.tile_map.is_empty() {
            cd.tile_map = (base + body.len()) as u16;
        }

        let mut enc = self.map_data.encode(self.dim);
        enc.extend(cd.to_bytes());
        enc.extend_from_slice(&self.map_info.to_bytes());
        enc.extend(body);
        enc
    }

    pub fn build_block(&self, partition: usize, index: usize) -> Block {
        Block::new(
            partition,
            index,
            block_seed(partition, index),
            self.enc_section(),
            self.tile_map.clone(),
        )
    }
}

fn encode_table<T>(start: usize, entries: &[Option<T>], record: impl Fn(&T) -> Vec<u8>) -> Vec<u8> {
    let mut pointers = Vec::with_capacity(entries.len());
    let mut records = Vec::new();
    let records_start = start + 1 + entries.len() * 2;

    for entry in entries {
        match entry {
            Some(e) => {
                pointers.push((records_start + records.len()) as u16);
                records.extend(record(e));
            }
            None => pointers.push(0),
        }
    }

    let mut out = vec![entries.len() as u8];
    for p in pointers {
        out.extend_from_slice(&p.to_le_bytes());
    }
    out.extend(records);
    out
}

fn block_seed(partition: usize, index: usize) -> [u8; 2] {
    [0x21 + partition as u8, (index as u8).wrapping_mul(13).wrapping_add(5)]
}

/// Partition 0 block 20 with a recognizable byte pattern.
pub fn roster_block() -> Block {
    Block::new(
        0,
        PARTY_ROSTER_BLOCK,
        block_seed(0, PARTY_ROSTER_BLOCK),
        (0..ROSTER_LEN).map(|i| (i % 251) as u8).collect(),
        Vec::new(),
    )
}

/// Both partitions with every map block built from [`MapBlockSpec::for_block`],
/// the party roster, and one trailing opaque block per partition.
pub fn sample_repository() -> Repository {
    let mut games: Vec<Vec<Block>> = Vec::with_capacity(PARTITION_COUNT);
    for partition in 0..PARTITION_COUNT {
        let mut blocks: Vec<Block> = (0..MAP_BLOCK_COUNTS[partition])
            .map(|b| MapBlockSpec::for_block(partition, b).build_block(partition, b))
            .collect();
        if partition == 0 {
            blocks.push(roster_block());
        }
        let index = blocks.len();
        blocks.push(Block::new(
            partition,
            index,
            block_seed(partition, index),
            vec![0x80; 64],
            Vec::new(),
        ));
        games.push(blocks);
    }

    let game2 = games.pop().expect("two partitions");
    let game1 = games.pop().expect("two partitions");
    Repository::new(game1, game2).expect("sample partitions hold every map block")
}

/// Point the strings offset of a map block into its header so that the
/// block no longer decodes.
pub fn corrupt_map_block(repo: &mut Repository, partition: usize, block: usize) {
    let dim = map_dim(partition, block).expect("map block address");
    let at = map_data_len(dim);
    let enc = &mut repo.block_mut(partition, block).expect("block exists").body.enc_section;
    enc[at..at + 2].copy_from_slice(&4u16.to_le_bytes());
}

/// A fresh, empty directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wasteland-{}-{}", name, std::process::id()));
    if dir.exists() {
        fs::remove_dir_all(&dir).expect("clear scratch dir");
    }
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Write [`sample_repository`] into a fresh scratch directory.
pub fn sample_game_dir(name: &str) -> (PathBuf, Repository) {
    let dir = scratch_dir(name);
    let repo = sample_repository();
    repo.write_dir(&dir).expect("write sample game");
    (dir, repo)
}
