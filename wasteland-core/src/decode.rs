use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use thiserror::Error;

use crate::defs::{Location, MapDimension, ACTION_CLASS_COUNT, ACTION_LOOT, ACTION_TRANSITION};
use crate::msq::Block;
use crate::strings::StringsArea;

pub const CENTRAL_DIR_LEN: usize = 2 * (5 + ACTION_CLASS_COUNT);
pub const MAP_INFO_LEN: usize = 10;
pub const TRANSITION_RECORD_LEN: usize = 5;
pub const MONSTER_DATA_LEN: usize = 8;
pub const NPC_NAME_LEN: usize = 14;
pub const NPC_RECORD_LEN: usize = NPC_NAME_LEN + 7 + 2 + 1;

const TRANSITION_RELATIVE: u8 = 0x01;

/// Errors raised while carving or decoding a map block.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("{what} at {start:#x}..{end:#x} is outside the {len:#x}-byte region")]
    OutOfRange {
        what: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("map dimension {width}x{height} has an odd cell count")]
    OddDimension { width: usize, height: usize },

    #[error("{what} offset {offset:#x} points into the block header (ends at {header_end:#x})")]
    OffsetInHeader {
        what: String,
        offset: usize,
        header_end: usize,
    },

    #[error("block has no strings area")]
    MissingStrings,

    #[error("{table} entry {index} points to {pointer:#x}, outside the table region {start:#x}..{end:#x}")]
    BadPointer {
        table: &'static str,
        index: usize,
        pointer: usize,
        start: usize,
        end: usize,
    },

    #[error("monster data holds {have} records but there are {want} monster names")]
    MonsterCountMismatch { have: usize, want: usize },

    #[error("string {index} at {offset:#x} is not terminated")]
    UnterminatedString { index: usize, offset: usize },

    #[error("string {index}: invalid shifted code {code}")]
    BadShiftCode { index: usize, code: u8 },

    #[error("character {ch:?} is not in the strings character table")]
    UnencodableChar { ch: char },

    #[error("selector {selector} is outside the {table} table ({len} entries)")]
    SelectorOutOfRange {
        table: &'static str,
        selector: usize,
        len: usize,
    },

    #[error("{table} entry {selector} is empty")]
    NullEntry { table: &'static str, selector: usize },
}

type CodecResult<T> = std::result::Result<T, CodecError>;

fn u16_at(raw: &[u8], at: usize) -> u16 {
    LittleEndian::read_u16(&raw[at..at + 2])
}

fn check_range(what: &'static str, start: usize, end: usize, len: usize) -> CodecResult<()> {
    if start > end || end > len {
        return Err(CodecError::OutOfRange {
            what,
            start,
            end,
            len,
        });
    }
    Ok(())
}

/// Length of the action class + action selector grids for `dim`.
pub fn map_data_len(dim: MapDimension) -> usize {
    dim.cells() * 3 / 2
}

/// End of the fixed-position part of a map block: map data, central
/// directory and map info.
pub fn header_len(dim: MapDimension) -> usize {
    map_data_len(dim) + CENTRAL_DIR_LEN + MAP_INFO_LEN
}

/// Byte offsets of every sub-structure of a map block, relative to the start
/// of the encrypted section. Zero means absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CentralDir {
    pub strings: u16,
    pub monster_names: u16,
    pub monster_data: u16,
    pub action_tables: [u16; ACTION_CLASS_COUNT],
    pub npcs: u16,
    pub tile_map: u16,
}

impl CentralDir {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CENTRAL_DIR_LEN);
        out.extend_from_slice(&self.strings.to_le_bytes());
        out.extend_from_slice(&self.monster_names.to_le_bytes());
        out.extend_from_slice(&self.monster_data.to_le_bytes());
        for off in &self.action_tables {
            out.extend_from_slice(&off.to_le_bytes());
        }
        out.extend_from_slice(&self.npcs.to_le_bytes());
        out.extend_from_slice(&self.tile_map.to_le_bytes());
        out
    }
}

pub fn decode_central_dir(raw: &[u8]) -> CodecResult<CentralDir> {
    check_range("central directory", 0, CENTRAL_DIR_LEN, raw.len())?;

    let mut action_tables = [0u16; ACTION_CLASS_COUNT];
    for (i, off) in action_tables.iter_mut().enumerate() {
        *off = u16_at(raw, 6 + i * 2);
    }

    let tail = 6 + ACTION_CLASS_COUNT * 2;
    Ok(CentralDir {
        strings: u16_at(raw, 0),
        monster_names: u16_at(raw, 2),
        monster_data: u16_at(raw, 4),
        action_tables,
        npcs: u16_at(raw, tail),
        tile_map: u16_at(raw, tail + 2),
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapInfo {
    pub flags: u8,
    pub encounter_freq: u8,
    pub tileset: u8,
    pub last_monster: u8,
    pub max_encounters: u8,
    pub background_tile: u8,
    pub time_per_step: u16,
    pub heal_rate: u8,
    pub combat_map: u8,
}

impl MapInfo {
    pub fn from_bytes(raw: &[u8]) -> CodecResult<MapInfo> {
        check_range("map info", 0, MAP_INFO_LEN, raw.len())?;
        Ok(MapInfo {
            flags: raw[0],
            encounter_freq: raw[1],
            tileset: raw[2],
            last_monster: raw[3],
            max_encounters: raw[4],
            background_tile: raw[5],
            time_per_step: u16_at(raw, 6),
            heal_rate: raw[8],
            combat_map: raw[9],
        })
    }

    pub fn to_bytes(&self) -> [u8; MAP_INFO_LEN] {
        let [step_lo, step_hi] = self.time_per_step.to_le_bytes();
        [
            self.flags,
            self.encounter_freq,
            self.tileset,
            self.last_monster,
            self.max_encounters,
            self.background_tile,
            step_lo,
            step_hi,
            self.heal_rate,
            self.combat_map,
        ]
    }
}

/// Per-cell action classes and selectors, indexed `[y][x]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapData {
    pub action_classes: Vec<Vec<u8>>,
    pub action_selectors: Vec<Vec<u8>>,
}

impl MapData {
    pub fn new(dim: MapDimension) -> Self {
        Self {
            action_classes: vec![vec![0; dim.width]; dim.height],
            action_selectors: vec![vec![0; dim.width]; dim.height],
        }
    }

    pub fn decode(raw: &[u8], dim: MapDimension) -> CodecResult<MapData> {
        let cells = dim.cells();
        check_range("map data", 0, map_data_len(dim), raw.len())?;

        let classes = &raw[..cells / 2];
        let selectors = &raw[cells / 2..cells / 2 + cells];

        let mut md = MapData::new(dim);
        for y in 0..dim.height {
            for x in 0..dim.width {
                let i = y * dim.width + x;
                let packed = classes[i / 2];
                md.action_classes[y][x] = if i % 2 == 0 { packed >> 4 } else { packed & 0x0f };
                md.action_selectors[y][x] = selectors[i];
            }
        }
        Ok(md)
    }

    pub fn encode(&self, dim: MapDimension) -> Vec<u8> {
        let cells = dim.cells();
        let mut out = vec![0u8; map_data_len(dim)];
        for y in 0..dim.height {
            for x in 0..dim.width {
                let i = y * dim.width + x;
                let class = self.action_classes[y][x] & 0x0f;
                out[i / 2] |= if i % 2 == 0 { class << 4 } else { class };
                out[cells / 2 + i] = self.action_selectors[y][x];
            }
        }
        out
    }

    /// One line per row; each cell is its class nibble followed by its
    /// selector byte, in hex.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (classes, selectors) in self.action_classes.iter().zip(&self.action_selectors) {
            let row: Vec<String> = classes
                .iter()
                .zip(selectors)
                .map(|(c, s)| format!("{:x}{:02x}", c, s))
                .collect();
            out.push_str(&row.join(" "));
            out.push('\n');
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Transition {
    pub flags: u8,
    pub x: u8,
    pub y: u8,
    pub location: Location,
    pub prompt: u8,
}

impl Transition {
    pub fn relative(&self) -> bool {
        self.flags & TRANSITION_RELATIVE != 0
    }

    pub fn from_bytes(raw: &[u8]) -> Transition {
        Transition {
            flags: raw[0],
            x: raw[1],
            y: raw[2],
            location: Location(raw[3]),
            prompt: raw[4],
        }
    }

    pub fn to_bytes(&self) -> [u8; TRANSITION_RECORD_LEN] {
        [self.flags, self.x, self.y, self.location.0, self.prompt]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LootItem {
    pub item: u8,
    pub quantity: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Loot {
    pub items: Vec<LootItem>,
}

impl Loot {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.items.len() as u8];
        for it in &self.items {
            out.push(it.item);
            out.push(it.quantity);
        }
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonsterData {
    pub hit_dice: u8,
    pub armor_class: u8,
    pub to_hit: u8,
    pub damage_dice: u8,
    pub attacks: u8,
    pub weapon: u8,
    pub group_size: u8,
    pub flags: u8,
}

impl MonsterData {
    fn from_bytes(raw: &[u8]) -> MonsterData {
        MonsterData {
            hit_dice: raw[0],
            armor_class: raw[1],
            to_hit: raw[2],
            damage_dice: raw[3],
            attacks: raw[4],
            weapon: raw[5],
            group_size: raw[6],
            flags: raw[7],
        }
    }

    pub fn to_bytes(&self) -> [u8; MONSTER_DATA_LEN] {
        [
            self.hit_dice,
            self.armor_class,
            self.to_hit,
            self.damage_dice,
            self.attacks,
            self.weapon,
            self.group_size,
            self.flags,
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Npc {
    pub name: String,
    pub attributes: [u8; 7],
    pub constitution: u16,
    pub weapon: u8,
}

impl Npc {
    fn from_bytes(raw: &[u8]) -> Npc {
        let name_bytes = &raw[..NPC_NAME_LEN];
        let nul_pos = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        let mut attributes = [0u8; 7];
        attributes.copy_from_slice(&raw[NPC_NAME_LEN..NPC_NAME_LEN + 7]);

        Npc {
            name: String::from_utf8_lossy(&name_bytes[..nul_pos]).into_owned(),
            attributes,
            constitution: u16_at(raw, NPC_NAME_LEN + 7),
            weapon: raw[NPC_NAME_LEN + 9],
        }
    }

    pub fn to_bytes(&self) -> [u8; NPC_RECORD_LEN] {
        let mut out = [0u8; NPC_RECORD_LEN];
        let name = self.name.as_bytes();
        let n = name.len().min(NPC_NAME_LEN);
        out[..n].copy_from_slice(&name[..n]);
        out[NPC_NAME_LEN..NPC_NAME_LEN + 7].copy_from_slice(&self.attributes);
        out[NPC_NAME_LEN + 7..NPC_NAME_LEN + 9].copy_from_slice(&self.constitution.to_le_bytes());
        out[NPC_NAME_LEN + 9] = self.weapon;
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Offsets {
    pub map_data: usize,
    pub central_dir: usize,
    pub map_info: usize,
    pub strings: usize,
    pub monster_names: Option<usize>,
    pub monster_data: Option<usize>,
    pub action_tables: Vec<Option<usize>>,
    pub npcs: Option<usize>,
    pub tile_map: Option<usize>,
}

/// Same shape as [`Offsets`]; each value is the carved length of the region.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sizes {
    pub map_data: usize,
    pub central_dir: usize,
    pub map_info: usize,
    pub strings: usize,
    pub monster_names: Option<usize>,
    pub monster_data: Option<usize>,
    pub action_tables: Vec<Option<usize>>,
    pub npcs: Option<usize>,
    pub tile_map: Option<usize>,
}

/// Region layout of a map block, recovered from the central directory alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarvedBlock {
    pub offsets: Offsets,
    pub central_dir: Vec<u8>,
    pub map_info: Vec<u8>,
    // The tile map is the plain section.
    tile_map_len: usize,
    // Sorted distinct region starts, terminated by the section length.
    bounds: Vec<usize>,
}

impl CarvedBlock {
    /// Length of the region starting at `offset`: up to the next region
    /// start, or the end of the section.
    pub fn region_size(&self, offset: usize) -> usize {
        self.bounds
            .iter()
            .find(|&&b| b > offset)
            .map(|&b| b - offset)
            .unwrap_or(0)
    }

    pub fn region(&self, offset: usize) -> (usize, usize) {
        (offset, offset + self.region_size(offset))
    }

    pub fn sizes(&self) -> Sizes {
        let o = &self.offsets;
        let size = |off: Option<usize>| off.map(|off| self.region_size(off));
        Sizes {
            map_data: o.central_dir - o.map_data,
            central_dir: CENTRAL_DIR_LEN,
            map_info: MAP_INFO_LEN,
            strings: self.region_size(o.strings),
            monster_names: size(o.monster_names),
            monster_data: size(o.monster_data),
            action_tables: o.action_tables.iter().map(|&off| size(off)).collect(),
            npcs: size(o.npcs),
            tile_map: o.tile_map.map(|_| self.tile_map_len),
        }
    }

    pub fn action_table(&self, class: u8) -> Option<usize> {
        self.offsets.action_tables.get(class as usize).copied().flatten()
    }
}

fn non_zero(off: u16) -> Option<usize> {
    (off != 0).then_some(off as usize)
}

/// Locate every sub-structure of a map block without decoding any of them.
pub fn carve_block(block: &Block, dim: MapDimension) -> CodecResult<CarvedBlock> {
    if dim.cells() % 2 != 0 {
        return Err(CodecError::OddDimension {
            width: dim.width,
            height: dim.height,
        });
    }

    let enc = block.enc_section();
    let md_len = map_data_len(dim);
    let header_end = header_len(dim);
    check_range("block header", 0, header_end, enc.len())?;

    let cd_bytes = &enc[md_len..md_len + CENTRAL_DIR_LEN];
    let cd = decode_central_dir(cd_bytes)?;
    if cd.strings == 0 {
        return Err(CodecError::MissingStrings);
    }

    let mut named: Vec<(String, usize)> = vec![("strings".to_string(), cd.strings as usize)];
    let optional = [
        ("monster names", cd.monster_names),
        ("monster data", cd.monster_data),
        ("npcs", cd.npcs),
    ];
    for (what, off) in optional {
        if let Some(off) = non_zero(off) {
            named.push((what.to_string(), off));
        }
    }
    for (class, &off) in cd.action_tables.iter().enumerate() {
        if let Some(off) = non_zero(off) {
            named.push((format!("action table {}", class), off));
        }
    }

    for (what, off) in &named {
        if *off < header_end {
            return Err(CodecError::OffsetInHeader {
                what: what.clone(),
                offset: *off,
                header_end,
            });
        }
        if *off >= enc.len() {
            return Err(CodecError::OutOfRange {
                what: "central directory entry",
                start: *off,
                end: *off + 1,
                len: enc.len(),
            });
        }
    }

    // The tile map is not obfuscated; it starts where the encrypted section ends.
    if let Some(off) = non_zero(cd.tile_map) {
        if off != enc.len() {
            return Err(CodecError::OutOfRange {
                what: "tile map",
                start: off,
                end: off + block.plain_section().len(),
                len: enc.len(),
            });
        }
    }

    let mut bounds: Vec<usize> = named.iter().map(|(_, off)| *off).collect();
    bounds.push(enc.len());
    bounds.sort_unstable();
    bounds.dedup();

    let offsets = Offsets {
        map_data: 0,
        central_dir: md_len,
        map_info: md_len + CENTRAL_DIR_LEN,
        strings: cd.strings as usize,
        monster_names: non_zero(cd.monster_names),
        monster_data: non_zero(cd.monster_data),
        action_tables: cd.action_tables.iter().map(|&off| non_zero(off)).collect(),
        npcs: non_zero(cd.npcs),
        tile_map: non_zero(cd.tile_map),
    };

    Ok(CarvedBlock {
        offsets,
        central_dir: cd_bytes.to_vec(),
        map_info: enc[md_len + CENTRAL_DIR_LEN..header_end].to_vec(),
        tile_map_len: block.plain_section().len(),
        bounds,
    })
}

/// Record pointers of the action table occupying `start..end`. Every
/// non-null pointer is checked to fall inside the table region.
pub fn table_pointers(
    enc: &[u8],
    table: &'static str,
    start: usize,
    end: usize,
) -> CodecResult<Vec<u16>> {
    check_range(table, start, start + 1, end)?;
    let count = enc[start] as usize;
    let ptrs_end = start + 1 + count * 2;
    check_range(table, start, ptrs_end, end)?;

    let mut pointers = Vec::with_capacity(count);
    for index in 0..count {
        let ptr = u16_at(enc, start + 1 + index * 2);
        let p = ptr as usize;
        if ptr != 0 && (p < ptrs_end || p >= end) {
            return Err(CodecError::BadPointer {
                table,
                index,
                pointer: p,
                start,
                end,
            });
        }
        pointers.push(ptr);
    }
    Ok(pointers)
}

fn decode_table<T>(
    enc: &[u8],
    table: &'static str,
    region: Option<(usize, usize)>,
    mut record: impl FnMut(&[u8], usize, usize) -> CodecResult<T>,
) -> CodecResult<Vec<Option<T>>> {
    let (start, end) = match region {
        Some(region) => region,
        None => return Ok(Vec::new()),
    };

    table_pointers(enc, table, start, end)?
        .into_iter()
        .map(|ptr| match ptr {
            0 => Ok(None),
            p => record(enc, p as usize, end).map(Some),
        })
        .collect()
}

fn decode_transition(enc: &[u8], at: usize, end: usize) -> CodecResult<Transition> {
    check_range("transition record", at, at + TRANSITION_RECORD_LEN, end)?;
    Ok(Transition::from_bytes(&enc[at..at + TRANSITION_RECORD_LEN]))
}

fn decode_loot(enc: &[u8], at: usize, end: usize) -> CodecResult<Loot> {
    check_range("loot record", at, at + 1, end)?;
    let count = enc[at] as usize;
    let rec_end = at + 1 + count * 2;
    check_range("loot record", at, rec_end, end)?;

    let items = enc[at + 1..rec_end]
        .chunks_exact(2)
        .map(|pair| LootItem {
            item: pair[0],
            quantity: pair[1],
        })
        .collect();
    Ok(Loot { items })
}

fn decode_npc(enc: &[u8], at: usize, end: usize) -> CodecResult<Npc> {
    check_range("npc record", at, at + NPC_RECORD_LEN, end)?;
    Ok(Npc::from_bytes(&enc[at..at + NPC_RECORD_LEN]))
}

fn decode_monster_names(raw: &[u8]) -> Vec<String> {
    let mut names: Vec<String> = raw
        .split(|&b| b == 0)
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect();
    // The final terminator leaves an empty tail.
    while names.last().map_or(false, |n| n.is_empty()) {
        names.pop();
    }
    names
}

/// A fully decoded map block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DecodedBlock {
    pub dim: MapDimension,
    pub map_data: MapData,
    pub central_dir: CentralDir,
    pub map_info: MapInfo,
    pub transitions: Vec<Option<Transition>>,
    pub loots: Vec<Option<Loot>>,
    pub monster_names: Vec<String>,
    pub monster_data: Vec<MonsterData>,
    pub npcs: Option<Vec<Option<Npc>>>,
    pub strings_area: StringsArea,
}

pub fn decode_block(block: &Block, dim: MapDimension) -> CodecResult<DecodedBlock> {
    let carved = carve_block(block, dim)?;
    let enc = block.enc_section();

    let map_data = MapData::decode(enc, dim)?;
    let central_dir = decode_central_dir(&carved.central_dir)?;
    let map_info = MapInfo::from_bytes(&carved.map_info)?;

    let transitions = decode_table(
        enc,
        "transition table",
        carved.action_table(ACTION_TRANSITION).map(|off| carved.region(off)),
        decode_transition,
    )?;
    let loots = decode_table(
        enc,
        "loot table",
        carved.action_table(ACTION_LOOT).map(|off| carved.region(off)),
        decode_loot,
    )?;

    let monster_names = match carved.offsets.monster_names {
        Some(off) => {
            let (start, end) = carved.region(off);
            decode_monster_names(&enc[start..end])
        }
        None => Vec::new(),
    };

    let monster_data = match carved.offsets.monster_data {
        Some(off) => {
            let size = carved.region_size(off);
            let have = size / MONSTER_DATA_LEN;
            if have < monster_names.len() {
                return Err(CodecError::MonsterCountMismatch {
                    have,
                    want: monster_names.len(),
                });
            }
            enc[off..off + monster_names.len() * MONSTER_DATA_LEN]
                .chunks_exact(MONSTER_DATA_LEN)
                .map(MonsterData::from_bytes)
                .collect()
        }
        None if !monster_names.is_empty() => {
            return Err(CodecError::MonsterCountMismatch {
                have: 0,
                want: monster_names.len(),
            });
        }
        None => Vec::new(),
    };

    let npcs = match carved.offsets.npcs {
        Some(off) => Some(decode_table(enc, "npc table", Some(carved.region(off)), decode_npc)?),
        None => None,
    };

    let (start, end) = carved.region(carved.offsets.strings);
    let strings_area = StringsArea::parse(&enc[start..end])?;

    Ok(DecodedBlock {
        dim,
        map_data,
        central_dir,
        map_info,
        transitions,
        loots,
        monster_names,
        monster_data,
        npcs,
        strings_area,
    })
}
