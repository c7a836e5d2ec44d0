use serde::Serialize;
use thiserror::Error;

/// Number of game partitions (`GAME1` and `GAME2`).
pub const PARTITION_COUNT: usize = 2;

pub const GAME_FILE_NAMES: [&str; PARTITION_COUNT] = ["GAME1", "GAME2"];

/// Blocks `[0, MAP_BLOCK_COUNTS[p])` of partition `p` are map blocks; the
/// remaining blocks are opaque save data.
pub const MAP_BLOCK_COUNTS: [usize; PARTITION_COUNT] = [20, 22];

/// Partition 0 block holding the four party member records.
pub const PARTY_ROSTER_BLOCK: usize = 20;

pub const ACTION_CLASS_COUNT: usize = 16;
pub const ACTION_TRANSITION: u8 = 10;
pub const ACTION_LOOT: u8 = 13;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapDimension {
    pub width: usize,
    pub height: usize,
}

impl MapDimension {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub const fn cells(&self) -> usize {
        self.width * self.height
    }
}

const WORLD: MapDimension = MapDimension::new(64, 64);
const TOWN: MapDimension = MapDimension::new(32, 32);

const GAME1_MAP_DIMS: [MapDimension; MAP_BLOCK_COUNTS[0]] = [
    WORLD, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, //
    TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN,
];

const GAME2_MAP_DIMS: [MapDimension; MAP_BLOCK_COUNTS[1]] = [
    WORLD, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, //
    TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, TOWN, //
    TOWN, TOWN,
];

/// Map dimensions of every map block in `partition`, indexed by block.
pub fn map_dims(partition: usize) -> &'static [MapDimension] {
    match partition {
        0 => &GAME1_MAP_DIMS,
        1 => &GAME2_MAP_DIMS,
        _ => &[],
    }
}

pub fn map_dim(partition: usize, block: usize) -> Option<MapDimension> {
    map_dims(partition).get(block).copied()
}

#[derive(Copy, Clone, Debug)]
pub struct LocationDef {
    pub name: &'static str,
    pub partition: usize,
    pub block: usize,
}

// Location ids are the index into this table. Every map block has exactly
// one location.
pub const LOCATIONS: &[LocationDef] = &[
    LocationDef { name: "WORLD", partition: 0, block: 0 },
    LocationDef { name: "HIGHPOOL", partition: 0, block: 1 },
    LocationDef { name: "AGCENTER", partition: 0, block: 2 },
    LocationDef { name: "RANGER", partition: 0, block: 3 },
    LocationDef { name: "QUARTZ", partition: 0, block: 4 },
    LocationDef { name: "STAGEWEST", partition: 0, block: 5 },
    LocationDef { name: "MARS", partition: 0, block: 6 },
    LocationDef { name: "SHRINE", partition: 0, block: 7 },
    LocationDef { name: "SAVAGE", partition: 0, block: 8 },
    LocationDef { name: "RAILNOMADS", partition: 0, block: 9 },
    LocationDef { name: "NEEDLES", partition: 0, block: 10 },
    LocationDef { name: "NEEDLESDT", partition: 0, block: 11 },
    LocationDef { name: "SCOTTSBAR", partition: 0, block: 12 },
    LocationDef { name: "MINESHAFT", partition: 0, block: 13 },
    LocationDef { name: "BRYGO", partition: 0, block: 14 },
    LocationDef { name: "PALMSPRINGS", partition: 0, block: 15 },
    LocationDef { name: "CHURCH", partition: 0, block: 16 },
    LocationDef { name: "HIGHPOOLCAVE", partition: 0, block: 17 },
    LocationDef { name: "FACTORY", partition: 0, block: 18 },
    LocationDef { name: "OUTPOST", partition: 0, block: 19 },
    LocationDef { name: "WORLD2", partition: 1, block: 0 },
    LocationDef { name: "VEGAS", partition: 1, block: 1 },
    LocationDef { name: "SEWERS1", partition: 1, block: 2 },
    LocationDef { name: "SEWERS2", partition: 1, block: 3 },
    LocationDef { name: "SEWERS3", partition: 1, block: 4 },
    LocationDef { name: "SPADES", partition: 1, block: 5 },
    LocationDef { name: "CASINO", partition: 1, block: 6 },
    LocationDef { name: "DARWIN", partition: 1, block: 7 },
    LocationDef { name: "DARWINBASE", partition: 1, block: 8 },
    LocationDef { name: "CITADEL1", partition: 1, block: 9 },
    LocationDef { name: "CITADEL2", partition: 1, block: 10 },
    LocationDef { name: "CITADEL3", partition: 1, block: 11 },
    LocationDef { name: "SLEEPER1", partition: 1, block: 12 },
    LocationDef { name: "SLEEPER2", partition: 1, block: 13 },
    LocationDef { name: "SLEEPER3", partition: 1, block: 14 },
    LocationDef { name: "COCHISE1", partition: 1, block: 15 },
    LocationDef { name: "COCHISE2", partition: 1, block: 16 },
    LocationDef { name: "COCHISE3", partition: 1, block: 17 },
    LocationDef { name: "COCHISE4", partition: 1, block: 18 },
    LocationDef { name: "FINSTER", partition: 1, block: 19 },
    LocationDef { name: "MUSHROOM", partition: 1, block: 20 },
    LocationDef { name: "TEMPLE", partition: 1, block: 21 },
];

/// A location id as stored in transition records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Location(pub u8);

impl Location {
    pub fn def(self) -> Option<&'static LocationDef> {
        LOCATIONS.get(self.0 as usize)
    }

    pub fn name(self) -> Option<&'static str> {
        self.def().map(|d| d.name)
    }

    /// `(partition, block)` of the map block this location lives in.
    pub fn address(self) -> Option<(usize, usize)> {
        self.def().map(|d| (d.partition, d.block))
    }

    pub fn for_block(partition: usize, block: usize) -> Option<Location> {
        LOCATIONS
            .iter()
            .position(|d| d.partition == partition && d.block == block)
            .map(|idx| Location(idx as u8))
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&location_string(*self))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown location: \"{0}\"")]
pub struct UnknownLocation(pub String);

pub fn location_string(loc: Location) -> String {
    match loc.name() {
        Some(name) => name.to_string(),
        None => format!("UNKNOWN_{}", loc.0),
    }
}

/// Resolve a location name, ignoring ASCII case and surrounding whitespace.
pub fn parse_location_no_case(s: &str) -> Result<Location, UnknownLocation> {
    let wanted = s.trim();
    LOCATIONS
        .iter()
        .position(|d| d.name.eq_ignore_ascii_case(wanted))
        .map(|idx| Location(idx as u8))
        .ok_or_else(|| UnknownLocation(wanted.to_string()))
}
