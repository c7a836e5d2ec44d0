use serde::Serialize;
use thiserror::Error;

use crate::decode::{decode_central_dir, header_len, map_data_len};
use crate::defs::map_dim;

/// Every block starts with `msq` followed by the partition digit.
pub const MSQ_MAGIC: &[u8; 3] = b"msq";

/// magic(4) + seed(2)
pub const HEADER_LEN: usize = 6;

/// Bumped whenever the layout of `meta.json` changes.
pub const META_SCHEMA_VERSION: u32 = 2;

const KEY_STEP: u8 = 0x1f;

#[derive(Debug, Error)]
pub enum MsqError {
    #[error("block {index} at byte {offset}: bad magic {found:02x?}")]
    BadMagic {
        index: usize,
        offset: usize,
        found: [u8; 4],
    },

    #[error("block {index} at byte {offset} belongs to partition {found}, expected {expected}")]
    WrongPartition {
        index: usize,
        offset: usize,
        found: u8,
        expected: usize,
    },

    #[error("block {index} at byte {offset}: truncated {what}")]
    Truncated {
        index: usize,
        offset: usize,
        what: &'static str,
    },
}

/// Identity and header metadata of a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockDescriptor {
    pub partition: usize,
    pub index: usize,
    pub seed: [u8; 2],
}

/// The two raw sections of a block. `enc_section` is kept de-obfuscated in
/// memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Body {
    pub enc_section: Vec<u8>,
    pub plain_section: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub descriptor: BlockDescriptor,
    pub body: Body,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockMeta {
    pub schema_version: u32,
    #[serde(flatten)]
    pub descriptor: BlockDescriptor,
    pub enc_len: usize,
    pub plain_len: usize,
    pub map_block: bool,
}

impl Block {
    pub fn new(
        partition: usize,
        index: usize,
        seed: [u8; 2],
        enc_section: Vec<u8>,
        plain_section: Vec<u8>,
    ) -> Self {
        Self {
            descriptor: BlockDescriptor {
                partition,
                index,
                seed,
            },
            body: Body {
                enc_section,
                plain_section,
            },
        }
    }

    pub fn partition(&self) -> usize {
        self.descriptor.partition
    }

    pub fn index(&self) -> usize {
        self.descriptor.index
    }

    pub fn enc_section(&self) -> &[u8] {
        &self.body.enc_section
    }

    pub fn plain_section(&self) -> &[u8] {
        &self.body.plain_section
    }

    pub fn meta(&self, map_block: bool) -> BlockMeta {
        BlockMeta {
            schema_version: META_SCHEMA_VERSION,
            descriptor: self.descriptor.clone(),
            enc_len: self.body.enc_section.len(),
            plain_len: self.body.plain_section.len(),
            map_block,
        }
    }
}

/// Rotating XOR over `data`, keyed by the block seed. Applying it twice
/// restores the input.
pub fn obfuscate(data: &mut [u8], seed: [u8; 2]) {
    let mut key = seed[0] ^ seed[1];
    for b in data.iter_mut() {
        *b ^= key;
        key = key.wrapping_add(KEY_STEP);
    }
}

fn block_magic(partition: usize) -> [u8; 4] {
    [MSQ_MAGIC[0], MSQ_MAGIC[1], MSQ_MAGIC[2], b'0' + partition as u8]
}

// Start of the next block header at or after `from`, or the end of `raw`.
fn next_block(raw: &[u8], from: usize, partition: usize) -> usize {
    let magic = block_magic(partition);
    raw.get(from..)
        .and_then(|rest| rest.windows(magic.len()).position(|w| w == &magic[..]))
        .map_or(raw.len(), |pos| from + pos)
}

/// Length of the obfuscated part of a block body, given the body with the
/// obfuscation already removed. A map block stops being obfuscated where its
/// tile map starts; any other block is obfuscated to the end.
pub fn enc_len(partition: usize, index: usize, body: &[u8]) -> usize {
    let dim = match map_dim(partition, index) {
        Some(dim) => dim,
        None => return body.len(),
    };
    let tile_map = body
        .get(map_data_len(dim)..)
        .and_then(|rest| decode_central_dir(rest).ok())
        .map(|cd| cd.tile_map as usize);

    match tile_map {
        Some(off) if off >= header_len(dim) && off <= body.len() => off,
        _ => body.len(),
    }
}

/// Split a whole game file into its blocks. Each block runs from its
/// `msq<digit>` magic to the next one.
pub fn parse_game(partition: usize, raw: &[u8]) -> Result<Vec<Block>, MsqError> {
    let mut blocks = Vec::new();
    let mut offset = 0usize;

    while offset < raw.len() {
        let index = blocks.len();
        if offset + HEADER_LEN > raw.len() {
            return Err(MsqError::Truncated {
                index,
                offset,
                what: "header",
            });
        }

        let header = &raw[offset..offset + HEADER_LEN];
        if &header[0..3] != MSQ_MAGIC || !header[3].is_ascii_digit() {
            let mut found = [0u8; 4];
            found.copy_from_slice(&header[0..4]);
            return Err(MsqError::BadMagic {
                index,
                offset,
                found,
            });
        }

        let digit = header[3] - b'0';
        if digit as usize != partition {
            return Err(MsqError::WrongPartition {
                index,
                offset,
                found: digit,
                expected: partition,
            });
        }

        let seed = [header[4], header[5]];
        let start = offset + HEADER_LEN;
        let end = next_block(raw, start, partition);

        let mut body = raw[start..end].to_vec();
        obfuscate(&mut body, seed);
        let split = enc_len(partition, index, &body);
        body.truncate(split);
        let plain_section = raw[start + split..end].to_vec();

        blocks.push(Block::new(partition, index, seed, body, plain_section));
        offset = end;
    }

    Ok(blocks)
}

/// Inverse of [`parse_game`].
pub fn serialize_game(blocks: &[Block]) -> Vec<u8> {
    let mut out = Vec::new();

    for block in blocks {
        out.extend_from_slice(&block_magic(block.partition()));
        out.extend_from_slice(&block.descriptor.seed);

        let mut enc = block.body.enc_section.clone();
        obfuscate(&mut enc, block.descriptor.seed);
        out.extend_from_slice(&enc);
        out.extend_from_slice(block.plain_section());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::CENTRAL_DIR_LEN;
    use crate::testkit::MapBlockSpec;

    // `msq0`, a seed, then 40 obfuscated bytes; twice.
    fn two_opaque_blocks() -> (Vec<u8>, Vec<Vec<u8>>) {
        let mut raw = Vec::new();
        let mut payloads = Vec::new();
        for i in 0..2u8 {
            let seed = [0x10 + i, 0x77];
            let payload: Vec<u8> = (0..40u8).map(|j| j.wrapping_mul(3).wrapping_add(i)).collect();
            let mut data = payload.clone();
            obfuscate(&mut data, seed);
            raw.extend_from_slice(b"msq0");
            raw.extend_from_slice(&seed);
            raw.extend(data);
            payloads.push(payload);
        }
        (raw, payloads)
    }

    #[test]
    fn obfuscation_is_an_involution() {
        let mut data: Vec<u8> = (0..=255).collect();
        obfuscate(&mut data, [0x5a, 0xc3]);
        assert_ne!(data, (0..=255).collect::<Vec<u8>>());
        obfuscate(&mut data, [0x5a, 0xc3]);
        assert_eq!(data, (0..=255).collect::<Vec<u8>>());
    }

    #[test]
    fn blocks_run_to_the_next_magic() {
        let (raw, payloads) = two_opaque_blocks();
        let blocks = parse_game(0, &raw).unwrap();

        assert_eq!(blocks.len(), 2);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.index(), i);
            assert_eq!(block.descriptor.seed, [0x10 + i as u8, 0x77]);
            assert_eq!(block.enc_section(), payloads[i].as_slice());
            assert!(block.plain_section().is_empty());
        }
        assert_eq!(serialize_game(&blocks), raw);
    }

    #[test]
    fn map_blocks_split_at_the_tile_map() {
        let specs = [MapBlockSpec::for_block(1, 0), MapBlockSpec::for_block(1, 1)];
        let blocks: Vec<Block> = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.build_block(1, i))
            .collect();

        let raw = serialize_game(&blocks);
        assert_eq!(&raw[0..4], b"msq1");
        let expected_len: usize = blocks
            .iter()
            .map(|b| HEADER_LEN + b.enc_section().len() + b.plain_section().len())
            .sum();
        assert_eq!(raw.len(), expected_len);

        let parsed = parse_game(1, &raw).unwrap();
        assert_eq!(parsed, blocks);
        assert_eq!(parsed[1].plain_section(), specs[1].tile_map.as_slice());
        assert_eq!(serialize_game(&parsed), raw);
    }

    #[test]
    fn split_follows_the_tile_map_offset() {
        let spec = MapBlockSpec::for_block(0, 3);
        let block = spec.build_block(0, 3);
        let enc = block.enc_section();
        let mut body = enc.to_vec();
        body.extend_from_slice(block.plain_section());

        assert_eq!(enc_len(0, 3, &body), enc.len());
        // Too short to hold a central directory.
        assert_eq!(enc_len(0, 3, &body[..40]), 40);
        // Past the map blocks nothing is split.
        assert_eq!(enc_len(0, 20, &body), body.len());

        // A tile map offset outside the body is ignored.
        let at = map_data_len(spec.dim) + CENTRAL_DIR_LEN - 2;
        body[at..at + 2].copy_from_slice(&0xfff0u16.to_le_bytes());
        assert_eq!(enc_len(0, 3, &body), body.len());
    }

    #[test]
    fn rejects_wrong_partition_digit() {
        let (raw, _) = two_opaque_blocks();
        let err = parse_game(1, &raw).unwrap_err();
        assert!(matches!(err, MsqError::WrongPartition { found: 0, expected: 1, .. }));
    }

    #[test]
    fn rejects_truncated_header() {
        let (mut raw, _) = two_opaque_blocks();
        raw.extend_from_slice(b"msq0\x01");
        let err = parse_game(0, &raw).unwrap_err();
        assert!(matches!(
            err,
            MsqError::Truncated {
                index: 2,
                what: "header",
                ..
            }
        ));
    }

    #[test]
    fn rejects_a_file_not_starting_with_a_block() {
        let (raw, _) = two_opaque_blocks();
        let mut junk = b"junkjunk".to_vec();
        junk.extend(raw);
        let err = parse_game(0, &junk).unwrap_err();
        assert!(matches!(err, MsqError::BadMagic { index: 0, offset: 0, .. }));
    }
}
