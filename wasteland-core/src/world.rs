use std::collections::BTreeMap;
use std::path::PathBuf;

use log::{debug, info};

use crate::decode::{decode_block, CodecError, DecodedBlock, Transition};
use crate::defs::{Location, PARTITION_COUNT};
use crate::modify::BlockModifier;
use crate::msq::Block;
use crate::repository::Repository;
use crate::transform::{parse_trans_ops, TransformOp};
use crate::transitions::find_transitions;
use crate::{Result, WastelandError};

/// Decoded map blocks of both partitions, indexed `[partition][block]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldState {
    pub partitions: [Vec<DecodedBlock>; PARTITION_COUNT],
}

impl WorldState {
    /// Decode every map block. The first undecodable block fails the call.
    pub fn decode(repo: &Repository) -> Result<WorldState> {
        let mut partitions: [Vec<DecodedBlock>; PARTITION_COUNT] = Default::default();

        for (p, decoded) in repo.partitions.iter().zip(partitions.iter_mut()) {
            for (i, block) in p.map_blocks().iter().enumerate() {
                let dim = p.map_dim(i).ok_or_else(|| {
                    WastelandError::Format(format!("no map dimension for block {},{}", p.index, i))
                })?;
                let db = decode_block(block, dim)
                    .map_err(|e| WastelandError::block_codec(p.index, i, e))?;
                decoded.push(db);
            }
        }

        Ok(WorldState { partitions })
    }

    pub fn block(&self, partition: usize, block: usize) -> Option<&DecodedBlock> {
        self.partitions.get(partition)?.get(block)
    }

    pub fn transition(&self, r: TransitionRef) -> Option<&Transition> {
        self.block(r.partition, r.block)?
            .transitions
            .get(r.selector)?
            .as_ref()
    }

    fn transition_mut(&mut self, r: TransitionRef) -> Option<&mut Transition> {
        self.partitions
            .get_mut(r.partition)?
            .get_mut(r.block)?
            .transitions
            .get_mut(r.selector)?
            .as_mut()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CollectConfig {
    /// Only index transitions that some grid cell actually uses.
    pub placed_only: bool,
}

/// Address of one transition table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransitionRef {
    pub partition: usize,
    pub block: usize,
    pub selector: usize,
}

/// Transitions indexed by `(location they are in, location they lead to)`.
#[derive(Clone, Debug, Default)]
pub struct Collection {
    by_pair: BTreeMap<(Location, Location), Vec<TransitionRef>>,
}

impl Collection {
    pub fn get(&self, from: Location, to: Location) -> &[TransitionRef] {
        self.by_pair
            .get(&(from, to))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_pair.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pair.is_empty()
    }
}

pub fn collect(state: &WorldState, cfg: &CollectConfig) -> Collection {
    let mut coll = Collection::default();

    for (p, blocks) in state.partitions.iter().enumerate() {
        for (b, db) in blocks.iter().enumerate() {
            let home = match Location::for_block(p, b) {
                Some(loc) => loc,
                None => continue,
            };

            let selectors: Vec<usize> = if cfg.placed_only {
                find_transitions(db)
                    .into_iter()
                    .filter(|m| !m.coords.is_empty())
                    .map(|m| m.selector)
                    .collect()
            } else {
                (0..db.transitions.len()).collect()
            };

            for selector in selectors {
                if let Some(Some(t)) = db.transitions.get(selector) {
                    coll.by_pair
                        .entry((home, t.location))
                        .or_default()
                        .push(TransitionRef {
                            partition: p,
                            block: b,
                            selector,
                        });
                }
            }
        }
    }

    debug!("collected {} location pairs", coll.len());
    coll
}

/// Point every `dst.a -> dst.b` transition where the first `src.a -> src.b`
/// transition leads. Returns the number of transitions rewritten.
pub fn exec_trans_op(coll: &Collection, state: &mut WorldState, op: &TransformOp) -> Result<usize> {
    let src_ref = *coll.get(op.src.a, op.src.b).first().ok_or_else(|| {
        WastelandError::Remap(format!("no transition from {} to {}", op.src.a, op.src.b))
    })?;
    let src = state.transition(src_ref).cloned().ok_or_else(|| {
        WastelandError::Remap(format!(
            "transition {},{} selector {} vanished",
            src_ref.partition, src_ref.block, src_ref.selector
        ))
    })?;

    let dst_refs = coll.get(op.dst.a, op.dst.b);
    if dst_refs.is_empty() {
        return Err(WastelandError::Remap(format!(
            "no transition from {} to {}",
            op.dst.a, op.dst.b
        )));
    }

    for &r in dst_refs {
        let t = state.transition_mut(r).ok_or_else(|| {
            WastelandError::Remap(format!(
                "transition {},{} selector {} vanished",
                r.partition, r.block, r.selector
            ))
        })?;
        t.flags = src.flags;
        t.x = src.x;
        t.y = src.y;
        t.location = src.location;
        debug!(
            "block {},{} selector {}: now leads to {} ({},{})",
            r.partition, r.block, r.selector, t.location, t.x, t.y
        );
    }

    Ok(dst_refs.len())
}

/// Apply `ops` in order. `state` is only replaced if every op succeeds.
pub fn apply_trans_ops(
    coll: &Collection,
    state: &mut WorldState,
    ops: &[TransformOp],
) -> Result<usize> {
    let mut working = state.clone();
    let mut rewritten = 0;
    for op in ops {
        let n = exec_trans_op(coll, &mut working, op)?;
        info!("{}: {} transitions rewritten", op, n);
        rewritten += n;
    }
    *state = working;
    Ok(rewritten)
}

/// Re-encode every changed transition record into `repo`. Blocks are only
/// replaced once all of them have been re-encoded.
pub fn commit(state: &WorldState, repo: &mut Repository) -> Result<usize> {
    let mut updated: Vec<Block> = Vec::new();
    let mut changed = 0;

    for (p, blocks) in state.partitions.iter().enumerate() {
        for (b, db) in blocks.iter().enumerate() {
            let block = repo.block(p, b).cloned().ok_or_else(|| {
                WastelandError::Format(format!("block {},{} is missing", p, b))
            })?;

            let commit_err = |source: CodecError| WastelandError::Commit {
                partition: p,
                block: b,
                source,
            };
            let mut m = BlockModifier::new(block, db.dim).map_err(commit_err)?;
            let n = m.replace_transitions(&db.transitions).map_err(commit_err)?;
            if n > 0 {
                debug!("block {},{}: {} transition records changed", p, b, n);
                changed += n;
                updated.push(m.into_block());
            }
        }
    }

    for block in updated {
        let (p, b) = (block.partition(), block.index());
        if let Some(slot) = repo.block_mut(p, b) {
            *slot = block;
        }
    }

    Ok(changed)
}

pub struct RemapSettings {
    pub dir: PathBuf,
    pub op_strings: Vec<String>,
}

/// Parse the ops, apply them to the game in `settings.dir` and write it
/// back. Nothing is written unless every op applies.
pub fn remap_transitions(settings: &RemapSettings) -> Result<usize> {
    let ops = parse_trans_ops(settings.op_strings.as_slice())?;
    if ops.is_empty() {
        return Err(WastelandError::Remap("no operations given".to_string()));
    }

    let mut repo = Repository::read_dir(&settings.dir)?;
    let mut state = WorldState::decode(&repo)?;
    let coll = collect(&state, &CollectConfig::default());

    apply_trans_ops(&coll, &mut state, &ops)?;
    let changed = commit(&state, &mut repo)?;
    repo.write_dir(&settings.dir)?;

    info!(
        "applied {} operations, {} transition records changed",
        ops.len(),
        changed
    );
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::parse_location_no_case;
    use crate::testkit::{corrupt_map_block, sample_game_dir, sample_repository, scratch_dir};
    use crate::transform::parse_trans_op;
    use std::fs;

    fn loc(name: &str) -> Location {
        parse_location_no_case(name).unwrap()
    }

    fn state() -> WorldState {
        WorldState::decode(&sample_repository()).unwrap()
    }

    #[test]
    fn collect_indexes_by_home_and_destination() {
        let coll = collect(&state(), &CollectConfig::default());
        assert_eq!(
            coll.get(loc("highpool"), loc("agcenter")),
            &[TransitionRef {
                partition: 0,
                block: 1,
                selector: 2
            }]
        );
        assert_eq!(coll.get(loc("highpool"), loc("ranger")).len(), 1);
        assert!(coll.get(loc("highpool"), loc("vegas")).is_empty());
    }

    #[test]
    fn placed_only_skips_unplaced_selectors() {
        let coll = collect(&state(), &CollectConfig { placed_only: true });
        // Selector 3 leads to seed + 2 and sits on no cell.
        assert!(coll.get(loc("highpool"), loc("ranger")).is_empty());
        assert_eq!(coll.get(loc("highpool"), loc("agcenter")).len(), 1);
    }

    #[test]
    fn op_copies_the_source_target() {
        let mut st = state();
        let coll = collect(&st, &CollectConfig::default());
        let op = parse_trans_op("highpool,agcenter <- ranger,quartz").unwrap();
        assert_eq!(exec_trans_op(&coll, &mut st, &op).unwrap(), 1);

        let t = st.block(0, 1).unwrap().transitions[2].clone().unwrap();
        assert_eq!(t.location, loc("quartz"));
        assert_eq!((t.flags, t.x, t.y), (1, 3, 3));
        // The source is untouched.
        let src = st.block(0, 3).unwrap().transitions[2].clone().unwrap();
        assert_eq!(src.location, loc("quartz"));
    }

    #[test]
    fn missing_pairs_are_remap_errors() {
        let mut st = state();
        let coll = collect(&st, &CollectConfig::default());

        let no_src = parse_trans_op("highpool,agcenter <- vegas,mars").unwrap();
        assert!(matches!(
            exec_trans_op(&coll, &mut st, &no_src).unwrap_err(),
            WastelandError::Remap(_)
        ));
        let no_dst = parse_trans_op("vegas,mars <- ranger,quartz").unwrap();
        assert!(matches!(
            exec_trans_op(&coll, &mut st, &no_dst).unwrap_err(),
            WastelandError::Remap(_)
        ));
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut st = state();
        let before = st.clone();
        let coll = collect(&st, &CollectConfig::default());
        let ops = [
            parse_trans_op("highpool,agcenter <- ranger,quartz").unwrap(),
            parse_trans_op("vegas,mars <- ranger,quartz").unwrap(),
        ];
        assert!(apply_trans_ops(&coll, &mut st, &ops).is_err());
        assert_eq!(st, before);

        assert_eq!(apply_trans_ops(&coll, &mut st, &ops[..1]).unwrap(), 1);
        assert_ne!(st, before);
    }

    #[test]
    fn commit_touches_only_changed_blocks() {
        let mut repo = sample_repository();
        let original = repo.clone();
        let mut st = WorldState::decode(&repo).unwrap();
        assert_eq!(commit(&st, &mut repo).unwrap(), 0);
        assert_eq!(repo, original);

        let coll = collect(&st, &CollectConfig::default());
        let op = parse_trans_op("highpool,agcenter <- ranger,quartz").unwrap();
        exec_trans_op(&coll, &mut st, &op).unwrap();
        assert_eq!(commit(&st, &mut repo).unwrap(), 1);

        for p in 0..PARTITION_COUNT {
            for (b, block) in repo.partition(p).blocks.iter().enumerate() {
                let same = block == &original.partition(p).blocks[b];
                assert_eq!(same, (p, b) != (0, 1), "block {p},{b}");
            }
        }
        assert_eq!(WorldState::decode(&repo).unwrap(), st);
    }

    #[test]
    fn remap_writes_the_game_back() {
        let (dir, _) = sample_game_dir("world-remap");
        let settings = RemapSettings {
            dir: dir.clone(),
            op_strings: vec!["[1 HIGHPOOL], [2 AGCENTER] <- ranger,quartz".to_string()],
        };
        assert_eq!(remap_transitions(&settings).unwrap(), 1);

        let reread = Repository::read_dir(&dir).unwrap();
        let st = WorldState::decode(&reread).unwrap();
        let t = st.block(0, 1).unwrap().transitions[2].clone().unwrap();
        assert_eq!(t.location, loc("quartz"));
    }

    #[test]
    fn failed_remap_leaves_files_untouched() {
        let (dir, _) = sample_game_dir("world-remap-fail");
        let game1 = fs::read(dir.join("GAME1")).unwrap();

        for ops in [
            vec!["highpool,agcenter <- ranger,quartz", "highpool"],
            vec!["highpool,agcenter <- ranger,quartz", "vegas,mars <- ranger,quartz"],
        ] {
            let settings = RemapSettings {
                dir: dir.clone(),
                op_strings: ops.into_iter().map(String::from).collect(),
            };
            assert!(remap_transitions(&settings).is_err());
            assert_eq!(fs::read(dir.join("GAME1")).unwrap(), game1);
        }
    }

    #[test]
    fn undecodable_map_block_fails_decode_and_remap() {
        let mut repo = sample_repository();
        corrupt_map_block(&mut repo, 0, 7);

        let err = WorldState::decode(&repo).unwrap_err();
        assert!(matches!(
            err,
            WastelandError::BlockCodec {
                partition: 0,
                block: 7,
                source: CodecError::OffsetInHeader { .. },
            }
        ));

        let dir = scratch_dir("world-remap-undecodable");
        repo.write_dir(&dir).unwrap();
        let game1 = fs::read(dir.join("GAME1")).unwrap();
        let game2 = fs::read(dir.join("GAME2")).unwrap();

        let settings = RemapSettings {
            dir: dir.clone(),
            op_strings: vec!["highpool,agcenter <- ranger,quartz".to_string()],
        };
        let err = remap_transitions(&settings).unwrap_err();
        assert!(matches!(err, WastelandError::BlockCodec { partition: 0, block: 7, .. }));
        assert_eq!(fs::read(dir.join("GAME1")).unwrap(), game1);
        assert_eq!(fs::read(dir.join("GAME2")).unwrap(), game2);
    }
}
