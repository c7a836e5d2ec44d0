use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::decode::{decode_block, DecodedBlock, Transition};
use crate::defs::{location_string, Point, ACTION_TRANSITION};
use crate::repository::{GamePartition, Repository};
use crate::{Result, WastelandError};

/// One transition selector and every grid cell that uses it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionMark {
    pub selector: usize,
    pub coords: Vec<Point>,
}

/// Every transition selector of a block: those placed on the grid plus every
/// index of the transition table, one mark each, ascending by selector.
pub fn find_transitions(db: &DecodedBlock) -> Vec<TransitionMark> {
    let mut by_selector: BTreeMap<usize, Vec<Point>> = BTreeMap::new();

    for (y, (classes, selectors)) in db
        .map_data
        .action_classes
        .iter()
        .zip(&db.map_data.action_selectors)
        .enumerate()
    {
        for (x, (&class, &selector)) in classes.iter().zip(selectors).enumerate() {
            if class == ACTION_TRANSITION {
                by_selector
                    .entry(selector as usize)
                    .or_default()
                    .push(Point::new(x, y));
            }
        }
    }

    // Table entries nobody can walk onto still count.
    for selector in 0..db.transitions.len() {
        by_selector.entry(selector).or_default();
    }

    by_selector
        .into_iter()
        .map(|(selector, coords)| TransitionMark { selector, coords })
        .collect()
}

#[derive(Clone, Debug, Serialize)]
pub struct TransitionReportEntry {
    #[serde(flatten)]
    pub transition: Transition,
    pub coords: Vec<Point>,
    pub selector: usize,
    pub location_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct BlockTransitions {
    pub block: usize,
    pub transitions: Vec<TransitionReportEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameTransitions {
    pub blocks: Vec<BlockTransitions>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TransitionReport {
    pub game1: GameTransitions,
    pub game2: GameTransitions,
}

/// Marks of `db` that resolve to a non-null table entry, annotated with the
/// entry and its destination name.
pub fn block_transition_report(db: &DecodedBlock) -> Vec<TransitionReportEntry> {
    find_transitions(db)
        .into_iter()
        .filter_map(|mark| {
            let t = db.transitions.get(mark.selector)?.as_ref()?;
            Some(TransitionReportEntry {
                transition: t.clone(),
                location_name: location_string(t.location),
                coords: mark.coords,
                selector: mark.selector,
            })
        })
        .collect()
}

fn game_transitions(partition: &GamePartition) -> Result<GameTransitions> {
    let mut blocks = Vec::with_capacity(partition.map_block_count());

    for (i, block) in partition.map_blocks().iter().enumerate() {
        let dim = partition.map_dim(i).ok_or_else(|| {
            WastelandError::Format(format!("no map dimension for block {},{}", partition.index, i))
        })?;
        let db = decode_block(block, dim)
            .map_err(|e| WastelandError::block_codec(partition.index, i, e))?;
        let transitions = block_transition_report(&db);
        debug!(
            "block {},{}: {} reported transitions",
            partition.index,
            i,
            transitions.len()
        );
        blocks.push(BlockTransitions {
            block: i,
            transitions,
        });
    }

    Ok(GameTransitions { blocks })
}

/// Transition report over the map blocks of both partitions.
pub fn transition_report(repo: &Repository) -> Result<TransitionReport> {
    Ok(TransitionReport {
        game1: game_transitions(repo.partition(0))?,
        game2: game_transitions(repo.partition(1))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{Location, MapDimension};
    use crate::decode::CodecError;
    use crate::testkit::{corrupt_map_block, sample_repository, MapBlockSpec, TRANSITION_TEST_DIM};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn decoded(seed: usize) -> DecodedBlock {
        let spec = MapBlockSpec::sample(TRANSITION_TEST_DIM, seed);
        decode_block(&spec.build_block(0, 1), spec.dim).unwrap()
    }

    #[test]
    fn empty_grid_yields_one_empty_mark_per_table_entry() {
        let mut db = decoded(1);
        for row in db.map_data.action_classes.iter_mut() {
            row.fill(0);
        }
        let marks = find_transitions(&db);
        assert_eq!(marks.len(), db.transitions.len());
        for (i, mark) in marks.iter().enumerate() {
            assert_eq!(mark.selector, i);
            assert!(mark.coords.is_empty());
        }
    }

    #[test]
    fn placed_and_unplaced_selectors_are_merged() {
        let db = decoded(1);
        let marks = find_transitions(&db);
        let w = TRANSITION_TEST_DIM.width;
        let h = TRANSITION_TEST_DIM.height;
        assert_eq!(
            marks,
            vec![
                TransitionMark {
                    selector: 0,
                    coords: vec![Point::new(1, 1), Point::new(2, 1)],
                },
                TransitionMark {
                    selector: 1,
                    coords: vec![],
                },
                TransitionMark {
                    selector: 2,
                    coords: vec![Point::new(w - 1, h - 1)],
                },
                TransitionMark {
                    selector: 3,
                    coords: vec![],
                },
            ]
        );
    }

    #[test]
    fn selectors_beyond_the_table_are_kept_but_not_reported() {
        let mut db = decoded(1);
        db.map_data.action_classes[4][4] = ACTION_TRANSITION;
        db.map_data.action_selectors[4][4] = 9;

        let marks = find_transitions(&db);
        assert_eq!(marks.last().unwrap().selector, 9);
        assert_eq!(marks.last().unwrap().coords, vec![Point::new(4, 4)]);

        let reported: Vec<usize> = block_transition_report(&db)
            .iter()
            .map(|e| e.selector)
            .collect();
        // 1 is null, 9 is past the table.
        assert_eq!(reported, vec![0, 2, 3]);
    }

    #[test]
    fn report_entries_carry_the_destination_name() {
        let db = decoded(1);
        let report = block_transition_report(&db);
        assert_eq!(report[0].location_name, "WORLD");
        assert_eq!(report[1].transition.location, Location(2));
        assert_eq!(report[1].location_name, "AGCENTER");

        let json = serde_json::to_value(&report[0]).unwrap();
        assert_eq!(json["selector"], 0);
        assert_eq!(json["location_name"], "WORLD");
        assert_eq!(json["Location"], 0);
        assert_eq!(json["coords"][1]["X"], 2);
    }

    #[test]
    fn random_grids_never_duplicate_selectors() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let dim = MapDimension::new(16, 12);
        let template = decoded(2);
        let entry = template.transitions[0].clone();

        for _ in 0..200 {
            let mut db = template.clone();
            db.map_data = crate::decode::MapData::new(dim);
            let table_len = rng.gen_range(0..12);
            db.transitions = (0..table_len)
                .map(|_| if rng.gen_bool(0.7) { entry.clone() } else { None })
                .collect();

            let mut on_grid = BTreeSet::new();
            let mut cells = 0usize;
            for y in 0..dim.height {
                for x in 0..dim.width {
                    if rng.gen_bool(0.1) {
                        let s: u8 = rng.gen_range(0..20);
                        db.map_data.action_classes[y][x] = ACTION_TRANSITION;
                        db.map_data.action_selectors[y][x] = s;
                        on_grid.insert(s as usize);
                        cells += 1;
                    } else {
                        db.map_data.action_classes[y][x] = rng.gen_range(0..ACTION_TRANSITION);
                        db.map_data.action_selectors[y][x] = rng.gen();
                    }
                }
            }

            let marks = find_transitions(&db);
            let expected: BTreeSet<usize> = on_grid.into_iter().chain(0..table_len).collect();
            let selectors: Vec<usize> = marks.iter().map(|m| m.selector).collect();
            assert_eq!(selectors, expected.into_iter().collect::<Vec<_>>());
            assert_eq!(marks.iter().map(|m| m.coords.len()).sum::<usize>(), cells);
        }
    }

    #[test]
    fn whole_game_report_lists_every_map_block() {
        let repo = sample_repository();
        let report = transition_report(&repo).unwrap();
        assert_eq!(report.game1.blocks.len(), 20);
        assert_eq!(report.game2.blocks.len(), 22);
        for block in report.game1.blocks.iter().chain(&report.game2.blocks) {
            let selectors: Vec<usize> = block.transitions.iter().map(|e| e.selector).collect();
            assert_eq!(selectors, vec![0, 2, 3]);
        }
    }

    #[test]
    fn undecodable_map_block_fails_the_report_by_address() {
        let mut repo = sample_repository();
        corrupt_map_block(&mut repo, 1, 4);

        let err = transition_report(&repo).unwrap_err();
        match &err {
            WastelandError::BlockCodec {
                partition: 1,
                block: 4,
                source: CodecError::OffsetInHeader { offset: 4, .. },
            } => {}
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("block 1,4"));
    }
}
