use std::fs;

use wasteland_core::defs::{parse_location_no_case, PARTY_ROSTER_BLOCK};
use wasteland_core::testkit::sample_game_dir;
use wasteland_core::transitions::transition_report;
use wasteland_core::world::WorldState;
use wasteland_core::{
    remap_transitions, run_cheats, CheatSettings, RemapSettings, Repository, RosterSchema,
    WastelandError,
};

#[test]
fn remap_then_report() {
    let (dir, _) = sample_game_dir("it-remap");
    let changed = remap_transitions(&RemapSettings {
        dir: dir.clone(),
        op_strings: vec![
            "highpool,agcenter <- ranger,quartz".to_string(),
            "Vegas,Sewers1 <- spades,casino".to_string(),
        ],
    })
    .unwrap();
    assert_eq!(changed, 2);

    let repo = Repository::read_dir(&dir).unwrap();
    let report = transition_report(&repo).unwrap();
    let highpool = &report.game1.blocks[1].transitions;
    let sel2 = highpool.iter().find(|e| e.selector == 2).unwrap();
    assert_eq!(sel2.location_name, "QUARTZ");
    assert_eq!(sel2.transition.x, 3);

    let vegas = &report.game2.blocks[1].transitions;
    let sel2 = vegas.iter().find(|e| e.selector == 2).unwrap();
    assert_eq!(sel2.location_name, "CASINO");
}

#[test]
fn unparsable_op_touches_nothing() {
    let (dir, _) = sample_game_dir("it-remap-bad");
    let game1 = fs::read(dir.join("GAME1")).unwrap();
    let game2 = fs::read(dir.join("GAME2")).unwrap();

    let err = remap_transitions(&RemapSettings {
        dir: dir.clone(),
        op_strings: vec![
            "highpool,agcenter <- ranger,quartz".to_string(),
            "highpool,agcenter <- ranger,narnia".to_string(),
        ],
    })
    .unwrap_err();
    assert!(matches!(err, WastelandError::OpParse(_)));
    assert!(err.to_string().contains("narnia"));

    assert_eq!(fs::read(dir.join("GAME1")).unwrap(), game1);
    assert_eq!(fs::read(dir.join("GAME2")).unwrap(), game2);
}

#[test]
fn cheats_then_remap_compose() {
    let (dir, _) = sample_game_dir("it-cheat-remap");
    run_cheats(&CheatSettings {
        dir: dir.clone(),
        roster_schema: RosterSchema::Extended,
    })
    .unwrap();
    remap_transitions(&RemapSettings {
        dir: dir.clone(),
        op_strings: vec!["highpool,agcenter <- ranger,quartz".to_string()],
    })
    .unwrap();

    let repo = Repository::read_dir(&dir).unwrap();
    let state = WorldState::decode(&repo).unwrap();
    assert!(state
        .partitions
        .iter()
        .flatten()
        .all(|db| db.map_info.encounter_freq == 0));
    let t = state.block(0, 1).unwrap().transitions[2].clone().unwrap();
    assert_eq!(t.location, parse_location_no_case("quartz").unwrap());

    let roster = repo.block(0, PARTY_ROSTER_BLOCK).unwrap().enc_section();
    assert_eq!(roster[0x120], 0x7f);
    assert_eq!(roster[0x31a], 15);
}
