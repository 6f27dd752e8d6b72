use std::fs;
use std::path::PathBuf;

use fpl_toolkit::chips::{Chip, FreeTransfers};
use fpl_toolkit::config::RulesConfig;
use fpl_toolkit::rules::collect_violations;
use fpl_toolkit::season::{GameError, SeasonState};
use fpl_toolkit::season_csv::{SeasonSource, load_season};
use fpl_toolkit::season_data::SeasonData;
use fpl_toolkit::season_export::export_season;
use fpl_toolkit::squad::{Squad, SquadSelection};

fn fixtures_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path
}

fn fixture_season() -> SeasonData {
    load_season(&SeasonSource::Local(fixtures_dir()), "2020-21").expect("fixture season should load")
}

fn fixture_squad(data: &SeasonData) -> Squad {
    let raw = fs::read_to_string(fixtures_dir().join("squad.json")).expect("squad fixture");
    let selection: SquadSelection = serde_json::from_str(&raw).expect("squad json should parse");
    Squad::from_selection(&selection, data).expect("squad should resolve")
}

#[test]
fn fixture_squad_is_legal() {
    let data = fixture_season();
    let squad = fixture_squad(&data);
    assert_eq!(squad.captain(), 15);
    assert_eq!(squad.vice_captain(), 19);
    assert_eq!(squad.formation().to_string(), "4-4-2");
    assert!(collect_violations(&squad, &data, 1000, 3, 1).is_empty());

    let violations = collect_violations(&squad, &data, 980, 2, 1);
    let kinds: Vec<&str> = violations.iter().map(|v| v.kind()).collect();
    assert!(kinds.contains(&"budget"), "{kinds:?}");
    assert!(kinds.contains(&"club_cap"), "{kinds:?}");
}

#[test]
fn plays_gameweeks_with_subs_and_double_fixtures() {
    let data = fixture_season();
    let mut state = SeasonState::new(fixture_squad(&data), &data, RulesConfig::default())
        .expect("valid start");
    assert_eq!(state.bank(), 15);

    // Mount did not play in gw1; Saka comes off the bench.
    let gw1 = state.advance_gameweek(&data).unwrap();
    assert_eq!(gw1.points, 59);
    assert_eq!(gw1.substitutions.len(), 1);
    assert_eq!(gw1.substitutions[0].player_out, 13);
    assert_eq!(gw1.substitutions[0].player_in, 11);
    assert_eq!(state.free_transfers(), FreeTransfers::Bounded(2));

    // Salah's two gw2 fixtures count together, then get doubled.
    let gw2 = state.advance_gameweek(&data).unwrap();
    assert_eq!(gw2.points, 48);
    assert!(gw2.substitutions.is_empty());
    assert_eq!(state.total_points(), 107);

    while !state.is_over() {
        state.advance_gameweek(&data).unwrap();
    }
    assert_eq!(state.total_points(), 107);
    assert_eq!(state.history().len(), 38);
    assert!(matches!(
        state.advance_gameweek(&data),
        Err(GameError::SeasonOver)
    ));
}

#[test]
fn transfer_spends_the_bank_without_a_hit() {
    let data = fixture_season();
    let mut state = SeasonState::new(fixture_squad(&data), &data, RulesConfig::default())
        .expect("valid start");
    state.advance_gameweek(&data).unwrap();

    let new_squad = state
        .squad()
        .with_replacement(18, 21, &data)
        .expect("swap forwards");
    let summary = state.perform_actions(&data, new_squad, None).unwrap();
    assert_eq!(summary.transfers, 1);
    assert_eq!(summary.hit, 0);
    assert_eq!(summary.bank, 5);
    assert!(state.squad().is_benched(21));

    // Firmino scores from the bench, which does not count.
    let gw2 = state.advance_gameweek(&data).unwrap();
    assert_eq!(gw2.points, 48);
}

#[test]
fn bench_boost_counts_the_whole_squad() {
    let data = fixture_season();
    let mut state = SeasonState::new(fixture_squad(&data), &data, RulesConfig::default())
        .expect("valid start");
    let squad = state.squad().clone();
    state
        .perform_actions(&data, squad, Some(Chip::BenchBoost))
        .unwrap();

    // No auto-subs: Mount's zero stays and every bench point counts.
    let gw1 = state.advance_gameweek(&data).unwrap();
    assert!(gw1.substitutions.is_empty());
    assert_eq!(gw1.points, 55 + 10);
    assert_eq!(gw1.chip, Some(Chip::BenchBoost));
    assert!(state.chips().is_used(Chip::BenchBoost));
    assert_eq!(state.active_chip(), None);
}

#[test]
fn unaffordable_transfer_leaves_state_untouched() {
    let data = fixture_season();
    let mut state = SeasonState::new(fixture_squad(&data), &data, RulesConfig::default())
        .expect("valid start");
    // Watkins (6.0) for De Bruyne (11.5) is the wrong position anyway.
    assert!(state.squad().with_replacement(19, 16, &data).is_err());

    // Gündoğan (5.5) for De Bruyne (11.5) overspends a 1.5 bank.
    let pricey = state.squad().with_replacement(17, 16, &data).unwrap();
    let err = state.perform_actions(&data, pricey, None).unwrap_err();
    assert!(matches!(err, GameError::Rule(_)), "{err:?}");
    assert_eq!(state.bank(), 15);
    assert!(state.squad().contains(17));
}

#[test]
fn exports_season_report_to_xlsx() {
    let data = fixture_season();
    let mut state = SeasonState::new(fixture_squad(&data), &data, RulesConfig::default())
        .expect("valid start");
    state.advance_gameweek(&data).unwrap();
    state.advance_gameweek(&data).unwrap();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("season.xlsx");
    let report = export_season(&path, &state, &data).expect("export");
    assert_eq!(report.gameweeks, 2);
    assert_eq!(report.players, 15);
    let meta = fs::metadata(&path).expect("report written");
    assert!(meta.len() > 0);
}
