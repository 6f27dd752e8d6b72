use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use fpl_toolkit::config::RulesConfig;
use fpl_toolkit::rules::validate_squad;
use fpl_toolkit::season::SeasonState;
use fpl_toolkit::season_csv::{
    add_gameweek, assemble_season, parse_gameweek_csv, parse_player_idlist_csv,
    parse_players_raw_csv, parse_teams_csv,
};
use fpl_toolkit::season_data::SeasonData;
use fpl_toolkit::squad::{Squad, SquadSelection};

const TEAMS_CSV: &str = include_str!("../tests/fixtures/2020-21/teams.csv");
const IDLIST_CSV: &str = include_str!("../tests/fixtures/2020-21/player_idlist.csv");
const PLAYERS_CSV: &str = include_str!("../tests/fixtures/2020-21/players_raw.csv");
const GW1_CSV: &str = include_str!("../tests/fixtures/2020-21/gws/gw1.csv");
const GW2_CSV: &str = include_str!("../tests/fixtures/2020-21/gws/gw2.csv");
const SQUAD_JSON: &str = include_str!("../tests/fixtures/squad.json");

fn sample_season() -> SeasonData {
    let mut data = assemble_season(
        "2020-21",
        parse_teams_csv(TEAMS_CSV).unwrap(),
        parse_player_idlist_csv(IDLIST_CSV).unwrap(),
        parse_players_raw_csv(PLAYERS_CSV).unwrap(),
    );
    add_gameweek(&mut data, 1, parse_gameweek_csv(GW1_CSV).unwrap());
    add_gameweek(&mut data, 2, parse_gameweek_csv(GW2_CSV).unwrap());
    data
}

fn sample_squad(data: &SeasonData) -> Squad {
    let selection: SquadSelection = serde_json::from_str(SQUAD_JSON).expect("valid squad json");
    Squad::from_selection(&selection, data).expect("valid squad")
}

fn bench_csv_parse(c: &mut Criterion) {
    c.bench_function("season_csv_parse", |b| {
        b.iter(|| {
            let players = parse_players_raw_csv(black_box(PLAYERS_CSV)).unwrap();
            let rows = parse_gameweek_csv(black_box(GW2_CSV)).unwrap();
            black_box((players.len(), rows.len()));
        })
    });
}

fn bench_validate_squad(c: &mut Criterion) {
    let data = sample_season();
    let squad = sample_squad(&data);
    c.bench_function("validate_squad", |b| {
        b.iter(|| {
            let cost = validate_squad(black_box(&squad), &data, 1000, 3, 1).unwrap();
            black_box(cost);
        })
    });
}

fn bench_full_season(c: &mut Criterion) {
    let data = sample_season();
    let squad = sample_squad(&data);
    c.bench_function("simulate_full_season", |b| {
        b.iter(|| {
            let mut state =
                SeasonState::new(squad.clone(), &data, RulesConfig::default()).unwrap();
            while !state.is_over() {
                state.advance_gameweek(&data).unwrap();
            }
            black_box(state.total_points());
        })
    });
}

criterion_group!(
    perf,
    bench_csv_parse,
    bench_validate_squad,
    bench_full_season
);
criterion_main!(perf);
