use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use fpl_toolkit::config::{ToolkitConfig, arg_value, has_flag, init_logging};
use fpl_toolkit::points_model::{PointsModel, prior_season_points, season_total_points};
use fpl_toolkit::position::Position;
use fpl_toolkit::rules::squad_cost;
use fpl_toolkit::season_data::{SeasonDataProvider, format_price};
use fpl_toolkit::season_db;
use fpl_toolkit::selection::select_initial_squad;
use fpl_toolkit::squad::{PlayerRef, SquadSelection};

/// Picks a gameweek 1 squad for `--season`. Predictions come from `--model`
/// when given, otherwise from the totals of `--prev-season` (the season
/// before by default). `--hindsight` ranks on the season's own totals.
fn main() -> Result<()> {
    init_logging();
    let config = ToolkitConfig::from_env()?;
    let season = arg_value("--season").unwrap_or_else(|| config.season.clone());
    let out_path = arg_value("--out").map(PathBuf::from);

    let db_path = config.db_path.as_deref();
    let data = season_db::load_or_fetch(db_path, &config.source, &season)?;
    let predictions = match arg_value("--model") {
        Some(path) => PointsModel::load(&PathBuf::from(path))?.predict_season(&data),
        None if has_flag("--hindsight") => season_total_points(&data),
        None => {
            let prev_season = match arg_value("--prev-season") {
                Some(prev) => prev,
                None => previous_season(&season)
                    .ok_or_else(|| anyhow!("cannot tell the season before '{season}'"))?,
            };
            let prev = season_db::load_or_fetch(db_path, &config.source, &prev_season)?;
            prior_season_points(&prev, &data)
        }
    };

    let squad = select_initial_squad(&data, &predictions, &config.rules, 1)?;
    let cost = squad_cost(&squad, &data, 1)?;
    println!(
        "{season}: formation {}, cost {} of {}",
        squad.formation(),
        format_price(cost),
        format_price(config.rules.budget)
    );
    for pick in squad.picks() {
        let name = data
            .player(pick.id)
            .map(|p| p.full_name())
            .unwrap_or_default();
        let mark = if pick.id == squad.captain() {
            " (C)"
        } else if pick.id == squad.vice_captain() {
            " (V)"
        } else if squad.is_benched(pick.id) {
            " (bench)"
        } else {
            ""
        };
        println!(
            "  {} {:<28} {:>6.1}{mark}",
            pick.position,
            name,
            predictions.get(&pick.id).copied().unwrap_or_default()
        );
    }

    if let Some(out_path) = out_path {
        let ids = |pos: Position| -> Vec<PlayerRef> {
            squad.group(pos).into_iter().map(PlayerRef::Id).collect()
        };
        let selection = SquadSelection {
            keepers: ids(Position::Goalkeeper),
            defenders: ids(Position::Defender),
            midfielders: ids(Position::Midfielder),
            forwards: ids(Position::Forward),
            bench: squad.bench().iter().copied().map(PlayerRef::Id).collect(),
            captain: PlayerRef::Id(squad.captain()),
            vice_captain: PlayerRef::Id(squad.vice_captain()),
        };
        let raw = serde_json::to_string_pretty(&selection).context("serialize squad")?;
        fs::write(&out_path, raw).with_context(|| format!("write {}", out_path.display()))?;
        println!("squad written: {}", out_path.display());
    }
    Ok(())
}

/// `2020-21` -> `2019-20`.
fn previous_season(season: &str) -> Option<String> {
    let start: u32 = season.get(..4)?.parse().ok()?;
    let prev = start.checked_sub(1)?;
    Some(format!("{prev}-{:02}", start % 100))
}

#[cfg(test)]
mod tests {
    use super::previous_season;

    #[test]
    fn season_before_rolls_back_one_year() {
        assert_eq!(previous_season("2020-21").as_deref(), Some("2019-20"));
        assert_eq!(previous_season("2000-01").as_deref(), Some("1999-00"));
        assert_eq!(previous_season("latest"), None);
    }
}
