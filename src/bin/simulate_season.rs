use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use fpl_toolkit::chips::Chip;
use fpl_toolkit::config::{ToolkitConfig, arg_value, init_logging};
use fpl_toolkit::points_model::PointsModel;
use fpl_toolkit::season::SeasonState;
use fpl_toolkit::season_data::{SeasonData, SeasonDataProvider, format_price};
use fpl_toolkit::season_db;
use fpl_toolkit::season_export::export_season;
use fpl_toolkit::selection::select_initial_squad;
use fpl_toolkit::squad::{PlayerRef, Squad, SquadSelection};

#[derive(Debug, Deserialize)]
struct PlannedTransfer {
    out: PlayerRef,
    #[serde(rename = "in")]
    incoming: PlayerRef,
}

/// Actions for one gameweek, applied before it is played.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlannedGameweek {
    gameweek: u8,
    transfers: Vec<PlannedTransfer>,
    chip: Option<String>,
    captain: Option<PlayerRef>,
    vice_captain: Option<PlayerRef>,
}

fn main() -> Result<()> {
    init_logging();
    let config = ToolkitConfig::from_env()?;
    let season = arg_value("--season").unwrap_or_else(|| config.season.clone());
    let data = season_db::load_or_fetch(config.db_path.as_deref(), &config.source, &season)?;

    let squad = match (arg_value("--squad"), arg_value("--model")) {
        (Some(path), _) => load_squad(Path::new(&path), &data)?,
        (None, Some(model)) => {
            let predictions = PointsModel::load(Path::new(&model))?.predict_season(&data);
            select_initial_squad(&data, &predictions, &config.rules, 1)?
        }
        (None, None) => return Err(anyhow!("pass --squad squad.json or --model model.json")),
    };
    let plan = match arg_value("--plan") {
        Some(path) => load_plan(Path::new(&path))?,
        None => BTreeMap::new(),
    };

    let mut state = SeasonState::new(squad, &data, config.rules)?;
    println!(
        "{season}: starting {} with {} in the bank",
        state.squad().formation(),
        format_price(state.bank())
    );
    while !state.is_over() {
        let gameweek = state.gameweek();
        if let Some(actions) = plan.get(&gameweek) {
            apply_plan(&mut state, &data, actions)
                .with_context(|| format!("gw{gameweek} plan"))?;
        }
        let outcome = state.advance_gameweek(&data)?;
        let chip = outcome.chip.map(|c| format!(" [{c}]")).unwrap_or_default();
        let subs = if outcome.substitutions.is_empty() {
            String::new()
        } else {
            format!(" ({} auto-sub)", outcome.substitutions.len())
        };
        println!(
            "GW{:>2} {:>4} pts (hit {:>2}) total {:>5}{chip}{subs}",
            outcome.gameweek,
            outcome.points,
            outcome.hit,
            state.total_points()
        );
    }
    println!("final total: {} points", state.total_points());

    if let Some(out) = arg_value("--out").map(PathBuf::from) {
        let report = export_season(&out, &state, &data)?;
        println!(
            "report written: {} ({} gameweeks, {} players)",
            out.display(),
            report.gameweeks,
            report.players
        );
    }
    Ok(())
}

fn load_squad(path: &Path, data: &SeasonData) -> Result<Squad> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let selection: SquadSelection =
        serde_json::from_str(&raw).with_context(|| format!("parse squad {}", path.display()))?;
    Ok(Squad::from_selection(&selection, data)?)
}

fn load_plan(path: &Path) -> Result<BTreeMap<u8, PlannedGameweek>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let entries: Vec<PlannedGameweek> =
        serde_json::from_str(&raw).with_context(|| format!("parse plan {}", path.display()))?;
    let mut plan = BTreeMap::new();
    for entry in entries {
        let gameweek = entry.gameweek;
        if plan.insert(gameweek, entry).is_some() {
            return Err(anyhow!("gw{gameweek} appears twice in the plan"));
        }
    }
    Ok(plan)
}

fn apply_plan(state: &mut SeasonState, data: &SeasonData, actions: &PlannedGameweek) -> Result<()> {
    let chip = match actions.chip.as_deref() {
        Some(label) => Some(Chip::parse(label).with_context(|| format!("unknown chip '{label}'"))?),
        None => None,
    };

    let mut squad = state.squad().clone();
    for transfer in &actions.transfers {
        let out = transfer.out.resolve(data)?;
        let incoming = transfer.incoming.resolve(data)?;
        squad = squad.with_replacement(out, incoming, data)?;
    }
    if actions.captain.is_some() || actions.vice_captain.is_some() {
        let captain = match &actions.captain {
            Some(r) => r.resolve(data)?,
            None => squad.captain(),
        };
        let vice = match &actions.vice_captain {
            Some(r) => r.resolve(data)?,
            None => squad.vice_captain(),
        };
        squad = squad.with_captains(captain, vice)?;
    }

    let summary = state.perform_actions(data, squad, chip)?;
    if summary.transfers > 0 {
        let names: Vec<String> = actions
            .transfers
            .iter()
            .filter_map(|t| t.incoming.resolve(data).ok())
            .filter_map(|id| data.player(id).map(|p| p.web_name.clone()))
            .collect();
        println!(
            "GW{:>2} in: {} (bank {}, {} free left)",
            summary.gameweek,
            names.join(", "),
            format_price(summary.bank),
            summary.free_transfers
        );
    }
    Ok(())
}
