use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use log::info;

use fpl_toolkit::config::{ToolkitConfig, arg_value, init_logging};
use fpl_toolkit::position::Position;
use fpl_toolkit::rules::collect_violations;
use fpl_toolkit::season_data::{SeasonData, SeasonDataProvider, format_price};
use fpl_toolkit::season_db;
use fpl_toolkit::squad::{Squad, SquadSelection};

const USAGE: &str = "usage: fpl_toolkit <command> [--season 2020-21] [--db path]

commands:
  teams                 list the clubs of the season
  positions             list the four positions
  search <words...>     players whose name contains every word
  player <name>         details for one player (full name or web name)
  validate <squad.json> check a squad selection against the rules
  seasons               seasons stored in the sqlite cache";

fn main() -> Result<()> {
    init_logging();
    let config = ToolkitConfig::from_env()?;
    let season = arg_value("--season").unwrap_or_else(|| config.season.clone());
    let db_path = arg_value("--db").map(PathBuf::from).or(config.db_path.clone());

    let args = positional_args();
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };

    match command.as_str() {
        "positions" => {
            list_positions();
            Ok(())
        }
        "seasons" => {
            let db_path = db_path.context("unable to resolve sqlite path")?;
            let conn = season_db::open_db(&db_path)?;
            for stored in season_db::list_seasons(&conn)? {
                println!("{stored}");
            }
            Ok(())
        }
        "teams" | "search" | "player" | "validate" => {
            let data = season_db::load_or_fetch(db_path.as_deref(), &config.source, &season)?;
            match command.as_str() {
                "teams" => list_teams(&data),
                "search" => search(&data, &args[1..].join(" ")),
                "player" => show_player(&data, &args[1..].join(" ")),
                _ => {
                    let path = args.get(1).context("validate needs a squad file")?;
                    validate(&data, path, &config)
                }
            }
        }
        other => Err(anyhow!("unknown command '{other}'\n\n{USAGE}")),
    }
}

/// Arguments that are neither flags nor flag values.
fn positional_args() -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in std::env::args().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if let Some(flag) = arg.strip_prefix("--") {
            skip_next = !flag.contains('=');
            continue;
        }
        out.push(arg);
    }
    out
}

fn list_positions() {
    println!("ID Name (Short name)\n{}", "-".repeat(20));
    for position in Position::ALL {
        println!(
            "{:>4}. {:<16} ({})",
            position.id(),
            position.name(),
            position.short_name()
        );
    }
}

fn list_teams(data: &SeasonData) -> Result<()> {
    println!("ID Name (Short name)\n{}", "-".repeat(20));
    for club in data.clubs() {
        println!("{:>4}. {:<16} ({})", club.id, club.name, club.short_name);
    }
    Ok(())
}

fn search(data: &SeasonData, query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(anyhow!("search needs at least one word"));
    }
    let hits = data.search_players(query);
    if hits.is_empty() {
        println!("no players match '{query}'");
    }
    for p in hits.iter().take(25) {
        println!(
            "{:>5}  {:<28} {}  {:<4} {:>5}  {:>4} pts",
            p.id,
            p.full_name(),
            p.position,
            club_short(data, p.club),
            format_price(p.now_cost),
            p.summary.total_points
        );
    }
    Ok(())
}

fn show_player(data: &SeasonData, name: &str) -> Result<()> {
    let id = data.resolve_name(name)?;
    let p = data.player(id).context("resolved player vanished")?;
    println!("{}", p.full_name().to_uppercase());
    println!(" - {:<16} ({})", p.position.name(), p.position.short_name());
    if let Some(club) = data.club_info(p.club) {
        println!(" - {:<16} ({})", club.name, club.short_name);
    }
    println!(" - price {}", format_price(p.now_cost));
    println!(
        " - {} points, {} minutes, {} goals, {} assists",
        p.summary.total_points, p.summary.minutes, p.summary.goals_scored, p.summary.assists
    );
    let gameweeks = data.gameweeks_loaded();
    if !gameweeks.is_empty() {
        let line = gameweeks
            .iter()
            .map(|gw| data.gameweek_points(id, *gw).to_string())
            .collect::<Vec<_>>()
            .join(" ");
        println!(" - by gameweek: {line}");
    }
    Ok(())
}

fn validate(data: &SeasonData, path: &str, config: &ToolkitConfig) -> Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {path}"))?;
    let selection: SquadSelection =
        serde_json::from_str(&raw).with_context(|| format!("parse squad {path}"))?;
    let squad = Squad::from_selection(&selection, data)?;
    let rules = &config.rules;
    let violations = collect_violations(&squad, data, rules.budget, rules.club_cap, 1);
    if violations.is_empty() {
        info!("squad in {path} is valid");
        println!("valid squad, formation {}", squad.formation());
        return Ok(());
    }
    for v in &violations {
        println!("[{}] {v}", v.kind());
    }
    Err(anyhow!("{} rule violation(s)", violations.len()))
}

fn club_short(data: &SeasonData, club: u32) -> String {
    data.club_info(club)
        .map(|c| c.short_name.clone())
        .unwrap_or_else(|| club.to_string())
}
