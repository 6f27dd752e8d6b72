use std::path::PathBuf;

use anyhow::{Context, Result};

use fpl_toolkit::config::{ToolkitConfig, arg_value, init_logging};
use fpl_toolkit::{season_csv, season_db};

fn main() -> Result<()> {
    init_logging();
    let config = ToolkitConfig::from_env()?;
    let db_path = arg_value("--db")
        .map(PathBuf::from)
        .or(config.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let seasons = arg_value("--seasons")
        .or_else(|| arg_value("--season"))
        .unwrap_or_else(|| config.season.clone());

    let mut conn = season_db::open_db(&db_path)?;
    let mut errors = Vec::new();
    for season in seasons.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let data = match season_csv::load_season(&config.source, season) {
            Ok(data) => data,
            Err(err) => {
                errors.push(format!("season {season}: {err:#}"));
                continue;
            }
        };
        let summary = season_db::ingest_season(&mut conn, &data)?;
        println!(
            "{}: {} clubs, {} players, {} gameweeks ({} rows)",
            summary.season, summary.clubs, summary.players, summary.gameweeks, summary.gameweek_rows
        );
    }

    println!("DB: {}", db_path.display());
    if !errors.is_empty() {
        println!("Errors: {}", errors.len());
        for err in errors.iter().take(8) {
            println!(" - {err}");
        }
    }
    Ok(())
}
