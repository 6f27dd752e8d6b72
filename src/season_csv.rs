use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::MAX_GAMEWEEKS;
use crate::http_cache::fetch_text_cached;
use crate::http_client::http_client;
use crate::position::Position;
use crate::season_data::{
    Club, ClubId, PlayerId, PlayerRecord, Points, Price, SeasonData, SeasonSummary,
};

/// Where the `{season}/...` CSV tree lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeasonSource {
    Local(PathBuf),
    Remote(String),
}

impl SeasonSource {
    pub fn describe(&self) -> String {
        match self {
            SeasonSource::Local(dir) => dir.display().to_string(),
            SeasonSource::Remote(url) => url.clone(),
        }
    }

    /// File contents, or `None` when the file does not exist.
    pub fn read(&self, season: &str, relative: &str) -> Result<Option<String>> {
        match self {
            SeasonSource::Local(dir) => {
                let path = dir.join(season).join(relative);
                if !path.exists() {
                    return Ok(None);
                }
                let bytes =
                    fs::read(&path).with_context(|| format!("read {}", path.display()))?;
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
            SeasonSource::Remote(base) => {
                let url = format!("{}/{season}/{relative}", base.trim_end_matches('/'));
                fetch_text_cached(http_client()?, &url)
            }
        }
    }

    fn read_required(&self, season: &str, relative: &str) -> Result<String> {
        self.read(season, relative)?.with_context(|| {
            format!("{season}/{relative} not found under {}", self.describe())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TeamRow {
    pub id: ClubId,
    pub name: String,
    pub short_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdListRow {
    pub first_name: String,
    pub second_name: String,
    pub id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPlayerRow {
    pub id: PlayerId,
    pub element_type: u8,
    pub team: ClubId,
    pub now_cost: Price,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub second_name: String,
    #[serde(default)]
    pub web_name: String,
    #[serde(default)]
    pub total_points: Points,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub goals_scored: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub clean_sheets: u32,
    #[serde(default)]
    pub goals_conceded: u32,
    #[serde(default)]
    pub bonus: u32,
    #[serde(default)]
    pub bps: i32,
    #[serde(default)]
    pub influence: f64,
    #[serde(default)]
    pub creativity: f64,
    #[serde(default)]
    pub threat: f64,
    #[serde(default)]
    pub ict_index: f64,
}

impl RawPlayerRow {
    fn summary(&self) -> SeasonSummary {
        SeasonSummary {
            total_points: self.total_points,
            minutes: self.minutes,
            goals_scored: self.goals_scored,
            assists: self.assists,
            clean_sheets: self.clean_sheets,
            goals_conceded: self.goals_conceded,
            bonus: self.bonus,
            bps: self.bps,
            influence: self.influence,
            creativity: self.creativity,
            threat: self.threat,
            ict_index: self.ict_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameweekRow {
    pub element: PlayerId,
    pub total_points: Points,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub value: Option<Price>,
}

fn parse_rows<T: DeserializeOwned>(raw: &str, label: &str) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());
    // Fail early on a missing header row rather than on every record.
    reader
        .headers()
        .with_context(|| format!("{label}: unreadable header row"))?;
    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in reader.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(err) => {
                skipped += 1;
                warn!("{label}: skipping malformed row: {err}");
            }
        }
    }
    if skipped > 0 {
        warn!("{label}: {skipped} row(s) skipped");
    }
    Ok(rows)
}

pub fn parse_teams_csv(raw: &str) -> Result<Vec<TeamRow>> {
    parse_rows(raw, "teams.csv")
}

pub fn parse_player_idlist_csv(raw: &str) -> Result<Vec<IdListRow>> {
    parse_rows(raw, "player_idlist.csv")
}

pub fn parse_players_raw_csv(raw: &str) -> Result<Vec<RawPlayerRow>> {
    parse_rows(raw, "players_raw.csv")
}

pub fn parse_gameweek_csv(raw: &str) -> Result<Vec<GameweekRow>> {
    parse_rows(raw, "gameweek csv")
}

/// Builds a season from already-parsed tables. Names from the id list win
/// over the ones in `players_raw.csv`.
pub fn assemble_season(
    season: &str,
    teams: Vec<TeamRow>,
    id_list: Vec<IdListRow>,
    players: Vec<RawPlayerRow>,
) -> SeasonData {
    let mut data = SeasonData::new(season);
    for team in teams {
        data.insert_club(Club {
            id: team.id,
            name: team.name,
            short_name: team.short_name,
        });
    }

    let names: HashMap<PlayerId, IdListRow> =
        id_list.into_iter().map(|row| (row.id, row)).collect();
    for row in players {
        let Some(position) = Position::from_element_type(row.element_type) else {
            warn!(
                "players_raw.csv: player {} has unknown element_type {}",
                row.id, row.element_type
            );
            continue;
        };
        let summary = row.summary();
        let (first_name, second_name) = match names.get(&row.id) {
            Some(n) => (n.first_name.clone(), n.second_name.clone()),
            None => (row.first_name, row.second_name),
        };
        let web_name = if row.web_name.is_empty() {
            second_name.clone()
        } else {
            row.web_name
        };
        data.insert_player(PlayerRecord {
            id: row.id,
            first_name,
            second_name,
            web_name,
            position,
            club: row.team,
            now_cost: row.now_cost,
            summary,
        });
    }
    data
}

/// Adds one gameweek file. Rows for players missing from the roster are
/// dropped; a second row for the same player (double gameweek) is summed.
pub fn add_gameweek(data: &mut SeasonData, gameweek: u8, rows: Vec<GameweekRow>) -> usize {
    let mut added = 0;
    for row in rows {
        if !data.has_player(row.element) {
            debug!("gw{gameweek}: row for unknown player {} dropped", row.element);
            continue;
        }
        data.insert_gameweek_row(gameweek, row.element, row.total_points, row.minutes, row.value);
        added += 1;
    }
    added
}

/// Loads a season's roster and every gameweek file published so far.
pub fn load_season(source: &SeasonSource, season: &str) -> Result<SeasonData> {
    info!("loading season {season} from {}", source.describe());
    let teams = parse_teams_csv(&source.read_required(season, "teams.csv")?)?;
    let players = parse_players_raw_csv(&source.read_required(season, "players_raw.csv")?)?;
    let id_list = match source.read(season, "player_idlist.csv")? {
        Some(raw) => parse_player_idlist_csv(&raw)?,
        None => Vec::new(),
    };
    let mut data = assemble_season(season, teams, id_list, players);

    for gameweek in 1..=MAX_GAMEWEEKS {
        let relative = format!("gws/gw{gameweek}.csv");
        let Some(raw) = source.read(season, &relative)? else {
            debug!("{season}/{relative} not available, stopping");
            break;
        };
        let rows = parse_gameweek_csv(&raw).with_context(|| format!("parse {relative}"))?;
        let added = add_gameweek(&mut data, gameweek, rows);
        debug!("gw{gameweek}: {added} rows");
    }

    info!(
        "season {season}: {} clubs, {} players, {} gameweeks",
        data.clubs().count(),
        data.player_count(),
        data.gameweeks_loaded().len()
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season_data::SeasonDataProvider;

    #[test]
    fn gameweek_rows_ignore_extra_columns() {
        let raw = "name,element,fixture,minutes,total_points,value,was_home\n\
                   Bernd Leno,1,8,90,2,50,True\n\
                   bad,row,here,x,y,z,False\n";
        let rows = parse_gameweek_csv(raw).unwrap();
        assert_eq!(
            rows,
            vec![GameweekRow {
                element: 1,
                total_points: 2,
                minutes: 90,
                value: Some(50),
            }]
        );
    }

    #[test]
    fn id_list_names_win() {
        let teams = vec![TeamRow {
            id: 1,
            name: "Arsenal".to_string(),
            short_name: "ARS".to_string(),
        }];
        let ids = vec![IdListRow {
            first_name: "Pierre-Emerick".to_string(),
            second_name: "Aubameyang".to_string(),
            id: 4,
        }];
        let raw = "id,element_type,team,now_cost,first_name,second_name,web_name,total_points\n\
                   4,3,1,120,P-E,Auba,Aubameyang,176\n\
                   5,9,1,45,X,Y,Z,0\n";
        let players = parse_players_raw_csv(raw).unwrap();
        let data = assemble_season("2020-21", teams, ids, players);
        assert_eq!(data.player_count(), 1);
        let p = data.player(4).unwrap();
        assert_eq!(p.full_name(), "Pierre-Emerick Aubameyang");
        assert_eq!(p.position, Position::Midfielder);
        assert_eq!(p.summary.total_points, 176);
    }
}
