use std::collections::{BTreeMap, HashMap};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::Position;

pub type PlayerId = u32;
pub type ClubId = u32;
/// Tenths of a million, as stored in the FPL data (1000 = 100.0m).
pub type Price = u32;
pub type Points = i32;

const SUGGESTION_CUTOFF: f64 = 0.7;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    pub id: ClubId,
    pub name: String,
    pub short_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonSummary {
    pub total_points: Points,
    pub minutes: u32,
    pub goals_scored: u32,
    pub assists: u32,
    pub clean_sheets: u32,
    pub goals_conceded: u32,
    pub bonus: u32,
    pub bps: i32,
    pub influence: f64,
    pub creativity: f64,
    pub threat: f64,
    pub ict_index: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub first_name: String,
    pub second_name: String,
    pub web_name: String,
    pub position: Position,
    pub club: ClubId,
    pub now_cost: Price,
    #[serde(default)]
    pub summary: SeasonSummary,
}

impl PlayerRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.second_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameweekStat {
    pub points: Points,
    pub minutes: u32,
    pub value: Option<Price>,
    /// Fixtures played in the gameweek; 2 for a double gameweek.
    pub fixtures: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no player named '{name}' (did you mean: {}?)", .suggestions.join(", "))]
    NotFound {
        name: String,
        suggestions: Vec<String>,
    },
    #[error("player name '{name}' matches several ids: {ids:?}")]
    Ambiguous { name: String, ids: Vec<PlayerId> },
    #[error("no player with id {0}")]
    UnknownId(PlayerId),
}

/// Read-only access to one season of player data.
pub trait SeasonDataProvider {
    fn season(&self) -> &str;

    fn player(&self, id: PlayerId) -> Option<&PlayerRecord>;

    fn player_ids(&self) -> Vec<PlayerId>;

    fn club_info(&self, id: ClubId) -> Option<&Club>;

    fn gameweek_stat(&self, id: PlayerId, gameweek: u8) -> Option<&GameweekStat>;

    fn position(&self, id: PlayerId) -> Option<Position> {
        self.player(id).map(|p| p.position)
    }

    fn club(&self, id: PlayerId) -> Option<ClubId> {
        self.player(id).map(|p| p.club)
    }

    /// Price for the gameweek, falling back to the current price for
    /// gameweeks the player has no row in.
    fn gameweek_price(&self, id: PlayerId, gameweek: u8) -> Option<Price> {
        let player = self.player(id)?;
        let value = self
            .gameweek_stat(id, gameweek)
            .and_then(|s| s.value)
            .unwrap_or(player.now_cost);
        Some(value)
    }

    fn gameweek_points(&self, id: PlayerId, gameweek: u8) -> Points {
        self.gameweek_stat(id, gameweek)
            .map(|s| s.points)
            .unwrap_or(0)
    }

    fn gameweek_minutes(&self, id: PlayerId, gameweek: u8) -> u32 {
        self.gameweek_stat(id, gameweek)
            .map(|s| s.minutes)
            .unwrap_or(0)
    }

    fn resolve_name(&self, name: &str) -> Result<PlayerId, LookupError> {
        let wanted = name.trim();
        let wanted_norm = normalize_name(wanted);
        let mut ids = self.player_ids();
        ids.sort_unstable();

        // Exact full name, then normalized full name, then normalized web name.
        for pass in 0..3 {
            let hits: Vec<PlayerId> = ids
                .iter()
                .filter_map(|id| self.player(*id))
                .filter(|p| match pass {
                    0 => p.full_name() == wanted,
                    1 => normalize_name(&p.full_name()) == wanted_norm,
                    _ => normalize_name(&p.web_name) == wanted_norm,
                })
                .map(|p| p.id)
                .collect();
            match hits.as_slice() {
                [] => continue,
                [id] => {
                    debug!("resolved '{wanted}' to player {id}");
                    return Ok(*id);
                }
                _ => {
                    return Err(LookupError::Ambiguous {
                        name: wanted.to_string(),
                        ids: hits,
                    });
                }
            }
        }

        let mut scored: Vec<(f64, String)> = ids
            .iter()
            .filter_map(|id| self.player(*id))
            .map(|p| {
                let full = p.full_name();
                (strsim::jaro_winkler(&wanted_norm, &normalize_name(&full)), full)
            })
            .filter(|(sim, _)| *sim >= SUGGESTION_CUTOFF)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Err(LookupError::NotFound {
            name: wanted.to_string(),
            suggestions: scored
                .into_iter()
                .take(MAX_SUGGESTIONS)
                .map(|(_, n)| n)
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeasonData {
    season: String,
    clubs: BTreeMap<ClubId, Club>,
    players: BTreeMap<PlayerId, PlayerRecord>,
    gameweeks: BTreeMap<u8, HashMap<PlayerId, GameweekStat>>,
}

impl SeasonData {
    pub fn new(season: impl Into<String>) -> Self {
        Self {
            season: season.into(),
            ..Default::default()
        }
    }

    pub fn insert_club(&mut self, club: Club) {
        self.clubs.insert(club.id, club);
    }

    pub fn insert_player(&mut self, player: PlayerRecord) {
        self.players.insert(player.id, player);
    }

    /// Adds one fixture row; rows for the same player and gameweek accumulate.
    pub fn insert_gameweek_row(
        &mut self,
        gameweek: u8,
        id: PlayerId,
        points: Points,
        minutes: u32,
        value: Option<Price>,
    ) {
        let stat = self
            .gameweeks
            .entry(gameweek)
            .or_default()
            .entry(id)
            .or_default();
        stat.points += points;
        stat.minutes += minutes;
        stat.fixtures = stat.fixtures.saturating_add(1);
        if value.is_some() {
            stat.value = value;
        }
    }

    pub fn set_gameweek_stat(&mut self, gameweek: u8, id: PlayerId, stat: GameweekStat) {
        self.gameweeks.entry(gameweek).or_default().insert(id, stat);
    }

    pub fn clubs(&self) -> impl Iterator<Item = &Club> {
        self.clubs.values()
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    pub fn has_player(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn gameweeks_loaded(&self) -> Vec<u8> {
        self.gameweeks.keys().copied().collect()
    }

    pub fn gameweek_rows(&self, gameweek: u8) -> impl Iterator<Item = (PlayerId, &GameweekStat)> {
        self.gameweeks
            .get(&gameweek)
            .into_iter()
            .flat_map(|rows| rows.iter().map(|(id, stat)| (*id, stat)))
    }

    pub fn players_at(&self, position: Position) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values().filter(move |p| p.position == position)
    }

    /// Players whose name contains every word of `query`, best scorers first.
    pub fn search_players(&self, query: &str) -> Vec<&PlayerRecord> {
        let words: Vec<String> = normalize_name(query)
            .split('_')
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        let mut hits: Vec<&PlayerRecord> = self
            .players
            .values()
            .filter(|p| {
                let hay = normalize_name(&format!("{} {}", p.full_name(), p.web_name));
                words.iter().all(|w| hay.contains(w.as_str()))
            })
            .collect();
        hits.sort_by(|a, b| {
            b.summary
                .total_points
                .cmp(&a.summary.total_points)
                .then(a.id.cmp(&b.id))
        });
        hits
    }
}

impl SeasonDataProvider for SeasonData {
    fn season(&self) -> &str {
        &self.season
    }

    fn player(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    fn player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    fn club_info(&self, id: ClubId) -> Option<&Club> {
        self.clubs.get(&id)
    }

    fn gameweek_stat(&self, id: PlayerId, gameweek: u8) -> Option<&GameweekStat> {
        self.gameweeks.get(&gameweek)?.get(&id)
    }
}

pub fn normalize_name(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut prev_us = false;
    for ch in lower.chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            prev_us = false;
        } else if !prev_us && !out.is_empty() {
            out.push('_');
            prev_us = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

pub fn format_price(price: Price) -> String {
    format!("{}.{}", price / 10, price % 10)
}
