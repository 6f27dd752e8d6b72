use std::collections::{BTreeMap, HashSet};
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::Position;
use crate::season_data::{ClubId, PlayerId, Price, SeasonDataProvider, format_price};
use crate::squad::Squad;

/// Sorted bench position ids accepted for a 2-5-5-3 squad. They leave
/// 4-3-3, 4-4-2, 4-5-1, 3-4-3 and 3-5-2 on the pitch.
pub const VALID_BENCH_POSITIONS: [[u8; 4]; 5] = [
    [1, 2, 3, 3],
    [1, 2, 3, 4],
    [1, 2, 4, 4],
    [1, 2, 2, 3],
    [1, 2, 2, 4],
];

pub const VALID_FORMATIONS: [Formation; 5] = [
    Formation::new(4, 3, 3),
    Formation::new(4, 4, 2),
    Formation::new(4, 5, 1),
    Formation::new(3, 4, 3),
    Formation::new(3, 5, 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Formation {
    pub keepers: u8,
    pub defenders: u8,
    pub midfielders: u8,
    pub forwards: u8,
}

impl Formation {
    pub const fn new(defenders: u8, midfielders: u8, forwards: u8) -> Self {
        Self {
            keepers: 1,
            defenders,
            midfielders,
            forwards,
        }
    }

    pub fn from_positions<I>(positions: I) -> Self
    where
        I: IntoIterator<Item = Position>,
    {
        let mut out = Formation {
            keepers: 0,
            defenders: 0,
            midfielders: 0,
            forwards: 0,
        };
        for pos in positions {
            let slot = match pos {
                Position::Goalkeeper => &mut out.keepers,
                Position::Defender => &mut out.defenders,
                Position::Midfielder => &mut out.midfielders,
                Position::Forward => &mut out.forwards,
            };
            *slot = slot.saturating_add(1);
        }
        out
    }

    pub fn is_legal(&self) -> bool {
        VALID_FORMATIONS.contains(self)
    }
}

impl fmt::Display for Formation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.defenders, self.midfielders, self.forwards)?;
        if self.keepers != 1 {
            write!(f, " ({} keepers)", self.keepers)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("formation not approved: bench {} leaves {formation}", bench_label(.bench))]
    Formation {
        bench: Vec<Position>,
        formation: Formation,
    },
    #[error("club {club} has {count} players in the squad (max {cap})")]
    ClubCap { club: ClubId, count: usize, cap: usize },
    #[error("budget exceeded: squad costs {} with {} available", fmt_price(.cost), fmt_price(.budget))]
    Budget { cost: Price, budget: Price },
    #[error("player {player} has no price for gameweek {gameweek}")]
    MissingPrice { player: PlayerId, gameweek: u8 },
    #[error("player {0} has no club")]
    MissingClub(PlayerId),
}

impl RuleViolation {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleViolation::Formation { .. } => "formation",
            RuleViolation::ClubCap { .. } => "club_cap",
            RuleViolation::Budget { .. } => "budget",
            RuleViolation::MissingPrice { .. } => "missing_price",
            RuleViolation::MissingClub(_) => "missing_club",
        }
    }
}

fn fmt_price(price: &Price) -> String {
    format_price(*price)
}

fn bench_label(bench: &[Position]) -> String {
    bench
        .iter()
        .map(|p| p.short_name())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn validate_formation(squad: &Squad) -> Result<Formation, RuleViolation> {
    let mut bench: Vec<Position> = squad
        .bench()
        .iter()
        .filter_map(|id| squad.position_of(*id))
        .collect();
    bench.sort();
    let ids: Vec<u8> = bench.iter().map(|p| p.id()).collect();
    let formation = squad.formation();
    if !VALID_BENCH_POSITIONS.iter().any(|valid| valid[..] == ids[..]) {
        return Err(RuleViolation::Formation { bench, formation });
    }
    debug!("formation {formation} approved");
    Ok(formation)
}

pub fn validate_club_cap<P>(squad: &Squad, provider: &P, cap: usize) -> Result<(), RuleViolation>
where
    P: SeasonDataProvider + ?Sized,
{
    let counts = club_counts(squad, provider)?;
    if let Some((club, count)) = counts.into_iter().find(|(_, n)| *n > cap) {
        return Err(RuleViolation::ClubCap { club, count, cap });
    }
    debug!("club cap of {cap} respected");
    Ok(())
}

pub fn club_counts<P>(squad: &Squad, provider: &P) -> Result<BTreeMap<ClubId, usize>, RuleViolation>
where
    P: SeasonDataProvider + ?Sized,
{
    let mut counts = BTreeMap::new();
    for id in squad.players() {
        let club = provider.club(id).ok_or(RuleViolation::MissingClub(id))?;
        *counts.entry(club).or_insert(0usize) += 1;
    }
    Ok(counts)
}

pub fn squad_cost<P>(squad: &Squad, provider: &P, gameweek: u8) -> Result<Price, RuleViolation>
where
    P: SeasonDataProvider + ?Sized,
{
    let mut total: Price = 0;
    for id in squad.players() {
        let price = provider
            .gameweek_price(id, gameweek)
            .ok_or(RuleViolation::MissingPrice {
                player: id,
                gameweek,
            })?;
        total = total.saturating_add(price);
    }
    Ok(total)
}

pub fn validate_budget<P>(
    squad: &Squad,
    provider: &P,
    budget: Price,
    gameweek: u8,
) -> Result<Price, RuleViolation>
where
    P: SeasonDataProvider + ?Sized,
{
    let cost = squad_cost(squad, provider, gameweek)?;
    if cost > budget {
        return Err(RuleViolation::Budget { cost, budget });
    }
    debug!(
        "squad cost {} within budget {}",
        format_price(cost),
        format_price(budget)
    );
    Ok(cost)
}

/// Runs every check and stops at the first violation. Returns the squad cost.
pub fn validate_squad<P>(
    squad: &Squad,
    provider: &P,
    budget: Price,
    club_cap: usize,
    gameweek: u8,
) -> Result<Price, RuleViolation>
where
    P: SeasonDataProvider + ?Sized,
{
    validate_formation(squad)?;
    validate_club_cap(squad, provider, club_cap)?;
    validate_budget(squad, provider, budget, gameweek)
}

pub fn collect_violations<P>(
    squad: &Squad,
    provider: &P,
    budget: Price,
    club_cap: usize,
    gameweek: u8,
) -> Vec<RuleViolation>
where
    P: SeasonDataProvider + ?Sized,
{
    let mut out = Vec::new();
    if let Err(err) = validate_formation(squad) {
        out.push(err);
    }
    if let Err(err) = validate_club_cap(squad, provider, club_cap) {
        out.push(err);
    }
    if let Err(err) = validate_budget(squad, provider, budget, gameweek) {
        out.push(err);
    }
    out
}

pub fn number_of_transfers(old: &Squad, new: &Squad) -> usize {
    transferred_players(old, new).1.len()
}

/// Players leaving and joining when `old` is replaced by `new`.
pub fn transferred_players(old: &Squad, new: &Squad) -> (Vec<PlayerId>, Vec<PlayerId>) {
    let before: HashSet<PlayerId> = old.players().collect();
    let after: HashSet<PlayerId> = new.players().collect();
    let outgoing = old.players().filter(|id| !after.contains(id)).collect();
    let incoming = new.players().filter(|id| !before.contains(id)).collect();
    (outgoing, incoming)
}
