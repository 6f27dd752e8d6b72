use std::collections::HashSet;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::Position;
use crate::rules::Formation;
use crate::season_data::{LookupError, PlayerId, SeasonDataProvider};

pub const SQUAD_SIZE: usize = 15;
pub const BENCH_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerRef {
    Id(PlayerId),
    Name(String),
}

impl PlayerRef {
    pub fn resolve<P>(&self, provider: &P) -> Result<PlayerId, LookupError>
    where
        P: SeasonDataProvider + ?Sized,
    {
        match self {
            PlayerRef::Id(id) => provider
                .player(*id)
                .map(|p| p.id)
                .ok_or(LookupError::UnknownId(*id)),
            PlayerRef::Name(name) => provider.resolve_name(name),
        }
    }
}

impl From<PlayerId> for PlayerRef {
    fn from(id: PlayerId) -> Self {
        PlayerRef::Id(id)
    }
}

impl From<&str> for PlayerRef {
    fn from(name: &str) -> Self {
        PlayerRef::Name(name.to_string())
    }
}

/// A squad as written by a manager, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadSelection {
    pub keepers: Vec<PlayerRef>,
    pub defenders: Vec<PlayerRef>,
    pub midfielders: Vec<PlayerRef>,
    pub forwards: Vec<PlayerRef>,
    pub bench: Vec<PlayerRef>,
    pub captain: PlayerRef,
    pub vice_captain: PlayerRef,
}

impl SquadSelection {
    pub fn group(&self, position: Position) -> &[PlayerRef] {
        match position {
            Position::Goalkeeper => &self.keepers,
            Position::Defender => &self.defenders,
            Position::Midfielder => &self.midfielders,
            Position::Forward => &self.forwards,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SquadError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("exactly {expected} {position} required, got {found}")]
    GroupSize {
        position: Position,
        expected: usize,
        found: usize,
    },
    #[error("4 players have to be on the bench, got {found}")]
    BenchSize { found: usize },
    #[error("player {0} does not exist this season")]
    UnknownPlayer(PlayerId),
    #[error("player {player} listed as {expected} but plays {actual}")]
    PositionMismatch {
        player: PlayerId,
        expected: Position,
        actual: Position,
    },
    #[error("player {0} picked more than once")]
    DuplicatePlayer(PlayerId),
    #[error("bench player {0} is not among the selected players")]
    BenchPlayerNotInSquad(PlayerId),
    #[error("captain {0} is not among the selected players")]
    CaptainNotInSquad(PlayerId),
    #[error("vice captain {0} is not among the selected players")]
    ViceCaptainNotInSquad(PlayerId),
    #[error("player {0} cannot be both captain and vice captain")]
    CaptainIsViceCaptain(PlayerId),
    #[error("player {0} is not in the squad")]
    NotInSquad(PlayerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub id: PlayerId,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub player_out: PlayerId,
    pub player_in: PlayerId,
    pub position_out: Position,
    pub position_in: Position,
}

/// Fifteen players in positional groups with an ordered bench. Construction
/// checks the structural invariants; rule checks live in [`crate::rules`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Squad {
    picks: Vec<Pick>,
    bench: Vec<PlayerId>,
    captain: PlayerId,
    vice_captain: PlayerId,
}

impl Squad {
    pub fn from_selection<P>(selection: &SquadSelection, provider: &P) -> Result<Self, SquadError>
    where
        P: SeasonDataProvider + ?Sized,
    {
        let resolve = |refs: &[PlayerRef]| -> Result<Vec<PlayerId>, SquadError> {
            refs.iter()
                .map(|r| r.resolve(provider).map_err(SquadError::from))
                .collect()
        };
        let groups = [
            resolve(&selection.keepers)?,
            resolve(&selection.defenders)?,
            resolve(&selection.midfielders)?,
            resolve(&selection.forwards)?,
        ];
        let bench = resolve(&selection.bench)?;
        let captain = selection.captain.resolve(provider)?;
        let vice_captain = selection.vice_captain.resolve(provider)?;
        Self::new(groups, bench, captain, vice_captain, provider)
    }

    /// `groups` holds keepers, defenders, midfielders and forwards in that order.
    pub fn new<P>(
        groups: [Vec<PlayerId>; 4],
        bench: Vec<PlayerId>,
        captain: PlayerId,
        vice_captain: PlayerId,
        provider: &P,
    ) -> Result<Self, SquadError>
    where
        P: SeasonDataProvider + ?Sized,
    {
        let mut picks = Vec::with_capacity(SQUAD_SIZE);
        for (position, ids) in Position::ALL.into_iter().zip(groups) {
            if ids.len() != position.squad_quota() {
                return Err(SquadError::GroupSize {
                    position,
                    expected: position.squad_quota(),
                    found: ids.len(),
                });
            }
            for id in ids {
                let actual = provider
                    .position(id)
                    .ok_or(SquadError::UnknownPlayer(id))?;
                if actual != position {
                    return Err(SquadError::PositionMismatch {
                        player: id,
                        expected: position,
                        actual,
                    });
                }
                picks.push(Pick { id, position });
            }
        }
        debug!("all {} players exist", picks.len());

        let squad = Squad {
            picks,
            bench,
            captain,
            vice_captain,
        };
        squad.check_structure()?;
        Ok(squad)
    }

    fn check_structure(&self) -> Result<(), SquadError> {
        let mut seen = HashSet::with_capacity(SQUAD_SIZE);
        for pick in &self.picks {
            if !seen.insert(pick.id) {
                return Err(SquadError::DuplicatePlayer(pick.id));
            }
        }
        if self.bench.len() != BENCH_SIZE {
            return Err(SquadError::BenchSize {
                found: self.bench.len(),
            });
        }
        let mut bench_seen = HashSet::with_capacity(BENCH_SIZE);
        for id in &self.bench {
            if !seen.contains(id) {
                return Err(SquadError::BenchPlayerNotInSquad(*id));
            }
            if !bench_seen.insert(*id) {
                return Err(SquadError::DuplicatePlayer(*id));
            }
        }
        if !seen.contains(&self.captain) {
            return Err(SquadError::CaptainNotInSquad(self.captain));
        }
        if !seen.contains(&self.vice_captain) {
            return Err(SquadError::ViceCaptainNotInSquad(self.vice_captain));
        }
        if self.captain == self.vice_captain {
            return Err(SquadError::CaptainIsViceCaptain(self.captain));
        }
        debug!("squad structure approved");
        Ok(())
    }

    pub fn picks(&self) -> &[Pick] {
        &self.picks
    }

    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.picks.iter().map(|p| p.id)
    }

    pub fn group(&self, position: Position) -> Vec<PlayerId> {
        self.picks
            .iter()
            .filter(|p| p.position == position)
            .map(|p| p.id)
            .collect()
    }

    pub fn bench(&self) -> &[PlayerId] {
        &self.bench
    }

    pub fn is_benched(&self, id: PlayerId) -> bool {
        self.bench.contains(&id)
    }

    pub fn starting_xi(&self) -> Vec<PlayerId> {
        self.players().filter(|id| !self.is_benched(*id)).collect()
    }

    pub fn captain(&self) -> PlayerId {
        self.captain
    }

    pub fn vice_captain(&self) -> PlayerId {
        self.vice_captain
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.picks.iter().any(|p| p.id == id)
    }

    pub fn position_of(&self, id: PlayerId) -> Option<Position> {
        self.picks.iter().find(|p| p.id == id).map(|p| p.position)
    }

    pub fn formation(&self) -> Formation {
        Formation::from_positions(
            self.picks
                .iter()
                .filter(|p| !self.is_benched(p.id))
                .map(|p| p.position),
        )
    }

    pub fn with_captains(
        &self,
        captain: PlayerId,
        vice_captain: PlayerId,
    ) -> Result<Self, SquadError> {
        let squad = Squad {
            captain,
            vice_captain,
            ..self.clone()
        };
        squad.check_structure()?;
        Ok(squad)
    }

    pub fn with_bench(&self, bench: Vec<PlayerId>) -> Result<Self, SquadError> {
        let squad = Squad {
            bench,
            ..self.clone()
        };
        squad.check_structure()?;
        Ok(squad)
    }

    /// Swaps `player_out` for `player_in`. The incoming player inherits the
    /// bench slot and any armband.
    pub fn with_replacement<P>(
        &self,
        player_out: PlayerId,
        player_in: PlayerId,
        provider: &P,
    ) -> Result<Self, SquadError>
    where
        P: SeasonDataProvider + ?Sized,
    {
        if !self.contains(player_out) {
            return Err(SquadError::NotInSquad(player_out));
        }
        let swap = |id: PlayerId| if id == player_out { player_in } else { id };
        let groups: [Vec<PlayerId>; 4] =
            Position::ALL.map(|pos| self.group(pos).into_iter().map(swap).collect());
        let bench: Vec<PlayerId> = self.bench.iter().copied().map(swap).collect();
        Self::new(
            groups,
            bench,
            swap(self.captain),
            swap(self.vice_captain),
            provider,
        )
    }

    /// Replaces starters who did not play with bench players who did.
    ///
    /// Starters are visited in squad order. A keeper can only be replaced by a
    /// bench keeper. An outfield starter is replaced by the first outfield
    /// bench player, in bench order, who played and keeps the formation legal.
    /// The starter takes the vacated bench slot.
    pub fn auto_substitute<P>(&self, provider: &P, gameweek: u8) -> (Squad, Vec<Substitution>)
    where
        P: SeasonDataProvider + ?Sized,
    {
        let mut squad = self.clone();
        let mut subs = Vec::new();

        for out_id in self.starting_xi() {
            if provider.gameweek_minutes(out_id, gameweek) > 0 {
                continue;
            }
            let Some(out_pos) = squad.position_of(out_id) else {
                continue;
            };
            let out_is_keeper = out_pos == Position::Goalkeeper;

            let mut chosen = None;
            for (slot, in_id) in squad.bench.iter().enumerate() {
                let Some(in_pos) = squad.position_of(*in_id) else {
                    continue;
                };
                if (in_pos == Position::Goalkeeper) != out_is_keeper {
                    continue;
                }
                if provider.gameweek_minutes(*in_id, gameweek) == 0 {
                    continue;
                }
                let mut trial = squad.bench.clone();
                trial[slot] = out_id;
                let formation = Formation::from_positions(
                    squad
                        .picks
                        .iter()
                        .filter(|p| !trial.contains(&p.id))
                        .map(|p| p.position),
                );
                if !formation.is_legal() {
                    continue;
                }
                chosen = Some((slot, *in_id, in_pos));
                break;
            }

            match chosen {
                Some((slot, in_id, in_pos)) => {
                    squad.bench[slot] = out_id;
                    info!("gw{gameweek}: player {in_id} substituted for {out_id}");
                    subs.push(Substitution {
                        player_out: out_id,
                        player_in: in_id,
                        position_out: out_pos,
                        position_in: in_pos,
                    });
                }
                None => debug!("gw{gameweek}: no substitute available for {out_id}"),
            }
        }

        (squad, subs)
    }
}
