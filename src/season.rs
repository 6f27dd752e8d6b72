use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chips::{Chip, ChipUsage, FreeTransfers};
use crate::config::{RulesConfig, RulesConfigError};
use crate::rules::{RuleViolation, number_of_transfers, squad_cost, validate_squad};
use crate::season_data::{PlayerId, Points, Price, SeasonDataProvider, format_price};
use crate::squad::{Squad, SquadError, Substitution};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error(transparent)]
    Squad(#[from] SquadError),
    #[error(transparent)]
    Rule(#[from] RuleViolation),
    #[error("{0} has already been played this season")]
    ChipAlreadyPlayed(Chip),
    #[error("{active} is already active this gameweek, {requested} cannot be played as well")]
    ChipAlreadyActive { active: Chip, requested: Chip },
    #[error("the season is over")]
    SeasonOver,
    #[error(transparent)]
    Config(#[from] RulesConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub gameweek: u8,
    pub transfers: usize,
    pub paid_transfers: u32,
    pub hit: Points,
    pub bank: Price,
    pub free_transfers: FreeTransfers,
    pub chip: Option<Chip>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameweekOutcome {
    pub gameweek: u8,
    pub points: Points,
    pub hit: Points,
    pub substitutions: Vec<Substitution>,
    pub chip: Option<Chip>,
    pub season_over: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameweekRecord {
    pub gameweek: u8,
    pub chip: Option<Chip>,
    pub transfers: usize,
    pub hit: Points,
    pub points: Points,
    pub total_points: Points,
    pub bank: Price,
    pub substitutions: Vec<Substitution>,
}

#[derive(Debug, Clone)]
struct Snapshot {
    squad: Squad,
    bank: Price,
}

/// One manager's season: squad, bank, chips and the points accumulated so far.
#[derive(Debug, Clone)]
pub struct SeasonState {
    rules: RulesConfig,
    squad: Squad,
    gameweek: u8,
    bank: Price,
    total_points: Points,
    free_transfers: FreeTransfers,
    chips: ChipUsage,
    active_chip: Option<Chip>,
    gameweek_start: Option<Snapshot>,
    transfers_this_gameweek: usize,
    pending_hit: Points,
    history: Vec<GameweekRecord>,
}

impl SeasonState {
    pub fn new<P>(squad: Squad, provider: &P, rules: RulesConfig) -> Result<Self, GameError>
    where
        P: SeasonDataProvider + ?Sized,
    {
        rules.validate()?;
        let cost = validate_squad(&squad, provider, rules.budget, rules.club_cap, 1)?;
        info!(
            "{} season started with a squad worth {} ({} in the bank)",
            provider.season(),
            format_price(cost),
            format_price(rules.budget - cost)
        );
        Ok(Self {
            rules,
            squad,
            gameweek: 1,
            bank: rules.budget - cost,
            total_points: 0,
            free_transfers: FreeTransfers::Bounded(1),
            chips: ChipUsage::default(),
            active_chip: None,
            gameweek_start: None,
            transfers_this_gameweek: 0,
            pending_hit: 0,
            history: Vec::new(),
        })
    }

    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    pub fn squad(&self) -> &Squad {
        &self.squad
    }

    /// The gameweek that will be played next; `gameweeks + 1` once the season is over.
    pub fn gameweek(&self) -> u8 {
        self.gameweek
    }

    pub fn bank(&self) -> Price {
        self.bank
    }

    pub fn total_points(&self) -> Points {
        self.total_points
    }

    pub fn free_transfers(&self) -> FreeTransfers {
        self.free_transfers
    }

    pub fn chips(&self) -> &ChipUsage {
        &self.chips
    }

    pub fn active_chip(&self) -> Option<Chip> {
        self.active_chip
    }

    pub fn history(&self) -> &[GameweekRecord] {
        &self.history
    }

    pub fn is_over(&self) -> bool {
        self.gameweek > self.rules.gameweeks
    }

    /// Money available for a squad this gameweek: bank plus the current squad
    /// at this gameweek's prices.
    pub fn available_budget<P>(&self, provider: &P) -> Result<Price, GameError>
    where
        P: SeasonDataProvider + ?Sized,
    {
        let value = squad_cost(&self.squad, provider, self.gameweek)?;
        Ok(self.bank.saturating_add(value))
    }

    /// Replaces the squad for the coming gameweek and optionally plays a chip.
    ///
    /// Nothing changes when an error is returned.
    pub fn perform_actions<P>(
        &mut self,
        provider: &P,
        new_squad: Squad,
        chip: Option<Chip>,
    ) -> Result<TransferSummary, GameError>
    where
        P: SeasonDataProvider + ?Sized,
    {
        if self.is_over() {
            return Err(GameError::SeasonOver);
        }

        let mut free_transfers = self.free_transfers;
        let mut newly_played = None;
        if let Some(chip) = chip {
            match self.active_chip {
                Some(active) if active == chip => {}
                Some(active) => {
                    return Err(GameError::ChipAlreadyActive {
                        active,
                        requested: chip,
                    });
                }
                None => {
                    if self.chips.is_used(chip) {
                        return Err(GameError::ChipAlreadyPlayed(chip));
                    }
                    if chip.unlimited_transfers() {
                        free_transfers = FreeTransfers::Unlimited;
                    }
                    newly_played = Some(chip);
                }
            }
        }

        let available = self.available_budget(provider)?;
        let cost = validate_squad(
            &new_squad,
            provider,
            available,
            self.rules.club_cap,
            self.gameweek,
        )?;

        let transfers = number_of_transfers(&self.squad, &new_squad);
        let paid = free_transfers.consume(transfers as u32);
        let hit = paid as Points * self.rules.transfer_cost;

        if self.gameweek_start.is_none() {
            self.gameweek_start = Some(Snapshot {
                squad: self.squad.clone(),
                bank: self.bank,
            });
        }
        if let Some(chip) = newly_played {
            self.chips.set(chip, true);
            self.active_chip = Some(chip);
            // The chip covers every transfer made this gameweek.
            if chip.unlimited_transfers() && self.pending_hit > 0 {
                debug!(
                    "gw{}: {chip} cancels a {} point hit",
                    self.gameweek, self.pending_hit
                );
                self.pending_hit = 0;
            }
            info!("gw{}: {chip} played", self.gameweek);
        }
        self.free_transfers = free_transfers;
        self.bank = available - cost;
        self.transfers_this_gameweek += transfers;
        self.pending_hit += hit;
        self.squad = new_squad;

        if transfers > 0 {
            info!(
                "gw{}: {transfers} transfer(s), {paid} paid (-{hit} points), {} left in the bank",
                self.gameweek,
                format_price(self.bank)
            );
        }

        Ok(TransferSummary {
            gameweek: self.gameweek,
            transfers,
            paid_transfers: paid,
            hit,
            bank: self.bank,
            free_transfers: self.free_transfers,
            chip: self.active_chip,
        })
    }

    /// Plays the current gameweek and moves on to the next one.
    pub fn advance_gameweek<P>(&mut self, provider: &P) -> Result<GameweekOutcome, GameError>
    where
        P: SeasonDataProvider + ?Sized,
    {
        if self.is_over() {
            return Err(GameError::SeasonOver);
        }
        let gameweek = self.gameweek;
        let chip = self.active_chip;

        // Substitutions only apply to this gameweek's scoring; the squad
        // itself is left untouched.
        let (scored, substitutions) = if chip == Some(Chip::BenchBoost) {
            (self.squad.clone(), Vec::new())
        } else {
            self.squad.auto_substitute(provider, gameweek)
        };
        let raw = compute_gameweek_points(&scored, provider, gameweek, chip);
        let hit = self.pending_hit;
        let points = raw - hit;
        self.total_points += points;
        info!(
            "gw{gameweek}: {points} points ({raw} scored, -{hit} hit), total {}",
            self.total_points
        );

        self.gameweek += 1;
        match chip {
            Some(c) if c.unlimited_transfers() => {
                self.free_transfers = FreeTransfers::Bounded(1);
            }
            _ => self.free_transfers.accrue(self.rules.max_free_transfers),
        }
        let snapshot = self.gameweek_start.take();
        if chip == Some(Chip::FreeHit)
            && let Some(snapshot) = snapshot
        {
            debug!("gw{gameweek}: free hit over, squad restored");
            self.squad = snapshot.squad;
            self.bank = snapshot.bank;
        }
        if self.gameweek == self.rules.new_wildcard_gameweek {
            self.chips.set(Chip::Wildcard, false);
            info!("gw{}: wildcard available again", self.gameweek);
        }

        self.history.push(GameweekRecord {
            gameweek,
            chip,
            transfers: self.transfers_this_gameweek,
            hit,
            points,
            total_points: self.total_points,
            bank: self.bank,
            substitutions: substitutions.clone(),
        });
        self.active_chip = None;
        self.transfers_this_gameweek = 0;
        self.pending_hit = 0;

        let season_over = self.is_over();
        if season_over {
            info!("season over with {} points", self.total_points);
        }
        Ok(GameweekOutcome {
            gameweek,
            points,
            hit,
            substitutions,
            chip,
            season_over,
        })
    }
}

/// The player whose points are multiplied: the captain when starting,
/// otherwise the vice captain when starting.
pub fn armband_holder(squad: &Squad) -> Option<PlayerId> {
    [squad.captain(), squad.vice_captain()]
        .into_iter()
        .find(|id| !squad.is_benched(*id))
}

/// Points for one gameweek before transfer hits. `squad` is expected to be
/// the post-substitution squad.
pub fn compute_gameweek_points<P>(
    squad: &Squad,
    provider: &P,
    gameweek: u8,
    chip: Option<Chip>,
) -> Points
where
    P: SeasonDataProvider + ?Sized,
{
    let scoring: Vec<PlayerId> = if chip == Some(Chip::BenchBoost) {
        squad.players().collect()
    } else {
        squad.starting_xi()
    };
    let base: Points = scoring
        .iter()
        .map(|id| provider.gameweek_points(*id, gameweek))
        .sum();
    let factor = if chip == Some(Chip::TripleCaptain) { 2 } else { 1 };
    let bonus = armband_holder(squad)
        .map(|id| provider.gameweek_points(id, gameweek) * factor)
        .unwrap_or(0);
    base + bonus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;
    use crate::season_data::{GameweekStat, PlayerRecord, SeasonData, SeasonSummary};

    // 1-2 keepers, 3-7 defenders, 8-12 midfielders, 13-15 forwards, then
    // spares 16 (DEF), 17 (MID), 18 (FWD).
    fn data() -> SeasonData {
        let mut data = SeasonData::new("test");
        let layout = [
            (1..=2, Position::Goalkeeper),
            (3..=7, Position::Defender),
            (8..=12, Position::Midfielder),
            (13..=15, Position::Forward),
            (16..=16, Position::Defender),
            (17..=17, Position::Midfielder),
            (18..=18, Position::Forward),
        ];
        for (ids, position) in layout {
            for id in ids {
                data.insert_player(PlayerRecord {
                    id,
                    first_name: "Player".to_string(),
                    second_name: id.to_string(),
                    web_name: format!("P{id}"),
                    position,
                    club: id,
                    now_cost: 50,
                    summary: SeasonSummary::default(),
                });
                for gw in 1..=38 {
                    data.insert_gameweek_row(gw, id, 2, 90, None);
                }
            }
        }
        data
    }

    fn squad(data: &SeasonData) -> Squad {
        Squad::new(
            [
                vec![1, 2],
                vec![3, 4, 5, 6, 7],
                vec![8, 9, 10, 11, 12],
                vec![13, 14, 15],
            ],
            vec![2, 7, 12, 15],
            13,
            8,
            data,
        )
        .unwrap()
    }

    fn state(data: &SeasonData) -> SeasonState {
        SeasonState::new(squad(data), data, RulesConfig::default()).unwrap()
    }

    #[test]
    fn new_season_starts_at_gameweek_one() {
        let d = data();
        let s = state(&d);
        assert_eq!(s.gameweek(), 1);
        assert_eq!(s.bank(), 250);
        assert_eq!(s.free_transfers(), FreeTransfers::Bounded(1));
        assert_eq!(s.chips().available().len(), 4);
    }

    #[test]
    fn thirty_eight_gameweeks_end_the_season() {
        let d = data();
        let mut s = state(&d);
        for gw in 1..=38 {
            let outcome = s.advance_gameweek(&d).unwrap();
            assert_eq!(outcome.gameweek, gw);
            assert_eq!(outcome.points, 24);
            assert_eq!(outcome.season_over, gw == 38);
        }
        assert_eq!(s.gameweek(), 39);
        assert_eq!(s.total_points(), 38 * 24);
        assert_eq!(s.history().len(), 38);
        assert_eq!(s.advance_gameweek(&d).unwrap_err(), GameError::SeasonOver);
        let same = s.squad().clone();
        assert_eq!(
            s.perform_actions(&d, same, None).unwrap_err(),
            GameError::SeasonOver
        );
    }

    #[test]
    fn free_transfers_accrue_to_cap() {
        let d = data();
        let mut s = state(&d);
        for _ in 0..5 {
            s.advance_gameweek(&d).unwrap();
            assert!(s.free_transfers() != FreeTransfers::Bounded(3));
        }
        assert_eq!(s.free_transfers(), FreeTransfers::Bounded(2));
    }

    #[test]
    fn extra_transfers_cost_points() {
        let d = data();
        let mut s = state(&d);
        let new_squad = s
            .squad()
            .with_replacement(14, 18, &d)
            .and_then(|sq| sq.with_replacement(4, 16, &d))
            .unwrap();
        let summary = s.perform_actions(&d, new_squad, None).unwrap();
        assert_eq!(summary.transfers, 2);
        assert_eq!(summary.paid_transfers, 1);
        assert_eq!(summary.hit, 4);
        assert_eq!(summary.free_transfers, FreeTransfers::Bounded(0));

        let outcome = s.advance_gameweek(&d).unwrap();
        assert_eq!(outcome.hit, 4);
        assert_eq!(outcome.points, 24 - 4);
        assert_eq!(s.free_transfers(), FreeTransfers::Bounded(1));
        assert_eq!(s.history()[0].transfers, 2);
    }

    #[test]
    fn transfer_budget_includes_squad_value() {
        let mut d = data();
        d.insert_gameweek_row(1, 18, 0, 0, Some(300));
        let mut s = state(&d);
        // 250 in the bank plus 50 for the outgoing forward covers 300.
        let new_squad = s.squad().with_replacement(14, 18, &d).unwrap();
        let summary = s.perform_actions(&d, new_squad, None).unwrap();
        assert_eq!(summary.bank, 0);

        let mut d = data();
        d.insert_gameweek_row(1, 18, 0, 0, Some(301));
        let mut s = state(&d);
        let before = s.squad().clone();
        let new_squad = s.squad().with_replacement(14, 18, &d).unwrap();
        let err = s.perform_actions(&d, new_squad, None).unwrap_err();
        assert!(matches!(err, GameError::Rule(RuleViolation::Budget { .. })));
        assert_eq!(s.squad(), &before);
        assert_eq!(s.bank(), 250);
    }

    #[test]
    fn chip_cannot_be_played_twice() {
        let d = data();
        let mut s = state(&d);
        let same = s.squad().clone();
        s.perform_actions(&d, same.clone(), Some(Chip::TripleCaptain))
            .unwrap();
        s.advance_gameweek(&d).unwrap();
        assert_eq!(
            s.perform_actions(&d, same, Some(Chip::TripleCaptain))
                .unwrap_err(),
            GameError::ChipAlreadyPlayed(Chip::TripleCaptain)
        );
    }

    #[test]
    fn only_one_chip_per_gameweek() {
        let d = data();
        let mut s = state(&d);
        let same = s.squad().clone();
        s.perform_actions(&d, same.clone(), Some(Chip::BenchBoost))
            .unwrap();
        s.perform_actions(&d, same.clone(), Some(Chip::BenchBoost))
            .unwrap();
        assert_eq!(
            s.perform_actions(&d, same, Some(Chip::TripleCaptain))
                .unwrap_err(),
            GameError::ChipAlreadyActive {
                active: Chip::BenchBoost,
                requested: Chip::TripleCaptain
            }
        );
        assert!(!s.chips().is_used(Chip::TripleCaptain));
    }

    #[test]
    fn wildcard_returns_at_gameweek_twenty() {
        let d = data();
        let mut s = state(&d);
        let same = s.squad().clone();
        let summary = s
            .perform_actions(&d, same.clone(), Some(Chip::Wildcard))
            .unwrap();
        assert_eq!(summary.free_transfers, FreeTransfers::Unlimited);
        s.advance_gameweek(&d).unwrap();
        assert_eq!(s.free_transfers(), FreeTransfers::Bounded(1));

        while s.gameweek() < 19 {
            s.advance_gameweek(&d).unwrap();
        }
        assert_eq!(
            s.perform_actions(&d, same.clone(), Some(Chip::Wildcard))
                .unwrap_err(),
            GameError::ChipAlreadyPlayed(Chip::Wildcard)
        );
        s.advance_gameweek(&d).unwrap();
        assert_eq!(s.gameweek(), 20);
        assert!(!s.chips().is_used(Chip::Wildcard));
        s.perform_actions(&d, same, Some(Chip::Wildcard)).unwrap();
    }

    #[test]
    fn wildcard_transfers_are_free() {
        let d = data();
        let mut s = state(&d);
        let new_squad = s
            .squad()
            .with_replacement(14, 18, &d)
            .and_then(|sq| sq.with_replacement(4, 16, &d))
            .and_then(|sq| sq.with_replacement(9, 17, &d))
            .unwrap();
        let summary = s
            .perform_actions(&d, new_squad.clone(), Some(Chip::Wildcard))
            .unwrap();
        assert_eq!(summary.transfers, 3);
        assert_eq!(summary.hit, 0);
        s.advance_gameweek(&d).unwrap();
        assert_eq!(s.squad(), &new_squad);
    }

    #[test]
    fn free_hit_reverts_squad_and_bank() {
        let mut d = data();
        d.insert_gameweek_row(1, 18, 0, 0, Some(100));
        let mut s = state(&d);
        let before = s.squad().clone();
        let new_squad = s
            .squad()
            .with_replacement(14, 18, &d)
            .and_then(|sq| sq.with_replacement(4, 16, &d))
            .unwrap();
        let summary = s
            .perform_actions(&d, new_squad, Some(Chip::FreeHit))
            .unwrap();
        assert_eq!(summary.hit, 0);
        assert_eq!(summary.bank, 200);

        let outcome = s.advance_gameweek(&d).unwrap();
        assert_eq!(outcome.chip, Some(Chip::FreeHit));
        assert_eq!(s.squad(), &before);
        assert_eq!(s.bank(), 250);
        assert_eq!(s.free_transfers(), FreeTransfers::Bounded(1));
        assert_eq!(s.active_chip(), None);
    }

    #[test]
    fn free_hit_after_paid_transfers_drops_the_hit() {
        let d = data();
        let mut s = state(&d);
        let before = s.squad().clone();
        let new_squad = s
            .squad()
            .with_replacement(14, 18, &d)
            .and_then(|sq| sq.with_replacement(4, 16, &d))
            .unwrap();
        let summary = s.perform_actions(&d, new_squad.clone(), None).unwrap();
        assert_eq!(summary.transfers, 2);
        assert_eq!(summary.hit, 4);

        let summary = s
            .perform_actions(&d, new_squad, Some(Chip::FreeHit))
            .unwrap();
        assert_eq!(summary.hit, 0);

        let outcome = s.advance_gameweek(&d).unwrap();
        assert_eq!(outcome.hit, 0);
        assert_eq!(outcome.points, 24);
        assert_eq!(s.total_points(), 24);
        assert_eq!(s.squad(), &before);
        assert_eq!(s.history()[0].hit, 0);
    }

    #[test]
    fn wildcard_after_paid_transfers_drops_the_hit() {
        let d = data();
        let mut s = state(&d);
        let new_squad = s
            .squad()
            .with_replacement(14, 18, &d)
            .and_then(|sq| sq.with_replacement(4, 16, &d))
            .unwrap();
        s.perform_actions(&d, new_squad.clone(), None).unwrap();
        s.perform_actions(&d, new_squad.clone(), Some(Chip::Wildcard))
            .unwrap();
        let outcome = s.advance_gameweek(&d).unwrap();
        assert_eq!(outcome.hit, 0);
        assert_eq!(s.squad(), &new_squad);
    }

    #[test]
    fn illegal_formation_is_rejected_without_side_effects() {
        let d = data();
        let mut s = state(&d);
        let before = s.squad().clone();
        // Benching a keeper and three defenders leaves a 2-5-3 shape with
        // two keepers and one defender starting.
        let lopsided = s.squad().with_bench(vec![2, 3, 4, 5]).unwrap();
        let err = s
            .perform_actions(&d, lopsided, Some(Chip::FreeHit))
            .unwrap_err();
        assert!(
            matches!(err, GameError::Rule(RuleViolation::Formation { .. })),
            "{err:?}"
        );
        assert_eq!(s.squad(), &before);
        assert_eq!(s.bank(), 250);
        assert_eq!(s.free_transfers(), FreeTransfers::Bounded(1));
        assert_eq!(s.active_chip(), None);
        assert!(!s.chips().is_used(Chip::FreeHit));

        let outcome = s.advance_gameweek(&d).unwrap();
        assert_eq!(outcome.hit, 0);
        assert_eq!(outcome.points, 24);
    }

    #[test]
    fn out_of_range_rules_are_rejected() {
        let d = data();
        let rules = RulesConfig {
            gameweeks: 255,
            ..RulesConfig::default()
        };
        assert_eq!(
            SeasonState::new(squad(&d), &d, rules).unwrap_err(),
            GameError::Config(RulesConfigError::Gameweeks(255))
        );
    }

    #[test]
    fn captain_and_triple_captain_scoring() {
        let mut d = data();
        d.set_gameweek_stat(
            3,
            13,
            GameweekStat {
                points: 10,
                minutes: 90,
                value: None,
                fixtures: 1,
            },
        );
        let sq = squad(&d);
        // Ten starters on 2 points, the captain on 10 counted twice.
        assert_eq!(compute_gameweek_points(&sq, &d, 3, None), 20 + 10 + 10);
        assert_eq!(
            compute_gameweek_points(&sq, &d, 3, Some(Chip::TripleCaptain)),
            20 + 10 + 20
        );
        // All fifteen score under bench boost.
        assert_eq!(
            compute_gameweek_points(&sq, &d, 3, Some(Chip::BenchBoost)),
            28 + 10 + 10
        );
    }

    #[test]
    fn vice_captain_takes_over_when_captain_is_subbed_off() {
        let mut d = SeasonData::new("test");
        let full = data();
        for p in full.players() {
            d.insert_player(p.clone());
            if p.id != 13 {
                d.insert_gameweek_row(1, p.id, 3, 90, None);
            }
        }
        let mut s = SeasonState::new(squad(&d), &d, RulesConfig::default()).unwrap();
        let outcome = s.advance_gameweek(&d).unwrap();
        assert_eq!(outcome.substitutions.len(), 1);
        assert_eq!(outcome.substitutions[0].player_out, 13);
        // A bench defender would leave 5-4-1, so the midfielder comes on.
        assert_eq!(outcome.substitutions[0].player_in, 12);
        // Eleven starters on 3 after the sub, plus the vice captain again.
        assert_eq!(outcome.points, 33 + 3);
        // The substitution does not stick.
        assert!(!s.squad().is_benched(13));
        assert!(s.squad().is_benched(12));
    }
}
