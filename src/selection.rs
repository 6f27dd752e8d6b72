use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, info};
use thiserror::Error;

use crate::config::RulesConfig;
use crate::position::Position;
use crate::rules::{Formation, RuleViolation, VALID_FORMATIONS, validate_squad};
use crate::season_data::{ClubId, PlayerId, Price, SeasonDataProvider, format_price};
use crate::squad::{SQUAD_SIZE, Squad, SquadError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("could only fill {filled} of {needed} {position} slots within budget and club cap")]
    Unfilled {
        position: Position,
        filled: usize,
        needed: usize,
    },
    #[error(transparent)]
    Squad(#[from] SquadError),
    #[error(transparent)]
    Rule(#[from] RuleViolation),
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    id: PlayerId,
    position: Position,
    club: ClubId,
    price: Price,
    predicted: f64,
}

impl Candidate {
    fn value(&self) -> f64 {
        self.predicted / (self.price.max(1) as f64)
    }
}

fn by_prediction(a: &Candidate, b: &Candidate) -> Ordering {
    b.predicted
        .total_cmp(&a.predicted)
        .then(a.id.cmp(&b.id))
}

/// Greedy squad builder: best predicted points per price first, subject to
/// positional quotas, the club cap, and leaving enough budget to fill the
/// remaining slots with the cheapest players available.
pub fn select_initial_squad<P>(
    provider: &P,
    predictions: &HashMap<PlayerId, f64>,
    rules: &RulesConfig,
    gameweek: u8,
) -> Result<Squad, SelectionError>
where
    P: SeasonDataProvider + ?Sized,
{
    let mut candidates: Vec<Candidate> = provider
        .player_ids()
        .into_iter()
        .filter_map(|id| {
            let player = provider.player(id)?;
            Some(Candidate {
                id,
                position: player.position,
                club: player.club,
                price: provider.gameweek_price(id, gameweek)?,
                predicted: *predictions.get(&id)?,
            })
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.value()
            .total_cmp(&a.value())
            .then_with(|| by_prediction(a, b))
    });

    let mut cheapest: BTreeMap<Position, Vec<Candidate>> = BTreeMap::new();
    for c in &candidates {
        cheapest.entry(c.position).or_default().push(*c);
    }
    for list in cheapest.values_mut() {
        list.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id)));
    }

    let mut picked: Vec<Candidate> = Vec::new();
    let mut taken: HashSet<PlayerId> = HashSet::new();
    let mut clubs: HashMap<ClubId, usize> = HashMap::new();
    let mut spent: Price = 0;

    for c in &candidates {
        let filled = picked.iter().filter(|p| p.position == c.position).count();
        if filled >= c.position.squad_quota() {
            continue;
        }
        if clubs.get(&c.club).copied().unwrap_or(0) >= rules.club_cap {
            continue;
        }
        taken.insert(c.id);
        let reserve = cheapest_fill(&cheapest, &picked, c, &taken, &clubs, rules.club_cap);
        let committed = spent.saturating_add(c.price);
        match reserve {
            Some(reserve) if committed.saturating_add(reserve) <= rules.budget => {
                picked.push(*c);
                *clubs.entry(c.club).or_insert(0) += 1;
                spent = committed;
                debug!(
                    "picked {} ({}, {:.1} predicted) for {}",
                    c.id,
                    c.position,
                    c.predicted,
                    format_price(c.price)
                );
            }
            _ => {
                taken.remove(&c.id);
            }
        }
        if picked.len() == SQUAD_SIZE {
            break;
        }
    }

    for position in Position::ALL {
        let filled = picked.iter().filter(|p| p.position == position).count();
        if filled < position.squad_quota() {
            return Err(SelectionError::Unfilled {
                position,
                filled,
                needed: position.squad_quota(),
            });
        }
    }

    let squad = arrange(&picked, provider)?;
    let cost = validate_squad(&squad, provider, rules.budget, rules.club_cap, gameweek)?;
    info!(
        "selected squad in {} for {} of {}",
        squad.formation(),
        format_price(cost),
        format_price(rules.budget)
    );
    Ok(squad)
}

/// Cost of the cheapest players that would complete the squad once
/// `candidate` joins `picked`, or `None` when some position cannot be filled.
/// Clubs already at the cap are skipped.
fn cheapest_fill(
    cheapest: &BTreeMap<Position, Vec<Candidate>>,
    picked: &[Candidate],
    candidate: &Candidate,
    taken: &HashSet<PlayerId>,
    clubs: &HashMap<ClubId, usize>,
    club_cap: usize,
) -> Option<Price> {
    let club_full = |club: ClubId| {
        let extra = usize::from(club == candidate.club);
        clubs.get(&club).copied().unwrap_or(0) + extra >= club_cap
    };
    let mut total: Price = 0;
    for position in Position::ALL {
        let mut needed = position
            .squad_quota()
            .saturating_sub(picked.iter().filter(|p| p.position == position).count());
        if candidate.position == position {
            needed = needed.saturating_sub(1);
        }
        if needed == 0 {
            continue;
        }
        let pool = cheapest.get(&position)?;
        let prices: Vec<Price> = pool
            .iter()
            .filter(|c| !taken.contains(&c.id) && !club_full(c.club))
            .take(needed)
            .map(|c| c.price)
            .collect();
        if prices.len() < needed {
            return None;
        }
        total = total.saturating_add(prices.iter().sum::<Price>());
    }
    Some(total)
}

/// Picks the formation whose starting eleven has the most predicted points,
/// benches the rest and hands the armbands to the two best starters.
fn arrange<P>(picked: &[Candidate], provider: &P) -> Result<Squad, SquadError>
where
    P: SeasonDataProvider + ?Sized,
{
    let mut groups: BTreeMap<Position, Vec<Candidate>> = BTreeMap::new();
    for c in picked {
        groups.entry(c.position).or_default().push(*c);
    }
    for list in groups.values_mut() {
        list.sort_by(by_prediction);
    }
    let group = |pos: Position| groups.get(&pos).map(Vec::as_slice).unwrap_or(&[]);

    let starters_for = |f: &Formation| -> Vec<Candidate> {
        [
            (Position::Goalkeeper, f.keepers),
            (Position::Defender, f.defenders),
            (Position::Midfielder, f.midfielders),
            (Position::Forward, f.forwards),
        ]
        .into_iter()
        .flat_map(|(pos, n)| group(pos).iter().take(n as usize).copied())
        .collect()
    };
    let score = |xi: &[Candidate]| xi.iter().map(|c| c.predicted).sum::<f64>();

    let mut best_xi = starters_for(&VALID_FORMATIONS[0]);
    for formation in &VALID_FORMATIONS[1..] {
        let xi = starters_for(formation);
        if score(&xi) > score(&best_xi) {
            best_xi = xi;
        }
    }
    let starting: HashSet<PlayerId> = best_xi.iter().map(|c| c.id).collect();

    let mut bench_keepers: Vec<Candidate> = Vec::new();
    let mut bench_outfield: Vec<Candidate> = Vec::new();
    for c in picked.iter().filter(|c| !starting.contains(&c.id)) {
        if c.position == Position::Goalkeeper {
            bench_keepers.push(*c);
        } else {
            bench_outfield.push(*c);
        }
    }
    bench_outfield.sort_by(by_prediction);
    let bench: Vec<PlayerId> = bench_keepers
        .iter()
        .chain(bench_outfield.iter())
        .map(|c| c.id)
        .collect();

    best_xi.sort_by(by_prediction);
    let captain = best_xi.first().map(|c| c.id).unwrap_or_default();
    let vice_captain = best_xi.get(1).map(|c| c.id).unwrap_or_default();

    let ids = |pos: Position| group(pos).iter().map(|c| c.id).collect::<Vec<_>>();
    Squad::new(
        Position::ALL.map(ids),
        bench,
        captain,
        vice_captain,
        provider,
    )
}
