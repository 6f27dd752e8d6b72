use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chip {
    Wildcard,
    FreeHit,
    TripleCaptain,
    BenchBoost,
}

impl Chip {
    pub const ALL: [Chip; 4] = [
        Chip::Wildcard,
        Chip::FreeHit,
        Chip::TripleCaptain,
        Chip::BenchBoost,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Chip::Wildcard => "Wildcard",
            Chip::FreeHit => "Free hit",
            Chip::TripleCaptain => "Triple captain",
            Chip::BenchBoost => "Bench boost",
        }
    }

    /// Chips that lift the transfer limit for the gameweek they are played in.
    pub fn unlimited_transfers(self) -> bool {
        matches!(self, Chip::Wildcard | Chip::FreeHit)
    }

    pub fn parse(input: &str) -> Option<Self> {
        let norm: String = input
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match norm.as_str() {
            "wildcard" | "w" | "wc" => Some(Chip::Wildcard),
            "freehit" | "f" | "fh" => Some(Chip::FreeHit),
            "triplecaptain" | "triplecap" | "t" | "tc" => Some(Chip::TripleCaptain),
            "benchboost" | "b" | "bb" => Some(Chip::BenchBoost),
            _ => None,
        }
    }
}

impl fmt::Display for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipUsage {
    pub wildcard: bool,
    pub free_hit: bool,
    pub triple_captain: bool,
    pub bench_boost: bool,
}

impl ChipUsage {
    pub fn is_used(&self, chip: Chip) -> bool {
        match chip {
            Chip::Wildcard => self.wildcard,
            Chip::FreeHit => self.free_hit,
            Chip::TripleCaptain => self.triple_captain,
            Chip::BenchBoost => self.bench_boost,
        }
    }

    pub fn set(&mut self, chip: Chip, used: bool) {
        match chip {
            Chip::Wildcard => self.wildcard = used,
            Chip::FreeHit => self.free_hit = used,
            Chip::TripleCaptain => self.triple_captain = used,
            Chip::BenchBoost => self.bench_boost = used,
        }
    }

    pub fn available(&self) -> Vec<Chip> {
        Chip::ALL.into_iter().filter(|c| !self.is_used(*c)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FreeTransfers {
    Bounded(u32),
    Unlimited,
}

impl FreeTransfers {
    /// Spends free transfers on `transfers` moves and returns how many of them
    /// were not covered.
    pub fn consume(&mut self, transfers: u32) -> u32 {
        match self {
            FreeTransfers::Unlimited => 0,
            FreeTransfers::Bounded(n) => {
                let paid = transfers.saturating_sub(*n);
                *n = n.saturating_sub(transfers);
                paid
            }
        }
    }

    /// Adds the weekly free transfer, capped at `cap`.
    pub fn accrue(&mut self, cap: u32) {
        if let FreeTransfers::Bounded(n) = self {
            *n = n.saturating_add(1).min(cap);
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, FreeTransfers::Unlimited)
    }
}

impl fmt::Display for FreeTransfers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreeTransfers::Bounded(n) => write!(f, "{n}"),
            FreeTransfers::Unlimited => f.write_str("unlimited"),
        }
    }
}
