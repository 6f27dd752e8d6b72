use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use env_logger::Env;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_cache::app_cache_dir;
use crate::season_csv::SeasonSource;
use crate::season_data::Price;

pub const DEFAULT_SEASON: &str = "2020-21";
pub const DEFAULT_DATA_URL: &str =
    "https://raw.githubusercontent.com/vaastav/Fantasy-Premier-League/master/data";

/// Highest gameweek number a season may have. Gameweek file probing stops
/// here too; 2019-20 ran to 47.
pub const MAX_GAMEWEEKS: u8 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesConfigError {
    #[error("gameweeks must be between 1 and 50, got {0}")]
    Gameweeks(u8),
    #[error("new_wildcard_gameweek {wildcard} is outside 1..={gameweeks}")]
    WildcardGameweek { wildcard: u8, gameweeks: u8 },
    #[error("club_cap must be at least 1")]
    ClubCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub max_free_transfers: u32,
    pub transfer_cost: i32,
    pub new_wildcard_gameweek: u8,
    pub gameweeks: u8,
    pub budget: Price,
    pub club_cap: usize,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            max_free_transfers: 2,
            transfer_cost: 4,
            new_wildcard_gameweek: 20,
            gameweeks: 38,
            budget: 1000,
            club_cap: 3,
        }
    }
}

impl RulesConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("read rules {}", path.display()))?;
        let rules: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parse rules {}", path.display()))?;
        rules
            .validate()
            .with_context(|| format!("invalid rules in {}", path.display()))?;
        Ok(rules)
    }

    pub fn validate(&self) -> Result<(), RulesConfigError> {
        if self.gameweeks == 0 || self.gameweeks > MAX_GAMEWEEKS {
            return Err(RulesConfigError::Gameweeks(self.gameweeks));
        }
        if self.new_wildcard_gameweek == 0 || self.new_wildcard_gameweek > self.gameweeks {
            return Err(RulesConfigError::WildcardGameweek {
                wildcard: self.new_wildcard_gameweek,
                gameweeks: self.gameweeks,
            });
        }
        if self.club_cap == 0 {
            return Err(RulesConfigError::ClubCap);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ToolkitConfig {
    pub source: SeasonSource,
    pub season: String,
    pub db_path: Option<PathBuf>,
    pub rules: RulesConfig,
}

impl ToolkitConfig {
    /// Reads `.env.local` / `.env` and then the `FPL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");

        let source = match env_non_empty("FPL_DATA_DIR") {
            Some(dir) => SeasonSource::Local(expand_home(&dir)),
            None => SeasonSource::Remote(
                env_non_empty("FPL_DATA_URL").unwrap_or_else(|| DEFAULT_DATA_URL.to_string()),
            ),
        };
        let season = env_non_empty("FPL_SEASON").unwrap_or_else(|| DEFAULT_SEASON.to_string());
        let db_path = env_non_empty("FPL_DB")
            .map(|p| expand_home(&p))
            .or_else(default_db_path);
        let rules = match env_non_empty("FPL_RULES") {
            Some(path) => RulesConfig::load(&expand_home(&path))?,
            None => RulesConfig::default(),
        };

        Ok(Self {
            source,
            season,
            db_path,
            rules,
        })
    }
}

/// `RUST_LOG` wins over the `info` default.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("fpl_seasons.sqlite"))
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}

/// `--name value` or `--name=value` from the process arguments.
pub fn arg_value(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    find_arg_value(&args, name)
}

pub fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|a| a == flag)
}

pub fn find_arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&prefix) {
            if !v.trim().is_empty() {
                return Some(v.trim().to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_defaults_match_game() {
        let rules = RulesConfig::default();
        assert_eq!(rules.max_free_transfers, 2);
        assert_eq!(rules.transfer_cost, 4);
        assert_eq!(rules.new_wildcard_gameweek, 20);
        assert_eq!(rules.gameweeks, 38);
        assert_eq!(rules.budget, 1000);
        assert_eq!(rules.club_cap, 3);
    }

    #[test]
    fn partial_rules_json_keeps_defaults() {
        let rules: RulesConfig = serde_json::from_str(r#"{"budget": 1050}"#).unwrap();
        assert_eq!(rules.budget, 1050);
        assert_eq!(rules.gameweeks, 38);
    }

    #[test]
    fn rules_outside_the_season_are_rejected() {
        assert_eq!(RulesConfig::default().validate(), Ok(()));
        let long = RulesConfig {
            gameweeks: 255,
            ..RulesConfig::default()
        };
        assert_eq!(long.validate(), Err(RulesConfigError::Gameweeks(255)));
        let short = RulesConfig {
            gameweeks: 30,
            ..RulesConfig::default()
        };
        assert_eq!(short.validate(), Ok(()));
        let late_wildcard = RulesConfig {
            new_wildcard_gameweek: 39,
            ..RulesConfig::default()
        };
        assert_eq!(
            late_wildcard.validate(),
            Err(RulesConfigError::WildcardGameweek {
                wildcard: 39,
                gameweeks: 38
            })
        );
    }

    #[test]
    fn loading_rules_file_validates_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, r#"{"gameweeks": 255}"#).unwrap();
        let err = RulesConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("gameweeks must be between 1 and 50"));

        fs::write(&path, r#"{"budget": 1050, "gameweeks": 47}"#).unwrap();
        let rules = RulesConfig::load(&path).unwrap();
        assert_eq!(rules.budget, 1050);
        assert_eq!(rules.gameweeks, 47);
    }

    #[test]
    fn arg_parsing_supports_both_forms() {
        let args: Vec<String> = ["--season", "2019-20", "--out=report.xlsx", "--db"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(find_arg_value(&args, "--season").as_deref(), Some("2019-20"));
        assert_eq!(find_arg_value(&args, "--out").as_deref(), Some("report.xlsx"));
        assert_eq!(find_arg_value(&args, "--db"), None);
    }
}
