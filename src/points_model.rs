use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::position::Position;
use crate::season_data::{PlayerId, PlayerRecord, SeasonDataProvider, normalize_name};

pub const FEATURE_COUNT: usize = 17;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "total_points",
    "minutes",
    "goals_scored",
    "assists",
    "clean_sheets",
    "goals_conceded",
    "bonus",
    "bps",
    "influence",
    "creativity",
    "threat",
    "ict_index",
    "price",
    "is_goalkeeper",
    "is_defender",
    "is_midfielder",
    "is_forward",
];

const ARTIFACT_VERSION: u32 = 1;
const EVAL_EVERY: usize = 20;
const PATIENCE: usize = 20;
const IMPROVEMENT_EPS: f64 = 1e-4;

pub fn features(record: &PlayerRecord) -> [f64; FEATURE_COUNT] {
    let s = &record.summary;
    let one_hot = |p: Position| if record.position == p { 1.0 } else { 0.0 };
    [
        s.total_points as f64,
        s.minutes as f64,
        s.goals_scored as f64,
        s.assists as f64,
        s.clean_sheets as f64,
        s.goals_conceded as f64,
        s.bonus as f64,
        s.bps as f64,
        s.influence,
        s.creativity,
        s.threat,
        s.ict_index,
        record.now_cost as f64 / 10.0,
        one_hot(Position::Goalkeeper),
        one_hot(Position::Defender),
        one_hot(Position::Midfielder),
        one_hot(Position::Forward),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub name: String,
    pub x: [f64; FEATURE_COUNT],
    pub target: f64,
}

/// Pairs each player who played in `prev` with their total in `next`.
/// Players are matched on normalized full name; names that occur more than
/// once in either season are left out.
pub fn build_training_set<P, Q>(prev: &P, next: &Q) -> Vec<TrainingSample>
where
    P: SeasonDataProvider + ?Sized,
    Q: SeasonDataProvider + ?Sized,
{
    let next_by_name = unique_by_name(next);
    let prev_by_name = unique_by_name(prev);

    let mut samples: Vec<TrainingSample> = prev_by_name
        .into_iter()
        .filter(|(_, p)| p.summary.minutes > 0)
        .filter_map(|(name, p)| {
            let later = next_by_name.get(&name)?;
            Some(TrainingSample {
                x: features(p),
                target: later.summary.total_points as f64,
                name,
            })
        })
        .collect();
    samples.sort_by(|a, b| a.name.cmp(&b.name));
    info!(
        "training set {} -> {}: {} players matched",
        prev.season(),
        next.season(),
        samples.len()
    );
    samples
}

fn unique_by_name<P>(provider: &P) -> HashMap<String, &PlayerRecord>
where
    P: SeasonDataProvider + ?Sized,
{
    let mut seen: HashMap<String, Option<&PlayerRecord>> = HashMap::new();
    for id in provider.player_ids() {
        let Some(p) = provider.player(id) else {
            continue;
        };
        seen.entry(normalize_name(&p.full_name()))
            .and_modify(|slot| *slot = None)
            .or_insert(Some(p));
    }
    seen.into_iter()
        .filter_map(|(name, p)| p.map(|p| (name, p)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub l2: f64,
    pub learning_rate: f64,
    pub max_iters: usize,
    pub train_split: f64,
    pub min_samples: usize,
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            l2: 0.01,
            learning_rate: 0.05,
            max_iters: 4000,
            train_split: 0.8,
            min_samples: 50,
            seed: 2021,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsModelArtifact {
    pub version: u32,
    pub generated_at: String,
    #[serde(default)]
    pub train_season: String,
    #[serde(default)]
    pub target_season: String,
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub coeffs: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub l2: f64,
    #[serde(default)]
    pub train_rmse: f64,
    #[serde(default)]
    pub val_rmse: f64,
    #[serde(default)]
    pub baseline_val_rmse: f64,
    #[serde(default)]
    pub train_samples: usize,
    #[serde(default)]
    pub val_samples: usize,
}

impl PointsModelArtifact {
    pub fn improves_on_baseline(&self) -> bool {
        self.val_rmse + IMPROVEMENT_EPS < self.baseline_val_rmse
    }
}

/// Ridge regression of next-season points on standardized features, fitted by
/// gradient descent with early stopping on a shuffled validation split.
pub fn fit(samples: &[TrainingSample], options: FitOptions) -> Result<PointsModelArtifact> {
    if samples.len() < options.min_samples.max(2) {
        return Err(anyhow!(
            "not enough training samples: {} < {}",
            samples.len(),
            options.min_samples.max(2)
        ));
    }

    let mut shuffled = samples.to_vec();
    let mut rng = StdRng::seed_from_u64(options.seed);
    shuffled.shuffle(&mut rng);
    let split = ((shuffled.len() as f64) * options.train_split).round() as usize;
    let split = split.clamp(1, shuffled.len() - 1);

    let (means, stds) = feature_norm_stats(&shuffled[..split]);
    for sample in &mut shuffled {
        for i in 0..FEATURE_COUNT {
            sample.x[i] = standardized(sample.x[i], means[i], stds[i]);
        }
    }
    let (train, val) = shuffled.split_at(split);

    let train_mean = train.iter().map(|s| s.target).sum::<f64>() / train.len() as f64;
    let baseline_val = rmse(&[0.0; FEATURE_COUNT], train_mean, val);
    let (coeffs, intercept) = fit_coeffs(train, val, train_mean, options);
    let train_rmse = rmse(&coeffs, intercept, train);
    let val_rmse = rmse(&coeffs, intercept, val);
    info!(
        "points model fit train={} val={} rmse train={train_rmse:.3} val={val_rmse:.3} baseline={baseline_val:.3}",
        train.len(),
        val.len()
    );

    Ok(PointsModelArtifact {
        version: ARTIFACT_VERSION,
        generated_at: chrono::Utc::now().to_rfc3339(),
        train_season: String::new(),
        target_season: String::new(),
        feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        feature_means: means.to_vec(),
        feature_stds: stds.to_vec(),
        coeffs: coeffs.to_vec(),
        intercept,
        l2: options.l2,
        train_rmse,
        val_rmse,
        baseline_val_rmse: baseline_val,
        train_samples: train.len(),
        val_samples: val.len(),
    })
}

fn feature_norm_stats(samples: &[TrainingSample]) -> ([f64; FEATURE_COUNT], [f64; FEATURE_COUNT]) {
    let n = samples.len().max(1) as f64;
    let mut mean = [0.0; FEATURE_COUNT];
    for sample in samples {
        for i in 0..FEATURE_COUNT {
            mean[i] += sample.x[i];
        }
    }
    for v in &mut mean {
        *v /= n;
    }
    let mut std = [0.0; FEATURE_COUNT];
    for sample in samples {
        for i in 0..FEATURE_COUNT {
            let d = sample.x[i] - mean[i];
            std[i] += d * d;
        }
    }
    for v in &mut std {
        *v = (*v / n).sqrt().max(1e-6);
    }
    (mean, std)
}

fn standardized(x: f64, mean: f64, std: f64) -> f64 {
    (x - mean) / std.max(1e-6)
}

fn fit_coeffs(
    train: &[TrainingSample],
    val: &[TrainingSample],
    start_intercept: f64,
    options: FitOptions,
) -> ([f64; FEATURE_COUNT], f64) {
    let mut coeffs = [0.0; FEATURE_COUNT];
    let mut intercept = start_intercept;
    let mut best = (coeffs, intercept);
    let mut best_val = rmse(&coeffs, intercept, val);
    let mut no_improve = 0usize;
    let n = train.len() as f64;

    for iter in 0..options.max_iters {
        let mut grad = [0.0; FEATURE_COUNT];
        let mut grad_b = 0.0;
        for sample in train {
            let err = intercept + dot(&coeffs, &sample.x) - sample.target;
            grad_b += err;
            for j in 0..FEATURE_COUNT {
                grad[j] += err * sample.x[j];
            }
        }

        let lr = options.learning_rate / (1.0 + iter as f64 * 0.001);
        intercept -= lr * grad_b / n;
        for j in 0..FEATURE_COUNT {
            coeffs[j] -= lr * (grad[j] / n + options.l2 * coeffs[j]);
        }

        if iter % EVAL_EVERY == 0 || iter + 1 == options.max_iters {
            let val_rmse = rmse(&coeffs, intercept, val);
            if val_rmse + IMPROVEMENT_EPS < best_val {
                best_val = val_rmse;
                best = (coeffs, intercept);
                no_improve = 0;
            } else {
                no_improve += 1;
                if no_improve >= PATIENCE {
                    debug!("early stop at iteration {iter}");
                    break;
                }
            }
        }
    }
    best
}

fn rmse(coeffs: &[f64; FEATURE_COUNT], intercept: f64, samples: &[TrainingSample]) -> f64 {
    if samples.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = samples
        .iter()
        .map(|s| {
            let err = intercept + dot(coeffs, &s.x) - s.target;
            err * err
        })
        .sum();
    (sum / samples.len() as f64).sqrt()
}

fn dot(a: &[f64; FEATURE_COUNT], b: &[f64; FEATURE_COUNT]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, Clone)]
pub struct PointsModel {
    artifact: PointsModelArtifact,
}

impl PointsModel {
    pub fn from_artifact(artifact: PointsModelArtifact) -> Result<Self> {
        let lens = [
            artifact.feature_means.len(),
            artifact.feature_stds.len(),
            artifact.coeffs.len(),
        ];
        if lens.iter().any(|l| *l != FEATURE_COUNT) {
            return Err(anyhow!(
                "points model artifact has {lens:?} entries, expected {FEATURE_COUNT}"
            ));
        }
        Ok(Self { artifact })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let artifact: PointsModelArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("parse points model {}", path.display()))?;
        Self::from_artifact(artifact)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let raw = serde_json::to_string_pretty(&self.artifact).context("serialize artifact")?;
        fs::write(path, raw).with_context(|| format!("write {}", path.display()))
    }

    pub fn artifact(&self) -> &PointsModelArtifact {
        &self.artifact
    }

    pub fn predict(&self, record: &PlayerRecord) -> f64 {
        let x = features(record);
        let a = &self.artifact;
        let mut out = a.intercept;
        for i in 0..FEATURE_COUNT {
            out += a.coeffs[i] * standardized(x[i], a.feature_means[i], a.feature_stds[i]);
        }
        out.max(0.0)
    }

    /// Predicted next-season points for every player of `provider`.
    pub fn predict_season<P>(&self, provider: &P) -> HashMap<PlayerId, f64>
    where
        P: SeasonDataProvider + ?Sized,
    {
        let records: Vec<&PlayerRecord> = provider
            .player_ids()
            .into_iter()
            .filter_map(|id| provider.player(id))
            .collect();
        records
            .par_iter()
            .map(|p| (p.id, self.predict(p)))
            .collect()
    }
}

/// Each player's final total for the season itself. Only a fair ranking in
/// hindsight, once the season is over.
pub fn season_total_points<P>(provider: &P) -> HashMap<PlayerId, f64>
where
    P: SeasonDataProvider + ?Sized,
{
    provider
        .player_ids()
        .into_iter()
        .filter_map(|id| provider.player(id))
        .map(|p| (p.id, p.summary.total_points as f64))
        .collect()
}

/// Ranking for `current` from the season before: each player's `prev` total,
/// keyed by their `current` id and matched on normalized full name. Players
/// without a unique match in `prev` get 0.
pub fn prior_season_points<P, Q>(prev: &P, current: &Q) -> HashMap<PlayerId, f64>
where
    P: SeasonDataProvider + ?Sized,
    Q: SeasonDataProvider + ?Sized,
{
    let prev_by_name = unique_by_name(prev);
    let out: HashMap<PlayerId, f64> = current
        .player_ids()
        .into_iter()
        .filter_map(|id| current.player(id))
        .map(|p| {
            let points = prev_by_name
                .get(&normalize_name(&p.full_name()))
                .map(|earlier| earlier.summary.total_points as f64)
                .unwrap_or(0.0);
            (p.id, points)
        })
        .collect();
    debug!(
        "prior season points {} -> {}: {} of {} players matched",
        prev.season(),
        current.season(),
        out.values().filter(|v| **v != 0.0).count(),
        out.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season_data::{SeasonData, SeasonSummary};

    fn record(id: PlayerId, name: &str, points: i32, minutes: u32) -> PlayerRecord {
        PlayerRecord {
            id,
            first_name: "Test".to_string(),
            second_name: name.to_string(),
            web_name: name.to_string(),
            position: if id % 2 == 0 {
                Position::Defender
            } else {
                Position::Forward
            },
            club: 1,
            now_cost: 40 + (id % 60),
            summary: SeasonSummary {
                total_points: points,
                minutes,
                goals_scored: (points / 20).max(0) as u32,
                ict_index: points as f64 * 0.8,
                ..SeasonSummary::default()
            },
        }
    }

    fn synthetic_samples(n: u32) -> Vec<TrainingSample> {
        (0..n)
            .map(|i| {
                let points = ((i * 37) % 200) as i32;
                let rec = record(i, &format!("p{i}"), points, 90 * (i % 38));
                // Next season roughly tracks last season with a fixed wobble.
                let wobble = ((i * 13) % 7) as f64 - 3.0;
                TrainingSample {
                    name: rec.full_name(),
                    x: features(&rec),
                    target: 0.8 * points as f64 + 10.0 + wobble,
                }
            })
            .collect()
    }

    #[test]
    fn training_set_matches_names_across_seasons() {
        let mut prev = SeasonData::new("2019-20");
        prev.insert_player(record(1, "Alpha", 100, 2000));
        prev.insert_player(record(2, "Beta", 50, 0));
        prev.insert_player(record(3, "Gamma", 80, 1500));
        let mut next = SeasonData::new("2020-21");
        next.insert_player(record(11, "Alpha", 120, 2500));
        next.insert_player(record(12, "Beta", 60, 900));
        next.insert_player(record(13, "Delta", 10, 100));

        let samples = build_training_set(&prev, &next);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "test_alpha");
        assert_eq!(samples[0].target, 120.0);
    }

    #[test]
    fn prior_points_come_from_the_earlier_season() {
        let mut prev = SeasonData::new("2019-20");
        prev.insert_player(record(1, "Alpha", 100, 2000));
        prev.insert_player(record(2, "Beta", 50, 900));
        let mut current = SeasonData::new("2020-21");
        current.insert_player(record(11, "Alpha", 180, 3000));
        current.insert_player(record(12, "Gamma", 90, 1500));

        let prior = prior_season_points(&prev, &current);
        assert_eq!(prior.len(), 2);
        assert_eq!(prior[&11], 100.0);
        assert_eq!(prior[&12], 0.0);

        // Hindsight totals read the season's own numbers.
        let hindsight = season_total_points(&current);
        assert_eq!(hindsight[&11], 180.0);
        assert_eq!(hindsight[&12], 90.0);
    }

    #[test]
    fn fit_beats_mean_baseline() {
        let samples = synthetic_samples(300);
        let artifact = fit(&samples, FitOptions::default()).unwrap();
        assert!(artifact.improves_on_baseline());
        assert_eq!(artifact.train_samples + artifact.val_samples, 300);
        assert!(artifact.val_rmse < 10.0, "val rmse {}", artifact.val_rmse);
    }

    #[test]
    fn fit_rejects_tiny_sets() {
        let samples = synthetic_samples(10);
        assert!(fit(&samples, FitOptions::default()).is_err());
    }

    #[test]
    fn predictions_rank_strong_players_higher() {
        let artifact = fit(&synthetic_samples(300), FitOptions::default()).unwrap();
        let model = PointsModel::from_artifact(artifact).unwrap();
        let weak = record(500, "Weak", 20, 900);
        let strong = record(501, "Strong", 180, 3000);
        assert!(model.predict(&strong) > model.predict(&weak));

        let mut season = SeasonData::new("2020-21");
        season.insert_player(weak);
        season.insert_player(strong);
        let preds = model.predict_season(&season);
        assert_eq!(preds.len(), 2);
        assert!(preds[&501] > preds[&500]);
    }

    #[test]
    fn artifact_with_wrong_shape_is_rejected() {
        let mut artifact = fit(&synthetic_samples(120), FitOptions::default()).unwrap();
        artifact.coeffs.pop();
        assert!(PointsModel::from_artifact(artifact).is_err());
    }
}
