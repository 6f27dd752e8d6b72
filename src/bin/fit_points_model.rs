use std::path::PathBuf;

use anyhow::{Result, anyhow};

use fpl_toolkit::config::{ToolkitConfig, arg_value, has_flag, init_logging};
use fpl_toolkit::points_model::{
    FEATURE_NAMES, FitOptions, PointsModel, build_training_set, fit,
};
use fpl_toolkit::season_db;

fn main() -> Result<()> {
    init_logging();
    let config = ToolkitConfig::from_env()?;
    let out_path = arg_value("--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("assets/points_model.json"));
    let train_season = arg_value("--train-season").unwrap_or_else(|| "2019-20".to_string());
    let target_season = arg_value("--target-season").unwrap_or_else(|| config.season.clone());
    let force = has_flag("--force");

    let mut options = FitOptions::default();
    if let Some(l2) = arg_value("--l2") {
        options.l2 = l2.parse().map_err(|_| anyhow!("invalid --l2 value '{l2}'"))?;
    }
    if let Some(seed) = arg_value("--seed") {
        options.seed = seed
            .parse()
            .map_err(|_| anyhow!("invalid --seed value '{seed}'"))?;
    }

    let db_path = config.db_path.as_deref();
    let prev = season_db::load_or_fetch(db_path, &config.source, &train_season)?;
    let next = season_db::load_or_fetch(db_path, &config.source, &target_season)?;
    let samples = build_training_set(&prev, &next);

    let mut artifact = fit(&samples, options)?;
    artifact.train_season = train_season.clone();
    artifact.target_season = target_season.clone();

    println!(
        "points model {train_season} -> {target_season} train={} val={} l2={:.3}",
        artifact.train_samples, artifact.val_samples, artifact.l2
    );
    println!(
        "val rmse baseline={:.3} fit={:.3} delta={:+.3}",
        artifact.baseline_val_rmse,
        artifact.val_rmse,
        artifact.baseline_val_rmse - artifact.val_rmse
    );
    println!();
    println!("Feature coefficients (points = intercept + sum(coeff_i * std_feature_i)):");
    println!("  {:16} {:+.3}", "intercept", artifact.intercept);
    for (idx, name) in FEATURE_NAMES.iter().enumerate() {
        println!(
            "  {:16} coeff={:+.3} mean={:.3} std={:.3}",
            name, artifact.coeffs[idx], artifact.feature_means[idx], artifact.feature_stds[idx]
        );
    }

    if !artifact.improves_on_baseline() && !force {
        return Err(anyhow!(
            "validation rmse did not improve (pass --force to still write artifact)"
        ));
    }

    let model = PointsModel::from_artifact(artifact)?;
    model.save(&out_path)?;
    println!();
    println!("artifact written: {}", out_path.display());
    Ok(())
}
