use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::calibration::{
    LogitCalibration, Metrics, binary_brier, ece_1x2, empirical_outcome_probs, evaluate_probs,
    fit_logit_calibration, train_split_index,
};
use crate::config::ModelConfig;
use crate::confidence::ConfidenceLevel;
use crate::league_params::LeagueParams;
use crate::model::{Fixture, MatchRecord, Outcome, Prob3};
use crate::predictor::Predictor;

const ECE_BINS: usize = 10;

/// One walk-forward prediction next to what actually happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestRow {
    pub date: NaiveDate,
    pub home: String,
    pub away: String,
    pub probs: Prob3,
    pub learned_probs: Option<Prob3>,
    pub pick: Outcome,
    pub level: ConfidenceLevel,
    pub actual: Outcome,
    pub goals_line: f64,
    pub over_prob: f64,
    pub total_goals: u32,
    pub btts_prob: f64,
    pub btts_actual: bool,
    pub used_defaults: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelHitRate {
    pub level: ConfidenceLevel,
    pub count: usize,
    pub hits: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BinaryScore {
    pub samples: usize,
    pub accuracy: f64,
    pub brier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub total_matches: usize,
    pub warmup: usize,
    pub samples: usize,
    pub used_defaults: usize,
    pub result: Metrics,
    /// Learned model alone, over the rows where it was trained.
    pub learned: Option<Metrics>,
    pub ece: f64,
    pub over_under: BinaryScore,
    pub btts: BinaryScore,
    pub by_level: Vec<LevelHitRate>,
    pub split_index: usize,
    pub calibration: LogitCalibration,
    pub holdout_raw: Metrics,
    pub holdout_calibrated: Metrics,
    /// Holdout ECE before and after calibration.
    pub ece_holdout: f64,
    pub ece_calibrated: f64,
    /// Training-slice base rates scored on the holdout.
    pub base_rates: Prob3,
    pub holdout_baseline: Metrics,
}

/// Predict every match after the first `warmup` using only matches played on
/// earlier dates.
pub fn walk_forward(history: &[MatchRecord], config: &ModelConfig, warmup: usize) -> Vec<BacktestRow> {
    walk_forward_with_params(history, config, warmup, None)
}

/// Like [`walk_forward`], but every fixture is priced with `params` instead
/// of league params refitted at each kickoff.
pub fn walk_forward_with_params(
    history: &[MatchRecord],
    config: &ModelConfig,
    warmup: usize,
    params: Option<HashMap<String, LeagueParams>>,
) -> Vec<BacktestRow> {
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|m| m.date);
    let targets: Vec<MatchRecord> = sorted.iter().skip(warmup).cloned().collect();

    let fixtures: Vec<Fixture> = targets
        .iter()
        .enumerate()
        .map(|(i, m)| Fixture {
            kickoff: m.date.and_hms_opt(0, 0, 0),
            league: m.league.clone(),
            ..Fixture::new(i.to_string(), m.home.clone(), m.away.clone())
        })
        .collect();

    let mut predictor = Predictor::new(config.clone(), sorted);
    if let Some(params) = params {
        predictor = predictor.with_league_params(params);
    }
    let predictions = predictor.predict_all(&fixtures);

    targets
        .iter()
        .zip(predictions)
        .map(|(m, p)| BacktestRow {
            date: m.date,
            home: m.home.clone(),
            away: m.away.clone(),
            probs: p.probs,
            learned_probs: p.learned_probs,
            pick: p.pick,
            level: p.level,
            actual: m.outcome(),
            goals_line: p.over_under.line.unwrap_or(config.default_goals_line),
            over_prob: p.over_under.yes,
            total_goals: m.total_goals(),
            btts_prob: p.btts.yes,
            btts_actual: m.home_goals > 0 && m.away_goals > 0,
            used_defaults: p.used_defaults,
        })
        .collect()
}

pub fn run(history: &[MatchRecord], config: &ModelConfig, warmup: usize) -> BacktestReport {
    run_with_params(history, config, warmup, None)
}

pub fn run_with_params(
    history: &[MatchRecord],
    config: &ModelConfig,
    warmup: usize,
    params: Option<HashMap<String, LeagueParams>>,
) -> BacktestReport {
    let rows = walk_forward_with_params(history, config, warmup, params);
    let report = summarize(&rows, history.len(), warmup);
    info!(
        samples = report.samples,
        brier = report.result.brier,
        log_loss = report.result.log_loss,
        accuracy = report.result.accuracy,
        "backtest finished"
    );
    report
}

pub fn summarize(rows: &[BacktestRow], total_matches: usize, warmup: usize) -> BacktestReport {
    let preds: Vec<Prob3> = rows.iter().map(|r| r.probs).collect();
    let outcomes: Vec<Outcome> = rows.iter().map(|r| r.actual).collect();

    let split_index = train_split_index(rows.len()).min(rows.len());
    let (calibration, _) = fit_logit_calibration(&preds[..split_index], &outcomes[..split_index]);
    let calibrated: Vec<Prob3> = preds.iter().map(|p| calibration.apply(*p)).collect();
    let base_rates = empirical_outcome_probs(&outcomes[..split_index]);
    let baseline = vec![base_rates; rows.len() - split_index];
    let holdout = &outcomes[split_index..];

    BacktestReport {
        total_matches,
        warmup: warmup.min(total_matches),
        samples: rows.len(),
        used_defaults: rows.iter().filter(|r| r.used_defaults).count(),
        result: evaluate_probs(&preds, &outcomes),
        learned: learned_metrics(rows),
        ece: ece_1x2(&preds, &outcomes, ECE_BINS),
        over_under: over_under_score(rows),
        btts: binary_score(
            &rows.iter().map(|r| r.btts_prob).collect::<Vec<_>>(),
            &rows.iter().map(|r| r.btts_actual).collect::<Vec<_>>(),
        ),
        by_level: hit_rates(rows),
        split_index,
        calibration,
        holdout_raw: evaluate_probs(&preds[split_index..], holdout),
        holdout_calibrated: evaluate_probs(&calibrated[split_index..], holdout),
        ece_holdout: ece_1x2(&preds[split_index..], holdout, ECE_BINS),
        ece_calibrated: ece_1x2(&calibrated[split_index..], holdout, ECE_BINS),
        base_rates,
        holdout_baseline: evaluate_probs(&baseline, holdout),
    }
}

fn learned_metrics(rows: &[BacktestRow]) -> Option<Metrics> {
    let (probs, outcomes): (Vec<Prob3>, Vec<Outcome>) = rows
        .iter()
        .filter_map(|r| r.learned_probs.map(|p| (p, r.actual)))
        .unzip();
    (!probs.is_empty()).then(|| evaluate_probs(&probs, &outcomes))
}

/// Pushed totals (whole lines hit exactly) are left out.
fn over_under_score(rows: &[BacktestRow]) -> BinaryScore {
    let mut probs = Vec::new();
    let mut actual = Vec::new();
    for r in rows {
        let total = r.total_goals as f64;
        if (total - r.goals_line).abs() < 1e-9 {
            continue;
        }
        probs.push(r.over_prob);
        actual.push(total > r.goals_line);
    }
    binary_score(&probs, &actual)
}

fn binary_score(probs: &[f64], actual: &[bool]) -> BinaryScore {
    if probs.is_empty() || probs.len() != actual.len() {
        return BinaryScore::default();
    }
    let hits = probs
        .iter()
        .zip(actual)
        .filter(|(p, a)| (**p >= 0.5) == **a)
        .count();
    BinaryScore {
        samples: probs.len(),
        accuracy: hits as f64 / probs.len() as f64,
        brier: binary_brier(probs, actual),
    }
}

fn hit_rates(rows: &[BacktestRow]) -> Vec<LevelHitRate> {
    ConfidenceLevel::ALL
        .iter()
        .map(|level| {
            let at_level: Vec<&BacktestRow> = rows.iter().filter(|r| r.level == *level).collect();
            let hits = at_level.iter().filter(|r| r.pick == r.actual).count();
            let count = at_level.len();
            LevelHitRate {
                level: *level,
                count,
                hits,
                rate: if count == 0 { 0.0 } else { hits as f64 / count as f64 },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;

    use super::{ECE_BINS, run, summarize, walk_forward, walk_forward_with_params};
    use crate::calibration::{ece_1x2, empirical_outcome_probs, evaluate_probs};
    use crate::config::ModelConfig;
    use crate::league_params::LeagueParams;
    use crate::model::{Fixture, MatchRecord, Outcome, Prob3};
    use crate::predictor::Predictor;

    fn season() -> Vec<MatchRecord> {
        let teams = ["Ajax", "PSV", "Feyenoord", "AZ"];
        let mut out = Vec::new();
        let mut day = 0i64;
        let start = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
        for (i, home) in teams.iter().enumerate() {
            for (j, away) in teams.iter().enumerate() {
                if i == j {
                    continue;
                }
                day += 7;
                out.push(MatchRecord {
                    date: start + chrono::Duration::days(day),
                    league: "Eredivisie".to_string(),
                    home: home.to_string(),
                    away: away.to_string(),
                    home_goals: ((i + 2 * j) % 4) as u8,
                    away_goals: ((j + i) % 3) as u8,
                    home_corners: Some(5),
                    away_corners: Some(4),
                });
            }
        }
        out
    }

    #[test]
    fn warmup_is_skipped() {
        let history = season();
        let rows = walk_forward(&history, &ModelConfig::default(), 4);
        assert_eq!(rows.len(), history.len() - 4);
        assert!(rows.iter().all(|r| (r.probs.sum() - 1.0).abs() < 1e-9));
    }

    #[test]
    fn appending_future_matches_does_not_change_earlier_predictions() {
        let history = season();
        let cfg = ModelConfig::default();
        let short = walk_forward(&history[..8], &cfg, 2);
        let long = walk_forward(&history, &cfg, 2);
        for (a, b) in short.iter().zip(&long) {
            assert_eq!(a.probs, b.probs);
            assert_eq!(a.over_prob, b.over_prob);
        }
    }

    #[test]
    fn report_counts_add_up() {
        let history = season();
        let report = run(&history, &ModelConfig::default(), 2);
        assert_eq!(report.samples, history.len() - 2);
        let by_level: usize = report.by_level.iter().map(|l| l.count).sum();
        assert_eq!(by_level, report.samples);
        assert!(report.split_index < report.samples);
        assert!(report.holdout_calibrated.samples > 0);
        assert!(report.result.brier > 0.0);
    }

    #[test]
    fn calibrated_ece_is_scored_on_holdout_only() {
        let history = season();
        let rows = walk_forward(&history, &ModelConfig::default(), 2);
        let report = summarize(&rows, history.len(), 2);
        let split = report.split_index;
        assert!(split > 0 && split < rows.len());

        let outcomes: Vec<Outcome> = rows.iter().map(|r| r.actual).collect();
        let calibrated: Vec<Prob3> = rows.iter().map(|r| report.calibration.apply(r.probs)).collect();
        let raw: Vec<Prob3> = rows.iter().map(|r| r.probs).collect();
        let holdout = ece_1x2(&calibrated[split..], &outcomes[split..], ECE_BINS);
        assert!((report.ece_calibrated - holdout).abs() < 1e-12);
        let raw_holdout = ece_1x2(&raw[split..], &outcomes[split..], ECE_BINS);
        assert!((report.ece_holdout - raw_holdout).abs() < 1e-12);
    }

    #[test]
    fn baseline_uses_training_base_rates() {
        let history = season();
        let rows = walk_forward(&history, &ModelConfig::default(), 2);
        let report = summarize(&rows, history.len(), 2);
        let split = report.split_index;
        let outcomes: Vec<Outcome> = rows.iter().map(|r| r.actual).collect();

        let rates = empirical_outcome_probs(&outcomes[..split]);
        assert_eq!(report.base_rates, rates);
        assert!((rates.sum() - 1.0).abs() < 1e-9);
        let expected = evaluate_probs(&vec![rates; rows.len() - split], &outcomes[split..]);
        assert_eq!(report.holdout_baseline, expected);
    }

    #[test]
    fn learned_model_is_scored_when_enabled() {
        let history = crate::demo::generate_season(
            9,
            8,
            NaiveDate::from_ymd_opt(2024, 8, 10).unwrap(),
        )
        .unwrap();
        let mut cfg = ModelConfig::default();
        let plain = run(&history, &cfg, 8);
        assert!(plain.learned.is_none());

        cfg.learned.enabled = true;
        cfg.learned.min_samples = 10;
        let report = run(&history, &cfg, 8);
        let learned = report.learned.expect("learned rows");
        assert!(learned.samples > 0 && learned.samples <= report.samples);
        assert!(learned.log_loss.is_finite());
    }

    #[test]
    fn saved_league_params_price_every_fixture() {
        let history = season();
        let cfg = ModelConfig::default();
        let saved = HashMap::from([(
            "Eredivisie".to_string(),
            LeagueParams {
                sample_matches: 500,
                goals_total_base: 2.7,
                home_adv_goals: 1.5,
                ..LeagueParams::defaults("Eredivisie")
            },
        )]);

        let plain = walk_forward(&history, &cfg, 2);
        let rows = walk_forward_with_params(&history, &cfg, 2, Some(saved.clone()));
        assert_eq!(rows.len(), plain.len());
        assert!(rows.iter().zip(&plain).any(|(a, b)| a.probs != b.probs));

        let last = history.last().unwrap();
        let fx = Fixture {
            kickoff: last.date.and_hms_opt(0, 0, 0),
            league: last.league.clone(),
            ..Fixture::new("x", last.home.clone(), last.away.clone())
        };
        let direct = Predictor::new(cfg, history.clone())
            .with_league_params(saved)
            .predict(&fx);
        assert_eq!(rows.last().unwrap().probs, direct.probs);
    }
}
