use serde::Serialize;

use crate::goals::ScoreMatrix;
use crate::model::{Outcome, Prob3};

const LAMBDA_MIN: f64 = 0.20;
const LAMBDA_MAX: f64 = 3.80;
const PROB_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

/// Fitted logit calibration: softmax temperature plus an additive draw bias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LogitCalibration {
    pub scale: f64,
    pub draw_bias: f64,
}

impl Default for LogitCalibration {
    fn default() -> Self {
        Self {
            scale: 1.0,
            draw_bias: 0.0,
        }
    }
}

impl LogitCalibration {
    pub fn apply(&self, prob: Prob3) -> Prob3 {
        apply_logit_calibration(prob, self.scale, self.draw_bias)
    }
}

/// Observed home/draw/away frequencies; uniform when there are none.
pub fn empirical_outcome_probs(outcomes: &[Outcome]) -> Prob3 {
    if outcomes.is_empty() {
        return Prob3::uniform();
    }
    let n = outcomes.len() as f64;
    let share = |o: Outcome| outcomes.iter().filter(|x| **x == o).count() as f64 / n;
    Prob3 {
        home: share(Outcome::Home),
        draw: share(Outcome::Draw),
        away: share(Outcome::Away),
    }
}

/// Multiclass Brier, log loss and argmax accuracy.
pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::default();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = Prob3::one_hot(*outcome);
        brier_sum +=
            (p.home - y.home).powi(2) + (p.draw - y.draw).powi(2) + (p.away - y.away).powi(2);
        log_loss_sum += -p.get(*outcome).clamp(PROB_FLOOR, 1.0).ln();
        if p.argmax() == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Mean squared error of a yes/no forecast.
pub fn binary_brier(predictions: &[f64], actual: &[bool]) -> f64 {
    if predictions.is_empty() || predictions.len() != actual.len() {
        return 0.0;
    }
    let sum: f64 = predictions
        .iter()
        .zip(actual)
        .map(|(p, hit)| (p - if *hit { 1.0 } else { 0.0 }).powi(2))
        .sum();
    sum / predictions.len() as f64
}

pub fn apply_logit_calibration(prob: Prob3, logit_scale: f64, draw_bias: f64) -> Prob3 {
    let s = logit_scale.clamp(0.50, 1.80);
    let mut lh = prob.home.clamp(1e-9, 1.0).ln();
    let mut ld = prob.draw.clamp(1e-9, 1.0).ln() + draw_bias;
    let mut la = prob.away.clamp(1e-9, 1.0).ln();

    let mean = (lh + ld + la) / 3.0;
    lh = (lh - mean) * s;
    ld = (ld - mean) * s;
    la = (la - mean) * s;

    let mx = lh.max(ld.max(la));
    let eh = (lh - mx).exp();
    let ed = (ld - mx).exp();
    let ea = (la - mx).exp();
    let den = (eh + ed + ea).max(PROB_FLOOR);

    Prob3 {
        home: (eh / den).clamp(0.0, 1.0),
        draw: (ed / den).clamp(0.0, 1.0),
        away: (ea / den).clamp(0.0, 1.0),
    }
}

/// Grid search over scale 0.70..1.30 and draw bias -0.30..0.30 minimizing
/// log loss. Identity wins ties.
pub fn fit_logit_calibration(
    predictions: &[Prob3],
    outcomes: &[Outcome],
) -> (LogitCalibration, Metrics) {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return (LogitCalibration::default(), Metrics::default());
    }

    let mut best = LogitCalibration::default();
    let mut best_metrics = evaluate_probs(predictions, outcomes);

    for scale_step in 35..=65 {
        let scale = scale_step as f64 / 50.0;
        for draw_step in -30..=30 {
            let draw_bias = draw_step as f64 / 100.0;
            let calibrated: Vec<Prob3> = predictions
                .iter()
                .map(|p| apply_logit_calibration(*p, scale, draw_bias))
                .collect();
            let metrics = evaluate_probs(&calibrated, outcomes);
            if metrics.log_loss < best_metrics.log_loss {
                best_metrics = metrics;
                best = LogitCalibration { scale, draw_bias };
            }
        }
    }

    (best, best_metrics)
}

/// Dixon-Coles rho in -0.25..=0.05 whose implied draw rate is closest to the
/// observed one.
pub fn fit_dc_rho_to_draw_rate(goals_total_base: f64, home_adv_goals: f64, draw_rate: f64) -> f64 {
    let target = draw_rate.clamp(0.05, 0.60);
    let mut best_rho = -0.10;
    let mut best_err = f64::INFINITY;

    for rho_steps in -25..=5 {
        let rho = rho_steps as f64 / 100.0;
        let p = outcome_probs_from_params(goals_total_base, home_adv_goals, rho);
        let err = (p.draw - target).abs();
        if err < best_err {
            best_err = err;
            best_rho = rho;
        }
    }
    best_rho
}

/// League-average 1X2 for two average teams.
pub fn outcome_probs_from_params(goals_total_base: f64, home_adv_goals: f64, rho: f64) -> Prob3 {
    let lambda_home = ((goals_total_base + home_adv_goals) / 2.0).clamp(LAMBDA_MIN, LAMBDA_MAX);
    let lambda_away = ((goals_total_base - home_adv_goals) / 2.0).clamp(LAMBDA_MIN, LAMBDA_MAX);
    ScoreMatrix::new(lambda_home, lambda_away, rho, 10).outcome_probs()
}

pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let class_prob = p.get(class).clamp(0.0, 1.0);
        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Expected calibration error averaged over the three outcome classes.
pub fn ece_1x2(predictions: &[Prob3], outcomes: &[Outcome], bins: usize) -> f64 {
    if predictions.is_empty() || predictions.len() != outcomes.len() || bins == 0 {
        return 0.0;
    }
    let n = predictions.len() as f64;
    let mut sum = 0.0;

    for class in [Outcome::Home, Outcome::Draw, Outcome::Away] {
        for b in calibration_bins(predictions, outcomes, class, bins) {
            if b.count == 0 {
                continue;
            }
            sum += b.count as f64 / n * (b.avg_pred - b.actual_rate).abs();
        }
    }

    sum / 3.0
}

/// First holdout index of a temporal 85/15 split. Both sides are non-empty
/// whenever `n >= 2`.
pub fn train_split_index(n: usize) -> usize {
    if n <= 2 {
        return 1;
    }
    let idx = ((n as f64) * 0.85).round() as usize;
    idx.clamp(1, n - 1)
}

#[cfg(test)]
mod tests {
    use super::{
        Outcome, apply_logit_calibration, binary_brier, calibration_bins, ece_1x2,
        empirical_outcome_probs, evaluate_probs, fit_dc_rho_to_draw_rate, fit_logit_calibration,
        train_split_index,
    };
    use crate::model::Prob3;

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let preds = vec![
            Prob3::one_hot(Outcome::Home),
            Prob3::one_hot(Outcome::Draw),
            Prob3::one_hot(Outcome::Away),
        ];
        let outcomes = vec![Outcome::Home, Outcome::Draw, Outcome::Away];
        let m = evaluate_probs(&preds, &outcomes);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn uniform_log_loss_is_ln3() {
        let preds = vec![Prob3::uniform(); 4];
        let outcomes = vec![Outcome::Home, Outcome::Away, Outcome::Draw, Outcome::Home];
        let m = evaluate_probs(&preds, &outcomes);
        assert!((m.log_loss - 3.0_f64.ln()).abs() < 1e-12);
        assert!((m.brier - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_yield_empty_metrics() {
        let m = evaluate_probs(&[Prob3::uniform()], &[]);
        assert_eq!(m.samples, 0);
    }

    #[test]
    fn logit_calibration_keeps_distribution_normalized() {
        let p = Prob3 {
            home: 0.44,
            draw: 0.27,
            away: 0.29,
        };
        let q = apply_logit_calibration(p, 1.12, 0.08);
        assert!((q.sum() - 1.0).abs() < 1e-9);
        assert!(q.draw > p.draw);
        let same = apply_logit_calibration(p, 1.0, 0.0);
        assert!((same.home - p.home).abs() < 1e-9);
    }

    #[test]
    fn calibration_fit_never_worsens_log_loss() {
        let preds = vec![
            Prob3 {
                home: 0.7,
                draw: 0.2,
                away: 0.1,
            };
            10
        ];
        let mut outcomes = vec![Outcome::Draw; 5];
        outcomes.extend(vec![Outcome::Home; 5]);
        let base = evaluate_probs(&preds, &outcomes);
        let (cal, fitted) = fit_logit_calibration(&preds, &outcomes);
        assert!(fitted.log_loss <= base.log_loss);
        assert!(cal.draw_bias > 0.0);
    }

    #[test]
    fn bins_and_ece() {
        let preds = vec![
            Prob3 {
                home: 0.9,
                draw: 0.05,
                away: 0.05,
            },
            Prob3 {
                home: 0.9,
                draw: 0.05,
                away: 0.05,
            },
        ];
        let outcomes = vec![Outcome::Home, Outcome::Away];
        let bins = calibration_bins(&preds, &outcomes, Outcome::Home, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins[9].count, 2);
        assert!((bins[9].actual_rate - 0.5).abs() < 1e-12);
        assert!(ece_1x2(&preds, &outcomes, 10) > 0.0);
    }

    #[test]
    fn binary_brier_basics() {
        assert_eq!(binary_brier(&[1.0, 0.0], &[true, false]), 0.0);
        assert!((binary_brier(&[0.5], &[true]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn rho_fit_tracks_draw_rate() {
        let low = fit_dc_rho_to_draw_rate(2.6, 0.3, 0.18);
        let high = fit_dc_rho_to_draw_rate(2.6, 0.3, 0.34);
        assert!(low > high);
        assert!((-0.25..=0.05).contains(&high));
    }

    #[test]
    fn empirical_rates() {
        let p = empirical_outcome_probs(&[Outcome::Home, Outcome::Home, Outcome::Draw, Outcome::Away]);
        assert!((p.home - 0.5).abs() < 1e-12);
    }

    #[test]
    fn split_index_is_inside_range() {
        assert_eq!(train_split_index(100), 85);
        assert_eq!(train_split_index(2), 1);
        assert_eq!(train_split_index(3), 2);
    }
}
