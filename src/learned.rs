use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::{MatchRecord, Outcome, Prob3};
use crate::stats::{TeamStats, aggregate_team_with_form};

pub const FEATURE_COUNT: usize = 6;
const WIDTH: usize = FEATURE_COUNT + 1;
const CLASSES: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

pub type Features = [f64; FEATURE_COUNT];

/// Settings for the learned 1X2 model. Off unless `enabled`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedConfig {
    pub enabled: bool,
    /// Share of the learned model in the final 1X2.
    pub blend: f64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub min_samples: usize,
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            blend: 0.3,
            epochs: 300,
            learning_rate: 0.5,
            l2: 1e-3,
            min_samples: 30,
        }
    }
}

/// One finished match described by what was known before kickoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSample {
    pub date: NaiveDate,
    pub features: Features,
    pub outcome: Outcome,
}

/// Matchup features: win rate, draw tendency, attack, defense, form and
/// venue record, each as a home-minus-away difference (draws as a sum).
pub fn features(home: &TeamStats, away: &TeamStats) -> Features {
    [
        home.win_rate() - away.win_rate(),
        home.draw_rate() + away.draw_rate(),
        home.avg_goals_for() - away.avg_goals_for(),
        away.avg_goals_against() - home.avg_goals_against(),
        home.form_score() - away.form_score(),
        home.home_win_rate() - away.away_win_rate(),
    ]
}

/// Samples for every match in `history` where both sides had played before.
/// Features use only matches on earlier dates. Output is in date order.
pub fn training_set(
    history: &[MatchRecord],
    stats_window: usize,
    form_window: usize,
) -> Vec<TrainingSample> {
    let mut sorted: Vec<&MatchRecord> = history.iter().collect();
    sorted.sort_by_key(|m| m.date);

    sorted
        .par_iter()
        .filter_map(|m| {
            let before = Some(m.date);
            let home = aggregate_team_with_form(history, &m.home, before, stats_window, form_window);
            let away = aggregate_team_with_form(history, &m.away, before, stats_window, form_window);
            if !home.has_history() || !away.has_history() {
                return None;
            }
            Some(TrainingSample {
                date: m.date,
                features: features(&home, &away),
                outcome: m.outcome(),
            })
        })
        .collect()
}

/// Multinomial logistic regression on standardized features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxModel {
    mean: Features,
    scale: Features,
    weights: [[f64; WIDTH]; 3],
    pub samples: usize,
}

impl SoftmaxModel {
    /// Full-batch gradient descent on cross-entropy with L2 on the
    /// non-bias weights. Deterministic for a given sample order.
    pub fn fit(samples: &[TrainingSample], cfg: &LearnedConfig) -> Result<Self, ModelError> {
        let needed = cfg.min_samples.max(1);
        if samples.len() < needed {
            return Err(ModelError::InsufficientData {
                needed,
                got: samples.len(),
            });
        }

        let n = samples.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        for s in samples {
            for (m, x) in mean.iter_mut().zip(s.features) {
                *m += x / n;
            }
        }
        let mut scale = [0.0; FEATURE_COUNT];
        for s in samples {
            for j in 0..FEATURE_COUNT {
                scale[j] += (s.features[j] - mean[j]).powi(2) / n;
            }
        }
        for v in scale.iter_mut() {
            *v = if *v > 1e-12 { v.sqrt() } else { 1.0 };
        }

        let mut model = Self {
            mean,
            scale,
            weights: [[0.0; WIDTH]; 3],
            samples: samples.len(),
        };
        let inputs: Vec<[f64; WIDTH]> = samples.iter().map(|s| model.input(&s.features)).collect();

        for _ in 0..cfg.epochs {
            let mut grad = [[0.0; WIDTH]; 3];
            for (x, s) in inputs.iter().zip(samples) {
                let p = model.class_probs(x);
                for (k, class) in CLASSES.iter().enumerate() {
                    let err = p[k] - if *class == s.outcome { 1.0 } else { 0.0 };
                    for j in 0..WIDTH {
                        grad[k][j] += err * x[j];
                    }
                }
            }
            for k in 0..3 {
                for j in 0..WIDTH {
                    let reg = if j < FEATURE_COUNT {
                        cfg.l2 * model.weights[k][j]
                    } else {
                        0.0
                    };
                    model.weights[k][j] -= cfg.learning_rate * (grad[k][j] / n + reg);
                }
            }
        }
        Ok(model)
    }

    pub fn predict(&self, features: &Features) -> Prob3 {
        let p = self.class_probs(&self.input(features));
        Prob3 {
            home: p[0],
            draw: p[1],
            away: p[2],
        }
    }

    fn input(&self, features: &Features) -> [f64; WIDTH] {
        let mut x = [1.0; WIDTH];
        for j in 0..FEATURE_COUNT {
            x[j] = (features[j] - self.mean[j]) / self.scale[j];
        }
        x
    }

    fn class_probs(&self, x: &[f64; WIDTH]) -> [f64; 3] {
        let logits = self
            .weights
            .map(|w| w.iter().zip(x).map(|(a, b)| a * b).sum::<f64>());
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp = logits.map(|z| (z - max).exp());
        let total: f64 = exp.iter().sum();
        exp.map(|e| e / total)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::{FEATURE_COUNT, LearnedConfig, SoftmaxModel, TrainingSample, training_set};
    use crate::demo::generate_season;
    use crate::error::ModelError;
    use crate::model::{Outcome, Prob3};

    fn sample(day: i64, signal: f64, outcome: Outcome) -> TrainingSample {
        let mut features = [0.0; FEATURE_COUNT];
        features[0] = signal;
        features[2] = signal * 0.5;
        TrainingSample {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(day),
            features,
            outcome,
        }
    }

    fn separable() -> Vec<TrainingSample> {
        (0..60)
            .map(|i| match i % 3 {
                0 => sample(i, 1.0 + (i % 5) as f64 * 0.1, Outcome::Home),
                1 => sample(i, -1.0 - (i % 5) as f64 * 0.1, Outcome::Away),
                _ => sample(i, (i % 5) as f64 * 0.02 - 0.04, Outcome::Draw),
            })
            .collect()
    }

    #[test]
    fn learns_a_separable_signal() {
        let model = SoftmaxModel::fit(&separable(), &LearnedConfig::default()).unwrap();
        assert_eq!(model.samples, 60);

        let strong_home = model.predict(&separable()[0].features);
        let strong_away = model.predict(&separable()[1].features);
        let level = model.predict(&[0.0; FEATURE_COUNT]);
        assert_eq!(strong_home.argmax(), Outcome::Home);
        assert_eq!(strong_away.argmax(), Outcome::Away);
        assert_eq!(level.argmax(), Outcome::Draw);
        for p in [strong_home, strong_away, level] {
            assert!((p.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn too_few_samples_is_an_error() {
        let few = &separable()[..10];
        let err = SoftmaxModel::fit(few, &LearnedConfig::default()).unwrap_err();
        assert_eq!(err, ModelError::InsufficientData { needed: 30, got: 10 });
    }

    #[test]
    fn zero_epochs_predicts_uniform() {
        let cfg = LearnedConfig {
            epochs: 0,
            ..LearnedConfig::default()
        };
        let model = SoftmaxModel::fit(&separable(), &cfg).unwrap();
        let p = model.predict(&separable()[0].features);
        let u = Prob3::uniform();
        assert!((p.home - u.home).abs() < 1e-12);
    }

    #[test]
    fn training_features_ignore_later_matches() {
        let start = NaiveDate::from_ymd_opt(2024, 8, 10).unwrap();
        let season = generate_season(11, 6, start).unwrap();
        let half = season.len() / 2;
        let early = training_set(&season[..half], 10, 5);
        let full = training_set(&season, 10, 5);

        assert!(!early.is_empty());
        assert!(early.len() < full.len());
        assert_eq!(early[..], full[..early.len()]);
        assert!(full.windows(2).all(|w| w[0].date <= w[1].date));
        // first round: nobody has history yet
        assert!(full.iter().all(|s| s.date > start));
    }
}
