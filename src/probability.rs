use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::Prob3;
use crate::normalize::{clamp_unit, normalize3};
use crate::stats::{HeadToHead, TeamStats};

/// Factor weights. `home_advantage` is added to the home probability as a
/// constant rather than multiplied by a factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub form: f64,
    pub h2h: f64,
    pub stats: f64,
    pub elo: f64,
    pub home_advantage: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            form: 0.30,
            h2h: 0.25,
            stats: 0.30,
            elo: 0.0,
            home_advantage: 0.15,
        }
    }
}

impl FactorWeights {
    pub fn validate(&self) -> Result<(), ModelError> {
        let all = [self.form, self.h2h, self.stats, self.elo, self.home_advantage];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ModelError::InvalidConfig(
                "factor weights must be finite and non-negative".to_string(),
            ));
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err(ModelError::InvalidConfig(
                "factor weights sum to zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-factor home advantages, each in [0, 1] with 0.5 meaning even.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub form: f64,
    pub h2h: f64,
    pub stats: f64,
    pub elo: Option<f64>,
}

/// Draw share for a home strength `h` in [0, 1]: largest for even matches,
/// capped at 0.30.
pub fn draw_share(h: f64) -> f64 {
    (0.15 + 0.10 * (1.0 - (2.0 * h - 1.0).abs())).min(0.30)
}

fn share(home: f64, away: f64) -> f64 {
    let total = home + away;
    if total <= 0.0 {
        0.5
    } else {
        clamp_unit(home / total)
    }
}

pub fn form_advantage(home: &TeamStats, away: &TeamStats) -> f64 {
    share(home.form_score(), away.form_score())
}

fn team_strength(stats: &TeamStats, at_home: bool) -> f64 {
    let attack = clamp_unit(stats.avg_goals_for() / 2.0);
    let defense = 1.0 - clamp_unit(stats.avg_goals_against() / 4.0);
    let venue = if at_home {
        stats.home_win_rate()
    } else {
        stats.away_win_rate()
    };
    (attack + defense + venue) / 3.0
}

pub fn stats_advantage(home: &TeamStats, away: &TeamStats) -> f64 {
    share(team_strength(home, true), team_strength(away, false))
}

pub fn factor_breakdown(
    home: &TeamStats,
    away: &TeamStats,
    h2h: &HeadToHead,
    elo_expected_home: Option<f64>,
) -> FactorBreakdown {
    FactorBreakdown {
        form: form_advantage(home, away),
        h2h: h2h.home_advantage(),
        stats: stats_advantage(home, away),
        elo: elo_expected_home.map(clamp_unit),
    }
}

/// Weighted-factor 1X2. The Elo weight only applies when an Elo expectation
/// is present.
pub fn result_probabilities(
    factors: &FactorBreakdown,
    weights: &FactorWeights,
) -> Result<Prob3, ModelError> {
    let mut home = weights.form * factors.form
        + weights.h2h * factors.h2h
        + weights.stats * factors.stats
        + weights.home_advantage;
    if let Some(elo) = factors.elo {
        home += weights.elo * elo;
    }
    let home = clamp_unit(home);
    let draw = draw_share(home);
    let away = (1.0 - home - draw).max(0.0);
    normalize3(home, draw, away)
}
