use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{MatchRecord, Prob3, team_key};
use crate::normalize::normalize3_or_uniform;
use crate::probability::draw_share;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EloConfig {
    pub k: f64,
    pub home_adv_pts: f64,
    pub initial: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 20.0,
            home_adv_pts: 60.0,
            initial: 1500.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EloTable {
    ratings: HashMap<String, f64>,
    names: HashMap<String, String>,
    initial: f64,
}

impl EloTable {
    pub fn rating(&self, team: &str) -> f64 {
        self.ratings
            .get(&team_key(team))
            .copied()
            .unwrap_or(self.initial)
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// Teams by rating, strongest first.
    pub fn ranked(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .ratings
            .iter()
            .map(|(key, r)| (self.names.get(key).cloned().unwrap_or_else(|| key.clone()), *r))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

pub fn compute_elo(history: &[MatchRecord], cfg: EloConfig) -> EloTable {
    let mut matches: Vec<&MatchRecord> = history.iter().collect();
    matches.sort_by_key(|m| m.date);

    let mut table = EloTable {
        initial: cfg.initial,
        ..EloTable::default()
    };
    for m in matches {
        let hk = team_key(&m.home);
        let ak = team_key(&m.away);
        table.names.entry(hk.clone()).or_insert_with(|| m.home.clone());
        table.names.entry(ak.clone()).or_insert_with(|| m.away.clone());

        let eh = *table.ratings.entry(hk.clone()).or_insert(cfg.initial);
        let ea = *table.ratings.entry(ak.clone()).or_insert(cfg.initial);

        let expected_home = expected_score(eh + cfg.home_adv_pts, ea);
        let s_home = if m.home_goals > m.away_goals {
            1.0
        } else if m.home_goals < m.away_goals {
            0.0
        } else {
            0.5
        };

        let delta = cfg.k * (s_home - expected_home);
        table.ratings.insert(hk, eh + delta);
        table.ratings.insert(ak, ea - delta);
    }

    table
}

pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(-(r_a - r_b) / 400.0))
}

/// Home expected score including the home-advantage offset.
pub fn home_expectation(table: &EloTable, home: &str, away: &str, cfg: EloConfig) -> f64 {
    expected_score(table.rating(home) + cfg.home_adv_pts, table.rating(away))
}

/// Win/draw/loss from an expected score: carve out the draw share, split the
/// rest by expectation.
pub fn elo_probs(expected_home: f64) -> Prob3 {
    let e = expected_home.clamp(0.0, 1.0);
    let draw = draw_share(e);
    let home = (e - draw / 2.0).max(0.0);
    let away = (1.0 - e - draw / 2.0).max(0.0);
    normalize3_or_uniform(home, draw, away)
}
