use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceThresholds;
use crate::elo::EloConfig;
use crate::error::ModelError;
use crate::learned::LearnedConfig;
use crate::markets::DEFAULT_CORNER_LINES;
use crate::probability::FactorWeights;
use crate::stats::DEFAULT_FORM_WINDOW;
use crate::value::ValueConfig;

const DEFAULT_STATS_WINDOW: usize = 10;
const DEFAULT_H2H_WINDOW: usize = 10;
const DEFAULT_POISSON_BLEND: f64 = 0.5;
const DEFAULT_MAX_GOALS: u32 = 10;
const DEFAULT_GOALS_LINE: f64 = 2.5;
const DEFAULT_H2H_CORNER_WEIGHT: f64 = 0.3;
const DEFAULT_EXACT_SCORES: usize = 3;
const MAX_GOALS_LIMIT: u32 = 20;

/// Every tunable of the model. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub weights: FactorWeights,
    pub thresholds: ConfidenceThresholds,
    pub elo: EloConfig,
    pub stats_window: usize,
    pub form_window: usize,
    pub h2h_window: usize,
    /// Share of the goal model in the final 1X2 (0 = factor model only).
    pub poisson_blend: f64,
    pub max_goals: u32,
    pub default_goals_line: f64,
    pub corner_lines: Vec<f64>,
    pub h2h_corner_weight: f64,
    pub exact_scores: usize,
    pub value: ValueConfig,
    pub learned: LearnedConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default(),
            thresholds: ConfidenceThresholds::default(),
            elo: EloConfig::default(),
            stats_window: DEFAULT_STATS_WINDOW,
            form_window: DEFAULT_FORM_WINDOW,
            h2h_window: DEFAULT_H2H_WINDOW,
            poisson_blend: DEFAULT_POISSON_BLEND,
            max_goals: DEFAULT_MAX_GOALS,
            default_goals_line: DEFAULT_GOALS_LINE,
            corner_lines: DEFAULT_CORNER_LINES.to_vec(),
            h2h_corner_weight: DEFAULT_H2H_CORNER_WEIGHT,
            exact_scores: DEFAULT_EXACT_SCORES,
            value: ValueConfig::default(),
            learned: LearnedConfig::default(),
        }
    }
}

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: ModelConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults or the given file, then environment overrides, validated.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply `MATCHCAST_*` overrides from `lookup`. Unparseable values are
    /// ignored, parsed ones clamped into range.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let num = |key: &str| -> Option<f64> {
            lookup(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        if let Some(v) = num("MATCHCAST_HIGH_CONFIDENCE") {
            self.thresholds.high = v.clamp(0.0, 100.0);
        }
        if let Some(v) = num("MATCHCAST_MEDIUM_CONFIDENCE") {
            self.thresholds.medium = v.clamp(0.0, 100.0);
        }
        if let Some(v) = num("MATCHCAST_POISSON_BLEND") {
            self.poisson_blend = v.clamp(0.0, 1.0);
        }
        if let Some(v) = num("MATCHCAST_ELO_K") {
            self.elo.k = v.clamp(1.0, 100.0);
        }
        if let Some(v) = num("MATCHCAST_STATS_WINDOW") {
            self.stats_window = (v.round() as usize).clamp(1, 100);
        }
        if let Some(v) = num("MATCHCAST_MIN_VALUE_EDGE") {
            self.value.min_edge = v.clamp(0.0, 1.0);
        }
        if let Some(v) = num("MATCHCAST_LEARNED_BLEND") {
            self.learned.blend = v.clamp(0.0, 1.0);
            self.learned.enabled = self.learned.blend > 0.0;
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        self.weights.validate()?;
        self.thresholds.validate()?;
        let invalid =
            |msg: &str| -> Result<(), ModelError> { Err(ModelError::InvalidConfig(msg.to_string())) };

        if !(0.0..=1.0).contains(&self.poisson_blend) {
            return invalid("poisson_blend must be within 0..=1");
        }
        if self.stats_window == 0 || self.form_window == 0 || self.h2h_window == 0 {
            return invalid("windows must be at least 1");
        }
        if self.max_goals == 0 || self.max_goals > MAX_GOALS_LIMIT {
            return invalid("max_goals must be within 1..=20");
        }
        if !self.elo.k.is_finite() || self.elo.k <= 0.0 {
            return invalid("elo.k must be positive");
        }
        if !self.default_goals_line.is_finite() || self.default_goals_line <= 0.0 {
            return invalid("default_goals_line must be positive");
        }
        if self.corner_lines.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return invalid("corner_lines must be positive");
        }
        if !(0.0..=1.0).contains(&self.h2h_corner_weight) {
            return invalid("h2h_corner_weight must be within 0..=1");
        }
        if !(0.0..=1.0).contains(&self.value.min_edge) || !(0.0..=1.0).contains(&self.value.kelly_cap)
        {
            return invalid("value thresholds must be within 0..=1");
        }
        if !(0.0..=1.0).contains(&self.learned.blend) {
            return invalid("learned.blend must be within 0..=1");
        }
        if !self.learned.learning_rate.is_finite() || self.learned.learning_rate <= 0.0 {
            return invalid("learned.learning_rate must be positive");
        }
        if !self.learned.l2.is_finite() || self.learned.l2 < 0.0 {
            return invalid("learned.l2 must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::ModelConfig;

    #[test]
    fn defaults_are_valid() {
        let cfg = ModelConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.thresholds.high, 65.0);
        assert_eq!(cfg.corner_lines, vec![8.5, 9.5, 10.5, 11.5]);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ModelConfig =
            serde_json::from_str(r#"{"poisson_blend": 0.2, "thresholds": {"high": 70}}"#).unwrap();
        assert_eq!(cfg.poisson_blend, 0.2);
        assert_eq!(cfg.thresholds.high, 70.0);
        assert_eq!(cfg.thresholds.medium, 55.0);
        assert_eq!(cfg.stats_window, 10);
    }

    #[test]
    fn overrides_are_parsed_and_clamped() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("MATCHCAST_HIGH_CONFIDENCE", "70"),
            ("MATCHCAST_POISSON_BLEND", "1.7"),
            ("MATCHCAST_ELO_K", "not-a-number"),
            ("MATCHCAST_STATS_WINDOW", "6"),
        ]);
        let mut cfg = ModelConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.thresholds.high, 70.0);
        assert_eq!(cfg.poisson_blend, 1.0);
        assert_eq!(cfg.elo.k, 20.0);
        assert_eq!(cfg.stats_window, 6);
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        let mut cfg = ModelConfig::default();
        cfg.thresholds.medium = 80.0;
        assert!(cfg.validate().is_err());

        let mut cfg = ModelConfig::default();
        cfg.stats_window = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn score_matrix_size_is_bounded() {
        let mut cfg = ModelConfig::default();
        cfg.max_goals = 20;
        assert!(cfg.validate().is_ok());
        cfg.max_goals = 21;
        assert!(cfg.validate().is_err());
        cfg.max_goals = u32::MAX;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn learned_blend_override_enables_the_model() {
        let mut cfg = ModelConfig::default();
        assert!(!cfg.learned.enabled);
        cfg.apply_overrides(|k| (k == "MATCHCAST_LEARNED_BLEND").then(|| "0.4".to_string()));
        assert!(cfg.learned.enabled);
        assert_eq!(cfg.learned.blend, 0.4);

        cfg.learned.learning_rate = 0.0;
        assert!(cfg.validate().is_err());
    }
}
