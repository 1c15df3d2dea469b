use std::fmt;

use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceLevel;
use crate::error::ModelError;
use crate::normalize::normalize;

const HIGH_EDGE: f64 = 0.10;
const MEDIUM_EDGE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueConfig {
    /// Edge a selection needs before it counts as a value bet.
    pub min_edge: f64,
    /// Upper bound on the suggested Kelly stake fraction.
    pub kelly_cap: f64,
}

impl Default for ValueConfig {
    fn default() -> Self {
        Self {
            min_edge: 0.05,
            kelly_cap: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Bet,
    Consider,
    Pass,
}

impl Recommendation {
    pub fn label(self) -> &'static str {
        match self {
            Recommendation::Bet => "BET",
            Recommendation::Consider => "CONSIDER",
            Recommendation::Pass => "PASS",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueBet {
    pub market: String,
    pub selection: String,
    pub odds: f64,
    pub model_prob: f64,
    pub implied_prob: f64,
    /// Implied probability with the bookmaker margin removed, when the
    /// whole market was quoted.
    pub fair_prob: Option<f64>,
    pub edge: f64,
    pub expected_value: f64,
    pub kelly: f64,
    pub level: ConfidenceLevel,
    pub is_value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueAnalysis {
    pub selections: Vec<ValueBet>,
    pub recommendation: Recommendation,
    pub best: Option<ValueBet>,
}

impl ValueAnalysis {
    pub fn value_bets(&self) -> impl Iterator<Item = &ValueBet> {
        self.selections.iter().filter(|b| b.is_value)
    }
}

pub fn implied_probability(odds: f64) -> Result<f64, ModelError> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(ModelError::InvalidOdds(odds));
    }
    Ok(1.0 / odds)
}

/// Bookmaker margin: sum of implied probabilities minus one.
pub fn overround(odds: &[f64]) -> Result<f64, ModelError> {
    let mut sum = 0.0;
    for o in odds {
        sum += implied_probability(*o)?;
    }
    Ok(sum - 1.0)
}

/// Proportionally rescale a full market's implied probabilities to sum to one.
pub fn remove_overround(odds: &[f64]) -> Result<Vec<f64>, ModelError> {
    let implied = odds
        .iter()
        .map(|o| implied_probability(*o))
        .collect::<Result<Vec<_>, _>>()?;
    normalize(&implied)
}

pub fn expected_value(prob: f64, odds: f64) -> f64 {
    prob * odds - 1.0
}

/// Full-Kelly stake fraction, floored at zero and capped.
pub fn kelly_fraction(prob: f64, odds: f64, cap: f64) -> f64 {
    if odds <= 1.0 {
        return 0.0;
    }
    ((prob * odds - 1.0) / (odds - 1.0)).clamp(0.0, cap.max(0.0))
}

pub fn edge_level(edge: f64) -> ConfidenceLevel {
    if edge > HIGH_EDGE {
        ConfidenceLevel::High
    } else if edge > MEDIUM_EDGE {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

pub fn evaluate(
    market: &str,
    selection: &str,
    model_prob: f64,
    odds: f64,
    fair_prob: Option<f64>,
    cfg: &ValueConfig,
) -> Result<ValueBet, ModelError> {
    let implied_prob = implied_probability(odds)?;
    let edge = model_prob - implied_prob;
    Ok(ValueBet {
        market: market.to_string(),
        selection: selection.to_string(),
        odds,
        model_prob,
        implied_prob,
        fair_prob,
        edge,
        expected_value: expected_value(model_prob, odds),
        kelly: kelly_fraction(model_prob, odds, cfg.kelly_cap),
        level: edge_level(edge),
        is_value: edge > cfg.min_edge,
    })
}

/// A market quoted as (selection, model probability, decimal odds). Missing
/// or invalid prices are skipped; the margin is only removed when every
/// selection is priced.
pub fn evaluate_market(
    market: &str,
    selections: &[(&str, f64, Option<f64>)],
    cfg: &ValueConfig,
) -> Vec<ValueBet> {
    let all_odds: Option<Vec<f64>> = selections.iter().map(|(_, _, o)| *o).collect();
    let fair = all_odds.and_then(|odds| remove_overround(&odds).ok());

    let mut out = Vec::new();
    for (i, (selection, prob, odds)) in selections.iter().enumerate() {
        let Some(odds) = odds else {
            continue;
        };
        let fair_prob = fair.as_ref().map(|f| f[i]);
        match evaluate(market, selection, *prob, *odds, fair_prob, cfg) {
            Ok(bet) => out.push(bet),
            Err(err) => tracing::warn!(market, selection, %err, "skipping selection"),
        }
    }
    out
}

/// BET on the best high-edge value bet, CONSIDER on the best medium-edge one,
/// PASS otherwise.
pub fn recommend(selections: Vec<ValueBet>) -> ValueAnalysis {
    let best_at = |level: ConfidenceLevel| {
        selections
            .iter()
            .filter(|b| b.is_value && b.level == level)
            .max_by(|a, b| a.edge.total_cmp(&b.edge))
            .cloned()
    };

    let (recommendation, best) = if let Some(bet) = best_at(ConfidenceLevel::High) {
        (Recommendation::Bet, Some(bet))
    } else if let Some(bet) = best_at(ConfidenceLevel::Medium) {
        (Recommendation::Consider, Some(bet))
    } else {
        (Recommendation::Pass, None)
    };

    ValueAnalysis {
        selections,
        recommendation,
        best,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Recommendation, ValueConfig, edge_level, evaluate, evaluate_market, expected_value,
        implied_probability, kelly_fraction, overround, recommend, remove_overround,
    };
    use crate::confidence::ConfidenceLevel;
    use crate::error::ModelError;

    #[test]
    fn implied_probability_rejects_bad_odds() {
        assert!((implied_probability(2.0).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(implied_probability(1.0), Err(ModelError::InvalidOdds(1.0)));
        assert!(implied_probability(f64::NAN).is_err());
    }

    #[test]
    fn overround_removal_normalizes() {
        let odds = [1.9, 3.4, 4.2];
        let margin = overround(&odds).unwrap();
        assert!(margin > 0.0);
        let fair = remove_overround(&odds).unwrap();
        assert!((fair.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(fair[0] < 1.0 / 1.9);
    }

    #[test]
    fn ev_and_kelly() {
        assert!((expected_value(0.6, 2.0) - 0.2).abs() < 1e-12);
        // (0.6 * 2 - 1) / (2 - 1) = 0.2
        assert!((kelly_fraction(0.6, 2.0, 1.0) - 0.2).abs() < 1e-12);
        assert_eq!(kelly_fraction(0.6, 2.0, 0.1), 0.1);
        assert_eq!(kelly_fraction(0.3, 2.0, 1.0), 0.0);
    }

    #[test]
    fn edge_levels() {
        assert_eq!(edge_level(0.12), ConfidenceLevel::High);
        assert_eq!(edge_level(0.10), ConfidenceLevel::Medium);
        assert_eq!(edge_level(0.05), ConfidenceLevel::Low);
    }

    #[test]
    fn value_requires_edge_above_threshold() {
        let cfg = ValueConfig::default();
        let bet = evaluate("1X2", "HOME", 0.60, 2.0, None, &cfg).unwrap();
        assert!((bet.edge - 0.10).abs() < 1e-12);
        assert!(bet.is_value);
        let thin = evaluate("1X2", "HOME", 0.54, 2.0, None, &cfg).unwrap();
        assert!(!thin.is_value);
    }

    #[test]
    fn recommendation_prefers_high_edges() {
        let cfg = ValueConfig::default();
        let bets = evaluate_market(
            "1X2",
            &[
                ("HOME", 0.58, Some(2.0)),
                ("DRAW", 0.30, Some(4.0)),
                ("AWAY", 0.12, Some(6.0)),
            ],
            &cfg,
        );
        assert_eq!(bets.len(), 3);
        assert!(bets.iter().all(|b| b.fair_prob.is_some()));
        let analysis = recommend(bets);
        // home edge 0.08 (MEDIUM), draw edge 0.05 (not value)
        assert_eq!(analysis.recommendation, Recommendation::Consider);
        assert_eq!(analysis.best.as_ref().map(|b| b.selection.as_str()), Some("HOME"));

        let bets = evaluate_market("BTTS", &[("YES", 0.70, Some(1.8)), ("NO", 0.30, None)], &cfg);
        assert_eq!(bets.len(), 1);
        assert!(bets[0].fair_prob.is_none());
        assert_eq!(recommend(bets).recommendation, Recommendation::Bet);

        assert_eq!(recommend(Vec::new()).recommendation, Recommendation::Pass);
    }

    #[test]
    fn invalid_prices_are_skipped() {
        let bets = evaluate_market(
            "1X2",
            &[("HOME", 0.5, Some(0.9)), ("DRAW", 0.3, Some(3.5))],
            &ValueConfig::default(),
        );
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].selection, "DRAW");
    }
}
