use serde::{Deserialize, Serialize};

use crate::confidence::{ConfidenceLevel, ConfidenceThresholds};
use crate::goals::{ScoreMatrix, ScoreProb, Settlement};
use crate::normalize::clamp_unit;
use crate::stats::{HeadToHead, TeamStats};

pub const DEFAULT_CORNER_LINES: [f64; 4] = [8.5, 9.5, 10.5, 11.5];
// Historical BTTS rates take this share of the blended probability.
const BTTS_HISTORY_WEIGHT: f64 = 0.30;
const HANDICAP_HOME_BONUS: f64 = 0.3;

/// A two-sided market. `yes` is the over/yes side; whole lines carry a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryMarket {
    pub line: Option<f64>,
    pub yes: f64,
    pub push: f64,
    pub no: f64,
    pub pick: String,
    pub confidence: f64,
    pub level: ConfidenceLevel,
}

impl BinaryMarket {
    fn new(
        line: Option<f64>,
        s: Settlement,
        labels: (&str, &str),
        thresholds: &ConfidenceThresholds,
    ) -> Self {
        let (pick, p) = if s.win >= s.loss {
            (labels.0, s.win)
        } else {
            (labels.1, s.loss)
        };
        let confidence = p * 100.0;
        Self {
            line,
            yes: clamp_unit(s.win),
            push: clamp_unit(s.push),
            no: clamp_unit(s.loss),
            pick: pick.to_string(),
            confidence,
            level: thresholds.label(confidence),
        }
    }

    pub fn picks_yes(&self) -> bool {
        self.yes >= self.no
    }
}

pub fn over_under(matrix: &ScoreMatrix, line: f64, thresholds: &ConfidenceThresholds) -> BinaryMarket {
    BinaryMarket::new(
        Some(line),
        matrix.total_goals(line),
        ("OVER", "UNDER"),
        thresholds,
    )
}

/// BTTS from the score matrix, blended with the teams' own BTTS rates when
/// both have history.
pub fn btts(
    matrix: &ScoreMatrix,
    home: &TeamStats,
    away: &TeamStats,
    thresholds: &ConfidenceThresholds,
) -> BinaryMarket {
    let model = matrix.btts();
    let yes = match (home.btts_rate(), away.btts_rate()) {
        (Some(h), Some(a)) => {
            (1.0 - BTTS_HISTORY_WEIGHT) * model + BTTS_HISTORY_WEIGHT * (h + a) / 2.0
        }
        _ => model,
    };
    let yes = clamp_unit(yes);
    BinaryMarket::new(
        None,
        Settlement {
            win: yes,
            push: 0.0,
            loss: 1.0 - yes,
        },
        ("YES", "NO"),
        thresholds,
    )
}

/// Suggested total-goals line for an expected total.
pub fn suggested_goals_line(expected_total: f64) -> f64 {
    if expected_total >= 3.0 {
        3.5
    } else if expected_total >= 2.5 {
        2.5
    } else if expected_total >= 2.0 {
        2.0
    } else {
        1.5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerPrediction {
    pub expected_home: f64,
    pub expected_away: f64,
    pub expected_total: f64,
    pub lines: Vec<BinaryMarket>,
    pub best: Option<BinaryMarket>,
}

impl CornerPrediction {
    pub fn at_line(&self, line: f64) -> Option<&BinaryMarket> {
        self.lines
            .iter()
            .find(|m| m.line.is_some_and(|l| (l - line).abs() < 1e-9))
    }
}

/// Over probability for a corners line: linear in the distance from the
/// expected total, capped at 0.1/0.9.
pub fn corner_over_probability(expected_total: f64, line: f64) -> f64 {
    let shift = ((expected_total - line).abs() * 0.1).min(0.4);
    if expected_total > line {
        0.5 + shift
    } else {
        0.5 - shift
    }
}

pub fn predict_corners(
    home: &TeamStats,
    away: &TeamStats,
    h2h: &HeadToHead,
    lines: &[f64],
    h2h_weight: f64,
    thresholds: &ConfidenceThresholds,
) -> CornerPrediction {
    let expected_home = (home.avg_corners_for() + away.avg_corners_against()) / 2.0;
    let expected_away = (away.avg_corners_for() + home.avg_corners_against()) / 2.0;
    let mut total = expected_home + expected_away;
    if let Some(h2h_avg) = h2h.avg_total_corners() {
        let w = clamp_unit(h2h_weight);
        total = (1.0 - w) * total + w * h2h_avg;
    }
    let expected_total = (total * 2.0).round() / 2.0;

    let lines: Vec<BinaryMarket> = lines
        .iter()
        .map(|line| {
            let over = corner_over_probability(expected_total, *line);
            BinaryMarket::new(
                Some(*line),
                Settlement {
                    win: over,
                    push: 0.0,
                    loss: 1.0 - over,
                },
                ("OVER", "UNDER"),
                thresholds,
            )
        })
        .collect();

    let best = lines
        .iter()
        .fold(None::<&BinaryMarket>, |best, m| match best {
            Some(b) if b.confidence + 1e-9 >= m.confidence => Some(b),
            _ => Some(m),
        })
        .cloned();

    CornerPrediction {
        expected_home,
        expected_away,
        expected_total,
        lines,
        best,
    }
}

/// Corner lines to price: the configured ones plus the bookmaker line.
pub fn corner_lines(configured: &[f64], odds_line: Option<f64>) -> Vec<f64> {
    let mut out = configured.to_vec();
    if let Some(line) = odds_line {
        if !out.iter().any(|l| (l - line).abs() < 1e-9) {
            out.push(line);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandicapPrediction {
    pub strength_diff: f64,
    /// Goals the home side gives (negative: home receives).
    pub home_gives: f64,
    pub home: Settlement,
    pub pick: String,
    pub confidence: f64,
    pub level: ConfidenceLevel,
}

pub fn handicap_line(home: &TeamStats, away: &TeamStats) -> (f64, f64) {
    let diff = home.goal_difference_per_match() - away.goal_difference_per_match()
        + HANDICAP_HOME_BONUS;
    let line = if diff >= 1.5 {
        1.5
    } else if diff >= 1.0 {
        1.0
    } else if diff >= 0.5 {
        0.5
    } else if diff >= -0.5 {
        0.0
    } else if diff >= -1.0 {
        -0.5
    } else if diff >= -1.5 {
        -1.0
    } else {
        -1.5
    };
    (diff, line)
}

pub fn predict_handicap(
    matrix: &ScoreMatrix,
    home: &TeamStats,
    away: &TeamStats,
    thresholds: &ConfidenceThresholds,
) -> HandicapPrediction {
    let (strength_diff, home_gives) = handicap_line(home, away);
    let settlement = matrix.home_handicap(-home_gives);
    let (pick, p) = if settlement.win >= settlement.loss {
        (format!("HOME {}", signed_line(-home_gives)), settlement.win)
    } else {
        (format!("AWAY {}", signed_line(home_gives)), settlement.loss)
    };
    let confidence = p * 100.0;
    HandicapPrediction {
        strength_diff,
        home_gives,
        home: settlement,
        pick,
        confidence,
        level: thresholds.label(confidence),
    }
}

fn signed_line(line: f64) -> String {
    if line == 0.0 {
        "0".to_string()
    } else {
        format!("{line:+}")
    }
}

pub fn exact_scores(matrix: &ScoreMatrix, n: usize) -> Vec<ScoreProb> {
    matrix.top_scores(n)
}
