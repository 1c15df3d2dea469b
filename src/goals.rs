use serde::{Deserialize, Serialize};

use crate::league_params::LeagueParams;
use crate::model::Prob3;
use crate::stats::TeamStats;

const LAMBDA_MIN: f64 = 0.20;
const LAMBDA_MAX: f64 = 3.80;
// Matches needed before a team's own averages fully replace the league mean.
const STRENGTH_FULL_SAMPLE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalExpectation {
    pub home: f64,
    pub away: f64,
}

impl GoalExpectation {
    pub fn total(&self) -> f64 {
        self.home + self.away
    }
}

/// Expected goals from league base rates scaled by attack and defense ratios.
pub fn expected_goals(home: &TeamStats, away: &TeamStats, params: &LeagueParams) -> GoalExpectation {
    let per_side = (params.goals_total_base / 2.0).max(0.1);
    let base_home = (params.goals_total_base + params.home_adv_goals) / 2.0;
    let base_away = (params.goals_total_base - params.home_adv_goals) / 2.0;

    let att_home = shrink(home.avg_goals_for() / per_side, home.matches);
    let def_home = shrink(home.avg_goals_against() / per_side, home.matches);
    let att_away = shrink(away.avg_goals_for() / per_side, away.matches);
    let def_away = shrink(away.avg_goals_against() / per_side, away.matches);

    GoalExpectation {
        home: (base_home * att_home * def_away).clamp(LAMBDA_MIN, LAMBDA_MAX),
        away: (base_away * att_away * def_home).clamp(LAMBDA_MIN, LAMBDA_MAX),
    }
}

fn shrink(ratio: f64, samples: usize) -> f64 {
    let w = (samples as f64 / STRENGTH_FULL_SAMPLE).min(1.0);
    w * ratio + (1.0 - w)
}

/// Settlement probabilities for one side of a line market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub win: f64,
    pub push: f64,
    pub loss: f64,
}

impl Settlement {
    fn average(&self, other: &Settlement) -> Settlement {
        Settlement {
            win: (self.win + other.win) / 2.0,
            push: (self.push + other.push) / 2.0,
            loss: (self.loss + other.loss) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreProb {
    pub home: u32,
    pub away: u32,
    pub prob: f64,
}

impl ScoreProb {
    pub fn label(&self) -> String {
        format!("{}-{}", self.home, self.away)
    }
}

/// Joint distribution of final scores, truncated at `max_goals` per side.
#[derive(Debug, Clone)]
pub struct ScoreMatrix {
    max_goals: u32,
    cells: Vec<f64>,
}

impl ScoreMatrix {
    /// Independent Poisson goals with the Dixon-Coles low-score correction.
    pub fn new(lambda_home: f64, lambda_away: f64, rho: f64, max_goals: u32) -> Self {
        let max_goals = max_goals.max(1);
        let pmf_h = poisson_pmf(lambda_home, max_goals);
        let pmf_a = poisson_pmf(lambda_away, max_goals);
        let side = max_goals as usize + 1;

        let mut cells = vec![0.0; side * side];
        for (h, p_h) in pmf_h.iter().enumerate() {
            for (a, p_a) in pmf_a.iter().enumerate() {
                let tau = dc_tau(h as u32, a as u32, lambda_home, lambda_away, rho);
                cells[h * side + a] = (p_h * p_a * tau).max(0.0);
            }
        }

        // Guard against tiny float drift.
        let sum: f64 = cells.iter().sum();
        if sum > 0.0 {
            for c in &mut cells {
                *c /= sum;
            }
        }
        Self { max_goals, cells }
    }

    pub fn from_expectation(xg: GoalExpectation, rho: f64, max_goals: u32) -> Self {
        Self::new(xg.home, xg.away, rho, max_goals)
    }

    pub fn max_goals(&self) -> u32 {
        self.max_goals
    }

    pub fn prob(&self, home: u32, away: u32) -> f64 {
        if home > self.max_goals || away > self.max_goals {
            return 0.0;
        }
        let side = self.max_goals as usize + 1;
        self.cells[home as usize * side + away as usize]
    }

    fn iter(&self) -> impl Iterator<Item = (u32, u32, f64)> + '_ {
        let side = self.max_goals as usize + 1;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, p)| ((i / side) as u32, (i % side) as u32, *p))
    }

    pub fn outcome_probs(&self) -> Prob3 {
        let mut out = Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 0.0,
        };
        for (h, a, p) in self.iter() {
            if h > a {
                out.home += p;
            } else if h < a {
                out.away += p;
            } else {
                out.draw += p;
            }
        }
        out
    }

    pub fn btts(&self) -> f64 {
        self.iter()
            .filter(|(h, a, _)| *h > 0 && *a > 0)
            .map(|(_, _, p)| p)
            .sum()
    }

    /// Over side of a total-goals line ("win" = over).
    pub fn total_goals(&self, line: f64) -> Settlement {
        self.settle(line, |h, a, line_x2| 2 * (h as i64 + a as i64) - line_x2)
    }

    /// Home side of an Asian handicap. `line` is added to the home score, so
    /// -0.5 means the home team gives half a goal.
    pub fn home_handicap(&self, line: f64) -> Settlement {
        self.settle(line, |h, a, line_x2| 2 * (h as i64 - a as i64) + line_x2)
    }

    /// Most likely scores, best first.
    pub fn top_scores(&self, n: usize) -> Vec<ScoreProb> {
        let mut all: Vec<ScoreProb> = self
            .iter()
            .map(|(home, away, prob)| ScoreProb { home, away, prob })
            .collect();
        all.sort_by(|a, b| {
            b.prob
                .total_cmp(&a.prob)
                .then_with(|| (a.home + a.away).cmp(&(b.home + b.away)))
                .then_with(|| a.home.cmp(&b.home))
        });
        all.truncate(n);
        all
    }

    /// Quarter lines settle half the stake on each neighbouring line.
    fn settle(&self, line: f64, margin_x2: impl Fn(u32, u32, i64) -> i64 + Copy) -> Settlement {
        let q = (line * 4.0).round() as i64;
        if q % 2 != 0 {
            let lo = self.settle_x2((q - 1) / 2, margin_x2);
            let hi = self.settle_x2((q + 1) / 2, margin_x2);
            return lo.average(&hi);
        }
        self.settle_x2(q / 2, margin_x2)
    }

    fn settle_x2(&self, line_x2: i64, margin_x2: impl Fn(u32, u32, i64) -> i64) -> Settlement {
        let mut out = Settlement {
            win: 0.0,
            push: 0.0,
            loss: 0.0,
        };
        for (h, a, p) in self.iter() {
            match margin_x2(h, a, line_x2).cmp(&0) {
                std::cmp::Ordering::Greater => out.win += p,
                std::cmp::Ordering::Equal => out.push += p,
                std::cmp::Ordering::Less => out.loss += p,
            }
        }
        out
    }
}

pub fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let max_k = max_k as usize;
    let mut out = vec![0.0; max_k + 1];
    let lambda = lambda.max(0.0);

    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }

    // Fold the truncated tail into the last bucket.
    let sum: f64 = out.iter().sum();
    if sum < 1.0 {
        out[max_k] += 1.0 - sum;
    }
    out
}

fn dc_tau(home_goals: u32, away_goals: u32, lambda_home: f64, lambda_away: f64, rho: f64) -> f64 {
    match (home_goals, away_goals) {
        (0, 0) => 1.0 - lambda_home * lambda_away * rho,
        (0, 1) => 1.0 + lambda_home * rho,
        (1, 0) => 1.0 + lambda_away * rho,
        (1, 1) => 1.0 - rho,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::{ScoreMatrix, expected_goals, poisson_pmf};
    use crate::league_params::LeagueParams;
    use crate::stats::TeamStats;

    #[test]
    fn pmf_sums_to_one_with_tail() {
        let pmf = poisson_pmf(1.4, 6);
        let sum: f64 = pmf.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn matrix_outcomes_sum_to_one() {
        let m = ScoreMatrix::new(1.6, 1.1, -0.10, 10);
        let p = m.outcome_probs();
        assert!((p.sum() - 1.0).abs() < 1e-9);
        assert!(p.home > p.away);
    }

    #[test]
    fn negative_rho_inflates_draws() {
        let plain = ScoreMatrix::new(1.3, 1.3, 0.0, 10).outcome_probs();
        let dc = ScoreMatrix::new(1.3, 1.3, -0.15, 10).outcome_probs();
        assert!(dc.draw > plain.draw);
    }

    #[test]
    fn whole_line_has_push_and_half_line_does_not() {
        let m = ScoreMatrix::new(1.5, 1.2, 0.0, 10);
        let half = m.total_goals(2.5);
        assert_eq!(half.push, 0.0);
        assert!((half.win + half.loss - 1.0).abs() < 1e-9);

        let whole = m.total_goals(2.0);
        assert!(whole.push > 0.0);
        assert!((whole.win + whole.push + whole.loss - 1.0).abs() < 1e-9);
        assert!((whole.push - (m.prob(2, 0) + m.prob(1, 1) + m.prob(0, 2))).abs() < 1e-12);
    }

    #[test]
    fn quarter_line_splits_stake() {
        let m = ScoreMatrix::new(1.5, 1.2, 0.0, 10);
        let q = m.total_goals(2.25);
        let lo = m.total_goals(2.0);
        let hi = m.total_goals(2.5);
        assert!((q.win - (lo.win + hi.win) / 2.0).abs() < 1e-12);
        assert!((q.push - lo.push / 2.0).abs() < 1e-12);
    }

    #[test]
    fn home_handicap_minus_half_equals_home_win() {
        let m = ScoreMatrix::new(1.7, 0.9, -0.05, 10);
        let ah = m.home_handicap(-0.5);
        assert!((ah.win - m.outcome_probs().home).abs() < 1e-12);
        let level = m.home_handicap(0.0);
        assert!((level.push - m.outcome_probs().draw).abs() < 1e-12);
    }

    #[test]
    fn top_scores_are_sorted() {
        let m = ScoreMatrix::new(1.2, 0.8, 0.0, 10);
        let top = m.top_scores(3);
        assert_eq!(top.len(), 3);
        assert!(top[0].prob >= top[1].prob && top[1].prob >= top[2].prob);
        assert_eq!(top[0].label(), "1-0");
    }

    #[test]
    fn expected_goals_follow_attack_and_defense() {
        let params = LeagueParams::defaults("Test");
        let mut strong = TeamStats::empty("Strong");
        strong.matches = 10;
        strong.goals_for = 25;
        strong.goals_against = 6;
        let mut weak = TeamStats::empty("Weak");
        weak.matches = 10;
        weak.goals_for = 8;
        weak.goals_against = 22;

        let xg = expected_goals(&strong, &weak, &params);
        assert!(xg.home > 2.0);
        assert!(xg.away < 1.0);

        let unknown = TeamStats::empty("X");
        let flat = expected_goals(&unknown, &unknown, &params);
        assert!((flat.home - flat.away).abs() < 1e-9);
        // No history: league base rate on both sides.
        assert!((flat.total() - 2.6).abs() < 1e-9);
    }
}
