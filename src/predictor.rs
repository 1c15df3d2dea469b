use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::confidence::{ConfidenceLevel, pick_outcome};
use crate::elo::{EloTable, compute_elo, home_expectation};
use crate::goals::{GoalExpectation, ScoreMatrix, ScoreProb, expected_goals};
use crate::league_params::{LeagueParams, compute_all, compute_league_params, compute_pooled};
use crate::learned::{SoftmaxModel, TrainingSample, features, training_set};
use crate::markets::{
    self, BinaryMarket, CornerPrediction, HandicapPrediction, corner_lines, suggested_goals_line,
};
use crate::model::{Fixture, MarketOdds, MatchRecord, Outcome, Prob3};
use crate::normalize::{normalize3, normalize3_or_uniform};
use crate::probability::{FactorBreakdown, factor_breakdown, result_probabilities};
use crate::stats::{TeamStats, aggregate_team_with_form, head_to_head};
use crate::value::{ValueAnalysis, ValueBet, evaluate_market, recommend};

const POOLED_LABEL: &str = "ALL";

/// Everything the model says about one fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPrediction {
    pub fixture_id: String,
    pub league: String,
    pub home: String,
    pub away: String,
    pub kickoff: Option<NaiveDateTime>,
    pub factors: FactorBreakdown,
    pub factor_probs: Prob3,
    pub goal_probs: Prob3,
    /// Learned-model 1X2 when that model is enabled and trained.
    pub learned_probs: Option<Prob3>,
    pub probs: Prob3,
    pub pick: Outcome,
    pub confidence: f64,
    pub level: ConfidenceLevel,
    pub expected_goals: GoalExpectation,
    pub suggested_goals_line: f64,
    pub over_under: BinaryMarket,
    pub btts: BinaryMarket,
    pub corners: CornerPrediction,
    pub handicap: HandicapPrediction,
    pub exact_scores: Vec<ScoreProb>,
    pub elo_home: f64,
    pub elo_away: f64,
    pub home_form: String,
    pub away_form: String,
    pub home_momentum: f64,
    pub away_momentum: f64,
    pub value: Option<ValueAnalysis>,
    pub used_defaults: bool,
}

/// Model state built once from finished matches.
pub struct Predictor {
    config: ModelConfig,
    history: Vec<MatchRecord>,
    elo: EloTable,
    league_params: HashMap<String, LeagueParams>,
    pooled_params: LeagueParams,
    // Loaded params are used as-is instead of being refitted per cutoff.
    fixed_params: bool,
    training: Vec<TrainingSample>,
    learned: Option<SoftmaxModel>,
}

struct Snapshot<'a> {
    prior: &'a [MatchRecord],
    elo: Cow<'a, EloTable>,
    params: LeagueParams,
    learned: Option<Cow<'a, SoftmaxModel>>,
}

impl Predictor {
    pub fn new(config: ModelConfig, mut history: Vec<MatchRecord>) -> Self {
        history.sort_by_key(|m| m.date);
        let elo = compute_elo(&history, config.elo);
        let league_params = compute_all(&history);
        let pooled_params = compute_pooled(POOLED_LABEL, &history);
        let training = if config.learned.enabled {
            training_set(&history, config.stats_window, config.form_window)
        } else {
            Vec::new()
        };
        let learned = fit_learned(&training, &config);
        debug!(
            matches = history.len(),
            teams = elo.len(),
            leagues = league_params.len(),
            training = training.len(),
            learned = learned.is_some(),
            "predictor ready"
        );
        Self {
            config,
            history,
            elo,
            league_params,
            pooled_params,
            fixed_params: false,
            training,
            learned,
        }
    }

    /// Use previously saved league params instead of fitting them.
    pub fn with_league_params(mut self, params: HashMap<String, LeagueParams>) -> Self {
        self.league_params = params;
        self.fixed_params = true;
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn history(&self) -> &[MatchRecord] {
        &self.history
    }

    pub fn elo(&self) -> &EloTable {
        &self.elo
    }

    /// Params for `league`, pooled over all leagues when it has no history.
    pub fn league_params(&self, league: &str) -> &LeagueParams {
        self.league_params
            .get(league)
            .filter(|p| !league.is_empty() && p.sample_matches > 0)
            .unwrap_or(&self.pooled_params)
    }

    /// Matches, ratings and league params known before `cutoff`. Rebuilt
    /// only when the history reaches past the cutoff.
    fn snapshot(&self, league: &str, cutoff: Option<NaiveDate>) -> Snapshot<'_> {
        let end = match cutoff {
            Some(date) => self.history.partition_point(|m| m.date < date),
            None => self.history.len(),
        };
        if end == self.history.len() {
            return Snapshot {
                prior: &self.history,
                elo: Cow::Borrowed(&self.elo),
                params: self.league_params(league).clone(),
                learned: self.learned.as_ref().map(Cow::Borrowed),
            };
        }

        let prior = &self.history[..end];
        let params = if self.fixed_params {
            self.league_params(league).clone()
        } else {
            let league_rows = compute_league_params(league, prior);
            if !league.is_empty() && league_rows.sample_matches > 0 {
                league_rows
            } else {
                compute_pooled(POOLED_LABEL, prior)
            }
        };
        let seen = match cutoff {
            Some(date) => self.training.partition_point(|s| s.date < date),
            None => self.training.len(),
        };
        Snapshot {
            prior,
            elo: Cow::Owned(compute_elo(prior, self.config.elo)),
            params,
            learned: fit_learned(&self.training[..seen], &self.config).map(Cow::Owned),
        }
    }

    fn team_stats(&self, prior: &[MatchRecord], team: &str) -> TeamStats {
        aggregate_team_with_form(
            prior,
            team,
            None,
            self.config.stats_window,
            self.config.form_window,
        )
    }

    pub fn predict(&self, fixture: &Fixture) -> MatchPrediction {
        let cfg = &self.config;
        let snap = self.snapshot(&fixture.league, fixture.kickoff_date());

        let home = self.team_stats(snap.prior, &fixture.home);
        let away = self.team_stats(snap.prior, &fixture.away);
        let used_defaults = !home.has_history() || !away.has_history();
        if used_defaults {
            warn!(
                fixture = %fixture.id,
                home = %fixture.home,
                away = %fixture.away,
                home_matches = home.matches,
                away_matches = away.matches,
                "no history for team, using default statistics"
            );
        }
        let h2h = head_to_head(snap.prior, &fixture.home, &fixture.away, None, cfg.h2h_window);

        let elo_home = snap.elo.rating(&fixture.home);
        let elo_away = snap.elo.rating(&fixture.away);
        let elo_expected = home_expectation(&snap.elo, &fixture.home, &fixture.away, cfg.elo);

        let factors = factor_breakdown(&home, &away, &h2h, Some(elo_expected));
        let factor_probs = result_probabilities(&factors, &cfg.weights).unwrap_or_else(|err| {
            warn!(fixture = %fixture.id, %err, "factor model degenerate, using uniform");
            Prob3::uniform()
        });

        let xg = expected_goals(&home, &away, &snap.params);
        let matrix = ScoreMatrix::from_expectation(xg, snap.params.dc_rho, cfg.max_goals);
        let goal_probs = matrix.outcome_probs();
        let learned_probs = snap.learned.as_ref().map(|m| m.predict(&features(&home, &away)));
        let probs = blend(factor_probs, goal_probs, cfg.poisson_blend);
        let probs = match learned_probs {
            Some(l) => blend(probs, l, cfg.learned.blend),
            None => probs,
        };
        let (pick, confidence) = pick_outcome(probs);

        let odds = fixture.odds.as_ref().filter(|o| !o.is_empty());
        let goals_line = odds
            .and_then(|o| o.goals_line)
            .unwrap_or(cfg.default_goals_line);
        let over_under = markets::over_under(&matrix, goals_line, &cfg.thresholds);
        let btts = markets::btts(&matrix, &home, &away, &cfg.thresholds);
        let lines = corner_lines(&cfg.corner_lines, odds.and_then(|o| o.corners_line));
        let corners = markets::predict_corners(
            &home,
            &away,
            &h2h,
            &lines,
            cfg.h2h_corner_weight,
            &cfg.thresholds,
        );
        let handicap = markets::predict_handicap(&matrix, &home, &away, &cfg.thresholds);
        let exact_scores = markets::exact_scores(&matrix, cfg.exact_scores);

        let value = odds.map(|o| self.value_analysis(o, &probs, &over_under, &btts, &corners));

        debug!(
            fixture = %fixture.id,
            home = %fixture.home,
            away = %fixture.away,
            p_home = probs.home,
            p_draw = probs.draw,
            p_away = probs.away,
            xg_home = xg.home,
            xg_away = xg.away,
            "predicted"
        );

        MatchPrediction {
            fixture_id: fixture.id.clone(),
            league: fixture.league.clone(),
            home: fixture.home.clone(),
            away: fixture.away.clone(),
            kickoff: fixture.kickoff,
            factors,
            factor_probs,
            goal_probs,
            learned_probs,
            probs,
            pick,
            confidence,
            level: cfg.thresholds.label(confidence),
            expected_goals: xg,
            suggested_goals_line: suggested_goals_line(xg.total()),
            over_under,
            btts,
            corners,
            handicap,
            exact_scores,
            elo_home,
            elo_away,
            home_form: home.form.to_string(),
            away_form: away.form.to_string(),
            home_momentum: home.form.momentum(),
            away_momentum: away.form.momentum(),
            value,
            used_defaults,
        }
    }

    /// Predictions in input order.
    pub fn predict_all(&self, fixtures: &[Fixture]) -> Vec<MatchPrediction> {
        fixtures.par_iter().map(|f| self.predict(f)).collect()
    }

    fn value_analysis(
        &self,
        odds: &MarketOdds,
        probs: &Prob3,
        over_under: &BinaryMarket,
        btts: &BinaryMarket,
        corners: &CornerPrediction,
    ) -> ValueAnalysis {
        let cfg = &self.config.value;
        let mut selections: Vec<ValueBet> = evaluate_market(
            "1X2",
            &[
                ("HOME", probs.home, odds.home),
                ("DRAW", probs.draw, odds.draw),
                ("AWAY", probs.away, odds.away),
            ],
            cfg,
        );

        let (over, under) = without_push(over_under);
        let goals_market = format!("GOALS {}", over_under.line.unwrap_or_default());
        selections.extend(evaluate_market(
            &goals_market,
            &[("OVER", over, odds.over), ("UNDER", under, odds.under)],
            cfg,
        ));

        selections.extend(evaluate_market(
            "BTTS",
            &[("YES", btts.yes, odds.btts_yes), ("NO", btts.no, odds.btts_no)],
            cfg,
        ));

        if let Some(line) = odds.corners_line {
            if let Some(m) = corners.at_line(line) {
                selections.extend(evaluate_market(
                    &format!("CORNERS {line}"),
                    &[
                        ("OVER", m.yes, odds.corners_over),
                        ("UNDER", m.no, odds.corners_under),
                    ],
                    cfg,
                ));
            }
        }

        recommend(selections)
    }
}

fn fit_learned(samples: &[TrainingSample], config: &ModelConfig) -> Option<SoftmaxModel> {
    if !config.learned.enabled {
        return None;
    }
    match SoftmaxModel::fit(samples, &config.learned) {
        Ok(model) => Some(model),
        Err(err) => {
            debug!(%err, "learned model not trained");
            None
        }
    }
}

/// `(1 - w) * factor + w * goal`, renormalized.
pub fn blend(factor: Prob3, goal: Prob3, w: f64) -> Prob3 {
    let w = w.clamp(0.0, 1.0);
    let mix = |a: f64, b: f64| (1.0 - w) * a + w * b;
    normalize3_or_uniform(
        mix(factor.home, goal.home),
        mix(factor.draw, goal.draw),
        mix(factor.away, goal.away),
    )
}

/// Over/under probabilities conditional on the bet not being pushed.
fn without_push(m: &BinaryMarket) -> (f64, f64) {
    normalize3(m.yes, 0.0, m.no)
        .map(|p| (p.home, p.away))
        .unwrap_or((0.5, 0.5))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{NaiveDate, NaiveDateTime};

    use super::{Predictor, blend};
    use crate::config::ModelConfig;
    use crate::demo::{DEMO_LEAGUE, generate_season};
    use crate::league_params::LeagueParams;
    use crate::model::{Fixture, MarketOdds, MatchRecord, Prob3};
    use crate::value::Recommendation;

    fn rec(day: u32, home: &str, away: &str, hg: u8, ag: u8) -> MatchRecord {
        MatchRecord {
            date: NaiveDate::from_ymd_opt(2025, 8, day).unwrap(),
            league: "Allsvenskan".to_string(),
            home: home.to_string(),
            away: away.to_string(),
            home_goals: hg,
            away_goals: ag,
            home_corners: Some(7),
            away_corners: Some(3),
        }
    }

    fn history() -> Vec<MatchRecord> {
        vec![
            rec(1, "Malmo", "Hammarby", 3, 0),
            rec(2, "AIK", "Malmo", 0, 2),
            rec(3, "Hammarby", "AIK", 1, 1),
            rec(4, "Malmo", "AIK", 4, 1),
            rec(5, "Hammarby", "Malmo", 0, 1),
            rec(6, "AIK", "Hammarby", 2, 2),
        ]
    }

    fn kickoff(day: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2025, 8, day).and_then(|d| d.and_hms_opt(18, 0, 0))
    }

    #[test]
    fn strong_home_side_is_favoured() {
        let p = Predictor::new(ModelConfig::default(), history());
        let mut fx = Fixture::new("1", "Malmo", "AIK");
        fx.league = "Allsvenskan".to_string();
        let pred = p.predict(&fx);
        assert!((pred.probs.sum() - 1.0).abs() < 1e-9);
        assert!(pred.probs.home > pred.probs.away);
        assert!(!pred.used_defaults);
        assert_eq!(pred.home_form, "WWWW");
        assert_eq!(pred.exact_scores.len(), 3);
        assert!(pred.elo_home > pred.elo_away);
        assert!(pred.value.is_none());
    }

    #[test]
    fn unknown_team_sets_flag() {
        let p = Predictor::new(ModelConfig::default(), history());
        let pred = p.predict(&Fixture::new("2", "Malmo", "Djurgarden"));
        assert!(pred.used_defaults);
        assert!((pred.probs.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn kickoff_hides_later_matches() {
        let p = Predictor::new(ModelConfig::default(), history());
        let mut fx = Fixture::new("3", "Malmo", "AIK");
        fx.kickoff = kickoff(3);
        let early = p.predict(&fx);

        let trimmed = Predictor::new(ModelConfig::default(), history()[..2].to_vec());
        let same = trimmed.predict(&fx);
        assert_eq!(early.probs, same.probs);
        assert_eq!(early.elo_home, same.elo_home);
    }

    #[test]
    fn odds_produce_value_analysis() {
        let p = Predictor::new(ModelConfig::default(), history());
        let mut fx = Fixture::new("4", "Malmo", "AIK");
        fx.odds = Some(MarketOdds {
            home: Some(5.0),
            draw: Some(4.0),
            away: Some(1.5),
            corners_line: Some(10.0),
            corners_over: Some(1.9),
            corners_under: Some(1.9),
            ..MarketOdds::default()
        });
        let pred = p.predict(&fx);
        let value = pred.value.expect("odds given");
        assert!(value.selections.iter().any(|b| b.market == "1X2"));
        assert!(value.selections.iter().any(|b| b.market == "CORNERS 10"));
        assert!(pred.corners.at_line(10.0).is_some());
        assert_ne!(value.recommendation, Recommendation::Pass);
    }

    #[test]
    fn predict_all_keeps_order() {
        let p = Predictor::new(ModelConfig::default(), history());
        let fixtures: Vec<Fixture> = (0..20)
            .map(|i| Fixture::new(i.to_string(), "AIK", "Hammarby"))
            .collect();
        let preds = p.predict_all(&fixtures);
        let ids: Vec<String> = preds.iter().map(|p| p.fixture_id.clone()).collect();
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn blend_weights() {
        let a = Prob3::one_hot(crate::model::Outcome::Home);
        let b = Prob3::uniform();
        assert_eq!(blend(a, b, 0.0), a);
        let half = blend(a, b, 0.5);
        assert!((half.home - (0.5 + 0.5 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn momentum_follows_form() {
        let p = Predictor::new(ModelConfig::default(), history());
        let pred = p.predict(&Fixture::new("5", "Malmo", "AIK"));
        assert_eq!(pred.home_momentum, 1.0);
        assert!(pred.away_momentum < pred.home_momentum);
        let unknown = p.predict(&Fixture::new("6", "Malmo", "Djurgarden"));
        assert_eq!(unknown.away_momentum, 0.5);
    }

    #[test]
    fn loaded_league_params_are_used_at_any_kickoff() {
        let params = LeagueParams {
            sample_matches: 100,
            goals_total_base: 3.0,
            home_adv_goals: 0.6,
            dc_rho: 0.0,
            ..LeagueParams::defaults("Allsvenskan")
        };
        let p = Predictor::new(ModelConfig::default(), history())
            .with_league_params(HashMap::from([("Allsvenskan".to_string(), params)]));

        let mut fx = Fixture::new("7", "Sirius", "Elfsborg");
        fx.league = "Allsvenskan".to_string();
        let late = p.predict(&fx);
        assert!((late.expected_goals.home - 1.8).abs() < 1e-9);
        assert!((late.expected_goals.away - 1.2).abs() < 1e-9);

        fx.kickoff = kickoff(3);
        let early = p.predict(&fx);
        assert_eq!(early.expected_goals, late.expected_goals);
    }

    #[test]
    fn learned_model_is_blended_when_enabled() {
        let start = NaiveDate::from_ymd_opt(2024, 8, 10).unwrap();
        let season = generate_season(21, 10, start).unwrap();
        let mut fx = Fixture::new("8", "Northbridge", "Eastport");
        fx.league = DEMO_LEAGUE.to_string();

        let plain = Predictor::new(ModelConfig::default(), season.clone()).predict(&fx);
        assert!(plain.learned_probs.is_none());

        let mut cfg = ModelConfig::default();
        cfg.learned.enabled = true;
        let p = Predictor::new(cfg.clone(), season.clone());
        let pred = p.predict(&fx);
        let learned = pred.learned_probs.expect("enough history to train");
        assert!((learned.sum() - 1.0).abs() < 1e-9);
        assert_eq!(pred.probs, blend(plain.probs, learned, cfg.learned.blend));

        // a kickoff before any training data leaves only the heuristic models
        fx.kickoff = start.and_hms_opt(12, 0, 0);
        assert!(p.predict(&fx).learned_probs.is_none());
    }

    #[test]
    fn learned_model_does_not_see_later_matches() {
        let start = NaiveDate::from_ymd_opt(2024, 8, 10).unwrap();
        let season = generate_season(5, 10, start).unwrap();
        let mut cfg = ModelConfig::default();
        cfg.learned.enabled = true;
        cfg.learned.min_samples = 20;

        let cut = season.len() / 2;
        let mut fx = Fixture::new("9", "Westfield", "Southvale");
        fx.kickoff = season[cut].date.and_hms_opt(12, 0, 0);

        let full = Predictor::new(cfg.clone(), season.clone()).predict(&fx);
        let trimmed = Predictor::new(cfg, season[..cut].to_vec()).predict(&fx);
        assert!(full.learned_probs.is_some());
        assert_eq!(full.learned_probs, trimmed.learned_probs);
        assert_eq!(full.probs, trimmed.probs);
    }
}
