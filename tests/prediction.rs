use std::fs;
use std::path::PathBuf;

use matchcast::config::ModelConfig;
use matchcast::dataset::{load_fixtures, load_history};
use matchcast::model::Outcome;
use matchcast::predictor::{MatchPrediction, Predictor};
use matchcast::report::{self, ReportFormat};

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn predictions() -> Vec<MatchPrediction> {
    let history = load_history(&fixture_path("history.csv")).expect("history should load");
    let fixtures = load_fixtures(&fixture_path("fixtures.csv")).expect("fixtures should load");
    Predictor::new(ModelConfig::default(), history).predict_all(&fixtures)
}

#[test]
fn predicts_every_fixture_in_order() {
    let preds = predictions();
    let ids: Vec<&str> = preds.iter().map(|p| p.fixture_id.as_str()).collect();
    assert_eq!(ids, ["pl-1", "pl-2", "2", "pl-4"]);

    for p in &preds {
        assert!((p.probs.sum() - 1.0).abs() < 1e-9, "{} probs", p.fixture_id);
        assert!(p.probs.home > 0.0 && p.probs.draw > 0.0 && p.probs.away > 0.0);
        let ou = &p.over_under;
        assert!((ou.yes + ou.push + ou.no - 1.0).abs() < 1e-9);
        assert!(p.expected_goals.home > 0.0 && p.expected_goals.away > 0.0);
        assert_eq!(p.exact_scores.len(), ModelConfig::default().exact_scores);
    }
}

#[test]
fn stronger_home_side_is_favoured() {
    let preds = predictions();
    let arsenal_everton = &preds[0];
    assert_eq!(arsenal_everton.pick, Outcome::Home);
    assert!(arsenal_everton.probs.home > arsenal_everton.probs.away);
    assert!(arsenal_everton.elo_home > arsenal_everton.elo_away);
}

#[test]
fn unknown_team_is_flagged() {
    let preds = predictions();
    assert!(!preds[0].used_defaults);
    assert!(preds[3].used_defaults, "Ipswich has no history");
    assert_eq!(preds[3].away_momentum, 0.5);
}

#[test]
fn odds_produce_value_analysis() {
    let preds = predictions();
    let with_odds = preds[0].value.as_ref().expect("pl-1 has odds");
    assert!(with_odds.selections.iter().any(|b| b.market == "1X2"));
    assert!(with_odds.selections.iter().any(|b| b.market == "CORNERS 10.5"));
    for b in &with_odds.selections {
        assert!((b.edge - (b.model_prob - b.implied_prob)).abs() < 1e-9);
        assert!(b.kelly >= 0.0 && b.kelly <= 0.25);
    }
    assert!(preds[2].value.is_none());
}

#[test]
fn reports_are_written_in_every_format() {
    let preds = predictions();
    let dir = std::env::temp_dir().join(format!("matchcast-report-{}", std::process::id()));
    let written = report::write_reports(&dir, &preds, ReportFormat::All).expect("reports");
    assert_eq!(written.len(), 3);
    for path in &written {
        assert!(fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false));
    }

    let mut rdr = csv::Reader::from_path(dir.join("predictions.csv")).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert!(headers.iter().any(|h| h == "p_home"));
    assert!(headers.iter().any(|h| h == "home_momentum"));
    assert_eq!(rdr.records().count(), preds.len());

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("predictions.json")).unwrap()).unwrap();
    assert_eq!(json.as_array().map(|a| a.len()), Some(preds.len()));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn summary_ranks_strongest_picks() {
    let preds = predictions();
    let summary = report::summarize(&preds);
    assert_eq!(summary.fixtures, 4);
    assert_eq!(summary.high + summary.medium + summary.low, 4);
    assert_eq!(summary.used_defaults, 1);
    assert!(summary.strongest.len() <= 3);
    assert!(
        summary
            .strongest
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence)
    );
    let text = report::render_summary(&summary);
    assert!(text.contains("Fixtures: 4"));
}
