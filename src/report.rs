use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;
use tracing::info;

use crate::confidence::ConfidenceLevel;
use crate::predictor::MatchPrediction;
use crate::value::Recommendation;

const STRONGEST_PICKS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Json,
    Xlsx,
    All,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "json" => Ok(ReportFormat::Json),
            "xlsx" => Ok(ReportFormat::Xlsx),
            "all" => Ok(ReportFormat::All),
            other => Err(format!("unknown format {other:?} (csv, json, xlsx, all)")),
        }
    }
}

/// One flat line per fixture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub fixture_id: String,
    pub league: String,
    pub home: String,
    pub away: String,
    pub kickoff: String,
    pub p_home: f64,
    pub p_draw: f64,
    pub p_away: f64,
    pub pick: String,
    pub confidence: f64,
    pub level: String,
    pub xg_home: f64,
    pub xg_away: f64,
    pub suggested_goals_line: f64,
    pub goals_line: f64,
    pub p_over: f64,
    pub p_push: f64,
    pub p_under: f64,
    pub goals_pick: String,
    pub goals_level: String,
    pub p_btts: f64,
    pub btts_pick: String,
    pub btts_level: String,
    pub corners_expected: f64,
    pub corners_line: Option<f64>,
    pub corners_pick: String,
    pub corners_confidence: f64,
    pub handicap_home_gives: f64,
    pub handicap_pick: String,
    pub handicap_confidence: f64,
    pub top_score: String,
    pub top_score_prob: f64,
    pub elo_home: f64,
    pub elo_away: f64,
    pub home_form: String,
    pub away_form: String,
    pub home_momentum: f64,
    pub away_momentum: f64,
    pub learned_home: Option<f64>,
    pub learned_draw: Option<f64>,
    pub learned_away: Option<f64>,
    pub recommendation: String,
    pub best_bet: String,
    pub used_defaults: bool,
}

pub fn prediction_row(p: &MatchPrediction) -> PredictionRow {
    let top = p.exact_scores.first();
    let corners = p.corners.best.as_ref();
    let (recommendation, best_bet) = match &p.value {
        Some(v) => (
            v.recommendation.label().to_string(),
            v.best
                .as_ref()
                .map(|b| format!("{} {} @ {:.2}", b.market, b.selection, b.odds))
                .unwrap_or_default(),
        ),
        None => (String::new(), String::new()),
    };

    PredictionRow {
        fixture_id: p.fixture_id.clone(),
        league: p.league.clone(),
        home: p.home.clone(),
        away: p.away.clone(),
        kickoff: p
            .kickoff
            .map(|k| k.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
        p_home: p.probs.home,
        p_draw: p.probs.draw,
        p_away: p.probs.away,
        pick: p.pick.label().to_string(),
        confidence: p.confidence,
        level: p.level.label().to_string(),
        xg_home: p.expected_goals.home,
        xg_away: p.expected_goals.away,
        suggested_goals_line: p.suggested_goals_line,
        goals_line: p.over_under.line.unwrap_or_default(),
        p_over: p.over_under.yes,
        p_push: p.over_under.push,
        p_under: p.over_under.no,
        goals_pick: p.over_under.pick.clone(),
        goals_level: p.over_under.level.label().to_string(),
        p_btts: p.btts.yes,
        btts_pick: p.btts.pick.clone(),
        btts_level: p.btts.level.label().to_string(),
        corners_expected: p.corners.expected_total,
        corners_line: corners.and_then(|c| c.line),
        corners_pick: corners.map(|c| c.pick.clone()).unwrap_or_default(),
        corners_confidence: corners.map(|c| c.confidence).unwrap_or_default(),
        handicap_home_gives: p.handicap.home_gives,
        handicap_pick: p.handicap.pick.clone(),
        handicap_confidence: p.handicap.confidence,
        top_score: top.map(|s| s.label()).unwrap_or_default(),
        top_score_prob: top.map(|s| s.prob).unwrap_or_default(),
        elo_home: p.elo_home,
        elo_away: p.elo_away,
        home_form: p.home_form.clone(),
        away_form: p.away_form.clone(),
        home_momentum: p.home_momentum,
        away_momentum: p.away_momentum,
        learned_home: p.learned_probs.map(|l| l.home),
        learned_draw: p.learned_probs.map(|l| l.draw),
        learned_away: p.learned_probs.map(|l| l.away),
        recommendation,
        best_bet,
        used_defaults: p.used_defaults,
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }
    Ok(())
}

pub fn write_csv(path: &Path, predictions: &[MatchPrediction]) -> Result<()> {
    ensure_parent(path)?;
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for p in predictions {
        wtr.serialize(prediction_row(p))
            .with_context(|| format!("write row for fixture {}", p.fixture_id))?;
    }
    wtr.flush().context("flush predictions csv")?;
    Ok(())
}

pub fn write_json(path: &Path, predictions: &[MatchPrediction]) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(predictions).context("serialize predictions")?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn write_xlsx(path: &Path, predictions: &[MatchPrediction]) -> Result<()> {
    ensure_parent(path)?;
    let mut workbook = Workbook::new();

    let mut prediction_rows = vec![
        [
            "Fixture", "League", "Home", "Away", "Kickoff", "P(Home)", "P(Draw)", "P(Away)",
            "Pick", "Confidence %", "Level", "xG Home", "xG Away", "Goals Line", "P(Over)",
            "P(Under)", "BTTS", "Corners", "Corners Pick", "Handicap", "Top Score", "Form",
            "Momentum", "Defaults",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>(),
    ];
    for p in predictions {
        let r = prediction_row(p);
        prediction_rows.push(vec![
            r.fixture_id,
            r.league,
            r.home,
            r.away,
            r.kickoff,
            format!("{:.4}", r.p_home),
            format!("{:.4}", r.p_draw),
            format!("{:.4}", r.p_away),
            r.pick,
            format!("{:.1}", r.confidence),
            r.level,
            format!("{:.2}", r.xg_home),
            format!("{:.2}", r.xg_away),
            r.goals_line.to_string(),
            format!("{:.4}", r.p_over),
            format!("{:.4}", r.p_under),
            format!("{:.4}", r.p_btts),
            r.corners_expected.to_string(),
            format!("{} {}", r.corners_pick, opt_to_string(r.corners_line)),
            r.handicap_pick,
            r.top_score,
            format!("{} / {}", r.home_form, r.away_form),
            format!("{:.2} / {:.2}", r.home_momentum, r.away_momentum),
            if r.used_defaults { "yes" } else { "no" }.to_string(),
        ]);
    }

    let mut value_rows = vec![
        [
            "Fixture", "Home", "Away", "Market", "Selection", "Odds", "Model %", "Implied %",
            "Fair %", "Edge %", "EV %", "Kelly", "Level", "Value",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>(),
    ];
    for p in predictions {
        let Some(analysis) = &p.value else {
            continue;
        };
        for b in &analysis.selections {
            value_rows.push(vec![
                p.fixture_id.clone(),
                p.home.clone(),
                p.away.clone(),
                b.market.clone(),
                b.selection.clone(),
                format!("{:.2}", b.odds),
                format!("{:.1}", b.model_prob * 100.0),
                format!("{:.1}", b.implied_prob * 100.0),
                opt_to_string(b.fair_prob.map(|f| format!("{:.1}", f * 100.0))),
                format!("{:+.1}", b.edge * 100.0),
                format!("{:+.1}", b.expected_value * 100.0),
                format!("{:.3}", b.kelly),
                b.level.label().to_string(),
                if b.is_value { "yes" } else { "no" }.to_string(),
            ]);
        }
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Predictions")?;
        write_rows(sheet, &prediction_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("ValueBets")?;
        write_rows(sheet, &value_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(())
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

/// Write `predictions.{csv,json,xlsx}` into `dir`; returns the files written.
pub fn write_reports(
    dir: &Path,
    predictions: &[MatchPrediction],
    format: ReportFormat,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    let mut written = Vec::new();

    if matches!(format, ReportFormat::Csv | ReportFormat::All) {
        let path = dir.join("predictions.csv");
        write_csv(&path, predictions)?;
        written.push(path);
    }
    if matches!(format, ReportFormat::Json | ReportFormat::All) {
        let path = dir.join("predictions.json");
        write_json(&path, predictions)?;
        written.push(path);
    }
    if matches!(format, ReportFormat::Xlsx | ReportFormat::All) {
        let path = dir.join("predictions.xlsx");
        write_xlsx(&path, predictions)?;
        written.push(path);
    }

    for path in &written {
        info!(path = %path.display(), "wrote report");
    }
    Ok(written)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrongPick {
    pub fixture: String,
    pub pick: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub fixtures: usize,
    pub avg_home: f64,
    pub avg_draw: f64,
    pub avg_away: f64,
    pub avg_total_goals: f64,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub used_defaults: usize,
    pub value_bets: usize,
    pub bet_recommendations: usize,
    pub strongest: Vec<StrongPick>,
}

pub fn summarize(predictions: &[MatchPrediction]) -> Summary {
    let count_level =
        |level: ConfidenceLevel| predictions.iter().filter(|p| p.level == level).count();

    let mut ranked: Vec<&MatchPrediction> = predictions.iter().collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let strongest = ranked
        .into_iter()
        .take(STRONGEST_PICKS)
        .map(|p| StrongPick {
            fixture: format!("{} vs {}", p.home, p.away),
            pick: p.pick.label().to_string(),
            confidence: p.confidence,
        })
        .collect();

    Summary {
        fixtures: predictions.len(),
        avg_home: mean(predictions, |p| p.probs.home),
        avg_draw: mean(predictions, |p| p.probs.draw),
        avg_away: mean(predictions, |p| p.probs.away),
        avg_total_goals: mean(predictions, |p| p.expected_goals.total()),
        high: count_level(ConfidenceLevel::High),
        medium: count_level(ConfidenceLevel::Medium),
        low: count_level(ConfidenceLevel::Low),
        used_defaults: predictions.iter().filter(|p| p.used_defaults).count(),
        value_bets: predictions
            .iter()
            .filter_map(|p| p.value.as_ref())
            .map(|v| v.value_bets().count())
            .sum(),
        bet_recommendations: predictions
            .iter()
            .filter_map(|p| p.value.as_ref())
            .filter(|v| v.recommendation == Recommendation::Bet)
            .count(),
        strongest,
    }
}

fn mean(predictions: &[MatchPrediction], f: impl Fn(&MatchPrediction) -> f64) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions.iter().map(f).sum::<f64>() / predictions.len() as f64
}

pub fn render_summary(s: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Fixtures: {}", s.fixtures);
    let _ = writeln!(
        out,
        "Average 1X2: home {:.1}% draw {:.1}% away {:.1}%",
        s.avg_home * 100.0,
        s.avg_draw * 100.0,
        s.avg_away * 100.0
    );
    let _ = writeln!(out, "Average expected goals: {:.2}", s.avg_total_goals);
    let _ = writeln!(
        out,
        "Confidence: HIGH {} MEDIUM {} LOW {}",
        s.high, s.medium, s.low
    );
    if s.used_defaults > 0 {
        let _ = writeln!(out, "Fixtures on default stats: {}", s.used_defaults);
    }
    let _ = writeln!(
        out,
        "Value bets: {} (BET recommendations: {})",
        s.value_bets, s.bet_recommendations
    );
    for (i, p) in s.strongest.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} -> {} ({:.1}%)",
            i + 1,
            p.fixture,
            p.pick,
            p.confidence
        );
    }
    out
}
