use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::{info, warn};

use crate::model::{Fixture, MarketOdds, MatchRecord};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Deserialize)]
struct HistoryRow {
    date: String,
    #[serde(default)]
    league: Option<String>,
    home: String,
    away: String,
    home_goals: u8,
    away_goals: u8,
    #[serde(default)]
    home_corners: Option<u8>,
    #[serde(default)]
    away_corners: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct FixtureRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    league: Option<String>,
    home: String,
    away: String,
    #[serde(default)]
    kickoff: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    odds_home: Option<f64>,
    #[serde(default)]
    odds_draw: Option<f64>,
    #[serde(default)]
    odds_away: Option<f64>,
    #[serde(default)]
    odds_over: Option<f64>,
    #[serde(default)]
    odds_under: Option<f64>,
    #[serde(default)]
    goals_line: Option<f64>,
    #[serde(default)]
    odds_btts_yes: Option<f64>,
    #[serde(default)]
    odds_btts_no: Option<f64>,
    #[serde(default)]
    odds_corners_over: Option<f64>,
    #[serde(default)]
    odds_corners_under: Option<f64>,
    #[serde(default)]
    corners_line: Option<f64>,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
}

/// Accepts a full timestamp or a bare date (taken as midnight).
pub fn parse_kickoff(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn load_history(path: &Path) -> Result<Vec<MatchRecord>> {
    let records = if is_json(path) {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read history {}", path.display()))?;
        serde_json::from_str::<Vec<MatchRecord>>(&raw)
            .with_context(|| format!("parse history {}", path.display()))?
    } else {
        let file =
            File::open(path).with_context(|| format!("open history {}", path.display()))?;
        read_history_csv(file)?
    };
    info!(path = %path.display(), matches = records.len(), "loaded history");
    Ok(records)
}

/// History rows from CSV. Rows that fail to parse are logged and skipped.
pub fn read_history_csv(reader: impl Read) -> Result<Vec<MatchRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut out = Vec::new();
    for (idx, row) in rdr.deserialize::<HistoryRow>().enumerate() {
        let line = idx + 2;
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!(line, %err, "skipping history row");
                continue;
            }
        };
        let Some(date) = parse_date(&row.date) else {
            warn!(line, date = %row.date, "skipping history row with bad date");
            continue;
        };
        if row.home.is_empty() || row.away.is_empty() {
            warn!(line, "skipping history row without team names");
            continue;
        }
        out.push(MatchRecord {
            date,
            league: non_empty(row.league).unwrap_or_default(),
            home: row.home,
            away: row.away,
            home_goals: row.home_goals,
            away_goals: row.away_goals,
            home_corners: row.home_corners,
            away_corners: row.away_corners,
        });
    }
    Ok(out)
}

pub fn save_history(path: &Path, records: &[MatchRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("create history dir")?;
        }
    }
    if is_json(path) {
        let json = serde_json::to_string_pretty(records).context("serialize history")?;
        fs::write(path, json).with_context(|| format!("write history {}", path.display()))?;
        return Ok(());
    }

    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for r in records {
        wtr.serialize(r).context("write history row")?;
    }
    wtr.flush().context("flush history csv")?;
    Ok(())
}

pub fn load_fixtures(path: &Path) -> Result<Vec<Fixture>> {
    let fixtures = if is_json(path) {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read fixtures {}", path.display()))?;
        serde_json::from_str::<Vec<Fixture>>(&raw)
            .with_context(|| format!("parse fixtures {}", path.display()))?
    } else {
        let file =
            File::open(path).with_context(|| format!("open fixtures {}", path.display()))?;
        read_fixtures_csv(file)?
    };
    if fixtures.is_empty() {
        return Err(anyhow!("no fixtures in {}", path.display()));
    }
    info!(path = %path.display(), fixtures = fixtures.len(), "loaded fixtures");
    Ok(fixtures)
}

/// Fixture rows from CSV; `id` falls back to the zero-based row index.
pub fn read_fixtures_csv(reader: impl Read) -> Result<Vec<Fixture>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut out = Vec::new();
    for (idx, row) in rdr.deserialize::<FixtureRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!(line = idx + 2, %err, "skipping fixture row");
                continue;
            }
        };
        let kickoff = match non_empty(row.kickoff) {
            Some(raw) => {
                let parsed = parse_kickoff(&raw);
                if parsed.is_none() {
                    warn!(line = idx + 2, kickoff = %raw, "ignoring unparseable kickoff");
                }
                parsed
            }
            None => None,
        };
        let odds = MarketOdds {
            home: row.odds_home,
            draw: row.odds_draw,
            away: row.odds_away,
            over: row.odds_over,
            under: row.odds_under,
            goals_line: row.goals_line,
            btts_yes: row.odds_btts_yes,
            btts_no: row.odds_btts_no,
            corners_over: row.odds_corners_over,
            corners_under: row.odds_corners_under,
            corners_line: row.corners_line,
        };
        out.push(Fixture {
            id: non_empty(row.id).unwrap_or_else(|| idx.to_string()),
            league: non_empty(row.league).unwrap_or_default(),
            home: row.home,
            away: row.away,
            kickoff,
            venue: non_empty(row.venue),
            odds: (!odds.is_empty()).then_some(odds),
        });
    }
    Ok(out)
}
