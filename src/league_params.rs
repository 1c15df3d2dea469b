use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::calibration;
use crate::model::MatchRecord;

const DEFAULT_GOALS_TOTAL: f64 = 2.60;
const DEFAULT_RHO: f64 = -0.10;
// Below this many matches, league averages are blended with the defaults.
const MIN_N: f64 = 200.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueParams {
    pub league: String,
    pub sample_matches: usize,
    pub goals_total_base: f64,
    pub home_adv_goals: f64,
    // Dixon-Coles rho (typically negative to increase low-score draws).
    pub dc_rho: f64,
    pub draw_rate: Option<f64>,
    pub over_2_5_rate: Option<f64>,
    pub btts_rate: Option<f64>,
    pub avg_corners: Option<f64>,
}

impl LeagueParams {
    pub fn defaults(league: &str) -> Self {
        Self {
            league: league.to_string(),
            sample_matches: 0,
            goals_total_base: DEFAULT_GOALS_TOTAL,
            home_adv_goals: 0.0,
            dc_rho: DEFAULT_RHO,
            draw_rate: None,
            over_2_5_rate: None,
            btts_rate: None,
            avg_corners: None,
        }
    }
}

pub fn compute_league_params(league: &str, history: &[MatchRecord]) -> LeagueParams {
    let rows: Vec<&MatchRecord> = history.iter().filter(|m| m.league == league).collect();
    params_from_rows(league, &rows)
}

/// Params for every league present in the history, keyed by league name.
pub fn compute_all(history: &[MatchRecord]) -> HashMap<String, LeagueParams> {
    let mut by_league: HashMap<&str, Vec<&MatchRecord>> = HashMap::new();
    for m in history {
        by_league.entry(m.league.as_str()).or_default().push(m);
    }
    by_league
        .into_iter()
        .map(|(league, rows)| (league.to_string(), params_from_rows(league, &rows)))
        .collect()
}

/// Params over every match regardless of league, labelled `label`.
pub fn compute_pooled(label: &str, history: &[MatchRecord]) -> LeagueParams {
    let rows: Vec<&MatchRecord> = history.iter().collect();
    params_from_rows(label, &rows)
}

fn params_from_rows(league: &str, rows: &[&MatchRecord]) -> LeagueParams {
    let mut total_goals = 0.0;
    let mut home_minus_away = 0.0;
    let mut draws = 0usize;
    let mut overs = 0usize;
    let mut btts = 0usize;
    let mut corners_sum = 0.0;
    let mut corner_n = 0usize;

    for m in rows {
        total_goals += m.total_goals() as f64;
        home_minus_away += m.home_goals as f64 - m.away_goals as f64;
        if m.home_goals == m.away_goals {
            draws += 1;
        }
        if m.total_goals() >= 3 {
            overs += 1;
        }
        if m.home_goals > 0 && m.away_goals > 0 {
            btts += 1;
        }
        if let Some(c) = m.total_corners() {
            corners_sum += c as f64;
            corner_n += 1;
        }
    }

    let n = rows.len();
    let mut out = LeagueParams::defaults(league);
    out.sample_matches = n;
    if n == 0 {
        return out;
    }

    let nf = n as f64;
    out.goals_total_base = total_goals / nf;
    out.home_adv_goals = home_minus_away / nf;
    out.draw_rate = Some(draws as f64 / nf);
    out.over_2_5_rate = Some(overs as f64 / nf);
    out.btts_rate = Some(btts as f64 / nf);
    if corner_n > 0 {
        out.avg_corners = Some(corners_sum / corner_n as f64);
    }

    // Shrink small samples toward defaults to avoid wild swings.
    let w = (nf / MIN_N).clamp(0.0, 1.0);
    out.goals_total_base = (1.0 - w) * DEFAULT_GOALS_TOTAL + w * out.goals_total_base;
    out.home_adv_goals *= w;
    let fitted_rho = calibration::fit_dc_rho_to_draw_rate(
        out.goals_total_base,
        out.home_adv_goals,
        draws as f64 / nf,
    );
    out.dc_rho = (1.0 - w) * DEFAULT_RHO + w * fitted_rho;
    out
}

pub fn load_params(path: &Path) -> Result<HashMap<String, LeagueParams>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read league params {}", path.display()))?;
    serde_json::from_str(&raw).context("parse league params")
}

pub fn save_params(path: &Path, params: &HashMap<String, LeagueParams>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("create league params dir")?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(params).context("serialize league params")?;
    fs::write(&tmp, json).context("write league params")?;
    fs::rename(&tmp, path).context("swap league params")?;
    Ok(())
}
