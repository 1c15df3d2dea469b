use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{Form, FormResult, MatchRecord, team_key};

// Fallbacks used when a team has no usable history.
const DEFAULT_GOALS_FOR: f64 = 1.2;
const DEFAULT_GOALS_AGAINST: f64 = 1.2;
const DEFAULT_HOME_GOALS_FOR: f64 = 1.4;
const DEFAULT_HOME_GOALS_AGAINST: f64 = 1.0;
const DEFAULT_AWAY_GOALS_FOR: f64 = 1.0;
const DEFAULT_AWAY_GOALS_AGAINST: f64 = 1.4;
const DEFAULT_CORNERS: f64 = 5.0;
const DEFAULT_WIN_RATE: f64 = 0.33;
const DEFAULT_DRAW_RATE: f64 = 0.33;
const DEFAULT_LOSS_RATE: f64 = 0.34;

pub const DEFAULT_FORM_WINDOW: usize = 5;

/// Rolling statistics for one team over its most recent matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub team: String,
    pub matches: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub goals_for: u32,
    pub goals_against: u32,
    pub home_matches: usize,
    pub home_wins: usize,
    pub home_draws: usize,
    pub home_losses: usize,
    pub home_goals_for: u32,
    pub home_goals_against: u32,
    pub away_matches: usize,
    pub away_wins: usize,
    pub away_draws: usize,
    pub away_losses: usize,
    pub away_goals_for: u32,
    pub away_goals_against: u32,
    pub corner_matches: usize,
    pub corners_for: u32,
    pub corners_against: u32,
    pub clean_sheets: usize,
    pub failed_to_score: usize,
    pub btts: usize,
    pub over_2_5: usize,
    pub big_wins: usize,
    pub big_losses: usize,
    pub form: Form,
}

impl TeamStats {
    pub fn empty(team: &str) -> Self {
        Self {
            team: team.to_string(),
            ..Self::default()
        }
    }

    /// Fold one match into the totals. `form` is rebuilt separately.
    fn update(&mut self, record: &MatchRecord, is_home: bool) {
        let (gf, ga) = if is_home {
            (record.home_goals as u32, record.away_goals as u32)
        } else {
            (record.away_goals as u32, record.home_goals as u32)
        };

        self.matches += 1;
        self.goals_for += gf;
        self.goals_against += ga;

        let result = match gf.cmp(&ga) {
            std::cmp::Ordering::Greater => FormResult::Win,
            std::cmp::Ordering::Less => FormResult::Loss,
            std::cmp::Ordering::Equal => FormResult::Draw,
        };
        match result {
            FormResult::Win => self.wins += 1,
            FormResult::Draw => self.draws += 1,
            FormResult::Loss => self.losses += 1,
        }
        if gf >= ga + 2 {
            self.big_wins += 1;
        }
        if ga >= gf + 2 {
            self.big_losses += 1;
        }

        if is_home {
            self.home_matches += 1;
            self.home_goals_for += gf;
            self.home_goals_against += ga;
            match result {
                FormResult::Win => self.home_wins += 1,
                FormResult::Draw => self.home_draws += 1,
                FormResult::Loss => self.home_losses += 1,
            }
        } else {
            self.away_matches += 1;
            self.away_goals_for += gf;
            self.away_goals_against += ga;
            match result {
                FormResult::Win => self.away_wins += 1,
                FormResult::Draw => self.away_draws += 1,
                FormResult::Loss => self.away_losses += 1,
            }
        }

        if ga == 0 {
            self.clean_sheets += 1;
        }
        if gf == 0 {
            self.failed_to_score += 1;
        }
        if gf > 0 && ga > 0 {
            self.btts += 1;
        }
        if gf + ga >= 3 {
            self.over_2_5 += 1;
        }

        if let (Some(hc), Some(ac)) = (record.home_corners, record.away_corners) {
            let (cf, ca) = if is_home { (hc, ac) } else { (ac, hc) };
            self.corner_matches += 1;
            self.corners_for += cf as u32;
            self.corners_against += ca as u32;
        }
    }

    pub fn has_history(&self) -> bool {
        self.matches > 0
    }

    pub fn avg_goals_for(&self) -> f64 {
        ratio(self.goals_for as f64, self.matches, DEFAULT_GOALS_FOR)
    }

    pub fn avg_goals_against(&self) -> f64 {
        ratio(self.goals_against as f64, self.matches, DEFAULT_GOALS_AGAINST)
    }

    pub fn goal_difference_per_match(&self) -> f64 {
        self.avg_goals_for() - self.avg_goals_against()
    }

    pub fn home_avg_goals_for(&self) -> f64 {
        ratio(
            self.home_goals_for as f64,
            self.home_matches,
            DEFAULT_HOME_GOALS_FOR,
        )
    }

    pub fn home_avg_goals_against(&self) -> f64 {
        ratio(
            self.home_goals_against as f64,
            self.home_matches,
            DEFAULT_HOME_GOALS_AGAINST,
        )
    }

    pub fn away_avg_goals_for(&self) -> f64 {
        ratio(
            self.away_goals_for as f64,
            self.away_matches,
            DEFAULT_AWAY_GOALS_FOR,
        )
    }

    pub fn away_avg_goals_against(&self) -> f64 {
        ratio(
            self.away_goals_against as f64,
            self.away_matches,
            DEFAULT_AWAY_GOALS_AGAINST,
        )
    }

    pub fn win_rate(&self) -> f64 {
        ratio(self.wins as f64, self.matches, DEFAULT_WIN_RATE)
    }

    pub fn draw_rate(&self) -> f64 {
        ratio(self.draws as f64, self.matches, DEFAULT_DRAW_RATE)
    }

    pub fn loss_rate(&self) -> f64 {
        ratio(self.losses as f64, self.matches, DEFAULT_LOSS_RATE)
    }

    /// Home wins over home matches played; 0 with no home matches.
    pub fn home_win_rate(&self) -> f64 {
        ratio(self.home_wins as f64, self.home_matches, 0.0)
    }

    pub fn away_win_rate(&self) -> f64 {
        ratio(self.away_wins as f64, self.away_matches, 0.0)
    }

    pub fn avg_corners_for(&self) -> f64 {
        ratio(self.corners_for as f64, self.corner_matches, DEFAULT_CORNERS)
    }

    pub fn avg_corners_against(&self) -> f64 {
        ratio(
            self.corners_against as f64,
            self.corner_matches,
            DEFAULT_CORNERS,
        )
    }

    pub fn btts_rate(&self) -> Option<f64> {
        (self.matches > 0).then(|| self.btts as f64 / self.matches as f64)
    }

    pub fn over_2_5_rate(&self) -> Option<f64> {
        (self.matches > 0).then(|| self.over_2_5 as f64 / self.matches as f64)
    }

    pub fn clean_sheet_rate(&self) -> f64 {
        ratio(self.clean_sheets as f64, self.matches, 0.2)
    }

    pub fn form_score(&self) -> f64 {
        self.form.score()
    }
}

fn ratio(num: f64, n: usize, default: f64) -> f64 {
    if n == 0 { default } else { num / n as f64 }
}

/// Matches strictly before `before` (if given), oldest first.
fn prior_matches<'a>(
    history: &'a [MatchRecord],
    before: Option<NaiveDate>,
) -> impl Iterator<Item = &'a MatchRecord> + 'a {
    history
        .iter()
        .filter(move |m| before.is_none_or(|cutoff| m.date < cutoff))
}

/// Statistics for `team` over its last `window` matches before `before`.
pub fn aggregate_team(
    history: &[MatchRecord],
    team: &str,
    before: Option<NaiveDate>,
    window: usize,
) -> TeamStats {
    aggregate_team_with_form(history, team, before, window, DEFAULT_FORM_WINDOW)
}

pub fn aggregate_team_with_form(
    history: &[MatchRecord],
    team: &str,
    before: Option<NaiveDate>,
    window: usize,
    form_window: usize,
) -> TeamStats {
    let key = team_key(team);
    let mut relevant: Vec<&MatchRecord> = prior_matches(history, before)
        .filter(|m| m.involves(&key))
        .collect();
    // Stable sort keeps feed order for same-day matches.
    relevant.sort_by_key(|m| m.date);

    let start = relevant.len().saturating_sub(window);
    let recent = &relevant[start..];

    let mut stats = TeamStats::empty(team);
    for m in recent {
        stats.update(m, team_key(&m.home) == key);
    }

    // Form has its own window, independent of the stats window.
    let form = relevant
        .iter()
        .rev()
        .take(form_window)
        .map(|m| {
            let is_home = team_key(&m.home) == key;
            let (gf, ga) = if is_home {
                (m.home_goals, m.away_goals)
            } else {
                (m.away_goals, m.home_goals)
            };
            match gf.cmp(&ga) {
                std::cmp::Ordering::Greater => FormResult::Win,
                std::cmp::Ordering::Less => FormResult::Loss,
                std::cmp::Ordering::Equal => FormResult::Draw,
            }
        })
        .collect();
    stats.form = Form::new(form);
    stats
}

/// Stats for every team that appears in the history.
pub fn aggregate_all(
    history: &[MatchRecord],
    before: Option<NaiveDate>,
    window: usize,
) -> HashMap<String, TeamStats> {
    let mut names: HashMap<String, String> = HashMap::new();
    for m in prior_matches(history, before) {
        names.entry(team_key(&m.home)).or_insert_with(|| m.home.clone());
        names.entry(team_key(&m.away)).or_insert_with(|| m.away.clone());
    }
    names
        .into_iter()
        .map(|(key, name)| {
            let stats = aggregate_team(history, &name, before, window);
            (key, stats)
        })
        .collect()
}

/// Head-to-head record, seen from the fixture's home team.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub matches: usize,
    pub home_wins: usize,
    pub draws: usize,
    pub away_wins: usize,
    pub total_goals: u32,
    pub btts: usize,
    pub corner_matches: usize,
    pub total_corners: u32,
}

impl HeadToHead {
    /// (home wins + half the draws) / matches; 0.5 with no meetings.
    pub fn home_advantage(&self) -> f64 {
        if self.matches == 0 {
            return 0.5;
        }
        (self.home_wins as f64 + 0.5 * self.draws as f64) / self.matches as f64
    }

    pub fn avg_total_goals(&self) -> Option<f64> {
        (self.matches > 0).then(|| self.total_goals as f64 / self.matches as f64)
    }

    pub fn avg_total_corners(&self) -> Option<f64> {
        (self.corner_matches > 0).then(|| self.total_corners as f64 / self.corner_matches as f64)
    }

    pub fn btts_rate(&self) -> Option<f64> {
        (self.matches > 0).then(|| self.btts as f64 / self.matches as f64)
    }
}

pub fn head_to_head(
    history: &[MatchRecord],
    home: &str,
    away: &str,
    before: Option<NaiveDate>,
    window: usize,
) -> HeadToHead {
    let home_key = team_key(home);
    let away_key = team_key(away);

    let mut meetings: Vec<&MatchRecord> = prior_matches(history, before)
        .filter(|m| {
            let h = team_key(&m.home);
            let a = team_key(&m.away);
            (h == home_key && a == away_key) || (h == away_key && a == home_key)
        })
        .collect();
    meetings.sort_by_key(|m| m.date);
    let start = meetings.len().saturating_sub(window);

    let mut out = HeadToHead::default();
    for m in &meetings[start..] {
        let fixture_home_at_home = team_key(&m.home) == home_key;
        let (gf, ga) = if fixture_home_at_home {
            (m.home_goals, m.away_goals)
        } else {
            (m.away_goals, m.home_goals)
        };
        out.matches += 1;
        match gf.cmp(&ga) {
            std::cmp::Ordering::Greater => out.home_wins += 1,
            std::cmp::Ordering::Less => out.away_wins += 1,
            std::cmp::Ordering::Equal => out.draws += 1,
        }
        out.total_goals += m.total_goals();
        if m.home_goals > 0 && m.away_goals > 0 {
            out.btts += 1;
        }
        if let Some(c) = m.total_corners() {
            out.corner_matches += 1;
            out.total_corners += c;
        }
    }
    out
}
