use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn from_goals(home_goals: u8, away_goals: u8) -> Self {
        if home_goals > away_goals {
            Outcome::Home
        } else if home_goals < away_goals {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Home => "HOME",
            Outcome::Draw => "DRAW",
            Outcome::Away => "AWAY",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Home/draw/away probability triple on the 0..1 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn sum(&self) -> f64 {
        self.home + self.draw + self.away
    }

    /// Most likely outcome. Ties go to home, then draw.
    pub fn argmax(&self) -> Outcome {
        if self.home >= self.draw && self.home >= self.away {
            Outcome::Home
        } else if self.draw >= self.away {
            Outcome::Draw
        } else {
            Outcome::Away
        }
    }

    pub fn one_hot(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Home => Self {
                home: 1.0,
                draw: 0.0,
                away: 0.0,
            },
            Outcome::Draw => Self {
                home: 0.0,
                draw: 1.0,
                away: 0.0,
            },
            Outcome::Away => Self {
                home: 0.0,
                draw: 0.0,
                away: 1.0,
            },
        }
    }
}

/// A finished match from the history feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub league: String,
    pub home: String,
    pub away: String,
    pub home_goals: u8,
    pub away_goals: u8,
    #[serde(default)]
    pub home_corners: Option<u8>,
    #[serde(default)]
    pub away_corners: Option<u8>,
}

impl MatchRecord {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_goals(self.home_goals, self.away_goals)
    }

    pub fn total_goals(&self) -> u32 {
        self.home_goals as u32 + self.away_goals as u32
    }

    pub fn total_corners(&self) -> Option<u32> {
        match (self.home_corners, self.away_corners) {
            (Some(h), Some(a)) => Some(h as u32 + a as u32),
            _ => None,
        }
    }

    pub fn involves(&self, key: &str) -> bool {
        team_key(&self.home) == key || team_key(&self.away) == key
    }
}

/// Decimal bookmaker odds for the markets the model prices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketOdds {
    #[serde(default)]
    pub home: Option<f64>,
    #[serde(default)]
    pub draw: Option<f64>,
    #[serde(default)]
    pub away: Option<f64>,
    #[serde(default)]
    pub over: Option<f64>,
    #[serde(default)]
    pub under: Option<f64>,
    #[serde(default)]
    pub goals_line: Option<f64>,
    #[serde(default)]
    pub btts_yes: Option<f64>,
    #[serde(default)]
    pub btts_no: Option<f64>,
    #[serde(default)]
    pub corners_over: Option<f64>,
    #[serde(default)]
    pub corners_under: Option<f64>,
    #[serde(default)]
    pub corners_line: Option<f64>,
}

impl MarketOdds {
    pub fn is_empty(&self) -> bool {
        self == &MarketOdds::default()
    }
}

/// An upcoming match to be priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    #[serde(default)]
    pub league: String,
    pub home: String,
    pub away: String,
    #[serde(default)]
    pub kickoff: Option<NaiveDateTime>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub odds: Option<MarketOdds>,
}

impl Fixture {
    pub fn new(id: impl Into<String>, home: impl Into<String>, away: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            league: String::new(),
            home: home.into(),
            away: away.into(),
            kickoff: None,
            venue: None,
            odds: None,
        }
    }

    pub fn kickoff_date(&self) -> Option<NaiveDate> {
        self.kickoff.map(|k| k.date())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormResult {
    Win,
    Draw,
    Loss,
}

impl FormResult {
    pub fn points(self) -> u32 {
        match self {
            FormResult::Win => 3,
            FormResult::Draw => 1,
            FormResult::Loss => 0,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            FormResult::Win => 'W',
            FormResult::Draw => 'D',
            FormResult::Loss => 'L',
        }
    }
}

impl TryFrom<char> for FormResult {
    type Error = ModelError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c.to_ascii_uppercase() {
            'W' => Ok(FormResult::Win),
            'D' => Ok(FormResult::Draw),
            'L' => Ok(FormResult::Loss),
            other => Err(ModelError::InvalidForm(other)),
        }
    }
}

/// Recent results, newest first ("WWDLW" means the last match was a win).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Form(Vec<FormResult>);

impl Form {
    pub fn new(results: Vec<FormResult>) -> Self {
        Self(results)
    }

    pub fn results(&self) -> &[FormResult] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn truncated(mut self, window: usize) -> Self {
        self.0.truncate(window);
        self
    }

    /// Points taken over points available, 0..1.
    pub fn score(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        let points: u32 = self.0.iter().map(|r| r.points()).sum();
        points as f64 / (3 * self.0.len()) as f64
    }

    /// Recency-weighted result average (W=1, D=0.5, L=0), weights rising
    /// linearly from 0.5 on the oldest result to 1.0 on the newest.
    pub fn momentum(&self) -> f64 {
        let n = self.0.len();
        if n == 0 {
            return 0.5;
        }
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        for (age, result) in self.0.iter().enumerate() {
            let w = if n == 1 {
                1.0
            } else {
                1.0 - 0.5 * age as f64 / (n - 1) as f64
            };
            let value = match result {
                FormResult::Win => 1.0,
                FormResult::Draw => 0.5,
                FormResult::Loss => 0.0,
            };
            weighted += w * value;
            weight_sum += w;
        }
        weighted / weight_sum
    }
}

impl FromStr for Form {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .filter(|c| !c.is_whitespace() && *c != ',' && *c != '-')
            .map(FormResult::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map(Form)
    }
}

impl TryFrom<String> for Form {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Form> for String {
    fn from(form: Form) -> Self {
        form.to_string()
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.0 {
            write!(f, "{}", r.as_char())?;
        }
        Ok(())
    }
}

/// Canonical lookup key for a team name: trimmed, lowercased, single spaces.
pub fn team_key(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
