use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ModelError;
use crate::model::MatchRecord;

pub const DEMO_LEAGUE: &str = "Demo League";

const TEAM_NAMES: &[&str] = &[
    "Northbridge", "Eastport", "Westfield", "Southvale", "Riverton", "Hillcrest", "Lakeside",
    "Stonebury", "Ashford", "Kingsmere", "Oakridge", "Millbrook", "Fairhaven", "Redcliff",
    "Greywater", "Highgate", "Thornbury", "Elmstead", "Brightwell", "Marston",
];

const BASE_HOME_GOALS: f64 = 1.45;
const BASE_AWAY_GOALS: f64 = 1.15;
const BASE_CORNERS: f64 = 5.0;

#[derive(Debug, Clone, Copy)]
struct Strength {
    attack: f64,
    defense: f64,
}

pub fn team_names(teams: usize) -> Vec<String> {
    (0..teams)
        .map(|i| match TEAM_NAMES.get(i) {
            Some(name) => name.to_string(),
            None => format!("Team {}", i + 1),
        })
        .collect()
}

/// Double round-robin season, one round per week from `start`.
/// The same seed always yields the same season.
pub fn generate_season(
    seed: u64,
    teams: usize,
    start: NaiveDate,
) -> Result<Vec<MatchRecord>, ModelError> {
    if teams < 2 {
        return Err(ModelError::InvalidConfig(format!(
            "demo season needs at least 2 teams, got {teams}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let names = team_names(teams);
    let strengths: Vec<Strength> = (0..teams)
        .map(|_| Strength {
            attack: rng.gen_range(0.7..1.3),
            defense: rng.gen_range(0.7..1.3),
        })
        .collect();

    let rounds = round_robin(teams);
    let mut out = Vec::with_capacity(rounds.len() * 2 * (teams / 2));
    let legs = [false, true];
    for (leg_idx, swap) in legs.iter().enumerate() {
        for (round_idx, pairs) in rounds.iter().enumerate() {
            let week = (leg_idx * rounds.len() + round_idx) as i64;
            let date = start + Duration::weeks(week);
            for &(a, b) in pairs {
                let (h, w) = if *swap { (b, a) } else { (a, b) };
                let (hs, ws) = (strengths[h], strengths[w]);
                let lambda_home = BASE_HOME_GOALS * hs.attack / ws.defense;
                let lambda_away = BASE_AWAY_GOALS * ws.attack / hs.defense;
                out.push(MatchRecord {
                    date,
                    league: DEMO_LEAGUE.to_string(),
                    home: names[h].clone(),
                    away: names[w].clone(),
                    home_goals: sample_poisson(&mut rng, lambda_home),
                    away_goals: sample_poisson(&mut rng, lambda_away),
                    home_corners: Some(sample_poisson(&mut rng, BASE_CORNERS * hs.attack * 1.1)),
                    away_corners: Some(sample_poisson(&mut rng, BASE_CORNERS * ws.attack * 0.9)),
                });
            }
        }
    }
    Ok(out)
}

/// Circle-method pairings. An odd team count gets a bye slot.
fn round_robin(teams: usize) -> Vec<Vec<(usize, usize)>> {
    let slots = teams + teams % 2;
    let mut ring: Vec<usize> = (0..slots).collect();
    let mut rounds = Vec::with_capacity(slots - 1);
    for round in 0..slots - 1 {
        let mut pairs = Vec::with_capacity(slots / 2);
        for i in 0..slots / 2 {
            let (a, b) = (ring[i], ring[slots - 1 - i]);
            if a >= teams || b >= teams {
                continue;
            }
            // alternate hosts within the first leg
            if (round + i) % 2 == 0 {
                pairs.push((a, b));
            } else {
                pairs.push((b, a));
            }
        }
        rounds.push(pairs);
        ring[1..].rotate_right(1);
    }
    rounds
}

/// Knuth's method; fine for the small rates used here.
fn sample_poisson(rng: &mut impl Rng, lambda: f64) -> u8 {
    let limit = (-lambda.max(0.0)).exp();
    let mut k = 0u8;
    let mut p = 1.0;
    loop {
        p *= rng.r#gen::<f64>();
        if p <= limit || k == u8::MAX {
            return k;
        }
        k += 1;
    }
}
