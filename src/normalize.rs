use crate::error::ModelError;
use crate::model::Prob3;

/// Divide raw non-negative scores by their sum.
pub fn normalize(scores: &[f64]) -> Result<Vec<f64>, ModelError> {
    if scores.is_empty() {
        return Err(ModelError::Empty);
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite() || **s < 0.0) {
        return Err(ModelError::InvalidScore(*bad));
    }
    let sum: f64 = scores.iter().sum();
    if sum <= 0.0 {
        return Err(ModelError::ZeroSum);
    }
    Ok(scores.iter().map(|s| s / sum).collect())
}

pub fn normalize3(home: f64, draw: f64, away: f64) -> Result<Prob3, ModelError> {
    let p = normalize(&[home, draw, away])?;
    Ok(Prob3 {
        home: p[0],
        draw: p[1],
        away: p[2],
    })
}

pub fn normalize2(a: f64, b: f64) -> Result<(f64, f64), ModelError> {
    let p = normalize(&[a, b])?;
    Ok((p[0], p[1]))
}

/// Like [`normalize3`], but falls back to a uniform triple instead of failing.
pub fn normalize3_or_uniform(home: f64, draw: f64, away: f64) -> Prob3 {
    match normalize3(home, draw, away) {
        Ok(p) => p,
        Err(err) => {
            tracing::warn!(home, draw, away, %err, "falling back to uniform probabilities");
            Prob3::uniform()
        }
    }
}

pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}
