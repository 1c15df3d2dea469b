use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::{Outcome, Prob3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn label(self) -> &'static str {
        match self {
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
        }
    }

    pub const ALL: [ConfidenceLevel; 3] = [
        ConfidenceLevel::High,
        ConfidenceLevel::Medium,
        ConfidenceLevel::Low,
    ];
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cut-offs on the 0..100 probability scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 65.0,
            medium: 55.0,
        }
    }
}

impl ConfidenceThresholds {
    pub fn new(high: f64, medium: f64) -> Result<Self, ModelError> {
        let t = Self { high, medium };
        t.validate()?;
        Ok(t)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if !in_range(self.high) || !in_range(self.medium) || self.medium > self.high {
            return Err(ModelError::InvalidThresholds {
                high: self.high,
                medium: self.medium,
            });
        }
        Ok(())
    }

    pub fn label(&self, pct: f64) -> ConfidenceLevel {
        if pct.is_nan() {
            return ConfidenceLevel::Low;
        }
        if pct >= self.high {
            ConfidenceLevel::High
        } else if pct >= self.medium {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Label with the default 65/55 cut-offs.
pub fn label(pct: f64) -> ConfidenceLevel {
    ConfidenceThresholds::default().label(pct)
}

/// Favoured outcome and its probability as a percentage.
pub fn pick_outcome(p: Prob3) -> (Outcome, f64) {
    let outcome = p.argmax();
    (outcome, p.get(outcome) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::{ConfidenceLevel, ConfidenceThresholds, label, pick_outcome};
    use crate::model::{Outcome, Prob3};

    #[test]
    fn default_thresholds_match_boundaries() {
        assert_eq!(label(65.0), ConfidenceLevel::High);
        assert_eq!(label(64.99), ConfidenceLevel::Medium);
        assert_eq!(label(55.0), ConfidenceLevel::Medium);
        assert_eq!(label(54.9), ConfidenceLevel::Low);
        assert_eq!(label(f64::NAN), ConfidenceLevel::Low);
    }

    #[test]
    fn custom_thresholds_validate() {
        assert!(ConfidenceThresholds::new(70.0, 60.0).is_ok());
        assert!(ConfidenceThresholds::new(50.0, 60.0).is_err());
        assert!(ConfidenceThresholds::new(120.0, 60.0).is_err());
        let t = ConfidenceThresholds::new(70.0, 60.0).unwrap();
        assert_eq!(t.label(66.0), ConfidenceLevel::Medium);
    }

    #[test]
    fn pick_returns_percentage() {
        let (o, pct) = pick_outcome(Prob3 {
            home: 0.2,
            draw: 0.3,
            away: 0.5,
        });
        assert_eq!(o, Outcome::Away);
        assert!((pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn levels_serialize_uppercase() {
        let s = serde_json::to_string(&ConfidenceLevel::Medium).unwrap();
        assert_eq!(s, "\"MEDIUM\"");
    }
}
