use thiserror::Error;

/// Domain errors raised by the prediction model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("no scores to normalize")]
    Empty,

    #[error("scores sum to zero")]
    ZeroSum,

    #[error("invalid score {0}: must be finite and non-negative")]
    InvalidScore(f64),

    #[error("invalid decimal odds {0}: must be greater than 1.0")]
    InvalidOdds(f64),

    #[error("invalid form character {0:?}: expected W, D or L")]
    InvalidForm(char),

    #[error("invalid confidence thresholds: high={high}, medium={medium}")]
    InvalidThresholds { high: f64, medium: f64 },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("need at least {needed} training matches, got {got}")]
    InsufficientData { needed: usize, got: usize },
}
