pub mod backtest;
pub mod calibration;
pub mod confidence;
pub mod config;
pub mod dataset;
pub mod demo;
pub mod elo;
pub mod error;
pub mod goals;
pub mod league_params;
pub mod learned;
pub mod logging;
pub mod markets;
pub mod model;
pub mod normalize;
pub mod predictor;
pub mod probability;
pub mod report;
pub mod stats;
pub mod value;
