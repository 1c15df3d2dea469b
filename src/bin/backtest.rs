use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use matchcast::backtest::{self, BacktestReport, BinaryScore};
use matchcast::calibration::Metrics;
use matchcast::config::ModelConfig;
use matchcast::dataset;
use matchcast::league_params::load_params;
use matchcast::logging;

/// Walk-forward backtest over a match history.
#[derive(Parser, Debug)]
#[command(name = "backtest", version)]
struct Args {
    #[arg(long)]
    history: PathBuf,
    /// Matches used only as prior history before scoring starts.
    #[arg(long, default_value = "50")]
    warmup: usize,
    #[arg(long)]
    config: Option<PathBuf>,
    /// League params saved by `matchcast params --save`.
    #[arg(long)]
    params: Option<PathBuf>,
    /// Also train and score the learned 1X2 model.
    #[arg(long)]
    learned: bool,
    /// Print the report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    logging::init();

    let args = Args::parse();
    let mut config = ModelConfig::resolve(args.config.as_deref())?;
    config.learned.enabled |= args.learned;
    let history = dataset::load_history(&args.history)?;
    let params = match &args.params {
        Some(path) => {
            let loaded = load_params(path)?;
            info!(path = %path.display(), leagues = loaded.len(), "using saved league params");
            Some(loaded)
        }
        None => None,
    };

    let report = backtest::run_with_params(&history, &config, args.warmup, params);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(r: &BacktestReport) {
    println!(
        "matches={} warmup={} scored={} on_defaults={}",
        r.total_matches, r.warmup, r.samples, r.used_defaults
    );
    print_metrics("1x2", &r.result);
    if let Some(learned) = &r.learned {
        print_metrics("learned", learned);
    }
    println!("ece: {:.4}", r.ece);
    print_binary("over/under", &r.over_under);
    print_binary("btts", &r.btts);
    for l in &r.by_level {
        println!(
            "{:<6} picks={:<5} hits={:<5} rate={:.1}%",
            l.level.label(),
            l.count,
            l.hits,
            l.rate * 100.0
        );
    }
    println!(
        "calibration (fit on first {}): scale={:.3} draw_bias={:+.3}",
        r.split_index, r.calibration.scale, r.calibration.draw_bias
    );
    print_metrics("holdout raw", &r.holdout_raw);
    print_metrics("holdout calibrated", &r.holdout_calibrated);
    let b = r.base_rates;
    let name = format!("holdout baseline {:.3}/{:.3}/{:.3}", b.home, b.draw, b.away);
    print_metrics(&name, &r.holdout_baseline);
    println!(
        "ece holdout: raw={:.4} calibrated={:.4}",
        r.ece_holdout, r.ece_calibrated
    );
}

fn print_metrics(name: &str, m: &Metrics) {
    println!(
        "{name}: n={} brier={:.4} log_loss={:.4} accuracy={:.1}%",
        m.samples,
        m.brier,
        m.log_loss,
        m.accuracy * 100.0
    );
}

fn print_binary(name: &str, s: &BinaryScore) {
    println!(
        "{name}: n={} brier={:.4} accuracy={:.1}%",
        s.samples,
        s.brier,
        s.accuracy * 100.0
    );
}
