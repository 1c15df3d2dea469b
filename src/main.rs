use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;

use matchcast::config::ModelConfig;
use matchcast::dataset::{self, parse_date};
use matchcast::demo;
use matchcast::elo::compute_elo;
use matchcast::league_params::{compute_all, load_params, save_params};
use matchcast::logging;
use matchcast::predictor::Predictor;
use matchcast::report::{self, ReportFormat};

#[derive(Parser, Debug)]
#[command(name = "matchcast", version, about = "Football match outcome probabilities")]
struct Cli {
    /// Model config JSON; defaults apply to anything it leaves out.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict fixtures from match history and write reports.
    Predict {
        #[arg(long)]
        history: PathBuf,
        #[arg(long)]
        fixtures: PathBuf,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        #[arg(long, default_value = "csv")]
        format: ReportFormat,
        /// League params saved by `params --save`, used instead of refitting.
        #[arg(long)]
        params: Option<PathBuf>,
        /// Blend in the learned 1X2 model trained on the history.
        #[arg(long)]
        learned: bool,
    },
    /// Print Elo ratings after replaying the history.
    Elo {
        #[arg(long)]
        history: PathBuf,
        #[arg(long, default_value = "20")]
        top: usize,
    },
    /// Print per-league base rates.
    Params {
        #[arg(long)]
        history: PathBuf,
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Write a synthetic double round-robin season.
    Demo {
        #[arg(long, default_value = "7")]
        seed: u64,
        #[arg(long, default_value = "10")]
        teams: usize,
        #[arg(long, default_value = "2024-08-10")]
        start: String,
        #[arg(long, default_value = "demo_history.csv")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    logging::init();

    let cli = Cli::parse();
    let mut config = ModelConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Command::Predict {
            history,
            fixtures,
            out,
            format,
            params,
            learned,
        } => {
            config.learned.enabled |= learned;
            predict(config, &history, &fixtures, &out, format, params.as_deref())
        }
        Command::Elo { history, top } => elo(&config, &history, top),
        Command::Params { history, save } => params(&history, save.as_deref()),
        Command::Demo {
            seed,
            teams,
            start,
            out,
        } => demo_season(seed, teams, &start, &out),
    }
}

fn predict(
    config: ModelConfig,
    history: &Path,
    fixtures: &Path,
    out: &Path,
    format: ReportFormat,
    params: Option<&Path>,
) -> Result<()> {
    let history = dataset::load_history(history)?;
    let fixtures = dataset::load_fixtures(fixtures)?;

    let mut predictor = Predictor::new(config, history);
    if let Some(path) = params {
        let loaded = load_params(path)?;
        info!(path = %path.display(), leagues = loaded.len(), "using saved league params");
        predictor = predictor.with_league_params(loaded);
    }
    let predictions = predictor.predict_all(&fixtures);
    let written = report::write_reports(out, &predictions, format)?;

    print!("{}", report::render_summary(&report::summarize(&predictions)));
    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn elo(config: &ModelConfig, history: &Path, top: usize) -> Result<()> {
    let history = dataset::load_history(history)?;
    let table = compute_elo(&history, config.elo);
    info!(teams = table.len(), "elo ratings computed");
    for (rank, (team, rating)) in table.ranked().into_iter().take(top).enumerate() {
        println!("{:>3}. {:<28} {:>7.1}", rank + 1, team, rating);
    }
    Ok(())
}

fn params(history: &Path, save: Option<&Path>) -> Result<()> {
    let history = dataset::load_history(history)?;
    let params = compute_all(&history);

    let mut leagues: Vec<_> = params.values().collect();
    leagues.sort_by(|a, b| a.league.cmp(&b.league));
    for p in leagues {
        println!(
            "{:<24} n={:<5} goals={:.2} home_adv={:+.2} rho={:+.3} draw={}",
            p.league,
            p.sample_matches,
            p.goals_total_base,
            p.home_adv_goals,
            p.dc_rho,
            p.draw_rate
                .map(|d| format!("{:.1}%", d * 100.0))
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    if let Some(path) = save {
        save_params(path, &params)?;
        println!("saved {}", path.display());
    }
    Ok(())
}

fn demo_season(seed: u64, teams: usize, start: &str, out: &Path) -> Result<()> {
    let start = parse_date(start).ok_or_else(|| anyhow!("bad start date {start:?}"))?;
    let season = demo::generate_season(seed, teams, start).context("generate demo season")?;
    dataset::save_history(out, &season)?;
    println!("wrote {} matches to {}", season.len(), out.display());
    Ok(())
}
