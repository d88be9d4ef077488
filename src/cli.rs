//! CLI commands for racing-ai.
//!
//! Supports API server mode, a one-off prediction card and multi-day
//! simulation runs.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};

use crate::bulletin::{format_health_report, format_prediction_card};
use crate::config::AppConfig;
use crate::meeting::{Meeting, PredictionCard};
use crate::types::HealthReport;

#[derive(Parser)]
#[command(name = "racing-ai")]
#[command(version, about = "Racing-AI: self-healing race prediction engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server and the bulletin scheduler
    Serve {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Simulation seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Generate one prediction card and print it
    Predict {
        /// Card date (YYYY-MM-DD), today when omitted
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Output format (json, table, markdown)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Simulation seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run N prediction/results cycles and print the health report
    Simulate {
        /// Number of meeting days
        #[arg(short, long, default_value_t = 7)]
        days: u32,

        /// First meeting day (YYYY-MM-DD), today when omitted
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Output format (json, table, markdown)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Simulation seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Load config and apply a CLI seed override
pub fn load_config(seed: Option<u64>) -> Result<AppConfig> {
    let mut config = AppConfig::load()?;
    if seed.is_some() {
        config.simulation.seed = seed;
    }
    Ok(config)
}

/// Run the predict command.
pub fn run_predict(date: Option<NaiveDate>, format: String, seed: Option<u64>) -> Result<()> {
    let config = load_config(seed)?;
    let mut meeting = Meeting::new(&config)?;
    let card = meeting.run_predictions(date)?;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&card)?),
        "table" => print_card_table(&card),
        "markdown" => println!("{}", format_prediction_card(&card)),
        _ => {
            eprintln!("Unknown format: {}. Using JSON.", format);
            println!("{}", serde_json::to_string_pretty(&card)?);
        }
    }

    Ok(())
}

/// Run the simulate command.
pub fn run_simulate(
    days: u32,
    start: Option<NaiveDate>,
    format: String,
    seed: Option<u64>,
) -> Result<()> {
    let config = load_config(seed)?;
    let mut meeting = Meeting::new(&config)?;
    let start = start.unwrap_or_else(|| meeting.today());

    for day in 0..days {
        let date = start + Duration::days(day as i64);
        let card = meeting.run_predictions(Some(date))?;
        let results = meeting.run_results();
        let hits = results.results.iter().filter(|r| r.hit).count();
        eprintln!(
            "{}: {} races carded, {} settled, {} top-pick hits",
            date,
            card.lines.len(),
            results.results.len(),
            hits
        );
    }

    let report = meeting.health_report();
    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "table" => print_health_table(&report),
        "markdown" => println!("{}", format_health_report(&report)),
        _ => {
            eprintln!("Unknown format: {}. Using JSON.", format);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn print_card_table(card: &PredictionCard) {
    println!("Card: {}{}", card.date, if card.weekend { " (weekend)" } else { "" });
    println!();
    println!(
        "  {:<10} {:>5} {:>6} {:<13} {:<8} {:<12} {:>6} {:<12} {:<12} {:>3}",
        "Track", "Time", "Dist", "Going", "Weather", "Top pick", "Win%", "Jockey", "Trainer", "Scr"
    );
    for line in &card.lines {
        let pick = &line.top_pick;
        println!(
            "  {:<10} {:>5} {:>5}m {:<13} {:<8} {:<12} {:>5.1}% {:<12} {:<12} {:>3}",
            line.track,
            line.time,
            line.distance,
            line.going.name(),
            line.weather.name(),
            pick.horse,
            pick.ai_win_prob * 100.0,
            pick.jockey,
            pick.trainer,
            line.scratched
        );
    }
    println!();

    let selections = card.weekend_selections();
    if !selections.is_empty() {
        println!("=== Weekend Selections ===");
        for (i, s) in selections.iter().enumerate() {
            println!(
                "  {:>2}. {} {} - {} ({:.1}%)",
                i + 1,
                s.track,
                s.time,
                s.horse,
                s.confidence * 100.0
            );
        }
        println!();
    }
}

fn print_health_table(report: &HealthReport) {
    println!("=== Model Health ===");
    println!("  Recent accuracy:   {:.2}%", report.recent_accuracy * 100.0);
    println!("  Top-pick hit rate: {:.2}%", report.top_pick_hit_rate * 100.0);
    println!("  Races settled:     {}", report.races_settled);
    println!("  Training samples:  {}", report.training_samples);
    println!("  Train calls:       {}", report.train_calls);
    println!("  Retrains:          {}", report.retrains);
    println!("  Self-heals:        {}", report.self_heals);
    println!("  Error records:     {}", report.error_records);
    println!("  Scratch alerts:    {}", report.scratch_alerts);
    if !report.accuracy_history.is_empty() {
        let history: Vec<String> = report
            .accuracy_history
            .iter()
            .map(|a| format!("{:.2}", a))
            .collect();
        println!("  Accuracy history:  {}", history.join(" "));
    }
}
