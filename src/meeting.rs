//! Daily meeting: the prediction card, the pending races it creates and
//! the nightly settlement of those races.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{AppConfig, ScheduleConfig};
use crate::simulator::RacingSimulator;
use crate::types::{Going, HealthReport, PredictionRow, Race, RaceResult, ScratchReason, Weather};

/// Weekend selections listed on a Friday to Sunday card
pub const WEEKEND_SELECTIONS: usize = 12;

/// Meeting shared by the HTTP handlers and the scheduler
pub type SharedMeeting = Arc<Mutex<Meeting>>;

/// One race on the prediction card
#[derive(Debug, Clone, Serialize)]
pub struct CardLine {
    pub race_id: String,
    pub track: String,
    pub time: String,
    pub distance: u32,
    pub going: Going,
    pub weather: Weather,
    pub top_pick: PredictionRow,
    pub scratched: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekendSelection {
    pub track: String,
    pub time: String,
    pub horse: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionCard {
    pub date: NaiveDate,
    pub lines: Vec<CardLine>,
    /// Friday, Saturday or Sunday
    pub weekend: bool,
    pub health: HealthReport,
}

impl PredictionCard {
    /// First top picks of the card in running order; empty midweek
    pub fn weekend_selections(&self) -> Vec<WeekendSelection> {
        if !self.weekend {
            return Vec::new();
        }
        self.lines
            .iter()
            .take(WEEKEND_SELECTIONS)
            .map(|line| WeekendSelection {
                track: line.track.clone(),
                time: line.time.clone(),
                horse: line.top_pick.horse.clone(),
                confidence: line.top_pick.ai_win_prob,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsCard {
    pub results: Vec<RaceResult>,
    pub health: HealthReport,
}

/// Runners withdrawn from one pending race so far
#[derive(Debug, Clone, Serialize)]
pub struct ScratchUpdate {
    pub race_id: String,
    pub track: String,
    pub time: String,
    pub scratched: Vec<(String, ScratchReason)>,
}

/// Pending race summary for the API
#[derive(Debug, Clone, Serialize)]
pub struct PendingRace {
    pub race_id: String,
    pub track: String,
    pub time: String,
    pub runners: usize,
    pub scratched: usize,
    pub scratch_updates: u32,
    pub top_pick: Option<String>,
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Fri | Weekday::Sat | Weekday::Sun)
}

pub struct Meeting {
    simulator: RacingSimulator,
    schedule: ScheduleConfig,
    pending: Vec<Race>,
}

impl Meeting {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            simulator: RacingSimulator::new(config)?,
            schedule: config.schedule.clone(),
            pending: Vec::new(),
        })
    }

    pub fn shared(self) -> SharedMeeting {
        Arc::new(Mutex::new(self))
    }

    /// Current date in the schedule's timezone
    pub fn today(&self) -> NaiveDate {
        self.simulator.today()
    }

    /// Generate the card for every track and slot of `date`, or of today
    /// in the schedule's timezone when `date` is `None`.
    ///
    /// Races with no runners left are dropped; the rest become pending.
    pub fn run_predictions(&mut self, date: Option<NaiveDate>) -> Result<PredictionCard> {
        let card_date = date.unwrap_or_else(|| self.today());
        let tracks = self.simulator.tracks().to_vec();
        let times = self.schedule.race_times();
        let mut lines = Vec::new();

        for track in &tracks {
            for time in &times {
                let race = match date {
                    Some(date) => self.simulator.generate_race_on(track, date, time),
                    None => self.simulator.generate_race(track, time),
                };
                let mut race = race.with_context(|| format!("Failed to generate {} {}", track, time))?;
                self.simulator.check_for_scratches(&mut race);

                let table = self.simulator.generate_predictions(&race);
                let Some(top_pick) = table.top_pick().cloned() else {
                    warn!("Skipping {}: every runner scratched", race.race_id);
                    continue;
                };

                lines.push(CardLine {
                    race_id: race.race_id.clone(),
                    track: race.track.clone(),
                    time: race.time.clone(),
                    distance: race.distance,
                    going: race.going,
                    weather: race.weather,
                    top_pick,
                    scratched: race.scratched_count(),
                });

                race.predictions = Some(table);
                self.pending.push(race);
            }
        }

        info!(
            "Prediction card for {}: {} races, {} pending",
            card_date,
            lines.len(),
            self.pending.len()
        );

        Ok(PredictionCard {
            date: card_date,
            lines,
            weekend: is_weekend(card_date),
            health: self.simulator.health_report(),
        })
    }

    /// Settle every pending race and clear the pending set
    pub fn run_results(&mut self) -> ResultsCard {
        let races = std::mem::take(&mut self.pending);
        let mut results = Vec::with_capacity(races.len());

        for mut race in races {
            if let Some(result) = self.simulator.resolve_race(&mut race) {
                results.push(result);
            }
        }

        let health = self.simulator.health_report();
        info!(
            "Settled {} races | recent accuracy {:.2} | training samples {}",
            results.len(),
            health.recent_accuracy,
            health.training_samples
        );

        ResultsCard { results, health }
    }

    /// Recheck scratches on pending races; reports races with new withdrawals
    pub fn run_scratch_monitor(&mut self) -> Vec<ScratchUpdate> {
        let mut updates = Vec::new();

        for race in self.pending.iter_mut() {
            if !self.simulator.check_for_scratches(race) {
                continue;
            }

            let table = self.simulator.generate_predictions(race);
            race.predictions = (!table.is_empty()).then_some(table);

            updates.push(ScratchUpdate {
                race_id: race.race_id.clone(),
                track: race.track.clone(),
                time: race.time.clone(),
                scratched: race
                    .entries
                    .iter()
                    .filter_map(|e| e.scratch_reason.map(|r| (e.horse.clone(), r)))
                    .collect(),
            });
        }

        updates
    }

    #[cfg(test)]
    pub fn pending(&self) -> &[Race] {
        &self.pending
    }

    pub fn pending_summary(&self) -> Vec<PendingRace> {
        self.pending
            .iter()
            .map(|race| PendingRace {
                race_id: race.race_id.clone(),
                track: race.track.clone(),
                time: race.time.clone(),
                runners: race.active_entries().count(),
                scratched: race.scratched_count(),
                scratch_updates: race.scratch_updates,
                top_pick: race
                    .predictions
                    .as_ref()
                    .and_then(|t| t.top_pick())
                    .map(|r| r.horse.clone()),
            })
            .collect()
    }

    pub fn health_report(&self) -> HealthReport {
        self.simulator.health_report()
    }
}
