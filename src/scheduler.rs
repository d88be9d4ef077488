//! Scheduled bulletin jobs: daily card, nightly results, scratch monitor.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info};

use crate::bulletin::{format_prediction_card, format_results, format_scratch_update, Notifier};
use crate::config::{local_time, ScheduleConfig};
use crate::meeting::{PredictionCard, ResultsCard, SharedMeeting};

/// Parse an "HH:MM" time of day
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").with_context(|| format!("Invalid time of day: {}", s))
}

/// Time left until the next occurrence of `at` strictly after `now`
pub fn duration_until(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let mut next = now.date().and_time(at);
    if next <= now {
        next += ChronoDuration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Build the card for `date` (today in the schedule's zone when `None`) and send it.
///
/// Card generation scores every race with the model, so it runs on the
/// blocking pool.
pub async fn publish_predictions(
    meeting: &SharedMeeting,
    notifier: &dyn Notifier,
    date: Option<NaiveDate>,
) -> Result<(PredictionCard, String)> {
    let meeting = meeting.clone();
    let card = tokio::task::spawn_blocking(move || meeting.blocking_lock().run_predictions(date))
        .await
        .context("Prediction job panicked")??;
    let message = format_prediction_card(&card);
    notifier.send(&message)?;
    Ok((card, message))
}

/// Settle pending races; sends only when something was settled.
///
/// Settlement may retrain the model, so it runs on the blocking pool.
pub async fn publish_results(
    meeting: &SharedMeeting,
    notifier: &dyn Notifier,
) -> Result<(ResultsCard, String)> {
    let meeting = meeting.clone();
    let card = tokio::task::spawn_blocking(move || meeting.blocking_lock().run_results())
        .await
        .context("Results job panicked")?;
    let message = format_results(&card);
    if !card.results.is_empty() {
        notifier.send(&message)?;
    }
    Ok((card, message))
}

/// One scratch monitor pass; returns the number of updates sent
pub async fn publish_scratch_updates(meeting: &SharedMeeting, notifier: &dyn Notifier) -> Result<usize> {
    let updates = meeting.lock().await.run_scratch_monitor();
    for update in &updates {
        notifier.send(&format_scratch_update(update))?;
    }
    Ok(updates.len())
}

/// Spawn the three recurring jobs
pub fn spawn(
    meeting: SharedMeeting,
    notifier: Arc<dyn Notifier>,
    schedule: &ScheduleConfig,
) -> Result<Vec<JoinHandle<()>>> {
    let predictions_at = parse_time_of_day(&schedule.predictions_at)?;
    let results_at = parse_time_of_day(&schedule.results_at)?;
    let scratch_every = Duration::from_secs(schedule.scratch_interval_secs.max(1));
    let tz = schedule.tz()?;

    info!(
        "Scheduling predictions at {}, results at {} ({}), scratch monitor every {:?}",
        predictions_at, results_at, tz, scratch_every
    );

    let daily = {
        let meeting = meeting.clone();
        let notifier = notifier.clone();
        tokio::spawn(async move {
            loop {
                sleep(duration_until(local_time(tz, Utc::now()), predictions_at)).await;
                if let Err(e) = publish_predictions(&meeting, notifier.as_ref(), None).await {
                    error!("Daily predictions failed: {:#}", e);
                }
            }
        })
    };

    let nightly = {
        let meeting = meeting.clone();
        let notifier = notifier.clone();
        tokio::spawn(async move {
            loop {
                sleep(duration_until(local_time(tz, Utc::now()), results_at)).await;
                if let Err(e) = publish_results(&meeting, notifier.as_ref()).await {
                    error!("Nightly results failed: {:#}", e);
                }
            }
        })
    };

    let monitor = tokio::spawn(async move {
        let mut ticker = interval(scratch_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match publish_scratch_updates(&meeting, notifier.as_ref()).await {
                Ok(0) => {}
                Ok(n) => info!("Scratch monitor sent {} updates", n),
                Err(e) => error!("Scratch monitor failed: {:#}", e),
            }
        }
    });

    Ok(vec![daily, nightly, monitor])
}
