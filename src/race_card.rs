//! Race card generation and late scratchings.

use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::feature_builder::{FeatureBuilder, RaceContext};
use crate::pools::EntityPools;
use crate::types::{Entry, Going, Race, ScratchRecord, ScratchReason, Weather};

/// Race distances on the card (metres)
pub const RACE_DISTANCES: [u32; 6] = [1000, 1200, 1400, 1600, 2000, 2400];

/// Injury risk above which the scratch probability doubles
pub const HIGH_INJURY_RISK: f64 = 0.15;

/// Build the race id: `<track>_<YYYYMMDD>_<HHMM>`
pub fn race_id(track: &str, date: NaiveDate, time: &str) -> String {
    format!("{}_{}_{}", track, date.format("%Y%m%d"), time.replace(':', ""))
}

/// Generate one race: conditions, field and per-runner features.
///
/// Fails only when the pools cannot fill the minimum field.
pub fn generate_race<R: Rng + ?Sized>(
    rng: &mut R,
    pools: &EntityPools,
    config: &SimulationConfig,
    track: &str,
    date: NaiveDate,
    time: &str,
) -> Result<Race> {
    if pools.horses.len() < config.min_field {
        bail!(
            "Horse pool has {} horses, minimum field is {}",
            pools.horses.len(),
            config.min_field
        );
    }
    if pools.jockeys.is_empty() || pools.trainers.is_empty() {
        bail!("Jockey and trainer pools must not be empty");
    }

    let distance = *RACE_DISTANCES.choose(rng).unwrap_or(&1600);
    let going = *Going::ALL.choose(rng).unwrap_or(&Going::Good);
    let weather = *Weather::ALL.choose(rng).unwrap_or(&Weather::Sunny);

    let max_field = config.max_field.max(config.min_field).min(pools.horses.len());
    let field_size = rng.gen_range(config.min_field..=max_field);

    let context = RaceContext {
        track,
        distance,
        going,
    };

    let mut entries = Vec::with_capacity(field_size);
    for horse in pools.horses.choose_multiple(rng, field_size) {
        // Connections are drawn with replacement across the field
        let jockey = &pools.jockeys[rng.gen_range(0..pools.jockeys.len())];
        let trainer = &pools.trainers[rng.gen_range(0..pools.trainers.len())];

        entries.push(Entry {
            horse_id: horse.id.clone(),
            horse: horse.name.clone(),
            jockey: jockey.name.clone(),
            trainer: trainer.name.clone(),
            features: FeatureBuilder::build(rng, context, horse, jockey, trainer),
            is_scratched: false,
            scratch_reason: None,
        });
    }

    let race_id = race_id(track, date, time);
    debug!("Generated race {} with {} runners", race_id, entries.len());

    Ok(Race {
        race_id,
        track: track.to_string(),
        date,
        time: time.to_string(),
        distance,
        going,
        weather,
        entries,
        last_scratch_check: Utc::now(),
        scratch_updates: 0,
        predictions: None,
        result: None,
    })
}

/// Per-check withdrawal probability for one runner
pub fn scratch_probability(base: f64, injury_risk: f64) -> f64 {
    if injury_risk > HIGH_INJURY_RISK {
        base * 2.0
    } else {
        base
    }
}

/// Draw late scratchings for every runner still in the field.
///
/// Returns true iff at least one new scratch happened. A new scratch drops
/// the race's prediction table and result, which no longer match the field.
pub fn check_for_scratches<R: Rng + ?Sized>(
    rng: &mut R,
    race: &mut Race,
    base_probability: f64,
    log: &mut Vec<ScratchRecord>,
) -> bool {
    let now = Utc::now();
    let mut updated = false;

    for entry in race.entries.iter_mut() {
        if entry.is_scratched {
            continue;
        }

        let p = scratch_probability(base_probability, entry.features.injury_risk);
        if rng.gen::<f64>() < p {
            let reason = *ScratchReason::ALL
                .choose(rng)
                .unwrap_or(&ScratchReason::OwnerDecision);
            entry.is_scratched = true;
            entry.scratch_reason = Some(reason);

            info!(
                "Scratched {} from {}: {}",
                entry.horse,
                race.race_id,
                reason.name()
            );
            log.push(ScratchRecord {
                race_id: race.race_id.clone(),
                horse: entry.horse.clone(),
                reason,
                timestamp: now,
            });
            race.scratch_updates += 1;
            updated = true;
        }
    }

    race.last_scratch_check = now;
    if updated {
        race.predictions = None;
        race.result = None;
    }

    updated
}
