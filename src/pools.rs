//! Horse, jockey and trainer pools.
//!
//! Every entity's attributes are sampled once at startup and reused across
//! all generated races.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SimulationConfig;
use crate::types::Going;

/// Distances a horse can prefer (metres)
pub const PREFERRED_DISTANCES: [u32; 5] = [1000, 1200, 1600, 2000, 2400];

/// Number of past performance scalars kept per horse
pub const FORM_WINDOW: usize = 3;

/// Trainer specialty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Specialty {
    Sprinter,
    Stayer,
    #[serde(rename = "All-Rounder")]
    AllRounder,
}

impl Specialty {
    pub const ALL: [Specialty; 3] = [Specialty::Sprinter, Specialty::Stayer, Specialty::AllRounder];
}

/// Horse profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Horse {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub base_speed: f64,
    pub stamina: f64,
    pub injury_risk: f64,
    pub preferred_going: Going,
    pub preferred_distance: u32,
    pub last_races: Vec<f64>,
}

impl Horse {
    /// Mean of the last races' performance scalars
    pub fn recent_form(&self) -> f64 {
        if self.last_races.is_empty() {
            return 0.0;
        }
        self.last_races.iter().sum::<f64>() / self.last_races.len() as f64
    }
}

/// Jockey profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jockey {
    pub id: String,
    pub name: String,
    pub win_rate: f64,
    pub experience: u32,
    /// Track name -> familiarity
    pub course_knowledge: HashMap<String, f64>,
}

/// Trainer profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trainer {
    pub id: String,
    pub name: String,
    pub win_rate: f64,
    pub specialty: Specialty,
    pub form: f64,
}

/// An entity that can be sampled into a pool.
pub trait PoolEntity: Sized {
    /// Build entity number `index` (1-based)
    fn generate<R: Rng + ?Sized>(index: usize, rng: &mut R, tracks: &[String]) -> Self;
}

impl PoolEntity for Horse {
    fn generate<R: Rng + ?Sized>(index: usize, rng: &mut R, _tracks: &[String]) -> Self {
        Self {
            id: format!("H_{}", index),
            name: format!("Horse_{}", index),
            age: rng.gen_range(3..=8),
            base_speed: rng.gen_range(0.7..1.0),
            stamina: rng.gen_range(0.5..0.95),
            injury_risk: rng.gen_range(0.01..0.25),
            preferred_going: *Going::PREFERRED.choose(rng).unwrap_or(&Going::Good),
            preferred_distance: *PREFERRED_DISTANCES.choose(rng).unwrap_or(&1600),
            last_races: (0..FORM_WINDOW).map(|_| rng.gen_range(0.3..1.0)).collect(),
        }
    }
}

impl PoolEntity for Jockey {
    fn generate<R: Rng + ?Sized>(index: usize, rng: &mut R, tracks: &[String]) -> Self {
        Self {
            id: format!("J_{}", index),
            name: format!("Jockey_{}", index),
            win_rate: rng.gen_range(0.1..0.4),
            experience: rng.gen_range(1..=15),
            course_knowledge: tracks
                .iter()
                .map(|t| (t.clone(), rng.gen_range(0.5..1.0)))
                .collect(),
        }
    }
}

impl PoolEntity for Trainer {
    fn generate<R: Rng + ?Sized>(index: usize, rng: &mut R, _tracks: &[String]) -> Self {
        Self {
            id: format!("T_{}", index),
            name: format!("Trainer_{}", index),
            win_rate: rng.gen_range(0.15..0.45),
            specialty: *Specialty::ALL.choose(rng).unwrap_or(&Specialty::AllRounder),
            form: rng.gen_range(0.6..0.95),
        }
    }
}

/// Generate `size` independent entities numbered from 1.
pub fn generate_pool<T: PoolEntity, R: Rng + ?Sized>(
    size: usize,
    rng: &mut R,
    tracks: &[String],
) -> Vec<T> {
    (1..=size).map(|i| T::generate(i, rng, tracks)).collect()
}

/// All pools used by the race generator
#[derive(Debug, Clone)]
pub struct EntityPools {
    pub horses: Vec<Horse>,
    pub jockeys: Vec<Jockey>,
    pub trainers: Vec<Trainer>,
}

impl EntityPools {
    /// Sample the horse, jockey and trainer pools in that order
    pub fn generate<R: Rng + ?Sized>(config: &SimulationConfig, rng: &mut R) -> Self {
        let horses = generate_pool(config.horse_pool_size, rng, &config.tracks);
        let jockeys = generate_pool(config.jockey_pool_size, rng, &config.tracks);
        let trainers = generate_pool(config.trainer_pool_size, rng, &config.tracks);
        Self {
            horses,
            jockeys,
            trainers,
        }
    }
}
