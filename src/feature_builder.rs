//! Feature builder for model input.
//!
//! Combines a horse, its jockey and trainer with the race context into the
//! 15 numeric features the classifier reads.

use rand::Rng;

use crate::pools::{Horse, Jockey, Trainer};
use crate::types::{EntryFeatures, Going};

/// Default values for missing data
struct Defaults;

impl Defaults {
    /// Course knowledge multiplier when the jockey has no record at the track
    const JOCKEY_COURSE_FACTOR: f64 = 0.8;
    /// Course specialty when the jockey has no record at the track
    const COURSE_SPECIALTY: f64 = 0.7;
    const GOING_MATCH: f64 = 0.8;
    const GOING_MISMATCH: f64 = 0.5;
    const MIN_DISTANCE_SUITABILITY: f64 = 0.1;
    /// Distance gap (metres) at which suitability bottoms out
    const DISTANCE_SCALE: f64 = 2000.0;
    /// Age at which the speed rating reaches zero
    const SPEED_AGE_SCALE: f64 = 20.0;
    /// Reference distance of the stamina index
    const STAMINA_DISTANCE: f64 = 2000.0;
}

/// Race context an entry is built for
#[derive(Debug, Clone, Copy)]
pub struct RaceContext<'a> {
    pub track: &'a str,
    pub distance: u32,
    pub going: Going,
}

/// Feature builder
pub struct FeatureBuilder;

impl FeatureBuilder {
    /// Build features for a runner. Per-race noise (weight, track record,
    /// layoff, sentiment, class drop) is drawn from `rng`.
    pub fn build<R: Rng + ?Sized>(
        rng: &mut R,
        race: RaceContext<'_>,
        horse: &Horse,
        jockey: &Jockey,
        trainer: &Trainer,
    ) -> EntryFeatures {
        let course_knowledge = jockey.course_knowledge.get(race.track).copied();

        EntryFeatures {
            horse_age: horse.age as f64,
            jockey_win_rate: jockey.win_rate
                * course_knowledge.unwrap_or(Defaults::JOCKEY_COURSE_FACTOR),
            trainer_win_rate: trainer.win_rate,
            weight: rng.gen_range(50..=65) as f64,
            distance_suitability: Self::distance_suitability(race.distance, horse.preferred_distance),
            track_record: rng.gen_range(0.4..0.95),
            going_preference: Self::going_preference(race.going, horse.preferred_going),
            days_since_last_run: rng.gen_range(14..=120) as f64,
            recent_form: horse.recent_form(),
            injury_risk: horse.injury_risk,
            news_sentiment: rng.gen_range(-0.3..0.7),
            course_specialty: course_knowledge.unwrap_or(Defaults::COURSE_SPECIALTY),
            class_drop: rng.gen_range(0.7..1.2),
            speed_rating: horse.base_speed * (1.0 - horse.age as f64 / Defaults::SPEED_AGE_SCALE),
            stamina_index: horse.stamina * (race.distance as f64 / Defaults::STAMINA_DISTANCE),
        }
    }

    /// 1 at the preferred distance, falling linearly with the gap, floored at 0.1
    fn distance_suitability(distance: u32, preferred: u32) -> f64 {
        let gap = (distance as f64 - preferred as f64).abs();
        (1.0 - gap / Defaults::DISTANCE_SCALE).max(Defaults::MIN_DISTANCE_SUITABILITY)
    }

    fn going_preference(going: Going, preferred: Going) -> f64 {
        if going == preferred {
            Defaults::GOING_MATCH
        } else {
            Defaults::GOING_MISMATCH
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::Specialty;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn horse() -> Horse {
        Horse {
            id: "H_1".to_string(),
            name: "Horse_1".to_string(),
            age: 4,
            base_speed: 0.9,
            stamina: 0.8,
            injury_risk: 0.1,
            preferred_going: Going::Soft,
            preferred_distance: 1600,
            last_races: vec![0.6, 0.7, 0.8],
        }
    }

    fn jockey() -> Jockey {
        let mut course_knowledge = HashMap::new();
        course_knowledge.insert("York".to_string(), 0.9);
        Jockey {
            id: "J_1".to_string(),
            name: "Jockey_1".to_string(),
            win_rate: 0.2,
            experience: 5,
            course_knowledge,
        }
    }

    fn trainer() -> Trainer {
        Trainer {
            id: "T_1".to_string(),
            name: "Trainer_1".to_string(),
            win_rate: 0.3,
            specialty: Specialty::Stayer,
            form: 0.8,
        }
    }

    #[test]
    fn test_distance_suitability() {
        assert!((FeatureBuilder::distance_suitability(1600, 1600) - 1.0).abs() < 1e-12);
        assert!((FeatureBuilder::distance_suitability(2000, 1000) - 0.5).abs() < 1e-12);
        // Floor at 0.1
        assert!((FeatureBuilder::distance_suitability(1000, 3000) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_going_preference() {
        assert_eq!(FeatureBuilder::going_preference(Going::Soft, Going::Soft), 0.8);
        assert_eq!(FeatureBuilder::going_preference(Going::Heavy, Going::Soft), 0.5);
    }

    #[test]
    fn test_build_derived_features() {
        let mut rng = StdRng::seed_from_u64(9);
        let race = RaceContext {
            track: "York",
            distance: 2000,
            going: Going::Soft,
        };
        let f = FeatureBuilder::build(&mut rng, race, &horse(), &jockey(), &trainer());

        assert_eq!(f.horse_age, 4.0);
        assert!((f.jockey_win_rate - 0.18).abs() < 1e-12);
        assert!((f.course_specialty - 0.9).abs() < 1e-12);
        assert!((f.trainer_win_rate - 0.3).abs() < 1e-12);
        assert!((f.distance_suitability - 0.8).abs() < 1e-12);
        assert_eq!(f.going_preference, 0.8);
        assert!((f.recent_form - 0.7).abs() < 1e-12);
        assert!((f.speed_rating - 0.9 * 0.8).abs() < 1e-12);
        assert!((f.stamina_index - 0.8).abs() < 1e-12);
        assert!((50.0..=65.0).contains(&f.weight));
        assert!((14.0..=120.0).contains(&f.days_since_last_run));
        assert!(f.news_sentiment >= -0.3 && f.news_sentiment < 0.7);
    }

    #[test]
    fn test_build_unknown_track_defaults() {
        let mut rng = StdRng::seed_from_u64(10);
        let race = RaceContext {
            track: "Chester",
            distance: 1600,
            going: Going::Firm,
        };
        let f = FeatureBuilder::build(&mut rng, race, &horse(), &jockey(), &trainer());

        assert!((f.jockey_win_rate - 0.2 * 0.8).abs() < 1e-12);
        assert!((f.course_specialty - 0.7).abs() < 1e-12);
        assert_eq!(f.going_preference, 0.5);
    }
}
