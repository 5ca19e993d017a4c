use rand::Rng;
use serde::{Deserialize, Serialize};

// Low energy: music to boost energy and motivation
const LOW_ENERGY_TAGS: &[&str] = &["upbeat", "electro", "motivation", "energetic", "dance"];
// Deep focus: music to help concentration and block distractions
const DEEP_FOCUS_TAGS: &[&str] = &["alphawaves", "instrumental", "focus"];
// High stress: music to lower heart rate and calm down
const HIGH_STRESS_TAGS: &[&str] = &["chillout", "relax", "calm"];

const _: () = assert!(!LOW_ENERGY_TAGS.is_empty());
const _: () = assert!(!DEEP_FOCUS_TAGS.is_empty());
const _: () = assert!(!HIGH_STRESS_TAGS.is_empty());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodCategory {
    LowEnergy,
    DeepFocus,
    HighStress,
}

impl MoodCategory {
    pub const ALL: [MoodCategory; 3] = [
        MoodCategory::LowEnergy,
        MoodCategory::DeepFocus,
        MoodCategory::HighStress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MoodCategory::LowEnergy => "low_energy",
            MoodCategory::DeepFocus => "deep_focus",
            MoodCategory::HighStress => "high_stress",
        }
    }

    /// Descriptive tags the music lookup searches by. Never empty.
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            MoodCategory::LowEnergy => LOW_ENERGY_TAGS,
            MoodCategory::DeepFocus => DEEP_FOCUS_TAGS,
            MoodCategory::HighStress => HIGH_STRESS_TAGS,
        }
    }

    pub fn pick_tag<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        let tags = self.tags();
        tags[rng.gen_range(0..tags.len())]
    }

    /// Map averaged readings to a category. Stress wins over everything,
    /// anything not clearly focused or low falls back to deep focus.
    pub fn classify(avg_heart_rate: f64, avg_blinks: f64, thresholds: &MoodThresholds) -> Self {
        let t = thresholds;
        if avg_heart_rate > t.stress_heart_rate || avg_blinks > t.stress_blinks {
            MoodCategory::HighStress
        } else if (t.focus_blinks_min..=t.focus_blinks_max).contains(&avg_blinks)
            && (t.focus_heart_rate_min..=t.focus_heart_rate_max).contains(&avg_heart_rate)
        {
            MoodCategory::DeepFocus
        } else if avg_heart_rate < t.low_heart_rate && avg_blinks < t.low_blinks {
            MoodCategory::LowEnergy
        } else {
            MoodCategory::DeepFocus
        }
    }
}

impl std::fmt::Display for MoodCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification boundaries, in bpm for heart rate and blinks per minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MoodThresholds {
    pub stress_heart_rate: f64,
    pub stress_blinks: f64,
    pub focus_heart_rate_min: f64,
    pub focus_heart_rate_max: f64,
    pub focus_blinks_min: f64,
    pub focus_blinks_max: f64,
    pub low_heart_rate: f64,
    pub low_blinks: f64,
}

impl Default for MoodThresholds {
    fn default() -> Self {
        Self {
            stress_heart_rate: 95.0,
            stress_blinks: 20.0,
            focus_heart_rate_min: 50.0,
            focus_heart_rate_max: 95.0,
            focus_blinks_min: 12.0,
            focus_blinks_max: 20.0,
            low_heart_rate: 50.0,
            low_blinks: 12.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn classify(hr: f64, blinks: f64) -> MoodCategory {
        MoodCategory::classify(hr, blinks, &MoodThresholds::default())
    }

    #[test]
    fn classification_table() {
        assert_eq!(classify(100.0, 5.0), MoodCategory::HighStress);
        assert_eq!(classify(70.0, 15.0), MoodCategory::DeepFocus);
        assert_eq!(classify(40.0, 5.0), MoodCategory::LowEnergy);
        assert_eq!(classify(70.0, 5.0), MoodCategory::DeepFocus);
    }

    #[test]
    fn boundaries() {
        assert_eq!(classify(95.0, 20.0), MoodCategory::DeepFocus);
        assert_eq!(classify(95.1, 15.0), MoodCategory::HighStress);
        assert_eq!(classify(70.0, 20.5), MoodCategory::HighStress);
        assert_eq!(classify(50.0, 12.0), MoodCategory::DeepFocus);
        assert_eq!(classify(49.9, 11.9), MoodCategory::LowEnergy);
        // No readings yet: both averages zero
        assert_eq!(classify(0.0, 0.0), MoodCategory::LowEnergy);
    }

    #[test]
    fn picked_tags_belong_to_category() {
        let mut rng = StdRng::seed_from_u64(7);
        for category in MoodCategory::ALL {
            for _ in 0..20 {
                let tag = category.pick_tag(&mut rng);
                assert!(category.tags().contains(&tag));
            }
        }
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MoodCategory::HighStress).unwrap(),
            "\"high_stress\""
        );
        assert_eq!(MoodCategory::LowEnergy.to_string(), "low_energy");
    }
}
