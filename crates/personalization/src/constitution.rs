//! TCM body constitutions and the content preferences derived from them
//!
//! The lookup table is fixed: each constitution maps to the thermal natures
//! it benefits from, the effects that address it, and the meridians it
//! concentrates on. The candidate scorer adds a fixed bonus per aligned
//! property.

use serde::{Deserialize, Serialize};

use crate::types::{TcmNature, TcmProperties};

/// Bonus when the content nature is one the constitution prefers
pub const NATURE_MATCH_BONUS: f64 = 0.2;
/// Bonus when any content effect addresses the constitution
pub const EFFECT_MATCH_BONUS: f64 = 0.1;
/// Bonus when any content meridian is a focus meridian
pub const MERIDIAN_MATCH_BONUS: f64 = 0.05;

/// The nine constitution types of the standard TCM questionnaire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constitution {
    Balanced,
    QiDeficiency,
    YangDeficiency,
    YinDeficiency,
    PhlegmDampness,
    DampHeat,
    BloodStasis,
    QiStagnation,
    SpecialDiathesis,
}

/// Content preferences derived from a constitution
#[derive(Debug, Clone, Copy)]
pub struct ConstitutionPreferences {
    pub natures: &'static [TcmNature],
    pub effects: &'static [&'static str],
    pub meridians: &'static [&'static str],
}

impl Constitution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Constitution::Balanced => "balanced",
            Constitution::QiDeficiency => "qi_deficiency",
            Constitution::YangDeficiency => "yang_deficiency",
            Constitution::YinDeficiency => "yin_deficiency",
            Constitution::PhlegmDampness => "phlegm_dampness",
            Constitution::DampHeat => "damp_heat",
            Constitution::BloodStasis => "blood_stasis",
            Constitution::QiStagnation => "qi_stagnation",
            Constitution::SpecialDiathesis => "special_diathesis",
        }
    }

    /// Human-readable label used in recommendation reasons
    pub fn label(&self) -> &'static str {
        match self {
            Constitution::Balanced => "balanced",
            Constitution::QiDeficiency => "qi-deficient",
            Constitution::YangDeficiency => "yang-deficient",
            Constitution::YinDeficiency => "yin-deficient",
            Constitution::PhlegmDampness => "phlegm-damp",
            Constitution::DampHeat => "damp-heat",
            Constitution::BloodStasis => "blood-stasis",
            Constitution::QiStagnation => "qi-stagnant",
            Constitution::SpecialDiathesis => "sensitive",
        }
    }

    pub fn preferences(&self) -> ConstitutionPreferences {
        use TcmNature::*;

        match self {
            Constitution::Balanced => ConstitutionPreferences {
                natures: &[Neutral],
                effects: &["harmonize", "nourish"],
                meridians: &[],
            },
            Constitution::QiDeficiency => ConstitutionPreferences {
                natures: &[Warm, Neutral],
                effects: &["tonify qi", "strengthen spleen"],
                meridians: &["spleen", "lung"],
            },
            Constitution::YangDeficiency => ConstitutionPreferences {
                natures: &[Warm, Hot],
                effects: &["warm yang", "dispel cold", "tonify kidney"],
                meridians: &["kidney", "spleen"],
            },
            Constitution::YinDeficiency => ConstitutionPreferences {
                natures: &[Cool, Cold],
                effects: &["nourish yin", "moisten dryness", "clear heat"],
                meridians: &["kidney", "lung", "liver"],
            },
            Constitution::PhlegmDampness => ConstitutionPreferences {
                natures: &[Warm, Neutral],
                effects: &["resolve phlegm", "drain dampness", "strengthen spleen"],
                meridians: &["spleen", "stomach"],
            },
            Constitution::DampHeat => ConstitutionPreferences {
                natures: &[Cool, Cold],
                effects: &["clear heat", "drain dampness", "detoxify"],
                meridians: &["liver", "gallbladder", "stomach"],
            },
            Constitution::BloodStasis => ConstitutionPreferences {
                natures: &[Warm, Neutral],
                effects: &["invigorate blood", "move qi"],
                meridians: &["liver", "heart"],
            },
            Constitution::QiStagnation => ConstitutionPreferences {
                natures: &[Neutral, Warm],
                effects: &["move qi", "soothe liver", "calm spirit"],
                meridians: &["liver", "heart"],
            },
            Constitution::SpecialDiathesis => ConstitutionPreferences {
                natures: &[Neutral],
                effects: &["consolidate exterior", "tonify qi"],
                meridians: &["lung"],
            },
        }
    }
}

impl std::str::FromStr for Constitution {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "balanced" => Ok(Self::Balanced),
            "qi_deficiency" => Ok(Self::QiDeficiency),
            "yang_deficiency" => Ok(Self::YangDeficiency),
            "yin_deficiency" => Ok(Self::YinDeficiency),
            "phlegm_dampness" => Ok(Self::PhlegmDampness),
            "damp_heat" => Ok(Self::DampHeat),
            "blood_stasis" => Ok(Self::BloodStasis),
            "qi_stagnation" => Ok(Self::QiStagnation),
            "special_diathesis" => Ok(Self::SpecialDiathesis),
            other => Err(format!("unknown constitution '{other}'")),
        }
    }
}

/// Which TCM properties of a content item align with a constitution
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileMatch {
    pub nature: bool,
    pub effect: bool,
    pub meridian: bool,
}

impl ProfileMatch {
    pub fn evaluate(constitution: Constitution, tcm: &TcmProperties) -> Self {
        let prefs = constitution.preferences();

        let nature = tcm
            .nature
            .map(|n| prefs.natures.contains(&n))
            .unwrap_or(false);
        let effect = tcm
            .effects
            .iter()
            .any(|e| prefs.effects.iter().any(|p| p.eq_ignore_ascii_case(e.trim())));
        let meridian = tcm
            .meridians
            .iter()
            .any(|m| prefs.meridians.iter().any(|p| p.eq_ignore_ascii_case(m.trim())));

        Self {
            nature,
            effect,
            meridian,
        }
    }

    pub fn bonus(&self) -> f64 {
        let mut bonus = 0.0;
        if self.nature {
            bonus += NATURE_MATCH_BONUS;
        }
        if self.effect {
            bonus += EFFECT_MATCH_BONUS;
        }
        if self.meridian {
            bonus += MERIDIAN_MATCH_BONUS;
        }
        bonus
    }

    pub fn any(&self) -> bool {
        self.nature || self.effect || self.meridian
    }
}
