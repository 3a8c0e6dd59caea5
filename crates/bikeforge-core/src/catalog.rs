//! The canonical, ordered question catalog.
//!
//! Every catalog question offers a fixed list of options followed by an
//! implicit trailing "custom" option that lets the user describe their own
//! choice. Selecting it opens a bounded follow-up sub-dialogue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display text of the always-present escape option.
pub const CUSTOM_OPTION_TEXT: &str = "Custom (please specify)";
/// Wire value of the always-present escape option.
pub const CUSTOM_OPTION_VALUE: &str = "custom";
/// Wire tag the oracle uses for dynamically generated follow-up questions.
pub const CUSTOM_FOLLOWUP_TAG: &str = "custom_followup";

/// Identifier of a catalog question. Also names the matching attribute of a
/// [`crate::BikeSpecification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionId {
    BikeCategory,
    FrontBodywork,
    Windscreen,
    Headlight,
    Engine,
    Handlebar,
    Mirror,
    FuelTank,
    Seat,
    Exhaust,
    Wheels,
    Suspension,
    Fender,
    Color,
    FrameGeometry,
}

impl QuestionId {
    pub const ALL: [QuestionId; 15] = [
        QuestionId::BikeCategory,
        QuestionId::FrontBodywork,
        QuestionId::Windscreen,
        QuestionId::Headlight,
        QuestionId::Engine,
        QuestionId::Handlebar,
        QuestionId::Mirror,
        QuestionId::FuelTank,
        QuestionId::Seat,
        QuestionId::Exhaust,
        QuestionId::Wheels,
        QuestionId::Suspension,
        QuestionId::Fender,
        QuestionId::Color,
        QuestionId::FrameGeometry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionId::BikeCategory => "bike_category",
            QuestionId::FrontBodywork => "front_bodywork",
            QuestionId::Windscreen => "windscreen",
            QuestionId::Headlight => "headlight",
            QuestionId::Engine => "engine",
            QuestionId::Handlebar => "handlebar",
            QuestionId::Mirror => "mirror",
            QuestionId::FuelTank => "fuel_tank",
            QuestionId::Seat => "seat",
            QuestionId::Exhaust => "exhaust",
            QuestionId::Wheels => "wheels",
            QuestionId::Suspension => "suspension",
            QuestionId::Fender => "fender",
            QuestionId::Color => "color",
            QuestionId::FrameGeometry => "frame_geometry",
        }
    }

    /// "Title Case" label used when rendering the image prompt.
    pub fn label(&self) -> &'static str {
        match self {
            QuestionId::BikeCategory => "Bike Category",
            QuestionId::FrontBodywork => "Front Bodywork",
            QuestionId::Windscreen => "Windscreen",
            QuestionId::Headlight => "Headlight",
            QuestionId::Engine => "Engine",
            QuestionId::Handlebar => "Handlebar",
            QuestionId::Mirror => "Mirror",
            QuestionId::FuelTank => "Fuel Tank",
            QuestionId::Seat => "Seat",
            QuestionId::Exhaust => "Exhaust",
            QuestionId::Wheels => "Wheels",
            QuestionId::Suspension => "Suspension",
            QuestionId::Fender => "Fender",
            QuestionId::Color => "Color",
            QuestionId::FrameGeometry => "Frame Geometry",
        }
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        QuestionId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| format!("Unknown question id: {}", s))
    }
}

/// Kind of a question as tagged by the oracle.
///
/// Unknown tags are kept verbatim instead of failing the whole reply; the
/// driver only needs to recognise catalog questions and custom follow-ups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QuestionType {
    Catalog(QuestionId),
    CustomFollowup,
    Other(String),
}

impl QuestionType {
    pub fn is_custom_followup(&self) -> bool {
        matches!(self, QuestionType::CustomFollowup)
    }

    pub fn catalog_id(&self) -> Option<QuestionId> {
        match self {
            QuestionType::Catalog(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<String> for QuestionType {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case(CUSTOM_FOLLOWUP_TAG) {
            return QuestionType::CustomFollowup;
        }
        match value.parse::<QuestionId>() {
            Ok(id) => QuestionType::Catalog(id),
            Err(_) => QuestionType::Other(value),
        }
    }
}

impl From<QuestionType> for String {
    fn from(value: QuestionType) -> Self {
        match value {
            QuestionType::Catalog(id) => id.as_str().to_string(),
            QuestionType::CustomFollowup => CUSTOM_FOLLOWUP_TAG.to_string(),
            QuestionType::Other(tag) => tag,
        }
    }
}

/// A fixed option of a catalog question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogOption {
    pub text: &'static str,
    pub value: &'static str,
}

const fn opt(text: &'static str, value: &'static str) -> CatalogOption {
    CatalogOption { text, value }
}

/// Immutable definition of one catalog question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionDefinition {
    pub id: QuestionId,
    pub prompt: &'static str,
    pub options: &'static [CatalogOption],
}

impl QuestionDefinition {
    /// Fixed options followed by the trailing custom option.
    pub fn options_with_custom(&self) -> Vec<CatalogOption> {
        let mut options = self.options.to_vec();
        options.push(opt(CUSTOM_OPTION_TEXT, CUSTOM_OPTION_VALUE));
        options
    }

    /// 1-based number of the custom option when the options are listed.
    pub fn custom_option_number(&self) -> usize {
        self.options.len() + 1
    }
}

static QUESTIONS: [QuestionDefinition; 15] = [
    QuestionDefinition {
        id: QuestionId::BikeCategory,
        prompt: "What category best matches your dream bike?",
        options: &[
            opt("Fully-faired superbike (e.g., Suzuki Hayabusa)", "fully_faired_superbike"),
            opt("Adventure / Scrambler (e.g., Royal Enfield Himalayan)", "adventure_scrambler"),
            opt("Modern naked streetfighter (e.g., KTM Duke, Yamaha MT-15)", "modern_naked_streetfighter"),
            opt("Classic / Vintage (e.g., RX100, Royal Enfield Interceptor)", "classic_vintage"),
            opt("Street commuter (e.g., Pulsar 220)", "street_commuter"),
            opt("Track-inspired sport (e.g., Kawasaki Ninja ZX-10R)", "track_inspired_sport"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::FrontBodywork,
        prompt: "What kind of front bodywork or fairing do you want?",
        options: &[
            opt("Full fairing (covers most of the body)", "full_fairing"),
            opt("Half fairing (covers tank and headlight area only)", "half_fairing"),
            opt("No fairing - fully exposed", "no_fairing"),
            opt("Minimal shroud + tank cowl", "minimal_shroud"),
            opt("Rally/Scrambler plate with visor", "rally_plate_with_visor"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Windscreen,
        prompt: "What kind of windscreen or visor do you want?",
        options: &[
            opt("Tall touring screen", "tall_touring_screen"),
            opt("Short sport screen", "short_sport_screen"),
            opt("Naked flyscreen", "naked_flyscreen"),
            opt("Dual-layered visor", "dual_layered_visor"),
            opt("No windscreen", "no_windscreen"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Headlight,
        prompt: "Choose a headlight style:",
        options: &[
            opt("Round", "round"),
            opt("LED strip", "led_strip"),
            opt("Dual pod", "dual_pod"),
            opt("Sleek/hidden", "sleek_hidden"),
            opt("Rally-style with grill", "rally_style_with_grill"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Engine,
        prompt: "What kind of engine are you envisioning?",
        options: &[
            opt("Single cylinder", "single_cylinder"),
            opt("Twin cylinder", "twin_cylinder"),
            opt("Inline-4", "inline_4"),
            opt("V-Twin", "v_twin"),
            opt("Electric Motor", "electric_motor"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Handlebar,
        prompt: "What kind of handlebar do you prefer?",
        options: &[
            opt("Straight", "straight"),
            opt("Clip-on", "clip_on"),
            opt("Raised", "raised"),
            opt("Scrambler upright", "scrambler_upright"),
            opt("Café racer", "cafe_racer"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Mirror,
        prompt: "Choose your mirror style:",
        options: &[
            opt("Round", "round"),
            opt("Bar-end", "bar_end"),
            opt("Rectangular", "rectangular"),
            opt("Integrated in handlebars", "integrated_in_handlebars"),
            opt("Winged / aerodynamic", "winged_aerodynamic"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::FuelTank,
        prompt: "What shape should the fuel tank be?",
        options: &[
            opt("Teardrop", "teardrop"),
            opt("Bulged", "bulged"),
            opt("Boxy", "boxy"),
            opt("Sculpted with recess", "sculpted_with_recess"),
            opt("Engraved or painted", "engraved_or_painted"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Seat,
        prompt: "What kind of seat layout do you want?",
        options: &[
            opt("Single seat", "single_seat"),
            opt("Split seat", "split_seat"),
            opt("Flat scrambler seat", "flat_scrambler_seat"),
            opt("Low cruiser seat", "low_cruiser_seat"),
            opt("Long seat with backrest", "long_seat_with_backrest"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Exhaust,
        prompt: "Choose your exhaust style:",
        options: &[
            opt("Short stubby", "short_stubby"),
            opt("Long chrome pipe", "long_chrome_pipe"),
            opt("Upswept sport", "upswept_sport"),
            opt("Underbelly", "underbelly"),
            opt("Dual exhausts", "dual_exhausts"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Wheels,
        prompt: "What kind of wheels do you want?",
        options: &[
            opt("Cast alloy", "cast_alloy"),
            opt("Spoke", "spoke"),
            opt("Chrome alloy", "chrome_alloy"),
            opt("Knobby off-road", "knobby_off_road"),
            opt("Sporty 5-spoke", "sporty_5_spoke"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Suspension,
        prompt: "Pick the front suspension style:",
        options: &[
            opt("Telescopic", "telescopic"),
            opt("Upside-down forks (USD)", "upside_down_forks"),
            opt("Dual shocks", "dual_shocks"),
            opt("Long travel rally forks", "long_travel_rally_forks"),
            opt("Vintage springer", "vintage_springer"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Fender,
        prompt: "Select your fender setup:",
        options: &[
            opt("Full front & rear", "full_front_and_rear"),
            opt("Minimal front fender", "minimal_front_fender"),
            opt("Raised scrambler-style", "raised_scrambler_style"),
            opt("Flat cafe-style blade", "flat_cafe_style_blade"),
            opt("No fenders", "no_fenders"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::Color,
        prompt: "What is your preferred color theme?",
        options: &[
            opt("Matte Black", "matte_black"),
            opt("Chrome & Black", "chrome_and_black"),
            opt("Glossy Red", "glossy_red"),
            opt("Military Green", "military_green"),
            opt("Dual-tone (e.g., black-orange)", "dual_tone"),
        ],
    },
    QuestionDefinition {
        id: QuestionId::FrameGeometry,
        prompt: "Pick a frame geometry:",
        options: &[
            opt("Upright street", "upright_street"),
            opt("Low-slung cruiser", "low_slung_cruiser"),
            opt("High-clearance off-road", "high_clearance_off_road"),
            opt("Compact cafe racer", "compact_cafe_racer"),
            opt("Race-spec short tail", "race_spec_short_tail"),
        ],
    },
];

/// Static, ordered question sequence.
pub struct QuestionCatalog;

impl QuestionCatalog {
    /// Number of catalog questions; the base value of a session's total steps.
    pub fn len() -> usize {
        QUESTIONS.len()
    }

    /// Question at `step_index` (0-based). Indices past the end resolve to the
    /// last question so the lookup is total.
    pub fn get(step_index: usize) -> &'static QuestionDefinition {
        &QUESTIONS[step_index.min(QUESTIONS.len() - 1)]
    }

    pub fn definition(id: QuestionId) -> &'static QuestionDefinition {
        Self::get(Self::position(id))
    }

    /// 0-based position of a question in the sequence.
    pub fn position(id: QuestionId) -> usize {
        QUESTIONS
            .iter()
            .position(|q| q.id == id)
            .unwrap_or(QUESTIONS.len() - 1)
    }

    pub fn iter() -> impl Iterator<Item = &'static QuestionDefinition> {
        QUESTIONS.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_matches_ids() {
        assert_eq!(QuestionCatalog::len(), 15);
        for (idx, id) in QuestionId::ALL.iter().enumerate() {
            assert_eq!(QuestionCatalog::get(idx).id, *id);
            assert_eq!(QuestionCatalog::position(*id), idx);
        }
    }

    #[test]
    fn test_get_is_total() {
        assert_eq!(QuestionCatalog::get(999).id, QuestionId::FrameGeometry);
    }

    #[test]
    fn test_custom_option_is_last() {
        for question in QuestionCatalog::iter() {
            let options = question.options_with_custom();
            let last = options.last().unwrap();
            assert_eq!(last.value, CUSTOM_OPTION_VALUE);
            assert_eq!(options.len(), question.custom_option_number());
            assert!(question.options.iter().all(|o| o.value != CUSTOM_OPTION_VALUE));
        }
    }

    #[test]
    fn test_question_type_wire_format() {
        let parsed: QuestionType = serde_json::from_str("\"fuel_tank\"").unwrap();
        assert_eq!(parsed, QuestionType::Catalog(QuestionId::FuelTank));

        let followup: QuestionType = serde_json::from_str("\"custom_followup\"").unwrap();
        assert!(followup.is_custom_followup());

        let other: QuestionType = serde_json::from_str("\"brake_system\"").unwrap();
        assert_eq!(other, QuestionType::Other("brake_system".to_string()));
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"brake_system\"");
    }

    #[test]
    fn test_question_id_parse_is_case_insensitive() {
        assert_eq!("Color".parse::<QuestionId>().unwrap(), QuestionId::Color);
        assert!("sidecar".parse::<QuestionId>().is_err());
    }
}
