use crate::catalog::QuestionId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Minimum length (trimmed, in characters) of an accepted custom value.
pub const MIN_CUSTOM_VALUE_CHARS: usize = 3;
/// Maximum length (trimmed, in characters) of an accepted custom value.
pub const MAX_CUSTOM_VALUE_CHARS: usize = 500;
/// Maximum length of a custom field name.
pub const MAX_CUSTOM_FIELD_NAME_CHARS: usize = 100;

/// The finalized structured description of a user's bike.
///
/// One optional attribute per catalog question plus an open map of free-text
/// custom fields. `custom_fields` is a `BTreeMap` so every consumer (prompt
/// composition in particular) sees the fields in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BikeSpecification {
    #[serde(default)]
    pub bike_category: Option<String>,
    #[serde(default)]
    pub front_bodywork: Option<String>,
    #[serde(default)]
    pub windscreen: Option<String>,
    #[serde(default)]
    pub headlight: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub handlebar: Option<String>,
    #[serde(default)]
    pub mirror: Option<String>,
    #[serde(default)]
    pub fuel_tank: Option<String>,
    #[serde(default)]
    pub seat: Option<String>,
    #[serde(default)]
    pub exhaust: Option<String>,
    #[serde(default)]
    pub wheels: Option<String>,
    #[serde(default)]
    pub suspension: Option<String>,
    #[serde(default)]
    pub fender: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub frame_geometry: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub custom_fields: BTreeMap<String, String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl BikeSpecification {
    pub fn field(&self, id: QuestionId) -> Option<&str> {
        self.slot(id).as_deref()
    }

    pub fn set_field(&mut self, id: QuestionId, value: impl Into<String>) {
        *self.slot_mut(id) = Some(value.into());
    }

    fn slot(&self, id: QuestionId) -> &Option<String> {
        match id {
            QuestionId::BikeCategory => &self.bike_category,
            QuestionId::FrontBodywork => &self.front_bodywork,
            QuestionId::Windscreen => &self.windscreen,
            QuestionId::Headlight => &self.headlight,
            QuestionId::Engine => &self.engine,
            QuestionId::Handlebar => &self.handlebar,
            QuestionId::Mirror => &self.mirror,
            QuestionId::FuelTank => &self.fuel_tank,
            QuestionId::Seat => &self.seat,
            QuestionId::Exhaust => &self.exhaust,
            QuestionId::Wheels => &self.wheels,
            QuestionId::Suspension => &self.suspension,
            QuestionId::Fender => &self.fender,
            QuestionId::Color => &self.color,
            QuestionId::FrameGeometry => &self.frame_geometry,
        }
    }

    fn slot_mut(&mut self, id: QuestionId) -> &mut Option<String> {
        match id {
            QuestionId::BikeCategory => &mut self.bike_category,
            QuestionId::FrontBodywork => &mut self.front_bodywork,
            QuestionId::Windscreen => &mut self.windscreen,
            QuestionId::Headlight => &mut self.headlight,
            QuestionId::Engine => &mut self.engine,
            QuestionId::Handlebar => &mut self.handlebar,
            QuestionId::Mirror => &mut self.mirror,
            QuestionId::FuelTank => &mut self.fuel_tank,
            QuestionId::Seat => &mut self.seat,
            QuestionId::Exhaust => &mut self.exhaust,
            QuestionId::Wheels => &mut self.wheels,
            QuestionId::Suspension => &mut self.suspension,
            QuestionId::Fender => &mut self.fender,
            QuestionId::Color => &mut self.color,
            QuestionId::FrameGeometry => &mut self.frame_geometry,
        }
    }

    /// Populated (non-blank) catalog fields, in catalog order.
    pub fn populated_fields(&self) -> Vec<(QuestionId, &str)> {
        QuestionId::ALL
            .iter()
            .filter_map(|id| {
                self.field(*id)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (*id, v))
            })
            .collect()
    }

    /// Adds a custom field if both name and value respect the length bounds.
    pub fn add_custom_field(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        let value = value.into();
        if !custom_field_name_in_bounds(&name) || !custom_value_in_bounds(&value) {
            return false;
        }
        self.custom_fields.insert(name, value);
        true
    }

    pub fn has_custom_fields(&self) -> bool {
        !self.custom_fields.is_empty()
    }

    /// Total number of populated fields, predefined and custom.
    pub fn total_fields_count(&self) -> usize {
        self.populated_fields().len() + self.custom_fields.len()
    }
}

/// Syntactic bound on a custom value: `[3, 500]` characters after trimming.
pub fn custom_value_in_bounds(value: &str) -> bool {
    let len = value.trim().chars().count();
    (MIN_CUSTOM_VALUE_CHARS..=MAX_CUSTOM_VALUE_CHARS).contains(&len)
}

pub fn custom_field_name_in_bounds(name: &str) -> bool {
    let len = name.trim().chars().count();
    len > 0 && len <= MAX_CUSTOM_FIELD_NAME_CHARS
}
