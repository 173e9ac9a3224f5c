use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::key::LocationDateKey;

/// A place picked on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub country: String,
}

impl Location {
    pub fn new(
        latitude: f64,
        longitude: f64,
        name: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            name: name.into(),
            country: country.into(),
        }
    }

    /// "Name, Country", or just the name when the country is unknown.
    pub fn display_name(&self) -> String {
        if self.country.is_empty() {
            self.name.clone()
        } else {
            format!("{}, {}", self.name, self.country)
        }
    }

    pub fn coordinates_label(&self) -> String {
        format!("{:.2}°, {:.2}°", self.latitude, self.longitude)
    }
}

/// Body of the outbound POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRequest {
    pub lat: f64,
    pub lon: f64,
    pub date_str: String,
}

impl From<&LocationDateKey> for PredictionRequest {
    fn from(key: &LocationDateKey) -> Self {
        Self {
            lat: key.latitude(),
            lon: key.longitude(),
            date_str: key.date_stamp().to_string(),
        }
    }
}

/// Label → score for one category group. Scores are kept as raw JSON because
/// the service may send `null` or other non-numeric values.
pub type CategoryScores = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryGroup {
    Temperature,
    Wind,
    Precipitation,
}

impl CategoryGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryGroup::Temperature => "temperature",
            CategoryGroup::Wind => "wind",
            CategoryGroup::Precipitation => "precipitation",
        }
    }

    pub const fn all() -> &'static [CategoryGroup] {
        &[
            CategoryGroup::Temperature,
            CategoryGroup::Wind,
            CategoryGroup::Precipitation,
        ]
    }
}

/// Response envelope from the scoring service. Every group is optional and
/// may hold any subset of labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPredictionResponse {
    #[serde(default)]
    pub temperature: Option<CategoryScores>,
    #[serde(default)]
    pub wind: Option<CategoryScores>,
    #[serde(default)]
    pub precipitation: Option<CategoryScores>,
}

impl RawPredictionResponse {
    pub fn group(&self, group: CategoryGroup) -> Option<&CategoryScores> {
        match group {
            CategoryGroup::Temperature => self.temperature.as_ref(),
            CategoryGroup::Wind => self.wind.as_ref(),
            CategoryGroup::Precipitation => self.precipitation.as_ref(),
        }
    }

    /// Raw value for `label` in `group`, if the service sent one.
    pub fn score(&self, group: CategoryGroup, label: &str) -> Option<&Value> {
        self.group(group).and_then(|scores| scores.get(label))
    }
}
