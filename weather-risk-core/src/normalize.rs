//! Turns whatever the scoring service sent into a complete [`RiskProfile`].
//!
//! Rules:
//! - a label missing from its group becomes [`SENTINEL`], so a bar stays visible;
//! - a headline category (very hot, very cold, windy, very wet) scored exactly 0
//!   also becomes [`SENTINEL`]; histogram buckets keep a genuine 0;
//! - a value that is not a number is [`RiskValue::Unresolved`];
//! - numbers are passed through unchanged, no clamping.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::model::{CategoryGroup, RawPredictionResponse};

/// Stand-in for "present but negligible".
pub const SENTINEL: f64 = 0.1;

/// Text shown for a slot without a number.
pub const UNRESOLVED_MARKER: &str = "--";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RiskValue {
    Percent(f64),
    Unresolved,
}

impl RiskValue {
    pub fn percent(self) -> Option<f64> {
        match self {
            RiskValue::Percent(value) => Some(value),
            RiskValue::Unresolved => None,
        }
    }

    pub fn is_unresolved(self) -> bool {
        matches!(self, RiskValue::Unresolved)
    }

    /// Width of the drawn bar, 0..=100. Unresolved slots draw nothing.
    pub fn bar_width(self) -> f64 {
        self.percent().map_or(0.0, |value| value.clamp(0.0, 100.0))
    }
}

impl fmt::Display for RiskValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskValue::Percent(value) => write!(f, "{value:.1}%"),
            RiskValue::Unresolved => f.write_str(UNRESOLVED_MARKER),
        }
    }
}

/// The seven slots of a [`RiskProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskSlot {
    VeryHot,
    VeryCold,
    Cold,
    Mild,
    WarmOrHot,
    Windy,
    VeryWet,
}

impl RiskSlot {
    pub const fn all() -> &'static [RiskSlot] {
        &[
            RiskSlot::VeryHot,
            RiskSlot::VeryCold,
            RiskSlot::Cold,
            RiskSlot::Mild,
            RiskSlot::WarmOrHot,
            RiskSlot::Windy,
            RiskSlot::VeryWet,
        ]
    }

    pub fn group(&self) -> CategoryGroup {
        match self {
            RiskSlot::VeryHot
            | RiskSlot::VeryCold
            | RiskSlot::Cold
            | RiskSlot::Mild
            | RiskSlot::WarmOrHot => CategoryGroup::Temperature,
            RiskSlot::Windy => CategoryGroup::Wind,
            RiskSlot::VeryWet => CategoryGroup::Precipitation,
        }
    }

    /// Label the scoring service uses for this slot.
    pub fn wire_label(&self) -> &'static str {
        match self {
            RiskSlot::VeryHot => "Very Hot",
            RiskSlot::VeryCold => "Very Cold",
            RiskSlot::Cold => "Cold",
            RiskSlot::Mild => "Mild",
            RiskSlot::WarmOrHot => "Warm / Hot",
            RiskSlot::Windy => "Windy",
            RiskSlot::VeryWet => "Heavy",
        }
    }

    pub fn display_label(&self) -> &'static str {
        match self {
            RiskSlot::VeryWet => "Very Wet",
            other => other.wire_label(),
        }
    }

    pub fn is_headline(&self) -> bool {
        matches!(
            self,
            RiskSlot::VeryHot | RiskSlot::VeryCold | RiskSlot::Windy | RiskSlot::VeryWet
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskProfile {
    pub very_hot: RiskValue,
    pub very_cold: RiskValue,
    pub cold: RiskValue,
    pub mild: RiskValue,
    pub warm_or_hot: RiskValue,
    pub windy: RiskValue,
    pub very_wet: RiskValue,
}

impl RiskProfile {
    /// Every slot unresolved: what the UI shows while waiting or after a failure.
    pub const fn unresolved() -> Self {
        Self {
            very_hot: RiskValue::Unresolved,
            very_cold: RiskValue::Unresolved,
            cold: RiskValue::Unresolved,
            mild: RiskValue::Unresolved,
            warm_or_hot: RiskValue::Unresolved,
            windy: RiskValue::Unresolved,
            very_wet: RiskValue::Unresolved,
        }
    }

    pub fn get(&self, slot: RiskSlot) -> RiskValue {
        match slot {
            RiskSlot::VeryHot => self.very_hot,
            RiskSlot::VeryCold => self.very_cold,
            RiskSlot::Cold => self.cold,
            RiskSlot::Mild => self.mild,
            RiskSlot::WarmOrHot => self.warm_or_hot,
            RiskSlot::Windy => self.windy,
            RiskSlot::VeryWet => self.very_wet,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (RiskSlot, RiskValue)> + '_ {
        RiskSlot::all().iter().map(move |slot| (*slot, self.get(*slot)))
    }

    pub fn is_fully_unresolved(&self) -> bool {
        self.iter().all(|(_, value)| value.is_unresolved())
    }
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self::unresolved()
    }
}

/// Build the profile for one response. All slots come from `raw`; nothing
/// carries over from an earlier response.
pub fn normalize(raw: &RawPredictionResponse) -> RiskProfile {
    report_unmapped_labels(raw);

    RiskProfile {
        very_hot: resolve_slot(raw, RiskSlot::VeryHot),
        very_cold: resolve_slot(raw, RiskSlot::VeryCold),
        cold: resolve_slot(raw, RiskSlot::Cold),
        mild: resolve_slot(raw, RiskSlot::Mild),
        warm_or_hot: resolve_slot(raw, RiskSlot::WarmOrHot),
        windy: resolve_slot(raw, RiskSlot::Windy),
        very_wet: resolve_slot(raw, RiskSlot::VeryWet),
    }
}

fn resolve_slot(raw: &RawPredictionResponse, slot: RiskSlot) -> RiskValue {
    let Some(value) = raw.score(slot.group(), slot.wire_label()) else {
        return RiskValue::Percent(SENTINEL);
    };

    match parse_score(value) {
        None => RiskValue::Unresolved,
        Some(score) if score == 0.0 && slot.is_headline() => RiskValue::Percent(SENTINEL),
        Some(score) => RiskValue::Percent(score),
    }
}

/// JSON numbers and numeric strings; anything else (or a non-finite result) is `None`.
fn parse_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    score.is_finite().then_some(score)
}

fn report_unmapped_labels(raw: &RawPredictionResponse) {
    for group in CategoryGroup::all() {
        let Some(scores) = raw.group(*group) else {
            continue;
        };

        for label in scores.keys() {
            let known = RiskSlot::all()
                .iter()
                .any(|slot| slot.group() == *group && slot.wire_label() == label.as_str());

            if !known {
                tracing::debug!(group = group.as_str(), label = %label, "ignoring unmapped risk label");
            }
        }
    }
}
