//! Render-ready rows derived from a [`QueryState`].

use serde::Serialize;

use crate::coordinator::QueryState;
use crate::normalize::{RiskProfile, RiskSlot};

const HEADLINE: [RiskSlot; 4] = [
    RiskSlot::VeryHot,
    RiskSlot::VeryCold,
    RiskSlot::Windy,
    RiskSlot::VeryWet,
];

const HISTOGRAM: [RiskSlot; 5] = [
    RiskSlot::VeryCold,
    RiskSlot::Cold,
    RiskSlot::Mild,
    RiskSlot::WarmOrHot,
    RiskSlot::VeryHot,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ViewStatus {
    Idle,
    Pending,
    Ready,
    Failed(String),
}

/// One labelled bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskBar {
    pub label: &'static str,
    pub text: String,
    /// 0..=100
    pub width_percent: f64,
}

impl RiskBar {
    fn new(profile: &RiskProfile, slot: RiskSlot) -> Self {
        let value = profile.get(slot);
        Self {
            label: slot.display_label(),
            text: value.to_string(),
            width_percent: value.bar_width(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskView {
    pub status: ViewStatus,
    /// Very hot, very cold, windy, very wet.
    pub headline: Vec<RiskBar>,
    /// Temperature buckets from coldest to hottest.
    pub histogram: Vec<RiskBar>,
}

impl RiskView {
    pub fn from_state(state: &QueryState) -> Self {
        let status = match state {
            QueryState::Idle => ViewStatus::Idle,
            QueryState::Pending { .. } => ViewStatus::Pending,
            QueryState::Ready { .. } => ViewStatus::Ready,
            QueryState::Failed { message, .. } => ViewStatus::Failed(message.clone()),
        };

        let profile = state.profile();

        Self {
            status,
            headline: HEADLINE.iter().map(|s| RiskBar::new(&profile, *s)).collect(),
            histogram: HISTOGRAM.iter().map(|s| RiskBar::new(&profile, *s)).collect(),
        }
    }

    pub fn status_line(&self) -> String {
        match &self.status {
            ViewStatus::Idle => "No location selected".to_string(),
            ViewStatus::Pending => "Loading risk profile...".to_string(),
            ViewStatus::Ready => "Risk profile ready".to_string(),
            ViewStatus::Failed(message) => format!("Failed: {message}"),
        }
    }
}
