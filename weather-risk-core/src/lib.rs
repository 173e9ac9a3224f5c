//! Core library for the weather risk explorer.
//!
//! This crate defines:
//! - The location/date key that identifies a risk query
//! - The prediction client abstraction and its HTTP implementation
//! - The query coordinator that keeps only the latest answer
//! - Normalization of raw scores into a fixed risk profile
//! - Render-ready view state and on-disk configuration
//!
//! It is used by `weather-risk-cli`, but the coordinator can be driven by any
//! front end that reports location and date selections.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod key;
pub mod model;
pub mod normalize;
pub mod view;

pub use client::{HttpPredictionClient, PredictionClient, client_from_config};
pub use config::Config;
pub use coordinator::{Generation, QueryCoordinator, QueryOutcome, QueryState, Selection};
pub use error::{FailureKind, PredictionError};
pub use key::{DateSelection, KeyError, LocationDateKey, days_in_month, month_name};
pub use model::{Location, RawPredictionResponse};
pub use normalize::{RiskProfile, RiskSlot, RiskValue, SENTINEL, normalize};
pub use view::{RiskBar, RiskView, ViewStatus};
