use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Local};
use clap::{Args, Parser, Subcommand};
use inquire::{Confirm, CustomType, Select, Text};
use weather_risk_core::{
    Config, DateSelection, Location, QueryCoordinator, RiskView, client_from_config, days_in_month,
    month_name,
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-risk", version, about = "Weather risk explorer")]
pub struct Cli {
    /// Log more (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Prediction service URL for this run, overriding the saved config.
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// A point picked on the map.
#[derive(Debug, Args)]
pub struct PlaceArgs {
    /// Latitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// Place name shown in the header.
    #[arg(long, default_value = "Selected location")]
    pub name: String,

    #[arg(long, default_value = "")]
    pub country: String,
}

impl PlaceArgs {
    fn into_location(self) -> Location {
        Location::new(self.lat, self.lon, self.name, self.country)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the prediction service endpoint and reference year.
    Configure,

    /// Show the risk profile for one place and date.
    Show {
        #[command(flatten)]
        place: PlaceArgs,

        /// Month, 1-12. Defaults to the current month.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,

        /// Day of month. Defaults to today.
        #[arg(long)]
        day: Option<u32>,
    },

    /// Pick dates interactively for one place and watch the profile change.
    Explore {
        #[command(flatten)]
        place: PlaceArgs,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;
        if let Some(endpoint) = self.endpoint {
            config = config.with_endpoint(endpoint);
        }
        tracing::debug!(endpoint = %config.endpoint, reference_year = config.reference_year, "configuration loaded");

        match self.command {
            Command::Configure => configure(config),
            Command::Show { place, month, day } => {
                let today = today();
                let date = DateSelection::new(
                    month.map_or(today.month_index, |m| m - 1),
                    day.unwrap_or(today.day),
                );
                show(&config, place.into_location(), date).await
            }
            Command::Explore { place } => explore(&config, place.into_location()).await,
        }
    }
}

/// Today's month and day, the picker's starting point.
fn today() -> DateSelection {
    let now = Local::now().date_naive();
    DateSelection::new(now.month0(), now.day())
}

fn configure(current: Config) -> anyhow::Result<()> {
    let endpoint = Text::new("Prediction service endpoint:")
        .with_default(&current.endpoint)
        .prompt()?;

    let reference_year = CustomType::<i32>::new("Reference year for the date picker:")
        .with_default(current.reference_year)
        .with_error_message("Please type a year, e.g. 2026")
        .prompt()?;

    let config = Config {
        endpoint: endpoint.trim().to_string(),
        reference_year,
    };
    config.validate()?;
    config.save()?;

    println!(
        "Saved configuration to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

fn coordinator(config: &Config) -> anyhow::Result<QueryCoordinator> {
    let client = client_from_config(config)?;
    Ok(QueryCoordinator::new(Arc::from(client), config.reference_year))
}

async fn show(config: &Config, location: Location, date: DateSelection) -> anyhow::Result<()> {
    let mut coordinator = coordinator(config)?;

    coordinator.select_date(date);
    coordinator.show_location(location.clone());

    let state = coordinator.settle().await;
    println!("{}", render::render(&location, date, &RiskView::from_state(&state)));

    Ok(())
}

async fn explore(config: &Config, location: Location) -> anyhow::Result<()> {
    let mut coordinator = coordinator(config)?;
    coordinator.select_location(location.clone());
    coordinator.select_date(today());

    loop {
        let months: Vec<&str> = (0..12).filter_map(month_name).collect();
        let current = coordinator.selection().date;

        let Some(month) = Select::new("Month:", months)
            .with_starting_cursor(current.month_index as usize)
            .prompt_skippable()?
        else {
            break;
        };
        let month_index = (0..12)
            .find(|m| month_name(*m) == Some(month))
            .context("Unknown month selected")?;

        let days: Vec<u32> = (1..=days_in_month(config.reference_year, month_index).unwrap_or(31)).collect();
        let cursor = current.day.clamp(1, days.len() as u32) as usize - 1;
        let Some(day) = Select::new("Day:", days).with_starting_cursor(cursor).prompt_skippable()? else {
            break;
        };

        let date = DateSelection::new(month_index, day);
        coordinator.select_date(date);
        coordinator.open_panel();

        let state = coordinator.settle().await;
        println!("{}", render::render(&location, date, &RiskView::from_state(&state)));

        if !Confirm::new("Pick another date?").with_default(true).prompt()? {
            break;
        }
    }

    coordinator.close_panel();
    Ok(())
}
