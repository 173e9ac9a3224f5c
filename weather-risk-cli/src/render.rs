//! Plain-text rendering of a [`RiskView`].

use std::fmt::Write;

use weather_risk_core::{DateSelection, Location, RiskBar, RiskView, month_name};

const BAR_CELLS: usize = 30;

pub fn render(location: &Location, date: DateSelection, view: &RiskView) -> String {
    let mut out = String::new();

    let when = month_name(date.month_index)
        .map(|m| format!("{m} {}", date.day))
        .unwrap_or_else(|| format!("month {} day {}", date.month_index + 1, date.day));

    let _ = writeln!(out, "{} ({})", location.display_name(), location.coordinates_label());
    let _ = writeln!(out, "{when}");
    let _ = writeln!(out, "{}", view.status_line());

    let _ = writeln!(out, "\nRisks");
    for bar in &view.headline {
        push_bar(&mut out, bar);
    }

    let _ = writeln!(out, "\nTemperature");
    for bar in &view.histogram {
        push_bar(&mut out, bar);
    }

    out
}

fn push_bar(out: &mut String, bar: &RiskBar) {
    let filled = ((bar.width_percent / 100.0) * BAR_CELLS as f64).round() as usize;
    let filled = filled.min(BAR_CELLS);

    let _ = writeln!(
        out,
        "  {:<11} {}{} {:>6}",
        bar.label,
        "#".repeat(filled),
        ".".repeat(BAR_CELLS - filled),
        bar.text
    );
}
