use serde::Serialize;
use telemetry_client::domain::Reading;

use crate::summary::estimate_energy_kwh;

/// Cost projection over several horizons for one resolved range.
#[derive(Debug, Clone, Serialize)]
pub struct CostProjection {
    pub currency_symbol: String,
    pub base_tariff: f64,
    pub estimated_energy_kwh: f64,
    pub hourly: f64,
    pub daily: f64,
    pub monthly: f64,
    pub yearly: f64,
}

/// Project the range's estimated energy into cost. The hourly figure
/// is the projected total divided by sample count, not a true
/// per-hour rate; that simplification is intentional and kept.
pub fn project_cost(readings: &[Reading], base_tariff: f64, currency_symbol: &str) -> CostProjection {
    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by_key(|r| r.captured_at);

    let energy = estimate_energy_kwh(&sorted);
    let daily = energy * base_tariff;

    CostProjection {
        currency_symbol: currency_symbol.to_string(),
        base_tariff,
        estimated_energy_kwh: energy,
        hourly: energy * base_tariff / readings.len().max(1) as f64,
        daily,
        monthly: daily * 30.0,
        yearly: daily * 365.0,
    }
}
