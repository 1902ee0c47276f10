use chrono_tz::Tz;
use serde::Serialize;
use telemetry_client::domain::Reading;

use crate::bucketize::bucketize;
use crate::range::local_hour;

pub const NO_TELEMETRY_INSIGHT: &str = "No telemetry available for the selected period.";

/// Share of consumption per time-of-day band, as percentages of the
/// three bands' total.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnergySplit {
    pub peak_pct: f64,
    pub off_peak_pct: f64,
    pub shoulder_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoltagePoint {
    pub timestamp: i64,
    pub avg_voltage: Option<f64>,
}

/// Range-wide aggregate. Recomputed per request, never cached.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub reading_count: usize,
    pub avg_voltage: Option<f64>,
    pub peak_voltage: Option<f64>,
    pub min_voltage: Option<f64>,
    pub avg_current: Option<f64>,
    pub rms_current: Option<f64>,
    pub avg_real_power_kw: Option<f64>,
    pub peak_real_power_kw: Option<f64>,
    pub avg_power_factor: Option<f64>,
    pub avg_frequency: Option<f64>,
    pub total_energy_kwh: f64,
    pub load_factor: Option<f64>,
    pub energy_split: EnergySplit,
    pub renewable_share_pct: f64,
    pub efficiency_score: i64,
    pub insights: Vec<String>,
    pub voltage_series: Vec<VoltagePoint>,
}

impl Summary {
    fn empty() -> Self {
        Self {
            reading_count: 0,
            avg_voltage: None,
            peak_voltage: None,
            min_voltage: None,
            avg_current: None,
            rms_current: None,
            avg_real_power_kw: None,
            peak_real_power_kw: None,
            avg_power_factor: None,
            avg_frequency: None,
            total_energy_kwh: 0.0,
            load_factor: None,
            energy_split: EnergySplit::default(),
            renewable_share_pct: 0.0,
            efficiency_score: 0,
            insights: vec![NO_TELEMETRY_INSIGHT.to_string()],
            voltage_series: Vec::new(),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn collect<F: Fn(&Reading) -> Option<f64>>(readings: &[&Reading], f: F) -> Vec<f64> {
    readings.iter().filter_map(|r| f(r)).collect()
}

/// Energy over a reading set, first applicable strategy wins:
///
/// 1. Cumulative: with at least two `total_energy_kwh` samples, take
///    max - min across the window. A meter counter reset inside the
///    window understates consumption; that behavior is kept.
/// 2. Trapezoidal: integrate real power over consecutive pairs where
///    both sides carry it.
///
/// Expects readings sorted by capture time.
pub fn estimate_energy_kwh(sorted: &[&Reading]) -> f64 {
    let totals: Vec<f64> = sorted.iter().filter_map(|r| r.total_energy_kwh).collect();
    if totals.len() >= 2 {
        let max = totals.iter().cloned().fold(f64::MIN, f64::max);
        let min = totals.iter().cloned().fold(f64::MAX, f64::min);
        return max - min;
    }

    let mut energy = 0.0;
    for pair in sorted.windows(2) {
        if let (Some(p0), Some(p1)) = (pair[0].real_power_kw, pair[1].real_power_kw) {
            let delta_hours = (pair[1].captured_at - pair[0].captured_at) as f64 / 3600.0;
            energy += (p0 + p1) / 2.0 * delta_hours;
        }
    }
    energy
}

/// Walk consecutive cumulative-energy deltas, classifying each by the
/// local hour of the later reading. Negative deltas (counter resets)
/// are skipped.
fn split_energy_by_hour(sorted: &[&Reading], tz: Tz) -> (EnergySplit, f64) {
    let mut peak = 0.0;
    let mut off_peak = 0.0;
    let mut shoulder = 0.0;
    let mut renewable = 0.0;

    for pair in sorted.windows(2) {
        let (Some(prev), Some(cur)) = (pair[0].total_energy_kwh, pair[1].total_energy_kwh) else {
            continue;
        };
        let delta = cur - prev;
        if delta < 0.0 {
            continue;
        }

        let hour = local_hour(pair[1].captured_at, tz);
        match hour {
            17..=21 => peak += delta,
            0..=5 => off_peak += delta,
            _ => shoulder += delta,
        }
        if (10..16).contains(&hour) {
            renewable += delta;
        }
    }

    let band_total = peak + off_peak + shoulder;
    let split = if band_total > 0.0 {
        EnergySplit {
            peak_pct: peak / band_total * 100.0,
            off_peak_pct: off_peak / band_total * 100.0,
            shoulder_pct: shoulder / band_total * 100.0,
        }
    } else {
        EnergySplit::default()
    };

    let renewable_share = if band_total > 0.0 {
        renewable / band_total * 100.0
    } else {
        0.0
    };

    (split, renewable_share)
}

fn build_insights(
    peak_voltage: Option<f64>,
    min_voltage: Option<f64>,
    avg_power_factor: Option<f64>,
    load_factor: Option<f64>,
    total_energy_kwh: f64,
) -> Vec<String> {
    let mut insights = Vec::new();

    if peak_voltage.is_some_and(|v| v > 245.0) {
        insights.push(
            "Peak voltage exceeded 245 V; check supply regulation and surge protection.".to_string(),
        );
    }
    if min_voltage.is_some_and(|v| v < 205.0) {
        insights.push(
            "Voltage sagged below 205 V; loads may brown out under this supply.".to_string(),
        );
    }
    if avg_power_factor.is_some_and(|pf| pf < 0.92) {
        insights.push(
            "Average power factor is below 0.92; capacitor bank tuning could cut losses."
                .to_string(),
        );
    }
    if load_factor.is_some_and(|lf| lf < 0.65) {
        insights.push(
            "Load factor is below 0.65; shifting loads off the demand peak would flatten it."
                .to_string(),
        );
    }
    if total_energy_kwh > 200.0 {
        insights.push(
            "Consumption exceeded 200 kWh this period; worth reviewing heavy-usage appliances."
                .to_string(),
        );
    }

    if insights.is_empty() {
        insights.push("Electrical parameters are operating within optimal envelopes.".to_string());
    }
    insights
}

/// Build the full range summary. `interval_seconds` only shapes the
/// voltage sub-series; every statistic runs over non-null samples and
/// an all-null metric stays null rather than zero.
pub fn build_summary(readings: &[Reading], tz: Tz, interval_seconds: i64) -> Summary {
    if readings.is_empty() {
        return Summary::empty();
    }

    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by_key(|r| r.captured_at);

    let voltages = collect(&sorted, |r| r.voltage);
    let currents = collect(&sorted, |r| r.current);
    let powers = collect(&sorted, |r| r.real_power_kw);
    let pfs = collect(&sorted, |r| r.power_factor);
    let frequencies = collect(&sorted, |r| r.frequency);

    let avg_voltage = mean(&voltages);
    let peak_voltage = voltages.iter().cloned().reduce(f64::max);
    let min_voltage = voltages.iter().cloned().reduce(f64::min);

    let avg_current = mean(&currents);
    let rms_current = mean(&currents.iter().map(|i| i * i).collect::<Vec<f64>>()).map(f64::sqrt);

    let avg_real_power_kw = mean(&powers);
    let peak_real_power_kw = powers.iter().cloned().reduce(f64::max);
    let avg_power_factor = mean(&pfs);
    let avg_frequency = mean(&frequencies);

    let total_energy_kwh = estimate_energy_kwh(&sorted);

    let load_factor = match (avg_real_power_kw, peak_real_power_kw) {
        (Some(avg), Some(peak)) if peak != 0.0 => Some(avg / peak),
        _ => None,
    };

    let (energy_split, renewable_share_pct) = split_energy_by_hour(&sorted, tz);

    // Load factor is unclamped, so the score can exceed 100 when a
    // sample set misbehaves; kept as-is.
    let efficiency_score = ((avg_power_factor.unwrap_or(0.0) + load_factor.unwrap_or(0.0)) / 2.0
        * 100.0)
        .round() as i64;

    let insights = build_insights(
        peak_voltage,
        min_voltage,
        avg_power_factor,
        load_factor,
        total_energy_kwh,
    );

    let voltage_series = bucketize(readings, interval_seconds)
        .into_iter()
        .map(|b| VoltagePoint {
            timestamp: b.timestamp,
            avg_voltage: b.avg_voltage,
        })
        .collect();

    Summary {
        reading_count: readings.len(),
        avg_voltage,
        peak_voltage,
        min_voltage,
        avg_current,
        rms_current,
        avg_real_power_kw,
        peak_real_power_kw,
        avg_power_factor,
        avg_frequency,
        total_energy_kwh,
        load_factor,
        energy_split,
        renewable_share_pct,
        efficiency_score,
        insights,
        voltage_series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::UTC;

    fn reading(captured_at: i64) -> Reading {
        Reading {
            id: captured_at,
            device_id: "dev-1".to_string(),
            captured_at,
            voltage: None,
            current: None,
            real_power_kw: None,
            apparent_power_kva: None,
            reactive_power_kvar: None,
            energy_kwh: None,
            total_energy_kwh: None,
            frequency: None,
            power_factor: None,
            metadata: None,
            created_at: 0,
        }
    }

    fn with_totals(pairs: &[(i64, f64)]) -> Vec<Reading> {
        pairs
            .iter()
            .map(|&(t, e)| {
                let mut r = reading(t);
                r.total_energy_kwh = Some(e);
                r.energy_kwh = Some(e);
                r
            })
            .collect()
    }

    #[test]
    fn empty_range_returns_the_distinguished_summary() {
        let s = build_summary(&[], UTC, 300);
        assert_eq!(s.reading_count, 0);
        assert!(s.avg_voltage.is_none());
        assert!(s.load_factor.is_none());
        assert_eq!(s.total_energy_kwh, 0.0);
        assert_eq!(s.insights, vec![NO_TELEMETRY_INSIGHT.to_string()]);
    }

    #[test]
    fn cumulative_strategy_takes_max_minus_min() {
        let readings = with_totals(&[(0, 100.0), (3600, 104.0), (7200, 110.0)]);
        let s = build_summary(&readings, UTC, 3600);
        assert!((s.total_energy_kwh - 10.0).abs() < 1e-9);
    }

    #[test]
    fn trapezoidal_strategy_integrates_power_pairs() {
        let mut readings = vec![reading(0), reading(1800), reading(3600)];
        readings[0].real_power_kw = Some(1.0);
        readings[1].real_power_kw = Some(2.0);
        readings[2].real_power_kw = Some(2.0);

        // (1+2)/2 * 0.5h + (2+2)/2 * 0.5h = 1.75 kWh
        let s = build_summary(&readings, UTC, 3600);
        assert!((s.total_energy_kwh - 1.75).abs() < 1e-9);
    }

    #[test]
    fn single_cumulative_sample_falls_back_to_trapezoid() {
        let mut readings = vec![reading(0), reading(3600)];
        readings[0].total_energy_kwh = Some(50.0);
        readings[0].real_power_kw = Some(2.0);
        readings[1].real_power_kw = Some(2.0);

        let s = build_summary(&readings, UTC, 3600);
        assert!((s.total_energy_kwh - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rms_current_is_root_mean_square() {
        let mut readings = vec![reading(0), reading(60)];
        readings[0].current = Some(3.0);
        readings[1].current = Some(4.0);

        let s = build_summary(&readings, UTC, 300);
        assert!((s.rms_current.unwrap() - (12.5f64).sqrt()).abs() < 1e-9);
        assert_eq!(s.avg_current, Some(3.5));
    }

    #[test]
    fn all_null_metric_yields_null_not_zero() {
        let readings = vec![reading(0), reading(60)];
        let s = build_summary(&readings, UTC, 300);
        assert!(s.avg_voltage.is_none());
        assert!(s.rms_current.is_none());
        assert!(s.avg_power_factor.is_none());
    }

    #[test]
    fn energy_split_classifies_by_local_hour_and_skips_resets() {
        // 18:00 UTC delta lands in the evening peak band, 03:00 in
        // off-peak, 12:00 in shoulder; one counter reset in between.
        let day = 86_400;
        let readings = with_totals(&[
            (2 * 3600, 10.0),
            (3 * 3600, 14.0),   // off-peak +4
            (12 * 3600, 20.0),  // shoulder +6
            (18 * 3600, 26.0),  // peak +6
            (day, 1.0),         // reset, skipped
            (day + 3600, 5.0),  // off-peak +4
        ]);

        let s = build_summary(&readings, UTC, 3600);
        assert!((s.energy_split.peak_pct - 30.0).abs() < 1e-9);
        assert!((s.energy_split.off_peak_pct - 40.0).abs() < 1e-9);
        assert!((s.energy_split.shoulder_pct - 30.0).abs() < 1e-9);
        // Only the 12:00 delta falls in daylight hours.
        assert!((s.renewable_share_pct - 30.0).abs() < 1e-9);
    }

    #[test]
    fn no_deltas_means_zero_percent_everywhere() {
        let mut readings = vec![reading(0), reading(60)];
        readings[0].voltage = Some(230.0);
        readings[1].voltage = Some(230.0);

        let s = build_summary(&readings, UTC, 300);
        assert_eq!(s.energy_split, EnergySplit::default());
        assert_eq!(s.renewable_share_pct, 0.0);
    }

    #[test]
    fn efficiency_score_averages_pf_and_load_factor() {
        let mut readings = vec![reading(0), reading(60)];
        for r in &mut readings {
            r.power_factor = Some(0.9);
            r.real_power_kw = Some(2.0);
        }
        // Constant power: load factor 1.0, pf 0.9 -> round(95)
        let s = build_summary(&readings, UTC, 300);
        assert_eq!(s.efficiency_score, 95);
    }

    #[test]
    fn insight_rules_fire_in_order_and_stack() {
        let mut readings = vec![reading(0), reading(60)];
        readings[0].voltage = Some(250.0); // overvoltage
        readings[1].voltage = Some(200.0); // undervoltage
        readings[0].power_factor = Some(0.8); // low pf
        readings[1].power_factor = Some(0.8);

        let s = build_summary(&readings, UTC, 300);
        assert_eq!(s.insights.len(), 3);
        assert!(s.insights[0].contains("245"));
        assert!(s.insights[1].contains("205"));
        assert!(s.insights[2].contains("power factor"));
    }

    #[test]
    fn quiet_telemetry_gets_the_optimal_envelope_message() {
        let mut readings = vec![reading(0), reading(60)];
        for r in &mut readings {
            r.voltage = Some(230.0);
            r.power_factor = Some(0.98);
            r.real_power_kw = Some(1.0);
        }
        let s = build_summary(&readings, UTC, 300);
        assert_eq!(s.insights.len(), 1);
        assert!(s.insights[0].contains("optimal envelopes"));
    }

    #[test]
    fn voltage_series_follows_the_requested_interval() {
        let mut readings = vec![reading(0), reading(100), reading(200)];
        for r in &mut readings {
            r.voltage = Some(230.0);
        }
        let s = build_summary(&readings, UTC, 150);
        assert_eq!(s.voltage_series.len(), 2);
        assert_eq!(s.voltage_series[0].timestamp, 0);
        assert_eq!(s.voltage_series[1].timestamp, 150);
    }
}
