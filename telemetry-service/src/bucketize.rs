use std::collections::BTreeMap;

use serde::Serialize;
use telemetry_client::domain::Reading;

/// Fixed-width time window with per-window aggregates. Computed on
/// demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    /// Window start, aligned to the interval.
    pub timestamp: i64,
    pub avg_voltage: Option<f64>,
    pub peak_voltage: Option<f64>,
    pub min_voltage: Option<f64>,
    pub avg_current: Option<f64>,
    pub avg_real_power_kw: Option<f64>,
    /// Interval energies are additive, so the window sums them.
    pub energy_kwh: f64,
    pub avg_power_factor: Option<f64>,
}

#[derive(Default)]
struct Accumulator {
    voltage_sum: f64,
    voltage_count: usize,
    voltage_max: Option<f64>,
    voltage_min: Option<f64>,
    current_sum: f64,
    current_count: usize,
    power_sum: f64,
    power_count: usize,
    energy_sum: f64,
    pf_sum: f64,
    pf_count: usize,
}

impl Accumulator {
    fn push(&mut self, r: &Reading) {
        if let Some(v) = r.voltage {
            self.voltage_sum += v;
            self.voltage_count += 1;
            self.voltage_max = Some(self.voltage_max.map_or(v, |m| m.max(v)));
            self.voltage_min = Some(self.voltage_min.map_or(v, |m| m.min(v)));
        }
        if let Some(i) = r.current {
            self.current_sum += i;
            self.current_count += 1;
        }
        if let Some(p) = r.real_power_kw {
            self.power_sum += p;
            self.power_count += 1;
        }
        if let Some(e) = r.energy_kwh {
            self.energy_sum += e;
        }
        if let Some(pf) = r.power_factor {
            self.pf_sum += pf;
            self.pf_count += 1;
        }
    }

    fn finish(self, timestamp: i64) -> Bucket {
        fn avg(sum: f64, count: usize) -> Option<f64> {
            (count > 0).then(|| sum / count as f64)
        }

        Bucket {
            timestamp,
            avg_voltage: avg(self.voltage_sum, self.voltage_count),
            peak_voltage: self.voltage_max,
            min_voltage: self.voltage_min,
            avg_current: avg(self.current_sum, self.current_count),
            avg_real_power_kw: avg(self.power_sum, self.power_count),
            energy_kwh: self.energy_sum,
            avg_power_factor: avg(self.pf_sum, self.pf_count),
        }
    }
}

/// Group readings into interval-aligned windows, nulls excluded from
/// averages, ascending by window start. Accepts input in any order;
/// an empty slice yields an empty vec.
pub fn bucketize(readings: &[Reading], interval_seconds: i64) -> Vec<Bucket> {
    let interval = interval_seconds.max(1);
    let mut groups: BTreeMap<i64, Accumulator> = BTreeMap::new();

    for r in readings {
        let key = r.captured_at.div_euclid(interval) * interval;
        groups.entry(key).or_default().push(r);
    }

    groups
        .into_iter()
        .map(|(key, acc)| acc.finish(key))
        .collect()
}
