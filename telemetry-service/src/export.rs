use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use telemetry_client::domain::Reading;

use crate::error::EngineError;

/// One exportable metric: payload key, human label, and whether the
/// stored kilo-unit value is scaled to base units (x1000) on the way
/// out.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kilo_to_base: bool,
}

pub const METRIC_CATALOGUE: &[MetricSpec] = &[
    MetricSpec { key: "voltage", label: "Voltage (V)", kilo_to_base: false },
    MetricSpec { key: "current", label: "Current (A)", kilo_to_base: false },
    MetricSpec { key: "power", label: "Power (W)", kilo_to_base: true },
    MetricSpec { key: "apparent_power", label: "Apparent Power (VA)", kilo_to_base: true },
    MetricSpec { key: "reactive_power", label: "Reactive Power (VAR)", kilo_to_base: true },
    MetricSpec { key: "energy", label: "Energy (kWh)", kilo_to_base: false },
    MetricSpec { key: "frequency", label: "Frequency (Hz)", kilo_to_base: false },
    MetricSpec { key: "power_factor", label: "Power Factor", kilo_to_base: false },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "xlsx",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub metrics: Vec<String>,
    pub sampling: String,
    pub include_metadata: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub timestamp: i64,
    pub iso8601: String,
    /// One value per selected metric, catalogue order of the request.
    pub values: Vec<Option<f64>>,
    pub metadata: Option<String>,
}

/// The engine's export output: column labels, decimated rows, and a
/// filename token. Byte-level CSV/XLSX encoding happens elsewhere.
#[derive(Debug, Clone, Serialize)]
pub struct ExportDataset {
    pub filename: String,
    pub columns: Vec<String>,
    pub rows: Vec<ExportRow>,
}

/// Minimum spacing in seconds for a sampling keyword.
pub fn sampling_interval(keyword: &str) -> Result<i64, EngineError> {
    match keyword {
        "all" => Ok(0),
        "1min" => Ok(60),
        "5min" => Ok(300),
        "15min" => Ok(900),
        "1hour" => Ok(3600),
        "1day" => Ok(86_400),
        other => Err(EngineError::validation(format!(
            "unknown sampling keyword: {other}"
        ))),
    }
}

fn resolve_metrics(requested: &[String]) -> Result<Vec<MetricSpec>, EngineError> {
    requested
        .iter()
        .map(|name| {
            METRIC_CATALOGUE
                .iter()
                .find(|spec| spec.key == name)
                .copied()
                .ok_or_else(|| EngineError::validation(format!("unknown export metric: {name}")))
        })
        .collect()
}

fn metric_value(reading: &Reading, spec: &MetricSpec) -> Option<f64> {
    let raw = match spec.key {
        "voltage" => reading.voltage,
        "current" => reading.current,
        "power" => reading.real_power_kw,
        "apparent_power" => reading.apparent_power_kva,
        "reactive_power" => reading.reactive_power_kvar,
        "energy" => reading.energy_kwh,
        "frequency" => reading.frequency,
        "power_factor" => reading.power_factor,
        _ => None,
    };
    raw.map(|v| if spec.kilo_to_base { v * 1000.0 } else { v })
}

/// Decimation, not averaging: keep the first row, then any row at
/// least `interval` seconds after the last kept one. Skipped rows are
/// discarded outright. Expects time-ordered input; zero keeps all.
fn decimate<'a>(readings: &'a [Reading], interval: i64) -> Vec<&'a Reading> {
    if interval <= 0 {
        return readings.iter().collect();
    }

    let mut kept: Vec<&Reading> = Vec::new();
    let mut last_kept: Option<i64> = None;
    for r in readings {
        let keep = match last_kept {
            None => true,
            Some(t) => r.captured_at - t >= interval,
        };
        if keep {
            kept.push(r);
            last_kept = Some(r.captured_at);
        }
    }
    kept
}

fn iso8601(epoch: i64) -> String {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_default()
}

fn filename_token(device_id: &str, from: i64, to: i64, metrics: &[MetricSpec]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(device_id.as_bytes());
    hasher.update(&from.to_le_bytes());
    hasher.update(&to.to_le_bytes());
    for m in metrics {
        hasher.update(m.key.as_bytes());
    }
    hasher.finalize().to_hex()[..8].to_string()
}

/// Apply metric selection, unit conversion, and decimation to a
/// time-ordered reading set.
pub fn build_export(
    device_id: &str,
    readings: &[Reading],
    from: i64,
    to: i64,
    request: &ExportRequest,
) -> Result<ExportDataset, EngineError> {
    if request.metrics.is_empty() {
        return Err(EngineError::validation("no export metrics selected"));
    }
    let specs = resolve_metrics(&request.metrics)?;
    let interval = sampling_interval(&request.sampling)?;

    let mut columns = vec!["Timestamp".to_string(), "ISO 8601".to_string()];
    columns.extend(specs.iter().map(|s| s.label.to_string()));
    if request.include_metadata {
        columns.push("Metadata".to_string());
    }

    let rows = decimate(readings, interval)
        .into_iter()
        .map(|r| ExportRow {
            timestamp: r.captured_at,
            iso8601: iso8601(r.captured_at),
            values: specs.iter().map(|spec| metric_value(r, spec)).collect(),
            metadata: if request.include_metadata {
                r.metadata.as_ref().map(|m| m.to_string())
            } else {
                None
            },
        })
        .collect::<Vec<_>>();

    metrics::counter!("export_rows_total").increment(rows.len() as u64);

    let filename = format!(
        "telemetry_{}_{}_{}.{}",
        device_id,
        filename_token(device_id, from, to, &specs),
        request.sampling,
        request.format.extension(),
    );

    Ok(ExportDataset {
        filename,
        columns,
        rows,
    })
}
