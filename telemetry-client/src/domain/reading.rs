use serde::{Deserialize, Serialize};

/// One persisted telemetry sample. Written once at ingestion, never
/// mutated afterwards; deletion is left to an external retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reading {
    pub id: i64,
    pub device_id: String,
    /// Sample time in epoch seconds, as reported by the device.
    pub captured_at: i64,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub real_power_kw: Option<f64>,
    pub apparent_power_kva: Option<f64>,
    pub reactive_power_kvar: Option<f64>,
    pub energy_kwh: Option<f64>,
    pub total_energy_kwh: Option<f64>,
    pub frequency: Option<f64>,
    /// Always within [0, 1] when present.
    pub power_factor: Option<f64>,
    pub metadata: Option<serde_json::Value>,
    /// Insertion time in epoch seconds.
    pub created_at: i64,
}

/// A reading after derivation, ready to persist.
#[derive(Debug, Clone)]
pub struct NewReading {
    pub device_id: String,
    pub captured_at: i64,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub real_power_kw: Option<f64>,
    pub apparent_power_kva: Option<f64>,
    pub reactive_power_kvar: Option<f64>,
    pub energy_kwh: Option<f64>,
    pub total_energy_kwh: Option<f64>,
    pub frequency: Option<f64>,
    pub power_factor: Option<f64>,
    pub metadata: Option<serde_json::Value>,
}
