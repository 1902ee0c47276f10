use std::sync::Arc;

use serde::Deserialize;
use telemetry_client::domain::{NewReading, Reading};
use telemetry_client::StoreError;

use crate::broadcast::BroadcastRegistry;
use crate::error::EngineError;
use crate::store::RowStore;

/// Raw device payload. Every electrical field is optional; the
/// derivation steps below fill in what the device left out.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadingPayload {
    /// Sample time in epoch seconds; ingestion time when absent.
    pub timestamp: Option<i64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    /// Watts, not kilowatts.
    pub power: Option<f64>,
    pub energy: Option<f64>,
    pub frequency: Option<f64>,
    pub power_factor: Option<f64>,
    pub apparent_power: Option<f64>,
    pub reactive_power: Option<f64>,
    pub metadata: Option<serde_json::Value>,
}

/// Round half away from zero to `decimals` places.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn ensure_finite(name: &str, value: Option<f64>) -> Result<(), EngineError> {
    match value {
        Some(v) if !v.is_finite() => Err(EngineError::validation(format!(
            "field {name} must be a finite number"
        ))),
        _ => Ok(()),
    }
}

/// Derive the unobserved electrical quantities for one payload.
///
/// Each step is independent and tolerates missing inputs:
/// real power falls back to V*I, apparent power to V*I, power factor
/// to real/apparent (clamped to [0, 1]), reactive power to
/// sqrt(max(apparent^2 - real^2, 0)). The payload energy lands in both
/// `energy_kwh` and `total_energy_kwh`; downstream consumers read the
/// two fields under different semantics.
pub fn derive_reading(
    device_id: &str,
    payload: &ReadingPayload,
    now: i64,
) -> Result<NewReading, EngineError> {
    for (name, value) in [
        ("voltage", payload.voltage),
        ("current", payload.current),
        ("power", payload.power),
        ("energy", payload.energy),
        ("frequency", payload.frequency),
        ("power_factor", payload.power_factor),
        ("apparent_power", payload.apparent_power),
        ("reactive_power", payload.reactive_power),
    ] {
        ensure_finite(name, value)?;
    }

    let captured_at = payload.timestamp.unwrap_or(now);

    let vi_kw = match (payload.voltage, payload.current) {
        (Some(v), Some(i)) => Some(v * i / 1000.0),
        _ => None,
    };

    let real_power_kw = payload.power.map(|w| w / 1000.0).or(vi_kw);
    let apparent_power_kva = payload.apparent_power.or(vi_kw);

    let power_factor = payload
        .power_factor
        .or(match (real_power_kw, apparent_power_kva) {
            (Some(p), Some(s)) if s != 0.0 => Some(p / s),
            _ => None,
        })
        .map(|pf| pf.clamp(0.0, 1.0));

    let reactive_power_kvar =
        payload
            .reactive_power
            .or(match (real_power_kw, apparent_power_kva) {
                (Some(p), Some(s)) => Some((s * s - p * p).max(0.0).sqrt()),
                _ => None,
            });

    Ok(NewReading {
        device_id: device_id.to_string(),
        captured_at,
        voltage: payload.voltage.map(|v| round_to(v, 3)),
        current: payload.current.map(|v| round_to(v, 3)),
        real_power_kw: real_power_kw.map(|v| round_to(v, 4)),
        apparent_power_kva: apparent_power_kva.map(|v| round_to(v, 4)),
        reactive_power_kvar: reactive_power_kvar.map(|v| round_to(v, 4)),
        energy_kwh: payload.energy.map(|v| round_to(v, 5)),
        total_energy_kwh: payload.energy.map(|v| round_to(v, 5)),
        frequency: payload.frequency.map(|v| round_to(v, 3)),
        power_factor: power_factor.map(|v| round_to(v, 4)),
        metadata: payload.metadata.clone(),
    })
}

/// Ingestion unit: derive, persist, update liveness, publish.
pub struct Ingestor {
    store: Arc<dyn RowStore>,
    broadcast: Arc<BroadcastRegistry>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn RowStore>, broadcast: Arc<BroadcastRegistry>) -> Self {
        Self { store, broadcast }
    }

    /// Validate and persist one reading. Derivation happens entirely
    /// in memory before the single persist call, so a failure never
    /// leaves partial state behind.
    pub async fn ingest(
        &self,
        device_id: &str,
        payload: &ReadingPayload,
    ) -> Result<Reading, EngineError> {
        // Confirm the device up front so a bad id cannot leave an
        // orphaned reading behind.
        self.store
            .device(device_id)
            .await?
            .ok_or_else(|| StoreError::UnknownDevice(device_id.to_string()))
            .map_err(EngineError::Storage)?;

        let now = chrono::Utc::now().timestamp();
        let derived = match derive_reading(device_id, payload, now) {
            Ok(r) => r,
            Err(e) => {
                metrics::counter!("ingest_rejected_total").increment(1);
                return Err(e);
            }
        };

        let stored = self.store.insert_reading(&derived).await?;
        self.store
            .touch_device(device_id, stored.captured_at)
            .await?;

        metrics::counter!("ingest_readings_total").increment(1);

        // Synchronous publish keeps per-device ordering; delivery
        // failures stay inside the registry.
        self.broadcast.publish(&stored);

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use telemetry_client::domain::Device;

    fn test_device() -> Device {
        Device {
            id: "dev-1".to_string(),
            api_key: "secret".to_string(),
            last_seen: None,
            timezone: "UTC".to_string(),
            location: None,
        }
    }

    #[test]
    fn derives_power_quantities_from_voltage_and_current() {
        let payload = ReadingPayload {
            voltage: Some(230.0),
            current: Some(2.0),
            ..Default::default()
        };
        let r = derive_reading("dev-1", &payload, 0).unwrap();
        assert_eq!(r.real_power_kw, Some(0.46));
        assert_eq!(r.apparent_power_kva, Some(0.46));
        assert_eq!(r.reactive_power_kvar, Some(0.0));
        assert_eq!(r.power_factor, Some(1.0));
    }

    #[test]
    fn explicit_power_factor_clamps_to_unit_interval() {
        let payload = ReadingPayload {
            power_factor: Some(1.5),
            ..Default::default()
        };
        let r = derive_reading("dev-1", &payload, 0).unwrap();
        assert_eq!(r.power_factor, Some(1.0));

        let payload = ReadingPayload {
            power_factor: Some(-0.2),
            ..Default::default()
        };
        let r = derive_reading("dev-1", &payload, 0).unwrap();
        assert_eq!(r.power_factor, Some(0.0));
    }

    #[test]
    fn watts_input_takes_priority_over_volt_ampere_product() {
        let payload = ReadingPayload {
            voltage: Some(230.0),
            current: Some(2.0),
            power: Some(400.0),
            ..Default::default()
        };
        let r = derive_reading("dev-1", &payload, 0).unwrap();
        assert_eq!(r.real_power_kw, Some(0.4));
        // Apparent power still falls back to V*I.
        assert_eq!(r.apparent_power_kva, Some(0.46));
    }

    #[test]
    fn reactive_power_never_goes_imaginary() {
        // real > apparent would make apparent^2 - real^2 negative.
        let payload = ReadingPayload {
            power: Some(500.0),
            apparent_power: Some(0.4),
            ..Default::default()
        };
        let r = derive_reading("dev-1", &payload, 0).unwrap();
        assert_eq!(r.reactive_power_kvar, Some(0.0));
    }

    #[test]
    fn missing_inputs_stay_null() {
        let r = derive_reading("dev-1", &ReadingPayload::default(), 42).unwrap();
        assert_eq!(r.captured_at, 42);
        assert!(r.voltage.is_none());
        assert!(r.real_power_kw.is_none());
        assert!(r.power_factor.is_none());
        assert!(r.reactive_power_kvar.is_none());
    }

    #[test]
    fn non_finite_fields_are_rejected() {
        let payload = ReadingPayload {
            voltage: Some(f64::NAN),
            ..Default::default()
        };
        assert!(matches!(
            derive_reading("dev-1", &payload, 0),
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn ingest_persists_and_fills_derived_fields() {
        let store = Arc::new(MemoryStore::new().with_device(test_device()));
        let broadcast = Arc::new(BroadcastRegistry::new(8));
        let ingestor = Ingestor::new(store.clone(), broadcast);

        let payload = ReadingPayload {
            voltage: Some(230.5),
            current: Some(1.23),
            frequency: Some(50.0),
            energy: Some(0.14),
            ..Default::default()
        };
        let stored = ingestor.ingest("dev-1", &payload).await.unwrap();

        let expected_kw = (230.5 * 1.23 / 1000.0 * 10_000.0_f64).round() / 10_000.0;
        assert_eq!(stored.real_power_kw, Some(expected_kw));
        assert_eq!(stored.apparent_power_kva, Some(expected_kw));
        assert_eq!(stored.reactive_power_kvar, Some(0.0));
        assert_eq!(stored.power_factor, Some(1.0));
        assert_eq!(stored.energy_kwh, Some(0.14));
        assert_eq!(stored.total_energy_kwh, Some(0.14));
        assert!(stored.id > 0);

        let device = store.device("dev-1").await.unwrap().unwrap();
        assert_eq!(device.last_seen, Some(stored.captured_at));
    }

    #[tokio::test]
    async fn ingest_against_unknown_device_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let broadcast = Arc::new(BroadcastRegistry::new(8));
        let ingestor = Ingestor::new(store.clone(), broadcast);

        let result = ingestor.ingest("ghost", &ReadingPayload::default()).await;
        assert!(matches!(result, Err(EngineError::Storage(_))));
        assert!(store
            .readings_in_range("ghost", i64::MIN, i64::MAX)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn ingest_publishes_exactly_one_event_per_reading() {
        let store = Arc::new(MemoryStore::new().with_device(test_device()));
        let broadcast = Arc::new(BroadcastRegistry::new(8));
        let ingestor = Ingestor::new(store, broadcast.clone());

        // Registered after an earlier ingestion: must not see it.
        ingestor
            .ingest("dev-1", &ReadingPayload {
                voltage: Some(231.0),
                timestamp: Some(100),
                ..Default::default()
            })
            .await
            .unwrap();

        let (_id, mut rx) = broadcast.subscribe();

        let stored = ingestor
            .ingest("dev-1", &ReadingPayload {
                voltage: Some(232.0),
                timestamp: Some(200),
                ..Default::default()
            })
            .await
            .unwrap();

        let event = rx.recv().await.expect("one event");
        assert_eq!(event.id, stored.id);
        assert_eq!(event.voltage, Some(232.0));
        assert!(rx.try_recv().is_err());
    }
}
