use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use telemetry_client::domain::{Device, ExportRecord, NewExportRecord, NewReading, Reading};
use telemetry_client::StoreError;

use super::RowStore;

#[derive(Default)]
struct Inner {
    devices: HashMap<String, Device>,
    readings: Vec<Reading>,
    exports: Vec<ExportRecord>,
    next_reading_id: i64,
    next_export_id: i64,
}

/// In-memory row store mirroring the Postgres schema. Backs unit tests
/// and credential-free local runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device: Device) -> Self {
        {
            let mut inner = self.inner.lock().expect("memory store poisoned");
            inner.devices.insert(device.id.clone(), device);
        }
        self
    }

    pub fn export_count(&self) -> usize {
        self.inner.lock().expect("memory store poisoned").exports.len()
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn device(&self, device_id: &str) -> Result<Option<Device>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.devices.get(device_id).cloned())
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<Reading, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.next_reading_id += 1;
        let row = Reading {
            id: inner.next_reading_id,
            device_id: reading.device_id.clone(),
            captured_at: reading.captured_at,
            voltage: reading.voltage,
            current: reading.current,
            real_power_kw: reading.real_power_kw,
            apparent_power_kva: reading.apparent_power_kva,
            reactive_power_kvar: reading.reactive_power_kvar,
            energy_kwh: reading.energy_kwh,
            total_energy_kwh: reading.total_energy_kwh,
            frequency: reading.frequency,
            power_factor: reading.power_factor,
            metadata: reading.metadata.clone(),
            created_at: chrono::Utc::now().timestamp(),
        };
        inner.readings.push(row.clone());
        Ok(row)
    }

    async fn readings_in_range(
        &self,
        device_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Reading>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut rows: Vec<Reading> = inner
            .readings
            .iter()
            .filter(|r| r.device_id == device_id && r.captured_at >= from && r.captured_at <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.captured_at);
        Ok(rows)
    }

    async fn touch_device(&self, device_id: &str, last_seen: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        match inner.devices.get_mut(device_id) {
            Some(device) => {
                device.last_seen = Some(last_seen);
                Ok(())
            }
            None => Err(StoreError::UnknownDevice(device_id.to_string())),
        }
    }

    async fn record_export(&self, export: &NewExportRecord) -> Result<ExportRecord, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.next_export_id += 1;
        let row = ExportRecord {
            id: inner.next_export_id,
            user_id: export.user_id.clone(),
            format: export.format.clone(),
            metrics: export.metrics.clone(),
            range_from: export.range_from,
            range_to: export.range_to,
            created_at: chrono::Utc::now().timestamp(),
        };
        inner.exports.push(row.clone());
        Ok(row)
    }
}
