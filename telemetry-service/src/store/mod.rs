use async_trait::async_trait;
use sqlx::PgPool;
use telemetry_client::db::{device_queries, export_queries, reading_queries};
use telemetry_client::domain::{Device, ExportRecord, NewExportRecord, NewReading, Reading};
use telemetry_client::StoreError;

pub mod memory;

pub use memory::MemoryStore;

/// The row-store seam the engine computes against. Postgres in
/// production, in-memory for tests and local runs.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn device(&self, device_id: &str) -> Result<Option<Device>, StoreError>;

    /// Insert one derived reading, returning the persisted row with
    /// generated fields populated.
    async fn insert_reading(&self, reading: &NewReading) -> Result<Reading, StoreError>;

    /// Readings for one device over [from, to], ascending by capture time.
    async fn readings_in_range(
        &self,
        device_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Reading>, StoreError>;

    async fn touch_device(&self, device_id: &str, last_seen: i64) -> Result<(), StoreError>;

    async fn record_export(&self, export: &NewExportRecord) -> Result<ExportRecord, StoreError>;
}

pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn device(&self, device_id: &str) -> Result<Option<Device>, StoreError> {
        device_queries::device_by_id(&self.pool, device_id).await
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<Reading, StoreError> {
        reading_queries::insert_reading(&self.pool, reading).await
    }

    async fn readings_in_range(
        &self,
        device_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Reading>, StoreError> {
        reading_queries::readings_in_range(&self.pool, device_id, from, to).await
    }

    async fn touch_device(&self, device_id: &str, last_seen: i64) -> Result<(), StoreError> {
        device_queries::touch_device(&self.pool, device_id, last_seen).await
    }

    async fn record_export(&self, export: &NewExportRecord) -> Result<ExportRecord, StoreError> {
        export_queries::record_export(&self.pool, export).await
    }
}
