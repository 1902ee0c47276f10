use sqlx::PgPool;

use crate::db::StoreError;
use crate::domain::{NewReading, Reading};

/// Insert one derived reading and return the persisted row, so
/// generated fields (id, created_at) come back populated.
pub async fn insert_reading(pool: &PgPool, reading: &NewReading) -> Result<Reading, StoreError> {
    let row = sqlx::query_as::<_, Reading>(
        r#"
        INSERT INTO readings (
            device_id, captured_at, voltage, current, real_power_kw,
            apparent_power_kva, reactive_power_kvar, energy_kwh,
            total_energy_kwh, frequency, power_factor, metadata, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                EXTRACT(EPOCH FROM NOW())::BIGINT)
        RETURNING *
        "#,
    )
    .bind(&reading.device_id)
    .bind(reading.captured_at)
    .bind(reading.voltage)
    .bind(reading.current)
    .bind(reading.real_power_kw)
    .bind(reading.apparent_power_kva)
    .bind(reading.reactive_power_kvar)
    .bind(reading.energy_kwh)
    .bind(reading.total_energy_kwh)
    .bind(reading.frequency)
    .bind(reading.power_factor)
    .bind(&reading.metadata)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a time-ordered reading set for a single device over [from, to].
pub async fn readings_in_range(
    pool: &PgPool,
    device_id: &str,
    from: i64,
    to: i64,
) -> Result<Vec<Reading>, StoreError> {
    let rows = sqlx::query_as::<_, Reading>(
        r#"
        SELECT *
        FROM readings
        WHERE device_id = $1
          AND captured_at >= $2
          AND captured_at <= $3
        ORDER BY captured_at
        "#,
    )
    .bind(device_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
