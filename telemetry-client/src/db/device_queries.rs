use sqlx::PgPool;

use crate::db::StoreError;
use crate::domain::Device;

pub async fn device_by_id(pool: &PgPool, device_id: &str) -> Result<Option<Device>, StoreError> {
    let row = sqlx::query_as::<_, Device>(
        r#"
        SELECT id, api_key, last_seen, timezone, location
        FROM devices
        WHERE id = $1
        "#,
    )
    .bind(device_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Record the latest accepted sample time for a device.
pub async fn touch_device(pool: &PgPool, device_id: &str, last_seen: i64) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE devices
        SET last_seen = $2
        WHERE id = $1
        "#,
    )
    .bind(device_id)
    .bind(last_seen)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::UnknownDevice(device_id.to_string()));
    }

    Ok(())
}
