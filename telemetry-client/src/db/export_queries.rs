use sqlx::PgPool;

use crate::db::StoreError;
use crate::domain::{ExportRecord, NewExportRecord};

/// Write one audit row for a completed export call.
pub async fn record_export(
    pool: &PgPool,
    export: &NewExportRecord,
) -> Result<ExportRecord, StoreError> {
    let row = sqlx::query_as::<_, ExportRecord>(
        r#"
        INSERT INTO exports (user_id, format, metrics, range_from, range_to, created_at)
        VALUES ($1, $2, $3, $4, $5, EXTRACT(EPOCH FROM NOW())::BIGINT)
        RETURNING *
        "#,
    )
    .bind(&export.user_id)
    .bind(&export.format)
    .bind(&export.metrics)
    .bind(export.range_from)
    .bind(export.range_to)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
