use serde::{Deserialize, Serialize};

/// Audit row written once per completed export call.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExportRecord {
    pub id: i64,
    pub user_id: Option<String>,
    pub format: String,
    pub metrics: Vec<String>,
    pub range_from: i64,
    pub range_to: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewExportRecord {
    pub user_id: Option<String>,
    pub format: String,
    pub metrics: Vec<String>,
    pub range_from: i64,
    pub range_to: i64,
}
