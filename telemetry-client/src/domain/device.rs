use serde::{Deserialize, Serialize};

/// Device identity and liveness. `last_seen` tracks the latest
/// `captured_at` accepted from the device, not wall-clock receipt time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: String,
    pub api_key: String,
    pub last_seen: Option<i64>,
    /// IANA timezone name, e.g. "Europe/London".
    pub timezone: String,
    pub location: Option<String>,
}
