use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

/// Default tariff applied when a cost query does not carry its own.
#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    #[serde(default = "default_base_rate")]
    pub base_rate: f64,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            base_rate: default_base_rate(),
            currency_symbol: default_currency_symbol(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub tariff: TariffConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("TELEMETRY_CONFIG").unwrap_or_else(|_| "telemetry-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }
}

fn default_base_rate() -> f64 {
    6.5
}

fn default_currency_symbol() -> String {
    "₹".to_string()
}

fn default_channel_capacity() -> usize {
    64
}
