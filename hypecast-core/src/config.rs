use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::models::Platform;
use crate::warehouse::ViewKind;

#[derive(Debug, Deserialize, Clone)]
pub struct HypecastConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
    pub default_platform: Platform,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_platform: Platform::TikTok,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// How long fetched view rows are reused before the warehouse is queried again.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default)]
    pub views: ViewsConfig,
}

fn default_max_connections() -> u32 {
    4
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    300
}

/// Fully-qualified names of the four source views.
#[derive(Debug, Deserialize, Clone)]
pub struct ViewsConfig {
    pub base_events: String,
    pub historical_context: String,
    pub trend_analysis: String,
    pub market_rankings: String,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            base_events: "analytics.top_events_last_7_days".to_string(),
            historical_context: "analytics.top_events_historical_context".to_string(),
            trend_analysis: "analytics.top_events_trend_analysis".to_string(),
            market_rankings: "analytics.top_events_market_rankings".to_string(),
        }
    }
}

impl ViewsConfig {
    pub fn name_for(&self, kind: ViewKind) -> &str {
        match kind {
            ViewKind::BaseEvents => &self.base_events,
            ViewKind::HistoricalContext => &self.historical_context,
            ViewKind::TrendAnalysis => &self.trend_analysis,
            ViewKind::MarketRankings => &self.market_rankings,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_base_url: String,
    /// Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub request_timeout_seconds: u64,
    pub rate_limit_delay_ms: u64,
    pub max_angles_per_event: usize,
    /// 0 disables the generated-content cache.
    pub result_cache_ttl_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base_url: crate::generation::DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            max_tokens: 600,
            temperature: 0.7,
            max_retries: 3,
            retry_delay_ms: 1000,
            request_timeout_seconds: 60,
            rate_limit_delay_ms: 1000,
            max_angles_per_event: 3,
            result_cache_ttl_seconds: 900,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    pub output_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: "data/generated_content".to_string(),
        }
    }
}

impl HypecastConfig {
    /// Load from a TOML file, then apply `HYPECAST__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("HYPECAST").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = HypecastConfig::from_toml(
            r#"
            [warehouse]
            url = "postgres://localhost/warehouse"
            "#,
        )
        .expect("minimal config should parse");

        assert_eq!(config.warehouse.cache_ttl_seconds, 300);
        assert_eq!(config.warehouse.max_connections, 4);
        assert_eq!(config.generation.model, "gpt-4o");
        assert_eq!(config.generation.max_tokens, 600);
        assert_eq!(config.http.port, 8787);
        assert_eq!(config.service.default_platform, Platform::TikTok);
        assert_eq!(
            config.warehouse.views.base_events,
            "analytics.top_events_last_7_days"
        );
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = HypecastConfig::from_toml(
            r#"
            [service]
            log_level = "debug"
            default_platform = "instagram"

            [warehouse]
            url = "postgres://localhost/warehouse"
            cache_ttl_seconds = 60

            [warehouse.views]
            base_events = "mart.base"
            historical_context = "mart.hist"
            trend_analysis = "mart.trend"
            market_rankings = "mart.market"

            [generation]
            model = "gpt-4o-mini"
            rate_limit_delay_ms = 0
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.service.default_platform, Platform::Instagram);
        assert_eq!(config.warehouse.cache_ttl_seconds, 60);
        assert_eq!(config.warehouse.views.market_rankings, "mart.market");
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.generation.rate_limit_delay_ms, 0);
        // untouched generation keys keep their defaults
        assert_eq!(config.generation.max_retries, 3);
    }

    #[test]
    fn test_missing_warehouse_section_is_an_error() {
        let result = HypecastConfig::from_toml(
            r#"
            [http]
            host = "0.0.0.0"
            port = 9000
            "#,
        );
        assert!(result.is_err(), "warehouse section is required");
    }
}
