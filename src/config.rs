use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub log_level: String,
    pub palette_size: usize,
    pub extraction: ExtractionConfig,
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    pub web: WebConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Model invocations per image before falling back to an empty record.
    pub max_attempts: usize,
    /// Write degraded images to the catalog. When false they leave no rows
    /// and the next pass picks them up again.
    pub keep_degraded: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// `generative` or `command`.
    pub kind: String,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub command: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GeocoderConfig {
    pub places_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub port: u16,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("PHOTO_INDEX").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("db_path", "photos.sqlite")?
            .set_default("log_level", "info")?
            .set_default("palette_size", 3)?
            .set_default("extraction.max_attempts", 20)?
            .set_default("extraction.keep_degraded", true)?
            .set_default("classifier.kind", "generative")?
            .set_default("classifier.endpoint", "http://localhost:11434/v1/")?
            .set_default("classifier.model", "llava")?
            .set_default("classifier.timeout_secs", 300)?
            .set_default("web.port", 8080)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize() {
        let config: AppConfig = AppConfig::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.db_path, "photos.sqlite");
        assert_eq!(config.extraction.max_attempts, 20);
        assert!(config.extraction.keep_degraded);
        assert_eq!(config.palette_size, 3);
        assert_eq!(config.classifier.kind, "generative");
        assert!(config.classifier.api_key.is_none());
        assert!(config.geocoder.places_path.is_none());
    }
}
