use crate::error::CoreError;

/// Runtime configuration, loaded once at startup from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Base URL of the durable visit store's HTTP SQL endpoint.
    pub store_url: String,
    pub store_user: String,
    pub store_password: String,
    pub store_database: String,
    pub geoip_path: String,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        Ok(Self {
            port: std::env::var("LIVELYTICS_PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|e| CoreError::Config(format!("invalid port: {e}")))?,
            store_url: std::env::var("LIVELYTICS_STORE_URL")
                .unwrap_or_else(|_| "http://localhost:8123".to_string()),
            store_user: std::env::var("LIVELYTICS_STORE_USER")
                .unwrap_or_else(|_| "default".to_string()),
            store_password: std::env::var("LIVELYTICS_STORE_PASSWORD").unwrap_or_default(),
            store_database: std::env::var("LIVELYTICS_STORE_DATABASE")
                .unwrap_or_else(|_| "livelytics".to_string()),
            geoip_path: std::env::var("LIVELYTICS_GEOIP_PATH")
                .unwrap_or_else(|_| "./GeoLite2-City.mmdb".to_string()),
            cors_origins: std::env::var("LIVELYTICS_CORS_ORIGINS")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }
}
