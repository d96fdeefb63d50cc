use std::env;

use crate::codec::gzip::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub max_upload_size: u64,
    pub backup_compression: bool,
    pub compression_level: u32,
    pub stream_chunk_size: usize,
    pub product_name: String,
    pub log_level: String,
    pub cors_allowed_origins: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("API_KEY").expect("API_KEY must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .expect("PORT must be a number"),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "/data".into()),
            max_upload_size: parse_env("MAX_UPLOAD_SIZE", 536_870_912),
            backup_compression: parse_env("BACKUP_COMPRESSION", true),
            compression_level: parse_env("COMPRESSION_LEVEL", 6),
            stream_chunk_size: parse_env("STREAM_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            product_name: env::var("PRODUCT_NAME").unwrap_or_else(|_| "ryos".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".into()),
        }
    }

    pub fn flat_store_path(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.data_dir)
            .join("flat")
            .join("settings.bin")
    }

    pub fn object_store_dir(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.data_dir).join("objects")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
