use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_FILE: &str = "one-and-done.json";

/// Where session data lives. `:memory:` keeps it for the process lifetime only.
#[derive(Clone, Debug, PartialEq)]
pub enum DataLocation {
    Memory,
    File(PathBuf),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data: DataLocation,
    pub allowed_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("ONEANDDONE_PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidPort {
                name: "ONEANDDONE_PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };
        let data = match lookup("ONEANDDONE_DATA_FILE").as_deref() {
            Some(":memory:") => DataLocation::Memory,
            Some(path) if !path.trim().is_empty() => DataLocation::File(path.into()),
            _ => DataLocation::File(DEFAULT_DATA_FILE.into()),
        };
        Ok(AppConfig {
            host: lookup("ONEANDDONE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            data,
            allowed_origin: lookup("ONEANDDONE_ALLOWED_ORIGIN").filter(|o| !o.is_empty()),
        })
    }
}
