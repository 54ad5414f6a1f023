use crate::error::AppError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub api_base: String,
    #[serde(serialize_with = "as_secs")]
    pub timeout: Duration,
    pub language: String,
    pub data_dir: PathBuf,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ocr-scanner")
}

impl Config {
    /// Load `.env` from the working directory, then from the data directory, then read the environment.
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let data_dir = std::env::var("OCR_DATA_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let env_path = data_dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_secs = match get("OCR_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    AppError::Config(format!("OCR_TIMEOUT_SECS must be a positive integer, got {:?}", raw))
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_base: get("OCR_API_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            language: get("OCR_LANGUAGE")
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            data_dir: get("OCR_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
        })
    }

    pub fn history_db_path(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }

    /// "configured" when the backend URL was set explicitly, "default" otherwise.
    pub fn api_status(&self) -> &'static str {
        if self.api_base == DEFAULT_API_BASE {
            "default"
        } else {
            "configured"
        }
    }
}
