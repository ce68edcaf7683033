use crate::constants::*;
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub log_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub years_to_scan: usize,
    pub quarters_to_take: usize,
    /// Keep downloaded archives after their files are mapped
    pub retain_archives: bool,
    pub max_extracted_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            raw_dir: PathBuf::from(DEFAULT_RAW_DIR),
            processed_dir: PathBuf::from(DEFAULT_PROCESSED_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            years_to_scan: DEFAULT_YEARS_TO_SCAN,
            quarters_to_take: DEFAULT_QUARTERS_TO_TAKE,
            retain_archives: true,
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
        }
    }
}

impl Config {
    /// Loads the TOML file at `path` (or the default file if it exists), then
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ANS_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(dir) = lookup("ANS_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            let root = PathBuf::from(dir);
            self.raw_dir = root.join("raw");
            self.processed_dir = root.join("processed");
        }
        if let Some(dir) = lookup("ANS_LOG_DIR").filter(|v| !v.trim().is_empty()) {
            self.log_dir = PathBuf::from(dir);
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(PipelineError::Config("base_url must not be empty".into()));
        }
        // Relative joins against the base need a trailing slash
        if !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }
        if self.quarters_to_take == 0 || self.years_to_scan == 0 {
            return Err(PipelineError::Config(
                "years_to_scan and quarters_to_take must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn consolidated_path(&self) -> PathBuf {
        self.processed_dir.join(CONSOLIDATED_FILE)
    }

    pub fn aggregated_path(&self) -> PathBuf {
        self.processed_dir.join(AGGREGATED_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("years_to_scan = 1\nretain_archives = false\n").unwrap();
        assert_eq!(config.years_to_scan, 1);
        assert!(!config.retain_archives);
        assert_eq!(config.quarters_to_take, DEFAULT_QUARTERS_TO_TAKE);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_env_overrides_data_dir() {
        let env: HashMap<&str, &str> = [("ANS_DATA_DIR", "/tmp/ans"), ("ANS_BASE_URL", "http://mirror")].into();
        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        config.validate().unwrap();
        assert_eq!(config.raw_dir, PathBuf::from("/tmp/ans/raw"));
        assert_eq!(config.processed_dir, PathBuf::from("/tmp/ans/processed"));
        assert_eq!(config.base_url, "http://mirror/");
    }

    #[test]
    fn test_zero_quarters_rejected() {
        let mut config = Config {
            quarters_to_take: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }
}
