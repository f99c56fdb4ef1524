use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub images: ImageSettings,
    #[serde(default)]
    pub admin: AdminSettings,
    #[serde(default)]
    pub feedback: FeedbackSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_name")]
    pub name: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_author")]
    pub default_author: String,

    #[serde(default = "default_read_time")]
    pub default_read_time: String,

    /// Logical collection key the articles are stored under
    #[serde(default = "default_collection")]
    pub collection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Document,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Overrides `<data_dir>/<collection>.json` for the local backend
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub document_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageProviderKind {
    #[default]
    Embedded,
    Hosted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(default)]
    pub provider: ImageProviderKind,

    #[serde(default)]
    pub cloud_name: Option<String>,

    #[serde(default = "default_upload_preset")]
    pub upload_preset: String,

    #[serde(default = "default_folder")]
    pub folder: String,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSettings {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,

    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSettings {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_form_name")]
    pub form_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default)]
    pub json_format: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::NotFound(path.as_ref().display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a config file.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Config(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.site.collection.trim().is_empty() {
            return Err(ConfigError::Config("site.collection cannot be empty".to_string()));
        }

        url::Url::parse(&self.site.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.site.base_url.clone()))?;

        for url in [
            &self.storage.document_url,
            &self.images.endpoint,
            &self.feedback.endpoint,
        ]
        .into_iter()
        .flatten()
        {
            url::Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        }

        if self.storage.backend == StorageBackend::Document && self.storage.document_url.is_none() {
            return Err(ConfigError::Config(
                "storage.document_url is required for the document backend".to_string(),
            ));
        }

        if self.images.provider == ImageProviderKind::Hosted
            && self.images.cloud_name.is_none()
            && self.images.endpoint.is_none()
        {
            return Err(ConfigError::Config(
                "images.cloud_name or images.endpoint is required for hosted uploads".to_string(),
            ));
        }

        if self.images.max_bytes == 0 {
            return Err(ConfigError::Config("images.max_bytes must be greater than 0".to_string()));
        }

        if self.admin.max_attempts == 0 {
            return Err(ConfigError::Config("admin.max_attempts must be greater than 0".to_string()));
        }

        if self.admin.lockout_secs == 0 {
            return Err(ConfigError::Config("admin.lockout_secs must be greater than 0".to_string()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var("NAIROBI_TEA_ADMIN_PASSWORD") {
            self.admin.password = Some(password);
        }

        if let Ok(username) = std::env::var("NAIROBI_TEA_ADMIN_USERNAME") {
            self.admin.username = Some(username);
        }

        if let Ok(backend) = std::env::var("NAIROBI_TEA_STORAGE") {
            match backend.to_lowercase().as_str() {
                "local" => self.storage.backend = StorageBackend::Local,
                "document" => self.storage.backend = StorageBackend::Document,
                "memory" => self.storage.backend = StorageBackend::Memory,
                other => tracing::warn!("Ignoring unknown NAIROBI_TEA_STORAGE value: {}", other),
            }
        }

        if let Ok(url) = std::env::var("NAIROBI_TEA_DOCUMENT_URL") {
            self.storage.document_url = Some(url);
        }

        if let Ok(level) = std::env::var("NAIROBI_TEA_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("nairobi-tea"))
            .ok_or_else(|| ConfigError::Config("Could not determine config directory".to_string()))
    }

    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join("nairobi-tea"))
            .ok_or_else(|| ConfigError::Config("Could not determine data directory".to_string()))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        dirs::cache_dir()
            .map(|dir| dir.join("nairobi-tea"))
            .ok_or_else(|| ConfigError::Config("Could not determine cache directory".to_string()))
    }

    pub fn default_config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            storage: StorageSettings::default(),
            images: ImageSettings::default(),
            admin: AdminSettings::default(),
            feedback: FeedbackSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            base_url: default_base_url(),
            default_author: default_author(),
            default_read_time: default_read_time(),
            collection: default_collection(),
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            provider: ImageProviderKind::default(),
            cloud_name: None,
            upload_preset: default_upload_preset(),
            folder: default_folder(),
            endpoint: None,
            max_bytes: default_max_bytes(),
        }
    }
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            max_attempts: default_max_attempts(),
            lockout_secs: default_lockout_secs(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            form_name: default_form_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_to_file: false,
            log_file: default_log_file(),
            json_format: false,
        }
    }
}

fn default_site_name() -> String { "NAIROBIAN TEA".to_string() }
fn default_base_url() -> String { "http://localhost:5173".to_string() }
fn default_author() -> String { crate::news::DEFAULT_AUTHOR.to_string() }
fn default_read_time() -> String { crate::news::DEFAULT_READ_TIME.to_string() }
fn default_collection() -> String { "nairobi-tea-news".to_string() }

fn default_upload_preset() -> String { "unsigned_upload".to_string() }
fn default_folder() -> String { "news".to_string() }
fn default_max_bytes() -> usize { crate::upload::DEFAULT_MAX_BYTES }

fn default_max_attempts() -> u32 { 3 }
fn default_lockout_secs() -> u64 { 30 }
fn default_session_ttl_secs() -> u64 { 60 * 60 }

fn default_form_name() -> String { "feedback".to_string() }

fn default_log_level() -> String { "info".to_string() }
fn default_log_file() -> String { "logs/nairobi-tea.log".to_string() }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.site.collection, "nairobi-tea-news");
        assert_eq!(config.admin.max_attempts, 3);
        assert_eq!(config.admin.lockout_secs, 30);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.images.provider, ImageProviderKind::Embedded);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            backend = "document"
            document_url = "https://db.example/v1"

            [images]
            provider = "hosted"
            cloud_name = "ddofrdneb"

            [admin]
            password = "letmein"
            lockout_secs = 10
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Document);
        assert_eq!(config.images.upload_preset, "unsigned_upload");
        assert_eq!(config.admin.max_attempts, 3);
        assert_eq!(config.admin.lockout_secs, 10);
        assert_eq!(config.site.default_author, "Admin");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Document;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.images.provider = ImageProviderKind::Hosted;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feedback.endpoint = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(crate::Error::InvalidUrl(_))));

        let mut config = Config::default();
        config.admin.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.admin.password = Some("secret".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.admin.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, crate::Error::NotFound(_)));
    }
}
