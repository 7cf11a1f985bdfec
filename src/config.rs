use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::entities::resource::DEFAULT_PAGE_SIZE;
use crate::usecase::services::debounce::DEFAULT_DEBOUNCE;
use crate::usecase::services::query_controller::{ControllerSettings, DEFAULT_FAILURE_MESSAGE};

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "caredesk";
const APPLICATION: &str = "caredesk";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to resolve application directories")]
    NoProjectDirs,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION).ok_or(ConfigError::NoProjectDirs)
}

pub fn default_db_path() -> Result<PathBuf> {
    Ok(project_dirs()?.data_local_dir().join("patients.sqlite"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

pub fn ensure_webview_data_dir(base_data_dir: &Path) -> Result<PathBuf> {
    let webview_data_dir = base_data_dir.join("webview");
    std::fs::create_dir_all(&webview_data_dir).map_err(|source| ConfigError::Io {
        path: webview_data_dir.clone(),
        source,
    })?;
    Ok(webview_data_dir)
}

pub fn default_webview_data_dir() -> Result<PathBuf> {
    ensure_webview_data_dir(project_dirs()?.data_local_dir())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Empty means the platform data directory.
    pub db_path: Option<PathBuf>,
    pub page_size: usize,
    pub search_debounce_ms: u64,
    /// Unset means gateway calls may take as long as they need.
    pub request_timeout_secs: Option<u64>,
    pub failure_message: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            search_debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            request_timeout_secs: None,
            failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_path()?)
    }

    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) if !path.as_os_str().is_empty() => Ok(path.clone()),
            _ => default_db_path(),
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            search_debounce: Duration::from_millis(self.search_debounce_ms),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            failure_message: self.failure_message.clone(),
        }
    }
}
