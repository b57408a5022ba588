use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use handoff_core::rules::ViewFilter;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const APP_DIR: &str = "handoff";
const CONFIG_FILENAME: &str = "config.toml";

pub const ENV_BACKEND_URL: &str = "HANDOFF_BACKEND_URL";
pub const ENV_ANON_KEY: &str = "HANDOFF_ANON_KEY";
pub const ENV_WEBHOOK_URL: &str = "HANDOFF_WEBHOOK_URL";

pub const DEFAULT_HISTORY_LIMIT: usize = 200;
pub const MAX_HISTORY_LIMIT: usize = 1000;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub backend: Option<BackendConfig>,
    pub delivery: DeliveryConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: Url,
    pub anon_key: String,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub webhook_url: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    pub history_limit: usize,
    pub refresh_interval_secs: u64,
    pub default_view: ViewFilter,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            default_view: ViewFilter::Active,
        }
    }
}

impl AppConfig {
    pub fn require_backend(&self) -> Result<&BackendConfig> {
        self.backend.as_ref().ok_or(ConfigError::MissingBackend)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing home directory")]
    MissingHomeDir,
    #[error("invalid config path: {0}")]
    InvalidConfigPath(PathBuf),
    #[error("config file not found: {0}")]
    MissingConfigFile(PathBuf),
    #[error("config file permissions too permissive: {0}")]
    InsecurePermissions(PathBuf),
    #[error("backend is not configured: set [backend] url and anon_key or HANDOFF_BACKEND_URL/HANDOFF_ANON_KEY")]
    MissingBackend,
    #[error("backend configuration is incomplete: missing {0}")]
    IncompleteBackend(&'static str),
    #[error("invalid {field} url {value:?}: expected an http(s) url")]
    InvalidUrl { field: &'static str, value: String },
    #[error("anon_key cannot be empty")]
    EmptyAnonKey,
    #[error("invalid history_limit value: {0}")]
    InvalidHistoryLimit(usize),
    #[error("invalid default_view value: {0}")]
    InvalidDefaultView(String),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    backend: Option<BackendFile>,
    delivery: Option<DeliveryFile>,
    dashboard: Option<DashboardFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BackendFile {
    url: Option<String>,
    anon_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeliveryFile {
    webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DashboardFile {
    history_limit: Option<usize>,
    refresh_interval_secs: Option<u64>,
    default_view: Option<String>,
}

/// Loads the config file (if any) and applies `HANDOFF_*` environment overrides.
pub fn load(config_path: Option<PathBuf>) -> Result<AppConfig> {
    load_with_env(config_path, |key| env::var(key).ok())
}

pub fn load_with_env<F>(config_path: Option<PathBuf>, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let required = config_path.is_some();
    let parsed = match resolve_config_path(config_path) {
        Ok(path) => read_at_path(&path, required)?.unwrap_or_default(),
        Err(ConfigError::MissingHomeDir) | Err(ConfigError::InvalidConfigPath(_))
            if !required =>
        {
            ConfigFile::default()
        }
        Err(err) => return Err(err),
    };
    merge_config(apply_env(parsed, lookup))
}

pub fn resolve_config_path(custom: Option<PathBuf>) -> Result<PathBuf> {
    match custom {
        Some(path) => {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidConfigPath(path));
            }
            Ok(path)
        }
        None => {
            let base = match env::var_os("XDG_CONFIG_HOME") {
                Some(dir) if !dir.is_empty() => PathBuf::from(dir),
                Some(dir) => return Err(ConfigError::InvalidConfigPath(PathBuf::from(dir))),
                None => dirs::home_dir()
                    .ok_or(ConfigError::MissingHomeDir)?
                    .join(".config"),
            };
            Ok(base.join(APP_DIR).join(CONFIG_FILENAME))
        }
    }
}

fn read_at_path(path: &Path, required: bool) -> Result<Option<ConfigFile>> {
    if !path.exists() {
        if required {
            return Err(ConfigError::MissingConfigFile(path.to_path_buf()));
        }
        return Ok(None);
    }

    ensure_permissions(path)?;
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(parsed))
}

fn apply_env<F>(mut parsed: ConfigFile, lookup: F) -> ConfigFile
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = non_empty(ENV_BACKEND_URL) {
        parsed.backend.get_or_insert_with(BackendFile::default).url = Some(url);
    }
    if let Some(key) = non_empty(ENV_ANON_KEY) {
        parsed.backend.get_or_insert_with(BackendFile::default).anon_key = Some(key);
    }
    if let Some(url) = non_empty(ENV_WEBHOOK_URL) {
        parsed.delivery.get_or_insert_with(DeliveryFile::default).webhook_url = Some(url);
    }
    parsed
}

fn merge_config(parsed: ConfigFile) -> Result<AppConfig> {
    let mut config = AppConfig::default();

    if let Some(backend) = parsed.backend {
        config.backend = match (backend.url, backend.anon_key) {
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::IncompleteBackend("anon_key")),
            (None, Some(_)) => return Err(ConfigError::IncompleteBackend("url")),
            (Some(url), Some(anon_key)) => {
                let anon_key = anon_key.trim().to_string();
                if anon_key.is_empty() {
                    return Err(ConfigError::EmptyAnonKey);
                }
                Some(BackendConfig {
                    url: parse_http_url("backend", &url)?,
                    anon_key,
                })
            }
        };
    }

    if let Some(delivery) = parsed.delivery {
        if let Some(webhook) = delivery.webhook_url.filter(|value| !value.trim().is_empty()) {
            config.delivery.webhook_url = Some(parse_http_url("webhook", &webhook)?);
        }
    }

    if let Some(dashboard) = parsed.dashboard {
        if let Some(limit) = dashboard.history_limit {
            if limit == 0 || limit > MAX_HISTORY_LIMIT {
                return Err(ConfigError::InvalidHistoryLimit(limit));
            }
            config.dashboard.history_limit = limit;
        }
        if let Some(secs) = dashboard.refresh_interval_secs {
            config.dashboard.refresh_interval_secs = secs;
        }
        if let Some(view) = dashboard.default_view {
            config.dashboard.default_view = view
                .parse()
                .map_err(|_| ConfigError::InvalidDefaultView(view.clone()))?;
        }
    }

    Ok(config)
}

fn parse_http_url(field: &'static str, raw: &str) -> Result<Url> {
    let invalid = || ConfigError::InvalidUrl {
        field,
        value: raw.to_string(),
    };
    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url)
}

#[cfg(unix)]
fn ensure_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.permissions().mode() & 0o077 != 0 {
        return Err(ConfigError::InsecurePermissions(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        apply_env, load_with_env, merge_config, BackendFile, ConfigError, ConfigFile,
        DashboardFile, ENV_ANON_KEY, ENV_BACKEND_URL, ENV_WEBHOOK_URL,
    };
    use handoff_core::rules::ViewFilter;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn restrict_permissions(path: &Path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path).expect("metadata").permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).expect("chmod");
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_backend() {
        let config = merge_config(ConfigFile::default()).expect("merge");
        assert!(config.backend.is_none());
        assert!(config.delivery.webhook_url.is_none());
        assert_eq!(config.dashboard.history_limit, 200);
        assert_eq!(config.dashboard.refresh_interval_secs, 60);
        assert!(matches!(
            config.require_backend(),
            Err(ConfigError::MissingBackend)
        ));
    }

    #[test]
    fn load_parses_toml_sections() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[backend]\nurl = \"https://demo.supabase.co\"\nanon_key = \"anon\"\n\n[delivery]\nwebhook_url = \"https://hooks.example.com/agent\"\n\n[dashboard]\nhistory_limit = 50\nrefresh_interval_secs = 0\ndefault_view = \"needs-agent\"\n",
        )
        .expect("write config");
        restrict_permissions(&path);

        let config = load_with_env(Some(path), no_env).expect("load");
        let backend = config.backend.expect("backend");
        assert_eq!(backend.url.as_str(), "https://demo.supabase.co/");
        assert_eq!(backend.anon_key, "anon");
        assert!(!format!("{backend:?}").contains("anon\""));
        assert_eq!(
            config.delivery.webhook_url.map(|url| url.to_string()),
            Some("https://hooks.example.com/agent".to_string())
        );
        assert_eq!(config.dashboard.history_limit, 50);
        assert_eq!(config.dashboard.refresh_interval_secs, 0);
        assert_eq!(config.dashboard.default_view, ViewFilter::NeedsAgent);
    }

    #[test]
    fn load_requires_explicit_file() {
        let temp = TempDir::new().expect("tempdir");
        let missing = temp.path().join("config.toml");
        let err = load_with_env(Some(missing), no_env).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[backend]\nservice_role_key = \"nope\"\n").expect("write config");
        restrict_permissions(&path);
        assert!(matches!(
            load_with_env(Some(path), no_env),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_file_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "").expect("write config");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o644);
        fs::set_permissions(&path, perms).expect("chmod");
        assert!(matches!(
            load_with_env(Some(path), no_env),
            Err(ConfigError::InsecurePermissions(_))
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BACKEND_URL, "https://override.supabase.co"),
            (ENV_ANON_KEY, "env-key"),
            (ENV_WEBHOOK_URL, "   "),
        ]);
        let parsed = ConfigFile {
            backend: Some(BackendFile {
                url: Some("https://file.supabase.co".to_string()),
                anon_key: None,
            }),
            ..ConfigFile::default()
        };
        let merged = merge_config(apply_env(parsed, |key| {
            env.get(key).map(|value| value.to_string())
        }))
        .expect("merge");
        let backend = merged.backend.expect("backend");
        assert_eq!(backend.url.host_str(), Some("override.supabase.co"));
        assert_eq!(backend.anon_key, "env-key");
        assert!(merged.delivery.webhook_url.is_none());
    }

    #[test]
    fn invalid_values_are_reported() {
        let half = ConfigFile {
            backend: Some(BackendFile {
                url: Some("https://demo.supabase.co".to_string()),
                anon_key: None,
            }),
            ..ConfigFile::default()
        };
        assert!(matches!(
            merge_config(half),
            Err(ConfigError::IncompleteBackend("anon_key"))
        ));

        let bad_url = ConfigFile {
            backend: Some(BackendFile {
                url: Some("ftp://demo".to_string()),
                anon_key: Some("k".to_string()),
            }),
            ..ConfigFile::default()
        };
        assert!(matches!(
            merge_config(bad_url),
            Err(ConfigError::InvalidUrl { field: "backend", .. })
        ));

        let bad_limit = ConfigFile {
            dashboard: Some(DashboardFile {
                history_limit: Some(0),
                ..DashboardFile::default()
            }),
            ..ConfigFile::default()
        };
        assert!(matches!(
            merge_config(bad_limit),
            Err(ConfigError::InvalidHistoryLimit(0))
        ));
    }
}
