use crate::error::{Result, StoreError};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "handoff";
const DB_FILENAME: &str = "handoff.sqlite3";
const LOG_FILENAME: &str = "handoff-tui.log";

pub fn data_dir() -> Result<PathBuf> {
    match env::var_os("XDG_DATA_HOME") {
        Some(dir) if dir.is_empty() => Err(StoreError::InvalidDataPath(PathBuf::from(dir))),
        Some(dir) => Ok(PathBuf::from(dir).join(APP_DIR)),
        None => {
            let home = dirs::home_dir().ok_or(StoreError::MissingHomeDir)?;
            Ok(home.join(".local").join("share").join(APP_DIR))
        }
    }
}

pub fn ensure_data_dir() -> Result<PathBuf> {
    let dir = data_dir()?;
    ensure_private_dir(&dir)?;
    Ok(dir)
}

pub fn db_path() -> Result<PathBuf> {
    Ok(ensure_data_dir()?.join(DB_FILENAME))
}

pub fn log_path() -> Result<PathBuf> {
    Ok(ensure_data_dir()?.join(LOG_FILENAME))
}

/// `--db-path` wins; otherwise the default location under the data dir.
pub fn resolve_db_path(custom: Option<PathBuf>) -> Result<PathBuf> {
    match custom {
        Some(path) if path.as_os_str().is_empty() => Err(StoreError::InvalidDataPath(path)),
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if !parent.exists() {
                    ensure_private_dir(parent)?;
                }
            }
            Ok(path)
        }
        None => db_path(),
    }
}

fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    restrict_dir_permissions(dir)
}

#[cfg(unix)]
fn restrict_dir_permissions(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_dir_permissions(_dir: &Path) -> Result<()> {
    Ok(())
}
