//! Configuration loading and root folder resolution

use crate::Result;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no CLI argument is given
pub const ROOT_FOLDER_ENV: &str = "STEELTRACK_ROOT";

/// Resolve the root folder following the priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Locate the platform config file, if one exists
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("steeltrack").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/steeltrack/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("steeltrack"))
        .unwrap_or_else(|| PathBuf::from("./steeltrack_data"))
}

/// Ensure the root folder exists, creating it if needed
pub fn ensure_root_folder(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

/// Database file path under the root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join("steeltrack.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_argument_wins() {
        let root = resolve_root_folder(Some("/tmp/steeltrack-test"));
        assert_eq!(root, PathBuf::from("/tmp/steeltrack-test"));
    }

    #[test]
    fn test_database_path_under_root() {
        let path = database_path(Path::new("/data/steeltrack"));
        assert_eq!(path, PathBuf::from("/data/steeltrack/steeltrack.db"));
    }

    #[test]
    fn test_default_root_is_nonempty() {
        let root = default_root_folder();
        assert!(!root.as_os_str().is_empty());
    }
}
