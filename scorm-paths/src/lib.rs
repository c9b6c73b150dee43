//! XDG Base Directory paths for scorm-rte.
//!
//! The runtime keeps two kinds of files on disk: configuration (read by the
//! CLI) and data (the attempt database and the durable replay queue). Both
//! follow XDG conventions on every platform so a learner's unsynced progress
//! always lands in a predictable place.

use std::path::PathBuf;

const APP_DIR: &str = "scorm-rte";

/// Get the scorm-rte config directory.
///
/// Returns `$XDG_CONFIG_HOME/scorm-rte` if set, otherwise `~/.config/scorm-rte`.
///
/// # Examples
///
/// ```
/// use scorm_paths::config_dir;
///
/// let config = config_dir();
/// let file = config.join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config").join(APP_DIR)
    } else {
        PathBuf::from(".config").join(APP_DIR)
    }
}

/// Get the scorm-rte data directory.
///
/// Returns `$XDG_DATA_HOME/scorm-rte` if set, otherwise `~/.local/share/scorm-rte`.
/// The attempt database and the replay queue live here.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share").join(APP_DIR)
    } else {
        PathBuf::from(".local/share").join(APP_DIR)
    }
}

/// Default location of the durable replay queue.
pub fn replay_dir() -> PathBuf {
    data_dir().join("replay")
}

/// Default location of the SQLite attempt database.
pub fn database_path() -> PathBuf {
    data_dir().join("attempts.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_app_dir() {
        let path = config_dir();
        assert!(
            path.ends_with(APP_DIR),
            "config_dir should end with 'scorm-rte'"
        );
    }

    #[test]
    fn test_replay_dir_is_under_data_dir() {
        assert!(replay_dir().starts_with(data_dir()));
        assert!(replay_dir().ends_with("replay"));
    }

    #[test]
    fn test_database_path_is_under_data_dir() {
        let path = database_path();
        assert!(path.starts_with(data_dir()));
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("attempts.db")
        );
    }

    #[test]
    fn test_config_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/test-config");
        }
        assert_eq!(config_dir(), PathBuf::from("/tmp/test-config/scorm-rte"));
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
        }
    }
}
