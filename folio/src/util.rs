//! Small helpers shared across the crate.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of the per-user data directory under the home directory.
const APP_DIR: &str = ".folio";

/// Current Unix time in milliseconds.
#[must_use]
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Home directory, falling back to the current directory.
#[must_use]
pub fn home_dir() -> PathBuf {
    dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Application data directory (`~/.folio`).
#[must_use]
pub fn config_dir() -> PathBuf {
    home_dir().join(APP_DIR)
}

/// Default location of the configuration file.
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Default staging directory for assembled documents.
#[must_use]
pub fn staging_dir() -> PathBuf {
    config_dir().join("staging")
}

/// Replace every character that is unsafe in a file name with `_`.
#[must_use]
pub fn sanitize_file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("12345"), "12345");
        assert_eq!(sanitize_file_stem("cli:local/user"), "cli_local_user");
    }

    #[test]
    fn test_paths_under_config_dir() {
        assert!(config_path().ends_with(".folio/config.json"));
        assert!(staging_dir().starts_with(config_dir()));
    }
}
