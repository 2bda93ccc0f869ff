//! Path constants for configuration and cache files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "lyricpip";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the persisted offset cache file
pub const OFFSET_CACHE_FILE_NAME: &str = "offset_cache.json";

/// Get the configuration directory path (~/.config/lyricpip/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/lyricpip/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the offset cache path (`~/.config/lyricpip/offset_cache.json`)
#[must_use]
pub fn offset_cache_path() -> PathBuf {
    config_dir().join(OFFSET_CACHE_FILE_NAME)
}
