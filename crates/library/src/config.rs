use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cover::CoverSource;

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_ENV: &str = "LIBRARY_CONFIG";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub version: u32,
    pub music_root: String,
    pub index_path: String,
    pub covers_dir: String,
    pub cover_preferred_source: CoverSource,
    pub disable_library_configuration: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            music_root: "".to_string(),
            index_path: "library.redb".to_string(),
            covers_dir: "covers".to_string(),
            cover_preferred_source: CoverSource::File,
            disable_library_configuration: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibrarySettings {
    pub music_root: Option<PathBuf>,
    pub index_path: PathBuf,
    pub covers_dir: PathBuf,
    pub cover_source: CoverSource,
    pub disable_library_configuration: bool,
}

impl LibrarySettings {
    pub fn from_config(config_path: &Path, config: &LibraryConfig) -> Self {
        let index_path = match config.index_path.trim() {
            "" => "library.redb",
            value => value,
        };
        let covers_dir = match config.covers_dir.trim() {
            "" => "covers",
            value => value,
        };
        Self {
            music_root: resolve_music_root(config_path, &config.music_root),
            index_path: resolve_path(config_path, index_path),
            covers_dir: resolve_path(config_path, covers_dir),
            cover_source: config.cover_preferred_source,
            disable_library_configuration: config.disable_library_configuration,
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            library_path: self
                .music_root
                .as_ref()
                .map(|path| path.to_string_lossy().to_string())
                .unwrap_or_default(),
            covers_preferred_source: self.cover_source,
            disable_library_configuration: self.disable_library_configuration,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    pub library_path: String,
    pub covers_preferred_source: CoverSource,
    pub disable_library_configuration: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var(CONFIG_ENV) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("library.yaml"))
            .unwrap_or_else(|| PathBuf::from("library.yaml")),
        Err(_) => PathBuf::from("library.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(LibraryConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: LibraryConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.index_path.trim().is_empty() {
            config.index_path = "library.redb".to_string();
        }
        if config.covers_dir.trim().is_empty() {
            config.covers_dir = "covers".to_string();
        }
        return Ok((config, false));
    }

    let config = LibraryConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &LibraryConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

pub fn resolve_music_root(config_path: &Path, value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(resolve_path(config_path, trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("library.yaml");

        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert!(path.exists());
        assert_eq!(config.cover_preferred_source, CoverSource::File);

        let (again, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(again.index_path, "library.redb");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.yaml");
        fs::write(
            &path,
            "music_root: /srv/music\ncover_preferred_source: tag\ncovers_dir: ''\n",
        )
        .unwrap();

        let (config, _) = load_or_create_config(&path).unwrap();
        assert_eq!(config.music_root, "/srv/music");
        assert_eq!(config.cover_preferred_source, CoverSource::Tag);
        assert_eq!(config.covers_dir, "covers");
        assert_eq!(config.version, CONFIG_VERSION);
        assert!(!config.disable_library_configuration);
    }

    #[test]
    fn settings_resolve_against_config_dir() {
        let config_path = Path::new("/etc/library/library.yaml");
        let config = LibraryConfig {
            music_root: "music".to_string(),
            index_path: "/var/lib/library.redb".to_string(),
            ..LibraryConfig::default()
        };

        let settings = LibrarySettings::from_config(config_path, &config);
        assert_eq!(
            settings.music_root,
            Some(PathBuf::from("/etc/library/music"))
        );
        assert_eq!(settings.index_path, PathBuf::from("/var/lib/library.redb"));
        assert_eq!(settings.covers_dir, PathBuf::from("/etc/library/covers"));

        let client = settings.client_settings();
        assert_eq!(client.library_path, "/etc/library/music");
        assert_eq!(client.covers_preferred_source, CoverSource::File);
    }

    #[test]
    fn blank_music_root_is_unset() {
        assert_eq!(resolve_music_root(Path::new("library.yaml"), "  "), None);
        assert_eq!(
            resolve_path(Path::new("library.yaml"), "covers"),
            PathBuf::from("./covers")
        );
    }
}
