use crate::date_source::{parse_date_sources, DateSource, UnknownDateSource};
use crate::format::{DateFormat, FormatError};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use ini::Ini;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "EXIF_RENAME_CONF";
pub const STATE_DIR_ENV: &str = "EXIF_RENAME_HOME";

pub const DATE_SECTION: &str = "Date options";
pub const EXECUTION_SECTION: &str = "Program execution";

pub const DEFAULT_DATE_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const DEFAULT_DATE_SOURCE: &str = "exif";

/// Validated, immutable settings for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub date_format: DateFormat,
    pub date_sources: Vec<DateSource>,
    pub source_name_format: DateFormat,
    pub pause_on_error: bool,
    pub mv_cmd: Option<String>,
}

/// Raw values as found in the config file or on the command line.
/// `None` means "not given here".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSettings {
    pub date_format: Option<String>,
    pub date_source: Option<String>,
    pub source_name_format: Option<String>,
    pub pause_on_error: Option<bool>,
    pub mv_cmd: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    UnknownDateSource(#[from] UnknownDateSource),
    #[error("invalid {key}: {source}")]
    InvalidFormat {
        key: &'static str,
        #[source]
        source: FormatError,
    },
    #[error("invalid boolean for {key}: {value}")]
    InvalidBool { key: &'static str, value: String },
}

impl ConfigSettings {
    /// Values set in `overrides` win over values set in `self`.
    pub fn merged_with(self, overrides: ConfigSettings) -> ConfigSettings {
        ConfigSettings {
            date_format: overrides.date_format.or(self.date_format),
            date_source: overrides.date_source.or(self.date_source),
            source_name_format: overrides.source_name_format.or(self.source_name_format),
            pause_on_error: overrides.pause_on_error.or(self.pause_on_error),
            mv_cmd: overrides.mv_cmd.or(self.mv_cmd),
        }
    }

    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let date = ini.section(Some(DATE_SECTION));
        let exec = ini.section(Some(EXECUTION_SECTION));
        let get = |props: Option<&ini::Properties>, key: &str| {
            props
                .and_then(|p| p.get(key))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let pause_on_error = get(exec, "pause_on_error")
            .map(|raw| parse_bool("pause_on_error", &raw))
            .transpose()?;

        Ok(ConfigSettings {
            date_format: get(date, "date_format"),
            date_source: get(date, "date_source"),
            source_name_format: get(date, "source_name_format"),
            pause_on_error,
            mv_cmd: get(exec, "mv_cmd"),
        })
    }
}

impl Config {
    /// Validates every pattern and source list up front; a bad format is
    /// never carried into per-file work.
    pub fn from_settings(settings: ConfigSettings) -> Result<Self, ConfigError> {
        let date_format = parse_format(
            "date_format",
            settings.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT),
        )?;
        let source_name_format = parse_format(
            "source_name_format",
            settings
                .source_name_format
                .as_deref()
                .unwrap_or(DEFAULT_DATE_FORMAT),
        )?;
        let date_sources = parse_date_sources(
            settings
                .date_source
                .as_deref()
                .unwrap_or(DEFAULT_DATE_SOURCE),
        )?;

        Ok(Config {
            date_format,
            date_sources,
            source_name_format,
            pause_on_error: settings.pause_on_error.unwrap_or(false),
            mv_cmd: settings.mv_cmd.filter(|cmd| !cmd.trim().is_empty()),
        })
    }
}

fn parse_format(key: &'static str, raw: &str) -> Result<DateFormat, ConfigError> {
    DateFormat::parse(raw).map_err(|source| ConfigError::InvalidFormat { key, source })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
    pub undo_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("org", "exif-rename", "exif-rename");

    let config_path = match env::var_os(CONFIG_PATH_ENV) {
        Some(path) => PathBuf::from(path),
        None => proj
            .as_ref()
            .map(|p| p.config_dir().join("exif_rename.conf"))
            .context("cannot determine the configuration directory")?,
    };
    let state_dir = match env::var_os(STATE_DIR_ENV) {
        Some(path) => PathBuf::from(path),
        None => proj
            .as_ref()
            .map(|p| p.data_dir().to_path_buf())
            .context("cannot determine the data directory")?,
    };

    Ok(AppPaths {
        config_path,
        undo_path: state_dir.join("undo-last.json"),
        state_dir,
    })
}

/// Reads the INI file; a missing file yields empty settings.
pub fn read_config_file(path: &Path) -> Result<ConfigSettings> {
    if !path.exists() {
        log::debug!("no config file at {}", path.display());
        return Ok(ConfigSettings::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read config file: {}", path.display()))?;
    let ini = Ini::load_from_str(&raw)
        .with_context(|| format!("cannot parse config file: {}", path.display()))?;
    let settings = ConfigSettings::from_ini(&ini)
        .with_context(|| format!("invalid config file: {}", path.display()))?;
    Ok(settings)
}

/// Loads the config file (explicit path, `EXIF_RENAME_CONF`, or the default
/// location), applies overrides and validates the result.
pub fn load_config(
    explicit_path: Option<&Path>,
    overrides: ConfigSettings,
) -> Result<Config> {
    let path = match explicit_path {
        Some(path) => path.to_path_buf(),
        None => app_paths()?.config_path,
    };
    let settings = read_config_file(&path)?.merged_with(overrides);
    Ok(Config::from_settings(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "\
[Date options]
date_format = %Y-%m-%d_%H.%M.%S
date_source = exif,file-name
source_name_format = %Y%m%d_%H%M%S

[Program execution]
pause_on_error = yes
mv_cmd = git mv
unrelated = ignored
";

    #[test]
    fn empty_ini_yields_no_settings() {
        let ini = Ini::load_from_str("").expect("parse");
        assert_eq!(
            ConfigSettings::from_ini(&ini).expect("settings"),
            ConfigSettings::default()
        );
    }

    #[test]
    fn full_ini_reads_every_key() {
        let ini = Ini::load_from_str(FULL).expect("parse");
        let settings = ConfigSettings::from_ini(&ini).expect("settings");
        assert_eq!(
            settings,
            ConfigSettings {
                date_format: Some("%Y-%m-%d_%H.%M.%S".to_string()),
                date_source: Some("exif,file-name".to_string()),
                source_name_format: Some("%Y%m%d_%H%M%S".to_string()),
                pause_on_error: Some(true),
                mv_cmd: Some("git mv".to_string()),
            }
        );
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let ini = Ini::load_from_str("[Date options]\ndate_format = %Y%m%d\n").expect("parse");
        let settings = ConfigSettings::from_ini(&ini).expect("settings");
        let config = Config::from_settings(settings).expect("config");
        assert_eq!(config.date_format.as_str(), "%Y%m%d");
        assert_eq!(config.date_sources, vec![DateSource::Exif]);
        assert_eq!(config.source_name_format.as_str(), DEFAULT_DATE_FORMAT);
        assert!(!config.pause_on_error);
        assert_eq!(config.mv_cmd, None);
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let ini =
            Ini::load_from_str("[Program execution]\npause_on_error = maybe\n").expect("parse");
        let err = ConfigSettings::from_ini(&ini).expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidBool { .. }));
    }

    #[test]
    fn invalid_date_format_is_fatal() {
        let settings = ConfigSettings {
            date_format: Some("%Y/%m".to_string()),
            ..ConfigSettings::default()
        };
        let err = Config::from_settings(settings).expect_err("must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidFormat {
                key: "date_format",
                ..
            }
        ));
    }

    #[test]
    fn unknown_date_source_is_fatal() {
        let settings = ConfigSettings {
            date_source: Some("guess".to_string()),
            ..ConfigSettings::default()
        };
        let err = Config::from_settings(settings).expect_err("must fail");
        assert_eq!(err.to_string(), "Unknown date source: guess");
    }

    #[test]
    fn overrides_win_over_file_values() {
        let file = ConfigSettings {
            date_format: Some("%Y".to_string()),
            pause_on_error: Some(true),
            ..ConfigSettings::default()
        };
        let cli = ConfigSettings {
            date_format: Some("%Y%m%d".to_string()),
            ..ConfigSettings::default()
        };
        let merged = file.merged_with(cli);
        assert_eq!(merged.date_format.as_deref(), Some("%Y%m%d"));
        assert_eq!(merged.pause_on_error, Some(true));
    }

    #[test]
    fn load_config_reads_file_and_applies_overrides() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("exif_rename.conf");
        fs::write(&path, FULL).expect("write config");

        let overrides = ConfigSettings {
            mv_cmd: Some("mv -n".to_string()),
            ..ConfigSettings::default()
        };
        let config = load_config(Some(&path), overrides).expect("config");
        assert_eq!(config.date_format.as_str(), "%Y-%m-%d_%H.%M.%S");
        assert_eq!(
            config.date_sources,
            vec![DateSource::Exif, DateSource::FileName]
        );
        assert!(config.pause_on_error);
        assert_eq!(config.mv_cmd.as_deref(), Some("mv -n"));
    }

    #[test]
    fn missing_config_file_is_not_an_error() {
        let settings =
            read_config_file(Path::new("/nonexistent/exif_rename.conf")).expect("settings");
        assert_eq!(settings, ConfigSettings::default());
    }
}
