use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt::Write;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("date format is empty")]
    Empty,
    #[error("date format contains an invalid specifier: {0}")]
    InvalidSpecifier(String),
    #[error("date format cannot be rendered from a local timestamp: {0}")]
    Unrenderable(String),
    #[error("date format renders to an empty name: {0}")]
    EmptyOutput(String),
    #[error("date format renders a path separator or NUL: {0}")]
    UnsafeCharacter(String),
}

/// A strftime pattern that has been checked to render a usable file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pattern: String,
}

impl DateFormat {
    pub fn parse(pattern: &str) -> Result<Self, FormatError> {
        if pattern.is_empty() {
            return Err(FormatError::Empty);
        }

        if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
            return Err(FormatError::InvalidSpecifier(pattern.to_string()));
        }

        // Offset specifiers such as %z only fail at render time, so render once here.
        let sample = sample_timestamp();
        let mut rendered = String::new();
        if write!(rendered, "{}", sample.format(pattern)).is_err() {
            return Err(FormatError::Unrenderable(pattern.to_string()));
        }
        if rendered.trim().is_empty() {
            return Err(FormatError::EmptyOutput(pattern.to_string()));
        }
        if rendered.contains(['/', '\\', '\0']) {
            return Err(FormatError::UnsafeCharacter(pattern.to_string()));
        }

        Ok(Self {
            pattern: pattern.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn render(&self, timestamp: &NaiveDateTime) -> String {
        timestamp.format(&self.pattern).to_string()
    }

    /// Parses a file stem back into a timestamp. Patterns without time
    /// fields resolve to midnight.
    pub fn parse_stem(&self, stem: &str) -> Option<NaiveDateTime> {
        if let Ok(dt) = NaiveDateTime::parse_from_str(stem, &self.pattern) {
            return Some(dt);
        }
        NaiveDate::parse_from_str(stem, &self.pattern)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

impl std::fmt::Display for DateFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Renders the timestamp and re-attaches the original extension unchanged.
pub fn format_name(
    timestamp: &NaiveDateTime,
    format: &DateFormat,
    extension: Option<&str>,
) -> String {
    join_extension(&format.render(timestamp), extension)
}

pub fn join_extension(base: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("{}.{}", base, ext),
        _ => base.to_string(),
    }
}

/// True when `file_name` is `base.ext` or `base_N.ext` for a positive `N`.
pub fn matches_timestamp(file_name: &str, base: &str, extension: Option<&str>) -> bool {
    let stem = match extension {
        Some(ext) if !ext.is_empty() => {
            let Some(stem) = file_name.strip_suffix(ext) else {
                return false;
            };
            let Some(stem) = stem.strip_suffix('.') else {
                return false;
            };
            stem
        }
        _ => file_name,
    };

    let Some(rest) = stem.strip_prefix(base) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }

    rest.strip_prefix('_')
        .map(is_disambiguator)
        .unwrap_or(false)
}

pub(crate) fn is_disambiguator(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('0')
        && value.chars().all(|c| c.is_ascii_digit())
}

fn sample_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2001, 2, 3)
        .and_then(|d| d.and_hms_opt(4, 5, 6))
        .unwrap_or_default()
}
