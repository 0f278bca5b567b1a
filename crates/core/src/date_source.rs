use crate::exif_reader::read_exif_date;
use crate::format::{is_disambiguator, DateFormat};
use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DateSource {
    Exif,
    FileName,
    FileCreated,
    FileModified,
}

impl DateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DateSource::Exif => "exif",
            DateSource::FileName => "file-name",
            DateSource::FileCreated => "file-created",
            DateSource::FileModified => "file-modified",
        }
    }
}

impl fmt::Display for DateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown date source: {0}")]
pub struct UnknownDateSource(pub String);

impl FromStr for DateSource {
    type Err = UnknownDateSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "exif" => Ok(DateSource::Exif),
            "file-name" => Ok(DateSource::FileName),
            "file-created" => Ok(DateSource::FileCreated),
            "file-modified" | "mtime" => Ok(DateSource::FileModified),
            other => Err(UnknownDateSource(other.to_string())),
        }
    }
}

/// Parses a comma separated source list such as `exif,file-name`.
pub fn parse_date_sources(list: &str) -> Result<Vec<DateSource>, UnknownDateSource> {
    let sources = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(DateSource::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    if sources.is_empty() {
        return Err(UnknownDateSource(list.to_string()));
    }
    Ok(sources)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("no date found in {path} (tried {tried})")]
    NoDateFound { path: String, tried: String },
}

/// Tries each source in order and returns the first date found.
pub fn read_timestamp(
    path: &Path,
    sources: &[DateSource],
    source_name_format: &DateFormat,
) -> Result<(DateSource, NaiveDateTime), DateError> {
    for source in sources {
        match read_from_source(path, *source, source_name_format) {
            Some(timestamp) => return Ok((*source, timestamp)),
            None => log::debug!("{}: no date from {}", path.display(), source),
        }
    }

    Err(DateError::NoDateFound {
        path: path.display().to_string(),
        tried: sources
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(","),
    })
}

pub fn read_from_source(
    path: &Path,
    source: DateSource,
    source_name_format: &DateFormat,
) -> Option<NaiveDateTime> {
    match source {
        DateSource::Exif => match read_exif_date(path) {
            Ok(date) => date,
            Err(err) => {
                log::debug!("{err:#}");
                None
            }
        },
        DateSource::FileName => date_from_file_name(path, source_name_format),
        DateSource::FileCreated => file_time(path, |meta| meta.created()).map(to_local_naive),
        DateSource::FileModified => file_time(path, |meta| meta.modified()).map(to_local_naive),
    }
}

/// Matches the stem, or the whole name for patterns that spell out the
/// extension. A trailing `_N` left behind by an earlier run is ignored.
fn date_from_file_name(path: &Path, format: &DateFormat) -> Option<NaiveDateTime> {
    let stem = path.file_stem()?.to_string_lossy();
    if let Some(date) = format.parse_stem(&stem) {
        return Some(date);
    }
    if let Some(date) = path
        .file_name()
        .and_then(|name| format.parse_stem(&name.to_string_lossy()))
    {
        return Some(date);
    }

    let (head, tail) = stem.rsplit_once('_')?;
    if is_disambiguator(tail) {
        format.parse_stem(head)
    } else {
        None
    }
}

fn file_time(
    path: &Path,
    pick: impl Fn(&fs::Metadata) -> std::io::Result<SystemTime>,
) -> Option<SystemTime> {
    let meta = fs::metadata(path).ok()?;
    pick(&meta).ok()
}

fn to_local_naive(time: SystemTime) -> NaiveDateTime {
    let local: DateTime<Local> = DateTime::from(time);
    let naive = local.naive_local();
    naive.with_nanosecond(0).unwrap_or(naive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif_reader::tests::jpeg_with_exif;
    use chrono::NaiveDate;
    use exif::Tag;

    fn ts(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(hh, mm, ss))
            .expect("valid timestamp")
    }

    fn name_format() -> DateFormat {
        DateFormat::parse("%Y%m%d_%H%M%S").expect("must parse")
    }

    #[test]
    fn parse_sources_keeps_order_and_accepts_mtime_alias() {
        assert_eq!(
            parse_date_sources("exif, file-name,mtime").expect("must parse"),
            vec![
                DateSource::Exif,
                DateSource::FileName,
                DateSource::FileModified
            ]
        );
    }

    #[test]
    fn parse_sources_rejects_unknown_names() {
        let err = parse_date_sources("exif,meow").expect_err("must fail");
        assert_eq!(err.to_string(), "Unknown date source: meow");
        assert!(parse_date_sources(" , ").is_err());
    }

    #[test]
    fn exif_source_reads_capture_date() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sammy_awake.jpg");
        std::fs::write(
            &path,
            jpeg_with_exif(&[(Tag::DateTimeOriginal, "2019:04:17 17:45:37")]),
        )
        .expect("write jpeg");

        let found = read_timestamp(&path, &[DateSource::Exif], &name_format());
        assert_eq!(found, Ok((DateSource::Exif, ts(2019, 4, 17, 17, 45, 37))));
    }

    #[test]
    fn falls_through_to_file_name_without_exif() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("20191027_121401.jpg");
        std::fs::write(&path, b"no exif here").expect("write file");

        let found = read_timestamp(
            &path,
            &[DateSource::Exif, DateSource::FileName],
            &name_format(),
        );
        assert_eq!(
            found,
            Ok((DateSource::FileName, ts(2019, 10, 27, 12, 14, 1)))
        );
    }

    #[test]
    fn file_name_source_ignores_disambiguator() {
        let path = Path::new("/photos/20191027_121401_3.jpg");
        assert_eq!(
            read_from_source(path, DateSource::FileName, &name_format()),
            Some(ts(2019, 10, 27, 12, 14, 1))
        );
    }

    #[test]
    fn unparsable_file_name_is_no_date_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sammy_sleepy.jpg");
        std::fs::write(&path, b"x").expect("write file");

        let err = read_timestamp(&path, &[DateSource::FileName], &name_format())
            .expect_err("must fail");
        assert!(matches!(err, DateError::NoDateFound { .. }));
        assert!(err.to_string().contains("file-name"));
    }

    #[test]
    fn falls_through_to_modification_time() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sammy_sleepy.jpg");
        std::fs::write(&path, b"x").expect("write file");
        let expected = to_local_naive(
            std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .expect("mtime"),
        );

        let found = read_timestamp(
            &path,
            &[DateSource::FileName, DateSource::FileModified],
            &name_format(),
        );
        assert_eq!(found, Ok((DateSource::FileModified, expected)));
    }

    #[test]
    fn missing_file_has_no_date() {
        let path = Path::new("/definitely/not/here.jpg");
        let sources = [DateSource::Exif, DateSource::FileModified];
        let err = read_timestamp(path, &sources, &name_format()).expect_err("must fail");
        assert!(err.to_string().contains("exif,file-modified"));
    }
}
