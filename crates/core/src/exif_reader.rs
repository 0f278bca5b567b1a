use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Timelike};
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const DATE_TAGS: &[Tag] = &[Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

/// Reads the capture date of the primary image, preferring `DateTimeOriginal`.
/// `Ok(None)` means the container parsed but carries no usable date tag.
pub fn read_exif_date(path: &Path) -> Result<Option<NaiveDateTime>> {
    let file = File::open(path)
        .with_context(|| format!("cannot open file for EXIF reading: {}", path.display()))?;
    let mut buf = BufReader::new(file);
    let exif = Reader::new()
        .read_from_container(&mut buf)
        .with_context(|| format!("cannot parse EXIF data: {}", path.display()))?;

    Ok(DATE_TAGS
        .iter()
        .filter_map(|tag| ascii_value(&exif, *tag))
        .find_map(|raw| parse_date(&raw)))
}

fn ascii_value(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|v| !v.is_empty()),
        _ => None,
    }
}

pub(crate) fn parse_date(input: &str) -> Option<NaiveDateTime> {
    let normalized = input.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    let candidates = [
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    let with_offset = ["%Y-%m-%dT%H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"];

    for fmt in with_offset {
        if let Ok(dt) = DateTime::parse_from_str(normalized, fmt) {
            return truncate_subsec(dt.naive_local());
        }
    }
    for fmt in candidates {
        if let Ok(naive) = NaiveDateTime::parse_from_str(normalized, fmt) {
            return truncate_subsec(naive);
        }
    }

    None
}

fn truncate_subsec(value: NaiveDateTime) -> Option<NaiveDateTime> {
    value.with_nanosecond(0)
}
