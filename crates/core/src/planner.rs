use crate::config::Config;
use crate::date_source::{read_timestamp, DateSource};
use crate::format::matches_timestamp;
use crate::resolver::{resolve_name, ClaimedNames, DEFAULT_DISAMBIGUATOR_LIMIT};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "tif", "tiff", "png", "webp", "heic", "heif", "avif", "dng", "cr2",
    "cr3", "nef", "arw", "orf", "raf", "rw2",
];

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub inputs: Vec<PathBuf>,
    pub recursive: bool,
    pub include_hidden: bool,
    pub disambiguator_limit: u32,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            recursive: false,
            include_hidden: false,
            disambiguator_limit: DEFAULT_DISAMBIGUATOR_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameCandidate {
    pub original_path: PathBuf,
    pub target_path: PathBuf,
    pub date_source: DateSource,
    pub timestamp: NaiveDateTime,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanStep {
    Rename(RenameCandidate),
    Skip(SkippedFile),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RenameStats {
    pub inputs: usize,
    pub files: usize,
    pub skipped: usize,
    pub planned: usize,
    pub unchanged: usize,
}

/// Steps in input discovery order. Targets are pairwise distinct and stay in
/// the source's directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamePlan {
    pub date_format: String,
    pub steps: Vec<PlanStep>,
    pub stats: RenameStats,
}

impl RenamePlan {
    pub fn candidates(&self) -> impl Iterator<Item = &RenameCandidate> {
        self.steps.iter().filter_map(|step| match step {
            PlanStep::Rename(candidate) => Some(candidate),
            PlanStep::Skip(_) => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SkippedFile> {
        self.steps.iter().filter_map(|step| match step {
            PlanStep::Skip(skipped) => Some(skipped),
            PlanStep::Rename(_) => None,
        })
    }
}

/// Computes every target name without touching the filesystem beyond reads.
pub fn generate_plan(config: &Config, options: &PlanOptions) -> RenamePlan {
    let mut stats = RenameStats {
        inputs: options.inputs.len(),
        ..RenameStats::default()
    };
    let mut steps = Vec::new();
    let mut names = ClaimedNames::new();

    for input in collect_files(options) {
        let step = match input {
            Ok(path) => {
                stats.files += 1;
                plan_file(config, options, &path, &mut names)
            }
            Err(skipped) => PlanStep::Skip(skipped),
        };

        match &step {
            PlanStep::Rename(candidate) => {
                stats.planned += 1;
                if !candidate.changed {
                    stats.unchanged += 1;
                }
            }
            PlanStep::Skip(skipped) => {
                stats.skipped += 1;
                log::warn!("skipping {}: {}", skipped.path.display(), skipped.reason);
            }
        }
        steps.push(step);
    }

    RenamePlan {
        date_format: config.date_format.to_string(),
        steps,
        stats,
    }
}

fn plan_file(
    config: &Config,
    options: &PlanOptions,
    path: &Path,
    names: &mut ClaimedNames,
) -> PlanStep {
    let skip = |reason: String| {
        PlanStep::Skip(SkippedFile {
            path: path.to_path_buf(),
            reason,
        })
    };

    let (date_source, timestamp) =
        match read_timestamp(path, &config.date_sources, &config.source_name_format) {
            Ok(found) => found,
            Err(err) => return skip(err.to_string()),
        };

    let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return skip("path has no file name".to_string());
    };
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let extension = path.extension().map(|e| e.to_string_lossy().to_string());
    let base = config.date_format.render(&timestamp);

    let target = if matches_timestamp(&file_name, &base, extension.as_deref())
        && !names.is_claimed(path)
    {
        path.to_path_buf()
    } else {
        let is_taken = |name: &str| {
            let candidate = parent.join(name);
            candidate != path && names.is_taken(&candidate, candidate.exists())
        };
        match resolve_name(
            &base,
            extension.as_deref(),
            is_taken,
            options.disambiguator_limit,
        ) {
            Ok(name) => parent.join(name),
            Err(err) => return skip(err.to_string()),
        }
    };

    names.record(path, &target);
    let changed = target != path;
    log::debug!(
        "planned {} -({})-> {}",
        path.display(),
        date_source,
        target.display()
    );

    PlanStep::Rename(RenameCandidate {
        original_path: path.to_path_buf(),
        target_path: target,
        date_source,
        timestamp,
        changed,
    })
}

/// Expands inputs in order: files are taken as given, directories yield their
/// image files sorted by name. Missing paths and repeats become skips.
/// Every path is anchored in its canonical directory, so different spellings
/// of one directory share claimed names.
fn collect_files(options: &PlanOptions) -> Vec<Result<PathBuf, SkippedFile>> {
    let mut out = Vec::new();
    let mut seen = HashSet::<PathBuf>::new();
    let mut push = |path: PathBuf, out: &mut Vec<Result<PathBuf, SkippedFile>>| {
        if seen.insert(path.clone()) {
            out.push(Ok(path));
        } else {
            out.push(Err(SkippedFile {
                path,
                reason: "listed more than once".to_string(),
            }));
        }
    };

    for input in &options.inputs {
        if input.is_dir() {
            let files = fs::canonicalize(input)
                .map_err(|e| format!("cannot resolve directory: {e}"))
                .and_then(|root| collect_dir(&root, options.recursive, options.include_hidden));
            match files {
                Ok(files) => {
                    for file in files {
                        push(file, &mut out);
                    }
                }
                Err(reason) => out.push(Err(SkippedFile {
                    path: input.clone(),
                    reason,
                })),
            }
        } else if input.is_file() {
            match canonical_file_path(input) {
                Ok(path) => push(path, &mut out),
                Err(err) => out.push(Err(SkippedFile {
                    path: input.clone(),
                    reason: format!("cannot resolve path: {err}"),
                })),
            }
        } else {
            out.push(Err(SkippedFile {
                path: input.clone(),
                reason: "file does not exist".to_string(),
            }));
        }
    }

    out
}

/// Canonical parent joined with the file's own name; a symlinked file is
/// renamed itself, not its target.
fn canonical_file_path(path: &Path) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(fs::canonicalize(parent)?.join(name))
}

fn collect_dir(root: &Path, recursive: bool, include_hidden: bool) -> Result<Vec<PathBuf>, String> {
    let mut out = Vec::new();

    if recursive {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || include_hidden || !is_hidden(e.path()));
        for entry in walker {
            let entry = entry.map_err(|e| format!("cannot walk directory: {e}"))?;
            let path = entry.path();
            if entry.file_type().is_file() && is_image(path) {
                out.push(path.to_path_buf());
            }
        }
    } else {
        let entries = fs::read_dir(root).map_err(|e| format!("cannot read directory: {e}"))?;
        for entry in entries {
            let entry = entry.map_err(|e| format!("cannot read directory entry: {e}"))?;
            let path = entry.path();
            if !path.is_file() || (is_hidden(&path) && !include_hidden) {
                continue;
            }
            if is_image(&path) {
                out.push(path);
            }
        }
        out.sort();
    }

    Ok(out)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
