use crate::planner::{PlanStep, RenamePlan};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

const SOURCE_PLACEHOLDER: &str = "{source}";
const TARGET_PLACEHOLDER: &str = "{target}";

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("target already exists: {}", .0.display())]
    TargetExists(PathBuf),
    #[error("rename failed: {} -> {}: {source}", .from.display(), .to.display())]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid mv_cmd: {0}")]
    InvalidCommand(String),
    #[error("cannot run mv_cmd {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("mv_cmd exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
}

/// Moves one file. Implementations must not overwrite an existing target.
pub trait Renamer {
    fn rename(&mut self, source: &Path, target: &Path) -> Result<(), RenameError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsRenamer;

fn ensure_target_free(target: &Path) -> Result<(), RenameError> {
    if target.symlink_metadata().is_ok() {
        return Err(RenameError::TargetExists(target.to_path_buf()));
    }
    Ok(())
}

impl Renamer for FsRenamer {
    fn rename(&mut self, source: &Path, target: &Path) -> Result<(), RenameError> {
        ensure_target_free(target)?;
        fs::rename(source, target).map_err(|source_err| RenameError::Io {
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            source: source_err,
        })
    }
}

/// Runs `mv_cmd` for each rename. `{source}` / `{target}` placeholders are
/// substituted; without them both paths are appended as the last arguments.
#[derive(Debug, Clone)]
pub struct CommandRenamer {
    program: String,
    args: Vec<String>,
}

impl CommandRenamer {
    pub fn new(template: &str) -> Result<Self, RenameError> {
        let mut words = shlex::split(template)
            .ok_or_else(|| RenameError::InvalidCommand(template.to_string()))?
            .into_iter();
        let program = words
            .next()
            .ok_or_else(|| RenameError::InvalidCommand(template.to_string()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn command_line(&self, source: &Path, target: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        let target = target.to_string_lossy();
        let has_placeholders = self
            .args
            .iter()
            .any(|a| a.contains(SOURCE_PLACEHOLDER) || a.contains(TARGET_PLACEHOLDER));

        let mut line = vec![self.program.clone()];
        if has_placeholders {
            line.extend(self.args.iter().map(|a| {
                a.replace(SOURCE_PLACEHOLDER, &source)
                    .replace(TARGET_PLACEHOLDER, &target)
            }));
        } else {
            line.extend(self.args.iter().cloned());
            line.push(source.to_string());
            line.push(target.to_string());
        }
        line
    }
}

impl Renamer for CommandRenamer {
    fn rename(&mut self, source: &Path, target: &Path) -> Result<(), RenameError> {
        ensure_target_free(target)?;
        let line = self.command_line(source, target);
        log::debug!("running {:?}", line);
        let output = Command::new(&line[0])
            .args(&line[1..])
            .output()
            .map_err(|source| RenameError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(RenameError::CommandFailed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Picks the renamer a configuration asks for.
pub fn renamer_for(mv_cmd: Option<&str>) -> Result<Box<dyn Renamer>, RenameError> {
    match mv_cmd {
        Some(template) => Ok(Box::new(CommandRenamer::new(template)?)),
        None => Ok(Box::new(FsRenamer)),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Renamed,
    Unchanged,
    Skipped,
    Failed,
}

impl ExecutionStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ExecutionStatus::Renamed | ExecutionStatus::Unchanged)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub source_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub status: ExecutionStatus,
    pub error_detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameOperation {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    Continue,
    Abort,
    Rollback,
}

/// Asked after each failed rename when `pause_on_error` is set.
pub trait ErrorPrompt {
    fn on_error(&mut self, failed: &ExecutionResult) -> ErrorAction;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionReport {
    pub results: Vec<ExecutionResult>,
    pub rolled_back: Vec<RenameOperation>,
    pub rollback_errors: Vec<String>,
}

impl ExecutionReport {
    pub fn count(&self, status: ExecutionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.status == ExecutionStatus::Failed)
            || !self.rollback_errors.is_empty()
    }

    /// Renames that happened and were not undone by a rollback.
    pub fn completed_operations(&self) -> Vec<RenameOperation> {
        self.results
            .iter()
            .filter(|r| r.status == ExecutionStatus::Renamed)
            .filter_map(|r| {
                Some(RenameOperation {
                    from: r.source_path.clone(),
                    to: r.target_path.clone()?,
                })
            })
            .filter(|op| !self.rolled_back.contains(op))
            .collect()
    }
}

/// Runs the plan in order. Failures are recorded per file; with a prompt the
/// batch may be aborted or rolled back.
pub fn execute_plan(
    plan: &RenamePlan,
    renamer: &mut dyn Renamer,
    mut prompt: Option<&mut dyn ErrorPrompt>,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    let mut steps = plan.steps.iter();

    while let Some(step) = steps.next() {
        let result = execute_step(step, renamer);
        let action = match prompt.as_deref_mut() {
            Some(prompt) if result.status == ExecutionStatus::Failed => {
                prompt.on_error(&result)
            }
            _ => ErrorAction::Continue,
        };
        report.results.push(result);

        match action {
            ErrorAction::Continue => {}
            ErrorAction::Abort => {
                log::warn!("batch aborted after a failed rename");
                skip_remaining(&mut report, steps.by_ref(), "batch aborted");
                break;
            }
            ErrorAction::Rollback => {
                rollback(&mut report, renamer);
                skip_remaining(&mut report, steps.by_ref(), "batch rolled back");
                break;
            }
        }
    }

    report
}

fn execute_step(step: &PlanStep, renamer: &mut dyn Renamer) -> ExecutionResult {
    match step {
        PlanStep::Skip(skipped) => ExecutionResult {
            source_path: skipped.path.clone(),
            target_path: None,
            status: ExecutionStatus::Skipped,
            error_detail: Some(skipped.reason.clone()),
        },
        PlanStep::Rename(candidate) => {
            let source = &candidate.original_path;
            let target = &candidate.target_path;
            if source == target {
                return ExecutionResult {
                    source_path: source.clone(),
                    target_path: Some(target.clone()),
                    status: ExecutionStatus::Unchanged,
                    error_detail: None,
                };
            }

            match renamer.rename(source, target) {
                Ok(()) => {
                    log::info!(
                        "{} -({})-> {}",
                        source.display(),
                        candidate.date_source,
                        target.display()
                    );
                    ExecutionResult {
                        source_path: source.clone(),
                        target_path: Some(target.clone()),
                        status: ExecutionStatus::Renamed,
                        error_detail: None,
                    }
                }
                Err(err) => {
                    log::error!("{err}");
                    ExecutionResult {
                        source_path: source.clone(),
                        target_path: Some(target.clone()),
                        status: ExecutionStatus::Failed,
                        error_detail: Some(err.to_string()),
                    }
                }
            }
        }
    }
}

fn skip_remaining<'a>(
    report: &mut ExecutionReport,
    steps: impl Iterator<Item = &'a PlanStep>,
    reason: &str,
) {
    for step in steps {
        let (source_path, target_path) = match step {
            PlanStep::Rename(c) => (c.original_path.clone(), Some(c.target_path.clone())),
            PlanStep::Skip(s) => (s.path.clone(), None),
        };
        report.results.push(ExecutionResult {
            source_path,
            target_path,
            status: ExecutionStatus::Skipped,
            error_detail: Some(reason.to_string()),
        });
    }
}

/// Undoes completed renames newest first through the same renamer.
fn rollback(report: &mut ExecutionReport, renamer: &mut dyn Renamer) {
    for op in report.completed_operations().into_iter().rev() {
        match renamer.rename(&op.to, &op.from) {
            Ok(()) => {
                log::info!("rolled back {} -> {}", op.to.display(), op.from.display());
                report.rolled_back.push(op);
            }
            Err(err) => {
                log::error!("rollback failed: {err}");
                report.rollback_errors.push(err.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct UndoLog {
    operations: Vec<RenameOperation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoResult {
    pub restored: usize,
}

/// Records the batch so `undo_last` can reverse it.
pub fn persist_undo(undo_path: &Path, operations: &[RenameOperation]) -> Result<()> {
    if let Some(dir) = undo_path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create state directory: {}", dir.display()))?;
    }

    let operations = operations
        .iter()
        .map(|op| {
            Ok(RenameOperation {
                from: absolute(&op.from)?,
                to: absolute(&op.to)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let log = UndoLog { operations };
    let body = serde_json::to_string_pretty(&log).context("cannot serialize undo log")?;
    fs::write(undo_path, body)
        .with_context(|| format!("cannot write undo log: {}", undo_path.display()))?;
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("cannot resolve path: {}", path.display()))
}

/// Reverses the journaled batch. The journal is removed only when every entry
/// was restored or found already restored.
pub fn undo_last(undo_path: &Path, renamer: &mut dyn Renamer) -> Result<UndoResult> {
    if !undo_path.exists() {
        anyhow::bail!("nothing to undo");
    }

    let raw = fs::read_to_string(undo_path)
        .with_context(|| format!("cannot read undo log: {}", undo_path.display()))?;
    let log = serde_json::from_str::<UndoLog>(&raw).context("undo log is corrupt")?;

    let restored = restore_operations(&log, renamer)?;

    fs::remove_file(undo_path)
        .with_context(|| format!("cannot remove undo log: {}", undo_path.display()))?;

    Ok(UndoResult { restored })
}

fn restore_operations(log: &UndoLog, renamer: &mut dyn Renamer) -> Result<usize> {
    let mut restored = 0usize;
    for op in log.operations.iter().rev() {
        if !op.to.exists() {
            if op.from.exists() {
                continue;
            }
            anyhow::bail!(
                "cannot undo {} -> {}: neither file exists",
                op.from.display(),
                op.to.display()
            );
        }
        renamer
            .rename(&op.to, &op.from)
            .with_context(|| format!("cannot undo {} -> {}", op.from.display(), op.to.display()))?;
        restored += 1;
    }
    Ok(restored)
}
